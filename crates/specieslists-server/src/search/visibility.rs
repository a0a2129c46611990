//! Who may see and change which lists
//!
//! Every search path appends the same visibility filter, so a private list
//! never leaks through one query and not another.

use serde::{Deserialize, Serialize};

use super::query::{BoolQuery, Query};
use crate::models::SpeciesList;

pub const ADMIN_ROLE: &str = "ROLE_ADMIN";
pub const INTERNAL_SCOPE: &str = "specieslists/internal";

/// The identity a request is made under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Authorization decisions about a caller
pub trait AccessPolicy: Send + Sync {
    fn is_owner(&self, caller: &CallerContext, list: &SpeciesList) -> bool;

    fn is_editor(&self, caller: &CallerContext, list: &SpeciesList) -> bool;

    fn is_admin(&self, caller: &CallerContext) -> bool;

    fn has_internal_scope(&self, caller: &CallerContext) -> bool;

    /// Sees every list, private or not
    fn sees_everything(&self, caller: &CallerContext) -> bool {
        self.is_admin(caller) || self.has_internal_scope(caller)
    }
}

/// Decides from the roles and scopes carried on the caller
#[derive(Debug, Clone)]
pub struct RolePolicy {
    admin_role: String,
    internal_scope: String,
}

impl RolePolicy {
    pub fn new(admin_role: impl Into<String>, internal_scope: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
            internal_scope: internal_scope.into(),
        }
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::new(ADMIN_ROLE, INTERNAL_SCOPE)
    }
}

impl AccessPolicy for RolePolicy {
    fn is_owner(&self, caller: &CallerContext, list: &SpeciesList) -> bool {
        caller.user_id.as_deref() == Some(list.owner.as_str())
    }

    fn is_editor(&self, caller: &CallerContext, list: &SpeciesList) -> bool {
        caller
            .user_id
            .as_ref()
            .is_some_and(|user| list.editors.contains(user))
    }

    fn is_admin(&self, caller: &CallerContext) -> bool {
        caller.roles.iter().any(|r| r == &self.admin_role)
    }

    fn has_internal_scope(&self, caller: &CallerContext) -> bool {
        caller.scopes.iter().any(|s| s == &self.internal_scope)
    }
}

/// Filter clause limiting results to what the caller may see.
/// `None` means no restriction.
pub fn visibility_filter(policy: &dyn AccessPolicy, caller: &CallerContext) -> Option<Query> {
    if policy.sees_everything(caller) {
        return None;
    }
    let public = Query::term("isPrivate", false);
    match &caller.user_id {
        None => Some(public),
        Some(user) => Some(BoolQuery::any_of(vec![public, Query::term("owner", user.as_str())]).build()),
    }
}

/// Whether the caller may read a list
pub fn can_view(policy: &dyn AccessPolicy, caller: &CallerContext, list: &SpeciesList) -> bool {
    !list.is_private() || policy.sees_everything(caller) || policy.is_owner(caller, list)
}

/// Whether the caller may change a list's records and metadata
pub fn can_edit(policy: &dyn AccessPolicy, caller: &CallerContext, list: &SpeciesList) -> bool {
    policy.is_admin(caller) || policy.is_owner(caller, list) || policy.is_editor(caller, list)
}

/// Whether the caller may delete a list or change its visibility
pub fn can_administer(policy: &dyn AccessPolicy, caller: &CallerContext, list: &SpeciesList) -> bool {
    policy.is_admin(caller) || policy.is_owner(caller, list)
}
