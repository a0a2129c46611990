//! Species Lists admin CLI - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use specieslists_common::logging::{init_logging, LogConfig, LogLevel};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use uuid::Uuid;

use specieslists_server::{
    config::Config,
    db::{self, PgStore},
    features::{
        jobs::{self as job_features, JobAccepted},
        lists::{commands as list_commands, queries as list_queries},
        search::queries as search_queries,
        shared::pagination::PaginationParams,
        FeatureState,
    },
    ingest::{IngestOptions, Upload},
    jobs::JobHandle,
    models::{ListMetadata, ListType},
    search::{CallerContext, Filter, RecordSearch},
};

#[derive(Parser, Debug)]
#[command(name = "specieslists")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Act as this user
    #[arg(long, env = "SPECIESLISTS_USER", global = true)]
    user: Option<String>,

    /// Roles of the acting user
    #[arg(long = "role", global = true)]
    roles: Vec<String>,

    /// Scopes of the acting client
    #[arg(long = "scope", global = true)]
    scopes: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Cli {
    fn caller(&self) -> CallerContext {
        CallerContext {
            user_id: self.user.clone(),
            roles: self.roles.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run database migrations
    Migrate,

    /// Create a list from a checklist file
    Create {
        #[arg(long)]
        title: String,

        #[arg(long = "type", default_value = "LOCAL_LIST")]
        list_type: ListType,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        private: bool,

        file: PathBuf,
    },

    /// Ingest a checklist file into a list, or preview it with --dry-run
    Ingest {
        #[arg(long)]
        list: Option<Uuid>,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        skip_indexing: bool,

        file: PathBuf,
    },

    /// Replace a list's records with a new checklist file
    Reingest {
        #[arg(long)]
        list: Uuid,

        file: PathBuf,
    },

    /// Re-resolve names and rebuild documents (all lists when --list is omitted)
    Rematch {
        #[arg(long)]
        list: Option<Uuid>,
    },

    /// Rebuild documents from stored classifications
    Reindex {
        #[arg(long)]
        list: Option<Uuid>,
    },

    /// Write a CSV release of a list's current version
    Release {
        #[arg(long)]
        list: Uuid,

        /// Release even if the version was already released
        #[arg(short, long)]
        force: bool,
    },

    /// Show a list
    Show {
        #[arg(long)]
        list: Uuid,
    },

    /// Show a list's releases, newest first
    Releases {
        #[arg(long)]
        list: Uuid,
    },

    /// Search records
    Search {
        /// Free text
        text: Option<String>,

        /// field=value; repeat to combine
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<Filter>,

        /// Only match free text in these fields
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Count values of these fields
        #[arg(long = "facet")]
        facets: Vec<String>,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        per_page: Option<i64>,
    },

    /// Search lists by name
    SearchLists {
        text: Option<String>,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        per_page: Option<i64>,
    },

    /// Show ingestion progress of a list, or migration progress
    Progress {
        #[arg(long)]
        list: Option<Uuid>,
    },

    /// Delete a list, its records and its documents
    Delete {
        #[arg(long)]
        list: Uuid,
    },

    /// Delete one record
    DeleteRecord {
        #[arg(long)]
        record: Uuid,
    },
}

fn parse_filter(raw: &str) -> Result<Filter, String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got {:?}", raw))?;
    if field.trim().is_empty() {
        return Err(format!("missing field name in {:?}", raw));
    }
    Ok(Filter::new(field.trim(), value.trim()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("specieslists")
        .filter_directives("sqlx=warn,aws_config=warn,hyper=info,reqwest=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = run(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load()?;

    if let Commands::Migrate = cli.command {
        let pool = db::create_pool(&config.db_config()).await?;
        PgStore::new(pool).migrate().await?;
        info!("Database migrations completed");
        return Ok(());
    }

    let state = FeatureState::from_config(&config).await?;
    let caller = cli.caller();

    match &cli.command {
        Commands::Migrate => Ok(()),

        Commands::Create {
            title,
            list_type,
            description,
            private,
            file,
        } => {
            let mut metadata = ListMetadata::new(title.clone(), *list_type);
            metadata.description = description.clone();
            metadata.is_private = *private;
            let command = list_commands::CreateListCommand {
                metadata,
                upload: read_upload(file).await?,
            };
            let mut response = list_commands::create::handle(&state, &caller, command).await?;
            let indexing = response.indexing.take();
            print_json(&response)?;
            wait_for(indexing).await
        },

        Commands::Ingest {
            list,
            dry_run,
            skip_indexing,
            file,
        } => {
            let command = list_commands::IngestCommand {
                list_id: *list,
                upload: read_upload(file).await?,
                options: IngestOptions {
                    dry_run: *dry_run,
                    skip_indexing: *skip_indexing,
                    is_migration: false,
                },
            };
            let mut response = list_commands::ingest::handle(&state, &caller, command).await?;
            let indexing = response.indexing.take();
            print_json(&response)?;
            wait_for(indexing).await
        },

        Commands::Reingest { list, file } => {
            let command = list_commands::ReingestCommand {
                list_id: *list,
                upload: read_upload(file).await?,
            };
            let mut response = list_commands::reingest::handle(&state, &caller, command).await?;
            let indexing = response.indexing.take();
            print_json(&response)?;
            wait_for(indexing).await
        },

        Commands::Rematch { list } => {
            let command = job_features::RematchCommand { list_id: *list };
            let accepted = job_features::commands::rematch::handle(&state, &caller, command).await?;
            finish_job(accepted).await
        },

        Commands::Reindex { list } => {
            let command = job_features::ReindexCommand { list_id: *list };
            let accepted = job_features::commands::reindex::handle(&state, &caller, command).await?;
            finish_job(accepted).await
        },

        Commands::Release { list, force } => {
            let command = list_commands::ReleaseListCommand {
                list_id: *list,
                force: *force,
            };
            print_json(&list_commands::release::handle(&state, &caller, command).await?)
        },

        Commands::Show { list } => {
            let query = list_queries::GetListQuery { list_id: *list };
            print_json(&list_queries::get::handle(&state, &caller, query).await?)
        },

        Commands::Releases { list } => {
            let query = list_queries::ListReleasesQuery { list_id: *list };
            print_json(&list_queries::releases::handle(&state, &caller, query).await?)
        },

        Commands::Search {
            text,
            filters,
            fields,
            facets,
            page,
            per_page,
        } => {
            let query = search_queries::records::SearchRecordsQuery {
                search: RecordSearch {
                    free_text: text.clone(),
                    filters: filters.clone(),
                    restrict_fields: (!fields.is_empty()).then(|| fields.clone()),
                    facets: facets.clone(),
                    pagination: PaginationParams::new(*page, *per_page),
                },
            };
            print_json(&search_queries::records::handle(&state, &caller, query).await?)
        },

        Commands::SearchLists { text, page, per_page } => {
            let query = search_queries::lists::SearchListsQuery {
                text: text.clone(),
                pagination: PaginationParams::new(*page, *per_page),
            };
            print_json(&search_queries::lists::handle(&state, &caller, query).await?)
        },

        Commands::Progress { list } => match list {
            Some(list_id) => {
                let query = list_queries::GetProgressQuery { list_id: *list_id };
                print_json(&list_queries::progress::handle(&state, query).await?)
            },
            None => print_json(&list_queries::progress::handle_migration(
                &state,
                list_queries::GetMigrationProgressQuery,
            )),
        },

        Commands::Delete { list } => {
            let command = list_commands::DeleteListCommand { list_id: *list };
            print_json(&list_commands::delete::handle(&state, &caller, command).await?)
        },

        Commands::DeleteRecord { record } => {
            let command = list_commands::DeleteRecordCommand { record_id: *record };
            print_json(&list_commands::delete_record::handle(&state, &caller, command).await?)
        },
    }
}

async fn read_upload(path: &Path) -> Result<Upload> {
    Upload::from_path(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// The process exits with the command, so background runs are awaited here
async fn wait_for(handle: Option<JobHandle>) -> Result<()> {
    if let Some(handle) = handle {
        info!(job_id = %handle.id, kind = %handle.kind, "Waiting for matching and indexing");
        let summary = handle.wait().await?;
        print_json(&summary)?;
    }
    Ok(())
}

async fn finish_job(accepted: JobAccepted) -> Result<()> {
    print_json(&accepted)?;
    let summary = accepted.handle.wait().await?;
    print_json(&summary)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
