//! Postgres canonical store
//!
//! Schema lives in `migrations/`. Records carry a `seq` column so pages come
//! back in upload order; property bags and classifications are JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{CanonicalStore, DbError, DbResult};
use crate::models::{
    Classification, ListMetadata, ListRecord, ListType, Property, Release, SpeciesList,
    TaxonFields,
};

/// Rows per multi-value INSERT; 16 binds each keeps us well under the
/// Postgres parameter limit.
const INSERT_CHUNK: usize = 1_000;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ListRow {
    id: Uuid,
    version: i64,
    title: String,
    description: Option<String>,
    list_type: String,
    licence: String,
    is_private: bool,
    is_authoritative: bool,
    is_threatened: bool,
    is_invasive: bool,
    region: Option<String>,
    tags: Vec<String>,
    owner: String,
    editors: Vec<String>,
    field_list: Vec<String>,
    facet_list: Vec<String>,
    row_count: i64,
    distinct_match_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ListRow> for SpeciesList {
    type Error = DbError;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        let list_type: ListType = row.list_type.parse().map_err(DbError::Decode)?;
        Ok(SpeciesList {
            id: row.id,
            version: row.version,
            metadata: ListMetadata {
                title: row.title,
                description: row.description,
                list_type,
                licence: row.licence,
                is_private: row.is_private,
                is_authoritative: row.is_authoritative,
                is_threatened: row.is_threatened,
                is_invasive: row.is_invasive,
                region: row.region,
                tags: row.tags,
            },
            owner: row.owner,
            editors: row.editors,
            field_list: row.field_list,
            facet_list: row.facet_list,
            row_count: row.row_count,
            distinct_match_count: row.distinct_match_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    list_id: Uuid,
    scientific_name: Option<String>,
    taxon_id: Option<String>,
    taxon_concept_id: Option<String>,
    vernacular_name: Option<String>,
    kingdom: Option<String>,
    phylum: Option<String>,
    class: Option<String>,
    order: Option<String>,
    family: Option<String>,
    genus: Option<String>,
    properties: Json<Vec<Property>>,
    classification: Option<Json<Classification>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for ListRecord {
    fn from(row: RecordRow) -> Self {
        ListRecord {
            id: row.id,
            list_id: row.list_id,
            taxon: TaxonFields {
                scientific_name: row.scientific_name,
                taxon_id: row.taxon_id,
                taxon_concept_id: row.taxon_concept_id,
                vernacular_name: row.vernacular_name,
                kingdom: row.kingdom,
                phylum: row.phylum,
                class: row.class,
                order: row.order,
                family: row.family,
                genus: row.genus,
            },
            properties: row.properties.0,
            classification: row.classification.map(|c| c.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReleaseRow {
    id: Uuid,
    list_id: Uuid,
    released_version: i64,
    location: String,
    metadata: Json<ListMetadata>,
    row_count: i64,
    checksum: String,
    size_bytes: i64,
    created_at: DateTime<Utc>,
}

impl From<ReleaseRow> for Release {
    fn from(row: ReleaseRow) -> Self {
        Release {
            id: row.id,
            list_id: row.list_id,
            released_version: row.released_version,
            location: row.location,
            metadata: row.metadata.0,
            row_count: row.row_count,
            checksum: row.checksum,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
        }
    }
}

const LIST_COLUMNS: &str = r#"
    id, version, title, description, list_type, licence, is_private,
    is_authoritative, is_threatened, is_invasive, region, tags, owner, editors,
    field_list, facet_list, row_count, distinct_match_count, created_at, updated_at
"#;

const RECORD_COLUMNS: &str = r#"
    id, list_id, scientific_name, taxon_id, taxon_concept_id, vernacular_name,
    kingdom, phylum, class, "order", family, genus, properties, classification,
    created_at, updated_at
"#;

const RELEASE_COLUMNS: &str = r#"
    id, list_id, released_version, location, metadata, row_count, checksum,
    size_bytes, created_at
"#;

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl CanonicalStore for PgStore {
    #[instrument(skip(self, list), fields(list_id = %list.id))]
    async fn insert_list(&self, list: &SpeciesList) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO species_lists (
                id, version, title, description, list_type, licence, is_private,
                is_authoritative, is_threatened, is_invasive, region, tags, owner,
                editors, field_list, facet_list, row_count, distinct_match_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(list.id)
        .bind(list.version)
        .bind(&list.metadata.title)
        .bind(&list.metadata.description)
        .bind(list.metadata.list_type.as_str())
        .bind(&list.metadata.licence)
        .bind(list.metadata.is_private)
        .bind(list.metadata.is_authoritative)
        .bind(list.metadata.is_threatened)
        .bind(list.metadata.is_invasive)
        .bind(&list.metadata.region)
        .bind(&list.metadata.tags)
        .bind(&list.owner)
        .bind(&list.editors)
        .bind(&list.field_list)
        .bind(&list.facet_list)
        .bind(list.row_count)
        .bind(list.distinct_match_count)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DbError::duplicate("List", &list.id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_list(&self, id: Uuid) -> DbResult<Option<SpeciesList>> {
        let row = sqlx::query_as::<_, ListRow>(&format!(
            "SELECT {} FROM species_lists WHERE id = $1",
            LIST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SpeciesList::try_from).transpose()
    }

    #[instrument(skip(self, list), fields(list_id = %list.id, version = list.version))]
    async fn update_list(&self, list: &SpeciesList) -> DbResult<SpeciesList> {
        let row = sqlx::query_as::<_, ListRow>(&format!(
            r#"
            UPDATE species_lists SET
                version = version + 1,
                title = $3, description = $4, list_type = $5, licence = $6,
                is_private = $7, is_authoritative = $8, is_threatened = $9,
                is_invasive = $10, region = $11, tags = $12, owner = $13,
                editors = $14, field_list = $15, facet_list = $16,
                row_count = $17, distinct_match_count = $18, updated_at = NOW()
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            LIST_COLUMNS
        ))
        .bind(list.id)
        .bind(list.version)
        .bind(&list.metadata.title)
        .bind(&list.metadata.description)
        .bind(list.metadata.list_type.as_str())
        .bind(&list.metadata.licence)
        .bind(list.metadata.is_private)
        .bind(list.metadata.is_authoritative)
        .bind(list.metadata.is_threatened)
        .bind(list.metadata.is_invasive)
        .bind(&list.metadata.region)
        .bind(&list.metadata.tags)
        .bind(&list.owner)
        .bind(&list.editors)
        .bind(&list.field_list)
        .bind(&list.facet_list)
        .bind(list.row_count)
        .bind(list.distinct_match_count)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => SpeciesList::try_from(row),
            None => {
                let actual: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM species_lists WHERE id = $1")
                        .bind(list.id)
                        .fetch_optional(&self.pool)
                        .await?;
                match actual {
                    Some(actual) => Err(DbError::VersionConflict {
                        expected: list.version,
                        actual,
                    }),
                    None => Err(DbError::not_found("List", &list.id.to_string())),
                }
            },
        }
    }

    async fn set_list_counts(&self, id: Uuid, row_count: i64, distinct_match_count: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE species_lists SET row_count = $2, distinct_match_count = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(row_count)
        .bind(distinct_match_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("List", &id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_list(&self, id: Uuid) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM list_records WHERE list_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM species_lists WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lists_page(&self, offset: usize, limit: usize) -> DbResult<Vec<SpeciesList>> {
        let rows = sqlx::query_as::<_, ListRow>(&format!(
            "SELECT {} FROM species_lists ORDER BY seq LIMIT $1 OFFSET $2",
            LIST_COLUMNS
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SpeciesList::try_from).collect()
    }

    async fn count_lists(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM species_lists")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn insert_records(&self, records: &[ListRecord]) -> DbResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO list_records ({})",
                RECORD_COLUMNS
            ));

            query_builder.push_values(chunk.iter(), |mut b, record| {
                b.push_bind(record.id)
                    .push_bind(record.list_id)
                    .push_bind(&record.taxon.scientific_name)
                    .push_bind(&record.taxon.taxon_id)
                    .push_bind(&record.taxon.taxon_concept_id)
                    .push_bind(&record.taxon.vernacular_name)
                    .push_bind(&record.taxon.kingdom)
                    .push_bind(&record.taxon.phylum)
                    .push_bind(&record.taxon.class)
                    .push_bind(&record.taxon.order)
                    .push_bind(&record.taxon.family)
                    .push_bind(&record.taxon.genus)
                    .push_bind(Json(&record.properties))
                    .push_bind(record.classification.as_ref().map(Json))
                    .push_bind(record.created_at)
                    .push_bind(record.updated_at);
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!("Inserted {} list records", records.len());
        Ok(())
    }

    async fn get_record(&self, id: Uuid) -> DbResult<Option<ListRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM list_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ListRecord::from))
    }

    async fn update_record(&self, record: &ListRecord) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE list_records SET
                scientific_name = $2, taxon_id = $3, taxon_concept_id = $4,
                vernacular_name = $5, kingdom = $6, phylum = $7, class = $8,
                "order" = $9, family = $10, genus = $11, properties = $12,
                classification = $13, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.taxon.scientific_name)
        .bind(&record.taxon.taxon_id)
        .bind(&record.taxon.taxon_concept_id)
        .bind(&record.taxon.vernacular_name)
        .bind(&record.taxon.kingdom)
        .bind(&record.taxon.phylum)
        .bind(&record.taxon.class)
        .bind(&record.taxon.order)
        .bind(&record.taxon.family)
        .bind(&record.taxon.genus)
        .bind(Json(&record.properties))
        .bind(record.classification.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Record", &record.id.to_string()));
        }
        Ok(())
    }

    async fn set_classification(&self, record_id: Uuid, classification: &Classification) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE list_records SET classification = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(record_id)
        .bind(Json(classification))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Record", &record_id.to_string()));
        }
        Ok(())
    }

    async fn delete_record(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM list_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_records_for_list(&self, list_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM list_records WHERE list_id = $1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn records_page(&self, list_id: Uuid, offset: usize, limit: usize) -> DbResult<Vec<ListRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM list_records WHERE list_id = $1 ORDER BY seq LIMIT $2 OFFSET $3",
            RECORD_COLUMNS
        ))
        .bind(list_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ListRecord::from).collect())
    }

    async fn count_records(&self, list_id: Uuid) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM list_records WHERE list_id = $1")
            .bind(list_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self, release), fields(list_id = %release.list_id, version = release.released_version))]
    async fn insert_release(&self, release: &Release) -> DbResult<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO releases ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            RELEASE_COLUMNS
        ))
        .bind(release.id)
        .bind(release.list_id)
        .bind(release.released_version)
        .bind(&release.location)
        .bind(Json(&release.metadata))
        .bind(release.row_count)
        .bind(&release.checksum)
        .bind(release.size_bytes)
        .bind(release.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(DbError::duplicate("Release", &release.id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn latest_release(&self, list_id: Uuid) -> DbResult<Option<Release>> {
        let row = sqlx::query_as::<_, ReleaseRow>(&format!(
            "SELECT {} FROM releases WHERE list_id = $1 ORDER BY released_version DESC, created_at DESC LIMIT 1",
            RELEASE_COLUMNS
        ))
        .bind(list_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Release::from))
    }

    async fn list_releases(&self, list_id: Uuid) -> DbResult<Vec<Release>> {
        let rows = sqlx::query_as::<_, ReleaseRow>(&format!(
            "SELECT {} FROM releases WHERE list_id = $1 ORDER BY released_version DESC, created_at DESC",
            RELEASE_COLUMNS
        ))
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Release::from).collect())
    }
}
