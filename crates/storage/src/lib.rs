use std::{collections::HashMap, str::FromStr, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use thiserror::Error;

use gojob_core::prepare::{
    CategoryFieldLookup, JobCategoryRecord, JobRecord, SeekerPreferencesRecord,
};

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite extended result code for a violated foreign key.
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(StorageError::Connect)?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for the category/field taxonomy.
    pub fn taxonomy(&self) -> TaxonomyRepository {
        TaxonomyRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for seeker accounts and their preferences.
    pub fn seekers(&self) -> SeekerRepository {
        SeekerRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for job postings.
    pub fn jobs(&self) -> JobRepository {
        JobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_FOREIGNKEY)
        }
        _ => false,
    }
}

/// Repository for fields and the categories grouped under them.
#[derive(Clone)]
pub struct TaxonomyRepository {
    pool: SqlitePool,
}

impl TaxonomyRepository {
    /// Inserts a field and returns its identifier.
    pub async fn insert_field(&self, name: &str) -> Result<i64, TaxonomyError> {
        let result = sqlx::query("INSERT INTO fields (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Inserts a category under an existing field and returns its identifier.
    pub async fn insert_category(&self, field_id: i64, name: &str) -> Result<i64, TaxonomyError> {
        let result = sqlx::query("INSERT INTO categories (field_id, name) VALUES (?, ?)")
            .bind(field_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                if is_foreign_key_violation(&err) {
                    TaxonomyError::MissingField(field_id)
                } else {
                    TaxonomyError::Database(err)
                }
            })?;
        Ok(result.last_insert_rowid())
    }

    /// Loads the category to field mapping used during preparation.
    pub async fn category_field_lookup(&self) -> Result<CategoryFieldLookup, TaxonomyError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as("SELECT id, field_id FROM categories")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

/// Errors that can occur while reading or writing the taxonomy.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("field {0} does not exist")]
    MissingField(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for seekers and their stored preferences.
#[derive(Clone)]
pub struct SeekerRepository {
    pool: SqlitePool,
}

impl SeekerRepository {
    /// Inserts a seeker without preferences and returns its identifier.
    pub async fn insert_seeker(&self, seeker: &NewSeeker<'_>) -> Result<i64, SeekerError> {
        let created_at = to_rfc3339(seeker.created_at);
        let result = sqlx::query(
            "INSERT INTO seekers (display_name, experience_level_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(seeker.display_name)
        .bind(seeker.experience_level_id)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Loads the stored preferences for a seeker.
    pub async fn fetch_preferences(
        &self,
        seeker_id: i64,
    ) -> Result<SeekerPreferencesRecord, SeekerError> {
        let row = sqlx::query("SELECT experience_level_id FROM seekers WHERE id = ?")
            .bind(seeker_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(SeekerError::NotFound)?;
        let experience_level_id: Option<i64> = row.get("experience_level_id");

        let preferred_category_ids = sqlx::query_scalar::<_, i64>(
            "SELECT category_id FROM seeker_category_preferences WHERE seeker_id = ? ORDER BY category_id",
        )
        .bind(seeker_id)
        .fetch_all(&self.pool)
        .await?;

        let preferred_field_ids = sqlx::query_scalar::<_, i64>(
            "SELECT field_id FROM seeker_field_preferences WHERE seeker_id = ? ORDER BY field_id",
        )
        .bind(seeker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SeekerPreferencesRecord {
            experience_level_id,
            preferred_category_ids,
            preferred_field_ids,
        })
    }

    /// Replaces the experience level and both preference sets in one transaction.
    pub async fn replace_preferences(
        &self,
        seeker_id: i64,
        update: &PreferencesUpdate<'_>,
    ) -> Result<(), SeekerError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE seekers SET experience_level_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(update.experience_level_id)
        .bind(to_rfc3339(update.updated_at))
        .bind(seeker_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(SeekerError::NotFound);
        }

        sqlx::query("DELETE FROM seeker_category_preferences WHERE seeker_id = ?")
            .bind(seeker_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM seeker_field_preferences WHERE seeker_id = ?")
            .bind(seeker_id)
            .execute(&mut *tx)
            .await?;

        for category_id in update.category_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO seeker_category_preferences (seeker_id, category_id) VALUES (?, ?)",
            )
            .bind(seeker_id)
            .bind(*category_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| reference_error(err, SeekerError::UnknownCategory(*category_id)))?;
        }

        for field_id in update.field_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO seeker_field_preferences (seeker_id, field_id) VALUES (?, ?)",
            )
            .bind(seeker_id)
            .bind(*field_id)
            .execute(&mut *tx)
            .await
            .map_err(|err| reference_error(err, SeekerError::UnknownField(*field_id)))?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn reference_error(err: sqlx::Error, unknown: SeekerError) -> SeekerError {
    if is_foreign_key_violation(&err) {
        unknown
    } else {
        SeekerError::Database(err)
    }
}

/// Data required to create a seeker.
pub struct NewSeeker<'a> {
    pub display_name: &'a str,
    pub experience_level_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Full replacement of a seeker's matching preferences.
pub struct PreferencesUpdate<'a> {
    pub experience_level_id: Option<i64>,
    pub category_ids: &'a [i64],
    pub field_ids: &'a [i64],
    pub updated_at: DateTime<Utc>,
}

/// Errors that can occur while accessing seeker preferences.
#[derive(Debug, Error)]
pub enum SeekerError {
    #[error("seeker not found")]
    NotFound,
    #[error("category {0} does not exist")]
    UnknownCategory(i64),
    #[error("field {0} does not exist")]
    UnknownField(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository for job postings and their category tags.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Inserts a job together with its categories and returns its identifier.
    pub async fn insert_job(&self, job: &NewJob<'_>) -> Result<i64, JobError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO jobs (title, company_name, experience_level_id, status, posted_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job.title)
        .bind(job.company_name)
        .bind(job.experience_level_id)
        .bind(JobStatus::Open.as_str())
        .bind(to_rfc3339(job.posted_at))
        .execute(&mut *tx)
        .await?;
        let job_id = result.last_insert_rowid();

        for category_id in job.category_ids {
            sqlx::query("INSERT OR IGNORE INTO job_categories (job_id, category_id) VALUES (?, ?)")
                .bind(job_id)
                .bind(*category_id)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    if is_foreign_key_violation(&err) {
                        JobError::UnknownCategory(*category_id)
                    } else {
                        JobError::Database(err)
                    }
                })?;
        }

        tx.commit().await?;
        Ok(job_id)
    }

    /// Lists open jobs, most recently posted first.
    pub async fn list_open_jobs(&self, limit: Option<u32>) -> Result<Vec<JobListing>, JobError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
SELECT id, title, company_name, experience_level_id, status, posted_at
  FROM jobs
 WHERE status = 'OPEN'
 ORDER BY posted_at DESC, id DESC
 LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut categories = self.categories_for_open_jobs().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let job_categories = categories.remove(&row.id).unwrap_or_default();
                row.into_listing(job_categories)
            })
            .collect())
    }

    /// Loads a single job regardless of its status.
    pub async fn fetch_job(&self, job_id: i64) -> Result<JobListing, JobError> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, title, company_name, experience_level_id, status, posted_at FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(JobError::NotFound)?;

        let categories = sqlx::query_as::<_, JobCategoryRow>(
            r#"
SELECT jc.job_id, jc.category_id, c.field_id
  FROM job_categories AS jc
  LEFT JOIN categories AS c ON c.id = jc.category_id
 WHERE jc.job_id = ?
 ORDER BY jc.rowid
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(JobCategoryRow::into_record)
        .collect();

        Ok(row.into_listing(categories))
    }

    async fn categories_for_open_jobs(
        &self,
    ) -> Result<HashMap<i64, Vec<JobCategoryRecord>>, JobError> {
        let rows = sqlx::query_as::<_, JobCategoryRow>(
            r#"
SELECT jc.job_id, jc.category_id, c.field_id
  FROM job_categories AS jc
  JOIN jobs AS j ON j.id = jc.job_id
  LEFT JOIN categories AS c ON c.id = jc.category_id
 WHERE j.status = 'OPEN'
 ORDER BY jc.job_id, jc.rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<JobCategoryRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.job_id).or_default().push(row.into_record());
        }
        Ok(grouped)
    }
}

/// Publication state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Open,
    Closed,
}

impl JobStatus {
    /// Returns the canonical database representation for the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        }
    }
}

/// Parameters required to insert a job.
pub struct NewJob<'a> {
    pub title: &'a str,
    pub company_name: &'a str,
    pub experience_level_id: Option<i64>,
    pub category_ids: &'a [i64],
    pub posted_at: DateTime<Utc>,
}

/// A job as listed to seekers, with the matching-relevant record attached.
#[derive(Debug, Clone, PartialEq)]
pub struct JobListing {
    pub id: i64,
    pub title: String,
    pub company_name: String,
    pub status: JobStatus,
    pub posted_at: DateTime<Utc>,
    pub record: JobRecord,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    title: String,
    company_name: String,
    experience_level_id: Option<i64>,
    status: String,
    posted_at: DateTime<Utc>,
}

impl JobRow {
    fn into_listing(self, categories: Vec<JobCategoryRecord>) -> JobListing {
        let status = match self.status.as_str() {
            "CLOSED" => JobStatus::Closed,
            _ => JobStatus::Open,
        };
        JobListing {
            id: self.id,
            title: self.title,
            company_name: self.company_name,
            status,
            posted_at: self.posted_at,
            record: JobRecord {
                required_experience_level_id: self.experience_level_id,
                categories,
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobCategoryRow {
    job_id: i64,
    category_id: i64,
    field_id: Option<i64>,
}

impl JobCategoryRow {
    fn into_record(self) -> JobCategoryRecord {
        JobCategoryRecord {
            category_id: self.category_id,
            field_id: self.field_id,
        }
    }
}

/// Errors that can occur while accessing job postings.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found")]
    NotFound,
    #[error("category {0} does not exist")]
    UnknownCategory(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
