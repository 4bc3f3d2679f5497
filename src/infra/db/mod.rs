//! Postgres-backed mirror store.
//!
//! Flag column names are generated from the [`Flag`] enum, never from
//! caller input, so the dynamic statement composition below stays
//! parameterized where it matters.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    Postgres, QueryBuilder, Row,
    postgres::{PgPool, PgPoolOptions, PgRow},
    query,
};
use time::OffsetDateTime;

use crate::application::repos::{MirrorRepo, RepoError};
use crate::cache::PipelineCaches;
use crate::domain::entities::{Flag, FlagSet, MirrorRecord, YES, is_yes, yes_no};

const TABLE: &str = "mirror_items";

const TEXT_COLUMNS: &[&str] = &[
    "heading",
    "standfirst",
    "body",
    "byline",
    "menu_ref",
    "rank",
    "published_on",
    "updated_on",
];

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("invalid input syntax") => {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Mirror store over a Postgres pool.
///
/// The table is created on demand; the existence probe is memoized through
/// the shared table-existence cache so schema DDL is not re-issued on every
/// call.
#[derive(Clone)]
pub struct PostgresMirrorStore {
    pool: PgPool,
    caches: Arc<PipelineCaches>,
}

impl PostgresMirrorStore {
    pub fn new(pool: PgPool, caches: Arc<PipelineCaches>) -> Self {
        Self { pool, caches }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    async fn ensure_table(&self) -> Result<(), RepoError> {
        if self.caches.table_ready() {
            return Ok(());
        }

        let mut ddl = format!("CREATE TABLE IF NOT EXISTS {TABLE} (item_id BIGINT PRIMARY KEY");
        for column in TEXT_COLUMNS {
            ddl.push_str(&format!(", {column} TEXT NOT NULL DEFAULT ''"));
        }
        for flag in Flag::all() {
            ddl.push_str(&format!(", {} TEXT NOT NULL DEFAULT 'No'", flag.column()));
        }
        ddl.push_str(", modified_at TIMESTAMPTZ NOT NULL)");

        query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        self.caches.store_table_ready();
        Ok(())
    }

    fn select_columns() -> String {
        let mut columns = vec!["item_id".to_string()];
        columns.extend(TEXT_COLUMNS.iter().map(|c| c.to_string()));
        columns.extend(Flag::all().map(|flag| flag.column()));
        columns.push("modified_at".to_string());
        columns.join(", ")
    }

    fn record_from_row(row: &PgRow) -> Result<MirrorRecord, RepoError> {
        let text = |name: &str| -> Result<String, RepoError> {
            row.try_get::<String, _>(name).map_err(map_sqlx_error)
        };

        let mut flags = FlagSet::empty();
        for flag in Flag::all() {
            let value: String = row
                .try_get::<String, _>(flag.column().as_str())
                .map_err(map_sqlx_error)?;
            flags.set(flag, is_yes(&value));
        }

        Ok(MirrorRecord {
            id: row.try_get::<i64, _>("item_id").map_err(map_sqlx_error)?,
            heading: text("heading")?,
            standfirst: text("standfirst")?,
            body: text("body")?,
            byline: text("byline")?,
            menu_ref: text("menu_ref")?,
            rank: text("rank")?,
            published_on: text("published_on")?,
            updated_on: text("updated_on")?,
            flags,
            modified_at: row
                .try_get::<OffsetDateTime, _>("modified_at")
                .map_err(map_sqlx_error)?,
        })
    }
}

#[async_trait]
impl MirrorRepo for PostgresMirrorStore {
    async fn find(&self, id: i64) -> Result<Option<MirrorRecord>, RepoError> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT {} FROM {TABLE} WHERE item_id = $1",
            Self::select_columns()
        );
        let row = query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn scan(&self) -> Result<Vec<MirrorRecord>, RepoError> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT {} FROM {TABLE} ORDER BY item_id",
            Self::select_columns()
        );
        let rows = query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn insert(&self, record: &MirrorRecord) -> Result<(), RepoError> {
        self.ensure_table().await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {TABLE} ({}) VALUES (",
            Self::select_columns()
        ));
        {
            let mut values = qb.separated(", ");
            values.push_bind(record.id);
            values.push_bind(&record.heading);
            values.push_bind(&record.standfirst);
            values.push_bind(&record.body);
            values.push_bind(&record.byline);
            values.push_bind(&record.menu_ref);
            values.push_bind(&record.rank);
            values.push_bind(&record.published_on);
            values.push_bind(&record.updated_on);
            for flag in Flag::all() {
                values.push_bind(yes_no(record.flags.get(flag)));
            }
            values.push_bind(record.modified_at);
        }
        qb.push(")");

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_flags(
        &self,
        id: i64,
        flags: FlagSet,
        modified_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        self.ensure_table().await?;

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("UPDATE {TABLE} SET "));
        {
            let mut assignments = qb.separated(", ");
            for flag in Flag::all() {
                assignments.push(format!("{} = ", flag.column()));
                assignments.push_bind_unseparated(yes_no(flags.get(flag)));
            }
            assignments.push("modified_at = ");
            assignments.push_bind_unseparated(modified_at);
        }
        qb.push(" WHERE item_id = ");
        qb.push_bind(id);

        qb.build()
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        self.ensure_table().await?;
        let sql = format!("DELETE FROM {TABLE} WHERE item_id = $1");
        query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn count_members(
        &self,
        flags: &[Flag],
        exclude_id: i64,
    ) -> Result<BTreeMap<Flag, u64>, RepoError> {
        if flags.is_empty() {
            return Ok(BTreeMap::new());
        }
        self.ensure_table().await?;

        // One aggregate statement for the whole candidate set; the batched
        // shape is the point, never one count query per flag.
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        {
            let mut sums = qb.separated(", ");
            for flag in flags {
                sums.push(format!(
                    "COALESCE(SUM(CASE WHEN {} = ", flag.column()
                ));
                sums.push_bind_unseparated(YES);
                sums.push_unseparated(" THEN 1 ELSE 0 END), 0)");
            }
        }
        qb.push(format!(" FROM {TABLE} WHERE item_id <> "));
        qb.push_bind(exclude_id);

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut counts = BTreeMap::new();
        for (index, flag) in flags.iter().enumerate() {
            let count: i64 = row.try_get::<i64, _>(index).map_err(map_sqlx_error)?;
            counts.insert(*flag, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn count_flag(&self, flag: Flag, exclude_id: i64) -> Result<u64, RepoError> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {TABLE} WHERE {} = $1 AND item_id <> $2",
            flag.column()
        );
        let row = query(&sql)
            .bind(YES)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let count: i64 = row.try_get(0).map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }
}
