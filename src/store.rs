//! SQLite-backed vacancy store and the queue dispenser built on it.
//!
//! The pool holds a single connection, so statements never interleave; the
//! claim itself is one `UPDATE .. RETURNING` so it stays atomic regardless.
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Sqlite};
use tracing::{debug, info, instrument};

use crate::parser::{IngestBatch, VacancyId};
use crate::types::vacancy::VacancyRow;
use crate::types::{ProbeTag, Vacancy, VacancyStatus};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS vacancy_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    page_number INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    probe_tag TEXT,
    fail_reason TEXT,
    created_at TEXT NOT NULL,
    responded_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_vacancy_links_status ON vacancy_links(status);
";

macro_rules! columns {
    () => {
        "id, url, title, page_number, status, probe_tag, fail_reason, \
         created_at, responded_at"
    };
}

/// Result of inserting a scrape batch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InsertOutcome {
    pub inserted: u64,
    pub duplicates: u64,
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> sqlx::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        Self::connect_with(options).await
    }

    /// Opens a database from an sqlx URL such as `sqlite::memory:`.
    pub async fn connect(url: &str) -> sqlx::Result<Self> {
        let options =
            SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        Self::connect_with(options).await
    }

    pub async fn in_memory() -> sqlx::Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect_with(options: SqliteConnectOptions) -> sqlx::Result<Self> {
        // One long-lived connection: keeps `:memory:` databases alive and
        // makes every statement a serialized write.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        check_columns(&pool).await?;

        // Probe state belongs to the previous process.
        let store = Self { pool };
        store.clear_probe_tags().await?;

        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Inserts every link not already known by url.
    #[instrument(skip_all, fields(page = batch.page_number, links = batch.links.len()))]
    pub async fn insert_batch(
        &self,
        batch: &IngestBatch,
    ) -> sqlx::Result<InsertOutcome> {
        let now = Utc::now();
        let mut outcome = InsertOutcome::default();
        let mut tx = self.pool.begin().await?;

        for link in &batch.links {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO vacancy_links
                     (url, title, page_number, status, created_at)
                 VALUES (?, ?, ?, 'pending', ?)",
            )
            .bind(&link.url)
            .bind(&link.title)
            .bind(batch.page_number)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                outcome.duplicates += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit().await?;

        info!(
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "stored scrape batch"
        );

        Ok(outcome)
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM vacancy_links")
            .fetch_one(&self.pool)
            .await
    }

    /// Every vacancy, newest first. Ids are assigned in creation order.
    pub async fn list_all(&self) -> sqlx::Result<Vec<Vacancy>> {
        let rows: Vec<VacancyRow> = sqlx::query_as(concat!(
            "SELECT ",
            columns!(),
            " FROM vacancy_links ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vacancy::from).collect())
    }

    pub async fn get(&self, id: VacancyId) -> sqlx::Result<Option<Vacancy>> {
        let row: Option<VacancyRow> = sqlx::query_as(concat!(
            "SELECT ",
            columns!(),
            " FROM vacancy_links WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Vacancy::from))
    }

    /// Removes every vacancy, returning how many were deleted.
    pub async fn clear_all(&self) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM vacancy_links")
            .execute(&self.pool)
            .await?;

        info!(deleted = result.rows_affected(), "cleared all vacancies");

        Ok(result.rows_affected())
    }

    /// Resets abandoned `processing` vacancies to `pending`, then claims the
    /// oldest pending one. Both steps share a transaction.
    #[instrument(skip_all)]
    pub async fn dispense_next(&self) -> sqlx::Result<Option<Vacancy>> {
        let mut tx = self.pool.begin().await?;

        let reset = sqlx::query(
            "UPDATE vacancy_links SET status = 'pending'
             WHERE status = 'processing'",
        )
        .execute(&mut *tx)
        .await?;
        if reset.rows_affected() > 0 {
            info!(count = reset.rows_affected(), "requeued stale vacancies");
        }

        let claimed = claim_next_in(&mut *tx).await?;
        tx.commit().await?;

        Ok(claimed)
    }

    /// Claims the oldest pending vacancy, flipping it to `processing`.
    pub async fn claim_next(&self) -> sqlx::Result<Option<Vacancy>> {
        claim_next_in(&self.pool).await
    }

    /// Sets the status of one vacancy. Unknown ids yield `None`.
    pub async fn set_status(
        &self,
        id: VacancyId,
        status: VacancyStatus,
    ) -> sqlx::Result<Option<Vacancy>> {
        let row: Option<VacancyRow> = sqlx::query_as(concat!(
            "UPDATE vacancy_links SET status = ? WHERE id = ?
             RETURNING ",
            columns!()
        ))
        .bind(status.as_str())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        debug!(id = id.0, %status, found = row.is_some(), "status updated");

        Ok(row.map(Vacancy::from))
    }

    /// Marks a vacancy completed, stamping `responded_at` and dropping any
    /// probe tag it carried.
    pub async fn mark_completed(
        &self,
        id: VacancyId,
    ) -> sqlx::Result<Option<Vacancy>> {
        let row: Option<VacancyRow> = sqlx::query_as(concat!(
            "UPDATE vacancy_links
             SET status = 'completed', responded_at = ?, probe_tag = NULL
             WHERE id = ?
             RETURNING ",
            columns!()
        ))
        .bind(Utc::now())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Vacancy::from))
    }

    pub async fn mark_failed(
        &self,
        id: VacancyId,
        reason: &str,
    ) -> sqlx::Result<Option<Vacancy>> {
        let row: Option<VacancyRow> = sqlx::query_as(concat!(
            "UPDATE vacancy_links SET status = 'failed', fail_reason = ?
             WHERE id = ?
             RETURNING ",
            columns!()
        ))
        .bind(reason)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Vacancy::from))
    }

    /// Number of vacancies in each status. Absent statuses count zero.
    pub async fn status_counts(
        &self,
    ) -> sqlx::Result<HashMap<VacancyStatus, i64>> {
        let rows: Vec<(VacancyStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM vacancy_links GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts: HashMap<_, _> =
            VacancyStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        counts.extend(rows);

        Ok(counts)
    }

    /// Tags one vacancy as a probe candidate without touching its status.
    /// A `blocked_403` vacancy is preferred over a `pending` one.
    pub async fn select_probe_candidate(
        &self,
    ) -> sqlx::Result<Option<Vacancy>> {
        for status in [VacancyStatus::Blocked403, VacancyStatus::Pending] {
            let row: Option<VacancyRow> = sqlx::query_as(concat!(
                "UPDATE vacancy_links SET probe_tag = ?
                 WHERE id = (
                     SELECT id FROM vacancy_links
                     WHERE status = ?
                     ORDER BY id
                     LIMIT 1
                 )
                 RETURNING ",
                columns!()
            ))
            .bind(ProbeTag::Candidate.as_str())
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                return Ok(Some(row.into()));
            }
        }

        Ok(None)
    }

    /// Moves every probe candidate to `processing` so the opener picks it up,
    /// retagging it as dispatched.
    pub async fn promote_probe_candidates(&self) -> sqlx::Result<Vec<Vacancy>> {
        let rows: Vec<VacancyRow> = sqlx::query_as(concat!(
            "UPDATE vacancy_links SET status = 'processing', probe_tag = ?
             WHERE probe_tag = ?
             RETURNING ",
            columns!()
        ))
        .bind(ProbeTag::Dispatched.as_str())
        .bind(ProbeTag::Candidate.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Vacancy::from).collect())
    }

    /// Drops every probe tag, returning how many rows carried one.
    pub async fn clear_probe_tags(&self) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "UPDATE vacancy_links SET probe_tag = NULL
             WHERE probe_tag IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Refuses a `vacancy_links` table left behind by some other program, which
/// `CREATE TABLE IF NOT EXISTS` keeps as is.
async fn check_columns(pool: &SqlitePool) -> sqlx::Result<()> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM pragma_table_info('vacancy_links')",
    )
    .fetch_all(pool)
    .await?;

    let missing: Vec<&str> = columns!()
        .split(',')
        .map(str::trim)
        .filter(|column| !present.iter().any(|p| p == column))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    Err(sqlx::Error::Configuration(
        format!(
            "vacancy_links has an incompatible layout (missing {}); \
             use a fresh database file",
            missing.join(", ")
        )
        .into(),
    ))
}

async fn claim_next_in<'e, E>(executor: E) -> sqlx::Result<Option<Vacancy>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<VacancyRow> = sqlx::query_as(concat!(
        "UPDATE vacancy_links SET status = 'processing'
         WHERE id = (
             SELECT id FROM vacancy_links
             WHERE status = 'pending'
             ORDER BY id
             LIMIT 1
         )
         RETURNING ",
        columns!()
    ))
    .fetch_optional(executor)
    .await?;

    if let Some(row) = &row {
        debug!(id = row.id, "claimed vacancy");
    }

    Ok(row.map(Vacancy::from))
}
