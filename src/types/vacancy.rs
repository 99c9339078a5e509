use chrono::{DateTime, Utc};
use serde::Serialize;

use super::states::{ProbeTag, VacancyStatus};

/// One scraped vacancy and where it stands in the apply queue.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vacancy {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub page_number: i64,
    pub status: VacancyStatus,
    pub is_being_tested: bool,
    #[serde(skip)]
    pub probe: Option<ProbeTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// A `vacancy_links` row as stored.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct VacancyRow {
    pub(crate) id: i64,
    pub(crate) url: String,
    pub(crate) title: String,
    pub(crate) page_number: i64,
    pub(crate) status: VacancyStatus,
    pub(crate) probe_tag: Option<ProbeTag>,
    pub(crate) fail_reason: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) responded_at: Option<DateTime<Utc>>,
}

impl From<VacancyRow> for Vacancy {
    fn from(row: VacancyRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            title: row.title,
            page_number: row.page_number,
            status: row.status,
            is_being_tested: row.probe_tag == Some(ProbeTag::Candidate),
            probe: row.probe_tag,
            fail_reason: row.fail_reason,
            created_at: row.created_at,
            responded_at: row.responded_at,
        }
    }
}
