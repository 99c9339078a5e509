use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vacancy::Vacancy;

/// A batch of scraped links, as sent by the scraper.
///
/// On the wire: `POST /api/links {"links": [{"url", "title"}], "pageNumber"}`
///
/// Every field is optional here so that missing values surface as a
/// `ParsingError` with a useful message rather than a generic JSON rejection.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksPayload {
    #[serde(default)]
    pub links: Option<Vec<RawLink>>,
    #[serde(default)]
    pub page_number: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawLink {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Identifies the vacancy an outcome applies to.
///
/// On the wire: `POST /api/vacancy/<outcome> {"vacancyId", "reason"?}`
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacancyPayload {
    #[serde(default)]
    pub vacancy_id: Option<i64>,
    /// Only read by `failed`.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub const OK: SuccessResponse = SuccessResponse { success: true };
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub message: String,
    pub inserted_count: u64,
    pub duplicate_count: u64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct LinksResponse {
    pub links: Vec<Vacancy>,
}

/// Scrape progress towards the configured target.
#[derive(Debug, Eq, PartialEq, Serialize)]
pub struct ScrapeStats {
    pub total: i64,
    pub target: i64,
    pub remaining: i64,
    pub progress: i64,
    pub completed: bool,
}

/// Per-status breakdown of the apply queue.
#[derive(Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub requires_quiz: i64,
    pub requires_cover_letter: i64,
    #[serde(rename = "blocked403")]
    pub blocked_403: i64,
    pub unavailable: i64,
    pub progress: i64,
    pub can_start_responding: bool,
}

#[derive(Debug, Serialize)]
pub struct NextVacancyResponse {
    pub vacancy: Option<Vacancy>,
}

/// Reply to an outcome that may have pre-claimed the next vacancy.
#[derive(Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_open_next: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_completed: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FailedResponse {
    pub success: bool,
    pub reason: String,
}

#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStatus {
    pub is_blocked: bool,
    pub blocked_since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ForceRetryResponse {
    pub success: bool,
    pub message: String,
}
