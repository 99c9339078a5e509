//! HTTP+JSON API used by the browser-side agent and the dashboard.
use std::collections::HashMap;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::block::BlockController;
use crate::error::{ApiError, Payload};
use crate::outcome::Recorder;
use crate::parser::{FailureReport, IngestBatch, VacancyId};
use crate::store::Store;
use crate::types::protocol::{
    BlockStatus, FailedResponse, ForceRetryResponse, IngestResponse,
    LinksPayload, LinksResponse, NextVacancyResponse, OutcomeResponse,
    ResponseStats, ScrapeStats, SuccessResponse, VacancyPayload,
};
use crate::types::VacancyStatus;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Shared handler state. Every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    store: Store,
    block: BlockController,
    recorder: Recorder,
    target: i64,
}

impl AppState {
    /// `target` is the number of scraped vacancies after which scraping is
    /// considered done.
    pub fn new(store: Store, block: BlockController, target: i64) -> Self {
        let recorder = Recorder::new(store.clone(), block.clone());

        Self {
            store,
            block,
            recorder,
            target: target.max(1),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/links",
            get(list_links).post(ingest_links).delete(clear_links),
        )
        .route("/api/stats", get(scrape_stats))
        .route("/api/response-stats", get(response_stats))
        .route("/api/next-vacancy", get(next_vacancy))
        .route("/api/vacancy/start", post(vacancy_start))
        .route("/api/vacancy/complete", post(vacancy_complete))
        .route("/api/vacancy/completed-and-next", post(completed_and_next))
        .route("/api/vacancy/failed", post(vacancy_failed))
        .route("/api/vacancy/requires-quiz", post(requires_quiz))
        .route("/api/vacancy/requires-cover-letter", post(requires_cover_letter))
        .route("/api/vacancy/unavailable", post(vacancy_unavailable))
        .route("/api/vacancy/blocked", post(vacancy_blocked))
        .route("/api/is-blocked", get(is_blocked))
        .route("/api/set-blocked", post(set_blocked))
        .route("/api/clear-blocked", post(clear_blocked))
        .route("/api/force-retry", post(force_retry))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ingest_links(
    State(state): State<AppState>,
    Payload(payload): Payload<LinksPayload>,
) -> ApiResult<IngestResponse> {
    let batch = IngestBatch::try_from(payload)?;
    let outcome = state.store.insert_batch(&batch).await?;
    let total = state.store.count().await?;

    Ok(Json(IngestResponse {
        success: true,
        message: format!(
            "saved {} new links from page {} ({} duplicates)",
            outcome.inserted, batch.page_number, outcome.duplicates
        ),
        inserted_count: outcome.inserted,
        duplicate_count: outcome.duplicates,
        total,
    }))
}

async fn list_links(State(state): State<AppState>) -> ApiResult<LinksResponse> {
    let links = state.store.list_all().await?;
    Ok(Json(LinksResponse { links }))
}

async fn clear_links(
    State(state): State<AppState>,
) -> ApiResult<SuccessResponse> {
    state.store.clear_all().await?;
    Ok(Json(SuccessResponse::OK))
}

async fn scrape_stats(State(state): State<AppState>) -> ApiResult<ScrapeStats> {
    let total = state.store.count().await?;
    Ok(Json(compute_scrape_stats(total, state.target)))
}

async fn response_stats(
    State(state): State<AppState>,
) -> ApiResult<ResponseStats> {
    let counts = state.store.status_counts().await?;
    Ok(Json(compute_response_stats(&counts)))
}

async fn next_vacancy(
    State(state): State<AppState>,
) -> ApiResult<NextVacancyResponse> {
    let vacancy = state.store.dispense_next().await?;
    if let Some(vacancy) = &vacancy {
        info!(id = vacancy.id, url = %vacancy.url, "dispensed vacancy");
    }

    Ok(Json(NextVacancyResponse { vacancy }))
}

async fn vacancy_start(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<SuccessResponse> {
    let id = VacancyId::try_from(&payload)?;
    state.recorder.start(id).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn vacancy_complete(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<SuccessResponse> {
    let id = VacancyId::try_from(&payload)?;
    state.recorder.complete(id).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn completed_and_next(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<OutcomeResponse> {
    let id = VacancyId::try_from(&payload)?;
    let claim = state.recorder.complete_and_next(id).await?;

    Ok(Json(OutcomeResponse {
        success: true,
        should_open_next: Some(claim.next.is_some()),
        all_completed: None,
    }))
}

async fn vacancy_failed(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<FailedResponse> {
    let report = FailureReport::try_from(payload)?;
    state.recorder.fail(&report).await?;

    Ok(Json(FailedResponse {
        success: true,
        reason: report.reason,
    }))
}

async fn requires_quiz(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<OutcomeResponse> {
    let id = VacancyId::try_from(&payload)?;
    let claim = state.recorder.requires_quiz(id).await?;
    Ok(Json(claim.response()))
}

async fn requires_cover_letter(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<OutcomeResponse> {
    let id = VacancyId::try_from(&payload)?;
    let claim = state.recorder.requires_cover_letter(id).await?;
    Ok(Json(claim.response()))
}

async fn vacancy_unavailable(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<OutcomeResponse> {
    let id = VacancyId::try_from(&payload)?;
    let claim = state.recorder.unavailable(id).await?;
    Ok(Json(claim.response()))
}

async fn vacancy_blocked(
    State(state): State<AppState>,
    Payload(payload): Payload<VacancyPayload>,
) -> ApiResult<SuccessResponse> {
    let id = VacancyId::try_from(&payload)?;
    state.recorder.blocked(id).await?;
    Ok(Json(SuccessResponse::OK))
}

async fn is_blocked(State(state): State<AppState>) -> Json<BlockStatus> {
    Json(state.block.status())
}

async fn set_blocked(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.block.block();
    Json(SuccessResponse::OK)
}

async fn clear_blocked(
    State(state): State<AppState>,
) -> ApiResult<SuccessResponse> {
    if let Some(next) = state.block.clear().await? {
        info!(id = next.id, "pre-claimed vacancy after clearing block");
    }

    Ok(Json(SuccessResponse::OK))
}

async fn force_retry(State(state): State<AppState>) -> Json<ForceRetryResponse> {
    let response = if state.block.force_retry().await {
        ForceRetryResponse {
            success: true,
            message: "probe started".into(),
        }
    } else {
        ForceRetryResponse {
            success: false,
            message: "not blocked; nothing to retry".into(),
        }
    };

    Json(response)
}

/// Rounded percentage of `part` in `whole`, capped at 100.
fn percent(part: i64, whole: i64) -> i64 {
    if whole <= 0 {
        return 0;
    }

    ((part * 100 + whole / 2) / whole).clamp(0, 100)
}

fn compute_scrape_stats(total: i64, target: i64) -> ScrapeStats {
    ScrapeStats {
        total,
        target,
        remaining: (target - total).max(0),
        progress: percent(total, target),
        completed: total >= target,
    }
}

fn compute_response_stats(counts: &HashMap<VacancyStatus, i64>) -> ResponseStats {
    use VacancyStatus::*;

    let count = |status: VacancyStatus| counts.get(&status).copied().unwrap_or(0);
    let total: i64 = counts.values().sum();
    let pending = count(Pending);
    let processing = count(Processing);

    ResponseStats {
        total,
        pending,
        processing,
        completed: count(Completed),
        failed: count(Failed),
        requires_quiz: count(RequiresQuiz),
        requires_cover_letter: count(RequiresCoverLetter),
        blocked_403: count(Blocked403),
        unavailable: count(Unavailable),
        progress: percent(total - pending - processing, total),
        can_start_responding: pending > 0,
    }
}
