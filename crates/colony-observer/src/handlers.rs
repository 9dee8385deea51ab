//! REST API endpoint handlers for the Observer server.
//!
//! Reads go straight to the ledger store. Writes call the same
//! `colony-core` operations the engine uses, so each one is a single
//! atomic participant commit.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/health` | Liveness |
//! | `GET` | `/api/cycle` | Current cycle and countdown |
//! | `GET` | `/api/phenomenon` | Phenomenon snapshot |
//! | `POST` | `/api/admin/phenomenon` | Activate a phenomenon |
//! | `GET` | `/api/participants/:id` | Participant record |
//! | `GET` | `/api/participants/:id/protection` | Insurance window |
//! | `POST` | `/api/participants/:id/insurance` | Buy insurance |
//! | `GET` | `/api/participants/:id/transactions` | History, newest first |
//! | `POST` | `/api/participants/:id/work` | Credit a work reward |
//! | `POST` | `/api/participants/:id/investment` | Mark an investment |
//! | `GET` | `/api/pass/last` | Most recent pass report |

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use colony_core::activity::{record_investment, record_work, WorkJob};
use colony_core::insurance::{purchase_insurance, InsuranceReceipt};
use colony_core::phenomenon::trigger_phenomenon;
use colony_core::{Activation, PassReport};
use colony_ledger::LedgerStore;
use colony_types::{Participant, ParticipantId, PhenomenonState, TransactionRecord};

use crate::error::ObserverError;
use crate::state::AppState;

/// Default number of records returned by the history endpoint.
const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest history page a client may ask for.
const MAX_HISTORY_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/participants/:id/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Maximum number of records to return (default 50, max 500).
    pub limit: Option<usize>,
}

/// Request body for `POST /api/participants/:id/work`.
#[derive(Debug, Deserialize)]
pub struct WorkRequest {
    /// The job performed.
    pub job: WorkJob,
}

/// Response body for `GET /api/cycle`.
#[derive(Debug, Serialize)]
pub struct CycleView {
    /// The cycle containing the current instant.
    pub cycle_id: u64,
    /// Seconds until the next boundary.
    pub seconds_remaining: u64,
    /// Length of one cycle.
    pub period_seconds: u64,
}

/// Response body for `GET /api/participants/:id/protection`.
#[derive(Debug, Serialize)]
pub struct ProtectionView {
    /// Whether an insurance window covers the current instant.
    pub protected: bool,
    /// Whole seconds of protection left.
    pub seconds_remaining: i64,
    /// End of the window, if one was ever bought.
    pub protected_until: Option<DateTime<Utc>>,
}

/// Response body for `GET /api/participants/:id/transactions`.
#[derive(Debug, Serialize)]
pub struct HistoryView {
    /// Whose history this is.
    pub participant_id: ParticipantId,
    /// Number of records returned.
    pub count: usize,
    /// Records, newest first.
    pub transactions: Vec<TransactionRecord>,
}

fn parse_id(raw: &str) -> Result<ParticipantId, ObserverError> {
    raw.parse()
        .map_err(|e| ObserverError::InvalidUuid(format!("{raw}: {e}")))
}

async fn load_participant<S: LedgerStore>(
    state: &AppState<S>,
    id: ParticipantId,
) -> Result<Participant, ObserverError> {
    state
        .store
        .read_participant(id)
        .await?
        .ok_or_else(|| ObserverError::NotFound(format!("participant {id}")))
}

// ---------------------------------------------------------------------------
// Colony-wide reads
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Current cycle id and the countdown to the next boundary.
pub async fn get_cycle<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<CycleView> {
    let now = Utc::now();
    Json(CycleView {
        cycle_id: state.clock.cycle_id_at(now),
        seconds_remaining: state.clock.seconds_remaining_at(now),
        period_seconds: state.clock.period_seconds(),
    })
}

/// The stored phenomenon state.
pub async fn get_phenomenon<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<PhenomenonState>, ObserverError> {
    Ok(Json(state.store.load_phenomenon().await?))
}

/// Turn the sky hostile: activate a phenomenon with its warning raised.
pub async fn activate_phenomenon<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(activation): Json<Activation>,
) -> Result<Json<PhenomenonState>, ObserverError> {
    let phenomenon = trigger_phenomenon(state.store.as_ref(), activation).await?;
    Ok(Json(phenomenon))
}

/// The report of the most recent pass run by this process.
pub async fn last_pass<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<PassReport>, ObserverError> {
    state
        .operator
        .last_report()
        .await
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound("no settlement pass has run yet".to_owned()))
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// A participant record.
pub async fn get_participant<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Participant>, ObserverError> {
    let id = parse_id(&id)?;
    Ok(Json(load_participant(&state, id).await?))
}

/// A participant's insurance window as of now.
pub async fn get_protection<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProtectionView>, ObserverError> {
    let id = parse_id(&id)?;
    let participant = load_participant(&state, id).await?;
    let now = Utc::now();
    Ok(Json(ProtectionView {
        protected: participant.is_protected_at(now),
        seconds_remaining: participant.protection_seconds_remaining(now),
        protected_until: participant.protected_until,
    }))
}

/// Buy a protection window at the stored price.
///
/// Responds `402 Payment Required` when the balance does not cover it.
pub async fn buy_insurance<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<InsuranceReceipt>, ObserverError> {
    let id = parse_id(&id)?;
    let receipt = purchase_insurance(state.store.as_ref(), id, Utc::now(), state.protection).await?;
    Ok(Json(receipt))
}

/// A participant's transaction history, newest first.
pub async fn list_transactions<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<HistoryView>, ObserverError> {
    let id = parse_id(&id)?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ObserverError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_HISTORY_LIMIT}"
        )));
    }

    load_participant(&state, id).await?;
    let transactions = state.store.transactions_for(id, limit).await?;
    Ok(Json(HistoryView {
        participant_id: id,
        count: transactions.len(),
        transactions,
    }))
}

/// Credit the reward for a manual job.
pub async fn do_work<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<WorkRequest>,
) -> Result<Json<Participant>, ObserverError> {
    let id = parse_id(&id)?;
    let participant = record_work(state.store.as_ref(), id, body.job, Utc::now()).await?;
    Ok(Json(participant))
}

/// Record a qualifying investment at the current instant.
pub async fn mark_investment<S: LedgerStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Participant>, ObserverError> {
    let id = parse_id(&id)?;
    let participant = record_investment(state.store.as_ref(), id, Utc::now()).await?;
    Ok(Json(participant))
}
