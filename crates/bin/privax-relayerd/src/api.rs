//! http routes over the relayer engine
//!
//! handlers stay thin: parse, call the engine, map the error kind to a
//! status code. every engine call runs on the blocking pool: mutations
//! persist synchronously under the write lock, and reads wait on that lock.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use privax_relayer::{
    DepositEvent, DepositReceipt, Digest, DigestHasher, EngineStats, Error, EventSink, MerklePath,
    RelayerEngine, WithdrawalEvent, WithdrawalReceipt, ZeroCommitmentInfo,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

/// engine shared across handlers, hasher chosen at startup
pub type SharedEngine = Arc<RelayerEngine<Box<dyn DigestHasher>>>;

type ApiError = (StatusCode, String);

// === request/response types ===

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct RootResponse {
    root: Option<Digest>,
}

#[derive(Deserialize)]
struct PathQuery {
    commitment: String,
}

#[derive(Serialize)]
struct MerklePathResponse {
    leaf_index: usize,
    path_elements: Vec<Digest>,
    path_indices: Vec<u8>,
}

impl From<&MerklePath> for MerklePathResponse {
    fn from(path: &MerklePath) -> Self {
        Self {
            leaf_index: path.leaf_index,
            path_elements: path.siblings(),
            path_indices: path.path_indices(),
        }
    }
}

#[derive(Deserialize)]
struct WithdrawRequest {
    nullifier_hash: String,
    commitment: String,
    recipient: String,
    token: String,
    amount: u128,
}

#[derive(Serialize)]
struct WithdrawResponse {
    status: &'static str,
    merkle_path: Option<MerklePathResponse>,
    nullifier_hash: Digest,
    recipient: String,
    token: String,
    amount: u128,
}

#[derive(Serialize)]
struct NullifierResponse {
    nullifier: Digest,
    is_used: bool,
}

// === helpers ===

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotFound(_) | Error::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
        Error::InvalidDigest(_) | Error::CommitmentNotFound(_) => StatusCode::BAD_REQUEST,
        Error::NullifierAlreadyUsed(_) => StatusCode::CONFLICT,
        Error::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: Error) -> ApiError {
    if !e.is_rejection() {
        error!("engine failure: {}", e);
    }
    (status_for(&e), e.to_string())
}

fn parse_digest(s: &str) -> Result<Digest, ApiError> {
    Digest::from_hex(s).map_err(api_error)
}

/// run an engine call on the blocking pool
async fn run_blocking<T, F>(
    engine: &SharedEngine,
    f: F,
) -> Result<privax_relayer::Result<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&RelayerEngine<Box<dyn DigestHasher>>) -> privax_relayer::Result<T> + Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || f(engine.as_ref())).await.map_err(|e| {
        error!("blocking task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    })
}

// === handlers ===

async fn index() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Relayer is running",
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn merkle_root(State(engine): State<SharedEngine>) -> Result<Json<RootResponse>, ApiError> {
    let root = run_blocking(&engine, |engine| Ok(engine.root()))
        .await?
        .map_err(api_error)?;
    Ok(Json(RootResponse { root }))
}

async fn merkle_path(
    State(engine): State<SharedEngine>,
    Query(query): Query<PathQuery>,
) -> Result<Json<MerklePathResponse>, ApiError> {
    let commitment = parse_digest(&query.commitment)?;
    let path = run_blocking(&engine, move |engine| engine.path(&commitment))
        .await?
        .map_err(api_error)?;
    Ok(Json(MerklePathResponse::from(&path)))
}

async fn withdraw(
    State(engine): State<SharedEngine>,
    Json(req): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let nullifier = parse_digest(&req.nullifier_hash)?;
    let commitment = parse_digest(&req.commitment)?;

    let receipt = run_blocking(&engine, move |engine| {
        engine.submit_withdrawal(nullifier, commitment, req.recipient, req.token, req.amount)
    })
    .await?
    .map_err(|e| {
        // every rejection is the client's problem here, double spends included
        let status = if e.is_rejection() {
            StatusCode::BAD_REQUEST
        } else {
            error!("withdrawal not persisted: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, e.to_string())
    })?;

    Ok(Json(WithdrawResponse {
        status: "success",
        merkle_path: receipt.merkle_path.as_ref().map(MerklePathResponse::from),
        nullifier_hash: receipt.nullifier,
        recipient: receipt.recipient,
        token: receipt.token,
        amount: receipt.amount,
    }))
}

async fn nullifier_status(
    State(engine): State<SharedEngine>,
    Path(nullifier_hash): Path<String>,
) -> Result<Json<NullifierResponse>, ApiError> {
    let nullifier = parse_digest(&nullifier_hash)?;
    let is_used = run_blocking(&engine, move |engine| Ok(engine.is_nullifier_used(&nullifier)))
        .await?
        .map_err(api_error)?;
    Ok(Json(NullifierResponse { nullifier, is_used }))
}

async fn zero_commitment(
    State(engine): State<SharedEngine>,
) -> Result<Json<ZeroCommitmentInfo>, ApiError> {
    let info = run_blocking(&engine, |engine| Ok(engine.zero_commitment_info()))
        .await?
        .map_err(api_error)?;
    Ok(Json(info))
}

async fn stats(State(engine): State<SharedEngine>) -> Result<Json<EngineStats>, ApiError> {
    let stats = run_blocking(&engine, |engine| Ok(engine.stats()))
        .await?
        .map_err(api_error)?;
    Ok(Json(stats))
}

async fn deposit_event(
    State(engine): State<SharedEngine>,
    Json(event): Json<DepositEvent>,
) -> Result<Json<DepositReceipt>, ApiError> {
    let receipt = run_blocking(&engine, move |engine| engine.on_deposit(event))
        .await?
        .map_err(api_error)?;
    Ok(Json(receipt))
}

async fn withdrawal_event(
    State(engine): State<SharedEngine>,
    Json(event): Json<WithdrawalEvent>,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    let receipt = run_blocking(&engine, move |engine| engine.on_withdrawal(event))
        .await?
        .map_err(api_error)?;
    Ok(Json(receipt))
}

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/merkle_root", get(merkle_root))
        .route("/merkle_path", get(merkle_path))
        .route("/withdraw", post(withdraw))
        .route("/nullifier/{nullifier_hash}", get(nullifier_status))
        .route("/zero_commitment", get(zero_commitment))
        .route("/stats", get(stats))
        .route("/events/deposit", post(deposit_event))
        .route("/events/withdrawal", post(withdrawal_event))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
