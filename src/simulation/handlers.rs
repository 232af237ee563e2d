use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{ClusterStats, Simulation};
use crate::audit::{AuditLog, OpKind, Outcome};
use crate::membership::types::{Address, MemberHealth};
use crate::replication::transaction::TransactionId;

pub type SharedSimulation = Arc<Mutex<Simulation>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Coordinator to issue the operation on; defaults to the introducer.
    pub node: Option<String>,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeQuery {
    pub node: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub txn: Option<TransactionId>,
    pub coordinator: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxnStatus {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnStatusResponse {
    pub txn: TransactionId,
    pub status: TxnStatus,
    pub op: Option<OpKind>,
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub address: String,
    pub heartbeat: u64,
    pub timestamp: u64,
    pub suspect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingView {
    pub address: String,
    pub position: u64,
}

/// Routes for the simulation's HTTP surface.
pub fn router(sim: SharedSimulation, audit: Arc<AuditLog>) -> Router {
    Router::new()
        .route("/kv", post(handle_create).put(handle_update))
        .route("/kv/:key", get(handle_read).delete(handle_delete))
        .route("/txn/:id", get(handle_txn_status))
        .route("/members/:node", get(handle_members))
        .route("/ring", get(handle_ring))
        .route("/stats", get(handle_stats))
        .layer(Extension(sim))
        .layer(Extension(audit))
}

fn resolve_node(sim: &Simulation, node: Option<&str>) -> Result<Address, String> {
    match node {
        None => Ok(sim.introducer()),
        Some(raw) => {
            let addr: Address = raw.parse()?;
            if sim.node(&addr).is_none() {
                return Err(format!("unknown node {}", addr));
            }
            Ok(addr)
        }
    }
}

fn rejected(status: StatusCode, error: String) -> (StatusCode, Json<SubmitResponse>) {
    tracing::error!("Rejected client request: {}", error);
    (
        status,
        Json(SubmitResponse {
            txn: None,
            coordinator: None,
            error: Some(error),
        }),
    )
}

fn submitted(coordinator: Address, txn: Option<TransactionId>) -> (StatusCode, Json<SubmitResponse>) {
    match txn {
        Some(txn) => (
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                txn: Some(txn),
                coordinator: Some(coordinator.to_string()),
                error: None,
            }),
        ),
        None => rejected(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("node {} has failed", coordinator),
        ),
    }
}

pub async fn handle_create(
    Extension(sim): Extension<SharedSimulation>,
    Json(req): Json<WriteRequest>,
) -> (StatusCode, Json<SubmitResponse>) {
    let mut sim = sim.lock().await;
    let coordinator = match resolve_node(&sim, req.node.as_deref()) {
        Ok(addr) => addr,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let txn = sim.create(&coordinator, &req.key, &req.value);
    submitted(coordinator, txn)
}

pub async fn handle_update(
    Extension(sim): Extension<SharedSimulation>,
    Json(req): Json<WriteRequest>,
) -> (StatusCode, Json<SubmitResponse>) {
    let mut sim = sim.lock().await;
    let coordinator = match resolve_node(&sim, req.node.as_deref()) {
        Ok(addr) => addr,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let txn = sim.update(&coordinator, &req.key, &req.value);
    submitted(coordinator, txn)
}

pub async fn handle_read(
    Extension(sim): Extension<SharedSimulation>,
    Path(key): Path<String>,
    Query(query): Query<NodeQuery>,
) -> (StatusCode, Json<SubmitResponse>) {
    let mut sim = sim.lock().await;
    let coordinator = match resolve_node(&sim, query.node.as_deref()) {
        Ok(addr) => addr,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let txn = sim.read(&coordinator, &key);
    submitted(coordinator, txn)
}

pub async fn handle_delete(
    Extension(sim): Extension<SharedSimulation>,
    Path(key): Path<String>,
    Query(query): Query<NodeQuery>,
) -> (StatusCode, Json<SubmitResponse>) {
    let mut sim = sim.lock().await;
    let coordinator = match resolve_node(&sim, query.node.as_deref()) {
        Ok(addr) => addr,
        Err(e) => return rejected(StatusCode::BAD_REQUEST, e),
    };
    let txn = sim.delete(&coordinator, &key);
    submitted(coordinator, txn)
}

/// Polls the audit trail, so it never waits on the simulation lock.
pub async fn handle_txn_status(
    Extension(audit): Extension<Arc<AuditLog>>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<TxnStatusResponse>) {
    let txn = TransactionId(id);
    match audit.outcome(txn) {
        Some(outcome) => (
            StatusCode::OK,
            Json(TxnStatusResponse {
                txn,
                status: match outcome.outcome {
                    Outcome::Success => TxnStatus::Success,
                    Outcome::Failure => TxnStatus::Failure,
                },
                op: Some(outcome.op),
                key: Some(outcome.key),
                value: outcome.value,
            }),
        ),
        None => (
            StatusCode::ACCEPTED,
            Json(TxnStatusResponse {
                txn,
                status: TxnStatus::Pending,
                op: None,
                key: None,
                value: None,
            }),
        ),
    }
}

pub async fn handle_members(
    Extension(sim): Extension<SharedSimulation>,
    Path(node): Path<String>,
) -> (StatusCode, Json<Vec<MemberView>>) {
    let sim = sim.lock().await;
    let addr = match resolve_node(&sim, Some(&node)) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Failed to resolve node: {}", e);
            return (StatusCode::NOT_FOUND, Json(Vec::new()));
        }
    };

    let Some(cluster_node) = sim.node(&addr) else {
        return (StatusCode::NOT_FOUND, Json(Vec::new()));
    };

    let membership = cluster_node.membership();
    let suspect_after = membership.config().suspect_after;
    let now = sim.now();
    let members = membership
        .table()
        .entries()
        .into_iter()
        .map(|entry| MemberView {
            address: entry.address().to_string(),
            heartbeat: entry.heartbeat,
            timestamp: entry.timestamp,
            suspect: entry.health(now, suspect_after) == MemberHealth::Suspect,
        })
        .collect();

    (StatusCode::OK, Json(members))
}

pub async fn handle_ring(
    Extension(sim): Extension<SharedSimulation>,
    Query(query): Query<NodeQuery>,
) -> (StatusCode, Json<Vec<RingView>>) {
    let sim = sim.lock().await;
    let addr = match resolve_node(&sim, query.node.as_deref()) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Failed to resolve node: {}", e);
            return (StatusCode::NOT_FOUND, Json(Vec::new()));
        }
    };

    let ring = match sim.node(&addr) {
        Some(node) => node
            .ring()
            .nodes()
            .iter()
            .map(|n| RingView {
                address: n.address.to_string(),
                position: n.position,
            })
            .collect(),
        None => Vec::new(),
    };

    (StatusCode::OK, Json(ring))
}

pub async fn handle_stats(Extension(sim): Extension<SharedSimulation>) -> (StatusCode, Json<ClusterStats>) {
    let sim = sim.lock().await;
    (StatusCode::OK, Json(sim.stats()))
}
