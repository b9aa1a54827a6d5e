//! HTTP handlers for the web interface

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::{NodeInfo, SlotRange};
use crate::dispatch::{Dispatcher, Services};
use crate::protocol::RespValue;
use bytes::Bytes;
use sysinfo::System;

/// Shared application state
pub type AppState = Services;

/// Request body for command execution
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// The command as a string, e.g., "SET key value"
    pub command: String,
}

/// Response for command execution
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Whether the command succeeded
    pub success: bool,
    /// The result or error message
    pub result: String,
}

/// Server statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Live keys in the keyspace
    pub keys: i64,
    /// Jobs parked on the kernel (blocked pops)
    pub suspended_jobs: usize,
    /// Resident memory of this process in MB
    pub process_memory_mb: f64,
    /// Total system memory in MB
    pub total_memory_mb: f64,
    /// CPU usage percentage (0-100)
    pub cpu_usage: f64,
}

/// Slot map as seen by this node
#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub node_id: String,
    pub cluster_enabled: bool,
    pub slots: Vec<SlotRange>,
    pub nodes: Vec<NodeInfo>,
}

/// Execute a command through a one-off session
pub async fn execute_command(
    State(services): State<AppState>,
    Json(req): Json<CommandRequest>,
) -> impl IntoResponse {
    debug!("Executing command: {}", req.command);

    let mut parts = req.command.split_whitespace();
    let Some(name) = parts.next() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(CommandResponse {
                success: false,
                result: "Empty command".to_string(),
            }),
        );
    };
    let args = parts.map(|s| Bytes::copy_from_slice(s.as_bytes())).collect();

    let mut session = Dispatcher::new(services);
    let response = session.execute(name, args).await.into_value();

    (
        StatusCode::OK,
        Json(CommandResponse {
            success: !response.is_error(),
            result: format_resp_value(&response),
        }),
    )
}

/// Format a RESP value for display
pub(crate) fn format_resp_value(value: &RespValue) -> String {
    match value {
        RespValue::SimpleString(s) => s.clone(),
        RespValue::Error(e) => format!("Error: {}", e),
        RespValue::Integer(i) => i.to_string(),
        RespValue::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
        RespValue::Array(arr) if arr.is_empty() => "(empty array)".to_string(),
        RespValue::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}) {}", i + 1, format_resp_value(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        RespValue::Null | RespValue::NullArray => "(nil)".to_string(),
    }
}

/// Keyspace, kernel and process statistics
pub async fn stats_handler(State(services): State<AppState>) -> impl IntoResponse {
    let mut session = Dispatcher::new(services.clone());
    let keys = session
        .execute("DBSIZE", Vec::new())
        .await
        .value()
        .as_integer()
        .unwrap_or(0);

    let mut sys = System::new_all();
    sys.refresh_all();

    let process_memory = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid))
        .map_or(0, |process| process.memory());

    let stats = StatsResponse {
        keys,
        suspended_jobs: services.kernel.suspended_count(),
        process_memory_mb: process_memory as f64 / 1024.0 / 1024.0,
        total_memory_mb: sys.total_memory() as f64 / 1024.0 / 1024.0,
        cpu_usage: sys.global_cpu_usage() as f64,
    };

    (StatusCode::OK, Json(stats))
}

/// This node's identity and the full slot map
pub async fn cluster_handler(State(services): State<AppState>) -> impl IntoResponse {
    let cluster = &services.cluster;
    let response = ClusterResponse {
        node_id: cluster.node_id().to_string(),
        cluster_enabled: cluster.is_clustered(),
        slots: cluster.local_ranges(),
        nodes: cluster.discovery().nodes(),
    };

    (StatusCode::OK, Json(response))
}
