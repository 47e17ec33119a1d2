//! Prometheus metrics for the minting service
//!
//! All metrics live in the default registry and are exposed by
//! `GET /metrics` through [`gather_text`].

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Encoder, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Runs
    // ─────────────────────────────────────────────────────────────────────────────

    /// Runs that reached a terminal state.
    ///
    /// Labels:
    /// - status: completed, failed, cancelled, expired, incomplete, timeout
    pub static ref RUNS_TOTAL: CounterVec = register_counter_vec!(
        "mintforge_runs_total",
        "Agent runs by terminal status",
        &["status"]
    ).expect("failed to register RUNS_TOTAL metric");

    /// Latest-run reads per run.
    pub static ref RUN_POLLS: Histogram = register_histogram!(
        "mintforge_run_polls",
        "Latest-run reads needed to reach a terminal state",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).expect("failed to register RUN_POLLS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tools
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool calls by tool and outcome.
    ///
    /// Labels:
    /// - tool: wire name, or "unknown" for unregistered names
    /// - outcome: executed, failed, blocked, skipped
    pub static ref TOOL_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "mintforge_tool_calls_total",
        "Tool calls dispatched by tool and outcome",
        &["tool", "outcome"]
    ).expect("failed to register TOOL_CALLS_TOTAL metric");

    /// Handler execution time.
    pub static ref TOOL_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "mintforge_tool_call_duration_seconds",
        "Tool handler execution time",
        &["tool"],
        vec![0.05, 0.25, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]
    ).expect("failed to register TOOL_CALL_DURATION metric");

    /// Mint calls refused by the guard.
    pub static ref MINT_GUARD_BLOCKS: Counter = register_counter!(
        "mintforge_mint_guard_blocks_total",
        "Repeated mint calls blocked within a run"
    ).expect("failed to register MINT_GUARD_BLOCKS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Credits & Requests
    // ─────────────────────────────────────────────────────────────────────────────

    /// Credit reads by source and result.
    ///
    /// Labels:
    /// - source: authoritative, fallback
    /// - result: ok, unavailable
    pub static ref CREDIT_READS_TOTAL: CounterVec = register_counter_vec!(
        "mintforge_credit_reads_total",
        "Credit reads by source and result",
        &["source", "result"]
    ).expect("failed to register CREDIT_READS_TOTAL metric");

    /// Mint requests by outcome tag.
    pub static ref MINT_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mintforge_mint_requests_total",
        "Mint requests by outcome",
        &["outcome"]
    ).expect("failed to register MINT_REQUESTS_TOTAL metric");

    /// HTTP responses by route and status code.
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mintforge_http_requests_total",
        "HTTP responses by route and status",
        &["route", "status"]
    ).expect("failed to register HTTP_REQUESTS_TOTAL metric");
}

/// Render the default registry in the Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
