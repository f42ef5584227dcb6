use crate::server::host::AppState;
use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

const MAX_DB_ERROR_CHARS: usize = 50;

/// Liveness probe for uptime monitors, always 200
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let database = match state.store.ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => {
            let message: String = e.to_string().chars().take(MAX_DB_ERROR_CHARS).collect();
            format!("error: {message}")
        }
    };

    let memory_mb = match resident_memory_mb() {
        Some(mb) => json!(mb),
        None => json!("unknown"),
    };

    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        "service": "bse-monitor",
        "database": database,
        "memory_mb": memory_mb,
    }))
}

/// Resident set size from `/proc/self/status`, in MB with two decimals
fn resident_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss_kb(&status).map(|kb| (kb as f64 / 1024.0 * 100.0).round() / 100.0)
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tbse-monitor\nVmPeak:\t  20000 kB\nVmRSS:\t   10240 kB\n";
        assert_eq!(parse_vm_rss_kb(status), Some(10240));
        assert_eq!(parse_vm_rss_kb("Name: x\n"), None);
    }
}
