//! Prometheus metrics for the backup SDK

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Search Metrics

    /// Paginated searches by collection and outcome
    pub static ref SEARCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nabla_search_total",
        "Total number of paginated searches",
        &["collection", "status"]
    )
    .expect("Failed to register SEARCH_TOTAL");

    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "nabla_search_duration_seconds",
        "Paginated search duration in seconds",
        &["collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register SEARCH_DURATION_SECONDS");

    /// Documents returned per page
    pub static ref SEARCH_RESULTS: HistogramVec = register_histogram_vec!(
        "nabla_search_results",
        "Number of documents returned by a search",
        &["collection"],
        vec![0.0, 1.0, 10.0, 25.0, 50.0, 100.0]
    )
    .expect("Failed to register SEARCH_RESULTS");

    // Backup API Metrics

    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nabla_api_requests_total",
        "Total number of backup API requests",
        &["method", "endpoint", "status"]
    )
    .expect("Failed to register API_REQUESTS_TOTAL");

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "nabla_api_request_duration_seconds",
        "Backup API request duration in seconds",
        &["method", "endpoint"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register API_REQUEST_DURATION_SECONDS");

    // Database Metrics

    pub static ref DB_QUERY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "nabla_db_query_duration_seconds",
        "Database query duration in seconds",
        &["query_type"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .expect("Failed to register DB_QUERY_DURATION_SECONDS");

    pub static ref DB_QUERY_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nabla_db_query_errors_total",
        "Total number of database query errors",
        &["query_type"]
    )
    .expect("Failed to register DB_QUERY_ERRORS_TOTAL");

    /// Connections currently checked out of the pool
    pub static ref DB_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        "nabla_db_connections_active",
        "Number of active database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_ACTIVE");

    pub static ref DB_CONNECTIONS_IDLE: IntGauge = register_int_gauge!(
        "nabla_db_connections_idle",
        "Number of idle database connections"
    )
    .expect("Failed to register DB_CONNECTIONS_IDLE");

    /// Server-side sessions on the connected database (pg_stat_activity)
    pub static ref DB_SERVER_SESSIONS: IntGauge = register_int_gauge!(
        "nabla_db_server_sessions",
        "Number of server sessions on the connected database"
    )
    .expect("Failed to register DB_SERVER_SESSIONS");

    // Service Metrics

    pub static ref SERVICE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "nabla_service_errors_total",
        "Total number of errors raised by the backup service",
        &["kind"]
    )
    .expect("Failed to register SERVICE_ERRORS_TOTAL");
}

/// All registered metrics in the Prometheus text format.
pub fn render() -> String {
    let families = prometheus::gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .unwrap_or_default()
}

/// Low-cardinality label for an API path: ids become `{id}`.
pub fn endpoint_label(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let labelled: Vec<&str> = segments
        .iter()
        .map(|segment| match *segment {
            known @ ("backups" | "schedules") => known,
            _ => "{id}",
        })
        .collect();

    format!("/{}", labelled.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_label() {
        assert_eq!(endpoint_label("/backups"), "/backups");
        assert_eq!(endpoint_label("/backups?page=2"), "/backups");
        assert_eq!(endpoint_label("/backups/65a1f"), "/backups/{id}");
        assert_eq!(endpoint_label("/backups/schedules"), "/backups/schedules");
        assert_eq!(
            endpoint_label("/backups/schedules/abc123"),
            "/backups/schedules/{id}"
        );
        assert_eq!(endpoint_label("/"), "/");
    }

    #[test]
    fn test_render_includes_registered_metrics() {
        SEARCH_TOTAL.with_label_values(&["backups", "ok"]).inc();
        let text = render();
        assert!(text.contains("nabla_search_total"));
    }
}
