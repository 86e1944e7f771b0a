//! Prometheus-style counters behind the `metrics` feature.
//!
//! Call sites are unconditional; the bodies compile to no-ops when the
//! feature is off so the rest of the crate never has to `#[cfg]` a call
//! site itself.

#[cfg(feature = "metrics")]
use metrics::counter;

pub fn record_cache_operation(cache_type: &str, operation: &str, result: &str) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "cache_operations_total",
            "cache_type" => cache_type.to_string(),
            "operation" => operation.to_string(),
            "result" => result.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (cache_type, operation, result);
    }
}

pub fn record_embedding_generation(provider: &str, model: &str, status: &str, duration_secs: f64) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "semantic_embedding_requests_total",
            "provider" => provider.to_string(),
            "model" => model.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        let _ = duration_secs;
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (provider, model, status, duration_secs);
    }
}

pub fn record_vector_store_operation(backend: &str, operation: &str, status: &str, duration_secs: f64) {
    #[cfg(feature = "metrics")]
    {
        counter!(
            "semantic_vector_store_operations_total",
            "backend" => backend.to_string(),
            "operation" => operation.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
        let _ = duration_secs;
    }
    #[cfg(not(feature = "metrics"))]
    {
        let _ = (backend, operation, status, duration_secs);
    }
}
