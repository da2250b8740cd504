use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

pub const SERVICE_NAME: &str = "storefront-service";

pub static STOREFRONT_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    if let Err(err) = common_http_errors::register_metrics(&registry) {
        warn!(error = %err, "failed to register http error metrics");
    }
    if let Err(err) = common_security::register_metrics(&registry) {
        warn!(error = %err, "failed to register auth rejection metrics");
    }
    registry
});

static TENANT_CONFIG_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("tenant_config_cache_total", "Tenant config cache lookups and invalidations by outcome"),
        &["outcome"],
    ).expect("valid tenant_config_cache_total opts");
    STOREFRONT_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

static ORDER_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let v = IntCounterVec::new(
        Opts::new("order_transitions_total", "Order lifecycle transitions attempted, by outcome"),
        &["transition", "outcome"],
    ).expect("valid order_transitions_total opts");
    STOREFRONT_REGISTRY.register(Box::new(v.clone())).ok();
    v
});

pub fn record_cache(outcome: &str) {
    TENANT_CONFIG_CACHE_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_transition(transition: &str, outcome: &str) {
    ORDER_TRANSITIONS_TOTAL.with_label_values(&[transition, outcome]).inc();
}

/// Prometheus text exposition of every storefront metric.
pub fn render() -> Result<String, prometheus::Error> {
    Lazy::force(&TENANT_CONFIG_CACHE_TOTAL);
    Lazy::force(&ORDER_TRANSITIONS_TOTAL);
    let mut buf = Vec::new();
    TextEncoder::new().encode(&STOREFRONT_REGISTRY.gather(), &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
