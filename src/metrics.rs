/// Prometheus instrumentation: a `lazy_static` registry, one `init_metrics`
/// that registers every series, and a `gather_metrics` that renders the
/// Prometheus text exposition format for a scrape endpoint. The catalog
/// tracks the engine's own concerns — tip height, apply latency, reorgs,
/// handler failures.
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use lazy_static::lazy_static;
use std::time::Instant;

use crate::model::Direction;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref CHAIN_TIP_HEIGHT: IntGauge = IntGauge::new(
        "zenindex_chain_tip_height",
        "Highest block height committed to the serial tip cursor"
    ).unwrap();

    pub static ref BLOCKS_APPLIED: IntCounterVec = IntCounterVec::new(
        Opts::new("zenindex_blocks_applied_total", "Blocks applied, by direction"),
        &["direction"]
    ).unwrap();

    pub static ref APPLY_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("zenindex_apply_duration_seconds", "Time to apply one block")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["direction"]
    ).unwrap();

    pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("zenindex_handler_failures_total", "Handler failures, by service"),
        &["service"]
    ).unwrap();

    pub static ref REORGS_TOTAL: IntCounter = IntCounter::new(
        "zenindex_reorgs_total",
        "Number of reorgs handled"
    ).unwrap();

    pub static ref REORG_DEPTH: Histogram = Histogram::with_opts(
        HistogramOpts::new("zenindex_reorg_depth_blocks", "Blocks disconnected per reorg")
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0])
    ).unwrap();

    pub static ref UPSTREAM_FETCH_FAILURES: IntCounter = IntCounter::new(
        "zenindex_upstream_fetch_failures_total",
        "Failed fetches from the upstream node"
    ).unwrap();
}

pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY.register(Box::new(CHAIN_TIP_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(BLOCKS_APPLIED.clone()))?;
    REGISTRY.register(Box::new(APPLY_DURATION.clone()))?;
    REGISTRY.register(Box::new(HANDLER_FAILURES.clone()))?;
    REGISTRY.register(Box::new(REORGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REORG_DEPTH.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_FETCH_FAILURES.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::Connect => "connect",
        Direction::Disconnect => "disconnect",
    }
}

pub struct ApplyTimer {
    start: Instant,
    direction: Direction,
}

impl ApplyTimer {
    pub fn observe_duration(self) {
        APPLY_DURATION
            .with_label_values(&[direction_label(self.direction)])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn apply_timer(direction: Direction) -> ApplyTimer {
    ApplyTimer {
        start: Instant::now(),
        direction,
    }
}

pub fn record_block_applied(direction: Direction) {
    BLOCKS_APPLIED
        .with_label_values(&[direction_label(direction)])
        .inc();
}

pub fn set_chain_tip_height(height: u32) {
    CHAIN_TIP_HEIGHT.set(height as i64);
}

pub fn record_handler_failure(service: &str) {
    HANDLER_FAILURES.with_label_values(&[service]).inc();
}

pub fn record_reorg(depth: u32) {
    REORGS_TOTAL.inc();
    REORG_DEPTH.observe(depth as f64);
}

pub fn record_upstream_fetch_failure() {
    UPSTREAM_FETCH_FAILURES.inc();
}
