//! Process entry point: loads configuration, opens the Store, wires a
//! production `RpcUpstreamNode`, and runs `Lifecycle` until SIGINT or a
//! fatal error. Exit codes: 0 on a clean stop, 1 if the stop path itself
//! errored, -1 on an uncaught fatal error.
use std::sync::Arc;

use tracing::{error, info};

use zenindex::config::Config;
use zenindex::events::EventBus;
use zenindex::lifecycle::Lifecycle;
use zenindex::registry::{Indexer, ServiceRegistry};
use zenindex::rpc_upstream::RpcUpstreamNode;
use zenindex::store::Store;
use zenindex::telemetry::{init_tracing, TelemetryConfig};
use zenindex::version::CURRENT_VERSION;

#[tokio::main]
async fn main() {
    if let Err(err) = init_tracing(TelemetryConfig::default()) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(-1);
    }

    let exit_code = run().await;
    std::process::exit(exit_code);
}

async fn run() -> i32 {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return -1;
        }
    };

    let db_path = config.db_path();
    info!(
        ?db_path,
        network = ?config.network,
        schema_version = CURRENT_VERSION,
        "starting chain-indexing core"
    );

    let store = match Store::open(&db_path, config.max_open_files as i32) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to open store");
            return -1;
        }
    };

    if let Err(e) = zenindex::metrics::init_metrics() {
        error!(error = %e, "failed to register metrics");
        return -1;
    }

    // Leaf indexers (address/timestamp/transaction/etc.) live outside this
    // crate; an embedding application registers its own `Indexer`
    // implementations here.
    let services: Vec<Arc<dyn Indexer>> = Vec::new();
    let registry = match ServiceRegistry::build(services) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "service registry failed to assemble");
            return -1;
        }
    };

    let upstream_url =
        std::env::var("ZENINDEX_UPSTREAM_URL").unwrap_or_else(|_| "http://127.0.0.1:8342".into());
    let upstream_user = std::env::var("ZENINDEX_UPSTREAM_USER").unwrap_or_default();
    let upstream_pass = std::env::var("ZENINDEX_UPSTREAM_PASS").unwrap_or_default();
    let upstream = Arc::new(RpcUpstreamNode::new(upstream_url, upstream_user, upstream_pass));

    let events = EventBus::default();
    let lifecycle = Arc::new(Lifecycle::new(store, registry, events, upstream));
    let stop_handle = lifecycle.stop_handle();
    let signaled = Arc::new(std::sync::atomic::AtomicBool::new(false));

    // A dedicated task watches for SIGINT and flips the cooperative stop
    // flag; `Lifecycle::run` notices it between blocks/reorg steps and
    // unwinds.
    let signaled_by_signal = Arc::clone(&signaled);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("SIGINT received, stopping gracefully");
            signaled_by_signal.store(true, std::sync::atomic::Ordering::SeqCst);
            stop_handle.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let run_handle = tokio::spawn(async move { lifecycle.run().await });
    match run_handle.await {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error!(error = %e, "error during shutdown");
            if signaled.load(std::sync::atomic::Ordering::SeqCst) {
                1
            } else {
                -1
            }
        }
        Err(e) => {
            error!(error = %e, "lifecycle task panicked");
            -1
        }
    }
}
