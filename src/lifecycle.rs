/// Lifecycle: orchestrates start/stop ordering for the whole engine. Owns
/// the Store, the Service Registry, and the Sync Driver's stop handle,
/// driving a single supervised loop plus a cooperative shutdown signal
/// instead of a hand-assembled set of unrelated background tasks.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::applier::BlockApplier;
use crate::errors::{IndexError, Result};
use crate::events::EventBus;
use crate::model::{Block, Direction, TipRecord};
use crate::registry::ServiceRegistry;
use crate::schema;
use crate::store::Store;
use crate::sync::SyncDriver;
use crate::tip::{self, Cursor};
use crate::upstream::UpstreamNode;
use crate::version;

/// How often the commit thread re-checks the upstream tip once it believes
/// it is caught up. Real deployments additionally react to the upstream's
/// `tip` push event; this interval is the fallback poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct Lifecycle {
    store: Store,
    registry: ServiceRegistry,
    events: EventBus,
    upstream: Arc<dyn UpstreamNode>,
    poll_interval: Duration,
    stopping: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new(
        store: Store,
        registry: ServiceRegistry,
        events: EventBus,
        upstream: Arc<dyn UpstreamNode>,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            upstream,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A cooperative stop handle callers can hold *before* calling `run`,
    /// since `run` does not return until shutdown completes. Flipping it
    /// lets the current block (or reorg step) finish before the driver
    /// loop and then the service registry wind down.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    /// Runs the full startup sequence (version check, tip load, service
    /// start) and then drives the Sync Driver until the stop handle is set
    /// or a fatal error occurs. The caller maps `Ok(())` to exit 0,
    /// `Err(e)` where `e.is_fatal()` to exit -1, and any stop-path error
    /// to exit 1.
    pub async fn run(&self) -> Result<()> {
        version::check_version(&self.store)?;
        self.load_tip().await?;
        self.registry.start_all().await?;

        let applier = BlockApplier::new(&self.store, &self.registry, &self.events);
        let mut driver = SyncDriver::new(&self.store, Arc::clone(&self.upstream))
            .with_stop_handle(Arc::clone(&self.stopping));

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = driver.run_to_tip(&applier).await {
                error!(error = %e, "sync driver stopped with a fatal error");
                self.registry.stop_all().await.ok();
                return Err(e);
            }
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!("sync driver drained, stopping services");
        self.registry.stop_all().await?;
        Ok(())
    }

    /// Tip load: connects genesis if the database has never committed a
    /// block; otherwise confirms the upstream still knows the stored tip,
    /// retrying 3x at 60s apart before giving up.
    async fn load_tip(&self) -> Result<()> {
        if tip::read(&self.store, Cursor::Serial)?.is_some() {
            return self.confirm_tip_known_to_upstream().await;
        }

        info!("no local tip, connecting genesis");
        let genesis = self.fetch_genesis().await?;
        let applier = BlockApplier::new(&self.store, &self.registry, &self.events);
        applier.apply(&genesis, Direction::Connect).await?;
        Ok(())
    }

    async fn fetch_genesis(&self) -> Result<Block> {
        match self.upstream.block_at_height(0).await? {
            Some(block) => Ok(block),
            None => Err(IndexError::UpstreamLost {
                attempts: 1,
                reason: "upstream has no genesis block".to_string(),
            }),
        }
    }

    /// Confirms the stored tip (and, separately, the stored concurrent tip)
    /// are still known to the upstream. A persistently missing tip means the
    /// upstream has pruned or rolled back past our stored state — fatal,
    /// with a reindex instruction, rather than guessing a recovery path.
    async fn confirm_tip_known_to_upstream(&self) -> Result<()> {
        for cursor in [Cursor::Serial, Cursor::Concurrent] {
            let Some(record) = tip::read(&self.store, cursor)? else {
                continue;
            };
            self.confirm_record_known(record, crate::sync::DEFAULT_MAX_RETRIES, crate::sync::DEFAULT_RETRY_DELAY)
                .await?;
        }
        Ok(())
    }

    async fn confirm_record_known(
        &self,
        record: TipRecord,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.upstream.block_by_hash(&record.hash).await {
                Ok(Some(_)) => return Ok(()),
                Ok(None) | Err(_) => {
                    attempts += 1;
                    if attempts >= max_retries {
                        return Err(IndexError::UpstreamLost {
                            attempts,
                            reason: format!(
                                "upstream no longer knows stored tip {} at height {} — reindex required",
                                hex::encode(record.hash),
                                record.height
                            ),
                        });
                    }
                    if !retry_delay.is_zero() {
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
        }
    }

    pub fn assign_prefix(&self, service_name: &str) -> Result<[u8; 2]> {
        schema::assign_prefix(&self.store, service_name)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn close(self) {
        self.store.close();
    }
}
