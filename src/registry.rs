/// Service Registry: the dynamically assembled, dependency-ordered list of
/// indexer plugins. Each plugin may contribute a serial `block_handler`
/// and/or a parallel `concurrent_block_handler`; the registry's only job is
/// validating the declared dependency graph, topologically sorting it, and
/// driving `start`/`stop` in (reverse) order.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::{IndexError, Result};
use crate::model::{BatchOp, Block, Direction};

/// The indexer plugin contract. `start`/`stop` and `dependencies`
/// are compile-time requirements of implementing this trait at all; the
/// registry only needs to validate that declared dependency *names* resolve
/// to other registered services.
#[async_trait]
pub trait Indexer: Send + Sync {
    fn name(&self) -> &str;
    fn dependencies(&self) -> &[String];

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Serial handler: may read other serial indexers' per-block state
    /// (ordering is handler-author responsibility, enforced by the Block
    /// Applier calling handlers in declared order).
    async fn block_handler(&self, _block: &Block, _direction: Direction) -> Result<Vec<BatchOp>> {
        Ok(Vec::new())
    }

    /// Concurrent handler: must be independent of every other handler
    /// running in the same fan-out. Returning ops here races with every
    /// other concurrent handler in the same block.
    async fn concurrent_block_handler(
        &self,
        _block: &Block,
        _direction: Direction,
    ) -> Result<Vec<BatchOp>> {
        Ok(Vec::new())
    }

    /// Whether this plugin implements a non-trivial serial handler; used to
    /// skip calling handlers that are pure no-ops.
    fn has_block_handler(&self) -> bool {
        false
    }

    fn has_concurrent_handler(&self) -> bool {
        false
    }
}

pub struct ServiceRegistry {
    /// Dependency order: earlier entries have no dependency on later ones.
    ordered: Vec<Arc<dyn Indexer>>,
}

impl ServiceRegistry {
    /// Validates the dependency graph and topologically sorts `services`.
    pub fn build(services: Vec<Arc<dyn Indexer>>) -> Result<Self> {
        let names: HashSet<&str> = services.iter().map(|s| s.name()).collect();
        if names.len() != services.len() {
            return Err(IndexError::ServiceContract(
                "duplicate service names registered".to_string(),
            ));
        }

        for svc in &services {
            for dep in svc.dependencies() {
                if !names.contains(dep.as_str()) {
                    return Err(IndexError::ServiceContract(format!(
                        "service '{}' declares unknown dependency '{}'",
                        svc.name(),
                        dep
                    )));
                }
            }
        }

        let ordered = topo_sort(&services)?;
        Ok(Self { ordered })
    }

    pub fn services(&self) -> &[Arc<dyn Indexer>] {
        &self.ordered
    }

    pub async fn start_all(&self) -> Result<()> {
        for svc in &self.ordered {
            debug!(service = svc.name(), "starting service");
            svc.start().await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<()> {
        for svc in self.ordered.iter().rev() {
            info!(service = svc.name(), "stopping service");
            if let Err(e) = svc.stop().await {
                tracing::error!(service = svc.name(), error = %e, "service failed to stop cleanly");
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm: dependencies come before dependents in the output.
fn topo_sort(services: &[Arc<dyn Indexer>]) -> Result<Vec<Arc<dyn Indexer>>> {
    let by_name: HashMap<&str, &Arc<dyn Indexer>> =
        services.iter().map(|s| (s.name(), s)).collect();

    let mut in_degree: HashMap<&str, usize> =
        services.iter().map(|s| (s.name(), 0)).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for svc in services {
        for dep in svc.dependencies() {
            *in_degree.get_mut(svc.name()).unwrap() += 1;
            dependents.entry(dep.as_str()).or_default().push(svc.name());
        }
    }

    // Deterministic order for equal-degree roots.
    let mut roots: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();
    roots.sort_unstable();
    let mut queue: VecDeque<&str> = roots.into();

    let mut ordered = Vec::with_capacity(services.len());
    while let Some(name) = queue.pop_front() {
        ordered.push((*by_name[name]).clone());
        if let Some(children) = dependents.get(name) {
            let mut newly_free = Vec::new();
            for child in children {
                let deg = in_degree.get_mut(child).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    newly_free.push(*child);
                }
            }
            newly_free.sort_unstable();
            for child in newly_free {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() != services.len() {
        let remaining: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        return Err(IndexError::DependencyCycle(remaining));
    }

    Ok(ordered)
}
