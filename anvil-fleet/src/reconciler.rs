//! Fleet reconciler
//!
//! Probes hosts and writes the observed status back to the host repository.
//! A sweep fans one probe task per host out onto the probe pool and waits for
//! all of them; one host's failure, or even a panicking probe, never affects
//! another host's outcome.

use anvil_core::domain::host::{Host, HostStatus};
use anvil_core::pool::WorkerPool;
use anvil_core::repository::{HostFilter, HostRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ssh::HostProber;

/// Status observed for one host during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutcome {
    pub host_id: String,
    pub status: HostStatus,
}

/// Aggregate outcome of a sweep
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub outcomes: Vec<HostOutcome>,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
}

impl RefreshSummary {
    fn record(&mut self, host_id: String, status: HostStatus) {
        match status {
            HostStatus::Online => self.online += 1,
            HostStatus::Offline => self.offline += 1,
            HostStatus::Error => self.error += 1,
        }
        self.outcomes.push(HostOutcome { host_id, status });
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn status_of(&self, host_id: &str) -> Option<HostStatus> {
        self.outcomes
            .iter()
            .find(|o| o.host_id == host_id)
            .map(|o| o.status)
    }
}

/// Keeps host statuses in line with what probes observe
#[derive(Clone)]
pub struct FleetReconciler {
    hosts: Arc<dyn HostRepository>,
    prober: Arc<dyn HostProber>,
    pool: WorkerPool,
}

impl FleetReconciler {
    pub fn new(
        hosts: Arc<dyn HostRepository>,
        prober: Arc<dyn HostProber>,
        max_parallel_probes: usize,
    ) -> Self {
        Self {
            hosts,
            prober,
            pool: WorkerPool::new("probe", max_parallel_probes),
        }
    }

    /// Probes one host and writes its new status
    pub async fn refresh_one(&self, host: &Host) -> HostStatus {
        let result = self.prober.probe(host).await;
        let status = result.host_status();

        match &result.error {
            None => info!("Host {} ({}) is {}", host.id, host.address, status),
            Some(e) => warn!("Host {} ({}) is {}: {}", host.id, host.address, status, e),
        }

        self.write_status(&host.id, status).await;
        status
    }

    /// Checks one host in the background
    pub fn spawn_refresh_one(&self, host: Host) -> JoinHandle<HostStatus> {
        let reconciler = self.clone();
        self.pool
            .spawn(async move { reconciler.refresh_one(&host).await })
    }

    /// Probes every host concurrently and waits for all of them
    pub async fn refresh_all(&self, hosts: Vec<Host>) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        if hosts.is_empty() {
            debug!("No hosts to refresh");
            return summary;
        }

        info!("Refreshing {} hosts", hosts.len());

        let tasks: Vec<(String, JoinHandle<HostStatus>)> = hosts
            .into_iter()
            .map(|host| (host.id.clone(), self.spawn_refresh_one(host)))
            .collect();

        for (host_id, task) in tasks {
            let status = match task.await {
                Ok(status) => status,
                Err(e) => {
                    error!("Probe task for host {} crashed: {}", host_id, e);
                    self.write_status(&host_id, HostStatus::Error).await;
                    HostStatus::Error
                }
            };
            summary.record(host_id, status);
        }

        info!(
            "Fleet refresh complete: {} online, {} offline, {} error",
            summary.online, summary.offline, summary.error
        );
        summary
    }

    /// Loads the matching hosts and refreshes them
    pub async fn refresh_fleet(&self, filter: &HostFilter) -> RefreshSummary {
        match self.hosts.get_hosts(filter).await {
            Ok(hosts) => self.refresh_all(hosts).await,
            Err(e) => {
                error!("Failed to load hosts: {}", e);
                RefreshSummary::default()
            }
        }
    }

    /// Refreshes the whole fleet every `interval` until `shutdown` fires
    ///
    /// The first sweep runs immediately.
    pub async fn watch(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let everything = HostFilter::all();

        info!("Watching fleet every {:?}", interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.refresh_fleet(&everything) => {}
                    }
                }
            }
        }
        info!("Fleet watch stopped");
    }

    async fn write_status(&self, host_id: &str, status: HostStatus) {
        if let Err(e) = self.hosts.update_host_status(host_id, status).await {
            error!("Failed to record status {} for host {}: {}", status, host_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::ssh::ProbeResult;
    use anvil_core::error::{RepositoryError, RepositoryResult};
    use anvil_core::repository::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    /// Prober double keyed on the host address
    ///
    /// - `down` fails authentication
    /// - `broken` has no usable credentials
    /// - `panic` panics
    /// - anything else is reachable
    #[derive(Default)]
    struct FakeProber {
        barrier: Option<Barrier>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HostProber for FakeProber {
        async fn execute(&self, host: &Host, _command: &str) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            match host.address.as_str() {
                "down" => ProbeResult::failed(ProbeError::Authentication("denied".into())),
                "broken" => ProbeResult::failed(ProbeError::MissingCredential(host.id.clone())),
                "panic" => panic!("probe exploded"),
                _ => ProbeResult::ok("connection test\n".into()),
            }
        }
    }

    fn store_with(hosts: &[(&str, &str)]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, address) in hosts {
            store.insert_host(Host::new(*id, *address, "root")).unwrap();
        }
        store
    }

    fn status(store: &InMemoryStore, id: &str) -> HostStatus {
        store.host(id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_refresh_one_writes_status() {
        let store = store_with(&[("H1", "up"), ("H2", "down"), ("H3", "broken")]);
        let reconciler = FleetReconciler::new(store.clone(), Arc::new(FakeProber::default()), 4);

        for id in ["H1", "H2", "H3"] {
            let host = store.host(id).unwrap().unwrap();
            reconciler.refresh_one(&host).await;
        }

        assert_eq!(status(&store, "H1"), HostStatus::Online);
        assert_eq!(status(&store, "H2"), HostStatus::Offline);
        assert_eq!(status(&store, "H3"), HostStatus::Error);
    }

    #[tokio::test]
    async fn test_refresh_all_isolates_failures() {
        let store = store_with(&[
            ("H1", "up"),
            ("H2", "down"),
            ("H3", "panic"),
            ("H4", "up"),
            ("H5", "broken"),
        ]);
        let prober = Arc::new(FakeProber::default());
        let reconciler = FleetReconciler::new(store.clone(), prober.clone(), 2);

        let summary = reconciler.refresh_fleet(&HostFilter::all()).await;

        assert_eq!(summary.total(), 5);
        assert_eq!(summary.online, 2);
        assert_eq!(summary.offline, 1);
        assert_eq!(summary.error, 2);
        assert_eq!(summary.status_of("H3"), Some(HostStatus::Error));
        assert_eq!(prober.calls.load(Ordering::SeqCst), 5);

        assert_eq!(status(&store, "H1"), HostStatus::Online);
        assert_eq!(status(&store, "H2"), HostStatus::Offline);
        assert_eq!(status(&store, "H3"), HostStatus::Error);
        assert_eq!(status(&store, "H4"), HostStatus::Online);
        assert_eq!(status(&store, "H5"), HostStatus::Error);
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        // Every probe waits for all the others, so a sequential sweep never finishes
        let hosts: Vec<(String, String)> = (0..4).map(|i| (format!("H{}", i), "up".into())).collect();
        let refs: Vec<(&str, &str)> = hosts.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let store = store_with(&refs);
        let prober = Arc::new(FakeProber {
            barrier: Some(Barrier::new(4)),
            ..FakeProber::default()
        });
        let reconciler = FleetReconciler::new(store, prober, 4);

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            reconciler.refresh_fleet(&HostFilter::all()),
        )
        .await
        .unwrap();
        assert_eq!(summary.online, 4);
    }

    #[tokio::test]
    async fn test_refresh_fleet_filter() {
        let store = store_with(&[("H1", "up"), ("H2", "up")]);
        let reconciler = FleetReconciler::new(store.clone(), Arc::new(FakeProber::default()), 2);

        let summary = reconciler.refresh_fleet(&HostFilter::by_id("H2")).await;
        assert_eq!(summary.total(), 1);
        assert_eq!(status(&store, "H1"), HostStatus::Offline);
        assert_eq!(status(&store, "H2"), HostStatus::Online);
    }

    #[tokio::test]
    async fn test_empty_fleet() {
        let store = store_with(&[]);
        let reconciler = FleetReconciler::new(store, Arc::new(FakeProber::default()), 2);
        let summary = reconciler.refresh_all(Vec::new()).await;
        assert_eq!(summary.total(), 0);
    }

    #[tokio::test]
    async fn test_spawn_refresh_one() {
        let store = store_with(&[("H1", "up")]);
        let reconciler = FleetReconciler::new(store.clone(), Arc::new(FakeProber::default()), 1);

        let host = store.host("H1").unwrap().unwrap();
        let observed = reconciler.spawn_refresh_one(host).await.unwrap();
        assert_eq!(observed, HostStatus::Online);
        assert_eq!(status(&store, "H1"), HostStatus::Online);
    }

    struct FailingRepository;

    #[async_trait]
    impl HostRepository for FailingRepository {
        async fn get_hosts(&self, _filter: &HostFilter) -> RepositoryResult<Vec<Host>> {
            Err(RepositoryError::Storage("database unavailable".into()))
        }

        async fn update_host_status(&self, _host_id: &str, _status: HostStatus) -> RepositoryResult<()> {
            Err(RepositoryError::Storage("database unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_repository_failures_do_not_propagate() {
        let reconciler =
            FleetReconciler::new(Arc::new(FailingRepository), Arc::new(FakeProber::default()), 2);

        assert_eq!(reconciler.refresh_fleet(&HostFilter::all()).await.total(), 0);

        let summary = reconciler
            .refresh_all(vec![Host::new("H1", "up", "root"), Host::new("H2", "down", "root")])
            .await;
        assert_eq!(summary.status_of("H1"), Some(HostStatus::Online));
        assert_eq!(summary.status_of("H2"), Some(HostStatus::Offline));
    }

    #[tokio::test]
    async fn test_watch_stops_on_shutdown() {
        let store = store_with(&[("H1", "up")]);
        let prober = Arc::new(FakeProber::default());
        let reconciler = FleetReconciler::new(store.clone(), prober.clone(), 1);
        let shutdown = CancellationToken::new();

        let watcher = {
            let reconciler = reconciler.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { reconciler.watch(Duration::from_millis(20), shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(70)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), watcher)
            .await
            .unwrap()
            .unwrap();

        assert!(prober.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(status(&store, "H1"), HostStatus::Online);
    }
}
