//! Periodic incremental scans on a fixed interval.
//!
//! Each tick runs [`IngestionRunner::try_run_incremental_scan`] on the
//! blocking pool. A tick that finds another pass still running is dropped,
//! and ticks missed while a long pass runs are skipped rather than replayed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::ingest::{CheckpointStore, IngestionRunner, ScanReport, ScanRoot};

pub struct Poller<S> {
    runner: Arc<IngestionRunner<S>>,
    roots: Arc<Vec<ScanRoot>>,
    interval: Option<Duration>,
    task: Option<JoinHandle<()>>,
    reports: Arc<watch::Sender<Option<Arc<ScanReport>>>>,
}

impl<S> Poller<S>
where
    S: CheckpointStore + Send + Sync + 'static,
{
    /// A stopped poller over `roots`. Call [`Poller::start`] from within a
    /// tokio runtime to begin ticking.
    pub fn new(runner: Arc<IngestionRunner<S>>, roots: Vec<ScanRoot>) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            runner,
            roots: Arc::new(roots),
            interval: None,
            task: None,
            reports: Arc::new(reports),
        }
    }

    /// Start ticking every `interval`. `None` or a zero duration leaves
    /// polling disabled. Restarts the schedule if already running.
    pub fn start(&mut self, interval: Option<Duration>) {
        self.stop();

        let interval = match interval.filter(|d| !d.is_zero()) {
            Some(d) => d,
            None => {
                log::info!("Polling disabled");
                return;
            }
        };

        log::info!(
            "Polling {} root(s) every {}s",
            self.roots.len(),
            interval.as_secs_f64()
        );

        let runner = self.runner.clone();
        let roots = self.roots.clone();
        let reports = self.reports.clone();
        self.interval = Some(interval);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Some(report) = run_tick(runner.clone(), roots.clone()).await {
                    reports.send_replace(Some(Arc::new(report)));
                }
            }
        }));
    }

    /// Apply a new interval. Takes effect from now; no pass is lost or doubled.
    pub fn reconfigure(&mut self, interval: Option<Duration>) {
        log::debug!("Reconfiguring poller: {:?} -> {:?}", self.interval, interval);
        self.start(interval);
    }

    /// Cancel future ticks. A pass already running finishes on its own.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Poller stopped");
        }
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Receives the report of every completed tick
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ScanReport>>> {
        self.reports.subscribe()
    }
}

impl<S> Drop for Poller<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// One poll tick. Returns `None` when a pass was already in progress.
pub async fn run_tick<S>(runner: Arc<IngestionRunner<S>>, roots: Arc<Vec<ScanRoot>>) -> Option<ScanReport>
where
    S: CheckpointStore + Send + Sync + 'static,
{
    match tokio::task::spawn_blocking(move || runner.try_run_incremental_scan(&roots)).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("Poll tick failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::db_writer::tests::{session_count, setup_test_store};
    use crate::ingest::SqliteStore;
    use std::fs;
    use tempfile::TempDir;

    const LINE: &str = "2025-11-27 08:42:21.000|1.0|Debug|application|profileStatus: 'Profileid: 5eac, Ip: 74.1.2.3, Location: RezervBase, Sid: US-NYC01G001_1, shortId: ABC123'\n";

    fn poller(logs: &TempDir) -> (Poller<SqliteStore>, TempDir) {
        let (store, db_dir) = setup_test_store();
        let runner = Arc::new(IngestionRunner::new(store));
        (Poller::new(runner, vec![ScanRoot::new(logs.path(), "Log Root")]), db_dir)
    }

    #[tokio::test]
    async fn test_disabled_interval_does_not_start() {
        let logs = TempDir::new().unwrap();
        let (mut poller, _db_dir) = poller(&logs);

        poller.start(None);
        assert!(!poller.is_running());

        poller.start(Some(Duration::ZERO));
        assert!(!poller.is_running());
        assert_eq!(poller.interval(), None);
    }

    #[tokio::test]
    async fn test_tick_ingests_new_and_grown_files() {
        let logs = TempDir::new().unwrap();
        let path = logs.path().join("application.log");
        fs::write(&path, LINE).unwrap();

        let (mut poller, _db_dir) = poller(&logs);
        let mut reports = poller.subscribe();
        poller.start(Some(Duration::from_millis(50)));
        assert!(poller.is_running());

        time::timeout(Duration::from_secs(10), reports.changed())
            .await
            .unwrap()
            .unwrap();
        let first = reports.borrow_and_update().clone().unwrap();
        assert_eq!(first.files_ingested(), 1);
        assert_eq!(session_count(poller.runner.store()), 1);

        fs::write(&path, format!("{LINE}{LINE}")).unwrap();
        let store_grew = time::timeout(Duration::from_secs(10), async {
            loop {
                reports.changed().await.unwrap();
                if session_count(poller.runner.store()) == 2 {
                    break;
                }
            }
        })
        .await;
        assert!(store_grew.is_ok());

        poller.stop();
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_reconfigure_replaces_schedule() {
        let logs = TempDir::new().unwrap();
        let (mut poller, _db_dir) = poller(&logs);

        poller.start(Some(Duration::from_secs(300)));
        assert_eq!(poller.interval(), Some(Duration::from_secs(300)));

        poller.reconfigure(Some(Duration::from_secs(60)));
        assert!(poller.is_running());
        assert_eq!(poller.interval(), Some(Duration::from_secs(60)));

        poller.reconfigure(None);
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_run_tick_returns_report() {
        let logs = TempDir::new().unwrap();
        fs::write(logs.path().join("application_000.log"), LINE).unwrap();
        let (poller, _db_dir) = poller(&logs);

        let report = run_tick(poller.runner.clone(), poller.roots.clone()).await.unwrap();
        assert_eq!(report.records_inserted(), 1);
    }
}
