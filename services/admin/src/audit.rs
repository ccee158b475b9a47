//! Asynchronous operation-log pipeline
//!
//! The gate hands each record to [`AuditSink::emit`], which never blocks
//! the request. Records go into a small bounded queue drained by a fixed
//! set of workers. When that queue is full they go into a larger spill
//! queue that a single forwarder feeds back into the main one. Only when
//! both are full is a one-off helper task spawned to wait for room; at most
//! `helper_limit` helpers run at once and shutdown waits for all of them.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::models::NewOperationLog;
use crate::models::policy::canonical_object;
use crate::repositories::{ApiRepository, OperationLogRepository};

/// Path prefixes that never produce an audit row
pub const SKIP_PREFIXES: [&str; 5] = ["/static/", "/assets/", "/images/", "/favicon.ico", "/swagger/"];

pub fn should_skip(path: &str) -> bool {
    path.is_empty() || SKIP_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Audit pipeline configuration (`audit.*`)
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Main queue size
    pub capacity: usize,
    /// Number of drainer tasks
    pub workers: usize,
    pub spill_capacity: usize,
    /// Concurrent overflow helpers; records beyond that are dropped
    pub helper_limit: usize,
    /// Seconds allowed for draining at shutdown
    pub shutdown_grace: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: 30,
            workers: 3,
            spill_capacity: 1024,
            helper_limit: 16,
            shutdown_grace: 5,
        }
    }
}

/// Producer side, cheap to clone into every request
#[derive(Clone)]
pub struct AuditSink {
    queue: mpsc::Sender<NewOperationLog>,
    spill: mpsc::Sender<NewOperationLog>,
    helper_permits: Arc<Semaphore>,
    helpers: Arc<StdMutex<JoinSet<()>>>,
}

impl AuditSink {
    /// Spawn the workers and the spill forwarder
    pub fn start(
        config: &AuditConfig,
        logs: Arc<dyn OperationLogRepository>,
        apis: Arc<dyn ApiRepository>,
    ) -> (AuditSink, AuditWorkers) {
        let (queue_tx, queue_rx) = mpsc::channel(config.capacity.max(1));
        let (spill_tx, spill_rx) = mpsc::channel(config.spill_capacity.max(1));
        let (stop_workers, workers_stopped) = watch::channel(false);
        let (stop_forwarder, forwarder_stopped) = watch::channel(false);

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(drain_queue(
                    id,
                    queue_rx.clone(),
                    workers_stopped.clone(),
                    logs.clone(),
                    apis.clone(),
                ))
            })
            .collect();
        let forwarder = tokio::spawn(forward_spill(spill_rx, queue_tx.clone(), forwarder_stopped));

        info!(
            "Audit pipeline started: capacity {}, {} workers, spill {}",
            config.capacity, config.workers, config.spill_capacity
        );

        let helpers = Arc::new(StdMutex::new(JoinSet::new()));
        let sink = AuditSink {
            queue: queue_tx,
            spill: spill_tx,
            helper_permits: Arc::new(Semaphore::new(config.helper_limit)),
            helpers: helpers.clone(),
        };
        let handles = AuditWorkers {
            workers,
            forwarder,
            helpers,
            stop_workers,
            stop_forwarder,
        };
        (sink, handles)
    }

    /// Enqueue without waiting
    ///
    /// A record is only dropped, with a warning, when the pipeline is shut
    /// down or both queues are full and every helper is busy.
    pub fn emit(&self, record: NewOperationLog) {
        let record = match self.queue.try_send(record) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(record)) => record,
            Err(mpsc::error::TrySendError::Closed(record)) => {
                warn!("Audit queue closed, dropping record for {}", record.path);
                return;
            }
        };

        let record = match self.spill.try_send(record) {
            Ok(()) => {
                debug!("Audit queue full, record spilled");
                return;
            }
            Err(mpsc::error::TrySendError::Full(record)) => record,
            Err(mpsc::error::TrySendError::Closed(record)) => record,
        };

        let Ok(permit) = self.helper_permits.clone().try_acquire_owned() else {
            warn!(
                "Audit queues full and all helpers busy, dropping record for {}",
                record.path
            );
            return;
        };

        warn!("Audit spill queue full, spawning helper for {}", record.path);
        let queue = self.queue.clone();
        let mut helpers = self.helpers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while helpers.try_join_next().is_some() {}
        helpers.spawn(async move {
            let _permit = permit;
            if queue.send(record).await.is_err() {
                warn!("Audit queue closed before helper could deliver");
            }
        });
    }
}

async fn drain_queue(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<NewOperationLog>>>,
    mut stop: watch::Receiver<bool>,
    logs: Arc<dyn OperationLogRepository>,
    apis: Arc<dyn ApiRepository>,
) {
    let mut stopping = false;
    loop {
        let record = {
            let mut rx = queue.lock().await;
            if stopping || *stop.borrow() {
                rx.try_recv().ok()
            } else {
                tokio::select! {
                    record = rx.recv() => record,
                    changed = stop.changed() => {
                        stopping = changed.is_err() || *stop.borrow();
                        continue;
                    }
                }
            }
        };

        let Some(record) = record else {
            debug!("Audit worker {} exiting", id);
            break;
        };
        persist(record, logs.as_ref(), apis.as_ref()).await;
    }
}

async fn forward_spill(
    mut spill: mpsc::Receiver<NewOperationLog>,
    queue: mpsc::Sender<NewOperationLog>,
    mut stop: watch::Receiver<bool>,
) {
    let mut stopping = false;
    loop {
        let record = if stopping || *stop.borrow() {
            spill.try_recv().ok()
        } else {
            tokio::select! {
                record = spill.recv() => record,
                changed = stop.changed() => {
                    stopping = changed.is_err() || *stop.borrow();
                    continue;
                }
            }
        };

        let Some(record) = record else { break };
        if queue.send(record).await.is_err() {
            warn!("Audit queue closed, spill forwarder exiting");
            break;
        }
    }
}

/// Label the record from the api table when needed, then store it
async fn persist(
    mut record: NewOperationLog,
    logs: &dyn OperationLogRepository,
    apis: &dyn ApiRepository,
) {
    if record.desc.is_empty() {
        match apis
            .find_by_route(&record.method, &canonical_object(&record.path))
            .await
        {
            Ok(Some(api)) => record.desc = api.desc,
            Ok(None) => {}
            Err(e) => warn!("Failed to look up api description: {}", e),
        }
    }

    if let Err(e) = logs.insert(&record).await {
        error!(
            "Failed to persist operation log {} {}: {}",
            record.method, record.path, e
        );
    }
}

/// Consumer side, owned by the process
pub struct AuditWorkers {
    workers: Vec<JoinHandle<()>>,
    forwarder: JoinHandle<()>,
    helpers: Arc<StdMutex<JoinSet<()>>>,
    stop_workers: watch::Sender<bool>,
    stop_forwarder: watch::Sender<bool>,
}

impl AuditWorkers {
    /// Persist everything already queued, giving up after `grace`
    ///
    /// The spill queue is flushed into the main queue first and pending
    /// helpers deliver their records, then the workers empty the main queue
    /// and exit.
    pub async fn drain(self, grace: Duration) {
        let AuditWorkers {
            workers,
            forwarder,
            helpers,
            stop_workers,
            stop_forwarder,
        } = self;

        let finished = tokio::time::timeout(grace, async move {
            let _ = stop_forwarder.send(true);
            if let Err(e) = forwarder.await {
                error!("Audit forwarder panicked: {}", e);
            }
            let mut pending = std::mem::take(
                &mut *helpers.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
            );
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    error!("Audit helper panicked: {}", e);
                }
            }
            let _ = stop_workers.send(true);
            for worker in workers {
                if let Err(e) = worker.await {
                    error!("Audit worker panicked: {}", e);
                }
            }
        })
        .await;

        match finished {
            Ok(()) => info!("Audit pipeline drained"),
            Err(_) => warn!("Audit drain exceeded {:?}, abandoning pending records", grace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewApi, OperationLogQuery};
    use crate::repositories::MemoryStore;
    use chrono::Utc;

    fn record(path: &str, status: i32) -> NewOperationLog {
        NewOperationLog {
            username: "admin".into(),
            ip: "127.0.0.1".into(),
            method: "GET".into(),
            path: path.into(),
            desc: String::new(),
            status,
            start_time: Utc::now(),
            time_cost: 3,
            user_agent: "test".into(),
        }
    }

    #[test]
    fn skip_rules() {
        assert!(should_skip(""));
        assert!(should_skip("/static/app.js"));
        assert!(should_skip("/favicon.ico"));
        assert!(should_skip("/swagger/index.html"));
        assert!(!should_skip("/admin/list"));
        assert!(!should_skip("/base/login"));
    }

    #[tokio::test]
    async fn spilled_records_are_persisted() {
        let store = Arc::new(MemoryStore::new());
        let config = AuditConfig {
            capacity: 2,
            workers: 3,
            spill_capacity: 64,
            helper_limit: 16,
            shutdown_grace: 5,
        };
        let (sink, workers) = AuditSink::start(&config, store.clone(), store.clone());

        for i in 0..50 {
            sink.emit(record(&format!("/r{i}"), 200));
        }
        workers.drain(Duration::from_secs(5)).await;

        let (_, total) = OperationLogRepository::list(store.as_ref(), &OperationLogQuery::default())
            .await
            .unwrap();
        assert_eq!(total, 50);
    }

    #[tokio::test]
    async fn overflow_helpers_are_capped_and_awaited_on_drain() {
        let store = Arc::new(MemoryStore::new());
        let config = AuditConfig {
            capacity: 1,
            workers: 1,
            spill_capacity: 1,
            helper_limit: 2,
            shutdown_grace: 5,
        };
        let (sink, workers) = AuditSink::start(&config, store.clone(), store.clone());

        // Nothing is consumed before the first await: one record per queue,
        // two held by helpers, the rest dropped
        for i in 0..10 {
            sink.emit(record(&format!("/r{i}"), 200));
        }
        workers.drain(Duration::from_secs(5)).await;

        let (logs, total) = OperationLogRepository::list(store.as_ref(), &OperationLogQuery::default())
            .await
            .unwrap();
        assert_eq!(total, 4);
        let mut paths: Vec<&str> = logs.iter().map(|log| log.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["/r0", "/r1", "/r2", "/r3"]);
    }

    #[tokio::test]
    async fn description_comes_from_api_table() {
        let store = Arc::new(MemoryStore::new());
        ApiRepository::create(
            store.as_ref(),
            &NewApi::new("GET", "/admin/list", "admin", "list admins"),
        )
        .await
        .unwrap();
        let (sink, workers) = AuditSink::start(&AuditConfig::default(), store.clone(), store.clone());

        sink.emit(record("/admin/list", 200));
        workers.drain(Duration::from_secs(5)).await;

        let (logs, _) = OperationLogRepository::list(store.as_ref(), &OperationLogQuery::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].desc, "list admins");
        assert_eq!(logs[0].status, 200);
    }
}
