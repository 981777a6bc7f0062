//! Application state shared by every handler.
//!
//! [`Pipeline::start`] wires the queues, spawns the approval workers and the
//! welcome worker, and hands back one value the transport keeps for the
//! lifetime of the process.

use crate::approval::ApprovalPool;
use crate::broadcast::BroadcastController;
use crate::queue::WorkQueue;
use crate::welcome::WelcomeWorker;
use autoaccept_core::{BotClient, JoinRequest, PipelineSettings, StorageError, Store};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Queue figures for `/rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepths {
    /// Join requests waiting for a worker.
    pub join_queue: usize,
    /// Greetings waiting to be sent.
    pub welcome_queue: usize,
    /// Approval workers running.
    pub workers: usize,
    /// Approval calls allowed in flight.
    pub approve_concurrency: usize,
}

/// The running join-request pipeline plus the broadcast controller.
pub struct Pipeline {
    store: Arc<Store>,
    approvals: Arc<ApprovalPool>,
    welcome: Arc<WelcomeWorker>,
    broadcasts: Arc<BroadcastController>,
    workers: usize,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Build every component and spawn the workers.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(
        settings: &PipelineSettings,
        client: Arc<dyn BotClient>,
        store: Arc<Store>,
    ) -> Self {
        let settings = settings.clone().normalized();
        let token = CancellationToken::new();
        let welcomes = Arc::new(WorkQueue::new());

        let approvals = Arc::new(ApprovalPool::new(
            client.clone(),
            store.clone(),
            welcomes.clone(),
            &settings,
        ));
        let welcome = Arc::new(WelcomeWorker::new(client.clone(), welcomes, &settings));
        let broadcasts = Arc::new(BroadcastController::new(client, store.clone(), &settings));

        let mut tasks = approvals.spawn_workers(settings.workers, &token);
        tasks.push(welcome.spawn(&token));
        info!(
            workers = settings.workers,
            concurrency = settings.approve_concurrency,
            "Pipeline started"
        );

        Self {
            store,
            approvals,
            welcome,
            broadcasts,
            workers: settings.workers,
            token,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queue a join request. Returns `false` if its channel is not allow-listed.
    pub async fn submit_join_request(&self, request: JoinRequest) -> bool {
        self.approvals.submit(request).await
    }

    /// Current queue figures.
    #[must_use]
    pub fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            join_queue: self.approvals.queue_len(),
            welcome_queue: self.welcome.queue_len(),
            workers: self.workers,
            approve_concurrency: self.approvals.concurrency(),
        }
    }

    /// Shared store.
    #[must_use]
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Broadcast controller.
    #[must_use]
    pub const fn broadcasts(&self) -> &Arc<BroadcastController> {
        &self.broadcasts
    }

    /// Stop the workers, cancel running broadcasts and write everything to
    /// disk.
    ///
    /// Queued items are discarded. Each cancelled broadcast still stores its
    /// report before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub async fn shutdown(&self) -> Result<(), StorageError> {
        self.token.cancel();
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        self.broadcasts.shutdown().await;
        info!("Pipeline stopped, flushing store");
        self.store.flush().await
    }
}
