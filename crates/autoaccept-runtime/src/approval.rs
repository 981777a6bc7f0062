//! Approval worker pool
//!
//! Join requests for allow-listed channels are queued by the transport and
//! drained by a fixed number of workers. A shared semaphore caps how many
//! approval calls are in flight at once, independently of the worker count.

use crate::queue::WorkQueue;
use autoaccept_core::{BotClient, ClientError, JoinRequest, PipelineSettings, Store, UserRecord};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happened to one dequeued request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approved and recorded; a welcome was queued.
    Approved,
    /// Flood control hit; the request went back to the tail after waiting.
    Requeued(Duration),
    /// Permanent failure; the request was discarded.
    Dropped,
}

/// Join-request queue plus the workers that drain it.
pub struct ApprovalPool {
    client: Arc<dyn BotClient>,
    store: Arc<Store>,
    requests: WorkQueue<JoinRequest>,
    welcomes: Arc<WorkQueue<i64>>,
    permits: Semaphore,
    concurrency: usize,
    save_interval: Duration,
}

impl ApprovalPool {
    /// Create the pool. Workers are started with [`ApprovalPool::spawn_workers`].
    #[must_use]
    pub fn new(
        client: Arc<dyn BotClient>,
        store: Arc<Store>,
        welcomes: Arc<WorkQueue<i64>>,
        settings: &PipelineSettings,
    ) -> Self {
        let concurrency = settings.approve_concurrency.max(1);
        Self {
            client,
            store,
            requests: WorkQueue::new(),
            welcomes,
            permits: Semaphore::new(concurrency),
            concurrency,
            save_interval: settings.save_interval(),
        }
    }

    /// Queue a join request if its channel is allow-listed.
    ///
    /// Returns `false` (and touches nothing) for any other channel.
    pub async fn submit(&self, request: JoinRequest) -> bool {
        if !self.store.is_channel_allowed(request.chat_id).await {
            debug!(
                chat_id = request.chat_id,
                user_id = request.requester.id,
                "Ignoring join request for channel outside the allow-list"
            );
            return false;
        }
        self.requests.push(request);
        true
    }

    /// Join requests waiting for a worker.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.requests.len()
    }

    /// Maximum approval calls in flight.
    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start `count` workers that run until `token` is cancelled.
    pub fn spawn_workers(
        self: &Arc<Self>,
        count: usize,
        token: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        info!(workers = count, concurrency = self.concurrency, "Starting approval workers");
        (0..count)
            .map(|worker_id| tokio::spawn(Arc::clone(self).run_worker(worker_id, token.clone())))
            .collect()
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize, token: CancellationToken) {
        loop {
            let request = tokio::select! {
                () = token.cancelled() => break,
                request = self.requests.pop() => request,
            };
            let Some(request) = request else { break };
            self.process(worker_id, request, &token).await;
        }
        debug!(worker_id, "Approval worker stopped");
    }

    /// Handle one request end to end.
    pub async fn process(
        &self,
        worker_id: usize,
        request: JoinRequest,
        token: &CancellationToken,
    ) -> ApprovalOutcome {
        let result = {
            let Ok(_permit) = self.permits.acquire().await else {
                return ApprovalOutcome::Dropped;
            };
            let result = self.client.approve_join_request(&request).await;
            if result.is_ok() {
                self.record(&request).await;
            }
            result
        };

        match result {
            Ok(()) => {
                debug!(
                    worker_id,
                    user_id = request.requester.id,
                    chat_id = request.chat_id,
                    "Join request approved"
                );
                if let Err(e) = self.store.flush_if_due(self.save_interval).await {
                    error!(worker_id, error = %e, "Debounced store flush failed");
                }
                ApprovalOutcome::Approved
            }
            Err(ClientError::RateLimited(wait)) => {
                warn!(worker_id, wait_secs = wait.as_secs(), "Approval rate limited, requeueing");
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = token.cancelled() => {}
                }
                self.requests.push(request);
                ApprovalOutcome::Requeued(wait)
            }
            Err(e) => {
                warn!(
                    worker_id,
                    user_id = request.requester.id,
                    chat_id = request.chat_id,
                    error = %e,
                    "Approval failed, dropping request"
                );
                ApprovalOutcome::Dropped
            }
        }
    }

    async fn record(&self, request: &JoinRequest) {
        let requester = &request.requester;
        self.store
            .record_approval(UserRecord {
                user_id: requester.id,
                username: requester.username.clone(),
                first_name: requester.first_name.clone(),
                channel_id: request.chat_id,
                joined_at: Utc::now(),
            })
            .await;
        self.welcomes.push(requester.id);
    }
}
