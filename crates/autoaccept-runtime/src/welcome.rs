//! Welcome notification worker
//!
//! Approved users are greeted from a separate queue so a slow or
//! rate-limited greeting never holds up approvals. Delivery is best effort.

use crate::queue::WorkQueue;
use autoaccept_core::{BotClient, ClientError, PipelineSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What happened to one queued greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WelcomeOutcome {
    /// Delivered.
    Sent,
    /// Flood control hit; re-queued at the tail after waiting.
    Requeued(Duration),
    /// Failed for another reason and was discarded.
    Dropped,
}

/// Single consumer of the welcome queue.
pub struct WelcomeWorker {
    client: Arc<dyn BotClient>,
    queue: Arc<WorkQueue<i64>>,
    text: String,
    interval: Duration,
}

impl WelcomeWorker {
    /// Create the worker around an existing queue.
    #[must_use]
    pub fn new(
        client: Arc<dyn BotClient>,
        queue: Arc<WorkQueue<i64>>,
        settings: &PipelineSettings,
    ) -> Self {
        Self {
            client,
            queue,
            text: settings.welcome_text.clone(),
            interval: settings.welcome_interval(),
        }
    }

    /// Greetings waiting to be sent.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Start the worker loop.
    pub fn spawn(self: &Arc<Self>, token: &CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(token.clone()))
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            let user_id = tokio::select! {
                () = token.cancelled() => break,
                user_id = self.queue.pop() => user_id,
            };
            let Some(user_id) = user_id else { break };
            self.process(user_id, &token).await;
        }
        debug!("Welcome worker stopped");
    }

    /// Send one greeting and pace the queue.
    pub async fn process(&self, user_id: i64, token: &CancellationToken) -> WelcomeOutcome {
        let (outcome, pause) = match self.client.send_text(user_id, &self.text).await {
            Ok(_) => (WelcomeOutcome::Sent, self.interval),
            Err(ClientError::RateLimited(wait)) => {
                warn!(user_id, wait_secs = wait.as_secs(), "Welcome rate limited, requeueing");
                (WelcomeOutcome::Requeued(wait), wait)
            }
            Err(e) => {
                debug!(user_id, error = %e, "Welcome not delivered");
                (WelcomeOutcome::Dropped, self.interval)
            }
        };

        tokio::select! {
            () = tokio::time::sleep(pause) => {}
            () = token.cancelled() => {}
        }

        if matches!(outcome, WelcomeOutcome::Requeued(_)) {
            self.queue.push(user_id);
        }
        outcome
    }
}
