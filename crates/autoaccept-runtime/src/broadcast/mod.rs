//! Broadcast sessions
//!
//! Each admin chat walks through `absent → pending → running → absent`.
//! `/broadcast` arms a pending session, the admin's next payload message
//! starts a background task that delivers it to every known user, and
//! `/cancelbroadcast` asks that task to stop at the next user. A pending
//! session cannot be cancelled; it only lapses after the pending TTL.

/// Progress arithmetic and status texts.
pub mod progress;
mod report;

pub use report::{BroadcastReport, BroadcastStatus};

use autoaccept_core::{BotClient, ClientError, MessageRef, PipelineSettings, Store};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// How the payload reaches each user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// Copy without the "forwarded from" header.
    Copy,
    /// Forward with attribution.
    Forward,
}

/// Why a new broadcast could not be armed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmError {
    /// A broadcast is already waiting for its payload.
    #[error("broadcast already pending")]
    AlreadyPending,
    /// A broadcast is already being delivered.
    #[error("broadcast already running")]
    AlreadyRunning,
}

/// Result of `/cancelbroadcast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The running task will stop before the next user.
    Requested,
    /// Cancellation was requested earlier and is still in progress.
    AlreadyRequested,
    /// Nothing is running. A pending session is left as it was.
    NotRunning,
}

/// Externally visible session state of one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session.
    Absent,
    /// Waiting for the payload message.
    Pending(BroadcastMode),
    /// Delivering.
    Running {
        /// Whether `/cancelbroadcast` was issued.
        cancel_requested: bool,
    },
}

enum Session {
    Pending { mode: BroadcastMode, armed_at: Instant },
    Running { token: CancellationToken },
}

#[derive(Default)]
struct Tally {
    processed: usize,
    sent: usize,
    blocked: usize,
}

/// Owns every chat's broadcast session and last report.
pub struct BroadcastController {
    client: Arc<dyn BotClient>,
    store: Arc<Store>,
    sessions: Mutex<HashMap<i64, Session>>,
    reports: RwLock<HashMap<i64, BroadcastReport>>,
    tasks: TaskTracker,
    throttle: Duration,
    pending_ttl: Duration,
}

impl BroadcastController {
    /// Create a controller with no sessions.
    #[must_use]
    pub fn new(client: Arc<dyn BotClient>, store: Arc<Store>, settings: &PipelineSettings) -> Self {
        Self {
            client,
            store,
            sessions: Mutex::new(HashMap::new()),
            reports: RwLock::new(HashMap::new()),
            tasks: TaskTracker::new(),
            throttle: settings.broadcast_throttle(),
            pending_ttl: settings.broadcast_pending_ttl(),
        }
    }

    /// Arm a broadcast in `chat_id`; the next payload message starts it.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] without changing anything if a session is
    /// already pending or running in that chat.
    pub async fn arm(&self, chat_id: i64, mode: BroadcastMode) -> Result<(), ArmError> {
        let mut sessions = self.sessions.lock().await;
        self.expire_pending(&mut sessions, chat_id);
        match sessions.get(&chat_id) {
            Some(Session::Pending { .. }) => Err(ArmError::AlreadyPending),
            Some(Session::Running { .. }) => Err(ArmError::AlreadyRunning),
            None => {
                sessions.insert(
                    chat_id,
                    Session::Pending {
                        mode,
                        armed_at: Instant::now(),
                    },
                );
                debug!(chat_id, ?mode, "Broadcast armed");
                Ok(())
            }
        }
    }

    /// Current session state of `chat_id`.
    pub async fn status(&self, chat_id: i64) -> SessionStatus {
        let mut sessions = self.sessions.lock().await;
        self.expire_pending(&mut sessions, chat_id);
        match sessions.get(&chat_id) {
            None => SessionStatus::Absent,
            Some(Session::Pending { mode, .. }) => SessionStatus::Pending(*mode),
            Some(Session::Running { token }) => SessionStatus::Running {
                cancel_requested: token.is_cancelled(),
            },
        }
    }

    /// Start the pending broadcast of `chat_id` with `payload`.
    ///
    /// Returns `None` when no live pending session exists, in which case the
    /// message is not a broadcast payload, or after [`Self::shutdown`].
    pub async fn start(
        self: &Arc<Self>,
        chat_id: i64,
        payload: MessageRef,
    ) -> Option<JoinHandle<BroadcastReport>> {
        let mut sessions = self.sessions.lock().await;
        if self.tasks.is_closed() {
            return None;
        }
        self.expire_pending(&mut sessions, chat_id);
        let Some(Session::Pending { mode, .. }) = sessions.get(&chat_id) else {
            return None;
        };
        let mode = *mode;
        let token = CancellationToken::new();
        sessions.insert(
            chat_id,
            Session::Running {
                token: token.clone(),
            },
        );
        drop(sessions);

        info!(chat_id, ?mode, "Broadcast starting");
        Some(self.tasks.spawn(Arc::clone(self).run(chat_id, mode, payload, token)))
    }

    /// Ask the broadcast in `chat_id` to stop.
    pub async fn cancel(&self, chat_id: i64) -> CancelOutcome {
        let mut sessions = self.sessions.lock().await;
        self.expire_pending(&mut sessions, chat_id);
        match sessions.get(&chat_id) {
            None | Some(Session::Pending { .. }) => CancelOutcome::NotRunning,
            Some(Session::Running { token }) if token.is_cancelled() => {
                CancelOutcome::AlreadyRequested
            }
            Some(Session::Running { token }) => {
                token.cancel();
                info!(chat_id, "Broadcast cancellation requested");
                CancelOutcome::Requested
            }
        }
    }

    /// Cancel every running broadcast and wait until each has stored its
    /// report. No broadcast starts afterwards.
    pub async fn shutdown(&self) {
        {
            let sessions = self.sessions.lock().await;
            self.tasks.close();
            for (chat_id, session) in sessions.iter() {
                if let Session::Running { token } = session {
                    token.cancel();
                    info!(chat_id = *chat_id, "Broadcast cancelled for shutdown");
                }
            }
        }
        self.tasks.wait().await;
    }

    /// Report of the last finished broadcast in `chat_id`.
    pub async fn last_report(&self, chat_id: i64) -> Option<BroadcastReport> {
        self.reports.read().await.get(&chat_id).cloned()
    }

    fn expire_pending(&self, sessions: &mut HashMap<i64, Session>, chat_id: i64) {
        let expired = matches!(
            sessions.get(&chat_id),
            Some(Session::Pending { armed_at, .. }) if armed_at.elapsed() >= self.pending_ttl
        );
        if expired {
            sessions.remove(&chat_id);
            debug!(chat_id, "Pending broadcast expired");
        }
    }

    async fn run(
        self: Arc<Self>,
        chat_id: i64,
        mode: BroadcastMode,
        payload: MessageRef,
        token: CancellationToken,
    ) -> BroadcastReport {
        let started_at = Utc::now();
        let targets = self.store.user_ids().await;
        let total = targets.len();

        let progress_msg = match self.client.send_text(chat_id, &progress::started_text()).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(chat_id, error = %e, "Could not create broadcast progress message");
                None
            }
        };

        let mut tally = Tally::default();
        let mut status = BroadcastStatus::Completed;
        let mut last_published = None;

        for (offset, user_id) in targets.into_iter().enumerate() {
            if token.is_cancelled() {
                status = BroadcastStatus::Cancelled;
                break;
            }

            self.deliver(mode, user_id, payload, &mut tally).await;

            let index = offset + 1;
            tally.processed = index;
            if let Some(percent) = progress::next_publish(index, total, last_published) {
                last_published = Some(percent);
                if let Some(message) = progress_msg {
                    self.edit_progress(message, &progress::running_text(index, total, percent))
                        .await;
                }
            }
        }

        let report = BroadcastReport {
            status,
            started_at,
            ended_at: Utc::now(),
            total,
            processed: tally.processed,
            sent: tally.sent,
            blocked: tally.blocked,
        };
        self.finish(chat_id, &report, progress_msg).await;
        report
    }

    async fn deliver(&self, mode: BroadcastMode, user_id: i64, payload: MessageRef, tally: &mut Tally) {
        let result = match mode {
            BroadcastMode::Copy => self.client.copy_message(user_id, payload).await,
            BroadcastMode::Forward => self.client.forward_message(user_id, payload).await,
        };

        match result {
            Ok(()) => {
                tally.sent += 1;
                tokio::time::sleep(self.throttle).await;
            }
            Err(ClientError::Blocked) => {
                tally.blocked += 1;
                self.store.remove_user(user_id).await;
                debug!(user_id, "User blocked the bot, removed");
            }
            Err(ClientError::RateLimited(wait)) => {
                // Counts as skipped; the wait still applies to the next user.
                warn!(user_id, wait_secs = wait.as_secs(), "Broadcast rate limited, skipping user");
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                debug!(user_id, error = %e, "Broadcast delivery skipped");
            }
        }
    }

    async fn finish(&self, chat_id: i64, report: &BroadcastReport, progress_msg: Option<MessageRef>) {
        self.reports.write().await.insert(chat_id, report.clone());
        self.store.record_broadcast(report.blocked as u64).await;
        if let Err(e) = self.store.flush().await {
            error!(chat_id, error = %e, "Store flush after broadcast failed");
        }

        if let Some(message) = progress_msg {
            let text = match report.status {
                BroadcastStatus::Completed => progress::completed_text(report),
                BroadcastStatus::Cancelled => progress::cancelled_text(report),
            };
            self.edit_progress(message, &text).await;
        }

        self.sessions.lock().await.remove(&chat_id);
        info!(
            chat_id,
            status = report.status.as_str(),
            total = report.total,
            sent = report.sent,
            blocked = report.blocked,
            "Broadcast finished"
        );
    }

    async fn edit_progress(&self, message: MessageRef, text: &str) {
        if let Err(e) = self.client.edit_text(message, text).await {
            debug!(chat_id = message.chat_id, error = %e, "Progress edit failed");
        }
    }
}
