use async_trait::async_trait;
use autoaccept_core::{BotClient, ClientError, JoinRequest, MessageRef, PipelineSettings};
use autoaccept_runtime::{WelcomeOutcome, WelcomeWorker, WorkQueue};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Replays scripted results for `send_text`, then succeeds.
#[derive(Default)]
struct ScriptedClient {
    script: Mutex<VecDeque<Result<(), ClientError>>>,
    sent: Mutex<Vec<(i64, String)>>,
}

impl ScriptedClient {
    fn with_script(script: Vec<Result<(), ClientError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            sent: Mutex::default(),
        }
    }
}

#[async_trait]
impl BotClient for ScriptedClient {
    async fn approve_join_request(&self, _request: &JoinRequest) -> Result<(), ClientError> {
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef, ClientError> {
        let next = self.script.lock().await.pop_front().unwrap_or(Ok(()));
        next?;
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: 1,
        })
    }

    async fn edit_text(&self, _message: MessageRef, _text: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn copy_message(&self, _to: i64, _message: MessageRef) -> Result<(), ClientError> {
        Ok(())
    }

    async fn forward_message(&self, _to: i64, _message: MessageRef) -> Result<(), ClientError> {
        Ok(())
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        welcome_interval_ms: 1,
        welcome_text: "hello".to_string(),
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn rate_limited_welcome_goes_back_to_the_tail() {
    let client = Arc::new(ScriptedClient::with_script(vec![Err(
        ClientError::RateLimited(Duration::from_millis(5)),
    )]));
    let queue = Arc::new(WorkQueue::new());
    let worker = WelcomeWorker::new(client.clone(), queue.clone(), &settings());
    let token = CancellationToken::new();

    queue.push(8);
    assert_eq!(
        worker.process(7, &token).await,
        WelcomeOutcome::Requeued(Duration::from_millis(5))
    );
    // 7 was appended behind 8
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop().await, Some(8));
    assert_eq!(queue.pop().await, Some(7));

    assert_eq!(worker.process(7, &token).await, WelcomeOutcome::Sent);
    assert_eq!(*client.sent.lock().await, vec![(7, "hello".to_string())]);
}

#[tokio::test]
async fn failed_welcome_is_dropped() {
    let client = Arc::new(ScriptedClient::with_script(vec![Err(ClientError::Blocked)]));
    let queue = Arc::new(WorkQueue::new());
    let worker = WelcomeWorker::new(client.clone(), queue.clone(), &settings());
    let token = CancellationToken::new();

    assert_eq!(worker.process(7, &token).await, WelcomeOutcome::Dropped);
    assert!(queue.is_empty());
    assert!(client.sent.lock().await.is_empty());
}

#[tokio::test]
async fn worker_keeps_running_after_failures() {
    let client = Arc::new(ScriptedClient::with_script(vec![
        Err(ClientError::Other("chat not found".into())),
        Err(ClientError::RateLimited(Duration::from_millis(5))),
    ]));
    let queue = Arc::new(WorkQueue::new());
    let worker = Arc::new(WelcomeWorker::new(client.clone(), queue.clone(), &settings()));
    let token = CancellationToken::new();
    let handle = worker.spawn(&token);

    queue.push(1);
    queue.push(2);
    queue.push(3);

    let mut delivered = Vec::new();
    for _ in 0..200 {
        delivered = client.sent.lock().await.iter().map(|(id, _)| *id).collect();
        if delivered.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // 1 failed for good, 2 was retried after 3
    assert_eq!(delivered, vec![3, 2]);

    token.cancel();
    assert!(handle.await.is_ok());
}
