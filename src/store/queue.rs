use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use super::summary::{SessionSummary, SummarySink};

/// Base delay between delivery attempts of the same summary
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Non-blocking hand-off of finished sessions to the summary sink.
///
/// Ending a session never waits on storage: the summary is queued and a
/// background processor delivers it, retrying failed writes a bounded
/// number of times.
pub struct SummaryQueue {
    sender: mpsc::UnboundedSender<SessionSummary>,
}

impl SummaryQueue {
    /// Creates a new queue with a background processor
    pub fn new(sink: Arc<dyn SummarySink>, retry_count: u32) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::process_summaries(sink, receiver, retry_count));

        Self { sender }
    }

    /// Queues a summary for persistence; returns immediately
    pub fn emit(&self, summary: SessionSummary) {
        tracing::info!(
            session_id = %summary.session_id,
            participants = summary.participants.len(),
            "Queueing session summary"
        );
        if let Err(e) = self.sender.send(summary) {
            tracing::error!(error = %e, "Failed to queue session summary");
        }
    }

    async fn process_summaries(
        sink: Arc<dyn SummarySink>,
        mut receiver: mpsc::UnboundedReceiver<SessionSummary>,
        retry_count: u32,
    ) {
        tracing::info!(retry_count, "Session summary processor started");

        while let Some(summary) = receiver.recv().await {
            Self::deliver(sink.as_ref(), &summary, retry_count).await;
        }

        tracing::info!("Session summary processor stopped");
    }

    async fn deliver(sink: &dyn SummarySink, summary: &SessionSummary, retry_count: u32) {
        let mut attempt = 0;
        loop {
            match sink.persist(summary).await {
                Ok(()) => {
                    tracing::debug!(session_id = %summary.session_id, attempt, "Session summary persisted");
                    return;
                }
                Err(e) if attempt < retry_count => {
                    attempt += 1;
                    tracing::warn!(
                        session_id = %summary.session_id,
                        attempt,
                        error = %e,
                        "Persisting session summary failed, retrying"
                    );
                    sleep(RETRY_DELAY * attempt).await;
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %summary.session_id,
                        error = %e,
                        "Giving up on session summary"
                    );
                    return;
                }
            }
        }
    }
}

impl Clone for SummaryQueue {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{QuizError, Result};
    use crate::quiz::leaderboard::Leaderboard;
    use crate::quiz::model::fixtures::{quiz, true_false};
    use crate::quiz::model::Session;
    use crate::quiz::signaling::EndReason;
    use crate::store::summary::MemorySink;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn summary(id: &str) -> SessionSummary {
        let session = Session::new(
            id.to_string(),
            Arc::new(quiz(vec![true_false("q", true)])),
            "000001".to_string(),
            "teacher".to_string(),
        );
        SessionSummary::from_session(
            &session,
            Utc::now(),
            EndReason::Completed,
            Leaderboard::compute(&session.participants),
        )
    }

    /// Fails the first `failures` writes, then forwards to memory
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        inner: MemorySink,
    }

    #[async_trait]
    impl SummarySink for FlakySink {
        async fn persist(&self, summary: &SessionSummary) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(QuizError::Persistence("disk full".to_string()));
            }
            self.inner.persist(summary).await
        }
    }

    #[tokio::test]
    async fn test_emit_delivers_in_background() {
        let sink = Arc::new(MemorySink::new());
        let queue = SummaryQueue::new(sink.clone(), 0);

        queue.emit(summary("a"));
        queue.emit(summary("b"));

        let stored = sink.wait_for(2).await;
        assert_eq!(stored[0].session_id, "a");
        assert_eq!(stored[1].session_id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_writes_are_retried() {
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: AtomicU32::new(0),
            inner: MemorySink::new(),
        });
        let queue = SummaryQueue::new(sink.clone(), 3);

        queue.emit(summary("retry"));

        let stored = sink.inner.wait_for(1).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_retry_budget() {
        let sink = Arc::new(FlakySink {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            inner: MemorySink::new(),
        });
        let queue = SummaryQueue::new(sink.clone(), 2);

        queue.emit(summary("doomed"));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert!(sink.inner.summaries().await.is_empty());
    }
}
