use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};

use crate::error::{QuizError, Result};
use crate::quiz::leaderboard::Leaderboard;
use crate::quiz::model::{ParticipantState, Session};
use crate::quiz::signaling::EndReason;

/// Historical record of one finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub game_pin: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub question_count: usize,
    /// Questions that were opened before the session ended
    pub questions_played: usize,
    pub participants: Vec<ParticipantState>,
    pub leaderboard: Leaderboard,
}

impl SessionSummary {
    pub fn from_session(
        session: &Session,
        ended_at: DateTime<Utc>,
        end_reason: EndReason,
        leaderboard: Leaderboard,
    ) -> Self {
        Self {
            session_id: session.id.clone(),
            quiz_id: session.quiz_id.clone(),
            quiz_title: session.quiz.title.clone(),
            game_pin: session.game_pin.clone(),
            created_by: session.created_by.clone(),
            created_at: session.created_at,
            started_at: session.started_at,
            ended_at,
            end_reason,
            question_count: session.question_count(),
            questions_played: session.current_question_index.map_or(0, |i| i + 1),
            participants: session.participants.clone(),
            leaderboard,
        }
    }
}

/// Where finished sessions go; this engine does not own long-term storage
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn persist(&self, summary: &SessionSummary) -> Result<()>;
}

/// Writes one pretty-printed JSON document per session
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

#[async_trait]
impl SummarySink for JsonFileSink {
    async fn persist(&self, summary: &SessionSummary) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| QuizError::Persistence(format!("{}: {e}", self.dir.display())))?;

        let body = serde_json::to_vec_pretty(summary)?;
        let path = self.path_for(&summary.session_id);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| QuizError::Persistence(format!("{}: {e}", path.display())))?;

        tracing::info!(
            session_id = %summary.session_id,
            path = %path.display(),
            "Session summary written"
        );
        Ok(())
    }
}

/// Keeps summaries in memory; handy for tests and demos
#[derive(Default)]
pub struct MemorySink {
    summaries: RwLock<Vec<SessionSummary>>,
    notify: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn summaries(&self) -> Vec<SessionSummary> {
        self.summaries.read().await.clone()
    }

    /// Waits until at least `count` summaries have been persisted
    pub async fn wait_for(&self, count: usize) -> Vec<SessionSummary> {
        loop {
            let notified = self.notify.notified();
            {
                let summaries = self.summaries.read().await;
                if summaries.len() >= count {
                    return summaries.clone();
                }
            }
            notified.await;
        }
    }
}

#[async_trait]
impl SummarySink for MemorySink {
    async fn persist(&self, summary: &SessionSummary) -> Result<()> {
        self.summaries.write().await.push(summary.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::fixtures::{quiz, true_false};
    use std::sync::Arc;

    fn summary() -> SessionSummary {
        let mut session = Session::new(
            "session-1".to_string(),
            Arc::new(quiz(vec![true_false("q", true)])),
            "123456".to_string(),
            "teacher-1".to_string(),
        );
        session.add_participant("p1".to_string(), "Alice".to_string(), None);
        let leaderboard = Leaderboard::compute(&session.participants);
        SessionSummary::from_session(&session, Utc::now(), EndReason::Host, leaderboard)
    }

    #[test]
    fn test_summary_from_unstarted_session() {
        let summary = summary();
        assert_eq!(summary.questions_played, 0);
        assert_eq!(summary.participants.len(), 1);
        assert_eq!(summary.leaderboard.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_sink_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("summaries"));
        let summary = summary();

        sink.persist(&summary).await.unwrap();

        let raw = tokio::fs::read(sink.path_for("session-1")).await.unwrap();
        let stored: SessionSummary = serde_json::from_slice(&raw).unwrap();
        assert_eq!(stored.session_id, "session-1");
        assert_eq!(stored.end_reason, EndReason::Host);
        assert_eq!(stored.participants[0].nickname, "Alice");
    }

    #[tokio::test]
    async fn test_memory_sink_wait_for() {
        let sink = Arc::new(MemorySink::new());
        let waiter = {
            let sink = sink.clone();
            tokio::spawn(async move { sink.wait_for(1).await })
        };
        sink.persist(&summary()).await.unwrap();
        let stored = waiter.await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}
