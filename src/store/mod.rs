//! Collaborators at the edge of the engine.
//!
//! - quiz sources hand out read-only quiz snapshots (authoring lives elsewhere)
//! - `summary` defines the session summary and the sinks that persist it
//! - `queue` delivers summaries to a sink without blocking the session

mod queue;
pub mod summary;

pub use queue::SummaryQueue;
pub use summary::{JsonFileSink, MemorySink, SessionSummary, SummarySink};

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{QuizError, Result};
use crate::quiz::model::Quiz;

/// Read-only access to persisted quizzes
#[async_trait]
pub trait QuizSource: Send + Sync {
    /// Returns an owned snapshot; later edits never reach a running session
    async fn load(&self, quiz_id: &str) -> Result<Quiz>;
}

/// Reads `{dir}/{quiz_id}.json`
pub struct FileQuizSource {
    dir: PathBuf,
}

impl FileQuizSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn check_quiz_id(quiz_id: &str) -> Result<()> {
    let valid = !quiz_id.is_empty()
        && quiz_id.len() <= 128
        && quiz_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(QuizError::validation(format!("invalid quiz id {quiz_id:?}")))
    }
}

#[async_trait]
impl QuizSource for FileQuizSource {
    async fn load(&self, quiz_id: &str) -> Result<Quiz> {
        check_quiz_id(quiz_id)?;
        let path = self.dir.join(format!("{quiz_id}.json"));

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QuizError::not_found(format!("Quiz {quiz_id}")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut quiz: Quiz = serde_json::from_slice(&raw)
            .map_err(|e| QuizError::validation(format!("quiz {quiz_id} is malformed: {e}")))?;
        // The file name is the identity
        quiz.id = quiz_id.to_string();

        tracing::debug!(quiz_id = %quiz_id, questions = quiz.questions.len(), "Quiz loaded from disk");
        Ok(quiz)
    }
}

#[derive(Default)]
pub struct InMemoryQuizSource {
    quizzes: RwLock<HashMap<String, Quiz>>,
}

impl InMemoryQuizSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, quiz: Quiz) {
        self.quizzes.write().await.insert(quiz.id.clone(), quiz);
    }
}

#[async_trait]
impl QuizSource for InMemoryQuizSource {
    async fn load(&self, quiz_id: &str) -> Result<Quiz> {
        self.quizzes
            .read()
            .await
            .get(quiz_id)
            .cloned()
            .ok_or_else(|| QuizError::not_found(format!("Quiz {quiz_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::fixtures::{quiz, true_false};

    #[tokio::test]
    async fn test_file_source_loads_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let quiz = quiz(vec![true_false("The earth is round", true)]);
        std::fs::write(
            dir.path().join("earth.json"),
            serde_json::to_vec(&quiz).unwrap(),
        )
        .unwrap();

        let source = FileQuizSource::new(dir.path());
        let loaded = source.load("earth").await.unwrap();
        assert_eq!(loaded.id, "earth");
        assert_eq!(loaded.questions.len(), 1);
    }

    #[tokio::test]
    async fn test_demo_quiz_is_playable() {
        let source = FileQuizSource::new(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/quizzes"));
        let quiz = source.load("sample").await.unwrap();
        assert_eq!(quiz.id, "sample");
        quiz.validate().unwrap();
    }

    #[tokio::test]
    async fn test_file_source_missing_quiz() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileQuizSource::new(dir.path());
        assert!(matches!(
            source.load("nope").await,
            Err(QuizError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_rejects_path_tricks() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileQuizSource::new(dir.path());
        assert!(matches!(
            source.load("../etc/passwd").await,
            Err(QuizError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_file_source_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let source = FileQuizSource::new(dir.path());
        assert!(matches!(
            source.load("bad").await,
            Err(QuizError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_source_returns_copies() {
        let source = InMemoryQuizSource::new();
        source.insert(quiz(vec![true_false("q", true)])).await;

        let mut first = source.load("quiz-1").await.unwrap();
        first.questions.clear();
        let second = source.load("quiz-1").await.unwrap();
        assert_eq!(second.questions.len(), 1);
    }
}
