use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::broadcast::{Audience, Connection};
use super::leaderboard::Leaderboard;
use super::model::Session;
use super::pin::PinRegistry;
use super::scoring::ScoringEngine;
use super::session::{
    ActorContext, AdvanceOutcome, AnswerReceipt, JoinOutcome, SessionActor, SessionHandle,
    TeacherView,
};
use super::signaling::{EndReason, SessionSnapshot};
use crate::config::EngineConfig;
use crate::error::{QuizError, Result};
use crate::store::{QuizSource, SummaryQueue};

/// Returned to the teacher after a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: String,
    pub game_pin: String,
}

/// Lookup table of live sessions, plus tombstones of recently ended ones.
///
/// Only addressing lives here; session state itself is owned by each
/// session's actor, so this lock is never held across a session operation.
pub struct SessionDirectory {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    ended: RwLock<HashMap<String, Instant>>,
    pins: PinRegistry,
}

impl SessionDirectory {
    pub fn new(pins: PinRegistry) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ended: RwLock::new(HashMap::new()),
            pins,
        }
    }

    async fn insert(&self, handle: SessionHandle) {
        self.sessions.write().await.insert(handle.id.clone(), handle);
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return Ok(handle.clone());
        }
        if self.ended.read().await.contains_key(session_id) {
            return Err(QuizError::invalid_state("session has ended"));
        }
        Err(QuizError::not_found(format!("Session {session_id}")))
    }

    pub async fn by_pin(&self, game_pin: &str) -> Result<SessionHandle> {
        let session_id = self.pins.resolve(game_pin).await?;
        self.get(&session_id).await
    }

    /// Called by a session actor once its session has ended
    pub(crate) async fn retire(&self, session_id: &str, game_pin: &str) {
        self.sessions.write().await.remove(session_id);
        self.ended
            .write()
            .await
            .insert(session_id.to_string(), Instant::now());
        self.pins.release(game_pin).await;
        tracing::debug!(session_id = %session_id, game_pin = %game_pin, "Session retired");
    }

    async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    async fn prune_ended(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut ended = self.ended.write().await;
        let before = ended.len();
        ended.retain(|_, at| now.saturating_duration_since(*at) < retention);
        before - ended.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Entry point for every session operation
pub struct QuizServer {
    directory: Arc<SessionDirectory>,
    quizzes: Arc<dyn QuizSource>,
    summaries: SummaryQueue,
    engine: EngineConfig,
    scoring: ScoringEngine,
}

impl QuizServer {
    pub fn new(quizzes: Arc<dyn QuizSource>, summaries: SummaryQueue, engine: EngineConfig) -> Self {
        let pins = PinRegistry::new(engine.pin_max_attempts);
        Self::with_pins(quizzes, summaries, engine, pins)
    }

    pub fn with_pins(
        quizzes: Arc<dyn QuizSource>,
        summaries: SummaryQueue,
        engine: EngineConfig,
        pins: PinRegistry,
    ) -> Self {
        Self {
            directory: Arc::new(SessionDirectory::new(pins)),
            quizzes,
            summaries,
            scoring: ScoringEngine::new(engine.speed_floor),
            engine,
        }
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub async fn create_session(&self, quiz_id: &str, teacher_id: &str) -> Result<CreatedSession> {
        if teacher_id.trim().is_empty() {
            return Err(QuizError::validation("teacherId must not be empty"));
        }

        let quiz = self.quizzes.load(quiz_id).await?;
        quiz.validate()?;

        let session_id = Uuid::new_v4().to_string();
        let game_pin = self.directory.pins.allocate(&session_id).await?;

        let max_minutes = quiz
            .settings
            .max_session_duration_minutes
            .unwrap_or(self.engine.default_max_session_minutes);
        let max_duration = Duration::from_secs(max_minutes.saturating_mul(60));

        let session = Session::new(
            session_id.clone(),
            Arc::new(quiz),
            game_pin.clone(),
            teacher_id.to_string(),
        );
        let ctx = ActorContext {
            directory: Arc::clone(&self.directory),
            summaries: self.summaries.clone(),
            scoring: self.scoring,
            results_countdown: self.engine.results_countdown,
        };
        let handle = SessionActor::spawn(session, max_duration, ctx);
        self.directory.insert(handle).await;

        tracing::info!(
            session_id = %session_id,
            game_pin = %game_pin,
            quiz_id = %quiz_id,
            teacher_id = %teacher_id,
            "Session created"
        );
        Ok(CreatedSession {
            session_id,
            game_pin,
        })
    }

    pub async fn resolve_pin(&self, game_pin: &str) -> Result<String> {
        Ok(self.directory.by_pin(game_pin).await?.id)
    }

    pub async fn join(
        &self,
        game_pin: &str,
        nickname: &str,
        user_id: Option<String>,
        connection: Option<Connection>,
    ) -> Result<JoinOutcome> {
        let handle = self.directory.by_pin(game_pin).await?;
        handle.join(nickname.to_string(), user_id, connection).await
    }

    /// Attaches a host connection. Knowing the PIN is enough unless a
    /// `teacher_id` is supplied, which must then match the session creator.
    pub async fn teacher_join(
        &self,
        game_pin: &str,
        teacher_id: Option<&str>,
        connection: Option<Connection>,
    ) -> Result<TeacherView> {
        let handle = self.directory.by_pin(game_pin).await?;
        handle
            .attach_teacher(teacher_id.map(str::to_string), connection)
            .await
    }

    pub async fn rejoin(
        &self,
        session_id: &str,
        participant_id: &str,
        rejoin_token: &str,
        connection: Connection,
    ) -> Result<SessionSnapshot> {
        let handle = self.directory.get(session_id).await?;
        handle
            .rejoin(participant_id.to_string(), rejoin_token.to_string(), connection)
            .await
    }

    pub async fn start(&self, session_id: &str) -> Result<()> {
        self.directory.get(session_id).await?.start().await
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        participant_id: &str,
        question_index: usize,
        selected_options: Vec<usize>,
    ) -> Result<AnswerReceipt> {
        let handle = self.directory.get(session_id).await?;
        handle
            .answer(participant_id.to_string(), question_index, selected_options)
            .await
    }

    pub async fn close_question(&self, session_id: &str) -> Result<()> {
        self.directory.get(session_id).await?.close_question().await
    }

    pub async fn advance(&self, session_id: &str) -> Result<AdvanceOutcome> {
        self.directory.get(session_id).await?.advance().await
    }

    pub async fn end(&self, session_id: &str) -> Result<Leaderboard> {
        self.directory
            .get(session_id)
            .await?
            .end(EndReason::Host)
            .await
    }

    pub async fn snapshot(&self, session_id: &str, audience: Audience) -> Result<SessionSnapshot> {
        self.directory.get(session_id).await?.snapshot(audience).await
    }

    /// Unbinds a closed connection; unknown or ended sessions are ignored
    pub async fn detach(&self, session_id: &str, connection_id: &str) {
        if let Ok(handle) = self.directory.get(session_id).await {
            handle.detach(connection_id.to_string());
        }
    }

    /// Force-ends every session older than its maximum duration
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut ended = 0;

        for handle in self.directory.handles().await {
            if !handle.is_expired(now) {
                continue;
            }
            match handle.end(EndReason::Timeout).await {
                Ok(_) => {
                    ended += 1;
                    tracing::warn!(
                        session_id = %handle.id,
                        max_duration_secs = handle.max_duration.as_secs(),
                        "Session exceeded its maximum duration and was ended"
                    );
                }
                Err(e) => {
                    tracing::debug!(session_id = %handle.id, error = %e, "Expired session already ending");
                }
            }
        }

        let pruned = self.directory.prune_ended(self.engine.ended_retention).await;
        if ended > 0 || pruned > 0 {
            tracing::info!(ended, pruned, "Session sweep finished");
        }
        ended
    }

    pub fn start_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.engine.sweep_interval;
        tokio::spawn(async move {
            tracing::info!(interval_secs = period.as_secs(), "Session sweeper started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.sweep_expired().await;
            }
        })
    }

    pub async fn active_sessions(&self) -> usize {
        self.directory.len().await
    }
}
