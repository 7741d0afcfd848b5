use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use uuid::Uuid;

use super::broadcast::{Audience, Connection, Outbox};
use super::server::QuizServer;
use super::signaling::{ClientMessage, ServerMessage};
use crate::error::{QuizError, Result};

/// Per-connection protocol state.
///
/// Remembers which sessions this connection hosts and which participant it
/// speaks for in each session. Failures are reported to this connection only.
pub struct QuizSignalingHandler {
    server: Arc<QuizServer>,
    connection: Connection,
    hosting: HashSet<String>,
    /// session id -> participant id
    bindings: HashMap<String, String>,
}

impl QuizSignalingHandler {
    pub fn new(server: Arc<QuizServer>, outbox: Outbox) -> Self {
        let connection = Connection::new(Uuid::new_v4().to_string(), outbox);
        tracing::debug!(connection_id = %connection.id, "Signaling handler created");
        Self {
            server,
            connection,
            hosting: HashSet::new(),
            bindings: HashMap::new(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection.id
    }

    pub async fn handle_message(&mut self, message: ClientMessage) {
        if let Err(e) = self.dispatch(message).await {
            tracing::debug!(
                connection_id = %self.connection.id,
                error = %e,
                code = e.code(),
                "Request rejected"
            );
            self.connection.send(ServerMessage::error(&e));
        }
    }

    /// Reports a frame that could not be parsed
    pub fn reject_malformed(&self, detail: &str) {
        self.connection.send(ServerMessage::error(&QuizError::validation(format!(
            "malformed message: {detail}"
        ))));
    }

    fn ensure_host(&self, session_id: &str) -> Result<()> {
        if self.hosting.contains(session_id) {
            Ok(())
        } else {
            Err(QuizError::invalid_state("not the session host"))
        }
    }

    fn participant_for(&self, session_id: &str) -> Result<&str> {
        self.bindings
            .get(session_id)
            .map(String::as_str)
            .ok_or_else(|| QuizError::invalid_state("this connection has not joined the session"))
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::CreateSession {
                quiz_id,
                teacher_id,
            } => {
                let created = self.server.create_session(&quiz_id, &teacher_id).await?;
                self.connection.send(ServerMessage::SessionCreated {
                    session_id: created.session_id.clone(),
                    game_pin: created.game_pin.clone(),
                });
                self.server
                    .teacher_join(
                        &created.game_pin,
                        Some(teacher_id.as_str()),
                        Some(self.connection.clone()),
                    )
                    .await?;
                self.hosting.insert(created.session_id);
            }

            ClientMessage::TeacherJoin {
                game_pin,
                teacher_id,
            } => {
                let view = self
                    .server
                    .teacher_join(&game_pin, teacher_id.as_deref(), Some(self.connection.clone()))
                    .await?;
                self.hosting.insert(view.session_id);
            }

            ClientMessage::Join {
                game_pin,
                nickname,
                user_id,
            } => {
                let outcome = self
                    .server
                    .join(&game_pin, &nickname, user_id, Some(self.connection.clone()))
                    .await?;
                self.bindings
                    .insert(outcome.session_id, outcome.participant_id);
            }

            ClientMessage::Rejoin {
                session_id,
                participant_id,
                rejoin_token,
            } => {
                self.server
                    .rejoin(
                        &session_id,
                        &participant_id,
                        &rejoin_token,
                        self.connection.clone(),
                    )
                    .await?;
                self.bindings.insert(session_id, participant_id);
            }

            ClientMessage::Start { session_id } => {
                self.ensure_host(&session_id)?;
                self.server.start(&session_id).await?;
            }

            ClientMessage::Answer {
                session_id,
                question_index,
                selected_options,
            } => {
                let participant_id = self.participant_for(&session_id)?.to_string();
                let receipt = self
                    .server
                    .submit_answer(&session_id, &participant_id, question_index, selected_options)
                    .await?;
                // Fresh answers are acknowledged by the session itself
                if receipt.duplicate {
                    self.connection.send(ServerMessage::AnswerReceived {
                        question_index: receipt.question_index,
                        is_correct: receipt.is_correct,
                        points: receipt.points,
                        total_score: receipt.total_score,
                        duplicate: true,
                    });
                }
            }

            ClientMessage::CloseQuestion { session_id } => {
                self.ensure_host(&session_id)?;
                self.server.close_question(&session_id).await?;
            }

            ClientMessage::NextQuestion { session_id } => {
                self.ensure_host(&session_id)?;
                self.server.advance(&session_id).await?;
            }

            ClientMessage::End { session_id } => {
                self.ensure_host(&session_id)?;
                self.server.end(&session_id).await?;
            }

            ClientMessage::Sync { session_id } => {
                let audience = if self.hosting.contains(&session_id) {
                    Audience::Teacher
                } else {
                    Audience::Participant(self.participant_for(&session_id)?.to_string())
                };
                let snapshot = self.server.snapshot(&session_id, audience).await?;
                self.connection.send(ServerMessage::Snapshot { snapshot });
            }
        }
        Ok(())
    }

    /// Unbinds this connection from every session it touched
    pub async fn cleanup(&mut self) {
        let sessions: HashSet<String> = self
            .hosting
            .drain()
            .chain(self.bindings.drain().map(|(session_id, _)| session_id))
            .collect();

        for session_id in &sessions {
            self.server.detach(session_id, &self.connection.id).await;
        }
        tracing::debug!(
            connection_id = %self.connection.id,
            sessions = sessions.len(),
            "Signaling handler cleaned up"
        );
    }
}
