//! One actor task per live session.
//!
//! The actor owns the `Session`, its room and its question timer. Every
//! mutation, timer expiries included, arrives as a `SessionCommand` on a
//! single channel and is applied in order, so concurrent connections never
//! interleave changes to the same session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use super::broadcast::{Audience, Connection, Room};
use super::leaderboard::Leaderboard;
use super::model::{normalize_nickname, AnswerRecord, Session, SessionStatus};
use super::scoring::ScoringEngine;
use super::server::SessionDirectory;
use super::signaling::{
    AnswerResult, EndReason, OptionTally, OwnStanding, ParticipantInfo, PhaseKind,
    QuestionView, ServerMessage, SessionSnapshot,
};
use super::timer::{QuestionTimer, TimerEvent, TimerKind};
use crate::error::{QuizError, Result};
use crate::store::{SessionSummary, SummaryQueue};

type Reply<T> = oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub enum SessionCommand {
    Join {
        nickname: String,
        user_id: Option<String>,
        connection: Option<Connection>,
        reply: Reply<JoinOutcome>,
    },
    AttachTeacher {
        teacher_id: Option<String>,
        connection: Option<Connection>,
        reply: Reply<TeacherView>,
    },
    Rejoin {
        participant_id: String,
        rejoin_token: String,
        connection: Connection,
        reply: Reply<SessionSnapshot>,
    },
    Detach {
        connection_id: String,
    },
    Start {
        reply: Reply<()>,
    },
    Answer {
        participant_id: String,
        question_index: usize,
        selected_options: Vec<usize>,
        reply: Reply<AnswerReceipt>,
    },
    CloseQuestion {
        reply: Reply<()>,
    },
    Advance {
        reply: Reply<AdvanceOutcome>,
    },
    End {
        reason: EndReason,
        reply: Reply<Leaderboard>,
    },
    Snapshot {
        audience: Audience,
        reply: Reply<SessionSnapshot>,
    },
    Timer(TimerEvent),
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub session_id: String,
    pub participant_id: String,
    /// Secret handed only to the joining connection; required to reconnect
    pub rejoin_token: String,
    pub status: SessionStatus,
    pub current_question_index: i64,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Clone)]
pub struct TeacherView {
    pub session_id: String,
    pub status: SessionStatus,
    pub participant_count: usize,
    pub current_question_index: i64,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReceipt {
    pub question_index: usize,
    pub is_correct: bool,
    pub points: u32,
    pub total_score: u64,
    /// True when an earlier answer was already on record
    pub duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Question(usize),
    Ended(Leaderboard),
}

/// Cheap, cloneable address of a session actor
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: String,
    pub game_pin: String,
    pub created_at: Instant,
    pub max_duration: Duration,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

fn ended_error() -> QuizError {
    QuizError::invalid_state("session has ended")
}

impl SessionHandle {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.max_duration
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).map_err(|_| ended_error())?;
        // A dropped reply means the actor stopped before reaching the command
        response.await.map_err(|_| ended_error())?
    }

    pub async fn join(
        &self,
        nickname: String,
        user_id: Option<String>,
        connection: Option<Connection>,
    ) -> Result<JoinOutcome> {
        self.request(|reply| SessionCommand::Join {
            nickname,
            user_id,
            connection,
            reply,
        })
        .await
    }

    pub async fn attach_teacher(
        &self,
        teacher_id: Option<String>,
        connection: Option<Connection>,
    ) -> Result<TeacherView> {
        self.request(|reply| SessionCommand::AttachTeacher {
            teacher_id,
            connection,
            reply,
        })
        .await
    }

    pub async fn rejoin(
        &self,
        participant_id: String,
        rejoin_token: String,
        connection: Connection,
    ) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Rejoin {
            participant_id,
            rejoin_token,
            connection,
            reply,
        })
        .await
    }

    pub fn detach(&self, connection_id: String) {
        let _ = self.commands.send(SessionCommand::Detach { connection_id });
    }

    pub async fn start(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Start { reply }).await
    }

    pub async fn answer(
        &self,
        participant_id: String,
        question_index: usize,
        selected_options: Vec<usize>,
    ) -> Result<AnswerReceipt> {
        self.request(|reply| SessionCommand::Answer {
            participant_id,
            question_index,
            selected_options,
            reply,
        })
        .await
    }

    pub async fn close_question(&self) -> Result<()> {
        self.request(|reply| SessionCommand::CloseQuestion { reply })
            .await
    }

    pub async fn advance(&self) -> Result<AdvanceOutcome> {
        self.request(|reply| SessionCommand::Advance { reply }).await
    }

    pub async fn end(&self, reason: EndReason) -> Result<Leaderboard> {
        self.request(|reply| SessionCommand::End { reason, reply })
            .await
    }

    pub async fn snapshot(&self, audience: Audience) -> Result<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { audience, reply })
            .await
    }
}

/// Shared services every session actor needs
#[derive(Clone)]
pub(crate) struct ActorContext {
    pub directory: Arc<SessionDirectory>,
    pub summaries: SummaryQueue,
    pub scoring: ScoringEngine,
    pub results_countdown: Duration,
}

/// Question sub-phase while the session is active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuestionPhase {
    Idle,
    Open {
        index: usize,
        opened_at: Instant,
        deadline: Instant,
    },
    Results {
        index: usize,
    },
    Finished,
}

pub(crate) struct SessionActor {
    session: Session,
    phase: QuestionPhase,
    timer: QuestionTimer,
    room: Room,
    /// participant id -> rejoin token
    rejoin_tokens: HashMap<String, String>,
    ctx: ActorContext,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionActor {
    pub(crate) fn spawn(session: Session, max_duration: Duration, ctx: ActorContext) -> SessionHandle {
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            id: session.id.clone(),
            game_pin: session.game_pin.clone(),
            created_at: Instant::now(),
            max_duration,
            commands: commands.clone(),
        };

        let actor = SessionActor {
            session,
            phase: QuestionPhase::Idle,
            timer: QuestionTimer::new(),
            room: Room::new(),
            rejoin_tokens: HashMap::new(),
            ctx,
            commands,
        };
        tokio::spawn(actor.run(receiver));

        handle
    }

    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<SessionCommand>) {
        tracing::info!(
            session_id = %self.session.id,
            game_pin = %self.session.game_pin,
            quiz_id = %self.session.quiz_id,
            "Session actor started"
        );

        while let Some(command) = receiver.recv().await {
            self.handle(command).await;
            if self.session.status == SessionStatus::Ended {
                break;
            }
        }

        self.timer.cancel();
        tracing::info!(session_id = %self.session.id, "Session actor stopped");
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join {
                nickname,
                user_id,
                connection,
                reply,
            } => {
                let _ = reply.send(self.join(nickname, user_id, connection));
            }
            SessionCommand::AttachTeacher {
                teacher_id,
                connection,
                reply,
            } => {
                let _ = reply.send(self.attach_teacher(teacher_id.as_deref(), connection));
            }
            SessionCommand::Rejoin {
                participant_id,
                rejoin_token,
                connection,
                reply,
            } => {
                let _ = reply.send(self.rejoin(&participant_id, &rejoin_token, connection));
            }
            SessionCommand::Detach { connection_id } => {
                let removed = self.room.detach(&connection_id);
                tracing::debug!(
                    session_id = %self.session.id,
                    connection_id = %connection_id,
                    removed,
                    "Connection detached from session"
                );
            }
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.start());
            }
            SessionCommand::Answer {
                participant_id,
                question_index,
                selected_options,
                reply,
            } => {
                let _ = reply.send(self.submit_answer(&participant_id, question_index, selected_options));
            }
            SessionCommand::CloseQuestion { reply } => {
                let _ = reply.send(self.close_question());
            }
            SessionCommand::Advance { reply } => {
                let result = self.advance().await;
                let _ = reply.send(result);
            }
            SessionCommand::End { reason, reply } => {
                let result = self.end(reason).await;
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { audience, reply } => {
                let _ = reply.send(self.snapshot(&audience));
            }
            SessionCommand::Timer(event) => self.on_timer(event).await,
        }
    }

    fn ensure_not_ended(&self) -> Result<()> {
        if self.session.status == SessionStatus::Ended {
            return Err(ended_error());
        }
        Ok(())
    }

    fn participant_info(&self, participant_id: &str) -> Option<ParticipantInfo> {
        self.session.participant(participant_id).map(|p| ParticipantInfo {
            participant_id: p.participant_id.clone(),
            nickname: p.nickname.clone(),
            total_score: p.total_score,
        })
    }

    fn participant_list(&self) -> Vec<ParticipantInfo> {
        self.session
            .participants
            .iter()
            .map(|p| ParticipantInfo {
                participant_id: p.participant_id.clone(),
                nickname: p.nickname.clone(),
                total_score: p.total_score,
            })
            .collect()
    }

    fn join(
        &mut self,
        nickname: String,
        user_id: Option<String>,
        connection: Option<Connection>,
    ) -> Result<JoinOutcome> {
        self.ensure_not_ended()?;
        let nickname = normalize_nickname(&nickname)?;
        if self.session.nickname_taken(&nickname) {
            return Err(QuizError::invalid_state(format!(
                "nickname {nickname} is already taken in this session"
            )));
        }

        let participant_id = Uuid::new_v4().to_string();
        let rejoin_token = Uuid::new_v4().simple().to_string();
        self.session
            .add_participant(participant_id.clone(), nickname.clone(), user_id);
        self.rejoin_tokens
            .insert(participant_id.clone(), rejoin_token.clone());

        let participant_count = self.session.participants.len();
        if let Some(participant) = self.participant_info(&participant_id) {
            self.room.to_teachers(ServerMessage::ParticipantJoined {
                participant,
                participant_count,
            });
        }

        let outcome = JoinOutcome {
            session_id: self.session.id.clone(),
            participant_id: participant_id.clone(),
            rejoin_token,
            status: self.session.status,
            current_question_index: self.session.wire_question_index(),
            snapshot: self.snapshot(&Audience::Participant(participant_id.clone()))?,
        };

        if let Some(connection) = connection {
            connection.send(ServerMessage::Joined {
                session_id: outcome.session_id.clone(),
                participant_id: participant_id.clone(),
                rejoin_token: outcome.rejoin_token.clone(),
                status: outcome.status,
                current_question_index: outcome.current_question_index,
                snapshot: outcome.snapshot.clone(),
            });
            self.room.attach_participant(&participant_id, connection);
        }

        tracing::info!(
            session_id = %self.session.id,
            participant_id = %participant_id,
            nickname = %nickname,
            participant_count,
            "Participant joined session"
        );
        Ok(outcome)
    }

    fn attach_teacher(
        &mut self,
        teacher_id: Option<&str>,
        connection: Option<Connection>,
    ) -> Result<TeacherView> {
        self.ensure_not_ended()?;
        if teacher_id.is_some_and(|id| id != self.session.created_by) {
            return Err(QuizError::invalid_state("not the session host"));
        }
        let view = TeacherView {
            session_id: self.session.id.clone(),
            status: self.session.status,
            participant_count: self.session.participants.len(),
            current_question_index: self.session.wire_question_index(),
            participants: self.participant_list(),
        };

        if let Some(connection) = connection {
            connection.send(ServerMessage::TeacherJoined {
                session_id: view.session_id.clone(),
                status: view.status,
                participant_count: view.participant_count,
                current_question_index: view.current_question_index,
                participants: view.participants.clone(),
            });
            tracing::info!(
                session_id = %self.session.id,
                connection_id = %connection.id,
                "Teacher attached to session"
            );
            self.room.attach_teacher(connection);
        }
        Ok(view)
    }

    fn rejoin(
        &mut self,
        participant_id: &str,
        rejoin_token: &str,
        connection: Connection,
    ) -> Result<SessionSnapshot> {
        self.ensure_not_ended()?;
        // Unknown ids and wrong tokens look the same to the caller
        let authorized = self
            .rejoin_tokens
            .get(participant_id)
            .is_some_and(|expected| expected == rejoin_token);
        if !authorized {
            tracing::warn!(
                session_id = %self.session.id,
                connection_id = %connection.id,
                "Rejected rejoin with unknown participant or token"
            );
            return Err(QuizError::validation("rejoin credentials are not valid"));
        }
        let snapshot = self.snapshot(&Audience::Participant(participant_id.to_string()))?;
        connection.send(ServerMessage::Snapshot {
            snapshot: snapshot.clone(),
        });
        self.room.attach_participant(participant_id, connection);
        tracing::info!(
            session_id = %self.session.id,
            participant_id = %participant_id,
            "Participant reconnected"
        );
        Ok(snapshot)
    }

    fn start(&mut self) -> Result<()> {
        if self.session.status != SessionStatus::Waiting {
            return Err(QuizError::invalid_state(format!(
                "session cannot be started while {:?}",
                self.session.status
            )));
        }

        self.session.status = SessionStatus::Active;
        self.session.started_at = Some(Utc::now());
        tracing::info!(
            session_id = %self.session.id,
            participants = self.session.participants.len(),
            "Session started"
        );
        self.open_question(0);
        Ok(())
    }

    /// Callers guarantee `index` is in range and greater than the current one
    fn open_question(&mut self, index: usize) {
        let quiz = Arc::clone(&self.session.quiz);
        let Some(question) = quiz.questions.get(index) else {
            return;
        };

        let opened_at = Instant::now();
        let deadline = opened_at + Duration::from_secs(u64::from(question.time_limit_seconds));
        self.session.current_question_index = Some(index);
        self.phase = QuestionPhase::Open {
            index,
            opened_at,
            deadline,
        };
        self.timer
            .arm(deadline, TimerKind::QuestionDeadline, index, &self.commands);

        let question_data = QuestionView::new(
            question,
            index,
            quiz.questions.len(),
            question.time_limit_ms(),
        );
        let message = if index == 0 {
            ServerMessage::Started {
                question_index: index,
                question_data,
            }
        } else {
            ServerMessage::QuestionAdvanced {
                question_index: index,
                question_data,
            }
        };
        self.room.to_all(message);

        tracing::info!(
            session_id = %self.session.id,
            question_index = index,
            time_limit_secs = question.time_limit_seconds,
            "Question opened"
        );
    }

    fn submit_answer(
        &mut self,
        participant_id: &str,
        question_index: usize,
        selected_options: Vec<usize>,
    ) -> Result<AnswerReceipt> {
        if self.session.status != SessionStatus::Active {
            return Err(QuizError::invalid_state(format!(
                "answers are not accepted while the session is {:?}",
                self.session.status
            )));
        }
        let quiz = Arc::clone(&self.session.quiz);
        let question = quiz
            .questions
            .get(question_index)
            .ok_or_else(|| QuizError::not_found(format!("Question {question_index}")))?;
        let participant = self
            .session
            .participant(participant_id)
            .ok_or_else(|| QuizError::not_found(format!("Participant {participant_id}")))?;

        let (opened_at, deadline) = match self.phase {
            QuestionPhase::Open {
                index,
                opened_at,
                deadline,
            } if index == question_index => (opened_at, deadline),
            _ => {
                return Err(QuizError::invalid_state(format!(
                    "question {question_index} is not open for answers"
                )))
            }
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(QuizError::invalid_state(format!(
                "the deadline for question {question_index} has passed"
            )));
        }

        if let Some(existing) = participant.answer_for(question_index) {
            tracing::debug!(
                session_id = %self.session.id,
                participant_id = %participant_id,
                question_index,
                "Duplicate answer ignored"
            );
            return Ok(AnswerReceipt {
                question_index,
                is_correct: existing.is_correct,
                points: existing.points_awarded,
                total_score: participant.total_score,
                duplicate: true,
            });
        }

        let mut selected = selected_options;
        selected.sort_unstable();
        selected.dedup();
        if selected.is_empty() {
            return Err(QuizError::validation("at least one option must be selected"));
        }
        if let Some(bad) = selected.iter().find(|&&i| i >= question.options.len()) {
            return Err(QuizError::validation(format!(
                "option {bad} does not exist on question {question_index}"
            )));
        }

        let latency_ms = now.saturating_duration_since(opened_at).as_millis() as u64;
        let scoring = self.ctx.scoring;
        let is_correct = scoring.is_correct(question, &selected);
        let points = scoring.award(is_correct, latency_ms, question.time_limit_ms(), question.points);
        let record = AnswerRecord {
            question_index,
            selected_options: selected,
            is_correct,
            points_awarded: points,
            response_latency_ms: latency_ms,
            answered_at: Utc::now(),
        };

        let participant = self
            .session
            .participant_mut(participant_id)
            .ok_or_else(|| QuizError::not_found(format!("Participant {participant_id}")))?;
        participant.record_answer(record);
        let receipt = AnswerReceipt {
            question_index,
            is_correct,
            points,
            total_score: participant.total_score,
            duplicate: false,
        };

        let answered_count = self.session.answered_count(question_index);
        let participant_count = self.session.participants.len();
        self.room.to_participant(
            participant_id,
            ServerMessage::AnswerReceived {
                question_index,
                is_correct,
                points,
                total_score: receipt.total_score,
                duplicate: false,
            },
        );
        self.room.to_teachers(ServerMessage::AnswerSubmitted {
            question_index,
            answered_count,
            participant_count,
        });

        tracing::debug!(
            session_id = %self.session.id,
            participant_id = %participant_id,
            question_index,
            latency_ms,
            is_correct,
            points,
            "Answer recorded"
        );

        // Everyone present now, late joiners included, has answered
        if answered_count == participant_count {
            tracing::info!(
                session_id = %self.session.id,
                question_index,
                "All participants answered, closing question early"
            );
            self.enter_results(question_index);
        }

        Ok(receipt)
    }

    fn close_question(&mut self) -> Result<()> {
        self.ensure_not_ended()?;
        match self.phase {
            QuestionPhase::Open { index, .. } => {
                tracing::info!(session_id = %self.session.id, question_index = index, "Question closed by teacher");
                self.enter_results(index);
                Ok(())
            }
            _ => Err(QuizError::invalid_state("no question is open")),
        }
    }

    fn enter_results(&mut self, index: usize) {
        let quiz = Arc::clone(&self.session.quiz);
        let Some(question) = quiz.questions.get(index) else {
            return;
        };
        self.phase = QuestionPhase::Results { index };

        let correct_options = question.correct_options();
        let distribution = question
            .options
            .iter()
            .enumerate()
            .map(|(option_index, option)| OptionTally {
                option_index,
                text: option.text.clone(),
                count: self
                    .session
                    .participants
                    .iter()
                    .filter_map(|p| p.answer_for(index))
                    .filter(|a| a.selected_options.contains(&option_index))
                    .count(),
                is_correct: option.is_correct,
            })
            .collect();
        let answered_count = self.session.answered_count(index);
        let participant_count = self.session.participants.len();

        self.room.to_teachers(ServerMessage::QuestionResults {
            question_index: index,
            distribution,
            correct_options: correct_options.clone(),
            answered_count,
            participant_count,
        });

        let settings = &quiz.settings;
        let revealed = settings.show_correct_answer.then_some(correct_options);
        let session = &self.session;
        self.room.to_each_participant(|participant_id| {
            let participant = session.participant(participant_id)?;
            Some(ServerMessage::AnswerReveal {
                question_index: index,
                correct_options: revealed.clone(),
                your_answer: participant.answer_for(index).map(|a| AnswerResult {
                    question_index: index,
                    is_correct: a.is_correct,
                    points: a.points_awarded,
                }),
                total_score: participant.total_score,
            })
        });

        if settings.show_leaderboard {
            let leaderboard = Leaderboard::compute(&self.session.participants);
            self.room.to_participants(ServerMessage::Leaderboard {
                question_index: index,
                leaderboard: leaderboard.redacted(),
            });
            self.room.to_teachers(ServerMessage::Leaderboard {
                question_index: index,
                leaderboard,
            });
        }

        let countdown = self.ctx.results_countdown;
        self.room.to_all(ServerMessage::Countdown {
            question_index: index,
            seconds: countdown.as_secs(),
            is_last_question: index + 1 >= quiz.questions.len(),
        });
        self.timer.arm(
            Instant::now() + countdown,
            TimerKind::ResultsCountdown,
            index,
            &self.commands,
        );

        tracing::info!(
            session_id = %self.session.id,
            question_index = index,
            answered_count,
            participant_count,
            "Question results revealed"
        );
    }

    async fn advance(&mut self) -> Result<AdvanceOutcome> {
        self.ensure_not_ended()?;
        let index = match self.phase {
            QuestionPhase::Results { index } => index,
            _ => {
                return Err(QuizError::invalid_state(
                    "cannot advance before the current question's results are shown",
                ))
            }
        };

        let next = index + 1;
        if next >= self.session.question_count() {
            let leaderboard = self.end(EndReason::Completed).await?;
            return Ok(AdvanceOutcome::Ended(leaderboard));
        }

        self.open_question(next);
        Ok(AdvanceOutcome::Question(next))
    }

    async fn end(&mut self, reason: EndReason) -> Result<Leaderboard> {
        self.ensure_not_ended()?;
        self.timer.cancel();

        let ended_at = Utc::now();
        let leaderboard = Leaderboard::compute(&self.session.participants);
        let summary =
            SessionSummary::from_session(&self.session, ended_at, reason, leaderboard.clone());

        self.session.status = SessionStatus::Ended;
        self.session.ended_at = Some(ended_at);
        self.phase = QuestionPhase::Finished;

        self.room.to_participants(ServerMessage::Ended {
            reason,
            leaderboard: leaderboard.redacted(),
        });
        self.room.to_teachers(ServerMessage::Ended {
            reason,
            leaderboard: leaderboard.clone(),
        });
        self.ctx
            .directory
            .retire(&self.session.id, &self.session.game_pin)
            .await;
        self.ctx.summaries.emit(summary);

        tracing::info!(
            session_id = %self.session.id,
            ?reason,
            participants = self.session.participants.len(),
            "Session ended"
        );
        Ok(leaderboard)
    }

    async fn on_timer(&mut self, event: TimerEvent) {
        if !self.timer.is_current(&event) {
            tracing::debug!(
                session_id = %self.session.id,
                ?event,
                current_generation = self.timer.generation(),
                "Stale timer event dropped"
            );
            return;
        }

        match (event.kind, self.phase) {
            (TimerKind::QuestionDeadline, QuestionPhase::Open { index, .. })
                if index == event.question_index =>
            {
                tracing::info!(session_id = %self.session.id, question_index = index, "Question deadline reached");
                self.enter_results(index);
            }
            (TimerKind::ResultsCountdown, QuestionPhase::Results { index })
                if index == event.question_index =>
            {
                if let Err(e) = self.advance().await {
                    tracing::warn!(session_id = %self.session.id, error = %e, "Automatic advance failed");
                }
            }
            (_, phase) => {
                tracing::warn!(
                    session_id = %self.session.id,
                    ?event,
                    ?phase,
                    "Timer event does not match the current phase"
                );
            }
        }
    }

    fn snapshot(&self, audience: &Audience) -> Result<SessionSnapshot> {
        let quiz = &self.session.quiz;
        let count = quiz.questions.len();
        let now = Instant::now();

        let (phase, remaining_ms, question) = match self.phase {
            QuestionPhase::Idle => (PhaseKind::Lobby, None, None),
            QuestionPhase::Open {
                index, deadline, ..
            } => {
                let remaining = deadline.saturating_duration_since(now).as_millis() as u64;
                let view = quiz
                    .questions
                    .get(index)
                    .map(|q| QuestionView::new(q, index, count, remaining));
                (PhaseKind::Open, Some(remaining), view)
            }
            QuestionPhase::Results { index } => {
                let view = quiz
                    .questions
                    .get(index)
                    .map(|q| QuestionView::new(q, index, count, 0));
                (PhaseKind::Results, None, view)
            }
            QuestionPhase::Finished => (PhaseKind::Finished, None, None),
        };

        let is_teacher = *audience == Audience::Teacher;
        let show_board = is_teacher
            || quiz.settings.show_leaderboard
            || self.session.status == SessionStatus::Ended;
        let leaderboard = show_board.then(|| Leaderboard::compute(&self.session.participants));

        let me = match audience {
            Audience::Teacher => None,
            Audience::Participant(participant_id) => {
                let participant = self.session.participant(participant_id).ok_or_else(|| {
                    QuizError::not_found(format!("Participant {participant_id}"))
                })?;
                Some(OwnStanding {
                    participant_id: participant.participant_id.clone(),
                    nickname: participant.nickname.clone(),
                    total_score: participant.total_score,
                    rank: leaderboard
                        .as_ref()
                        .and_then(|board| board.rank_of(participant_id)),
                    current_answer: self.session.current_question_index.and_then(|index| {
                        participant.answer_for(index).map(|a| AnswerResult {
                            question_index: index,
                            is_correct: a.is_correct,
                            points: a.points_awarded,
                        })
                    }),
                })
            }
        };

        Ok(SessionSnapshot {
            session_id: self.session.id.clone(),
            game_pin: self.session.game_pin.clone(),
            quiz_title: quiz.title.clone(),
            status: self.session.status,
            current_question_index: self.session.wire_question_index(),
            question_count: count,
            phase,
            remaining_ms,
            question,
            participant_count: self.session.participants.len(),
            answered_count: if is_teacher {
                self.session
                    .current_question_index
                    .map(|index| self.session.answered_count(index))
            } else {
                None
            },
            participants: is_teacher.then(|| self.participant_list()),
            // Participants never see each other's ids
            leaderboard: if is_teacher {
                leaderboard
            } else {
                leaderboard.map(|board| board.redacted())
            },
            me,
        })
    }
}
