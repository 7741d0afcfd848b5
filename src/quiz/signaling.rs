use serde::{Deserialize, Serialize};

use super::leaderboard::Leaderboard;
use super::model::{Question, QuestionKind, SessionStatus};
use crate::error::QuizError;

/// Messages a teacher or participant connection may send
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        quiz_id: String,
        teacher_id: String,
    },

    /// Attach as host. The PIN alone grants host rights unless `teacherId`
    /// is given, in which case it must match the session's creator.
    TeacherJoin {
        game_pin: String,
        #[serde(default)]
        teacher_id: Option<String>,
    },

    Join {
        game_pin: String,
        nickname: String,
        #[serde(default)]
        user_id: Option<String>,
    },

    /// Reconnect as an already joined participant
    Rejoin {
        session_id: String,
        participant_id: String,
        /// Token from the `joined` reply
        rejoin_token: String,
    },

    Start {
        session_id: String,
    },

    Answer {
        session_id: String,
        question_index: usize,
        selected_options: Vec<usize>,
    },

    /// Teacher shortcut straight to the results of the open question
    CloseQuestion {
        session_id: String,
    },

    NextQuestion {
        session_id: String,
    },

    End {
        session_id: String,
    },

    /// Ask for a fresh snapshot after a reconnect or a missed event
    Sync {
        session_id: String,
    },
}

/// Messages pushed by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    SessionCreated {
        session_id: String,
        game_pin: String,
    },

    TeacherJoined {
        session_id: String,
        status: SessionStatus,
        participant_count: usize,
        current_question_index: i64,
        participants: Vec<ParticipantInfo>,
    },

    Joined {
        session_id: String,
        participant_id: String,
        rejoin_token: String,
        status: SessionStatus,
        current_question_index: i64,
        snapshot: SessionSnapshot,
    },

    /// Teacher only
    ParticipantJoined {
        participant: ParticipantInfo,
        participant_count: usize,
    },

    Started {
        question_index: usize,
        question_data: QuestionView,
    },

    QuestionAdvanced {
        question_index: usize,
        question_data: QuestionView,
    },

    /// Sender only
    AnswerReceived {
        question_index: usize,
        is_correct: bool,
        points: u32,
        total_score: u64,
        duplicate: bool,
    },

    /// Teacher only, aggregate count without identities
    AnswerSubmitted {
        question_index: usize,
        answered_count: usize,
        participant_count: usize,
    },

    /// Teacher only
    QuestionResults {
        question_index: usize,
        distribution: Vec<OptionTally>,
        correct_options: Vec<usize>,
        answered_count: usize,
        participant_count: usize,
    },

    /// Each participant receives their own result only
    AnswerReveal {
        question_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct_options: Option<Vec<usize>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        your_answer: Option<AnswerResult>,
        total_score: u64,
    },

    Leaderboard {
        question_index: usize,
        leaderboard: Leaderboard,
    },

    Countdown {
        question_index: usize,
        seconds: u64,
        is_last_question: bool,
    },

    Ended {
        reason: EndReason,
        leaderboard: Leaderboard,
    },

    Snapshot {
        snapshot: SessionSnapshot,
    },

    Error {
        message: String,
        code: String,
        retryable: bool,
    },
}

impl ServerMessage {
    pub fn error(err: &QuizError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
            code: err.code().to_string(),
            retryable: err.is_retryable(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SessionCreated { .. } => "session-created",
            ServerMessage::TeacherJoined { .. } => "teacher-joined",
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::ParticipantJoined { .. } => "participant-joined",
            ServerMessage::Started { .. } => "started",
            ServerMessage::QuestionAdvanced { .. } => "question-advanced",
            ServerMessage::AnswerReceived { .. } => "answer-received",
            ServerMessage::AnswerSubmitted { .. } => "answer-submitted",
            ServerMessage::QuestionResults { .. } => "question-results",
            ServerMessage::AnswerReveal { .. } => "answer-reveal",
            ServerMessage::Leaderboard { .. } => "leaderboard",
            ServerMessage::Countdown { .. } => "countdown",
            ServerMessage::Ended { .. } => "ended",
            ServerMessage::Snapshot { .. } => "snapshot",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Advanced past the last question
    Completed,
    /// Ended by the teacher
    Host,
    /// Force-ended by the duration sweep
    Timeout,
}

/// Question as shown to players: no correctness flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub index: usize,
    pub count: usize,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub options: Vec<String>,
    pub time_limit_seconds: u32,
    pub points: u32,
    /// Projection of the server deadline; clients count down from this
    pub remaining_ms: u64,
}

impl QuestionView {
    pub fn new(question: &Question, index: usize, count: usize, remaining_ms: u64) -> Self {
        Self {
            index,
            count,
            text: question.text.clone(),
            kind: question.kind,
            options: question.options.iter().map(|o| o.text.clone()).collect(),
            time_limit_seconds: question.time_limit_seconds,
            points: question.points,
            remaining_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub option_index: usize,
    pub text: String,
    pub count: usize,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub question_index: usize,
    pub is_correct: bool,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub nickname: String,
    pub total_score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Lobby,
    Open,
    Results,
    Finished,
}

/// The participant's own slice of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnStanding {
    pub participant_id: String,
    pub nickname: String,
    pub total_score: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_answer: Option<AnswerResult>,
}

/// Full current state for one audience; every broadcast can be rebuilt from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub game_pin: String,
    pub quiz_title: String,
    pub status: SessionStatus,
    pub current_question_index: i64,
    pub question_count: usize,
    pub phase: PhaseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    pub participant_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Leaderboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub me: Option<OwnStanding>,
}
