use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

pub const MAX_NICKNAME_LEN: usize = 24;

/// Read-only quiz snapshot handed over by the authoring side
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub settings: QuizSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub options: Vec<QuizOption>,
    pub time_limit_seconds: u32,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    #[serde(default = "default_true")]
    pub show_leaderboard: bool,
    #[serde(default = "default_true")]
    pub show_correct_answer: bool,
    /// Falls back to the engine default when absent
    #[serde(default)]
    pub max_session_duration_minutes: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            show_leaderboard: true,
            show_correct_answer: true,
            max_session_duration_minutes: None,
        }
    }
}

/// Upper bound for a quiz's own session duration: one day
pub const MAX_SESSION_DURATION_MINUTES: u64 = 24 * 60;

impl Quiz {
    /// Checks that the quiz can be played live
    pub fn validate(&self) -> Result<()> {
        if self.questions.is_empty() {
            return Err(QuizError::validation(format!(
                "quiz {} has no questions",
                self.id
            )));
        }
        if let Some(minutes) = self.settings.max_session_duration_minutes {
            if minutes == 0 || minutes > MAX_SESSION_DURATION_MINUTES {
                return Err(QuizError::validation(format!(
                    "quiz {}: maxSessionDurationMinutes must be between 1 and {MAX_SESSION_DURATION_MINUTES}",
                    self.id
                )));
            }
        }
        for (index, question) in self.questions.iter().enumerate() {
            question
                .validate()
                .map_err(|reason| QuizError::validation(format!("question {index}: {reason}")))?;
        }
        Ok(())
    }
}

impl Question {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.time_limit_seconds == 0 {
            return Err("time limit must be positive".to_string());
        }
        if self.options.len() < 2 {
            return Err("at least two options are required".to_string());
        }
        let correct = self.correct_options().len();
        if correct == 0 {
            return Err("no option is marked correct".to_string());
        }
        if self.kind == QuestionKind::TrueFalse && (self.options.len() != 2 || correct != 1) {
            return Err("true/false questions need two options, one correct".to_string());
        }
        Ok(())
    }

    /// Indices of the options flagged correct, ascending
    pub fn correct_options(&self) -> Vec<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, option)| option.is_correct)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_single_answer(&self) -> bool {
        self.kind == QuestionKind::TrueFalse || self.correct_options().len() == 1
    }

    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_seconds) * 1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Ended,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub quiz_id: String,
    pub quiz: Arc<Quiz>,
    pub game_pin: String,
    pub status: SessionStatus,
    /// `None` until the teacher starts the quiz
    pub current_question_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub participants: Vec<ParticipantState>,
    participant_index: HashMap<String, usize>,
    next_join_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    pub participant_id: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub join_seq: u64,
    pub total_score: u64,
    pub answers: Vec<AnswerRecord>,
}

/// One accepted answer; never mutated once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_index: usize,
    pub selected_options: Vec<usize>,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub response_latency_ms: u64,
    pub answered_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, quiz: Arc<Quiz>, game_pin: String, created_by: String) -> Self {
        Self {
            id,
            quiz_id: quiz.id.clone(),
            quiz,
            game_pin,
            status: SessionStatus::Waiting,
            current_question_index: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            created_by,
            participants: Vec::new(),
            participant_index: HashMap::new(),
            next_join_seq: 0,
        }
    }

    /// Wire form of the question index, -1 before start
    pub fn wire_question_index(&self) -> i64 {
        self.current_question_index.map_or(-1, |i| i as i64)
    }

    pub fn question_count(&self) -> usize {
        self.quiz.questions.len()
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.quiz.questions.get(index)
    }

    pub fn nickname_taken(&self, nickname: &str) -> bool {
        let wanted = nickname.to_lowercase();
        self.participants
            .iter()
            .any(|p| p.nickname.to_lowercase() == wanted)
    }

    pub fn participant(&self, participant_id: &str) -> Option<&ParticipantState> {
        self.participant_index
            .get(participant_id)
            .map(|&i| &self.participants[i])
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut ParticipantState> {
        match self.participant_index.get(participant_id) {
            Some(&i) => Some(&mut self.participants[i]),
            None => None,
        }
    }

    /// Registers a participant whose nickname has already been checked
    pub fn add_participant(
        &mut self,
        participant_id: String,
        nickname: String,
        user_id: Option<String>,
    ) -> &ParticipantState {
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.participants.push(ParticipantState {
            participant_id: participant_id.clone(),
            nickname,
            user_id,
            joined_at: Utc::now(),
            join_seq: seq,
            total_score: 0,
            answers: Vec::new(),
        });
        let index = self.participants.len() - 1;
        self.participant_index.insert(participant_id, index);
        &self.participants[index]
    }

    pub fn answered_count(&self, question_index: usize) -> usize {
        self.participants
            .iter()
            .filter(|p| p.answer_for(question_index).is_some())
            .count()
    }
}

impl ParticipantState {
    pub fn answer_for(&self, question_index: usize) -> Option<&AnswerRecord> {
        self.answers
            .iter()
            .find(|a| a.question_index == question_index)
    }

    /// Appends the record unless one already exists for that question.
    /// Returns false when the record was a duplicate.
    pub fn record_answer(&mut self, record: AnswerRecord) -> bool {
        if self.answer_for(record.question_index).is_some() {
            return false;
        }
        self.total_score += u64::from(record.points_awarded);
        self.answers.push(record);
        true
    }
}

/// Trims and checks a nickname before it reaches the session
pub fn normalize_nickname(raw: &str) -> Result<String> {
    let nickname = raw.trim();
    if nickname.is_empty() {
        return Err(QuizError::validation("nickname must not be empty"));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(QuizError::validation(format!(
            "nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(nickname.to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn option(text: &str, is_correct: bool) -> QuizOption {
        QuizOption {
            text: text.to_string(),
            is_correct,
        }
    }

    pub fn multiple_choice(text: &str, correct: &[usize], seconds: u32, points: u32) -> Question {
        Question {
            text: text.to_string(),
            kind: QuestionKind::MultipleChoice,
            options: (0..4)
                .map(|i| option(&format!("option {i}"), correct.contains(&i)))
                .collect(),
            time_limit_seconds: seconds,
            points,
        }
    }

    pub fn true_false(text: &str, answer: bool) -> Question {
        Question {
            text: text.to_string(),
            kind: QuestionKind::TrueFalse,
            options: vec![option("True", answer), option("False", !answer)],
            time_limit_seconds: 20,
            points: 10,
        }
    }

    pub fn quiz(questions: Vec<Question>) -> Quiz {
        Quiz {
            id: "quiz-1".to_string(),
            title: "Fixture".to_string(),
            questions,
            settings: QuizSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_quiz_without_questions_is_rejected() {
        let err = quiz(vec![]).validate().unwrap_err();
        assert!(matches!(err, QuizError::Validation(_)));
    }

    #[test]
    fn test_question_needs_a_correct_option() {
        let err = quiz(vec![multiple_choice("q", &[], 30, 10)])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("no option is marked correct"));
    }

    #[test]
    fn test_true_false_shape() {
        assert!(quiz(vec![true_false("sky is blue", true)]).validate().is_ok());

        let mut broken = true_false("sky is blue", true);
        broken.options[1].is_correct = true;
        assert!(quiz(vec![broken]).validate().is_err());
    }

    #[test]
    fn test_single_answer_detection() {
        assert!(multiple_choice("q", &[2], 30, 10).is_single_answer());
        assert!(!multiple_choice("q", &[0, 2], 30, 10).is_single_answer());
        assert!(true_false("q", false).is_single_answer());
    }

    #[test]
    fn test_nickname_uniqueness_is_case_insensitive() {
        let mut session = Session::new(
            "s1".to_string(),
            Arc::new(quiz(vec![true_false("q", true)])),
            "123456".to_string(),
            "teacher".to_string(),
        );
        session.add_participant("p1".to_string(), "Alice".to_string(), None);
        assert!(session.nickname_taken("alice"));
        assert!(session.nickname_taken("ALICE"));
        assert!(!session.nickname_taken("Bob"));
    }

    #[test]
    fn test_join_sequence_increases() {
        let mut session = Session::new(
            "s1".to_string(),
            Arc::new(quiz(vec![true_false("q", true)])),
            "123456".to_string(),
            "teacher".to_string(),
        );
        let first = session
            .add_participant("p1".to_string(), "A".to_string(), None)
            .join_seq;
        let second = session
            .add_participant("p2".to_string(), "B".to_string(), None)
            .join_seq;
        assert!(second > first);
        assert_eq!(session.wire_question_index(), -1);
    }

    #[test]
    fn test_record_answer_is_at_most_once() {
        let mut participant = ParticipantState {
            participant_id: "p1".to_string(),
            nickname: "Alice".to_string(),
            user_id: None,
            joined_at: Utc::now(),
            join_seq: 0,
            total_score: 0,
            answers: vec![],
        };
        let record = AnswerRecord {
            question_index: 0,
            selected_options: vec![1],
            is_correct: true,
            points_awarded: 8,
            response_latency_ms: 1200,
            answered_at: Utc::now(),
        };
        assert!(participant.record_answer(record.clone()));
        assert!(!participant.record_answer(AnswerRecord {
            points_awarded: 10,
            ..record
        }));
        assert_eq!(participant.total_score, 8);
        assert_eq!(participant.answers.len(), 1);
    }

    #[test]
    fn test_normalize_nickname() {
        assert_eq!(normalize_nickname("  Alice ").unwrap(), "Alice");
        assert!(normalize_nickname("   ").is_err());
        assert!(normalize_nickname(&"x".repeat(MAX_NICKNAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_quiz_deserializes_from_authoring_json() {
        let json = r#"{
            "id": "geo",
            "title": "Geography",
            "questions": [{
                "text": "Capital of France?",
                "type": "multiple-choice",
                "options": [{"text": "Paris", "isCorrect": true}, {"text": "Rome"}],
                "timeLimitSeconds": 30,
                "points": 10
            }],
            "settings": {"showLeaderboard": false, "maxSessionDurationMinutes": 45}
        }"#;
        let quiz: Quiz = serde_json::from_str(json).unwrap();
        assert_eq!(quiz.questions[0].kind, QuestionKind::MultipleChoice);
        assert!(!quiz.settings.show_leaderboard);
        assert!(quiz.settings.show_correct_answer);
        assert_eq!(quiz.settings.max_session_duration_minutes, Some(45));
        assert!(quiz.validate().is_ok());
    }

    #[test]
    fn test_validate_bounds_session_duration() {
        let mut quiz = quiz(vec![true_false("q", true)]);
        for bad in [0, MAX_SESSION_DURATION_MINUTES + 1, u64::MAX / 10] {
            quiz.settings.max_session_duration_minutes = Some(bad);
            assert!(matches!(quiz.validate(), Err(QuizError::Validation(_))));
        }
        quiz.settings.max_session_duration_minutes = Some(MAX_SESSION_DURATION_MINUTES);
        assert!(quiz.validate().is_ok());
    }
}
