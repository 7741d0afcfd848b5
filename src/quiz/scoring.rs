//! Correctness and points for a single answer.
//!
//! Everything here is a pure function of the stored answer fields so that a
//! session summary can be re-scored later without replaying any timers.

use std::collections::BTreeSet;

use super::model::{AnswerRecord, Question};

#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine {
    speed_floor: f64,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SPEED_FLOOR)
    }
}

impl ScoringEngine {
    pub fn new(speed_floor: f64) -> Self {
        Self {
            speed_floor: crate::config::speed_floor(speed_floor),
        }
    }

    /// Order-independent set equality against the correct options
    pub fn is_correct(&self, question: &Question, selected: &[usize]) -> bool {
        if question.is_single_answer() && selected.len() != 1 {
            return false;
        }
        let chosen: BTreeSet<usize> = selected.iter().copied().collect();
        let expected: BTreeSet<usize> = question.correct_options().into_iter().collect();
        chosen == expected
    }

    /// 1.0 at zero latency down to the floor at the time limit
    pub fn speed_factor(&self, latency_ms: u64, time_limit_ms: u64) -> f64 {
        if time_limit_ms == 0 {
            return self.speed_floor;
        }
        let elapsed = (latency_ms as f64 / time_limit_ms as f64).clamp(0.0, 1.0);
        1.0 - (1.0 - self.speed_floor) * elapsed
    }

    pub fn award(&self, is_correct: bool, latency_ms: u64, time_limit_ms: u64, base_points: u32) -> u32 {
        if !is_correct {
            return 0;
        }
        let points = f64::from(base_points) * self.speed_factor(latency_ms, time_limit_ms);
        points.round() as u32
    }

    /// Recomputes the points a stored record should carry
    pub fn audit(&self, record: &AnswerRecord, question: &Question) -> u32 {
        self.award(
            record.is_correct,
            record.response_latency_ms,
            question.time_limit_ms(),
            question.points,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::model::fixtures::{multiple_choice, true_false};
    use chrono::Utc;

    #[test]
    fn test_set_equality_ignores_order() {
        let engine = ScoringEngine::default();
        let question = multiple_choice("pick two", &[1, 3], 30, 10);
        assert!(engine.is_correct(&question, &[3, 1]));
        assert!(engine.is_correct(&question, &[1, 3]));
        assert!(!engine.is_correct(&question, &[1]));
        assert!(!engine.is_correct(&question, &[1, 2, 3]));
    }

    #[test]
    fn test_single_answer_requires_exactly_one() {
        let engine = ScoringEngine::default();
        let question = true_false("water is wet", true);
        assert!(engine.is_correct(&question, &[0]));
        assert!(!engine.is_correct(&question, &[0, 1]));
        assert!(!engine.is_correct(&question, &[1]));
    }

    #[test]
    fn test_speed_factor_bounds() {
        let engine = ScoringEngine::new(0.5);
        assert!((engine.speed_factor(0, 30_000) - 1.0).abs() < 1e-9);
        assert!((engine.speed_factor(30_000, 30_000) - 0.5).abs() < 1e-9);
        assert!((engine.speed_factor(90_000, 30_000) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_speed_factor_is_monotonic() {
        let engine = ScoringEngine::default();
        let mut previous = f64::MAX;
        for latency in (0..=30_000).step_by(500) {
            let factor = engine.speed_factor(latency, 30_000);
            assert!(factor <= previous);
            previous = factor;
        }
    }

    #[test]
    fn test_non_finite_floor_still_rewards_correct_answers() {
        let engine = ScoringEngine::new(f64::NAN);
        assert!((engine.speed_factor(30_000, 30_000) - 0.5).abs() < 1e-9);
        assert!(engine.award(true, 10_000, 30_000, 10) > 0);
    }

    #[test]
    fn test_incorrect_awards_nothing() {
        let engine = ScoringEngine::default();
        assert_eq!(engine.award(false, 0, 30_000, 1000), 0);
        assert_eq!(engine.award(false, 29_000, 30_000, 1000), 0);
    }

    #[test]
    fn test_faster_correct_answer_scores_higher() {
        let engine = ScoringEngine::default();
        let fast = engine.award(true, 5_000, 30_000, 10);
        let slow = engine.award(true, 25_000, 30_000, 10);
        assert_eq!(fast, 9);
        assert_eq!(slow, 6);
        assert!(fast > slow && slow > 0);
    }

    #[test]
    fn test_award_is_deterministic() {
        let engine = ScoringEngine::default();
        let first = engine.award(true, 12_345, 20_000, 1000);
        for _ in 0..10 {
            assert_eq!(engine.award(true, 12_345, 20_000, 1000), first);
        }
    }

    #[test]
    fn test_audit_reproduces_stored_points() {
        let engine = ScoringEngine::default();
        let question = multiple_choice("q", &[0], 20, 1000);
        let points = engine.award(true, 4_200, question.time_limit_ms(), question.points);
        let record = AnswerRecord {
            question_index: 0,
            selected_options: vec![0],
            is_correct: true,
            points_awarded: points,
            response_latency_ms: 4_200,
            answered_at: Utc::now(),
        };
        assert_eq!(engine.audit(&record, &question), record.points_awarded);
    }
}
