use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::ParticipantState;

const PODIUM_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: usize,
    /// Empty in redacted boards
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub participant_id: String,
    pub nickname: String,
    pub total_score: u64,
    pub joined_at: DateTime<Utc>,
    #[serde(skip)]
    join_seq: u64,
}

/// The single canonical ranking of a session.
///
/// Always computed by the server; `authoritative` is serialized so clients
/// can tell it apart from any local estimate they might show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
    authoritative: bool,
}

impl Leaderboard {
    pub fn compute<'a, I>(participants: I) -> Self
    where
        I: IntoIterator<Item = &'a ParticipantState>,
    {
        let mut entries: Vec<LeaderboardEntry> = participants
            .into_iter()
            .map(|p| LeaderboardEntry {
                rank: 0,
                participant_id: p.participant_id.clone(),
                nickname: p.nickname.clone(),
                total_score: p.total_score,
                joined_at: p.joined_at,
                join_seq: p.join_seq,
            })
            .collect();

        entries.sort_by(standing_order);
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = position + 1;
        }

        Self {
            entries,
            authoritative: true,
        }
    }

    /// Same ranking without participant ids, for boards sent to players
    pub fn redacted(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|entry| LeaderboardEntry {
                    participant_id: String::new(),
                    ..entry.clone()
                })
                .collect(),
            authoritative: self.authoritative,
        }
    }

    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    pub fn podium(&self) -> &[LeaderboardEntry] {
        &self.entries[..self.entries.len().min(PODIUM_SIZE)]
    }

    pub fn rank_of(&self, participant_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.participant_id == participant_id)
            .map(|e| e.rank)
    }

    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Higher score first, then earlier join time, then join order
fn standing_order(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.total_score
        .cmp(&a.total_score)
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.join_seq.cmp(&b.join_seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn participant(id: &str, score: u64, joined_offset_secs: i64, seq: u64) -> ParticipantState {
        let base = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ParticipantState {
            participant_id: id.to_string(),
            nickname: id.to_uppercase(),
            user_id: None,
            joined_at: base + Duration::seconds(joined_offset_secs),
            join_seq: seq,
            total_score: score,
            answers: vec![],
        }
    }

    fn ids(board: &Leaderboard) -> Vec<&str> {
        board
            .entries()
            .iter()
            .map(|e| e.participant_id.as_str())
            .collect()
    }

    #[test]
    fn test_higher_score_ranks_first() {
        let players = vec![
            participant("a", 10, 0, 0),
            participant("b", 30, 1, 1),
            participant("c", 20, 2, 2),
        ];
        let board = Leaderboard::compute(&players);
        assert_eq!(ids(&board), vec!["b", "c", "a"]);
        assert_eq!(board.rank_of("b"), Some(1));
        assert_eq!(board.rank_of("a"), Some(3));
    }

    #[test]
    fn test_ties_go_to_earlier_joiner() {
        let players = vec![
            participant("late", 50, 20, 1),
            participant("early", 50, 5, 0),
        ];
        let board = Leaderboard::compute(&players);
        assert_eq!(ids(&board), vec!["early", "late"]);
    }

    #[test]
    fn test_identical_join_times_fall_back_to_join_order() {
        let players = vec![participant("second", 5, 0, 1), participant("first", 5, 0, 0)];
        let board = Leaderboard::compute(&players);
        assert_eq!(ids(&board), vec!["first", "second"]);
    }

    #[test]
    fn test_repeated_computation_is_identical() {
        let players: Vec<_> = (0..12)
            .map(|i| participant(&format!("p{i}"), (i % 3) as u64 * 10, i as i64 % 4, i as u64))
            .collect();
        let first = Leaderboard::compute(&players);
        for _ in 0..5 {
            assert_eq!(Leaderboard::compute(&players), first);
        }
    }

    #[test]
    fn test_podium_is_a_prefix_of_the_full_list() {
        let players: Vec<_> = (0..5)
            .map(|i| participant(&format!("p{i}"), i as u64, 0, i as u64))
            .collect();
        let board = Leaderboard::compute(&players);
        assert_eq!(board.podium(), &board.entries()[..3]);

        let small = Leaderboard::compute(&players[..2]);
        assert_eq!(small.podium().len(), 2);
        assert!(Leaderboard::compute(&Vec::<ParticipantState>::new()).podium().is_empty());
    }

    #[test]
    fn test_serialized_as_authoritative() {
        let board = Leaderboard::compute(&[participant("a", 1, 0, 0)]);
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["authoritative"], true);
        assert_eq!(json["entries"][0]["rank"], 1);
        assert_eq!(json["entries"][0]["totalScore"], 1);
        assert_eq!(json["entries"][0]["participantId"], "a");
    }

    #[test]
    fn test_redacted_board_keeps_ranking_without_ids() {
        let players = vec![participant("a", 10, 0, 0), participant("b", 30, 1, 1)];
        let board = Leaderboard::compute(&players);
        let redacted = board.redacted();

        assert_eq!(redacted.len(), 2);
        assert_eq!(redacted.entries()[0].nickname, "B");
        assert_eq!(redacted.entries()[0].rank, 1);
        assert_eq!(redacted.entries()[1].total_score, 10);
        assert_eq!(redacted.rank_of("b"), None);

        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("participantId"));
        assert!(json.contains("\"nickname\":\"A\""));
    }
}
