//! Per-move classification.
//!
//! Two mutually incompatible classification designs exist: thresholds on
//! points lost, and a combined rank / relative-probability scheme.
//! Callers must pick one via [`ClassificationAxis`]; there is no silent
//! default between them.

use serde::{Deserialize, Serialize};

use goban::{AnalysisResult, Player};

/// Which classification scheme is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationAxis {
    /// Thresholds on Black/White-signed points lost (the default design).
    PointsLost,
    /// The milder of a rank-based and a relative-probability category.
    Policy,
}

/// Move quality buckets, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveCategory {
    AiMove,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveCategory {
    pub const ALL: [MoveCategory; 5] = [
        MoveCategory::AiMove,
        MoveCategory::Good,
        MoveCategory::Inaccuracy,
        MoveCategory::Mistake,
        MoveCategory::Blunder,
    ];

    /// Accuracy weight of this category.
    pub fn weight(self) -> f32 {
        match self {
            MoveCategory::AiMove => 1.0,
            MoveCategory::Good => 0.8,
            MoveCategory::Inaccuracy => 0.5,
            MoveCategory::Mistake => 0.2,
            MoveCategory::Blunder => 0.0,
        }
    }
}

/// Game phases by absolute move index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    Opening,
    MiddleGame,
    EndGame,
}

impl GamePhase {
    pub const ALL: [GamePhase; 3] = [
        GamePhase::Opening,
        GamePhase::MiddleGame,
        GamePhase::EndGame,
    ];
}

/// Full per-move record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveStats {
    /// Absolute move index, zero-based.
    pub move_index: usize,
    pub player: Player,
    /// Display coordinate of the played move.
    pub vertex: String,
    pub score_before: f32,
    pub score_after: f32,
    pub winrate_before: f32,
    pub winrate_after: f32,
    pub points_lost: f32,
    pub points_gained: f32,
    /// 1-based rank in the pre-move suggestion list, 0 when absent.
    pub rank: usize,
    pub category: MoveCategory,
    pub phase: GamePhase,
}

/// Points-lost thresholds: the first category whose bound the loss does
/// not exceed.
const POINTS_LOST_BOUNDS: [(MoveCategory, f32); 4] = [
    (MoveCategory::AiMove, 0.2),
    (MoveCategory::Good, 1.0),
    (MoveCategory::Inaccuracy, 2.0),
    (MoveCategory::Mistake, 5.0),
];

pub fn classify_points_lost(points_lost: f32) -> MoveCategory {
    for (category, bound) in POINTS_LOST_BOUNDS {
        if points_lost <= bound {
            return category;
        }
    }
    MoveCategory::Blunder
}

/// Rank-based category: matching the engine's first choice is best,
/// playing something outside the list is worst.
fn classify_rank(rank: usize) -> MoveCategory {
    match rank {
        1 => MoveCategory::AiMove,
        2..=3 => MoveCategory::Good,
        4..=5 => MoveCategory::Inaccuracy,
        6..=10 => MoveCategory::Mistake,
        _ => MoveCategory::Blunder,
    }
}

/// Relative-probability category: the played move's probability as a
/// fraction of the top suggestion's.
fn classify_relative_probability(ratio: f32) -> MoveCategory {
    match ratio {
        r if r >= 0.9 => MoveCategory::AiMove,
        r if r >= 0.5 => MoveCategory::Good,
        r if r >= 0.2 => MoveCategory::Inaccuracy,
        r if r >= 0.05 => MoveCategory::Mistake,
        _ => MoveCategory::Blunder,
    }
}

/// Phase boundaries per board size: `[opening_end, middle_end)`.
fn phase_bounds(board_size: usize) -> (usize, usize) {
    match board_size {
        19 => (50, 150),
        13 => (30, 80),
        _ => (15, 40),
    }
}

pub fn classify_phase(move_index: usize, board_size: usize) -> GamePhase {
    let (opening_end, middle_end) = phase_bounds(board_size);
    if move_index < opening_end {
        GamePhase::Opening
    } else if move_index < middle_end {
        GamePhase::MiddleGame
    } else {
        GamePhase::EndGame
    }
}

/// Build the full stats for one played move from the analyses of the
/// positions before and after it.
pub fn classify_move(
    move_index: usize,
    player: Player,
    vertex: &str,
    before: &AnalysisResult,
    after: &AnalysisResult,
    board_size: usize,
    axis: ClassificationAxis,
) -> MoveStats {
    let sign = player.sign() as f32;
    let points_lost = ((before.score_lead - after.score_lead) * sign).max(0.0);
    let points_gained = ((after.score_lead - before.score_lead) * sign).max(0.0);
    let rank = before.rank_of(vertex);

    let category = match axis {
        ClassificationAxis::PointsLost => classify_points_lost(points_lost),
        ClassificationAxis::Policy => {
            let by_rank = classify_rank(rank);
            let top = before
                .move_suggestions
                .first()
                .map(|s| s.probability)
                .unwrap_or(0.0);
            let played = before
                .move_suggestions
                .iter()
                .find(|s| s.vertex == vertex)
                .map(|s| s.probability)
                .unwrap_or(0.0);
            let ratio = if top > 0.0 { played / top } else { 0.0 };
            let by_probability = classify_relative_probability(ratio);
            by_rank.min(by_probability)
        }
    };

    MoveStats {
        move_index,
        player,
        vertex: vertex.to_string(),
        score_before: before.score_lead,
        score_after: after.score_lead,
        winrate_before: before.win_rate,
        winrate_after: after.win_rate,
        points_lost,
        points_gained,
        rank,
        category,
        phase: classify_phase(move_index, board_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goban::MoveSuggestion;

    fn analysis(score_lead: f32, win_rate: f32, suggestions: &[(&str, f32)]) -> AnalysisResult {
        AnalysisResult {
            move_suggestions: suggestions
                .iter()
                .map(|(v, p)| MoveSuggestion {
                    vertex: v.to_string(),
                    probability: *p,
                })
                .collect(),
            win_rate,
            score_lead,
            current_turn: Player::B,
            ownership: None,
            visits: 1,
        }
    }

    #[test]
    fn test_points_lost_thresholds() {
        assert_eq!(classify_points_lost(0.0), MoveCategory::AiMove);
        assert_eq!(classify_points_lost(0.2), MoveCategory::AiMove);
        assert_eq!(classify_points_lost(0.7), MoveCategory::Good);
        assert_eq!(classify_points_lost(1.5), MoveCategory::Inaccuracy);
        assert_eq!(classify_points_lost(3.0), MoveCategory::Mistake);
        assert_eq!(classify_points_lost(5.1), MoveCategory::Blunder);
    }

    #[test]
    fn test_points_lost_sign_convention() {
        // Black loses 3 points: lead drops from +5 to +2
        let before = analysis(5.0, 0.6, &[]);
        let after = analysis(2.0, 0.5, &[]);
        let stats = classify_move(
            0,
            Player::B,
            "D4",
            &before,
            &after,
            19,
            ClassificationAxis::PointsLost,
        );
        assert!((stats.points_lost - 3.0).abs() < 1e-6);
        assert_eq!(stats.points_gained, 0.0);

        // The same swing is a gain for White
        let stats = classify_move(
            0,
            Player::W,
            "D4",
            &before,
            &after,
            19,
            ClassificationAxis::PointsLost,
        );
        assert_eq!(stats.points_lost, 0.0);
        assert!((stats.points_gained - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_of_played_move() {
        let before = analysis(0.0, 0.5, &[("Q16", 0.5), ("D4", 0.3), ("D16", 0.2)]);
        let after = analysis(0.0, 0.5, &[]);
        let stats = classify_move(
            0,
            Player::B,
            "D4",
            &before,
            &after,
            19,
            ClassificationAxis::PointsLost,
        );
        assert_eq!(stats.rank, 2);

        let stats = classify_move(
            0,
            Player::B,
            "K10",
            &before,
            &after,
            19,
            ClassificationAxis::PointsLost,
        );
        assert_eq!(stats.rank, 0);
    }

    #[test]
    fn test_policy_axis_picks_less_severe() {
        // Played move ranks 6 (mistake by rank) but holds 95% of the top
        // probability (aiMove by ratio): the milder verdict wins
        let suggestions = [
            ("A1", 0.20),
            ("B1", 0.19),
            ("C1", 0.19),
            ("D1", 0.12),
            ("E1", 0.06),
            ("F1", 0.19),
        ];
        let before = analysis(0.0, 0.5, &suggestions);
        let after = analysis(-9.0, 0.4, &[]);
        let stats = classify_move(
            0,
            Player::B,
            "F1",
            &before,
            &after,
            19,
            ClassificationAxis::Policy,
        );
        assert_eq!(stats.category, MoveCategory::AiMove);

        // Points-lost axis on the same move sees a blunder
        let stats = classify_move(
            0,
            Player::B,
            "F1",
            &before,
            &after,
            19,
            ClassificationAxis::PointsLost,
        );
        assert_eq!(stats.category, MoveCategory::Blunder);
    }

    #[test]
    fn test_phase_thresholds_per_board_size() {
        assert_eq!(classify_phase(0, 19), GamePhase::Opening);
        assert_eq!(classify_phase(49, 19), GamePhase::Opening);
        assert_eq!(classify_phase(50, 19), GamePhase::MiddleGame);
        assert_eq!(classify_phase(150, 19), GamePhase::EndGame);

        assert_eq!(classify_phase(29, 13), GamePhase::Opening);
        assert_eq!(classify_phase(79, 13), GamePhase::MiddleGame);
        assert_eq!(classify_phase(80, 13), GamePhase::EndGame);

        assert_eq!(classify_phase(14, 9), GamePhase::Opening);
        assert_eq!(classify_phase(39, 9), GamePhase::MiddleGame);
        assert_eq!(classify_phase(40, 9), GamePhase::EndGame);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&MoveCategory::AiMove).unwrap();
        assert_eq!(json, "\"aiMove\"");
        let json = serde_json::to_string(&GamePhase::MiddleGame).unwrap();
        assert_eq!(json, "\"middleGame\"");
    }
}
