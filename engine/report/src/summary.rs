//! Game-level aggregation over classified moves.

use serde::{Deserialize, Serialize};

use goban::{AnalysisResult, Player};

use crate::classify::{classify_move, ClassificationAxis, GamePhase, MoveCategory, MoveStats};

/// Absolute score swing that marks a turning point.
const TURNING_POINT_SWING: f32 = 5.0;
/// Default number of top mistakes extracted.
const DEFAULT_TOP_MISTAKES: usize = 3;

/// One played move with the analyses surrounding it.
#[derive(Debug, Clone)]
pub struct PlayedMove {
    pub player: Player,
    /// Display coordinate or the pass token.
    pub vertex: String,
    pub before: AnalysisResult,
    pub after: AnalysisResult,
}

/// Per-player aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub move_count: usize,
    /// Weighted accuracy in [0, 100].
    pub accuracy: f32,
    /// Counts indexed like [`MoveCategory::ALL`].
    pub category_counts: [usize; 5],
    /// Category counts per phase, indexed like [`GamePhase::ALL`].
    pub phase_counts: [[usize; 5]; 3],
}

impl PlayerSummary {
    fn from_moves(moves: &[&MoveStats]) -> Self {
        let mut category_counts = [0usize; 5];
        let mut phase_counts = [[0usize; 5]; 3];
        let mut weight_sum = 0.0f32;

        for stats in moves {
            let category = MoveCategory::ALL
                .iter()
                .position(|&c| c == stats.category)
                .unwrap_or(0);
            let phase = GamePhase::ALL
                .iter()
                .position(|&p| p == stats.phase)
                .unwrap_or(0);
            category_counts[category] += 1;
            phase_counts[phase][category] += 1;
            weight_sum += stats.category.weight();
        }

        let accuracy = if moves.is_empty() {
            0.0
        } else {
            weight_sum / moves.len() as f32 * 100.0
        };

        Self {
            move_count: moves.len(),
            accuracy,
            category_counts,
            phase_counts,
        }
    }
}

/// The full game report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameReport {
    pub moves: Vec<MoveStats>,
    pub black: PlayerSummary,
    pub white: PlayerSummary,
    /// Worst moves by points lost, descending.
    pub top_mistakes: Vec<MoveStats>,
    /// Indices of moves whose score swing reaches the turning-point bar.
    pub turning_points: Vec<usize>,
}

/// Classify every move and aggregate the game.
pub fn build_report(
    moves: &[PlayedMove],
    board_size: usize,
    axis: ClassificationAxis,
) -> GameReport {
    build_report_with_top_n(moves, board_size, axis, DEFAULT_TOP_MISTAKES)
}

pub fn build_report_with_top_n(
    moves: &[PlayedMove],
    board_size: usize,
    axis: ClassificationAxis,
    top_n: usize,
) -> GameReport {
    let stats: Vec<MoveStats> = moves
        .iter()
        .enumerate()
        .map(|(index, played)| {
            classify_move(
                index,
                played.player,
                &played.vertex,
                &played.before,
                &played.after,
                board_size,
                axis,
            )
        })
        .collect();

    let black: Vec<&MoveStats> = stats.iter().filter(|s| s.player == Player::B).collect();
    let white: Vec<&MoveStats> = stats.iter().filter(|s| s.player == Player::W).collect();

    let mut ranked: Vec<&MoveStats> = stats.iter().collect();
    ranked.sort_by(|a, b| {
        b.points_lost
            .partial_cmp(&a.points_lost)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let top_mistakes: Vec<MoveStats> = ranked
        .into_iter()
        .take(top_n)
        .filter(|s| s.points_lost > 0.0)
        .cloned()
        .collect();

    let turning_points: Vec<usize> = stats
        .iter()
        .filter(|s| (s.score_after - s.score_before).abs() >= TURNING_POINT_SWING)
        .map(|s| s.move_index)
        .collect();

    GameReport {
        black: PlayerSummary::from_moves(&black),
        white: PlayerSummary::from_moves(&white),
        moves: stats,
        top_mistakes,
        turning_points,
    }
}
