//! Performance report generation.
//!
//! Straight arithmetic over streams of [`goban::AnalysisResult`]: each
//! played move is scored against the analyses of the positions before
//! and after it, classified, and aggregated into per-player and
//! per-phase summaries with top mistakes and turning points.

pub mod classify;
pub mod summary;

pub use classify::{
    classify_move, classify_phase, classify_points_lost, ClassificationAxis, GamePhase,
    MoveCategory, MoveStats,
};
pub use summary::{build_report, build_report_with_top_n, GameReport, PlayedMove, PlayerSummary};
