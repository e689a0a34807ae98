//! Core board and position model for the sente analysis engine
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Board`: a signed sign-map grid with group/liberty computation
//! - `Position`: board + side to move + komi + history + ko restriction
//! - `Coord` / `Vertex`: intersection coordinates and the pass token
//! - `AnalysisResult`: the typed output of the inference engine and search
//! - text position-record serialisation

pub mod analysis;
pub mod board;
pub mod coord;
pub mod position;
pub mod sgf;

pub use analysis::{AnalysisResult, MoveSuggestion};
pub use board::{Board, MoveError, MoveOutcome};
pub use coord::{Coord, Player, Vertex};
pub use position::{KoRestriction, Position};
pub use sgf::position_record;
