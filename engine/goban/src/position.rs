//! A board state plus the metadata the network consumes: side to move,
//! komi, recent move history, and an optional ko restriction.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::board::{Board, MoveError, MoveOutcome};
use crate::coord::{Coord, Player, Vertex};

/// Number of history plies the featurizer consumes.
pub const HISTORY_PLANES: usize = 5;

/// A coordinate at which recapture is forbidden for one side for one ply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KoRestriction {
    /// The side that may not play here.
    pub player: Player,
    pub coord: Coord,
}

/// A full position: everything the featurizer and search need.
#[derive(Debug, Clone)]
pub struct Position {
    pub board: Board,
    pub komi: f32,
    pub to_play: Player,
    /// Most recent moves, oldest first. Only the last
    /// [`HISTORY_PLANES`] entries are featurized.
    pub history: Vec<Vertex>,
    pub ko: Option<KoRestriction>,
}

impl Position {
    pub fn new(board: Board, to_play: Player, komi: f32) -> Self {
        Self {
            board,
            komi,
            to_play,
            history: Vec::new(),
            ko: None,
        }
    }

    pub fn empty(size: usize, to_play: Player, komi: f32) -> Self {
        Self::new(Board::empty(size), to_play, komi)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.board.size()
    }

    /// The ko coordinate if it restricts the side to move.
    pub fn ko_for_to_play(&self) -> Option<Coord> {
        self.ko
            .filter(|ko| ko.player == self.to_play)
            .map(|ko| ko.coord)
    }

    /// The last `HISTORY_PLANES` moves, most recent first, padded with
    /// None where the game is shorter.
    pub fn recent_history(&self) -> [Option<Vertex>; HISTORY_PLANES] {
        let mut recent = [None; HISTORY_PLANES];
        for (slot, v) in recent.iter_mut().zip(self.history.iter().rev()) {
            *slot = Some(*v);
        }
        recent
    }

    /// Coarse legality used during tree expansion: the point is on the
    /// board, unoccupied, and not the ko vertex for the side to move.
    /// Suicide is only detected when the move is actually applied.
    pub fn is_plausibly_legal(&self, coord: Coord) -> bool {
        (coord.col as usize) < self.size()
            && (coord.row as usize) < self.size()
            && self.board.is_empty_at(coord)
            && self.ko_for_to_play() != Some(coord)
    }

    /// Apply a move for the side to move, producing the successor
    /// position with flipped turn, updated history, and the new ko
    /// restriction (cleared on pass).
    pub fn play(&self, vertex: Vertex) -> Result<Position, MoveError> {
        let (board, ko) = match vertex {
            Vertex::Pass => (self.board.clone(), None),
            Vertex::Play(coord) => {
                let MoveOutcome { board, ko, .. } = self.board.apply_move(coord, self.to_play)?;
                let restriction = ko.map(|coord| KoRestriction {
                    player: self.to_play.opponent(),
                    coord,
                });
                (board, restriction)
            }
        };

        let mut history = self.history.clone();
        history.push(vertex);

        Ok(Position {
            board,
            komi: self.komi,
            to_play: self.to_play.opponent(),
            history,
            ko,
        })
    }

    /// Whether the last two moves were both passes (search-terminal).
    pub fn two_passes(&self) -> bool {
        let n = self.history.len();
        n >= 2 && self.history[n - 1].is_pass() && self.history[n - 2].is_pass()
    }

    /// 64-bit cache fingerprint over the sign map, komi, last-five
    /// history, ko restriction, and side to move.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.board.grid().hash(&mut hasher);
        self.komi.to_bits().hash(&mut hasher);
        self.recent_history().hash(&mut hasher);
        self.ko.map(|ko| (ko.player, ko.coord)).hash(&mut hasher);
        self.to_play.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_sensitivity() {
        let a = Position::empty(9, Player::B, 7.5);
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.komi = 6.5;
        assert_ne!(a.fingerprint(), b.fingerprint());

        let mut c = a.clone();
        c.to_play = Player::W;
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = a.clone();
        d.board.set(Coord::new(2, 2), 1);
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_old_history() {
        let mut a = Position::empty(19, Player::B, 7.5);
        let mut b = a.clone();
        // Histories differ only beyond the featurized window
        for i in 0..8u8 {
            a.history.push(Vertex::Play(Coord::new(i, 0)));
            b.history.push(Vertex::Play(Coord::new(i, 1)));
        }
        let tail: Vec<Vertex> = (0..HISTORY_PLANES as u8)
            .map(|i| Vertex::Play(Coord::new(i, 5)))
            .collect();
        a.history.extend(&tail);
        b.history.extend(&tail);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_play_flips_turn_and_records_history() {
        let pos = Position::empty(9, Player::B, 7.5);
        let next = pos.play(Vertex::Play(Coord::new(2, 2))).unwrap();
        assert_eq!(next.to_play, Player::W);
        assert_eq!(next.history.len(), 1);
        assert_eq!(next.board.get(Coord::new(2, 2)), 1);
    }

    #[test]
    fn test_ko_restriction_applies_to_opponent() {
        let mut pos = Position::empty(9, Player::B, 7.5);
        pos.board.set(Coord::new(4, 3), 1);
        pos.board.set(Coord::new(3, 4), 1);
        pos.board.set(Coord::new(4, 5), 1);
        pos.board.set(Coord::new(4, 4), -1);
        pos.board.set(Coord::new(5, 3), -1);
        pos.board.set(Coord::new(6, 4), -1);
        pos.board.set(Coord::new(5, 5), -1);

        let next = pos.play(Vertex::Play(Coord::new(5, 4))).unwrap();
        let ko = next.ko.unwrap();
        assert_eq!(ko.player, Player::W);
        assert_eq!(ko.coord, Coord::new(4, 4));
        assert!(!next.is_plausibly_legal(Coord::new(4, 4)));
    }

    #[test]
    fn test_two_passes_terminal() {
        let pos = Position::empty(9, Player::B, 7.5);
        let pos = pos.play(Vertex::Pass).unwrap();
        assert!(!pos.two_passes());
        let pos = pos.play(Vertex::Pass).unwrap();
        assert!(pos.two_passes());
    }

    #[test]
    fn test_recent_history_most_recent_first() {
        let mut pos = Position::empty(9, Player::B, 7.5);
        pos.history = vec![
            Vertex::Play(Coord::new(0, 0)),
            Vertex::Pass,
            Vertex::Play(Coord::new(1, 1)),
        ];
        let recent = pos.recent_history();
        assert_eq!(recent[0], Some(Vertex::Play(Coord::new(1, 1))));
        assert_eq!(recent[1], Some(Vertex::Pass));
        assert_eq!(recent[2], Some(Vertex::Play(Coord::new(0, 0))));
        assert_eq!(recent[3], None);
    }
}
