//! Sign-map board with group and liberty computation.
//!
//! The board is a flat `Vec<i8>` in row-major order: +1 Black, 0 empty,
//! -1 White. Group membership and liberty counts are computed by flood
//! fill; each group is visited exactly once per sweep.

use thiserror::Error;

use crate::coord::{Coord, Player};

/// Errors from applying a move to a board.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("intersection ({0}, {1}) is outside the board")]
    OutOfBounds(u8, u8),

    #[error("intersection ({0}, {1}) is occupied")]
    Occupied(u8, u8),

    #[error("move at ({0}, {1}) would be suicide")]
    Suicide(u8, u8),
}

/// Result of applying a move: the new board, the stones removed, and the
/// ko point created by a single-stone snapback capture, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub board: Board,
    pub captured: Vec<Coord>,
    pub ko: Option<Coord>,
}

/// A square Go board of size 9, 13, or 19.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    size: usize,
    grid: Vec<i8>,
}

impl Board {
    /// Create an empty board.
    pub fn empty(size: usize) -> Self {
        Self {
            size,
            grid: vec![0; size * size],
        }
    }

    /// Build a board from a nested sign map. All rows must have the same
    /// length as the outer vector.
    pub fn from_sign_map(sign_map: &[Vec<i8>]) -> Option<Self> {
        let size = sign_map.len();
        if size == 0 || sign_map.iter().any(|row| row.len() != size) {
            return None;
        }
        let mut grid = Vec::with_capacity(size * size);
        for row in sign_map {
            grid.extend_from_slice(row);
        }
        Some(Self { size, grid })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw row-major sign map.
    #[inline]
    pub fn grid(&self) -> &[i8] {
        &self.grid
    }

    #[inline]
    pub fn get(&self, coord: Coord) -> i8 {
        self.grid[coord.index(self.size)]
    }

    #[inline]
    pub fn is_empty_at(&self, coord: Coord) -> bool {
        self.get(coord) == 0
    }

    pub fn stone_at(&self, coord: Coord) -> Option<Player> {
        Player::from_sign(self.get(coord))
    }

    /// Place or clear a stone without any capture logic. Used by the
    /// recognition pipeline and test fixtures.
    pub fn set(&mut self, coord: Coord, sign: i8) {
        let idx = coord.index(self.size);
        self.grid[idx] = sign;
    }

    #[inline]
    fn in_bounds(&self, col: i32, row: i32) -> bool {
        col >= 0 && row >= 0 && (col as usize) < self.size && (row as usize) < self.size
    }

    /// The 4-neighbourhood of a flat index.
    fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        const OFFSETS: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        let col = (index % self.size) as i32;
        let row = (index / self.size) as i32;
        OFFSETS.iter().filter_map(move |&(dc, dr)| {
            let (nc, nr) = (col + dc, row + dr);
            self.in_bounds(nc, nr)
                .then(|| nr as usize * self.size + nc as usize)
        })
    }

    /// Flood-fill the group containing `start`, returning its member
    /// indices and liberty count. `start` must hold a stone.
    fn group_at(&self, start: usize) -> (Vec<usize>, u32) {
        let color = self.grid[start];
        debug_assert!(color != 0);

        let mut members = vec![start];
        let mut seen = vec![false; self.grid.len()];
        let mut liberty_seen = vec![false; self.grid.len()];
        seen[start] = true;
        let mut liberties = 0u32;
        let mut cursor = 0;

        while cursor < members.len() {
            let current = members[cursor];
            cursor += 1;
            for n in self.neighbors(current) {
                let v = self.grid[n];
                if v == 0 {
                    if !liberty_seen[n] {
                        liberty_seen[n] = true;
                        liberties += 1;
                    }
                } else if v == color && !seen[n] {
                    seen[n] = true;
                    members.push(n);
                }
            }
        }

        (members, liberties)
    }

    /// Per-point liberty count of the group occupying each point; zero for
    /// empty points. Each group is flood-filled exactly once.
    pub fn liberty_map(&self) -> Vec<u32> {
        let mut result = vec![0u32; self.grid.len()];
        let mut assigned = vec![false; self.grid.len()];

        for start in 0..self.grid.len() {
            if self.grid[start] == 0 || assigned[start] {
                continue;
            }
            let (members, liberties) = self.group_at(start);
            for m in members {
                assigned[m] = true;
                result[m] = liberties;
            }
        }

        result
    }

    /// Apply a stone placement with full capture and suicide resolution.
    ///
    /// Ko: a capture of exactly one stone by a stone that itself ends up
    /// as a lone group with a single liberty creates a ko restriction at
    /// the captured point.
    pub fn apply_move(&self, coord: Coord, player: Player) -> Result<MoveOutcome, MoveError> {
        if coord.col as usize >= self.size || coord.row as usize >= self.size {
            return Err(MoveError::OutOfBounds(coord.col, coord.row));
        }
        if !self.is_empty_at(coord) {
            return Err(MoveError::Occupied(coord.col, coord.row));
        }

        let mut next = self.clone();
        let played = coord.index(self.size);
        next.grid[played] = player.sign();

        // Remove opponent groups left without liberties.
        let mut captured = Vec::new();
        let opponent = player.opponent().sign();
        let neighbor_indices: Vec<usize> = next.neighbors(played).collect();
        for n in neighbor_indices {
            if next.grid[n] != opponent {
                continue;
            }
            let (members, liberties) = next.group_at(n);
            if liberties == 0 {
                for m in members {
                    next.grid[m] = 0;
                    captured.push(Coord::from_index(m, self.size));
                }
            }
        }

        // Suicide check on the played group after captures resolve.
        let (own_members, own_liberties) = next.group_at(played);
        if own_liberties == 0 {
            return Err(MoveError::Suicide(coord.col, coord.row));
        }

        let ko = if captured.len() == 1 && own_members.len() == 1 && own_liberties == 1 {
            Some(captured[0])
        } else {
            None
        };

        Ok(MoveOutcome {
            board: next,
            captured,
            ko,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(col: u8, row: u8) -> Coord {
        Coord::new(col, row)
    }

    #[test]
    fn test_liberty_map_single_stone() {
        let mut board = Board::empty(9);
        board.set(coord(4, 4), 1);
        let libs = board.liberty_map();
        assert_eq!(libs[coord(4, 4).index(9)], 4);
        assert_eq!(libs[coord(0, 0).index(9)], 0);
    }

    #[test]
    fn test_liberty_map_corner_and_group() {
        let mut board = Board::empty(9);
        board.set(coord(0, 0), 1);
        board.set(coord(1, 0), 1);
        let libs = board.liberty_map();
        // Two-stone corner group: liberties at (2,0), (0,1), (1,1)
        assert_eq!(libs[coord(0, 0).index(9)], 3);
        assert_eq!(libs[coord(1, 0).index(9)], 3);
    }

    #[test]
    fn test_shared_liberty_counted_once() {
        let mut board = Board::empty(9);
        board.set(coord(2, 2), 1);
        board.set(coord(2, 4), 1);
        board.set(coord(2, 3), 1);
        let libs = board.liberty_map();
        // Vertical three-stone line away from edges: 8 distinct liberties
        assert_eq!(libs[coord(2, 3).index(9)], 8);
    }

    #[test]
    fn test_capture_single_stone() {
        let mut board = Board::empty(9);
        // White stone at (4,4) surrounded on three sides by black
        board.set(coord(4, 4), -1);
        board.set(coord(3, 4), 1);
        board.set(coord(5, 4), 1);
        board.set(coord(4, 3), 1);

        let outcome = board.apply_move(coord(4, 5), Player::B).unwrap();
        assert_eq!(outcome.captured, vec![coord(4, 4)]);
        assert_eq!(outcome.board.get(coord(4, 4)), 0);
    }

    #[test]
    fn test_occupied_rejected() {
        let mut board = Board::empty(9);
        board.set(coord(4, 4), 1);
        assert_eq!(
            board.apply_move(coord(4, 4), Player::W),
            Err(MoveError::Occupied(4, 4))
        );
    }

    #[test]
    fn test_suicide_rejected() {
        let mut board = Board::empty(9);
        // Black surrounds (0,0); white playing there is suicide
        board.set(coord(1, 0), 1);
        board.set(coord(0, 1), 1);
        assert_eq!(
            board.apply_move(coord(0, 0), Player::W),
            Err(MoveError::Suicide(0, 0))
        );
    }

    #[test]
    fn test_snapback_capture_sets_ko() {
        let mut board = Board::empty(9);
        // Classic ko shape around (4,4)/(5,4)
        board.set(coord(4, 3), 1);
        board.set(coord(3, 4), 1);
        board.set(coord(4, 5), 1);
        board.set(coord(4, 4), -1);
        board.set(coord(5, 3), -1);
        board.set(coord(6, 4), -1);
        board.set(coord(5, 5), -1);

        // Black captures the white stone at (4,4) by playing (5,4)
        let outcome = board.apply_move(coord(5, 4), Player::B).unwrap();
        assert_eq!(outcome.captured, vec![coord(4, 4)]);
        assert_eq!(outcome.ko, Some(coord(4, 4)));
    }

    #[test]
    fn test_multi_capture_is_not_ko() {
        let mut board = Board::empty(9);
        // Two white stones in a row, both in atari after black's move
        board.set(coord(4, 4), -1);
        board.set(coord(5, 4), -1);
        board.set(coord(3, 4), 1);
        board.set(coord(4, 3), 1);
        board.set(coord(5, 3), 1);
        board.set(coord(6, 4), 1);
        board.set(coord(5, 5), 1);

        let outcome = board.apply_move(coord(4, 5), Player::B).unwrap();
        assert_eq!(outcome.captured.len(), 2);
        assert_eq!(outcome.ko, None);
    }

    #[test]
    fn test_from_sign_map_ragged_rejected() {
        assert!(Board::from_sign_map(&[vec![0, 0], vec![0]]).is_none());
    }
}
