//! Coordinates, players, and the pass token.
//!
//! Two textual encodings coexist: GTP-style display coordinates
//! ("D4", "Q16") whose column alphabet skips the letter I, and
//! position-record point coordinates ("dd") using plain 'a'..'s' for
//! both axes.

use serde::{Deserialize, Serialize};

/// Column alphabet for display coordinates. Skips I by convention.
const GTP_COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

/// The side to move or the owner of a stone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Player {
    B,
    W,
}

impl Player {
    /// Sign-map value: Black = +1, White = -1.
    #[inline]
    pub fn sign(self) -> i8 {
        match self {
            Player::B => 1,
            Player::W => -1,
        }
    }

    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::B => Player::W,
            Player::W => Player::B,
        }
    }

    /// Convert a sign-map value to a player. Zero is not a player.
    pub fn from_sign(sign: i8) -> Option<Player> {
        match sign {
            1 => Some(Player::B),
            -1 => Some(Player::W),
            _ => None,
        }
    }
}

/// A board intersection. `col` runs left to right, `row` top to bottom,
/// both zero-based, matching the sign-map layout and the network's
/// policy-plane ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub col: u8,
    pub row: u8,
}

impl Coord {
    pub fn new(col: u8, row: u8) -> Self {
        Self { col, row }
    }

    /// Flat index into a `size`-wide sign map.
    #[inline]
    pub fn index(self, size: usize) -> usize {
        self.row as usize * size + self.col as usize
    }

    /// Inverse of [`Coord::index`].
    #[inline]
    pub fn from_index(index: usize, size: usize) -> Self {
        Self {
            col: (index % size) as u8,
            row: (index / size) as u8,
        }
    }

    /// Display coordinate, e.g. "D4" or "Q16". Row numbers count from the
    /// bottom edge; columns skip the letter I.
    pub fn to_display(self, size: usize) -> String {
        let letter = GTP_COLUMNS[self.col as usize] as char;
        format!("{}{}", letter, size - self.row as usize)
    }

    /// Parse a display coordinate. Returns None for out-of-range input
    /// or the pass token (which is not a point).
    pub fn from_display(text: &str, size: usize) -> Option<Self> {
        let mut chars = text.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let col = GTP_COLUMNS.iter().position(|&c| c as char == letter)?;
        let number: usize = chars.as_str().parse().ok()?;
        if col >= size || number == 0 || number > size {
            return None;
        }
        Some(Self {
            col: col as u8,
            row: (size - number) as u8,
        })
    }

    /// Position-record point encoding, e.g. "dd". Both axes use
    /// 'a'..'s', row counted from the top edge.
    pub fn to_sgf(self) -> String {
        let col = (b'a' + self.col) as char;
        let row = (b'a' + self.row) as char;
        format!("{}{}", col, row)
    }
}

/// A move: either a played intersection or a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Vertex {
    Play(Coord),
    Pass,
}

impl Vertex {
    pub const PASS_TOKEN: &'static str = "pass";

    #[inline]
    pub fn is_pass(self) -> bool {
        matches!(self, Vertex::Pass)
    }

    pub fn coord(self) -> Option<Coord> {
        match self {
            Vertex::Play(c) => Some(c),
            Vertex::Pass => None,
        }
    }

    pub fn to_display(self, size: usize) -> String {
        match self {
            Vertex::Play(c) => c.to_display(size),
            Vertex::Pass => Self::PASS_TOKEN.to_string(),
        }
    }

    pub fn from_display(text: &str, size: usize) -> Option<Self> {
        if text.eq_ignore_ascii_case(Self::PASS_TOKEN) {
            return Some(Vertex::Pass);
        }
        Coord::from_display(text, size).map(Vertex::Play)
    }
}
