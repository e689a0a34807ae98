//! Position-record serialisation.
//!
//! Emits a minimal single-node record carrying the board size and the
//! stone placement properties:
//! `(;game[1]file-format[4]size[n]add-black[..]add-white[..])`.
//! Point coordinates use the lowercase 'a'..'s' alphabet on both axes.

use crate::coord::{Coord, Player};

/// Serialise a board size and stone list into a text position record.
///
/// Stones are deduplicated by (col, row); the first colour seen for a
/// point wins. Empty colour lists omit their property entirely.
pub fn position_record(board_size: usize, stones: &[(Coord, Player)]) -> String {
    let mut black = Vec::new();
    let mut white = Vec::new();
    let mut seen = vec![false; board_size * board_size];

    for &(coord, player) in stones {
        let idx = coord.index(board_size);
        if idx >= seen.len() || seen[idx] {
            continue;
        }
        seen[idx] = true;
        match player {
            Player::B => black.push(coord),
            Player::W => white.push(coord),
        }
    }

    let mut record = format!("(;game[1]file-format[4]size[{}]", board_size);
    append_points(&mut record, "add-black", &black);
    append_points(&mut record, "add-white", &white);
    record.push(')');
    record
}

fn append_points(record: &mut String, property: &str, points: &[Coord]) {
    if points.is_empty() {
        return;
    }
    record.push_str(property);
    for point in points {
        record.push('[');
        record.push_str(&point.to_sgf());
        record.push(']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_stone_record() {
        let stones = [
            (Coord::new(3, 3), Player::B),
            (Coord::new(5, 5), Player::W),
        ];
        let record = position_record(9, &stones);
        assert_eq!(
            record,
            "(;game[1]file-format[4]size[9]add-black[dd]add-white[ff])"
        );
    }

    #[test]
    fn test_empty_board_omits_properties() {
        let record = position_record(19, &[]);
        assert_eq!(record, "(;game[1]file-format[4]size[19])");
        assert!(!record.contains("add-black"));
        assert!(!record.contains("add-white"));
    }

    #[test]
    fn test_duplicate_points_deduplicated() {
        let stones = [
            (Coord::new(2, 2), Player::B),
            (Coord::new(2, 2), Player::W),
            (Coord::new(2, 2), Player::B),
        ];
        let record = position_record(9, &stones);
        assert_eq!(record, "(;game[1]file-format[4]size[9]add-black[cc])");
    }

    #[test]
    fn test_multiple_stones_per_property() {
        let stones = [
            (Coord::new(0, 0), Player::B),
            (Coord::new(1, 0), Player::B),
        ];
        let record = position_record(9, &stones);
        assert_eq!(record, "(;game[1]file-format[4]size[9]add-black[aa][ba])");
    }
}
