//! Position featurization following the KataGo input schema.
//!
//! One position becomes a dense `[22, size, size]` plane stack and a
//! 19-element global vector, written into caller-provided buffers so the
//! engine can batch several positions into one tensor without copying.

use goban::{Player, Position, Vertex};

/// Number of dense input planes.
pub const NUM_BIN_FEATURES: usize = 22;
/// Number of scalar global features.
pub const NUM_GLOBAL_FEATURES: usize = 19;

/// Plane indices. Planes not listed stay zero.
const PLANE_ONES: usize = 0;
const PLANE_OWN_STONES: usize = 1;
const PLANE_OPPONENT_STONES: usize = 2;
const PLANE_LIBERTIES_1: usize = 3;
const PLANE_LIBERTIES_2: usize = 4;
const PLANE_LIBERTIES_3: usize = 5;
const PLANE_KO: usize = 6;
/// Planes 9..=13 mark the last five moves, most recent first.
const PLANE_HISTORY_BASE: usize = 9;

/// Komi is fed to the network scaled down by this factor.
const KOMI_SCALE: f32 = 20.0;

/// Size in floats of one position's dense input.
#[inline]
pub fn bin_len(board_size: usize) -> usize {
    NUM_BIN_FEATURES * board_size * board_size
}

/// Fill the dense and global feature buffers for one position at the
/// given batch offset. Both slices must hold at least `batch_index + 1`
/// positions' worth of data; the written region is zeroed first.
pub fn fill_features(
    position: &Position,
    bin: &mut [f32],
    global: &mut [f32],
    batch_index: usize,
) {
    let size = position.size();
    let area = size * size;

    let bin = &mut bin[batch_index * bin_len(size)..(batch_index + 1) * bin_len(size)];
    let global =
        &mut global[batch_index * NUM_GLOBAL_FEATURES..(batch_index + 1) * NUM_GLOBAL_FEATURES];
    bin.fill(0.0);
    global.fill(0.0);

    bin[PLANE_ONES * area..(PLANE_ONES + 1) * area].fill(1.0);

    let own = position.to_play.sign();
    for (i, &stone) in position.board.grid().iter().enumerate() {
        if stone == own {
            bin[PLANE_OWN_STONES * area + i] = 1.0;
        } else if stone == -own {
            bin[PLANE_OPPONENT_STONES * area + i] = 1.0;
        }
    }

    // Liberty planes cover stones of both colours; each group's count is
    // computed exactly once.
    for (i, &liberties) in position.board.liberty_map().iter().enumerate() {
        let plane = match liberties {
            1 => PLANE_LIBERTIES_1,
            2 => PLANE_LIBERTIES_2,
            3 => PLANE_LIBERTIES_3,
            _ => continue,
        };
        bin[plane * area + i] = 1.0;
    }

    if let Some(ko) = position.ko_for_to_play() {
        bin[PLANE_KO * area + ko.index(size)] = 1.0;
    }

    for (ply_back, vertex) in position.recent_history().iter().enumerate() {
        match vertex {
            Some(Vertex::Play(coord)) => {
                bin[(PLANE_HISTORY_BASE + ply_back) * area + coord.index(size)] = 1.0;
            }
            Some(Vertex::Pass) => {
                global[ply_back] = 1.0;
            }
            None => {}
        }
    }

    global[5] = position.komi / KOMI_SCALE;
}

/// Convenience wrapper allocating fresh buffers for a single position.
pub fn featurize(position: &Position) -> (Vec<f32>, Vec<f32>) {
    let mut bin = vec![0.0; bin_len(position.size())];
    let mut global = vec![0.0; NUM_GLOBAL_FEATURES];
    fill_features(position, &mut bin, &mut global, 0);
    (bin, global)
}

#[cfg(test)]
mod tests {
    use super::*;
    use goban::{Coord, KoRestriction};

    fn plane<'a>(bin: &'a [f32], plane: usize, size: usize) -> &'a [f32] {
        &bin[plane * size * size..(plane + 1) * size * size]
    }

    #[test]
    fn test_empty_board_planes() {
        let pos = Position::empty(9, Player::B, 7.5);
        let (bin, global) = featurize(&pos);

        assert!(plane(&bin, PLANE_ONES, 9).iter().all(|&v| v == 1.0));
        assert!(plane(&bin, PLANE_OWN_STONES, 9).iter().all(|&v| v == 0.0));
        assert!(plane(&bin, PLANE_KO, 9).iter().all(|&v| v == 0.0));
        assert_eq!(global[5], 7.5 / 20.0);
        assert!(global[..5].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_stone_planes_follow_side_to_move() {
        let mut pos = Position::empty(9, Player::W, 7.5);
        pos.board.set(Coord::new(2, 2), 1);
        pos.board.set(Coord::new(6, 6), -1);
        let (bin, _) = featurize(&pos);

        // White to move: plane 1 holds white stones, plane 2 black
        assert_eq!(plane(&bin, PLANE_OWN_STONES, 9)[Coord::new(6, 6).index(9)], 1.0);
        assert_eq!(
            plane(&bin, PLANE_OPPONENT_STONES, 9)[Coord::new(2, 2).index(9)],
            1.0
        );
    }

    #[test]
    fn test_liberty_planes() {
        let mut pos = Position::empty(9, Player::B, 7.5);
        // A white stone with exactly one liberty
        pos.board.set(Coord::new(0, 0), -1);
        pos.board.set(Coord::new(1, 0), 1);
        let (bin, _) = featurize(&pos);

        let corner = Coord::new(0, 0).index(9);
        assert_eq!(plane(&bin, PLANE_LIBERTIES_1, 9)[corner], 1.0);
        assert_eq!(plane(&bin, PLANE_LIBERTIES_2, 9)[corner], 0.0);
        // The black stone has three liberties
        let black = Coord::new(1, 0).index(9);
        assert_eq!(plane(&bin, PLANE_LIBERTIES_3, 9)[black], 1.0);
    }

    #[test]
    fn test_ko_plane_only_for_side_to_move() {
        let mut pos = Position::empty(9, Player::B, 7.5);
        let ko_point = Coord::new(4, 4);
        pos.ko = Some(KoRestriction {
            player: Player::B,
            coord: ko_point,
        });
        let (bin, _) = featurize(&pos);
        assert_eq!(plane(&bin, PLANE_KO, 9)[ko_point.index(9)], 1.0);

        // Restriction on the opponent does not mark the plane
        pos.ko = Some(KoRestriction {
            player: Player::W,
            coord: ko_point,
        });
        let (bin, _) = featurize(&pos);
        assert!(plane(&bin, PLANE_KO, 9).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_history_planes_and_pass_flags() {
        let mut pos = Position::empty(9, Player::B, 7.5);
        pos.history = vec![
            Vertex::Play(Coord::new(0, 0)), // 3 plies back
            Vertex::Pass,                   // 2 plies back
            Vertex::Play(Coord::new(5, 5)), // most recent
        ];
        let (bin, global) = featurize(&pos);

        assert_eq!(
            plane(&bin, PLANE_HISTORY_BASE, 9)[Coord::new(5, 5).index(9)],
            1.0
        );
        assert_eq!(
            plane(&bin, PLANE_HISTORY_BASE + 2, 9)[Coord::new(0, 0).index(9)],
            1.0
        );
        // The pass two plies back sets the matching global flag only
        assert_eq!(global[1], 1.0);
        assert_eq!(global[0], 0.0);
        assert!(plane(&bin, PLANE_HISTORY_BASE + 1, 9).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_batch_offset_writes_disjoint_regions() {
        let a = Position::empty(9, Player::B, 7.5);
        let mut b = Position::empty(9, Player::B, 6.5);
        b.board.set(Coord::new(3, 3), 1);

        let mut bin = vec![0.0; 2 * bin_len(9)];
        let mut global = vec![0.0; 2 * NUM_GLOBAL_FEATURES];
        fill_features(&a, &mut bin, &mut global, 0);
        fill_features(&b, &mut bin, &mut global, 1);

        assert_eq!(global[5], 7.5 / 20.0);
        assert_eq!(global[NUM_GLOBAL_FEATURES + 5], 6.5 / 20.0);
        let second = &bin[bin_len(9)..];
        assert_eq!(
            plane(second, PLANE_OPPONENT_STONES, 9)[Coord::new(3, 3).index(9)],
            0.0
        );
        assert_eq!(plane(second, PLANE_OWN_STONES, 9)[Coord::new(3, 3).index(9)], 1.0);
    }
}
