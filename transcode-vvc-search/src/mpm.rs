//! Most probable mode list derivation.

use crate::cu::CuInfo;
use crate::intra::{DC_IDX, HOR_IDX, PLANAR_IDX, VER_IDX};
use crate::LCU_WIDTH;

/// Offset used to wrap angular neighbors within 2..=66.
const OFFSET: i32 = 61;
/// Number of angular modes in the wrap.
const MOD: i32 = OFFSET + 3;

/// Six most probable luma modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpmList {
    /// Candidate modes, most probable first.
    pub modes: [u8; 6],
    /// Number of distinct neighbor modes that seeded the list (1 or 2).
    pub neighbor_count: u8,
}

impl MpmList {
    /// Position of `mode` in the list.
    pub fn index_of(&self, mode: u8) -> Option<usize> {
        self.modes.iter().position(|&m| m == mode)
    }

    /// Whether `mode` is in the list.
    pub fn contains(&self, mode: u8) -> bool {
        self.index_of(mode).is_some()
    }
}

#[inline]
fn wrap(mode: i32) -> u8 {
    (mode.rem_euclid(MOD) + 2) as u8
}

/// Derive the MPM list of a CU at picture luma `y` from its neighbors.
///
/// Neighbors that are absent or not intra count as planar. The above
/// neighbor is ignored on the LCU's top row.
pub fn get_dir_luma_predictor(y: usize, left: Option<&CuInfo>, above: Option<&CuInfo>) -> MpmList {
    let intra_mode = |cu: Option<&CuInfo>| -> u8 {
        match cu {
            Some(cu) if cu.is_intra() => cu.intra.mode,
            _ => PLANAR_IDX,
        }
    };
    let left_mode = intra_mode(left);
    let above_mode = if y % LCU_WIDTH == 0 { PLANAR_IDX } else { intra_mode(above) };

    let mut modes = [PLANAR_IDX, DC_IDX, VER_IDX, HOR_IDX, VER_IDX - 4, VER_IDX + 4];
    let neighbor_count = if left_mode == above_mode { 1 } else { 2 };

    if left_mode == above_mode && left_mode > DC_IDX {
        let m = left_mode as i32;
        modes = [
            PLANAR_IDX,
            left_mode,
            wrap(m + OFFSET),
            wrap(m - 1),
            wrap(m + OFFSET - 1),
            wrap(m),
        ];
    } else if left_mode != above_mode && left_mode > DC_IDX && above_mode > DC_IDX {
        let max = left_mode.max(above_mode) as i32;
        let min = left_mode.min(above_mode) as i32;
        let diff = max - min;
        let (p3, p4, p5) = if diff == 1 {
            (wrap(min + OFFSET), wrap(max - 1), wrap(min + OFFSET - 1))
        } else if diff >= 62 {
            (wrap(min - 1), wrap(max + OFFSET), wrap(min))
        } else if diff == 2 {
            (wrap(min - 1), wrap(min + OFFSET), wrap(max - 1))
        } else {
            (wrap(min + OFFSET), wrap(min - 1), wrap(max + OFFSET))
        };
        modes = [PLANAR_IDX, left_mode, above_mode, p3, p4, p5];
    } else if left_mode != above_mode && left_mode as u32 + above_mode as u32 >= 2 {
        let max = left_mode.max(above_mode);
        let m = max as i32;
        modes = [
            PLANAR_IDX,
            max,
            wrap(m + OFFSET),
            wrap(m - 1),
            wrap(m + OFFSET - 1),
            wrap(m),
        ];
    }

    MpmList { modes, neighbor_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cu::CuType;
    use pretty_assertions::assert_eq;

    fn intra(mode: u8) -> CuInfo {
        let mut cu = CuInfo::default();
        cu.cu_type = CuType::Intra;
        cu.intra.mode = mode;
        cu
    }

    #[test]
    fn test_default_list() {
        let list = get_dir_luma_predictor(8, None, None);
        assert_eq!(list.modes, [0, 1, 50, 18, 46, 54]);
        assert_eq!(list.neighbor_count, 1);
    }

    #[test]
    fn test_non_intra_neighbors_are_planar() {
        let mut inter = CuInfo::default();
        inter.cu_type = CuType::Inter;
        inter.intra.mode = 30;
        let list = get_dir_luma_predictor(8, Some(&inter), Some(&inter));
        assert_eq!(list.modes, [0, 1, 50, 18, 46, 54]);
    }

    #[test]
    fn test_equal_angular_neighbors() {
        let cu = intra(30);
        let list = get_dir_luma_predictor(8, Some(&cu), Some(&cu));
        assert_eq!(list.modes, [0, 30, 29, 31, 28, 32]);
        assert_eq!(list.neighbor_count, 1);
    }

    #[test]
    fn test_wraparound_at_range_ends() {
        let cu = intra(2);
        let list = get_dir_luma_predictor(8, Some(&cu), Some(&cu));
        assert_eq!(list.modes, [0, 2, 65, 3, 64, 4]);

        let cu = intra(66);
        let list = get_dir_luma_predictor(8, Some(&cu), Some(&cu));
        assert_eq!(list.modes, [0, 66, 65, 3, 64, 4]);
    }

    #[test]
    fn test_two_angular_neighbors() {
        let (l, a) = (intra(20), intra(40));
        let list = get_dir_luma_predictor(8, Some(&l), Some(&a));
        assert_eq!(list.modes, [0, 20, 40, 19, 21, 39]);
        assert_eq!(list.neighbor_count, 2);

        let (l, a) = (intra(20), intra(21));
        let list = get_dir_luma_predictor(8, Some(&l), Some(&a));
        assert_eq!(list.modes, [0, 20, 21, 19, 22, 18]);

        let (l, a) = (intra(20), intra(22));
        let list = get_dir_luma_predictor(8, Some(&l), Some(&a));
        assert_eq!(list.modes, [0, 20, 22, 21, 19, 23]);

        let (l, a) = (intra(2), intra(66));
        let list = get_dir_luma_predictor(8, Some(&l), Some(&a));
        assert_eq!(list.modes, [0, 2, 66, 3, 65, 4]);
    }

    #[test]
    fn test_one_angular_neighbor() {
        let (l, a) = (intra(DC_IDX), intra(44));
        let list = get_dir_luma_predictor(8, Some(&l), Some(&a));
        assert_eq!(list.modes, [0, 44, 43, 45, 42, 46]);
        assert_eq!(list.neighbor_count, 2);
    }

    #[test]
    fn test_above_ignored_on_lcu_top_row() {
        let a = intra(44);
        let list = get_dir_luma_predictor(64, None, Some(&a));
        assert_eq!(list.modes, [0, 1, 50, 18, 46, 54]);
    }

    #[test]
    fn test_list_is_distinct() {
        for l in 0..67u8 {
            for a in 0..67u8 {
                let (lc, ac) = (intra(l), intra(a));
                let list = get_dir_luma_predictor(8, Some(&lc), Some(&ac));
                let mut sorted = list.modes;
                sorted.sort_unstable();
                for w in sorted.windows(2) {
                    assert_ne!(w[0], w[1], "left {} above {}", l, a);
                }
                assert!(list.modes.iter().all(|&m| m < 67));
            }
        }
    }
}
