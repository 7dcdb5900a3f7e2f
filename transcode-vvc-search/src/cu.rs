//! Coding unit records and CU grids.
//!
//! CU information is stored once per 4x4 SCU. A CU covering several SCUs has
//! its record replicated into each of them, so any position can be queried
//! without knowing the CU boundaries.

use crate::picture::Color;
use crate::{LCU_WIDTH, SCU_WIDTH};

/// Number of transform depths tracked per color in a [`Cbf`].
pub const NUM_CBF_DEPTHS: u32 = 5;

/// Prediction type of a CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CuType {
    /// Not decided yet.
    #[default]
    NotSet,
    /// Intra predicted.
    Intra,
    /// Inter predicted (skip is an inter CU with the skip flag set).
    Inter,
}

/// Partitioning of a CU into prediction units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartMode {
    /// One PU.
    #[default]
    Size2Nx2N,
    /// Two horizontal halves.
    Size2NxN,
    /// Two vertical halves.
    SizeNx2N,
    /// Four quarters.
    SizeNxN,
    /// Top quarter and bottom three quarters.
    Size2NxnU,
    /// Top three quarters and bottom quarter.
    Size2NxnD,
    /// Left quarter and right three quarters.
    SizenLx2N,
    /// Left three quarters and right quarter.
    SizenRx2N,
}

/// PU offsets in quarters of the CU width.
const PART_OFFSETS: [[(usize, usize); 4]; 8] = [
    [(0, 0), (0, 0), (0, 0), (0, 0)],
    [(0, 0), (0, 2), (0, 0), (0, 0)],
    [(0, 0), (2, 0), (0, 0), (0, 0)],
    [(0, 0), (2, 0), (0, 2), (2, 2)],
    [(0, 0), (0, 1), (0, 0), (0, 0)],
    [(0, 0), (0, 3), (0, 0), (0, 0)],
    [(0, 0), (1, 0), (0, 0), (0, 0)],
    [(0, 0), (3, 0), (0, 0), (0, 0)],
];

/// PU sizes in quarters of the CU width.
const PART_SIZES: [[(usize, usize); 4]; 8] = [
    [(4, 4), (0, 0), (0, 0), (0, 0)],
    [(4, 2), (4, 2), (0, 0), (0, 0)],
    [(2, 4), (2, 4), (0, 0), (0, 0)],
    [(2, 2), (2, 2), (2, 2), (2, 2)],
    [(4, 1), (4, 3), (0, 0), (0, 0)],
    [(4, 3), (4, 1), (0, 0), (0, 0)],
    [(1, 4), (3, 4), (0, 0), (0, 0)],
    [(3, 4), (1, 4), (0, 0), (0, 0)],
];

impl PartMode {
    /// Symmetric and asymmetric inter partitions, in search order.
    pub const MOTION_PARTITIONS: [PartMode; 6] = [
        PartMode::Size2NxN,
        PartMode::SizeNx2N,
        PartMode::Size2NxnU,
        PartMode::Size2NxnD,
        PartMode::SizenLx2N,
        PartMode::SizenRx2N,
    ];

    /// Number of prediction units.
    pub fn num_parts(self) -> usize {
        match self {
            Self::Size2Nx2N => 1,
            Self::SizeNxN => 4,
            _ => 2,
        }
    }

    /// Rectangle `(x, y, width, height)` of PU `i` of a CU at (`x`, `y`).
    pub fn pu_rect(self, cu_width: usize, x: usize, y: usize, i: usize) -> (usize, usize, usize, usize) {
        debug_assert!(i < self.num_parts());
        let quarter = cu_width / 4;
        let (ox, oy) = PART_OFFSETS[self as usize][i];
        let (w, h) = PART_SIZES[self as usize][i];
        (x + ox * quarter, y + oy * quarter, w * quarter, h * quarter)
    }
}

/// Coded block flags of one CU, per color and transform depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cbf(pub u16);

impl Cbf {
    #[inline]
    fn bit(depth: u8, color: Color) -> u16 {
        debug_assert!(u32::from(depth) < NUM_CBF_DEPTHS);
        1 << (NUM_CBF_DEPTHS * color as u32 + u32::from(depth))
    }

    #[inline]
    fn color_mask(color: Color) -> u16 {
        0x1f << (NUM_CBF_DEPTHS * color as u32)
    }

    /// Whether the flag of `color` at `depth` is set.
    #[inline]
    pub fn is_set(self, depth: u8, color: Color) -> bool {
        self.0 & Self::bit(depth, color) != 0
    }

    /// Whether any color has its flag set at `depth`.
    pub fn is_set_any(self, depth: u8) -> bool {
        Color::ALL.iter().any(|&c| self.is_set(depth, c))
    }

    /// Set the flag of `color` at `depth`.
    #[inline]
    pub fn set(&mut self, depth: u8, color: Color) {
        self.0 |= Self::bit(depth, color);
    }

    /// Clear the flag of `color` at `depth`.
    #[inline]
    pub fn clear(&mut self, depth: u8, color: Color) {
        self.0 &= !Self::bit(depth, color);
    }

    /// Copy every depth of `color` from `src`.
    pub fn copy_color(&mut self, src: Cbf, color: Color) {
        let mask = Self::color_mask(color);
        self.0 = (self.0 & !mask) | (src.0 & mask);
    }

    /// Set the flag at `depth` if any of the four children has it set at `depth + 1`.
    pub fn set_conditionally(&mut self, children: &[Cbf; 4], depth: u8, color: Color) {
        if children.iter().any(|c| c.is_set(depth + 1, color)) {
            self.set(depth, color);
        }
    }
}

/// Motion vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionVector {
    /// Horizontal component (1/16 pel).
    pub x: i16,
    /// Vertical component (1/16 pel).
    pub y: i16,
}

impl MotionVector {
    /// Create a new motion vector.
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Create a zero motion vector.
    pub fn zero() -> Self {
        Self { x: 0, y: 0 }
    }
}

/// Intra prediction parameters of a CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntraInfo {
    /// Luma mode (0 planar, 1 DC, 2..=66 angular).
    pub mode: u8,
    /// Chroma mode (luma modes, or 81..=83 for CCLM).
    pub mode_chroma: u8,
    /// Multi-reference line index.
    pub multi_ref_idx: u8,
    /// Matrix intra prediction in use.
    pub mip_flag: bool,
    /// MIP matrix is transposed.
    pub mip_is_transposed: bool,
}

/// Inter prediction parameters of a CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterInfo {
    /// Motion vectors for list 0 and list 1.
    pub mv: [MotionVector; 2],
    /// Reference picture indices.
    pub mv_ref: [u8; 2],
    /// Prediction direction bitmask (1 = L0, 2 = L1, 3 = bi).
    pub mv_dir: u8,
}

/// Coding unit record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CuInfo {
    /// Prediction type.
    pub cu_type: CuType,
    /// Quadtree depth (0..=3).
    pub depth: u8,
    /// Transform depth (>= depth).
    pub tr_depth: u8,
    /// Partition mode.
    pub part_size: PartMode,
    /// Quantization parameter.
    pub qp: u8,
    /// Coded block flags.
    pub cbf: Cbf,
    /// Skip flag (inter only).
    pub skipped: bool,
    /// Merge flag (inter only).
    pub merged: bool,
    /// Merge candidate index.
    pub merge_idx: u8,
    /// Transform index (MTS).
    pub tr_idx: u8,
    /// Joint Cb-Cr residual mode (0 off, 1..=3 cbf pattern).
    pub joint_cb_cr: u8,
    /// Intra parameters.
    pub intra: IntraInfo,
    /// Inter parameters.
    pub inter: InterInfo,
}

impl CuInfo {
    /// Whether the CU is intra coded.
    pub fn is_intra(&self) -> bool {
        self.cu_type == CuType::Intra
    }

    /// Whether the CU is inter coded.
    pub fn is_inter(&self) -> bool {
        self.cu_type == CuType::Inter
    }
}

/// Entries per row of an [`LcuCuGrid`]: 16 SCUs plus the left border column.
pub const LCU_CU_STRIDE: usize = LCU_WIDTH / SCU_WIDTH + 1;

/// CU grid of one LCU with a one-SCU border above and to the left.
///
/// Coordinates are LCU-local luma samples; `-1` (or any value down to `-4`)
/// addresses the border. The SCU above-right of the LCU is kept separately.
#[derive(Debug, Clone)]
pub struct LcuCuGrid {
    cells: Vec<CuInfo>,
    top_right: CuInfo,
}

impl Default for LcuCuGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl LcuCuGrid {
    /// Create a grid with every entry unset.
    pub fn new() -> Self {
        Self {
            cells: vec![CuInfo::default(); LCU_CU_STRIDE * LCU_CU_STRIDE],
            top_right: CuInfo::default(),
        }
    }

    #[inline]
    fn index(x: i32, y: i32) -> usize {
        assert!(
            (-4..LCU_WIDTH as i32).contains(&x) && (-4..LCU_WIDTH as i32).contains(&y),
            "CU grid position ({}, {}) outside LCU",
            x,
            y
        );
        (((x >> 2) + 1) + ((y >> 2) + 1) * LCU_CU_STRIDE as i32) as usize
    }

    /// CU at LCU-local luma position.
    #[inline]
    pub fn at(&self, x: i32, y: i32) -> &CuInfo {
        &self.cells[Self::index(x, y)]
    }

    /// Mutable CU at LCU-local luma position.
    #[inline]
    pub fn at_mut(&mut self, x: i32, y: i32) -> &mut CuInfo {
        &mut self.cells[Self::index(x, y)]
    }

    /// CU above-right of the LCU.
    pub fn top_right(&self) -> &CuInfo {
        &self.top_right
    }

    /// Mutable CU above-right of the LCU.
    pub fn top_right_mut(&mut self) -> &mut CuInfo {
        &mut self.top_right
    }

    /// Set the prediction fields of `cu` on every SCU of a rectangle.
    ///
    /// Transform fields (`tr_depth`, `cbf`, `tr_idx`, `joint_cb_cr`) are left
    /// untouched.
    pub fn fill_cu_info(&mut self, x: usize, y: usize, width: usize, height: usize, cu: &CuInfo) {
        for yy in (y..y + height).step_by(SCU_WIDTH) {
            for xx in (x..x + width).step_by(SCU_WIDTH) {
                let to = self.at_mut(xx as i32, yy as i32);
                to.cu_type = cu.cu_type;
                to.depth = cu.depth;
                to.part_size = cu.part_size;
                to.qp = cu.qp;
                if cu.cu_type == CuType::Intra {
                    to.intra = cu.intra;
                } else {
                    to.skipped = cu.skipped;
                    to.merged = cu.merged;
                    to.merge_idx = cu.merge_idx;
                    to.inter = cu.inter;
                }
            }
        }
    }

    /// Spread each PU's record, held at the PU's top-left SCU, over the PU.
    pub fn fill_inter(&mut self, x: usize, y: usize, cu_width: usize) {
        let part_mode = self.at(x as i32, y as i32).part_size;
        for i in 0..part_mode.num_parts() {
            let (x_pu, y_pu, w_pu, h_pu) = part_mode.pu_rect(cu_width, x, y, i);
            let pu = {
                let pu = self.at_mut(x_pu as i32, y_pu as i32);
                pu.cu_type = CuType::Inter;
                *pu
            };
            self.fill_cu_info(x_pu, y_pu, w_pu, h_pu, &pu);
        }
    }

    /// Copy the flags of each TU's top-left SCU to the rest of the TU.
    pub fn fill_cbf(&mut self, x: usize, y: usize, width: usize, cu: &CuInfo) {
        let tr_split = cu.tr_depth.saturating_sub(cu.depth);
        let mask = !((width >> tr_split) - 1);
        for yy in (y..y + width).step_by(SCU_WIDTH) {
            for xx in (x..x + width).step_by(SCU_WIDTH) {
                let (fx, fy) = (xx & mask, yy & mask);
                if (fx, fy) != (xx, yy) {
                    let from = self.at(fx as i32, fy as i32).cbf;
                    let to = &mut self.at_mut(xx as i32, yy as i32).cbf;
                    for color in Color::ALL {
                        to.copy_color(from, color);
                    }
                }
            }
        }
    }

    /// Set the transform depth of every SCU of the CU at (`x`, `y`).
    ///
    /// `x` and `y` may be picture coordinates; only their LCU-local part is used.
    pub fn fill_trdepth(&mut self, x: usize, y: usize, depth: u8, tr_depth: u8) {
        let (x_local, y_local) = (x % LCU_WIDTH, y % LCU_WIDTH);
        let width = LCU_WIDTH >> depth;
        for yy in (0..width).step_by(SCU_WIDTH) {
            for xx in (0..width).step_by(SCU_WIDTH) {
                self.at_mut((x_local + xx) as i32, (y_local + yy) as i32).tr_depth = tr_depth;
            }
        }
    }

    /// Copy the records of a square block from another grid.
    pub fn copy_block_from(&mut self, from: &LcuCuGrid, x: usize, y: usize, width: usize) {
        for yy in (y..y + width).step_by(SCU_WIDTH) {
            for xx in (x..x + width).step_by(SCU_WIDTH) {
                *self.at_mut(xx as i32, yy as i32) = *from.at(xx as i32, yy as i32);
            }
        }
    }
}

/// Picture-level CU grid.
#[derive(Debug, Clone)]
pub struct CuArray {
    width_scu: usize,
    height_scu: usize,
    cells: Vec<CuInfo>,
}

impl CuArray {
    /// Create a grid covering `width` x `height` luma samples, padded to whole LCUs.
    pub fn new(width: usize, height: usize) -> Self {
        let aligned_w = width.div_ceil(LCU_WIDTH) * LCU_WIDTH;
        let aligned_h = height.div_ceil(LCU_WIDTH) * LCU_WIDTH;
        let width_scu = aligned_w / SCU_WIDTH;
        let height_scu = aligned_h / SCU_WIDTH;
        Self {
            width_scu,
            height_scu,
            cells: vec![CuInfo::default(); width_scu * height_scu],
        }
    }

    /// CU at picture luma position.
    pub fn at(&self, x: usize, y: usize) -> &CuInfo {
        &self.cells[(x / SCU_WIDTH) + (y / SCU_WIDTH) * self.width_scu]
    }

    /// Mutable CU at picture luma position.
    pub fn at_mut(&mut self, x: usize, y: usize) -> &mut CuInfo {
        &mut self.cells[(x / SCU_WIDTH) + (y / SCU_WIDTH) * self.width_scu]
    }

    /// Width in SCUs.
    pub fn width_scu(&self) -> usize {
        self.width_scu
    }

    /// Height in SCUs.
    pub fn height_scu(&self) -> usize {
        self.height_scu
    }

    /// Store the inner CUs of an LCU grid at LCU origin (`x`, `y`).
    pub fn copy_from_lcu(&mut self, x: usize, y: usize, lcu: &LcuCuGrid) {
        for yy in (0..LCU_WIDTH).step_by(SCU_WIDTH) {
            for xx in (0..LCU_WIDTH).step_by(SCU_WIDTH) {
                *self.at_mut(x + xx, y + yy) = *lcu.at(xx as i32, yy as i32);
            }
        }
    }
}
