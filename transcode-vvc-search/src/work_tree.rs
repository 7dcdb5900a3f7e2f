//! Per-LCU scratch state and the depth-indexed work tree.
//!
//! The search keeps one [`Lcu`] per quadtree depth. Candidates at depth `d`
//! are evaluated in level `d`; a split decision copies the children's
//! results from level `d + 1` up, a no-split decision copies level `d` down
//! so that deeper levels see the committed neighbors.

use crate::config::ChromaFormat;
use crate::cu::LcuCuGrid;
use crate::picture::{Color, Picture, Planes};
use crate::reference::LcuBorders;
use crate::{
    xy_to_zorder, Coeff, Pixel, LCU_CHROMA_SIZE, LCU_LUMA_SIZE, LCU_REF_PX_WIDTH, LCU_WIDTH, LCU_WIDTH_C,
    MAX_PU_DEPTH, SCU_WIDTH,
};

/// Coefficients of one LCU, every transform block stored contiguously in
/// z-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcuCoeffs {
    /// Luma coefficients.
    pub y: Vec<Coeff>,
    /// Cb coefficients.
    pub u: Vec<Coeff>,
    /// Cr coefficients.
    pub v: Vec<Coeff>,
    /// Joint Cb-Cr coefficients.
    pub joint_uv: Vec<Coeff>,
}

impl Default for LcuCoeffs {
    fn default() -> Self {
        Self::new()
    }
}

impl LcuCoeffs {
    /// Create zeroed buffers.
    pub fn new() -> Self {
        Self {
            y: vec![0; LCU_LUMA_SIZE],
            u: vec![0; LCU_CHROMA_SIZE],
            v: vec![0; LCU_CHROMA_SIZE],
            joint_uv: vec![0; LCU_CHROMA_SIZE],
        }
    }

    /// Coefficients of `color`.
    pub fn plane(&self, color: Color) -> &[Coeff] {
        match color {
            Color::Y => &self.y,
            Color::U => &self.u,
            Color::V => &self.v,
        }
    }

    /// Mutable coefficients of `color`.
    pub fn plane_mut(&mut self, color: Color) -> &mut [Coeff] {
        match color {
            Color::Y => &mut self.y,
            Color::U => &mut self.u,
            Color::V => &mut self.v,
        }
    }
}

fn lcu_planes(luma: usize, chroma: usize) -> Planes {
    Planes {
        y: vec![0; luma],
        u: vec![0; chroma],
        v: vec![0; chroma],
    }
}

/// Scratch state of one LCU at one depth.
#[derive(Debug, Clone)]
pub struct Lcu {
    /// Source samples.
    pub orig: Planes,
    /// Reconstruction (prediction before residual coding).
    pub rec: Planes,
    /// Cb reconstruction with the joint Cb-Cr residual.
    pub rec_joint_u: Vec<Pixel>,
    /// Cr reconstruction with the joint Cb-Cr residual.
    pub rec_joint_v: Vec<Pixel>,
    /// Coefficients.
    pub coeff: LcuCoeffs,
    /// Reconstructed row above the LCU, index 0 is the corner.
    pub top_ref: Planes,
    /// Reconstructed column left of the LCU, index 0 is the corner.
    pub left_ref: Planes,
    /// CU records with the neighbor border.
    pub cu: LcuCuGrid,
    chroma_format: ChromaFormat,
}

impl Lcu {
    /// Create a blank LCU state.
    pub fn new(chroma_format: ChromaFormat) -> Self {
        Self {
            orig: lcu_planes(LCU_LUMA_SIZE, LCU_CHROMA_SIZE),
            rec: lcu_planes(LCU_LUMA_SIZE, LCU_CHROMA_SIZE),
            rec_joint_u: vec![0; LCU_CHROMA_SIZE],
            rec_joint_v: vec![0; LCU_CHROMA_SIZE],
            coeff: LcuCoeffs::new(),
            top_ref: lcu_planes(LCU_REF_PX_WIDTH + 1, LCU_REF_PX_WIDTH / 2 + 1),
            left_ref: lcu_planes(LCU_WIDTH + 1, LCU_WIDTH_C + 1),
            cu: LcuCuGrid::new(),
            chroma_format,
        }
    }

    /// Whether chroma planes are searched.
    pub fn has_chroma(&self) -> bool {
        self.chroma_format.has_chroma()
    }

    /// Reconstruction and borders of `color` for reference construction.
    pub fn borders(&self, color: Color) -> LcuBorders<'_> {
        LcuBorders {
            rec: self.rec.plane(color),
            top_ref: self.top_ref.plane(color),
            left_ref: self.left_ref.plane(color),
        }
    }

    /// Joint Cb-Cr reconstruction of a chroma `color`.
    pub fn rec_joint(&self, color: Color) -> &[Pixel] {
        match color {
            Color::V => &self.rec_joint_v,
            _ => &self.rec_joint_u,
        }
    }

    pub(crate) fn rec_joint_mut(&mut self, color: Color) -> &mut [Pixel] {
        match color {
            Color::V => &mut self.rec_joint_v,
            _ => &mut self.rec_joint_u,
        }
    }

    /// Load the LCU at picture (`x`, `y`): neighbor CU records, reference
    /// borders from the committed reconstruction and source samples.
    pub fn init(&mut self, pic: &Picture, x: usize, y: usize, wpp: bool) {
        assert!(x % LCU_WIDTH == 0 && y % LCU_WIDTH == 0, "LCU origin ({}, {}) not aligned", x, y);
        let (pic_w, pic_h) = (pic.width(), pic.height());

        self.cu = LcuCuGrid::new();
        self.coeff = LcuCoeffs::new();
        for planes in [&mut self.rec, &mut self.orig, &mut self.top_ref, &mut self.left_ref] {
            planes.y.fill(0);
            planes.u.fill(0);
            planes.v.fill(0);
        }
        self.rec_joint_u.fill(0);
        self.rec_joint_v.fill(0);

        // Neighbor CU records.
        if y > 0 {
            for i in (0..LCU_WIDTH).step_by(SCU_WIDTH).filter(|i| x + i < pic_w) {
                *self.cu.at_mut(i as i32, -1) = *pic.cu_array.at(x + i, y - 1);
            }
        }
        if x > 0 {
            for i in (0..LCU_WIDTH).step_by(SCU_WIDTH).filter(|i| y + i < pic_h) {
                *self.cu.at_mut(-1, i as i32) = *pic.cu_array.at(x - 1, y + i);
            }
        }
        if x > 0 && y > 0 {
            *self.cu.at_mut(-1, -1) = *pic.cu_array.at(x - 1, y - 1);
        }
        if y > 0 && x + LCU_WIDTH < pic_w && !wpp {
            *self.cu.top_right_mut() = *pic.cu_array.at(x + LCU_WIDTH, y - 1);
        }

        let colors: &[Color] = if self.has_chroma() { &Color::ALL } else { &[Color::Y] };
        for &color in colors {
            let shift = color.shift();
            let stride = pic.stride(color);
            let (cx, cy) = (x >> shift, y >> shift);
            let rec = pic.rec.plane(color);

            // Row above, from the corner to as far right as the picture goes.
            if y > 0 {
                let x_max = LCU_REF_PX_WIDTH.min(pic_w - x) >> shift;
                let row = (cy - 1) * stride;
                let top = self.top_ref.plane_mut(color);
                top[1..=x_max].copy_from_slice(&rec[row + cx..row + cx + x_max]);
                if x > 0 {
                    top[0] = rec[row + cx - 1];
                }
            }
            // Column to the left.
            if x > 0 {
                let y_max = LCU_WIDTH.min(pic_h - y) >> shift;
                let left = self.left_ref.plane_mut(color);
                for i in 0..y_max {
                    left[i + 1] = rec[(cy + i) * stride + cx - 1];
                }
                if y > 0 {
                    left[0] = rec[(cy - 1) * stride + cx - 1];
                }
            }

            // Source samples, clipped to the picture.
            let lcu_stride = LCU_WIDTH >> shift;
            let w = (LCU_WIDTH.min(pic_w - x)) >> shift;
            let h = (LCU_WIDTH.min(pic_h - y)) >> shift;
            let src = pic.source.plane(color);
            let orig = self.orig.plane_mut(color);
            for row in 0..h {
                let s = (cy + row) * stride + cx;
                orig[row * lcu_stride..row * lcu_stride + w].copy_from_slice(&src[s..s + w]);
            }
        }
    }

    /// Write the committed CU records and reconstruction to the picture.
    pub fn copy_to_picture(&self, pic: &mut Picture, x: usize, y: usize) {
        pic.cu_array.copy_from_lcu(x, y, &self.cu);

        let (pic_w, pic_h) = (pic.width(), pic.height());
        let colors: &[Color] = if self.has_chroma() { &Color::ALL } else { &[Color::Y] };
        for &color in colors {
            let shift = color.shift();
            let stride = pic.stride(color);
            let lcu_stride = LCU_WIDTH >> shift;
            let w = (LCU_WIDTH.min(pic_w - x)) >> shift;
            let h = (LCU_WIDTH.min(pic_h - y)) >> shift;
            let (cx, cy) = (x >> shift, y >> shift);
            let src = self.rec.plane(color);
            let dst = pic.rec.plane_mut(color);
            for row in 0..h {
                let d = (cy + row) * stride + cx;
                dst[d..d + w].copy_from_slice(&src[row * lcu_stride..row * lcu_stride + w]);
            }
        }
    }
}

/// Copy the CU records of a square block.
pub(crate) fn copy_cu_info(x_local: usize, y_local: usize, width: usize, from: &Lcu, to: &mut Lcu) {
    to.cu.copy_block_from(&from.cu, x_local, y_local, width);
}

/// Copy the reconstruction of a square block.
pub(crate) fn copy_cu_pixels(x_local: usize, y_local: usize, width: usize, from: &Lcu, to: &mut Lcu) {
    let colors: &[Color] = if from.has_chroma() { &Color::ALL } else { &[Color::Y] };
    for &color in colors {
        let shift = color.shift();
        let stride = LCU_WIDTH >> shift;
        let w = width >> shift;
        let index = (x_local >> shift) + (y_local >> shift) * stride;
        let src = from.rec.plane(color);
        let dst = to.rec.plane_mut(color);
        for row in 0..w {
            let i = index + row * stride;
            dst[i..i + w].copy_from_slice(&src[i..i + w]);
        }
    }
}

/// Copy the coefficients of a square block.
pub(crate) fn copy_cu_coeffs(x_local: usize, y_local: usize, width: usize, from: &Lcu, to: &mut Lcu, joint: bool) {
    let z = xy_to_zorder(LCU_WIDTH, x_local, y_local);
    let n = width * width;
    to.coeff.y[z..z + n].copy_from_slice(&from.coeff.y[z..z + n]);

    if from.has_chroma() {
        let z = xy_to_zorder(LCU_WIDTH_C, x_local >> 1, y_local >> 1);
        let n = (width >> 1) * (width >> 1);
        to.coeff.u[z..z + n].copy_from_slice(&from.coeff.u[z..z + n]);
        to.coeff.v[z..z + n].copy_from_slice(&from.coeff.v[z..z + n]);
        if joint {
            to.coeff.joint_uv[z..z + n].copy_from_slice(&from.coeff.joint_uv[z..z + n]);
        }
    }
}

/// Zero the coefficients of a square block.
pub(crate) fn clear_cu_coeffs(x_local: usize, y_local: usize, width: usize, lcu: &mut Lcu) {
    let z = xy_to_zorder(LCU_WIDTH, x_local, y_local);
    lcu.coeff.y[z..z + width * width].fill(0);

    if lcu.has_chroma() {
        let z = xy_to_zorder(LCU_WIDTH_C, x_local >> 1, y_local >> 1);
        let n = (width >> 1) * (width >> 1);
        for plane in [&mut lcu.coeff.u, &mut lcu.coeff.v, &mut lcu.coeff.joint_uv] {
            plane[z..z + n].fill(0);
        }
    }
}

/// One [`Lcu`] per depth 0..=4.
#[derive(Debug, Clone)]
pub struct WorkTree {
    levels: Vec<Lcu>,
}

impl WorkTree {
    /// Allocate every level.
    pub fn new(chroma_format: ChromaFormat) -> Self {
        Self {
            levels: vec![Lcu::new(chroma_format); MAX_PU_DEPTH as usize + 1],
        }
    }

    /// Load the LCU at picture (`x`, `y`) into every level.
    pub fn init(&mut self, pic: &Picture, x: usize, y: usize, wpp: bool) {
        let (first, rest) = self.levels.split_at_mut(1);
        first[0].init(pic, x, y, wpp);
        for level in rest {
            level.clone_from(&first[0]);
        }
    }

    /// Level of `depth`.
    pub fn level(&self, depth: u8) -> &Lcu {
        &self.levels[depth as usize]
    }

    /// Mutable level of `depth`.
    pub fn level_mut(&mut self, depth: u8) -> &mut Lcu {
        &mut self.levels[depth as usize]
    }

    /// Levels `depth` and `depth + 1`.
    pub fn pair_mut(&mut self, depth: u8) -> (&mut Lcu, &mut Lcu) {
        let (upper, lower) = self.levels.split_at_mut(depth as usize + 1);
        (&mut upper[depth as usize], &mut lower[0])
    }

    /// Take the results of a split from level `depth + 1` into level `depth`.
    pub fn copy_up(&mut self, x_local: usize, y_local: usize, depth: u8, joint: bool) {
        let width = LCU_WIDTH >> depth;
        let (to, from) = self.pair_mut(depth);
        copy_cu_info(x_local, y_local, width, from, to);
        copy_cu_pixels(x_local, y_local, width, from, to);
        copy_cu_coeffs(x_local, y_local, width, from, to, joint);
    }

    /// Propagate the decision at level `depth` to every deeper level.
    pub fn copy_down(&mut self, x_local: usize, y_local: usize, depth: u8) {
        let width = LCU_WIDTH >> depth;
        let (upper, lower) = self.levels.split_at_mut(depth as usize + 1);
        let from = &upper[depth as usize];
        for to in lower {
            copy_cu_info(x_local, y_local, width, from, to);
            copy_cu_pixels(x_local, y_local, width, from, to);
        }
    }
}
