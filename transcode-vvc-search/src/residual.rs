//! Residual coding of transform trees.
//!
//! The search does not transform residuals itself. A [`ResidualCoder`] turns
//! a residual block into coefficient levels, reconstructs the residual the
//! decoder would see and estimates the signalling cost of the levels.
//! [`SpatialQuantizer`] is the built-in coder: a scalar quantizer in the
//! sample domain with a rough bit model.

use crate::cu::Cbf;
use crate::picture::Color;
use crate::search::SearchState;
use crate::work_tree::Lcu;
use crate::{clip_pixel, floor_log2, xy_to_zorder, Coeff, LCU_WIDTH, MAX_DEPTH, MAX_PU_DEPTH};

/// Quantizer inputs for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantParams {
    /// Quantization parameter.
    pub qp: u8,
    /// Component of the block.
    pub color: Color,
    /// Code the residual without loss.
    pub lossless: bool,
}

/// Transform and quantization collaborator.
pub trait ResidualCoder: Send + Sync + std::fmt::Debug {
    /// Quantize `residual` (row-major, `width` x `width`) into `coeffs` and
    /// overwrite `residual` with its reconstruction.
    ///
    /// Returns whether any coefficient is nonzero.
    fn quantize(&self, residual: &mut [i32], coeffs: &mut [Coeff], width: usize, params: &QuantParams) -> bool;

    /// Estimated bits of signalling `coeffs` of a `width` x `width` block.
    fn coeff_bits(&self, coeffs: &[Coeff], width: usize, color: Color) -> f64;
}

/// Quantization step in 1/64 units for `qp % 6`.
const STEP64: [i32; 6] = [40, 45, 51, 57, 64, 72];

/// Scalar sample-domain quantizer with a dead zone of two thirds of a step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialQuantizer;

impl SpatialQuantizer {
    /// Quantization step of `qp` in 1/64 sample units.
    pub fn step64(qp: u8) -> i32 {
        STEP64[(qp % 6) as usize] << (qp / 6)
    }
}

impl ResidualCoder for SpatialQuantizer {
    fn quantize(&self, residual: &mut [i32], coeffs: &mut [Coeff], width: usize, params: &QuantParams) -> bool {
        let n = width * width;
        let (residual, coeffs) = (&mut residual[..n], &mut coeffs[..n]);

        if params.lossless {
            let mut nonzero = false;
            for (c, &r) in coeffs.iter_mut().zip(residual.iter()) {
                *c = r as Coeff;
                nonzero |= r != 0;
            }
            return nonzero;
        }

        let step = Self::step64(params.qp) as i64;
        let mut nonzero = false;
        for (c, r) in coeffs.iter_mut().zip(residual.iter_mut()) {
            let negative = *r < 0;
            let abs = (*r).unsigned_abs() as i64;
            let level = ((abs * 64 + step / 3) / step).min(Coeff::MAX as i64);
            let rec = ((level * step + 32) >> 6) as i32;
            *c = (if negative { -level } else { level }) as Coeff;
            *r = if negative { -rec } else { rec };
            nonzero |= level != 0;
        }
        nonzero
    }

    fn coeff_bits(&self, coeffs: &[Coeff], width: usize, _color: Color) -> f64 {
        let n = width * width;
        let coeffs = &coeffs[..n];
        let Some(last) = coeffs.iter().rposition(|&c| c != 0) else {
            return 0.0;
        };
        // Last position, then a significance bin per coefficient up to it.
        let mut bits = 2.0 * floor_log2(n as u32) as f64;
        for &c in &coeffs[..=last] {
            if c == 0 {
                bits += 0.5;
            } else {
                let abs = c.unsigned_abs() as u32;
                // Significance, sign and an Exp-Golomb coded remainder.
                bits += 2.0 + (2 * floor_log2(abs) + 1) as f64;
            }
        }
        bits
    }
}

/// Width in samples of `color` of a transform block at `depth`.
#[inline]
pub(crate) fn tb_width(depth: u8, color: Color) -> usize {
    if color.is_chroma() {
        if depth == MAX_PU_DEPTH {
            4
        } else {
            (LCU_WIDTH >> depth) / 2
        }
    } else {
        LCU_WIDTH >> depth
    }
}

/// Code the residual of the transform tree of the CU at picture (`x`, `y`),
/// replacing the prediction in the LCU reconstruction and setting the CBF
/// bits of coded blocks.
pub(crate) fn quantize_lcu_residual(
    state: &SearchState<'_>,
    lcu: &mut Lcu,
    luma: bool,
    chroma: bool,
    x: usize,
    y: usize,
    depth: u8,
) {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let width = LCU_WIDTH >> depth;

    let tr_depth = {
        let cur = lcu.cu.at_mut(xl, yl);
        if luma {
            cur.cbf.clear(depth, Color::Y);
        }
        if chroma {
            cur.cbf.clear(depth, Color::U);
            cur.cbf.clear(depth, Color::V);
        }
        cur.tr_depth
    };

    if depth == 0 || tr_depth > depth {
        let offset = width / 2;
        quantize_lcu_residual(state, lcu, luma, chroma, x, y, depth + 1);
        quantize_lcu_residual(state, lcu, luma, chroma, x + offset, y, depth + 1);
        quantize_lcu_residual(state, lcu, luma, chroma, x, y + offset, depth + 1);
        quantize_lcu_residual(state, lcu, luma, chroma, x + offset, y + offset, depth + 1);

        if depth <= MAX_DEPTH {
            let off = offset as i32;
            let children: [Cbf; 4] = [
                lcu.cu.at(xl, yl).cbf,
                lcu.cu.at(xl + off, yl).cbf,
                lcu.cu.at(xl, yl + off).cbf,
                lcu.cu.at(xl + off, yl + off).cbf,
            ];
            let cbf = &mut lcu.cu.at_mut(xl, yl).cbf;
            if luma {
                cbf.set_conditionally(&children, depth, Color::Y);
            }
            if chroma {
                cbf.set_conditionally(&children, depth, Color::U);
                cbf.set_conditionally(&children, depth, Color::V);
            }
        }
    } else {
        // A 4x4 luma quad shares one 4x4 chroma block, coded with its first member.
        let chroma = chroma && (depth < MAX_PU_DEPTH || (x % 8 == 0 && y % 8 == 0));
        if luma {
            quantize_tr_residual(state, lcu, Color::Y, x, y, depth);
        }
        if chroma {
            quantize_tr_residual(state, lcu, Color::U, x, y, depth);
            quantize_tr_residual(state, lcu, Color::V, x, y, depth);
            if state.cfg.jccr {
                quantize_joint_residual(state, lcu, x, y, depth);
            }
        }
    }
}

/// Sample offset and coefficient offset of a transform block in the LCU.
fn tb_offsets(x: usize, y: usize, color: Color) -> (usize, usize, usize) {
    let shift = color.shift();
    let lcu_width = LCU_WIDTH >> shift;
    let (px, py) = ((x % LCU_WIDTH) >> shift, (y % LCU_WIDTH) >> shift);
    (px + py * lcu_width, xy_to_zorder(lcu_width, px, py), lcu_width)
}

fn quantize_tr_residual(state: &SearchState<'_>, lcu: &mut Lcu, color: Color, x: usize, y: usize, depth: u8) {
    let width = tb_width(depth, color);
    let (offset, z, lcu_width) = tb_offsets(x, y, color);

    let mut residual = [0i32; 32 * 32];
    {
        let orig = lcu.orig.plane(color);
        let pred = lcu.rec.plane(color);
        for row in 0..width {
            for col in 0..width {
                let i = offset + row * lcu_width + col;
                residual[row * width + col] = orig[i] as i32 - pred[i] as i32;
            }
        }
    }

    let params = QuantParams {
        qp: state.frame.qp,
        color,
        lossless: state.cfg.lossless,
    };
    let coeffs = &mut lcu.coeff.plane_mut(color)[z..z + width * width];
    let has_coeffs = state.residual.quantize(&mut residual, coeffs, width, &params);

    if has_coeffs {
        let rec = lcu.rec.plane_mut(color);
        for row in 0..width {
            for col in 0..width {
                let i = offset + row * lcu_width + col;
                rec[i] = clip_pixel(rec[i] as i32 + residual[row * width + col]);
            }
        }
        lcu.cu
            .at_mut((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32)
            .cbf
            .set(depth, color);
    }
}

/// Code `(resCb - resCr) / 2` as one residual, reconstructing Cb with it
/// and Cr with its negation into the joint buffers.
fn quantize_joint_residual(state: &SearchState<'_>, lcu: &mut Lcu, x: usize, y: usize, depth: u8) {
    let width = tb_width(depth, Color::U);
    let (offset, z, lcu_width) = tb_offsets(x, y, Color::U);

    let mut residual = [0i32; 32 * 32];
    for row in 0..width {
        for col in 0..width {
            let i = offset + row * lcu_width + col;
            let res_u = lcu.orig.u[i] as i32 - lcu.rec_joint_u[i] as i32;
            let res_v = lcu.orig.v[i] as i32 - lcu.rec_joint_v[i] as i32;
            residual[row * width + col] = (res_u - res_v) / 2;
        }
    }

    let params = QuantParams {
        qp: state.frame.qp,
        color: Color::U,
        lossless: state.cfg.lossless,
    };
    let coeffs = &mut lcu.coeff.joint_uv[z..z + width * width];
    let has_coeffs = state.residual.quantize(&mut residual, coeffs, width, &params);

    if has_coeffs {
        for row in 0..width {
            for col in 0..width {
                let i = offset + row * lcu_width + col;
                let r = residual[row * width + col];
                lcu.rec_joint_u[i] = clip_pixel(lcu.rec_joint_u[i] as i32 + r);
                lcu.rec_joint_v[i] = clip_pixel(lcu.rec_joint_v[i] as i32 - r);
            }
        }
    }
    lcu.cu.at_mut((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32).joint_cb_cr = if has_coeffs { 3 } else { 0 };
}
