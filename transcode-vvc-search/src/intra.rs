//! Intra prediction and intra CU reconstruction.
//!
//! Modes: 0 planar, 1 DC, 2..=66 angular (18 horizontal, 50 vertical) and
//! 81..=83 cross-component (see [`crate::cclm`]).

use crate::cclm;
use crate::filter::filter;
use crate::kernels::PixelKernels;
use crate::picture::Color;
use crate::reference::{build_reference, IntraReferences, ReferenceRequest};
use crate::residual::quantize_lcu_residual;
use crate::search::SearchState;
use crate::work_tree::Lcu;
use crate::{clip_pixel, floor_log2, Pixel, LCU_WIDTH, LOG2_LCU_WIDTH, MAX_DEPTH, MAX_PU_DEPTH};

/// Planar mode.
pub const PLANAR_IDX: u8 = 0;
/// DC mode.
pub const DC_IDX: u8 = 1;
/// Pure horizontal mode.
pub const HOR_IDX: u8 = 18;
/// Pure vertical mode.
pub const VER_IDX: u8 = 50;
/// Number of luma intra modes.
pub const NUM_INTRA_MODES: u8 = 67;
/// CCLM using top and left templates.
pub const LM_CHROMA_IDX: u8 = 81;
/// CCLM using the left template.
pub const LM_CHROMA_L_IDX: u8 = 82;
/// CCLM using the top template.
pub const LM_CHROMA_T_IDX: u8 = 83;

/// Sample displacement per row in 1/32 samples, by distance from pure H/V.
const MODEDISP2SAMPLEDISP: [i32; 32] = [
    0, 1, 2, 3, 4, 6, 8, 10, 12, 14, 16, 18, 20, 23, 26, 29, 32, 35, 39, 45, 51, 57, 64, 73, 86,
    102, 128, 171, 256, 341, 512, 1024,
];

/// `512 * 32 / sample displacement`.
const MODEDISP2INVSAMPLEDISP: [i32; 32] = [
    0, 16384, 8192, 5461, 4096, 2731, 2048, 1638, 1365, 1170, 1024, 910, 819, 712, 630, 565, 512,
    468, 420, 364, 321, 287, 256, 224, 191, 161, 128, 96, 64, 48, 32, 16,
];

/// Largest distance from pure H/V at which angular modes keep unfiltered
/// references, by log2 width.
const HOR_VER_DIST_THRES: [u32; 8] = [24, 24, 24, 14, 2, 0, 0, 0];

/// Largest block width the predictor handles.
const MAX_WIDTH: usize = 32;

/// Whether a mode reads the smoothed references.
fn uses_filtered_reference(smoothing: bool, log2_width: u32, mode: u8, color: Color) -> bool {
    let width = 1u32 << log2_width;
    if !smoothing || color.is_chroma() || mode == DC_IDX || width == 4 {
        return false;
    }
    if mode == PLANAR_IDX {
        return width * width > 32;
    }
    let threshold = HOR_VER_DIST_THRES[log2_width as usize];
    let dist = (mode as i32 - VER_IDX as i32)
        .abs()
        .min((mode as i32 - HOR_IDX as i32).abs()) as u32;
    if dist <= threshold {
        return false;
    }
    let mode_disp = if mode >= 34 {
        mode as i32 - VER_IDX as i32
    } else {
        HOR_IDX as i32 - mode as i32
    };
    MODEDISP2SAMPLEDISP[mode_disp.unsigned_abs() as usize] & 0x1f == 0
}

/// Predict a `width` x `width` block into `dst` (row-major, stride `width`).
///
/// Computes the smoothed references on first use.
pub fn predict(
    smoothing: bool,
    refs: &mut IntraReferences,
    log2_width: u32,
    mode: u8,
    color: Color,
    dst: &mut [Pixel],
    kernels: &PixelKernels,
) {
    assert!((2..=5).contains(&log2_width), "log2 width {} outside 2..=5", log2_width);
    assert!(mode < NUM_INTRA_MODES, "mode {} is not a luma intra mode", mode);
    let width = 1usize << log2_width;
    debug_assert_eq!(refs.width(), width);
    let dst = &mut dst[..width * width];

    let filtered = uses_filtered_reference(smoothing, log2_width, mode, color);
    if filtered {
        filter(refs, log2_width);
    }
    let (top, left) = if filtered {
        (refs.filtered_top(), refs.filtered_left())
    } else {
        (refs.top(), refs.left())
    };

    match mode {
        PLANAR_IDX => pred_planar(log2_width, top, left, dst),
        DC_IDX => pred_dc(log2_width, top, left, dst),
        _ => pred_angular(log2_width, mode, top, left, dst, kernels),
    }

    if mode == PLANAR_IDX || mode == DC_IDX {
        pdpc_planar_dc(log2_width, top, left, dst);
    }
}

fn pred_planar(log2_width: u32, top: &[Pixel], left: &[Pixel], dst: &mut [Pixel]) {
    let width = 1usize << log2_width;
    let top_right = top[width + 1] as u32;
    let bottom_left = left[width + 1] as u32;
    for y in 0..width {
        for x in 0..width {
            let hor = (width - 1 - x) as u32 * left[y + 1] as u32 + (x + 1) as u32 * top_right;
            let ver = (width - 1 - y) as u32 * top[x + 1] as u32 + (y + 1) as u32 * bottom_left;
            dst[y * width + x] = ((hor + ver + width as u32) >> (log2_width + 1)) as Pixel;
        }
    }
}

fn pred_dc(log2_width: u32, top: &[Pixel], left: &[Pixel], dst: &mut [Pixel]) {
    let width = 1usize << log2_width;
    let sum: u32 = top[1..=width]
        .iter()
        .chain(&left[1..=width])
        .map(|&p| p as u32)
        .sum();
    let denom = (width as u32) << 1;
    let dc = ((sum + (denom >> 1)) >> floor_log2(denom)) as Pixel;
    dst.fill(dc);
}

/// Position-dependent blend of planar/DC output with the boundary samples.
fn pdpc_planar_dc(log2_width: u32, top: &[Pixel], left: &[Pixel], dst: &mut [Pixel]) {
    let width = 1usize << log2_width;
    let scale = (log2_width + log2_width - 2) >> 2;
    for y in 0..width {
        let w_t = 32 >> (((y as u32) << 1) >> scale).min(31);
        for x in 0..width {
            let w_l = 32 >> (((x as u32) << 1) >> scale).min(31);
            let d = dst[y * width + x] as i32;
            let l = left[y + 1] as i32;
            let t = top[x + 1] as i32;
            dst[y * width + x] = (d + ((w_l * (l - d) + w_t * (t - d) + 32) >> 6)) as Pixel;
        }
    }
}

fn pred_angular(
    log2_width: u32,
    mode: u8,
    top: &[Pixel],
    left: &[Pixel],
    dst: &mut [Pixel],
    kernels: &PixelKernels,
) {
    debug_assert!((2..NUM_INTRA_MODES).contains(&mode));
    let width = 1usize << log2_width;
    let vertical = mode >= 34;
    let mode_disp = if vertical {
        mode as i32 - VER_IDX as i32
    } else {
        HOR_IDX as i32 - mode as i32
    };
    let abs_disp = mode_disp.unsigned_abs() as usize;
    let sample_disp = mode_disp.signum() * MODEDISP2SAMPLEDISP[abs_disp];
    let inv_angle = MODEDISP2INVSAMPLEDISP[abs_disp];

    let (in_main, in_side) = if vertical { (top, left) } else { (left, top) };

    // Both buffers are indexed from `origin`, leaving room for the inverse
    // projected samples at negative positions.
    const BUF_LEN: usize = 5 * MAX_WIDTH + 3;
    let origin = width;
    let mut main = [0 as Pixel; BUF_LEN];
    let mut side = [0 as Pixel; BUF_LEN];

    if sample_disp < 0 {
        main[origin..=origin + width].copy_from_slice(&in_main[..=width]);
        side[origin..=origin + width].copy_from_slice(&in_side[..=width]);
        for i in 1..=width {
            let idx = ((i as i32 * inv_angle + 256) >> 9).min(width as i32) as usize;
            main[origin - i] = side[origin + idx];
        }
    } else {
        main[origin..=origin + 2 * width].copy_from_slice(&in_main[..=2 * width]);
        side[origin..=origin + 2 * width].copy_from_slice(&in_side[..=2 * width]);
        let val = main[origin + 2 * width];
        main[origin + 2 * width + 1..=origin + 4 * width + 2].fill(val);
    }

    if sample_disp != 0 {
        let angular_scale = if mode_disp > 0 {
            let pre_scale = floor_log2((3 * inv_angle - 2) as u32) as i32 - 8;
            Some((log2_width as i32 - pre_scale).min(2)).filter(|&s| s >= 0)
        } else {
            None
        };

        for y in 0..width {
            let delta_pos = (y as i32 + 1) * sample_disp;
            let delta_int = delta_pos >> 5;
            let delta_fract = delta_pos & 31;
            let base = (origin as i32 + delta_int + 1) as usize;
            let row = &mut dst[y * width..(y + 1) * width];

            if sample_disp.abs() & 0x1f != 0 {
                (kernels.angular_interp)(&main[base..=base + width], delta_fract, row);
            } else {
                row.copy_from_slice(&main[base..base + width]);
            }

            if let Some(scale) = angular_scale {
                let mut inv_angle_sum = 256;
                for x in 0..(3usize << scale).min(width) {
                    inv_angle_sum += inv_angle;
                    let w_l = 32 >> ((2 * x as u32) >> scale);
                    let l = side[origin + y + (inv_angle_sum >> 9) as usize + 1] as i32;
                    let d = row[x] as i32;
                    row[x] = (d + ((w_l * (l - d) + 32) >> 6)) as Pixel;
                }
            }
        }
    } else {
        let scale = (log2_width + log2_width - 2) >> 2;
        let top_left = main[origin] as i32;
        for y in 0..width {
            let row = &mut dst[y * width..(y + 1) * width];
            row.copy_from_slice(&main[origin + 1..=origin + width]);
            let l = side[origin + 1 + y] as i32;
            for x in 0..(3usize << scale).min(width) {
                let w_l = 32 >> ((2 * x as u32) >> scale);
                row[x] = clip_pixel(row[x] as i32 + ((w_l * (l - top_left) + 32) >> 6));
            }
        }
    }

    if !vertical {
        for y in 0..width - 1 {
            for x in y + 1..width {
                dst.swap(y * width + x, x * width + y);
            }
        }
    }
}

/// Reconstruct the luma and/or chroma of an intra CU into `lcu`.
///
/// `mode_luma` or `mode_chroma` set to `None` skips that component. The CU's
/// CBF bits of the reconstructed components are cleared first and rebuilt
/// from the transform tree.
pub(crate) fn intra_recon_cu(
    state: &SearchState<'_>,
    lcu: &mut Lcu,
    x: usize,
    y: usize,
    depth: u8,
    mode_luma: Option<u8>,
    mode_chroma: Option<u8>,
) {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let width = LCU_WIDTH >> depth;

    let tr_depth = {
        let cur = lcu.cu.at_mut(xl, yl);
        if mode_luma.is_some() {
            cur.cbf.clear(depth, Color::Y);
        }
        if mode_chroma.is_some() {
            cur.cbf.clear(depth, Color::U);
            cur.cbf.clear(depth, Color::V);
        }
        cur.tr_depth
    };

    if depth == 0 || tr_depth > depth {
        let offset = width / 2;
        intra_recon_cu(state, lcu, x, y, depth + 1, mode_luma, mode_chroma);
        intra_recon_cu(state, lcu, x + offset, y, depth + 1, mode_luma, mode_chroma);
        intra_recon_cu(state, lcu, x, y + offset, depth + 1, mode_luma, mode_chroma);
        intra_recon_cu(state, lcu, x + offset, y + offset, depth + 1, mode_luma, mode_chroma);

        let off = offset as i32;
        let children = [
            lcu.cu.at(xl, yl).cbf,
            lcu.cu.at(xl + off, yl).cbf,
            lcu.cu.at(xl, yl + off).cbf,
            lcu.cu.at(xl + off, yl + off).cbf,
        ];
        if depth <= MAX_DEPTH {
            let cbf = &mut lcu.cu.at_mut(xl, yl).cbf;
            if mode_luma.is_some() {
                cbf.set_conditionally(&children, depth, Color::Y);
            }
            if mode_chroma.is_some() {
                cbf.set_conditionally(&children, depth, Color::U);
                cbf.set_conditionally(&children, depth, Color::V);
            }
        }
    } else {
        let has_luma = mode_luma.is_some();
        let has_chroma = mode_chroma.is_some() && x % 8 == 0 && y % 8 == 0;
        if let Some(mode) = mode_luma {
            recon_tb_leaf(state, lcu, x, y, depth, mode, Color::Y);
        }
        if let (true, Some(mode)) = (has_chroma, mode_chroma) {
            recon_tb_leaf(state, lcu, x, y, depth, mode, Color::U);
            recon_tb_leaf(state, lcu, x, y, depth, mode, Color::V);
        }
        quantize_lcu_residual(state, lcu, has_luma, has_chroma, x, y, depth);
    }
}

/// Predict one transform block into the LCU reconstruction.
fn recon_tb_leaf(state: &SearchState<'_>, lcu: &mut Lcu, x: usize, y: usize, depth: u8, mode: u8, color: Color) {
    let shift = color.shift();
    let mut log2_width = LOG2_LCU_WIDTH - depth as u32;
    if color.is_chroma() && depth < MAX_PU_DEPTH {
        log2_width -= 1;
    }
    let width = 1usize << log2_width;
    let lcu_width = LCU_WIDTH >> shift;

    let req = ReferenceRequest {
        log2_width,
        color,
        luma_x: x,
        luma_y: y,
        pic_width: state.pic.width(),
        pic_height: state.pic.height(),
        wpp: state.cfg.wpp,
    };
    let mut refs = IntraReferences::new();
    build_reference(&req, &lcu.borders(color), &mut refs);

    let mut pred = [0 as Pixel; MAX_WIDTH * MAX_WIDTH];
    if mode < NUM_INTRA_MODES {
        predict(state.cfg.intra_smoothing, &mut refs, log2_width, mode, color, &mut pred, state.kernels);
    } else {
        cclm::predict_cclm(state, lcu, color, width, x, y, mode, &refs, &mut pred);
    }

    let index = ((x % LCU_WIDTH) >> shift) + ((y % LCU_WIDTH) >> shift) * lcu_width;
    let blit = state.kernels.blit;
    blit(&pred, width, &mut lcu.rec.plane_mut(color)[index..], lcu_width, width, width);
    if color.is_chroma() && state.cfg.jccr {
        blit(&pred, width, &mut lcu.rec_joint_mut(color)[index..], lcu_width, width, width);
    }
}
