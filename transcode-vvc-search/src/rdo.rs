//! Rate-distortion cost terms.
//!
//! Distortion is the SSD between the LCU's source and reconstruction, rate is
//! a fractional bit estimate from the read-only context set plus the residual
//! coder's coefficient estimate. Luma SSD is weighted by [`LUMA_MULT`];
//! chroma costs returned here are unweighted and use the chroma lambda.

use crate::cabac::ContextSet;
use crate::cu::{CuInfo, CuType};
use crate::intra::LM_CHROMA_IDX;
use crate::mpm::{get_dir_luma_predictor, MpmList};
use crate::picture::Color;
use crate::residual::tb_width;
use crate::search::SearchState;
use crate::work_tree::Lcu;
use crate::{xy_to_zorder, LCU_WIDTH, LCU_WIDTH_C, LUMA_MULT, MAX_PU_DEPTH, SCU_WIDTH};

/// RD cost of the luma transform tree of `pred_cu` at LCU-local (`x_px`, `y_px`).
pub(crate) fn cu_rd_cost_luma(
    state: &SearchState<'_>,
    x_px: usize,
    y_px: usize,
    depth: u8,
    pred_cu: &CuInfo,
    lcu: &Lcu,
) -> f64 {
    assert!(x_px < LCU_WIDTH && y_px < LCU_WIDTH);
    let width = LCU_WIDTH >> depth;
    let tr_cu = lcu.cu.at(x_px as i32, y_px as i32);

    if tr_cu.tr_depth > depth {
        let offset = width / 2;
        return cu_rd_cost_luma(state, x_px, y_px, depth + 1, pred_cu, lcu)
            + cu_rd_cost_luma(state, x_px + offset, y_px, depth + 1, pred_cu, lcu)
            + cu_rd_cost_luma(state, x_px, y_px + offset, depth + 1, pred_cu, lcu)
            + cu_rd_cost_luma(state, x_px + offset, y_px + offset, depth + 1, pred_cu, lcu);
    }

    let mut tr_tree_bits = 0.0;
    if pred_cu.cu_type == CuType::Intra
        || tr_cu.cbf.is_set(depth, Color::U)
        || tr_cu.cbf.is_set(depth, Color::V)
    {
        tr_tree_bits += state.ctx.qt_cbf_luma.bits(pred_cu.cbf.is_set(depth, Color::Y));
    }

    let mut ssd = 0;
    if !state.cfg.lossless {
        let index = y_px * LCU_WIDTH + x_px;
        ssd = (state.kernels.ssd)(
            &lcu.orig.y[index..],
            LCU_WIDTH,
            &lcu.rec.y[index..],
            LCU_WIDTH,
            width,
            width,
        );
    }

    let z = xy_to_zorder(LCU_WIDTH, x_px, y_px);
    let coeff_bits = state
        .residual
        .coeff_bits(&lcu.coeff.y[z..z + width * width], width, Color::Y);

    ssd as f64 * LUMA_MULT + (tr_tree_bits + coeff_bits) * state.frame.lambda
}

/// RD cost of the chroma transform tree of `pred_cu` at LCU-local (`x_px`, `y_px`).
///
/// When joint Cb-Cr coding is enabled and cheaper, the CBF bits of `pred_cu`
/// are rewritten from its joint pattern and the joint reconstruction replaces
/// the separate one. Otherwise `pred_cu.joint_cb_cr` is cleared.
pub(crate) fn cu_rd_cost_chroma(
    state: &SearchState<'_>,
    x_px: usize,
    y_px: usize,
    depth: u8,
    pred_cu: &mut CuInfo,
    lcu: &mut Lcu,
) -> f64 {
    assert!(x_px < LCU_WIDTH && y_px < LCU_WIDTH);
    let lcu_px = ((x_px & !7) / 2, (y_px & !7) / 2);
    let width = tb_width(depth, Color::U);
    let jccr = state.cfg.jccr;
    let ctx: &ContextSet = state.ctx;

    // Chroma of a 4x4 quad is costed once, by the bottom-right member.
    if depth == MAX_PU_DEPTH && (x_px % 8 == 0 || y_px % 8 == 0) {
        return 0.0;
    }

    let mut tr_tree_bits = 0.0;
    let mut joint_tr_tree_bits = 0.0;
    let joint = pred_cu.joint_cb_cr;

    if depth < MAX_PU_DEPTH {
        let tr_depth = depth - pred_cu.depth;
        let parent_set = |color| depth > 0 && pred_cu.cbf.is_set(depth - 1, color);
        if tr_depth == 0 || parent_set(Color::U) {
            tr_tree_bits += ctx.qt_cbf_cb.bits(pred_cu.cbf.is_set(depth, Color::U));
        }
        if jccr {
            joint_tr_tree_bits += ctx.qt_cbf_cb.bits(joint & 1 != 0);
        }
        let cb_set = usize::from(pred_cu.cbf.is_set(depth, Color::U));
        if tr_depth == 0 || parent_set(Color::V) {
            tr_tree_bits += ctx.qt_cbf_cr[cb_set].bits(pred_cu.cbf.is_set(depth, Color::V));
        }
        if jccr {
            joint_tr_tree_bits += ctx.qt_cbf_cr[usize::from(joint & 1)].bits(joint & 2 != 0);
        }
    }

    if lcu.cu.at(x_px as i32, y_px as i32).tr_depth > depth {
        let offset = LCU_WIDTH >> (depth + 1);
        let sum = cu_rd_cost_chroma(state, x_px, y_px, depth + 1, pred_cu, lcu)
            + cu_rd_cost_chroma(state, x_px + offset, y_px, depth + 1, pred_cu, lcu)
            + cu_rd_cost_chroma(state, x_px, y_px + offset, depth + 1, pred_cu, lcu)
            + cu_rd_cost_chroma(state, x_px + offset, y_px + offset, depth + 1, pred_cu, lcu);
        return sum + tr_tree_bits * state.frame.lambda;
    }

    if jccr {
        let cbf_mask = usize::from(pred_cu.cbf.is_set(depth, Color::U)) * 2
            + usize::from(pred_cu.cbf.is_set(depth, Color::V));
        if cbf_mask != 0 {
            tr_tree_bits += ctx.joint_cb_cr[cbf_mask - 1].bits(false);
        }
        if joint != 0 {
            let idx = usize::from(joint & 1) * 2 + usize::from((joint & 2) >> 1);
            joint_tr_tree_bits += ctx.joint_cb_cr[idx - 1].bits(true);
        }
    }

    let index = lcu_px.1 * LCU_WIDTH_C + lcu_px.0;
    let ssd_fn = state.kernels.ssd;
    let (mut ssd, mut joint_ssd) = (0u64, 0u64);
    if !state.cfg.lossless {
        for color in [Color::U, Color::V] {
            let orig = &lcu.orig.plane(color)[index..];
            ssd += ssd_fn(orig, LCU_WIDTH_C, &lcu.rec.plane(color)[index..], LCU_WIDTH_C, width, width);
            if jccr {
                joint_ssd += ssd_fn(orig, LCU_WIDTH_C, &lcu.rec_joint(color)[index..], LCU_WIDTH_C, width, width);
            }
        }
    }

    let z = xy_to_zorder(LCU_WIDTH_C, lcu_px.0, lcu_px.1);
    let n = width * width;
    let residual = state.residual;
    let coeff_bits = residual.coeff_bits(&lcu.coeff.u[z..z + n], width, Color::U)
        + residual.coeff_bits(&lcu.coeff.v[z..z + n], width, Color::V);
    let joint_coeff_bits = if jccr {
        residual.coeff_bits(&lcu.coeff.joint_uv[z..z + n], width, Color::U)
    } else {
        0.0
    };

    let cost = ssd as f64 + (tr_tree_bits + coeff_bits) * state.frame.chroma_lambda;
    let joint_cost = joint_ssd as f64 + (joint_tr_tree_bits + joint_coeff_bits) * state.frame.chroma_lambda;
    if !jccr || joint == 0 || cost < joint_cost {
        pred_cu.joint_cb_cr = 0;
        return cost;
    }

    pred_cu.cbf.clear(depth, Color::U);
    pred_cu.cbf.clear(depth, Color::V);
    if joint & 1 != 0 {
        pred_cu.cbf.set(depth, Color::U);
    }
    if joint & 2 != 0 {
        pred_cu.cbf.set(depth, Color::V);
    }
    let blit = state.kernels.blit;
    for color in [Color::U, Color::V] {
        let joint_rec = lcu.rec_joint(color)[index..].to_vec();
        blit(&joint_rec, LCU_WIDTH_C, &mut lcu.rec.plane_mut(color)[index..], LCU_WIDTH_C, width, width);
    }
    joint_cost
}

/// Bits of signalling luma `mode` given the MPM list.
pub fn luma_mode_bits(ctx: &ContextSet, mode: u8, mpm: &MpmList) -> f64 {
    match mpm.index_of(mode) {
        Some(idx) => {
            let mut bits = ctx.intra_luma_mpm_flag.bits(true);
            bits += ctx.intra_luma_planar_flag.bits(idx > 0);
            // Truncated unary bypass bins of the remaining MPM index.
            bits + idx.min(4) as f64
        }
        None => {
            // Truncated binary over the 61 non-MPM modes.
            let rem = mode as usize - mpm.modes.iter().filter(|&&m| m < mode).count();
            ctx.intra_luma_mpm_flag.bits(false) + if rem < 3 { 5.0 } else { 6.0 }
        }
    }
}

/// Bits of signalling chroma `chroma_mode` for a CU with luma `luma_mode`.
pub fn chroma_mode_bits(ctx: &ContextSet, cclm: bool, chroma_mode: u8, luma_mode: u8) -> f64 {
    let mut bits = 0.0;
    if cclm {
        bits += ctx.cclm_flag.bits(chroma_mode >= LM_CHROMA_IDX);
    }
    if chroma_mode >= LM_CHROMA_IDX {
        bits += ctx.cclm_model_idx.bits(chroma_mode != LM_CHROMA_IDX);
        if chroma_mode != LM_CHROMA_IDX {
            bits += 1.0;
        }
    } else if chroma_mode == luma_mode {
        bits += ctx.chroma_pred_mode.bits(false);
    } else {
        bits += ctx.chroma_pred_mode.bits(true) + 2.0;
    }
    bits
}

/// MPM list of the CU at picture (`x`, `y`) from its committed neighbors.
pub(crate) fn cu_mpm_list(lcu: &Lcu, x: usize, y: usize) -> MpmList {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let left = (x >= SCU_WIDTH).then(|| lcu.cu.at(xl - SCU_WIDTH as i32, yl));
    let above = (y >= SCU_WIDTH).then(|| lcu.cu.at(xl, yl - SCU_WIDTH as i32));
    get_dir_luma_predictor(y, left, above)
}

/// Estimated bits of the intra prediction modes of `cur_cu` at picture (`x`, `y`).
pub(crate) fn calc_mode_bits(state: &SearchState<'_>, lcu: &Lcu, cur_cu: &CuInfo, x: usize, y: usize, depth: u8) -> f64 {
    assert!(cur_cu.cu_type == CuType::Intra);
    let mpm = cu_mpm_list(lcu, x, y);
    let mut bits = luma_mode_bits(state.ctx, cur_cu.intra.mode, &mpm);
    if (depth != MAX_PU_DEPTH || (x % 8 != 0 && y % 8 != 0)) && lcu.has_chroma() {
        bits += chroma_mode_bits(state.ctx, state.cfg.cclm, cur_cu.intra.mode_chroma, cur_cu.intra.mode);
    }
    bits
}

/// Sort `modes` by ascending `costs`. Equal costs keep their order.
pub fn sort_modes(modes: &mut [u8], costs: &mut [f64]) {
    debug_assert_eq!(modes.len(), costs.len());
    for i in 1..modes.len() {
        let (cur_cost, cur_mode) = (costs[i], modes[i]);
        let mut j = i;
        while j > 0 && cur_cost < costs[j - 1] {
            costs[j] = costs[j - 1];
            modes[j] = modes[j - 1];
            j -= 1;
        }
        costs[j] = cur_cost;
        modes[j] = cur_mode;
    }
}

/// Context of the split flag: how many of the left and above neighbors are
/// split deeper than `depth`.
pub(crate) fn ctx_cu_split_model(lcu: &Lcu, x: usize, y: usize, depth: u8) -> usize {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let left = x >= 8 && lcu.cu.at(xl - 1, yl).depth > depth;
    let above = y >= 8 && lcu.cu.at(xl, yl - 1).depth > depth;
    usize::from(left) + usize::from(above)
}
