//! Intra mode search.
//!
//! Luma modes are first ranked by a rough SATD + rate estimate over every
//! mode, then the best few are reconstructed and compared by full RD cost.
//! The number of full-RD candidates grows with the RDO level:
//!
//! | RDO | Rough pass | Full RD |
//! |-----|------------|---------|
//! | 0 | ✅ | none, best rough mode wins |
//! | 1 | ✅ | 2 |
//! | 2 | ✅ | 3 |
//! | 3 | ✅ | 4 |
//! | 4 | ❌ | all 67 |
//!
//! A 64x64 CU is wider than any transform block and has no rough pass; its
//! full-RD candidates are the MPM list below RDO level 4.

use crate::cu::CuType;
use crate::intra::{
    intra_recon_cu, predict, DC_IDX, HOR_IDX, LM_CHROMA_IDX, LM_CHROMA_L_IDX, LM_CHROMA_T_IDX, NUM_INTRA_MODES,
    PLANAR_IDX, VER_IDX,
};
use crate::mpm::MpmList;
use crate::picture::Color;
use crate::rdo::{chroma_mode_bits, cu_mpm_list, cu_rd_cost_chroma, cu_rd_cost_luma, luma_mode_bits, sort_modes};
use crate::reference::{build_reference, IntraReferences, ReferenceRequest};
use crate::search::SearchState;
use crate::work_tree::Lcu;
use crate::{Pixel, LCU_WIDTH, LOG2_LCU_WIDTH, MAX_PU_DEPTH};

/// Full-RD candidate counts indexed by RDO level 0..=3.
const RDO_CANDIDATES: [usize; 4] = [0, 2, 3, 4];

/// Chroma modes tried besides DM and CCLM.
const CHROMA_CANDIDATES: [u8; 4] = [PLANAR_IDX, VER_IDX, HOR_IDX, DC_IDX];

/// Mode substituted for a chroma candidate that equals the luma mode.
const CHROMA_SUBSTITUTE: u8 = 66;

/// Search the luma mode of the CU at picture (`x`, `y`).
///
/// Returns the best mode and its cost. The CU's transform depth is set on
/// the way; its reconstruction is left in an unspecified state.
pub(crate) fn search_cu_intra(state: &SearchState<'_>, x: usize, y: usize, depth: u8, lcu: &mut Lcu) -> (u8, f64) {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let tr_depth = depth.max(1);
    lcu.cu.fill_trdepth(x, y, depth, tr_depth);

    let mpm = cu_mpm_list(lcu, x, y);
    let rdo = state.cfg.rdo;

    let (mut modes, mut costs, num_rdo) = if rdo >= 4 {
        let modes: Vec<u8> = (0..NUM_INTRA_MODES).collect();
        let n = modes.len();
        (modes, vec![0.0; n], n)
    } else if depth == 0 {
        (mpm.modes.to_vec(), vec![0.0; mpm.modes.len()], mpm.modes.len())
    } else {
        let (modes, costs) = rough_search(state, x, y, depth, lcu, &mpm);
        (modes, costs, RDO_CANDIDATES[rdo as usize])
    };

    if num_rdo == 0 {
        return (modes[0], costs[0]);
    }

    for i in 0..num_rdo {
        let mode = modes[i];
        lcu.cu.at_mut(xl, yl).intra.mode = mode;
        intra_recon_cu(state, lcu, x, y, depth, Some(mode), None);

        let mut pred_cu = *lcu.cu.at(xl, yl);
        pred_cu.cu_type = CuType::Intra;
        let bits = luma_mode_bits(state.ctx, mode, &mpm);
        costs[i] = cu_rd_cost_luma(state, xl as usize, yl as usize, depth, &pred_cu, lcu) + bits * state.frame.lambda;
    }
    sort_modes(&mut modes[..num_rdo], &mut costs[..num_rdo]);

    tracing::trace!(
        "Intra search ({}, {}) depth {}: mode {} cost {:.1}",
        x,
        y,
        depth,
        modes[0],
        costs[0]
    );
    (modes[0], costs[0])
}

/// Rank every luma mode by SATD plus `sqrt(lambda)` weighted mode bits.
fn rough_search(
    state: &SearchState<'_>,
    x: usize,
    y: usize,
    depth: u8,
    lcu: &Lcu,
    mpm: &MpmList,
) -> (Vec<u8>, Vec<f64>) {
    let log2_width = LOG2_LCU_WIDTH - u32::from(depth);
    let width = 1usize << log2_width;
    let req = ReferenceRequest {
        log2_width,
        color: Color::Y,
        luma_x: x,
        luma_y: y,
        pic_width: state.pic.width(),
        pic_height: state.pic.height(),
        wpp: state.cfg.wpp,
    };
    let mut refs = IntraReferences::new();
    build_reference(&req, &lcu.borders(Color::Y), &mut refs);

    let orig = &lcu.orig.y[(x % LCU_WIDTH) + (y % LCU_WIDTH) * LCU_WIDTH..];
    let lambda_sqrt = state.frame.lambda_sqrt();
    let mut pred = vec![0 as Pixel; width * width];

    let mut modes: Vec<u8> = (0..NUM_INTRA_MODES).collect();
    let mut costs: Vec<f64> = modes
        .iter()
        .map(|&mode| {
            predict(state.cfg.intra_smoothing, &mut refs, log2_width, mode, Color::Y, &mut pred, state.kernels);
            let satd = (state.kernels.satd)(orig, LCU_WIDTH, &pred, width, width, width);
            satd as f64 + lambda_sqrt * luma_mode_bits(state.ctx, mode, mpm)
        })
        .collect();
    sort_modes(&mut modes, &mut costs);
    (modes, costs)
}

/// Search the chroma mode of the intra CU at picture (`x`, `y`) whose luma
/// is already reconstructed.
///
/// At depth 4 the caller passes the last (bottom-right) member of the 4x4
/// quad, whose chroma covers the quad's whole 8x8 luma area.
pub(crate) fn search_cu_intra_chroma(state: &SearchState<'_>, x: usize, y: usize, depth: u8, lcu: &mut Lcu) -> u8 {
    let (xl, yl) = ((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
    let luma_mode = lcu.cu.at(xl, yl).intra.mode;

    let mut modes: Vec<u8> = CHROMA_CANDIDATES
        .iter()
        .map(|&m| if m == luma_mode { CHROMA_SUBSTITUTE } else { m })
        .collect();
    modes.push(luma_mode);
    if state.cfg.cclm {
        modes.extend([LM_CHROMA_IDX, LM_CHROMA_L_IDX, LM_CHROMA_T_IDX]);
    }

    // Chroma of a 4x4 quad covers the whole 8x8 luma area.
    let (cx, cy) = (x & !7, y & !7);
    debug_assert!(depth < MAX_PU_DEPTH || (x % 8 != 0 && y % 8 != 0));

    let mut best = (luma_mode, f64::INFINITY);
    for &mode in &modes {
        intra_recon_cu(state, lcu, cx, cy, depth, None, Some(mode));
        let mut pred_cu = *lcu.cu.at(xl, yl);
        pred_cu.cu_type = CuType::Intra;
        pred_cu.intra.mode_chroma = mode;
        let cost = cu_rd_cost_chroma(state, xl as usize, yl as usize, depth, &mut pred_cu, lcu)
            + chroma_mode_bits(state.ctx, state.cfg.cclm, mode, luma_mode) * state.frame.lambda;
        if cost < best.1 {
            best = (mode, cost);
        }
    }
    best.0
}
