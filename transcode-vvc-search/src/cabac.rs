//! Context-probability model used for bit-cost estimation.
//!
//! The search only reads contexts: each one yields the fractional number of
//! bits a bin would cost in its current state. Adapting contexts after coding
//! is the job of the entropy coder that owns the [`ContextSet`].

use std::sync::OnceLock;

use crate::config::SliceKind;

/// CABAC state for a single context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CabacContext {
    /// State index (0-63).
    state: u8,
    /// Most probable symbol.
    mps: bool,
}

impl CabacContext {
    /// Create a context from an 8-bit init value at `qp`.
    pub fn new(init_value: u8, qp: u8) -> Self {
        let slope = ((init_value >> 4) as i32) * 5 - 45;
        let offset = (((init_value & 0x0F) as i32) << 3) - 16;
        let pre_ctx_state = (((slope * (qp as i32).clamp(0, 51)) >> 4) + offset).clamp(1, 126);

        if pre_ctx_state <= 63 {
            Self {
                state: (63 - pre_ctx_state) as u8,
                mps: false,
            }
        } else {
            Self {
                state: (pre_ctx_state - 64) as u8,
                mps: true,
            }
        }
    }

    /// Update context after coding a symbol.
    pub fn update(&mut self, symbol: bool) {
        if symbol == self.mps {
            self.state = NEXT_STATE_MPS[self.state as usize];
        } else {
            if self.state == 0 {
                self.mps = !self.mps;
            }
            self.state = NEXT_STATE_LPS[self.state as usize];
        }
    }

    /// Get the current state.
    pub fn state(&self) -> u8 {
        self.state
    }

    /// Get the MPS value.
    pub fn mps(&self) -> bool {
        self.mps
    }

    /// Estimated cost in bits of coding `symbol` in this context.
    #[inline]
    pub fn bits(&self, symbol: bool) -> f64 {
        let table = entropy_bits();
        let idx = ((self.state as usize) << 1) | usize::from(symbol != self.mps);
        table[idx]
    }
}

/// Fractional bits indexed by `(state << 1) | is_lps`.
fn entropy_bits() -> &'static [f64; 128] {
    static TABLE: OnceLock<[f64; 128]> = OnceLock::new();
    TABLE.get_or_init(|| {
        // p_lps(state) = 0.5 * alpha^state with p_lps(63) = 0.01875
        let alpha = (0.01875f64 / 0.5).powf(1.0 / 63.0);
        let mut table = [0.0; 128];
        for state in 0..64 {
            let p_lps = 0.5 * alpha.powi(state as i32);
            table[state << 1] = -(1.0 - p_lps).log2();
            table[(state << 1) | 1] = -p_lps.log2();
        }
        table
    })
}

// State transition tables for CABAC
const NEXT_STATE_MPS: [u8; 64] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16,
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48,
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 62, 63,
];

const NEXT_STATE_LPS: [u8; 64] = [
    0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12,
    13, 13, 15, 15, 16, 16, 18, 18, 19, 19, 21, 21, 22, 22, 23, 24,
    24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32, 33,
    33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
];

/// Init value of a context that starts at equal probability.
const CNU: u8 = 154;

/// Init values per slice kind (I, P, B).
struct InitTable {
    split_flag: [[u8; 3]; 3],
    part_size: [u8; 3],
    qt_cbf_luma: [u8; 3],
    qt_cbf_cb: [u8; 3],
    qt_cbf_cr: [[u8; 2]; 3],
    joint_cb_cr: [[u8; 3]; 3],
    intra_luma_mpm_flag: [u8; 3],
    intra_luma_planar_flag: [u8; 3],
    chroma_pred_mode: [u8; 3],
    cclm_flag: [u8; 3],
    cclm_model_idx: [u8; 3],
}

const INIT: InitTable = InitTable {
    split_flag: [[139, 141, 157], [107, 139, 126], [107, 139, 126]],
    part_size: [184, 154, 154],
    qt_cbf_luma: [141, 111, 111],
    qt_cbf_cb: [94, 149, 149],
    qt_cbf_cr: [[138, 182], [107, 167], [92, 167]],
    joint_cb_cr: [[CNU; 3], [CNU; 3], [CNU; 3]],
    intra_luma_mpm_flag: [184, 154, 183],
    intra_luma_planar_flag: [CNU, CNU, CNU],
    chroma_pred_mode: [63, 152, 152],
    cclm_flag: [CNU, CNU, CNU],
    cclm_model_idx: [CNU, CNU, CNU],
};

/// Contexts consulted by the mode decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSet {
    /// `split_cu_flag`, indexed by the neighbor depth model (0..=2).
    pub split_flag: [CabacContext; 3],
    /// Intra 2Nx2N/NxN part size bin of an 8x8 CU.
    pub part_size: CabacContext,
    /// Luma coded block flag.
    pub qt_cbf_luma: CabacContext,
    /// Cb coded block flag.
    pub qt_cbf_cb: CabacContext,
    /// Cr coded block flag, indexed by the Cb flag.
    pub qt_cbf_cr: [CabacContext; 2],
    /// Joint Cb-Cr flag, indexed by the chroma cbf pattern minus one.
    pub joint_cb_cr: [CabacContext; 3],
    /// Luma MPM flag.
    pub intra_luma_mpm_flag: CabacContext,
    /// Planar flag of an MPM-coded luma mode.
    pub intra_luma_planar_flag: CabacContext,
    /// First chroma mode bin (DM or not).
    pub chroma_pred_mode: CabacContext,
    /// CCLM flag.
    pub cclm_flag: CabacContext,
    /// CCLM model index bin.
    pub cclm_model_idx: CabacContext,
}

impl ContextSet {
    /// Initialize every context for a slice at `qp`.
    pub fn new(qp: u8, slice: SliceKind) -> Self {
        let s = match slice {
            SliceKind::I => 0,
            SliceKind::P => 1,
            SliceKind::B => 2,
        };
        let ctx = |init: u8| CabacContext::new(init, qp);
        Self {
            split_flag: INIT.split_flag[s].map(ctx),
            part_size: ctx(INIT.part_size[s]),
            qt_cbf_luma: ctx(INIT.qt_cbf_luma[s]),
            qt_cbf_cb: ctx(INIT.qt_cbf_cb[s]),
            qt_cbf_cr: INIT.qt_cbf_cr[s].map(ctx),
            joint_cb_cr: INIT.joint_cb_cr[s].map(ctx),
            intra_luma_mpm_flag: ctx(INIT.intra_luma_mpm_flag[s]),
            intra_luma_planar_flag: ctx(INIT.intra_luma_planar_flag[s]),
            chroma_pred_mode: ctx(INIT.chroma_pred_mode[s]),
            cclm_flag: ctx(INIT.cclm_flag[s]),
            cclm_model_idx: ctx(INIT.cclm_model_idx[s]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transition_bounds() {
        for i in 0..64 {
            assert!(NEXT_STATE_MPS[i] <= 63);
            assert!(NEXT_STATE_LPS[i] <= 63);
        }
    }

    #[test]
    fn test_equiprobable_init() {
        // 154 maps to the lowest state regardless of QP.
        for qp in [0, 22, 37, 51] {
            let ctx = CabacContext::new(CNU, qp);
            assert_eq!(ctx.state(), 0);
            assert!((ctx.bits(false) - 1.0).abs() < 1e-9);
            assert!((ctx.bits(true) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bits_favor_mps() {
        let mut ctx = CabacContext::new(CNU, 32);
        for _ in 0..20 {
            ctx.update(true);
        }
        assert!(ctx.mps());
        assert!(ctx.state() > 0);
        assert!(ctx.bits(true) < 1.0);
        assert!(ctx.bits(false) > 1.0);
    }

    #[test]
    fn test_lps_at_state_zero_flips_mps() {
        let mut ctx = CabacContext::new(CNU, 32);
        let mps = ctx.mps();
        ctx.update(!mps);
        assert_eq!(ctx.mps(), !mps);
    }

    #[test]
    fn test_context_set_init() {
        let intra = ContextSet::new(32, SliceKind::I);
        let inter = ContextSet::new(32, SliceKind::B);
        assert_ne!(intra.split_flag, inter.split_flag);
        for ctx in intra.split_flag {
            assert!(ctx.state() <= 62);
            assert!(ctx.bits(false) > 0.0);
        }
    }
}
