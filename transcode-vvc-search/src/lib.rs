//! VVC/H.266 mode decision and intra prediction for the transcode library.
//!
//! This crate is the decision engine of a block-based VVC encoder: it chooses
//! how each 64x64 LCU is partitioned into coding units and how every CU is
//! predicted, by evaluating candidates through prediction, reconstruction and
//! a rate estimate and keeping the cheapest.
//!
//! # Features
//!
//! - **Reference Samples**: Top/left boundary construction with an interior
//!   fast path and a general edge path producing identical output
//! - **Intra Prediction**: Planar (0), DC (1) and angular modes (2-66) with
//!   reference smoothing and PDPC boundary correction
//! - **CCLM**: Cross-component linear model chroma prediction (modes 81-83)
//! - **MPM**: Most-probable-mode list for mode bit estimation
//! - **Quadtree RDO**: Recursive CU search over depths 0-4 with a per-depth
//!   work tree, zero-coefficient RDO, split termination and HMVP bookkeeping
//!
//! # Architecture
//!
//! - **LCU**: 64x64 luma samples, the root of the search
//! - **SCU**: 4x4 luma samples, the granularity of the CU grid
//! - **Depth**: 0 (64x64) to 4 (4x4); depth 4 is coded as NxN of depth 3
//!
//! Transform, quantization and motion search are collaborators behind the
//! [`ResidualCoder`] and [`InterSearch`] traits.
//!
//! # Example
//!
//! ```rust,ignore
//! use transcode_vvc_search::{ChromaFormat, FrameParams, Picture, SearchConfig, Searcher, SliceKind};
//!
//! let config = SearchConfig::default();
//! let mut searcher = Searcher::new(config)?;
//!
//! let mut picture = Picture::from_planes(1920, 1080, ChromaFormat::Yuv420, y, u, v)?;
//! let frame = FrameParams::new(SliceKind::I, 32)?;
//!
//! let results = searcher.search_picture(&mut picture, &frame)?;
//! ```

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod cabac;
pub mod cclm;
pub mod config;
pub mod cu;
pub mod error;
pub mod filter;
pub mod inter;
pub mod intra;
pub mod kernels;
pub mod mpm;
pub mod picture;
pub mod rdo;
pub mod reference;
pub mod residual;
pub mod search;
pub mod search_intra;
pub mod work_tree;

// Re-export main error types
pub use error::{Result, SearchError};

// Re-export configuration types
pub use config::{
    ChromaFormat, DepthRange, FrameParams, LayerDepths, SearchConfig, SearchPreset, SliceKind,
    SplitTermination,
};

// Re-export CU types
pub use cu::{Cbf, CuArray, CuInfo, CuType, IntraInfo, InterInfo, LcuCuGrid, MotionVector, PartMode};

// Re-export prediction types
pub use cclm::CclmParams;
pub use intra::predict;
pub use mpm::{get_dir_luma_predictor, MpmList};
pub use reference::{build_reference, IntraReferences};

// Re-export search types
pub use inter::{HmvpRow, HmvpTable, InterCandidate, InterContext, InterSearch, NoInterSearch, MAX_NUM_HMVP_CANDS};
pub use kernels::{kernels, PixelKernels};
pub use picture::{Color, Picture};
pub use residual::{QuantParams, ResidualCoder, SpatialQuantizer};
pub use search::{LcuSearchResult, Searcher};
pub use work_tree::{Lcu, LcuCoeffs, WorkTree};

/// Sample type (8-bit).
pub type Pixel = u8;

/// Residual coefficient type.
pub type Coeff = i16;

/// Internal bit depth of samples.
pub const BIT_DEPTH: u32 = 8;

/// Largest sample value.
pub const PIXEL_MAX: i32 = (1 << BIT_DEPTH) - 1;

/// Log2 of the LCU width.
pub const LOG2_LCU_WIDTH: u32 = 6;

/// LCU width in luma samples.
pub const LCU_WIDTH: usize = 1 << LOG2_LCU_WIDTH;

/// LCU width in 4:2:0 chroma samples.
pub const LCU_WIDTH_C: usize = LCU_WIDTH / 2;

/// Number of luma samples in an LCU.
pub const LCU_LUMA_SIZE: usize = LCU_WIDTH * LCU_WIDTH;

/// Number of chroma samples in an LCU (per plane).
pub const LCU_CHROMA_SIZE: usize = LCU_WIDTH_C * LCU_WIDTH_C;

/// Width of the smallest CU grid unit.
pub const SCU_WIDTH: usize = 4;

/// Deepest quadtree depth with its own CU (8x8).
pub const MAX_DEPTH: u8 = 3;

/// Deepest prediction depth (4x4, coded as NxN of an 8x8 CU).
pub const MAX_PU_DEPTH: u8 = 4;

/// Number of above-row reference samples an LCU keeps (1.5 LCU widths).
pub const LCU_REF_PX_WIDTH: usize = LCU_WIDTH + LCU_WIDTH / 2;

/// Weight of luma SSD in the RD cost.
pub const LUMA_MULT: f64 = 0.8;

/// Weight of chroma SSD in the RD cost.
pub const CHROMA_MULT: f64 = 1.5;

/// Per-sample inter cost below which intra search is skipped at RDO level 0.
pub const INTRA_THRESHOLD: f64 = 8.0;

/// Clip a value into the sample range.
#[inline]
pub(crate) fn clip_pixel(value: i32) -> Pixel {
    value.clamp(0, PIXEL_MAX) as Pixel
}

/// Floor of log2 for positive values.
#[inline]
pub(crate) fn floor_log2(value: u32) -> u32 {
    debug_assert!(value > 0);
    31 - value.leading_zeros()
}

/// Position of the sample at (`x`, `y`) of a square block of width `width`
/// in z-order, where every 4x4 group is stored contiguously.
///
/// Coefficients of any square transform block aligned to its size are
/// contiguous in this layout.
pub fn xy_to_zorder(width: usize, x: usize, y: usize) -> usize {
    debug_assert!(x < width && y < width);
    let mut result = 0;
    let mut size = width;
    let (mut x, mut y) = (x, y);
    while size > 4 {
        let half = size / 2;
        let quadrant = usize::from(x >= half) + 2 * usize::from(y >= half);
        result += quadrant * half * half;
        x %= half;
        y %= half;
        size = half;
    }
    result + x + y * 4
}
