//! Search configuration.
//!
//! [`SearchConfig`] is the tool/effort bundle shared by every LCU search of a
//! sequence, [`FrameParams`] carries what changes per picture (slice kind, QP,
//! Lagrange multipliers).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::MAX_PU_DEPTH;

/// Chroma sampling of the pictures being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChromaFormat {
    /// Luma only (4:0:0).
    Monochrome,
    /// Chroma subsampled by two in both directions (4:2:0).
    #[default]
    Yuv420,
}

impl ChromaFormat {
    /// Whether chroma planes exist.
    pub fn has_chroma(self) -> bool {
        self != Self::Monochrome
    }
}

/// When to stop descending the quadtree early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitTermination {
    /// Do not try splits of a CU that was coded without any coefficients.
    #[default]
    Zero,
    /// Always evaluate the split.
    Off,
}

/// Inclusive quadtree depth range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthRange {
    /// Shallowest depth (0 = 64x64).
    pub min: u8,
    /// Deepest depth (4 = 4x4).
    pub max: u8,
}

impl DepthRange {
    /// Create a depth range.
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// Whether `depth` lies within the range.
    pub fn contains(&self, depth: u8) -> bool {
        depth >= self.min && depth <= self.max
    }
}

/// Depth ranges per temporal (GOP) layer.
///
/// Layers without an entry use the base range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDepths {
    /// Range used by layer 0 and any layer without an override.
    pub base: DepthRange,
    /// Per-layer overrides, indexed by GOP layer.
    #[serde(default)]
    pub per_layer: Vec<Option<DepthRange>>,
}

impl LayerDepths {
    /// Use the same range on every layer.
    pub fn uniform(range: DepthRange) -> Self {
        Self {
            base: range,
            per_layer: Vec::new(),
        }
    }

    /// Override the range of one layer.
    pub fn with_layer(mut self, layer: usize, range: DepthRange) -> Self {
        if self.per_layer.len() <= layer {
            self.per_layer.resize(layer + 1, None);
        }
        self.per_layer[layer] = Some(range);
        self
    }

    /// Range in effect for `layer`.
    pub fn for_layer(&self, layer: usize) -> DepthRange {
        self.per_layer
            .get(layer)
            .copied()
            .flatten()
            .unwrap_or(self.base)
    }

    fn ranges(&self) -> impl Iterator<Item = DepthRange> + '_ {
        std::iter::once(self.base).chain(self.per_layer.iter().flatten().copied())
    }
}

/// Search effort preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchPreset {
    /// Rough intra estimates only, shallow trees.
    Ultrafast,
    /// Rough intra estimates only.
    Veryfast,
    /// Two full-RD intra candidates.
    Fast,
    /// Three full-RD intra candidates (default).
    #[default]
    Medium,
    /// Chroma mode search and SMP.
    Slow,
    /// Every intra mode through full RD, AMP.
    Placebo,
}

impl SearchPreset {
    /// Get the RDO level.
    pub fn rdo_level(&self) -> u8 {
        match self {
            Self::Ultrafast | Self::Veryfast => 0,
            Self::Fast => 1,
            Self::Medium => 2,
            Self::Slow => 3,
            Self::Placebo => 4,
        }
    }

    /// Get the intra depth range.
    pub fn intra_depths(&self) -> DepthRange {
        match self {
            Self::Ultrafast => DepthRange::new(2, 3),
            Self::Veryfast => DepthRange::new(1, 3),
            Self::Fast | Self::Medium => DepthRange::new(1, 4),
            Self::Slow | Self::Placebo => DepthRange::new(0, 4),
        }
    }

    /// Get the inter depth range.
    pub fn inter_depths(&self) -> DepthRange {
        match self {
            Self::Ultrafast => DepthRange::new(1, 2),
            Self::Veryfast | Self::Fast => DepthRange::new(0, 2),
            Self::Medium | Self::Slow | Self::Placebo => DepthRange::new(0, 3),
        }
    }
}

/// Configuration of the mode-decision search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Chroma format of the searched pictures.
    pub chroma_format: ChromaFormat,
    /// Smooth intra reference samples where the predictor asks for it.
    pub intra_smoothing: bool,
    /// Evaluate cross-component linear model chroma modes.
    pub cclm: bool,
    /// Evaluate joint Cb-Cr residual coding.
    pub jccr: bool,
    /// Lossless coding (no distortion term).
    pub lossless: bool,
    /// Rate-distortion optimized quantization is used by the residual coder.
    pub rdoq: bool,
    /// RDO level, 0..=4.
    pub rdo: u8,
    /// Stop the search of a CU once inter picks skip.
    pub early_skip: bool,
    /// Compare against the cost of dropping all inter coefficients.
    pub zero_coeff_rdo: bool,
    /// Try symmetric inter partitions (2NxN, Nx2N).
    pub smp: bool,
    /// Try asymmetric inter partitions (2NxnU, 2NxnD, nLx2N, nRx2N).
    pub amp: bool,
    /// Split termination policy.
    pub cu_split_termination: SplitTermination,
    /// Wavefront parallel processing (entropy sync) is in use.
    pub wpp: bool,
    /// Intra depth ranges per GOP layer.
    pub pu_depth_intra: LayerDepths,
    /// Inter depth ranges per GOP layer.
    pub pu_depth_inter: LayerDepths,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::with_preset(SearchPreset::Medium)
    }
}

impl SearchConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from a preset.
    pub fn with_preset(preset: SearchPreset) -> Self {
        Self {
            chroma_format: ChromaFormat::Yuv420,
            intra_smoothing: true,
            cclm: preset != SearchPreset::Ultrafast,
            jccr: false,
            lossless: false,
            rdoq: false,
            rdo: preset.rdo_level(),
            early_skip: true,
            zero_coeff_rdo: true,
            smp: matches!(preset, SearchPreset::Slow | SearchPreset::Placebo),
            amp: preset == SearchPreset::Placebo,
            cu_split_termination: SplitTermination::Zero,
            wpp: true,
            pu_depth_intra: LayerDepths::uniform(preset.intra_depths()),
            pu_depth_inter: LayerDepths::uniform(preset.inter_depths()),
        }
    }

    /// Sets the chroma format. Chroma-only tools are switched off for 4:0:0.
    pub fn with_chroma_format(mut self, chroma_format: ChromaFormat) -> Self {
        self.chroma_format = chroma_format;
        if !chroma_format.has_chroma() && (self.cclm || self.jccr) {
            tracing::warn!("Monochrome input: disabling CCLM and joint Cb-Cr search");
            self.cclm = false;
            self.jccr = false;
        }
        self
    }

    /// Enables or disables reference smoothing.
    pub fn with_intra_smoothing(mut self, enabled: bool) -> Self {
        self.intra_smoothing = enabled;
        self
    }

    /// Enables or disables CCLM.
    pub fn with_cclm(mut self, enabled: bool) -> Self {
        self.cclm = enabled;
        self
    }

    /// Enables or disables joint Cb-Cr residual coding.
    pub fn with_jccr(mut self, enabled: bool) -> Self {
        self.jccr = enabled;
        self
    }

    /// Enables or disables lossless coding.
    pub fn with_lossless(mut self, enabled: bool) -> Self {
        self.lossless = enabled;
        self
    }

    /// Sets the RDO level.
    pub fn with_rdo(mut self, rdo: u8) -> Self {
        self.rdo = rdo;
        self
    }

    /// Sets the split termination policy.
    pub fn with_split_termination(mut self, termination: SplitTermination) -> Self {
        self.cu_split_termination = termination;
        self
    }

    /// Enables or disables zero-coefficient RDO.
    pub fn with_zero_coeff_rdo(mut self, enabled: bool) -> Self {
        self.zero_coeff_rdo = enabled;
        self
    }

    /// Enables or disables early skip.
    pub fn with_early_skip(mut self, enabled: bool) -> Self {
        self.early_skip = enabled;
        self
    }

    /// Enables or disables SMP and AMP inter partitions.
    pub fn with_partitions(mut self, smp: bool, amp: bool) -> Self {
        self.smp = smp;
        self.amp = amp;
        self
    }

    /// Enables or disables WPP.
    pub fn with_wpp(mut self, enabled: bool) -> Self {
        self.wpp = enabled;
        self
    }

    /// Sets the intra depth range of every layer.
    pub fn with_intra_depths(mut self, range: DepthRange) -> Self {
        self.pu_depth_intra = LayerDepths::uniform(range);
        self
    }

    /// Sets the inter depth range of every layer.
    pub fn with_inter_depths(mut self, range: DepthRange) -> Self {
        self.pu_depth_inter = LayerDepths::uniform(range);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rdo > 4 {
            return Err(SearchError::Config(format!(
                "Invalid RDO level: {}. Must be 0..=4",
                self.rdo
            )));
        }

        for (name, depths) in [
            ("pu_depth_intra", &self.pu_depth_intra),
            ("pu_depth_inter", &self.pu_depth_inter),
        ] {
            for range in depths.ranges() {
                if range.min > range.max || range.max > MAX_PU_DEPTH {
                    return Err(SearchError::Config(format!(
                        "Invalid {} range {}..={}. Must satisfy min <= max <= {}",
                        name, range.min, range.max, MAX_PU_DEPTH
                    )));
                }
            }
        }

        if !self.chroma_format.has_chroma() && (self.cclm || self.jccr) {
            return Err(SearchError::Config(
                "CCLM and joint Cb-Cr coding require chroma".to_string(),
            ));
        }

        if self.lossless && self.jccr {
            return Err(SearchError::Config(
                "Joint Cb-Cr coding cannot be lossless".to_string(),
            ));
        }

        Ok(())
    }
}

/// Slice coding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceKind {
    /// Intra-only slice.
    I,
    /// Uni-predicted slice.
    P,
    /// Bi-predicted slice.
    B,
}

impl SliceKind {
    /// Whether inter prediction may be used.
    pub fn allows_inter(self) -> bool {
        self != Self::I
    }
}

/// Per-picture rate-distortion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameParams {
    /// Slice coding type.
    pub slice: SliceKind,
    /// Quantization parameter.
    pub qp: u8,
    /// GOP layer selecting the depth ranges (0-based).
    pub gop_layer: usize,
    /// Lagrange multiplier for luma.
    pub lambda: f64,
    /// Lagrange multiplier for chroma.
    pub chroma_lambda: f64,
}

impl FrameParams {
    /// Create parameters for `qp`, deriving lambda from it.
    pub fn new(slice: SliceKind, qp: i32) -> Result<Self> {
        if !(0..=63).contains(&qp) {
            return Err(SearchError::Qp(qp));
        }
        let lambda = lambda_from_qp(qp as u8);
        Ok(Self {
            slice,
            qp: qp as u8,
            gop_layer: 0,
            lambda,
            chroma_lambda: lambda,
        })
    }

    /// Override the Lagrange multipliers.
    pub fn with_lambda(mut self, lambda: f64, chroma_lambda: f64) -> Self {
        self.lambda = lambda;
        self.chroma_lambda = chroma_lambda;
        self
    }

    /// Sets the GOP layer.
    pub fn with_gop_layer(mut self, layer: usize) -> Self {
        self.gop_layer = layer;
        self
    }

    /// Square root of the luma lambda, used with SATD costs.
    pub fn lambda_sqrt(&self) -> f64 {
        self.lambda.sqrt()
    }
}

/// Lagrange multiplier for SSD-domain costs.
pub fn lambda_from_qp(qp: u8) -> f64 {
    0.57 * 2f64.powf((qp as f64 - 12.0) / 3.0)
}
