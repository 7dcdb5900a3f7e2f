//! Quadtree rate-distortion search.
//!
//! [`Searcher`] drives the search of a picture LCU by LCU in raster order.
//! Each LCU is searched depth-first in Z-order: every CU position is tried
//! unsplit (inter, then intra) and split into four, and the cheaper choice is
//! committed through the [`WorkTree`].
//!
//! ## Tie-breaking
//!
//! Candidates are compared with strict `<`, so on equal cost the one
//! evaluated first wins: inter before intra, no-split before split.

use crate::cabac::ContextSet;
use crate::cclm::downsample_cclm_rec;
use crate::config::{DepthRange, FrameParams, SearchConfig, SplitTermination};
use crate::cu::{CuType, PartMode};
use crate::error::{Result, SearchError};
use crate::inter::{HmvpRow, HmvpTable, InterContext, InterSearch, NoInterSearch};
use crate::intra::intra_recon_cu;
use crate::kernels::{kernels, PixelKernels};
use crate::picture::{Color, Picture};
use crate::rdo::{calc_mode_bits, ctx_cu_split_model, cu_rd_cost_chroma, cu_rd_cost_luma};
use crate::residual::{quantize_lcu_residual, ResidualCoder, SpatialQuantizer};
use crate::search_intra::{search_cu_intra, search_cu_intra_chroma};
use crate::work_tree::{clear_cu_coeffs, copy_cu_info, copy_cu_pixels, LcuCoeffs, WorkTree};
use crate::{CHROMA_MULT, INTRA_THRESHOLD, LCU_WIDTH, LCU_WIDTH_C, LUMA_MULT, MAX_DEPTH, MAX_PU_DEPTH, SCU_WIDTH};

/// Everything one LCU search reads and writes besides the work tree.
pub(crate) struct SearchState<'a> {
    pub(crate) cfg: &'a SearchConfig,
    pub(crate) frame: &'a FrameParams,
    pub(crate) ctx: &'a ContextSet,
    pub(crate) kernels: &'a PixelKernels,
    pub(crate) residual: &'a dyn ResidualCoder,
    pub(crate) inter: &'a mut dyn InterSearch,
    pub(crate) pic: &'a mut Picture,
    pub(crate) hmvp: &'a mut HmvpRow,
    pub(crate) intra_depths: DepthRange,
    pub(crate) inter_depths: DepthRange,
}

impl<'a> SearchState<'a> {
    /// Split the state into the inter collaborator and what it may read.
    fn inter_parts<'s>(&'s mut self) -> (&'s mut (dyn InterSearch + 'a), InterContext<'s>) {
        let ctx = InterContext {
            cfg: self.cfg,
            frame: self.frame,
            pic: &*self.pic,
            hmvp: &*self.hmvp,
            kernels: self.kernels,
        };
        (&mut *self.inter, ctx)
    }

    /// Whether a block of `depth` may be coded with a mode limited to
    /// `range`, allowing depths the range forbids when the picture edge
    /// forces them.
    fn depth_allowed(&self, range: DepthRange, x: usize, y: usize, depth: u8) -> bool {
        let min_width = LCU_WIDTH >> range.max;
        range.contains(depth)
            || (x & !(min_width - 1)) + min_width > self.pic.width()
            || (y & !(min_width - 1)) + min_width > self.pic.height()
    }
}

/// Result of searching one LCU.
#[derive(Debug, Clone, PartialEq)]
pub struct LcuSearchResult {
    /// LCU origin, luma samples.
    pub x: usize,
    /// LCU origin, luma samples.
    pub y: usize,
    /// Total RD cost of the committed decisions.
    pub cost: f64,
    /// Number of committed CUs inside the picture.
    pub num_cus: usize,
    /// Coefficients of the committed decisions.
    pub coeffs: LcuCoeffs,
}

/// Cost of the CU at picture (`x`, `y`) with every coefficient dropped.
/// Saves the prediction to the next level of the work tree.
fn cu_zero_coeff_cost(state: &SearchState<'_>, tree: &mut WorkTree, x: usize, y: usize, depth: u8) -> f64 {
    let (xl, yl) = (x % LCU_WIDTH, y % LCU_WIDTH);
    let cu_width = LCU_WIDTH >> depth;
    let ssd = state.kernels.ssd;
    let (lcu, next) = tree.pair_mut(depth);

    let luma = yl * LCU_WIDTH + xl;
    let mut cost = LUMA_MULT * ssd(&lcu.orig.y[luma..], LCU_WIDTH, &lcu.rec.y[luma..], LCU_WIDTH, cu_width, cu_width) as f64;
    if x % 8 == 0 && y % 8 == 0 && lcu.has_chroma() {
        let chroma = (yl / 2) * LCU_WIDTH_C + xl / 2;
        let w = cu_width / 2;
        for color in [Color::U, Color::V] {
            let orig = &lcu.orig.plane(color)[chroma..];
            let rec = &lcu.rec.plane(color)[chroma..];
            cost += CHROMA_MULT * ssd(orig, LCU_WIDTH_C, rec, LCU_WIDTH_C, w, w) as f64;
        }
    }
    copy_cu_pixels(xl, yl, cu_width, lcu, next);
    cost
}

/// Downsample the committed luma of a CU for CCLM.
fn downsample_committed(state: &mut SearchState<'_>, tree: &WorkTree, x: usize, y: usize, depth: u8) {
    if !state.cfg.cclm {
        return;
    }
    let cu_width = LCU_WIDTH >> depth;
    let lcu = tree.level(depth);
    downsample_cclm_rec(state.pic, x, y, cu_width / 2, cu_width / 2, &lcu.rec.y, lcu.left_ref.y[LCU_WIDTH]);
}

/// Search the CU at picture (`x`, `y`) and everything below it, leaving the
/// best decision in level `depth` of the work tree. Returns its cost.
fn search_cu(state: &mut SearchState<'_>, tree: &mut WorkTree, x: usize, y: usize, depth: u8) -> f64 {
    assert!(depth <= MAX_PU_DEPTH, "depth {} beyond {}", depth, MAX_PU_DEPTH);
    let cfg = state.cfg;
    let cu_width = LCU_WIDTH >> depth;
    let (xl, yl) = (x % LCU_WIDTH, y % LCU_WIDTH);
    let (xi, yi) = (xl as i32, yl as i32);
    let (pic_w, pic_h) = (state.pic.width(), state.pic.height());
    let has_chroma = cfg.chroma_format.has_chroma();
    let inter_slice = state.frame.slice.allows_inter();
    let lambda = state.frame.lambda;

    // Outside the picture nothing is coded.
    if x >= pic_w || y >= pic_h {
        return 0.0;
    }

    let hmvp_snapshot = inter_slice.then(|| state.hmvp.clone());
    let mut cost = f64::INFINITY;
    let mut inter_zero_coeff_cost = f64::INFINITY;
    let mut inter_bitcost = u32::MAX;

    {
        let cur = tree.level_mut(depth).cu.at_mut(xi, yi);
        cur.depth = depth.min(MAX_DEPTH);
        cur.tr_depth = depth.max(1);
        cur.cu_type = CuType::NotSet;
        cur.part_size = PartMode::Size2Nx2N;
        cur.qp = state.frame.qp;
        cur.tr_idx = 0;
        cur.joint_cb_cr = 0;
        cur.skipped = false;
        cur.merged = false;
    }

    if x + cu_width <= pic_w && y + cu_width <= pic_h {
        let can_use_inter =
            inter_slice && depth <= MAX_DEPTH && state.depth_allowed(state.inter_depths, x, y, depth);

        if can_use_inter {
            let (inter, ctx) = state.inter_parts();
            let found = inter.search_cu_inter(&ctx, x, y, depth, tree.level_mut(depth));
            if found.cost < cost {
                cost = found.cost;
                inter_bitcost = found.bitcost;
                tree.level_mut(depth).cu.at_mut(xi, yi).cu_type = CuType::Inter;
            }

            if !(cfg.early_skip && tree.level(depth).cu.at(xi, yi).skipped) {
                let first = if cfg.smp { 0 } else { 2 };
                let last = if cfg.amp && cu_width >= 16 { 5 } else { 1 };
                for part_mode in (first..=last).map(|i| PartMode::MOTION_PARTITIONS[i]) {
                    let (inter, ctx) = state.inter_parts();
                    let (lcu, next) = tree.pair_mut(depth);
                    let found = inter.search_cu_smp(&ctx, x, y, depth, part_mode, next);
                    if found.cost < cost {
                        cost = found.cost;
                        inter_bitcost = found.bitcost;
                        copy_cu_info(xl, yl, cu_width, next, lcu);
                    }
                }
            }
        }

        let skip_intra = {
            let cur = tree.level(depth).cu.at(xi, yi);
            (cfg.rdo == 0 && cur.cu_type != CuType::NotSet && cost / ((cu_width * cu_width) as f64) < INTRA_THRESHOLD)
                || (cfg.early_skip && cur.skipped)
        };
        let can_use_intra = state.depth_allowed(state.intra_depths, x, y, depth);

        if can_use_intra && !skip_intra {
            let (mode, intra_cost) = search_cu_intra(state, x, y, depth, tree.level_mut(depth));
            if intra_cost < cost {
                cost = intra_cost;
                let cur = tree.level_mut(depth).cu.at_mut(xi, yi);
                cur.cu_type = CuType::Intra;
                cur.part_size = if depth > MAX_DEPTH { PartMode::SizeNxN } else { PartMode::Size2Nx2N };
                cur.intra.mode = mode;
                cur.intra.multi_ref_idx = 0;
                cur.intra.mip_flag = false;
                cur.intra.mip_is_transposed = false;
            }
        }

        // Reconstruct the winner; neighbors predict from it.
        let cur_type = tree.level(depth).cu.at(xi, yi).cu_type;
        if cur_type == CuType::Intra {
            let mode = {
                let lcu = tree.level_mut(depth);
                let cur = lcu.cu.at_mut(xi, yi);
                cur.intra.mode_chroma = cur.intra.mode;
                let cur = *cur;
                lcu.cu.fill_cu_info(xl, yl, cu_width, cu_width, &cur);
                cur.intra.mode
            };
            intra_recon_cu(state, tree.level_mut(depth), x, y, depth, Some(mode), None);
            downsample_committed(state, tree, x, y, depth);

            if (depth != MAX_PU_DEPTH || (x % 8 != 0 && y % 8 != 0)) && has_chroma {
                let lcu = tree.level_mut(depth);
                if cfg.rdo >= 3 {
                    let mode_chroma = search_cu_intra_chroma(state, x, y, depth, lcu);
                    let cur = lcu.cu.at_mut(xi, yi);
                    cur.intra.mode_chroma = mode_chroma;
                    let cur = *cur;
                    lcu.cu.fill_cu_info(xl, yl, cu_width, cu_width, &cur);
                }
                let mode_chroma = lcu.cu.at(xi, yi).intra.mode_chroma;
                intra_recon_cu(state, lcu, x & !7, y & !7, depth, None, Some(mode_chroma));
            }
        } else if cur_type == CuType::Inter {
            if !tree.level(depth).cu.at(xi, yi).skipped {
                let part_size = tree.level(depth).cu.at(xi, yi).part_size;
                let tr_depth = if part_size == PartMode::Size2Nx2N { depth.max(1) } else { depth + 1 };
                tree.level_mut(depth).cu.fill_trdepth(x, y, depth, tr_depth);

                {
                    let (inter, ctx) = state.inter_parts();
                    inter.recon_cu(&ctx, tree.level_mut(depth), x, y, cu_width, true, has_chroma);
                }
                if cfg.jccr {
                    let lcu = tree.level_mut(depth);
                    lcu.rec_joint_u.copy_from_slice(&lcu.rec.u);
                    lcu.rec_joint_v.copy_from_slice(&lcu.rec.v);
                }

                if cfg.zero_coeff_rdo && !cfg.lossless && !cfg.rdoq {
                    inter_zero_coeff_cost =
                        cu_zero_coeff_cost(state, tree, x, y, depth) + inter_bitcost as f64 * lambda;
                }

                quantize_lcu_residual(state, tree.level_mut(depth), true, has_chroma, x, y, depth);

                let cur = tree.level_mut(depth).cu.at_mut(xi, yi);
                if cur.merged && !cur.cbf.is_set_any(depth) && cur.part_size == PartMode::Size2Nx2N {
                    cur.merged = false;
                    cur.skipped = true;
                    // Skip saves the merge flag.
                    if inter_bitcost > 1 {
                        inter_bitcost -= 1;
                    }
                }
            }
            let lcu = tree.level_mut(depth);
            lcu.cu.fill_inter(xl, yl, cu_width);
            let cur = *lcu.cu.at(xi, yi);
            lcu.cu.fill_cbf(xl, yl, cu_width, &cur);
        }
    }

    let cur_type = tree.level(depth).cu.at(xi, yi).cu_type;
    if cur_type != CuType::NotSet {
        let lcu = tree.level_mut(depth);
        let cur = *lcu.cu.at(xi, yi);
        cost = cu_rd_cost_luma(state, xl, yl, depth, &cur, lcu);
        if has_chroma {
            let mut pred_cu = cur;
            cost += cu_rd_cost_chroma(state, xl, yl, depth, &mut pred_cu, lcu);
            *lcu.cu.at_mut(xi, yi) = pred_cu;
        }

        let mode_bits = if cur_type == CuType::Intra {
            calc_mode_bits(state, lcu, lcu.cu.at(xi, yi), x, y, depth)
        } else {
            inter_bitcost as f64
        };
        cost += mode_bits * lambda;

        if cfg.zero_coeff_rdo && inter_zero_coeff_cost <= cost {
            cost = inter_zero_coeff_cost;

            // Restore the prediction saved by the zero-coefficient pass.
            let (lcu, next) = tree.pair_mut(depth);
            copy_cu_pixels(xl, yl, cu_width, next, lcu);

            let cur = *lcu.cu.at(xi, yi);
            if cur.merged && cur.part_size == PartMode::Size2Nx2N {
                let cur = lcu.cu.at_mut(xi, yi);
                cur.merged = false;
                cur.skipped = true;
                let cur = *cur;
                lcu.cu.fill_cu_info(xl, yl, cu_width, cu_width, &cur);
            }
            if cur.tr_depth != depth {
                // Without coefficients the whole CU is one transform block.
                lcu.cu.fill_trdepth(x, y, depth, depth);
            }
            clear_cu_coeffs(xl, yl, cu_width, lcu);
            let cur = lcu.cu.at_mut(xi, yi);
            cur.cbf = Default::default();
            let cur = *cur;
            lcu.cu.fill_cbf(xl, yl, cu_width, &cur);
        }
    }

    let can_split = cur_type == CuType::NotSet
        || depth < state.intra_depths.max
        || (inter_slice && depth < state.inter_depths.max);

    if can_split {
        let half = cu_width / 2;
        let mut split_cost = 0.0;
        let cur = *tree.level(depth).cu.at(xi, yi);

        if depth < MAX_DEPTH {
            let model = ctx_cu_split_model(tree.level(depth), x, y, depth);
            let ctx = &state.ctx.split_flag[model];
            cost += ctx.bits(false) * lambda;
            split_cost += ctx.bits(true) * lambda;
        }

        if cur.cu_type == CuType::Intra && depth == MAX_DEPTH {
            // 2Nx2N against NxN.
            let ctx = &state.ctx.part_size;
            cost += ctx.bits(true) * lambda;
            split_cost += ctx.bits(false) * lambda;
        }

        // A CU without coefficients rarely gains from a split.
        if cur.cu_type == CuType::NotSet
            || cur.cbf.is_set_any(depth)
            || cfg.cu_split_termination == SplitTermination::Off
        {
            for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
                if split_cost < cost {
                    split_cost += search_cu(state, tree, x + dx, y + dy, depth + 1);
                }
            }
        } else {
            split_cost = f64::INFINITY;
        }

        tracing::trace!(
            "CU ({}, {}) depth {}: no-split {:.1} split {:.1}",
            x,
            y,
            depth,
            cost,
            split_cost
        );

        if split_cost < cost {
            cost = split_cost;
            tree.copy_up(xl, yl, depth, cfg.jccr);
        } else if depth > 0 {
            commit_down(state, tree, x, y, depth, hmvp_snapshot);
        }
    } else if depth < MAX_PU_DEPTH {
        // Deeper levels hold the neighbors SMP and AMP search reads.
        commit_down(state, tree, x, y, depth, hmvp_snapshot);
    }

    assert!(
        tree.level(depth).cu.at(xi, yi).cu_type != CuType::NotSet,
        "CU ({}, {}) depth {} left undecided",
        x,
        y,
        depth
    );
    cost
}

/// Propagate an unsplit decision to the deeper levels and record its motion.
fn commit_down(
    state: &mut SearchState<'_>,
    tree: &mut WorkTree,
    x: usize,
    y: usize,
    depth: u8,
    hmvp_snapshot: Option<HmvpRow>,
) {
    tree.copy_down(x % LCU_WIDTH, y % LCU_WIDTH, depth);
    downsample_committed(state, tree, x, y, depth);

    if let Some(snapshot) = hmvp_snapshot {
        *state.hmvp = snapshot;
        let cur = tree.level(depth).cu.at((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
        state.hmvp.add(cur);
    }
}

/// Search the LCU at picture (`x`, `y`) and commit it to the picture.
pub(crate) fn search_lcu(state: &mut SearchState<'_>, tree: &mut WorkTree, x: usize, y: usize) -> LcuSearchResult {
    assert!(x % LCU_WIDTH == 0 && y % LCU_WIDTH == 0, "LCU origin ({}, {}) not aligned", x, y);

    tree.init(state.pic, x, y, state.cfg.wpp);
    let cost = search_cu(state, tree, x, y, 0);

    let lcu = tree.level(0);
    lcu.copy_to_picture(state.pic, x, y);

    let mut coeffs = lcu.coeff.clone();
    if !state.cfg.jccr {
        coeffs.joint_uv.fill(0);
    }
    let num_cus = count_cus(state.pic, tree, x, y);
    tracing::debug!(
        "LCU ({}, {}) searched: cost {:.1}, {} CUs",
        x,
        y,
        cost,
        num_cus
    );

    LcuSearchResult {
        x,
        y,
        cost,
        num_cus,
        coeffs,
    }
}

/// Number of CUs of the committed LCU at (`x`, `y`) inside the picture.
fn count_cus(pic: &Picture, tree: &WorkTree, x: usize, y: usize) -> usize {
    let grid = &tree.level(0).cu;
    let mut count = 0;
    for yy in (0..LCU_WIDTH).step_by(SCU_WIDTH) {
        for xx in (0..LCU_WIDTH).step_by(SCU_WIDTH) {
            if x + xx >= pic.width() || y + yy >= pic.height() {
                continue;
            }
            let cu_width = LCU_WIDTH >> grid.at(xx as i32, yy as i32).depth;
            if xx % cu_width == 0 && yy % cu_width == 0 {
                count += 1;
            }
        }
    }
    count
}

/// Mode-decision engine for a sequence of pictures.
///
/// Holds the configuration, the per-depth work tree and the collaborators.
/// One `Searcher` searches one LCU at a time; parallel wavefronts use one
/// searcher per worker.
#[derive(Debug)]
pub struct Searcher {
    config: SearchConfig,
    kernels: PixelKernels,
    residual: Box<dyn ResidualCoder>,
    inter: Box<dyn InterSearch>,
    work_tree: WorkTree,
}

impl Searcher {
    /// Create a searcher for intra-only coding with the default residual coder.
    pub fn new(config: SearchConfig) -> Result<Self> {
        config.validate()?;
        let work_tree = WorkTree::new(config.chroma_format);
        Ok(Self {
            config,
            kernels: *kernels(),
            residual: Box::new(SpatialQuantizer),
            inter: Box::new(NoInterSearch),
            work_tree,
        })
    }

    /// Replace the residual coder.
    pub fn with_residual_coder(mut self, residual: Box<dyn ResidualCoder>) -> Self {
        self.residual = residual;
        self
    }

    /// Replace the inter search.
    pub fn with_inter_search(mut self, inter: Box<dyn InterSearch>) -> Self {
        self.inter = inter;
        self
    }

    /// Replace the pixel kernels.
    pub fn with_kernels(mut self, kernels: PixelKernels) -> Self {
        self.kernels = kernels;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    fn check_picture(&self, pic: &Picture) -> Result<()> {
        if pic.chroma_format() != self.config.chroma_format {
            return Err(SearchError::Unsupported(format!(
                "picture chroma format {:?} differs from configured {:?}",
                pic.chroma_format(),
                self.config.chroma_format
            )));
        }
        Ok(())
    }

    /// Search the LCU at (`x`, `y`), reading and updating the HMVP row of
    /// its LCU row.
    ///
    /// The LCUs above and above-right must already be committed.
    pub fn search_lcu(
        &mut self,
        pic: &mut Picture,
        frame: &FrameParams,
        ctx: &ContextSet,
        hmvp: &mut HmvpRow,
        x: usize,
        y: usize,
    ) -> Result<LcuSearchResult> {
        self.check_picture(pic)?;
        if x >= pic.width() || y >= pic.height() {
            return Err(SearchError::Dimensions {
                width: pic.width() as u32,
                height: pic.height() as u32,
                reason: "LCU origin outside the picture",
            });
        }
        let mut state = SearchState {
            cfg: &self.config,
            frame,
            ctx,
            kernels: &self.kernels,
            residual: self.residual.as_ref(),
            inter: self.inter.as_mut(),
            pic,
            hmvp,
            intra_depths: self.config.pu_depth_intra.for_layer(frame.gop_layer),
            inter_depths: self.config.pu_depth_inter.for_layer(frame.gop_layer),
        };
        Ok(search_lcu(&mut state, &mut self.work_tree, x, y))
    }

    /// Search every LCU of `pic` in raster order.
    pub fn search_picture(&mut self, pic: &mut Picture, frame: &FrameParams) -> Result<Vec<LcuSearchResult>> {
        self.check_picture(pic)?;
        let ctx = ContextSet::new(frame.qp, frame.slice);
        let hmvp = HmvpTable::new(pic.height_in_lcu());

        let mut results = Vec::with_capacity(pic.width_in_lcu() * pic.height_in_lcu());
        for row in 0..pic.height_in_lcu() {
            let mut hmvp_row = hmvp.lock_row(row);
            for col in 0..pic.width_in_lcu() {
                results.push(self.search_lcu(pic, frame, &ctx, &mut hmvp_row, col * LCU_WIDTH, row * LCU_WIDTH)?);
            }
        }

        let total: f64 = results.iter().map(|r| r.cost).sum();
        tracing::debug!(
            "Picture {}x{} searched: {} LCUs, cost {:.1}",
            pic.width(),
            pic.height(),
            results.len(),
            total
        );
        Ok(results)
    }
}
