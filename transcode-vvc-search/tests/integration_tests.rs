//! Integration tests for the VVC mode-decision search.
//!
//! These tests drive whole pictures through [`Searcher`] and check the
//! committed decisions: partition tiling, reconstruction, collaborator
//! hand-off and HMVP bookkeeping.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use transcode_vvc_search::{
    cabac::ContextSet, Cbf, ChromaFormat, Color, CuInfo, CuType, DepthRange, FrameParams, HmvpRow, InterCandidate,
    InterContext, InterInfo, InterSearch, LayerDepths, Lcu, MotionVector, PartMode, Picture, PixelKernels,
    SearchConfig, SearchError, SearchPreset, Searcher, SliceKind, LCU_WIDTH, MAX_NUM_HMVP_CANDS, SCU_WIDTH,
};

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic pseudo-random samples with some low-frequency structure so
/// that intra prediction has something to find.
fn noise_plane(width: usize, height: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..width * height)
        .map(|i| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let (x, y) = (i % width, i / width);
            let base = ((x * 3 + y * 2) % 160) as u32;
            (base + ((state >> 16) % 64)) as u8
        })
        .collect()
}

fn noise_picture(width: usize, height: usize) -> Picture {
    Picture::from_planes(
        width,
        height,
        ChromaFormat::Yuv420,
        noise_plane(width, height, 1),
        noise_plane(width / 2, height / 2, 2),
        noise_plane(width / 2, height / 2, 3),
    )
    .unwrap()
}

/// Every SCU inside the picture belongs to exactly one decided, aligned CU.
fn assert_tiled(pic: &Picture) {
    for y in (0..pic.height()).step_by(SCU_WIDTH) {
        for x in (0..pic.width()).step_by(SCU_WIDTH) {
            let cu = pic.cu_array.at(x, y);
            assert_ne!(cu.cu_type, CuType::NotSet, "SCU ({}, {}) undecided", x, y);

            let width = LCU_WIDTH >> cu.depth;
            let (ox, oy) = (x & !(width - 1), y & !(width - 1));
            assert!(ox + width <= pic.width() && oy + width <= pic.height(), "CU at ({}, {}) leaves the picture", ox, oy);

            let origin = pic.cu_array.at(ox, oy);
            assert_eq!(origin.depth, cu.depth, "SCU ({}, {}) disagrees with its CU origin", x, y);
            assert_eq!(origin.cu_type, cu.cu_type);
        }
    }
}

/// Inter search that predicts every CU perfectly as a merge candidate.
#[derive(Debug, Default)]
struct OracleInter {
    /// Report the CU as skipped from the search itself.
    skip_in_search: bool,
    /// Reported 2Nx2N cost per luma sample.
    cost_per_sample: f64,
    inter_calls: Arc<AtomicUsize>,
    smp_calls: Arc<AtomicUsize>,
}

fn copy_source(lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool) {
    predict_above_source(lcu, x, y, width, luma, chroma, 0);
}

/// Predict a square block as its source samples raised by `offset`.
fn predict_above_source(lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool, offset: u8) {
    let (xl, yl) = (x % LCU_WIDTH, y % LCU_WIDTH);
    let predict = |rec: &mut [u8], orig: &[u8], start: usize, len: usize| {
        for (r, &o) in rec[start..start + len].iter_mut().zip(&orig[start..start + len]) {
            *r = o.saturating_add(offset);
        }
    };
    if luma {
        for row in 0..width {
            let i = (yl + row) * LCU_WIDTH + xl;
            predict(&mut lcu.rec.y, &lcu.orig.y, i, width);
        }
    }
    if chroma {
        let (cw, stride) = (width / 2, LCU_WIDTH / 2);
        for row in 0..cw {
            let i = (yl / 2 + row) * stride + xl / 2;
            predict(&mut lcu.rec.u, &lcu.orig.u, i, cw);
            predict(&mut lcu.rec.v, &lcu.orig.v, i, cw);
        }
    }
}

/// Source samples raised by `delta`.
fn raised(plane: &[u8], delta: u8) -> Vec<u8> {
    plane.iter().map(|&p| p.saturating_add(delta)).collect()
}

impl InterSearch for OracleInter {
    fn search_cu_inter(&mut self, ctx: &InterContext<'_>, x: usize, y: usize, depth: u8, lcu: &mut Lcu) -> InterCandidate {
        self.inter_calls.fetch_add(1, Ordering::Relaxed);
        let cu = lcu.cu.at_mut((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
        cu.merged = true;
        cu.merge_idx = 0;
        cu.inter.mv[0] = MotionVector::new((x / 4) as i16, (y / 4) as i16);
        cu.inter.mv_dir = 1;
        if self.skip_in_search {
            cu.skipped = true;
            copy_source(lcu, x, y, LCU_WIDTH >> depth, true, ctx.cfg.chroma_format.has_chroma());
        }
        let width = LCU_WIDTH >> depth;
        InterCandidate {
            cost: self.cost_per_sample * (width * width) as f64,
            bitcost: 2,
        }
    }

    fn search_cu_smp(
        &mut self,
        _ctx: &InterContext<'_>,
        _x: usize,
        _y: usize,
        _depth: u8,
        _part_mode: PartMode,
        _lcu: &mut Lcu,
    ) -> InterCandidate {
        self.smp_calls.fetch_add(1, Ordering::Relaxed);
        InterCandidate::NONE
    }

    fn recon_cu(&mut self, _ctx: &InterContext<'_>, lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool) {
        copy_source(lcu, x, y, width, luma, chroma);
    }
}

/// Motion vector the partition mock gives PU `part` of the CU at (`x`, `y`).
fn partition_mv(x: usize, y: usize, part: usize) -> MotionVector {
    MotionVector::new(x as i16, (y + 100 * part) as i16)
}

/// Inter search where only the 2NxN partition finds a match, predicted
/// `offset` above the source.
#[derive(Debug)]
struct PartitionInter {
    offset: u8,
}

impl InterSearch for PartitionInter {
    fn search_cu_inter(&mut self, _ctx: &InterContext<'_>, _x: usize, _y: usize, _depth: u8, _lcu: &mut Lcu) -> InterCandidate {
        InterCandidate::NONE
    }

    fn search_cu_smp(
        &mut self,
        ctx: &InterContext<'_>,
        x: usize,
        y: usize,
        depth: u8,
        part_mode: PartMode,
        lcu: &mut Lcu,
    ) -> InterCandidate {
        if part_mode != PartMode::Size2NxN {
            return InterCandidate::NONE;
        }
        let cu_width = LCU_WIDTH >> depth;
        for part in 0..part_mode.num_parts() {
            let (x_pu, y_pu, w_pu, h_pu) = part_mode.pu_rect(cu_width, x % LCU_WIDTH, y % LCU_WIDTH, part);
            let pu = CuInfo {
                cu_type: CuType::Inter,
                depth,
                tr_depth: depth + 1,
                part_size: part_mode,
                qp: ctx.frame.qp,
                inter: InterInfo {
                    mv: [partition_mv(x, y, part), MotionVector::zero()],
                    mv_dir: 1,
                    ..InterInfo::default()
                },
                ..CuInfo::default()
            };
            for yy in (y_pu..y_pu + h_pu).step_by(SCU_WIDTH) {
                for xx in (x_pu..x_pu + w_pu).step_by(SCU_WIDTH) {
                    *lcu.cu.at_mut(xx as i32, yy as i32) = pu;
                }
            }
        }
        InterCandidate { cost: 0.0, bitcost: 6 }
    }

    fn recon_cu(&mut self, _ctx: &InterContext<'_>, lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool) {
        predict_above_source(lcu, x, y, width, luma, chroma, self.offset);
    }
}

/// Merge search whose prediction sits `offset` above the source.
#[derive(Debug)]
struct OffsetMerge {
    offset: u8,
}

impl InterSearch for OffsetMerge {
    fn search_cu_inter(&mut self, _ctx: &InterContext<'_>, x: usize, y: usize, _depth: u8, lcu: &mut Lcu) -> InterCandidate {
        let cu = lcu.cu.at_mut((x % LCU_WIDTH) as i32, (y % LCU_WIDTH) as i32);
        cu.merged = true;
        cu.merge_idx = 0;
        cu.inter.mv[0] = MotionVector::new(1, 1);
        cu.inter.mv_dir = 1;
        InterCandidate { cost: 0.0, bitcost: 2 }
    }

    fn search_cu_smp(
        &mut self,
        _ctx: &InterContext<'_>,
        _x: usize,
        _y: usize,
        _depth: u8,
        _part_mode: PartMode,
        _lcu: &mut Lcu,
    ) -> InterCandidate {
        InterCandidate::NONE
    }

    fn recon_cu(&mut self, _ctx: &InterContext<'_>, lcu: &mut Lcu, x: usize, y: usize, width: usize, luma: bool, chroma: bool) {
        predict_above_source(lcu, x, y, width, luma, chroma, self.offset);
    }
}

/// Every CU is a 2NxN inter CU of `depth` whose PU records cover their PU.
fn assert_partitioned(pic: &Picture, depth: u8) {
    let cu_width = LCU_WIDTH >> depth;
    for y in (0..pic.height()).step_by(SCU_WIDTH) {
        for x in (0..pic.width()).step_by(SCU_WIDTH) {
            let cu = pic.cu_array.at(x, y);
            let (ox, oy) = (x & !(cu_width - 1), y & !(cu_width - 1));
            let part = usize::from(y - oy >= cu_width / 2);
            assert_eq!(cu.cu_type, CuType::Inter, "SCU ({}, {})", x, y);
            assert_eq!(cu.part_size, PartMode::Size2NxN);
            assert_eq!(cu.depth, depth);
            assert_eq!(cu.tr_depth, depth + 1, "SCU ({}, {}) transform depth", x, y);
            assert_eq!(cu.inter.mv[0], partition_mv(ox, oy, part), "SCU ({}, {}) motion", x, y);
        }
    }
}

// ============================================================================
// Intra-only search
// ============================================================================

#[test]
fn test_single_cu_at_depth_zero() {
    let config = SearchConfig::default().with_intra_depths(DepthRange::new(0, 0));
    let mut searcher = Searcher::new(config).unwrap();
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::I, 32).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].num_cus, 1);
    assert!(results[0].cost.is_finite());

    let first = *pic.cu_array.at(0, 0);
    assert_eq!(first.cu_type, CuType::Intra);
    assert_eq!(first.depth, 0);
    assert_eq!(first.part_size, PartMode::Size2Nx2N);
    // A 64x64 CU is coded as four 32x32 transform blocks.
    assert_eq!(first.tr_depth, 1);
    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            assert_eq!(pic.cu_array.at(x, y).intra.mode, first.intra.mode);
        }
    }
}

#[test]
fn test_partition_tiles_picture() {
    let mut searcher = Searcher::new(SearchConfig::default()).unwrap();
    let mut pic = noise_picture(128, 128);
    let frame = FrameParams::new(SliceKind::I, 27).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results.len(), 4);
    assert_tiled(&pic);

    let origins: Vec<(usize, usize)> = results.iter().map(|r| (r.x, r.y)).collect();
    assert_eq!(origins, vec![(0, 0), (64, 0), (0, 64), (64, 64)]);
    for result in &results {
        assert!(result.num_cus >= 4, "depth 0 is not an intra depth in this preset");
    }
}

#[test]
fn test_partial_lcus_at_picture_edge() {
    let mut searcher = Searcher::new(SearchConfig::default()).unwrap();
    let mut pic = noise_picture(72, 40);
    let frame = FrameParams::new(SliceKind::I, 32).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results.len(), 2);
    assert_tiled(&pic);
    // Only 8x8 CUs fit in the 8-sample column right of the first LCU.
    for y in (0..40).step_by(8) {
        assert_eq!(pic.cu_array.at(64, y).depth, 3);
    }
}

#[test]
fn test_every_rdo_level_decides_every_cu() {
    for rdo in 0..=4 {
        let config = SearchConfig::default().with_rdo(rdo);
        let mut searcher = Searcher::new(config).unwrap();
        let mut pic = noise_picture(64, 64);
        let frame = FrameParams::new(SliceKind::I, 32).unwrap();
        searcher.search_picture(&mut pic, &frame).unwrap();
        assert_tiled(&pic);
    }
}

#[test]
fn test_presets_decide_every_cu() {
    for preset in [
        SearchPreset::Ultrafast,
        SearchPreset::Veryfast,
        SearchPreset::Fast,
        SearchPreset::Slow,
    ] {
        let mut searcher = Searcher::new(SearchConfig::with_preset(preset)).unwrap();
        let mut pic = noise_picture(64, 64);
        let frame = FrameParams::new(SliceKind::I, 37).unwrap();
        searcher.search_picture(&mut pic, &frame).unwrap();
        assert_tiled(&pic);
    }
}

#[test]
fn test_gop_layer_selects_depth_range() {
    let mut config = SearchConfig::default();
    config.pu_depth_intra = LayerDepths::uniform(DepthRange::new(1, 4)).with_layer(1, DepthRange::new(2, 2));
    let mut searcher = Searcher::new(config).unwrap();
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::I, 32).unwrap().with_gop_layer(1);

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results[0].num_cus, 16);
    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            assert_eq!(pic.cu_array.at(x, y).depth, 2);
        }
    }
}

#[test]
fn test_search_is_deterministic() {
    let frame = FrameParams::new(SliceKind::I, 32).unwrap();
    let mut first = noise_picture(128, 64);
    let mut second = noise_picture(128, 64);

    let a = Searcher::new(SearchConfig::default()).unwrap().search_picture(&mut first, &frame).unwrap();
    let b = Searcher::new(SearchConfig::default()).unwrap().search_picture(&mut second, &frame).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.rec, second.rec);
}

#[test]
fn test_kernel_backends_give_identical_decisions() {
    let frame = FrameParams::new(SliceKind::I, 30).unwrap();
    let mut scalar_pic = noise_picture(64, 64);
    let mut unrolled_pic = noise_picture(64, 64);

    let scalar = Searcher::new(SearchConfig::default())
        .unwrap()
        .with_kernels(PixelKernels::scalar())
        .search_picture(&mut scalar_pic, &frame)
        .unwrap();
    let unrolled = Searcher::new(SearchConfig::default())
        .unwrap()
        .with_kernels(PixelKernels::unrolled())
        .search_picture(&mut unrolled_pic, &frame)
        .unwrap();

    assert_eq!(scalar, unrolled);
    assert_eq!(scalar_pic.rec, unrolled_pic.rec);
}

#[test]
fn test_monochrome_picture() {
    let config = SearchConfig::default().with_chroma_format(ChromaFormat::Monochrome);
    let mut searcher = Searcher::new(config).unwrap();
    let mut pic =
        Picture::from_planes(64, 64, ChromaFormat::Monochrome, noise_plane(64, 64, 7), Vec::new(), Vec::new()).unwrap();
    let frame = FrameParams::new(SliceKind::I, 32).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_tiled(&pic);
    assert!(pic.rec.u.is_empty());
    assert!(results[0].coeffs.u.iter().all(|&c| c == 0));
}

#[test]
fn test_jccr_off_leaves_joint_coefficients_empty() {
    let mut searcher = Searcher::new(SearchConfig::default().with_jccr(false)).unwrap();
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::I, 22).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert!(results[0].coeffs.joint_uv.iter().all(|&c| c == 0));
    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            assert_eq!(pic.cu_array.at(x, y).joint_cb_cr, 0);
        }
    }
}

#[test]
fn test_jccr_search_completes() {
    let config = SearchConfig::with_preset(SearchPreset::Slow).with_jccr(true);
    let mut searcher = Searcher::new(config).unwrap();
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::I, 22).unwrap();

    searcher.search_picture(&mut pic, &frame).unwrap();
    assert_tiled(&pic);
    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            assert!(pic.cu_array.at(x, y).joint_cb_cr <= 3);
        }
    }
}

#[test]
fn test_picture_size_errors() {
    assert!(matches!(
        Picture::new(66, 64, ChromaFormat::Yuv420),
        Err(SearchError::Dimensions { .. })
    ));
    assert!(matches!(
        Picture::from_planes(64, 64, ChromaFormat::Yuv420, vec![0; 64 * 64], vec![0; 10], vec![0; 1024]),
        Err(SearchError::PlaneSize { plane: "U", .. })
    ));
}

// ============================================================================
// Inter collaboration
// ============================================================================

#[test]
fn test_p_slice_without_inter_search_is_all_intra() {
    let mut searcher = Searcher::new(SearchConfig::default()).unwrap();
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 32).unwrap();

    searcher.search_picture(&mut pic, &frame).unwrap();
    assert_tiled(&pic);
    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            assert_eq!(pic.cu_array.at(x, y).cu_type, CuType::Intra);
        }
    }
}

#[test]
fn test_perfect_merge_becomes_skip() {
    let config = SearchConfig::default().with_inter_depths(DepthRange::new(1, 1));
    let oracle = OracleInter::default();
    let inter_calls = Arc::clone(&oracle.inter_calls);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(oracle));

    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 32).unwrap();
    let ctx = ContextSet::new(frame.qp, frame.slice);
    let mut hmvp = HmvpRow::new();

    let result = searcher.search_lcu(&mut pic, &frame, &ctx, &mut hmvp, 0, 0).unwrap();
    assert_eq!(result.num_cus, 4);
    assert_eq!(inter_calls.load(Ordering::Relaxed), 4);
    assert!(result.coeffs.y.iter().all(|&c| c == 0));
    assert_eq!(pic.rec, pic.source);

    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            let cu = pic.cu_array.at(x, y);
            assert_eq!(cu.cu_type, CuType::Inter);
            assert!(cu.skipped && !cu.merged, "CU at ({}, {}) not converted to skip", x, y);
        }
    }

    // One HMVP entry per committed CU, in coding order.
    let mvs: Vec<(i16, i16)> = hmvp.entries().iter().map(|e| (e.mv[0].x, e.mv[0].y)).collect();
    assert_eq!(mvs, vec![(0, 0), (8, 0), (0, 8), (8, 8)]);
}

#[test]
fn test_hmvp_keeps_newest_candidates() {
    let config = SearchConfig::default().with_inter_depths(DepthRange::new(2, 2));
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(OracleInter::default()));

    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::B, 32).unwrap();
    let ctx = ContextSet::new(frame.qp, frame.slice);
    let mut hmvp = HmvpRow::new();

    let result = searcher.search_lcu(&mut pic, &frame, &ctx, &mut hmvp, 0, 0).unwrap();
    assert_eq!(result.num_cus, 16);
    assert_eq!(hmvp.len(), MAX_NUM_HMVP_CANDS);
    // The last CU in Z-order is the bottom-right 16x16 block.
    let newest = hmvp.entries()[MAX_NUM_HMVP_CANDS - 1];
    assert_eq!((newest.mv[0].x, newest.mv[0].y), (12, 12));
}

#[test]
fn test_early_skip_bypasses_reconstruction() {
    let config = SearchConfig::default().with_inter_depths(DepthRange::new(1, 1)).with_partitions(true, false);
    let oracle = OracleInter {
        skip_in_search: true,
        ..OracleInter::default()
    };
    let smp_calls = Arc::clone(&oracle.smp_calls);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(oracle));

    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 32).unwrap();
    searcher.search_picture(&mut pic, &frame).unwrap();

    // Skipped CUs try neither SMP nor intra.
    assert_eq!(smp_calls.load(Ordering::Relaxed), 0);
    assert_eq!(pic.rec, pic.source);
    assert!(pic.cu_array.at(32, 32).skipped);
}

#[test]
fn test_smp_partitions_are_offered() {
    let config = SearchConfig::default().with_inter_depths(DepthRange::new(1, 1)).with_partitions(true, false);
    let oracle = OracleInter::default();
    let smp_calls = Arc::clone(&oracle.smp_calls);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(oracle));

    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 32).unwrap();
    searcher.search_picture(&mut pic, &frame).unwrap();

    // 2NxN and Nx2N for each of the four 32x32 CUs.
    assert_eq!(smp_calls.load(Ordering::Relaxed), 8);
    assert_eq!(pic.cu_array.at(0, 0).part_size, PartMode::Size2Nx2N);
}

#[test]
fn test_cheap_inter_skips_intra_at_rdo_zero() {
    // Intra predicts a flat mid-gray picture exactly, so whenever intra is
    // searched it beats the reported inter cost.
    let decide = |cost_per_sample: f64| -> CuType {
        let config = SearchConfig::default()
            .with_rdo(0)
            .with_inter_depths(DepthRange::new(1, 1))
            .with_intra_depths(DepthRange::new(1, 1));
        let oracle = OracleInter {
            cost_per_sample,
            ..OracleInter::default()
        };
        let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(oracle));
        let mut pic =
            Picture::from_planes(64, 64, ChromaFormat::Yuv420, vec![128; 64 * 64], vec![128; 32 * 32], vec![128; 32 * 32])
                .unwrap();
        let frame = FrameParams::new(SliceKind::P, 32).unwrap();
        searcher.search_picture(&mut pic, &frame).unwrap();
        assert_tiled(&pic);
        pic.cu_array.at(32, 32).cu_type
    };

    assert_eq!(decide(7.0), CuType::Inter);
    assert_eq!(decide(9.0), CuType::Intra);
}

// ============================================================================
// Motion partitions
// ============================================================================

#[test]
fn test_partitioned_16x16_cus() {
    let config = SearchConfig::default()
        .with_inter_depths(DepthRange::new(2, 2))
        .with_intra_depths(DepthRange::new(2, 2))
        .with_partitions(true, false)
        .with_zero_coeff_rdo(false);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(PartitionInter { offset: 12 }));
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 22).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results[0].num_cus, 16);
    assert_partitioned(&pic, 2);

    // Each sample is corrected once: a residual of -12 reconstructs as -8.
    assert_eq!(pic.rec.y, raised(&pic.source.y, 4));
    assert_eq!(pic.rec.u, raised(&pic.source.u, 4));
    assert_eq!(pic.rec.v, raised(&pic.source.v, 4));
    for y in (0..64).step_by(8) {
        for x in (0..64).step_by(8) {
            let tu = pic.cu_array.at(x, y);
            assert!(tu.cbf.is_set(3, Color::U) && tu.cbf.is_set(3, Color::V), "TU ({}, {})", x, y);
        }
    }
}

#[test]
fn test_partitioned_8x8_cus_code_chroma_once() {
    let config = SearchConfig::default()
        .with_inter_depths(DepthRange::new(3, 3))
        .with_intra_depths(DepthRange::new(3, 3))
        .with_partitions(true, false)
        .with_zero_coeff_rdo(false);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(PartitionInter { offset: 12 }));
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 22).unwrap();

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results[0].num_cus, 64);
    assert_partitioned(&pic, 3);

    assert_eq!(pic.rec.y, raised(&pic.source.y, 4));
    assert_eq!(pic.rec.u, raised(&pic.source.u, 4));
    assert_eq!(pic.rec.v, raised(&pic.source.v, 4));

    // The 4x4 chroma block of an 8x8 CU is one transform block, flagged on
    // the first 4x4 luma block only.
    for y in (0..64).step_by(8) {
        for x in (0..64).step_by(8) {
            let first = pic.cu_array.at(x, y);
            assert!(first.cbf.is_set(4, Color::U) && first.cbf.is_set(4, Color::V), "CU ({}, {})", x, y);
            assert!(first.cbf.is_set(3, Color::U) && first.cbf.is_set(3, Color::V));
            for (dx, dy) in [(4, 0), (0, 4), (4, 4)] {
                let member = pic.cu_array.at(x + dx, y + dy);
                assert!(
                    !member.cbf.is_set(4, Color::U) && !member.cbf.is_set(4, Color::V),
                    "chroma coded again at ({}, {})",
                    x + dx,
                    y + dy
                );
            }
        }
    }
}

// ============================================================================
// Zero-coefficient RDO
// ============================================================================

#[test]
fn test_zero_coefficient_rdo_keeps_prediction() {
    let config = SearchConfig::default()
        .with_inter_depths(DepthRange::new(0, 0))
        .with_intra_depths(DepthRange::new(0, 0))
        .with_zero_coeff_rdo(true);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(OffsetMerge { offset: 8 }));
    let mut pic = noise_picture(64, 64);
    // At QP 22 the residual of -8 quantizes to nonzero levels, and the
    // multiplier prices every level far above the distortion it removes.
    let frame = FrameParams::new(SliceKind::P, 22).unwrap().with_lambda(1.0e4, 1.0e4);

    let results = searcher.search_picture(&mut pic, &frame).unwrap();
    assert_eq!(results[0].num_cus, 1);

    assert_eq!(pic.rec.y, raised(&pic.source.y, 8));
    assert_eq!(pic.rec.u, raised(&pic.source.u, 8));
    assert_eq!(pic.rec.v, raised(&pic.source.v, 8));

    let coeffs = &results[0].coeffs;
    assert!(coeffs.y.iter().chain(&coeffs.u).chain(&coeffs.v).all(|&c| c == 0));

    for y in (0..64).step_by(SCU_WIDTH) {
        for x in (0..64).step_by(SCU_WIDTH) {
            let cu = pic.cu_array.at(x, y);
            assert_eq!(cu.cu_type, CuType::Inter);
            assert_eq!(cu.cbf, Cbf::default(), "SCU ({}, {}) kept coded block flags", x, y);
            assert!(cu.skipped && !cu.merged, "SCU ({}, {}) not converted to skip", x, y);
            // Without coefficients the CU is a single transform block.
            assert_eq!(cu.tr_depth, 0);
        }
    }
}

#[test]
fn test_coded_residual_wins_at_small_lambda() {
    let config = SearchConfig::default()
        .with_inter_depths(DepthRange::new(0, 0))
        .with_intra_depths(DepthRange::new(0, 0))
        .with_zero_coeff_rdo(true);
    let mut searcher = Searcher::new(config).unwrap().with_inter_search(Box::new(OffsetMerge { offset: 8 }));
    let mut pic = noise_picture(64, 64);
    let frame = FrameParams::new(SliceKind::P, 22).unwrap().with_lambda(0.01, 0.01);

    let results = searcher.search_picture(&mut pic, &frame).unwrap();

    // The residual is coded and reconstructs the source exactly.
    assert_eq!(pic.rec, pic.source);
    assert!(results[0].coeffs.y.iter().any(|&c| c != 0));
    let cu = pic.cu_array.at(0, 0);
    assert!(cu.cbf.is_set_any(0));
    assert!(cu.merged && !cu.skipped);
    assert_eq!(cu.tr_depth, 1);
}
