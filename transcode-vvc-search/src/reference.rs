//! Intra reference sample construction.
//!
//! A block of width `w` is predicted from `2w + 1` samples above it and
//! `2w + 1` samples to its left. Index 0 of both arrays is the shared top-left
//! corner sample. Samples that are not coded yet are replaced by the nearest
//! available one; a block with no coded neighbor at all gets mid-gray.
//!
//! Two [`ReferenceBuilder`] implementations exist. [`InteriorPath`] handles
//! blocks with both a left and an above neighbor inside the picture,
//! [`GeneralPath`] handles every case. For interior blocks both produce the
//! same output, which the property tests check.

use crate::picture::Color;
use crate::{Pixel, BIT_DEPTH, LCU_WIDTH};

/// Largest reference array length (32x32 block).
pub const MAX_REF_LEN: usize = 2 * 32 + 1;

/// Number of coded reference samples above a block, by SCU row/column
/// within the LCU (z-order availability).
const NUM_REF_PIXELS_TOP: [[u8; 16]; 16] = [
    [64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64, 64],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [32, 28, 24, 20, 16, 12, 8, 4, 32, 28, 24, 20, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [64, 60, 56, 52, 48, 44, 40, 36, 32, 28, 24, 20, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [32, 28, 24, 20, 16, 12, 8, 4, 32, 28, 24, 20, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4, 16, 12, 8, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
];

/// Number of coded reference samples left of a block, by SCU row/column
/// within the LCU.
const NUM_REF_PIXELS_LEFT: [[u8; 16]; 16] = [
    [64, 4, 8, 4, 16, 4, 8, 4, 32, 4, 8, 4, 16, 4, 8, 4],
    [60, 4, 4, 4, 12, 4, 4, 4, 28, 4, 4, 4, 12, 4, 4, 4],
    [56, 4, 8, 4, 8, 4, 8, 4, 24, 4, 8, 4, 8, 4, 8, 4],
    [52, 4, 4, 4, 4, 4, 4, 4, 20, 4, 4, 4, 4, 4, 4, 4],
    [48, 4, 8, 4, 16, 4, 8, 4, 16, 4, 8, 4, 16, 4, 8, 4],
    [44, 4, 4, 4, 12, 4, 4, 4, 12, 4, 4, 4, 12, 4, 4, 4],
    [40, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [36, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [32, 4, 8, 4, 16, 4, 8, 4, 32, 4, 8, 4, 16, 4, 8, 4],
    [28, 4, 4, 4, 12, 4, 4, 4, 28, 4, 4, 4, 12, 4, 4, 4],
    [24, 4, 8, 4, 8, 4, 8, 4, 24, 4, 8, 4, 8, 4, 8, 4],
    [20, 4, 4, 4, 4, 4, 4, 4, 20, 4, 4, 4, 4, 4, 4, 4],
    [16, 4, 8, 4, 16, 4, 8, 4, 16, 4, 8, 4, 16, 4, 8, 4],
    [12, 4, 4, 4, 12, 4, 4, 4, 12, 4, 4, 4, 12, 4, 4, 4],
    [8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4, 8, 4],
    [4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
];

/// One pair of top/left reference arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntraRef {
    /// Corner followed by the samples above, left to right.
    pub top: [Pixel; MAX_REF_LEN],
    /// Corner followed by the samples to the left, top to bottom.
    pub left: [Pixel; MAX_REF_LEN],
}

impl Default for IntraRef {
    fn default() -> Self {
        Self {
            top: [0; MAX_REF_LEN],
            left: [0; MAX_REF_LEN],
        }
    }
}

/// Raw and smoothed references of one block.
#[derive(Debug, Clone, Default)]
pub struct IntraReferences {
    pub(crate) raw: IntraRef,
    pub(crate) filtered: IntraRef,
    pub(crate) filtered_initialized: bool,
    width: usize,
}

impl IntraReferences {
    /// Create empty references.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block width the references were built for.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Raw top array (`2w + 1` samples).
    pub fn top(&self) -> &[Pixel] {
        &self.raw.top[..2 * self.width + 1]
    }

    /// Raw left array (`2w + 1` samples).
    pub fn left(&self) -> &[Pixel] {
        &self.raw.left[..2 * self.width + 1]
    }

    /// Smoothed top array, valid once [`filter`](crate::filter::filter) ran.
    pub fn filtered_top(&self) -> &[Pixel] {
        &self.filtered.top[..2 * self.width + 1]
    }

    /// Smoothed left array, valid once [`filter`](crate::filter::filter) ran.
    pub fn filtered_left(&self) -> &[Pixel] {
        &self.filtered.left[..2 * self.width + 1]
    }

    /// Whether the smoothed arrays have been computed for this block.
    pub fn is_filtered(&self) -> bool {
        self.filtered_initialized
    }

    /// Fill both arrays with one value.
    pub fn fill(&mut self, log2_width: u32, value: Pixel) {
        self.reset(log2_width);
        self.raw.top = [value; MAX_REF_LEN];
        self.raw.left = [value; MAX_REF_LEN];
    }

    fn reset(&mut self, log2_width: u32) {
        assert!((2..=5).contains(&log2_width), "log2 width {} outside 2..=5", log2_width);
        self.width = 1 << log2_width;
        self.filtered_initialized = false;
    }
}

/// Reconstructed samples an LCU exposes to reference construction, for one
/// color plane.
#[derive(Debug, Clone, Copy)]
pub struct LcuBorders<'a> {
    /// LCU reconstruction, stride `LCU_WIDTH >> shift`.
    pub rec: &'a [Pixel],
    /// Row above the LCU; index 0 is the corner.
    pub top_ref: &'a [Pixel],
    /// Column left of the LCU; index 0 is the corner.
    pub left_ref: &'a [Pixel],
}

/// Block whose references are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceRequest {
    /// Log2 of the block width in samples of `color` (2..=5).
    pub log2_width: u32,
    /// Color component.
    pub color: Color,
    /// Picture luma x of the block.
    pub luma_x: usize,
    /// Picture luma y of the block.
    pub luma_y: usize,
    /// Picture width in luma samples.
    pub pic_width: usize,
    /// Picture height in luma samples.
    pub pic_height: usize,
    /// WPP is in use; limits above-right samples on the LCU's top edge.
    pub wpp: bool,
}

impl ReferenceRequest {
    fn shift(&self) -> usize {
        self.color.shift()
    }

    /// Block position within the LCU in samples of `color`.
    fn local(&self) -> (usize, usize) {
        (
            (self.luma_x % LCU_WIDTH) >> self.shift(),
            (self.luma_y % LCU_WIDTH) >> self.shift(),
        )
    }

    fn available_left(&self) -> usize {
        let (lx, ly) = (self.luma_x % LCU_WIDTH, self.luma_y % LCU_WIDTH);
        let width = 1usize << self.log2_width;
        (NUM_REF_PIXELS_LEFT[ly / 4][lx / 4] as usize >> self.shift())
            .min(width * 2)
            .min((self.pic_height - self.luma_y) >> self.shift())
    }

    fn available_top(&self) -> usize {
        let (lx, ly) = (self.luma_x % LCU_WIDTH, self.luma_y % LCU_WIDTH);
        let width = 1usize << self.log2_width;
        let mut avail = (NUM_REF_PIXELS_TOP[ly / 4][lx / 4] as usize >> self.shift())
            .min(width * 2)
            .min((self.pic_width - self.luma_x) >> self.shift());
        let (px, py) = self.local();
        if self.wpp && py == 0 {
            avail = avail.min((LCU_WIDTH >> self.shift()) - px - 1);
        }
        avail
    }
}

/// Strategy for filling [`IntraReferences`].
pub trait ReferenceBuilder {
    /// Build the raw references of `req` and invalidate the smoothed ones.
    fn build(&self, req: &ReferenceRequest, borders: &LcuBorders<'_>, refs: &mut IntraReferences);
}

/// Neighbor sample accessors relative to the block origin.
struct Neighbors<'a> {
    borders: &'a LcuBorders<'a>,
    px: usize,
    py: usize,
    stride: usize,
}

impl Neighbors<'_> {
    /// Sample `i` of the row above the block; `-1` is the corner.
    #[inline]
    fn top(&self, i: isize) -> Pixel {
        if self.py > 0 {
            self.borders.rec[((self.py - 1) * self.stride + self.px).wrapping_add_signed(i)]
        } else {
            self.borders.top_ref[(self.px + 1).wrapping_add_signed(i)]
        }
    }

    /// Sample `i` of the column left of the block; `-1` is the corner.
    #[inline]
    fn left(&self, i: isize) -> Pixel {
        if self.px > 0 {
            let row = (self.py as isize + i) as usize;
            self.borders.rec[row * self.stride + self.px - 1]
        } else {
            self.borders.left_ref[(self.py + 1).wrapping_add_signed(i)]
        }
    }
}

/// Reference construction for blocks with a left and an above neighbor in
/// the picture.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteriorPath;

impl ReferenceBuilder for InteriorPath {
    fn build(&self, req: &ReferenceRequest, borders: &LcuBorders<'_>, refs: &mut IntraReferences) {
        debug_assert!(req.luma_x > 0 && req.luma_y > 0);
        refs.reset(req.log2_width);
        let width = refs.width;
        let (px, py) = req.local();
        let stride = LCU_WIDTH >> req.shift();
        let n = Neighbors { borders, px, py, stride };
        let out = &mut refs.raw;

        let corner = if px > 0 { n.top(-1) } else { n.left(-1) };
        out.top[0] = corner;
        out.left[0] = corner;

        let avail_left = req.available_left();
        if px > 0 {
            let column = &borders.rec[py * stride + px - 1..];
            for (dst, src) in out.left[1..=avail_left].iter_mut().zip(column.iter().step_by(stride)) {
                *dst = *src;
            }
        } else {
            out.left[1..=avail_left].copy_from_slice(&borders.left_ref[py + 1..py + 1 + avail_left]);
        }
        let nearest = out.left[avail_left];
        out.left[avail_left + 1..=2 * width].fill(nearest);

        let avail_top = req.available_top();
        let row = if py > 0 {
            &borders.rec[(py - 1) * stride + px..]
        } else {
            &borders.top_ref[px + 1..]
        };
        out.top[1..=avail_top].copy_from_slice(&row[..avail_top]);
        let nearest = out.top[avail_top];
        out.top[avail_top + 1..=2 * width].fill(nearest);
    }
}

/// Reference construction handling picture and LCU edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralPath;

impl ReferenceBuilder for GeneralPath {
    fn build(&self, req: &ReferenceRequest, borders: &LcuBorders<'_>, refs: &mut IntraReferences) {
        refs.reset(req.log2_width);
        let width = refs.width;
        let dc_val: Pixel = 1 << (BIT_DEPTH - 1);
        let (px, py) = req.local();
        let stride = LCU_WIDTH >> req.shift();
        let n = Neighbors { borders, px, py, stride };
        let out = &mut refs.raw;

        // Left column.
        if req.luma_x > 0 {
            let avail = req.available_left();
            for i in 0..avail {
                out.left[i + 1] = n.left(i as isize);
            }
            let nearest = out.left[avail];
            for i in avail..width * 2 {
                out.left[i + 1] = nearest;
            }
        } else {
            let nearest = if req.luma_y > 0 { n.top(0) } else { dc_val };
            for i in 0..width * 2 {
                out.left[i + 1] = nearest;
            }
        }

        // Corner.
        let corner = if req.luma_x > 0 && req.luma_y > 0 {
            if px == 0 {
                n.left(-1)
            } else {
                n.top(-1)
            }
        } else {
            out.left[1]
        };
        out.left[0] = corner;
        out.top[0] = corner;

        // Top row.
        if req.luma_y > 0 {
            let avail = req.available_top();
            for i in 0..avail {
                out.top[i + 1] = n.top(i as isize);
            }
            let nearest = n.top(avail as isize - 1);
            for i in avail..width * 2 {
                out.top[i + 1] = nearest;
            }
        } else {
            let nearest = if req.luma_x > 0 { n.left(0) } else { dc_val };
            for i in 0..width * 2 {
                out.top[i + 1] = nearest;
            }
        }
    }
}

/// Build the references of a block, picking the interior path when the block
/// has both neighbors.
pub fn build_reference(req: &ReferenceRequest, borders: &LcuBorders<'_>, refs: &mut IntraReferences) {
    if req.luma_x > 0 && req.luma_y > 0 {
        InteriorPath.build(req, borders, refs);
    } else {
        GeneralPath.build(req, borders, refs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LCU_LUMA_SIZE, LCU_REF_PX_WIDTH};

    struct Fixture {
        rec: Vec<Pixel>,
        top_ref: Vec<Pixel>,
        left_ref: Vec<Pixel>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                rec: (0..LCU_LUMA_SIZE).map(|i| (i * 7 % 251) as Pixel).collect(),
                top_ref: (0..=LCU_REF_PX_WIDTH).map(|i| (200 + i % 50) as Pixel).collect(),
                left_ref: (0..=LCU_WIDTH).map(|i| (10 + i) as Pixel).collect(),
            }
        }

        fn borders(&self) -> LcuBorders<'_> {
            LcuBorders {
                rec: &self.rec,
                top_ref: &self.top_ref,
                left_ref: &self.left_ref,
            }
        }
    }

    fn request(x: usize, y: usize, log2_width: u32) -> ReferenceRequest {
        ReferenceRequest {
            log2_width,
            color: Color::Y,
            luma_x: x,
            luma_y: y,
            pic_width: 256,
            pic_height: 256,
            wpp: false,
        }
    }

    #[test]
    fn test_top_left_of_picture_is_mid_gray() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        build_reference(&request(0, 0, 3), &fx.borders(), &mut refs);
        assert_eq!(refs.top().len(), 17);
        assert!(refs.top().iter().all(|&p| p == 128));
        assert!(refs.left().iter().all(|&p| p == 128));
    }

    #[test]
    fn test_corner_shared() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        for (x, y) in [(0, 64), (64, 0), (64, 64), (72, 80), (64, 96), (96, 64)] {
            build_reference(&request(x, y, 3), &fx.borders(), &mut refs);
            assert_eq!(refs.top()[0], refs.left()[0], "({}, {})", x, y);
        }
    }

    #[test]
    fn test_nearest_extension() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        // An 8x8 block at (8, 8) of an LCU only has 8 coded samples on each side.
        build_reference(&request(72, 72, 3), &fx.borders(), &mut refs);
        let top = refs.top();
        assert_eq!(top[1], fx.rec[7 * LCU_WIDTH + 8]);
        assert!(top[9..].iter().all(|&p| p == top[8]));
        let left = refs.left();
        assert_eq!(left[1], fx.rec[8 * LCU_WIDTH + 7]);
        assert!(left[9..].iter().all(|&p| p == left[8]));
    }

    #[test]
    fn test_lcu_top_edge_reads_border_row() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        build_reference(&request(64, 64, 4), &fx.borders(), &mut refs);
        assert_eq!(refs.top()[0], fx.left_ref[0]);
        assert_eq!(&refs.top()[1..], &fx.top_ref[1..33]);
        assert_eq!(&refs.left()[1..], &fx.left_ref[1..33]);
    }

    #[test]
    fn test_wpp_limits_above_right() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        let mut req = request(64 + 32, 64, 5);
        req.wpp = true;
        build_reference(&req, &fx.borders(), &mut refs);
        // 64 - 32 - 1 samples are available, the last one is repeated.
        assert_eq!(refs.top()[31], fx.top_ref[32 + 31]);
        assert_eq!(refs.top()[64], fx.top_ref[32 + 31]);
    }

    #[test]
    fn test_paths_agree_on_interior_blocks() {
        let fx = Fixture::new();
        let mut a = IntraReferences::new();
        let mut b = IntraReferences::new();
        for log2 in 2..=5u32 {
            let w = 1usize << log2;
            for y in (0..LCU_WIDTH).step_by(w) {
                for x in (0..LCU_WIDTH).step_by(w) {
                    for wpp in [false, true] {
                        let mut req = request(64 + x, 64 + y, log2);
                        req.wpp = wpp;
                        InteriorPath.build(&req, &fx.borders(), &mut a);
                        GeneralPath.build(&req, &fx.borders(), &mut b);
                        assert_eq!(a.top(), b.top());
                        assert_eq!(a.left(), b.left());
                    }
                }
            }
        }
    }

    #[test]
    fn test_build_resets_filter_flag() {
        let fx = Fixture::new();
        let mut refs = IntraReferences::new();
        refs.filtered_initialized = true;
        build_reference(&request(64, 64, 3), &fx.borders(), &mut refs);
        assert!(!refs.is_filtered());
    }
}
