//! Cross-component linear model (CCLM) chroma prediction.
//!
//! Chroma is predicted as `((luma * a) >> shift) + b` from the reconstructed
//! luma, downsampled to chroma resolution. The model is fitted on four
//! template sample pairs taken from the rows above and the columns left of
//! the block.
//!
//! Downsampled luma is kept per picture in two buffers: the full-picture
//! `cclm_luma_rec` and `cclm_luma_rec_top_line`, a `[1 2 1]` filtered copy of
//! each LCU row's last luma row that blocks on the next LCU row read as their
//! top template.

use crate::cu::CuType;
use crate::intra::{LM_CHROMA_IDX, LM_CHROMA_L_IDX, LM_CHROMA_T_IDX};
use crate::picture::{Color, Picture};
use crate::reference::{IntraReferences, MAX_REF_LEN};
use crate::search::SearchState;
use crate::work_tree::Lcu;
use crate::{clip_pixel, floor_log2, Pixel, BIT_DEPTH, LCU_WIDTH};

/// Template units are 4 luma (2 chroma) samples.
const BASE_UNIT_SIZE: usize = 4;
const UNIT_WIDTH: usize = BASE_UNIT_SIZE >> 1;

/// 4-bit significands of `1 / diff`, MSB omitted.
const DIV_SIG_TABLE: [i32; 16] = [0, 7, 6, 5, 5, 4, 4, 3, 3, 2, 2, 1, 1, 1, 1, 0];

/// Fitted linear model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CclmParams {
    /// Slope numerator.
    pub a: i32,
    /// Offset.
    pub b: i32,
    /// Slope denominator shift.
    pub shift: i32,
}

impl CclmParams {
    /// Map one luma sample to chroma.
    #[inline]
    pub fn apply(&self, luma: Pixel) -> Pixel {
        clip_pixel(((luma as i32 * self.a) >> self.shift) + self.b)
    }

    /// Map a block of downsampled luma to chroma.
    pub fn linear_transform(&self, src: &[Pixel], dst: &mut [Pixel]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = self.apply(s);
        }
    }
}

/// Downsampled luma templates of a chroma block. Index 0 is the first
/// sample next to the block; there is no corner sample.
#[derive(Debug, Clone, Copy)]
pub struct LumaTemplate<'a> {
    /// Samples above the block, left to right.
    pub top: &'a [Pixel],
    /// Samples left of the block, top to bottom.
    pub left: &'a [Pixel],
}

/// Fit the model of `mode` for a `width` x `width` chroma block at picture
/// luma position (`x0`, `y0`).
///
/// `avail_above_right` and `avail_left_below` count the coded 2-sample
/// template units beyond the block's own extent.
pub fn get_cclm_parameters(
    width: usize,
    mode: u8,
    x0: usize,
    y0: usize,
    avail_above_right: usize,
    avail_left_below: usize,
    luma: &LumaTemplate<'_>,
    chroma: &IntraReferences,
) -> CclmParams {
    let (c_width, c_height) = (width, width);
    let tu_width_units = c_width / UNIT_WIDTH;
    let tu_height_units = c_height / UNIT_WIDTH;

    let avail_above_units = (y0 / BASE_UNIT_SIZE).min(tu_height_units);
    let avail_left_units = (x0 / BASE_UNIT_SIZE).min(tu_width_units);
    let mut above_available = avail_above_units != 0;
    let mut left_available = avail_left_units != 0;

    let (mut top_samples, mut left_samples) = (0, 0);
    match mode {
        LM_CHROMA_T_IDX => {
            left_available = false;
            let above_right = avail_above_right.min(c_height / UNIT_WIDTH);
            top_samples = UNIT_WIDTH * (avail_above_units + above_right);
        }
        LM_CHROMA_L_IDX => {
            above_available = false;
            let left_below = avail_left_below.min(c_width / UNIT_WIDTH);
            left_samples = UNIT_WIDTH * (avail_left_units + left_below);
        }
        _ => {
            debug_assert_eq!(mode, LM_CHROMA_IDX);
            top_samples = c_width;
            left_samples = c_height;
        }
    }

    if !above_available && !left_available {
        return CclmParams {
            a: 0,
            b: 1 << (BIT_DEPTH - 1),
            shift: 0,
        };
    }

    let above_is4 = usize::from(!left_available);
    let left_is4 = usize::from(!above_available);
    let start_top = top_samples >> (2 + above_is4);
    let step_top = (top_samples >> (1 + above_is4)).max(1);
    let start_left = left_samples >> (2 + left_is4);
    let step_left = (left_samples >> (1 + left_is4)).max(1);

    let mut sel_luma = [0i32; 4];
    let mut sel_chroma = [0i32; 4];
    let mut cnt_top = 0;
    if above_available {
        cnt_top = top_samples.min((1 + above_is4) << 1);
        let chroma_top = &chroma.top()[1..];
        for i in 0..cnt_top {
            let pos = start_top + i * step_top;
            sel_luma[i] = luma.top[pos] as i32;
            sel_chroma[i] = chroma_top[pos] as i32;
        }
    }
    let mut cnt_left = 0;
    if left_available {
        cnt_left = left_samples.min((1 + left_is4) << 1);
        let chroma_left = &chroma.left()[1..];
        for i in 0..cnt_left {
            let pos = start_left + i * step_left;
            sel_luma[cnt_top + i] = luma.left[pos] as i32;
            sel_chroma[cnt_top + i] = chroma_left[pos] as i32;
        }
    }

    if cnt_top + cnt_left == 2 {
        for sel in [&mut sel_luma, &mut sel_chroma] {
            sel[3] = sel[0];
            sel[2] = sel[1];
            sel[0] = sel[1];
            sel[1] = sel[3];
        }
    }

    // Split the four pairs into the two with the smallest and the two with
    // the largest luma.
    let mut min_grp = [0usize, 2];
    let mut max_grp = [1usize, 3];
    if sel_luma[min_grp[0]] > sel_luma[min_grp[1]] {
        min_grp.swap(0, 1);
    }
    if sel_luma[max_grp[0]] > sel_luma[max_grp[1]] {
        max_grp.swap(0, 1);
    }
    if sel_luma[min_grp[0]] > sel_luma[max_grp[1]] {
        std::mem::swap(&mut min_grp, &mut max_grp);
    }
    if sel_luma[min_grp[1]] > sel_luma[max_grp[0]] {
        std::mem::swap(&mut min_grp[1], &mut max_grp[0]);
    }

    let avg = |sel: &[i32; 4], grp: [usize; 2]| (sel[grp[0]] + sel[grp[1]] + 1) >> 1;
    let min_y = avg(&sel_luma, min_grp);
    let min_c = avg(&sel_chroma, min_grp);
    let max_y = avg(&sel_luma, max_grp);
    let max_c = avg(&sel_chroma, max_grp);

    let diff = max_y - min_y;
    if diff <= 0 {
        return CclmParams {
            a: 0,
            b: min_c,
            shift: 0,
        };
    }

    let diff_c = max_c - min_c;
    let mut x = floor_log2(diff as u32) as i32;
    let norm_diff = ((diff << 4) >> x) & 15;
    let v = DIV_SIG_TABLE[norm_diff as usize] | 8;
    x += i32::from(norm_diff != 0);

    let y = if diff_c != 0 {
        floor_log2(diff_c.unsigned_abs()) as i32 + 1
    } else {
        0
    };
    let add = (1 << y) >> 1;
    let mut a = (diff_c * v + add) >> y;
    let mut shift = 3 + x - y;
    if shift < 1 {
        shift = 1;
        a = a.signum() * 15;
    }
    let b = min_c - ((a * min_y) >> shift);
    CclmParams { a, b, shift }
}

/// Predict a `width` x `width` chroma block at picture luma (`x0`, `y0`)
/// with CCLM `mode`, writing the prediction to `dst`.
///
/// The co-located luma must already be reconstructed and downsampled.
pub(crate) fn predict_cclm(
    state: &SearchState<'_>,
    lcu: &Lcu,
    color: Color,
    width: usize,
    x0: usize,
    y0: usize,
    mode: u8,
    chroma_refs: &IntraReferences,
    dst: &mut [Pixel],
) -> CclmParams {
    debug_assert!(color.is_chroma());
    debug_assert!(matches!(mode, LM_CHROMA_IDX | LM_CHROMA_L_IDX | LM_CHROMA_T_IDX));
    let pic: &Picture = &*state.pic;
    let height = width;
    let pic_stride = pic.width();
    let c_stride = pic_stride / 2;

    let x_scu = x0 % LCU_WIDTH;
    let y_scu = y0 % LCU_WIDTH;
    let y_rec = &lcu.rec.y;
    let frame_rec = &pic.rec.y;

    let mut sampled_top = [0 as Pixel; MAX_REF_LEN];
    let mut sampled_left = [0 as Pixel; MAX_REF_LEN];
    let mut avail_above_right = 0;
    let mut avail_left_below = 0;

    if y0 > 0 {
        while avail_above_right < width / 2 {
            let x_ext = x_scu + width * 2 + 4 * avail_above_right;
            if x_ext >= LCU_WIDTH || lcu.cu.at(x_ext as i32, y_scu as i32 - 4).cu_type == CuType::NotSet {
                break;
            }
            avail_above_right += 1;
        }

        if y_scu == 0 {
            if !state.cfg.wpp {
                avail_above_right = (width / 2).min((pic.width() - x0 - width * 2) / 4);
            }
            let start = x0 / 2 + (y0 / LCU_WIDTH - 1) * c_stride;
            let count = width + avail_above_right * 2;
            sampled_top[..count].copy_from_slice(&pic.cclm_luma_rec_top_line[start..start + count]);
        } else {
            let base = x_scu + y_scu * LCU_WIDTH;
            let row2 = base - 2 * LCU_WIDTH;
            let row1 = base - LCU_WIDTH;
            let frame_row2 = (y0 - 2) * pic_stride + x0;
            let frame_row1 = (y0 - 1) * pic_stride + x0;
            let span = width * if avail_above_right > 0 { 4 } else { 2 };
            for x in (0..span).step_by(2) {
                let left_padding = usize::from(x0 > 0 || x > 0);
                let from_frame = x0 > 0 && x == 0 && x_scu == 0;
                let (l2, l1) = if from_frame {
                    (frame_rec[frame_row2 - 1], frame_rec[frame_row1 - 1])
                } else {
                    (y_rec[row2 + x - left_padding], y_rec[row1 + x - left_padding])
                };
                let s = 4
                    + y_rec[row2 + x] as u32 * 2
                    + y_rec[row2 + x + 1] as u32
                    + l2 as u32
                    + y_rec[row1 + x] as u32 * 2
                    + y_rec[row1 + x + 1] as u32
                    + l1 as u32;
                sampled_top[x / 2] = (s >> 3) as Pixel;
            }
        }
    }

    if x0 > 0 {
        while avail_left_below < height / 2 {
            let y_ext = y_scu + height * 2 + 4 * avail_left_below;
            if y_ext >= LCU_WIDTH {
                break;
            }
            let pu = lcu.cu.at(x_scu as i32 - 4, y_ext as i32);
            if pu.cu_type == CuType::NotSet || (x_scu == 32 && y_scu == 0 && pu.depth == 0) {
                break;
            }
            avail_left_below += 1;
        }
        for i in 0..height + avail_left_below * 2 {
            sampled_left[i] = pic.cclm_luma_rec[(y0 / 2 + i) * c_stride + x0 / 2 - 1];
        }
    }

    let mut sampled_luma = [0 as Pixel; 32 * 32];
    let blit = state.kernels.blit;
    blit(
        &pic.cclm_luma_rec[x0 / 2 + (y0 / 2) * c_stride..],
        c_stride,
        &mut sampled_luma,
        width,
        width,
        height,
    );

    let template = LumaTemplate {
        top: &sampled_top,
        left: &sampled_left,
    };
    let params = get_cclm_parameters(
        width,
        mode,
        x0,
        y0,
        avail_above_right,
        avail_left_below,
        &template,
        chroma_refs,
    );
    params.linear_transform(&sampled_luma[..width * height], &mut dst[..width * height]);
    params
}

/// Downsample the reconstructed luma of a CU at picture (`x`, `y`) into the
/// picture's CCLM buffers. `width` and `height` are in chroma samples.
///
/// `lcu_rec` is the LCU's luma reconstruction and `extra_pixel` the luma
/// sample left of the LCU's last row.
pub(crate) fn downsample_cclm_rec(
    pic: &mut Picture,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    lcu_rec: &[Pixel],
    extra_pixel: Pixel,
) {
    let x_scu = x % LCU_WIDTH;
    let y_scu = y % LCU_WIDTH;
    let stride = pic.width();
    let c_stride = stride / 2;
    let pic_height = pic.height();
    let base = x_scu + y_scu * LCU_WIDTH;

    let mut row = base;
    for y_ in 0..height {
        if y_ * 2 + y >= pic_height {
            break;
        }
        for x_ in 0..width {
            let from_frame = x_scu == 0 && x_ == 0 && x > 0;
            let pad = usize::from(x_ + x > 0);
            let (l0, l1) = if from_frame {
                let frame_row = (y + y_ * 2) * stride + x - 1;
                (pic.rec.y[frame_row], pic.rec.y[frame_row + stride])
            } else {
                (lcu_rec[row + 2 * x_ - pad], lcu_rec[row + 2 * x_ - pad + LCU_WIDTH])
            };
            let s = 4
                + lcu_rec[row + 2 * x_] as u32 * 2
                + lcu_rec[row + 2 * x_ + 1] as u32
                + l0 as u32
                + lcu_rec[row + 2 * x_ + LCU_WIDTH] as u32 * 2
                + lcu_rec[row + 2 * x_ + 1 + LCU_WIDTH] as u32
                + l1 as u32;
            pic.cclm_luma_rec[x / 2 + x_ + (y / 2 + y_) * c_stride] = (s >> 3) as Pixel;
        }
        row += LCU_WIDTH * 2;
    }

    if (y + height * 2) % LCU_WIDTH == 0 {
        let line = y / LCU_WIDTH * c_stride;
        let last = base + (height * 2 - 1) * LCU_WIDTH;
        for i in 0..width {
            let left = if x_scu == 0 && i == 0 && x > 0 {
                extra_pixel
            } else {
                lcu_rec[last + i * 2 - usize::from(i + x > 0)]
            };
            let s = 2 + lcu_rec[last + i * 2] as u32 * 2 + lcu_rec[last + i * 2 + 1] as u32 + left as u32;
            pic.cclm_luma_rec_top_line[i + x / 2 + line] = (s >> 2) as Pixel;
        }
    }
}
