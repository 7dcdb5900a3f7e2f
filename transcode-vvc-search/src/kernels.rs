//! Pixel kernels used by prediction and cost evaluation.
//!
//! The search calls these through a [`PixelKernels`] table resolved once at
//! first use from the detected CPU features. Every backend must produce
//! bit-identical results to the scalar reference.
//!
//! | Kernel | Scalar | Unrolled |
//! |--------|--------|----------|
//! | `ssd` | ✅ | ✅ 8 lanes |
//! | `satd` | ✅ | ✅ 4x4 tiles, rows in registers |
//! | `blit` | ✅ | ✅ `copy_from_slice` rows |
//! | `angular_interp` | ✅ | ✅ 4 lanes |

use std::sync::OnceLock;

use crate::Pixel;

/// Sum of squared differences of two `width` x `height` blocks.
pub type SsdFn = fn(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64;

/// Sum of absolute 4x4 Hadamard-transformed differences of two blocks.
pub type SatdFn = fn(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64;

/// Copy a `width` x `height` block.
pub type BlitFn = fn(src: &[Pixel], src_stride: usize, dst: &mut [Pixel], dst_stride: usize, width: usize, height: usize);

/// Two-tap 1/32-sample interpolation of one row: `dst[x]` between `src[x]`
/// and `src[x + 1]`. `src` must hold `dst.len() + 1` samples.
pub type AngularInterpFn = fn(src: &[Pixel], fract: i32, dst: &mut [Pixel]);

/// Runtime-resolved kernel table.
#[derive(Debug, Clone, Copy)]
pub struct PixelKernels {
    /// Backend name.
    pub name: &'static str,
    /// Sum of squared differences.
    pub ssd: SsdFn,
    /// Hadamard SATD.
    pub satd: SatdFn,
    /// Block copy.
    pub blit: BlitFn,
    /// Directional sampling.
    pub angular_interp: AngularInterpFn,
}

impl PixelKernels {
    /// Reference scalar kernels.
    pub fn scalar() -> Self {
        Self {
            name: "scalar",
            ssd: scalar::ssd,
            satd: scalar::satd,
            blit: scalar::blit,
            angular_interp: scalar::angular_interp,
        }
    }

    /// Lane-chunked kernels written for auto-vectorization.
    pub fn unrolled() -> Self {
        Self {
            name: "unrolled",
            ssd: unrolled::ssd,
            satd: unrolled::satd,
            blit: unrolled::blit,
            angular_interp: unrolled::angular_interp,
        }
    }

    /// Pick the best backend for the running CPU.
    pub fn detect() -> Self {
        let kernels = if has_vector_unit() {
            Self::unrolled()
        } else {
            Self::scalar()
        };
        tracing::debug!(backend = kernels.name, "Selected pixel kernels");
        kernels
    }
}

#[cfg(target_arch = "x86_64")]
fn has_vector_unit() -> bool {
    is_x86_feature_detected!("sse4.2")
}

#[cfg(target_arch = "aarch64")]
fn has_vector_unit() -> bool {
    // NEON is always available on AArch64
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn has_vector_unit() -> bool {
    false
}

/// Process-wide kernel table.
pub fn kernels() -> &'static PixelKernels {
    static KERNELS: OnceLock<PixelKernels> = OnceLock::new();
    KERNELS.get_or_init(PixelKernels::detect)
}

/// Unnormalized 4x4 Hadamard transform of a difference block, returning the
/// sum of absolute coefficients.
#[inline]
fn hadamard4x4_abs_sum(diff: &[i32; 16]) -> u32 {
    let mut temp = [0i32; 16];
    for row in 0..4 {
        let i = row * 4;
        let a = diff[i] + diff[i + 3];
        let b = diff[i + 1] + diff[i + 2];
        let c = diff[i] - diff[i + 3];
        let d = diff[i + 1] - diff[i + 2];

        temp[i] = a + b;
        temp[i + 1] = c + d;
        temp[i + 2] = a - b;
        temp[i + 3] = c - d;
    }

    let mut sum = 0u32;
    for col in 0..4 {
        let a = temp[col] + temp[col + 12];
        let b = temp[col + 4] + temp[col + 8];
        let c = temp[col] - temp[col + 12];
        let d = temp[col + 4] - temp[col + 8];

        sum += (a + b).unsigned_abs();
        sum += (c + d).unsigned_abs();
        sum += (a - b).unsigned_abs();
        sum += (c - d).unsigned_abs();
    }
    (sum + 1) >> 1
}

mod scalar {
    use super::hadamard4x4_abs_sum;
    use crate::Pixel;

    pub fn ssd(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64 {
        let mut sum = 0u64;
        for y in 0..height {
            for x in 0..width {
                let diff = a[y * a_stride + x] as i32 - b[y * b_stride + x] as i32;
                sum += (diff * diff) as u64;
            }
        }
        sum
    }

    pub fn satd(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64 {
        debug_assert!(width % 4 == 0 && height % 4 == 0);
        let mut sum = 0u64;
        for by in (0..height).step_by(4) {
            for bx in (0..width).step_by(4) {
                let mut diff = [0i32; 16];
                for y in 0..4 {
                    for x in 0..4 {
                        diff[y * 4 + x] = a[(by + y) * a_stride + bx + x] as i32
                            - b[(by + y) * b_stride + bx + x] as i32;
                    }
                }
                sum += hadamard4x4_abs_sum(&diff) as u64;
            }
        }
        sum
    }

    pub fn blit(src: &[Pixel], src_stride: usize, dst: &mut [Pixel], dst_stride: usize, width: usize, height: usize) {
        for y in 0..height {
            for x in 0..width {
                dst[y * dst_stride + x] = src[y * src_stride + x];
            }
        }
    }

    pub fn angular_interp(src: &[Pixel], fract: i32, dst: &mut [Pixel]) {
        for x in 0..dst.len() {
            let r1 = src[x] as i32;
            let r2 = src[x + 1] as i32;
            dst[x] = (r1 + ((fract * (r2 - r1) + 16) >> 5)) as Pixel;
        }
    }
}

mod unrolled {
    use super::hadamard4x4_abs_sum;
    use crate::Pixel;

    #[inline]
    fn ssd_row(a: &[Pixel], b: &[Pixel]) -> u64 {
        let mut lanes = [0u32; 8];
        let mut a_chunks = a.chunks_exact(8);
        let mut b_chunks = b.chunks_exact(8);
        for (ca, cb) in (&mut a_chunks).zip(&mut b_chunks) {
            for i in 0..8 {
                let d = ca[i] as i32 - cb[i] as i32;
                lanes[i] += (d * d) as u32;
            }
        }
        let mut sum: u64 = lanes.iter().map(|&l| l as u64).sum();
        for (&pa, &pb) in a_chunks.remainder().iter().zip(b_chunks.remainder()) {
            let d = pa as i32 - pb as i32;
            sum += (d * d) as u64;
        }
        sum
    }

    pub fn ssd(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64 {
        (0..height)
            .map(|y| {
                ssd_row(
                    &a[y * a_stride..y * a_stride + width],
                    &b[y * b_stride..y * b_stride + width],
                )
            })
            .sum()
    }

    pub fn satd(a: &[Pixel], a_stride: usize, b: &[Pixel], b_stride: usize, width: usize, height: usize) -> u64 {
        debug_assert!(width % 4 == 0 && height % 4 == 0);
        let mut sum = 0u64;
        for by in (0..height).step_by(4) {
            for bx in (0..width).step_by(4) {
                let mut diff = [0i32; 16];
                for (y, row) in diff.chunks_exact_mut(4).enumerate() {
                    let ra = &a[(by + y) * a_stride + bx..][..4];
                    let rb = &b[(by + y) * b_stride + bx..][..4];
                    row[0] = ra[0] as i32 - rb[0] as i32;
                    row[1] = ra[1] as i32 - rb[1] as i32;
                    row[2] = ra[2] as i32 - rb[2] as i32;
                    row[3] = ra[3] as i32 - rb[3] as i32;
                }
                sum += hadamard4x4_abs_sum(&diff) as u64;
            }
        }
        sum
    }

    pub fn blit(src: &[Pixel], src_stride: usize, dst: &mut [Pixel], dst_stride: usize, width: usize, height: usize) {
        for y in 0..height {
            dst[y * dst_stride..y * dst_stride + width]
                .copy_from_slice(&src[y * src_stride..y * src_stride + width]);
        }
    }

    pub fn angular_interp(src: &[Pixel], fract: i32, dst: &mut [Pixel]) {
        let width = dst.len();
        let main = width & !3;
        for x in (0..main).step_by(4) {
            let r = &src[x..x + 5];
            let out = &mut dst[x..x + 4];
            for i in 0..4 {
                let r1 = r[i] as i32;
                out[i] = (r1 + ((fract * (r[i + 1] as i32 - r1) + 16) >> 5)) as Pixel;
            }
        }
        for x in main..width {
            let r1 = src[x] as i32;
            dst[x] = (r1 + ((fract * (src[x + 1] as i32 - r1) + 16) >> 5)) as Pixel;
        }
    }
}
