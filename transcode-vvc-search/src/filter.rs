//! Intra reference smoothing.

use crate::reference::IntraReferences;
use crate::Pixel;

#[inline]
fn smooth(a: Pixel, b: Pixel, c: Pixel) -> Pixel {
    ((a as u16 + 2 * b as u16 + c as u16 + 2) >> 2) as Pixel
}

/// Compute the `[1 2 1] / 4` smoothed references of a block.
///
/// The corner is filtered across both arrays and the far ends are copied.
/// Runs at most once per built block; returns whether it did any work.
pub fn filter(refs: &mut IntraReferences, log2_width: u32) -> bool {
    if refs.filtered_initialized {
        return false;
    }
    refs.filtered_initialized = true;

    let ref_width = 2 * (1usize << log2_width) + 1;
    debug_assert_eq!(ref_width, 2 * refs.width() + 1);
    let raw = &refs.raw;
    let out = &mut refs.filtered;

    let corner = smooth(raw.left[1], raw.left[0], raw.top[1]);
    out.left[0] = corner;
    out.top[0] = corner;

    for i in 1..ref_width - 1 {
        out.left[i] = smooth(raw.left[i - 1], raw.left[i], raw.left[i + 1]);
        out.top[i] = smooth(raw.top[i - 1], raw.top[i], raw.top[i + 1]);
    }
    out.left[ref_width - 1] = raw.left[ref_width - 1];
    out.top[ref_width - 1] = raw.top[ref_width - 1];

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_reference_unchanged() {
        let mut refs = IntraReferences::new();
        refs.fill(3, 77);
        assert!(filter(&mut refs, 3));
        assert!(refs.filtered_top().iter().all(|&p| p == 77));
        assert!(refs.filtered_left().iter().all(|&p| p == 77));
    }

    #[test]
    fn test_filter_runs_once() {
        let mut refs = IntraReferences::new();
        refs.fill(2, 10);
        refs.raw.top[3] = 50;
        assert!(filter(&mut refs, 2));
        let first = refs.filtered;
        assert_eq!(refs.filtered_top()[3], (10 + 100 + 10 + 2) >> 2);

        // A second call leaves the cache alone even if the raw samples change.
        refs.raw.top[3] = 90;
        assert!(!filter(&mut refs, 2));
        assert_eq!(refs.filtered, first);
    }

    #[test]
    fn test_corner_and_ends() {
        let mut refs = IntraReferences::new();
        refs.fill(2, 0);
        refs.raw.left[0] = 100;
        refs.raw.left[1] = 20;
        refs.raw.top[1] = 40;
        refs.raw.top[8] = 200;
        filter(&mut refs, 2);
        assert_eq!(refs.filtered_top()[0], ((20u16 + 200 + 40 + 2) >> 2) as Pixel);
        assert_eq!(refs.filtered_left()[0], refs.filtered_top()[0]);
        assert_eq!(refs.filtered_top()[8], 200);
    }
}
