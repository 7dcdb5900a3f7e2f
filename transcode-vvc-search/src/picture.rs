//! Picture planes shared by the LCU searches of one frame.

use crate::config::ChromaFormat;
use crate::cu::CuArray;
use crate::error::{Result, SearchError};
use crate::{Pixel, LCU_WIDTH};

/// Color component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// Luma.
    Y = 0,
    /// Blue-difference chroma.
    U = 1,
    /// Red-difference chroma.
    V = 2,
}

impl Color {
    /// All components in coding order.
    pub const ALL: [Color; 3] = [Color::Y, Color::U, Color::V];

    /// Whether this is a chroma component.
    pub fn is_chroma(self) -> bool {
        self != Color::Y
    }

    /// Subsampling shift of the component in 4:2:0.
    pub fn shift(self) -> usize {
        usize::from(self.is_chroma())
    }

    /// Plane name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Color::Y => "Y",
            Color::U => "U",
            Color::V => "V",
        }
    }
}

/// Three sample planes of one picture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Planes {
    /// Luma samples.
    pub y: Vec<Pixel>,
    /// Cb samples (empty for 4:0:0).
    pub u: Vec<Pixel>,
    /// Cr samples (empty for 4:0:0).
    pub v: Vec<Pixel>,
}

impl Planes {
    /// Plane of `color`.
    pub fn plane(&self, color: Color) -> &[Pixel] {
        match color {
            Color::Y => &self.y,
            Color::U => &self.u,
            Color::V => &self.v,
        }
    }

    /// Mutable plane of `color`.
    pub fn plane_mut(&mut self, color: Color) -> &mut [Pixel] {
        match color {
            Color::Y => &mut self.y,
            Color::U => &mut self.u,
            Color::V => &mut self.v,
        }
    }
}

/// A picture under search: source samples, reconstruction and CU decisions.
#[derive(Debug, Clone)]
pub struct Picture {
    width: usize,
    height: usize,
    chroma_format: ChromaFormat,
    /// Source samples.
    pub source: Planes,
    /// Reconstructed samples, filled LCU by LCU as the search commits.
    pub rec: Planes,
    /// Committed CU decisions.
    pub cu_array: CuArray,
    /// Reconstructed luma downsampled to chroma resolution.
    pub(crate) cclm_luma_rec: Vec<Pixel>,
    /// Downsampled bottom luma row of every LCU row.
    pub(crate) cclm_luma_rec_top_line: Vec<Pixel>,
}

impl Picture {
    /// Create a picture with blank source planes.
    pub fn new(width: usize, height: usize, chroma_format: ChromaFormat) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        let luma = width * height;
        let chroma = if chroma_format.has_chroma() { luma / 4 } else { 0 };
        let blank = Planes {
            y: vec![0; luma],
            u: vec![0; chroma],
            v: vec![0; chroma],
        };
        Ok(Self::with_source(width, height, chroma_format, blank))
    }

    /// Create a picture from source planes.
    pub fn from_planes(
        width: usize,
        height: usize,
        chroma_format: ChromaFormat,
        y: Vec<Pixel>,
        u: Vec<Pixel>,
        v: Vec<Pixel>,
    ) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        let luma = width * height;
        let chroma = if chroma_format.has_chroma() { luma / 4 } else { 0 };
        for (color, expected, actual) in [
            (Color::Y, luma, y.len()),
            (Color::U, chroma, u.len()),
            (Color::V, chroma, v.len()),
        ] {
            if expected != actual {
                return Err(SearchError::PlaneSize {
                    plane: color.name(),
                    expected,
                    actual,
                });
            }
        }
        Ok(Self::with_source(width, height, chroma_format, Planes { y, u, v }))
    }

    fn check_dimensions(width: usize, height: usize) -> Result<()> {
        let reason = if width == 0 || height == 0 {
            Some("dimensions must be positive")
        } else if width % 8 != 0 || height % 8 != 0 {
            Some("dimensions must be multiples of 8")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(SearchError::Dimensions {
                width: width as u32,
                height: height as u32,
                reason,
            }),
            None => Ok(()),
        }
    }

    fn with_source(width: usize, height: usize, chroma_format: ChromaFormat, source: Planes) -> Self {
        let rec = Planes {
            y: vec![0; source.y.len()],
            u: vec![0; source.u.len()],
            v: vec![0; source.v.len()],
        };
        let lcu_rows = height.div_ceil(LCU_WIDTH);
        Self {
            width,
            height,
            chroma_format,
            source,
            rec,
            cu_array: CuArray::new(width, height),
            cclm_luma_rec: vec![0; (width / 2) * (height / 2)],
            cclm_luma_rec_top_line: vec![0; (width / 2) * lcu_rows],
        }
    }

    /// Width in luma samples.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in luma samples.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Chroma format.
    pub fn chroma_format(&self) -> ChromaFormat {
        self.chroma_format
    }

    /// Row stride of a plane.
    pub fn stride(&self, color: Color) -> usize {
        self.width >> color.shift()
    }

    /// Number of LCU columns.
    pub fn width_in_lcu(&self) -> usize {
        self.width.div_ceil(LCU_WIDTH)
    }

    /// Number of LCU rows.
    pub fn height_in_lcu(&self) -> usize {
        self.height.div_ceil(LCU_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_picture() {
        let pic = Picture::new(136, 72, ChromaFormat::Yuv420).unwrap();
        assert_eq!(pic.source.y.len(), 136 * 72);
        assert_eq!(pic.source.u.len(), 68 * 36);
        assert_eq!(pic.stride(Color::V), 68);
        assert_eq!(pic.width_in_lcu(), 3);
        assert_eq!(pic.height_in_lcu(), 2);
        assert_eq!(pic.cclm_luma_rec_top_line.len(), 68 * 2);
    }

    #[test]
    fn test_monochrome_has_no_chroma() {
        let pic = Picture::new(64, 64, ChromaFormat::Monochrome).unwrap();
        assert!(pic.source.u.is_empty());
        assert!(pic.rec.v.is_empty());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            Picture::new(65, 64, ChromaFormat::Yuv420),
            Err(SearchError::Dimensions { width: 65, .. })
        ));
        assert!(Picture::new(0, 64, ChromaFormat::Yuv420).is_err());
    }

    #[test]
    fn test_plane_size_mismatch() {
        let err = Picture::from_planes(
            16,
            16,
            ChromaFormat::Yuv420,
            vec![0; 256],
            vec![0; 64],
            vec![0; 63],
        )
        .unwrap_err();
        assert_eq!(
            err,
            SearchError::PlaneSize {
                plane: "V",
                expected: 64,
                actual: 63
            }
        );
    }
}
