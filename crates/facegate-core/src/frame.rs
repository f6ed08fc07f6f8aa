//! Frame type and image helpers — decoding, dark detection, bilinear resize.

use std::path::{Path, PathBuf};

/// Fraction of near-black pixels above which an image counts as dark.
pub const DARK_FRAME_PCT: f32 = 0.95;

/// A decoded grayscale image.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// File the frame was decoded from, if any.
    pub source: Option<PathBuf>,
}

impl Frame {
    /// Decode an image file and convert it to 8-bit grayscale.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        if !path.is_file() {
            return Err(FrameError::FileNotFound(path.to_path_buf()));
        }

        let decoded = image::open(path).map_err(|source| FrameError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let gray = decoded.to_luma8();
        let (width, height) = gray.dimensions();

        tracing::debug!(path = %path.display(), width, height, "decoded image");

        Ok(Self {
            data: gray.into_raw(),
            width,
            height,
            source: Some(path.to_path_buf()),
        })
    }

    /// Wrap an existing grayscale buffer.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            source: None,
        })
    }

    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }

    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.data, DARK_FRAME_PCT)
    }
}

/// Returns true if more than `threshold_pct` of pixels fall in the darkest bucket (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Resize a grayscale buffer with bilinear interpolation (pixel-center aligned).
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let mut resized = vec![0u8; new_w * new_h];
    if width == 0 || height == 0 || new_w == 0 || new_h == 0 {
        return resized;
    }

    let inv_scale_x = width as f32 / new_w as f32;
    let inv_scale_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

/// Write a grayscale buffer to disk. The format follows the file extension.
pub fn save_gray(path: &Path, data: &[u8], width: u32, height: u32) -> Result<(), FrameError> {
    let expected = width as usize * height as usize;
    let img = image::GrayImage::from_raw(width, height, data.to_vec()).ok_or(
        FrameError::InvalidLength {
            expected,
            actual: data.len(),
        },
    )?;

    img.save(path).map_err(|source| FrameError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("file {0} does not exist")]
    FileNotFound(PathBuf),
    #[error("failed to load image from {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to save image to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_gray_checks_length() {
        assert!(Frame::from_gray(vec![0; 12], 4, 3).is_ok());
        let err = Frame::from_gray(vec![0; 11], 4, 3).err().unwrap();
        assert!(matches!(err, FrameError::InvalidLength { expected: 12, actual: 11 }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = Frame::open(Path::new("/nonexistent/person1.jpg")).err().unwrap();
        assert!(matches!(err, FrameError::FileNotFound(_)));
        assert_eq!(err.to_string(), "file /nonexistent/person1.jpg does not exist");
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::from_gray(vec![0, 100, 200, 100], 2, 2).unwrap();
        assert!((frame.avg_brightness() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], DARK_FRAME_PCT));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], DARK_FRAME_PCT));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], DARK_FRAME_PCT));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright
        let mut gray = vec![10u8; 940];
        gray.extend(vec![128u8; 60]);
        assert!(!is_dark_frame(&gray, DARK_FRAME_PCT));
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![128u8; 100 * 100];
        let resized = resize_bilinear(&src, 100, 100, 200, 50);
        assert_eq!(resized.len(), 200 * 50);
        assert!(resized.iter().all(|&p| p == 128));
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let src: Vec<u8> = (0..64).map(|i| (i * 4) as u8).collect();
        let resized = resize_bilinear(&src, 8, 8, 8, 8);
        assert_eq!(resized, src);
    }

    #[test]
    fn test_resize_zero_sized_source() {
        let resized = resize_bilinear(&[], 0, 0, 4, 4);
        assert_eq!(resized, vec![0u8; 16]);
    }

    #[test]
    fn test_save_and_reopen_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chip.png");
        let data: Vec<u8> = (0..16).map(|i| (i * 16) as u8).collect();
        save_gray(&path, &data, 4, 4).unwrap();

        let frame = Frame::open(&path).unwrap();
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(frame.data, data);
        assert_eq!(frame.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_open_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();
        let err = Frame::open(&path).err().unwrap();
        assert!(matches!(err, FrameError::Decode { .. }));
    }

    #[test]
    fn test_save_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_gray(&dir.path().join("x.png"), &[0u8; 3], 2, 2).err().unwrap();
        assert!(matches!(err, FrameError::InvalidLength { expected: 4, actual: 3 }));
    }
}
