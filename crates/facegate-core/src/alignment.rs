//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the five ArcFace reference landmarks, scaled to
//! the requested chip size, using least-squares estimation.

use crate::frame::Frame;

/// ArcFace reference landmarks for a 112×112 chip.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// Chip size expected by the recognizer.
pub const RECOGNIZER_CHIP_SIZE: u32 = 112;

/// Default size of chips written to disk.
pub const DEFAULT_CHIP_SIZE: u32 = 256;

/// A square, aligned grayscale face crop.
#[derive(Debug, Clone)]
pub struct AlignedChip {
    pub data: Vec<u8>,
    pub size: u32,
}

/// Reference landmarks scaled from the 112×112 template to `size`.
pub fn reference_landmarks(size: u32) -> [(f32, f32); 5] {
    let scale = size as f32 / RECOGNIZER_CHIP_SIZE as f32;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * scale, y * scale))
}

/// Estimate a 2×3 similarity transform (scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for [a, b, tx, ty]:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [[0.0f32; 4]; 4];
    let mut atb = [0.0f32; 4];

    for ((sx, sy), (dx, dy)) in src.iter().copied().zip(dst.iter().copied()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(ata, atb).unwrap_or([1.0, 0.0, 0.0, 0.0]);
    [a, -b, tx, b, a, ty]
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
///
/// Returns `None` for a singular system (e.g. all landmarks collapsed to one point).
#[allow(clippy::needless_range_loop)]
fn solve_4x4(a: [[f32; 4]; 4], b: [f32; 4]) -> Option<[f32; 4]> {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        m[i][..4].copy_from_slice(&a[i]);
        m[i][4] = b[i];
    }

    for col in 0..4 {
        let max_row = (col..4)
            .max_by(|&r1, &r2| {
                m[r1][col]
                    .abs()
                    .partial_cmp(&m[r2][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    Some(x)
}

/// Apply a 2×3 similarity warp with bilinear sampling.
/// Out-of-bounds pixels are filled with 0 (black).
fn warp_affine(frame: &Frame, matrix: &[f32; 6], out_size: usize) -> Vec<u8> {
    let src_width = frame.width as usize;
    let src_height = frame.height as usize;
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    // M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return vec![0u8; out_size * out_size];
    }
    let ia = a / det;
    let ib = b / det;

    let sample = |x: i32, y: i32| -> f32 {
        if x >= 0 && x < src_width as i32 && y >= 0 && y < src_height as i32 {
            frame.data[y as usize * src_width + x as usize] as f32
        } else {
            0.0
        }
    };

    let mut output = vec![0u8; out_size * out_size];

    for oy in 0..out_size {
        for ox in 0..out_size {
            // src = M_inv * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            output[oy * out_size + ox] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    output
}

/// Align a detected face to a canonical `size`×`size` chip.
pub fn align_face(frame: &Frame, landmarks: &[(f32, f32); 5], size: u32) -> AlignedChip {
    let matrix = estimate_similarity_transform(landmarks, &reference_landmarks(size));
    AlignedChip {
        data: warp_affine(frame, &matrix, size as usize),
        size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_gray(vec![value; (width * height) as usize], width, height).unwrap()
    }

    #[test]
    fn test_identity_transform() {
        let pts = REFERENCE_LANDMARKS_112;
        let m = estimate_similarity_transform(&pts, &pts);

        assert!((m[0] - 1.0).abs() < 1e-4, "a = {}", m[0]);
        assert!(m[1].abs() < 1e-4, "-b = {}", m[1]);
        assert!(m[2].abs() < 1e-3, "tx = {}", m[2]);
        assert!(m[3].abs() < 1e-4, "b = {}", m[3]);
        assert!((m[4] - 1.0).abs() < 1e-4, "a2 = {}", m[4]);
        assert!(m[5].abs() < 1e-3, "ty = {}", m[5]);
    }

    #[test]
    fn test_scaled_transform() {
        // Source landmarks at 2x scale → a ≈ 0.5
        let src = REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0));
        let m = estimate_similarity_transform(&src, &REFERENCE_LANDMARKS_112);
        assert!((m[0] - 0.5).abs() < 0.05, "a = {}, expected ~0.5", m[0]);
    }

    #[test]
    fn test_reference_landmarks_scale_with_chip_size() {
        let lms = reference_landmarks(224);
        for (scaled, base) in lms.iter().zip(REFERENCE_LANDMARKS_112.iter()) {
            assert!((scaled.0 - base.0 * 2.0).abs() < 1e-4);
            assert!((scaled.1 - base.1 * 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_degenerate_landmarks_fall_back() {
        let collapsed = [(10.0, 10.0); 5];
        let zeros = [(0.0, 0.0); 5];
        let m = estimate_similarity_transform(&zeros, &collapsed);
        assert_eq!(m, [1.0, -0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_align_face_output_size() {
        let frame = gray(640, 480, 128);
        let chip = align_face(&frame, &REFERENCE_LANDMARKS_112, DEFAULT_CHIP_SIZE);
        assert_eq!(chip.size, DEFAULT_CHIP_SIZE);
        assert_eq!(chip.data.len(), (DEFAULT_CHIP_SIZE * DEFAULT_CHIP_SIZE) as usize);
    }

    #[test]
    fn test_out_of_bounds_is_black() {
        // Tiny source frame: most of the chip maps outside it.
        let frame = gray(4, 4, 255);
        let chip = align_face(&frame, &REFERENCE_LANDMARKS_112, RECOGNIZER_CHIP_SIZE);
        assert_eq!(chip.data[111 * 112 + 111], 0);
    }

    #[test]
    fn test_landmark_lands_on_reference() {
        // A bright patch at the left eye should end up near the reference left eye.
        let w = 200usize;
        let h = 200usize;
        let mut data = vec![0u8; w * h];

        let src_landmarks: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let lx = src_landmarks[0].0 as usize;
        let ly = src_landmarks[0].1 as usize;
        for py in ly - 2..=ly + 2 {
            for px in lx - 2..=lx + 2 {
                data[py * w + px] = 255;
            }
        }
        let frame = Frame::from_gray(data, w as u32, h as u32).unwrap();

        for size in [RECOGNIZER_CHIP_SIZE, DEFAULT_CHIP_SIZE] {
            let chip = align_face(&frame, &src_landmarks, size);
            let (rx, ry) = reference_landmarks(size)[0];
            let (rx, ry) = (rx.round() as usize, ry.round() as usize);

            let mut max_val = 0u8;
            for y in ry - 1..=ry + 1 {
                for x in rx - 1..=rx + 1 {
                    max_val = max_val.max(chip.data[y * size as usize + x]);
                }
            }
            assert!(max_val > 100, "size {size}: no bright patch near ({rx}, {ry}), max={max_val}");
        }
    }
}
