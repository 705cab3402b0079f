use devcal_core::{sample_bilinear, DistortionCoefficients, Frame, FrameDimensions};
use nalgebra::{Matrix3, Vector2, Vector3};

/// Per-pixel lookup from the undistorted output image into the distorted
/// source image, built once per calibration.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    size: FrameDimensions,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl UndistortMap {
    /// Returns `None` for a singular camera matrix or an empty size.
    pub fn new(
        kmtx: &Matrix3<f64>,
        dist: &DistortionCoefficients,
        size: FrameDimensions,
    ) -> Option<Self> {
        if size.is_empty() {
            return None;
        }
        let k_inv = kmtx.try_inverse()?;
        let (w, h) = (size.width as usize, size.height as usize);
        let mut map_x = Vec::with_capacity(w * h);
        let mut map_y = Vec::with_capacity(w * h);

        for y in 0..h {
            for x in 0..w {
                let n = k_inv * Vector3::new(x as f64, y as f64, 1.0);
                let nd = dist.distort(&Vector2::new(n.x / n.z, n.y / n.z));
                let src = kmtx * Vector3::new(nd.x, nd.y, 1.0);
                map_x.push((src.x / src.z) as f32);
                map_y.push((src.y / src.z) as f32);
            }
        }

        Some(Self { size, map_x, map_y })
    }

    pub fn size(&self) -> FrameDimensions {
        self.size
    }

    /// Source coordinates sampled for output pixel `(x, y)`.
    pub fn source(&self, x: usize, y: usize) -> (f32, f32) {
        let idx = y * self.size.width as usize + x;
        (self.map_x[idx], self.map_y[idx])
    }

    /// Resample `frame` into its undistorted geometry. Pixels mapping outside
    /// the source are black. Returns `None` when the frame size differs from
    /// the map.
    pub fn remap(&self, frame: &Frame) -> Option<Frame> {
        if frame.dimensions() != self.size {
            return None;
        }
        let view = frame.view();
        let data = self
            .map_x
            .iter()
            .zip(&self.map_y)
            .map(|(&sx, &sy)| sample_bilinear(&view, sx, sy).round().clamp(0.0, 255.0) as u8)
            .collect();
        Frame::new(frame.width, frame.height, data)
    }
}
