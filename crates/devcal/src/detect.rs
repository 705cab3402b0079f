//! Chessboard [`PatternDetector`] backed by `chess-corners` + `calib-targets`.

use calib_targets::chessboard::ChessboardParams;
use calib_targets::detect::{default_chess_config, detect_chessboard, gray_image_from_slice};
use chess_corners::ChessConfig;
use devcal_core::{Frame, Observation, PatternDetector, PatternSize};
use log::debug;
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds the inner corners of a `columns x rows` chessboard.
///
/// A detection counts only when every inner corner carries a grid label;
/// partial boards are reported as not found.
#[derive(Clone, Debug)]
pub struct ChessboardPatternDetector {
    pub chess: ChessConfig,
    pub params: ChessboardParams,
}

impl Default for ChessboardPatternDetector {
    fn default() -> Self {
        Self {
            chess: default_chess_config(),
            params: ChessboardParams::default(),
        }
    }
}

impl ChessboardPatternDetector {
    fn params_for(&self, pattern: PatternSize) -> ChessboardParams {
        let mut params = self.params.clone();
        params.expected_rows = Some(pattern.rows as _);
        params.expected_cols = Some(pattern.columns as _);
        params.min_corners = params.min_corners.min(pattern.point_count() as _);
        params
    }
}

impl PatternDetector for ChessboardPatternDetector {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    fn detect(&self, frame: &Frame, pattern: PatternSize) -> Option<Observation> {
        let img = gray_image_from_slice(frame.width as u32, frame.height as u32, &frame.data).ok()?;
        let result = detect_chessboard(&img, &self.chess, self.params_for(pattern))?;
        let labelled = result
            .detection
            .corners
            .iter()
            .filter_map(|c| c.grid.as_ref().map(|g| (g.i, g.j, c.position)));
        let points = order_grid(labelled, pattern)?;
        Some(Observation::new(points))
    }
}

/// Reorder `(i, j, position)` grid-labelled corners row-major for `pattern`.
///
/// Grid labels may start anywhere and the board may come back with its axes
/// swapped; both are normalized. Returns `None` unless the labels cover the
/// full grid exactly once.
pub(crate) fn order_grid(
    labelled: impl IntoIterator<Item = (i32, i32, Point2<f32>)>,
    pattern: PatternSize,
) -> Option<Vec<Point2<f32>>> {
    let labelled: Vec<(i32, i32, Point2<f32>)> = labelled.into_iter().collect();
    let (cols, rows) = (pattern.columns as i32, pattern.rows as i32);
    if labelled.len() != (cols * rows) as usize {
        debug!(
            "chessboard labelled {} corners, expected {}",
            labelled.len(),
            cols * rows
        );
        return None;
    }

    let min_i = labelled.iter().map(|c| c.0).min()?;
    let min_j = labelled.iter().map(|c| c.1).min()?;
    let span_i = labelled.iter().map(|c| c.0).max()? - min_i + 1;
    let span_j = labelled.iter().map(|c| c.1).max()? - min_j + 1;

    let transposed = if (span_i, span_j) == (cols, rows) {
        false
    } else if (span_i, span_j) == (rows, cols) {
        true
    } else {
        return None;
    };

    let mut slots: Vec<Option<Point2<f32>>> = vec![None; (cols * rows) as usize];
    for (i, j, p) in labelled {
        let (col, row) = if transposed {
            (j - min_j, i - min_i)
        } else {
            (i - min_i, j - min_j)
        };
        let slot = slots.get_mut((row * cols + col) as usize)?;
        if slot.replace(p).is_some() {
            return None;
        }
    }
    slots.into_iter().collect()
}
