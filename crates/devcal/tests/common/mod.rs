//! Fake collaborators shared by the pipeline tests.
//!
//! Source files are small text files read by [`FakeMedia`]:
//! - still: `WxH` (board visible), `WxH blank` (no board), `corrupt` (decode error)
//! - video: `frames=N WxH`, `frames=N WxH blank`; a trailing `empty=K` makes
//!   the first K decodes at every position come back empty

#![allow(dead_code)]

use devcal::{
    CalibrationFlags, CalibrationResult, Collaborators, Frame, FrameDimensions, IntrinsicsSolver,
    MediaBackend, MediaError, Observation, PatternDetector, PatternSize, PipelineConfig,
    ResultIoError, ResultWriter, SolverError, SolverOutput, VideoSource,
};
use devcal_core::DistortionCoefficients;
use nalgebra::{Matrix3, Point2, Point3};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const BOARD: u8 = 200;

fn parse_dims(s: &str) -> Option<(usize, usize)> {
    let (w, h) = s.split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

/// Reports a full grid on any frame whose top-left pixel is bright.
#[derive(Default)]
pub struct FakeDetector {
    pub calls: Cell<usize>,
}

impl PatternDetector for FakeDetector {
    fn detect(&self, frame: &Frame, pattern: PatternSize) -> Option<Observation> {
        self.calls.set(self.calls.get() + 1);
        if frame.get(0, 0) != BOARD {
            return None;
        }
        let mut points = Vec::with_capacity(pattern.point_count());
        for i in 0..pattern.rows {
            for j in 0..pattern.columns {
                points.push(Point2::new(10.0 + 5.0 * j as f32, 10.0 + 5.0 * i as f32));
            }
        }
        Some(Observation::new(points))
    }
}

/// Records its inputs and returns a fixed, valid solution.
pub struct FakeSolver {
    pub calls: Cell<usize>,
    pub seen_views: Cell<usize>,
    pub seen_objects: RefCell<Vec<Vec<Point3<f64>>>>,
    pub seen_size: Cell<Option<FrameDimensions>>,
    pub seen_flags: Cell<Option<CalibrationFlags>>,
    pub fx: f64,
}

impl Default for FakeSolver {
    fn default() -> Self {
        Self {
            calls: Cell::new(0),
            seen_views: Cell::new(0),
            seen_objects: RefCell::new(Vec::new()),
            seen_size: Cell::new(None),
            seen_flags: Cell::new(None),
            fx: 500.0,
        }
    }
}

impl IntrinsicsSolver for FakeSolver {
    fn calibrate(
        &self,
        object_points: &[Vec<Point3<f64>>],
        image_points: &[Observation],
        image_size: FrameDimensions,
        flags: CalibrationFlags,
    ) -> Result<SolverOutput, SolverError> {
        self.calls.set(self.calls.get() + 1);
        self.seen_views.set(image_points.len());
        *self.seen_objects.borrow_mut() = object_points.to_vec();
        self.seen_size.set(Some(image_size));
        self.seen_flags.set(Some(flags));
        let c = image_size.center();
        Ok(SolverOutput {
            camera_matrix: Matrix3::new(self.fx, 0.0, c.x, 0.0, 500.0, c.y, 0.0, 0.0, 1.0),
            distortion: DistortionCoefficients::default(),
            reprojection_error: 0.25,
        })
    }
}

pub struct FakeVideo {
    total: usize,
    frame: Frame,
    reads: Rc<Cell<usize>>,
    empty_per_position: usize,
    /// Position of the last read and the empty decodes still owed there.
    pending: Option<(usize, usize)>,
}

impl VideoSource for FakeVideo {
    fn frame_count(&self) -> usize {
        self.total
    }

    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>, MediaError> {
        self.reads.set(self.reads.get() + 1);
        if index >= self.total {
            return Ok(None);
        }
        let remaining = match self.pending {
            Some((pos, left)) if pos == index => left,
            _ => self.empty_per_position,
        };
        if remaining > 0 {
            self.pending = Some((index, remaining - 1));
            return Ok(None);
        }
        self.pending = Some((index, 0));
        Ok(Some(self.frame.clone()))
    }
}

/// Decodes the text fixtures described at the top of this module.
#[derive(Default)]
pub struct FakeMedia {
    pub opened: RefCell<Vec<PathBuf>>,
    pub video_reads: Rc<Cell<usize>>,
}

impl FakeMedia {
    fn describe(&self, path: &Path) -> Result<String, MediaError> {
        self.opened.borrow_mut().push(path.to_path_buf());
        fs::read_to_string(path).map_err(|source| MediaError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    fn frame(path: &Path, fixture: &str) -> Result<Frame, MediaError> {
        let mut parts = fixture.split_whitespace();
        let dims = parts.next().and_then(parse_dims);
        let value = if parts.next() == Some("blank") { 0 } else { BOARD };
        match dims {
            Some((w, h)) => Ok(Frame::filled(w, h, value)),
            None => Err(MediaError::Decode {
                path: path.to_path_buf(),
                reason: "unreadable fixture".into(),
            }),
        }
    }

    pub fn opened_names(&self) -> Vec<String> {
        self.opened
            .borrow()
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_owned))
            .collect()
    }
}

impl MediaBackend for FakeMedia {
    fn read_still(&self, path: &Path) -> Result<Frame, MediaError> {
        let fixture = self.describe(path)?;
        Self::frame(path, fixture.trim())
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn VideoSource>, MediaError> {
        let fixture = self.describe(path)?;
        let (count, rest) = fixture
            .trim()
            .strip_prefix("frames=")
            .and_then(|s| s.split_once(' '))
            .ok_or_else(|| MediaError::Decode {
                path: path.to_path_buf(),
                reason: "not a video fixture".into(),
            })?;
        let total = count.parse().map_err(|_| MediaError::Decode {
            path: path.to_path_buf(),
            reason: "bad frame count".into(),
        })?;
        let empty_per_position = match rest.split_whitespace().find_map(|t| t.strip_prefix("empty=")) {
            Some(k) => k.parse().map_err(|_| MediaError::Decode {
                path: path.to_path_buf(),
                reason: "bad empty count".into(),
            })?,
            None => 0,
        };
        Ok(Box::new(FakeVideo {
            total,
            frame: Self::frame(path, rest)?,
            reads: Rc::clone(&self.video_reads),
            empty_per_position,
            pending: None,
        }))
    }
}

/// Keeps results in memory, optionally refusing to store them.
#[derive(Default)]
pub struct MemoryWriter {
    pub written: RefCell<Vec<(String, CalibrationResult)>>,
    pub fail: bool,
}

impl MemoryWriter {
    pub fn devices(&self) -> Vec<String> {
        self.written.borrow().iter().map(|(d, _)| d.clone()).collect()
    }
}

impl ResultWriter for MemoryWriter {
    fn write(&self, device: &str, result: &CalibrationResult) -> Result<PathBuf, ResultIoError> {
        if self.fail {
            return Err(ResultIoError::Io {
                path: PathBuf::from(format!("{device}.json")),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.written
            .borrow_mut()
            .push((device.to_string(), result.clone()));
        Ok(PathBuf::from(format!("{device}.json")))
    }
}

#[derive(Default)]
pub struct Fakes {
    pub detector: FakeDetector,
    pub solver: FakeSolver,
    pub media: FakeMedia,
    pub writer: MemoryWriter,
}

impl Fakes {
    pub fn tools(&self) -> Collaborators<'_> {
        Collaborators {
            detector: &self.detector,
            solver: &self.solver,
            media: &self.media,
            writer: &self.writer,
        }
    }
}

/// Write fixture files into `dir`, creating it.
pub fn fixtures(dir: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(dir).expect("mkdir");
    for (name, body) in files {
        fs::write(dir.join(name), body).expect("write fixture");
    }
}

pub fn config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: data_dir.to_path_buf(),
        square_size: 0.025,
        ..Default::default()
    }
}
