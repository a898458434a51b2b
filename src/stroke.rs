use egui::{Pos2, Rect};

use crate::error::EditError;

/// A finished brush or eraser gesture in image space.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub points: Vec<Pos2>,
    pub width: f32,
}

impl Stroke {
    pub fn new(points: Vec<Pos2>, width: f32) -> Self {
        Self { points, width }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_points(&self.points)
    }

    pub fn smoothed(&self, window: usize) -> Vec<Pos2> {
        smooth(&self.points, window)
    }
}

#[derive(Clone, Debug, Default)]
enum CaptureState {
    #[default]
    Idle,
    Capturing(Vec<Pos2>),
}

/// Accumulates pointer samples between press and release.
///
/// Samples closer than `min_spacing` to the previous one are skipped, which
/// keeps stationary jitter out of the polyline.
#[derive(Clone, Debug)]
pub struct StrokeCapture {
    state: CaptureState,
    min_spacing: f32,
}

impl StrokeCapture {
    pub fn new(min_spacing: f32) -> Self {
        Self {
            state: CaptureState::Idle,
            min_spacing,
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CaptureState::Capturing(_))
    }

    /// Start a new stroke, discarding any unfinished one.
    pub fn begin(&mut self, point: Pos2) {
        self.state = CaptureState::Capturing(vec![point]);
    }

    pub fn extend(&mut self, point: Pos2) {
        if let CaptureState::Capturing(points) = &mut self.state {
            let far_enough = points
                .last()
                .map_or(true, |last| last.distance(point) > self.min_spacing);
            if far_enough {
                points.push(point);
            }
        }
    }

    /// Finish the stroke. `None` when fewer than 2 samples were taken.
    pub fn end(&mut self, width: f32) -> Option<Stroke> {
        match std::mem::take(&mut self.state) {
            CaptureState::Capturing(points) if points.len() >= 2 => {
                log::debug!("stroke captured: {} samples, width {width}", points.len());
                Some(Stroke::new(points, width))
            }
            CaptureState::Capturing(points) => {
                log::debug!("stroke dropped: only {} sample(s)", points.len());
                None
            }
            CaptureState::Idle => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = CaptureState::Idle;
    }

    /// Samples of the stroke in progress, for live preview.
    pub fn points(&self) -> &[Pos2] {
        match &self.state {
            CaptureState::Capturing(points) => points,
            CaptureState::Idle => &[],
        }
    }
}

/// Centered moving average with replicated edge samples.
///
/// Output has the same length as the input. Fewer than 3 points, or a window
/// below 2, are returned unchanged.
pub fn smooth(points: &[Pos2], window: usize) -> Vec<Pos2> {
    if points.len() < 3 || window < 2 {
        return points.to_vec();
    }

    let n = points.len() as isize;
    let before = ((window - 1) / 2) as isize;
    let after = (window / 2) as isize;
    let count = (before + after + 1) as f32;

    (0..n)
        .map(|i| {
            let (mut x, mut y) = (0.0, 0.0);
            for k in (i - before)..=(i + after) {
                let p = points[k.clamp(0, n - 1) as usize];
                x += p.x;
                y += p.y;
            }
            Pos2::new(x / count, y / count)
        })
        .collect()
}

/// Smoothed points of a free-hand outline, ready to become a polygon.
pub fn freehand_outline(stroke: &Stroke, window: usize) -> Result<Vec<Pos2>, EditError> {
    let points = smooth(&stroke.points, window);
    if points.len() < 3 {
        return Err(EditError::InvalidStroke(format!(
            "free-hand outline needs at least 3 points, got {}",
            points.len()
        )));
    }
    Ok(points)
}
