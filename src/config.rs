use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EditError;

/// All editing thresholds in one struct.
/// Serializable so a host can keep presets next to its own settings, and
/// plain data so sliders can tweak it at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    // -- Stroke capture --
    /// Minimum distance (world units) between two captured stroke samples.
    pub stroke_min_spacing: f32,
    /// Window of the centered moving average applied to strokes.
    pub smoothing_window: usize,
    /// Brush diameter used when the host never set one.
    pub default_brush_size: f32,

    // -- Eraser --
    /// Lower bound for the eraser buffer radius.
    pub min_eraser_radius: f64,
    /// Vertices per half circle when rounding eraser caps and joins.
    pub eraser_arc_segments: usize,
    /// A fragment is significant when its area is at least this share
    /// of the total remaining area.
    pub significance_ratio: f64,
    /// Fragments smaller than this (square world units) are dropped.
    /// Fixed regardless of image resolution; very large or very small
    /// images may want a different value.
    pub min_fragment_area: f64,
    /// Give every fragment of a split its own random colors.
    /// When false the fragments inherit the original style.
    pub recolor_split_fragments: bool,

    // -- Node editing --
    /// Node handle footprint in screen pixels.
    pub handle_size_px: f32,
    /// Hit-test tolerance for nodes and segments, in screen pixels.
    pub hit_tolerance_px: f32,
    /// Arrow-key nudge distance in world units (Shift multiplies by 10).
    pub nudge_step: f32,

    // -- Oracle --
    /// Grid resolution used when sampling re-prompt points.
    pub prompt_grid: usize,
    /// Target number of foreground and of background points.
    pub prompt_points_per_class: usize,
    /// Padding added around a piece's bounding box for the re-prompt box.
    pub prompt_box_padding: f32,
    /// Re-prompt the oracle with each surviving piece after an erase. Only
    /// takes effect while a worker is attached.
    pub reprompt_after_erase: bool,
    /// RDP epsilon applied to mask contours (pixels).
    pub mask_simplify_epsilon: f64,

    // -- History --
    /// Maximum number of undo entries kept. 0 = unbounded.
    pub history_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            stroke_min_spacing: 2.0,
            smoothing_window: 3,
            default_brush_size: 5.0,
            min_eraser_radius: 0.5,
            eraser_arc_segments: 8,
            significance_ratio: 0.1,
            min_fragment_area: 100.0,
            recolor_split_fragments: true,
            handle_size_px: 8.0,
            hit_tolerance_px: 10.0,
            nudge_step: 1.0,
            prompt_grid: 5,
            prompt_points_per_class: 32,
            prompt_box_padding: 10.0,
            reprompt_after_erase: true,
            mask_simplify_epsilon: 1.0,
            history_limit: 0,
        }
    }
}

impl EditorConfig {
    /// Parse a (possibly partial) JSON preset; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EditError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, EditError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_string(&self) -> Result<String, EditError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
