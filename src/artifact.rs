use egui::{Pos2, Rect};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry;

/// Stable identity of an artifact. Undo/redo restores artifacts under the
/// id they had, so commands can keep referring to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub u64);

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4 {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_egui(&self) -> egui::Color32 {
        egui::Color32::from_rgba_unmultiplied(
            (self.r * 255.0) as u8,
            (self.g * 255.0) as u8,
            (self.b * 255.0) as u8,
            (self.a * 255.0) as u8,
        )
    }

    pub fn from_egui(c: egui::Color32) -> Self {
        let [r, g, b, a] = c.to_srgba_unmultiplied();
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

impl Default for Color4 {
    fn default() -> Self {
        Self {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        }
    }
}

/// Outline and fill of an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke: Color4,
    pub fill: Color4,
}

impl Style {
    const FILL_ALPHA: f32 = 50.0 / 255.0;

    pub fn from_color(color: Color4) -> Self {
        Self {
            stroke: color.with_alpha(1.0),
            fill: color.with_alpha(Self::FILL_ALPHA),
        }
    }

    /// A random opaque outline with a translucent fill of the same hue.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::from_color(Color4::new(rng.random(), rng.random(), rng.random(), 1.0))
    }
}

impl Default for Style {
    fn default() -> Self {
        Self::from_color(Color4::default())
    }
}

/// A labeled polygon region.
///
/// The polygon is stored without a duplicated closing vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub(crate) id: ArtifactId,
    pub(crate) polygon: Vec<Pos2>,
    pub(crate) label: String,
    pub(crate) style: Style,
}

impl Artifact {
    pub(crate) fn new(id: ArtifactId, polygon: Vec<Pos2>, label: String, style: Style) -> Self {
        Self {
            id,
            polygon,
            label,
            style,
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn polygon(&self) -> &[Pos2] {
        &self.polygon
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn area(&self) -> f64 {
        geometry::polygon_area(&self.polygon)
    }

    pub fn bounds(&self) -> Rect {
        geometry::bounding_rect(&self.polygon)
    }

    /// Where a label is drawn: the area centroid.
    pub fn label_anchor(&self) -> Pos2 {
        geometry::centroid(&self.polygon)
    }

    pub fn contains(&self, point: Pos2) -> bool {
        geometry::point_in_polygon(&self.polygon, point)
    }
}
