use egui::{pos2, Pos2};
use geo::Simplify;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::config::EditorConfig;
use crate::error::{EditError, OracleError};
use crate::geometry;

/// Outline of the largest foreground region of a binary mask.
///
/// Only outer borders are considered; holes in the mask are ignored. The
/// traced contour is simplified (Ramer-Douglas-Peucker with
/// `mask_simplify_epsilon`) and repaired into a simple ring.
pub fn mask_to_polygon(mask: &GrayImage, config: &EditorConfig) -> Result<Vec<Pos2>, EditError> {
    let contours = find_contours::<u32>(mask);
    let largest = contours
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .map(|c| {
            c.points
                .iter()
                .map(|p| pos2(p.x as f32, p.y as f32))
                .collect::<Vec<Pos2>>()
        })
        .max_by(|a, b| {
            geometry::polygon_area(a)
                .total_cmp(&geometry::polygon_area(b))
                .then(a.len().cmp(&b.len()))
        })
        .ok_or(OracleError::EmptyMask)?;

    log::debug!(
        "mask {}x{}: {} contour(s), largest has {} points",
        mask.width(),
        mask.height(),
        contours.len(),
        largest.len()
    );

    let planar = geometry::to_planar_polygon(&largest)?;
    let simplified = planar.simplify(&config.mask_simplify_epsilon);
    let ring = geometry::from_planar_polygon(&simplified);
    geometry::repair_polygon(&ring).ok_or(EditError::DegenerateGeometry {
        vertices: geometry::distinct_vertex_count(&ring),
    })
}
