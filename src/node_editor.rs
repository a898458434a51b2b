//! Direct vertex manipulation of one artifact in edit mode.
//!
//! The editor never owns the polygon. Every operation borrows the owner's
//! vertex list, so the document stays the single source of truth and undo
//! can rewrite the polygon behind the editor's back (`sync_with` then
//! reconciles the handles).

use std::collections::{BTreeMap, BTreeSet};

use egui::{Pos2, Rect, Vec2};

use crate::artifact::ArtifactId;
use crate::geometry;

/// One draggable node, mirroring the vertex at `index`.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeHandle {
    pub owner: ArtifactId,
    pub index: usize,
    pub selected: bool,
    /// Vertex position when the current drag started.
    pub drag_origin: Option<Pos2>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TangentSide {
    Incoming,
    Outgoing,
}

/// Polygon before and after one committed gesture.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeChange {
    pub before: Vec<Pos2>,
    pub after: Vec<Pos2>,
}

#[derive(Clone, Debug)]
struct ActiveDrag {
    grabbed: usize,
    start_polygon: Vec<Pos2>,
}

#[derive(Clone, Debug)]
pub struct NodeEditor {
    owner: ArtifactId,
    handles: Vec<NodeHandle>,
    /// Control-point offsets relative to their node.
    tangents: BTreeMap<(usize, TangentSide), Vec2>,
    tangents_shown: BTreeSet<usize>,
    drag: Option<ActiveDrag>,
}

impl NodeEditor {
    pub fn new(owner: ArtifactId, polygon: &[Pos2]) -> Self {
        Self {
            owner,
            handles: Self::fresh_handles(owner, polygon.len()),
            tangents: BTreeMap::new(),
            tangents_shown: BTreeSet::new(),
            drag: None,
        }
    }

    fn fresh_handles(owner: ArtifactId, count: usize) -> Vec<NodeHandle> {
        (0..count)
            .map(|index| NodeHandle {
                owner,
                index,
                selected: false,
                drag_origin: None,
            })
            .collect()
    }

    pub fn owner(&self) -> ArtifactId {
        self.owner
    }

    pub fn handles(&self) -> &[NodeHandle] {
        &self.handles
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.handles
            .iter()
            .filter(|h| h.selected)
            .map(|h| h.index)
            .collect()
    }

    pub fn has_selection(&self) -> bool {
        self.handles.iter().any(|h| h.selected)
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.handles.get(index).is_some_and(|h| h.selected)
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    // ── Selection ──────────────────────────────────────────────────────────

    /// Select the node at `index`. Non-additive selection clears the rest
    /// first. Returns whether the selection changed.
    pub fn select_node(&mut self, index: usize, additive: bool) -> bool {
        if index >= self.handles.len() {
            return false;
        }
        let before = self.selected_indices();
        if !additive {
            for h in &mut self.handles {
                h.selected = false;
            }
        }
        self.handles[index].selected = true;
        before != self.selected_indices()
    }

    /// Add every node whose handle square touches `rect` to the selection.
    /// `handle_size` is in world units. Callers wanting a fresh selection
    /// clear it first.
    pub fn select_nodes_in_region(&mut self, rect: Rect, polygon: &[Pos2], handle_size: f32) -> bool {
        let before = self.selected_indices();
        for h in &mut self.handles {
            h.selected |= polygon.get(h.index).is_some_and(|p| {
                Rect::from_center_size(*p, Vec2::splat(handle_size)).intersects(rect)
            });
        }
        before != self.selected_indices()
    }

    pub fn deselect_all(&mut self) -> bool {
        let had = self.has_selection();
        for h in &mut self.handles {
            h.selected = false;
        }
        had
    }

    // ── Drag ───────────────────────────────────────────────────────────────

    /// Start dragging `grabbed`. When it is part of a multi-node selection
    /// the whole selection moves with it.
    pub fn begin_drag(&mut self, grabbed: usize, polygon: &[Pos2]) {
        if grabbed >= polygon.len() || grabbed >= self.handles.len() {
            return;
        }
        let group = self.handles[grabbed].selected && self.selected_indices().len() > 1;
        for h in &mut self.handles {
            let moves = if group { h.selected } else { h.index == grabbed };
            h.drag_origin = moves.then(|| polygon[h.index]);
        }
        self.drag = Some(ActiveDrag {
            grabbed,
            start_polygon: polygon.to_vec(),
        });
        log::debug!(
            "node drag started on {} node {grabbed} (group: {group})",
            self.owner
        );
    }

    /// Move the dragged nodes to their start position plus `delta`.
    pub fn drag_by(&mut self, delta: Vec2, polygon: &mut [Pos2]) {
        if self.drag.is_none() {
            return;
        }
        for h in &self.handles {
            if let (Some(origin), Some(vertex)) = (h.drag_origin, polygon.get_mut(h.index)) {
                *vertex = origin + delta;
            }
        }
    }

    /// Finish the drag. The polygon is repaired; if nothing valid remains it
    /// is reverted to the drag-start shape and `None` is returned.
    pub fn end_drag(&mut self, polygon: &mut Vec<Pos2>) -> Option<ShapeChange> {
        let drag = self.drag.take()?;
        for h in &mut self.handles {
            h.drag_origin = None;
        }
        log::debug!("node drag ended on {} node {}", self.owner, drag.grabbed);
        self.commit(drag.start_polygon, polygon)
    }

    /// Abandon the drag and restore the drag-start shape.
    pub fn cancel_drag(&mut self, polygon: &mut Vec<Pos2>) {
        if let Some(drag) = self.drag.take() {
            *polygon = drag.start_polygon;
            for h in &mut self.handles {
                h.drag_origin = None;
            }
        }
    }

    /// Keyboard nudge of the selection, committed as its own gesture.
    pub fn nudge_selected(&mut self, delta: Vec2, polygon: &mut Vec<Pos2>) -> Option<ShapeChange> {
        let selected = self.selected_indices();
        if selected.is_empty() || delta == Vec2::ZERO {
            return None;
        }
        let before = polygon.clone();
        for i in selected {
            if let Some(p) = polygon.get_mut(i) {
                *p += delta;
            }
        }
        self.commit(before, polygon)
    }

    fn commit(&mut self, before: Vec<Pos2>, polygon: &mut Vec<Pos2>) -> Option<ShapeChange> {
        if *polygon == before {
            return None;
        }
        match geometry::repair_polygon(polygon) {
            Some(repaired) => {
                if repaired.len() != polygon.len() {
                    log::debug!(
                        "{} repaired at commit: {} -> {} vertices",
                        self.owner,
                        polygon.len(),
                        repaired.len()
                    );
                    *polygon = repaired;
                    self.sync_with(polygon);
                } else {
                    *polygon = repaired;
                }
                Some(ShapeChange {
                    before,
                    after: polygon.clone(),
                })
            }
            None => {
                log::debug!("{} edit left no valid polygon, reverting", self.owner);
                *polygon = before;
                None
            }
        }
    }

    // ── Topology ───────────────────────────────────────────────────────────

    /// Delete every selected node, highest index first. Refused (returns
    /// `None`, nothing changes) when fewer than 3 vertices would remain.
    pub fn delete_selected(&mut self, polygon: &mut Vec<Pos2>) -> Option<ShapeChange> {
        let mut selected = self.selected_indices();
        if selected.is_empty() || polygon.len().saturating_sub(selected.len()) < 3 {
            log::debug!(
                "refusing to delete {} of {} nodes on {}",
                selected.len(),
                polygon.len(),
                self.owner
            );
            return None;
        }

        let before = polygon.clone();
        let saved = (self.handles.clone(), self.tangents.clone(), self.tangents_shown.clone());
        selected.sort_unstable_by(|a, b| b.cmp(a));
        for index in selected {
            polygon.remove(index);
            self.remap_tangents_after_removal(index);
        }

        let change = self.commit(before, polygon);
        match change {
            Some(_) => self.handles = Self::fresh_handles(self.owner, polygon.len()),
            None => (self.handles, self.tangents, self.tangents_shown) = saved,
        }
        change
    }

    /// Insert a node at the midpoint of `segment` (the edge from vertex
    /// `segment` to the next one). The new node becomes the only selection.
    pub fn insert_at_segment(&mut self, segment: usize, polygon: &mut Vec<Pos2>) -> Option<ShapeChange> {
        let n = polygon.len();
        if segment >= n {
            return None;
        }
        let before = polygon.clone();
        let a = polygon[segment];
        let b = polygon[(segment + 1) % n];
        let at = segment + 1;
        polygon.insert(at, a.lerp(b, 0.5));
        self.remap_tangents_after_insert(at);

        self.handles = Self::fresh_handles(self.owner, polygon.len());
        self.handles[at].selected = true;
        Some(ShapeChange {
            before,
            after: polygon.clone(),
        })
    }

    fn remap_tangents_after_removal(&mut self, removed: usize) {
        self.tangents = std::mem::take(&mut self.tangents)
            .into_iter()
            .filter(|((i, _), _)| *i != removed)
            .map(|((i, side), v)| ((if i > removed { i - 1 } else { i }, side), v))
            .collect();
        self.tangents_shown = std::mem::take(&mut self.tangents_shown)
            .into_iter()
            .filter(|i| *i != removed)
            .map(|i| if i > removed { i - 1 } else { i })
            .collect();
    }

    fn remap_tangents_after_insert(&mut self, inserted: usize) {
        self.tangents = std::mem::take(&mut self.tangents)
            .into_iter()
            .map(|((i, side), v)| ((if i >= inserted { i + 1 } else { i }, side), v))
            .collect();
        self.tangents_shown = std::mem::take(&mut self.tangents_shown)
            .into_iter()
            .map(|i| if i >= inserted { i + 1 } else { i })
            .collect();
    }

    // ── Hit testing ────────────────────────────────────────────────────────

    /// Nearest node within `tolerance_px` screen pixels.
    pub fn find_node_near(&self, point: Pos2, polygon: &[Pos2], tolerance_px: f32, zoom: f32) -> Option<usize> {
        let tolerance = geometry::world_tolerance(tolerance_px, zoom);
        polygon
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance(point)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Nearest edge within `tolerance_px` screen pixels. Edge `i` runs from
    /// vertex `i` to vertex `i + 1` (wrapping).
    pub fn find_segment_near(&self, point: Pos2, polygon: &[Pos2], tolerance_px: f32, zoom: f32) -> Option<usize> {
        let n = polygon.len();
        if n < 2 {
            return None;
        }
        let tolerance = geometry::world_tolerance(tolerance_px, zoom);
        (0..n)
            .map(|i| {
                let d = geometry::distance_point_to_segment(point, polygon[i], polygon[(i + 1) % n]);
                (i, d)
            })
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    // ── Tangents ───────────────────────────────────────────────────────────

    /// Show or hide the control points of every selected node. Nodes that
    /// never had tangents get ones pointing a third of the way to their
    /// neighbours.
    pub fn toggle_tangents(&mut self, polygon: &[Pos2]) -> bool {
        let n = polygon.len();
        let selected = self.selected_indices();
        if selected.is_empty() || n < 3 {
            return false;
        }
        for i in selected {
            if !self.tangents_shown.remove(&i) {
                let node = polygon[i];
                let prev = polygon[(i + n - 1) % n];
                let next = polygon[(i + 1) % n];
                self.tangents
                    .entry((i, TangentSide::Incoming))
                    .or_insert((prev - node) / 3.0);
                self.tangents
                    .entry((i, TangentSide::Outgoing))
                    .or_insert((next - node) / 3.0);
                self.tangents_shown.insert(i);
            }
        }
        true
    }

    pub fn tangent(&self, index: usize, side: TangentSide) -> Option<Vec2> {
        self.tangents.get(&(index, side)).copied()
    }

    pub fn set_tangent(&mut self, index: usize, side: TangentSide, offset: Vec2) {
        if index < self.handles.len() {
            self.tangents.insert((index, side), offset);
        }
    }

    pub fn tangents_visible(&self, index: usize) -> bool {
        self.tangents_shown.contains(&index)
    }

    // ── Reconciliation ─────────────────────────────────────────────────────

    /// Rebuild handles after the polygon changed outside the editor (undo,
    /// redo, oracle refinement). Selections and tangents on indices that
    /// still exist are kept; those past the new vertex count are dropped.
    pub fn sync_with(&mut self, polygon: &[Pos2]) {
        self.drag = None;
        if self.handles.len() == polygon.len() {
            for h in &mut self.handles {
                h.drag_origin = None;
            }
            return;
        }
        let selected: Vec<usize> = self
            .selected_indices()
            .into_iter()
            .filter(|i| *i < polygon.len())
            .collect();
        self.handles = Self::fresh_handles(self.owner, polygon.len());
        for i in selected {
            self.handles[i].selected = true;
        }
        let n = polygon.len();
        self.tangents.retain(|(i, _), _| *i < n);
        self.tangents_shown.retain(|i| *i < n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    fn square() -> Vec<Pos2> {
        vec![pos2(0.0, 0.0), pos2(100.0, 0.0), pos2(100.0, 100.0), pos2(0.0, 100.0)]
    }

    fn editor(polygon: &[Pos2]) -> NodeEditor {
        NodeEditor::new(ArtifactId(1), polygon)
    }

    #[test]
    fn one_handle_per_vertex() {
        let poly = square();
        let ed = editor(&poly);
        assert_eq!(ed.handles().len(), 4);
        assert!(ed.handles().iter().all(|h| h.owner == ArtifactId(1) && !h.selected));
    }

    #[test]
    fn additive_selection() {
        let poly = square();
        let mut ed = editor(&poly);
        assert!(ed.select_node(0, false));
        assert!(ed.select_node(2, true));
        assert_eq!(ed.selected_indices(), vec![0, 2]);
        assert!(ed.select_node(1, false));
        assert_eq!(ed.selected_indices(), vec![1]);
        assert!(!ed.select_node(1, false));
        assert!(!ed.select_node(9, false));
    }

    #[test]
    fn region_selection_uses_handle_footprint() {
        let poly = square();
        let mut ed = editor(&poly);
        let rect = Rect::from_min_max(pos2(-10.0, -10.0), pos2(96.0, 10.0));
        assert!(ed.select_nodes_in_region(rect, &poly, 8.0));
        assert_eq!(ed.selected_indices(), vec![0, 1]);
    }

    #[test]
    fn region_selection_adds_to_existing_selection() {
        let poly = square();
        let mut ed = editor(&poly);
        ed.select_node(3, false);
        let rect = Rect::from_min_max(pos2(90.0, -10.0), pos2(110.0, 10.0));
        assert!(ed.select_nodes_in_region(rect, &poly, 8.0));
        assert_eq!(ed.selected_indices(), vec![1, 3]);
        assert!(!ed.select_nodes_in_region(rect, &poly, 8.0));
    }

    #[test]
    fn dragging_a_selected_node_moves_the_group() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.select_node(1, false);
        ed.select_node(2, true);
        ed.begin_drag(1, &poly);
        ed.drag_by(vec2(5.0, 0.0), &mut poly);
        ed.drag_by(vec2(10.0, 0.0), &mut poly);
        assert_eq!(poly[1], pos2(110.0, 0.0));
        assert_eq!(poly[2], pos2(110.0, 100.0));
        assert_eq!(poly[0], pos2(0.0, 0.0));

        let change = ed.end_drag(&mut poly).unwrap();
        assert_eq!(change.before, square());
        assert_eq!(change.after, poly);
        assert!(ed.handles().iter().all(|h| h.drag_origin.is_none()));
    }

    #[test]
    fn dragging_an_unselected_node_moves_only_it() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.select_node(1, false);
        ed.select_node(2, true);
        ed.begin_drag(3, &poly);
        ed.drag_by(vec2(-5.0, 5.0), &mut poly);
        assert_eq!(poly[3], pos2(-5.0, 105.0));
        assert_eq!(poly[1], pos2(100.0, 0.0));
    }

    #[test]
    fn drag_without_motion_records_nothing() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.begin_drag(0, &poly);
        assert!(ed.end_drag(&mut poly).is_none());
    }

    #[test]
    fn collapsing_drag_is_reverted() {
        let mut poly = vec![pos2(0.0, 0.0), pos2(100.0, 0.0), pos2(50.0, 80.0)];
        let mut ed = editor(&poly);
        ed.begin_drag(2, &poly);
        ed.drag_by(vec2(-50.0, -80.0), &mut poly);
        assert!(ed.end_drag(&mut poly).is_none());
        assert_eq!(poly[2], pos2(50.0, 80.0));
    }

    #[test]
    fn self_intersecting_drag_is_repaired() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.begin_drag(0, &poly);
        // the closing edge now crosses the right edge at (100, 86.67)
        ed.drag_by(vec2(150.0, 80.0), &mut poly);
        let change = ed.end_drag(&mut poly).unwrap();
        assert!(geometry::is_simple(&change.after));
        assert_eq!(change.after, poly);
        assert_eq!(poly.len(), 3);
        assert_eq!(ed.handles().len(), 3);
        let area = geometry::polygon_area(&poly);
        assert!((area - 2166.67).abs() < 1.0, "area {area}");
    }

    #[test]
    fn nudge_moves_selection() {
        let mut poly = square();
        let mut ed = editor(&poly);
        assert!(ed.nudge_selected(vec2(1.0, 0.0), &mut poly).is_none());
        ed.select_node(2, false);
        let change = ed.nudge_selected(vec2(10.0, 0.0), &mut poly).unwrap();
        assert_eq!(change.after[2], pos2(110.0, 100.0));
    }

    #[test]
    fn delete_refused_below_three_vertices() {
        let mut poly = vec![pos2(0.0, 0.0), pos2(100.0, 0.0), pos2(50.0, 80.0)];
        let mut ed = editor(&poly);
        ed.select_node(0, false);
        assert!(ed.delete_selected(&mut poly).is_none());
        assert_eq!(poly.len(), 3);
        assert_eq!(ed.selected_indices(), vec![0]);
    }

    #[test]
    fn delete_removes_highest_index_first() {
        let mut poly = vec![
            pos2(0.0, 0.0),
            pos2(50.0, 0.0),
            pos2(100.0, 0.0),
            pos2(100.0, 100.0),
            pos2(0.0, 100.0),
        ];
        let mut ed = editor(&poly);
        ed.select_node(1, false);
        ed.select_node(3, true);
        let change = ed.delete_selected(&mut poly).unwrap();
        assert_eq!(change.after, vec![pos2(0.0, 0.0), pos2(100.0, 0.0), pos2(0.0, 100.0)]);
        assert_eq!(ed.handles().len(), 3);
        assert!(!ed.has_selection());
    }

    #[test]
    fn delete_that_cannot_be_repaired_changes_nothing() {
        // removing the apex leaves three collinear vertices
        let mut poly = vec![pos2(50.0, 50.0), pos2(0.0, 0.0), pos2(50.0, 0.0), pos2(100.0, 0.0)];
        let mut ed = editor(&poly);
        ed.select_node(2, false);
        assert!(ed.toggle_tangents(&poly));
        ed.select_node(0, false);

        assert!(ed.delete_selected(&mut poly).is_none());
        assert_eq!(poly[0], pos2(50.0, 50.0));
        assert_eq!(ed.handles().len(), 4);
        assert_eq!(ed.selected_indices(), vec![0]);
        assert!(ed.tangents_visible(2));
        assert_eq!(ed.tangent(2, TangentSide::Outgoing), Some(vec2(50.0, 0.0) / 3.0));
    }

    #[test]
    fn insert_selects_only_the_midpoint() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.select_node(0, false);
        let change = ed.insert_at_segment(3, &mut poly).unwrap();
        assert_eq!(change.after.len(), 5);
        assert_eq!(poly[4], pos2(0.0, 50.0));
        assert_eq!(ed.selected_indices(), vec![4]);
        assert!(ed.insert_at_segment(7, &mut poly).is_none());
    }

    #[test]
    fn tangents_follow_renumbering() {
        let mut poly = square();
        let mut ed = editor(&poly);
        ed.select_node(2, false);
        assert!(ed.toggle_tangents(&poly));
        assert!(ed.tangents_visible(2));
        let outgoing = ed.tangent(2, TangentSide::Outgoing).unwrap();
        assert!((outgoing - vec2(-100.0 / 3.0, 0.0)).length() < 1e-4);

        ed.insert_at_segment(0, &mut poly);
        assert!(ed.tangents_visible(3));
        assert!(!ed.tangents_visible(2));
        assert_eq!(ed.tangent(3, TangentSide::Outgoing), Some(outgoing));

        ed.select_node(3, false);
        ed.toggle_tangents(&poly);
        assert!(!ed.tangents_visible(3));
    }

    #[test]
    fn hit_tolerance_scales_with_zoom() {
        let poly = square();
        let ed = editor(&poly);
        let near = pos2(106.0, 0.0);
        assert_eq!(ed.find_node_near(near, &poly, 10.0, 1.0), Some(1));
        assert_eq!(ed.find_node_near(near, &poly, 10.0, 2.0), None);
        assert_eq!(ed.find_segment_near(pos2(50.0, 4.0), &poly, 10.0, 1.0), Some(0));
        assert_eq!(ed.find_segment_near(pos2(50.0, 50.0), &poly, 10.0, 1.0), None);
    }

    #[test]
    fn sync_keeps_selection_when_count_is_stable() {
        let poly = square();
        let mut ed = editor(&poly);
        ed.select_node(3, false);
        ed.sync_with(&poly);
        assert_eq!(ed.selected_indices(), vec![3]);
        ed.sync_with(&poly[..3]);
        assert!(!ed.has_selection());
        assert_eq!(ed.handles().len(), 3);
    }
}
