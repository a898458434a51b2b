//! The artifact collection and everything that mutates it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use egui::{Pos2, Rect, Vec2};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactId, Style};
use crate::config::EditorConfig;
use crate::eraser::{self, EraseOutcome};
use crate::error::EditError;
use crate::geometry;
use crate::history::{Command, Direction, History, ShapeState, UndoEntry};
use crate::mask;
use crate::node_editor::{NodeEditor, ShapeChange};
use crate::oracle::{self, Prompt};
use crate::stroke::Stroke;

/// Which side of the selection sync an update is addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionTarget {
    /// The canvas showing the polygons.
    Scene,
    /// The external attribute table.
    Table,
}

/// Events for the presentation layer, drained with
/// [`Document::take_notifications`].
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    PolygonsChanged,
    AttributeChanged(ArtifactId),
    SelectionChanged {
        target: SelectionTarget,
        ids: Vec<ArtifactId>,
    },
    NodeSelectionChanged(ArtifactId),
    OracleBusy(bool),
    OracleFailed(String),
}

/// What one eraser stroke did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EraseReport {
    pub deleted: Vec<ArtifactId>,
    pub replaced: Vec<ArtifactId>,
    /// Artifacts that were split (and no longer exist).
    pub split: Vec<ArtifactId>,
    /// Fragments created by splits.
    pub created: Vec<ArtifactId>,
    /// Every surviving piece with the polygon of the artifact it came from.
    pub survivors: Vec<(ArtifactId, Vec<Pos2>)>,
}

impl EraseReport {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.replaced.is_empty() && self.split.is_empty()
    }
}

// ── Sidecar persistence ─────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ArtifactRecord {
    id: u64,
    label: String,
    style: Style,
    polygon: Vec<(f32, f32)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ArtifactFile {
    artifacts: Vec<ArtifactRecord>,
}

/// `photo.png` -> `photo.png.artifacts`
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(format!(
        "{}.artifacts",
        image_path
            .extension()
            .unwrap_or_default()
            .to_str()
            .unwrap_or("")
    ))
}

// ── Document ────────────────────────────────────────────────────────────────

pub struct Document {
    config: EditorConfig,
    artifacts: BTreeMap<ArtifactId, Artifact>,
    next_id: u64,
    history: History,
    /// One editor per artifact while edit mode is on.
    editors: BTreeMap<ArtifactId, NodeEditor>,
    editing: bool,
    dragging: Option<ArtifactId>,
    notifications: Vec<Notification>,
    rng: StdRng,
}

impl Document {
    pub fn new(config: EditorConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic fragment colors and prompt sampling.
    pub fn with_seed(config: EditorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: EditorConfig, rng: StdRng) -> Self {
        Self {
            history: History::new(config.history_limit),
            config,
            artifacts: BTreeMap::new(),
            next_id: 1,
            editors: BTreeMap::new(),
            editing: false,
            dragging: None,
            notifications: Vec::new(),
            rng,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EditorConfig) {
        self.config = config;
    }

    /// Artifacts in z-order, bottom first.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn artifact(&self, id: ArtifactId) -> Option<&Artifact> {
        self.artifacts.get(&id)
    }

    pub fn ids(&self) -> Vec<ArtifactId> {
        self.artifacts.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Topmost artifact containing `point`.
    pub fn artifact_at(&self, point: Pos2) -> Option<ArtifactId> {
        self.artifacts
            .values()
            .rev()
            .find(|a| a.contains(point))
            .map(|a| a.id)
    }

    fn allocate_id(&mut self) -> ArtifactId {
        let id = ArtifactId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        if self.notifications.last() != Some(&notification) {
            self.notifications.push(notification);
        }
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // ── Artifact-level edits ───────────────────────────────────────────────

    /// Add a new artifact. The outline is repaired first; a random style is
    /// picked when none is given.
    pub fn add_artifact(
        &mut self,
        polygon: &[Pos2],
        label: impl Into<String>,
        style: Option<Style>,
    ) -> Result<ArtifactId, EditError> {
        let polygon = geometry::repair_polygon(polygon).ok_or(EditError::DegenerateGeometry {
            vertices: geometry::distinct_vertex_count(polygon),
        })?;
        let id = self.allocate_id();
        let style = style.unwrap_or_else(|| Style::random(&mut self.rng));
        let artifact = Artifact::new(id, polygon, label.into(), style);
        log::info!("adding {id} ({} vertices)", artifact.polygon.len());
        self.execute(Command::Add { artifact });
        Ok(id)
    }

    /// Delete several artifacts as one undo step. Unknown ids are an error
    /// and nothing is deleted.
    pub fn delete_artifacts(&mut self, ids: &[ArtifactId]) -> Result<usize, EditError> {
        let mut commands = Vec::with_capacity(ids.len());
        for id in ids {
            let artifact = self.artifacts.get(id).ok_or(EditError::UnknownArtifact(*id))?;
            commands.push(Command::Delete {
                artifact: artifact.clone(),
            });
        }
        let count = commands.len();
        if count > 0 {
            log::info!("deleting {count} artifact(s)");
            self.execute(Self::combine(commands));
        }
        Ok(count)
    }

    pub fn set_label(&mut self, id: ArtifactId, label: impl Into<String>) -> Result<(), EditError> {
        let label = label.into();
        let artifact = self.artifacts.get(&id).ok_or(EditError::UnknownArtifact(id))?;
        if artifact.label == label {
            return Ok(());
        }
        self.execute(Command::ModifyAttribute {
            id,
            before: artifact.label.clone(),
            after: label,
        });
        Ok(())
    }

    /// Replace the outline of an artifact (e.g. with an oracle refinement).
    pub fn replace_shape(&mut self, id: ArtifactId, polygon: &[Pos2]) -> Result<(), EditError> {
        let artifact = self.artifacts.get(&id).ok_or(EditError::UnknownArtifact(id))?;
        let polygon = geometry::repair_polygon(polygon).ok_or(EditError::DegenerateGeometry {
            vertices: geometry::distinct_vertex_count(polygon),
        })?;
        if artifact.polygon == polygon {
            return Ok(());
        }
        self.execute(Command::ModifyShape {
            id,
            before: ShapeState::polygon(artifact.polygon.clone()),
            after: ShapeState::polygon(polygon),
        });
        Ok(())
    }

    /// Turn an oracle mask into geometry: a new artifact when `target` is
    /// `None`, otherwise a new outline for `target`.
    pub fn apply_mask(&mut self, target: Option<ArtifactId>, mask: &GrayImage) -> Result<ArtifactId, EditError> {
        let polygon = mask::mask_to_polygon(mask, &self.config)?;
        match target {
            Some(id) => {
                self.replace_shape(id, &polygon)?;
                Ok(id)
            }
            None => {
                let label = format!("Artifact {}", self.next_id);
                self.add_artifact(&polygon, label, None)
            }
        }
    }

    /// Close a free-hand outline into a new artifact.
    pub fn add_freehand(&mut self, stroke: &Stroke) -> Result<ArtifactId, EditError> {
        let outline = crate::stroke::freehand_outline(stroke, self.config.smoothing_window)?;
        let label = format!("Artifact {}", self.next_id);
        self.add_artifact(&outline, label, None)
    }

    // ── Erasing ────────────────────────────────────────────────────────────

    /// Erase `stroke` from every artifact it touches, recorded as a single
    /// undo step. Either every touched artifact is updated or none is.
    pub fn erase(&mut self, stroke: &Stroke) -> Result<EraseReport, EditError> {
        let points = stroke.smoothed(self.config.smoothing_window);
        let region = eraser::eraser_region(&points, stroke.width, &self.config)?;
        let radius = (stroke.width / 2.0).max(self.config.min_eraser_radius as f32);

        let mut outcomes = Vec::new();
        for artifact in self.artifacts.values() {
            if !eraser::is_candidate(&artifact.polygon, &points, radius) {
                continue;
            }
            match eraser::erase_polygon(&artifact.polygon, &region, &self.config)? {
                EraseOutcome::Unchanged => {}
                outcome => outcomes.push((artifact.id, outcome)),
            }
        }

        let mut report = EraseReport::default();
        if outcomes.is_empty() {
            log::debug!("eraser stroke touched nothing");
            return Ok(report);
        }

        let mut before = Vec::new();
        let mut after = Vec::new();
        for (id, outcome) in outcomes {
            let Some(original) = self.artifacts.get(&id).cloned() else {
                continue;
            };
            match outcome {
                EraseOutcome::Unchanged => continue,
                EraseOutcome::Deleted => {
                    log::debug!("erase: {id} deleted");
                    report.deleted.push(id);
                }
                EraseOutcome::Replaced(polygon) => {
                    log::debug!("erase: {id} reshaped");
                    report.replaced.push(id);
                    report.survivors.push((id, original.polygon.clone()));
                    after.push(Artifact {
                        polygon,
                        ..original.clone()
                    });
                }
                EraseOutcome::Split(pieces) => {
                    log::debug!("erase: {id} split into {}", pieces.len());
                    report.split.push(id);
                    for piece in pieces {
                        let fragment = self.allocate_id();
                        let style = if self.config.recolor_split_fragments {
                            Style::random(&mut self.rng)
                        } else {
                            original.style
                        };
                        report.created.push(fragment);
                        report.survivors.push((fragment, original.polygon.clone()));
                        after.push(Artifact::new(fragment, piece, original.label.clone(), style));
                    }
                }
            }
            before.push(original);
        }

        log::info!(
            "erase: {} deleted, {} reshaped, {} split",
            report.deleted.len(),
            report.replaced.len(),
            report.split.len()
        );
        self.execute(Command::EraseBatch { before, after });
        Ok(report)
    }

    /// Points prompts asking the oracle to re-segment every piece that
    /// survived an erase.
    pub fn reprompt_prompts(&mut self, report: &EraseReport) -> Vec<(ArtifactId, Prompt)> {
        let mut prompts = Vec::new();
        for (id, original) in &report.survivors {
            if let Some(artifact) = self.artifacts.get(id) {
                let prompt = oracle::sample_prompt(&artifact.polygon, original, &self.config, &mut self.rng);
                prompts.push((*id, prompt));
            }
        }
        prompts
    }

    // ── History ────────────────────────────────────────────────────────────

    fn combine(mut commands: Vec<Command>) -> Command {
        if commands.len() == 1 {
            commands.remove(0)
        } else {
            Command::Batch(commands)
        }
    }

    fn execute(&mut self, command: Command) {
        self.apply(&command, Direction::Redo);
        self.history.push(UndoEntry::new(command));
    }

    /// Record a change that has already been applied.
    fn record(&mut self, command: Command) {
        self.history.push(UndoEntry::new(command));
    }

    pub fn undo(&mut self) -> bool {
        self.cancel_node_drag();
        match self.history.undo() {
            Some(command) => {
                log::debug!("undo: {}", command.describe());
                self.apply(&command, Direction::Undo);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        self.cancel_node_drag();
        match self.history.redo() {
            Some(command) => {
                log::debug!("redo: {}", command.describe());
                self.apply(&command, Direction::Redo);
                true
            }
            None => false,
        }
    }

    /// Bring the document to the state on the `direction` side of `command`.
    pub fn apply(&mut self, command: &Command, direction: Direction) {
        match (command, direction) {
            (Command::Add { artifact }, Direction::Redo)
            | (Command::Delete { artifact }, Direction::Undo) => {
                self.insert(artifact.clone());
            }
            (Command::Add { artifact }, Direction::Undo)
            | (Command::Delete { artifact }, Direction::Redo) => {
                self.remove(artifact.id);
            }
            (Command::ModifyShape { id, before, after }, _) => {
                let state = match direction {
                    Direction::Undo => before,
                    Direction::Redo => after,
                };
                self.restore_shape(*id, state);
            }
            (Command::ModifyAttribute { id, before, after }, _) => {
                let label = match direction {
                    Direction::Undo => before,
                    Direction::Redo => after,
                };
                match self.artifacts.get_mut(id) {
                    Some(artifact) => {
                        artifact.label = label.clone();
                        self.notify(Notification::AttributeChanged(*id));
                    }
                    None => log::warn!("rename of missing artifact {id} skipped"),
                }
            }
            (Command::EraseBatch { before, after }, _) => {
                let (gone, back) = match direction {
                    Direction::Undo => (after, before),
                    Direction::Redo => (before, after),
                };
                for artifact in gone {
                    self.remove(artifact.id);
                }
                for artifact in back {
                    self.insert(artifact.clone());
                }
            }
            (Command::Batch(commands), Direction::Undo) => {
                for command in commands.iter().rev() {
                    self.apply(command, direction);
                }
            }
            (Command::Batch(commands), Direction::Redo) => {
                for command in commands {
                    self.apply(command, direction);
                }
            }
        }
    }

    fn insert(&mut self, artifact: Artifact) {
        let id = artifact.id;
        self.next_id = self.next_id.max(id.0 + 1);
        if self.editing {
            match self.editors.get_mut(&id) {
                Some(editor) => editor.sync_with(&artifact.polygon),
                None => {
                    self.editors.insert(id, NodeEditor::new(id, &artifact.polygon));
                }
            }
        }
        self.artifacts.insert(id, artifact);
        self.notify(Notification::PolygonsChanged);
    }

    fn remove(&mut self, id: ArtifactId) {
        self.editors.remove(&id);
        if self.dragging == Some(id) {
            self.dragging = None;
        }
        if self.artifacts.remove(&id).is_some() {
            self.notify(Notification::PolygonsChanged);
        }
    }

    fn restore_shape(&mut self, id: ArtifactId, state: &ShapeState) {
        let Some(artifact) = self.artifacts.get_mut(&id) else {
            log::warn!("shape change of missing artifact {id} skipped");
            return;
        };
        artifact.polygon = state.polygon.clone();
        if let Some(label) = &state.label {
            artifact.label = label.clone();
        }
        if let Some(style) = state.style {
            artifact.style = style;
        }
        if let Some(editor) = self.editors.get_mut(&id) {
            editor.sync_with(&artifact.polygon);
        }
        self.notify(Notification::PolygonsChanged);
        if state.label.is_some() {
            self.notify(Notification::AttributeChanged(id));
        }
    }

    // ── Node editing ───────────────────────────────────────────────────────

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Give every artifact a node editor.
    pub fn enter_edit_mode(&mut self) {
        if self.editing {
            return;
        }
        self.editing = true;
        self.editors = self
            .artifacts
            .values()
            .map(|a| (a.id, NodeEditor::new(a.id, &a.polygon)))
            .collect();
        log::debug!("edit mode on ({} editors)", self.editors.len());
    }

    /// Drop all editors, their selections and tangents.
    pub fn exit_edit_mode(&mut self) {
        if !self.editing {
            return;
        }
        self.cancel_node_drag();
        self.editing = false;
        self.editors.clear();
        log::debug!("edit mode off");
    }

    pub fn editor(&self, id: ArtifactId) -> Option<&NodeEditor> {
        self.editors.get(&id)
    }

    pub fn editors(&self) -> impl Iterator<Item = &NodeEditor> {
        self.editors.values()
    }

    pub fn selected_nodes(&self) -> Vec<(ArtifactId, usize)> {
        self.editors
            .values()
            .flat_map(|e| e.selected_indices().into_iter().map(move |i| (e.owner(), i)))
            .collect()
    }

    pub fn is_node_selected(&self, id: ArtifactId, index: usize) -> bool {
        self.editors.get(&id).is_some_and(|e| e.is_selected(index))
    }

    /// Topmost node within the hit tolerance of `point`.
    pub fn find_node_near(&self, point: Pos2, zoom: f32) -> Option<(ArtifactId, usize)> {
        let tolerance = self.config.hit_tolerance_px;
        self.editors.iter().rev().find_map(|(id, editor)| {
            let artifact = self.artifacts.get(id)?;
            editor
                .find_node_near(point, &artifact.polygon, tolerance, zoom)
                .map(|i| (*id, i))
        })
    }

    pub fn find_segment_near(&self, point: Pos2, zoom: f32) -> Option<(ArtifactId, usize)> {
        let tolerance = self.config.hit_tolerance_px;
        self.editors.iter().rev().find_map(|(id, editor)| {
            let artifact = self.artifacts.get(id)?;
            editor
                .find_segment_near(point, &artifact.polygon, tolerance, zoom)
                .map(|i| (*id, i))
        })
    }

    pub fn select_node(&mut self, id: ArtifactId, index: usize, additive: bool) -> bool {
        let mut changed = Vec::new();
        if !additive {
            for (other, editor) in self.editors.iter_mut() {
                if *other != id && editor.deselect_all() {
                    changed.push(*other);
                }
            }
        }
        if let Some(editor) = self.editors.get_mut(&id) {
            if editor.select_node(index, additive) {
                changed.push(id);
            }
        }
        for owner in &changed {
            self.notify(Notification::NodeSelectionChanged(*owner));
        }
        !changed.is_empty()
    }

    /// Rubber-band selection over every editor. `zoom` converts the handle
    /// footprint to world units.
    pub fn select_nodes_in_region(&mut self, rect: Rect, zoom: f32) -> bool {
        let handle_size = geometry::world_tolerance(self.config.handle_size_px, zoom);
        let mut changed = Vec::new();
        for (id, editor) in self.editors.iter_mut() {
            if let Some(artifact) = self.artifacts.get(id) {
                if editor.select_nodes_in_region(rect, &artifact.polygon, handle_size) {
                    changed.push(*id);
                }
            }
        }
        for owner in &changed {
            self.notify(Notification::NodeSelectionChanged(*owner));
        }
        !changed.is_empty()
    }

    pub fn deselect_all_nodes(&mut self) -> bool {
        let mut changed = Vec::new();
        for (id, editor) in self.editors.iter_mut() {
            if editor.deselect_all() {
                changed.push(*id);
            }
        }
        for owner in &changed {
            self.notify(Notification::NodeSelectionChanged(*owner));
        }
        !changed.is_empty()
    }

    pub fn begin_node_drag(&mut self, id: ArtifactId, index: usize) {
        self.cancel_node_drag();
        if let (Some(editor), Some(artifact)) = (self.editors.get_mut(&id), self.artifacts.get(&id)) {
            editor.begin_drag(index, &artifact.polygon);
            self.dragging = Some(id);
        }
    }

    pub fn is_dragging_nodes(&self) -> bool {
        self.dragging.is_some()
    }

    /// Move the dragged nodes to drag start plus `delta`.
    pub fn drag_nodes_by(&mut self, delta: Vec2) {
        let Some(id) = self.dragging else {
            return;
        };
        if let (Some(editor), Some(artifact)) = (self.editors.get_mut(&id), self.artifacts.get_mut(&id)) {
            editor.drag_by(delta, &mut artifact.polygon);
            self.notify(Notification::PolygonsChanged);
        }
    }

    /// Commit the drag as one undo step. Returns whether anything changed.
    pub fn end_node_drag(&mut self) -> bool {
        let Some(id) = self.dragging.take() else {
            return false;
        };
        let change = match (self.editors.get_mut(&id), self.artifacts.get_mut(&id)) {
            (Some(editor), Some(artifact)) => editor.end_drag(&mut artifact.polygon),
            _ => None,
        };
        self.notify(Notification::PolygonsChanged);
        match change {
            Some(change) => {
                self.record(Self::shape_command(id, change));
                true
            }
            None => false,
        }
    }

    pub fn cancel_node_drag(&mut self) {
        if let Some(id) = self.dragging.take() {
            if let (Some(editor), Some(artifact)) = (self.editors.get_mut(&id), self.artifacts.get_mut(&id)) {
                editor.cancel_drag(&mut artifact.polygon);
                self.notify(Notification::PolygonsChanged);
            }
        }
    }

    pub fn nudge_selected_nodes(&mut self, delta: Vec2) -> bool {
        self.for_each_editor(|editor, polygon| editor.nudge_selected(delta, polygon))
    }

    /// Delete the selected nodes of every artifact. Artifacts that would drop
    /// below 3 vertices are left alone.
    pub fn delete_selected_nodes(&mut self) -> bool {
        self.for_each_editor(|editor, polygon| editor.delete_selected(polygon))
    }

    pub fn insert_node(&mut self, id: ArtifactId, segment: usize) -> bool {
        let change = match (self.editors.get_mut(&id), self.artifacts.get_mut(&id)) {
            (Some(editor), Some(artifact)) => editor.insert_at_segment(segment, &mut artifact.polygon),
            _ => None,
        };
        match change {
            Some(change) => {
                self.deselect_others(id);
                self.record(Self::shape_command(id, change));
                self.notify(Notification::PolygonsChanged);
                self.notify(Notification::NodeSelectionChanged(id));
                true
            }
            None => false,
        }
    }

    fn deselect_others(&mut self, id: ArtifactId) {
        let mut changed = Vec::new();
        for (other, editor) in self.editors.iter_mut() {
            if *other != id && editor.deselect_all() {
                changed.push(*other);
            }
        }
        for owner in changed {
            self.notify(Notification::NodeSelectionChanged(owner));
        }
    }

    pub fn toggle_tangents(&mut self) -> bool {
        let mut toggled = false;
        for (id, editor) in self.editors.iter_mut() {
            if let Some(artifact) = self.artifacts.get(id) {
                toggled |= editor.toggle_tangents(&artifact.polygon);
            }
        }
        if toggled {
            self.notify(Notification::PolygonsChanged);
        }
        toggled
    }

    fn for_each_editor<F>(&mut self, mut op: F) -> bool
    where
        F: FnMut(&mut NodeEditor, &mut Vec<Pos2>) -> Option<ShapeChange>,
    {
        let mut commands = Vec::new();
        for (id, editor) in self.editors.iter_mut() {
            if let Some(artifact) = self.artifacts.get_mut(id) {
                if let Some(change) = op(editor, &mut artifact.polygon) {
                    commands.push(Self::shape_command(*id, change));
                }
            }
        }
        if commands.is_empty() {
            return false;
        }
        self.record(Self::combine(commands));
        self.notify(Notification::PolygonsChanged);
        true
    }

    fn shape_command(id: ArtifactId, change: ShapeChange) -> Command {
        Command::ModifyShape {
            id,
            before: ShapeState::polygon(change.before),
            after: ShapeState::polygon(change.after),
        }
    }

    // ── Sidecar ────────────────────────────────────────────────────────────

    /// Write all artifacts as JSON next to the image.
    pub fn save_sidecar(&self, image_path: &Path) -> Result<PathBuf, EditError> {
        let path = sidecar_path(image_path);
        let file = ArtifactFile {
            artifacts: self
                .artifacts
                .values()
                .map(|a| ArtifactRecord {
                    id: a.id.0,
                    label: a.label.clone(),
                    style: a.style,
                    polygon: a.polygon.iter().map(|p| (p.x, p.y)).collect(),
                })
                .collect(),
        };
        let data = serde_json::to_string_pretty(&file)?;
        std::fs::write(&path, data)?;
        log::info!("saved {} artifact(s) to {}", self.artifacts.len(), path.display());
        Ok(path)
    }

    /// Replace the document with the sidecar next to `image_path`. A missing
    /// sidecar leaves an empty document. History is cleared.
    pub fn load_sidecar(&mut self, image_path: &Path) -> Result<usize, EditError> {
        let path = sidecar_path(image_path);
        let records = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str::<ArtifactFile>(&data)?.artifacts
        } else {
            Vec::new()
        };

        self.exit_edit_mode();
        self.artifacts.clear();
        self.history.clear();
        self.next_id = 1;
        for record in records {
            let polygon: Vec<Pos2> = record.polygon.iter().map(|&(x, y)| Pos2::new(x, y)).collect();
            if geometry::distinct_vertex_count(&polygon) < 3 {
                log::warn!("skipping degenerate artifact #{} in {}", record.id, path.display());
                continue;
            }
            let id = ArtifactId(record.id);
            self.next_id = self.next_id.max(record.id + 1);
            self.artifacts
                .insert(id, Artifact::new(id, polygon, record.label, record.style));
        }
        self.notify(Notification::PolygonsChanged);
        log::info!("loaded {} artifact(s) from {}", self.artifacts.len(), path.display());
        Ok(self.artifacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    fn square(min: f32, max: f32) -> Vec<Pos2> {
        vec![pos2(min, min), pos2(max, min), pos2(max, max), pos2(min, max)]
    }

    fn document() -> Document {
        Document::with_seed(EditorConfig::default(), 42)
    }

    #[test]
    fn add_allocates_increasing_ids() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 10.0), "a", None).unwrap();
        let b = doc.add_artifact(&square(20.0, 30.0), "b", None).unwrap();
        assert!(b > a);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.take_notifications(), vec![Notification::PolygonsChanged]);
        assert!(doc.take_notifications().is_empty());
    }

    #[test]
    fn degenerate_outline_is_rejected() {
        let mut doc = document();
        let line = vec![pos2(0.0, 0.0), pos2(5.0, 5.0), pos2(10.0, 10.0)];
        assert!(matches!(
            doc.add_artifact(&line, "x", None),
            Err(EditError::DegenerateGeometry { .. })
        ));
        assert!(doc.is_empty());
        assert!(!doc.history().can_undo());
    }

    #[test]
    fn delete_with_unknown_id_changes_nothing() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 10.0), "a", None).unwrap();
        assert!(matches!(
            doc.delete_artifacts(&[a, ArtifactId(99)]),
            Err(EditError::UnknownArtifact(ArtifactId(99)))
        ));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn topmost_artifact_wins_hit_test() {
        let mut doc = document();
        let below = doc.add_artifact(&square(0.0, 100.0), "below", None).unwrap();
        let above = doc.add_artifact(&square(50.0, 150.0), "above", None).unwrap();
        assert_eq!(doc.artifact_at(pos2(75.0, 75.0)), Some(above));
        assert_eq!(doc.artifact_at(pos2(25.0, 25.0)), Some(below));
        assert_eq!(doc.artifact_at(pos2(500.0, 500.0)), None);
    }

    #[test]
    fn rename_notifies_and_undoes() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 10.0), "old", None).unwrap();
        doc.take_notifications();
        doc.set_label(a, "new").unwrap();
        assert_eq!(doc.take_notifications(), vec![Notification::AttributeChanged(a)]);
        assert!(doc.undo());
        assert_eq!(doc.artifact(a).unwrap().label(), "old");
    }

    #[test]
    fn edit_mode_tracks_artifacts() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 100.0), "a", None).unwrap();
        doc.enter_edit_mode();
        assert_eq!(doc.editor(a).unwrap().handles().len(), 4);

        let b = doc.add_artifact(&square(200.0, 300.0), "b", None).unwrap();
        assert!(doc.editor(b).is_some());
        doc.undo();
        assert!(doc.editor(b).is_none());

        doc.exit_edit_mode();
        assert!(doc.editor(a).is_none());
    }

    #[test]
    fn node_drag_is_one_undo_step() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 100.0), "a", None).unwrap();
        doc.enter_edit_mode();
        doc.select_node(a, 2, false);
        doc.begin_node_drag(a, 2);
        doc.drag_nodes_by(vec2(5.0, 5.0));
        doc.drag_nodes_by(vec2(20.0, 10.0));
        assert!(doc.end_node_drag());
        assert_eq!(doc.artifact(a).unwrap().polygon()[2], pos2(120.0, 110.0));

        assert!(doc.undo());
        assert_eq!(doc.artifact(a).unwrap().polygon(), square(0.0, 100.0).as_slice());
        assert!(doc.redo());
        assert_eq!(doc.artifact(a).unwrap().polygon()[2], pos2(120.0, 110.0));
    }

    #[test]
    fn node_selection_is_exclusive_across_artifacts() {
        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 100.0), "a", None).unwrap();
        let b = doc.add_artifact(&square(200.0, 300.0), "b", None).unwrap();
        doc.enter_edit_mode();
        doc.select_node(a, 0, false);
        doc.select_node(b, 1, false);
        assert_eq!(doc.selected_nodes(), vec![(b, 1)]);
        doc.select_node(a, 3, true);
        assert_eq!(doc.selected_nodes(), vec![(a, 3), (b, 1)]);
    }

    #[test]
    fn node_hit_testing_prefers_topmost() {
        let mut doc = document();
        let _a = doc.add_artifact(&square(0.0, 100.0), "a", None).unwrap();
        let b = doc.add_artifact(&square(100.0, 200.0), "b", None).unwrap();
        doc.enter_edit_mode();
        assert_eq!(doc.find_node_near(pos2(101.0, 101.0), 1.0), Some((b, 0)));
        assert_eq!(doc.find_segment_near(pos2(150.0, 203.0), 1.0), Some((b, 2)));
    }

    #[test]
    fn sidecar_path_keeps_image_extension() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/photo.png")),
            PathBuf::from("/tmp/photo.png.artifacts")
        );
    }

    #[test]
    fn sidecar_roundtrip() {
        let dir = std::env::temp_dir().join(format!("artifact-edit-doc-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let image = dir.join("scan.tif");

        let mut doc = document();
        let a = doc.add_artifact(&square(0.0, 100.0), "wall", None).unwrap();
        doc.add_artifact(&square(200.0, 260.0), "door", None).unwrap();
        let written = doc.save_sidecar(&image).unwrap();
        assert!(written.ends_with("scan.tif.artifacts"));

        let mut loaded = document();
        assert_eq!(loaded.load_sidecar(&image).unwrap(), 2);
        assert_eq!(loaded.artifact(a).unwrap().label(), "wall");
        assert_eq!(loaded.artifact(a).unwrap().style(), doc.artifact(a).unwrap().style());
        let c = loaded.add_artifact(&square(400.0, 450.0), "new", None).unwrap();
        assert!(c.0 > 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_sidecar_loads_empty() {
        let mut doc = document();
        doc.add_artifact(&square(0.0, 10.0), "a", None).unwrap();
        let path = std::env::temp_dir().join("artifact-edit-missing-image.png");
        assert_eq!(doc.load_sidecar(&path).unwrap(), 0);
        assert!(doc.is_empty());
    }
}
