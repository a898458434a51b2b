//! Interaction controller: routes pointer and keyboard input to the document
//! according to the active mode.

use std::collections::BTreeMap;

use egui::{Event, Key, Modifiers, PointerButton, Pos2, Rect, Vec2};

use crate::artifact::ArtifactId;
use crate::config::EditorConfig;
use crate::document::{Document, Notification, SelectionTarget};
use crate::error::{EditError, OracleError};
use crate::oracle::{OracleWorker, Prompt, Ticket};
use crate::stroke::StrokeCapture;
use crate::viewport::Viewport;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Mode {
    /// Select and delete whole artifacts.
    #[default]
    Normal,
    /// Click to ask the oracle for the object under the pointer.
    PointPrompt,
    /// Paint over an object to ask the oracle for it.
    BrushPrompt,
    Eraser,
    /// Draw an outline by hand.
    Freehand,
    /// Drag, insert and delete polygon nodes.
    Edit,
}

impl SelectionTarget {
    fn other(self) -> Self {
        match self {
            SelectionTarget::Scene => SelectionTarget::Table,
            SelectionTarget::Table => SelectionTarget::Scene,
        }
    }
}

/// Keeps the scene selection and the attribute-table selection in step.
///
/// Pushing an update to one side makes that side report the same selection
/// back; the expected echo is remembered and swallowed so the two sides do
/// not ping-pong.
#[derive(Clone, Debug, Default)]
pub struct SelectionSync {
    selected: Vec<ArtifactId>,
    pending_echo: Option<(SelectionTarget, Vec<ArtifactId>)>,
}

impl SelectionSync {
    pub fn selected(&self) -> &[ArtifactId] {
        &self.selected
    }

    /// `source` reports a new selection. Returns the side to update and
    /// with what, or `None` when there is nothing to propagate.
    pub fn on_changed(
        &mut self,
        source: SelectionTarget,
        mut ids: Vec<ArtifactId>,
    ) -> Option<(SelectionTarget, Vec<ArtifactId>)> {
        ids.sort_unstable();
        ids.dedup();

        if let Some((side, expected)) = &self.pending_echo {
            if *side == source && *expected == ids {
                self.pending_echo = None;
                return None;
            }
        }
        if ids == self.selected {
            return None;
        }

        self.selected = ids.clone();
        let target = source.other();
        self.pending_echo = Some((target, ids.clone()));
        Some((target, ids))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
enum DragState {
    #[default]
    None,
    Stroke,
    Node {
        owner: ArtifactId,
        index: usize,
        start: Pos2,
        moved: bool,
        /// Pressed an already-selected node: a click without motion
        /// collapses the selection to it.
        collapse: bool,
    },
    Region {
        start: Pos2,
        current: Pos2,
    },
}

#[derive(Clone, Debug)]
struct PendingRequest {
    /// Outline of the target when the request was sent.
    shape: Option<Vec<Pos2>>,
}

pub struct Session {
    document: Document,
    mode: Mode,
    capture: StrokeCapture,
    brush_size: f32,
    zoom: f32,
    drag: DragState,
    selection: SelectionSync,
    oracle: Option<OracleWorker>,
    pending: BTreeMap<Ticket, PendingRequest>,
}

impl Session {
    pub fn new(document: Document) -> Self {
        let config = document.config();
        Self {
            capture: StrokeCapture::new(config.stroke_min_spacing),
            brush_size: config.default_brush_size,
            document,
            mode: Mode::Normal,
            zoom: 1.0,
            drag: DragState::None,
            selection: SelectionSync::default(),
            oracle: None,
            pending: BTreeMap::new(),
        }
    }

    pub fn with_config(config: EditorConfig) -> Self {
        Self::new(Document::new(config))
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.document.take_notifications()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn brush_size(&self) -> f32 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: f32) {
        self.brush_size = size.max(0.0);
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn attach_oracle(&mut self, worker: OracleWorker) {
        self.oracle = Some(worker);
    }

    pub fn oracle_busy(&self) -> bool {
        self.oracle.as_ref().is_some_and(|w| w.is_busy())
    }

    /// Samples of the stroke being drawn, for preview.
    pub fn stroke_preview(&self) -> &[Pos2] {
        self.capture.points()
    }

    /// Rubber band being dragged in edit mode.
    pub fn region_preview(&self) -> Option<Rect> {
        match self.drag {
            DragState::Region { start, current } => Some(Rect::from_two_pos(start, current)),
            _ => None,
        }
    }

    pub fn selected(&self) -> &[ArtifactId] {
        self.selection.selected()
    }

    // ── Modes ──────────────────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        self.cancel_gesture();
        if self.mode == Mode::Edit {
            self.document.exit_edit_mode();
        }
        if mode == Mode::Edit {
            self.document.enter_edit_mode();
        }
        log::info!("mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    /// Drop any half-finished stroke or drag.
    pub fn cancel_gesture(&mut self) {
        self.capture.cancel();
        if matches!(self.drag, DragState::Node { .. }) {
            self.document.cancel_node_drag();
        }
        self.drag = DragState::None;
    }

    // ── Selection ──────────────────────────────────────────────────────────

    fn scene_selection_changed(&mut self, ids: Vec<ArtifactId>) {
        self.publish_selection(SelectionTarget::Scene, ids);
    }

    /// The attribute table reports its selection.
    pub fn table_selection_changed(&mut self, ids: Vec<ArtifactId>) {
        let ids = ids
            .into_iter()
            .filter(|id| self.document.artifact(*id).is_some())
            .collect();
        self.publish_selection(SelectionTarget::Table, ids);
    }

    fn publish_selection(&mut self, source: SelectionTarget, ids: Vec<ArtifactId>) {
        if let Some((target, ids)) = self.selection.on_changed(source, ids) {
            self.document
                .notify(Notification::SelectionChanged { target, ids });
        }
    }

    /// Forget selected artifacts that no longer exist.
    fn prune_selection(&mut self) {
        let selected = self.selection.selected();
        let alive: Vec<ArtifactId> = selected
            .iter()
            .copied()
            .filter(|id| self.document.artifact(*id).is_some())
            .collect();
        if alive.len() != selected.len() {
            self.scene_selection_changed(alive);
        }
    }

    // ── Pointer input (image space) ────────────────────────────────────────

    pub fn pointer_down(&mut self, pos: Pos2, button: PointerButton, modifiers: Modifiers) -> Result<(), EditError> {
        if button != PointerButton::Primary {
            return Ok(());
        }
        let ctrl = modifiers.ctrl || modifiers.command;
        match self.mode {
            Mode::Normal => {
                let additive = ctrl || modifiers.shift;
                let mut ids = if additive {
                    self.selection.selected().to_vec()
                } else {
                    Vec::new()
                };
                if let Some(id) = self.document.artifact_at(pos) {
                    ids.push(id);
                }
                self.scene_selection_changed(ids);
            }
            Mode::PointPrompt => {
                self.send_prompt(Prompt::Point(pos), None)?;
            }
            Mode::BrushPrompt | Mode::Eraser | Mode::Freehand => {
                self.capture.begin(pos);
                self.drag = DragState::Stroke;
            }
            Mode::Edit => self.edit_pointer_down(pos, ctrl, modifiers.shift),
        }
        Ok(())
    }

    fn edit_pointer_down(&mut self, pos: Pos2, ctrl: bool, shift: bool) {
        let node = self.document.find_node_near(pos, self.zoom);

        if shift && node.is_none() {
            if let Some((id, segment)) = self.document.find_segment_near(pos, self.zoom) {
                self.document.insert_node(id, segment);
                return;
            }
        }

        match node {
            Some((owner, index)) => {
                let already = self.document.is_node_selected(owner, index);
                if ctrl {
                    self.document.select_node(owner, index, true);
                } else if !already {
                    self.document.select_node(owner, index, false);
                }
                self.document.begin_node_drag(owner, index);
                self.drag = DragState::Node {
                    owner,
                    index,
                    start: pos,
                    moved: false,
                    collapse: already && !ctrl,
                };
            }
            None => {
                if !ctrl {
                    self.document.deselect_all_nodes();
                }
                self.drag = DragState::Region {
                    start: pos,
                    current: pos,
                };
            }
        }
    }

    pub fn pointer_move(&mut self, pos: Pos2) {
        match &mut self.drag {
            DragState::None => {}
            DragState::Stroke => self.capture.extend(pos),
            DragState::Node { start, moved, .. } => {
                let delta = pos - *start;
                if delta != Vec2::ZERO {
                    *moved = true;
                }
                self.document.drag_nodes_by(delta);
            }
            DragState::Region { current, .. } => *current = pos,
        }
    }

    pub fn pointer_up(&mut self, pos: Pos2, button: PointerButton) -> Result<(), EditError> {
        if button != PointerButton::Primary {
            return Ok(());
        }
        match std::mem::take(&mut self.drag) {
            DragState::None => Ok(()),
            DragState::Stroke => {
                self.capture.extend(pos);
                self.finish_stroke()
            }
            DragState::Node {
                owner,
                index,
                moved,
                collapse,
                ..
            } => {
                if moved {
                    self.document.end_node_drag();
                } else {
                    self.document.cancel_node_drag();
                    if collapse {
                        self.document.select_node(owner, index, false);
                    }
                }
                Ok(())
            }
            DragState::Region { start, .. } => {
                let rect = Rect::from_two_pos(start, pos);
                self.document.select_nodes_in_region(rect, self.zoom);
                Ok(())
            }
        }
    }

    fn finish_stroke(&mut self) -> Result<(), EditError> {
        let stroke = self.capture.end(self.brush_size);
        match self.mode {
            Mode::BrushPrompt => {
                if let Some(stroke) = stroke {
                    self.send_prompt(Prompt::Painting(stroke.points), None)?;
                }
            }
            Mode::Eraser => {
                if let Some(stroke) = stroke {
                    let report = self.document.erase(&stroke)?;
                    self.prune_selection();
                    if self.document.config().reprompt_after_erase && self.oracle.is_some() {
                        for (id, prompt) in self.document.reprompt_prompts(&report) {
                            self.send_prompt(prompt, Some(id))?;
                        }
                    }
                }
            }
            Mode::Freehand => {
                let stroke = stroke.ok_or_else(|| {
                    EditError::InvalidStroke("free-hand outline needs at least 3 points".into())
                })?;
                self.document.add_freehand(&stroke)?;
            }
            Mode::Normal | Mode::PointPrompt | Mode::Edit => {}
        }
        Ok(())
    }

    // ── Keyboard ───────────────────────────────────────────────────────────

    /// Returns whether the key did something.
    pub fn key_down(&mut self, key: Key, modifiers: Modifiers) -> Result<bool, EditError> {
        let ctrl = modifiers.ctrl || modifiers.command;

        if ctrl && (key == Key::Z || key == Key::Y) {
            self.cancel_gesture();
            let done = if key == Key::Y || modifiers.shift {
                self.document.redo()
            } else {
                self.document.undo()
            };
            self.prune_selection();
            return Ok(done);
        }
        if key == Key::Escape {
            let busy = self.capture.is_capturing() || self.drag != DragState::None;
            self.cancel_gesture();
            return Ok(busy);
        }

        match self.mode {
            Mode::Normal if matches!(key, Key::Delete | Key::Backspace) => {
                let ids = self.selection.selected().to_vec();
                if ids.is_empty() {
                    return Ok(false);
                }
                self.document.delete_artifacts(&ids)?;
                self.scene_selection_changed(Vec::new());
                Ok(true)
            }
            Mode::Edit => {
                let step = self.document.config().nudge_step * if modifiers.shift { 10.0 } else { 1.0 };
                let handled = match key {
                    Key::Delete | Key::Backspace => self.document.delete_selected_nodes(),
                    Key::ArrowLeft => self.document.nudge_selected_nodes(Vec2::new(-step, 0.0)),
                    Key::ArrowRight => self.document.nudge_selected_nodes(Vec2::new(step, 0.0)),
                    Key::ArrowUp => self.document.nudge_selected_nodes(Vec2::new(0.0, -step)),
                    Key::ArrowDown => self.document.nudge_selected_nodes(Vec2::new(0.0, step)),
                    Key::T => self.document.toggle_tangents(),
                    _ => false,
                };
                Ok(handled)
            }
            _ => Ok(false),
        }
    }

    // ── Raw egui events ────────────────────────────────────────────────────

    /// Feed one egui input event. Pointer positions are converted from
    /// screen to image space through `viewport`.
    pub fn handle_event(&mut self, event: &Event, viewport: &Viewport) -> Result<bool, EditError> {
        self.set_zoom(viewport.zoom);
        match event {
            Event::PointerButton {
                pos,
                button,
                pressed,
                modifiers,
            } => {
                let image_pos = viewport.screen_to_image(*pos);
                if *pressed {
                    self.pointer_down(image_pos, *button, *modifiers)?;
                } else {
                    self.pointer_up(image_pos, *button)?;
                }
                Ok(true)
            }
            Event::PointerMoved(pos) => {
                self.pointer_move(viewport.screen_to_image(*pos));
                Ok(self.drag != DragState::None)
            }
            Event::PointerGone => {
                self.cancel_gesture();
                Ok(false)
            }
            Event::Key {
                key,
                pressed: true,
                modifiers,
                ..
            } => self.key_down(*key, *modifiers),
            _ => Ok(false),
        }
    }

    // ── Oracle ─────────────────────────────────────────────────────────────

    /// Queue a prompt. `target` is the artifact the mask should reshape;
    /// `None` creates a new artifact when the mask arrives.
    pub fn send_prompt(&mut self, prompt: Prompt, target: Option<ArtifactId>) -> Result<Ticket, EditError> {
        let worker = self.oracle.as_mut().ok_or(OracleError::WorkerGone)?;
        let shape = target.and_then(|id| self.document.artifact(id).map(|a| a.polygon().to_vec()));
        let ticket = worker.submit(prompt, target)?;
        log::debug!("prompt {ticket:?} sent (target {target:?})");
        self.pending.insert(ticket, PendingRequest { shape });
        self.document.notify(Notification::OracleBusy(true));
        Ok(ticket)
    }

    /// Apply every finished oracle reply. Replies whose target vanished or
    /// changed since the request are dropped.
    pub fn poll_oracle(&mut self) -> Vec<Result<ArtifactId, EditError>> {
        let Some(worker) = self.oracle.as_mut() else {
            return Vec::new();
        };
        let mut replies = Vec::new();
        while let Some(reply) = worker.try_recv() {
            replies.push(reply);
        }
        if replies.is_empty() {
            return Vec::new();
        }
        let still_busy = worker.is_busy();

        let mut results = Vec::new();
        for reply in replies {
            let pending = self.pending.remove(&reply.ticket);
            let mask = match reply.result {
                Ok(mask) => mask,
                Err(err) => {
                    log::warn!("oracle failed: {err}");
                    self.document.notify(Notification::OracleFailed(err.to_string()));
                    results.push(Err(err.into()));
                    continue;
                }
            };

            if let Some(id) = reply.target {
                let current = self.document.artifact(id).map(|a| a.polygon());
                let expected = pending.as_ref().and_then(|p| p.shape.as_deref());
                if current.is_none() || current != expected {
                    log::debug!("dropping stale oracle reply for {id}");
                    continue;
                }
            }

            match self.document.apply_mask(reply.target, &mask) {
                Ok(id) => results.push(Ok(id)),
                Err(err) => {
                    self.document.notify(Notification::OracleFailed(err.to_string()));
                    results.push(Err(err));
                }
            }
        }

        if !still_busy {
            self.document.notify(Notification::OracleBusy(false));
        }
        results
    }
}
