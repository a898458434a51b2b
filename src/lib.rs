//! Polygon editing and erasing core for image annotation.
//!
//! Artifacts are labeled polygons drawn over a raster image. They come from a
//! segmentation oracle (prompted with clicks, painted strokes or point sets),
//! from free-hand outlines, or from splitting another artifact with the
//! eraser. Once created they can be reshaped node by node.
//!
//! A host egui application owns a [`Session`], forwards input events to it
//! (see [`Session::handle_event`]) and redraws whenever
//! [`Session::take_notifications`] says so. Rendering is left to the host.
//!
//! ```no_run
//! use artifact_edit::{EditorConfig, Mode, Session, Stroke};
//! use egui::pos2;
//!
//! let mut session = Session::with_config(EditorConfig::default());
//! let square = [pos2(100.0, 100.0), pos2(300.0, 100.0), pos2(300.0, 300.0), pos2(100.0, 300.0)];
//! session.document_mut().add_artifact(&square, "wall", None)?;
//! session.set_mode(Mode::Eraser);
//! let stroke = Stroke::new(vec![pos2(200.0, 50.0), pos2(200.0, 350.0)], 10.0);
//! let report = session.document_mut().erase(&stroke)?;
//! assert_eq!(report.created.len(), 2);
//! # Ok::<(), artifact_edit::EditError>(())
//! ```

pub mod artifact;
pub mod config;
pub mod document;
pub mod eraser;
pub mod error;
pub mod geometry;
pub mod history;
pub mod mask;
pub mod node_editor;
pub mod oracle;
pub mod session;
pub mod stroke;
pub mod viewport;

pub use artifact::{Artifact, ArtifactId, Color4, Style};
pub use config::EditorConfig;
pub use document::{Document, EraseReport, Notification, SelectionTarget};
pub use eraser::EraseOutcome;
pub use error::{EditError, OracleError};
pub use history::{Command, Direction, History, ShapeState, UndoEntry};
pub use node_editor::{NodeEditor, NodeHandle, ShapeChange, TangentSide};
pub use oracle::{OracleWorker, Prompt, SegmentationOracle, Ticket};
pub use session::{Mode, Session, SelectionSync};
pub use stroke::{Stroke, StrokeCapture};
pub use viewport::Viewport;
