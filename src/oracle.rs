//! Boundary to the external segmentation model.
//!
//! The model itself is a black box behind [`SegmentationOracle`]. Requests
//! can run on a background thread through [`OracleWorker`]; only the prompt
//! goes in and only the mask (or an error) comes back.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use egui::{pos2, Pos2, Rect, Vec2};
use image::GrayImage;
use rand::Rng;

use crate::artifact::ArtifactId;
use crate::config::EditorConfig;
use crate::error::OracleError;
use crate::geometry;

#[derive(Clone, Debug, PartialEq)]
pub enum Prompt {
    /// A single foreground click.
    Point(Pos2),
    /// Foreground samples painted with the brush.
    Painting(Vec<Pos2>),
    Points {
        foreground: Vec<Pos2>,
        background: Vec<Pos2>,
        bounding_box: Option<Rect>,
    },
}

impl Prompt {
    pub fn bounding_box(&self) -> Option<Rect> {
        match self {
            Prompt::Point(_) => None,
            Prompt::Painting(points) if points.is_empty() => None,
            Prompt::Painting(points) => Some(geometry::bounding_rect(points)),
            Prompt::Points { bounding_box, .. } => *bounding_box,
        }
    }
}

/// Prompt in, binary mask out. Non-zero mask pixels are foreground.
pub trait SegmentationOracle: Send {
    fn predict(&mut self, prompt: &Prompt) -> Result<GrayImage, OracleError>;
}

impl<F> SegmentationOracle for F
where
    F: FnMut(&Prompt) -> Result<GrayImage, OracleError> + Send,
{
    fn predict(&mut self, prompt: &Prompt) -> Result<GrayImage, OracleError> {
        self(prompt)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

#[derive(Clone, Debug)]
pub struct OracleRequest {
    pub ticket: Ticket,
    pub prompt: Prompt,
    /// Artifact the result should replace; `None` creates a new one.
    pub target: Option<ArtifactId>,
}

#[derive(Debug)]
pub struct OracleReply {
    pub ticket: Ticket,
    pub target: Option<ArtifactId>,
    pub result: Result<GrayImage, OracleError>,
}

/// Runs an oracle on its own thread.
pub struct OracleWorker {
    requests: Option<Sender<OracleRequest>>,
    replies: Receiver<OracleReply>,
    handle: Option<JoinHandle<()>>,
    next_ticket: u64,
    in_flight: usize,
}

impl OracleWorker {
    pub fn spawn<O: SegmentationOracle + 'static>(mut oracle: O) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<OracleRequest>();
        let (reply_tx, reply_rx) = mpsc::channel::<OracleReply>();

        let handle = std::thread::spawn(move || {
            while let Ok(request) = request_rx.recv() {
                log::debug!("oracle worker: running {:?}", request.ticket);
                let result = oracle.predict(&request.prompt);
                let reply = OracleReply {
                    ticket: request.ticket,
                    target: request.target,
                    result,
                };
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            log::debug!("oracle worker: shutting down");
        });

        Self {
            requests: Some(request_tx),
            replies: reply_rx,
            handle: Some(handle),
            next_ticket: 0,
            in_flight: 0,
        }
    }

    pub fn submit(&mut self, prompt: Prompt, target: Option<ArtifactId>) -> Result<Ticket, OracleError> {
        let ticket = Ticket(self.next_ticket);
        let sender = self.requests.as_ref().ok_or(OracleError::WorkerGone)?;
        sender
            .send(OracleRequest {
                ticket,
                prompt,
                target,
            })
            .map_err(|_| OracleError::WorkerGone)?;
        self.next_ticket += 1;
        self.in_flight += 1;
        Ok(ticket)
    }

    /// Next finished reply, if any, without blocking.
    pub fn try_recv(&mut self) -> Option<OracleReply> {
        match self.replies.try_recv() {
            Ok(reply) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(reply)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.orphaned_reply(),
        }
    }

    /// Block for at most `timeout` waiting for a reply.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<OracleReply> {
        match self.replies.recv_timeout(timeout) {
            Ok(reply) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(reply)
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => self.orphaned_reply(),
        }
    }

    /// The worker died with requests outstanding: fail one of them.
    fn orphaned_reply(&mut self) -> Option<OracleReply> {
        if self.in_flight == 0 {
            return None;
        }
        self.in_flight -= 1;
        log::warn!("oracle worker exited with {} request(s) pending", self.in_flight + 1);
        Some(OracleReply {
            ticket: Ticket(u64::MAX),
            target: None,
            result: Err(OracleError::WorkerGone),
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }
}

impl Drop for OracleWorker {
    fn drop(&mut self) {
        self.requests = None;
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("oracle worker panicked");
            }
        }
    }
}

/// Build a points prompt asking the oracle to re-segment `piece`, the part
/// of `original` left after erasing.
///
/// Foreground samples lie in `piece`, background samples in `original` but
/// outside `piece`. A regular grid over the padded bounding box of `piece`
/// seeds both sets; random samples top them up to
/// `prompt_points_per_class`, giving up after a bounded number of tries.
pub fn sample_prompt<R: Rng>(
    piece: &[Pos2],
    original: &[Pos2],
    config: &EditorConfig,
    rng: &mut R,
) -> Prompt {
    let bounds = geometry::bounding_rect(piece).expand(config.prompt_box_padding);
    let is_foreground = |p: Pos2| geometry::point_in_polygon(piece, p);
    let is_background = |p: Pos2| geometry::point_in_polygon(original, p) && !is_foreground(p);

    let mut foreground = Vec::new();
    let mut background = Vec::new();

    let grid = config.prompt_grid.max(1);
    let cell = bounds.size() / grid as f32;
    for i in 0..grid {
        for j in 0..grid {
            let p = bounds.min + Vec2::new((i as f32 + 0.5) * cell.x, (j as f32 + 0.5) * cell.y);
            if is_foreground(p) {
                foreground.push(p);
            } else if is_background(p) {
                background.push(p);
            }
        }
    }

    let target = config.prompt_points_per_class;
    let max_attempts = target * 50;
    let random_point = |rng: &mut R| {
        pos2(
            rng.random_range(bounds.min.x..=bounds.max.x),
            rng.random_range(bounds.min.y..=bounds.max.y),
        )
    };
    for _ in 0..max_attempts {
        if foreground.len() >= target {
            break;
        }
        let p = random_point(rng);
        if is_foreground(p) {
            foreground.push(p);
        }
    }
    for _ in 0..max_attempts {
        if background.len() >= target {
            break;
        }
        let p = random_point(rng);
        if is_background(p) {
            background.push(p);
        }
    }

    log::debug!(
        "re-prompt sampled {} foreground / {} background points",
        foreground.len(),
        background.len()
    );
    Prompt::Points {
        foreground,
        background,
        bounding_box: Some(bounds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rect_poly(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Pos2> {
        vec![pos2(x0, y0), pos2(x1, y0), pos2(x1, y1), pos2(x0, y1)]
    }

    #[test]
    fn painting_prompt_has_a_bounding_box() {
        let prompt = Prompt::Painting(vec![pos2(10.0, 20.0), pos2(30.0, 5.0)]);
        assert_eq!(
            prompt.bounding_box(),
            Some(Rect::from_min_max(pos2(10.0, 5.0), pos2(30.0, 20.0)))
        );
        assert_eq!(Prompt::Point(pos2(1.0, 1.0)).bounding_box(), None);
    }

    #[test]
    fn sampled_points_respect_their_class() {
        let original = rect_poly(0.0, 0.0, 200.0, 100.0);
        let piece = rect_poly(0.0, 0.0, 120.0, 100.0);
        let config = EditorConfig::default();
        let mut rng = StdRng::seed_from_u64(3);

        match sample_prompt(&piece, &original, &config, &mut rng) {
            Prompt::Points {
                foreground,
                background,
                bounding_box,
            } => {
                assert_eq!(foreground.len(), 32);
                assert_eq!(background.len(), 32);
                assert!(foreground.iter().all(|p| geometry::point_in_polygon(&piece, *p)));
                assert!(background
                    .iter()
                    .all(|p| geometry::point_in_polygon(&original, *p)
                        && !geometry::point_in_polygon(&piece, *p)));
                assert_eq!(
                    bounding_box,
                    Some(Rect::from_min_max(pos2(-10.0, -10.0), pos2(130.0, 110.0)))
                );
            }
            other => panic!("expected points prompt, got {other:?}"),
        }
    }

    #[test]
    fn sampling_gives_up_when_no_background_exists() {
        let piece = rect_poly(0.0, 0.0, 100.0, 100.0);
        let config = EditorConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        match sample_prompt(&piece, &piece, &config, &mut rng) {
            Prompt::Points { background, .. } => assert!(background.is_empty()),
            other => panic!("expected points prompt, got {other:?}"),
        }
    }

    #[test]
    fn worker_runs_requests_in_the_background() {
        let mut worker = OracleWorker::spawn(|prompt: &Prompt| match prompt {
            Prompt::Point(_) => Ok(GrayImage::new(4, 4)),
            _ => Err(OracleError::Prediction("unsupported".into())),
        });

        let first = worker.submit(Prompt::Point(pos2(1.0, 1.0)), None).unwrap();
        let second = worker
            .submit(Prompt::Painting(vec![pos2(0.0, 0.0)]), Some(ArtifactId(4)))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(worker.in_flight(), 2);

        let reply = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.ticket, first);
        assert!(reply.result.is_ok());

        let reply = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.target, Some(ArtifactId(4)));
        assert!(matches!(reply.result, Err(OracleError::Prediction(_))));
        assert!(!worker.is_busy());
        assert!(worker.try_recv().is_none());
    }
}
