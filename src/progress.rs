//! Progress protocol between the background worker and its observer.
//!
//! A run reports through a single bounded [`tokio::sync::mpsc`] channel of
//! [`PipelineEvent`]s: zero or more [`ProgressEvent`]s followed by exactly
//! one terminal event. Nothing else is shared between the worker and the
//! observer, so the observer never needs a lock.
//!
//! # Ordering guarantees
//!
//! * Steps advance `1 → 2 → 3` and never go back.
//! * Within a step, `completed` runs `1, 2, …, total` with no gaps or repeats.
//! * The channel is FIFO with one producer and one consumer, so the observer
//!   sees exactly the emitted sequence.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdf_detile::{DetileConfig, Pipeline, PipelineEvent};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DetileConfig::builder("poster.pdf", 3).build()?;
//! let mut handle = Pipeline::new(config).start();
//! while let Some(event) = handle.next_event().await {
//!     match event {
//!         PipelineEvent::Progress(p) => eprintln!("{} {}/{}", p.step, p.completed, p.total),
//!         PipelineEvent::Completed(out) => println!("{}", out.output_path.display()),
//!         PipelineEvent::Failed(e) => eprintln!("error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{DetileError, ErrorKind};
use crate::output::DetileOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    /// Read every page's descriptor from the source.
    Extract = 1,
    /// Rasterise every page into the staging area.
    Rasterize = 2,
    /// Draw every staged raster onto the composite page.
    Composite = 3,
}

impl Step {
    /// Wire number of the step (`1`, `2` or `3`).
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Short label used by progress displays.
    pub fn label(self) -> &'static str {
        match self {
            Step::Extract => "Processing Pages",
            Step::Rasterize => "Rendering Pages",
            Step::Composite => "Combining Pages",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step ({}/3)", self.number())
    }
}

/// One unit of progress: `completed` of `total` pages done in `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub step: Step,
    /// 1-based count of pages finished in this step.
    pub completed: usize,
    pub total: usize,
}

/// Everything the worker sends to its observer.
#[derive(Debug)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    /// Terminal: the output was written.
    Completed(DetileOutput),
    /// Terminal: the run aborted; staging has already been purged.
    Failed(DetileError),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }

    /// Serialisable form of this event for a front end in another process.
    pub fn to_wire(&self) -> WireMessage {
        match self {
            PipelineEvent::Progress(p) => WireMessage::Progress {
                step: p.step.number(),
                progress: p.completed,
                progress_max: p.total,
            },
            PipelineEvent::Completed(out) => WireMessage::Complete {
                output_path: out.output_path.clone(),
            },
            PipelineEvent::Failed(e) => WireMessage::Error {
                error: e.to_string(),
                kind: e.kind(),
            },
        }
    }
}

/// JSON shape of a [`PipelineEvent`]:
///
/// ```text
/// {"step":2,"progress":3,"progressMax":6}
/// {"outputPath":"/plans/house_detiled.pdf"}
/// {"error":"Rasterisation failed for page 4: …","kind":"rasterization"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum WireMessage {
    Progress {
        step: u8,
        progress: usize,
        progress_max: usize,
    },
    Complete {
        output_path: PathBuf,
    },
    Error {
        error: String,
        kind: ErrorKind,
    },
}

// ── Producer side ────────────────────────────────────────────────────────

/// Worker-side handle on the progress channel.
///
/// Keeps the last emitted `(step, completed)` so an out-of-order emission is
/// caught in debug builds. A closed channel (observer dropped) is not an
/// error: the run continues to completion and cleans up after itself.
pub(crate) struct ProgressReporter {
    tx: mpsc::Sender<PipelineEvent>,
    last: Option<(Step, usize)>,
}

impl ProgressReporter {
    pub(crate) fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx, last: None }
    }

    /// Report that page `completed` (1-based) of `total` finished `step`.
    pub(crate) fn advance(&mut self, step: Step, completed: usize, total: usize) {
        debug_assert!(
            match self.last {
                None => completed == 1,
                Some((s, c)) if s == step => completed == c + 1,
                Some((s, c)) => step > s && completed == 1 && c >= 1,
            },
            "progress out of order: {:?} then ({step:?}, {completed})",
            self.last
        );
        debug_assert!(completed <= total);
        self.last = Some((step, completed));
        self.send(PipelineEvent::Progress(ProgressEvent {
            step,
            completed,
            total,
        }));
    }

    /// Send the terminal event and close the channel.
    pub(crate) fn finish(self, result: Result<DetileOutput, DetileError>) {
        let event = match result {
            Ok(output) => PipelineEvent::Completed(output),
            Err(e) => PipelineEvent::Failed(e),
        };
        self.send(event);
    }

    fn send(&self, event: PipelineEvent) {
        // `blocking_send` applies back-pressure: a slow observer slows the
        // worker instead of losing events.
        if self.tx.blocking_send(event).is_err() {
            debug!("Progress observer dropped; continuing without reporting");
        }
    }
}
