//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as each stage walks its pages or tables. The CLI forwards them to an
//! `indicatif` progress bar; library users can forward them anywhere.
//!
//! # Example
//!
//! ```rust
//! use edgequake_table2md::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counting(AtomicUsize);
//!
//! impl PipelineProgressCallback for Counting {
//!     fn on_item_complete(&self, _stage: Stage, name: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("done: {name}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counting(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Parse,
    Render,
    Crop,
    Ocr,
    Markdown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Render => "render",
            Stage::Crop => "crop",
            Stage::Ocr => "ocr",
            Stage::Markdown => "markdown",
        };
        f.write_str(s)
    }
}

/// Called by the stages as they process pages and tables.
///
/// All methods default to no-ops. The OCR stage runs requests concurrently,
/// so `on_item_complete` / `on_item_error` may be called from several tasks;
/// implementations synchronise their own state.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before a stage processes its first item.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// Called when one page or table finished successfully.
    fn on_item_complete(&self, stage: Stage, name: &str) {
        let _ = (stage, name);
    }

    /// Called when one page or table failed without aborting the stage.
    fn on_item_error(&self, stage: Stage, name: &str, error: &str) {
        let _ = (stage, name, error);
    }

    /// Called once after every item of a stage was attempted.
    fn on_stage_complete(&self, stage: Stage, succeeded: usize, total: usize) {
        let _ = (stage, succeeded, total);
    }
}

/// No-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// Small helper so stages don't repeat `if let Some(cb)` everywhere.
pub(crate) struct Reporter<'a> {
    cb: Option<&'a ProgressCallback>,
    stage: Stage,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(cb: Option<&'a ProgressCallback>, stage: Stage) -> Self {
        Self { cb, stage }
    }

    pub(crate) fn start(&self, total: usize) {
        if let Some(cb) = self.cb {
            cb.on_stage_start(self.stage, total);
        }
    }

    pub(crate) fn complete(&self, name: &str) {
        if let Some(cb) = self.cb {
            cb.on_item_complete(self.stage, name);
        }
    }

    pub(crate) fn error(&self, name: &str, error: &str) {
        if let Some(cb) = self.cb {
            cb.on_item_error(self.stage, name, error);
        }
    }

    pub(crate) fn finish(&self, succeeded: usize, total: usize) {
        if let Some(cb) = self.cb {
            cb.on_stage_complete(self.stage, succeeded, total);
        }
    }
}
