//! Media pipeline contract
//!
//! A pipeline is created per track and owned by the engine worker for the
//! duration of one iteration. State changes and stream events arrive
//! asynchronously on the pipeline's bus.

mod headless;
mod manual;

pub use headless::{HeadlessFactory, HeadlessPipeline};
pub use manual::{ManualControl, ManualFactory, ManualHandle, ManualPipeline};

use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
pub use tonearm_common::events::PipelineState;

/// Timestamped message posted on a pipeline's bus
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub timestamp: DateTime<Utc>,
    pub kind: BusMessageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusMessageKind {
    StateChanged {
        old: PipelineState,
        new: PipelineState,
    },
    Error(String),
    Warning(String),
    Info(String),
    /// End of stream
    Eos,
    /// Cached duration is stale and must be re-queried
    DurationChanged,
}

impl BusMessage {
    pub fn now(kind: BusMessageKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Playable handle for one URI
pub trait MediaPipeline: Send {
    /// Request a state transition; completion is reported on the bus
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    fn seek(&mut self, position_ms: u64) -> Result<()>;

    /// Inject an end-of-stream into the pipeline
    fn send_eos(&mut self) -> Result<()>;

    fn position_ms(&self) -> Option<u64>;

    fn duration_ms(&self) -> Option<u64>;

    /// `None` when the stream does not answer seek queries
    fn query_seekable(&self) -> Option<bool>;

    /// Hand the bus receiver to the caller; `None` once taken
    fn take_bus(&mut self) -> Option<mpsc::UnboundedReceiver<BusMessage>>;
}

pub trait PipelineFactory: Send + Sync {
    fn create(&self, uri: &str) -> Result<Box<dyn MediaPipeline>>;
}

/// Turn a stored location into a pipeline URI
pub fn uri_for(location: &str) -> String {
    if location.contains("://") {
        location.to_string()
    } else {
        format!("file://{}", location)
    }
}

/// Local path for a `file://` URI or a bare path
pub fn local_path(uri: &str) -> Option<&str> {
    match uri.split_once("://") {
        Some(("file", path)) => Some(path),
        Some(_) => None,
        None => Some(uri),
    }
}
