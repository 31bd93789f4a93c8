//! Streaming API: observe a run as a `Stream` of events.
//!
//! The eager [`crate::detile::detile`] only returns once the composite is
//! written. [`detile_stream`] yields every [`crate::progress::PipelineEvent`] as the worker
//! emits it, which is what a progress display or an out-of-process front end
//! wants. Events arrive in emission order; the last item is always
//! `Completed` or `Failed`.

use crate::config::DetileConfig;
use crate::detile::{EventStream, Pipeline};
use tracing::info;

/// Start a detile run with the pdfium backend and stream its events.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use pdf_detile::{detile_stream, DetileConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DetileConfig::builder("poster.pdf", 3).build()?;
/// let mut events = detile_stream(config);
/// while let Some(event) = events.next().await {
///     println!("{}", serde_json::to_string(&event.to_wire())?);
/// }
/// # Ok(())
/// # }
/// ```
pub fn detile_stream(config: DetileConfig) -> EventStream {
    info!(
        "Starting streaming detile: {}",
        config.input_path.display()
    );
    Pipeline::new(config).start().into_stream()
}
