//! Application services above the repository and queue layers.

mod ingest;
mod trigger;

pub use ingest::{FeedItem, IngestError, IngestReport, IngestService};
pub use trigger::AnalysisTrigger;
