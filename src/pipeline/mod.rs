pub mod extract;
pub mod model;
pub mod orchestrator;

pub use extract::ErrorExtractionPipeline;
pub use model::{DataEntry, ErrorDocumentation, ErrorRecord, ErrorSummary, summarize};
pub use orchestrator::{PROCESSING_SENTINEL, ReportOrchestrator, ReportRequest};
