mod aggregate;
mod chunking;
mod service;
mod types;

pub use aggregate::{FRAGMENT_SEPARATOR, SummarySection, aggregate, aggregate_sections, range_label};
pub use chunking::{ChunkBudget, chunk_units};
pub use service::{PipelineApi, PipelineSettings, SummaryPipeline, Upload};
pub use types::{ChunkingError, PipelineError, SummaryFragment, TextChunk};
