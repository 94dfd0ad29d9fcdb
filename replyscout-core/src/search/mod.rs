pub mod error;
pub mod filter;
pub mod orchestrator;

pub use error::{SearchError, SearchResult};
pub use filter::{apply_threshold_filter, split_keywords};
pub use orchestrator::{
    PostView, SearchOrchestrator, SearchOutcome, SearchRequest, SearchResponse, SearchSettings,
};
