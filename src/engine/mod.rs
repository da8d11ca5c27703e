pub mod fetcher;
mod manager;
mod matcher;
pub mod parser;
pub mod pattern;
pub mod state;
pub mod store;
mod traits;

pub use fetcher::{FilterList, ListFetcher};
pub use manager::FilterListManager;
pub use matcher::PatternMatcher;
pub use pattern::{BlockPattern, CandidateUrl};
pub use state::BlockingToggle;
pub use store::{ActiveFilterSet, PatternStore};
pub use traits::{FilterManager, ListSource, UrlMatcher};
