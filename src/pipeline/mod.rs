// Harvesting pipeline: fetch under backpressure, extract, merge, summarize

pub mod aggregate;
pub mod clock;
pub mod cooldown;
pub mod extract;
pub mod fetcher;
pub mod merge_store;
pub mod scheduler;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownGovernor;
pub use fetcher::{RetryPolicy, RetryingFetcher};
pub use merge_store::{persist, DetailedFile, MergeStats, MergedDataset};
pub use scheduler::{run_all, run_passes, JobOutcome, PassReport};
