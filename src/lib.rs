//! A pipelined merge-sort network for byte values.
//!
//! Stages form a chain, each running on its own thread and talking only to its
//! neighbours. Stage 0 feeds the input one element at a time, alternating
//! between two tags; stage `k` merges sorted runs of `2^(k-1)` elements from
//! each tag into runs of `2^k`; the last stage emits a single sorted run.
//!
//! ```
//! use pipeline_merge_sort::Pipeline;
//!
//! let sorted = Pipeline::default().sort(&[5, 3, 8, 1, 9, 2, 7, 4]).unwrap();
//! assert_eq!(sorted, vec![1, 2, 3, 4, 5, 7, 8, 9]);
//! ```

pub mod error;
pub mod link;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stage;
pub mod verify;

pub use error::{Result, SortError};
pub use pipeline::{Pipeline, PipelineConfig, SortOutcome};
pub use source::required_stages;
pub use stage::StageReport;
