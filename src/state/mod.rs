//! State module for tracking run progress
//!
//! # Components
//!
//! - `RateCursor`: the "time of last call" cursor of one rate-limit domain
//! - `CandidateState`: the linear disqualification pipeline of one candidate

mod candidate_state;
mod rate_cursor;

// Re-export main types
pub use candidate_state::{CandidateState, DisqualifyReason, PipelineStage};
pub use rate_cursor::RateCursor;
