//! Job table and real-time job event streaming.
//!
//! The event broadcaster can back any streaming boundary (SSE, websockets,
//! a desktop shell) without that boundary touching the job table.

pub mod job_events;
pub mod job_store;

pub use job_events::{JobEvent, JobEventBroadcaster};
pub use job_store::{JobCounts, JobStore};
