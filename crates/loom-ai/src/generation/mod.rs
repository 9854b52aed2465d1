//! Streaming generation against a [`GenerationEngine`](crate::GenerationEngine).

mod coordinator;
mod task;
mod truncation;

pub use coordinator::{Generation, GenerationParams, GenerationReport, StopReason};
pub use task::{spawn_generation, GenerationHandle, SNAPSHOT_BUFFER};
pub use truncation::TruncationPolicy;
