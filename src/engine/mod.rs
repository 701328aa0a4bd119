//! Orchestration layer: gates, loop closure, pruning, and the engine.

pub mod gates;
mod loop_closure;
mod pruner;
mod tag_slam;

pub use loop_closure::{LoopClosureDetector, LoopClosureProposal};
pub use pruner::prune_by_pose_count;
pub use tag_slam::{LoopClosureEvent, StepOutput, TagSlam};
