pub mod shard_ctx;
pub mod shard_flow;

pub use shard_ctx::ShardCtx;
pub use shard_flow::{mark_unresolved, run_escalation, run_lightweight, ShardOutput};
