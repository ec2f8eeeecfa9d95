pub mod loaders;
pub mod record;
pub mod shard;

pub use loaders::{read_rows, read_summary, write_rows, write_summary};
pub use record::{Escalation, StatusVerdict, UrlEntry, UrlRecord, VerdictTag, UNAVAILABLE_LABEL};
pub use shard::{Phase, ShardStatus, ShardSummary};
