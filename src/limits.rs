//! Hard bounds on startup configuration.

use std::time::Duration;

pub const MAX_RESOURCES: usize = 10_000;
pub const MAX_CAPACITY: u32 = 1_000_000;
pub const MAX_WORKERS: u32 = 1024;
pub const MAX_TABLE_SLOTS: usize = 4096;
pub const MAX_RETRY_BUDGET: u32 = 100_000;
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);
pub const MAX_THINK_TIME: Duration = Duration::from_secs(600);
pub const MAX_RUN_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);
