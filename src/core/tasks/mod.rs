// src/core/tasks/mod.rs

//! Long-running background tasks: the monitor scan, the standby-pool refresh,
//! the recovery loop, and the live-listener subscription.

pub mod listener_loop;
pub mod monitor_loop;
pub mod recovery_loop;
pub mod standby_loop;
