//! Command implementations.

mod analyze;
mod helpers;
mod ingest;
mod init;
mod queue_cmd;
mod serve;
mod work;

pub use analyze::cmd_analyze;
pub use ingest::cmd_ingest;
pub use init::cmd_init;
pub use queue_cmd::{
    cmd_queue_cancel, cmd_queue_cleanup, cmd_queue_health, cmd_queue_purge,
    cmd_queue_reset_stuck, cmd_queue_stats,
};
pub use serve::cmd_serve;
pub use work::cmd_work;
