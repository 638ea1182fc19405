//! CLI command handlers.

mod build;
mod init;
mod recover;
mod retrieve;

pub use build::run_build;
pub use init::run_init;
pub use recover::LotusOverrides;
pub use retrieve::run_retrieve;
