pub mod agent;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod provider;
pub mod reassemble;
pub mod retry;
pub mod storage;
pub mod transfer;
pub mod upload;
pub mod url_model;

pub use error::RecoveryError;

#[cfg(test)]
pub(crate) mod testing;
