#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod policy;
pub mod rib;
pub mod utils;

pub use config::ServerConfig;
pub use error::{Result, RibError};
pub use rib::Rib;
