use std::io;

use ipnetwork::IpNetwork;
use thiserror::Error;

use crate::rib::{Family, RouterId};

pub type Result<T> = std::result::Result<T, RibError>;

#[derive(Debug, Error)]
pub enum RibError {
    /// A contributor asked to withdraw a route it never announced
    #[error("no route from {peer} for {destination}")]
    UnknownContributor {
        destination: IpNetwork,
        peer: RouterId,
    },

    /// Values array does not line up with its offset map
    #[error("values length {values} does not match offset map size {offsets}")]
    LengthMismatch { offsets: usize, values: usize },

    #[error("no route table for {0}")]
    UnknownTable(Family),

    /// Best path selection process is no longer accepting updates
    #[error("best path selection process has shut down")]
    SchedulerClosed,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl RibError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}
