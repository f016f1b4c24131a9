//! Centralized error type for the lovely umbrella crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Host(#[from] lovely_host::HostError),

    #[error("No plugin loaded")]
    PluginNotLoaded,
}

pub type Result<T> = std::result::Result<T, Error>;
