#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

use std::{io, path::PathBuf};

use thiserror::Error;

pub mod proto;
pub mod client;
pub mod commands;
pub mod config;
pub mod emitter;

pub use client::{Channel, NodeIo, QueryClient};
pub use config::Config;
pub use emitter::{Cadence, CommandEmitter, Pacer, ThreadPacer};
pub use proto::{Command, ImageSet};

/// General error that can occur while talking to a node
#[derive(Debug, Error)]
pub enum Error {
    /// IO Error, raised by connect, write or flush
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    /// Failed to frame or parse a command
    #[error("Invalid command: {0}")]
    InvalidCommand(#[from] proto::Error),
    /// Server did not introduce itself as expected
    #[error("Unexpected greeting: {0:?}")]
    UnexpectedGreeting(String),
    /// Server refused to open the node
    #[error("Node rejected: {0:?}")]
    NodeRejected(String),
    /// Stream ended or was closed before a line ended
    #[error("Stream ended before sending full line")]
    UnexpectedEndOfStream,
    /// Configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying IO error
        source: io::Error,
    },
    /// Configuration could not be parsed
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
