//! Error types used across the streamvisor core.
//!
//! A single [`Error`] enum covers the whole taxonomy: configuration,
//! registry bookkeeping, process launch, and control-channel failures.
//! Every variant maps to an HTTP-like status code via [`Error::http_status`]
//! so the (external) REST layer can surface failures uniformly without
//! inspecting variants.

use std::io;
use thiserror::Error;

/// Errors produced by the supervisor core and the control channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing entity configuration.
    #[error("config error: {0}")]
    Config(String),

    /// An entity type with this name is already registered.
    #[error("type {0:?} already registered")]
    DuplicateType(String),

    /// No factory registered under this type name.
    #[error("type {0:?} not registered")]
    UnknownType(String),

    /// An entity with this name is already live or being created.
    #[error("name {0:?} already exists")]
    DuplicateName(String),

    /// No live entity under this name.
    #[error("{0:?} not found")]
    NotFound(String),

    /// The executable is missing or exec failed.
    #[error("failed to launch {program:?}: {reason}")]
    Launch {
        /// Program name that could not be started.
        program: String,
        /// Underlying failure description.
        reason: String,
    },

    /// No reply arrived within the caller-specified timeout.
    #[error("request timed out")]
    RequestTimeout,

    /// The reply did not match the request (type, sequence, or op code).
    #[error("invalid reply: {0}")]
    InvalidReply(&'static str),

    /// The remote helper reported a non-2xx status.
    #[error("remote error {status}: {info}")]
    RemoteError {
        /// HTTP-like status carried in the reply header.
        status: i32,
        /// Human-readable info string from the reply header.
        info: String,
    },

    /// Operation attempted on an entity after its destruction.
    #[error("entity already destroyed")]
    Destroyed,

    /// Socket-level failure on the control channel.
    #[error("control channel i/o: {0}")]
    Channel(#[from] io::Error),
}

impl Error {
    /// Returns the HTTP-like status code for uniform surfacing.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Config(_) => 400,
            Error::DuplicateType(_) => 400,
            Error::UnknownType(_) => 404,
            Error::DuplicateName(_) => 400,
            Error::NotFound(_) => 404,
            Error::Launch { .. } => 404,
            Error::RequestTimeout => 503,
            Error::InvalidReply(_) => 500,
            Error::RemoteError { status, .. } => u16::try_from(*status).unwrap_or(500),
            Error::Destroyed => 503,
            Error::Channel(_) => 502,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::DuplicateType(_) => "duplicate_type",
            Error::UnknownType(_) => "unknown_type",
            Error::DuplicateName(_) => "duplicate_name",
            Error::NotFound(_) => "not_found",
            Error::Launch { .. } => "launch_error",
            Error::RequestTimeout => "request_timeout",
            Error::InvalidReply(_) => "invalid_reply",
            Error::RemoteError { .. } => "remote_error",
            Error::Destroyed => "entity_destroyed",
            Error::Channel(_) => "channel_io",
        }
    }
}

/// Convenient alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
