use thiserror::Error;

use crate::types::FeedState;

/// Error returned by a [`Frontend`](crate::demux::Frontend) collaborator.
pub type FrontendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the demux control plane
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("feed or filter pool exhausted")]
    Busy,

    #[error("{op} not allowed in state {state:?}")]
    InvalidState { op: &'static str, state: FeedState },

    #[error("invalid PID: 0x{0:04x}")]
    InvalidPid(u16),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("no frontend installed")]
    NoDevice,

    #[error("unknown or stale handle")]
    UnknownHandle,

    #[error(transparent)]
    Frontend(FrontendError),
}

/// Result type for demux operations
pub type Result<T> = std::result::Result<T, DemuxError>;
