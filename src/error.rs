//! Caller-facing error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A reconfiguration, pairing or recovery attempt is already in
    /// flight. Retry once the manager settles.
    #[error("configuration change in progress")]
    Busy,

    /// The context lock could not be acquired within the bounded wait.
    #[error("timed out waiting for the manager")]
    Timeout,

    /// Operation is not valid for the current mode, e.g. connect while
    /// the mode has no station component.
    #[error("operation not valid in the current mode")]
    InvalidState,

    /// The underlying radio driver rejected a call.
    #[error("radio driver failure")]
    Driver(#[source] anyhow::Error),

    /// Reading or writing the persistent store failed.
    #[error("persistent store failure")]
    Storage(#[source] anyhow::Error),

    /// Building a scan snapshot ran out of room; the previous snapshot
    /// is retained.
    #[error("scan results could not be captured")]
    Exhausted,
}

pub type Result<T> = std::result::Result<T, Error>;
