//! Error types for the speech driver.

/// Top-level error type for the driver.
///
/// Recoverable faults inside the synthesis callback (unsupported speech
/// commands, malformed marker strings) are deliberately *not* represented
/// here: they are logged and worked around in place so the engine never
/// sees a failing callback.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Engine or wave player could not start, including the bounded
    /// initialization wait timing out.
    #[error("initialization failure: {0}")]
    Initialization(String),

    /// A voice id that the engine does not expose.
    #[error("no such voice: {0}")]
    NoSuchVoice(String),

    /// An engine primitive returned a non-success code.
    #[error("engine error: {0}")]
    Engine(String),

    /// A registry lookup failed while resolving a voice.
    #[error("registry error: {0}")]
    Registry(String),

    /// Wave player error.
    #[error("player error: {0}")]
    Player(String),

    /// The engine worker thread is gone or a reply channel closed.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DriverError>;
