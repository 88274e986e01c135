//! Runtime errors

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Result type used throughout the observer runtime.
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Errors produced by tracked functions, callbacks and the scheduler.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A tracked function or callback reported a failure.
    #[error("{0}")]
    Failed(String),

    /// A render-path computation failed. Its output can no longer be trusted,
    /// so this error always reaches the caller of the flush.
    #[error("error in render function of {owner}: {source}")]
    Render {
        owner: String,
        expression: String,
        #[source]
        source: Box<ReactiveError>,
    },

    /// The loop guard stopped a flush.
    #[error("you may have an infinite update loop {location} (subscriber {subscriber})")]
    InfiniteLoop {
        subscriber: SubscriberId,
        location: String,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReactiveError {
    /// Build a plain failure from any message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
