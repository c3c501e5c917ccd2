//! # Queue Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Push-based backends deliver due jobs themselves and cannot be polled
    #[error("pop_due is not supported by the {backend} backend; consume its dispatch channel instead")]
    PopUnsupported { backend: &'static str },

    #[error("Queue dispatch channel closed")]
    ChannelClosed,

    #[error("Queue backend error: {0}")]
    Backend(String),
}
