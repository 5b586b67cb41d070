use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The inbound message could not be parsed. Nothing of it was applied.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Channel closed")]
    ChannelClosed,
    /// A bounded channel had no room; the message was dropped.
    #[error("Channel full")]
    ChannelFull,
    #[error("Invalid config: {0}")]
    Config(String),
}
