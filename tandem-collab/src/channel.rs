//! Outbound side of the peer connection.
//!
//! The transport is assumed ordered and reliable. Anything that can accept a
//! `String` qualifies; tokio mpsc senders are the usual choice, a `Vec` is
//! handy for recording traffic.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SyncError;
use crate::protocol::{Envelope, SyncPayload};

pub trait Channel {
    fn send(&mut self, message: String) -> Result<(), SyncError>;
}

impl Channel for mpsc::UnboundedSender<String> {
    fn send(&mut self, message: String) -> Result<(), SyncError> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| SyncError::ChannelClosed)
    }
}

impl Channel for mpsc::Sender<String> {
    fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SyncError::ChannelFull,
            TrySendError::Closed(_) => SyncError::ChannelClosed,
        })
    }
}

impl Channel for Vec<String> {
    fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.push(message);
        Ok(())
    }
}

/// Encodes envelopes onto a [`Channel`] and counts what went out.
pub struct Link<C> {
    channel: C,
    sent: u64,
}

impl<C: Channel> Link<C> {
    pub fn new(channel: C) -> Self {
        Self { channel, sent: 0 }
    }

    pub fn send_sync(&mut self, payload: SyncPayload) -> Result<(), SyncError> {
        let raw = Envelope::encode_sync(payload)?;
        log::debug!("-> {raw}");
        self.push(raw)
    }

    pub fn send_data(&mut self, data: Value) -> Result<(), SyncError> {
        let raw = Envelope::encode_data(data)?;
        self.push(raw)
    }

    /// Messages handed to the channel so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    fn push(&mut self, raw: String) -> Result<(), SyncError> {
        if let Err(e) = self.channel.send(raw) {
            log::warn!("send failed: {e}");
            return Err(e);
        }
        self.sent += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_link_counts_and_encodes() {
        let mut link = Link::new(Vec::new());
        link.send_sync(SyncPayload::init()).unwrap();
        link.send_data(json!(42)).unwrap();
        assert_eq!(link.sent(), 2);
        assert_eq!(link.channel()[0], r#"{"fabricSync":{"init":true}}"#);
        assert_eq!(link.channel()[1], r#"{"data":42}"#);
    }

    #[test]
    fn test_closed_unbounded_channel() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        let mut link = Link::new(tx);
        assert!(matches!(link.send_sync(SyncPayload::init()), Err(SyncError::ChannelClosed)));
        assert_eq!(link.sent(), 0);
    }

    #[test]
    fn test_bounded_channel_full() {
        let (tx, mut rx) = mpsc::channel::<String>(1);
        let mut link = Link::new(tx);
        link.send_data(json!(1)).unwrap();
        assert!(matches!(link.send_data(json!(2)), Err(SyncError::ChannelFull)));
        assert_eq!(rx.try_recv().unwrap(), r#"{"data":1}"#);
    }
}
