use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::{ParentMessage, TabId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel to the parent is closed")]
    Closed,
}

/// Outbound half of the tab's connection to the parent process.
///
/// Serialization and delivery belong to the transport; the tab only needs
/// to know whether the channel is still open and to hand messages over.
pub trait ParentChannel {
    fn is_open(&self) -> bool;
    fn send(&mut self, message: ParentMessage) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub tab: TabId,
    pub message: ParentMessage,
}

/// Parent channel backed by a tokio mailbox shared by every tab in the process.
pub struct MailboxChannel {
    tab: TabId,
    tx: mpsc::UnboundedSender<OutboundMessage>,
    open: bool,
}

impl MailboxChannel {
    pub fn new(tab: TabId, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tab, tx, open: true }
    }

    pub fn pair(tab: TabId) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tab, tx), rx)
    }
}

impl ParentChannel for MailboxChannel {
    fn is_open(&self) -> bool {
        self.open && !self.tx.is_closed()
    }

    fn send(&mut self, message: ParentMessage) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let terminal = matches!(message, ParentMessage::ChannelClose);
        self.tx
            .send(OutboundMessage {
                tab: self.tab,
                message,
            })
            .map_err(|_| ChannelError::Closed)?;
        if terminal {
            self.open = false;
        }
        Ok(())
    }
}
