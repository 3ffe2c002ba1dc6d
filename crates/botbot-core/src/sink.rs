//! Outbound response sink contract.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::CoreResult;
use crate::identity::{ChannelIdentity, NetworkId};

/// What a plugin sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A line for the originating channel.
    Text(String),
    /// A private message to `nick`.
    Private { nick: String, msg: String },
}

impl Reply {
    /// Builds a private-message directive.
    pub fn private(nick: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Private {
            nick: nick.into(),
            msg: msg.into(),
        }
    }

    /// The message body.
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Private { msg, .. } => msg,
        }
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Delivers replies back to the chat surface.
#[async_trait]
pub trait ResponseSink: Send + Sync + 'static {
    async fn send(&self, channel: &ChannelIdentity, reply: Reply) -> CoreResult<()>;
}

/// A reply captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub chatbot_id: NetworkId,
    pub channel: String,
    pub reply: Reply,
}

/// Records every reply, in delivery order.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<SentReply>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far.
    pub fn sent(&self) -> Vec<SentReply> {
        self.sent.lock().clone()
    }

    /// Just the message bodies, in delivery order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|sent| sent.reply.text().to_string())
            .collect()
    }

    /// Removes and returns everything delivered so far.
    pub fn take(&self) -> Vec<SentReply> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait]
impl ResponseSink for MemorySink {
    async fn send(&self, channel: &ChannelIdentity, reply: Reply) -> CoreResult<()> {
        self.sent.lock().push(SentReply {
            chatbot_id: channel.chatbot_id,
            channel: channel.name.clone(),
            reply,
        });
        Ok(())
    }
}

/// Writes replies to the log instead of a chat network.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ResponseSink for LogSink {
    async fn send(&self, channel: &ChannelIdentity, reply: Reply) -> CoreResult<()> {
        match reply {
            Reply::Text(text) => info!(
                chatbot_id = channel.chatbot_id,
                channel = %channel.name,
                "<< {text}"
            ),
            Reply::Private { nick, msg } => info!(
                chatbot_id = channel.chatbot_id,
                nick = %nick,
                "<< (private) {msg}"
            ),
        }
        Ok(())
    }
}
