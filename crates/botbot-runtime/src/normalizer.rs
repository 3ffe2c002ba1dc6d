//! Raw packet to [`Line`].

use std::sync::Arc;

use botbot_core::{Line, RawPacket};
use tracing::debug;

use crate::cache::IdentityCache;
use crate::error::RuntimeResult;

/// Resolves a packet's identities through the [`IdentityCache`] and builds
/// the normalized [`Line`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    cache: Arc<IdentityCache>,
}

impl Normalizer {
    pub fn new(cache: Arc<IdentityCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    /// Parses a queue payload and normalizes it.
    pub async fn parse(&self, payload: &str) -> RuntimeResult<Line> {
        let packet = RawPacket::from_json(payload)?;
        Ok(self.normalize(packet).await)
    }

    /// Normalizes a packet. The channel is only looked up once the network
    /// resolved; either miss yields an invalid line.
    pub async fn normalize(&self, packet: RawPacket) -> Line {
        let network = self.cache.resolve_network(packet.chatbot_id).await;
        let channel = match network {
            Some(_) => {
                self.cache
                    .resolve_channel(packet.chatbot_id, packet.channel.trim())
                    .await
            }
            None => None,
        };

        let line = Line::new(packet, network, channel);
        debug!(
            chatbot_id = line.chatbot_id,
            channel = %line.channel_name,
            user = %line.user,
            mode = ?line.mode,
            valid = line.is_valid(),
            "Normalized line"
        );
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_IDENTITY_TTL;
    use crate::error::RuntimeError;
    use botbot_core::{AddressingMode, ChannelIdentity, MemoryIdentityStore, NetworkIdentity};
    use serde_json::json;

    fn normalizer() -> Normalizer {
        let store = Arc::new(MemoryIdentityStore::new());
        store.add_network(NetworkIdentity {
            id: 1,
            nick: "Bot".into(),
            server: None,
        });
        store.add_channel(ChannelIdentity::new(1, "#rust").with_plugin("motivate"));
        store.add_channel(ChannelIdentity::new(1, "Bot").with_plugin("metabrain"));
        Normalizer::new(Arc::new(IdentityCache::new(store, DEFAULT_IDENTITY_TTL)))
    }

    fn payload(chatbot_id: i64, channel: &str, content: &str) -> String {
        json!({
            "Content": content,
            "User": "alice",
            "ChatBotId": chatbot_id,
            "Raw": format!(":alice!a@host PRIVMSG {channel} :{content}"),
            "Channel": channel,
            "Command": "PRIVMSG",
            "Host": "host",
            "Received": "2014-01-27T16:35:53.1234Z"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_direct_mention_is_stripped() {
        let line = normalizer().parse(&payload(1, "#rust", "Bot: hello")).await.unwrap();
        assert!(line.is_valid());
        assert_eq!(line.mode, AddressingMode::Direct);
        assert_eq!(line.text, "hello");
        assert_eq!(line.full_text, "Bot: hello");
        assert!(line.active_plugins().contains("motivate"));
    }

    #[tokio::test]
    async fn test_nick_prefix_without_separator_is_broadcast() {
        let line = normalizer().parse(&payload(1, "#rust", "Botsomething")).await.unwrap();
        assert_eq!(line.mode, AddressingMode::Broadcast);
        assert_eq!(line.text, "Botsomething");
    }

    #[tokio::test]
    async fn test_private_query_replies_to_sender() {
        let line = normalizer().parse(&payload(1, "Bot", "remember x=y")).await.unwrap();
        assert!(line.is_valid());
        assert_eq!(line.mode, AddressingMode::Private);
        assert_eq!(line.reply_target, "alice");
        assert!(line.active_plugins().contains("metabrain"));
    }

    #[tokio::test]
    async fn test_unknown_identities_are_invalid() {
        let normalizer = normalizer();
        let unknown_network = normalizer.parse(&payload(7, "#rust", "hi")).await.unwrap();
        assert!(!unknown_network.is_valid());

        let unknown_channel = normalizer.parse(&payload(1, "#go", "hi")).await.unwrap();
        assert!(unknown_channel.network.is_some());
        assert!(!unknown_channel.is_valid());
    }

    #[tokio::test]
    async fn test_malformed_payloads() {
        let normalizer = normalizer();
        for bad in [
            "not json".to_string(),
            json!({"Content": "hi"}).to_string(),
            payload(1, "#rust", "hi").replace("2014-01-27T16:35:53.1234Z", "yesterday"),
        ] {
            let err = normalizer.parse(&bad).await.unwrap_err();
            assert!(matches!(err, RuntimeError::MalformedPacket(_)), "{bad}");
        }
    }
}
