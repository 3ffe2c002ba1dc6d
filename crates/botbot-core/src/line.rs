//! The normalized event handed to plugins.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::identity::{ChannelIdentity, NetworkId, NetworkIdentity};
use crate::packet::RawPacket;

/// Protocol command of a user message.
pub const MESSAGE_COMMAND: &str = "PRIVMSG";

/// How an event relates to the bot's own identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
    /// An ordinary channel line.
    Broadcast,
    /// The line starts with the bot's nick (`botbot: hello`).
    Direct,
    /// A private query sent straight to the bot.
    Private,
}

/// A normalized chat event.
///
/// Built once per [`RawPacket`] and immutable afterwards. An event is only
/// dispatched when both the network and the channel resolved, see
/// [`Line::is_valid`].
#[derive(Debug, Clone)]
pub struct Line {
    /// Id of the network connection that received the event.
    pub chatbot_id: NetworkId,
    /// Resolved network, `None` if unknown.
    pub network: Option<NetworkIdentity>,
    /// Resolved channel, `None` if unknown.
    pub channel: Option<ChannelIdentity>,
    /// Channel name as it arrived on the wire.
    pub channel_name: String,
    /// Where replies go: the channel, or the sender's nick for private lines.
    pub reply_target: String,
    /// Sender nick.
    pub user: String,
    /// Effective text, with any direct-mention prefix removed.
    pub text: String,
    /// Original message text.
    pub full_text: String,
    /// Protocol command.
    pub command: String,
    /// The raw protocol line.
    pub raw: String,
    /// Sender host.
    pub host: String,
    /// Receipt time at the bridge.
    pub received: DateTime<Utc>,
    /// Addressing mode.
    pub mode: AddressingMode,
    active_plugins: BTreeSet<String>,
}

impl Line {
    /// Normalizes a packet against its resolved identities.
    pub fn new(
        packet: RawPacket,
        network: Option<NetworkIdentity>,
        channel: Option<ChannelIdentity>,
    ) -> Self {
        let channel_name = packet.channel.trim().to_string();
        let nick = network.as_ref().map(|n| n.nick.as_str()).unwrap_or("");

        let (mode, text, reply_target) = if !nick.is_empty() && channel_name == nick {
            debug!(user = %packet.user, "Private message detected");
            (
                AddressingMode::Private,
                packet.content.clone(),
                packet.user.clone(),
            )
        } else if let Some(rest) = strip_mention(&packet.content, nick) {
            debug!(user = %packet.user, "Direct message detected");
            (
                AddressingMode::Direct,
                rest.trim_start().to_string(),
                channel_name.clone(),
            )
        } else {
            (
                AddressingMode::Broadcast,
                packet.content.clone(),
                channel_name.clone(),
            )
        };

        let active_plugins = channel
            .as_ref()
            .map(ChannelIdentity::active_plugin_slugs)
            .unwrap_or_default();

        Self {
            chatbot_id: packet.chatbot_id,
            network,
            channel,
            channel_name,
            reply_target,
            user: packet.user,
            text,
            full_text: packet.content,
            command: packet.command,
            raw: packet.raw,
            host: packet.host,
            received: packet.received,
            mode,
            active_plugins,
        }
    }

    /// `true` iff both network and channel resolved.
    pub fn is_valid(&self) -> bool {
        self.network.is_some() && self.channel.is_some()
    }

    /// `true` for user messages (`PRIVMSG`).
    pub fn is_message(&self) -> bool {
        self.command == MESSAGE_COMMAND
    }

    /// `true` for direct mentions and private queries.
    pub fn is_direct_message(&self) -> bool {
        matches!(self.mode, AddressingMode::Direct | AddressingMode::Private)
    }

    /// `true` for private queries.
    pub fn is_private(&self) -> bool {
        self.mode == AddressingMode::Private
    }

    /// Plugin slugs enabled on the resolved channel.
    pub fn active_plugins(&self) -> &BTreeSet<String> {
        &self.active_plugins
    }

    /// The bot's own nick, if the network resolved.
    pub fn bot_nick(&self) -> Option<&str> {
        self.network.as_ref().map(|n| n.nick.as_str())
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_text)
    }
}

/// Strips a leading, case-insensitive `nick` mention from `text`.
///
/// A multi-character nick must be followed by `:` or whitespace, which is
/// consumed. A single-character nick (`!`, `@`) matches as a bare prefix.
fn strip_mention<'a>(text: &'a str, nick: &str) -> Option<&'a str> {
    if nick.is_empty() {
        return None;
    }

    let mut chars = text.char_indices();
    for expected in nick.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    let prefix_end = chars.next().map(|(i, _)| i).unwrap_or(text.len());

    if nick.chars().count() == 1 {
        return Some(&text[prefix_end..]);
    }

    let rest = &text[prefix_end..];
    let separator = rest.chars().next()?;
    if separator == ':' || separator.is_whitespace() {
        Some(&rest[separator.len_utf8()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(channel: &str, content: &str, command: &str) -> RawPacket {
        RawPacket {
            content: content.into(),
            user: "alice".into(),
            chatbot_id: 1,
            raw: String::new(),
            channel: channel.into(),
            command: command.into(),
            host: "example.org".into(),
            received: Utc::now(),
        }
    }

    fn network(nick: &str) -> NetworkIdentity {
        NetworkIdentity {
            id: 1,
            nick: nick.into(),
            server: None,
        }
    }

    fn line(nick: &str, channel: &str, content: &str) -> Line {
        Line::new(
            packet(channel, content, MESSAGE_COMMAND),
            Some(network(nick)),
            Some(ChannelIdentity::new(1, channel).with_plugin("motivate")),
        )
    }

    #[test]
    fn test_direct_mention_is_stripped() {
        let line = line("Bot", "#rust", "Bot: hello");
        assert_eq!(line.mode, AddressingMode::Direct);
        assert_eq!(line.text, "hello");
        assert_eq!(line.full_text, "Bot: hello");
        assert!(line.is_direct_message());
    }

    #[test]
    fn test_mention_is_case_insensitive() {
        let line = line("Bot", "#rust", "bOT   what's up");
        assert_eq!(line.mode, AddressingMode::Direct);
        assert_eq!(line.text, "what's up");
    }

    #[test]
    fn test_nick_without_separator_is_broadcast() {
        let line = line("Bot", "#rust", "Botsomething");
        assert_eq!(line.mode, AddressingMode::Broadcast);
        assert_eq!(line.text, "Botsomething");
        assert!(!line.is_direct_message());
    }

    #[test]
    fn test_single_char_nick_is_bare_prefix() {
        let line = line("@", "#rust", "@motivate bob");
        assert_eq!(line.mode, AddressingMode::Direct);
        assert_eq!(line.text, "motivate bob");
    }

    #[test]
    fn test_nick_alone_is_broadcast() {
        let line = line("Bot", "#rust", "Bot");
        assert_eq!(line.mode, AddressingMode::Broadcast);
    }

    #[test]
    fn test_private_message_replies_to_sender() {
        let line = line("Bot", "Bot", "hello there");
        assert_eq!(line.mode, AddressingMode::Private);
        assert_eq!(line.reply_target, "alice");
        assert_eq!(line.channel_name, "Bot");
        assert_eq!(line.text, "hello there");
        assert!(line.is_private());
    }

    #[test]
    fn test_validity_requires_both_identities() {
        let packet = packet("#rust", "hi", MESSAGE_COMMAND);
        assert!(!Line::new(packet.clone(), None, None).is_valid());
        assert!(!Line::new(packet.clone(), Some(network("Bot")), None).is_valid());
        let channel = ChannelIdentity::new(1, "#rust");
        assert!(Line::new(packet, Some(network("Bot")), Some(channel)).is_valid());
    }

    #[test]
    fn test_active_plugins_follow_channel() {
        let line = line("Bot", "#rust", "hi");
        assert!(line.active_plugins().contains("motivate"));

        let unresolved = Line::new(packet("#rust", "hi", "JOIN"), None, None);
        assert!(unresolved.active_plugins().is_empty());
        assert!(!unresolved.is_message());
    }

    #[test]
    fn test_channel_name_is_trimmed() {
        let line = line("Bot", " #rust ", "hi");
        assert_eq!(line.channel_name, "#rust");
        assert_eq!(line.reply_target, "#rust");
    }
}
