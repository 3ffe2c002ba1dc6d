//! The inbound wire record.
//!
//! The chat bridge serialises every protocol event it sees into a flat JSON
//! object and pushes it onto the inbound queue:
//!
//! ```json
//! {
//!   "ChatBotId": 1,
//!   "Channel": "#botbot",
//!   "User": "alice",
//!   "Content": "!m bob",
//!   "Command": "PRIVMSG",
//!   "Raw": ":alice!a@host PRIVMSG #botbot :!m bob",
//!   "Host": "host",
//!   "Received": "2014-01-27T16:35:53.123456789Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identity::NetworkId;

/// One raw event as popped off the inbound queue.
///
/// A packet with a missing field or an unparseable `Received` timestamp fails
/// deserialization and is reported as malformed by the ingestion loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawPacket {
    /// Message text (`Content` on the wire).
    pub content: String,
    /// Sender nick.
    pub user: String,
    /// Id of the chat network connection (bot) that received the event.
    #[serde(rename = "ChatBotId")]
    pub chatbot_id: NetworkId,
    /// The raw protocol line.
    pub raw: String,
    /// Channel name, or the bot's own nick for private messages.
    pub channel: String,
    /// Protocol command (`PRIVMSG`, `JOIN`, `PART`, `QUIT`, ...).
    pub command: String,
    /// Raw connection host string of the sender.
    pub host: String,
    /// Receipt time at the bridge.
    #[serde(
        deserialize_with = "deserialize_received",
        serialize_with = "serialize_received"
    )]
    pub received: DateTime<Utc>,
}

impl RawPacket {
    /// Parses a packet from its JSON queue payload.
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// Parses the bridge's nanosecond-precision UTC timestamps.
///
/// The fractional part may carry anywhere from zero to nine digits; the bridge
/// drops trailing zeros, so `2014-01-27T16:35:53.1234Z` is as valid as
/// `2014-01-27T16:35:53.123456789Z`.
pub fn parse_nano_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value.trim()).map(|dt| dt.with_timezone(&Utc))
}

fn deserialize_received<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_nano_timestamp(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid Received timestamp '{raw}': {e}")))
}

fn serialize_received<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_nano_timestamp() {
        let parsed = parse_nano_timestamp("2014-01-27T16:35:53.123456789Z").unwrap();
        let expected = Utc.with_ymd_and_hms(2014, 1, 27, 16, 35, 53).unwrap();
        assert_eq!(parsed.date_naive(), expected.date_naive());
        assert_eq!(parsed.second(), 53);
        assert_eq!(parsed.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_short_nano_timestamp() {
        let parsed = parse_nano_timestamp("2014-01-27T16:35:53.1234Z").unwrap();
        assert_eq!(parsed.nanosecond(), 123_400_000);
    }

    #[test]
    fn test_timestamp_without_fraction() {
        let parsed = parse_nano_timestamp("2014-01-27T16:35:53Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2014, 1, 27, 16, 35, 53).unwrap());
    }

    #[test]
    fn test_invalid_timestamp() {
        assert!(parse_nano_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_packet_from_json() {
        let payload = r##"{
            "Content": "hello",
            "User": "alice",
            "ChatBotId": 7,
            "Raw": ":alice PRIVMSG #rust :hello",
            "Channel": "#rust",
            "Command": "PRIVMSG",
            "Host": "example.org",
            "Received": "2014-01-27T16:35:53.1Z"
        }"##;
        let packet = RawPacket::from_json(payload).unwrap();
        assert_eq!(packet.chatbot_id, 7);
        assert_eq!(packet.channel, "#rust");
        assert_eq!(packet.received.nanosecond(), 100_000_000);
    }

    #[test]
    fn test_packet_missing_field_is_rejected() {
        let payload = r#"{"Content": "hello", "User": "alice"}"#;
        assert!(RawPacket::from_json(payload).is_err());
    }

    #[test]
    fn test_packet_bad_timestamp_is_rejected() {
        let payload = r##"{
            "Content": "", "User": "a", "ChatBotId": 1, "Raw": "",
            "Channel": "#c", "Command": "JOIN", "Host": "",
            "Received": "not a time"
        }"##;
        let err = RawPacket::from_json(payload).unwrap_err();
        assert!(err.to_string().contains("Received"));
    }
}
