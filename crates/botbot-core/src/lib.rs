//! # BotBot Core
//!
//! Foundation types for the BotBot plugin runner.
//!
//! This crate owns everything that sits *below* routing:
//!
//! - **Wire format**: [`RawPacket`], the record the chat bridge pushes onto
//!   the inbound queue, and [`parse_nano_timestamp`] for its `Received` field.
//! - **Events**: [`Line`], the normalized event handed to plugins, and its
//!   [`AddressingMode`].
//! - **Collaborator contracts**: [`IdentityStore`], [`EventQueue`],
//!   [`KeyValueStore`] and [`ResponseSink`] describe the external systems
//!   the runner talks to. Each ships with an in-memory implementation that
//!   the tests and the local runner use.
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────┐   ┌────────────┐   ┌──────────────┐
//! │EventQueue│──▶│ RawPacket │──▶│ Line │──▶│ (dispatch) │──▶│ ResponseSink │
//! └──────────┘   └───────────┘   └──────┘   └────────────┘   └──────────────┘
//!                      ▲                          │
//!               IdentityStore               KeyValueStore
//! ```

pub mod error;
pub mod identity;
pub mod line;
pub mod packet;
pub mod queue;
pub mod sink;
pub mod store;

pub use error::{CoreError, CoreResult};
pub use identity::{ChannelIdentity, IdentityStore, MemoryIdentityStore, NetworkId, NetworkIdentity};
pub use line::{AddressingMode, Line, MESSAGE_COMMAND};
pub use packet::{RawPacket, parse_nano_timestamp};
pub use queue::{EventQueue, MemoryQueue};
pub use sink::{LogSink, MemorySink, Reply, ResponseSink, SentReply};
pub use store::{KeyValueStore, MemoryStore};
