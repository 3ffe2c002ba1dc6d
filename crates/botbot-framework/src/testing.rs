//! A harness for exercising one plugin without a queue or a chat network.
//!
//! ```rust,ignore
//! let app = TestApp::new(Arc::new(Motivate))?;
//! assert_eq!(
//!     app.respond("!m bob").await,
//!     ["You're doing good work, bob!"]
//! );
//! ```

use std::sync::Arc;

use botbot_core::{
    ChannelIdentity, Line, MESSAGE_COMMAND, MemorySink, MemoryStore, NetworkId, NetworkIdentity,
    RawPacket,
};
use chrono::Utc;
use serde_json::Value;

use crate::dispatcher::Dispatcher;
use crate::error::FrameworkResult;
use crate::executor::InlineExecutor;
use crate::plugin::Plugin;
use crate::registry::PluginRegistry;

/// Sender used by [`TestApp::respond`].
pub const DEFAULT_TEST_USER: &str = "repl_user";
/// The bot's nick inside a [`TestApp`].
pub const TEST_NICK: &str = "botbot";
/// The channel inside a [`TestApp`].
pub const TEST_CHANNEL: &str = "#test";

const TEST_NETWORK: NetworkId = 1;

/// One plugin, enabled on one channel, backed by in-memory collaborators and
/// run inline.
pub struct TestApp {
    slug: &'static str,
    dispatcher: Dispatcher,
    store: Arc<MemoryStore>,
    sink: Arc<MemorySink>,
    network: NetworkIdentity,
    channel: ChannelIdentity,
}

impl TestApp {
    /// Registers `plugin` and enables it on the test channel.
    pub fn new(plugin: Arc<dyn Plugin>) -> FrameworkResult<Self> {
        let slug = plugin.slug();
        let registry = PluginRegistry::new().with(plugin)?;
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            Arc::new(InlineExecutor),
            store.clone(),
            sink.clone(),
        );

        Ok(Self {
            slug,
            dispatcher,
            store,
            sink,
            network: NetworkIdentity {
                id: TEST_NETWORK,
                nick: TEST_NICK.to_string(),
                server: None,
            },
            channel: ChannelIdentity::new(TEST_NETWORK, TEST_CHANNEL).with_plugin(slug),
        })
    }

    /// Sets the command prefix (builder pattern).
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dispatcher = self.dispatcher.with_command_prefix(prefix);
        self
    }

    /// Sets the plugin's channel configuration (builder pattern).
    pub fn with_config(mut self, config: Value) -> Self {
        self.channel = self.channel.with_plugin_config(self.slug, config);
        self
    }

    /// The backing store, for assertions on raw keys.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Sends `text` as [`DEFAULT_TEST_USER`] and returns the replies.
    pub async fn respond(&self, text: &str) -> Vec<String> {
        self.respond_as(DEFAULT_TEST_USER, text).await
    }

    /// Sends `text` as `user` to the test channel and returns the replies.
    pub async fn respond_as(&self, user: &str, text: &str) -> Vec<String> {
        self.deliver(user, TEST_CHANNEL, text).await
    }

    /// Sends `text` as a private message from `user` to the bot.
    pub async fn respond_privately(&self, user: &str, text: &str) -> Vec<String> {
        self.deliver(user, TEST_NICK, text).await
    }

    async fn deliver(&self, user: &str, channel: &str, text: &str) -> Vec<String> {
        let packet = RawPacket {
            content: text.to_string(),
            user: user.to_string(),
            chatbot_id: TEST_NETWORK,
            raw: format!(":{user}!{user}@localhost {MESSAGE_COMMAND} {channel} :{text}"),
            channel: channel.to_string(),
            command: MESSAGE_COMMAND.to_string(),
            host: "localhost".to_string(),
            received: Utc::now(),
        };
        let line = Line::new(packet, Some(self.network.clone()), Some(self.channel.clone()));
        self.dispatcher.dispatch(Arc::new(line)).await;
        self.sink
            .take()
            .into_iter()
            .map(|sent| sent.reply.text().to_string())
            .collect()
    }
}

impl std::fmt::Debug for TestApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestApp")
            .field("slug", &self.slug)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
