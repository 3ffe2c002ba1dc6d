//! Event dispatcher.
//!
//! The [`Dispatcher`] takes one valid [`Line`] and runs it through the
//! routing tables in a fixed order:
//!
//! 1. **firehose**: every active plugin bound here, unconditionally
//! 2. **messages**: user messages, regex on the effective text
//! 3. **mentions**: direct user messages only, regex on the effective text
//! 4. **commands**: the first token equals `prefix + word`
//! 5. **regex_commands**: as commands, then a regex over the remaining tokens
//!
//! Passes 4 and 5 only run when the effective text starts with the command
//! prefix. Every match is invoked; nothing stops the passes early.

use std::sync::Arc;

use botbot_core::{KeyValueStore, Line, ResponseSink};
use tracing::{Instrument, Level, debug, info, span};

use crate::context::PluginContext;
use crate::executor::{Executor, Invocation};
use crate::registry::{PluginRegistry, PluginRoutes, RouteMatcher, RouteRecord};
use crate::routing::{Category, RouteArgs, match_pattern};

/// Default command prefix.
pub const DEFAULT_COMMAND_PREFIX: &str = "!";

/// Routes normalized events to plugin handlers.
///
/// Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
    executor: Arc<dyn Executor>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn ResponseSink>,
    command_prefix: Arc<str>,
}

struct Match<'a> {
    routes: &'a PluginRoutes,
    record: &'a RouteRecord,
    args: RouteArgs,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<PluginRegistry>,
        executor: Arc<dyn Executor>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn ResponseSink>,
    ) -> Self {
        Self {
            registry,
            executor,
            store,
            sink,
            command_prefix: Arc::from(DEFAULT_COMMAND_PREFIX),
        }
    }

    /// Sets the command prefix (builder pattern).
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = Arc::from(prefix.into());
        self
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Dispatches one event.
    ///
    /// Invalid lines are skipped. Returns the number of invocations handed
    /// to the executor.
    pub async fn dispatch(&self, line: Arc<Line>) -> usize {
        let Some(channel) = line.channel.as_ref().filter(|_| line.is_valid()) else {
            debug!(chatbot_id = line.chatbot_id, channel = %line.channel_name, "Skipping unresolved line");
            return 0;
        };
        let channel = Arc::new(channel.clone());

        let span = span!(
            Level::DEBUG,
            "dispatch",
            chatbot_id = line.chatbot_id,
            channel = %line.channel_name,
            command = %line.command,
        );

        async move {
            let matches = self.collect_matches(&line);
            let count = matches.len();
            for Match {
                routes,
                record,
                args,
            } in matches
            {
                let ctx = PluginContext::new(
                    Arc::clone(&routes.slug),
                    Arc::clone(&channel),
                    line.chatbot_id,
                    Arc::clone(&self.command_prefix),
                    Arc::clone(&routes.schema),
                    Arc::clone(&self.store),
                );
                let invocation = Invocation {
                    slug: Arc::clone(&routes.slug),
                    route: Arc::clone(&record.name),
                    handler: Arc::clone(&record.handler),
                    ctx,
                    channel: Arc::clone(&channel),
                    line: Arc::clone(&line),
                    args,
                    sink: Arc::clone(&self.sink),
                };
                self.executor.execute(invocation).await;
            }
            count
        }
        .instrument(span)
        .await
    }

    fn collect_matches<'a>(&'a self, line: &Line) -> Vec<Match<'a>> {
        let mut matches = Vec::new();
        let active = line.active_plugins();

        for routes in self.registry.active(Category::Firehose, active) {
            for record in &routes.records {
                info!("Match: {}.{}", routes.slug, record.name);
                matches.push(Match {
                    routes,
                    record,
                    args: RouteArgs::default(),
                });
            }
        }

        if !line.is_message() {
            return matches;
        }

        self.match_text(Category::Messages, line, &mut matches);

        if line.is_direct_message() {
            self.match_text(Category::Mentions, line, &mut matches);
        }

        if line.text.starts_with(&*self.command_prefix) {
            self.match_commands(line, &mut matches);
            self.match_regex_commands(line, &mut matches);
        }

        matches
    }

    fn match_text<'a>(&'a self, category: Category, line: &Line, matches: &mut Vec<Match<'a>>) {
        for routes in self.registry.active(category, line.active_plugins()) {
            for record in &routes.records {
                let RouteMatcher::Pattern(regex) = &record.matcher else {
                    continue;
                };
                if let Some(args) = match_pattern(regex, &line.text) {
                    info!("Match: {}.{}", routes.slug, record.name);
                    matches.push(Match {
                        routes,
                        record,
                        args,
                    });
                }
            }
        }
    }

    fn match_commands<'a>(&'a self, line: &Line, matches: &mut Vec<Match<'a>>) {
        let tokens: Vec<&str> = line.text.split_whitespace().collect();
        let Some((first, rest)) = tokens.split_first() else {
            return;
        };

        for routes in self
            .registry
            .active(Category::Commands, line.active_plugins())
        {
            for record in &routes.records {
                let RouteMatcher::Command(command) = &record.matcher else {
                    continue;
                };
                if self.is_command(first, command) {
                    info!("Command: {}.{}", routes.slug, record.name);
                    let args = rest.iter().map(|token| token.to_string()).collect();
                    matches.push(Match {
                        routes,
                        record,
                        args: RouteArgs::from_args(args),
                    });
                }
            }
        }
    }

    fn match_regex_commands<'a>(&'a self, line: &Line, matches: &mut Vec<Match<'a>>) {
        let tokens: Vec<&str> = line.text.split_whitespace().collect();
        let Some((first, rest)) = tokens.split_first() else {
            return;
        };
        let remainder = rest.join(" ");

        for routes in self
            .registry
            .active(Category::RegexCommands, line.active_plugins())
        {
            for record in &routes.records {
                let RouteMatcher::RegexCommand { command, pattern } = &record.matcher else {
                    continue;
                };
                if !self.is_command(first, command) {
                    continue;
                }
                if let Some(args) = match_pattern(pattern, &remainder) {
                    info!("Command+Match: {}.{}", routes.slug, record.name);
                    matches.push(Match {
                        routes,
                        record,
                        args,
                    });
                }
            }
        }
    }

    /// `token == prefix + command`, exactly.
    fn is_command(&self, token: &str, command: &str) -> bool {
        token
            .strip_prefix(&*self.command_prefix)
            .is_some_and(|word| word == command)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("mode", &self.executor.mode())
            .field("command_prefix", &self.command_prefix)
            .finish()
    }
}
