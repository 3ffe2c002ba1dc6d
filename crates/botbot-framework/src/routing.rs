//! Routing categories, rules and route declarations.
//!
//! Plugins declare their routes explicitly. Each [`Route`] binds one handler
//! function to exactly one category:
//!
//! ```rust,ignore
//! fn routes(self: Arc<Self>) -> Vec<Route> {
//!     vec![
//!         listens_to_command("m").bind("motivate", &self, Self::motivate),
//!         listens_to_regex_command("recall", r"(?P<key>.*)")
//!             .bind("recall", &self, Self::recall),
//!     ]
//! }
//! ```
//!
//! | Category         | Rule                     | Handler arguments        |
//! |------------------|--------------------------|--------------------------|
//! | `firehose`       | none                     | none                     |
//! | `messages`       | regex on effective text  | named capture groups     |
//! | `mentions`       | regex, direct lines only | named capture groups     |
//! | `commands`       | literal command word     | remaining tokens         |
//! | `regex_commands` | command word + regex     | named capture groups     |
//!
//! Regexes are anchored at the start of the text and matched
//! case-insensitively. Command words are matched exactly.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use botbot_core::{Line, Reply};
use futures::FutureExt;
use futures::future::BoxFuture;
use regex::{Regex, RegexBuilder};

use crate::context::PluginContext;

/// What a handler body returns. `Ok(None)` sends nothing.
pub type HandlerResult = anyhow::Result<Option<Reply>>;

/// A type-erased handler function.
pub type BoxedHandler =
    Arc<dyn Fn(PluginContext, Arc<Line>, RouteArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// The five routing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Every event, including joins, parts and quits.
    Firehose,
    /// Every user message.
    Messages,
    /// User messages addressed to the bot.
    Mentions,
    /// Prefixed commands with positional arguments.
    Commands,
    /// Prefixed commands whose arguments are parsed by a regex.
    RegexCommands,
}

impl Category {
    /// All categories in dispatch order.
    pub const ALL: [Category; 5] = [
        Category::Firehose,
        Category::Messages,
        Category::Mentions,
        Category::Commands,
        Category::RegexCommands,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Firehose => "firehose",
            Category::Messages => "messages",
            Category::Mentions => "mentions",
            Category::Commands => "commands",
            Category::RegexCommands => "regex_commands",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A route's matching rule, as declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRule {
    /// No rule; the route sees everything.
    Always,
    /// A regex matched against the effective text.
    Pattern(String),
    /// A literal command word (without prefix).
    Command(String),
    /// A command word plus a regex over the remaining arguments.
    RegexCommand { command: String, pattern: String },
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteRule::Always => f.write_str("*"),
            RouteRule::Pattern(pattern) => write!(f, "{pattern}"),
            RouteRule::Command(command) => write!(f, "{command}"),
            RouteRule::RegexCommand { command, pattern } => write!(f, "({command}, {pattern})"),
        }
    }
}

/// Arguments extracted by a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteArgs {
    captures: HashMap<String, String>,
    args: Vec<String>,
}

impl RouteArgs {
    /// Arguments for a `commands` route.
    pub fn from_args(args: Vec<String>) -> Self {
        Self {
            captures: HashMap::new(),
            args,
        }
    }

    /// Arguments from named capture groups. Groups that did not participate
    /// in the match are left out.
    pub fn from_captures(regex: &Regex, captures: &regex::Captures<'_>) -> Self {
        let captures = regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                captures
                    .name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Self {
            captures,
            args: Vec::new(),
        }
    }

    /// A named capture group, if it matched.
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }

    /// A named capture group, or `""` if it did not match.
    pub fn capture_or_empty(&self, name: &str) -> &str {
        self.capture(name).unwrap_or("")
    }

    /// Positional arguments of a `commands` route.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Compiles a route regex with start-anchored, case-insensitive semantics.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:{pattern})"))
        .case_insensitive(true)
        .build()
}

/// Matches `text` against a compiled route regex.
pub fn match_pattern(regex: &Regex, text: &str) -> Option<RouteArgs> {
    regex
        .captures(text)
        .map(|captures| RouteArgs::from_captures(regex, &captures))
}

/// A declared route: one handler bound into one category.
pub struct Route {
    pub(crate) name: String,
    pub(crate) category: Category,
    pub(crate) rule: RouteRule,
    pub(crate) handler: BoxedHandler,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn rule(&self) -> &RouteRule {
        &self.rule
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("rule", &self.rule)
            .finish()
    }
}

/// A category and rule waiting for a handler.
#[derive(Debug, Clone)]
#[must_use = "an unbound route does nothing until a handler is bound"]
pub struct UnboundRoute {
    category: Category,
    rule: RouteRule,
}

impl UnboundRoute {
    /// Binds a method of a shared plugin value.
    pub fn bind<P, F, Fut>(self, name: impl Into<String>, plugin: &Arc<P>, f: F) -> Route
    where
        P: Send + Sync + 'static,
        F: Fn(Arc<P>, PluginContext, Arc<Line>, RouteArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let plugin = Arc::clone(plugin);
        self.handler(name, move |ctx, line, args| {
            f(Arc::clone(&plugin), ctx, line, args)
        })
    }

    /// Binds a free function or closure.
    pub fn handler<F, Fut>(self, name: impl Into<String>, f: F) -> Route
    where
        F: Fn(PluginContext, Arc<Line>, RouteArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: BoxedHandler = Arc::new(
            move |ctx: PluginContext, line: Arc<Line>, args: RouteArgs| -> BoxFuture<'static, HandlerResult> {
                f(ctx, line, args).boxed()
            },
        );
        Route {
            name: name.into(),
            category: self.category,
            rule: self.rule,
            handler,
        }
    }
}

/// Every event on the channel, no rule.
pub fn firehose() -> UnboundRoute {
    UnboundRoute {
        category: Category::Firehose,
        rule: RouteRule::Always,
    }
}

/// Every user message whose effective text matches `pattern`.
pub fn listens_to_all(pattern: impl Into<String>) -> UnboundRoute {
    UnboundRoute {
        category: Category::Messages,
        rule: RouteRule::Pattern(pattern.into()),
    }
}

/// Direct mentions whose effective text matches `pattern`.
pub fn listens_to_mentions(pattern: impl Into<String>) -> UnboundRoute {
    UnboundRoute {
        category: Category::Mentions,
        rule: RouteRule::Pattern(pattern.into()),
    }
}

/// The command `<prefix><command>`, arguments passed as tokens.
pub fn listens_to_command(command: impl Into<String>) -> UnboundRoute {
    UnboundRoute {
        category: Category::Commands,
        rule: RouteRule::Command(command.into()),
    }
}

/// The command `<prefix><command>`, arguments parsed by `pattern`.
pub fn listens_to_regex_command(
    command: impl Into<String>,
    pattern: impl Into<String>,
) -> UnboundRoute {
    UnboundRoute {
        category: Category::RegexCommands,
        rule: RouteRule::RegexCommand {
            command: command.into(),
            pattern: pattern.into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_anchored_and_case_insensitive() {
        let regex = compile_pattern(r"hello (?P<who>\w+)").unwrap();
        let args = match_pattern(&regex, "HELLO world and more").unwrap();
        assert_eq!(args.capture("who"), Some("world"));
        assert!(match_pattern(&regex, "oh hello world").is_none());
    }

    #[test]
    fn test_alternation_stays_anchored() {
        let regex = compile_pattern("a|b").unwrap();
        assert!(match_pattern(&regex, "b").is_some());
        assert!(match_pattern(&regex, "cb").is_none());
    }

    #[test]
    fn test_unmatched_group_is_absent() {
        let regex = compile_pattern(r"(?P<name>\w+)?\s*(\[(?P<options>.*)\])?").unwrap();
        let args = match_pattern(&regex, "[a, b]").unwrap();
        assert_eq!(args.capture("name"), None);
        assert_eq!(args.capture_or_empty("name"), "");
        assert_eq!(args.capture("options"), Some("a, b"));
    }

    #[test]
    fn test_route_builders() {
        let route = listens_to_regex_command("recall", "(?P<key>.*)")
            .handler("recall", |_ctx, _line, _args| async { HandlerResult::Ok(None) });
        assert_eq!(route.category(), Category::RegexCommands);
        assert_eq!(route.name(), "recall");
        assert_eq!(route.rule().to_string(), "(recall, (?P<key>.*))");

        assert_eq!(firehose().rule, RouteRule::Always);
        assert_eq!(listens_to_mentions("x").category, Category::Mentions);
    }

    #[test]
    fn test_category_order() {
        let names: Vec<_> = Category::ALL.iter().map(Category::as_str).collect();
        assert_eq!(
            names,
            ["firehose", "messages", "mentions", "commands", "regex_commands"]
        );
        assert_eq!(Category::RegexCommands.index(), 4);
    }
}
