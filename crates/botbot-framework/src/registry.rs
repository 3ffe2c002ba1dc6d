//! The static routing table.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use regex::Regex;
use tracing::info;

use crate::error::{FrameworkError, FrameworkResult};
use crate::plugin::{ConfigField, Plugin};
use crate::routing::{BoxedHandler, Category, RouteRule, compile_pattern};

/// A compiled routing rule.
#[derive(Debug, Clone)]
pub enum RouteMatcher {
    Always,
    Pattern(Regex),
    Command(String),
    RegexCommand { command: String, pattern: Regex },
}

/// One bound handler in a category table.
#[derive(Clone)]
pub struct RouteRecord {
    pub(crate) name: Arc<str>,
    pub(crate) matcher: RouteMatcher,
    pub(crate) handler: BoxedHandler,
}

impl RouteRecord {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &RouteMatcher {
        &self.matcher
    }
}

impl std::fmt::Debug for RouteRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRecord")
            .field("name", &self.name)
            .field("matcher", &self.matcher)
            .finish()
    }
}

/// A registered plugin and its per-plugin metadata.
#[derive(Clone)]
pub struct PluginEntry {
    pub(crate) slug: Arc<str>,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) schema: Arc<[ConfigField]>,
}

impl PluginEntry {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn schema(&self) -> &[ConfigField] {
        &self.schema
    }
}

/// The routes of one plugin within one category.
#[derive(Debug, Clone)]
pub struct PluginRoutes {
    pub(crate) slug: Arc<str>,
    pub(crate) schema: Arc<[ConfigField]>,
    pub(crate) records: Vec<RouteRecord>,
}

impl PluginRoutes {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn schema(&self) -> &[ConfigField] {
        &self.schema
    }

    pub fn records(&self) -> &[RouteRecord] {
        &self.records
    }
}

/// Maps each [`Category`] to the plugins bound into it.
///
/// Built once at startup and read-only afterwards. Within a category,
/// plugins and their routes keep insertion order.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginEntry>,
    tables: [Vec<PluginRoutes>; 5],
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin, compiling its route rules.
    ///
    /// Fails without modifying the registry if the slug is taken, a route
    /// name repeats, a command word is malformed or a regex does not compile.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> FrameworkResult<()> {
        let slug: Arc<str> = Arc::from(plugin.slug());
        if self.contains(&slug) {
            return Err(FrameworkError::DuplicatePlugin(slug.to_string()));
        }

        let mut seen = HashSet::new();
        let mut bound: [Vec<RouteRecord>; 5] = Default::default();

        for route in Arc::clone(&plugin).routes() {
            if !seen.insert(route.name.clone()) {
                return Err(FrameworkError::DuplicateRoute {
                    plugin: slug.to_string(),
                    route: route.name,
                });
            }

            let matcher = compile_rule(&slug, &route.name, &route.rule)?;
            info!(
                plugin = %slug,
                route = %route.name,
                category = %route.category,
                rule = %route.rule,
                "Route: {}.{} listens to {} for rule {}",
                slug, route.name, route.category, route.rule
            );

            bound[route.category.index()].push(RouteRecord {
                name: Arc::from(route.name.as_str()),
                matcher,
                handler: route.handler,
            });
        }

        let schema: Arc<[ConfigField]> = plugin.config_schema().into();
        for (table, records) in self.tables.iter_mut().zip(bound) {
            if !records.is_empty() {
                table.push(PluginRoutes {
                    slug: Arc::clone(&slug),
                    schema: Arc::clone(&schema),
                    records,
                });
            }
        }

        self.plugins.push(PluginEntry {
            slug,
            plugin,
            schema,
        });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> FrameworkResult<Self> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.plugins.iter().any(|entry| &*entry.slug == slug)
    }

    pub fn plugin(&self, slug: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|entry| &*entry.slug == slug)
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.iter()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Every plugin bound into `category`, in registration order.
    pub fn table(&self, category: Category) -> &[PluginRoutes] {
        &self.tables[category.index()]
    }

    /// Plugins bound into `category` that are also in `active`, in
    /// registration order.
    pub fn active<'a, 's>(
        &'a self,
        category: Category,
        active: &'s BTreeSet<String>,
    ) -> impl Iterator<Item = &'a PluginRoutes> + 's
    where
        'a: 's,
    {
        self.table(category)
            .iter()
            .filter(move |routes| active.contains(&*routes.slug))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slugs: Vec<&str> = self.plugins.iter().map(|entry| &*entry.slug).collect();
        f.debug_struct("PluginRegistry")
            .field("plugins", &slugs)
            .finish()
    }
}

fn compile_rule(slug: &str, route: &str, rule: &RouteRule) -> FrameworkResult<RouteMatcher> {
    let invalid_pattern = |source| FrameworkError::InvalidPattern {
        plugin: slug.to_string(),
        route: route.to_string(),
        source,
    };
    let check_command = |command: &str| {
        if command.is_empty() || command.chars().any(char::is_whitespace) {
            Err(FrameworkError::InvalidCommand {
                plugin: slug.to_string(),
                route: route.to_string(),
                command: command.to_string(),
            })
        } else {
            Ok(())
        }
    };

    Ok(match rule {
        RouteRule::Always => RouteMatcher::Always,
        RouteRule::Pattern(pattern) => {
            RouteMatcher::Pattern(compile_pattern(pattern).map_err(invalid_pattern)?)
        }
        RouteRule::Command(command) => {
            check_command(command)?;
            RouteMatcher::Command(command.clone())
        }
        RouteRule::RegexCommand { command, pattern } => {
            check_command(command)?;
            RouteMatcher::RegexCommand {
                command: command.clone(),
                pattern: compile_pattern(pattern).map_err(invalid_pattern)?,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{
        HandlerResult, Route, firehose, listens_to_all, listens_to_command,
        listens_to_regex_command,
    };

    async fn noop(
        _ctx: crate::PluginContext,
        _line: Arc<botbot_core::Line>,
        _args: crate::RouteArgs,
    ) -> HandlerResult {
        Ok(None)
    }

    struct Fixture {
        slug: &'static str,
        routes: fn() -> Vec<Route>,
    }

    impl Plugin for Fixture {
        fn slug(&self) -> &'static str {
            self.slug
        }

        fn routes(self: Arc<Self>) -> Vec<Route> {
            (self.routes)()
        }
    }

    fn fixture(slug: &'static str, routes: fn() -> Vec<Route>) -> Arc<dyn Plugin> {
        Arc::new(Fixture { slug, routes })
    }

    #[test]
    fn test_routes_land_in_their_categories() {
        let registry = PluginRegistry::new()
            .with(fixture("logger", || vec![firehose().handler("logit", noop)]))
            .unwrap()
            .with(fixture("brain", || {
                vec![
                    listens_to_command("rem").handler("rem", noop),
                    listens_to_regex_command("recall", "(?P<key>.*)").handler("recall", noop),
                    listens_to_command("forget").handler("forget", noop),
                ]
            }))
            .unwrap();

        assert_eq!(registry.plugin_count(), 2);
        assert_eq!(registry.table(Category::Firehose).len(), 1);
        assert!(registry.table(Category::Messages).is_empty());

        let commands = registry.table(Category::Commands);
        assert_eq!(commands[0].slug(), "brain");
        let names: Vec<_> = commands[0].records().iter().map(RouteRecord::name).collect();
        assert_eq!(names, ["rem", "forget"]);
        assert_eq!(registry.table(Category::RegexCommands).len(), 1);
    }

    #[test]
    fn test_active_filters_by_slug() {
        let registry = PluginRegistry::new()
            .with(fixture("a", || vec![listens_to_all(".*").handler("a", noop)]))
            .unwrap()
            .with(fixture("b", || vec![listens_to_all(".*").handler("b", noop)]))
            .unwrap();

        let active: BTreeSet<String> = ["b".to_string(), "zzz".to_string()].into();
        let slugs: Vec<_> = registry
            .active(Category::Messages, &active)
            .map(PluginRoutes::slug)
            .collect();
        assert_eq!(slugs, ["b"]);
    }

    #[test]
    fn test_duplicate_slug_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(fixture("a", Vec::new)).unwrap();
        let err = registry.register(fixture("a", Vec::new)).unwrap_err();
        assert!(matches!(err, FrameworkError::DuplicatePlugin(ref slug) if slug == "a"));
    }

    #[test]
    fn test_duplicate_route_name_is_rejected() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .register(fixture("a", || {
                vec![
                    listens_to_command("x").handler("same", noop),
                    listens_to_all("x").handler("same", noop),
                ]
            }))
            .unwrap_err();
        assert!(matches!(err, FrameworkError::DuplicateRoute { .. }));
        assert!(!registry.contains("a"));
        assert!(registry.table(Category::Commands).is_empty());
    }

    #[test]
    fn test_invalid_rules_are_rejected() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .register(fixture("a", || vec![listens_to_all("(unclosed").handler("x", noop)]))
            .unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidPattern { .. }));

        let err = registry
            .register(fixture("b", || vec![listens_to_command("two words").handler("x", noop)]))
            .unwrap_err();
        assert!(matches!(err, FrameworkError::InvalidCommand { .. }));
        assert_eq!(registry.plugin_count(), 0);
    }
}
