//! Remembers and recalls arbitrary information.
//!
//! ```text
//! !remember thing=stuff I need to remember
//! !recall thing
//! !forget thing
//! ```

use std::sync::Arc;

use botbot_core::{Line, Reply};
use botbot_framework::{
    HandlerResult, Plugin, PluginContext, Route, RouteArgs, listens_to_regex_command,
    module_slug,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Metabrain;

impl Metabrain {
    async fn remember(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        let key = args.capture_or_empty("key");
        ctx.store(key, args.capture_or_empty("value")).await?;
        Ok(Some(Reply::from(format!(
            "I will remember \"{key}\" for you {}.",
            line.user
        ))))
    }

    async fn recall(self: Arc<Self>, ctx: PluginContext, _line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        let key = args.capture_or_empty("key");
        let reply = match ctx.retrieve(key).await? {
            Some(value) if !value.is_empty() => value,
            _ => format!("I'm sorry, I don't remember \"{key}\"."),
        };
        Ok(Some(Reply::from(reply)))
    }

    async fn forget(self: Arc<Self>, ctx: PluginContext, _line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        let key = args.capture_or_empty("key");
        ctx.delete(key).await?;
        Ok(Some(Reply::from(format!("What was \"{key}\" all about?"))))
    }
}

impl Plugin for Metabrain {
    fn slug(&self) -> &'static str {
        module_slug(module_path!())
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        vec![
            listens_to_regex_command("remember", r"(?P<key>.+?)=\s*(?P<value>.*)")
                .bind("remember", &self, Self::remember),
            listens_to_regex_command("recall", r"(?P<key>.*)").bind("recall", &self, Self::recall),
            listens_to_regex_command("forget", r"(?P<key>.*)").bind("forget", &self, Self::forget),
        ]
    }

    fn description(&self) -> Option<&'static str> {
        Some("Remembers things: `remember thing=stuff`, `recall thing`, `forget thing`.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_core::KeyValueStore;
    use botbot_framework::testing::TestApp;

    #[tokio::test]
    async fn test_remember_recall_forget() {
        let app = TestApp::new(Arc::new(Metabrain)).unwrap();
        assert_eq!(
            app.respond("!remember the cake=is a lie").await,
            ["I will remember \"the cake\" for you repl_user."]
        );
        assert_eq!(
            app.store().get("metabrain:the cake").await.unwrap().as_deref(),
            Some("is a lie")
        );
        assert_eq!(app.respond("!recall the cake").await, ["is a lie"]);
        assert_eq!(
            app.respond("!forget the cake").await,
            ["What was \"the cake\" all about?"]
        );
        assert_eq!(
            app.respond("!recall the cake").await,
            ["I'm sorry, I don't remember \"the cake\"."]
        );
    }

    #[tokio::test]
    async fn test_remember_needs_equals_sign() {
        let app = TestApp::new(Arc::new(Metabrain)).unwrap();
        assert!(app.respond("!remember nothing to see").await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_value_reads_as_forgotten() {
        let app = TestApp::new(Arc::new(Metabrain)).unwrap();
        app.respond_as("bob", "!remember x=").await;
        assert_eq!(
            app.respond("!recall x").await,
            ["I'm sorry, I don't remember \"x\"."]
        );
    }
}
