//! `!m <who>`: tells someone they are doing good work.

use std::sync::Arc;

use botbot_core::{Line, Reply};
use botbot_framework::{
    HandlerResult, Plugin, PluginContext, Route, RouteArgs, listens_to_command, module_slug,
};

/// Notifies people of the excellent work they are doing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Motivate;

impl Motivate {
    async fn motivate(self: Arc<Self>, _ctx: PluginContext, _line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        if args.args().is_empty() {
            return Ok(None);
        }
        let worker = args.args().join(" ");
        Ok(Some(Reply::from(format!("You're doing good work, {worker}!"))))
    }
}

impl Plugin for Motivate {
    fn slug(&self) -> &'static str {
        module_slug(module_path!())
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        vec![listens_to_command("m").bind("motivate", &self, Self::motivate)]
    }

    fn description(&self) -> Option<&'static str> {
        Some("Let me know who is doing good work with `m <nick>` and I will tell them.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_framework::testing::TestApp;

    fn app() -> TestApp {
        TestApp::new(Arc::new(Motivate)).unwrap()
    }

    #[tokio::test]
    async fn test_motivate() {
        assert_eq!(
            app().respond("!m BotBot & that other guy").await,
            ["You're doing good work, BotBot & that other guy!"]
        );
    }

    #[tokio::test]
    async fn test_command_must_lead() {
        assert!(app().respond("shouldn't !m === false?").await.is_empty());
        assert!(app().respond("!mm bob").await.is_empty());
    }

    #[test]
    fn test_no_arguments_is_silent() {
        assert!(tokio_test::block_on(app().respond("!m")).is_empty());
        assert_eq!(Motivate.slug(), "motivate");
    }
}
