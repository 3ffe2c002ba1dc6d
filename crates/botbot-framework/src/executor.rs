//! The execution sandbox.
//!
//! Every matched route becomes one [`Invocation`]. Running it calls the
//! handler under a timer, catches errors and panics at the call boundary and
//! forwards any reply to the response sink. How invocations are scheduled is
//! up to the [`Executor`]:
//!
//! - [`InlineExecutor`] runs each invocation to completion before the
//!   dispatcher moves on.
//! - [`TaskExecutor`] spawns each invocation as its own task and returns
//!   immediately; replies arrive in completion order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use botbot_core::{ChannelIdentity, Line, Reply, ResponseSink};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::context::PluginContext;
use crate::metrics::plugin_timer;
use crate::routing::{BoxedHandler, RouteArgs};

/// How matched handlers are scheduled. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Run each handler to completion before dispatching the next.
    #[default]
    Inline,
    /// Run each handler as an independent task.
    Task,
}

impl ExecutionMode {
    /// Builds the matching executor.
    pub fn executor(self) -> Arc<dyn Executor> {
        match self {
            ExecutionMode::Inline => Arc::new(InlineExecutor),
            ExecutionMode::Task => Arc::new(TaskExecutor::new()),
        }
    }
}

/// What became of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The handler replied and the reply was delivered.
    Replied,
    /// The handler returned nothing to send.
    Silent,
    /// The handler failed, panicked, or its reply could not be delivered.
    Failed,
}

/// One matched handler, ready to run.
pub struct Invocation {
    pub(crate) slug: Arc<str>,
    pub(crate) route: Arc<str>,
    pub(crate) handler: BoxedHandler,
    pub(crate) ctx: PluginContext,
    pub(crate) channel: Arc<ChannelIdentity>,
    pub(crate) line: Arc<Line>,
    pub(crate) args: RouteArgs,
    pub(crate) sink: Arc<dyn ResponseSink>,
}

impl Invocation {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Runs the handler and delivers its reply.
    ///
    /// Never fails: handler errors and panics are logged with the event
    /// context and nothing is sent.
    pub async fn run(self) -> InvocationOutcome {
        let Invocation {
            slug,
            route,
            handler,
            ctx,
            channel,
            line,
            args,
            sink,
        } = self;

        let started = Instant::now();
        let call_line = Arc::clone(&line);
        let result = AssertUnwindSafe(async move { handler(ctx, call_line, args).await })
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();
        ::metrics::histogram!(plugin_timer(&slug)).record(elapsed.as_secs_f64() * 1000.0);
        debug!(plugin = %slug, route = %route, elapsed_ms = elapsed.as_millis() as u64, "Invocation finished");

        let reply = match result {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => return InvocationOutcome::Silent,
            Ok(Err(err)) => {
                error!(
                    plugin = %slug,
                    route = %route,
                    chatbot_id = line.chatbot_id,
                    channel = %line.channel_name,
                    user = %line.user,
                    text = %line.full_text,
                    error = ?err,
                    "Plugin invocation failed"
                );
                return InvocationOutcome::Failed;
            }
            Err(panic) => {
                error!(
                    plugin = %slug,
                    route = %route,
                    chatbot_id = line.chatbot_id,
                    channel = %line.channel_name,
                    user = %line.user,
                    text = %line.full_text,
                    panic = %panic_message(panic.as_ref()),
                    "Plugin panicked"
                );
                return InvocationOutcome::Failed;
            }
        };

        if reply.text().is_empty() {
            return InvocationOutcome::Silent;
        }

        match sink.send(&channel, address_reply(&line, reply)).await {
            Ok(()) => InvocationOutcome::Replied,
            Err(err) => {
                error!(plugin = %slug, route = %route, channel = %channel.name, "Failed to deliver reply: {err}");
                InvocationOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("slug", &self.slug)
            .field("route", &self.route)
            .field("args", &self.args)
            .finish()
    }
}

/// Private lines are answered privately, to the sender.
fn address_reply(line: &Line, reply: Reply) -> Reply {
    match reply {
        Reply::Text(msg) if line.is_private() => Reply::Private {
            nick: line.reply_target.clone(),
            msg,
        },
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Schedules invocations.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Runs or schedules one invocation.
    async fn execute(&self, invocation: Invocation);

    /// Waits until every scheduled invocation has finished.
    async fn drain(&self);

    fn mode(&self) -> ExecutionMode;
}

/// Runs invocations on the caller's task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

#[async_trait]
impl Executor for InlineExecutor {
    async fn execute(&self, invocation: Invocation) {
        invocation.run().await;
    }

    async fn drain(&self) {}

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Inline
    }
}

/// Spawns each invocation as a tracked task.
#[derive(Debug, Default, Clone)]
pub struct TaskExecutor {
    tracker: TaskTracker,
}

impl TaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

#[async_trait]
impl Executor for TaskExecutor {
    async fn execute(&self, invocation: Invocation) {
        self.tracker.spawn(invocation.run());
    }

    async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{HandlerResult, firehose};
    use botbot_core::{MemorySink, MemoryStore, NetworkIdentity, RawPacket};

    fn line(channel: &str) -> Arc<Line> {
        let packet = RawPacket {
            content: "hello".into(),
            user: "alice".into(),
            chatbot_id: 1,
            raw: String::new(),
            channel: channel.into(),
            command: "PRIVMSG".into(),
            host: String::new(),
            received: chrono::Utc::now(),
        };
        let network = NetworkIdentity {
            id: 1,
            nick: "botbot".into(),
            server: None,
        };
        Arc::new(Line::new(
            packet,
            Some(network),
            Some(ChannelIdentity::new(1, channel)),
        ))
    }

    fn invocation(line: Arc<Line>, handler: BoxedHandler, sink: Arc<MemorySink>) -> Invocation {
        let channel = Arc::new(ChannelIdentity::new(1, line.channel_name.clone()));
        let ctx = PluginContext::new(
            Arc::from("test"),
            Arc::clone(&channel),
            1,
            Arc::from("!"),
            Vec::<crate::ConfigField>::new().into(),
            Arc::new(MemoryStore::new()),
        );
        Invocation {
            slug: Arc::from("test"),
            route: Arc::from("route"),
            handler,
            ctx,
            channel,
            line,
            args: RouteArgs::default(),
            sink,
        }
    }

    fn boxed<F, Fut>(f: F) -> BoxedHandler
    where
        F: Fn(PluginContext, Arc<Line>, RouteArgs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
    {
        firehose().handler("test", f).handler
    }

    fn replying(text: &'static str) -> BoxedHandler {
        boxed(move |_, _, _| async move { HandlerResult::Ok(Some(Reply::from(text))) })
    }

    #[tokio::test]
    async fn test_reply_is_delivered() {
        let sink = Arc::new(MemorySink::new());
        let outcome = invocation(line("#rust"), replying("hi"), sink.clone()).run().await;
        assert_eq!(outcome, InvocationOutcome::Replied);
        assert_eq!(sink.sent()[0].reply, Reply::Text("hi".into()));
    }

    #[tokio::test]
    async fn test_private_line_gets_private_reply() {
        let sink = Arc::new(MemorySink::new());
        invocation(line("botbot"), replying("psst"), sink.clone()).run().await;
        assert_eq!(sink.sent()[0].reply, Reply::private("alice", "psst"));
    }

    #[tokio::test]
    async fn test_error_sends_nothing() {
        let sink = Arc::new(MemorySink::new());
        let failing = boxed(|_, _, _| async { HandlerResult::Err(anyhow::anyhow!("boom")) });
        let outcome = invocation(line("#rust"), failing, sink.clone()).run().await;
        assert_eq!(outcome, InvocationOutcome::Failed);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let sink = Arc::new(MemorySink::new());
        let panicking = boxed(|_, _, _| async {
            if true {
                panic!("handler exploded");
            }
            HandlerResult::Ok(None)
        });
        let outcome = invocation(line("#rust"), panicking, sink.clone()).run().await;
        assert_eq!(outcome, InvocationOutcome::Failed);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_reply_is_silent() {
        let sink = Arc::new(MemorySink::new());
        let outcome = invocation(line("#rust"), replying(""), sink.clone()).run().await;
        assert_eq!(outcome, InvocationOutcome::Silent);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_task_executor_drains() {
        let sink = Arc::new(MemorySink::new());
        let executor = TaskExecutor::new();
        for _ in 0..3 {
            executor
                .execute(invocation(line("#rust"), replying("done"), sink.clone()))
                .await;
        }
        executor.drain().await;
        assert_eq!(sink.texts(), ["done", "done", "done"]);
        assert_eq!(executor.in_flight(), 0);
        assert_eq!(executor.mode(), ExecutionMode::Task);
    }

    #[test]
    fn test_execution_mode_serde() {
        let mode: ExecutionMode = serde_json::from_str("\"task\"").unwrap();
        assert_eq!(mode, ExecutionMode::Task);
        assert_eq!(ExecutionMode::default(), ExecutionMode::Inline);
        assert_eq!(mode.executor().mode(), ExecutionMode::Task);
    }
}
