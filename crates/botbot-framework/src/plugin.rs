//! The plugin declaration surface.

use std::sync::Arc;

use serde_json::Value;

use crate::routing::Route;

/// A chat plugin.
///
/// Plugins are stateless values. Everything that must survive between
/// invocations goes through the [`PluginContext`](crate::PluginContext)
/// store, namespaced by [`slug`](Plugin::slug).
///
/// ```rust,ignore
/// struct Motivate;
///
/// impl Plugin for Motivate {
///     fn slug(&self) -> &'static str {
///         module_slug(module_path!())
///     }
///
///     fn routes(self: Arc<Self>) -> Vec<Route> {
///         vec![listens_to_command("m").bind("motivate", &self, Self::motivate)]
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Stable short identifier, used for routing and store namespacing.
    fn slug(&self) -> &'static str;

    /// The plugin's routes. Called once, at registration.
    fn routes(self: Arc<Self>) -> Vec<Route>;

    /// Configuration fields understood by this plugin.
    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// Help text for users.
    fn description(&self) -> Option<&'static str> {
        None
    }
}

/// The last path segment of a module path, e.g. `"vote"` for
/// `"botbot_plugins::vote"`.
pub fn module_slug(module_path: &'static str) -> &'static str {
    module_path.rsplit("::").next().unwrap_or(module_path)
}

/// One named configuration field of a plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigField {
    pub name: String,
    pub help: Option<String>,
    pub default: Option<Value>,
    pub required: bool,
}

impl ConfigField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: None,
            default: None,
            required: false,
        }
    }

    /// Value used when a channel does not set this field.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_slug() {
        assert_eq!(module_slug("botbot_plugins::vote"), "vote");
        assert_eq!(module_slug("motivate"), "motivate");
    }

    #[test]
    fn test_config_field_builder() {
        let field = ConfigField::new("options_separator")
            .default(",")
            .help("Separator between options");
        assert_eq!(field.default, Some(json!(",")));
        assert!(!field.required);

        let token = ConfigField::new("token").required();
        assert!(token.required);
        assert!(token.default.is_none());
    }
}
