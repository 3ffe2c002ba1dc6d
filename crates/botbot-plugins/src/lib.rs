//! # BotBot Plugins
//!
//! The plugins shipped with the runner. Each is a unit struct implementing
//! [`Plugin`]; [`bundled`] returns all of them for registration.
//!
//! | slug        | what it does                                  |
//! |-------------|-----------------------------------------------|
//! | `metabrain` | remembers and recalls arbitrary key/values    |
//! | `motivate`  | tells people they are doing good work         |
//! | `vote`      | runs proposal votes in a channel              |

use std::sync::Arc;

use botbot_framework::Plugin;

pub mod metabrain;
pub mod motivate;
pub mod vote;

pub use metabrain::Metabrain;
pub use motivate::Motivate;
pub use vote::Vote;

/// Every bundled plugin.
pub fn bundled() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(Metabrain), Arc::new(Motivate), Arc::new(Vote)]
}
