//! Session mode snapshot
//!
//! The session host (lock screen, greeter, regular user session) decides
//! what the menus may offer. Consumers get a copy and are told when it
//! changes through `session_updated`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Settings actions may be shown
    pub allow_settings: bool,
    /// The session has application windows (not a lock screen or greeter)
    pub has_windows: bool,
    pub is_locked: bool,
    pub is_greeter: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            allow_settings: true,
            has_windows: true,
            is_locked: false,
            is_greeter: false,
        }
    }
}

impl SessionPolicy {
    /// Policy of the login screen
    pub fn greeter() -> Self {
        Self {
            allow_settings: false,
            has_windows: false,
            is_locked: false,
            is_greeter: true,
        }
    }

    /// Policy of the lock screen
    pub fn locked() -> Self {
        Self {
            allow_settings: false,
            has_windows: false,
            is_locked: true,
            is_greeter: false,
        }
    }
}
