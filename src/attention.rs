//! Window attention notifications
//!
//! Windows asking for attention (`_NET_WM_STATE_DEMANDS_ATTENTION` or the
//! ICCCM urgency hint) while unfocused get a notification. It follows the
//! window's title and goes away once the window is focused, unmanaged or
//! stops asking.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::notify::Notification;

bitflags! {
    /// Window state relevant to attention requests
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct WindowFlags: u32 {
        const FOCUSED           = 1 << 0;
        const SKIP_TASKBAR      = 1 << 1;
        const DEMANDS_ATTENTION = 1 << 2;
        const URGENT            = 1 << 3;
    }
}

impl WindowFlags {
    pub fn wants_attention(&self) -> bool {
        self.intersects(Self::DEMANDS_ATTENTION | Self::URGENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    /// Name of the application whose startup sequence the window completes
    #[serde(default)]
    pub startup_app: Option<String>,
    #[serde(default)]
    pub flags: WindowFlags,
}

/// What the window manager reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowEvent {
    /// Attention flags were raised
    DemandsAttention { window: WindowInfo },
    TitleChanged { window: WindowId, title: String },
    /// Attention flags were cleared
    AttentionWithdrawn { window: WindowId },
    Focused { window: WindowId },
    Unmanaged { window: WindowId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttentionAction {
    Show { window: WindowId, notification: Notification },
    /// Replace the content of the window's notification
    Update { window: WindowId, notification: Notification },
    Dismiss { window: WindowId },
    /// The user clicked the notification
    Activate { window: WindowId },
}

#[derive(Debug, Clone)]
struct Pending {
    app: Option<String>,
    notification: Notification,
}

/// Tracks one notification per window asking for attention
#[derive(Debug, Default)]
pub struct WindowAttention {
    pending: HashMap<WindowId, Pending>,
}

fn notification_for(app: Option<&str>, title: &str) -> Notification {
    let summary = app.unwrap_or(title);
    Notification::new(app.unwrap_or("Area"), summary, &format!("“{title}” is ready"))
}

impl WindowAttention {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, window: WindowId) -> bool {
        self.pending.contains_key(&window)
    }

    pub fn handle_event(&mut self, event: &WindowEvent) -> Option<AttentionAction> {
        match event {
            WindowEvent::DemandsAttention { window } => self.demands_attention(window),
            WindowEvent::TitleChanged { window, title } => {
                let pending = self.pending.get_mut(window)?;
                pending.notification = notification_for(pending.app.as_deref(), title);
                Some(AttentionAction::Update {
                    window: *window,
                    notification: pending.notification.clone(),
                })
            }
            WindowEvent::AttentionWithdrawn { window }
            | WindowEvent::Focused { window }
            | WindowEvent::Unmanaged { window } => {
                self.pending.remove(window)?;
                Some(AttentionAction::Dismiss { window: *window })
            }
        }
    }

    fn demands_attention(&mut self, window: &WindowInfo) -> Option<AttentionAction> {
        if !window.flags.wants_attention()
            || window.flags.intersects(WindowFlags::FOCUSED | WindowFlags::SKIP_TASKBAR)
        {
            return None;
        }
        if self.pending.contains_key(&window.id) {
            debug!("Window {:?} already has an attention notification", window.id);
            return None;
        }

        let notification = notification_for(window.startup_app.as_deref(), &window.title);
        self.pending.insert(
            window.id,
            Pending {
                app: window.startup_app.clone(),
                notification: notification.clone(),
            },
        );
        Some(AttentionAction::Show {
            window: window.id,
            notification,
        })
    }

    /// The notification was clicked: focus the window and drop it
    pub fn activated(&mut self, window: WindowId) -> Option<AttentionAction> {
        self.pending.remove(&window)?;
        Some(AttentionAction::Activate { window })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: u32, flags: WindowFlags) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            title: "Report.odt".into(),
            startup_app: None,
            flags,
        }
    }

    #[test]
    fn test_ignores_focused_and_skip_taskbar() {
        let mut attention = WindowAttention::new();
        for flags in [
            WindowFlags::DEMANDS_ATTENTION | WindowFlags::FOCUSED,
            WindowFlags::URGENT | WindowFlags::SKIP_TASKBAR,
            WindowFlags::empty(),
        ] {
            let event = WindowEvent::DemandsAttention { window: window(1, flags) };
            assert_eq!(attention.handle_event(&event), None);
        }
        assert!(!attention.is_pending(WindowId(1)));
    }

    #[test]
    fn test_title_follows_window() {
        let mut attention = WindowAttention::new();
        let event = WindowEvent::DemandsAttention {
            window: window(1, WindowFlags::URGENT),
        };
        let Some(AttentionAction::Show { notification, .. }) = attention.handle_event(&event) else {
            panic!("expected a notification");
        };
        assert_eq!(notification.title, "Report.odt");
        assert_eq!(notification.body, "“Report.odt” is ready");

        // Only one per window
        assert_eq!(attention.handle_event(&event), None);

        let renamed = WindowEvent::TitleChanged {
            window: WindowId(1),
            title: "Report (2).odt".into(),
        };
        let Some(AttentionAction::Update { notification, .. }) = attention.handle_event(&renamed) else {
            panic!("expected an update");
        };
        assert_eq!(notification.title, "Report (2).odt");
    }

    #[test]
    fn test_startup_app_names_the_notification() {
        let mut attention = WindowAttention::new();
        let mut info = window(7, WindowFlags::DEMANDS_ATTENTION);
        info.startup_app = Some("Text Editor".into());
        let Some(AttentionAction::Show { notification, .. }) =
            attention.handle_event(&WindowEvent::DemandsAttention { window: info })
        else {
            panic!("expected a notification");
        };
        assert_eq!(notification.title, "Text Editor");
        assert_eq!(notification.app_name, "Text Editor");

        let renamed = WindowEvent::TitleChanged {
            window: WindowId(7),
            title: "notes.txt".into(),
        };
        let Some(AttentionAction::Update { notification, .. }) = attention.handle_event(&renamed) else {
            panic!("expected an update");
        };
        assert_eq!(notification.title, "Text Editor");
        assert_eq!(notification.body, "“notes.txt” is ready");
    }

    #[test]
    fn test_dismissed_on_focus_unmanage_or_withdrawal() {
        let mut attention = WindowAttention::new();
        for (id, dismiss) in [
            (1, WindowEvent::Focused { window: WindowId(1) }),
            (2, WindowEvent::Unmanaged { window: WindowId(2) }),
            (3, WindowEvent::AttentionWithdrawn { window: WindowId(3) }),
        ] {
            attention.handle_event(&WindowEvent::DemandsAttention {
                window: window(id, WindowFlags::URGENT),
            });
            assert_eq!(
                attention.handle_event(&dismiss),
                Some(AttentionAction::Dismiss { window: WindowId(id) })
            );
            assert_eq!(attention.handle_event(&dismiss), None);
        }

        attention.handle_event(&WindowEvent::DemandsAttention {
            window: window(4, WindowFlags::URGENT),
        });
        assert_eq!(
            attention.activated(WindowId(4)),
            Some(AttentionAction::Activate { window: WindowId(4) })
        );
        assert!(!attention.is_pending(WindowId(4)));
    }
}
