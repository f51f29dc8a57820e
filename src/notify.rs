//! Notifications raised by the applet and the attention handler

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Urgency {
    /// Value of the `urgency` hint of org.freedesktop.Notifications
    pub fn hint(&self) -> u8 {
        match self {
            Urgency::Low => 0,
            Urgency::Normal => 1,
            Urgency::High | Urgency::Critical => 2,
        }
    }
}

/// A notification as handed to the notification host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub app_name: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub urgency: Urgency,
    /// Not kept in the history once dismissed
    pub transient: bool,
}

impl Notification {
    pub fn new(app_name: &str, title: &str, body: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            icon: String::new(),
            urgency: Urgency::Normal,
            transient: false,
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = icon.to_string();
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }
}
