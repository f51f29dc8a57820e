//! Desktop notifications via org.freedesktop.Notifications

use std::collections::HashMap;

use anyhow::{Context, Result};
use zbus::zvariant::Value;
use zbus::{proxy, Connection};

use crate::notify::Notification;

/// Proxy for org.freedesktop.Notifications
#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    /// Show a notification
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: HashMap<&str, Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    /// Close a notification
    fn close_notification(&self, id: u32) -> zbus::Result<()>;
}

pub struct NotificationService {
    proxy: NotificationsProxy<'static>,
}

impl NotificationService {
    pub async fn new(conn: &Connection) -> Result<Self> {
        let proxy = NotificationsProxy::new(conn).await?;
        Ok(Self { proxy })
    }

    /// Show `notification`, replacing `replaces` if it is still up
    pub async fn show(&self, notification: &Notification, replaces: Option<u32>) -> Result<u32> {
        let mut hints = HashMap::new();
        hints.insert("urgency", Value::from(notification.urgency.hint()));
        if notification.transient {
            hints.insert("transient", Value::from(true));
        }

        let id = self
            .proxy
            .notify(
                &notification.app_name,
                replaces.unwrap_or(0),
                &notification.icon,
                &notification.title,
                &notification.body,
                &[],
                hints,
                -1, // server default
            )
            .await
            .context("Failed to show notification")?;

        Ok(id)
    }

    pub async fn close(&self, id: u32) -> Result<()> {
        self.proxy
            .close_notification(id)
            .await
            .context("Failed to close notification")?;
        Ok(())
    }
}
