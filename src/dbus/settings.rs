//! Settings panels via org.gnome.Settings (org.freedesktop.Application)

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::info;
use zbus::zvariant::Value;
use zbus::{proxy, Connection};

#[proxy(
    interface = "org.freedesktop.Application",
    default_service = "org.gnome.Settings",
    default_path = "/org/gnome/Settings"
)]
trait SettingsApp {
    fn activate_action(
        &self,
        action_name: &str,
        parameter: &[Value<'_>],
        platform_data: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

pub struct SettingsLauncher {
    proxy: SettingsAppProxy<'static>,
}

impl SettingsLauncher {
    pub async fn new(conn: &Connection) -> Result<Self> {
        let proxy = SettingsAppProxy::new(conn).await?;
        Ok(Self { proxy })
    }

    /// Open `panel` with extra arguments, e.g. `("wifi",
    /// ["connect-8021x-wifi", device, ap])`
    pub async fn launch_panel(&self, panel: &str, args: &[String]) -> Result<()> {
        info!("Opening settings panel {} {:?}", panel, args);
        let args: Vec<Value<'_>> = args.iter().map(|a| Value::from(a.as_str())).collect();
        let parameter = Value::from((panel, args));
        self.proxy
            .activate_action("launch-panel", &[parameter], HashMap::new())
            .await
            .context("Failed to launch settings panel")?;
        Ok(())
    }

    /// Open the panel behind a settings desktop file such as
    /// `gnome-wifi-panel.desktop`
    pub async fn launch_desktop_file(&self, desktop_file: &str) -> Result<()> {
        let panel = panel_from_desktop_file(desktop_file);
        self.launch_panel(panel, &[]).await
    }
}

/// `gnome-wifi-panel.desktop` → `wifi`
pub fn panel_from_desktop_file(desktop_file: &str) -> &str {
    let name = desktop_file.strip_suffix(".desktop").unwrap_or(desktop_file);
    let name = name.strip_prefix("gnome-").unwrap_or(name);
    name.strip_suffix("-panel").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_from_desktop_file() {
        assert_eq!(panel_from_desktop_file("gnome-wifi-panel.desktop"), "wifi");
        assert_eq!(panel_from_desktop_file("gnome-network-panel.desktop"), "network");
        assert_eq!(panel_from_desktop_file("wwan"), "wwan");
    }
}
