//! Captive portal login via org.gnome.Shell.PortalHelper

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use zbus::zvariant::ObjectPath;
use zbus::{proxy, Connection};

use crate::network::types::ActivePath;
use crate::network::NetEvent;

#[proxy(
    interface = "org.gnome.Shell.PortalHelper",
    default_service = "org.gnome.Shell.PortalHelper",
    default_path = "/org/gnome/Shell/PortalHelper"
)]
trait PortalHelper {
    fn authenticate(&self, connection: &ObjectPath<'_>, url: &str, timestamp: u32) -> zbus::Result<()>;

    fn close(&self, connection: &ObjectPath<'_>) -> zbus::Result<()>;

    fn refresh(&self, connection: &ObjectPath<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    fn done(&self, connection: ObjectPath<'_>, result: u32) -> zbus::Result<()>;
}

pub struct PortalService {
    proxy: PortalHelperProxy<'static>,
}

impl PortalService {
    pub async fn new(conn: &Connection) -> Result<Self> {
        let proxy = PortalHelperProxy::new(conn).await?;
        Ok(Self { proxy })
    }

    /// Forward the helper's `Done` signals as [`NetEvent::PortalHelperDone`]
    pub async fn forward_results(&self, events: UnboundedSender<NetEvent>) -> Result<()> {
        let mut done = self
            .proxy
            .receive_done()
            .await
            .context("Failed to subscribe to portal helper results")?;

        tokio::spawn(async move {
            while let Some(signal) = done.next().await {
                let args = match signal.args() {
                    Ok(args) => args,
                    Err(e) => {
                        warn!("Malformed portal helper signal: {}", e);
                        continue;
                    }
                };
                let event = NetEvent::PortalHelperDone {
                    connection: ActivePath(args.connection.to_string()),
                    result: args.result,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            debug!("Portal helper signal stream ended");
        });
        Ok(())
    }

    pub async fn authenticate(&self, connection: &ActivePath, timestamp: u32) -> Result<()> {
        let path = ObjectPath::try_from(connection.as_str())?;
        self.proxy
            .authenticate(&path, "", timestamp)
            .await
            .context("Portal helper refused authentication request")?;
        Ok(())
    }

    pub async fn close(&self, connection: &ActivePath) -> Result<()> {
        let path = ObjectPath::try_from(connection.as_str())?;
        self.proxy.close(&path).await.context("Failed to close portal")?;
        Ok(())
    }
}
