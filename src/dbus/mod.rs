//! D-Bus integration for desktop services

use anyhow::{Context, Result};
use zbus::Connection;

pub mod network_manager;
pub mod notifications;
pub mod portal;
pub mod settings;

pub struct DbusManager {
    session: Connection,
    system: Connection,
}

impl DbusManager {
    /// Connect to the session and system buses
    pub async fn new() -> Result<Self> {
        let session = Connection::session()
            .await
            .context("Failed to connect to D-Bus session bus")?;
        let system = Connection::system()
            .await
            .context("Failed to connect to D-Bus system bus")?;

        tracing::info!("Connected to D-Bus session and system buses");

        Ok(Self { session, system })
    }

    /// Session bus (notifications, portal helper, settings)
    pub fn session(&self) -> &Connection {
        &self.session
    }

    /// System bus (NetworkManager)
    pub fn system(&self) -> &Connection {
        &self.system
    }
}
