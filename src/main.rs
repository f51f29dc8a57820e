//! Area network menu
//!
//! Runs the NetworkManager status applet headless against the system bus,
//! or replays a recorded list of events with `--replay events.json`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_netmenu::config::Config;
use area_netmenu::dbus::network_manager::NmClient;
use area_netmenu::dbus::notifications::NotificationService;
use area_netmenu::dbus::portal::PortalService;
use area_netmenu::dbus::settings::SettingsLauncher;
use area_netmenu::dbus::DbusManager;
use area_netmenu::network::{AppletAction, NetEvent, NetworkApplet};
use area_netmenu::popup::{Activation, MenuTree, NodeId};

/// One step of a replay file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayStep {
    Net(NetEvent),
    /// Activate the first menu item with this label
    Activate { activate: String },
}

fn new_applet(config: &Config) -> Result<NetworkApplet> {
    let applet = NetworkApplet::new(
        config.network.clone(),
        config.session_policy(),
        None,
        config.menu.arrow_side,
    )?;
    Ok(applet)
}

/// Feed queued menu events back into the applet
fn pump_menu_events(applet: &mut NetworkApplet) {
    loop {
        let events = applet.tree_mut().drain_events();
        if events.is_empty() {
            break;
        }
        for event in &events {
            applet.handle_menu_event(event);
        }
    }
}

fn find_item(tree: &MenuTree, menu: NodeId, label: &str) -> Option<NodeId> {
    for child in tree.menu_items(menu) {
        if tree.item(child).is_some_and(|item| item.label() == label) {
            return Some(child);
        }
        let nested = if tree.menu(child).is_some() {
            Some(child)
        } else {
            tree.submenu_of(child)
        };
        if let Some(found) = nested.and_then(|m| find_item(tree, m, label)) {
            return Some(found);
        }
    }
    None
}

fn replay(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {:?}", path))?;
    let steps: Vec<ReplayStep> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse replay file {:?}", path))?;
    info!("Replaying {} steps from {:?}", steps.len(), path);

    let mut applet = new_applet(config)?;
    for step in &steps {
        match step {
            ReplayStep::Net(event) => applet.handle_event(event),
            ReplayStep::Activate { activate } => {
                let popup = applet.popup();
                match find_item(applet.tree(), popup, activate) {
                    Some(item) => applet.tree_mut().activate(item, Activation::Programmatic),
                    None => warn!("No menu item labelled {:?}", activate),
                }
            }
        }
        pump_menu_events(&mut applet);
    }

    println!("{}", applet.tree().outline(applet.popup()));
    println!("{}", serde_json::to_string_pretty(applet.indicator())?);
    let actions = applet.take_actions();
    if !actions.is_empty() {
        println!("{}", serde_json::to_string_pretty(&actions)?);
    }
    Ok(())
}

/// Services the applet's actions are carried out against
struct Services {
    nm: NmClient,
    portal: Option<PortalService>,
    notifications: Option<NotificationService>,
    settings: Option<SettingsLauncher>,
    /// Id of the notification on screen, if any
    notification: Option<u32>,
}

impl Services {
    async fn execute(&mut self, action: AppletAction) -> Result<()> {
        debug!("Executing {:?}", action);
        match &action {
            AppletAction::ShowNotification(notification) => {
                if let Some(service) = &self.notifications {
                    self.notification = Some(service.show(notification, self.notification).await?);
                }
            }
            AppletAction::WithdrawNotification => {
                if let (Some(service), Some(id)) = (&self.notifications, self.notification.take()) {
                    service.close(id).await?;
                }
            }
            AppletAction::LaunchSettingsPanel { panel, args } => match &self.settings {
                Some(settings) => settings.launch_panel(panel, args).await?,
                None => warn!("No settings application to open {}", panel),
            },
            AppletAction::LaunchDesktopFile { desktop_file } => match &self.settings {
                Some(settings) => settings.launch_desktop_file(desktop_file).await?,
                None => warn!("No settings application to open {}", desktop_file),
            },
            AppletAction::PortalAuthenticate { connection } => match &self.portal {
                Some(portal) => portal.authenticate(connection, 0).await?,
                None => warn!("No portal helper for {}", connection),
            },
            AppletAction::PortalClose { connection } => {
                if let Some(portal) = &self.portal {
                    portal.close(connection).await?;
                }
            }
            _ => self.nm.execute(&action).await?,
        }
        Ok(())
    }
}

async fn run(config: Config) -> Result<()> {
    let dbus = DbusManager::new().await?;
    let (tx, mut rx) = mpsc::unbounded_channel::<NetEvent>();

    let nm = NmClient::new(dbus.system(), tx.clone()).await?;
    nm.start().await.context("Failed to read NetworkManager state")?;

    let portal = match PortalService::new(dbus.session()).await {
        Ok(portal) => {
            if let Err(e) = portal.forward_results(tx.clone()).await {
                warn!("{:#}", e);
            }
            Some(portal)
        }
        Err(e) => {
            warn!("Portal helper unavailable: {}", e);
            None
        }
    };
    let notifications = NotificationService::new(dbus.session())
        .await
        .inspect_err(|e| warn!("Notifications unavailable: {}", e))
        .ok();
    let settings = SettingsLauncher::new(dbus.session())
        .await
        .inspect_err(|e| warn!("Settings application unavailable: {}", e))
        .ok();

    let mut services = Services {
        nm,
        portal,
        notifications,
        settings,
        notification: None,
    };
    let mut applet = new_applet(&config)?;
    info!("Network menu running");

    while let Some(event) = rx.recv().await {
        applet.handle_event(&event);
        pump_menu_events(&mut applet);
        for action in applet.take_actions() {
            if let Err(e) = services.execute(action).await {
                warn!("{:#}", e);
            }
        }
        debug!("Menu:\n{}", applet.tree().outline(applet.popup()));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "area_netmenu=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::load()?;

    match args.as_slice() {
        [] => {}
        [flag, file] if flag == "--replay" => return replay(&config, &PathBuf::from(file)),
        _ => bail!("Usage: area-netmenu [--replay events.json]"),
    }

    info!("Starting Area network menu");
    tokio::select! {
        result = run(config) => {
            if let Err(e) = &result {
                error!("Network menu error: {:#}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
