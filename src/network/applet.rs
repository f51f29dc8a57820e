//! Network applet
//!
//! Top-level coordinator of the network menu. It mirrors NetworkManager
//! through [`NetEvent`]s, keeps one row group per device inside a section per
//! category plus the VPN section, and computes the panel indicator. Whatever
//! needs the network stack or another service leaves as an [`AppletAction`]
//! which the host executes.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::device::DeviceWrapper;
use super::model::{Connection, Device, NetEvent, NetworkState};
use super::section::DeviceSection;
use super::types::*;
use super::vpn::VpnSection;
use crate::config::NetworkConfig;
use crate::error::Result;
use crate::notify::{Notification, Urgency};
use crate::popup::{MenuEvent, MenuItem, MenuTree, NodeId, Side, SourceId};
use crate::session::SessionPolicy;

/// Work the applet asks its host to carry out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AppletAction {
    ActivateConnection {
        connection: ConnectionPath,
        device: Option<DevicePath>,
        specific_object: Option<ApPath>,
    },
    /// Create a connection from defaults and activate it
    AddAndActivate {
        device: DevicePath,
        access_point: Option<ApPath>,
    },
    DeactivateConnection {
        active: ActivePath,
    },
    DisconnectDevice {
        device: DevicePath,
    },
    /// Open a settings panel with arguments
    LaunchSettingsPanel {
        panel: String,
        args: Vec<String>,
    },
    LaunchDesktopFile {
        desktop_file: String,
    },
    ShowNotification(Notification),
    /// Dismiss the notification shown last
    WithdrawNotification,
    /// Ask the portal helper to log into the captive portal of `connection`
    PortalAuthenticate {
        connection: ActivePath,
    },
    PortalClose {
        connection: ActivePath,
    },
    /// Re-run the connectivity check; the answer comes back as
    /// [`NetEvent::ConnectivityCheckResult`]
    CheckConnectivity {
        connection: ActivePath,
    },
}

/// Result codes of the portal helper's `Done` signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalHelperResult {
    Cancelled,
    Completed,
    Recheck,
}

impl PortalHelperResult {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Cancelled),
            1 => Some(Self::Completed),
            2 => Some(Self::Recheck),
            _ => None,
        }
    }
}

/// State shared by every part of the applet while handling one event
#[derive(Debug)]
pub struct Ctx {
    pub(crate) tree: MenuTree,
    pub(crate) net: NetworkState,
    pub(crate) config: NetworkConfig,
    pub(crate) actions: Vec<AppletAction>,
    /// Set when a device or VPN activation failed during this event
    pub(crate) activation_failed: bool,
}

/// What the panel shows for the applet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndicatorState {
    /// NetworkManager is running
    pub visible: bool,
    pub primary_visible: bool,
    pub primary_icon: String,
    pub vpn_visible: bool,
    pub vpn_icon: String,
}

const CATEGORIES: [ConnectionCategory; 4] = [
    ConnectionCategory::Wired,
    ConnectionCategory::Wireless,
    ConnectionCategory::Wwan,
    ConnectionCategory::Bluetooth,
];

pub struct NetworkApplet {
    cx: Ctx,
    menu: NodeId,
    sections: Vec<DeviceSection>,
    vpn: VpnSection,
    devices: HashMap<DevicePath, DeviceWrapper>,
    /// Order devices were added in, for naming
    device_order: Vec<DevicePath>,
    /// Non-slave connections
    connections: Vec<ConnectionPath>,
    main_connection: Option<ActivePath>,
    main_state: ActiveConnectionState,
    notification_shown: bool,
    /// Connections whose captive portal the helper is handling
    connectivity_queue: BTreeSet<ActivePath>,
    /// network-control permission, unknown until resolved
    permission: Option<bool>,
    indicator: IndicatorState,
}

impl NetworkApplet {
    pub fn new(config: NetworkConfig, policy: SessionPolicy, source: Option<SourceId>, side: Side) -> Result<Self> {
        let mut tree = MenuTree::new(policy);
        let menu = tree.new_popup(source, side);

        let mut sections = Vec::with_capacity(CATEGORIES.len());
        for category in CATEGORIES {
            let section = DeviceSection::new(&mut tree, category)?;
            tree.add_menu_item(menu, section.root(), None)?;
            sections.push(section);
        }
        let separator = tree.new_item(MenuItem::separator(""));
        tree.add_menu_item(menu, separator, None)?;
        let vpn = VpnSection::new(&mut tree)?;
        tree.add_menu_item(menu, vpn.root(), None)?;

        let mut applet = Self {
            cx: Ctx {
                tree,
                net: NetworkState::default(),
                config,
                actions: Vec::new(),
                activation_failed: false,
            },
            menu,
            sections,
            vpn,
            devices: HashMap::new(),
            device_order: Vec::new(),
            connections: Vec::new(),
            main_connection: None,
            main_state: ActiveConnectionState::Deactivated,
            notification_shown: false,
            connectivity_queue: BTreeSet::new(),
            permission: None,
            indicator: IndicatorState::default(),
        };
        applet.sync();
        Ok(applet)
    }

    pub fn tree(&self) -> &MenuTree {
        &self.cx.tree
    }

    pub fn tree_mut(&mut self) -> &mut MenuTree {
        &mut self.cx.tree
    }

    /// The applet's popup menu
    pub fn popup(&self) -> NodeId {
        self.menu
    }

    pub fn indicator(&self) -> &IndicatorState {
        &self.indicator
    }

    pub fn network(&self) -> &NetworkState {
        &self.cx.net
    }

    pub fn device(&self, path: &DevicePath) -> Option<&DeviceWrapper> {
        self.devices.get(path)
    }

    /// Actions queued since the last call
    pub fn take_actions(&mut self) -> Vec<AppletAction> {
        std::mem::take(&mut self.cx.actions)
    }

    /// Fold a network-stack event into the menu
    pub fn handle_event(&mut self, event: &NetEvent) {
        // Removal handlers need what the mirror forgets
        let removed_uuid = match event {
            NetEvent::ConnectionRemoved { connection } => self.cx.net.connection(connection).map(|c| c.uuid.clone()),
            _ => None,
        };
        self.cx.net.apply(event);

        if let Err(e) = self.process(event, removed_uuid) {
            warn!("Failed to apply network event: {}", e);
        }

        if std::mem::take(&mut self.cx.activation_failed) {
            self.activation_failed();
        }
        self.sync_main_connection();
        self.sync();
    }

    fn process(&mut self, event: &NetEvent, removed_uuid: Option<String>) -> Result<()> {
        let cx = &mut self.cx;
        match event {
            NetEvent::NmRunning { running } => {
                info!("NetworkManager {}", if *running { "appeared" } else { "vanished" });
            }
            NetEvent::Connectivity { .. } | NetEvent::StateChanged { .. } => self.sync_connectivity(),

            NetEvent::DeviceAdded { device } => self.add_device(device)?,
            NetEvent::DeviceRemoved { device } => self.remove_device(device)?,
            NetEvent::DeviceStateChanged { device, new, old, reason } => {
                if let Some(wrapper) = self.devices.get_mut(device) {
                    wrapper.state_changed(cx, *new, *old, *reason)?;
                }
            }
            NetEvent::DeviceActiveConnection { device, .. } => {
                if let Some(wrapper) = self.devices.get_mut(device) {
                    wrapper.active_connection_changed(cx)?;
                }
            }
            NetEvent::DeviceInterface { .. } => self.sync_device_names()?,
            NetEvent::DeviceAvailableConnections { device, .. } => {
                if let Some(DeviceWrapper::Wireless(item)) = self.devices.get_mut(device) {
                    item.available_connections_changed(cx)?;
                }
            }

            NetEvent::AccessPointAdded { device, ap } => {
                if let Some(DeviceWrapper::Wireless(item)) = self.devices.get_mut(device) {
                    item.add_access_point(cx, ap)?;
                }
            }
            NetEvent::AccessPointRemoved { device, ap } => {
                if let Some(DeviceWrapper::Wireless(item)) = self.devices.get_mut(device) {
                    item.remove_access_point(cx, ap)?;
                }
            }
            NetEvent::AccessPointStrength { ap, strength } => {
                for wrapper in self.devices.values_mut() {
                    if let DeviceWrapper::Wireless(item) = wrapper {
                        item.strength_changed(cx, ap, *strength)?;
                    }
                }
            }
            NetEvent::AccessPointSsid { ap, .. } => {
                for wrapper in self.devices.values_mut() {
                    if let DeviceWrapper::Wireless(item) = wrapper {
                        item.ssid_changed(cx, ap)?;
                    }
                }
            }

            NetEvent::ConnectionAdded { connection } | NetEvent::ConnectionUpdated { connection } => {
                self.add_connection(connection)?;
            }
            NetEvent::ConnectionRemoved { connection } => {
                self.connections.retain(|c| c != connection);
                self.vpn.remove_connection(cx, connection);
                if let Some(uuid) = removed_uuid {
                    for wrapper in self.devices.values_mut() {
                        wrapper.remove_connection(cx, &uuid);
                    }
                }
            }

            NetEvent::ActiveConnectionAdded { .. } | NetEvent::ActiveConnectionRemoved { .. } => {
                self.vpn.sync_active_connections(cx);
            }
            NetEvent::ActiveConnectionState { active, state, reason } => {
                if self.vpn.active_state_changed(cx, active, *state, *reason) {
                    cx.activation_failed = true;
                }
            }

            NetEvent::PermissionChanged { allowed } => {
                debug!("network-control permission: {}", allowed);
                self.permission = Some(*allowed);
            }
            NetEvent::PortalHelperDone { connection, result } => self.portal_helper_done(connection, *result),
            NetEvent::ConnectivityCheckResult { connection, state } => {
                if *state >= ConnectivityState::Full {
                    self.close_connectivity_check(connection);
                }
            }

            NetEvent::NetworkingEnabled { .. }
            | NetEvent::WirelessEnabled { .. }
            | NetEvent::PrimaryConnection { .. }
            | NetEvent::ActivatingConnection { .. }
            | NetEvent::DeviceCarrier { .. }
            | NetEvent::DeviceActiveAccessPoint { .. }
            | NetEvent::ModemChanged { .. } => {}
        }
        Ok(())
    }

    /// React to the menu: activations, switches and settings actions
    pub fn handle_menu_event(&mut self, event: &MenuEvent) {
        match event {
            MenuEvent::ItemActivated { item, .. } => {
                for wrapper in self.devices.values_mut() {
                    if wrapper.item_activated(&mut self.cx, *item) {
                        break;
                    }
                }
            }
            MenuEvent::Toggled { item, .. } => {
                self.vpn.toggled(&mut self.cx, *item);
            }
            MenuEvent::LaunchSettings { desktop_file, .. } => {
                self.cx.actions.push(AppletAction::LaunchDesktopFile {
                    desktop_file: desktop_file.clone(),
                });
            }
            _ => {}
        }
    }

    /// The session mode changed
    pub fn session_updated(&mut self, policy: SessionPolicy) {
        self.cx.tree.session_updated(policy);
        self.sync();
    }

    fn add_device(&mut self, device: &Device) -> Result<()> {
        if self.devices.contains_key(&device.path) {
            return Ok(());
        }
        let Some(mut wrapper) = DeviceWrapper::new(&mut self.cx, device)? else {
            debug!("Ignoring device {} of type {:?}", device.path, device.device_type);
            return Ok(());
        };

        if let Err(e) = self.attach_device(&mut wrapper, &device.path) {
            wrapper.destroy(&mut self.cx);
            return Err(e);
        }
        self.devices.insert(device.path.clone(), wrapper);
        self.device_order.push(device.path.clone());
        self.sync_device_names()
    }

    /// Fill a new device with the known connections and place it in its
    /// category section
    fn attach_device(&mut self, wrapper: &mut DeviceWrapper, path: &DevicePath) -> Result<()> {
        let connections: Vec<Connection> = self
            .connections
            .iter()
            .filter_map(|path| self.cx.net.connection(path).cloned())
            .collect();
        for connection in &connections {
            wrapper.check_connection(&mut self.cx, connection)?;
        }

        let category = wrapper.category();
        if let Some(section) = self.sections.iter_mut().find(|s| s.category() == category) {
            section.add_device(&mut self.cx.tree, path, wrapper.section())?;
        }
        Ok(())
    }

    fn remove_device(&mut self, path: &DevicePath) -> Result<()> {
        let Some(wrapper) = self.devices.remove(path) else {
            return Ok(());
        };
        for section in &mut self.sections {
            section.remove_device(path);
        }
        wrapper.destroy(&mut self.cx);
        self.device_order.retain(|d| d != path);
        self.sync_device_names()
    }

    fn add_connection(&mut self, connection: &Connection) -> Result<()> {
        if connection.is_slave() {
            return Ok(());
        }
        if !self.connections.contains(&connection.path) {
            self.connections.push(connection.path.clone());
        }
        if connection.category() == ConnectionCategory::Vpn {
            return self.vpn.update_connection(&mut self.cx, connection);
        }
        for wrapper in self.devices.values_mut() {
            wrapper.check_connection(&mut self.cx, connection)?;
        }
        Ok(())
    }

    fn sync_device_names(&mut self) -> Result<()> {
        let devices: Vec<&Device> = self
            .device_order
            .iter()
            .filter_map(|path| self.cx.net.device(path))
            .collect();
        let named: Vec<(DevicePath, String)> = devices
            .iter()
            .map(|d| d.path.clone())
            .zip(device_names(&devices))
            .collect();
        for (path, name) in named {
            if let Some(wrapper) = self.devices.get_mut(&path) {
                wrapper.set_device_name(&mut self.cx, &name)?;
            }
        }
        Ok(())
    }

    fn activation_failed(&mut self) {
        if !self.cx.config.notify_activation_failures {
            return;
        }
        if self.notification_shown {
            self.cx.actions.push(AppletAction::WithdrawNotification);
        }
        let notification = Notification::new(
            "Network Manager",
            "Connection failed",
            "Activation of network connection failed",
        )
        .with_icon("network-error-symbolic")
        .with_urgency(Urgency::High)
        .transient(true);
        self.cx.actions.push(AppletAction::ShowNotification(notification));
        self.notification_shown = true;
    }

    fn sync_main_connection(&mut self) {
        let (path, state) = match self.cx.net.main_connection() {
            Some(active) => (Some(active.path.clone()), active.state),
            None => (None, ActiveConnectionState::Deactivated),
        };
        if path == self.main_connection && state == self.main_state {
            return;
        }
        self.main_connection = path;
        self.main_state = state;

        if state == ActiveConnectionState::Activated && self.notification_shown {
            self.cx.actions.push(AppletAction::WithdrawNotification);
            self.notification_shown = false;
        }
        self.sync_connectivity();
    }

    /// Queue the main connection for portal login when it sits behind a
    /// captive portal
    fn sync_connectivity(&mut self) {
        let main = self
            .main_connection
            .as_ref()
            .filter(|_| self.main_state == ActiveConnectionState::Activated)
            .cloned();
        let Some(path) = main else {
            self.flush_connectivity_queue();
            return;
        };

        let connectivity = self.cx.net.connectivity;
        let mut is_portal = connectivity == ConnectivityState::Portal;
        if self.cx.config.connectivity_test {
            is_portal |= connectivity < ConnectivityState::Full;
        }
        if !is_portal || self.cx.tree.policy().is_greeter {
            return;
        }

        if self.connectivity_queue.insert(path.clone()) {
            debug!("Connection {} is behind a captive portal", path);
            self.cx.actions.push(AppletAction::PortalAuthenticate { connection: path });
        }
    }

    fn portal_helper_done(&mut self, connection: &ActivePath, result: u32) {
        match PortalHelperResult::from_raw(result) {
            // Stays queued so the user isn't asked again until the queue
            // is flushed
            Some(PortalHelperResult::Cancelled) => {}
            Some(PortalHelperResult::Completed) => self.close_connectivity_check(connection),
            Some(PortalHelperResult::Recheck) => {
                self.cx.actions.push(AppletAction::CheckConnectivity {
                    connection: connection.clone(),
                });
            }
            None => warn!("Invalid result from portal helper: {}", result),
        }
    }

    fn close_connectivity_check(&mut self, connection: &ActivePath) {
        if self.connectivity_queue.remove(connection) {
            self.cx.actions.push(AppletAction::PortalClose {
                connection: connection.clone(),
            });
        }
    }

    fn flush_connectivity_queue(&mut self) {
        for connection in std::mem::take(&mut self.connectivity_queue) {
            self.cx.actions.push(AppletAction::PortalClose { connection });
        }
    }

    /// Bring every row, section and the indicator up to date
    fn sync(&mut self) {
        for wrapper in self.devices.values_mut() {
            if let Err(e) = wrapper.sync(&mut self.cx) {
                warn!("Failed to sync device: {}", e);
            }
        }
        let max_items = self.cx.config.max_device_items;
        for section in &self.sections {
            section.sync(&mut self.cx.tree, max_items);
        }
        self.vpn.sync(&mut self.cx);

        let sensitive = !self.cx.tree.policy().is_locked && self.permission == Some(true);
        if self.cx.tree.menu(self.menu).map(|m| m.own_sensitive()) != Some(sensitive) {
            self.cx.tree.set_menu_sensitive(self.menu, sensitive);
        }
        self.cx.tree.set_visible(self.menu, self.cx.net.networking_enabled);

        self.sync_indicator();
    }

    fn sync_indicator(&mut self) {
        let net = &self.cx.net;
        let mut indicator = IndicatorState {
            visible: net.nm_running,
            ..IndicatorState::default()
        };

        if net.networking_enabled {
            let device = self
                .main_connection
                .as_ref()
                .and_then(|path| net.active(path))
                .and_then(|active| active.devices.iter().find_map(|d| self.devices.get(d)));
            let connected = net.state == NmState::CONNECTED_GLOBAL;
            indicator.primary_visible = device.is_some() || connected;
            if let Some(device) = device {
                indicator.primary_icon = device.icon_name(net);
            } else if connected {
                indicator.primary_icon = if net.connectivity == ConnectivityState::Full {
                    "network-wired-symbolic".to_string()
                } else {
                    "network-wired-no-route-symbolic".to_string()
                };
            }
        }

        indicator.vpn_icon = self.vpn.indicator_icon(net);
        indicator.vpn_visible = !indicator.vpn_icon.is_empty();
        self.indicator = indicator;
    }
}

/// Unique, user-facing names for `devices`: the type name when it is unique,
/// else vendor and product, else with the interface appended
fn device_names(devices: &[&Device]) -> Vec<String> {
    let mut names: Vec<String> = devices
        .iter()
        .map(|d| d.device_type.type_name().to_string())
        .collect();

    let duplicated = |names: &[String], i: usize| names.iter().filter(|n| **n == names[i]).count() > 1;

    let described: Vec<String> = (0..devices.len())
        .map(|i| {
            if !duplicated(&names, i) {
                return names[i].clone();
            }
            let device = devices[i];
            let description = [device.vendor.as_deref(), device.product.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if description.is_empty() {
                names[i].clone()
            } else {
                description
            }
        })
        .collect();
    names = described;

    (0..devices.len())
        .map(|i| {
            if duplicated(&names, i) {
                format!("{} ({})", names[i], devices[i].interface)
            } else {
                names[i].clone()
            }
        })
        .collect()
}
