//! Device rows
//!
//! Every supported device gets a section in its category's menu section.
//! Wired, modem and bluetooth devices list the saved connections they can
//! use ([`DeviceItem`]); Wi-Fi devices list nearby networks
//! ([`WirelessDeviceItem`](super::wireless_device::WirelessDeviceItem)).

use std::collections::HashMap;

use tracing::{debug, info};

use super::applet::{AppletAction, Ctx};
use super::model::{Connection, Device, NetworkState};
use super::sorter::ItemSorter;
use super::types::*;
use super::wireless_device::WirelessDeviceItem;
use crate::error::Result;
use crate::popup::{NodeId, Ornament};

/// Check a device state transition. Returns true when it is an activation
/// failure worth telling the user about.
pub(crate) fn activation_failed(device: &DevicePath, new: DeviceState, old: DeviceState, reason: DeviceStateReason) -> bool {
    if new == old {
        info!("Device {} emitted state-changed without actually changing state", device);
        return false;
    }
    // NO_SECRETS means the user cancelled the secret agent dialog
    new == DeviceState::FAILED && reason != DeviceStateReason::NO_SECRETS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Wired,
    Modem,
    Bluetooth,
}

#[derive(Debug, Clone)]
struct ConnectionItem {
    node: NodeId,
    connection: ConnectionPath,
    /// Connection name
    id: String,
    active: Option<ActivePath>,
}

/// Section listing the saved connections of a wired, modem or bluetooth
/// device
#[derive(Debug)]
pub struct DeviceItem {
    kind: DeviceKind,
    path: DevicePath,
    section: NodeId,
    /// Keyed by connection UUID
    items: HashMap<String, ConnectionItem>,
    sorter: ItemSorter<NodeId, String>,
    /// Shown when the device has no connection at all
    autoconnect_item: NodeId,
    deactivate_item: NodeId,
    device_name: String,
    active: Option<ActivePath>,
}

impl DeviceItem {
    pub fn new(cx: &mut Ctx, kind: DeviceKind, device: &Device) -> Result<Self> {
        let tree = &mut cx.tree;
        let section = tree.new_section();
        let autoconnect_item = tree.add_action(section, "Connect", Some(""))?;
        let deactivate_item = tree.add_action(section, "Turn Off", None)?;

        let (title, desktop_file) = match kind {
            DeviceKind::Wired => ("Wired Settings", "gnome-network-panel.desktop"),
            DeviceKind::Modem if uses_wwan_panel(device) => ("Mobile Broadband Settings", "gnome-wwan-panel.desktop"),
            DeviceKind::Modem => ("Mobile Broadband Settings", "gnome-network-panel.desktop"),
            DeviceKind::Bluetooth => ("Bluetooth Settings", "gnome-network-panel.desktop"),
        };
        tree.add_settings_action(section, title, desktop_file)?;

        let mut item = Self {
            kind,
            path: device.path.clone(),
            section,
            items: HashMap::new(),
            sorter: ItemSorter::by_name(),
            autoconnect_item,
            deactivate_item,
            device_name: String::new(),
            active: None,
        };
        item.active_connection_changed(cx);
        Ok(item)
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn section(&self) -> NodeId {
        self.section
    }

    pub fn category(&self) -> ConnectionCategory {
        match self.kind {
            DeviceKind::Wired => ConnectionCategory::Wired,
            DeviceKind::Modem => ConnectionCategory::Wwan,
            DeviceKind::Bluetooth => ConnectionCategory::Bluetooth,
        }
    }

    fn state(&self, net: &NetworkState) -> ActiveConnectionState {
        net.device_active_state(&self.path)
    }

    pub fn is_active(&self, net: &NetworkState) -> bool {
        self.state(net).is_active()
    }

    /// Name representing the device as a whole
    pub fn name(&self, net: &NetworkState) -> String {
        let device = net.device(&self.path);
        let own = match self.kind {
            DeviceKind::Wired => None,
            DeviceKind::Modem => device
                .and_then(|d| d.modem.as_ref())
                .and_then(|m| m.operator_name.clone()),
            DeviceKind::Bluetooth => device.and_then(|d| d.bt_name.clone()),
        };
        own.filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.device_name.clone())
    }

    pub fn icon_name(&self, net: &NetworkState) -> String {
        let has_active = self.active.is_some();
        let disconnected = if has_active {
            "network-cellular-signal-none-symbolic"
        } else {
            "network-cellular-disabled-symbolic"
        };
        let state = self.state(net);
        let icon = match (self.kind, state) {
            (DeviceKind::Wired, ActiveConnectionState::Activating) => "network-wired-acquiring-symbolic",
            (DeviceKind::Wired, ActiveConnectionState::Activated) => {
                if net.can_reach_internet(&self.path) {
                    "network-wired-symbolic"
                } else {
                    "network-wired-no-route-symbolic"
                }
            }
            (DeviceKind::Wired, _) => "network-wired-disconnected-symbolic",

            (DeviceKind::Modem, ActiveConnectionState::Activating) => "network-cellular-acquiring-symbolic",
            (DeviceKind::Modem, ActiveConnectionState::Activated) => {
                let quality = net
                    .device(&self.path)
                    .and_then(|d| d.modem.as_ref())
                    .map_or(0, |m| m.signal_quality);
                return format!("network-cellular-signal-{}-symbolic", signal_to_icon(quality));
            }
            (DeviceKind::Modem, _) => disconnected,

            (DeviceKind::Bluetooth, ActiveConnectionState::Activating) => "network-cellular-acquiring-symbolic",
            (DeviceKind::Bluetooth, ActiveConnectionState::Activated) => "network-cellular-connected-symbolic",
            (DeviceKind::Bluetooth, _) => disconnected,
        };
        icon.to_string()
    }

    pub fn set_device_name(&mut self, name: &str) {
        self.device_name = name.to_string();
    }

    /// More than one connection: rows act as radio buttons
    fn radio_mode(&self) -> bool {
        self.items.len() > 1
    }

    /// Add or refresh the row of `connection` if this device can use it
    pub fn check_connection(&mut self, cx: &mut Ctx, connection: &Connection) -> Result<()> {
        let Some(device) = cx.net.device(&self.path) else {
            return Ok(());
        };
        if !device.connection_valid(connection) {
            return Ok(());
        }

        match self.items.get_mut(&connection.uuid) {
            Some(item) => {
                // The path changes when NetworkManager restarts
                item.connection = connection.path.clone();
                item.id = connection.id.clone();
                let pos = self.sorter.upsert(item.node, connection.id.clone());
                cx.tree.move_menu_item(self.section, item.node, pos)?;
            }
            None => {
                let node = cx.tree.new_item(crate::popup::MenuItem::image(&connection.id, ""));
                let pos = self.sorter.upsert(node, connection.id.clone());
                cx.tree.add_menu_item(self.section, node, Some(pos))?;

                let active_uuid = self.active.as_ref().and_then(|a| cx.net.active(a)).map(|a| a.uuid.as_str());
                let active = (active_uuid == Some(connection.uuid.as_str()))
                    .then(|| self.active.clone())
                    .flatten();
                self.items.insert(
                    connection.uuid.clone(),
                    ConnectionItem {
                        node,
                        connection: connection.path.clone(),
                        id: connection.id.clone(),
                        active,
                    },
                );
                debug!("Added connection {} to device {}", connection.id, self.path);
            }
        }
        self.sync(cx);
        Ok(())
    }

    pub fn remove_connection(&mut self, cx: &mut Ctx, uuid: &str) {
        let Some(item) = self.items.remove(uuid) else {
            return;
        };
        self.sorter.delete(&item.node);
        cx.tree.destroy(item.node);
        self.sync(cx);
    }

    /// The device switched to another active connection
    pub fn active_connection_changed(&mut self, cx: &mut Ctx) {
        for item in self.items.values_mut() {
            item.active = None;
        }
        self.active = cx.net.device(&self.path).and_then(|d| d.active_connection.clone());

        if let Some(uuid) = self.active.as_ref().and_then(|a| cx.net.active(a)).map(|a| a.uuid.clone()) {
            if let Some(item) = self.items.get_mut(&uuid) {
                item.active = self.active.clone();
            }
        }
        self.sync(cx);
    }

    /// Bring labels, ornaments, icons and visibility up to date
    pub fn sync(&mut self, cx: &mut Ctx) {
        let radio = self.radio_mode();
        let name = self.name(&cx.net);
        let icon = self.icon_name(&cx.net);
        let device_active = self.is_active(&cx.net);

        for item in self.items.values() {
            let item_active = item
                .active
                .as_ref()
                .and_then(|a| cx.net.active(a))
                .is_some_and(|a| a.state.is_active());
            if radio {
                cx.tree.set_label(item.node, &item.id);
                cx.tree.set_icon(item.node, "");
                cx.tree
                    .set_ornament(item.node, if item_active { Ornament::Dot } else { Ornament::None });
            } else {
                let label = if item_active {
                    format!("Disconnect {name}")
                } else {
                    format!("Connect to {name}")
                };
                cx.tree.set_label(item.node, &label);
                cx.tree.set_icon(item.node, &icon);
                cx.tree.set_ornament(item.node, Ornament::None);
            }
        }

        cx.tree.set_label(self.autoconnect_item, &name);
        cx.tree.set_icon(self.autoconnect_item, &icon);
        cx.tree.set_visible(self.autoconnect_item, self.items.is_empty());
        cx.tree.set_visible(self.deactivate_item, radio && device_active);

        match self.kind {
            DeviceKind::Wired => {
                let carrier = cx.net.device(&self.path).is_none_or(|d| d.carrier);
                cx.tree.set_visible(self.section, carrier);
            }
            DeviceKind::Modem => {
                let has_windows = cx.tree.policy().has_windows;
                cx.tree.set_sensitive(self.autoconnect_item, has_windows);
            }
            DeviceKind::Bluetooth => {}
        }
    }

    fn autoconnect(&self, net: &NetworkState) -> AppletAction {
        let device = net.device(&self.path);
        match (self.kind, device) {
            (DeviceKind::Modem, Some(device)) if uses_wwan_panel(device) => AppletAction::LaunchSettingsPanel {
                panel: "wwan".to_string(),
                args: vec!["show-device".to_string(), device.udi.clone()],
            },
            (DeviceKind::Modem, _) => AppletAction::LaunchSettingsPanel {
                panel: "network".to_string(),
                args: vec!["connect-3g".to_string(), self.path.to_string()],
            },
            _ => AppletAction::AddAndActivate {
                device: self.path.clone(),
                access_point: None,
            },
        }
    }

    /// Handle activation of one of our rows; false if `node` isn't ours
    pub fn item_activated(&mut self, cx: &mut Ctx, node: NodeId) -> bool {
        if node == self.autoconnect_item {
            let action = self.autoconnect(&cx.net);
            cx.actions.push(action);
            return true;
        }
        if node == self.deactivate_item {
            cx.actions.push(AppletAction::DisconnectDevice {
                device: self.path.clone(),
            });
            return true;
        }

        let radio = self.radio_mode();
        let Some(item) = self.items.values().find(|i| i.node == node) else {
            return false;
        };
        match (&item.active, radio) {
            // Radio rows only switch to a connection, never off
            (Some(_), true) => {}
            (None, _) => cx.actions.push(AppletAction::ActivateConnection {
                connection: item.connection.clone(),
                device: Some(self.path.clone()),
                specific_object: None,
            }),
            (Some(_), false) => cx.actions.push(AppletAction::DisconnectDevice {
                device: self.path.clone(),
            }),
        }
        true
    }

    pub fn connection_count(&self) -> usize {
        self.items.len()
    }
}

/// The wwan panel handles GSM/UMTS and LTE modems, not CDMA
fn uses_wwan_panel(device: &Device) -> bool {
    device
        .modem_capabilities
        .intersects(ModemCapabilities::GSM_UMTS | ModemCapabilities::LTE)
}

/// A device row of either flavour
#[derive(Debug)]
pub enum DeviceWrapper {
    Connections(DeviceItem),
    Wireless(WirelessDeviceItem),
}

impl DeviceWrapper {
    /// Wrap `device`; `None` for device types the menu doesn't show
    pub fn new(cx: &mut Ctx, device: &Device) -> Result<Option<Self>> {
        let wrapper = match device.device_type {
            DeviceType::Ethernet => Self::Connections(DeviceItem::new(cx, DeviceKind::Wired, device)?),
            DeviceType::Modem => Self::Connections(DeviceItem::new(cx, DeviceKind::Modem, device)?),
            DeviceType::Bluetooth => Self::Connections(DeviceItem::new(cx, DeviceKind::Bluetooth, device)?),
            DeviceType::Wifi => Self::Wireless(WirelessDeviceItem::new(cx, device)?),
            DeviceType::Other(_) => return Ok(None),
        };
        Ok(Some(wrapper))
    }

    pub fn section(&self) -> NodeId {
        match self {
            Self::Connections(item) => item.section(),
            Self::Wireless(item) => item.section(),
        }
    }

    pub fn category(&self) -> ConnectionCategory {
        match self {
            Self::Connections(item) => item.category(),
            Self::Wireless(_) => ConnectionCategory::Wireless,
        }
    }

    pub fn icon_name(&self, net: &NetworkState) -> String {
        match self {
            Self::Connections(item) => item.icon_name(net),
            Self::Wireless(item) => item.icon_name(net),
        }
    }

    pub fn name(&self, net: &NetworkState) -> String {
        match self {
            Self::Connections(item) => item.name(net),
            Self::Wireless(item) => item.name(net),
        }
    }

    pub fn set_device_name(&mut self, cx: &mut Ctx, name: &str) -> Result<()> {
        match self {
            Self::Connections(item) => {
                item.set_device_name(name);
                item.sync(cx);
            }
            Self::Wireless(item) => {
                item.set_device_name(name);
                item.sync(cx)?;
            }
        }
        Ok(())
    }

    /// Saved connections only matter for devices listing them
    pub fn check_connection(&mut self, cx: &mut Ctx, connection: &Connection) -> Result<()> {
        match self {
            Self::Connections(item) => item.check_connection(cx, connection),
            Self::Wireless(_) => Ok(()),
        }
    }

    pub fn remove_connection(&mut self, cx: &mut Ctx, uuid: &str) {
        if let Self::Connections(item) = self {
            item.remove_connection(cx, uuid);
        }
    }

    pub fn active_connection_changed(&mut self, cx: &mut Ctx) -> Result<()> {
        match self {
            Self::Connections(item) => item.active_connection_changed(cx),
            Self::Wireless(item) => item.sync(cx)?,
        }
        Ok(())
    }

    /// Device state transition; flags activation failures on `cx`
    pub fn state_changed(
        &mut self,
        cx: &mut Ctx,
        new: DeviceState,
        old: DeviceState,
        reason: DeviceStateReason,
    ) -> Result<()> {
        let path = match self {
            Self::Connections(item) => item.path.clone(),
            Self::Wireless(item) => item.path().clone(),
        };
        if activation_failed(&path, new, old, reason) {
            cx.activation_failed = true;
        }
        if new == old {
            return Ok(());
        }
        self.sync(cx)
    }

    pub fn sync(&mut self, cx: &mut Ctx) -> Result<()> {
        match self {
            Self::Connections(item) => item.sync(cx),
            Self::Wireless(item) => item.sync(cx)?,
        }
        Ok(())
    }

    pub fn item_activated(&mut self, cx: &mut Ctx, node: NodeId) -> bool {
        match self {
            Self::Connections(item) => item.item_activated(cx, node),
            Self::Wireless(item) => item.item_activated(cx, node),
        }
    }

    /// Remove the device's rows from the menu
    pub fn destroy(self, cx: &mut Ctx) {
        cx.tree.destroy(self.section());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::applet::tests::ctx;
    use crate::network::model::{ActiveConnection, NetEvent};

    fn ethernet(cx: &mut Ctx) -> DeviceItem {
        let mut device = Device::new("/dev/eth", DeviceType::Ethernet, "enp3s0");
        device.state = DeviceState::DISCONNECTED;
        cx.net.apply(&NetEvent::DeviceAdded { device: device.clone() });
        let mut item = DeviceItem::new(cx, DeviceKind::Wired, &device).unwrap();
        item.set_device_name("Ethernet");
        item.sync(cx);
        item
    }

    fn wired(path: &str, uuid: &str, id: &str) -> Connection {
        Connection::new(path, uuid, id, "802-3-ethernet")
    }

    fn labels(cx: &Ctx, item: &DeviceItem) -> Vec<String> {
        cx.tree
            .menu_items(item.section())
            .into_iter()
            .filter(|&n| cx.tree.is_visible(n))
            .filter_map(|n| cx.tree.item(n).map(|i| i.label().to_string()))
            .collect()
    }

    fn activate(cx: &mut Ctx, device: &str, active: &str, uuid: &str, conn: &str, state: ActiveConnectionState) {
        cx.net.apply(&NetEvent::ActiveConnectionAdded {
            active: ActiveConnection {
                path: active.into(),
                connection: Some(conn.into()),
                uuid: uuid.into(),
                conn_type: "802-3-ethernet".into(),
                state,
                reason: ActiveConnectionStateReason::NONE,
                devices: vec![device.into()],
            },
        });
        cx.net.apply(&NetEvent::DeviceActiveConnection {
            device: device.into(),
            active: Some(active.into()),
        });
    }

    #[test]
    fn test_no_connections_shows_connect_item() {
        let mut cx = ctx();
        let item = ethernet(&mut cx);
        assert_eq!(labels(&cx, &item), vec!["Ethernet", "Wired Settings"]);
        assert_eq!(
            cx.tree.item(item.autoconnect_item).unwrap().icon(),
            Some("network-wired-disconnected-symbolic")
        );
    }

    #[test]
    fn test_single_connection_uses_device_label() {
        let mut cx = ctx();
        let mut item = ethernet(&mut cx);
        item.check_connection(&mut cx, &wired("/conn/1", "u1", "Office")).unwrap();
        // Invalid for this device
        let wifi = Connection::new("/conn/2", "u2", "Home", "802-11-wireless");
        item.check_connection(&mut cx, &wifi).unwrap();

        assert_eq!(labels(&cx, &item), vec!["Connect to Ethernet", "Wired Settings"]);

        activate(&mut cx, "/dev/eth", "/active/1", "u1", "/conn/1", ActiveConnectionState::Activated);
        item.active_connection_changed(&mut cx);
        assert_eq!(labels(&cx, &item), vec!["Disconnect Ethernet", "Wired Settings"]);
    }

    #[test]
    fn test_radio_mode_sorted_by_name() {
        let mut cx = ctx();
        let mut item = ethernet(&mut cx);
        item.check_connection(&mut cx, &wired("/conn/1", "u1", "office")).unwrap();
        item.check_connection(&mut cx, &wired("/conn/2", "u2", "Home")).unwrap();
        activate(&mut cx, "/dev/eth", "/active/1", "u1", "/conn/1", ActiveConnectionState::Activated);
        item.active_connection_changed(&mut cx);

        assert_eq!(labels(&cx, &item), vec!["Home", "office", "Turn Off", "Wired Settings"]);
        let office = item.items["u1"].node;
        assert_eq!(cx.tree.item(office).unwrap().ornament(), Ornament::Dot);

        // Renaming moves the row
        item.check_connection(&mut cx, &wired("/conn/1", "u1", "Garage")).unwrap();
        assert_eq!(labels(&cx, &item), vec!["Garage", "Home", "Turn Off", "Wired Settings"]);

        item.remove_connection(&mut cx, "u2");
        item.remove_connection(&mut cx, "u2");
        assert_eq!(labels(&cx, &item), vec!["Disconnect Ethernet", "Wired Settings"]);
        assert_eq!(item.connection_count(), 1);
    }

    #[test]
    fn test_connection_activation_actions() {
        let mut cx = ctx();
        let mut item = ethernet(&mut cx);
        item.check_connection(&mut cx, &wired("/conn/1", "u1", "Office")).unwrap();
        item.check_connection(&mut cx, &wired("/conn/2", "u2", "Home")).unwrap();
        activate(&mut cx, "/dev/eth", "/active/1", "u1", "/conn/1", ActiveConnectionState::Activated);
        item.active_connection_changed(&mut cx);

        let office = item.items["u1"].node;
        let home = item.items["u2"].node;
        assert!(item.item_activated(&mut cx, office));
        assert!(cx.actions.is_empty());

        assert!(item.item_activated(&mut cx, home));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::ActivateConnection {
                connection: "/conn/2".into(),
                device: Some("/dev/eth".into()),
                specific_object: None,
            })
        );

        assert!(item.item_activated(&mut cx, item.deactivate_item));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::DisconnectDevice {
                device: "/dev/eth".into()
            })
        );
        assert!(!item.item_activated(&mut cx, NodeId(9999)));
    }

    #[test]
    fn test_wired_visibility_follows_carrier() {
        let mut cx = ctx();
        let mut item = ethernet(&mut cx);
        cx.net.apply(&NetEvent::DeviceCarrier {
            device: "/dev/eth".into(),
            carrier: false,
        });
        item.sync(&mut cx);
        assert!(!cx.tree.is_visible(item.section()));
    }

    #[test]
    fn test_modem_autoconnect() {
        let mut cx = ctx();
        let mut device = Device::new("/dev/modem", DeviceType::Modem, "ttyUSB0");
        device.udi = "/org/freedesktop/ModemManager1/Modem/0".into();
        device.modem_capabilities = ModemCapabilities::LTE;
        device.modem = Some(crate::network::model::ModemInfo {
            operator_name: Some("Carrier".into()),
            signal_quality: 55,
        });
        cx.net.apply(&NetEvent::DeviceAdded { device: device.clone() });
        let mut item = DeviceItem::new(&mut cx, DeviceKind::Modem, &device).unwrap();
        item.set_device_name("Mobile Broadband");
        item.sync(&mut cx);

        assert_eq!(cx.tree.item(item.autoconnect_item).unwrap().label(), "Carrier");
        assert!(item.item_activated(&mut cx, item.autoconnect_item));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::LaunchSettingsPanel {
                panel: "wwan".into(),
                args: vec!["show-device".into(), "/org/freedesktop/ModemManager1/Modem/0".into()],
            })
        );
    }

    #[test]
    fn test_state_change_failures() {
        let path = DevicePath::from("/dev/eth");
        assert!(activation_failed(
            &path,
            DeviceState::FAILED,
            DeviceState::CONFIG,
            DeviceStateReason::UNKNOWN
        ));
        assert!(!activation_failed(
            &path,
            DeviceState::FAILED,
            DeviceState::NEED_AUTH,
            DeviceStateReason::NO_SECRETS
        ));
        assert!(!activation_failed(
            &path,
            DeviceState::FAILED,
            DeviceState::FAILED,
            DeviceStateReason::UNKNOWN
        ));
    }
}
