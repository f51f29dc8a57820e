//! Mirror of the NetworkManager object model
//!
//! [`NetworkState`] is rebuilt from [`NetEvent`]s only, so a recorded event
//! stream replays to the same state as the live D-Bus client.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::*;

fn default_true() -> bool {
    true
}

/// A saved connection profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub path: ConnectionPath,
    pub uuid: String,
    /// User-visible name
    pub id: String,
    /// `connection.type` setting, e.g. `802-11-wireless`
    pub setting_type: String,
    /// Set on slave connections (bond, bridge and team ports)
    #[serde(default)]
    pub master: Option<String>,
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ssid: Option<Vec<u8>>,
    /// `ipv4.method`
    #[serde(default)]
    pub ip4_method: Option<String>,
}

impl Connection {
    pub fn new(path: &str, uuid: &str, id: &str, setting_type: &str) -> Self {
        Self {
            path: path.into(),
            uuid: uuid.to_string(),
            id: id.to_string(),
            setting_type: setting_type.to_string(),
            master: None,
            interface_name: None,
            mac_address: None,
            ssid: None,
            ip4_method: None,
        }
    }

    pub fn category(&self) -> ConnectionCategory {
        ConnectionCategory::from_setting_type(&self.setting_type)
    }

    pub fn is_slave(&self) -> bool {
        self.master.as_deref().is_some_and(|m| !m.is_empty())
    }

    /// Connection sharing its uplink (hotspot)
    pub fn is_shared(&self) -> bool {
        self.ip4_method.as_deref() == Some("shared")
    }
}

/// ModemManager view of a modem
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModemInfo {
    #[serde(default)]
    pub operator_name: Option<String>,
    #[serde(default)]
    pub signal_quality: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub path: DevicePath,
    pub device_type: DeviceType,
    pub interface: String,
    #[serde(default)]
    pub udi: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub hw_address: Option<String>,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default)]
    pub active_connection: Option<ActivePath>,
    #[serde(default)]
    pub available_connections: Vec<ConnectionPath>,
    /// Link carrier (ethernet only)
    #[serde(default = "default_true")]
    pub carrier: bool,
    #[serde(default)]
    pub wireless_capabilities: WifiCapabilities,
    #[serde(default)]
    pub active_access_point: Option<ApPath>,
    #[serde(default)]
    pub mode: Mode80211,
    #[serde(default)]
    pub modem_capabilities: ModemCapabilities,
    /// Remote device name (bluetooth only)
    #[serde(default)]
    pub bt_name: Option<String>,
    #[serde(default)]
    pub modem: Option<ModemInfo>,
}

impl Device {
    pub fn new(path: &str, device_type: DeviceType, interface: &str) -> Self {
        Self {
            path: path.into(),
            device_type,
            interface: interface.to_string(),
            udi: String::new(),
            vendor: None,
            product: None,
            hw_address: None,
            state: DeviceState::DISCONNECTED,
            active_connection: None,
            available_connections: Vec::new(),
            carrier: true,
            wireless_capabilities: WifiCapabilities::empty(),
            active_access_point: None,
            mode: Mode80211::Infra,
            modem_capabilities: ModemCapabilities::empty(),
            bt_name: None,
            modem: None,
        }
    }

    /// Whether `connection` could be activated on this device
    pub fn connection_valid(&self, connection: &Connection) -> bool {
        if connection.category() != self.device_type.category() {
            return false;
        }
        if let Some(iface) = connection.interface_name.as_deref().filter(|i| !i.is_empty()) {
            if iface != self.interface {
                return false;
            }
        }
        match (connection.mac_address.as_deref(), self.hw_address.as_deref()) {
            (Some(want), Some(have)) if !want.is_empty() => want.eq_ignore_ascii_case(have),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub path: ApPath,
    /// Raw SSID; `None` (or empty) while the AP is hidden
    #[serde(default)]
    pub ssid: Option<Vec<u8>>,
    #[serde(default)]
    pub mode: Mode80211,
    #[serde(default)]
    pub strength: u8,
    #[serde(default)]
    pub flags: ApFlags,
    #[serde(default)]
    pub wpa_flags: ApSecurityFlags,
    #[serde(default)]
    pub rsn_flags: ApSecurityFlags,
}

impl AccessPoint {
    /// Unsecured infrastructure access point
    pub fn new(path: &str, ssid: &[u8], strength: u8) -> Self {
        Self {
            path: path.into(),
            ssid: Some(ssid.to_vec()),
            mode: Mode80211::Infra,
            strength,
            flags: ApFlags::empty(),
            wpa_flags: ApSecurityFlags::empty(),
            rsn_flags: ApSecurityFlags::empty(),
        }
    }

    /// SSID if the access point broadcasts one
    pub fn ssid(&self) -> Option<&[u8]> {
        self.ssid.as_deref().filter(|s| !s.is_empty())
    }

    /// Whether `connection` targets this access point
    pub fn connection_valid(&self, connection: &Connection) -> bool {
        if connection.category() != ConnectionCategory::Wireless {
            return false;
        }
        match (connection.ssid.as_deref(), self.ssid()) {
            (Some(want), Some(have)) => want == have,
            _ => false,
        }
    }
}

/// Printable SSID, `<unknown>` when it isn't valid UTF-8 or empty
pub fn ssid_to_label(ssid: &[u8]) -> String {
    match std::str::from_utf8(ssid) {
        Ok(label) if !label.is_empty() => label.to_string(),
        _ => "<unknown>".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConnection {
    pub path: ActivePath,
    #[serde(default)]
    pub connection: Option<ConnectionPath>,
    pub uuid: String,
    /// `connection.type` of the underlying profile
    #[serde(default)]
    pub conn_type: String,
    #[serde(default)]
    pub state: ActiveConnectionState,
    #[serde(default)]
    pub reason: ActiveConnectionStateReason,
    /// At most one device in practice
    #[serde(default)]
    pub devices: Vec<DevicePath>,
}

/// Everything reported by the network stack, one variant per change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetEvent {
    NmRunning { running: bool },
    NetworkingEnabled { enabled: bool },
    WirelessEnabled { enabled: bool },
    StateChanged { state: NmState },
    Connectivity { state: ConnectivityState },
    PrimaryConnection { active: Option<ActivePath> },
    ActivatingConnection { active: Option<ActivePath> },

    DeviceAdded { device: Device },
    DeviceRemoved { device: DevicePath },
    DeviceStateChanged {
        device: DevicePath,
        new: DeviceState,
        old: DeviceState,
        reason: DeviceStateReason,
    },
    DeviceActiveConnection { device: DevicePath, active: Option<ActivePath> },
    DeviceInterface { device: DevicePath, interface: String },
    DeviceCarrier { device: DevicePath, carrier: bool },
    DeviceAvailableConnections { device: DevicePath, connections: Vec<ConnectionPath> },
    DeviceActiveAccessPoint { device: DevicePath, ap: Option<ApPath> },
    ModemChanged { device: DevicePath, modem: ModemInfo },

    AccessPointAdded { device: DevicePath, ap: AccessPoint },
    AccessPointRemoved { device: DevicePath, ap: ApPath },
    AccessPointStrength { ap: ApPath, strength: u8 },
    AccessPointSsid { ap: ApPath, ssid: Option<Vec<u8>> },

    ConnectionAdded { connection: Connection },
    ConnectionUpdated { connection: Connection },
    ConnectionRemoved { connection: ConnectionPath },

    ActiveConnectionAdded { active: ActiveConnection },
    ActiveConnectionRemoved { active: ActivePath },
    ActiveConnectionState {
        active: ActivePath,
        state: ActiveConnectionState,
        reason: ActiveConnectionStateReason,
    },

    /// network-control permission resolved or changed
    PermissionChanged { allowed: bool },
    /// Portal helper finished with the portal of `connection`
    PortalHelperDone { connection: ActivePath, result: u32 },
    /// Answer to a connectivity check requested for `connection`
    ConnectivityCheckResult { connection: ActivePath, state: ConnectivityState },
}

/// Client-side view of NetworkManager
#[derive(Debug, Clone, Default)]
pub struct NetworkState {
    pub nm_running: bool,
    pub networking_enabled: bool,
    pub wireless_enabled: bool,
    pub state: NmState,
    pub connectivity: ConnectivityState,
    pub primary_connection: Option<ActivePath>,
    pub activating_connection: Option<ActivePath>,
    pub devices: HashMap<DevicePath, Device>,
    pub access_points: HashMap<ApPath, AccessPoint>,
    pub connections: HashMap<ConnectionPath, Connection>,
    pub active_connections: HashMap<ActivePath, ActiveConnection>,
}

impl NetworkState {
    pub fn device(&self, path: &DevicePath) -> Option<&Device> {
        self.devices.get(path)
    }

    pub fn access_point(&self, path: &ApPath) -> Option<&AccessPoint> {
        self.access_points.get(path)
    }

    pub fn connection(&self, path: &ConnectionPath) -> Option<&Connection> {
        self.connections.get(path)
    }

    pub fn active(&self, path: &ActivePath) -> Option<&ActiveConnection> {
        self.active_connections.get(path)
    }

    /// Active connection of `device`, if NetworkManager already told us
    /// about it
    pub fn device_active(&self, device: &DevicePath) -> Option<&ActiveConnection> {
        self.device(device)
            .and_then(|d| d.active_connection.as_ref())
            .and_then(|a| self.active(a))
    }

    /// Activation state of whatever is active on `device`
    pub fn device_active_state(&self, device: &DevicePath) -> ActiveConnectionState {
        self.device_active(device)
            .map(|a| a.state)
            .unwrap_or(ActiveConnectionState::Deactivated)
    }

    /// Saved profile behind the active connection of `device`
    pub fn device_connection(&self, device: &DevicePath) -> Option<&Connection> {
        self.device_active(device)
            .and_then(|a| a.connection.as_ref())
            .and_then(|c| self.connection(c))
    }

    /// False only when `device` carries the primary connection and the
    /// connectivity check did not reach the internet
    pub fn can_reach_internet(&self, device: &DevicePath) -> bool {
        let active = self.device(device).and_then(|d| d.active_connection.as_ref());
        if self.primary_connection.as_ref() != active {
            return true;
        }
        self.connectivity == ConnectivityState::Full
    }

    /// Primary connection, falling back to the one being activated
    pub fn main_connection(&self) -> Option<&ActiveConnection> {
        self.primary_connection
            .as_ref()
            .and_then(|p| self.active(p))
            .or_else(|| self.activating_connection.as_ref().and_then(|p| self.active(p)))
    }

    fn device_mut(&mut self, path: &DevicePath) -> Option<&mut Device> {
        let device = self.devices.get_mut(path);
        if device.is_none() {
            debug!("Event for unknown device {}", path);
        }
        device
    }

    /// Fold `event` into the mirror
    pub fn apply(&mut self, event: &NetEvent) {
        match event {
            NetEvent::NmRunning { running } => self.nm_running = *running,
            NetEvent::NetworkingEnabled { enabled } => self.networking_enabled = *enabled,
            NetEvent::WirelessEnabled { enabled } => self.wireless_enabled = *enabled,
            NetEvent::StateChanged { state } => self.state = *state,
            NetEvent::Connectivity { state } => self.connectivity = *state,
            NetEvent::PrimaryConnection { active } => self.primary_connection = active.clone(),
            NetEvent::ActivatingConnection { active } => self.activating_connection = active.clone(),

            NetEvent::DeviceAdded { device } => {
                self.devices.insert(device.path.clone(), device.clone());
            }
            NetEvent::DeviceRemoved { device } => {
                self.devices.remove(device);
            }
            NetEvent::DeviceStateChanged { device, new, .. } => {
                if let Some(d) = self.device_mut(device) {
                    d.state = *new;
                }
            }
            NetEvent::DeviceActiveConnection { device, active } => {
                if let Some(d) = self.device_mut(device) {
                    d.active_connection = active.clone();
                }
            }
            NetEvent::DeviceInterface { device, interface } => {
                if let Some(d) = self.device_mut(device) {
                    d.interface = interface.clone();
                }
            }
            NetEvent::DeviceCarrier { device, carrier } => {
                if let Some(d) = self.device_mut(device) {
                    d.carrier = *carrier;
                }
            }
            NetEvent::DeviceAvailableConnections { device, connections } => {
                if let Some(d) = self.device_mut(device) {
                    d.available_connections = connections.clone();
                }
            }
            NetEvent::DeviceActiveAccessPoint { device, ap } => {
                if let Some(d) = self.device_mut(device) {
                    d.active_access_point = ap.clone();
                }
            }
            NetEvent::ModemChanged { device, modem } => {
                if let Some(d) = self.device_mut(device) {
                    d.modem = Some(modem.clone());
                }
            }

            NetEvent::AccessPointAdded { ap, .. } => {
                self.access_points.insert(ap.path.clone(), ap.clone());
            }
            NetEvent::AccessPointRemoved { ap, .. } => {
                self.access_points.remove(ap);
            }
            NetEvent::AccessPointStrength { ap, strength } => match self.access_points.get_mut(ap) {
                Some(entry) => entry.strength = *strength,
                None => debug!("Strength change for unknown access point {}", ap),
            },
            NetEvent::AccessPointSsid { ap, ssid } => match self.access_points.get_mut(ap) {
                Some(entry) => entry.ssid = ssid.clone(),
                None => debug!("SSID change for unknown access point {}", ap),
            },

            NetEvent::ConnectionAdded { connection } | NetEvent::ConnectionUpdated { connection } => {
                self.connections.insert(connection.path.clone(), connection.clone());
            }
            NetEvent::ConnectionRemoved { connection } => {
                self.connections.remove(connection);
            }

            NetEvent::ActiveConnectionAdded { active } => {
                self.active_connections.insert(active.path.clone(), active.clone());
            }
            NetEvent::ActiveConnectionRemoved { active } => {
                self.active_connections.remove(active);
            }
            NetEvent::ActiveConnectionState { active, state, reason } => {
                match self.active_connections.get_mut(active) {
                    Some(entry) => {
                        entry.state = *state;
                        entry.reason = *reason;
                    }
                    None => warn!("State change for unknown active connection {}", active),
                }
            }

            NetEvent::PermissionChanged { .. }
            | NetEvent::PortalHelperDone { .. }
            | NetEvent::ConnectivityCheckResult { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_connection_valid() {
        let mut eth = Device::new("/dev/1", DeviceType::Ethernet, "enp3s0");
        eth.hw_address = Some("AA:BB:CC:DD:EE:FF".into());

        let mut office = Connection::new("/conn/1", "u1", "Office", "802-3-ethernet");
        assert!(eth.connection_valid(&office));

        office.interface_name = Some("enp4s0".into());
        assert!(!eth.connection_valid(&office));

        office.interface_name = None;
        office.mac_address = Some("aa:bb:cc:dd:ee:ff".into());
        assert!(eth.connection_valid(&office));

        let wifi = Connection::new("/conn/2", "u2", "Home", "802-11-wireless");
        assert!(!eth.connection_valid(&wifi));
    }

    #[test]
    fn test_ap_connection_valid() {
        let ap = AccessPoint::new("/ap/1", b"Home", 70);
        let mut home = Connection::new("/conn/1", "u1", "Home", "802-11-wireless");
        assert!(!ap.connection_valid(&home));
        home.ssid = Some(b"Home".to_vec());
        assert!(ap.connection_valid(&home));
        home.ssid = Some(b"Other".to_vec());
        assert!(!ap.connection_valid(&home));
    }

    #[test]
    fn test_ssid_label() {
        assert_eq!(ssid_to_label(b"Cafe"), "Cafe");
        assert_eq!(ssid_to_label(&[0xff, 0xfe]), "<unknown>");
    }

    #[test]
    fn test_apply_and_queries() {
        let mut net = NetworkState::default();
        let mut dev = Device::new("/dev/1", DeviceType::Wifi, "wlan0");
        dev.active_connection = Some("/active/1".into());
        net.apply(&NetEvent::DeviceAdded { device: dev });
        net.apply(&NetEvent::ActiveConnectionAdded {
            active: ActiveConnection {
                path: "/active/1".into(),
                connection: Some("/conn/1".into()),
                uuid: "u1".into(),
                conn_type: "802-11-wireless".into(),
                state: ActiveConnectionState::Activating,
                reason: ActiveConnectionStateReason::NONE,
                devices: vec!["/dev/1".into()],
            },
        });
        let path = DevicePath::from("/dev/1");
        assert_eq!(net.device_active_state(&path), ActiveConnectionState::Activating);

        net.apply(&NetEvent::PrimaryConnection {
            active: Some("/active/1".into()),
        });
        net.apply(&NetEvent::Connectivity {
            state: ConnectivityState::Portal,
        });
        assert!(!net.can_reach_internet(&path));
        assert_eq!(net.main_connection().map(|a| a.uuid.as_str()), Some("u1"));

        net.apply(&NetEvent::ActiveConnectionState {
            active: "/active/1".into(),
            state: ActiveConnectionState::Activated,
            reason: ActiveConnectionStateReason::NONE,
        });
        assert_eq!(net.device_active_state(&path), ActiveConnectionState::Activated);
    }

    #[test]
    fn test_event_json() {
        let json = r#"{"type":"device_carrier","device":"/dev/1","carrier":false}"#;
        let event: NetEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            NetEvent::DeviceCarrier {
                device: "/dev/1".into(),
                carrier: false
            }
        );
    }
}
