//! Wireless networks
//!
//! Access points sharing SSID, mode and security type are shown as a single
//! network. A network lives as long as it has at least one access point.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::applet::AppletAction;
use super::model::{ssid_to_label, AccessPoint, Connection};
use super::security::ap_security_type;
use super::sorter::collate;
use super::types::{signal_to_icon, ApPath, ConnectionPath, DevicePath, Mode80211, SecurityType, WifiCapabilities};

/// Ordering of network rows, strongest candidates first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSortKey {
    pub has_connections: bool,
    pub ap_count: usize,
    pub strength: u8,
    pub secure: bool,
    pub name: String,
}

impl Ord for NetworkSortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .has_connections
            .cmp(&self.has_connections)
            .then_with(|| other.ap_count.cmp(&self.ap_count))
            .then_with(|| other.strength.cmp(&self.strength))
            .then_with(|| other.secure.cmp(&self.secure))
            .then_with(|| collate(&self.name, &other.name))
    }
}

impl PartialOrd for NetworkSortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct WirelessNetwork {
    ssid: Vec<u8>,
    mode: Mode80211,
    security: SecurityType,
    name: String,
    aps: BTreeMap<ApPath, AccessPoint>,
    best_ap: Option<ApPath>,
    connections: Vec<ConnectionPath>,
}

impl Default for WirelessNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl WirelessNetwork {
    pub fn new() -> Self {
        Self {
            ssid: Vec::new(),
            mode: Mode80211::Unknown,
            security: SecurityType::None,
            name: String::new(),
            aps: BTreeMap::new(),
            best_ap: None,
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    pub fn mode(&self) -> Mode80211 {
        self.mode
    }

    pub fn security(&self) -> SecurityType {
        self.security
    }

    pub fn secure(&self) -> bool {
        self.security != SecurityType::None
    }

    /// Strength of the best access point
    pub fn strength(&self) -> u8 {
        self.best_ap
            .as_ref()
            .and_then(|p| self.aps.get(p))
            .map(|ap| ap.strength)
            .unwrap_or(0)
    }

    pub fn best_access_point(&self) -> Option<&ApPath> {
        self.best_ap.as_ref()
    }

    pub fn icon_name(&self) -> String {
        if self.mode == Mode80211::Adhoc {
            return "network-workgroup-symbolic".to_string();
        }
        if self.best_ap.is_none() {
            return String::new();
        }
        format!("network-wireless-signal-{}-symbolic", signal_to_icon(self.strength()))
    }

    /// Whether the device is associated with one of our access points
    pub fn is_active(&self, active_ap: Option<&ApPath>) -> bool {
        active_ap.is_some_and(|ap| self.aps.contains_key(ap))
    }

    pub fn has_access_point(&self, ap: &ApPath) -> bool {
        self.aps.contains_key(ap)
    }

    pub fn has_access_points(&self) -> bool {
        !self.aps.is_empty()
    }

    pub fn access_point_count(&self) -> usize {
        self.aps.len()
    }

    /// Whether `ap` belongs in this network
    pub fn check_access_point(&self, ap: &AccessPoint, caps: WifiCapabilities) -> bool {
        let Some(ssid) = ap.ssid() else {
            return false;
        };
        let security = ap_security_type(caps, ap);
        if security == SecurityType::Invalid {
            return false;
        }
        if self.aps.is_empty() {
            return true;
        }
        self.ssid == ssid && self.mode == ap.mode && self.security == security
    }

    /// Add `ap` if it belongs here. The first access point defines the
    /// network's SSID, mode and security.
    pub fn add_access_point(&mut self, ap: &AccessPoint, caps: WifiCapabilities) -> bool {
        if !self.check_access_point(ap, caps) {
            return false;
        }
        if self.aps.is_empty() {
            self.ssid = ap.ssid().map(<[u8]>::to_vec).unwrap_or_default();
            self.mode = ap.mode;
            self.security = ap_security_type(caps, ap);
            self.name = ssid_to_label(&self.ssid);
        }
        self.aps.insert(ap.path.clone(), ap.clone());
        self.update_best_ap();
        true
    }

    pub fn remove_access_point(&mut self, ap: &ApPath) -> bool {
        if self.aps.remove(ap).is_none() {
            return false;
        }
        self.update_best_ap();
        true
    }

    /// Record a strength change; returns false for foreign access points
    pub fn update_strength(&mut self, ap: &ApPath, strength: u8) -> bool {
        let Some(entry) = self.aps.get_mut(ap) else {
            return false;
        };
        entry.strength = strength;
        self.update_best_ap();
        true
    }

    fn update_best_ap(&mut self) {
        // Ties go to the first path
        self.best_ap = self
            .aps
            .values()
            .fold(None::<&AccessPoint>, |best, ap| match best {
                Some(b) if b.strength >= ap.strength => Some(b),
                _ => Some(ap),
            })
            .map(|ap| ap.path.clone());
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    pub fn connections(&self) -> &[ConnectionPath] {
        &self.connections
    }

    /// Keep the connections that target one of our access points
    pub fn check_connections<'a>(&mut self, connections: impl IntoIterator<Item = &'a Connection>) {
        self.connections = connections
            .into_iter()
            .filter(|c| self.aps.values().any(|ap| ap.connection_valid(c)))
            .map(|c| c.path.clone())
            .collect();
    }

    /// Enterprise networks need credentials set up in the settings panel
    pub fn can_autoconnect(&self) -> bool {
        !self.security.is_enterprise()
    }

    pub fn sort_key(&self) -> NetworkSortKey {
        NetworkSortKey {
            has_connections: self.has_connections(),
            ap_count: self.aps.len(),
            strength: self.strength(),
            secure: self.secure(),
            name: self.name.clone(),
        }
    }

    pub fn compare(&self, other: &WirelessNetwork) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    /// What activating the network's row should do
    pub fn activation(&self, device: &DevicePath) -> Option<AppletAction> {
        let ap = self.aps.keys().next()?;
        if let Some(connection) = self.connections.first() {
            return Some(AppletAction::ActivateConnection {
                connection: connection.clone(),
                device: Some(device.clone()),
                specific_object: None,
            });
        }
        if !self.can_autoconnect() {
            return Some(AppletAction::LaunchSettingsPanel {
                panel: "wifi".to_string(),
                args: vec![
                    "connect-8021x-wifi".to_string(),
                    device.to_string(),
                    ap.to_string(),
                ],
            });
        }
        Some(AppletAction::AddAndActivate {
            device: device.clone(),
            access_point: Some(ap.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::sorter::ItemSorter;
    use crate::network::types::{ApFlags, ApSecurityFlags};

    fn caps() -> WifiCapabilities {
        WifiCapabilities::CIPHER_TKIP | WifiCapabilities::CIPHER_CCMP | WifiCapabilities::WPA | WifiCapabilities::RSN
    }

    fn secured(path: &str, ssid: &[u8], strength: u8) -> AccessPoint {
        AccessPoint {
            flags: ApFlags::PRIVACY,
            rsn_flags: ApSecurityFlags::KEY_MGMT_PSK | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP,
            ..AccessPoint::new(path, ssid, strength)
        }
    }

    fn enterprise(path: &str, ssid: &[u8]) -> AccessPoint {
        AccessPoint {
            flags: ApFlags::PRIVACY,
            rsn_flags: ApSecurityFlags::KEY_MGMT_802_1X | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP,
            ..AccessPoint::new(path, ssid, 60)
        }
    }

    #[test]
    fn test_grouping_by_ssid_mode_and_security() {
        let mut net = WirelessNetwork::new();
        assert!(net.add_access_point(&secured("/ap/1", b"Home", 40), caps()));
        assert!(net.add_access_point(&secured("/ap/2", b"Home", 70), caps()));
        assert_eq!(net.name(), "Home");
        assert_eq!(net.security(), SecurityType::Wpa2Psk);

        // Same SSID, different security
        assert!(!net.add_access_point(&AccessPoint::new("/ap/3", b"Home", 90), caps()));
        // Same security, different SSID
        assert!(!net.add_access_point(&secured("/ap/4", b"Cafe", 90), caps()));
        // Adhoc cell with the same name
        let mut adhoc = secured("/ap/5", b"Home", 90);
        adhoc.mode = Mode80211::Adhoc;
        assert!(!net.add_access_point(&adhoc, caps()));

        assert_eq!(net.access_point_count(), 2);
        assert_eq!(net.best_access_point().map(ApPath::as_str), Some("/ap/2"));
        assert_eq!(net.icon_name(), "network-wireless-signal-good-symbolic");
    }

    #[test]
    fn test_hidden_ap_is_rejected() {
        let mut net = WirelessNetwork::new();
        let mut hidden = AccessPoint::new("/ap/1", b"", 50);
        assert!(!net.add_access_point(&hidden, caps()));
        hidden.ssid = None;
        assert!(!net.check_access_point(&hidden, caps()));
    }

    #[test]
    fn test_best_ap_follows_strength() {
        let mut net = WirelessNetwork::new();
        net.add_access_point(&secured("/ap/1", b"Home", 40), caps());
        net.add_access_point(&secured("/ap/2", b"Home", 70), caps());
        assert!(net.update_strength(&ApPath::from("/ap/1"), 90));
        assert_eq!(net.best_access_point().map(ApPath::as_str), Some("/ap/1"));
        assert_eq!(net.strength(), 90);
        assert!(!net.update_strength(&ApPath::from("/ap/9"), 10));

        assert!(net.remove_access_point(&ApPath::from("/ap/1")));
        assert_eq!(net.strength(), 70);
        assert!(net.remove_access_point(&ApPath::from("/ap/2")));
        assert!(!net.has_access_points());
        assert_eq!(net.icon_name(), "");
    }

    #[test]
    fn test_active_state() {
        let mut net = WirelessNetwork::new();
        net.add_access_point(&secured("/ap/1", b"Home", 40), caps());
        assert!(net.is_active(Some(&ApPath::from("/ap/1"))));
        assert!(!net.is_active(Some(&ApPath::from("/ap/2"))));
        assert!(!net.is_active(None));
    }

    fn network(aps: &[AccessPoint]) -> WirelessNetwork {
        let mut net = WirelessNetwork::new();
        for ap in aps {
            assert!(net.add_access_point(ap, caps()));
        }
        net
    }

    #[test]
    fn test_ordering() {
        let known = {
            let mut net = network(&[AccessPoint::new("/ap/1", b"Known", 10)]);
            let mut conn = Connection::new("/conn/1", "u1", "Known", "802-11-wireless");
            conn.ssid = Some(b"Known".to_vec());
            net.check_connections([&conn]);
            net
        };
        let crowded = network(&[
            AccessPoint::new("/ap/2", b"Crowded", 20),
            AccessPoint::new("/ap/3", b"Crowded", 20),
        ]);
        let strong = network(&[AccessPoint::new("/ap/4", b"Strong", 90)]);
        let secure = network(&[secured("/ap/5", b"Secure", 50)]);
        let open_b = network(&[AccessPoint::new("/ap/6", b"beta", 50)]);
        let open_a = network(&[AccessPoint::new("/ap/7", b"Alpha", 50)]);

        let mut all = vec![&open_b, &secure, &strong, &open_a, &crowded, &known];
        all.sort_by(|a, b| a.compare(b));
        let names: Vec<&str> = all.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["Known", "Crowded", "Strong", "Secure", "Alpha", "beta"]);
    }

    #[test]
    fn test_saved_connection_outranks_strength() {
        let known = |ap: AccessPoint, path: &str| {
            let mut net = network(&[ap]);
            let mut conn = Connection::new(path, path, net.name(), "802-11-wireless");
            conn.ssid = Some(net.ssid().to_vec());
            net.check_connections([&conn]);
            net
        };
        let g1 = known(AccessPoint::new("/ap/1", b"G1", 40), "/conn/1");
        let g2 = network(&[AccessPoint::new("/ap/2", b"G2", 90)]);
        let g3 = known(AccessPoint::new("/ap/3", b"G3", 90), "/conn/3");

        assert_eq!(g3.compare(&g1), Ordering::Less);
        assert_eq!(g1.compare(&g2), Ordering::Less);

        let mut sorter: ItemSorter<&str, NetworkSortKey> = ItemSorter::default();
        for net in [&g1, &g2, &g3] {
            sorter.upsert(net.name(), net.sort_key());
        }
        assert_eq!(sorter.iter().copied().collect::<Vec<_>>(), vec!["G3", "G1", "G2"]);
        assert_eq!(sorter.position(&"G3"), Some(0));
        assert_eq!(sorter.position(&"G1"), Some(1));
        assert_eq!(sorter.position(&"G2"), Some(2));
    }

    #[test]
    fn test_activation() {
        let device = DevicePath::from("/dev/wifi");

        let mut home = network(&[secured("/ap/1", b"Home", 40)]);
        assert_eq!(
            home.activation(&device),
            Some(AppletAction::AddAndActivate {
                device: device.clone(),
                access_point: Some(ApPath::from("/ap/1")),
            })
        );

        let mut conn = Connection::new("/conn/1", "u1", "Home", "802-11-wireless");
        conn.ssid = Some(b"Home".to_vec());
        home.check_connections([&conn]);
        assert_eq!(
            home.activation(&device),
            Some(AppletAction::ActivateConnection {
                connection: ConnectionPath::from("/conn/1"),
                device: Some(device.clone()),
                specific_object: None,
            })
        );

        let corp = network(&[enterprise("/ap/2", b"Corp")]);
        assert!(!corp.can_autoconnect());
        assert_eq!(
            corp.activation(&device),
            Some(AppletAction::LaunchSettingsPanel {
                panel: "wifi".into(),
                args: vec!["connect-8021x-wifi".into(), "/dev/wifi".into(), "/ap/2".into()],
            })
        );

        assert_eq!(WirelessNetwork::new().activation(&device), None);
    }
}
