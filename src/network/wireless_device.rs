//! Wi-Fi device rows
//!
//! Access points are merged into [`WirelessNetwork`]s, one row per network,
//! sorted strongest candidate first. Rows are hidden past
//! `max_visible_networks`, and outside a user session unless the network can
//! be joined without the settings panel.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::applet::Ctx;
use super::model::{ssid_to_label, AccessPoint, Device, NetworkState};
use super::sorter::ItemSorter;
use super::types::*;
use super::wireless::{NetworkSortKey, WirelessNetwork};
use crate::error::Result;
use crate::popup::{MenuItem, NodeId, Ornament};

/// Identity of a network row within one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(u32);

#[derive(Debug)]
struct NetworkRow {
    network: WirelessNetwork,
    node: NodeId,
}

#[derive(Debug)]
pub struct WirelessDeviceItem {
    path: DevicePath,
    section: NodeId,
    /// Creation order, so the oldest matching network wins
    networks: BTreeMap<NetworkId, NetworkRow>,
    sorter: ItemSorter<NetworkId, NetworkSortKey>,
    /// Access points waiting for an SSID
    pending: BTreeSet<ApPath>,
    next_id: u32,
    device_name: String,
}

impl WirelessDeviceItem {
    pub fn new(cx: &mut Ctx, device: &Device) -> Result<Self> {
        let section = cx.tree.new_section();
        cx.tree
            .add_settings_action(section, "Wi-Fi Settings", "gnome-wifi-panel.desktop")?;
        Ok(Self {
            path: device.path.clone(),
            section,
            networks: BTreeMap::new(),
            sorter: ItemSorter::default(),
            pending: BTreeSet::new(),
            next_id: 0,
            device_name: String::new(),
        })
    }

    pub fn path(&self) -> &DevicePath {
        &self.path
    }

    pub fn section(&self) -> NodeId {
        self.section
    }

    pub fn set_device_name(&mut self, name: &str) {
        self.device_name = name.to_string();
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    /// Networks in display order
    pub fn networks(&self) -> impl Iterator<Item = &WirelessNetwork> {
        self.sorter
            .iter()
            .filter_map(|id| self.networks.get(id))
            .map(|row| &row.network)
    }

    fn is_hotspot(&self, net: &NetworkState) -> bool {
        net.device_connection(&self.path).is_some_and(|c| c.is_shared())
    }

    fn active_access_point<'a>(&self, net: &'a NetworkState) -> Option<&'a AccessPoint> {
        net.device(&self.path)
            .and_then(|d| d.active_access_point.as_ref())
            .and_then(|ap| net.access_point(ap))
    }

    pub fn name(&self, net: &NetworkState) -> String {
        if self.is_hotspot(net) {
            return format!("{} Hotspot", self.device_name);
        }
        match self.active_access_point(net).and_then(AccessPoint::ssid) {
            Some(ssid) => ssid_to_label(ssid),
            None => self.device_name.clone(),
        }
    }

    pub fn icon_name(&self, net: &NetworkState) -> String {
        if !net.wireless_enabled {
            return "network-wireless-disabled-symbolic".to_string();
        }
        match net.device_active_state(&self.path) {
            ActiveConnectionState::Activating => "network-wireless-acquiring-symbolic".to_string(),
            ActiveConnectionState::Activated => {
                if self.is_hotspot(net) {
                    return "network-wireless-hotspot-symbolic".to_string();
                }
                if !net.can_reach_internet(&self.path) {
                    return "network-wireless-no-route-symbolic".to_string();
                }
                match self.active_access_point(net) {
                    Some(ap) => format!("network-wireless-signal-{}-symbolic", signal_to_icon(ap.strength)),
                    None => {
                        if net.device(&self.path).is_some_and(|d| d.mode != Mode80211::Adhoc) {
                            info!("An active wireless connection, in infrastructure mode, involves no access point?");
                        }
                        "network-wireless-connected-symbolic".to_string()
                    }
                }
            }
            _ => "network-wireless-signal-none-symbolic".to_string(),
        }
    }

    fn capabilities(&self, net: &NetworkState) -> WifiCapabilities {
        net.device(&self.path)
            .map(|d| d.wireless_capabilities)
            .unwrap_or_default()
    }

    pub fn add_access_point(&mut self, cx: &mut Ctx, ap: &AccessPoint) -> Result<()> {
        if ap.ssid().is_none() {
            // Not visible yet, wait for it to get an SSID
            self.pending.insert(ap.path.clone());
            return Ok(());
        }
        self.pending.remove(&ap.path);

        let caps = self.capabilities(&cx.net);
        let existing = self
            .networks
            .iter()
            .find(|(_, row)| row.network.check_access_point(ap, caps))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                let mut network = WirelessNetwork::new();
                if !network.add_access_point(ap, caps) {
                    debug!("Ignoring access point {} with unusable security", ap.path);
                    return Ok(());
                }
                let id = NetworkId(self.next_id);
                self.next_id += 1;
                let node = cx.tree.new_item(MenuItem::image(network.name(), ""));
                let pos = self.sorter.upsert(id, network.sort_key());
                cx.tree.add_menu_item(self.section, node, Some(pos))?;
                self.networks.insert(id, NetworkRow { network, node });
                id
            }
        };

        if let Some(row) = self.networks.get_mut(&id) {
            if existing.is_some() {
                row.network.add_access_point(ap, caps);
            }
            let connections = available_connections(&cx.net, &self.path);
            row.network.check_connections(connections);
        }
        self.sync(cx)
    }

    pub fn remove_access_point(&mut self, cx: &mut Ctx, ap: &ApPath) -> Result<()> {
        if self.pending.remove(ap) {
            return Ok(());
        }
        let Some(id) = self
            .networks
            .iter_mut()
            .find_map(|(id, row)| row.network.remove_access_point(ap).then_some(*id))
        else {
            return Ok(());
        };

        if self.networks.get(&id).is_some_and(|row| !row.network.has_access_points()) {
            if let Some(row) = self.networks.remove(&id) {
                self.sorter.delete(&id);
                cx.tree.destroy(row.node);
            }
        }
        self.sync(cx)
    }

    /// An access point's SSID changed; pending ones may now be shown
    pub fn ssid_changed(&mut self, cx: &mut Ctx, ap: &ApPath) -> Result<()> {
        if !self.pending.contains(ap) {
            return Ok(());
        }
        match cx.net.access_point(ap).cloned() {
            Some(ap) if ap.ssid().is_some() => self.add_access_point(cx, &ap),
            _ => Ok(()),
        }
    }

    pub fn strength_changed(&mut self, cx: &mut Ctx, ap: &ApPath, strength: u8) -> Result<()> {
        let mut changed = false;
        for row in self.networks.values_mut() {
            changed |= row.network.update_strength(ap, strength);
        }
        let is_active = self.active_access_point(&cx.net).is_some_and(|a| &a.path == ap);
        if changed || is_active {
            self.sync(cx)?;
        }
        Ok(())
    }

    pub fn available_connections_changed(&mut self, cx: &mut Ctx) -> Result<()> {
        let connections = available_connections(&cx.net, &self.path);
        for row in self.networks.values_mut() {
            row.network.check_connections(connections.iter().copied());
        }
        self.sync(cx)
    }

    /// Refresh every row and re-sort
    pub fn sync(&mut self, cx: &mut Ctx) -> Result<()> {
        let active_ap = cx
            .net
            .device(&self.path)
            .and_then(|d| d.active_access_point.clone());

        // Several keys may have changed at once, so re-sort from scratch
        self.sorter = ItemSorter::default();
        for (id, row) in &self.networks {
            let network = &row.network;
            cx.tree.set_label(row.node, network.name());
            cx.tree.set_icon(row.node, &network.icon_name());
            let ornament = if network.is_active(active_ap.as_ref()) {
                Ornament::Check
            } else {
                Ornament::None
            };
            cx.tree.set_ornament(row.node, ornament);
            self.sorter.upsert(*id, network.sort_key());
        }
        for (pos, id) in self.sorter.iter().enumerate() {
            if let Some(row) = self.networks.get(id) {
                cx.tree.move_menu_item(self.section, row.node, pos)?;
            }
        }
        self.update_visibility(cx);
        Ok(())
    }

    fn update_visibility(&self, cx: &mut Ctx) {
        let has_windows = cx.tree.policy().has_windows;
        let max = cx.config.max_visible_networks;

        let mut shown = 0;
        for id in &self.sorter {
            let Some(row) = self.networks.get(id) else {
                continue;
            };
            let wanted = has_windows || row.network.has_connections() || row.network.can_autoconnect();
            let visible = wanted && shown < max;
            if wanted {
                shown += 1;
            }
            cx.tree.set_visible(row.node, visible);
        }
    }

    pub fn item_activated(&mut self, cx: &mut Ctx, node: NodeId) -> bool {
        let Some(row) = self.networks.values().find(|row| row.node == node) else {
            return false;
        };
        if let Some(action) = row.network.activation(&self.path) {
            cx.actions.push(action);
        }
        true
    }
}

fn available_connections<'a>(net: &'a NetworkState, device: &DevicePath) -> Vec<&'a super::model::Connection> {
    net.device(device)
        .map(|d| {
            d.available_connections
                .iter()
                .filter_map(|p| net.connection(p))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::applet::tests::ctx;
    use crate::network::applet::AppletAction;
    use crate::network::model::{ActiveConnection, Connection, NetEvent};
    use crate::session::SessionPolicy;

    fn wifi(cx: &mut Ctx) -> WirelessDeviceItem {
        let mut device = Device::new("/dev/wlan", DeviceType::Wifi, "wlan0");
        device.wireless_capabilities = WifiCapabilities::CIPHER_CCMP | WifiCapabilities::RSN;
        cx.net.apply(&NetEvent::DeviceAdded { device: device.clone() });
        cx.net.wireless_enabled = true;
        let mut item = WirelessDeviceItem::new(cx, &device).unwrap();
        item.set_device_name("Wi-Fi");
        item
    }

    fn add(cx: &mut Ctx, item: &mut WirelessDeviceItem, ap: AccessPoint) {
        cx.net.apply(&NetEvent::AccessPointAdded {
            device: "/dev/wlan".into(),
            ap: ap.clone(),
        });
        item.add_access_point(cx, &ap).unwrap();
    }

    fn rows(cx: &Ctx, item: &WirelessDeviceItem) -> Vec<String> {
        cx.tree
            .menu_items(item.section())
            .into_iter()
            .filter(|&n| cx.tree.is_visible(n))
            .filter_map(|n| cx.tree.item(n).map(|i| i.label().to_string()))
            .collect()
    }

    #[test]
    fn test_access_points_merge_into_networks() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Home", 30));
        add(&mut cx, &mut item, AccessPoint::new("/ap/2", b"Cafe", 80));
        add(&mut cx, &mut item, AccessPoint::new("/ap/3", b"Home", 60));

        assert_eq!(item.network_count(), 2);
        assert_eq!(rows(&cx, &item), vec!["Home", "Cafe", "Wi-Fi Settings"]);

        item.remove_access_point(&mut cx, &ApPath::from("/ap/3")).unwrap();
        assert_eq!(rows(&cx, &item), vec!["Cafe", "Home", "Wi-Fi Settings"]);

        item.remove_access_point(&mut cx, &ApPath::from("/ap/1")).unwrap();
        assert_eq!(item.network_count(), 1);
        assert_eq!(rows(&cx, &item), vec!["Cafe", "Wi-Fi Settings"]);
    }

    #[test]
    fn test_hidden_access_point_waits_for_ssid() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        let mut hidden = AccessPoint::new("/ap/1", b"", 50);
        hidden.ssid = None;
        add(&mut cx, &mut item, hidden);
        assert_eq!(item.network_count(), 0);

        cx.net.apply(&NetEvent::AccessPointSsid {
            ap: "/ap/1".into(),
            ssid: Some(b"Late".to_vec()),
        });
        item.ssid_changed(&mut cx, &ApPath::from("/ap/1")).unwrap();
        assert_eq!(rows(&cx, &item), vec!["Late", "Wi-Fi Settings"]);

        // Already shown: further changes are not re-added
        item.ssid_changed(&mut cx, &ApPath::from("/ap/1")).unwrap();
        assert_eq!(item.network_count(), 1);
    }

    #[test]
    fn test_strength_resorts_rows() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Home", 30));
        add(&mut cx, &mut item, AccessPoint::new("/ap/2", b"Cafe", 60));
        assert_eq!(rows(&cx, &item), vec!["Cafe", "Home", "Wi-Fi Settings"]);

        cx.net.apply(&NetEvent::AccessPointStrength {
            ap: "/ap/1".into(),
            strength: 90,
        });
        item.strength_changed(&mut cx, &ApPath::from("/ap/1"), 90).unwrap();
        assert_eq!(rows(&cx, &item), vec!["Home", "Cafe", "Wi-Fi Settings"]);
    }

    #[test]
    fn test_saved_networks_outrank_stronger_ones() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        for (path, uuid, name) in [("/conn/1", "u1", "Lab"), ("/conn/3", "u3", "Office")] {
            let mut conn = Connection::new(path, uuid, name, "802-11-wireless");
            conn.ssid = Some(name.as_bytes().to_vec());
            cx.net.apply(&NetEvent::ConnectionAdded { connection: conn });
        }
        cx.net.apply(&NetEvent::DeviceAvailableConnections {
            device: "/dev/wlan".into(),
            connections: vec!["/conn/1".into(), "/conn/3".into()],
        });

        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Lab", 40));
        add(&mut cx, &mut item, AccessPoint::new("/ap/2", b"Guest", 90));
        add(&mut cx, &mut item, AccessPoint::new("/ap/3", b"Office", 90));
        assert_eq!(rows(&cx, &item), vec!["Office", "Lab", "Guest", "Wi-Fi Settings"]);

        // The same order when the connections show up after the networks
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Lab", 40));
        add(&mut cx, &mut item, AccessPoint::new("/ap/2", b"Guest", 90));
        add(&mut cx, &mut item, AccessPoint::new("/ap/3", b"Office", 90));
        assert_eq!(rows(&cx, &item), vec!["Guest", "Office", "Lab", "Wi-Fi Settings"]);

        for (path, uuid, name) in [("/conn/1", "u1", "Lab"), ("/conn/3", "u3", "Office")] {
            let mut conn = Connection::new(path, uuid, name, "802-11-wireless");
            conn.ssid = Some(name.as_bytes().to_vec());
            cx.net.apply(&NetEvent::ConnectionAdded { connection: conn });
        }
        cx.net.apply(&NetEvent::DeviceAvailableConnections {
            device: "/dev/wlan".into(),
            connections: vec!["/conn/1".into(), "/conn/3".into()],
        });
        item.available_connections_changed(&mut cx).unwrap();
        assert_eq!(rows(&cx, &item), vec!["Office", "Lab", "Guest", "Wi-Fi Settings"]);
    }

    #[test]
    fn test_visibility_cap_and_session() {
        let mut cx = ctx();
        cx.config.max_visible_networks = 2;
        let mut item = wifi(&mut cx);
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            add(
                &mut cx,
                &mut item,
                AccessPoint::new(&format!("/ap/{i}"), name.as_bytes(), 50),
            );
        }
        assert_eq!(rows(&cx, &item), vec!["A", "B", "Wi-Fi Settings"]);

        // Outside a user session only networks joinable without settings show
        let mut corp = AccessPoint::new("/ap/9", b"Corp", 99);
        corp.flags = ApFlags::PRIVACY;
        corp.rsn_flags = ApSecurityFlags::KEY_MGMT_802_1X | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP;
        cx.config.max_visible_networks = 8;
        add(&mut cx, &mut item, corp);
        assert_eq!(rows(&cx, &item), vec!["Corp", "A", "B", "C", "Wi-Fi Settings"]);

        cx.tree.session_updated(SessionPolicy::greeter());
        item.sync(&mut cx).unwrap();
        assert_eq!(rows(&cx, &item), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_active_network_and_device_name() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Home", 85));
        assert_eq!(item.name(&cx.net), "Wi-Fi");
        assert_eq!(item.icon_name(&cx.net), "network-wireless-signal-none-symbolic");

        let mut conn = Connection::new("/conn/1", "u1", "Home", "802-11-wireless");
        conn.ssid = Some(b"Home".to_vec());
        cx.net.apply(&NetEvent::ConnectionAdded { connection: conn });
        cx.net.apply(&NetEvent::ActiveConnectionAdded {
            active: ActiveConnection {
                path: "/active/1".into(),
                connection: Some("/conn/1".into()),
                uuid: "u1".into(),
                conn_type: "802-11-wireless".into(),
                state: ActiveConnectionState::Activated,
                reason: ActiveConnectionStateReason::NONE,
                devices: vec!["/dev/wlan".into()],
            },
        });
        cx.net.apply(&NetEvent::DeviceActiveConnection {
            device: "/dev/wlan".into(),
            active: Some("/active/1".into()),
        });
        cx.net.apply(&NetEvent::DeviceActiveAccessPoint {
            device: "/dev/wlan".into(),
            ap: Some("/ap/1".into()),
        });
        item.sync(&mut cx).unwrap();

        assert_eq!(item.name(&cx.net), "Home");
        assert_eq!(item.icon_name(&cx.net), "network-wireless-signal-excellent-symbolic");
        let node = cx.tree.first_menu_item(item.section()).unwrap();
        assert_eq!(cx.tree.item(node).unwrap().ornament(), Ornament::Check);

        cx.net.apply(&NetEvent::WirelessEnabled { enabled: false });
        assert_eq!(item.icon_name(&cx.net), "network-wireless-disabled-symbolic");
    }

    #[test]
    fn test_row_activation_uses_saved_connection() {
        let mut cx = ctx();
        let mut item = wifi(&mut cx);
        add(&mut cx, &mut item, AccessPoint::new("/ap/1", b"Home", 50));

        let mut conn = Connection::new("/conn/1", "u1", "Home", "802-11-wireless");
        conn.ssid = Some(b"Home".to_vec());
        cx.net.apply(&NetEvent::ConnectionAdded { connection: conn });
        cx.net.apply(&NetEvent::DeviceAvailableConnections {
            device: "/dev/wlan".into(),
            connections: vec!["/conn/1".into()],
        });
        item.available_connections_changed(&mut cx).unwrap();

        let node = cx.tree.first_menu_item(item.section()).unwrap();
        assert!(item.item_activated(&mut cx, node));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::ActivateConnection {
                connection: "/conn/1".into(),
                device: Some("/dev/wlan".into()),
                specific_object: None,
            })
        );
    }
}
