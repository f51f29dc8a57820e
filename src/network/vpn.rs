//! VPN section
//!
//! One switch per VPN or WireGuard profile, sorted by name. The switch
//! mirrors the profile's active connection; flipping it asks the network
//! stack to (de)activate and the switch snaps back until the state really
//! changes.

use std::collections::HashMap;

use tracing::debug;

use super::applet::{AppletAction, Ctx};
use super::model::{ActiveConnection, Connection, NetworkState};
use super::sorter::ItemSorter;
use super::types::*;
use crate::error::Result;
use crate::popup::{MenuItem, MenuTree, NodeId};

#[derive(Debug, Clone)]
struct VpnItem {
    node: NodeId,
    name: String,
    active: Option<ActivePath>,
}

impl VpnItem {
    fn state(&self, net: &NetworkState) -> ActiveConnectionState {
        self.active
            .as_ref()
            .and_then(|a| net.active(a))
            .map(|a| a.state)
            .unwrap_or(ActiveConnectionState::Deactivated)
    }

    fn icon_name(&self, net: &NetworkState) -> &'static str {
        match self.state(net) {
            ActiveConnectionState::Activating => "network-vpn-acquiring-symbolic",
            ActiveConnectionState::Activated => "network-vpn-symbolic",
            _ => "network-vpn-disabled-symbolic",
        }
    }
}

/// Whether the VPN section lists `connection`
fn should_handle(connection: &Connection) -> bool {
    !connection.is_slave() && connection.category() == ConnectionCategory::Vpn
}

/// Activation failed unless the user cancelled or disconnected
pub(crate) fn vpn_failed(state: ActiveConnectionState, reason: ActiveConnectionStateReason) -> bool {
    state == ActiveConnectionState::Deactivated
        && reason != ActiveConnectionStateReason::NO_SECRETS
        && reason != ActiveConnectionStateReason::USER_DISCONNECTED
}

#[derive(Debug)]
pub struct VpnSection {
    root: NodeId,
    inner: NodeId,
    items: HashMap<ConnectionPath, VpnItem>,
    sorter: ItemSorter<ConnectionPath, String>,
}

impl VpnSection {
    pub fn new(tree: &mut MenuTree) -> Result<Self> {
        let root = tree.new_section();
        let inner = tree.new_section();
        tree.add_menu_item(root, inner, None)?;
        tree.add_settings_action(root, "VPN Settings", "gnome-network-panel.desktop")?;
        Ok(Self {
            root,
            inner,
            items: HashMap::new(),
            sorter: ItemSorter::by_name(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add_connection(&mut self, cx: &mut Ctx, connection: &Connection) -> Result<()> {
        if self.items.contains_key(&connection.path) || !should_handle(connection) {
            return Ok(());
        }
        let node = cx.tree.new_item(MenuItem::switch(&connection.id, false));
        let pos = self.sorter.upsert(connection.path.clone(), connection.id.clone());
        cx.tree.add_menu_item(self.inner, node, Some(pos))?;
        self.items.insert(
            connection.path.clone(),
            VpnItem {
                node,
                name: connection.id.clone(),
                active: None,
            },
        );
        debug!("Added VPN connection {}", connection.id);
        self.sync_active_connections(cx);
        Ok(())
    }

    /// Profile settings changed; only the name matters here
    pub fn update_connection(&mut self, cx: &mut Ctx, connection: &Connection) -> Result<()> {
        let Some(item) = self.items.get_mut(&connection.path) else {
            return self.add_connection(cx, connection);
        };
        if item.name != connection.id {
            item.name = connection.id.clone();
            cx.tree.set_label(item.node, &connection.id);
            let pos = self.sorter.upsert(connection.path.clone(), connection.id.clone());
            cx.tree.move_menu_item(self.inner, item.node, pos)?;
        }
        Ok(())
    }

    pub fn remove_connection(&mut self, cx: &mut Ctx, connection: &ConnectionPath) {
        let Some(item) = self.items.remove(connection) else {
            return;
        };
        self.sorter.delete(connection);
        cx.tree.destroy(item.node);
    }

    /// Rebind every switch to the active connection of its profile
    pub fn sync_active_connections(&mut self, cx: &mut Ctx) {
        for item in self.items.values_mut() {
            item.active = None;
        }
        let bound: Vec<(ConnectionPath, ActivePath)> = cx
            .net
            .active_connections
            .values()
            .filter_map(|a: &ActiveConnection| Some((a.connection.clone()?, a.path.clone())))
            .collect();
        for (connection, active) in bound {
            if let Some(item) = self.items.get_mut(&connection) {
                item.active = Some(active);
            }
        }
        self.sync(cx);
    }

    /// An active connection changed state; returns true for a failed VPN
    /// activation
    pub fn active_state_changed(
        &mut self,
        cx: &mut Ctx,
        active: &ActivePath,
        state: ActiveConnectionState,
        reason: ActiveConnectionStateReason,
    ) -> bool {
        let ours = self.items.values().any(|i| i.active.as_ref() == Some(active));
        if !ours {
            return false;
        }
        self.sync(cx);
        vpn_failed(state, reason)
    }

    pub fn sync(&self, cx: &mut Ctx) {
        for item in self.items.values() {
            let on = item.state(&cx.net).is_active();
            cx.tree.set_toggle_state(item.node, on);
        }
    }

    /// The user flipped a switch; false if `node` isn't ours
    pub fn toggled(&mut self, cx: &mut Ctx, node: NodeId) -> bool {
        let Some((path, item)) = self.items.iter().find(|(_, i)| i.node == node) else {
            return false;
        };
        let action = match (&item.active, item.state(&cx.net).is_active()) {
            (Some(active), true) => AppletAction::DeactivateConnection { active: active.clone() },
            _ => AppletAction::ActivateConnection {
                connection: path.clone(),
                device: None,
                specific_object: None,
            },
        };
        cx.actions.push(action);
        self.sync(cx);
        true
    }

    /// Icon of the first active VPN in display order, or empty
    pub fn indicator_icon(&self, net: &NetworkState) -> String {
        self.sorter
            .iter()
            .filter_map(|path| self.items.get(path))
            .find(|item| item.state(net).is_active())
            .map(|item| item.icon_name(net).to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::applet::tests::ctx;
    use crate::network::model::NetEvent;

    fn vpn(path: &str, id: &str) -> Connection {
        Connection::new(path, &format!("uuid-{id}"), id, "vpn")
    }

    fn labels(cx: &Ctx, section: &VpnSection) -> Vec<String> {
        cx.tree
            .menu_items(section.inner)
            .into_iter()
            .filter_map(|n| cx.tree.item(n).map(|i| i.label().to_string()))
            .collect()
    }

    fn activate(cx: &mut Ctx, active: &str, connection: &str, state: ActiveConnectionState) {
        cx.net.apply(&NetEvent::ActiveConnectionAdded {
            active: ActiveConnection {
                path: active.into(),
                connection: Some(connection.into()),
                uuid: "u".into(),
                conn_type: "vpn".into(),
                state,
                reason: ActiveConnectionStateReason::NONE,
                devices: Vec::new(),
            },
        });
    }

    #[test]
    fn test_handles_vpn_and_wireguard_only() {
        let mut cx = ctx();
        let mut section = VpnSection::new(&mut cx.tree).unwrap();
        section.add_connection(&mut cx, &vpn("/c/1", "Work")).unwrap();
        section
            .add_connection(&mut cx, &Connection::new("/c/2", "u2", "wg0", "wireguard"))
            .unwrap();
        section
            .add_connection(&mut cx, &Connection::new("/c/3", "u3", "Home", "802-11-wireless"))
            .unwrap();
        let mut slave = vpn("/c/4", "Port");
        slave.master = Some("bond0".into());
        section.add_connection(&mut cx, &slave).unwrap();
        section.add_connection(&mut cx, &vpn("/c/1", "Work")).unwrap();

        assert_eq!(labels(&cx, &section), vec!["wg0", "Work"]);
    }

    #[test]
    fn test_rename_resorts() {
        let mut cx = ctx();
        let mut section = VpnSection::new(&mut cx.tree).unwrap();
        section.add_connection(&mut cx, &vpn("/c/1", "Alpha")).unwrap();
        section.add_connection(&mut cx, &vpn("/c/2", "Beta")).unwrap();
        section.update_connection(&mut cx, &vpn("/c/1", "Zulu")).unwrap();
        assert_eq!(labels(&cx, &section), vec!["Beta", "Zulu"]);

        section.remove_connection(&mut cx, &"/c/2".into());
        section.remove_connection(&mut cx, &"/c/2".into());
        assert_eq!(labels(&cx, &section), vec!["Zulu"]);
    }

    #[test]
    fn test_switch_follows_active_connection() {
        let mut cx = ctx();
        let mut section = VpnSection::new(&mut cx.tree).unwrap();
        section.add_connection(&mut cx, &vpn("/c/1", "Work")).unwrap();
        let node = section.items[&ConnectionPath::from("/c/1")].node;

        assert!(section.toggled(&mut cx, node));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::ActivateConnection {
                connection: "/c/1".into(),
                device: None,
                specific_object: None,
            })
        );
        assert_eq!(cx.tree.item(node).unwrap().toggle_state(), Some(false));
        assert_eq!(section.indicator_icon(&cx.net), "");

        activate(&mut cx, "/a/1", "/c/1", ActiveConnectionState::Activating);
        section.sync_active_connections(&mut cx);
        assert_eq!(cx.tree.item(node).unwrap().toggle_state(), Some(true));
        assert_eq!(section.indicator_icon(&cx.net), "network-vpn-acquiring-symbolic");

        assert!(section.toggled(&mut cx, node));
        assert_eq!(
            cx.actions.pop(),
            Some(AppletAction::DeactivateConnection { active: "/a/1".into() })
        );
    }

    #[test]
    fn test_failure_reasons() {
        let mut cx = ctx();
        let mut section = VpnSection::new(&mut cx.tree).unwrap();
        section.add_connection(&mut cx, &vpn("/c/1", "Work")).unwrap();
        activate(&mut cx, "/a/1", "/c/1", ActiveConnectionState::Activating);
        section.sync_active_connections(&mut cx);

        let active = ActivePath::from("/a/1");
        let stranger = ActivePath::from("/a/2");
        assert!(!section.active_state_changed(
            &mut cx,
            &stranger,
            ActiveConnectionState::Deactivated,
            ActiveConnectionStateReason::UNKNOWN
        ));
        assert!(!section.active_state_changed(
            &mut cx,
            &active,
            ActiveConnectionState::Deactivated,
            ActiveConnectionStateReason::USER_DISCONNECTED
        ));
        assert!(!section.active_state_changed(
            &mut cx,
            &active,
            ActiveConnectionState::Deactivated,
            ActiveConnectionStateReason::NO_SECRETS
        ));
        assert!(section.active_state_changed(
            &mut cx,
            &active,
            ActiveConnectionState::Deactivated,
            ActiveConnectionStateReason::UNKNOWN
        ));
    }
}
