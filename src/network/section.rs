//! Per-category device sections
//!
//! Devices of one category are listed one after the other. Past
//! `max_device_items` visible devices the list collapses into a single
//! summary row ("5 Wired Connections") whose submenu only links to the
//! settings panel.

use super::types::{ConnectionCategory, DevicePath};
use crate::error::Result;
use crate::popup::{MenuTree, NodeId};

#[derive(Debug)]
pub struct DeviceSection {
    category: ConnectionCategory,
    /// Added to the applet's popup menu
    root: NodeId,
    /// Holds the device sections
    inner: NodeId,
    summary: NodeId,
    devices: Vec<DevicePath>,
}

impl DeviceSection {
    pub fn new(tree: &mut MenuTree, category: ConnectionCategory) -> Result<Self> {
        let root = tree.new_section();
        let inner = tree.new_section();
        tree.add_menu_item(root, inner, None)?;

        let summary = tree.new_submenu_item("", true);
        tree.add_menu_item(root, summary, None)?;
        tree.set_icon(summary, summary_icon(category));
        if let Some(submenu) = tree.submenu_of(summary) {
            tree.add_settings_action(submenu, "Network Settings", "gnome-network-panel.desktop")?;
        }
        tree.set_visible(summary, false);

        Ok(Self {
            category,
            root,
            inner,
            summary,
            devices: Vec::new(),
        })
    }

    pub fn category(&self) -> ConnectionCategory {
        self.category
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn summary_item(&self) -> NodeId {
        self.summary
    }

    pub fn devices(&self) -> &[DevicePath] {
        &self.devices
    }

    pub fn add_device(&mut self, tree: &mut MenuTree, device: &DevicePath, section: NodeId) -> Result<()> {
        tree.add_menu_item(self.inner, section, None)?;
        self.devices.push(device.clone());
        Ok(())
    }

    /// Forget `device`; its rows are destroyed by the caller
    pub fn remove_device(&mut self, device: &DevicePath) {
        self.devices.retain(|d| d != device);
    }

    /// Number of device rows not hidden by their device
    pub fn visible_count(&self, tree: &MenuTree) -> usize {
        tree.menu_items(self.inner)
            .into_iter()
            .filter(|&child| tree.is_visible(child))
            .count()
    }

    /// Collapse into the summary row when there are too many devices
    pub fn sync(&self, tree: &mut MenuTree, max_items: usize) {
        let count = self.visible_count(tree);
        tree.set_label(self.summary, &summary_label(self.category, count));

        let summarize = count > max_items;
        tree.set_visible(self.summary, summarize);
        tree.set_visible(self.inner, !summarize);
    }
}

fn summary_icon(category: ConnectionCategory) -> &'static str {
    match category {
        ConnectionCategory::Wired => "network-wired-symbolic",
        _ => "network-wireless-symbolic",
    }
}

fn summary_label(category: ConnectionCategory, count: usize) -> String {
    let kind = match category {
        ConnectionCategory::Wireless => "Wi-Fi",
        ConnectionCategory::Wired => "Wired",
        ConnectionCategory::Bluetooth => "Bluetooth",
        ConnectionCategory::Wwan => "Modem",
        ConnectionCategory::Vpn | ConnectionCategory::Invalid => "Network",
    };
    let noun = if count == 1 { "Connection" } else { "Connections" };
    format!("{count} {kind} {noun}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::Side;
    use crate::session::SessionPolicy;

    fn device_rows(tree: &mut MenuTree, section: &mut DeviceSection, ids: std::ops::Range<usize>) -> Vec<NodeId> {
        ids
            .map(|i| {
                let rows = tree.new_section();
                tree.add_action(rows, &format!("Device {i}"), None).unwrap();
                section
                    .add_device(tree, &DevicePath(format!("/dev/{i}")), rows)
                    .unwrap();
                rows
            })
            .collect()
    }

    #[test]
    fn test_summary_threshold() {
        let mut tree = MenuTree::new(SessionPolicy::default());
        let menu = tree.new_popup(None, Side::Top);
        let mut section = DeviceSection::new(&mut tree, ConnectionCategory::Wired).unwrap();
        tree.add_menu_item(menu, section.root(), None).unwrap();

        let rows = device_rows(&mut tree, &mut section, 0..4);
        section.sync(&mut tree, 4);
        assert!(!tree.is_visible(section.summary_item()));
        assert!(tree.is_visible(section.inner));

        let extra = device_rows(&mut tree, &mut section, 4..5);
        section.sync(&mut tree, 4);
        assert!(tree.is_visible(section.summary_item()));
        assert!(!tree.is_visible(section.inner));
        assert_eq!(tree.item(section.summary_item()).unwrap().label(), "5 Wired Connections");
        assert_eq!(tree.item(section.summary_item()).unwrap().icon(), Some("network-wired-symbolic"));

        // Hidden devices don't count
        tree.set_visible(rows[0], false);
        section.sync(&mut tree, 4);
        assert!(!tree.is_visible(section.summary_item()));

        tree.destroy(extra[0]);
        section.remove_device(&DevicePath("/dev/4".into()));
        section.sync(&mut tree, 4);
        assert_eq!(section.visible_count(&tree), 3);
        assert_eq!(section.devices().len(), 4);
    }

    #[test]
    fn test_labels() {
        assert_eq!(summary_label(ConnectionCategory::Wireless, 1), "1 Wi-Fi Connection");
        assert_eq!(summary_label(ConnectionCategory::Wwan, 6), "6 Modem Connections");
        assert_eq!(summary_icon(ConnectionCategory::Bluetooth), "network-wireless-symbolic");
    }
}
