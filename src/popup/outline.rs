//! Plain-text rendering of a menu, for logs and headless hosts

use std::fmt::Write;

use super::item::ItemKind;
use super::tree::{Entry, MenuTree};
use super::NodeId;

impl MenuTree {
    /// Render the visible part of `menu` as indented text
    pub fn outline(&self, menu: NodeId) -> String {
        let mut out = String::new();
        self.outline_into(menu, 0, &mut out);
        out
    }

    fn outline_into(&self, menu: NodeId, depth: usize, out: &mut String) {
        for child in self.menu_items(menu) {
            if !self.is_child_visible(child) {
                continue;
            }
            let indent = "  ".repeat(depth);
            match self.nodes.get(&child).map(|n| &n.entry) {
                Some(Entry::Menu(_)) => self.outline_into(child, depth, out),
                Some(Entry::Item(item)) => {
                    let mut line = String::new();
                    let glyph = item.ornament().glyph();
                    if !glyph.is_empty() {
                        let _ = write!(line, "{glyph} ");
                    }
                    match item.kind() {
                        ItemKind::Separator if item.label().is_empty() => line.push_str("----"),
                        ItemKind::Separator => {
                            let _ = write!(line, "-- {} --", item.label());
                        }
                        ItemKind::Switch { state, status } => {
                            let _ = match status {
                                Some(status) => write!(line, "{} ({status})", item.label()),
                                None => write!(line, "{} [{}]", item.label(), if *state { "on" } else { "off" }),
                            };
                        }
                        ItemKind::SubMenu { .. } => {
                            let _ = write!(line, "{} >", item.label());
                        }
                        ItemKind::Plain | ItemKind::Image { .. } => line.push_str(item.label()),
                    }
                    if let Some(icon) = item.icon().filter(|i| !i.is_empty()) {
                        let _ = write!(line, "  <{icon}>");
                    }
                    if item.is_active() {
                        line.push_str("  *");
                    }
                    if !item.is_sensitive() && !item.is_separator() {
                        line.push_str("  (insensitive)");
                    }
                    let _ = writeln!(out, "{indent}{line}");

                    if let Some(sub) = item.submenu_id() {
                        if self.menu(sub).is_some_and(|m| m.is_open()) {
                            self.outline_into(sub, depth + 1, out);
                        }
                    }
                }
                None => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::popup::{MenuItem, MenuTree, Ornament, PopupAnimation, Side};
    use crate::session::SessionPolicy;

    #[test]
    fn test_outline() {
        let mut tree = MenuTree::new(SessionPolicy::default());
        let menu = tree.new_popup(None, Side::Top);
        let wired = tree.new_submenu_item("Wired Connected", true);
        tree.add_menu_item(menu, wired, None).unwrap();
        tree.set_icon(wired, "network-wired-symbolic");
        let sub = tree.submenu_of(wired).unwrap();
        let office = tree.add_action(sub, "Office", None).unwrap();
        tree.set_ornament(office, Ornament::Dot);
        let sep = tree.new_item(MenuItem::separator(""));
        tree.add_menu_item(menu, sep, None).unwrap();
        let vpn = tree.new_item(MenuItem::switch("Work VPN", false));
        tree.add_menu_item(menu, vpn, None).unwrap();

        tree.open(menu, PopupAnimation::Full);
        tree.set_submenu_shown(wired, true);

        let expected = "\
Wired Connected >  <network-wired-symbolic>
  \u{2022} Office
----
Work VPN [off]
";
        assert_eq!(tree.outline(menu), expected);
    }
}
