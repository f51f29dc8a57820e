//! Item state: active, sensitivity, activation

use tracing::debug;

use super::item::ItemKind;
use super::menu::MenuKind;
use super::tree::{Entry, MenuTree};
use super::{Activation, Key, MenuEvent, NodeId, PopupAnimation};

impl MenuTree {
    /// Mark an item active or inactive.
    ///
    /// Activating an item deactivates whatever was active in the same menu
    /// hierarchy and updates the active pointer of every enclosing menu.
    pub fn set_active(&mut self, id: NodeId, active: bool) {
        let Some(item) = self.item(id) else {
            return;
        };
        if item.active == active {
            return;
        }

        if !active {
            self.deactivate(id);
            return;
        }

        let can_focus = item.can_focus;
        if let Some(item) = self.item_mut(id) {
            item.active = true;
        }

        for menu in self.ancestors(id) {
            let previous = self.menu(menu).and_then(|m| m.active_item);
            if previous == Some(id) {
                continue;
            }
            if let Some(previous) = previous {
                if self.item(previous).is_some_and(|i| i.active) {
                    self.deactivate(previous);
                }
            }
            if let Some(m) = self.menu_mut(menu) {
                m.active_item = Some(id);
            }
            self.emit(MenuEvent::ActiveChanged { menu, item: Some(id) });
        }

        if can_focus {
            self.grab_key_focus(id);
        }
    }

    fn deactivate(&mut self, id: NodeId) {
        if let Some(item) = self.item_mut(id) {
            item.active = false;
            item.pressed = false;
        }
        for menu in self.ancestors(id) {
            let Some(m) = self.menu_mut(menu) else {
                continue;
            };
            if m.active_item == Some(id) {
                m.active_item = None;
                self.emit(MenuEvent::ActiveChanged { menu, item: None });
            }
        }
    }

    /// Move key focus to an item or a menu.
    ///
    /// The item losing focus becomes inactive; the item gaining it becomes
    /// active.
    pub fn grab_key_focus(&mut self, node: NodeId) {
        if self.key_focus == Some(node) || !self.contains(node) {
            return;
        }
        let previous = self.key_focus.replace(node);
        self.emit(MenuEvent::FocusChanged { node: Some(node) });

        if let Some(previous) = previous {
            if self.item(previous).is_some_and(|i| i.active) {
                self.deactivate(previous);
            }
        }
        if self.item(node).is_some_and(|i| i.can_focus) {
            self.set_active(node, true);
        }
    }

    /// Drop key focus entirely
    pub fn clear_key_focus(&mut self) {
        if let Some(previous) = self.key_focus.take() {
            self.emit(MenuEvent::FocusChanged { node: None });
            if self.item(previous).is_some_and(|i| i.active) {
                self.deactivate(previous);
            }
        }
    }

    // ------------------------------------------------------------------
    // Sensitivity
    // ------------------------------------------------------------------

    /// Effective sensitivity of a menu: its own flag combined with its parent
    /// (or, for submenus, its source item)
    pub fn menu_sensitivity(&self, menu: NodeId) -> bool {
        let Some(m) = self.menu(menu) else {
            return true;
        };
        if !m.sensitive {
            return false;
        }
        match m.kind {
            MenuKind::SubMenu { source_item, .. } => {
                self.item(source_item).is_none_or(|i| i.effective_sensitive)
            }
            _ => self.parent_of(menu).is_none_or(|p| self.menu_sensitivity(p)),
        }
    }

    /// Set an item's own sensitivity flag
    pub fn set_sensitive(&mut self, id: NodeId, sensitive: bool) {
        let Some(item) = self.item_mut(id) else {
            return;
        };
        if item.sensitive == sensitive {
            return;
        }
        item.sensitive = sensitive;
        self.sync_item_sensitivity(id);
    }

    /// Set a menu's own sensitivity flag and resync everything below it
    pub fn set_menu_sensitive(&mut self, menu: NodeId, sensitive: bool) {
        let Some(m) = self.menu_mut(menu) else {
            return;
        };
        m.sensitive = sensitive;
        self.sync_sensitivity_below(menu);
    }

    pub(crate) fn sync_sensitivity_below(&mut self, menu: NodeId) {
        for child in self.menu_items(menu) {
            match self.nodes.get(&child).map(|n| &n.entry) {
                Some(Entry::Item(_)) => self.sync_item_sensitivity(child),
                Some(Entry::Menu(_)) => self.sync_sensitivity_below(child),
                None => {}
            }
        }
    }

    pub(crate) fn sync_item_sensitivity(&mut self, id: NodeId) {
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        let Some(item) = self.item(id) else {
            return;
        };
        let sensitive = item.activatable
            && item.sensitive
            && parent.is_none_or(|p| self.menu_sensitivity(p));

        let changed = self
            .item_mut(id)
            .is_some_and(|item| item.apply_sensitivity(sensitive));

        if let Some(sub) = self.submenu_of(id) {
            if !sensitive {
                self.close(sub, PopupAnimation::None);
            }
            self.sync_sensitivity_below(sub);
        }

        if !changed {
            return;
        }
        self.emit(MenuEvent::SensitiveChanged { item: id, sensitive });

        if let Some(parent) = parent {
            self.child_sensitivity_changed(parent, id, sensitive);
        }
    }

    /// Keep key focus sane when a child's sensitivity flips
    fn child_sensitivity_changed(&mut self, menu: NodeId, item: NodeId, sensitive: bool) {
        let active = self.menu(menu).and_then(|m| m.active_item);
        if !sensitive && active == Some(item) {
            if !self.navigate_focus(menu, Some(item), true, true) {
                self.grab_key_focus(menu);
            }
            if self.item(item).is_some_and(|i| i.active) {
                self.deactivate(item);
            }
        } else if sensitive && active.is_none() && self.key_focus == Some(menu) {
            self.grab_key_focus(item);
        }
    }

    // ------------------------------------------------------------------
    // Switches
    // ------------------------------------------------------------------

    /// Set a switch's state without emitting `Toggled`
    pub fn set_toggle_state(&mut self, id: NodeId, on: bool) {
        if let Some(item) = self.item_mut(id) {
            if let ItemKind::Switch { state, .. } = &mut item.kind {
                *state = on;
            }
        }
    }

    /// Flip a switch and emit `Toggled`
    pub fn toggle(&mut self, id: NodeId) {
        let Some(item) = self.item_mut(id) else {
            return;
        };
        let ItemKind::Switch { state, .. } = &mut item.kind else {
            return;
        };
        *state = !*state;
        let state = *state;
        self.emit(MenuEvent::Toggled { item: id, state });
    }

    /// Replace the switch with a status text, or restore it with `None`
    pub fn set_status(&mut self, id: NodeId, text: Option<&str>) {
        let Some(item) = self.item_mut(id) else {
            return;
        };
        let ItemKind::Switch { status, .. } = &mut item.kind else {
            return;
        };
        *status = text.map(str::to_string);
        let sensitive = item.effective_sensitive;
        item.apply_sensitivity(sensitive);
    }

    // ------------------------------------------------------------------
    // Pointer and activation
    // ------------------------------------------------------------------

    /// Pointer entered or left the item
    pub fn hover(&mut self, id: NodeId, hovering: bool) {
        let Some(item) = self.item(id) else {
            return;
        };
        if !item.track_hover || !item.reactive {
            return;
        }
        self.set_active(id, hovering);
    }

    /// Pointer button or touch went down on the item
    pub fn press(&mut self, id: NodeId) {
        if let Some(item) = self.item_mut(id) {
            if item.activatable && item.reactive {
                item.pressed = true;
            }
        }
    }

    /// Pointer button or touch went up on the item
    pub fn release(&mut self, id: NodeId, cause: Activation) {
        let Some(item) = self.item_mut(id) else {
            return;
        };
        if !item.activatable {
            return;
        }
        item.pressed = false;
        self.activate(id, cause);
    }

    /// Activate an item.
    ///
    /// Ignored unless the item is sensitive and reactive.
    pub fn activate(&mut self, id: NodeId, cause: Activation) {
        let Some(item) = self.item(id) else {
            return;
        };
        if !item.effective_sensitive || !item.reactive {
            debug!("Ignoring activation of {} ({:?}): not sensitive", id, cause);
            return;
        }

        match item.kind.clone() {
            ItemKind::Switch { status, .. } => {
                if status.is_none() {
                    self.toggle(id);
                }
                // Space toggles without closing the menu
                if cause == Activation::Key(Key::Space) {
                    return;
                }
                self.item_activated(id);
            }
            ItemKind::SubMenu { menu, .. } => match cause {
                Activation::Pointer | Activation::Touch => {
                    let open = self.menu(menu).is_some_and(|m| m.is_open);
                    self.set_submenu_shown(id, !open);
                }
                _ => self.set_submenu_shown(id, true),
            },
            _ => self.item_activated(id),
        }
    }

    fn item_activated(&mut self, id: NodeId) {
        if let Some(desktop_file) = self.settings_desktop_file(id) {
            self.emit(MenuEvent::LaunchSettings { item: id, desktop_file });
        }
        if let Some(menu) = self.parent_of(id) {
            self.emit(MenuEvent::ItemActivated { menu, item: id });
        }
        let top = self.top_menu(id);
        if top != id {
            self.close(top, PopupAnimation::Full);
        }
    }

    /// Open or close the submenu of a submenu item
    pub fn set_submenu_shown(&mut self, item: NodeId, open: bool) {
        let Some(menu) = self.submenu_of(item) else {
            return;
        };
        if open {
            self.open(menu, PopupAnimation::Full);
        } else {
            self.close(menu, PopupAnimation::Full);
        }
    }
}
