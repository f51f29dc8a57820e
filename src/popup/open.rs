//! Open/close handling for popups, submenus and sections

use tracing::debug;

use super::menu::MenuKind;
use super::tree::MenuTree;
use super::{MenuEvent, NodeId, PopupAnimation};

impl MenuTree {
    /// Present a menu.
    ///
    /// Does nothing when the menu is already open or has nothing visible to
    /// show. Sections cannot be opened on their own; the request only
    /// refreshes their contents.
    pub fn open(&mut self, menu: NodeId, animation: PopupAnimation) {
        let Some(m) = self.menu(menu) else {
            return;
        };
        match m.kind {
            MenuKind::Section => {
                self.propagate_open_state(menu);
            }
            MenuKind::Popup { .. } | MenuKind::SubMenu { .. } => {
                if m.is_open {
                    return;
                }
                if self.is_empty(menu) {
                    debug!("Not opening empty menu {}", menu);
                    return;
                }
                let is_submenu = matches!(m.kind, MenuKind::SubMenu { .. });

                if let Some(m) = self.menu_mut(menu) {
                    m.is_open = true;
                    m.last_animation = Some(animation);
                    if is_submenu {
                        m.visible = true;
                        m.set_arrow_rotated(true);
                    }
                }
                self.emit(MenuEvent::OpenStateChanged { menu, open: true, animation });
                self.propagate_open_state(menu);

                if is_submenu {
                    self.set_opened_submenu(menu);
                }
            }
        }
    }

    /// Hide a menu, deactivating its active item
    pub fn close(&mut self, menu: NodeId, animation: PopupAnimation) {
        let Some(m) = self.menu(menu) else {
            return;
        };
        match m.kind {
            MenuKind::Section => {
                self.propagate_open_state(menu);
            }
            MenuKind::Popup { .. } => {
                if let Some(active) = m.active_item {
                    self.set_active(active, false);
                }
                if !self.menu(menu).is_some_and(|m| m.is_open) {
                    return;
                }
                if let Some(m) = self.menu_mut(menu) {
                    m.is_open = false;
                    m.last_animation = Some(animation);
                }
                self.emit(MenuEvent::OpenStateChanged { menu, open: false, animation });
                self.propagate_open_state(menu);
                self.emit(MenuEvent::MenuClosed { menu });
                self.menu_closed(menu);
            }
            MenuKind::SubMenu { .. } => {
                if !m.is_open {
                    return;
                }
                if let Some(m) = self.menu_mut(menu) {
                    m.is_open = false;
                    m.last_animation = Some(animation);
                }
                self.emit(MenuEvent::OpenStateChanged { menu, open: false, animation });

                if let Some(active) = self.menu(menu).and_then(|m| m.active_item) {
                    self.set_active(active, false);
                }
                if let Some(m) = self.menu_mut(menu) {
                    m.visible = false;
                    m.set_arrow_rotated(false);
                }
                self.propagate_open_state(menu);

                let top = self.top_menu(menu);
                if let Some(top) = self.menu_mut(top) {
                    if top.opened_submenu == Some(menu) {
                        top.opened_submenu = None;
                    }
                }
            }
        }
    }

    /// Open a closed menu, close an open one
    pub fn toggle_menu(&mut self, menu: NodeId) {
        if self.menu(menu).is_some_and(|m| m.is_open) {
            self.close(menu, PopupAnimation::Full);
        } else {
            self.open(menu, PopupAnimation::Full);
        }
    }

    /// Allow or refuse keyboard toggling from the source region
    pub fn set_source_reactive(&mut self, menu: NodeId, reactive: bool) {
        if let Some(m) = self.menu_mut(menu) {
            if let MenuKind::Popup { source_reactive, .. } = &mut m.kind {
                *source_reactive = reactive;
            }
        }
    }

    /// Keep the source region out of the grab's tracked actors
    pub fn set_block_source_events(&mut self, menu: NodeId, block: bool) {
        if let Some(m) = self.menu_mut(menu) {
            if let MenuKind::Popup { block_source_events, .. } = &mut m.kind {
                *block_source_events = block;
            }
        }
    }

    /// Separators depend on what is visible; refresh them in `menu` and in
    /// every section below it
    fn propagate_open_state(&mut self, menu: NodeId) {
        self.sync_separators(menu);
        for child in self.menu_items(menu) {
            if self.menu(child).is_some_and(|m| m.is_section()) {
                self.propagate_open_state(child);
            }
        }
    }

    /// A popup finished closing: collapse every submenu inside it
    fn menu_closed(&mut self, menu: NodeId) {
        for child in self.menu_items(menu) {
            if let Some(sub) = self.submenu_of(child) {
                self.close(sub, PopupAnimation::None);
            } else if self.menu(child).is_some_and(|m| m.is_section()) {
                self.menu_closed(child);
            }
        }
    }

    /// Record `submenu` as the one expanded submenu of its top menu
    fn set_opened_submenu(&mut self, submenu: NodeId) {
        let top = self.top_menu(submenu);
        if top == submenu {
            return;
        }
        let previous = self.menu(top).and_then(|m| m.opened_submenu);
        if let Some(previous) = previous.filter(|&p| p != submenu) {
            self.close(previous, PopupAnimation::Full);
        }
        if let Some(top) = self.menu_mut(top) {
            top.opened_submenu = Some(submenu);
        }
    }
}
