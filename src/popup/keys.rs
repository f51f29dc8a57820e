//! Keyboard handling and focus navigation

use bitflags::bitflags;

use super::menu::MenuKind;
use super::tree::{Entry, MenuTree};
use super::{Activation, NodeId, PopupAnimation, Side};

/// Keys the menus react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Space,
    Return,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Tab,
    /// Any other keysym
    Other(u32),
}

bitflags! {
    /// Modifier state of a key event (X11 layout)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 0;
        /// Caps Lock
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        /// Alt
        const MOD1 = 1 << 3;
        /// Num Lock
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
        const SUPER = 1 << 26;
        const HYPER = 1 << 27;
        const META = 1 << 28;
    }
}

/// A key press with its modifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::empty(),
        }
    }

    pub fn with_modifiers(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }

    /// Modifiers held other than the ones listed in `ignored`
    fn held_except(&self, ignored: Modifiers) -> bool {
        !self.modifiers.difference(ignored).is_empty()
    }
}

/// Key that opens a menu from its source, given the arrow side
fn navigation_key(side: Side) -> Key {
    match side {
        Side::Top => Key::Down,
        Side::Bottom => Key::Up,
        Side::Left => Key::Right,
        Side::Right => Key::Left,
    }
}

impl MenuTree {
    /// Key pressed while the source region of `menu` has focus.
    ///
    /// Returns true when the key was consumed.
    pub fn source_key_press(&mut self, menu: NodeId, press: KeyPress) -> bool {
        let Some(m) = self.menu(menu) else {
            return false;
        };
        let MenuKind::Popup {
            arrow_side,
            source_reactive,
            ..
        } = m.kind
        else {
            return false;
        };
        // Keyboard can't toggle what the pointer can't
        if !source_reactive {
            return false;
        }
        if press.held_except(Modifiers::LOCK) {
            return false;
        }

        let is_open = m.is_open;
        match press.key {
            Key::Space | Key::Return => {
                self.toggle_menu(menu);
                true
            }
            Key::Escape if is_open => {
                self.close(menu, PopupAnimation::None);
                true
            }
            key if key == navigation_key(arrow_side) => {
                if !is_open {
                    self.toggle_menu(menu);
                }
                self.navigate_focus(menu, None, true, false);
                true
            }
            _ => false,
        }
    }

    /// Key pressed while `item` has focus
    pub fn item_key_press(&mut self, item: NodeId, press: KeyPress) -> bool {
        let Some(it) = self.item(item) else {
            return false;
        };
        if !it.activatable {
            return false;
        }

        if let Some(sub) = it.submenu_id() {
            match press.key {
                Key::Right => {
                    self.set_submenu_shown(item, true);
                    self.navigate_focus(sub, None, true, false);
                    return true;
                }
                Key::Left if self.menu(sub).is_some_and(|m| m.is_open) => {
                    self.set_submenu_shown(item, false);
                    return true;
                }
                _ => {}
            }
        }

        if press.held_except(Modifiers::LOCK | Modifiers::MOD2) {
            return false;
        }
        match press.key {
            Key::Space | Key::Return => {
                self.activate(item, Activation::Key(press.key));
                true
            }
            _ => false,
        }
    }

    /// Route a key press from wherever key focus currently is.
    ///
    /// The focused item gets the first chance; then an enclosing open
    /// submenu handles Left; finally Up and Down move focus inside the top
    /// menu.
    pub fn key_press(&mut self, press: KeyPress) -> bool {
        let Some(focus) = self.key_focus else {
            return false;
        };
        if self.item(focus).is_some() && self.item_key_press(focus, press) {
            return true;
        }

        let mut chain = vec![focus];
        chain.extend(self.ancestors(focus));
        if press.key == Key::Left {
            for menu in &chain {
                let Some(MenuKind::SubMenu { source_item, .. }) = self.menu(*menu).map(|m| m.kind.clone()) else {
                    continue;
                };
                if self.menu(*menu).is_some_and(|m| m.is_open) {
                    self.close(*menu, PopupAnimation::Full);
                    self.set_active(source_item, true);
                    return true;
                }
            }
        }

        let forward = match press.key {
            Key::Down => true,
            Key::Up => false,
            _ => return false,
        };
        let top = self.top_menu(focus);
        if !self.menu(top).is_some_and(|m| m.is_open) {
            return false;
        }
        let from = self.item(focus).is_some().then_some(focus);
        self.navigate_focus(top, from, forward, true)
    }

    /// Items of `menu` in visual order, descending into sections and open
    /// submenus
    pub(crate) fn flatten_items(&self, menu: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_items(menu, &mut out);
        out
    }

    fn collect_items(&self, menu: NodeId, out: &mut Vec<NodeId>) {
        for child in self.menu_items(menu) {
            match self.nodes.get(&child).map(|n| &n.entry) {
                Some(Entry::Item(item)) => {
                    out.push(child);
                    if let Some(sub) = item.submenu_id() {
                        if self.menu(sub).is_some_and(|m| m.is_open) {
                            self.collect_items(sub, out);
                        }
                    }
                }
                Some(Entry::Menu(section)) if section.visible => self.collect_items(child, out),
                _ => {}
            }
        }
    }

    fn is_focusable(&self, id: NodeId) -> bool {
        self.item(id)
            .is_some_and(|i| i.visible && i.can_focus && i.effective_sensitive)
    }

    /// Move key focus to the next focusable item of `container` after
    /// `from` (or the first/last one when `from` is `None`).
    ///
    /// Returns false when nothing could take focus.
    pub fn navigate_focus(&mut self, container: NodeId, from: Option<NodeId>, forward: bool, wrap: bool) -> bool {
        let items = self.flatten_items(container);
        if items.is_empty() {
            return false;
        }
        let len = items.len() as isize;

        let order: Vec<usize> = match from.and_then(|f| items.iter().position(|&i| i == f)) {
            Some(start) => (1..len)
                .filter_map(|step| {
                    let index = if forward { start as isize + step } else { start as isize - step };
                    let wrapped = index < 0 || index >= len;
                    (wrap || !wrapped).then_some(index.rem_euclid(len) as usize)
                })
                .collect(),
            None if forward => (0..items.len()).collect(),
            None => (0..items.len()).rev().collect(),
        };

        let target = order
            .into_iter()
            .map(|index| items[index])
            .find(|&id| Some(id) != from && self.is_focusable(id));

        match target {
            Some(id) => {
                self.grab_key_focus(id);
                true
            }
            None => false,
        }
    }
}
