//! Menu tree arena
//!
//! Owns every item and menu. Structure operations (add, move, remove,
//! destroy, emptiness, separator visibility) live here; state changes are in
//! `state.rs`, open/close in `open.rs` and keyboard handling in `keys.rs`.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::item::{ItemKind, MenuItem};
use super::menu::{Menu, MenuKind};
use super::{MenuEvent, NodeId, Side, SourceId};
use crate::error::{MenuError, Result};
use crate::session::SessionPolicy;

#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Item(MenuItem),
    Menu(Menu),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    /// Containing menu; submenus have none and resolve through their item
    pub(crate) parent: Option<NodeId>,
    pub(crate) entry: Entry,
}

/// Arena holding a forest of menus
#[derive(Debug, Default)]
pub struct MenuTree {
    pub(crate) nodes: HashMap<NodeId, Node>,
    next_id: u32,
    pub(crate) events: VecDeque<MenuEvent>,
    pub(crate) key_focus: Option<NodeId>,
    pub(crate) policy: SessionPolicy,
}

impl MenuTree {
    /// Create an empty tree
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            events: VecDeque::new(),
            key_focus: None,
            policy,
        }
    }

    fn insert(&mut self, entry: Entry) -> NodeId {
        let id = NodeId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.nodes.insert(id, Node { parent: None, entry });
        id
    }

    /// Create a top-level popup menu attached to `source`
    pub fn new_popup(&mut self, source: Option<SourceId>, arrow_side: Side) -> NodeId {
        self.insert(Entry::Menu(Menu::new(MenuKind::Popup {
            arrow_side,
            source,
            block_source_events: false,
            source_reactive: true,
        })))
    }

    /// Create an unparented section
    pub fn new_section(&mut self) -> NodeId {
        self.insert(Entry::Menu(Menu::new(MenuKind::Section)))
    }

    /// Store an unparented item
    pub fn new_item(&mut self, item: MenuItem) -> NodeId {
        self.insert(Entry::Item(item))
    }

    /// Create a submenu item together with its submenu
    pub fn new_submenu_item(&mut self, label: &str, want_icon: bool) -> NodeId {
        let item_id = NodeId(self.next_id.max(1));
        let menu_id = NodeId(item_id.0 + 1);
        self.next_id = menu_id.0 + 1;

        self.nodes.insert(
            item_id,
            Node {
                parent: None,
                entry: Entry::Item(MenuItem::submenu(label, menu_id, want_icon)),
            },
        );
        let mut menu = Menu::new(MenuKind::SubMenu {
            source_item: item_id,
            arrow_rotated: false,
        });
        menu.visible = false;
        self.nodes.insert(
            menu_id,
            Node {
                parent: None,
                entry: Entry::Menu(menu),
            },
        );
        item_id
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn item(&self, id: NodeId) -> Option<&MenuItem> {
        match &self.nodes.get(&id)?.entry {
            Entry::Item(item) => Some(item),
            Entry::Menu(_) => None,
        }
    }

    pub fn menu(&self, id: NodeId) -> Option<&Menu> {
        match &self.nodes.get(&id)?.entry {
            Entry::Menu(menu) => Some(menu),
            Entry::Item(_) => None,
        }
    }

    pub(crate) fn item_mut(&mut self, id: NodeId) -> Option<&mut MenuItem> {
        match &mut self.nodes.get_mut(&id)?.entry {
            Entry::Item(item) => Some(item),
            Entry::Menu(_) => None,
        }
    }

    pub(crate) fn menu_mut(&mut self, id: NodeId) -> Option<&mut Menu> {
        match &mut self.nodes.get_mut(&id)?.entry {
            Entry::Menu(menu) => Some(menu),
            Entry::Item(_) => None,
        }
    }

    fn expect_menu(&self, id: NodeId) -> Result<&Menu> {
        match self.nodes.get(&id) {
            None => Err(MenuError::UnknownNode(id)),
            Some(Node { entry: Entry::Menu(menu), .. }) => Ok(menu),
            Some(_) => Err(MenuError::NotAMenu(id)),
        }
    }

    pub(crate) fn expect_item(&self, id: NodeId) -> Result<&MenuItem> {
        match self.nodes.get(&id) {
            None => Err(MenuError::UnknownNode(id)),
            Some(Node { entry: Entry::Item(item), .. }) => Ok(item),
            Some(_) => Err(MenuError::NotAnItem(id)),
        }
    }

    /// Submenu owned by a submenu item
    pub fn submenu_of(&self, item: NodeId) -> Option<NodeId> {
        self.item(item)?.submenu_id()
    }

    /// Menu the node logically belongs to.
    ///
    /// Submenus belong to the menu containing their item.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(&id)?;
        match &node.entry {
            Entry::Menu(Menu {
                kind: MenuKind::SubMenu { source_item, .. },
                ..
            }) => self.nodes.get(source_item)?.parent,
            _ => node.parent,
        }
    }

    /// Menus above `id`, nearest first
    pub(crate) fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.parent_of(id);
        while let Some(menu) = cursor {
            if out.contains(&menu) {
                warn!("Menu parent chain of {} loops at {}", id, menu);
                break;
            }
            out.push(menu);
            cursor = self.parent_of(menu);
        }
        out
    }

    /// Outermost menu containing `id` (or `id` itself)
    pub fn top_menu(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().copied().unwrap_or(id)
    }

    /// Node holding key focus
    pub fn key_focus(&self) -> Option<NodeId> {
        self.key_focus
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub(crate) fn emit(&mut self, event: MenuEvent) {
        self.events.push_back(event);
    }

    /// Take the oldest pending event
    pub fn pop_event(&mut self) -> Option<MenuEvent> {
        self.events.pop_front()
    }

    /// Take every pending event
    pub fn drain_events(&mut self) -> Vec<MenuEvent> {
        self.events.drain(..).collect()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    // ------------------------------------------------------------------
    // Container protocol
    // ------------------------------------------------------------------

    /// Add `child` to `menu`, before the item currently at `position`, or
    /// at the end.
    pub fn add_menu_item(&mut self, menu: NodeId, child: NodeId, position: Option<usize>) -> Result<()> {
        self.expect_menu(menu)?;
        if child == menu {
            return Err(MenuError::WouldCycle { parent: menu, child });
        }

        let node = self.nodes.get(&child).ok_or(MenuError::UnknownNode(child))?;
        let is_section = match &node.entry {
            Entry::Item(_) => false,
            Entry::Menu(Menu { kind: MenuKind::Section, .. }) => true,
            Entry::Menu(_) => return Err(MenuError::InvalidChild { parent: menu, child }),
        };
        if let Some(parent) = node.parent {
            return Err(MenuError::AlreadyParented { parent, child });
        }
        if is_section && (self.ancestors(menu).contains(&child) || self.is_inside(menu, child)) {
            return Err(MenuError::WouldCycle { parent: menu, child });
        }

        if let Some(container) = self.menu_mut(menu) {
            match position {
                Some(pos) if pos < container.children.len() => container.children.insert(pos, child),
                _ => container.children.push(child),
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(menu);
        }

        if is_section {
            self.sync_sensitivity_below(child);
        } else {
            self.sync_item_sensitivity(child);
        }
        self.structure_changed(menu);
        Ok(())
    }

    /// Whether `node` sits anywhere inside `container`'s subtree
    fn is_inside(&self, node: NodeId, container: NodeId) -> bool {
        let Some(menu) = self.menu(container) else {
            return false;
        };
        menu.children.iter().any(|&child| {
            child == node
                || self.is_inside(node, child)
                || self
                    .submenu_of(child)
                    .is_some_and(|sub| sub == node || self.is_inside(node, sub))
        })
    }

    /// Add a plain (or image) item that reports activation through
    /// [`MenuEvent::ItemActivated`]
    pub fn add_action(&mut self, menu: NodeId, title: &str, icon: Option<&str>) -> Result<NodeId> {
        let item = match icon {
            Some(icon) => MenuItem::image(title, icon),
            None => MenuItem::new(title),
        };
        let id = self.new_item(item);
        self.add_menu_item(menu, id, None)?;
        Ok(id)
    }

    /// Add an action launching the settings panel `desktop_file`.
    ///
    /// Its visibility follows the session's `allow_settings`.
    pub fn add_settings_action(&mut self, menu: NodeId, title: &str, desktop_file: &str) -> Result<NodeId> {
        let id = self.add_action(menu, title, None)?;
        let visible = self.policy.allow_settings;
        if let Some(container) = self.menu_mut(menu) {
            container.settings_actions.insert(desktop_file.to_string(), id);
        }
        self.set_visible(id, visible);
        Ok(id)
    }

    /// Desktop file of a settings action
    pub(crate) fn settings_desktop_file(&self, item: NodeId) -> Option<String> {
        let parent = self.parent_of(item)?;
        self.menu(parent)?
            .settings_actions
            .iter()
            .find(|(_, id)| **id == item)
            .map(|(file, _)| file.clone())
    }

    /// Reposition `item` so that `position` other items precede it
    pub fn move_menu_item(&mut self, menu: NodeId, item: NodeId, position: usize) -> Result<()> {
        let container = self.expect_menu(menu)?;
        if !container.children.contains(&item) {
            return Err(MenuError::InvalidChild { parent: menu, child: item });
        }
        if let Some(container) = self.menu_mut(menu) {
            container.children.retain(|&c| c != item);
            let pos = position.min(container.children.len());
            container.children.insert(pos, item);
        }
        self.structure_changed(menu);
        Ok(())
    }

    /// Items and sections of `menu`, in order
    pub fn menu_items(&self, menu: NodeId) -> Vec<NodeId> {
        self.menu(menu).map(|m| m.children.clone()).unwrap_or_default()
    }

    pub fn first_menu_item(&self, menu: NodeId) -> Option<NodeId> {
        self.menu(menu)?.children.first().copied()
    }

    pub fn num_menu_items(&self, menu: NodeId) -> usize {
        self.menu(menu).map_or(0, |m| m.children.len())
    }

    /// Destroy every direct child of `menu`
    pub fn remove_all(&mut self, menu: NodeId) -> Result<()> {
        let children = self.expect_menu(menu)?.children.clone();
        for child in children {
            self.destroy(child);
        }
        Ok(())
    }

    /// Destroy a node and everything below it.
    ///
    /// Returns false when the node does not exist.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };

        match &node.entry {
            Entry::Menu(Menu {
                kind: MenuKind::SubMenu { source_item, .. },
                ..
            }) => {
                // A submenu lives and dies with its item
                let source_item = *source_item;
                if self.contains(source_item) {
                    return self.destroy(source_item);
                }
                self.destroy_menu_contents(id);
            }
            Entry::Menu(_) => self.destroy_menu_contents(id),
            Entry::Item(item) => {
                if let Some(sub) = item.submenu_id() {
                    self.destroy_menu_contents(sub);
                    self.forget(sub, &[]);
                }
            }
        }

        let ancestors = self.ancestors(id);
        let parent = self.nodes.get(&id).and_then(|n| n.parent);
        self.forget(id, &ancestors);

        if let Some(parent) = parent {
            if let Some(container) = self.menu_mut(parent) {
                container.children.retain(|&c| c != id);
                container.settings_actions.retain(|_, item| *item != id);
            }
            if self.key_focus == Some(id) {
                self.key_focus = Some(parent);
            }
            self.structure_changed(parent);
        } else if self.key_focus == Some(id) {
            self.key_focus = None;
        }

        self.emit(MenuEvent::Destroyed { node: id });
        debug!("Destroyed menu node {}", id);
        true
    }

    fn destroy_menu_contents(&mut self, menu: NodeId) {
        if self.menu(menu).is_some_and(|m| m.is_open && !m.is_section()) {
            self.close(menu, super::PopupAnimation::None);
        }
        let children = self.menu_items(menu);
        for child in children {
            self.destroy(child);
        }
    }

    /// Drop a node from the arena along with every pointer to it
    fn forget(&mut self, id: NodeId, ancestors: &[NodeId]) {
        for &menu in ancestors {
            if let Some(m) = self.menu_mut(menu) {
                if m.active_item == Some(id) {
                    m.active_item = None;
                }
                if m.opened_submenu == Some(id) {
                    m.opened_submenu = None;
                }
            }
        }
        if self.key_focus == Some(id) {
            self.key_focus = None;
        }
        self.nodes.remove(&id);
        self.events.retain(|event| !event.references(id));
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Show or hide an item or section
    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        let changed = match self.nodes.get_mut(&id).map(|n| &mut n.entry) {
            Some(Entry::Item(item)) => std::mem::replace(&mut item.visible, visible) != visible,
            Some(Entry::Menu(menu)) => std::mem::replace(&mut menu.visible, visible) != visible,
            None => false,
        };
        if changed {
            if let Some(parent) = self.parent_of(id) {
                self.structure_changed(parent);
            }
        }
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        match self.nodes.get(&id).map(|n| &n.entry) {
            Some(Entry::Item(item)) => item.visible,
            Some(Entry::Menu(menu)) => menu.visible,
            None => false,
        }
    }

    /// Visibility as seen by the containing menu: empty sections count as
    /// hidden
    pub fn is_child_visible(&self, id: NodeId) -> bool {
        match self.nodes.get(&id).map(|n| &n.entry) {
            Some(Entry::Item(item)) => item.visible,
            Some(Entry::Menu(menu)) if menu.is_section() => menu.visible && !self.is_empty(id),
            Some(Entry::Menu(menu)) => menu.visible,
            None => false,
        }
    }

    fn is_separator(&self, id: NodeId) -> bool {
        self.item(id).is_some_and(MenuItem::is_separator)
    }

    /// True when no child is a visible, non-separator item
    pub fn is_empty(&self, menu: NodeId) -> bool {
        let Some(container) = self.menu(menu) else {
            return true;
        };
        !container
            .children
            .iter()
            .any(|&child| !self.is_separator(child) && self.is_child_visible(child))
    }

    /// Recompute what depends on the children of `menu` and its ancestors
    pub(crate) fn structure_changed(&mut self, menu: NodeId) {
        self.sync_separators(menu);
        for ancestor in self.ancestors(menu) {
            self.sync_separators(ancestor);
        }
    }

    /// Hide unlabelled separators with nothing visible on one side
    pub(crate) fn sync_separators(&mut self, menu: NodeId) {
        let children = self.menu_items(menu);
        for (index, &child) in children.iter().enumerate() {
            let Some(item) = self.item(child) else {
                continue;
            };
            if !item.is_separator() || !item.label.is_empty() {
                continue;
            }

            let before = children[..index]
                .iter()
                .rev()
                .find(|&&c| self.is_child_visible(c));
            let after = children[index + 1..]
                .iter()
                .find(|&&c| self.is_child_visible(c));

            let visible = matches!(before, Some(&c) if !self.is_separator(c))
                && matches!(after, Some(&c) if !self.is_separator(c));

            if let Some(item) = self.item_mut(child) {
                item.visible = visible;
            }
        }
    }

    // ------------------------------------------------------------------
    // Item content
    // ------------------------------------------------------------------

    pub fn set_label(&mut self, id: NodeId, label: &str) {
        let is_separator = match self.item_mut(id) {
            Some(item) => {
                if !item.set_label(label) {
                    return;
                }
                item.is_separator()
            }
            None => return,
        };
        if is_separator {
            if let Some(parent) = self.parent_of(id) {
                if label.is_empty() {
                    self.sync_separators(parent);
                } else if let Some(item) = self.item_mut(id) {
                    item.visible = true;
                }
            }
        }
    }

    pub fn set_icon(&mut self, id: NodeId, icon: &str) {
        if let Some(item) = self.item_mut(id) {
            item.set_icon(icon);
        }
    }

    pub fn set_ornament(&mut self, id: NodeId, ornament: super::Ornament) {
        if let Some(item) = self.item_mut(id) {
            item.set_ornament(ornament);
        }
    }

    /// Apply a new session policy: settings actions follow `allow_settings`
    /// and every open popup closes.
    pub fn session_updated(&mut self, policy: SessionPolicy) {
        self.policy = policy;
        let menus: Vec<NodeId> = self
            .nodes
            .iter()
            .filter_map(|(id, node)| match &node.entry {
                Entry::Menu(_) => Some(*id),
                Entry::Item(_) => None,
            })
            .collect();

        for menu in &menus {
            let actions: Vec<NodeId> = self
                .menu(*menu)
                .map(|m| m.settings_actions.values().copied().collect())
                .unwrap_or_default();
            for action in actions {
                self.set_visible(action, policy.allow_settings);
            }
        }

        for menu in menus {
            if matches!(self.menu(menu).map(Menu::kind), Some(MenuKind::Popup { .. })) {
                self.close(menu, super::PopupAnimation::Full);
            }
        }
    }

    pub(crate) fn item_kind(&self, id: NodeId) -> Option<&ItemKind> {
        self.item(id).map(MenuItem::kind)
    }
}
