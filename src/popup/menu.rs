//! Menu containers
//!
//! Popup menus, submenus and sections share one container type; the
//! differences live in [`MenuKind`].

use std::collections::BTreeMap;

use super::{NodeId, PopupAnimation, Side, SourceId};

/// What kind of container a menu is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuKind {
    /// Top-level menu attached to a panel region
    Popup {
        arrow_side: Side,
        source: Option<SourceId>,
        /// Keep pointer crossings away from the source region
        block_source_events: bool,
        /// Whether the source region currently accepts input
        source_reactive: bool,
    },
    /// Menu expanded under `source_item`
    SubMenu {
        source_item: NodeId,
        /// Arrow of the source item points down while open
        arrow_rotated: bool,
    },
    /// Visually transparent group inside another menu
    Section,
}

/// A container of menu items
#[derive(Debug, Clone)]
pub struct Menu {
    pub(crate) kind: MenuKind,
    pub(crate) children: Vec<NodeId>,
    pub(crate) is_open: bool,
    pub(crate) sensitive: bool,
    pub(crate) visible: bool,
    /// Active item anywhere below this menu
    pub(crate) active_item: Option<NodeId>,
    /// Currently expanded submenu (top-level menus only)
    pub(crate) opened_submenu: Option<NodeId>,
    /// Settings actions keyed by desktop file
    pub(crate) settings_actions: BTreeMap<String, NodeId>,
    pub(crate) last_animation: Option<PopupAnimation>,
}

impl Menu {
    pub(crate) fn new(kind: MenuKind) -> Self {
        // Sections ignore open/close and always count as open
        let is_open = matches!(kind, MenuKind::Section);
        Self {
            kind,
            children: Vec::new(),
            is_open,
            sensitive: true,
            visible: true,
            active_item: None,
            opened_submenu: None,
            settings_actions: BTreeMap::new(),
            last_animation: None,
        }
    }

    pub fn kind(&self) -> &MenuKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Own sensitivity flag
    pub fn own_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn active_item(&self) -> Option<NodeId> {
        self.active_item
    }

    pub fn opened_submenu(&self) -> Option<NodeId> {
        self.opened_submenu
    }

    /// Transition used by the last open or close
    pub fn last_animation(&self) -> Option<PopupAnimation> {
        self.last_animation
    }

    pub fn is_section(&self) -> bool {
        matches!(self.kind, MenuKind::Section)
    }

    pub fn source(&self) -> Option<SourceId> {
        match self.kind {
            MenuKind::Popup { source, .. } => source,
            _ => None,
        }
    }

    pub fn arrow_side(&self) -> Option<Side> {
        match self.kind {
            MenuKind::Popup { arrow_side, .. } => Some(arrow_side),
            _ => None,
        }
    }

    /// Arrow rotation flag for submenus
    pub fn arrow_rotated(&self) -> bool {
        matches!(self.kind, MenuKind::SubMenu { arrow_rotated: true, .. })
    }

    pub(crate) fn set_arrow_rotated(&mut self, rotated: bool) {
        if let MenuKind::SubMenu { arrow_rotated, .. } = &mut self.kind {
            *arrow_rotated = rotated;
        }
    }
}
