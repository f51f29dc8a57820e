//! Popup Menu Module
//!
//! The popup menu component model used by panel indicators: items, menus,
//! sections and submenus stored in a single arena ([`MenuTree`]), and the
//! [`MenuManager`] that arbitrates the input grab between menus.
//!
//! Parents own their children; children only keep the id of their parent.
//! Every observable change is queued as a [`MenuEvent`] which the owner of the
//! tree drains after each operation.

mod grab;
mod item;
mod keys;
mod manager;
mod menu;
mod open;
mod outline;
mod state;
mod tree;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use grab::{GrabHelper, InputHost, PressTarget};
pub use item::{ItemKind, MenuItem, Ornament};
pub use keys::{Key, KeyPress, Modifiers};
pub use manager::MenuManager;
pub use menu::{Menu, MenuKind};
pub use tree::MenuTree;

/// Identity of a node (item or menu) in a [`MenuTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of the panel region a popup menu is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u32);

/// Open/close transition requested for a menu.
///
/// Only recorded; the presentation layer decides what each one looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupAnimation {
    /// Immediate
    None,
    /// Quick cross-fade, used when one menu hands over to another
    Fade,
    /// Slide only
    Slide,
    /// Full user-facing transition
    Full,
}

/// Side of the menu the arrow points out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Top,
    Right,
    Bottom,
    Left,
}

/// What caused an item activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Pointer button released over the item
    Pointer,
    /// Touch sequence ended over the item
    Touch,
    /// Key press (Space or Return)
    Key(Key),
    /// Triggered by code
    Programmatic,
}

/// Observable changes in a [`MenuTree`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuEvent {
    /// The active item of `menu` changed
    ActiveChanged { menu: NodeId, item: Option<NodeId> },
    /// `item`, a direct child of `menu`, was activated
    ItemActivated { menu: NodeId, item: NodeId },
    /// A switch item was toggled
    Toggled { item: NodeId, state: bool },
    /// A menu was opened or closed
    OpenStateChanged { menu: NodeId, open: bool, animation: PopupAnimation },
    /// A popup menu finished closing
    MenuClosed { menu: NodeId },
    /// Effective sensitivity of an item changed
    SensitiveChanged { item: NodeId, sensitive: bool },
    /// Key focus moved
    FocusChanged { node: Option<NodeId> },
    /// A settings action was activated
    LaunchSettings { item: NodeId, desktop_file: String },
    /// A node was destroyed
    Destroyed { node: NodeId },
}

impl MenuEvent {
    /// Whether the event mentions `node`
    pub fn references(&self, node: NodeId) -> bool {
        match self {
            MenuEvent::ActiveChanged { menu, item } => *menu == node || *item == Some(node),
            MenuEvent::ItemActivated { menu, item } => *menu == node || *item == node,
            MenuEvent::Toggled { item, .. } => *item == node,
            MenuEvent::OpenStateChanged { menu, .. } => *menu == node,
            MenuEvent::MenuClosed { menu } => *menu == node,
            MenuEvent::SensitiveChanged { item, .. } => *item == node,
            MenuEvent::FocusChanged { node: focused } => *focused == Some(node),
            MenuEvent::LaunchSettings { item, .. } => *item == node,
            MenuEvent::Destroyed { node: destroyed } => *destroyed == node,
        }
    }
}
