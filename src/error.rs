//! Error types for the popup menu model
//!
//! Only direct misuse of the menu construction API is an error. Everything
//! coming from the network stack is logged and absorbed instead.

use thiserror::Error;

use crate::popup::NodeId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MenuError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0} is not a menu")]
    NotAMenu(NodeId),

    #[error("node {0} is not a menu item")]
    NotAnItem(NodeId),

    /// Popup and submenu menus cannot be nested as children; only items and
    /// sections can.
    #[error("invalid argument to add_menu_item(): {child} cannot be a child of {parent}")]
    InvalidChild { parent: NodeId, child: NodeId },

    #[error("node {child} already belongs to menu {parent}")]
    AlreadyParented { parent: NodeId, child: NodeId },

    #[error("adding {child} to {parent} would create a cycle")]
    WouldCycle { parent: NodeId, child: NodeId },
}

pub type Result<T> = std::result::Result<T, MenuError>;
