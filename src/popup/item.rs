//! Menu items
//!
//! A single activatable row. The item only stores its own state; everything
//! that involves its parent (activation, sensitivity, focus) goes through
//! [`MenuTree`](super::MenuTree).

use super::NodeId;

/// Selection marker drawn in front of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ornament {
    #[default]
    None,
    Dot,
    Check,
    /// No ornament slot at all (container rows)
    Hidden,
}

impl Ornament {
    /// Text drawn in the ornament slot
    pub fn glyph(&self) -> &'static str {
        match self {
            Ornament::Dot => "\u{2022}",
            Ornament::Check => "\u{2713}",
            Ornament::None | Ornament::Hidden => "",
        }
    }
}

/// What kind of row an item is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Text only
    Plain,
    /// Icon and text
    Image { icon: String },
    /// Horizontal rule with an optional label
    Separator,
    /// Text with a toggle switch; `status` replaces the switch when set
    Switch { state: bool, status: Option<String> },
    /// Row that expands `menu` below itself
    SubMenu { menu: NodeId, icon: Option<String> },
}

/// Construction parameters shared by every item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemParams {
    /// Receives pointer events
    pub reactive: bool,
    /// Can be activated
    pub activate: bool,
    /// Hovering makes the item active
    pub hover: bool,
    /// Can take key focus
    pub can_focus: bool,
}

impl Default for ItemParams {
    fn default() -> Self {
        Self {
            reactive: true,
            activate: true,
            hover: true,
            can_focus: true,
        }
    }
}

impl ItemParams {
    /// Parameters for rows that only hold content
    pub fn inert() -> Self {
        Self {
            reactive: false,
            activate: false,
            hover: false,
            can_focus: false,
        }
    }
}

/// A menu row
#[derive(Debug, Clone)]
pub struct MenuItem {
    pub(crate) kind: ItemKind,
    pub(crate) label: String,
    pub(crate) active: bool,
    /// Own sensitivity flag
    pub(crate) sensitive: bool,
    /// Last computed effective sensitivity
    pub(crate) effective_sensitive: bool,
    pub(crate) activatable: bool,
    pub(crate) reactive: bool,
    pub(crate) can_focus: bool,
    pub(crate) track_hover: bool,
    pub(crate) visible: bool,
    pub(crate) ornament: Ornament,
    /// Pressed look latched between press and release
    pub(crate) pressed: bool,
}

impl MenuItem {
    fn with_kind(kind: ItemKind, label: &str, params: ItemParams) -> Self {
        let activatable = params.reactive && params.activate;
        Self {
            kind,
            label: label.to_string(),
            active: false,
            sensitive: true,
            effective_sensitive: activatable,
            activatable,
            reactive: params.reactive,
            can_focus: params.can_focus,
            track_hover: params.reactive && params.hover,
            visible: true,
            ornament: Ornament::None,
            pressed: false,
        }
    }

    /// Plain text item
    pub fn new(label: &str) -> Self {
        Self::with_kind(ItemKind::Plain, label, ItemParams::default())
    }

    /// Plain text item with explicit parameters
    pub fn with_params(label: &str, params: ItemParams) -> Self {
        Self::with_kind(ItemKind::Plain, label, params)
    }

    /// Icon and text item
    pub fn image(label: &str, icon: &str) -> Self {
        Self::with_kind(
            ItemKind::Image { icon: icon.to_string() },
            label,
            ItemParams::default(),
        )
    }

    /// Separator, optionally labelled
    pub fn separator(label: &str) -> Self {
        Self::with_kind(
            ItemKind::Separator,
            label,
            ItemParams {
                reactive: false,
                can_focus: false,
                ..ItemParams::default()
            },
        )
    }

    /// Item with a toggle switch
    pub fn switch(label: &str, state: bool) -> Self {
        Self::with_kind(
            ItemKind::Switch { state, status: None },
            label,
            ItemParams::default(),
        )
    }

    pub(crate) fn submenu(label: &str, menu: NodeId, want_icon: bool) -> Self {
        Self::with_kind(
            ItemKind::SubMenu {
                menu,
                icon: want_icon.then(String::new),
            },
            label,
            ItemParams::default(),
        )
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Effective sensitivity, including the parent chain
    pub fn is_sensitive(&self) -> bool {
        self.effective_sensitive
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_reactive(&self) -> bool {
        self.reactive
    }

    pub fn can_focus(&self) -> bool {
        self.can_focus
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn ornament(&self) -> Ornament {
        self.ornament
    }

    pub fn is_separator(&self) -> bool {
        matches!(self.kind, ItemKind::Separator)
    }

    /// Submenu owned by this item, if it is a submenu item
    pub fn submenu_id(&self) -> Option<NodeId> {
        match self.kind {
            ItemKind::SubMenu { menu, .. } => Some(menu),
            _ => None,
        }
    }

    /// Icon name for image and submenu items
    pub fn icon(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Image { icon } => Some(icon),
            ItemKind::SubMenu { icon, .. } => icon.as_deref(),
            _ => None,
        }
    }

    /// Switch state for switch items
    pub fn toggle_state(&self) -> Option<bool> {
        match self.kind {
            ItemKind::Switch { state, .. } => Some(state),
            _ => None,
        }
    }

    /// Status text shown instead of the switch
    pub fn status(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Switch { status, .. } => status.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn set_label(&mut self, label: &str) -> bool {
        if self.label == label {
            return false;
        }
        self.label = label.to_string();
        true
    }

    pub(crate) fn set_icon(&mut self, name: &str) {
        match &mut self.kind {
            ItemKind::Image { icon } => *icon = name.to_string(),
            ItemKind::SubMenu { icon, .. } => *icon = Some(name.to_string()),
            _ => {}
        }
    }

    pub(crate) fn set_ornament(&mut self, ornament: Ornament) -> bool {
        if self.ornament == ornament {
            return false;
        }
        self.ornament = ornament;
        true
    }

    /// Whether a status label currently hides the switch
    pub(crate) fn has_status(&self) -> bool {
        matches!(self.kind, ItemKind::Switch { status: Some(_), .. })
    }

    /// Recompute reactivity and focusability from `sensitive`
    pub(crate) fn apply_sensitivity(&mut self, sensitive: bool) -> bool {
        let changed = self.effective_sensitive != sensitive;
        self.effective_sensitive = sensitive;
        self.reactive = sensitive && !self.has_status();
        self.can_focus = sensitive;
        changed
    }
}
