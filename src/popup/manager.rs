//! Menu manager
//!
//! Decides which of a group of menus (typically the indicators of one panel)
//! owns the input grab. Opening one menu closes the other; moving the pointer
//! or key focus onto another source while a menu is open switches to it.

use tracing::{debug, warn};

use super::grab::{GrabHelper, InputHost, PressTarget};
use super::menu::MenuKind;
use super::tree::MenuTree;
use super::{MenuEvent, NodeId, PopupAnimation, SourceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ManagedMenu {
    menu: NodeId,
    source: Option<SourceId>,
}

pub struct MenuManager<H: InputHost> {
    grab: GrabHelper<H>,
    menus: Vec<ManagedMenu>,
}

impl<H: InputHost> MenuManager<H> {
    pub fn new(host: H) -> Self {
        Self {
            grab: GrabHelper::new(host),
            menus: Vec::new(),
        }
    }

    pub fn grab_helper(&self) -> &GrabHelper<H> {
        &self.grab
    }

    pub fn host(&self) -> &H {
        self.grab.host()
    }

    fn find(&self, menu: NodeId) -> Option<usize> {
        self.menus.iter().position(|m| m.menu == menu)
    }

    pub fn is_managed(&self, menu: NodeId) -> bool {
        self.find(menu).is_some()
    }

    /// Start managing `menu`; adding twice is a no-op
    pub fn add_menu(&mut self, tree: &MenuTree, menu: NodeId, position: Option<usize>) {
        if self.is_managed(menu) {
            return;
        }
        let Some(MenuKind::Popup {
            source,
            block_source_events,
            ..
        }) = tree.menu(menu).map(|m| m.kind.clone())
        else {
            warn!("Refusing to manage {}: not a popup menu", menu);
            return;
        };

        if let Some(source) = source {
            if !block_source_events {
                self.grab.add_actor(source);
            }
        }

        let record = ManagedMenu { menu, source };
        match position {
            Some(pos) if pos < self.menus.len() => self.menus.insert(pos, record),
            _ => self.menus.push(record),
        }
    }

    /// Stop managing `menu`, closing it first if it holds the grab
    pub fn remove_menu(&mut self, tree: &mut MenuTree, menu: NodeId) {
        if self.active_menu() == Some(menu) {
            tree.close(menu, PopupAnimation::None);
        }
        if self.grab.is_grabbed(menu) {
            self.grab.ungrab(Some(menu));
        }

        let Some(index) = self.find(menu) else {
            return;
        };
        let record = self.menus.remove(index);
        if let Some(source) = record.source {
            self.grab.remove_actor(source);
        }
    }

    /// Menu holding the oldest grab
    pub fn active_menu(&self) -> Option<NodeId> {
        self.grab.bottom()
    }

    pub fn ignore_release(&mut self) {
        self.grab.ignore_release();
    }

    /// React to a tree event. Call for every event drained from the tree.
    pub fn handle_event(&mut self, tree: &mut MenuTree, event: &MenuEvent) {
        match *event {
            MenuEvent::OpenStateChanged { menu, open: true, .. } if self.is_managed(menu) => {
                // Stale if the menu was closed again before we got here
                if !tree.menu(menu).is_some_and(|m| m.is_open()) {
                    return;
                }
                if let Some(active) = self.active_menu().filter(|&a| a != menu) {
                    tree.close(active, PopupAnimation::Fade);
                    self.grab.ungrab(Some(active));
                }
                let focus = self.source_of(menu);
                if !self.grab.grab(menu, focus) {
                    warn!("Could not grab input for menu {}, closing it", menu);
                    tree.close(menu, PopupAnimation::None);
                }
            }
            MenuEvent::OpenStateChanged { menu, open: false, .. } if self.is_managed(menu) => {
                self.grab.ungrab(Some(menu));
            }
            MenuEvent::Destroyed { node } if self.is_managed(node) => {
                self.remove_menu(tree, node);
            }
            _ => {}
        }
    }

    /// Drain the tree's events through [`handle_event`](Self::handle_event)
    /// until it settles, returning them for other consumers
    pub fn pump(&mut self, tree: &mut MenuTree) -> Vec<MenuEvent> {
        let mut seen = Vec::new();
        while let Some(event) = tree.pop_event() {
            self.handle_event(tree, &event);
            seen.push(event);
        }
        seen
    }

    fn source_of(&self, menu: NodeId) -> Option<SourceId> {
        self.find(menu).and_then(|i| self.menus[i].source)
    }

    fn menu_for_source(&self, source: SourceId) -> Option<NodeId> {
        self.menus.iter().find(|m| m.source == Some(source)).map(|m| m.menu)
    }

    /// Pointer entered a source region. Returns true when it switched menus;
    /// an empty menu refuses to open and nothing switches.
    pub fn on_source_enter(&mut self, tree: &mut MenuTree, source: SourceId) -> bool {
        let Some(menu) = self.menu_for_source(source) else {
            return false;
        };
        if !self.grab.grabbed() || self.grab.is_grabbed(menu) {
            return false;
        }
        let animation = if self.active_menu().is_some() {
            PopupAnimation::Fade
        } else {
            PopupAnimation::Full
        };
        debug!("Switching to menu {} on source {:?}", menu, source);
        tree.open(menu, animation);
        tree.menu(menu).is_some_and(|m| m.is_open())
    }

    /// Key focus moved onto a source region
    pub fn on_source_focus_in(&mut self, tree: &mut MenuTree, source: SourceId) -> bool {
        self.on_source_enter(tree, source)
    }

    /// Button pressed while a menu is open; presses outside dismiss it
    pub fn handle_press(&mut self, tree: &mut MenuTree, target: PressTarget) {
        let dismissed = self.grab.press(target);
        self.close_dismissed(tree, dismissed);
    }

    /// Button released; returns true if the release must be swallowed
    pub fn handle_release(&mut self) -> bool {
        self.grab.release()
    }

    /// Escape pressed while a menu is grabbed
    pub fn handle_escape(&mut self, tree: &mut MenuTree) -> bool {
        if !self.grab.grabbed() {
            return false;
        }
        let dismissed = self.grab.ungrab(None);
        self.close_dismissed(tree, dismissed);
        true
    }

    /// User-initiated ungrab: the released menus close with the full
    /// transition
    fn close_dismissed(&mut self, tree: &mut MenuTree, dismissed: Vec<NodeId>) {
        for menu in dismissed {
            tree.close(menu, PopupAnimation::Full);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::popup::grab::tests::RecordingHost;
    use crate::popup::Side;
    use crate::session::SessionPolicy;

    fn setup() -> (MenuTree, MenuManager<RecordingHost>, NodeId, NodeId) {
        let mut tree = MenuTree::new(SessionPolicy::default());
        let mut manager = MenuManager::new(RecordingHost::default());
        let first = tree.new_popup(Some(SourceId(1)), Side::Top);
        tree.add_action(first, "First", None).unwrap();
        let second = tree.new_popup(Some(SourceId(2)), Side::Top);
        tree.add_action(second, "Second", None).unwrap();
        manager.add_menu(&tree, first, None);
        manager.add_menu(&tree, second, None);
        manager.add_menu(&tree, second, None);
        (tree, manager, first, second)
    }

    #[test]
    fn test_opening_second_menu_fades_first() {
        let (mut tree, mut manager, first, second) = setup();
        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert_eq!(manager.active_menu(), Some(first));

        tree.open(second, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert!(!tree.menu(first).unwrap().is_open());
        assert_eq!(tree.menu(first).unwrap().last_animation(), Some(PopupAnimation::Fade));
        assert_eq!(manager.active_menu(), Some(second));
        assert_eq!(manager.host().calls, vec!["push", "pop", "push"]);

        tree.close(second, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert_eq!(manager.active_menu(), None);
        assert_eq!(manager.host().calls, vec!["push", "pop", "push", "pop"]);
    }

    #[test]
    fn test_source_enter_switches_only_while_grabbed() {
        let (mut tree, mut manager, first, second) = setup();
        assert!(!manager.on_source_enter(&mut tree, SourceId(2)));
        assert!(!tree.menu(second).unwrap().is_open());

        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert!(!manager.on_source_enter(&mut tree, SourceId(1)));
        assert!(manager.on_source_focus_in(&mut tree, SourceId(2)));
        manager.pump(&mut tree);
        assert_eq!(tree.menu(second).unwrap().last_animation(), Some(PopupAnimation::Fade));
        assert_eq!(manager.active_menu(), Some(second));
        assert!(!tree.menu(first).unwrap().is_open());
    }

    #[test]
    fn test_handoff_keeps_a_single_grab() {
        let (mut tree, mut manager, first, second) = setup();
        let grabs = |manager: &MenuManager<RecordingHost>| manager.grab_helper().depth();

        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert_eq!(manager.active_menu(), Some(first));
        assert_eq!(grabs(&manager), 1);

        assert!(manager.on_source_enter(&mut tree, SourceId(2)));
        manager.pump(&mut tree);
        assert_eq!(manager.active_menu(), Some(second));
        assert_eq!(grabs(&manager), 1);
        assert!(!manager.grab_helper().is_grabbed(first));
        assert!(!tree.menu(first).unwrap().is_open());
        assert_eq!(tree.menu(first).unwrap().last_animation(), Some(PopupAnimation::Fade));
        assert!(tree.menu(second).unwrap().is_open());

        assert!(manager.handle_escape(&mut tree));
        manager.pump(&mut tree);
        assert_eq!(manager.active_menu(), None);
        assert_eq!(grabs(&manager), 0);
        assert!(!tree.menu(second).unwrap().is_open());
        assert_eq!(tree.menu(second).unwrap().last_animation(), Some(PopupAnimation::Full));
        assert_eq!(manager.host().calls, vec!["push", "pop", "push", "pop"]);
    }

    #[test]
    fn test_source_enter_on_empty_menu_keeps_current() {
        let (mut tree, mut manager, first, _) = setup();
        let empty = tree.new_popup(Some(SourceId(3)), Side::Top);
        manager.add_menu(&tree, empty, None);

        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert!(!manager.on_source_enter(&mut tree, SourceId(3)));
        manager.pump(&mut tree);
        assert!(!tree.menu(empty).unwrap().is_open());
        assert!(tree.menu(first).unwrap().is_open());
        assert_eq!(manager.active_menu(), Some(first));
        assert_eq!(manager.grab_helper().depth(), 1);
    }

    #[test]
    fn test_outside_press_closes_with_full() {
        let (mut tree, mut manager, first, _) = setup();
        tree.open(first, PopupAnimation::Fade);
        manager.pump(&mut tree);

        manager.handle_press(&mut tree, PressTarget::Source(SourceId(1)));
        assert!(tree.menu(first).unwrap().is_open());

        manager.handle_press(&mut tree, PressTarget::Outside);
        manager.pump(&mut tree);
        assert!(!tree.menu(first).unwrap().is_open());
        assert_eq!(tree.menu(first).unwrap().last_animation(), Some(PopupAnimation::Full));
        assert!(manager.handle_release());
        assert_eq!(manager.active_menu(), None);
    }

    #[test]
    fn test_escape_dismisses() {
        let (mut tree, mut manager, first, _) = setup();
        assert!(!manager.handle_escape(&mut tree));
        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert!(manager.handle_escape(&mut tree));
        assert!(!tree.menu(first).unwrap().is_open());
    }

    #[test]
    fn test_remove_active_menu_closes_without_animation() {
        let (mut tree, mut manager, first, _) = setup();
        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);

        manager.remove_menu(&mut tree, first);
        assert!(!tree.menu(first).unwrap().is_open());
        assert_eq!(tree.menu(first).unwrap().last_animation(), Some(PopupAnimation::None));
        assert!(!manager.is_managed(first));
        assert!(!manager.grab_helper().grabbed());
        assert!(!manager.grab_helper().has_actor(SourceId(1)));
    }

    #[test]
    fn test_destroyed_menu_is_forgotten() {
        let (mut tree, mut manager, first, _) = setup();
        tree.open(first, PopupAnimation::Full);
        manager.pump(&mut tree);

        tree.destroy(first);
        manager.pump(&mut tree);
        assert!(!manager.is_managed(first));
        assert_eq!(manager.active_menu(), None);
    }

    #[test]
    fn test_refused_grab_closes_menu() {
        let mut tree = MenuTree::new(SessionPolicy::default());
        let mut manager = MenuManager::new(RecordingHost {
            refuse: true,
            ..Default::default()
        });
        let menu = tree.new_popup(Some(SourceId(1)), Side::Top);
        tree.add_action(menu, "A", None).unwrap();
        manager.add_menu(&tree, menu, None);

        tree.open(menu, PopupAnimation::Full);
        manager.pump(&mut tree);
        assert!(!tree.menu(menu).unwrap().is_open());
    }
}
