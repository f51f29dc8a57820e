//! Grab stack over a modal input host

use tracing::{debug, warn};

use super::{NodeId, SourceId};

/// Host side of a modal input grab (compositor, X server, test double)
pub trait InputHost {
    /// Take the modal grab, optionally focusing `focus`. Returns false when
    /// the host refused it.
    fn push_modal(&mut self, focus: Option<SourceId>) -> bool;

    /// Release the modal grab taken by [`push_modal`](Self::push_modal)
    fn pop_modal(&mut self);
}

/// Where a button press landed while something is grabbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressTarget {
    /// Inside one of the grabbed menus
    InsideMenu,
    /// On a panel region
    Source(SourceId),
    /// Anywhere else
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Grab {
    menu: NodeId,
    focus: Option<SourceId>,
}

/// Stack of grabbed menus sharing a single modal grab on the host
#[derive(Debug)]
pub struct GrabHelper<H: InputHost> {
    host: H,
    stack: Vec<Grab>,
    /// Source regions whose presses are not "outside"
    actors: Vec<SourceId>,
    modal: bool,
    ignore_until_release: bool,
}

impl<H: InputHost> GrabHelper<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            stack: Vec::new(),
            actors: Vec::new(),
            modal: false,
            ignore_until_release: false,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Track a source region
    pub fn add_actor(&mut self, source: SourceId) {
        if !self.actors.contains(&source) {
            self.actors.push(source);
        }
    }

    pub fn remove_actor(&mut self, source: SourceId) {
        self.actors.retain(|&s| s != source);
    }

    pub fn has_actor(&self, source: SourceId) -> bool {
        self.actors.contains(&source)
    }

    /// Whether anything is grabbed
    pub fn grabbed(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn is_grabbed(&self, menu: NodeId) -> bool {
        self.stack.iter().any(|g| g.menu == menu)
    }

    /// Number of grabbed menus
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Oldest grab
    pub fn bottom(&self) -> Option<NodeId> {
        self.stack.first().map(|g| g.menu)
    }

    /// Newest grab
    pub fn top(&self) -> Option<NodeId> {
        self.stack.last().map(|g| g.menu)
    }

    /// Source focused by the newest grab
    pub fn current_focus(&self) -> Option<SourceId> {
        self.stack.last().and_then(|g| g.focus)
    }

    /// Push a grab for `menu`.
    ///
    /// The first grab takes the host's modal grab; returns false if the host
    /// refused it.
    pub fn grab(&mut self, menu: NodeId, focus: Option<SourceId>) -> bool {
        if self.is_grabbed(menu) {
            return true;
        }
        if !self.modal {
            if !self.host.push_modal(focus) {
                warn!("Input host refused modal grab for menu {}", menu);
                return false;
            }
            self.modal = true;
        }
        self.stack.push(Grab { menu, focus });
        debug!("Grabbed menu {} (depth {})", menu, self.stack.len());
        true
    }

    /// Release the grab of `menu` (or the newest one) and everything pushed
    /// after it. Returns the released menus, newest first.
    pub fn ungrab(&mut self, menu: Option<NodeId>) -> Vec<NodeId> {
        let index = match menu {
            Some(menu) => match self.stack.iter().position(|g| g.menu == menu) {
                Some(index) => index,
                None => return Vec::new(),
            },
            None if self.stack.is_empty() => return Vec::new(),
            None => self.stack.len() - 1,
        };

        let released: Vec<NodeId> = self.stack.drain(index..).rev().map(|g| g.menu).collect();
        if self.stack.is_empty() && self.modal {
            self.host.pop_modal();
            self.modal = false;
        }
        debug!("Ungrabbed menus {:?}", released);
        released
    }

    /// Swallow the next button release
    pub fn ignore_release(&mut self) {
        self.ignore_until_release = true;
    }

    /// Button pressed while grabbed. Returns the menus dismissed by the user.
    pub fn press(&mut self, target: PressTarget) -> Vec<NodeId> {
        if !self.grabbed() {
            return Vec::new();
        }
        match target {
            PressTarget::InsideMenu => Vec::new(),
            PressTarget::Source(source) if self.has_actor(source) => Vec::new(),
            PressTarget::Source(_) | PressTarget::Outside => {
                self.ignore_until_release = true;
                self.ungrab(None)
            }
        }
    }

    /// Button released. Returns true when the release must be swallowed.
    pub fn release(&mut self) -> bool {
        std::mem::take(&mut self.ignore_until_release)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Input host recording every modal call
    #[derive(Debug, Default)]
    pub(crate) struct RecordingHost {
        pub calls: Vec<&'static str>,
        pub refuse: bool,
    }

    impl InputHost for RecordingHost {
        fn push_modal(&mut self, _focus: Option<SourceId>) -> bool {
            if self.refuse {
                return false;
            }
            self.calls.push("push");
            true
        }

        fn pop_modal(&mut self) {
            self.calls.push("pop");
        }
    }

    #[test]
    fn test_single_modal_for_nested_grabs() {
        let mut grab = GrabHelper::new(RecordingHost::default());
        assert!(grab.grab(NodeId(1), Some(SourceId(1))));
        assert!(grab.grab(NodeId(2), None));
        assert!(grab.grab(NodeId(2), None));
        assert_eq!(grab.bottom(), Some(NodeId(1)));
        assert_eq!(grab.top(), Some(NodeId(2)));

        assert_eq!(grab.ungrab(Some(NodeId(1))), vec![NodeId(2), NodeId(1)]);
        assert!(!grab.grabbed());
        assert_eq!(grab.host().calls, vec!["push", "pop"]);
        assert!(grab.ungrab(None).is_empty());
    }

    #[test]
    fn test_refused_grab() {
        let mut grab = GrabHelper::new(RecordingHost {
            refuse: true,
            ..Default::default()
        });
        assert!(!grab.grab(NodeId(1), None));
        assert!(!grab.grabbed());
    }

    #[test]
    fn test_press_outside_dismisses() {
        let mut grab = GrabHelper::new(RecordingHost::default());
        grab.add_actor(SourceId(3));
        grab.grab(NodeId(1), Some(SourceId(3)));

        assert!(grab.press(PressTarget::InsideMenu).is_empty());
        assert!(grab.press(PressTarget::Source(SourceId(3))).is_empty());
        assert!(!grab.release());

        assert_eq!(grab.press(PressTarget::Outside), vec![NodeId(1)]);
        assert!(grab.release());
        assert!(!grab.release());
    }
}
