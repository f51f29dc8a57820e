//! Network Menu Module
//!
//! Keeps the network popup in sync with NetworkManager. Events from the
//! network stack are mirrored in [`NetworkState`] and reconciled into the
//! menu by [`NetworkApplet`]; user choices come back out as
//! [`AppletAction`]s.

pub mod applet;
pub mod device;
pub mod model;
pub mod section;
pub mod security;
pub mod sorter;
pub mod types;
pub mod vpn;
pub mod wireless;
pub mod wireless_device;

pub use applet::{AppletAction, IndicatorState, NetworkApplet, PortalHelperResult};
pub use model::{AccessPoint, ActiveConnection, Connection, Device, ModemInfo, NetEvent, NetworkState};
pub use sorter::{collate, ItemSorter};
pub use wireless::WirelessNetwork;
