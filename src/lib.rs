//! Area network menu
//!
//! Popup menu model for panel indicators and the NetworkManager applet
//! built on it.

pub mod attention;
pub mod config;
pub mod dbus;
pub mod error;
pub mod network;
pub mod notify;
pub mod popup;
pub mod session;
