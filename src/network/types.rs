//! NetworkManager value types
//!
//! Numeric values follow the NetworkManager D-Bus API so that properties can
//! be passed through unchanged.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

macro_rules! object_path {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(path: &str) -> Self {
                Self(path.to_string())
            }
        }
    };
}

object_path!(
    /// `/org/freedesktop/NetworkManager/Devices/N`
    DevicePath
);
object_path!(
    /// `/org/freedesktop/NetworkManager/AccessPoint/N`
    ApPath
);
object_path!(
    /// `/org/freedesktop/NetworkManager/Settings/N`
    ConnectionPath
);
object_path!(
    /// `/org/freedesktop/NetworkManager/ActiveConnection/N`
    ActivePath
);

/// NMDeviceType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ethernet,
    Wifi,
    Bluetooth,
    Modem,
    Other(u32),
}

impl DeviceType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => DeviceType::Ethernet,
            2 => DeviceType::Wifi,
            5 => DeviceType::Bluetooth,
            8 => DeviceType::Modem,
            other => DeviceType::Other(other),
        }
    }

    /// Generic name used when naming devices
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceType::Ethernet => "Ethernet",
            DeviceType::Wifi => "Wi-Fi",
            DeviceType::Bluetooth => "Bluetooth",
            DeviceType::Modem => "Mobile Broadband",
            DeviceType::Other(_) => "Network",
        }
    }

    /// Connection category handled by devices of this type
    pub fn category(&self) -> ConnectionCategory {
        match self {
            DeviceType::Ethernet => ConnectionCategory::Wired,
            DeviceType::Wifi => ConnectionCategory::Wireless,
            DeviceType::Bluetooth => ConnectionCategory::Bluetooth,
            DeviceType::Modem => ConnectionCategory::Wwan,
            DeviceType::Other(_) => ConnectionCategory::Invalid,
        }
    }
}

/// NMDeviceState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceState(pub u32);

impl DeviceState {
    pub const UNKNOWN: Self = Self(0);
    pub const UNMANAGED: Self = Self(10);
    pub const UNAVAILABLE: Self = Self(20);
    pub const DISCONNECTED: Self = Self(30);
    pub const PREPARE: Self = Self(40);
    pub const CONFIG: Self = Self(50);
    pub const NEED_AUTH: Self = Self(60);
    pub const IP_CONFIG: Self = Self(70);
    pub const IP_CHECK: Self = Self(80);
    pub const SECONDARIES: Self = Self(90);
    pub const ACTIVATED: Self = Self(100);
    pub const DEACTIVATING: Self = Self(110);
    pub const FAILED: Self = Self(120);
}

/// NMDeviceStateReason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceStateReason(pub u32);

impl DeviceStateReason {
    pub const NONE: Self = Self(0);
    pub const UNKNOWN: Self = Self(1);
    /// Secrets were required but not provided (the agent dialog was cancelled)
    pub const NO_SECRETS: Self = Self(7);
}

/// NMActiveConnectionState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveConnectionState {
    Unknown = 0,
    Activating = 1,
    Activated = 2,
    Deactivating = 3,
    #[default]
    Deactivated = 4,
}

impl ActiveConnectionState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ActiveConnectionState::Activating,
            2 => ActiveConnectionState::Activated,
            3 => ActiveConnectionState::Deactivating,
            4 => ActiveConnectionState::Deactivated,
            _ => ActiveConnectionState::Unknown,
        }
    }

    /// Activating or activated
    pub fn is_active(&self) -> bool {
        *self <= ActiveConnectionState::Activated
    }
}

/// NMActiveConnectionStateReason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveConnectionStateReason(pub u32);

impl ActiveConnectionStateReason {
    pub const UNKNOWN: Self = Self(0);
    pub const NONE: Self = Self(1);
    pub const USER_DISCONNECTED: Self = Self(2);
    pub const NO_SECRETS: Self = Self(9);
}

/// NMConnectivityState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    #[default]
    Unknown = 0,
    None = 1,
    Portal = 2,
    Limited = 3,
    Full = 4,
}

impl ConnectivityState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ConnectivityState::None,
            2 => ConnectivityState::Portal,
            3 => ConnectivityState::Limited,
            4 => ConnectivityState::Full,
            _ => ConnectivityState::Unknown,
        }
    }
}

/// NMState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NmState(pub u32);

impl NmState {
    pub const UNKNOWN: Self = Self(0);
    pub const ASLEEP: Self = Self(10);
    pub const DISCONNECTED: Self = Self(20);
    pub const CONNECTING: Self = Self(40);
    pub const CONNECTED_LOCAL: Self = Self(50);
    pub const CONNECTED_SITE: Self = Self(60);
    pub const CONNECTED_GLOBAL: Self = Self(70);
}

/// NM80211Mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode80211 {
    #[default]
    Unknown,
    Adhoc,
    Infra,
    Ap,
    Mesh,
}

impl Mode80211 {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Mode80211::Adhoc,
            2 => Mode80211::Infra,
            3 => Mode80211::Ap,
            4 => Mode80211::Mesh,
            _ => Mode80211::Unknown,
        }
    }
}

bitflags! {
    /// NM80211ApFlags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ApFlags: u32 {
        const PRIVACY = 0x1;
        const WPS = 0x2;
        const WPS_PBC = 0x4;
        const WPS_PIN = 0x8;
    }
}

bitflags! {
    /// NM80211ApSecurityFlags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ApSecurityFlags: u32 {
        const PAIR_WEP40 = 0x1;
        const PAIR_WEP104 = 0x2;
        const PAIR_TKIP = 0x4;
        const PAIR_CCMP = 0x8;
        const GROUP_WEP40 = 0x10;
        const GROUP_WEP104 = 0x20;
        const GROUP_TKIP = 0x40;
        const GROUP_CCMP = 0x80;
        const KEY_MGMT_PSK = 0x100;
        const KEY_MGMT_802_1X = 0x200;
        const KEY_MGMT_SAE = 0x400;
        const KEY_MGMT_OWE = 0x800;
        const KEY_MGMT_OWE_TM = 0x1000;
        const KEY_MGMT_EAP_SUITE_B_192 = 0x2000;
    }
}

bitflags! {
    /// NMDeviceWifiCapabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct WifiCapabilities: u32 {
        const CIPHER_WEP40 = 0x1;
        const CIPHER_WEP104 = 0x2;
        const CIPHER_TKIP = 0x4;
        const CIPHER_CCMP = 0x8;
        const WPA = 0x10;
        const RSN = 0x20;
        const AP = 0x40;
        const ADHOC = 0x80;
        const FREQ_VALID = 0x100;
        const FREQ_2GHZ = 0x200;
        const FREQ_5GHZ = 0x400;
        const MESH = 0x1000;
        const IBSS_RSN = 0x2000;
    }
}

bitflags! {
    /// NMDeviceModemCapabilities
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ModemCapabilities: u32 {
        const POTS = 0x1;
        const CDMA_EVDO = 0x2;
        const GSM_UMTS = 0x4;
        const LTE = 0x8;
    }
}

/// NMUtilsSecurityType, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityType {
    #[default]
    Invalid,
    None,
    StaticWep,
    Leap,
    DynamicWep,
    WpaPsk,
    WpaEnterprise,
    Wpa2Psk,
    Wpa2Enterprise,
    Sae,
    Owe,
    Wpa3SuiteB192,
}

impl SecurityType {
    /// Every valid type, strongest first
    pub const STRONGEST_FIRST: [SecurityType; 11] = [
        SecurityType::Wpa3SuiteB192,
        SecurityType::Owe,
        SecurityType::Sae,
        SecurityType::Wpa2Enterprise,
        SecurityType::Wpa2Psk,
        SecurityType::WpaEnterprise,
        SecurityType::WpaPsk,
        SecurityType::DynamicWep,
        SecurityType::Leap,
        SecurityType::StaticWep,
        SecurityType::None,
    ];

    pub fn is_enterprise(&self) -> bool {
        matches!(self, SecurityType::WpaEnterprise | SecurityType::Wpa2Enterprise)
    }
}

/// Which part of the menu a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionCategory {
    Invalid,
    Wired,
    Wireless,
    Bluetooth,
    Wwan,
    Vpn,
}

impl ConnectionCategory {
    /// Category of a connection from its `connection.type` setting
    pub fn from_setting_type(setting_type: &str) -> Self {
        match setting_type {
            "802-3-ethernet" => ConnectionCategory::Wired,
            "802-11-wireless" => ConnectionCategory::Wireless,
            "bluetooth" => ConnectionCategory::Bluetooth,
            "cdma" | "gsm" => ConnectionCategory::Wwan,
            "vpn" | "wireguard" => ConnectionCategory::Vpn,
            _ => ConnectionCategory::Invalid,
        }
    }
}

/// Icon strength bucket for a 0-100 signal value
pub fn signal_to_icon(value: u8) -> &'static str {
    match value {
        0..=19 => "none",
        20..=39 => "weak",
        40..=49 => "ok",
        50..=79 => "good",
        _ => "excellent",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_buckets() {
        assert_eq!(signal_to_icon(0), "none");
        assert_eq!(signal_to_icon(19), "none");
        assert_eq!(signal_to_icon(20), "weak");
        assert_eq!(signal_to_icon(45), "ok");
        assert_eq!(signal_to_icon(50), "good");
        assert_eq!(signal_to_icon(80), "excellent");
    }

    #[test]
    fn test_connection_categories() {
        assert_eq!(ConnectionCategory::from_setting_type("802-3-ethernet"), ConnectionCategory::Wired);
        assert_eq!(ConnectionCategory::from_setting_type("gsm"), ConnectionCategory::Wwan);
        assert_eq!(ConnectionCategory::from_setting_type("wireguard"), ConnectionCategory::Vpn);
        assert_eq!(ConnectionCategory::from_setting_type("bridge"), ConnectionCategory::Invalid);
    }

    #[test]
    fn test_active_state_ordering() {
        assert!(ActiveConnectionState::Activating.is_active());
        assert!(ActiveConnectionState::Activated.is_active());
        assert!(!ActiveConnectionState::Deactivating.is_active());
        assert!(!ActiveConnectionState::default().is_active());
    }
}
