//! Wi-Fi security classification
//!
//! Decides which security types an access point can be used with on a given
//! device. Networks are grouped by the strongest valid type.

use super::types::{ApFlags, ApSecurityFlags, Mode80211, SecurityType, WifiCapabilities};
use super::model::AccessPoint;

/// Whether the device supports at least one pairwise and one group cipher
/// advertised by the access point. Static WEP only uses group ciphers.
fn device_supports_ap_ciphers(caps: WifiCapabilities, ap: ApSecurityFlags, static_wep: bool) -> bool {
    let pairs = [
        (WifiCapabilities::CIPHER_WEP40, ApSecurityFlags::PAIR_WEP40),
        (WifiCapabilities::CIPHER_WEP104, ApSecurityFlags::PAIR_WEP104),
        (WifiCapabilities::CIPHER_TKIP, ApSecurityFlags::PAIR_TKIP),
        (WifiCapabilities::CIPHER_CCMP, ApSecurityFlags::PAIR_CCMP),
    ];
    let groups = [
        (WifiCapabilities::CIPHER_WEP40, ApSecurityFlags::GROUP_WEP40),
        (WifiCapabilities::CIPHER_WEP104, ApSecurityFlags::GROUP_WEP104),
        (WifiCapabilities::CIPHER_TKIP, ApSecurityFlags::GROUP_TKIP),
        (WifiCapabilities::CIPHER_CCMP, ApSecurityFlags::GROUP_CCMP),
    ];

    let have_pair = static_wep || pairs.iter().any(|(dev, flag)| caps.contains(*dev) && ap.contains(*flag));
    let have_group = groups
        .iter()
        .filter(|(dev, _)| !static_wep || dev.intersects(WifiCapabilities::CIPHER_WEP40 | WifiCapabilities::CIPHER_WEP104))
        .any(|(dev, flag)| caps.contains(*dev) && ap.contains(*flag));
    have_pair && have_group
}

/// PSK-style key management with a usable TKIP or CCMP pairwise cipher
fn psk_cipher_ok(caps: WifiCapabilities, flags: ApSecurityFlags) -> bool {
    (flags.contains(ApSecurityFlags::PAIR_TKIP) && caps.contains(WifiCapabilities::CIPHER_TKIP))
        || (flags.contains(ApSecurityFlags::PAIR_CCMP) && caps.contains(WifiCapabilities::CIPHER_CCMP))
}

/// Whether `security` is usable with an access point advertising `flags`,
/// `wpa` and `rsn` on a device with `caps`
pub fn security_valid(
    security: SecurityType,
    caps: WifiCapabilities,
    adhoc: bool,
    flags: ApFlags,
    wpa: ApSecurityFlags,
    rsn: ApSecurityFlags,
) -> bool {
    let privacy = flags.contains(ApFlags::PRIVACY);
    match security {
        SecurityType::Invalid => false,
        SecurityType::None => !privacy && wpa.is_empty() && rsn.is_empty(),
        SecurityType::Leap if adhoc => false,
        SecurityType::Leap | SecurityType::StaticWep => privacy && wpa.is_empty() && rsn.is_empty(),
        SecurityType::DynamicWep => {
            if adhoc || !rsn.is_empty() || !privacy {
                return false;
            }
            // Some APs broadcast minimal WPA-enabled beacons
            if !wpa.is_empty() {
                return wpa.contains(ApSecurityFlags::KEY_MGMT_802_1X) && device_supports_ap_ciphers(caps, wpa, true);
            }
            true
        }
        SecurityType::WpaPsk => {
            !adhoc
                && caps.contains(WifiCapabilities::WPA)
                && wpa.contains(ApSecurityFlags::KEY_MGMT_PSK)
                && psk_cipher_ok(caps, wpa)
        }
        SecurityType::Wpa2Psk => {
            if !caps.contains(WifiCapabilities::RSN) {
                return false;
            }
            if adhoc {
                caps.contains(WifiCapabilities::IBSS_RSN)
                    && rsn.contains(ApSecurityFlags::PAIR_CCMP)
                    && caps.contains(WifiCapabilities::CIPHER_CCMP)
            } else {
                rsn.contains(ApSecurityFlags::KEY_MGMT_PSK) && psk_cipher_ok(caps, rsn)
            }
        }
        SecurityType::WpaEnterprise => {
            !adhoc
                && caps.contains(WifiCapabilities::WPA)
                && wpa.contains(ApSecurityFlags::KEY_MGMT_802_1X)
                && device_supports_ap_ciphers(caps, wpa, false)
        }
        SecurityType::Wpa2Enterprise => {
            !adhoc
                && caps.contains(WifiCapabilities::RSN)
                && rsn.contains(ApSecurityFlags::KEY_MGMT_802_1X)
                && device_supports_ap_ciphers(caps, rsn, false)
        }
        SecurityType::Sae => {
            !adhoc
                && caps.contains(WifiCapabilities::RSN)
                && rsn.contains(ApSecurityFlags::KEY_MGMT_SAE)
                && psk_cipher_ok(caps, rsn)
        }
        SecurityType::Owe => {
            !adhoc
                && caps.contains(WifiCapabilities::RSN)
                && rsn.intersects(ApSecurityFlags::KEY_MGMT_OWE | ApSecurityFlags::KEY_MGMT_OWE_TM)
        }
        SecurityType::Wpa3SuiteB192 => {
            !adhoc && caps.contains(WifiCapabilities::RSN) && rsn.contains(ApSecurityFlags::KEY_MGMT_EAP_SUITE_B_192)
        }
    }
}

/// Strongest security type `ap` can be used with, or `Invalid`
pub fn ap_security_type(caps: WifiCapabilities, ap: &AccessPoint) -> SecurityType {
    let adhoc = ap.mode == Mode80211::Adhoc;
    SecurityType::STRONGEST_FIRST
        .into_iter()
        .find(|&t| security_valid(t, caps, adhoc, ap.flags, ap.wpa_flags, ap.rsn_flags))
        .unwrap_or(SecurityType::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modern_caps() -> WifiCapabilities {
        WifiCapabilities::CIPHER_WEP40
            | WifiCapabilities::CIPHER_WEP104
            | WifiCapabilities::CIPHER_TKIP
            | WifiCapabilities::CIPHER_CCMP
            | WifiCapabilities::WPA
            | WifiCapabilities::RSN
    }

    fn ap(flags: ApFlags, wpa: ApSecurityFlags, rsn: ApSecurityFlags) -> AccessPoint {
        AccessPoint {
            flags,
            wpa_flags: wpa,
            rsn_flags: rsn,
            ..AccessPoint::new("/ap/1", b"Cafe", 50)
        }
    }

    #[test]
    fn test_open_network() {
        let open = ap(ApFlags::empty(), ApSecurityFlags::empty(), ApSecurityFlags::empty());
        assert_eq!(ap_security_type(modern_caps(), &open), SecurityType::None);
    }

    #[test]
    fn test_wep_network() {
        let wep = ap(ApFlags::PRIVACY, ApSecurityFlags::empty(), ApSecurityFlags::empty());
        // A bare privacy beacon reads as the strongest WEP flavour
        assert_eq!(ap_security_type(modern_caps(), &wep), SecurityType::DynamicWep);
    }

    #[test]
    fn test_wpa2_psk() {
        let rsn = ApSecurityFlags::KEY_MGMT_PSK | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP;
        let home = ap(ApFlags::PRIVACY, ApSecurityFlags::empty(), rsn);
        assert_eq!(ap_security_type(modern_caps(), &home), SecurityType::Wpa2Psk);

        // Without RSN support the device can't use it at all
        let old = WifiCapabilities::CIPHER_WEP40 | WifiCapabilities::CIPHER_WEP104;
        assert_eq!(ap_security_type(old, &home), SecurityType::Invalid);
    }

    #[test]
    fn test_wpa2_enterprise() {
        let rsn = ApSecurityFlags::KEY_MGMT_802_1X | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP;
        let corp = ap(ApFlags::PRIVACY, ApSecurityFlags::empty(), rsn);
        let security = ap_security_type(modern_caps(), &corp);
        assert_eq!(security, SecurityType::Wpa2Enterprise);
        assert!(security.is_enterprise());
    }

    #[test]
    fn test_sae_beats_psk() {
        let rsn = ApSecurityFlags::KEY_MGMT_PSK
            | ApSecurityFlags::KEY_MGMT_SAE
            | ApSecurityFlags::PAIR_CCMP
            | ApSecurityFlags::GROUP_CCMP;
        let transition = ap(ApFlags::PRIVACY, ApSecurityFlags::empty(), rsn);
        assert_eq!(ap_security_type(modern_caps(), &transition), SecurityType::Sae);
    }

    #[test]
    fn test_adhoc_excludes_enterprise() {
        let rsn = ApSecurityFlags::KEY_MGMT_802_1X | ApSecurityFlags::PAIR_CCMP | ApSecurityFlags::GROUP_CCMP;
        assert!(!security_valid(
            SecurityType::Wpa2Enterprise,
            modern_caps(),
            true,
            ApFlags::PRIVACY,
            ApSecurityFlags::empty(),
            rsn
        ));
    }
}
