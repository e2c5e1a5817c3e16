//! Core domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bind address meaning "all interfaces"
pub const WILDCARD_HOST: &str = "0.0.0.0";

/// Host names that only reach the local machine
pub const LOOPBACK_ALIASES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Check whether `host` is a loopback alias (case-insensitive)
pub fn is_loopback_alias(host: &str) -> bool {
    LOOPBACK_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(host))
}

// ─────────────────────────────────────────────────────────────────
// Dev Mode
// ─────────────────────────────────────────────────────────────────

/// What kind of app the session is serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DevMode {
    #[default]
    Spa,
    Ssr,
    Pwa,
    Cordova,
    Capacitor,
    Electron,
}

impl DevMode {
    /// Modes where the app runs on a device or emulator and must reach the
    /// dev server over the network
    pub fn is_mobile(&self) -> bool {
        matches!(self, DevMode::Cordova | DevMode::Capacitor)
    }

    /// Modes served straight to a browser, without a platform shell
    pub fn is_web(&self) -> bool {
        matches!(self, DevMode::Spa | DevMode::Ssr | DevMode::Pwa)
    }

    pub fn requires_target(&self) -> bool {
        self.is_mobile()
    }

    /// Port used when neither CLI nor config names one
    pub fn default_port(&self) -> u16 {
        match self {
            DevMode::Ssr => 9100,
            _ => 9000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DevMode::Spa => "spa",
            DevMode::Ssr => "ssr",
            DevMode::Pwa => "pwa",
            DevMode::Cordova => "cordova",
            DevMode::Capacitor => "capacitor",
            DevMode::Electron => "electron",
        }
    }
}

impl fmt::Display for DevMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spa" => Ok(DevMode::Spa),
            "ssr" => Ok(DevMode::Ssr),
            "pwa" => Ok(DevMode::Pwa),
            "cordova" => Ok(DevMode::Cordova),
            "capacitor" => Ok(DevMode::Capacitor),
            "electron" => Ok(DevMode::Electron),
            other => Err(format!(
                "unknown mode '{}' (expected spa, ssr, pwa, cordova, capacitor or electron)",
                other
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Mobile Target
// ─────────────────────────────────────────────────────────────────

/// Native platform for the mobile-hybrid modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MobileTarget {
    Android,
    Ios,
}

impl MobileTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            MobileTarget::Android => "android",
            MobileTarget::Ios => "ios",
        }
    }
}

impl fmt::Display for MobileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MobileTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(MobileTarget::Android),
            "ios" => Ok(MobileTarget::Ios),
            other => Err(format!("unknown target '{}' (expected android or ios)", other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Address
// ─────────────────────────────────────────────────────────────────

/// A host/port pair, either requested or resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == WILDCARD_HOST
    }

    /// Host a local client should connect to; the wildcard is not dialable
    pub fn connect_host(&self) -> &str {
        if self.is_wildcard() {
            "127.0.0.1"
        } else {
            &self.host
        }
    }

    /// `http://host:port/` form used by browsers and platform shells
    pub fn http_url(&self) -> String {
        let host = self.connect_host();
        if host.contains(':') {
            format!("http://[{}]:{}/", host, self.port)
        } else {
            format!("http://{}:{}/", host, self.port)
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Phase
// ─────────────────────────────────────────────────────────────────

/// Lifecycle phase of a dev session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Resolving,
    Building,
    Starting,
    Listening,
    Stopping,
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Resolving => "resolving",
            SessionPhase::Building => "building",
            SessionPhase::Starting => "starting",
            SessionPhase::Listening => "listening",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Named lifecycle points where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HookPhase {
    #[serde(rename = "beforeDev")]
    BeforeDev,
    #[serde(rename = "afterDev")]
    AfterDev,
}

impl HookPhase {
    pub fn name(&self) -> &'static str {
        match self {
            HookPhase::BeforeDev => "beforeDev",
            HookPhase::AfterDev => "afterDev",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_aliases_any_case() {
        assert!(is_loopback_alias("localhost"));
        assert!(is_loopback_alias("LocalHost"));
        assert!(is_loopback_alias("127.0.0.1"));
        assert!(is_loopback_alias("::1"));
        assert!(!is_loopback_alias("0.0.0.0"));
        assert!(!is_loopback_alias("192.168.1.4"));
    }

    #[test]
    fn test_dev_mode_classification() {
        assert!(DevMode::Cordova.is_mobile());
        assert!(DevMode::Capacitor.is_mobile());
        assert!(!DevMode::Electron.is_mobile());
        assert!(!DevMode::Electron.is_web());
        assert!(DevMode::Pwa.is_web());
        assert!(DevMode::Capacitor.requires_target());
        assert!(!DevMode::Spa.requires_target());
    }

    #[test]
    fn test_dev_mode_parse() {
        assert_eq!("SSR".parse::<DevMode>().unwrap(), DevMode::Ssr);
        assert_eq!("electron".parse::<DevMode>().unwrap(), DevMode::Electron);
        assert!("bex".parse::<DevMode>().is_err());
    }

    #[test]
    fn test_dev_mode_serde_lowercase() {
        let json = serde_json::to_string(&DevMode::Capacitor).unwrap();
        assert_eq!(json, "\"capacitor\"");
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(DevMode::Spa.default_port(), 9000);
        assert_eq!(DevMode::Ssr.default_port(), 9100);
    }

    #[test]
    fn test_address_display_and_url() {
        let addr = Address::new("0.0.0.0", 8080);
        assert_eq!(addr.to_string(), "0.0.0.0:8080");
        assert_eq!(addr.http_url(), "http://127.0.0.1:8080/");

        let v6 = Address::new("fe80::1", 9000);
        assert_eq!(v6.to_string(), "[fe80::1]:9000");
        assert_eq!(v6.http_url(), "http://[fe80::1]:9000/");
    }

    #[test]
    fn test_hook_phase_names() {
        assert_eq!(HookPhase::BeforeDev.to_string(), "beforeDev");
        assert_eq!(HookPhase::AfterDev.name(), "afterDev");
    }
}
