//! User-agent classification into the device/browser/os dimensions.
//!
//! Unparseable or missing agents fall back to `desktop`/`chrome`/`windows`.
//! Those defaults are part of the recorded data contract; dashboards depend
//! on them, so they are not neutral `unknown`s.

use woothee::parser::Parser;

pub const DEFAULT_DEVICE: &str = "desktop";
pub const DEFAULT_BROWSER: &str = "chrome";
pub const DEFAULT_OS: &str = "windows";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: String,
    pub browser: String,
    pub os: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            browser: DEFAULT_BROWSER.to_string(),
            os: DEFAULT_OS.to_string(),
        }
    }
}

/// Parses a user-agent header value into dimension strings.
pub fn parse_user_agent(user_agent: Option<&str>) -> DeviceInfo {
    let Some(ua) = user_agent.filter(|ua| !ua.is_empty()) else {
        return DeviceInfo::default();
    };

    let parser = Parser::new();
    let Some(result) = parser.parse(ua) else {
        return DeviceInfo::default();
    };

    let device = match result.category {
        "pc" => DEFAULT_DEVICE.to_string(),
        "smartphone" | "mobilephone" => "mobile".to_string(),
        "appliance" => "console".to_string(),
        "crawler" => "bot".to_string(),
        _ => DEFAULT_DEVICE.to_string(),
    };

    let browser = if result.name == "UNKNOWN" || result.name.is_empty() {
        DEFAULT_BROWSER.to_string()
    } else {
        result.name.to_lowercase()
    };

    let os = normalize_os(result.os);

    DeviceInfo {
        device,
        browser,
        os,
    }
}

/// Collapses versioned OS names into family names so the dimension stays
/// low-cardinality ("Windows 10" and "Windows 11" are both `windows`).
fn normalize_os(os: &str) -> String {
    if os == "UNKNOWN" || os.is_empty() {
        return DEFAULT_OS.to_string();
    }
    if os.starts_with("Windows") {
        return "windows".to_string();
    }
    if os.starts_with("Mac OSX") {
        return "macos".to_string();
    }
    if os.starts_with("iPhone") || os.starts_with("iPad") || os.starts_with("iPod") {
        return "ios".to_string();
    }
    if os.starts_with("Android") {
        return "android".to_string();
    }
    if os.starts_with("ChromeOS") {
        return "chromeos".to_string();
    }
    if os.starts_with("Linux") {
        return "linux".to_string();
    }
    os.to_lowercase()
}
