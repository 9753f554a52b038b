//! Build-time configuration.
//!
//! Every tunable has a default here and can be overridden by exporting the
//! matching `RELAY_*` environment variable when building the firmware:
//!
//! ```text
//! RELAY_WIFI_SSID=lab RELAY_WIFI_PASSWORD=secret RELAY_NUM_TAGS=20 cargo build --release
//! ```
//!
//! Malformed numbers fall back to the default rather than failing the build.

use embassy_time::Duration;

use crate::radio::AdvParams;
use crate::signalling::QueryOptions;

// WiFi

pub const WIFI_SSID: &str = env_or(option_env!("RELAY_WIFI_SSID"), "relay");
pub const WIFI_PASSWORD: &str = env_or(option_env!("RELAY_WIFI_PASSWORD"), "");
/// Join attempts before the firmware gives up and resets.
pub const WIFI_RETRIES: u32 = parse_u32(option_env!("RELAY_WIFI_RETRIES"), 5);

// Signalling endpoint

/// Full URL of the tag list, without query string.
pub const ENDPOINT_URL: &str = env_or(
    option_env!("RELAY_ENDPOINT_URL"),
    "http://192.168.1.10:5000/api/v1/airtag/",
);
/// Pause between two downloads of the tag list (ms).
pub const DOWNLOAD_INTERVAL_MS: u32 = parse_u32(option_env!("RELAY_DOWNLOAD_INTERVAL_MS"), 60_000);
/// Ask the server for currently valid tags only.
pub const VALID_TAGS_ONLY: bool = parse_bool(option_env!("RELAY_VALID_TAGS_ONLY"), true);
/// Ask the server to page through its tags across polls.
pub const ROTATE_TAGS: bool = parse_bool(option_env!("RELAY_ROTATE_TAGS"), true);
/// Receive buffer for one HTTP response, headers included.
pub const HTTP_BUFFER_SIZE: usize = parse_u32(option_env!("RELAY_HTTP_BUFFER_SIZE"), 4096) as usize;

// Tags

/// Tags requested per poll; also sizes the tag store.
pub const NUM_TAGS: usize = parse_u32(option_env!("RELAY_NUM_TAGS"), 10) as usize;

// BLE

/// Advertising interval while a tag is on air (ms).
pub const ADV_INTERVAL_MS: u32 = parse_u32(option_env!("RELAY_ADV_INTERVAL_MS"), 100);
/// Dwell time per tag (ms).
pub const ADV_DURATION_MS: u32 = parse_u32(option_env!("RELAY_ADV_DURATION_MS"), 2_000);
/// How often an idle cycler checks for tags (ms).
pub const IDLE_POLL_MS: u32 = 1_000;

/// Timing and radio parameters of the advertisement cycler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CyclerConfig {
    pub adv_params: AdvParams,
    /// How long one tag stays on air.
    pub dwell: Duration,
    /// Sleep between checks while there is nothing to advertise.
    pub idle_poll: Duration,
    /// Upper bound on each radio completion wait. `None` waits forever.
    pub completion_timeout: Option<Duration>,
}

impl CyclerConfig {
    pub const fn from_build_config() -> Self {
        Self {
            adv_params: AdvParams::from_interval_ms(ADV_INTERVAL_MS),
            dwell: Duration::from_millis(ADV_DURATION_MS as u64),
            idle_poll: Duration::from_millis(IDLE_POLL_MS as u64),
            completion_timeout: None,
        }
    }
}

impl Default for CyclerConfig {
    fn default() -> Self {
        Self::from_build_config()
    }
}

impl QueryOptions {
    pub const fn from_build_config() -> Self {
        Self {
            valid_only: VALID_TAGS_ONLY,
            num: NUM_TAGS,
            rotate: ROTATE_TAGS,
        }
    }
}

const fn env_or(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(value) => value,
        None => default,
    }
}

/// Parse a decimal `u32`. Empty, non-numeric or overflowing input yields
/// `default`.
pub const fn parse_u32(value: Option<&str>, default: u32) -> u32 {
    let bytes = match value {
        Some(value) => value.as_bytes(),
        None => return default,
    };
    if bytes.is_empty() {
        return default;
    }

    let mut result: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii_digit() {
            return default;
        }
        result = match result.checked_mul(10) {
            Some(v) => match v.checked_add((b - b'0') as u32) {
                Some(v) => v,
                None => return default,
            },
            None => return default,
        };
        i += 1;
    }
    result
}

/// Parse the truthy spellings the signalling server itself accepts.
pub const fn parse_bool(value: Option<&str>, default: bool) -> bool {
    let bytes = match value {
        Some(value) => value.as_bytes(),
        None => return default,
    };
    match bytes {
        b"1" | b"y" | b"Y" | b"yes" | b"true" | b"True" | b"TRUE" | b"t" => true,
        b"0" | b"n" | b"N" | b"no" | b"false" | b"False" | b"FALSE" | b"f" => false,
        _ => default,
    }
}
