//! Layered settings resolution.
//!
//! `defaults ← file ← SWITCHBOARD_* env`, then [`SwitchboardSettings::validate`].
//! The file layer is merged as JSON: objects recurse key by key, anything
//! else is replaced wholesale, and `null` leaves the lower layer alone.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use switchboard_core::logging::LogFormat;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{BackendMode, BackpressurePolicy, SwitchboardSettings};

/// Name of the settings directory under `$HOME`.
const SETTINGS_DIR: &str = ".switchboard";

/// `~/.switchboard/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(SETTINGS_DIR)
        .join("settings.json")
}

/// Resolve all layers from [`settings_path`].
pub fn load_settings() -> Result<SwitchboardSettings> {
    load_settings_from_path(&settings_path())
}

/// Resolve all layers, reading the file layer from `path`.
pub fn load_settings_from_path(path: &Path) -> Result<SwitchboardSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

/// Defaults with the file at `path` merged on top. A missing file is not an error.
pub fn load_file_layer(path: &Path) -> Result<SwitchboardSettings> {
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let mut doc = serde_json::to_value(SwitchboardSettings::default()).map_err(malformed)?;

    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!(path = %path.display(), "merging settings file");
            let overlay: Value = serde_json::from_str(&text).map_err(malformed)?;
            merge_into(&mut doc, overlay);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    serde_json::from_value(doc).map_err(malformed)
}

/// Merge `overlay` over `base` and return the result.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None if value.is_null() => {}
                    None => {
                        let _ = base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `SWITCHBOARD_*` overrides read through `lookup`.
///
/// Empty values are treated as unset. Values that fail to parse are logged
/// and skipped, leaving the lower layer in place.
pub fn apply_overrides(settings: &mut SwitchboardSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let parsed = |key: &str| var(key).map(|raw| (key.to_owned(), raw));

    let server = &mut settings.server;
    if let Some(v) = var("SWITCHBOARD_HOST") {
        server.host = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_PORT"), |s| parse_in_range(s, 0..=u16::MAX)) {
        server.port = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_MAX_CONNECTIONS"), |s| parse_in_range(s, 1..=100_000)) {
        server.max_connections = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_QUEUE_CAPACITY"), |s| parse_in_range(s, 1..=1_000_000)) {
        server.outbound_queue_capacity = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_BACKPRESSURE"), parse_enum::<BackpressurePolicy>) {
        server.backpressure = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_IDLE_TIMEOUT_SECS"), |s| parse_in_range(s, 2..=86_400)) {
        server.heartbeat.idle_timeout_secs = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_ALLOW_ANONYMOUS"), parse_bool) {
        server.auth.allow_anonymous = v;
    }

    if let Some(v) = var("SWITCHBOARD_URL") {
        settings.client.url = v;
    }
    if let Some(v) = var("SWITCHBOARD_TOKEN") {
        settings.client.token = Some(v);
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_MODE"), parse_enum::<BackendMode>) {
        settings.backend.mode = v;
    }

    if let Some(v) = var("SWITCHBOARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = checked(parsed("SWITCHBOARD_LOG_FORMAT"), parse_enum::<LogFormat>) {
        settings.logging.format = v;
    }
}

fn checked<T>(raw: Option<(String, String)>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let (key, raw) = raw?;
    let value = parse(&raw);
    if value.is_none() {
        warn!(key = %key, value = %raw, "ignoring unparseable env override");
    }
    value
}

/// `true/1/yes/on` or `false/0/no/off`, any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSY: [&str; 4] = ["false", "0", "no", "off"];
    let lower = raw.to_ascii_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        Some(true)
    } else if FALSY.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse `raw` as `T` and keep it only if it lies in `range`.
pub fn parse_in_range<T>(raw: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

/// Parse a unit enum by its serde wire name.
pub fn parse_enum<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(Value::from(raw)).ok()
}
