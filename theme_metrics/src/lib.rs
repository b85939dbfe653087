//! Theme metrics: the key/value configuration themes read through `THEME`.
//!
//! Metrics are grouped (`[ScreenTitleMenu]`) and groups may name a
//! `Fallback` group that is consulted when a key is missing. Values are kept
//! as raw strings; typed getters parse on demand.

pub mod command;
pub mod ini;

pub use command::{CommandCall, CommandList, MetricCommand};

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Group key that names the group consulted for missing metrics.
pub const FALLBACK_KEY: &str = "Fallback";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricGroup {
    pub fallback: Option<String>,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    groups: BTreeMap<String, MetricGroup>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a metrics file, picking the parser from the extension
    /// (`.json` for JSON tables, anything else is read as metrics.ini).
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("reading metrics from {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&text)
                .with_context(|| format!("parsing metrics JSON {}", path.display()))
        } else {
            ini::parse(&text).with_context(|| format!("parsing metrics {}", path.display()))
        }
    }

    /// Parse `{ "Group": { "Key": value, "Fallback": "Other" } }`. Non-string
    /// scalars are stored in their JSON text form.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, serde_json::Value>> =
            serde_json::from_str(text).context("decoding metrics JSON")?;
        let mut metrics = Metrics::new();
        for (group, entries) in raw {
            for (key, value) in entries {
                let text = match value {
                    serde_json::Value::String(text) => text,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                metrics.set(&group, &key, text);
            }
        }
        Ok(metrics)
    }

    /// Insert a metric. Setting `Fallback` updates the group's fallback link.
    pub fn set(&mut self, group: &str, key: &str, value: impl Into<String>) {
        let entry = self.groups.entry(group.to_string()).or_default();
        let value = value.into();
        if key.eq_ignore_ascii_case(FALLBACK_KEY) {
            entry.fallback = if value.is_empty() { None } else { Some(value) };
        } else {
            entry.values.insert(key.to_string(), value);
        }
    }

    pub fn group(&self, name: &str) -> Option<&MetricGroup> {
        self.groups.get(name)
    }

    /// Look up a metric, following the fallback chain. A fallback cycle ends
    /// the walk instead of looping.
    pub fn get(&self, group: &str, key: &str) -> Option<&str> {
        self.chain(group)
            .into_iter()
            .find_map(|group| group.values.get(key).map(|value| value.as_str()))
    }

    pub fn has(&self, group: &str, key: &str) -> bool {
        self.get(group, key).is_some()
    }

    pub fn get_f(&self, group: &str, key: &str) -> Option<f64> {
        self.get(group, key)?.trim().parse().ok()
    }

    pub fn get_i(&self, group: &str, key: &str) -> Option<i64> {
        let raw = self.get(group, key)?.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().map(|value| value as i64))
    }

    pub fn get_b(&self, group: &str, key: &str) -> Option<bool> {
        let raw = self.get(group, key)?.trim();
        if raw == "1" || raw.eq_ignore_ascii_case("true") {
            Some(true)
        } else if raw == "0" || raw.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    /// Every metric name in `group` (fallbacks included) starting with `prefix`.
    pub fn names_beginning_with(&self, group: &str, prefix: &str) -> Vec<String> {
        let mut names = BTreeSet::new();
        for group in self.chain(group) {
            for key in group.values.keys() {
                if key.starts_with(prefix) {
                    names.insert(key.clone());
                }
            }
        }
        names.into_iter().collect()
    }

    fn chain(&self, start: &str) -> Vec<&MetricGroup> {
        let mut visited = BTreeSet::new();
        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(name) = current {
            if !visited.insert(name) {
                break;
            }
            let Some(group) = self.groups.get(name) else {
                break;
            };
            chain.push(group);
            current = group.fallback.as_deref();
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> Metrics {
        let mut metrics = Metrics::new();
        metrics.set("Common", "ScreenWidth", "640");
        metrics.set("Common", "Zoom", "1.5");
        metrics.set("ScreenTitle", "Fallback", "Common");
        metrics.set("ScreenTitle", "LogoX", "320");
        metrics.set("ScreenTitle", "LogoOnCommand", "x,10;y,20");
        metrics.set("ScreenTitle", "ShowLogo", "1");
        metrics
    }

    #[test]
    fn lookups_follow_fallback_groups() {
        let metrics = sample();
        assert_eq!(metrics.get("ScreenTitle", "LogoX"), Some("320"));
        assert_eq!(metrics.get_i("ScreenTitle", "ScreenWidth"), Some(640));
        assert_eq!(metrics.get_f("ScreenTitle", "Zoom"), Some(1.5));
        assert_eq!(metrics.get_b("ScreenTitle", "ShowLogo"), Some(true));
        assert!(!metrics.has("ScreenTitle", "Missing"));
        assert!(!metrics.has("Nope", "LogoX"));
    }

    #[test]
    fn fallback_cycles_terminate() {
        let mut metrics = Metrics::new();
        metrics.set("A", "Fallback", "B");
        metrics.set("B", "Fallback", "A");
        metrics.set("B", "Only", "here");
        assert_eq!(metrics.get("A", "Only"), Some("here"));
        assert_eq!(metrics.get("A", "Nowhere"), None);
    }

    #[test]
    fn prefix_listing_includes_fallbacks() {
        let metrics = sample();
        let names = metrics.names_beginning_with("ScreenTitle", "Logo");
        assert_eq!(names, vec!["LogoOnCommand".to_string(), "LogoX".to_string()]);
    }

    #[test]
    fn json_tables_stringify_scalars() {
        let metrics = Metrics::from_json_str(
            r#"{ "Common": { "Width": 640, "Wide": true }, "Screen": { "Fallback": "Common" } }"#,
        )
        .expect("metrics json");
        assert_eq!(metrics.get("Screen", "Width"), Some("640"));
        assert_eq!(metrics.get_b("Screen", "Wide"), Some(true));
        assert_eq!(
            metrics.group("Screen").and_then(|g| g.fallback.as_deref()),
            Some("Common")
        );
    }

    #[test]
    fn load_picks_parser_from_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ini_path = dir.path().join("metrics.ini");
        let mut file = fs::File::create(&ini_path).expect("create ini");
        writeln!(file, "[Common]\nScreenHeight=480").expect("write ini");
        let metrics = Metrics::load(&ini_path).expect("load ini");
        assert_eq!(metrics.get_i("Common", "ScreenHeight"), Some(480));

        let json_path = dir.path().join("metrics.json");
        fs::write(&json_path, r#"{ "Common": { "ScreenHeight": 720 } }"#).expect("write json");
        let metrics = Metrics::load(&json_path).expect("load json");
        assert_eq!(metrics.get_i("Common", "ScreenHeight"), Some(720));
    }
}
