//! Diagnostics aggregator.
//!
//! Keeps the latest status per (hardware id, name) and renders a filtered,
//! sorted view with pinned entries first.

use crate::messages::{normalize_diagnostic_array, DiagnosticArray, DiagnosticLevel, DiagnosticStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Key of one diagnostic entity. Serialized as `"{hardware_id}|{name}"`,
/// with `\` and `|` backslash-escaped inside the hardware id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct DiagnosticId {
    pub hardware_id: String,
    pub name: String,
}

impl DiagnosticId {
    pub fn new(hardware_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            hardware_id: hardware_id.into(),
            name: name.into(),
        }
    }

    pub fn of(status: &DiagnosticStatus) -> Self {
        Self::new(status.hardware_id.clone(), status.name.clone())
    }

    /// `"{hardware_id}: {name}"`, or just the name without a hardware id.
    pub fn display_name(&self) -> String {
        if self.hardware_id.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.hardware_id, self.name)
        }
    }
}

impl std::fmt::Display for DiagnosticId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in self.hardware_id.chars() {
            if c == '\\' || c == '|' {
                write!(f, "\\")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "|{}", self.name)
    }
}

impl From<DiagnosticId> for String {
    fn from(id: DiagnosticId) -> Self {
        id.to_string()
    }
}

impl From<String> for DiagnosticId {
    /// Splits at the first unescaped `|`. A string without one is a bare name.
    fn from(s: String) -> Self {
        let mut hardware_id = String::new();
        let mut chars = s.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => hardware_id.push(escaped),
                    None => hardware_id.push(c),
                },
                '|' => return Self::new(hardware_id, &s[i + 1..]),
                _ => hardware_id.push(c),
            }
        }
        Self::new("", s)
    }
}

/// Latest known state of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticInfo {
    pub id: DiagnosticId,
    pub display_name: String,
    pub status: DiagnosticStatus,

    /// Header stamp of the array the status arrived in
    pub stamp_ns: u64,
}

impl DiagnosticInfo {
    pub fn level(&self) -> DiagnosticLevel {
        self.status.level
    }
}

// ============================================================================
// VIEW CONFIG
// ============================================================================

/// Persisted diagnostics UI state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagnosticsConfig {
    /// Pinned ids in pin order
    pub pinned_ids: Vec<DiagnosticId>,

    /// Entries less severe than this are hidden
    pub min_level: DiagnosticLevel,

    /// Case-insensitive hardware id substring filter (empty matches all)
    pub hardware_id_filter: String,

    /// Group by descending severity instead of one alphabetical list
    pub sort_by_level: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            pinned_ids: Vec::new(),
            min_level: DiagnosticLevel::Stale,
            hardware_id_filter: String::new(),
            sort_by_level: true,
        }
    }
}

impl DiagnosticsConfig {
    /// Pin `id`. Pinning an already pinned id moves it to the end.
    pub fn pin(&mut self, id: DiagnosticId) {
        self.pinned_ids.retain(|p| *p != id);
        self.pinned_ids.push(id);
    }

    pub fn unpin(&mut self, id: &DiagnosticId) -> bool {
        let before = self.pinned_ids.len();
        self.pinned_ids.retain(|p| p != id);
        self.pinned_ids.len() != before
    }

    pub fn is_pinned(&self, id: &DiagnosticId) -> bool {
        self.pinned_ids.contains(id)
    }

    fn matches(&self, info: &DiagnosticInfo) -> bool {
        if info.level() < self.min_level {
            return false;
        }
        if self.hardware_id_filter.is_empty() {
            return true;
        }
        info.id
            .hardware_id
            .to_lowercase()
            .contains(&self.hardware_id_filter.to_lowercase())
    }
}

/// Rendered view: pinned entries, then the filtered remainder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticSummary<'a> {
    pub pinned: Vec<&'a DiagnosticInfo>,
    pub entries: Vec<&'a DiagnosticInfo>,
}

impl<'a> DiagnosticSummary<'a> {
    /// Pinned first, then the rest.
    pub fn ordered(&self) -> impl Iterator<Item = &'a DiagnosticInfo> + '_ {
        self.pinned.iter().chain(self.entries.iter()).copied()
    }

    pub fn len(&self) -> usize {
        self.pinned.len() + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DiagnosticsAggregator {
    entries: HashMap<DiagnosticId, DiagnosticInfo>,
}

impl DiagnosticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every status of `array`, replacing older ones with the same id.
    pub fn ingest(&mut self, array: &DiagnosticArray) {
        for status in &array.status {
            let id = DiagnosticId::of(status);
            let info = DiagnosticInfo {
                display_name: id.display_name(),
                id: id.clone(),
                status: status.clone(),
                stamp_ns: array.header.stamp_ns,
            };
            self.entries.insert(id, info);
        }
        tracing::trace!(
            statuses = array.status.len(),
            known = self.entries.len(),
            "ingested diagnostic array"
        );
    }

    /// Normalize a raw `DiagnosticArray` message and ingest it.
    pub fn ingest_value(&mut self, value: &Value) {
        self.ingest(&normalize_diagnostic_array(value));
    }

    pub fn get(&self, id: &DiagnosticId) -> Option<&DiagnosticInfo> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all state, e.g. after a seek.
    pub fn clear(&mut self) {
        tracing::debug!(dropped = self.entries.len(), "cleared diagnostics");
        self.entries.clear();
    }

    /// Entries grouped by level, each group alphabetical by display name.
    pub fn by_level(&self) -> BTreeMap<DiagnosticLevel, Vec<&DiagnosticInfo>> {
        let mut groups: BTreeMap<DiagnosticLevel, Vec<&DiagnosticInfo>> = BTreeMap::new();
        for info in self.entries.values() {
            groups.entry(info.level()).or_default().push(info);
        }
        for group in groups.values_mut() {
            group.sort_by(|a, b| (&a.display_name, &a.id).cmp(&(&b.display_name, &b.id)));
        }
        groups
    }

    /// Render the view described by `config`.
    ///
    /// Pinned entries come first in pin order and bypass the filters; pinned
    /// ids that have not been seen are skipped.
    pub fn summary(&self, config: &DiagnosticsConfig) -> DiagnosticSummary<'_> {
        let pinned: Vec<&DiagnosticInfo> = config
            .pinned_ids
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect();

        let mut entries: Vec<&DiagnosticInfo> = self
            .entries
            .values()
            .filter(|info| !config.is_pinned(&info.id) && config.matches(info))
            .collect();

        // Distinct ids can share a display name; the id breaks the tie
        if config.sort_by_level {
            entries.sort_by(|a, b| {
                (Reverse(a.level()), &a.display_name, &a.id).cmp(&(Reverse(b.level()), &b.display_name, &b.id))
            });
        } else {
            entries.sort_by(|a, b| (&a.display_name, &a.id).cmp(&(&b.display_name, &b.id)));
        }

        DiagnosticSummary { pinned, entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Header;
    use serde_json::json;

    fn status(hw: &str, name: &str, level: DiagnosticLevel) -> DiagnosticStatus {
        DiagnosticStatus {
            level,
            name: name.to_string(),
            message: String::new(),
            hardware_id: hw.to_string(),
            values: Vec::new(),
        }
    }

    fn aggregator(statuses: Vec<DiagnosticStatus>) -> DiagnosticsAggregator {
        let mut agg = DiagnosticsAggregator::new();
        agg.ingest(&DiagnosticArray {
            header: Header::default(),
            status: statuses,
        });
        agg
    }

    fn names(summary: &DiagnosticSummary<'_>) -> Vec<String> {
        summary.ordered().map(|i| i.display_name.clone()).collect()
    }

    #[test]
    fn test_display_name_and_id() {
        let id = DiagnosticId::new("imu", "rate");
        assert_eq!(id.display_name(), "imu: rate");
        assert_eq!(id.to_string(), "imu|rate");
        assert_eq!(DiagnosticId::new("", "cpu").display_name(), "cpu");
        assert_eq!(DiagnosticId::from("imu|rate".to_string()), id);
    }

    #[test]
    fn test_id_separator_in_hardware_id_survives() {
        let id = DiagnosticId::new("can|0", "motor");
        assert_eq!(id.to_string(), "can\\|0|motor");
        assert_eq!(DiagnosticId::from(id.to_string()), id);

        let id = DiagnosticId::new("bus\\", "a|b");
        assert_eq!(DiagnosticId::from(id.to_string()), id);
        assert_eq!(DiagnosticId::from("cpu".to_string()), DiagnosticId::new("", "cpu"));
    }

    #[test]
    fn test_shared_display_name_orders_by_id() {
        let first = status("a", "b: c", DiagnosticLevel::Warn);
        let second = status("a: b", "c", DiagnosticLevel::Warn);
        assert_eq!(
            DiagnosticId::of(&first).display_name(),
            DiagnosticId::of(&second).display_name()
        );

        for flat in [true, false] {
            let config = DiagnosticsConfig {
                sort_by_level: !flat,
                ..DiagnosticsConfig::default()
            };
            for _ in 0..20 {
                let agg = aggregator(vec![second.clone(), first.clone()]);
                let ids: Vec<DiagnosticId> = agg.summary(&config).ordered().map(|i| i.id.clone()).collect();
                assert_eq!(ids, vec![DiagnosticId::of(&first), DiagnosticId::of(&second)]);

                let warns: Vec<&DiagnosticId> =
                    agg.by_level()[&DiagnosticLevel::Warn].iter().map(|i| &i.id).collect();
                assert_eq!(warns, vec![&DiagnosticId::of(&first), &DiagnosticId::of(&second)]);
            }
        }
    }

    #[test]
    fn test_latest_status_wins() {
        let mut agg = aggregator(vec![status("imu", "rate", DiagnosticLevel::Ok)]);
        agg.ingest(&DiagnosticArray {
            header: Header::default(),
            status: vec![status("imu", "rate", DiagnosticLevel::Error)],
        });
        assert_eq!(agg.len(), 1);
        let info = agg.get(&DiagnosticId::new("imu", "rate")).unwrap();
        assert_eq!(info.level(), DiagnosticLevel::Error);
    }

    #[test]
    fn test_sort_by_level_puts_errors_first() {
        let agg = aggregator(vec![
            status("", "a", DiagnosticLevel::Ok),
            status("", "b", DiagnosticLevel::Error),
            status("", "c", DiagnosticLevel::Stale),
            status("", "d", DiagnosticLevel::Warn),
            status("", "e", DiagnosticLevel::Error),
        ]);
        let summary = agg.summary(&DiagnosticsConfig::default());
        assert_eq!(names(&summary), vec!["b", "e", "d", "a", "c"]);

        let config = DiagnosticsConfig {
            sort_by_level: false,
            ..DiagnosticsConfig::default()
        };
        assert_eq!(names(&agg.summary(&config)), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_pinned_first_in_pin_order() {
        let agg = aggregator(vec![
            status("", "a", DiagnosticLevel::Error),
            status("", "b", DiagnosticLevel::Ok),
            status("", "c", DiagnosticLevel::Warn),
        ]);
        let mut config = DiagnosticsConfig::default();
        config.pin(DiagnosticId::new("", "b"));
        config.pin(DiagnosticId::new("", "c"));
        config.pin(DiagnosticId::new("", "missing"));
        assert_eq!(names(&agg.summary(&config)), vec!["b", "c", "a"]);

        config.unpin(&DiagnosticId::new("", "b"));
        config.pin(DiagnosticId::new("", "b"));
        assert_eq!(names(&agg.summary(&config)), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_filters_bypassed_by_pins() {
        let agg = aggregator(vec![
            status("Lidar_Front", "scan", DiagnosticLevel::Ok),
            status("camera", "fps", DiagnosticLevel::Warn),
            status("lidar_rear", "scan", DiagnosticLevel::Error),
        ]);
        let mut config = DiagnosticsConfig {
            hardware_id_filter: "LIDAR".to_string(),
            min_level: DiagnosticLevel::Warn,
            ..DiagnosticsConfig::default()
        };
        assert_eq!(names(&agg.summary(&config)), vec!["lidar_rear: scan"]);

        config.pin(DiagnosticId::new("camera", "fps"));
        assert_eq!(
            names(&agg.summary(&config)),
            vec!["camera: fps", "lidar_rear: scan"]
        );
    }

    #[test]
    fn test_by_level_and_clear() {
        let mut agg = DiagnosticsAggregator::new();
        agg.ingest_value(&json!({
            "header": { "stamp": { "sec": 2, "nanosec": 0 } },
            "status": [
                { "level": 2, "name": "z", "hardware_id": "hw" },
                { "level": 2, "name": "a", "hardware_id": "hw" },
                { "level": 9, "name": "odd" }
            ]
        }));

        let groups = agg.by_level();
        let errors: Vec<&str> = groups[&DiagnosticLevel::Error]
            .iter()
            .map(|i| i.display_name.as_str())
            .collect();
        assert_eq!(errors, vec!["hw: a", "hw: z"]);
        assert_eq!(groups[&DiagnosticLevel::Stale].len(), 1);
        assert_eq!(groups[&DiagnosticLevel::Error][0].stamp_ns, 2_000_000_000);

        agg.clear();
        assert!(agg.is_empty());
        assert!(agg.summary(&DiagnosticsConfig::default()).is_empty());
    }

    #[test]
    fn test_config_serializes_ids_as_strings() {
        let mut config = DiagnosticsConfig::default();
        config.pin(DiagnosticId::new("imu", "rate"));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["pinnedIds"], json!(["imu|rate"]));
        assert_eq!(value["minLevel"], "stale");

        let back: DiagnosticsConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, config);
    }
}
