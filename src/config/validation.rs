//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " — did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Tables whose keys are user data rather than config fields.
const FREE_FORM_TABLES: &[&str] = &["telemetry.callsigns", "telemetry.opensky.aircraft"];

/// Returns the complete set of valid dotted key paths for `PipelineConfig`.
///
/// Maintained by hand to match the struct hierarchy in pipeline_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [paths]
        "paths",
        "paths.raw_inbox",
        "paths.raw_processing",
        "paths.raw_archive",
        "paths.converted_buffer",
        "paths.converted_archive",
        "paths.output_dir",
        "paths.status_file",
        "paths.data_dir",
        // [window]
        "window",
        "window.length",
        "window.poll_interval_secs",
        "window.raw_extension",
        "window.converted_extension",
        // [radar]
        "radar",
        "radar.radar_name",
        "radar.institution",
        "radar.variable_name",
        "radar.min_dbz",
        "radar.max_dbz",
        "radar.physical_threshold_dbz",
        "radar.sensor_latitude",
        "radar.sensor_longitude",
        "radar.earth_radius_m",
        // [model]
        "model",
        "model.input_height",
        "model.input_width",
        "model.forecast_steps",
        // [forecast]
        "forecast",
        "forecast.default_interval_minutes",
        "forecast.min_cadence_minutes",
        "forecast.max_cadence_minutes",
        "forecast.compress_output",
        "forecast.write_sidecars",
        // [converter]
        "converter",
        "converter.reverse_enabled",
        "converter.forward",
        "converter.forward.binary",
        "converter.forward.params_file",
        "converter.forward.extra_args",
        "converter.forward.timeout_secs",
        "converter.forward.output_extension",
        "converter.reverse",
        "converter.reverse.binary",
        "converter.reverse.params_file",
        "converter.reverse.extra_args",
        "converter.reverse.timeout_secs",
        "converter.reverse.output_extension",
        // [cells]
        "cells",
        "cells.threshold_dbz",
        "cells.severe_dbz",
        "cells.hail_dbz",
        // [alerts]
        "alerts",
        "alerts.enabled",
        "alerts.radius_km",
        "alerts.cooldown_minutes",
        "alerts.registry",
        "alerts.notifier",
        "alerts.webhook_timeout_secs",
        // [telemetry]
        "telemetry",
        "telemetry.enabled",
        "telemetry.directory",
        "telemetry.interval_secs",
        "telemetry.ttl_secs",
        "telemetry.max_trail_points",
        "telemetry.callsigns",
        "telemetry.file_date",
        "telemetry.opensky",
        "telemetry.opensky.enabled",
        "telemetry.opensky.url",
        "telemetry.opensky.min_lat",
        "telemetry.opensky.max_lat",
        "telemetry.opensky.min_lon",
        "telemetry.opensky.max_lon",
        "telemetry.opensky.refresh_secs",
        "telemetry.opensky.timeout_secs",
        "telemetry.opensky.aircraft",
    ];
    keys.iter().copied().collect()
}

/// Walk a TOML value tree and collect all dotted key paths.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() && !FREE_FORM_TABLES.contains(&path.as_str()) {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find the closest known key within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys only warn; they never fail the load.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("radius_km", "radius_km"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("cooldown_minute", "cooldown_minutes"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [converter.forward]
            binary = "Mdv2NetCDF"
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"converter".to_string()));
        assert!(keys.contains(&"converter.forward".to_string()));
        assert!(keys.contains(&"converter.forward.binary".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[alerts]
raduis_km = 25.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].field.contains("raduis_km"));
        assert_eq!(warnings[0].suggestion.as_deref(), Some("alerts.radius_km"));
    }

    #[test]
    fn test_callsign_table_is_free_form() {
        let toml_str = r#"
[telemetry.callsigns]
ARG1234 = "LV-FXQ"
"#;
        assert!(validate_unknown_keys(toml_str).is_empty());
    }

    #[test]
    fn test_valid_keys_no_warnings() {
        let toml_str = r#"
[window]
length = 6
poll_interval_secs = 5
"#;
        assert!(validate_unknown_keys(toml_str).is_empty());
    }
}
