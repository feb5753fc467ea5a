use crate::model::{MISSING_VALUE, NA_VALUE, UNKNOWN_VALUE, ZERO_VALUE};
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::BTreeMap;

const BINARY_UNITS: [(&str, f64); 6] = [
    ("Ei", 1_152_921_504_606_846_976.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ti", 1_099_511_627_776.0),
    ("Gi", 1_073_741_824.0),
    ("Mi", 1_048_576.0),
    ("Ki", 1_024.0),
];
const DECIMAL_UNITS: [(&str, f64); 7] = [
    ("E", 1_000_000_000_000_000_000.0),
    ("P", 1_000_000_000_000_000.0),
    ("T", 1_000_000_000_000.0),
    ("G", 1_000_000_000.0),
    ("M", 1_000_000.0),
    ("K", 1_000.0),
    ("k", 1_000.0),
];

/// Parses a Kubernetes quantity (`512Mi`, `1.5G`, `250m`, `42`) into its
/// base unit value.
pub fn parse_quantity(value: &str) -> Option<f64> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = BINARY_UNITS
        .iter()
        .chain(DECIMAL_UNITS.iter())
        .find_map(|(suffix, multiplier)| {
            raw.strip_suffix(suffix).map(|number| (number, *multiplier))
        })
        .or_else(|| raw.strip_suffix('m').map(|number| (number, 0.001)))
        .unwrap_or((raw, 1.0));

    let numeric = number.parse::<f64>().ok()?;
    let scaled = numeric * multiplier;
    if !scaled.is_finite() || scaled < 0.0 {
        return None;
    }
    Some(scaled)
}

pub fn parse_cpu_millicores(value: &str) -> Option<u64> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, multiplier) = if let Some(number) = raw.strip_suffix('m') {
        (number, 1.0)
    } else if let Some(number) = raw.strip_suffix('u') {
        (number, 0.001)
    } else if let Some(number) = raw.strip_suffix('n') {
        (number, 0.000001)
    } else {
        (raw, 1000.0)
    };

    let numeric = number.parse::<f64>().ok()?;
    let millicores = (numeric * multiplier).round();
    if !millicores.is_finite() || millicores < 0.0 {
        return None;
    }
    Some(millicores as u64)
}

pub fn format_cpu_millicores(value: u64) -> String {
    if value >= 1_000 {
        let cores = value as f64 / 1_000.0;
        format!("{cores:.2}c")
    } else {
        format!("{value}m")
    }
}

pub fn format_bytes(value: u64) -> String {
    if value == 0 {
        return ZERO_VALUE.to_string();
    }

    let value_f64 = value as f64;
    for (suffix, unit_size) in BINARY_UNITS {
        if value_f64 >= unit_size {
            return format!("{:.1}{suffix}", value_f64 / unit_size);
        }
    }
    format!("{value}B")
}

/// Compact elapsed time in the `kubectl` style: `45s`, `5m10s`, `3h12m`,
/// `4d6h`, `2y31d`.
pub fn human_duration(seconds: i64) -> String {
    if seconds < -1 {
        return "<invalid>".to_string();
    }
    if seconds < 0 {
        return "0s".to_string();
    }
    if seconds < 60 * 2 {
        return format!("{seconds}s");
    }

    let minutes = seconds / 60;
    if minutes < 10 {
        let rest = seconds % 60;
        if rest == 0 {
            return format!("{minutes}m");
        }
        return format!("{minutes}m{rest}s");
    }
    if minutes < 60 * 3 {
        return format!("{minutes}m");
    }

    let hours = minutes / 60;
    if hours < 8 {
        let rest = minutes % 60;
        if rest == 0 {
            return format!("{hours}h");
        }
        return format!("{hours}h{rest}m");
    }
    if hours < 48 {
        return format!("{hours}h");
    }

    let days = hours / 24;
    if hours < 24 * 8 {
        let rest = hours % 24;
        if rest == 0 {
            return format!("{days}d");
        }
        return format!("{days}d{rest}h");
    }
    if hours < 24 * 365 * 2 {
        return format!("{days}d");
    }

    let years = days / 365;
    if hours < 24 * 365 * 8 {
        let rest = days % 365;
        if rest == 0 {
            return format!("{years}y");
        }
        return format!("{years}y{rest}d");
    }
    format!("{years}y")
}

pub fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return UNKNOWN_VALUE.to_string();
    };

    human_age_timestamp(timestamp.0)
}

pub fn human_age_timestamp(ts: k8s_openapi::jiff::Timestamp) -> String {
    let elapsed = k8s_openapi::jiff::Timestamp::now().as_second() - ts.as_second();
    human_duration(elapsed)
}

/// Elapsed time since an RFC 3339 timestamp, `None` when it does not parse.
pub fn age_since_rfc3339(raw: &str, now: DateTime<Utc>) -> Option<String> {
    let then = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    let elapsed = now.signed_duration_since(then.with_timezone(&Utc));
    Some(human_duration(elapsed.num_seconds()))
}

pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }

    let mut out = value
        .chars()
        .take(max.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

pub fn map_to_str(map: Option<&BTreeMap<String, String>>) -> String {
    map.map(|labels| {
        labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    })
    .unwrap_or_default()
}

pub fn na(value: impl Into<String>) -> String {
    or_sentinel(value.into(), NA_VALUE)
}

pub fn missing(value: impl Into<String>) -> String {
    or_sentinel(value.into(), MISSING_VALUE)
}

fn or_sentinel(value: String, sentinel: &str) -> String {
    if value.is_empty() {
        sentinel.to_string()
    } else {
        value
    }
}

pub fn bool_to_str(value: bool) -> String {
    value.to_string()
}

/// Status text for a health check, blank when healthy.
pub fn as_status(result: &anyhow::Result<()>) -> String {
    match result {
        Ok(()) => String::new(),
        Err(error) => format!("{error:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        age_since_rfc3339, as_status, format_bytes, human_duration, missing,
        na, parse_cpu_millicores, parse_quantity, truncate,
    };
    use chrono::{TimeZone, Utc};

    #[test]
    fn quantities_parse_binary_and_decimal_suffixes() {
        assert_eq!(parse_quantity("1Ki"), Some(1_024.0));
        assert_eq!(parse_quantity("2G"), Some(2_000_000_000.0));
        assert_eq!(parse_quantity("250m"), Some(0.25));
        assert_eq!(parse_quantity("42"), Some(42.0));
        assert_eq!(parse_quantity("fred"), None);
    }

    #[test]
    fn cpu_parsing_and_byte_formatting() {
        assert_eq!(parse_cpu_millicores("2"), Some(2_000));
        assert_eq!(parse_cpu_millicores("150m"), Some(150));
        assert_eq!(format_bytes(1_572_864), "1.5Mi");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(0), "0");
    }

    #[test]
    fn human_durations() {
        assert_eq!(human_duration(19), "19s");
        assert_eq!(human_duration(610), "10m");
        assert_eq!(human_duration(310), "5m10s");
        assert_eq!(human_duration(3 * 3_600 + 12 * 60), "3h12m");
        assert_eq!(human_duration(4 * 86_400 + 6 * 3_600), "4d6h");
        assert_eq!(human_duration(40 * 86_400), "40d");
        assert_eq!(human_duration(-5), "<invalid>");
    }

    #[test]
    fn rfc3339_age() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap();
        assert_eq!(
            age_since_rfc3339("2024-01-01T00:00:00Z", now).as_deref(),
            Some("10m")
        );
        assert_eq!(age_since_rfc3339("yesterday", now), None);
    }

    #[test]
    fn sentinels_and_text() {
        assert_eq!(na(""), "n/a");
        assert_eq!(missing(""), "<none>");
        assert_eq!(na("x"), "x");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(as_status(&Ok(())), "");
        assert_eq!(as_status(&Err(anyhow::anyhow!("boom"))), "boom");
    }
}
