use serde::Serialize;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;

/// Country bucket for visits whose edge country header is missing or invalid
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Reserved key of the global counter
pub const TOTAL_KEY: &str = "TOTAL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 3] = [
        DeviceClass::Mobile,
        DeviceClass::Tablet,
        DeviceClass::Desktop,
    ];

    /// Mobile wins over tablet; no signal at all means desktop.
    pub fn from_signals(is_mobile: bool, is_tablet: bool) -> Self {
        if is_mobile {
            DeviceClass::Mobile
        } else if is_tablet {
            DeviceClass::Tablet
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == value)
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uppercase ISO 3166-1 alpha-2 code, or [`UNKNOWN_COUNTRY`]
pub fn normalize_country(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(code) if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            code.to_ascii_uppercase()
        }
        _ => UNKNOWN_COUNTRY.to_string(),
    }
}

/// One counting axis together with its value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dimension {
    Total,
    Country(String),
    Device(DeviceClass),
}

impl Dimension {
    /// Value of the indexed `dimension` column
    pub fn kind(&self) -> &'static str {
        match self {
            Dimension::Total => "total",
            Dimension::Country(_) => "country",
            Dimension::Device(_) => "device",
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Dimension::Total => TOTAL_KEY,
            Dimension::Country(code) => code.as_str(),
            Dimension::Device(device) => device.as_str(),
        }
    }

    /// Primary key of the counter row: `TOTAL`, `COUNTRY#US`, `DEVICE#mobile`
    pub fn key(&self) -> String {
        match self {
            Dimension::Total => TOTAL_KEY.to_string(),
            Dimension::Country(code) => format!("COUNTRY#{code}"),
            Dimension::Device(device) => format!("DEVICE#{device}"),
        }
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        if key == TOTAL_KEY {
            return Some(Dimension::Total);
        }
        let (prefix, label) = key.split_once('#')?;
        match prefix {
            "COUNTRY" if !label.is_empty() => Some(Dimension::Country(label.to_string())),
            "DEVICE" => DeviceClass::parse(label).map(Dimension::Device),
            _ => None,
        }
    }
}

/// Counter row as read back through the dimension index
#[derive(Debug, Clone, FromRow)]
pub struct CounterRow {
    pub dimension: String,
    pub label: String,
    pub count: i64,
}

/// Expiring deduplication marker
#[derive(Debug, Clone)]
pub struct DedupRecord {
    pub fingerprint: String,
    /// Unix milliseconds
    pub recorded_at: i64,
    /// Unix milliseconds
    pub expires_at: i64,
}

impl DedupRecord {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceTotals {
    pub mobile: i64,
    pub tablet: i64,
    pub desktop: i64,
}

impl DeviceTotals {
    pub fn get(&self, device: DeviceClass) -> i64 {
        match device {
            DeviceClass::Mobile => self.mobile,
            DeviceClass::Tablet => self.tablet,
            DeviceClass::Desktop => self.desktop,
        }
    }

    fn set(&mut self, device: DeviceClass, count: i64) {
        match device {
            DeviceClass::Mobile => self.mobile = count,
            DeviceClass::Tablet => self.tablet = count,
            DeviceClass::Desktop => self.desktop = count,
        }
    }
}

/// Snapshot of every aggregate counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitTotals {
    pub total: i64,
    pub by_country: BTreeMap<String, i64>,
    pub by_device: DeviceTotals,
}

impl VisitTotals {
    pub fn from_rows(rows: impl IntoIterator<Item = CounterRow>) -> Self {
        let mut totals = VisitTotals::default();
        for row in rows {
            match row.dimension.as_str() {
                "total" => totals.total = row.count,
                "country" => {
                    totals.by_country.insert(row.label, row.count);
                }
                "device" => match DeviceClass::parse(&row.label) {
                    Some(device) => totals.by_device.set(device, row.count),
                    None => tracing::warn!(label = %row.label, "ignoring unknown device counter"),
                },
                other => tracing::warn!(dimension = %other, "ignoring unknown counter dimension"),
            }
        }
        totals
    }
}
