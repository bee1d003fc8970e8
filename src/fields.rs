//! Semantic telemetry fields
//!
//! Telemetry rows come from firmware revisions that disagree on key names
//! ("Temp1", "temp_1", "Temp 1") and ship fixed-point values. This module maps
//! a row onto a fixed field set through an ordered alias table and converts
//! values to display units.

use serde::Serialize;
use serde_json::{Map, Value};

/// Rendered in place of a missing or non-numeric value
pub const ABSENT: &str = "--";

/// Physical quantity of a field, which fixes its wire scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quantity {
    /// Wire value is hundredths of a degree C
    Temperature,
    /// Wire value is hundredths of a percent
    Humidity,
    /// Wire value is millivolts
    Voltage,
    /// Wire value is milliamps
    Current,
    /// Wire value is milliwatts
    Power,
    /// Passed through unscaled
    Plain,
}

impl Quantity {
    pub fn divisor(self) -> f64 {
        match self {
            Quantity::Temperature | Quantity::Humidity => 100.0,
            Quantity::Voltage | Quantity::Current | Quantity::Power => 1000.0,
            Quantity::Plain => 1.0,
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Quantity::Temperature => "°C",
            Quantity::Humidity => "%",
            Quantity::Voltage => "V",
            Quantity::Current => "A",
            Quantity::Power => "W",
            Quantity::Plain => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Rssi,
    AvgRssi,
    Temp1,
    Hum1,
    Temp2,
    Hum2,
    VEsp,
    IEsp,
    PEsp,
    VM1,
    IM1,
    PM1,
    VM2,
    IM2,
    PM2,
    AccX,
    AccY,
    AccZ,
    GyroX,
    GyroY,
    GyroZ,
    Dist1,
    Dist2,
    Dist3,
}

/// Candidate key names per field, most specific first
pub static ALIAS_TABLE: &[(Field, &[&str])] = &[
    (Field::Rssi, &["Rssi", "rssi", "RSSI"]),
    (Field::AvgRssi, &["avgRssi", "avg_rssi", "rssi_avg"]),
    (Field::Temp1, &["Temp1", "temp1", "Temp 1", "t1", "temperature", "temp"]),
    (Field::Hum1, &["Hum1", "hum1", "Hum 1", "h1", "humidity", "hum"]),
    (Field::Temp2, &["Temp2", "temp2", "Temp 2", "t2"]),
    (Field::Hum2, &["Hum2", "hum2", "Hum 2", "h2"]),
    (Field::VEsp, &["V Esp", "v_esp", "vEsp", "voltage", "v"]),
    (Field::IEsp, &["I Esp", "i_esp", "iEsp", "current", "i"]),
    (Field::PEsp, &["P Esp", "p_esp", "pEsp", "power", "p"]),
    (Field::VM1, &["V M1", "v_m1", "vM1"]),
    (Field::IM1, &["I M1", "i_m1", "iM1"]),
    (Field::PM1, &["P M1", "p_m1", "pM1"]),
    (Field::VM2, &["V M2", "v_m2", "vM2"]),
    (Field::IM2, &["I M2", "i_m2", "iM2"]),
    (Field::PM2, &["P M2", "p_m2", "pM2"]),
    (Field::AccX, &["acc X", "acc_x", "accX", "ax"]),
    (Field::AccY, &["acc Y", "acc_y", "accY", "ay"]),
    (Field::AccZ, &["acc Z", "acc_z", "accZ", "az"]),
    (Field::GyroX, &["gyro X", "gyro_x", "gyroX", "gx"]),
    (Field::GyroY, &["gyro Y", "gyro_y", "gyroY", "gy"]),
    (Field::GyroZ, &["gyro Z", "gyro_z", "gyroZ", "gz"]),
    (Field::Dist1, &["Dist1", "dist1", "Dist 1", "d1"]),
    (Field::Dist2, &["Dist2", "dist2", "Dist 2", "d2"]),
    (Field::Dist3, &["Dist3", "dist3", "Dist 3", "d3"]),
];

impl Field {
    pub fn all() -> impl Iterator<Item = Field> {
        ALIAS_TABLE.iter().map(|(field, _)| *field)
    }

    pub fn aliases(self) -> &'static [&'static str] {
        ALIAS_TABLE
            .iter()
            .find(|(field, _)| *field == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    /// Canonical key, the first alias in the table
    pub fn key(self) -> &'static str {
        self.aliases().first().copied().unwrap_or("")
    }

    pub fn quantity(self) -> Quantity {
        use Field::*;
        match self {
            Temp1 | Temp2 => Quantity::Temperature,
            Hum1 | Hum2 => Quantity::Humidity,
            VEsp | VM1 | VM2 => Quantity::Voltage,
            IEsp | IM1 | IM2 => Quantity::Current,
            PEsp | PM1 | PM2 => Quantity::Power,
            _ => Quantity::Plain,
        }
    }
}

fn strip_separators(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Find the record entry for a field.
///
/// Three passes run over the whole alias list in table order: exact match,
/// then case-insensitive, then with separators stripped. The first alias to
/// match in the earliest pass wins.
///
/// In the relaxed passes several record keys can fold to the same alias
/// (`"V ESP"` and `"v esp"`). The first such key in map iteration order is
/// taken. `serde_json::Map` is built without `preserve_order`, so that order
/// is sorted by key, not the order the keys arrived in.
pub fn find_entry<'a>(record: &'a Map<String, Value>, field: Field) -> Option<(&'a str, &'a Value)> {
    let aliases = field.aliases();

    for alias in aliases {
        if let Some(value) = record.get(*alias) {
            return Some((*alias, value));
        }
    }

    for alias in aliases {
        let wanted = alias.to_lowercase();
        if let Some((key, value)) = record.iter().find(|(k, _)| k.to_lowercase() == wanted) {
            return Some((key.as_str(), value));
        }
    }

    let stripped: Vec<(String, &'a String, &'a Value)> = record
        .iter()
        .map(|(k, v)| (strip_separators(k), k, v))
        .collect();
    for alias in aliases {
        let wanted = strip_separators(alias);
        if let Some((_, key, value)) = stripped.iter().find(|(s, _, _)| *s == wanted) {
            return Some((key.as_str(), value));
        }
    }

    None
}

/// Numbers and numeric strings coerce; anything else is absent
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Resolve a field on a record and convert it to display units
pub fn resolve(record: &Map<String, Value>, field: Field) -> Option<f64> {
    let (_, value) = find_entry(record, field)?;
    coerce_number(value).map(|n| n / field.quantity().divisor())
}

/// Format a resolved value, using [`ABSENT`] when there is none
pub fn render_value(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => ABSENT.to_string(),
    }
}
