use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

pub const TEMPERATURE_NAME: &str = "Temperature Sensor";
pub const HUMIDITY_NAME: &str = "Humidity Sensor";
pub const CELSIUS: &str = "C";
pub const PERCENT: &str = "%";

/// One measurement channel.
///
/// Fields are declared in alphabetical order so the serialized keys come out sorted.
/// `reading` stays a sequence even though every acquisition stores a single sample in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub name: String,
    pub reading: Vec<f32>,
    pub unit: String,
}

impl Reading {
    pub fn new(name: &str, value: f32, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            reading: vec![value],
            unit: unit.to_string(),
        }
    }

    pub fn temperature(celsius: f32) -> Self {
        Self::new(TEMPERATURE_NAME, celsius, CELSIUS)
    }

    pub fn humidity(percent: f32) -> Self {
        Self::new(HUMIDITY_NAME, percent, PERCENT)
    }
}

/// The ordered pair produced by one successful acquisition: temperature first, humidity second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: [Reading; 2],
}

impl Snapshot {
    pub fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            entries: [Reading::temperature(temperature), Reading::humidity(humidity)],
        }
    }

    pub fn temperature(&self) -> &Reading {
        &self.entries[0]
    }

    pub fn humidity(&self) -> &Reading {
        &self.entries[1]
    }

    pub fn readings(&self) -> &[Reading] {
        &self.entries
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        to_pretty_json(self)
    }
}

/// Serialize `value` as JSON indented by four spaces.
///
/// serde_json only offers its two-space pretty printer without `std`, so the leading
/// indent of every line is doubled. Strings never contain a raw newline, since control
/// characters are escaped, so every line break is structural.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let two_space = serde_json::to_string_pretty(value)?;
    let mut out = String::with_capacity(two_space.len() * 3 / 2);
    for (i, line) in two_space.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let body = line.trim_start_matches(' ');
        let indent = line.len() - body.len();
        out.extend(core::iter::repeat(' ').take(indent * 2));
        out.push_str(body);
    }
    Ok(out)
}
