/*
 * Copyright 2025 Carver Automation Corporation.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! The read-only query set run on every poll and lenient parsing of the
//! answers. Devices report most numbers as strings.

use chrono::{DateTime, Utc};
use device_gateway::{Command, CommandOutput};
use sample_sink::ResourceSample;
use serde_json::Value;
use thiserror::Error;

pub const INTERFACES_PATH: &str = "interface";
pub const RESOURCES_PATH: &str = "system/resource";
pub const SESSIONS_PATH: &str = "ppp/active";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unexpected poll response: {0}")]
pub struct ResponseError(pub String);

pub fn poll_commands() -> Vec<Command> {
    vec![
        Command::read(INTERFACES_PATH),
        Command::read(RESOURCES_PATH),
        Command::read(SESSIONS_PATH),
    ]
}

/// Cumulative counters as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// Everything one successful poll returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub timestamp: DateTime<Utc>,
    pub interfaces: Vec<InterfaceCounters>,
    pub resources: ResourceSample,
}

impl PollReport {
    /// Interprets the outputs of [`poll_commands`], in order.
    pub fn from_outputs(
        device_id: &str,
        outputs: &[CommandOutput],
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ResponseError> {
        let [interfaces, resources, sessions] = outputs else {
            return Err(ResponseError(format!(
                "expected 3 outputs, got {}",
                outputs.len()
            )));
        };
        Ok(Self {
            timestamp,
            interfaces: parse_interfaces(&interfaces.body)?,
            resources: parse_resources(device_id, &resources.body, &sessions.body, timestamp)?,
        })
    }
}

pub fn parse_interfaces(body: &Value) -> Result<Vec<InterfaceCounters>, ResponseError> {
    let entries = body
        .as_array()
        .ok_or_else(|| ResponseError("interface list is not an array".into()))?;
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            Some(InterfaceCounters {
                name,
                rx_bytes: field_u64(entry, "rx-byte"),
                tx_bytes: field_u64(entry, "tx-byte"),
                rx_packets: field_u64(entry, "rx-packet"),
                tx_packets: field_u64(entry, "tx-packet"),
            })
        })
        .collect())
}

pub fn parse_resources(
    device_id: &str,
    resources: &Value,
    sessions: &Value,
    timestamp: DateTime<Utc>,
) -> Result<ResourceSample, ResponseError> {
    // Some firmware wraps the single resource object in an array.
    let resource = match resources {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    if !resource.is_object() {
        return Err(ResponseError("system resource is not an object".into()));
    }

    let total = field_u64(resource, "total-memory");
    let free = field_u64(resource, "free-memory");
    let active_sessions = match sessions {
        Value::Array(items) => items.len() as u64,
        Value::Null => 0,
        _ => return Err(ResponseError("active session list is not an array".into())),
    };

    Ok(ResourceSample {
        device_id: device_id.to_string(),
        timestamp,
        cpu_load_percent: resource.get("cpu-load").and_then(number_f64).unwrap_or(0.0),
        memory_used_bytes: total.saturating_sub(free),
        memory_total_bytes: total,
        active_sessions,
        uptime_seconds: resource.get("uptime").and_then(parse_uptime),
    })
}

fn field_u64(entry: &Value, key: &str) -> u64 {
    entry.get(key).and_then(number_u64).unwrap_or(0)
}

fn number_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn number_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
}

/// Accepts plain seconds or compact durations such as `2w3d4h5m6s`.
pub fn parse_uptime(value: &Value) -> Option<u64> {
    if let Some(secs) = number_u64(value) {
        return Some(secs);
    }
    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let unit = match ch {
            'w' => 7 * 24 * 3600,
            'd' => 24 * 3600,
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let amount: u64 = digits.parse().ok()?;
        total = total.saturating_add(amount.saturating_mul(unit));
        digits.clear();
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_string_counters() {
        let body = json!([
            {".id": "*1", "name": "ether1", "rx-byte": "1000", "tx-byte": "2000", "rx-packet": "10", "tx-packet": 20},
            {".id": "*2", "rx-byte": "5"},
        ]);
        let interfaces = parse_interfaces(&body).unwrap();
        assert_eq!(
            interfaces,
            vec![InterfaceCounters {
                name: "ether1".into(),
                rx_bytes: 1000,
                tx_bytes: 2000,
                rx_packets: 10,
                tx_packets: 20,
            }]
        );
    }

    #[test]
    fn parses_resources_and_sessions() {
        let now = Utc::now();
        let sample = parse_resources(
            "r1",
            &json!({"cpu-load": "12", "total-memory": "1073741824", "free-memory": "536870912", "uptime": "1d2h3m4s"}),
            &json!([{"name": "a"}, {"name": "b"}]),
            now,
        )
        .unwrap();
        assert_eq!(sample.cpu_load_percent, 12.0);
        assert_eq!(sample.memory_used_bytes, 536_870_912);
        assert_eq!(sample.active_sessions, 2);
        assert_eq!(sample.uptime_seconds, Some(93_784));
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(parse_uptime(&json!("2w")), Some(1_209_600));
        assert_eq!(parse_uptime(&json!(42)), Some(42));
        assert_eq!(parse_uptime(&json!("5x")), None);
        assert_eq!(parse_uptime(&json!("12")), Some(12));
    }

    #[test]
    fn wrong_output_count_is_an_error() {
        let out = CommandOutput { body: json!([]) };
        assert!(PollReport::from_outputs("r1", &[out], Utc::now()).is_err());
    }
}
