// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The YAML description of a platform.
//!
//! Every section is optional. Per-component values left out fall back to the
//! [ParametersSection] of the file, which in turn falls back to the defaults
//! in [Parameters::default].

use byte_unit::Byte;
use cxl_models::packet::Command;
use serde::{Deserialize, de};
use serde_yaml::Value;

/// Parse a value which could be an integer or a string and return u64 value
///
/// The string can be a hex string with underscores or a Byte string that
/// specifies units. Some examples are:
///  0x10000000
///  0x1_0000_0000
///  512MB, 1GiB
pub fn parse_byte_str<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: de::Deserializer<'de>,
{
    // Deserialize to a generic `Value` first so that plain integers work.
    let value: Value = Deserialize::deserialize(deserializer)?;

    if let Some(number) = value.as_u64() {
        return Ok(number);
    }

    let s = match value.as_str() {
        Some(s) => s.to_owned(),
        None => {
            return Err(de::Error::custom(format!(
                "'{value:?}': Unsupported type for Deserialize (should be u64 or String)"
            )));
        }
    };

    let lowercase = s.to_lowercase();
    if lowercase.starts_with("0x") {
        let without_underscore = lowercase.replace('_', "");
        let without_0x = without_underscore.trim_start_matches("0x");
        u64::from_str_radix(without_0x, 16)
            .map_err(|e| de::Error::custom(format!("Unable to parse {s} as hex string: {e}")))
    } else {
        let ignore_case = false;
        let num_bytes = Byte::parse_str(&s, ignore_case)
            .map_err(|e| de::Error::custom(format!("Unable to parse {s} as Byte string: {e}")))?;
        Ok(num_bytes.as_u64())
    }
}

pub fn parse_optional_byte_str<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: de::Deserializer<'de>,
{
    Ok(Some(parse_byte_str(deserializer)?))
}

/// Split a string like `625MHz` or `100 ns` into its number and unit.
fn split_unit(s: &str) -> Option<(f64, String)> {
    let s = s.trim();
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number = number.trim().parse().ok()?;
    Some((number, unit.trim().to_lowercase()))
}

fn number_or_str<'de, D>(deserializer: D, what: &str) -> Result<Result<f64, String>, D::Error>
where
    D: de::Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    if let Some(number) = value.as_f64() {
        return Ok(Ok(number));
    }
    match value.as_str() {
        Some(s) => Ok(Err(s.to_owned())),
        None => Err(de::Error::custom(format!(
            "'{value:?}': Unsupported type for {what} (should be a number or String)"
        ))),
    }
}

/// Parse a frequency and return it in MHz.
///
/// Accepts `1GHz`, `625MHz`, `100kHz` or a plain number of MHz.
pub fn parse_frequency_mhz<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: de::Deserializer<'de>,
{
    let s = match number_or_str(deserializer, "frequency")? {
        Ok(mhz) => return check_positive(mhz, "frequency"),
        Err(s) => s,
    };
    let mhz = match split_unit(&s) {
        Some((value, unit)) if unit == "ghz" => value * 1000.0,
        Some((value, unit)) if unit == "mhz" || unit.is_empty() => value,
        Some((value, unit)) if unit == "khz" => value / 1000.0,
        _ => {
            return Err(de::Error::custom(format!(
                "Unable to parse {s} as a frequency"
            )));
        }
    };
    check_positive(mhz, "frequency")
}

pub fn parse_optional_frequency_mhz<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: de::Deserializer<'de>,
{
    Ok(Some(parse_frequency_mhz(deserializer)?))
}

/// Parse a duration and return it in ns.
///
/// Accepts `100ns`, `2us`, `1ms`, `500ps` or a plain number of ns.
pub fn parse_duration_ns<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: de::Deserializer<'de>,
{
    let s = match number_or_str(deserializer, "duration")? {
        Ok(ns) => return check_not_negative(ns),
        Err(s) => s,
    };
    let ns = match split_unit(&s) {
        Some((value, unit)) if unit == "ns" || unit.is_empty() => value,
        Some((value, unit)) if unit == "ps" => value / 1000.0,
        Some((value, unit)) if unit == "us" => value * 1000.0,
        Some((value, unit)) if unit == "ms" => value * 1_000_000.0,
        _ => {
            return Err(de::Error::custom(format!(
                "Unable to parse {s} as a duration"
            )));
        }
    };
    check_not_negative(ns)
}

pub fn parse_optional_duration_ns<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: de::Deserializer<'de>,
{
    Ok(Some(parse_duration_ns(deserializer)?))
}

fn check_positive<E: de::Error>(value: f64, what: &str) -> Result<f64, E> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(E::custom(format!("{what} must be positive, got {value}")))
    }
}

fn check_not_negative<E: de::Error>(value: f64) -> Result<f64, E> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(E::custom(format!("duration must not be negative, got {value}")))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    pub parameters: Option<ParametersSection>,
    pub requesters: Option<Vec<RequesterSection>>,
    pub crossbars: Option<Vec<CrossbarSection>>,
    pub serial_links: Option<Vec<SerialLinkSection>>,
    pub monitors: Option<Vec<MonitorSection>>,
    pub memories: Option<Vec<MemorySection>>,
    pub memory_groups: Option<Vec<MemoryGroupSection>>,
    pub connections: Option<Vec<ConnectSection>>,
}

/// Global overrides of [Parameters].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParametersSection {
    pub xbar_width: Option<usize>,
    #[serde(default, deserialize_with = "parse_optional_frequency_mhz")]
    pub xbar_frequency: Option<f64>,
    pub frontend_latency: Option<u64>,
    pub forward_latency: Option<u64>,
    pub response_latency: Option<u64>,
    pub xbar_buffer_size_req: Option<usize>,
    pub xbar_buffer_size_resp: Option<usize>,
    pub max_outstanding: Option<usize>,
    #[serde(default, deserialize_with = "parse_optional_frequency_mhz")]
    pub link_frequency: Option<f64>,
    pub link_buffer_size_req: Option<usize>,
    pub link_buffer_size_rsp: Option<usize>,
    pub num_lanes_per_link: Option<usize>,
    pub lane_speed: Option<f64>,
    #[serde(default, deserialize_with = "parse_optional_duration_ns")]
    pub total_ctrl_latency: Option<f64>,
    #[serde(default, deserialize_with = "parse_optional_byte_str")]
    pub serial_link_addr_range: Option<u64>,
    pub mem_chunk: Option<usize>,
    #[serde(default, deserialize_with = "parse_optional_duration_ns")]
    pub memory_latency: Option<f64>,
    pub memory_queue_size: Option<usize>,
}

/// The parameters every component falls back to.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    pub xbar_width: usize,
    pub xbar_frequency_mhz: f64,
    pub frontend_latency: u64,
    pub forward_latency: u64,
    pub response_latency: u64,
    pub xbar_buffer_size_req: usize,
    pub xbar_buffer_size_resp: usize,
    pub max_outstanding: usize,
    pub link_frequency_mhz: f64,
    pub link_buffer_size_req: usize,
    pub link_buffer_size_rsp: usize,
    pub num_lanes_per_link: usize,
    pub lane_speed_gbps: f64,
    pub total_ctrl_latency_ns: f64,
    pub serial_link_addr_range: u64,
    pub mem_chunk: usize,
    pub memory_latency_ns: f64,
    pub memory_queue_size: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            xbar_width: 32,
            xbar_frequency_mhz: 1000.0,
            frontend_latency: 1,
            forward_latency: 2,
            response_latency: 2,
            xbar_buffer_size_req: 10,
            xbar_buffer_size_resp: 10,
            max_outstanding: 64,
            link_frequency_mhz: 10_000.0,
            link_buffer_size_req: 10,
            link_buffer_size_rsp: 10,
            num_lanes_per_link: 16,
            lane_speed_gbps: 31.0,
            total_ctrl_latency_ns: 100.0,
            serial_link_addr_range: 1 << 30,
            mem_chunk: 4,
            memory_latency_ns: 10.0,
            memory_queue_size: 16,
        }
    }
}

impl Parameters {
    /// Apply the overrides given in a file.
    #[must_use]
    pub fn with_overrides(section: &ParametersSection) -> Self {
        let d = Self::default();
        Self {
            xbar_width: section.xbar_width.unwrap_or(d.xbar_width),
            xbar_frequency_mhz: section.xbar_frequency.unwrap_or(d.xbar_frequency_mhz),
            frontend_latency: section.frontend_latency.unwrap_or(d.frontend_latency),
            forward_latency: section.forward_latency.unwrap_or(d.forward_latency),
            response_latency: section.response_latency.unwrap_or(d.response_latency),
            xbar_buffer_size_req: section
                .xbar_buffer_size_req
                .unwrap_or(d.xbar_buffer_size_req),
            xbar_buffer_size_resp: section
                .xbar_buffer_size_resp
                .unwrap_or(d.xbar_buffer_size_resp),
            max_outstanding: section.max_outstanding.unwrap_or(d.max_outstanding),
            link_frequency_mhz: section.link_frequency.unwrap_or(d.link_frequency_mhz),
            link_buffer_size_req: section
                .link_buffer_size_req
                .unwrap_or(d.link_buffer_size_req),
            link_buffer_size_rsp: section
                .link_buffer_size_rsp
                .unwrap_or(d.link_buffer_size_rsp),
            num_lanes_per_link: section.num_lanes_per_link.unwrap_or(d.num_lanes_per_link),
            lane_speed_gbps: section.lane_speed.unwrap_or(d.lane_speed_gbps),
            total_ctrl_latency_ns: section
                .total_ctrl_latency
                .unwrap_or(d.total_ctrl_latency_ns),
            serial_link_addr_range: section
                .serial_link_addr_range
                .unwrap_or(d.serial_link_addr_range),
            mem_chunk: section.mem_chunk.unwrap_or(d.mem_chunk),
            memory_latency_ns: section.memory_latency.unwrap_or(d.memory_latency_ns),
            memory_queue_size: section.memory_queue_size.unwrap_or(d.memory_queue_size),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Read,
    Write,
}

impl From<CommandKind> for Command {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Read => Command::Read,
            CommandKind::Write => Command::Write,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSection {
    pub command: CommandKind,
    #[serde(deserialize_with = "parse_byte_str")]
    pub address: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrideSection {
    pub command: CommandKind,
    #[serde(deserialize_with = "parse_byte_str")]
    pub start: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub stride: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub size_bytes: u64,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSection {
    List(Vec<RequestSection>),
    Stride(StrideSection),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequesterSection {
    pub name: String,
    pub pattern: PatternSection,
    pub max_outstanding: Option<usize>,
    pub flow_id: Option<u16>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingKind {
    /// Route by the address ranges found behind each downstream port.
    #[default]
    Ranges,

    /// Send everything to the only downstream port.
    Single,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossbarSection {
    pub name: String,
    pub routing: Option<RoutingKind>,
    pub default_port: Option<usize>,
    pub width: Option<usize>,
    pub frontend_latency: Option<u64>,
    pub forward_latency: Option<u64>,
    pub response_latency: Option<u64>,
    pub buffer_size_req: Option<usize>,
    pub buffer_size_resp: Option<usize>,
    pub max_outstanding: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialLinkSection {
    pub name: String,
    #[serde(deserialize_with = "parse_byte_str")]
    pub base_address: u64,
    #[serde(default, deserialize_with = "parse_optional_byte_str")]
    pub size_bytes: Option<u64>,
    pub num_lanes: Option<usize>,
    pub lane_speed: Option<f64>,
    #[serde(default, deserialize_with = "parse_optional_duration_ns")]
    pub total_ctrl_latency: Option<f64>,
    pub buffer_size_req: Option<usize>,
    pub buffer_size_rsp: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemorySection {
    pub name: String,
    #[serde(deserialize_with = "parse_byte_str")]
    pub base_address: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub capacity_bytes: u64,
    #[serde(default, deserialize_with = "parse_optional_duration_ns")]
    pub latency: Option<f64>,
    pub queue_size: Option<usize>,
}

/// One address range split into equally sized memory controllers.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryGroupSection {
    pub name: String,
    #[serde(deserialize_with = "parse_byte_str")]
    pub base_address: u64,
    #[serde(deserialize_with = "parse_byte_str")]
    pub capacity_bytes: u64,
    pub chunks: Option<usize>,
    #[serde(default, deserialize_with = "parse_optional_duration_ns")]
    pub latency: Option<f64>,
    pub queue_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectSection {
    pub connect: Vec<String>,
}
