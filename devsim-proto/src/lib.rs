use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod msg;

/// Telemetry snapshot posted to `/heartbeats` on behalf of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub device_sn: SerialNumber,
    pub cpu_usage: f64,
    pub ram_usage: f64,
    pub disk_free: f64,
    pub temperature: f64,
    pub latency: u32,
    pub connectivity: u8,
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`
    pub boot_time: String,
}

/// Heartbeat field a notification rule watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUsage,
    RamUsage,
    DiskFree,
    Temperature,
    Latency,
    Connectivity,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::CpuUsage => "cpu_usage",
            Metric::RamUsage => "ram_usage",
            Metric::DiskFree => "disk_free",
            Metric::Temperature => "temperature",
            Metric::Latency => "latency",
            Metric::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Eq => "=",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric: Metric,
    pub operator: Operator,
    pub value: f64,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.operator, self.value)
    }
}

pub const SERIAL_NUMBER_LENGTH: usize = 12;

/// Device serial number.
///
/// Serials generated here are always 12 ASCII digits. Deserialization does
/// not validate, since the server is the authority on what it hands back
/// from discovery; use [`FromStr`] for user input.
#[derive(PartialEq, Eq, Hash, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({:?})", self.0)
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SERIAL_NUMBER_LENGTH {
            return Err("SerialNumber must be 12 digits long");
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err("SerialNumber must only contain digits");
        }

        Ok(SerialNumber(s.to_owned()))
    }
}

#[cfg(feature = "rand")]
impl SerialNumber {
    pub fn random() -> Self {
        use rand::Rng;

        let n: u64 = rand::rng().random_range(100_000_000_000..=999_999_999_999);
        SerialNumber(n.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_number_rejects_bad_input() {
        assert!("123456789012".parse::<SerialNumber>().is_ok());
        assert!("12345678901".parse::<SerialNumber>().is_err());
        assert!("1234567890123".parse::<SerialNumber>().is_err());
        assert!("12345678901a".parse::<SerialNumber>().is_err());
    }

    #[cfg(feature = "rand")]
    #[test]
    fn random_serial_numbers_are_twelve_digits() {
        for _ in 0..1000 {
            let sn = SerialNumber::random();
            assert!(sn.as_str().parse::<SerialNumber>().is_ok(), "{sn:?}");
            assert_ne!(sn.as_str().as_bytes()[0], b'0');
        }
    }

    #[test]
    fn condition_wire_format() {
        let cond = Condition {
            metric: Metric::CpuUsage,
            operator: Operator::Ge,
            value: 60.0,
        };
        let json = serde_json::to_value(&cond).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"metric": "cpu_usage", "operator": ">=", "value": 60.0})
        );
        assert_eq!(cond.to_string(), "cpu_usage >= 60");
    }

    #[test]
    fn heartbeat_wire_format() {
        let hb = Heartbeat {
            device_sn: "100000000001".parse().unwrap(),
            cpu_usage: 12.5,
            ram_usage: 40.0,
            disk_free: 99.99,
            temperature: 21.07,
            latency: 42,
            connectivity: 1,
            boot_time: "2024-01-02T03:04:05Z".to_owned(),
        };
        let json = serde_json::to_value(&hb).unwrap();

        assert_eq!(json["device_sn"], "100000000001");
        assert_eq!(json["latency"], 42);
        assert_eq!(json["connectivity"], 1);
        assert_eq!(json["boot_time"], "2024-01-02T03:04:05Z");
        assert_eq!(serde_json::from_value::<Heartbeat>(json).unwrap(), hb);
    }

    #[test]
    fn discovery_serials_are_not_validated() {
        let sns: Vec<SerialNumber> = serde_json::from_str(r#"["abc", "123456789012"]"#).unwrap();
        assert_eq!(sns[0].as_str(), "abc");
        assert_eq!(sns[1].to_string(), "123456789012");
    }
}
