use crate::error::KefError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio input selectable on the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "WIFI")]
    Wifi,
    #[serde(rename = "BT")]
    Bluetooth,
    #[serde(rename = "AUX")]
    Aux,
    #[serde(rename = "OPT")]
    Optical,
    #[serde(rename = "USB")]
    Usb,
}

impl Source {
    /// All inputs, in table order
    pub const ALL: [Source; 5] = [
        Source::Wifi,
        Source::Bluetooth,
        Source::Aux,
        Source::Optical,
        Source::Usb,
    ];

    /// Wire-table name of the input
    pub fn name(self) -> &'static str {
        match self {
            Source::Wifi => "WIFI",
            Source::Bluetooth => "BT",
            Source::Aux => "AUX",
            Source::Optical => "OPT",
            Source::Usb => "USB",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Source {
    type Err = KefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| KefError::InvalidSource(s.to_string()))
    }
}

/// Speaker power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

/// Socket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Consolidated view of the speaker carried by every `state` event
///
/// `None` means the field has not been reported by the device since the
/// current connection was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Volume level 0..=100
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    /// Active input; unknown while off or powering on
    pub source: Option<Source>,
    pub connection_state: ConnectionState,
    pub power: Option<Power>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_round_trip_through_from_str() {
        for source in Source::ALL {
            assert_eq!(source.name().parse::<Source>().unwrap(), source);
        }
        assert_eq!("aux".parse::<Source>().unwrap(), Source::Aux);
    }

    #[test]
    fn unknown_source_name_is_rejected() {
        let err = "HDMI".parse::<Source>().unwrap_err();
        assert!(matches!(err, KefError::InvalidSource(name) if name == "HDMI"));
    }

    #[test]
    fn snapshot_serializes_with_wire_names() {
        let snapshot = DeviceSnapshot {
            volume: Some(30),
            muted: Some(false),
            source: Some(Source::Bluetooth),
            connection_state: ConnectionState::Connected,
            power: Some(Power::On),
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "volume": 30,
                "muted": false,
                "source": "BT",
                "connectionState": "connected",
                "power": "on",
            })
        );
    }

    #[test]
    fn unknown_fields_serialize_as_null() {
        let snapshot = DeviceSnapshot {
            volume: None,
            muted: None,
            source: None,
            connection_state: ConnectionState::Disconnected,
            power: None,
        };
        let json = serde_json::to_value(snapshot).unwrap();
        assert!(json["volume"].is_null());
        assert!(json["source"].is_null());
        assert!(json["power"].is_null());
    }
}
