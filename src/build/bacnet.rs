//! BACnet addressing carried in identity records
//!
//! Values look like `<device>/object=<objectType>:<instance>`, e.g.
//! `12345/object=0:7` for analog input 7 on device 12345.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BacnetDecodeError {
    #[error("missing '/object=' separator in {0}")]
    MissingObject(String),

    #[error("missing ':' between object type and instance in {0}")]
    MissingInstance(String),

    #[error("non-numeric {field} in {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// Standard BACnet object type names, indexed by object type number
const OBJECT_TYPES: &[&str] = &[
    "AnalogInput",
    "AnalogOutput",
    "AnalogValue",
    "BinaryInput",
    "BinaryOutput",
    "BinaryValue",
    "Calendar",
    "Command",
    "Device",
    "EventEnrollment",
    "File",
    "Group",
    "Loop",
    "MultiStateInput",
    "MultiStateOutput",
    "NotificationClass",
    "Program",
    "Schedule",
    "Averaging",
    "MultiStateValue",
    "TrendLog",
    "LifeSafetyPoint",
    "LifeSafetyZone",
    "Accumulator",
    "PulseConverter",
    "EventLog",
    "GlobalGroup",
    "TrendLogMultiple",
    "LoadControl",
    "StructuredView",
    "AccessDoor",
    "Timer",
    "AccessCredential",
    "AccessPoint",
    "AccessRights",
    "AccessUser",
    "AccessZone",
    "CredentialDataInput",
    "NetworkSecurity",
    "BitstringValue",
    "CharacterstringValue",
    "DatePatternValue",
    "DateValue",
    "DatetimePatternValue",
    "DatetimeValue",
    "IntegerValue",
    "LargeAnalogValue",
    "OctetstringValue",
    "PositiveIntegerValue",
    "TimePatternValue",
    "TimeValue",
    "NotificationForwarder",
    "AlertEnrollment",
    "Channel",
    "LightingOutput",
    "BinaryLightingOutput",
    "NetworkPort",
    "ElevatorGroup",
    "Escalator",
    "Lift",
];

/// Name of a BACnet object type; proprietary or unknown numbers keep their
/// numeric form.
pub fn object_type_name(object_type: u32) -> String {
    OBJECT_TYPES
        .get(object_type as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| object_type.to_string())
}

/// Decoded BACnet address of one point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacnetAddress {
    pub device_id: u64,
    pub object_type: u32,
    pub object_id: u64,
}

impl BacnetAddress {
    pub fn decode(value: &str) -> Result<Self, BacnetDecodeError> {
        let (device, object) = value
            .split_once("/object=")
            .ok_or_else(|| BacnetDecodeError::MissingObject(value.to_string()))?;
        let (object_type, instance) = object
            .split_once(':')
            .ok_or_else(|| BacnetDecodeError::MissingInstance(value.to_string()))?;

        let number = |field: &'static str, text: &str| {
            text.trim().parse::<u64>().map_err(|_| BacnetDecodeError::NotNumeric {
                field,
                value: value.to_string(),
            })
        };

        let object_type = number("object type", object_type)?;
        Ok(BacnetAddress {
            device_id: number("device id", device)?,
            object_type: u32::try_from(object_type).map_err(|_| BacnetDecodeError::NotNumeric {
                field: "object type",
                value: value.to_string(),
            })?,
            object_id: number("object id", instance)?,
        })
    }

    /// `communication` content of a twin
    pub fn to_communication(&self) -> Value {
        json!({
            "BACnet": {
                "deviceID": self.device_id,
                "objectType": object_type_name(self.object_type),
                "objectID": self.object_id,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_analog_input() {
        let address = BacnetAddress::decode("12345/object=0:7").unwrap();
        assert_eq!(
            address,
            BacnetAddress {
                device_id: 12345,
                object_type: 0,
                object_id: 7
            }
        );
        assert_eq!(
            address.to_communication(),
            json!({"BACnet": {"deviceID": 12345, "objectType": "AnalogInput", "objectID": 7}})
        );
    }

    #[test]
    fn test_object_type_names() {
        assert_eq!(object_type_name(5), "BinaryValue");
        assert_eq!(object_type_name(19), "MultiStateValue");
        assert_eq!(object_type_name(59), "Lift");
        assert_eq!(object_type_name(600), "600");
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(
            BacnetAddress::decode("12345"),
            Err(BacnetDecodeError::MissingObject("12345".into()))
        );
        assert_eq!(
            BacnetAddress::decode("12345/object=0"),
            Err(BacnetDecodeError::MissingInstance("12345/object=0".into()))
        );
        assert!(matches!(
            BacnetAddress::decode("dev/object=0:7"),
            Err(BacnetDecodeError::NotNumeric { field: "device id", .. })
        ));
    }
}
