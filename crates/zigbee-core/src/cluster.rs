//! ZCL (Zigbee Cluster Library) definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Common ZCL cluster IDs
pub mod id {
    // General Clusters
    pub const BASIC: u16 = 0x0000;
    pub const POWER_CONFIG: u16 = 0x0001;
    pub const DEVICE_TEMP: u16 = 0x0002;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const ON_OFF_SWITCH_CONFIG: u16 = 0x0007;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const ALARMS: u16 = 0x0009;
    pub const TIME: u16 = 0x000A;
    pub const ANALOG_INPUT: u16 = 0x000C;
    pub const BINARY_INPUT: u16 = 0x000F;

    // Lighting Clusters
    pub const COLOR_CONTROL: u16 = 0x0300;
    pub const BALLAST_CONFIG: u16 = 0x0301;

    // Measurement Clusters
    pub const ILLUMINANCE_MEASUREMENT: u16 = 0x0400;
    pub const ILLUMINANCE_LEVEL_SENSING: u16 = 0x0401;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const PRESSURE_MEASUREMENT: u16 = 0x0403;
    pub const FLOW_MEASUREMENT: u16 = 0x0404;
    pub const HUMIDITY_MEASUREMENT: u16 = 0x0405;
    pub const OCCUPANCY_SENSING: u16 = 0x0406;
    pub const SOIL_MOISTURE: u16 = 0x0408;
    pub const CO2_MEASUREMENT: u16 = 0x040D;
    pub const PM25_MEASUREMENT: u16 = 0x042A;

    // Security Clusters
    pub const IAS_ZONE: u16 = 0x0500;
    pub const IAS_ACE: u16 = 0x0501;
    pub const IAS_WD: u16 = 0x0502;

    // HVAC Clusters
    pub const THERMOSTAT: u16 = 0x0201;
    pub const FAN_CONTROL: u16 = 0x0202;

    // Closures Clusters
    pub const DOOR_LOCK: u16 = 0x0101;
    pub const WINDOW_COVERING: u16 = 0x0102;

    // Smart Energy
    pub const METERING: u16 = 0x0702;
    pub const ELECTRICAL_MEASUREMENT: u16 = 0x0B04;
}

/// Symbolic cluster names, as used in frames and in session calls
pub mod name {
    pub const BASIC: &str = "genBasic";
    pub const POWER_CONFIG: &str = "genPowerCfg";
    pub const DEVICE_TEMP: &str = "genDeviceTempCfg";
    pub const IDENTIFY: &str = "genIdentify";
    pub const GROUPS: &str = "genGroups";
    pub const SCENES: &str = "genScenes";
    pub const ON_OFF: &str = "genOnOff";
    pub const LEVEL_CONTROL: &str = "genLevelCtrl";
    pub const ANALOG_INPUT: &str = "genAnalogInput";
    pub const BINARY_INPUT: &str = "genBinaryInput";
    pub const COLOR_CONTROL: &str = "lightingColorCtrl";
    pub const ILLUMINANCE_MEASUREMENT: &str = "msIlluminanceMeasurement";
    pub const TEMPERATURE_MEASUREMENT: &str = "msTemperatureMeasurement";
    pub const PRESSURE_MEASUREMENT: &str = "msPressureMeasurement";
    pub const FLOW_MEASUREMENT: &str = "msFlowMeasurement";
    pub const HUMIDITY_MEASUREMENT: &str = "msRelativeHumidity";
    pub const OCCUPANCY_SENSING: &str = "msOccupancySensing";
    pub const SOIL_MOISTURE: &str = "msSoilMoisture";
    pub const CO2_MEASUREMENT: &str = "msCO2";
    pub const PM25_MEASUREMENT: &str = "pm25Measurement";
    pub const IAS_ZONE: &str = "ssIasZone";
    pub const IAS_WD: &str = "ssIasWd";
    pub const DOOR_LOCK: &str = "closuresDoorLock";
    pub const WINDOW_COVERING: &str = "closuresWindowCovering";
    pub const METERING: &str = "seMetering";
    pub const ELECTRICAL_MEASUREMENT: &str = "haElectricalMeasurement";
}

const CLUSTER_NAMES: &[(u16, &str)] = &[
    (id::BASIC, name::BASIC),
    (id::POWER_CONFIG, name::POWER_CONFIG),
    (id::DEVICE_TEMP, name::DEVICE_TEMP),
    (id::IDENTIFY, name::IDENTIFY),
    (id::GROUPS, name::GROUPS),
    (id::SCENES, name::SCENES),
    (id::ON_OFF, name::ON_OFF),
    (id::LEVEL_CONTROL, name::LEVEL_CONTROL),
    (id::ANALOG_INPUT, name::ANALOG_INPUT),
    (id::BINARY_INPUT, name::BINARY_INPUT),
    (id::COLOR_CONTROL, name::COLOR_CONTROL),
    (id::ILLUMINANCE_MEASUREMENT, name::ILLUMINANCE_MEASUREMENT),
    (id::TEMPERATURE_MEASUREMENT, name::TEMPERATURE_MEASUREMENT),
    (id::PRESSURE_MEASUREMENT, name::PRESSURE_MEASUREMENT),
    (id::FLOW_MEASUREMENT, name::FLOW_MEASUREMENT),
    (id::HUMIDITY_MEASUREMENT, name::HUMIDITY_MEASUREMENT),
    (id::OCCUPANCY_SENSING, name::OCCUPANCY_SENSING),
    (id::SOIL_MOISTURE, name::SOIL_MOISTURE),
    (id::CO2_MEASUREMENT, name::CO2_MEASUREMENT),
    (id::PM25_MEASUREMENT, name::PM25_MEASUREMENT),
    (id::IAS_ZONE, name::IAS_ZONE),
    (id::IAS_WD, name::IAS_WD),
    (id::DOOR_LOCK, name::DOOR_LOCK),
    (id::WINDOW_COVERING, name::WINDOW_COVERING),
    (id::METERING, name::METERING),
    (id::ELECTRICAL_MEASUREMENT, name::ELECTRICAL_MEASUREMENT),
];

/// Look up the symbolic name of a standard cluster
#[must_use]
pub fn cluster_name(cluster_id: u16) -> Option<&'static str> {
    CLUSTER_NAMES
        .iter()
        .find(|(id, _)| *id == cluster_id)
        .map(|(_, name)| *name)
}

/// Look up the numeric ID of a standard cluster
#[must_use]
pub fn cluster_id(cluster_name: &str) -> Option<u16> {
    CLUSTER_NAMES
        .iter()
        .find(|(_, name)| *name == cluster_name)
        .map(|(id, _)| *id)
}

/// ZCL data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataType {
    NoData = 0x00,
    Data8 = 0x08,
    Data16 = 0x09,
    Data24 = 0x0A,
    Data32 = 0x0B,
    Boolean = 0x10,
    Bitmap8 = 0x18,
    Bitmap16 = 0x19,
    Bitmap24 = 0x1A,
    Bitmap32 = 0x1B,
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint24 = 0x22,
    Uint32 = 0x23,
    Uint48 = 0x25,
    Int8 = 0x28,
    Int16 = 0x29,
    Int24 = 0x2A,
    Int32 = 0x2B,
    Enum8 = 0x30,
    Enum16 = 0x31,
    Float16 = 0x38,
    Float32 = 0x39,
    Float64 = 0x3A,
    String = 0x42,
    Array = 0x48,
    Struct = 0x4C,
    Ieee = 0xF0,
}

impl DataType {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(DataType::NoData),
            0x08 => Some(DataType::Data8),
            0x09 => Some(DataType::Data16),
            0x0A => Some(DataType::Data24),
            0x0B => Some(DataType::Data32),
            0x10 => Some(DataType::Boolean),
            0x18 => Some(DataType::Bitmap8),
            0x19 => Some(DataType::Bitmap16),
            0x1A => Some(DataType::Bitmap24),
            0x1B => Some(DataType::Bitmap32),
            0x20 => Some(DataType::Uint8),
            0x21 => Some(DataType::Uint16),
            0x22 => Some(DataType::Uint24),
            0x23 => Some(DataType::Uint32),
            0x25 => Some(DataType::Uint48),
            0x28 => Some(DataType::Int8),
            0x29 => Some(DataType::Int16),
            0x2A => Some(DataType::Int24),
            0x2B => Some(DataType::Int32),
            0x30 => Some(DataType::Enum8),
            0x31 => Some(DataType::Enum16),
            0x38 => Some(DataType::Float16),
            0x39 => Some(DataType::Float32),
            0x3A => Some(DataType::Float64),
            0x42 => Some(DataType::String),
            0x48 => Some(DataType::Array),
            0x4C => Some(DataType::Struct),
            0xF0 => Some(DataType::Ieee),
            _ => None,
        }
    }
}

/// An attribute reference: either a symbolic name known to the stack, or a
/// raw manufacturer attribute addressed by id and wire type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Named(String),
    Raw {
        id: u16,
        #[serde(rename = "type")]
        data_type: DataType,
    },
}

impl Attribute {
    /// Key under which this attribute appears in frame data and read results
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Attribute::Named(name) => name.clone(),
            Attribute::Raw { id, .. } => id.to_string(),
        }
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Attribute::Named(name.to_string())
    }
}

impl From<String> for Attribute {
    fn from(name: String) -> Self {
        Attribute::Named(name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Named(name) => f.write_str(name),
            Attribute::Raw { id, data_type } => write!(f, "{id:#06x} ({data_type:?})"),
        }
    }
}

/// Attribute of a vendor-specific cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttribute {
    pub id: u16,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Parameter of a vendor-specific cluster command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

/// Command of a vendor-specific cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub id: u8,
    #[serde(default)]
    pub parameters: Vec<CommandParameter>,
}

/// Manufacturer-specific cluster definition registered on a device so it
/// can be addressed by name like a standard cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCluster {
    pub id: u16,
    #[serde(default)]
    pub manufacturer_code: Option<u16>,
    #[serde(default)]
    pub attributes: BTreeMap<String, CustomAttribute>,
    #[serde(default)]
    pub commands: BTreeMap<String, CustomCommand>,
    #[serde(default)]
    pub commands_response: BTreeMap<String, CustomCommand>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_name_lookup() {
        assert_eq!(cluster_name(0x0006), Some("genOnOff"));
        assert_eq!(cluster_id("seMetering"), Some(0x0702));
        assert_eq!(cluster_id("manuSpecificVendor"), None);
    }

    #[test]
    fn test_raw_attribute_key() {
        let attribute = Attribute::Raw {
            id: 0x4001,
            data_type: DataType::Uint8,
        };
        assert_eq!(attribute.key(), "16385");
        assert_eq!(Attribute::from("onOff").key(), "onOff");
    }

    #[test]
    fn test_attribute_deserialize() {
        let named: Attribute = serde_json::from_str("\"currentLevel\"").unwrap();
        assert_eq!(named, Attribute::from("currentLevel"));

        let raw: Attribute = serde_json::from_str(r#"{"id": 2, "type": "enum8"}"#).unwrap();
        assert_eq!(
            raw,
            Attribute::Raw {
                id: 2,
                data_type: DataType::Enum8
            }
        );
    }
}
