//! Declarative device descriptors
//!
//! A descriptor names a device model and lists its capabilities. Each
//! capability entry is tagged with the builder it invokes:
//!
//! ```json
//! {
//!   "zigbee_model": ["PLUG-1"],
//!   "model": "PLUG-1",
//!   "vendor": "Acme",
//!   "extend": [
//!     {"extend": "on_off", "power_on_behavior": true},
//!     {"extend": "electricity_meter", "cluster": "electrical"}
//!   ]
//! }
//! ```

use crate::builders::*;
use crate::definition::Definition;
use crate::endpoint::{device_endpoints, DeviceEndpointsArgs};
use crate::error::ExtendError;
use crate::extend::Extend;
use serde::Deserialize;

/// One builder invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "extend", rename_all = "snake_case")]
pub enum Capability {
    DeviceEndpoints(DeviceEndpointsArgs),
    DeviceAddCustomCluster(DeviceAddCustomClusterArgs),
    Numeric(NumericArgs),
    Binary(BinaryArgs),
    EnumLookup(EnumLookupArgs),
    ActionEnumLookup(ActionEnumLookupArgs),
    OnOff(OnOffArgs),
    Light(LightArgs),
    Identify(IdentifyArgs),
    ElectricityMeter(ElectricityMeterArgs),
    IasZoneAlarm(IasZoneArgs),
    IasWarning(IasWarningArgs),
    Battery(BatteryArgs),
    WindowCovering(WindowCoveringArgs),
    Lock(LockArgs),
    Temperature(SensorArgs),
    Humidity(SensorArgs),
    Pressure(SensorArgs),
    Illuminance(SensorArgs),
    Co2(SensorArgs),
    Pm25(SensorArgs),
    Flow(SensorArgs),
    SoilMoisture(SensorArgs),
    DeviceTemperature(SensorArgs),
    Occupancy(OccupancyArgs),
}

impl Capability {
    /// Run the builder
    pub fn build(self) -> Result<Extend, ExtendError> {
        match self {
            Capability::DeviceEndpoints(args) => Ok(device_endpoints(args)),
            Capability::DeviceAddCustomCluster(args) => device_add_custom_cluster(args),
            Capability::Numeric(args) => numeric(args),
            Capability::Binary(args) => binary(args),
            Capability::EnumLookup(args) => enum_lookup(args),
            Capability::ActionEnumLookup(args) => action_enum_lookup(args),
            Capability::OnOff(args) => on_off(args),
            Capability::Light(args) => light(args),
            Capability::Identify(args) => identify(args),
            Capability::ElectricityMeter(args) => electricity_meter(args),
            Capability::IasZoneAlarm(args) => ias_zone_alarm(args),
            Capability::IasWarning(args) => ias_warning(args),
            Capability::Battery(args) => battery(args),
            Capability::WindowCovering(args) => window_covering(args),
            Capability::Lock(args) => lock(args),
            Capability::Temperature(args) => temperature(args),
            Capability::Humidity(args) => humidity(args),
            Capability::Pressure(args) => pressure(args),
            Capability::Illuminance(args) => illuminance(args),
            Capability::Co2(args) => co2(args),
            Capability::Pm25(args) => pm25(args),
            Capability::Flow(args) => flow(args),
            Capability::SoilMoisture(args) => soil_moisture(args),
            Capability::DeviceTemperature(args) => device_temperature(args),
            Capability::Occupancy(args) => occupancy(args),
        }
    }
}

/// A device model and its capabilities
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceDescriptor {
    /// Model identifiers the device reports in `genBasic.modelId`
    pub zigbee_model: Vec<String>,
    pub model: String,
    pub vendor: String,
    #[serde(default)]
    pub description: String,
    pub extend: Vec<Capability>,
}

impl DeviceDescriptor {
    pub fn from_json(json: &str) -> Result<Self, ExtendError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build every capability and compose the definition. Construction
    /// errors surface here, before any device is touched.
    pub fn build(self) -> Result<Definition, ExtendError> {
        let extends = self
            .extend
            .into_iter()
            .map(Capability::build)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                tracing::warn!("Failed to build definition for {}: {}", self.model, e);
                e
            })?;
        tracing::debug!("Built definition {} ({} capabilities)", self.model, extends.len());
        Ok(Definition::from_extends(
            self.zigbee_model,
            &self.model,
            &self.vendor,
            &self.description,
            extends,
        ))
    }
}

/// Parse a JSON array of descriptors and build them all
pub fn definitions_from_json(json: &str) -> Result<Vec<Definition>, ExtendError> {
    let descriptors: Vec<DeviceDescriptor> = serde_json::from_str(json)?;
    descriptors.into_iter().map(DeviceDescriptor::build).collect()
}

/// Definition whose `zigbee_model` list contains `model_id`
#[must_use]
pub fn find_definition<'a>(definitions: &'a [Definition], model_id: &str) -> Option<&'a Definition> {
    definitions
        .iter()
        .find(|d| d.zigbee_model.iter().any(|m| m == model_id))
}
