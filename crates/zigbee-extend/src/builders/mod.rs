//! Capability builders
//!
//! Each builder takes a serde-deserializable argument record and returns an
//! [`Extend`](crate::extend::Extend) carrying exposes, converters and
//! configuration steps for one capability.

pub mod battery;
pub mod covering;
pub mod custom_cluster;
pub mod electricity;
pub mod generic;
pub mod ias;
pub mod identify;
pub mod light;
pub mod lock;
pub mod on_off;
pub mod sensors;

pub use battery::{battery, BatteryArgs, VoltageCurve};
pub use covering::{window_covering, CoverControl, WindowCoveringArgs};
pub use custom_cluster::{device_add_custom_cluster, DeviceAddCustomClusterArgs};
pub use electricity::{electricity_meter, ElectricityMeterArgs, MeterCluster, Scaling};
pub use generic::{
    action_enum_lookup, binary, enum_lookup, numeric, ActionEnumLookupArgs, BinaryArgs,
    EnumLookupArgs, NumericArgs, Scale,
};
pub use ias::{ias_warning, ias_zone_alarm, IasWarningArgs, IasZoneArgs, ZoneAttribute, ZoneType};
pub use identify::{identify, IdentifyArgs};
pub use light::{light, LightArgs};
pub use lock::{lock, LockArgs};
pub use on_off::{on_off, OnOffArgs};
pub use sensors::{
    co2, device_temperature, flow, humidity, illuminance, occupancy, pm25, pressure,
    soil_moisture, temperature, OccupancyArgs, SensorArgs,
};
