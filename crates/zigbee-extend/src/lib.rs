//! Capability composition for Zigbee devices
//!
//! Device support is declared as a list of capabilities (on/off, light,
//! electricity meter, IAS zone, battery, ...). Each capability builder
//! produces the exposed state entries, the inbound decoders, the outbound
//! encoders and the configuration steps it needs, and a [`Definition`]
//! concatenates them into one runtime for a device model.

pub mod builders;
pub mod converter;
pub mod definition;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod expose;
pub mod extend;
pub mod lookup;
pub mod options;
pub mod reporting;
pub mod store;
pub mod utils;

pub use converter::{Configure, Decoder, Encode, Publisher, State, StateUpdate};
pub use definition::{Definition, Runtime};
pub use descriptor::{definitions_from_json, find_definition, Capability, DeviceDescriptor};
pub use endpoint::{device_endpoints, resolve_endpoints, DeviceEndpointsArgs};
pub use error::ExtendError;
pub use expose::{Access, Expose};
pub use extend::{DefinitionMeta, Extend};
pub use lookup::Lookup;
pub use options::DeviceOptions;
pub use reporting::{Interval, ReportingConfig};
pub use store::{EntityKey, EphemeralStore};
