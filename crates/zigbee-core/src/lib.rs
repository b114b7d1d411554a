//! Zigbee abstraction layer
//!
//! This crate provides the ZCL vocabulary, the device record and the
//! device-session contract that capability code talks to, plus an
//! in-memory session for simulation and tests.

pub mod cluster;
pub mod device;
pub mod error;
pub mod memory;
pub mod message;
pub mod persistence;
pub mod session;

pub use cluster::{Attribute, CustomCluster, DataType};
pub use device::{DeviceType, Endpoint, ZigbeeDevice};
pub use error::{SessionError, ZclStatus};
pub use memory::MemoryDevice;
pub use message::{Message, MessageKind};
pub use session::{AttributeMap, CommandOptions, DeviceSession, ReportableChange, ReportingItem};
