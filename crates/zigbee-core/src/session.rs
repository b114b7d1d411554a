//! The device session contract
//!
//! A session is owned by the external stack (transport, addressing, frame
//! serialization). Capability code only reads its metadata and issues
//! cluster I/O through it; every I/O call is a suspension point.

use crate::cluster::{Attribute, CustomCluster};
use crate::device::Endpoint;
use crate::error::SessionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute values keyed by attribute name (or raw id for manufacturer attributes)
pub type AttributeMap = BTreeMap<String, Value>;

/// Per-request ZCL options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOptions {
    pub manufacturer_code: Option<u16>,
    pub disable_default_response: bool,
}

impl CommandOptions {
    #[must_use]
    pub fn manufacturer(code: u16) -> Self {
        Self {
            manufacturer_code: Some(code),
            ..Self::default()
        }
    }
}

/// Reportable change as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportableChange {
    Value(f64),
    /// `[low, high]` 32-bit halves for attributes wider than 32 bits
    Wide([u32; 2]),
}

impl ReportableChange {
    /// Split a 48-bit change into its `[low, high]` halves
    #[must_use]
    pub fn wide(value: u64) -> Self {
        ReportableChange::Wide([(value & 0xFFFF_FFFF) as u32, (value >> 32) as u32])
    }
}

/// One configure-reporting record, with intervals already resolved to seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingItem {
    pub attribute: Attribute,
    pub minimum_report_interval: u16,
    pub maximum_report_interval: u16,
    pub reportable_change: ReportableChange,
}

/// Device session collaborator
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// IEEE address as a display string
    fn ieee_address(&self) -> String;

    fn manufacturer_id(&self) -> Option<u16>;

    fn model_id(&self) -> Option<String>;

    fn software_build_id(&self) -> Option<String>;

    fn hardware_version(&self) -> Option<u8>;

    /// Endpoints in declaration order
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Value from the session-local cluster attribute cache
    fn cluster_attribute(&self, endpoint: u8, cluster: &str, attribute: &str) -> Option<Value>;

    /// Merge values into the session-local cluster attribute cache, no device I/O
    fn save_cluster_attributes(&self, endpoint: u8, cluster: &str, values: &AttributeMap);

    /// Registered vendor-specific clusters
    fn custom_clusters(&self) -> BTreeMap<String, CustomCluster>;

    fn add_custom_cluster(&self, name: &str, cluster: CustomCluster);

    fn meta(&self, key: &str) -> Option<Value>;

    fn set_meta(&self, key: &str, value: Value);

    /// Persist the device record
    async fn save(&self) -> Result<(), SessionError>;

    /// Bind a cluster on an endpoint to the coordinator
    async fn bind(&self, endpoint: u8, cluster: &str) -> Result<(), SessionError>;

    async fn read(
        &self,
        endpoint: u8,
        cluster: &str,
        attributes: &[Attribute],
        options: &CommandOptions,
    ) -> Result<AttributeMap, SessionError>;

    async fn write(
        &self,
        endpoint: u8,
        cluster: &str,
        values: &[(Attribute, Value)],
        options: &CommandOptions,
    ) -> Result<(), SessionError>;

    async fn command(
        &self,
        endpoint: u8,
        cluster: &str,
        command: &str,
        payload: AttributeMap,
        options: &CommandOptions,
    ) -> Result<(), SessionError>;

    async fn configure_reporting(
        &self,
        endpoint: u8,
        cluster: &str,
        items: &[ReportingItem],
        options: &CommandOptions,
    ) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_change_split() {
        assert_eq!(ReportableChange::wide(10), ReportableChange::Wide([10, 0]));
        assert_eq!(
            ReportableChange::wide((1 << 32) + 5),
            ReportableChange::Wide([5, 1])
        );
    }

    #[test]
    fn test_reportable_change_serde() {
        let value: ReportableChange = serde_json::from_str("[0, 10]").unwrap();
        assert_eq!(value, ReportableChange::Wide([0, 10]));
        let value: ReportableChange = serde_json::from_str("0.5").unwrap();
        assert_eq!(value, ReportableChange::Value(0.5));
    }
}
