//! Zigbee device representation

use crate::cluster::{self, CustomCluster};
use crate::session::AttributeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Zigbee device types (network role)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Coordinator,
    Router,
    EndDevice,
}

/// A Zigbee device record, as held by a device session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZigbeeDevice {
    /// IEEE address (EUI-64)
    pub ieee_address: [u8; 8],
    /// Network short address
    pub nwk_address: u16,
    /// Device type (network role)
    pub device_type: DeviceType,
    /// Manufacturer code from the node descriptor
    #[serde(default)]
    pub manufacturer_id: Option<u16>,
    /// Manufacturer name (from Basic cluster)
    pub manufacturer: Option<String>,
    /// Model identifier (from Basic cluster)
    pub model: Option<String>,
    /// Software build id (from Basic cluster)
    #[serde(default)]
    pub software_build_id: Option<String>,
    /// Hardware version (from Basic cluster)
    #[serde(default)]
    pub hardware_version: Option<u8>,
    /// Device endpoints
    pub endpoints: Vec<Endpoint>,
    /// Vendor-specific clusters registered on this device, by name
    #[serde(default)]
    pub custom_clusters: BTreeMap<String, CustomCluster>,
    /// Free-form persisted metadata
    #[serde(default)]
    pub meta: serde_json::Map<String, Value>,
}

impl ZigbeeDevice {
    /// Create a new device with just address info
    #[must_use]
    pub fn new(ieee_address: [u8; 8], nwk_address: u16) -> Self {
        Self {
            ieee_address,
            nwk_address,
            device_type: DeviceType::EndDevice,
            manufacturer_id: None,
            manufacturer: None,
            model: None,
            software_build_id: None,
            hardware_version: None,
            endpoints: Vec::new(),
            custom_clusters: BTreeMap::new(),
            meta: serde_json::Map::new(),
        }
    }

    /// Get IEEE address as hex string
    #[must_use]
    pub fn ieee_address_string(&self) -> String {
        self.ieee_address
            .iter()
            .rev() // IEEE addresses are typically displayed in reverse byte order
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    #[must_use]
    pub fn endpoint(&self, id: u8) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == id)
    }

    pub fn endpoint_mut(&mut self, id: u8) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|ep| ep.id == id)
    }
}

/// A device endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint ID (1-240)
    pub id: u8,
    /// Profile ID (e.g., 0x0104 for Home Automation)
    pub profile_id: u16,
    /// Device ID within the profile
    pub device_id: u16,
    /// Input (server) clusters
    pub in_clusters: Vec<u16>,
    /// Output (client) clusters
    pub out_clusters: Vec<u16>,
    /// Last known attribute values, per cluster name
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeMap>,
}

impl Endpoint {
    #[must_use]
    pub fn new(id: u8, in_clusters: Vec<u16>, out_clusters: Vec<u16>) -> Self {
        Self {
            id,
            profile_id: 0x0104,
            device_id: 0,
            in_clusters,
            out_clusters,
            attributes: BTreeMap::new(),
        }
    }

    /// Check if endpoint has a specific cluster
    #[must_use]
    pub fn has_cluster(&self, cluster_id: u16) -> bool {
        self.in_clusters.contains(&cluster_id) || self.out_clusters.contains(&cluster_id)
    }

    /// Check if endpoint declares the named cluster as an input (server) cluster
    #[must_use]
    pub fn supports_input_cluster(&self, cluster_name: &str) -> bool {
        cluster::cluster_id(cluster_name).is_some_and(|id| self.in_clusters.contains(&id))
    }

    /// Cached attribute value
    #[must_use]
    pub fn cluster_attribute(&self, cluster: &str, attribute: &str) -> Option<&Value> {
        self.attributes.get(cluster).and_then(|attrs| attrs.get(attribute))
    }

    /// Merge values into the attribute cache
    pub fn save_cluster_attributes(&mut self, cluster: &str, values: &AttributeMap) {
        let cache = self.attributes.entry(cluster.to_string()).or_default();
        for (key, value) in values {
            cache.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::id;
    use serde_json::json;

    #[test]
    fn test_ieee_address_string() {
        let device = ZigbeeDevice::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08], 0x1234);
        assert_eq!(device.ieee_address_string(), "08:07:06:05:04:03:02:01");
    }

    #[test]
    fn test_supports_input_cluster() {
        let ep = Endpoint::new(1, vec![id::ON_OFF], vec![id::LEVEL_CONTROL]);
        assert!(ep.supports_input_cluster("genOnOff"));
        assert!(!ep.supports_input_cluster("genLevelCtrl"));
        assert!(!ep.supports_input_cluster("manuSpecificVendor"));
    }

    #[test]
    fn test_attribute_cache_merges() {
        let mut ep = Endpoint::new(1, vec![id::METERING], vec![]);
        let mut first = AttributeMap::new();
        first.insert("divisor".to_string(), json!(1000));
        ep.save_cluster_attributes("seMetering", &first);

        let mut second = AttributeMap::new();
        second.insert("multiplier".to_string(), json!(1));
        ep.save_cluster_attributes("seMetering", &second);

        assert_eq!(ep.cluster_attribute("seMetering", "divisor"), Some(&json!(1000)));
        assert_eq!(ep.cluster_attribute("seMetering", "multiplier"), Some(&json!(1)));
        assert_eq!(ep.cluster_attribute("genOnOff", "onOff"), None);
    }
}
