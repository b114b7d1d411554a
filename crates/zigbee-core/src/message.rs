//! Inbound ZCL frames as delivered by the frame dispatcher

use crate::session::AttributeMap;
use serde::{Deserialize, Serialize};

/// Kind of an inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    AttributeReport,
    ReadResponse,
    /// Cluster-specific command, by command name
    /// (e.g. `commandStatusChangeNotification`)
    #[serde(untagged)]
    Command(String),
}

impl MessageKind {
    #[must_use]
    pub fn command(name: &str) -> Self {
        MessageKind::Command(name.to_string())
    }

    /// Attribute reports and read responses both carry attribute values
    #[must_use]
    pub fn carries_attributes(&self) -> bool {
        matches!(self, MessageKind::AttributeReport | MessageKind::ReadResponse)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Cluster name (e.g. `genOnOff`)
    pub cluster: String,
    pub kind: MessageKind,
    /// Source endpoint ID
    pub endpoint: u8,
    /// Attribute values or command payload fields, by key
    pub data: AttributeMap,
    #[serde(default)]
    pub linkquality: Option<u8>,
    #[serde(default)]
    pub group_id: Option<u16>,
}

impl Message {
    #[must_use]
    pub fn new(cluster: &str, kind: MessageKind, endpoint: u8, data: AttributeMap) -> Self {
        Self {
            cluster: cluster.to_string(),
            kind,
            endpoint,
            data,
            linkquality: None,
            group_id: None,
        }
    }

    /// Convenience constructor for an attribute report
    #[must_use]
    pub fn report(cluster: &str, endpoint: u8, data: AttributeMap) -> Self {
        Self::new(cluster, MessageKind::AttributeReport, endpoint, data)
    }
}
