//! Endpoint resolution and endpoint-qualified state keys

use crate::error::ExtendError;
use crate::extend::{DefinitionMeta, Extend};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zigbee_core::DeviceSession;

/// Resolve the endpoints a capability binds, reads and configures against.
///
/// Explicit names map through the named-endpoint table. Without names the
/// first endpoint declaring `cluster` as an input cluster is used, falling
/// back to the first endpoint.
pub fn resolve_endpoints(
    session: &dyn DeviceSession,
    names: Option<&[String]>,
    endpoint_map: Option<&BTreeMap<String, u8>>,
    cluster: &str,
) -> Result<Vec<u8>, ExtendError> {
    if let Some(names) = names {
        return names
            .iter()
            .map(|name| {
                endpoint_map
                    .and_then(|map| map.get(name))
                    .copied()
                    .ok_or_else(|| ExtendError::UnknownEndpoint(name.clone()))
            })
            .collect();
    }

    let endpoints = session.endpoints();
    let endpoint = endpoints
        .iter()
        .find(|ep| ep.supports_input_cluster(cluster))
        .or_else(|| endpoints.first())
        .ok_or_else(|| ExtendError::NoEndpoint(session.ieee_address()))?;
    Ok(vec![endpoint.id])
}

/// Default endpoint for requests that do not name one
pub fn default_endpoint(session: &dyn DeviceSession) -> Result<u8, ExtendError> {
    session
        .endpoints()
        .first()
        .map(|ep| ep.id)
        .ok_or_else(|| ExtendError::NoEndpoint(session.ieee_address()))
}

/// Name of an endpoint in the named-endpoint table
#[must_use]
pub fn endpoint_name(endpoint_id: u8, endpoint_map: Option<&BTreeMap<String, u8>>) -> Option<String> {
    endpoint_map?
        .iter()
        .find(|(_, id)| **id == endpoint_id)
        .map(|(name, _)| name.clone())
}

/// `state` -> `state_l1` on multi-endpoint devices
#[must_use]
pub fn postfix_with_endpoint_name(key: &str, endpoint_id: u8, meta: &DefinitionMeta) -> String {
    if !meta.multi_endpoint {
        return key.to_string();
    }
    match endpoint_name(endpoint_id, meta.endpoints.as_ref()) {
        Some(name) => format!("{key}_{name}"),
        None => key.to_string(),
    }
}

/// Split `state_l1` into `state` and `l1` when `l1` is a known endpoint name
#[must_use]
pub fn split_endpoint_key(
    key: &str,
    endpoint_map: Option<&BTreeMap<String, u8>>,
) -> (String, Option<String>) {
    if let Some(map) = endpoint_map {
        for name in map.keys() {
            if let Some(base) = key.strip_suffix(&format!("_{name}")) {
                if !base.is_empty() {
                    return (base.to_string(), Some(name.clone()));
                }
            }
        }
    }
    (key.to_string(), None)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceEndpointsArgs {
    pub endpoints: BTreeMap<String, u8>,
    /// Qualify published keys with endpoint names (default true)
    pub multi_endpoint: Option<bool>,
}

/// Declare the named-endpoint table of a device
#[must_use]
pub fn device_endpoints(args: DeviceEndpointsArgs) -> Extend {
    let mut extend = Extend::new();
    extend.meta.multi_endpoint = args.multi_endpoint.unwrap_or(true);
    extend.meta.endpoints = Some(args.endpoints);
    extend
}
