//! In-memory device session
//!
//! `MemoryDevice` keeps a device record, a device-side attribute table and a
//! call log. It answers reads from the attribute table, records every I/O
//! call, and can be told to fail specific calls, which makes it the session
//! double for simulation and tests.

use crate::cluster::{Attribute, CustomCluster};
use crate::device::{Endpoint, ZigbeeDevice};
use crate::error::SessionError;
use crate::persistence;
use crate::session::{AttributeMap, CommandOptions, DeviceSession, ReportingItem};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Kind of session call, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Bind,
    Read,
    Write,
    Command,
    ConfigureReporting,
}

/// A recorded session call
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Save,
    Bind {
        endpoint: u8,
        cluster: String,
    },
    Read {
        endpoint: u8,
        cluster: String,
        attributes: Vec<String>,
    },
    Write {
        endpoint: u8,
        cluster: String,
        values: Vec<(String, Value)>,
    },
    Command {
        endpoint: u8,
        cluster: String,
        command: String,
        payload: AttributeMap,
    },
    ConfigureReporting {
        endpoint: u8,
        cluster: String,
        items: Vec<ReportingItem>,
    },
}

impl SessionCall {
    #[must_use]
    pub fn cluster(&self) -> Option<&str> {
        match self {
            SessionCall::Save => None,
            SessionCall::Bind { cluster, .. }
            | SessionCall::Read { cluster, .. }
            | SessionCall::Write { cluster, .. }
            | SessionCall::Command { cluster, .. }
            | SessionCall::ConfigureReporting { cluster, .. } => Some(cluster),
        }
    }
}

/// Failure returned by an injected rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    UnsupportedAttribute,
    Timeout,
}

#[derive(Debug, Clone)]
struct FailureRule {
    kind: CallKind,
    cluster: String,
    /// Attribute key or command name; `None` matches any
    target: Option<String>,
    failure: Failure,
}

impl FailureRule {
    fn matches(&self, kind: CallKind, cluster: &str, targets: &[String]) -> bool {
        self.kind == kind
            && self.cluster == cluster
            && self
                .target
                .as_ref()
                .map_or(true, |target| targets.iter().any(|t| t == target))
    }

    fn error(&self) -> SessionError {
        match self.failure {
            Failure::UnsupportedAttribute => SessionError::UnsupportedAttribute {
                cluster: self.cluster.clone(),
                attribute: self.target.clone().unwrap_or_default(),
            },
            Failure::Timeout => SessionError::Timeout,
        }
    }
}

#[derive(Debug)]
struct Inner {
    device: ZigbeeDevice,
    /// Device-side attribute values, by endpoint and cluster
    values: BTreeMap<(u8, String), AttributeMap>,
    failures: Vec<FailureRule>,
    calls: Vec<SessionCall>,
}

/// In-memory device session
#[derive(Debug)]
pub struct MemoryDevice {
    inner: Mutex<Inner>,
    data_path: Option<PathBuf>,
}

impl MemoryDevice {
    #[must_use]
    pub fn new(device: ZigbeeDevice) -> Self {
        Self {
            inner: Mutex::new(Inner {
                device,
                values: BTreeMap::new(),
                failures: Vec::new(),
                calls: Vec::new(),
            }),
            data_path: None,
        }
    }

    /// Session persisted under `data_dir`. A stored record for the same
    /// address replaces `device`, so registered clusters and meta survive.
    pub async fn open(data_dir: &Path, device: ZigbeeDevice) -> Self {
        let path = persistence::device_file(data_dir, &device);
        let device = persistence::load_device(&path).await.unwrap_or(device);
        Self::new(device).with_data_path(path)
    }

    /// [`MemoryDevice::open`] under `DATA_DIR`
    pub async fn open_default(device: ZigbeeDevice) -> Self {
        Self::open(&persistence::data_path(), device).await
    }

    /// Persist the device record to `path` on `save`
    #[must_use]
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set a device-side attribute value
    pub fn set_value(&self, endpoint: u8, cluster: &str, attribute: &str, value: Value) {
        self.lock()
            .values
            .entry((endpoint, cluster.to_string()))
            .or_default()
            .insert(attribute.to_string(), value);
    }

    /// Device-side attribute value
    #[must_use]
    pub fn value(&self, endpoint: u8, cluster: &str, attribute: &str) -> Option<Value> {
        self.lock()
            .values
            .get(&(endpoint, cluster.to_string()))
            .and_then(|attrs| attrs.get(attribute))
            .cloned()
    }

    /// Fail every matching call. `target` is an attribute key for reads,
    /// writes and reporting, a command name for commands.
    pub fn fail(&self, kind: CallKind, cluster: &str, target: Option<&str>, failure: Failure) {
        self.lock().failures.push(FailureRule {
            kind,
            cluster: cluster.to_string(),
            target: target.map(str::to_string),
            failure,
        });
    }

    /// Recorded calls, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Snapshot of the device record
    #[must_use]
    pub fn device(&self) -> ZigbeeDevice {
        self.lock().device.clone()
    }

    fn check(
        inner: &Inner,
        kind: CallKind,
        cluster: &str,
        targets: &[String],
    ) -> Result<(), SessionError> {
        match inner
            .failures
            .iter()
            .find(|rule| rule.matches(kind, cluster, targets))
        {
            Some(rule) => Err(rule.error()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceSession for MemoryDevice {
    fn ieee_address(&self) -> String {
        self.lock().device.ieee_address_string()
    }

    fn manufacturer_id(&self) -> Option<u16> {
        self.lock().device.manufacturer_id
    }

    fn model_id(&self) -> Option<String> {
        self.lock().device.model.clone()
    }

    fn software_build_id(&self) -> Option<String> {
        self.lock().device.software_build_id.clone()
    }

    fn hardware_version(&self) -> Option<u8> {
        self.lock().device.hardware_version
    }

    fn endpoints(&self) -> Vec<Endpoint> {
        self.lock().device.endpoints.clone()
    }

    fn cluster_attribute(&self, endpoint: u8, cluster: &str, attribute: &str) -> Option<Value> {
        self.lock()
            .device
            .endpoint(endpoint)
            .and_then(|ep| ep.cluster_attribute(cluster, attribute))
            .cloned()
    }

    fn save_cluster_attributes(&self, endpoint: u8, cluster: &str, values: &AttributeMap) {
        if let Some(ep) = self.lock().device.endpoint_mut(endpoint) {
            ep.save_cluster_attributes(cluster, values);
        }
    }

    fn custom_clusters(&self) -> BTreeMap<String, CustomCluster> {
        self.lock().device.custom_clusters.clone()
    }

    fn add_custom_cluster(&self, name: &str, cluster: CustomCluster) {
        self.lock()
            .device
            .custom_clusters
            .insert(name.to_string(), cluster);
    }

    fn meta(&self, key: &str) -> Option<Value> {
        self.lock().device.meta.get(key).cloned()
    }

    fn set_meta(&self, key: &str, value: Value) {
        self.lock().device.meta.insert(key.to_string(), value);
    }

    async fn save(&self) -> Result<(), SessionError> {
        let device = {
            let mut inner = self.lock();
            inner.calls.push(SessionCall::Save);
            inner.device.clone()
        };
        if let Some(path) = &self.data_path {
            persistence::save_device(path, &device).await?;
        }
        Ok(())
    }

    async fn bind(&self, endpoint: u8, cluster: &str) -> Result<(), SessionError> {
        let mut inner = self.lock();
        inner.calls.push(SessionCall::Bind {
            endpoint,
            cluster: cluster.to_string(),
        });
        Self::check(&inner, CallKind::Bind, cluster, &[])?;
        if inner.device.endpoint(endpoint).is_none() {
            return Err(SessionError::EndpointNotFound(endpoint));
        }
        Ok(())
    }

    async fn read(
        &self,
        endpoint: u8,
        cluster: &str,
        attributes: &[Attribute],
        _options: &CommandOptions,
    ) -> Result<AttributeMap, SessionError> {
        let keys: Vec<String> = attributes.iter().map(Attribute::key).collect();
        let mut inner = self.lock();
        inner.calls.push(SessionCall::Read {
            endpoint,
            cluster: cluster.to_string(),
            attributes: keys.clone(),
        });
        Self::check(&inner, CallKind::Read, cluster, &keys)?;
        if inner.device.endpoint(endpoint).is_none() {
            return Err(SessionError::EndpointNotFound(endpoint));
        }

        let mut result = AttributeMap::new();
        if let Some(values) = inner.values.get(&(endpoint, cluster.to_string())) {
            for key in &keys {
                if let Some(value) = values.get(key) {
                    result.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(ep) = inner.device.endpoint_mut(endpoint) {
            ep.save_cluster_attributes(cluster, &result);
        }
        Ok(result)
    }

    async fn write(
        &self,
        endpoint: u8,
        cluster: &str,
        values: &[(Attribute, Value)],
        _options: &CommandOptions,
    ) -> Result<(), SessionError> {
        let entries: Vec<(String, Value)> = values
            .iter()
            .map(|(attribute, value)| (attribute.key(), value.clone()))
            .collect();
        let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let mut inner = self.lock();
        inner.calls.push(SessionCall::Write {
            endpoint,
            cluster: cluster.to_string(),
            values: entries.clone(),
        });
        Self::check(&inner, CallKind::Write, cluster, &keys)?;
        if inner.device.endpoint(endpoint).is_none() {
            return Err(SessionError::EndpointNotFound(endpoint));
        }

        let written: AttributeMap = entries.into_iter().collect();
        inner
            .values
            .entry((endpoint, cluster.to_string()))
            .or_default()
            .extend(written.clone());
        if let Some(ep) = inner.device.endpoint_mut(endpoint) {
            ep.save_cluster_attributes(cluster, &written);
        }
        Ok(())
    }

    async fn command(
        &self,
        endpoint: u8,
        cluster: &str,
        command: &str,
        payload: AttributeMap,
        _options: &CommandOptions,
    ) -> Result<(), SessionError> {
        let mut inner = self.lock();
        inner.calls.push(SessionCall::Command {
            endpoint,
            cluster: cluster.to_string(),
            command: command.to_string(),
            payload,
        });
        Self::check(&inner, CallKind::Command, cluster, &[command.to_string()])?;
        if inner.device.endpoint(endpoint).is_none() {
            return Err(SessionError::EndpointNotFound(endpoint));
        }
        Ok(())
    }

    async fn configure_reporting(
        &self,
        endpoint: u8,
        cluster: &str,
        items: &[ReportingItem],
        _options: &CommandOptions,
    ) -> Result<(), SessionError> {
        let keys: Vec<String> = items.iter().map(|item| item.attribute.key()).collect();
        let mut inner = self.lock();
        inner.calls.push(SessionCall::ConfigureReporting {
            endpoint,
            cluster: cluster.to_string(),
            items: items.to_vec(),
        });
        Self::check(&inner, CallKind::ConfigureReporting, cluster, &keys)?;
        if inner.device.endpoint(endpoint).is_none() {
            return Err(SessionError::EndpointNotFound(endpoint));
        }
        Ok(())
    }
}
