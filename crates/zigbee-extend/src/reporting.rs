//! Reporting configuration and the shared configuration steps
//!
//! Reporting records name their intervals either in raw seconds or through
//! a fixed table of symbolic spans. Records are resolved into wire-ready
//! [`ReportingItem`]s before any configure-reporting call.

use crate::converter::Configure;
use crate::endpoint::resolve_endpoints;
use crate::error::ExtendError;
use crate::extend::DefinitionMeta;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zigbee_core::{Attribute, CommandOptions, DeviceSession, ReportableChange, ReportingItem};

/// Symbolic reporting spans, in seconds
const INTERVALS: &[(&str, u16)] = &[
    ("MIN", 0),
    ("1_SECOND", 1),
    ("5_SECONDS", 5),
    ("10_SECONDS", 10),
    ("1_MINUTE", 60),
    ("2_MINUTES", 120),
    ("5_MINUTES", 300),
    ("30_MINUTES", 1800),
    ("1_HOUR", 3600),
    ("4_HOURS", 14400),
    ("MAX", 65000),
];

/// A reporting interval, raw seconds or a symbolic span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Interval {
    Seconds(u16),
    Named(String),
}

impl Interval {
    /// Resolve to seconds
    pub fn resolve(&self) -> Result<u16, ExtendError> {
        match self {
            Interval::Seconds(seconds) => Ok(*seconds),
            Interval::Named(name) => INTERVALS
                .iter()
                .find(|(symbol, _)| symbol == name)
                .map(|(_, seconds)| *seconds)
                .ok_or_else(|| ExtendError::UnknownInterval(name.clone())),
        }
    }
}

impl From<u16> for Interval {
    fn from(seconds: u16) -> Self {
        Interval::Seconds(seconds)
    }
}

impl From<&str> for Interval {
    fn from(name: &str) -> Self {
        Interval::Named(name.to_string())
    }
}

/// A reporting record as written in capability descriptors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub min: Interval,
    pub max: Interval,
    pub change: ReportableChange,
}

impl ReportingConfig {
    #[must_use]
    pub fn new(min: impl Into<Interval>, max: impl Into<Interval>, change: f64) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
            change: ReportableChange::Value(change),
        }
    }

    /// Same intervals, different change
    #[must_use]
    pub fn with_change(&self, change: ReportableChange) -> Self {
        Self {
            change,
            ..self.clone()
        }
    }

    /// Check the record without producing a wire item
    pub fn validate(&self, attribute: &str) -> Result<(), ExtendError> {
        let min = self.min.resolve()?;
        let max = self.max.resolve()?;
        if min > max {
            return Err(ExtendError::InvalidReporting {
                attribute: attribute.to_string(),
                reason: format!("minimum interval {min}s exceeds maximum {max}s"),
            });
        }
        if let ReportableChange::Value(change) = self.change {
            if !change.is_finite() || change < 0.0 {
                return Err(ExtendError::InvalidReporting {
                    attribute: attribute.to_string(),
                    reason: format!("reportable change {change} must be a non-negative number"),
                });
            }
        }
        Ok(())
    }

    /// Resolve into a wire-ready record for `attribute`
    pub fn resolve(&self, attribute: Attribute) -> Result<ReportingItem, ExtendError> {
        self.validate(&attribute.key())?;
        Ok(ReportingItem {
            attribute,
            minimum_report_interval: self.min.resolve()?,
            maximum_report_interval: self.max.resolve()?,
            reportable_change: self.change,
        })
    }
}

/// Read once and swallow unsupported-attribute failures; everything else propagates
pub(crate) async fn read_best_effort(
    session: &dyn DeviceSession,
    endpoint: u8,
    cluster: &str,
    attributes: &[Attribute],
    options: &CommandOptions,
) -> Result<(), ExtendError> {
    match session.read(endpoint, cluster, attributes, options).await {
        Ok(_) => Ok(()),
        Err(e) if e.is_unsupported_attribute() => {
            tracing::debug!(
                "Optional read of {}/{:?} on {} endpoint {} not supported: {}",
                cluster,
                attributes.iter().map(Attribute::key).collect::<Vec<_>>(),
                session.ieee_address(),
                endpoint,
                e
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Bind, configure reporting, then optionally read once, per resolved endpoint
#[derive(Debug, Clone)]
pub struct ReportingStep {
    cluster: String,
    items: Vec<(Attribute, ReportingConfig)>,
    read: Vec<Attribute>,
    endpoint_names: Option<Vec<String>>,
    options: CommandOptions,
}

#[async_trait]
impl Configure for ReportingStep {
    fn name(&self) -> String {
        format!("reporting {}", self.cluster)
    }

    async fn configure(
        &self,
        session: &dyn DeviceSession,
        meta: &DefinitionMeta,
    ) -> Result<(), ExtendError> {
        let endpoints = resolve_endpoints(
            session,
            self.endpoint_names.as_deref(),
            meta.endpoints.as_ref(),
            &self.cluster,
        )?;
        let items = self
            .items
            .iter()
            .map(|(attribute, config)| config.resolve(attribute.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        for endpoint in endpoints {
            if !items.is_empty() {
                session.bind(endpoint, &self.cluster).await?;
                session
                    .configure_reporting(endpoint, &self.cluster, &items, &self.options)
                    .await?;
                tracing::debug!(
                    "Configured reporting for {} on {} endpoint {}",
                    self.cluster,
                    session.ieee_address(),
                    endpoint
                );
            }
            if !self.read.is_empty() {
                read_best_effort(session, endpoint, &self.cluster, &self.read, &self.options)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Reporting step for one attribute.
///
/// Returns `None` when there is nothing to do: no reporting record and the
/// leaf is not get-capable. The record is validated here so a bad span is a
/// construction error rather than a configure-time failure.
pub fn setup_configure_for_reporting(
    cluster: &str,
    attribute: Attribute,
    config: Option<&ReportingConfig>,
    access: u8,
    endpoint_names: Option<&[String]>,
    options: &CommandOptions,
) -> Result<Option<Arc<dyn Configure>>, ExtendError> {
    let readable = access & crate::expose::access::GET != 0;
    if config.is_none() && !readable {
        return Ok(None);
    }
    let items = match config {
        Some(config) => {
            config.validate(&attribute.key())?;
            vec![(attribute.clone(), config.clone())]
        }
        None => Vec::new(),
    };
    Ok(Some(Arc::new(ReportingStep {
        cluster: cluster.to_string(),
        items,
        read: if readable { vec![attribute] } else { Vec::new() },
        endpoint_names: endpoint_names.map(<[String]>::to_vec),
        options: options.clone(),
    })))
}

/// Bind a cluster on every resolved endpoint
#[derive(Debug, Clone)]
pub struct BindStep {
    cluster: String,
    endpoint_names: Option<Vec<String>>,
}

#[async_trait]
impl Configure for BindStep {
    fn name(&self) -> String {
        format!("bind {}", self.cluster)
    }

    async fn configure(
        &self,
        session: &dyn DeviceSession,
        meta: &DefinitionMeta,
    ) -> Result<(), ExtendError> {
        let endpoints = resolve_endpoints(
            session,
            self.endpoint_names.as_deref(),
            meta.endpoints.as_ref(),
            &self.cluster,
        )?;
        for endpoint in endpoints {
            session.bind(endpoint, &self.cluster).await?;
        }
        Ok(())
    }
}

#[must_use]
pub fn setup_configure_for_binding(
    cluster: &str,
    endpoint_names: Option<&[String]>,
) -> Arc<dyn Configure> {
    Arc::new(BindStep {
        cluster: cluster.to_string(),
        endpoint_names: endpoint_names.map(<[String]>::to_vec),
    })
}

/// Best-effort one-time read on every resolved endpoint
#[derive(Debug, Clone)]
pub struct ReadStep {
    cluster: String,
    attributes: Vec<Attribute>,
    endpoint_names: Option<Vec<String>>,
    options: CommandOptions,
}

#[async_trait]
impl Configure for ReadStep {
    fn name(&self) -> String {
        format!("read {}", self.cluster)
    }

    async fn configure(
        &self,
        session: &dyn DeviceSession,
        meta: &DefinitionMeta,
    ) -> Result<(), ExtendError> {
        let endpoints = resolve_endpoints(
            session,
            self.endpoint_names.as_deref(),
            meta.endpoints.as_ref(),
            &self.cluster,
        )?;
        for endpoint in endpoints {
            read_best_effort(session, endpoint, &self.cluster, &self.attributes, &self.options)
                .await?;
        }
        Ok(())
    }
}

#[must_use]
pub fn setup_configure_for_reading(
    cluster: &str,
    attributes: Vec<Attribute>,
    endpoint_names: Option<&[String]>,
    options: &CommandOptions,
) -> Arc<dyn Configure> {
    Arc::new(ReadStep {
        cluster: cluster.to_string(),
        attributes,
        endpoint_names: endpoint_names.map(<[String]>::to_vec),
        options: options.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expose::access;
    use serde_json::json;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::{CallKind, Failure, SessionCall};
    use zigbee_core::{Endpoint, MemoryDevice, ZigbeeDevice};

    fn sensor() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([1, 0, 0, 0, 0, 0, 0, 0], 0x0001);
        device.endpoints.push(Endpoint::new(
            1,
            vec![id::TEMPERATURE_MEASUREMENT, id::POWER_CONFIG],
            vec![],
        ));
        MemoryDevice::new(device)
    }

    #[test]
    fn test_symbolic_intervals_resolve_stably() {
        for (symbol, seconds) in INTERVALS {
            let interval = Interval::from(*symbol);
            assert_eq!(interval.resolve().unwrap(), *seconds);
            assert_eq!(interval.resolve().unwrap(), interval.resolve().unwrap());
        }
        assert_eq!(Interval::Seconds(42).resolve().unwrap(), 42);
    }

    #[test]
    fn test_unknown_interval_rejected() {
        for bad in ["2_HOURS", "max", "", "1_SECONDS"] {
            let err = Interval::from(bad).resolve().unwrap_err();
            assert!(matches!(err, ExtendError::UnknownInterval(_)));
        }
    }

    #[test]
    fn test_resolve_record() {
        let config = ReportingConfig::new("10_SECONDS", "1_HOUR", 100.0);
        let item = config.resolve(Attribute::from("measuredValue")).unwrap();
        assert_eq!(item.minimum_report_interval, 10);
        assert_eq!(item.maximum_report_interval, 3600);
        assert_eq!(item.reportable_change, ReportableChange::Value(100.0));
    }

    #[test]
    fn test_invariants_enforced() {
        let inverted = ReportingConfig::new("1_HOUR", "10_SECONDS", 1.0);
        assert!(matches!(
            inverted.validate("measuredValue"),
            Err(ExtendError::InvalidReporting { .. })
        ));

        let negative = ReportingConfig::new(0u16, "MAX", -1.0);
        assert!(matches!(
            negative.validate("measuredValue"),
            Err(ExtendError::InvalidReporting { .. })
        ));
    }

    #[test]
    fn test_deserialize_mixed_record() {
        let config: ReportingConfig =
            serde_json::from_value(json!({"min": 0, "max": "MAX", "change": [10, 0]})).unwrap();
        assert_eq!(config.min, Interval::Seconds(0));
        assert_eq!(config.max, Interval::Named("MAX".to_string()));
        assert_eq!(config.change, ReportableChange::Wide([10, 0]));
    }

    #[tokio::test]
    async fn test_reporting_step_binds_configures_and_reads() {
        let session = sensor();
        let step = setup_configure_for_reporting(
            "msTemperatureMeasurement",
            Attribute::from("measuredValue"),
            Some(&ReportingConfig::new("10_SECONDS", "1_HOUR", 100.0)),
            access::STATE_GET,
            None,
            &CommandOptions::default(),
        )
        .unwrap()
        .unwrap();

        step.configure(&session, &DefinitionMeta::default())
            .await
            .unwrap();

        let calls = session.calls();
        assert!(matches!(&calls[0], SessionCall::Bind { endpoint: 1, .. }));
        assert!(matches!(&calls[1], SessionCall::ConfigureReporting { .. }));
        assert!(matches!(&calls[2], SessionCall::Read { .. }));
    }

    #[test]
    fn test_nothing_to_do_for_state_only_leaf() {
        let step = setup_configure_for_reporting(
            "msTemperatureMeasurement",
            Attribute::from("measuredValue"),
            None,
            access::STATE,
            None,
            &CommandOptions::default(),
        )
        .unwrap();
        assert!(step.is_none());
    }

    #[tokio::test]
    async fn test_read_step_swallows_only_unsupported() {
        let session = sensor();
        session.fail(
            CallKind::Read,
            "genPowerCfg",
            Some("batteryVoltage"),
            Failure::UnsupportedAttribute,
        );
        let step = setup_configure_for_reading(
            "genPowerCfg",
            vec![Attribute::from("batteryVoltage")],
            None,
            &CommandOptions::default(),
        );
        step.configure(&session, &DefinitionMeta::default())
            .await
            .unwrap();

        let session = sensor();
        session.fail(CallKind::Read, "genPowerCfg", None, Failure::Timeout);
        let err = step
            .configure(&session, &DefinitionMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtendError::Session(zigbee_core::SessionError::Timeout)
        ));
    }
}
