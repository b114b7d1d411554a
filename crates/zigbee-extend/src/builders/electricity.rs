//! Electricity meter over `haElectricalMeasurement` and `seMetering`
//!
//! Each quantity is scaled by a multiplier/divisor pair. The pair is either
//! forced by the descriptor (written into the session cache, no I/O) or read
//! from the device during configuration. Reportable changes are expressed as
//! a nominal physical change and converted into raw device units with the
//! same pair.

use crate::builders::on_off::state_key;
use crate::converter::{Configure, Decoder, Encode, EncodeMeta, Entity, State};
use crate::endpoint::resolve_endpoints;
use crate::error::ExtendError;
use crate::expose::{access, Expose};
use crate::extend::{DefinitionMeta, Extend};
use crate::reporting::ReportingConfig;
use crate::utils::{number_value, precision_round, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, AttributeMap, CommandOptions, DeviceSession, ReportableChange};

/// Which source clusters the meter uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterCluster {
    /// Power, voltage and current from electrical measurement, energy from metering
    #[default]
    Both,
    Metering,
    Electrical,
}

/// A forced multiplier/divisor pair
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Scaling {
    pub multiplier: f64,
    pub divisor: f64,
}

/// `false` disables a quantity, `true` uses device scaling, a pair forces it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QuantityArg {
    Enabled(bool),
    Forced(Scaling),
}

impl QuantityArg {
    fn enabled(self) -> bool {
        !matches!(self, QuantityArg::Enabled(false))
    }

    fn forced(self) -> Option<Scaling> {
        match self {
            QuantityArg::Forced(scaling) => Some(scaling),
            QuantityArg::Enabled(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElectricityMeterArgs {
    pub cluster: MeterCluster,
    pub power: QuantityArg,
    pub voltage: QuantityArg,
    pub current: QuantityArg,
    pub energy: QuantityArg,
    pub produced_energy: QuantityArg,
    pub ac_frequency: QuantityArg,
    pub power_factor: QuantityArg,
    /// Phase B/C variants of power, voltage and current; absent means single phase
    pub three_phase: Option<bool>,
    pub configure_reporting: bool,
    pub endpoint_names: Option<Vec<String>>,
}

impl Default for ElectricityMeterArgs {
    fn default() -> Self {
        Self {
            cluster: MeterCluster::Both,
            power: QuantityArg::Enabled(true),
            voltage: QuantityArg::Enabled(true),
            current: QuantityArg::Enabled(true),
            energy: QuantityArg::Enabled(true),
            produced_energy: QuantityArg::Enabled(false),
            ac_frequency: QuantityArg::Enabled(false),
            power_factor: QuantityArg::Enabled(false),
            three_phase: None,
            configure_reporting: true,
            endpoint_names: None,
        }
    }
}

/// One reported quantity
#[derive(Debug, Clone)]
struct Quantity {
    key: String,
    cluster: &'static str,
    attribute: String,
    /// Multiplier and divisor attributes; `None` means unscaled
    scaling_attributes: Option<(&'static str, &'static str)>,
    forced: Option<Scaling>,
    unit: &'static str,
    description: String,
    nominal_change: f64,
    /// 48-bit attribute, reportable change sent as `[low, high]`
    wide: bool,
    /// Applied after the multiplier/divisor; metering demand is scaled in kW
    unit_factor: f64,
}

impl Quantity {
    fn expose(&self) -> Expose {
        Expose::numeric(&self.key, access::STATE_GET)
            .with_unit(self.unit)
            .with_description(&self.description)
    }

    /// Multiplier/divisor in effect for decoding: forced, else cached, else 1/1
    fn factor(&self, session: &dyn DeviceSession, endpoint: u8) -> f64 {
        let Some((multiplier_attr, divisor_attr)) = self.scaling_attributes else {
            return self.unit_factor;
        };
        let (multiplier, divisor) = match self.forced {
            Some(scaling) => (scaling.multiplier, scaling.divisor),
            None => {
                let cached = |attr| {
                    session
                        .cluster_attribute(endpoint, self.cluster, attr)
                        .and_then(|v| to_number(&v))
                        .unwrap_or(1.0)
                };
                (cached(multiplier_attr), cached(divisor_attr))
            }
        };
        if multiplier <= 0.0 || divisor <= 0.0 {
            return self.unit_factor;
        }
        multiplier * self.unit_factor / divisor
    }
}

struct QuantitySpec {
    key: &'static str,
    attribute: &'static str,
    unit: &'static str,
    description: &'static str,
    nominal_change: f64,
}

const ELECTRICAL: &[(&str, QuantitySpec, Option<(&str, &str)>)] = &[
    (
        "power",
        QuantitySpec {
            key: "power",
            attribute: "activePower",
            unit: "W",
            description: "Instantaneous measured power",
            nominal_change: 5.0,
        },
        Some(("acPowerMultiplier", "acPowerDivisor")),
    ),
    (
        "voltage",
        QuantitySpec {
            key: "voltage",
            attribute: "rmsVoltage",
            unit: "V",
            description: "Measured electrical potential value",
            nominal_change: 5.0,
        },
        Some(("acVoltageMultiplier", "acVoltageDivisor")),
    ),
    (
        "current",
        QuantitySpec {
            key: "current",
            attribute: "rmsCurrent",
            unit: "A",
            description: "Instantaneous measured electrical current",
            nominal_change: 0.05,
        },
        Some(("acCurrentMultiplier", "acCurrentDivisor")),
    ),
    (
        "ac_frequency",
        QuantitySpec {
            key: "ac_frequency",
            attribute: "acFrequency",
            unit: "Hz",
            description: "Measured electrical AC frequency",
            nominal_change: 1.0,
        },
        Some(("acFrequencyMultiplier", "acFrequencyDivisor")),
    ),
    (
        "power_factor",
        QuantitySpec {
            key: "power_factor",
            attribute: "powerFactor",
            unit: "pf",
            description: "Instantaneous measured power factor",
            nominal_change: 1.0,
        },
        None,
    ),
];

const METERING_SCALING: (&str, &str) = ("multiplier", "divisor");

impl ElectricityMeterArgs {
    fn quantities(&self) -> Vec<Quantity> {
        let mut quantities = Vec::new();
        let electrical = self.cluster != MeterCluster::Metering;
        let metering = self.cluster != MeterCluster::Electrical;
        let three_phase = self.three_phase == Some(true);

        if electrical {
            for (field, spec, scaling) in ELECTRICAL {
                let arg = match *field {
                    "voltage" => self.voltage,
                    "current" => self.current,
                    "ac_frequency" => self.ac_frequency,
                    "power_factor" => self.power_factor,
                    _ => self.power,
                };
                if !arg.enabled() {
                    continue;
                }
                let base = Quantity {
                    key: spec.key.to_string(),
                    cluster: name::ELECTRICAL_MEASUREMENT,
                    attribute: spec.attribute.to_string(),
                    scaling_attributes: *scaling,
                    forced: arg.forced(),
                    unit: spec.unit,
                    description: spec.description.to_string(),
                    nominal_change: spec.nominal_change,
                    wide: false,
                    unit_factor: 1.0,
                };
                let phased = matches!(*field, "power" | "voltage" | "current");
                quantities.push(base.clone());
                if three_phase && phased {
                    for phase in ["b", "c"] {
                        let mut variant = base.clone();
                        variant.key = format!("{}_phase_{phase}", spec.key);
                        variant.attribute = format!("{}Ph{}", spec.attribute, phase.to_uppercase());
                        variant.description = format!("{} (phase {})", spec.description, phase.to_uppercase());
                        quantities.push(variant);
                    }
                }
            }
        }

        if metering {
            let metered = |key: &str,
                           attribute: &str,
                           arg: QuantityArg,
                           unit,
                           description: &str,
                           nominal,
                           wide,
                           unit_factor| {
                arg.enabled().then(|| Quantity {
                    key: key.to_string(),
                    cluster: name::METERING,
                    attribute: attribute.to_string(),
                    scaling_attributes: Some(METERING_SCALING),
                    forced: arg.forced(),
                    unit,
                    description: description.to_string(),
                    nominal_change: nominal,
                    wide,
                    unit_factor,
                })
            };
            if self.cluster == MeterCluster::Metering {
                quantities.extend(metered(
                    "power",
                    "instantaneousDemand",
                    self.power,
                    "W",
                    "Instantaneous measured power",
                    5.0,
                    false,
                    1000.0,
                ));
            }
            quantities.extend(metered(
                "energy",
                "currentSummDelivered",
                self.energy,
                "kWh",
                "Sum of consumed energy",
                0.1,
                true,
                1.0,
            ));
            quantities.extend(metered(
                "produced_energy",
                "currentSummReceived",
                self.produced_energy,
                "kWh",
                "Sum of produced energy",
                0.1,
                true,
                1.0,
            ));
        }
        quantities
    }
}

/// Two forced quantities sharing one multiplier/divisor pair must agree
fn check_forced_scaling(quantities: &[Quantity]) -> Result<(), ExtendError> {
    let mut seen: BTreeMap<(&str, &str), (&str, Scaling)> = BTreeMap::new();
    for quantity in quantities {
        let (Some((multiplier_attr, _)), Some(forced)) = (quantity.scaling_attributes, quantity.forced) else {
            continue;
        };
        match seen.get(&(quantity.cluster, multiplier_attr)) {
            Some((other, scaling)) if *scaling != forced => {
                return Err(ExtendError::Construction(format!(
                    "'{}' and '{}' share the {} multiplier/divisor but are forced to different values",
                    other, quantity.key, quantity.cluster
                )));
            }
            Some(_) => {}
            None => {
                seen.insert((quantity.cluster, multiplier_attr), (quantity.key.as_str(), forced));
            }
        }
    }
    Ok(())
}

/// Raw frame value; 48-bit sums may arrive as a `[high, low]` pair
fn raw_value(value: &Value) -> Option<f64> {
    match value.as_array() {
        Some(parts) if parts.len() == 2 => {
            let high = to_number(&parts[0])?;
            let low = to_number(&parts[1])?;
            Some(high * 4_294_967_296.0 + low)
        }
        _ => to_number(value),
    }
}

/// Per-cluster configuration: bind, settle scaling, configure reporting
struct MeterConfigure {
    cluster: &'static str,
    quantities: Vec<Quantity>,
    configure_reporting: bool,
    endpoint_names: Option<Vec<String>>,
}

impl MeterConfigure {
    /// Force or read every multiplier/divisor pair, returning the values in effect
    async fn settle_scaling(
        &self,
        session: &dyn DeviceSession,
        endpoint: u8,
    ) -> Result<AttributeMap, ExtendError> {
        let mut scaling = AttributeMap::new();
        let mut pairs: Vec<((&str, &str), Option<Scaling>)> = Vec::new();
        for quantity in &self.quantities {
            let Some(pair) = quantity.scaling_attributes else {
                continue;
            };
            match pairs.iter_mut().find(|(p, _)| *p == pair) {
                Some((_, forced)) => *forced = forced.or(quantity.forced),
                None => pairs.push((pair, quantity.forced)),
            }
        }

        for ((multiplier_attr, divisor_attr), forced) in pairs {
            match forced {
                Some(forced) => {
                    let mut values = AttributeMap::new();
                    values.insert(multiplier_attr.to_string(), number_value(forced.multiplier));
                    values.insert(divisor_attr.to_string(), number_value(forced.divisor));
                    session.save_cluster_attributes(endpoint, self.cluster, &values);
                    scaling.extend(values);
                }
                None => {
                    let values = session
                        .read(
                            endpoint,
                            self.cluster,
                            &[Attribute::from(multiplier_attr), Attribute::from(divisor_attr)],
                            &CommandOptions::default(),
                        )
                        .await?;
                    session.save_cluster_attributes(endpoint, self.cluster, &values);
                    scaling.extend(values);
                }
            }
        }
        Ok(scaling)
    }
}

#[async_trait]
impl Configure for MeterConfigure {
    fn name(&self) -> String {
        format!("electricity meter {}", self.cluster)
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
            self.cluster,
        )?;
        for endpoint in endpoints {
            session.bind(endpoint, self.cluster).await?;
            let scaling = self.settle_scaling(session, endpoint).await?;
            if !self.configure_reporting {
                continue;
            }

            let mut items = Vec::new();
            for quantity in &self.quantities {
                let (multiplier, divisor) = match quantity.scaling_attributes {
                    Some((m, d)) => (
                        scaling.get(m).and_then(to_number).unwrap_or(1.0),
                        scaling.get(d).and_then(to_number).unwrap_or(1.0),
                    ),
                    None => (1.0, 1.0),
                };
                if multiplier <= 0.0 || divisor <= 0.0 {
                    tracing::warn!(
                        "Skipping reporting of {} on {} endpoint {}: multiplier {} divisor {}",
                        quantity.key,
                        session.ieee_address(),
                        endpoint,
                        multiplier,
                        divisor
                    );
                    continue;
                }
                let change =
                    (quantity.nominal_change / quantity.unit_factor * divisor / multiplier).round();
                let config = ReportingConfig::new("10_SECONDS", "MAX", change);
                let config = if quantity.wide {
                    config.with_change(ReportableChange::wide(change as u64))
                } else {
                    config
                };
                items.push(config.resolve(Attribute::from(quantity.attribute.as_str()))?);
            }
            if items.is_empty() {
                continue;
            }
            session
                .configure_reporting(endpoint, self.cluster, &items, &CommandOptions::default())
                .await?;
            tracing::debug!(
                "Configured {} reporting item(s) for {} on {} endpoint {}",
                items.len(),
                self.cluster,
                session.ieee_address(),
                endpoint
            );
        }
        Ok(())
    }
}

struct MeterGet {
    keys: Vec<String>,
    quantities: Vec<Quantity>,
}

#[async_trait]
impl Encode for MeterGet {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_set(&self) -> bool {
        false
    }

    fn supports_get(&self) -> bool {
        true
    }

    async fn convert_set(
        &self,
        _entity: &Entity<'_>,
        key: &str,
        _value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        Err(ExtendError::UnknownKey(key.to_string()))
    }

    async fn convert_get(
        &self,
        entity: &Entity<'_>,
        key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        let quantity = self
            .quantities
            .iter()
            .find(|q| q.key == key)
            .ok_or_else(|| ExtendError::UnknownKey(key.to_string()))?;
        entity
            .session
            .read(
                entity.endpoint,
                quantity.cluster,
                &[Attribute::from(quantity.attribute.as_str())],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

fn meter_decoder(cluster: &'static str, quantities: Vec<Quantity>, endpoint_names: Option<Vec<String>>) -> Decoder {
    Decoder::attributes(cluster, move |msg, ctx| {
        let mut state = State::new();
        for quantity in &quantities {
            let Some(raw) = msg.data.get(&quantity.attribute).and_then(raw_value) else {
                continue;
            };
            let key = state_key(&quantity.key, msg, ctx, endpoint_names.as_deref())?;
            let value = precision_round(raw * quantity.factor(ctx.session, msg.endpoint), 2);
            state.insert(key, number_value(value));
        }
        (!state.is_empty()).then_some(state)
    })
}

/// Electricity meter capability
pub fn electricity_meter(args: ElectricityMeterArgs) -> Result<Extend, ExtendError> {
    let quantities = args.quantities();
    if quantities.is_empty() {
        return Err(ExtendError::Construction(
            "electricity meter without any quantity".to_string(),
        ));
    }
    check_forced_scaling(&quantities)?;
    for quantity in &quantities {
        if let Some(forced) = quantity.forced {
            if forced.multiplier <= 0.0 || forced.divisor <= 0.0 {
                tracing::warn!(
                    "Forced scaling of {} is not positive ({}/{}); reporting will be skipped",
                    quantity.key,
                    forced.multiplier,
                    forced.divisor
                );
            }
        }
    }

    let names = args.endpoint_names.as_deref();
    let mut extend = Extend::new();
    for quantity in &quantities {
        let expose = quantity.expose();
        match names {
            Some(names) => {
                for ep in names {
                    extend = extend.with_expose(expose.clone().with_endpoint(ep));
                }
            }
            None => extend = extend.with_expose(expose),
        }
    }

    for cluster in [name::ELECTRICAL_MEASUREMENT, name::METERING] {
        let members: Vec<Quantity> = quantities
            .iter()
            .filter(|q| q.cluster == cluster)
            .cloned()
            .collect();
        if members.is_empty() {
            continue;
        }
        extend = extend
            .with_decoder(meter_decoder(cluster, members.clone(), args.endpoint_names.clone()))
            .with_configure(Arc::new(MeterConfigure {
                cluster,
                quantities: members,
                configure_reporting: args.configure_reporting,
                endpoint_names: args.endpoint_names.clone(),
            }));
    }

    Ok(extend.with_encoder(Arc::new(MeterGet {
        keys: quantities.iter().map(|q| q.key.clone()).collect(),
        quantities,
    })))
}
