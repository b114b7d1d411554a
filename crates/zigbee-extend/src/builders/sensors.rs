//! Measurement sensors on top of the numeric converter pair

use crate::builders::generic::{
    frame_endpoint, numeric, per_endpoint, property_for, NumericArgs, Scale, ScaleDirection,
};
use crate::converter::{state_of, Decoder, Encode, EncodeMeta, Entity, State, StateUpdate};
use crate::error::ExtendError;
use crate::expose::{access, Access, Category, Expose};
use crate::extend::Extend;
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{precision_round, to_bitmap, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, CommandOptions};

/// Overrides shared by all sensor builders
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorArgs {
    pub endpoint_names: Option<Vec<String>>,
    /// Configure reporting (default true)
    pub reporting: bool,
    /// Replace the builder's default reporting record
    pub reporting_config: Option<ReportingConfig>,
    pub access: Option<Access>,
    pub description: Option<String>,
}

impl Default for SensorArgs {
    fn default() -> Self {
        Self {
            endpoint_names: None,
            reporting: true,
            reporting_config: None,
            access: None,
            description: None,
        }
    }
}

impl SensorArgs {
    fn apply(&self, mut base: NumericArgs) -> NumericArgs {
        base.endpoint_names = self.endpoint_names.clone();
        if !self.reporting {
            base.reporting = None;
        } else if let Some(config) = &self.reporting_config {
            base.reporting = Some(config.clone());
        }
        if let Some(access) = self.access {
            base.access = access;
        }
        if let Some(description) = &self.description {
            base.description = Some(description.clone());
        }
        base
    }
}

fn measurement(
    name: &str,
    cluster: &str,
    unit: &str,
    description: &str,
    reporting: ReportingConfig,
) -> NumericArgs {
    let mut base = NumericArgs::new(name, cluster, "measuredValue");
    base.unit = Some(unit.to_string());
    base.description = Some(description.to_string());
    base.access = Access::StateGet;
    base.reporting = Some(reporting);
    base
}

/// Temperature in °C, sentinel -32768
pub fn temperature(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "temperature",
        name::TEMPERATURE_MEASUREMENT,
        "°C",
        "Measured temperature value",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 100.0),
    );
    base.scale = Some(Scale::Divisor(100.0));
    base.value_ignore = vec![-32768.0];
    numeric(args.apply(base))
}

/// Relative humidity in %, sentinel 0xFFFF
pub fn humidity(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "humidity",
        name::HUMIDITY_MEASUREMENT,
        "%",
        "Measured relative humidity",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 100.0),
    );
    base.scale = Some(Scale::Divisor(100.0));
    base.value_ignore = vec![65535.0];
    numeric(args.apply(base))
}

/// Pressure in hPa. Devices reporting the extended `scaledValue` attribute
/// get the higher resolution reading.
pub fn pressure(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "pressure",
        name::PRESSURE_MEASUREMENT,
        "hPa",
        "The measured atmospheric pressure",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 1.0),
    );
    base.value_ignore = vec![-32768.0];
    let endpoint_names = args.endpoint_names.clone();

    let scaled = Decoder::attributes(name::PRESSURE_MEASUREMENT, move |msg, ctx| {
        let scaled = to_number(msg.data.get("scaledValue")?)?;
        let endpoint = frame_endpoint(msg, ctx, endpoint_names.as_deref())?;
        let scale = msg
            .data
            .get("scale")
            .cloned()
            .or_else(|| {
                ctx.session
                    .cluster_attribute(msg.endpoint, name::PRESSURE_MEASUREMENT, "scale")
            })
            .and_then(|v| to_number(&v))
            .unwrap_or(0.0);
        let hpa = scaled / 10f64.powf(scale) / 100.0;
        Some(state_of(
            property_for("pressure", endpoint.as_deref()),
            precision_round(hpa, 2),
        ))
    });

    Ok(numeric(args.apply(base))?.with_decoder(scaled))
}

/// `10^((raw - 1) / 10000)` lux, raw 0 is 0 lux
fn illuminance_scale(value: f64, direction: ScaleDirection) -> f64 {
    match direction {
        ScaleDirection::FromDevice if value <= 0.0 => 0.0,
        ScaleDirection::FromDevice => 10f64.powf((value - 1.0) / 10000.0).round(),
        ScaleDirection::ToDevice if value <= 0.0 => 0.0,
        ScaleDirection::ToDevice => (10000.0 * value.log10() + 1.0).round(),
    }
}

/// Illuminance in lux plus the raw logarithmic reading, sentinel 0xFFFF
pub fn illuminance(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut lux = measurement(
        "illuminance",
        name::ILLUMINANCE_MEASUREMENT,
        "lx",
        "Measured illuminance",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 5.0),
    );
    lux.scale = Some(Scale::function(illuminance_scale));
    lux.value_ignore = vec![65535.0];

    let mut raw = NumericArgs::new("illuminance_raw", name::ILLUMINANCE_MEASUREMENT, "measuredValue");
    raw.description = Some("Measured illuminance, raw logarithmic value".to_string());
    raw.access = Access::State;
    raw.value_ignore = vec![65535.0];
    raw.endpoint_names = args.endpoint_names.clone();
    raw.entity_category = Some(Category::Diagnostic);

    Ok(numeric(args.apply(lux))?.merge(numeric(raw)?))
}

/// CO2 in ppm; the device reports a fraction
pub fn co2(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "co2",
        name::CO2_MEASUREMENT,
        "ppm",
        "Measured value",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 0.00005),
    );
    base.label = Some("CO2".to_string());
    base.scale = Some(Scale::function(|value, direction| match direction {
        ScaleDirection::FromDevice => value * 1e6,
        ScaleDirection::ToDevice => value / 1e6,
    }));
    base.precision = Some(0);
    numeric(args.apply(base))
}

pub fn pm25(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "pm25",
        name::PM25_MEASUREMENT,
        "µg/m³",
        "Measured PM2.5 (particulate matter) concentration",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 1.0),
    );
    base.label = Some("PM25".to_string());
    numeric(args.apply(base))
}

pub fn flow(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "flow",
        name::FLOW_MEASUREMENT,
        "m³/h",
        "Splashing water flow",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 10.0),
    );
    base.scale = Some(Scale::Divisor(10.0));
    numeric(args.apply(base))
}

pub fn soil_moisture(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = measurement(
        "soil_moisture",
        name::SOIL_MOISTURE,
        "%",
        "Measured soil moisture value",
        ReportingConfig::new("10_SECONDS", "1_HOUR", 100.0),
    );
    base.scale = Some(Scale::Divisor(100.0));
    numeric(args.apply(base))
}

/// Internal device temperature, sentinel -32768
pub fn device_temperature(args: SensorArgs) -> Result<Extend, ExtendError> {
    let mut base = NumericArgs::new("device_temperature", name::DEVICE_TEMP, "currentTemperature");
    base.unit = Some("°C".to_string());
    base.description = Some("Temperature of the device".to_string());
    base.access = Access::StateGet;
    base.reporting = Some(ReportingConfig::new("5_MINUTES", "1_HOUR", 1.0));
    base.value_ignore = vec![-32768.0];
    base.entity_category = Some(Category::Diagnostic);
    numeric(args.apply(base))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OccupancyArgs {
    pub endpoint_names: Option<Vec<String>>,
    pub reporting: bool,
    pub reporting_config: Option<ReportingConfig>,
    /// Clear occupancy `occupancy_timeout` seconds after the last detection
    pub occupancy_timeout: bool,
}

impl Default for OccupancyArgs {
    fn default() -> Self {
        Self {
            endpoint_names: None,
            reporting: true,
            reporting_config: None,
            occupancy_timeout: false,
        }
    }
}

struct OccupancyGet {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for OccupancyGet {
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
        _key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        entity
            .session
            .read(
                entity.endpoint,
                name::OCCUPANCY_SENSING,
                &[Attribute::from("occupancy")],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

/// Occupancy from bit 0 of the occupancy bitmap, with optional auto-clear
pub fn occupancy(args: OccupancyArgs) -> Result<Extend, ExtendError> {
    let expose = Expose::binary("occupancy", access::STATE_GET, true.into(), false.into())
        .with_description("Indicates whether the device detected occupancy");
    let exposes = per_endpoint(expose, args.endpoint_names.as_deref());

    let endpoint_names = args.endpoint_names.clone();
    let auto_clear = args.occupancy_timeout;
    let decoder = Decoder::attributes(name::OCCUPANCY_SENSING, move |msg, ctx| {
        let bitmap = to_bitmap(msg.data.get("occupancy")?)?;
        let endpoint = frame_endpoint(msg, ctx, endpoint_names.as_deref())?;
        let key = property_for("occupancy", endpoint.as_deref());
        let occupied = bitmap & 1 != 0;

        if auto_clear {
            let entity = ctx.entity(msg);
            let timeout = ctx.options.occupancy_timeout();
            if occupied && timeout > 0.0 {
                let publisher = ctx.publisher.clone();
                let ieee_address = ctx.session.ieee_address();
                let endpoint = msg.endpoint;
                let clear_key = key.clone();
                ctx.store.schedule(
                    &entity,
                    "occupancy_timer",
                    Duration::from_secs_f64(timeout),
                    move || {
                        publisher.publish(StateUpdate {
                            ieee_address,
                            endpoint,
                            state: state_of(clear_key, false),
                        });
                    },
                );
            } else {
                ctx.store.cancel_timer(&entity, "occupancy_timer");
            }
        }
        Some(state_of(key, occupied))
    });

    let reporting = if args.reporting {
        Some(
            args.reporting_config
                .clone()
                .unwrap_or_else(|| ReportingConfig::new("10_SECONDS", "1_HOUR", 0.0)),
        )
    } else {
        None
    };
    let configure = setup_configure_for_reporting(
        name::OCCUPANCY_SENSING,
        Attribute::from("occupancy"),
        reporting.as_ref(),
        access::STATE_GET,
        args.endpoint_names.as_deref(),
        &CommandOptions::default(),
    )?;

    let mut extend = Extend::new()
        .with_decoder(decoder)
        .with_encoder(Arc::new(OccupancyGet {
            keys: vec!["occupancy".to_string()],
        }))
        .with_configure_opt(configure);
    extend.exposes = exposes;
    if args.occupancy_timeout {
        extend = extend.with_option(
            Expose::numeric("occupancy_timeout", access::SET)
                .with_unit("s")
                .with_value_min(0.0)
                .with_description("Time in seconds after which occupancy is cleared after detecting it (default 90 seconds)."),
        );
    }
    Ok(extend)
}
