//! Battery state from `genPowerCfg`

use crate::converter::{Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, presets};
use crate::extend::Extend;
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{number_value, precision_round, to_bitmap, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, CommandOptions};

const PERCENTAGE: &str = "batteryPercentageRemaining";
const VOLTAGE: &str = "batteryVoltage";
const ALARM_STATE: &str = "batteryAlarmState";

/// Raw value meaning "no data" for both percentage and voltage
const SENTINEL: f64 = 255.0;

/// Low-battery bits of the three battery slots in `batteryAlarmState`
const LOW_BITS: u64 = 0x0F | (0x0F << 10) | (0x0F << 20);

/// Named voltage-to-percentage curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CurveName {
    #[serde(rename = "3V_2100")]
    ThreeVolt2100,
    #[serde(rename = "3V_2500")]
    ThreeVolt2500,
    #[serde(rename = "3V_2500_3200")]
    ThreeVolt2500To3200,
    #[serde(rename = "3V_1500_2800")]
    ThreeVolt1500To2800,
    #[serde(rename = "3V_2850_3000")]
    ThreeVolt2850To3000,
    #[serde(rename = "4LR6AA1_5v")]
    FourAa,
    #[serde(rename = "3V_add 1V")]
    ThreeVoltAddOne,
    #[serde(rename = "Add_1V_42V_CSM300z2v2")]
    AddOneVolt42,
}

/// Voltage-to-percentage conversion, a named curve or a linear `{min, max}` in mV
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VoltageCurve {
    Named(CurveName),
    Linear { min: f64, max: f64 },
}

fn linear(voltage: f64, min: f64, max: f64) -> f64 {
    let clamped = voltage.clamp(min, max);
    ((clamped - min) / (max - min) * 100.0).round()
}

impl VoltageCurve {
    /// Percentage for a voltage in millivolts
    #[must_use]
    pub fn percentage(self, voltage: f64) -> f64 {
        match self {
            VoltageCurve::Linear { min, max } => linear(voltage, min, max),
            VoltageCurve::Named(curve) => match curve {
                CurveName::ThreeVolt2100 => {
                    let percentage = if voltage < 2100.0 {
                        0.0
                    } else if voltage < 2440.0 {
                        6.0 - ((2440.0 - voltage) * 6.0) / 340.0
                    } else if voltage < 2740.0 {
                        18.0 - ((2740.0 - voltage) * 12.0) / 300.0
                    } else if voltage < 2900.0 {
                        42.0 - ((2900.0 - voltage) * 24.0) / 160.0
                    } else if voltage < 3000.0 {
                        100.0 - ((3000.0 - voltage) * 58.0) / 100.0
                    } else {
                        100.0
                    };
                    percentage.round()
                }
                CurveName::ThreeVolt2500 => linear(voltage, 2500.0, 3000.0),
                CurveName::ThreeVolt2500To3200 => linear(voltage, 2500.0, 3200.0),
                CurveName::ThreeVolt1500To2800 => {
                    (235.0 - 370_000.0 / (voltage + 1.0)).clamp(0.0, 100.0).round()
                }
                CurveName::ThreeVolt2850To3000 => linear(voltage, 2850.0, 3000.0),
                CurveName::FourAa => linear(voltage, 3000.0, 4200.0),
                CurveName::ThreeVoltAddOne => linear(voltage + 1000.0, 3200.0, 4200.0),
                CurveName::AddOneVolt42 => linear(voltage + 1000.0, 2900.0, 4100.0),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatteryArgs {
    pub percentage: bool,
    pub voltage: bool,
    /// `battery_low` from the alarm state bitmap
    pub low_status: bool,
    /// The device already reports 0-100 instead of half-percent units
    pub dont_divide_percentage: bool,
    pub percentage_reporting: bool,
    pub voltage_reporting: bool,
    pub low_status_reporting: bool,
    /// Derive `battery` from the voltage instead of the reported percentage
    pub voltage_to_percentage: Option<VoltageCurve>,
    pub percentage_reporting_config: ReportingConfig,
    pub voltage_reporting_config: ReportingConfig,
    pub low_status_reporting_config: ReportingConfig,
}

impl Default for BatteryArgs {
    fn default() -> Self {
        Self {
            percentage: true,
            voltage: false,
            low_status: false,
            dont_divide_percentage: false,
            percentage_reporting: true,
            voltage_reporting: false,
            low_status_reporting: false,
            voltage_to_percentage: None,
            percentage_reporting_config: ReportingConfig::new("1_HOUR", "MAX", 10.0),
            voltage_reporting_config: ReportingConfig::new("1_HOUR", "MAX", 100.0),
            low_status_reporting_config: ReportingConfig::new("1_HOUR", "MAX", 0.0),
        }
    }
}

/// Get-read of one battery attribute
struct BatteryGet {
    keys: Vec<String>,
    attribute: &'static str,
}

#[async_trait]
impl Encode for BatteryGet {
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
                name::POWER_CONFIG,
                &[Attribute::from(self.attribute)],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

fn sentinel_filtered(value: Option<&Value>) -> Option<f64> {
    to_number(value?).filter(|raw| *raw != SENTINEL)
}

/// Battery capability
pub fn battery(args: BatteryArgs) -> Result<Extend, ExtendError> {
    if !args.percentage && !args.voltage && !args.low_status {
        return Err(ExtendError::Construction(
            "battery without percentage, voltage or low status".to_string(),
        ));
    }

    let mut extend = Extend::new();
    if args.percentage {
        extend = extend.with_expose(presets::battery());
    }
    if args.voltage {
        extend = extend.with_expose(presets::battery_voltage());
    }
    if args.low_status {
        extend = extend.with_expose(presets::battery_low());
    }

    let decode_args = args.clone();
    extend = extend.with_decoder(Decoder::attributes(name::POWER_CONFIG, move |msg, ctx| {
        let args = &decode_args;
        let mut state = State::new();

        if args.percentage && args.voltage_to_percentage.is_none() {
            if let Some(raw) = sentinel_filtered(msg.data.get(PERCENTAGE)) {
                let percentage = if args.dont_divide_percentage { raw } else { raw / 2.0 };
                state.insert(ctx.postfix("battery", msg), number_value(precision_round(percentage, 2)));
            }
        }

        if let Some(raw) = sentinel_filtered(msg.data.get(VOLTAGE)) {
            let millivolts = raw * 100.0;
            if args.voltage {
                state.insert(ctx.postfix("voltage", msg), number_value(millivolts));
            }
            if let (true, Some(curve)) = (args.percentage, args.voltage_to_percentage) {
                state.insert(ctx.postfix("battery", msg), number_value(curve.percentage(millivolts)));
            }
        }

        if args.low_status {
            if let Some(bitmap) = msg.data.get(ALARM_STATE).and_then(to_bitmap) {
                state.insert(ctx.postfix("battery_low", msg), Value::Bool(bitmap & LOW_BITS != 0));
            }
        }
        (!state.is_empty()).then_some(state)
    }));

    // One reporting step per attribute; the derived percentage shares the voltage attribute
    let mut steps: Vec<(&str, Option<&ReportingConfig>, u8)> = Vec::new();
    if args.percentage {
        let attribute = if args.voltage_to_percentage.is_some() { VOLTAGE } else { PERCENTAGE };
        let config = if args.voltage_to_percentage.is_some() {
            &args.voltage_reporting_config
        } else {
            &args.percentage_reporting_config
        };
        steps.push((attribute, args.percentage_reporting.then_some(config), access::STATE_GET));
        extend = extend.with_encoder(Arc::new(BatteryGet {
            keys: vec!["battery".to_string()],
            attribute,
        }));
    }
    if args.voltage {
        let config = args.voltage_reporting.then_some(&args.voltage_reporting_config);
        match steps.iter_mut().find(|(attribute, _, _)| *attribute == VOLTAGE) {
            Some(step) => step.1 = step.1.or(config),
            None => steps.push((VOLTAGE, config, access::STATE_GET)),
        }
        extend = extend.with_encoder(Arc::new(BatteryGet {
            keys: vec!["voltage".to_string()],
            attribute: VOLTAGE,
        }));
    }
    if args.low_status {
        steps.push((
            ALARM_STATE,
            args.low_status_reporting.then_some(&args.low_status_reporting_config),
            access::STATE,
        ));
    }

    for (attribute, config, leaf_access) in steps {
        let step = setup_configure_for_reporting(
            name::POWER_CONFIG,
            Attribute::from(attribute),
            config,
            leaf_access,
            None,
            &CommandOptions::default(),
        )?;
        extend = extend.with_configure_opt(step);
    }
    Ok(extend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Runtime};
    use crate::options::DeviceOptions;
    use serde_json::json;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{AttributeMap, Endpoint, MemoryDevice, Message, ZigbeeDevice};

    fn remote() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([5, 0, 0, 0, 0, 0, 0, 0], 0x0005);
        device
            .endpoints
            .push(Endpoint::new(1, vec![id::BASIC, id::POWER_CONFIG], vec![]));
        MemoryDevice::new(device)
    }

    fn decode(definition: &Definition, pairs: &[(&str, Value)]) -> State {
        let data: AttributeMap = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        definition.decode(
            &Message::report("genPowerCfg", 1, data),
            &remote(),
            &DeviceOptions::default(),
            &Runtime::new(),
        )
    }

    fn definition(args: BatteryArgs) -> Definition {
        Definition::from_extends(vec![], "REMOTE", "Test", "", vec![battery(args).unwrap()])
    }

    #[test]
    fn test_curves() {
        let named = |name: CurveName| VoltageCurve::Named(name);
        assert_eq!(named(CurveName::ThreeVolt2100).percentage(3100.0), 100.0);
        assert_eq!(named(CurveName::ThreeVolt2100).percentage(2000.0), 0.0);
        assert_eq!(named(CurveName::ThreeVolt2100).percentage(2950.0), 71.0);
        assert_eq!(named(CurveName::ThreeVolt2500).percentage(2750.0), 50.0);
        assert_eq!(named(CurveName::ThreeVolt1500To2800).percentage(3000.0), 100.0);
        assert_eq!(named(CurveName::ThreeVoltAddOne).percentage(2700.0), 50.0);
        assert_eq!(VoltageCurve::Linear { min: 1900.0, max: 3000.0 }.percentage(1000.0), 0.0);

        let curve: VoltageCurve = serde_json::from_value(json!("3V_2500_3200")).unwrap();
        assert_eq!(curve, named(CurveName::ThreeVolt2500To3200));
        let curve: VoltageCurve = serde_json::from_value(json!({"min": 2000, "max": 3000})).unwrap();
        assert_eq!(curve.percentage(2500.0), 50.0);
        assert!(serde_json::from_value::<VoltageCurve>(json!("9V")).is_err());
    }

    #[test]
    fn test_percentage_halving_and_sentinel() {
        let halved = definition(BatteryArgs::default());
        assert_eq!(decode(&halved, &[(PERCENTAGE, json!(200))])["battery"], json!(100));
        assert!(decode(&halved, &[(PERCENTAGE, json!(255))]).is_empty());

        let direct = definition(BatteryArgs {
            dont_divide_percentage: true,
            ..BatteryArgs::default()
        });
        assert_eq!(decode(&direct, &[(PERCENTAGE, json!(87))])["battery"], json!(87));
    }

    #[test]
    fn test_voltage_and_derived_percentage() {
        let definition = definition(BatteryArgs {
            voltage: true,
            voltage_to_percentage: Some(VoltageCurve::Named(CurveName::ThreeVolt2500)),
            ..BatteryArgs::default()
        });
        let state = decode(&definition, &[(VOLTAGE, json!(28)), (PERCENTAGE, json!(10))]);
        assert_eq!(state["voltage"], json!(2800));
        assert_eq!(state["battery"], json!(60));
        assert!(decode(&definition, &[(VOLTAGE, json!(255))]).is_empty());
    }

    #[test]
    fn test_alarm_bits_across_slots() {
        let definition = definition(BatteryArgs {
            percentage: false,
            low_status: true,
            ..BatteryArgs::default()
        });
        assert_eq!(decode(&definition, &[(ALARM_STATE, json!(0))])["battery_low"], json!(false));
        assert_eq!(decode(&definition, &[(ALARM_STATE, json!(1 << 11))])["battery_low"], json!(true));
        assert_eq!(decode(&definition, &[(ALARM_STATE, json!(1 << 22))])["battery_low"], json!(true));
        assert_eq!(decode(&definition, &[(ALARM_STATE, json!(1 << 5))])["battery_low"], json!(false));
    }

    #[tokio::test]
    async fn test_separate_reads() {
        let definition = definition(BatteryArgs {
            voltage: true,
            voltage_reporting: true,
            ..BatteryArgs::default()
        });
        let session = remote();
        definition
            .get(
                &session,
                &DeviceOptions::default(),
                &Runtime::new(),
                &["battery".to_string(), "voltage".to_string()],
            )
            .await
            .unwrap();
        let reads: Vec<Vec<String>> = session
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Read { attributes, .. } => Some(attributes),
                _ => None,
            })
            .collect();
        assert_eq!(reads, vec![vec![PERCENTAGE.to_string()], vec![VOLTAGE.to_string()]]);
    }

    #[tokio::test]
    async fn test_configure_reports_each_path() {
        let definition = definition(BatteryArgs {
            voltage: true,
            voltage_reporting: true,
            ..BatteryArgs::default()
        });
        let session = remote();
        definition.configure(&session).await.unwrap();
        let reported: Vec<String> = session
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::ConfigureReporting { items, .. } => Some(items[0].attribute.key()),
                _ => None,
            })
            .collect();
        assert_eq!(reported, vec![PERCENTAGE.to_string(), VOLTAGE.to_string()]);
    }

    #[test]
    fn test_nothing_requested_rejected() {
        let result = battery(BatteryArgs {
            percentage: false,
            ..BatteryArgs::default()
        });
        assert!(matches!(result, Err(ExtendError::Construction(_))));
    }
}
