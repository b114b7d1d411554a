//! IAS zone alarms and IAS warning devices (sirens)

use crate::builders::generic::{numeric, NumericArgs};
use crate::converter::{Decoder, Encode, EncodeMeta, Entity, State, StateUpdate};
use crate::error::ExtendError;
use crate::expose::{access, Access, Expose};
use crate::extend::Extend;
use crate::lookup::Lookup;
use crate::utils::{require_number, to_bitmap};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use zigbee_core::cluster::name;
use zigbee_core::{AttributeMap, CommandOptions, MessageKind};

const ALARM_TIMER: &str = "alarm_timer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    Occupancy,
    Contact,
    Smoke,
    WaterLeak,
    CarbonMonoxide,
    Sos,
    Vibration,
    Alarm,
    Gas,
    Generic,
    Rain,
}

impl ZoneType {
    fn property(self) -> &'static str {
        match self {
            ZoneType::Occupancy => "occupancy",
            ZoneType::Contact => "contact",
            ZoneType::Smoke => "smoke",
            ZoneType::WaterLeak => "water_leak",
            ZoneType::CarbonMonoxide => "carbon_monoxide",
            ZoneType::Sos => "sos",
            ZoneType::Vibration => "vibration",
            ZoneType::Alarm | ZoneType::Generic => "alarm",
            ZoneType::Gas => "gas",
            ZoneType::Rain => "rain",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ZoneType::Occupancy => "Indicates whether the device detected occupancy",
            ZoneType::Contact => "Indicates whether the device is opened or closed",
            ZoneType::Smoke => "Indicates whether the device detected smoke",
            ZoneType::WaterLeak => "Indicates whether the device detected a water leak",
            ZoneType::CarbonMonoxide => "Indicates whether the device detected carbon monoxide",
            ZoneType::Sos => "Indicates whether the SOS alarm is triggered",
            ZoneType::Vibration => "Indicates whether the device detected vibration",
            ZoneType::Alarm | ZoneType::Generic => "Indicates whether the alarm is triggered",
            ZoneType::Gas => "Indicates whether the device detected gas",
            ZoneType::Rain => "Indicates whether the device detected rainfall",
        }
    }

    /// `contact` reports "open" with the alarm bit set
    fn inverted(self) -> bool {
        self == ZoneType::Contact
    }
}

/// Zone status bits a descriptor may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneAttribute {
    #[serde(rename = "alarm_1")]
    Alarm1,
    #[serde(rename = "alarm_2")]
    Alarm2,
    Tamper,
    BatteryLow,
    SupervisionReports,
    RestoreReports,
    Trouble,
    AcStatus,
    Test,
    BatteryDefect,
}

impl ZoneAttribute {
    fn bit(self) -> u32 {
        match self {
            ZoneAttribute::Alarm1 => 0,
            ZoneAttribute::Alarm2 => 1,
            ZoneAttribute::Tamper => 2,
            ZoneAttribute::BatteryLow => 3,
            ZoneAttribute::SupervisionReports => 4,
            ZoneAttribute::RestoreReports => 5,
            ZoneAttribute::Trouble => 6,
            ZoneAttribute::AcStatus => 7,
            ZoneAttribute::Test => 8,
            ZoneAttribute::BatteryDefect => 9,
        }
    }

    fn is_alarm(self) -> bool {
        matches!(self, ZoneAttribute::Alarm1 | ZoneAttribute::Alarm2)
    }

    fn fixed_name(self) -> Option<(&'static str, &'static str)> {
        Some(match self {
            ZoneAttribute::Alarm1 | ZoneAttribute::Alarm2 => return None,
            ZoneAttribute::Tamper => ("tamper", "Indicates whether the device is tampered"),
            ZoneAttribute::BatteryLow => ("battery_low", "Indicates whether the battery of the device is almost empty"),
            ZoneAttribute::SupervisionReports => ("supervision_reports", "Indicates whether the device issues reports on zone operation"),
            ZoneAttribute::RestoreReports => ("restore_reports", "Indicates whether the device issues reports on alarm no longer being present"),
            ZoneAttribute::Trouble => ("trouble", "Indicates whether the device has a trouble"),
            ZoneAttribute::AcStatus => ("ac_status", "Indicates whether the device mains voltage supply is at fault"),
            ZoneAttribute::Test => ("test", "Indicates whether the device is currently performing a test"),
            ZoneAttribute::BatteryDefect => ("battery_defect", "Indicates whether the device battery is defective"),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IasZoneArgs {
    pub zone_type: ZoneType,
    pub zone_attributes: Vec<ZoneAttribute>,
    /// Clear alarm fields after `alarm_timeout` seconds without a notification
    pub alarm_timeout: bool,
    pub description: Option<String>,
}

impl Default for IasZoneArgs {
    fn default() -> Self {
        Self {
            zone_type: ZoneType::Generic,
            zone_attributes: vec![ZoneAttribute::Alarm1],
            alarm_timeout: false,
            description: None,
        }
    }
}

/// One decoded status bit
#[derive(Debug, Clone)]
struct ZoneBit {
    attribute: ZoneAttribute,
    key: String,
    bit: u32,
    invert: bool,
    alarm: bool,
}

fn zone_bits(args: &IasZoneArgs) -> Vec<ZoneBit> {
    let both_alarms = args.zone_attributes.contains(&ZoneAttribute::Alarm1)
        && args.zone_attributes.contains(&ZoneAttribute::Alarm2);
    let alarm_name = args.zone_type.property();

    let mut bits: Vec<ZoneBit> = Vec::new();
    for attribute in &args.zone_attributes {
        let key = match attribute.fixed_name() {
            Some((key, _)) => key.to_string(),
            None if both_alarms && *attribute == ZoneAttribute::Alarm1 => format!("{alarm_name}_alarm_1"),
            None if both_alarms => format!("{alarm_name}_alarm_2"),
            None => alarm_name.to_string(),
        };
        if bits.iter().any(|b| b.key == key) {
            continue;
        }
        bits.push(ZoneBit {
            attribute: *attribute,
            key,
            bit: attribute.bit(),
            invert: attribute.is_alarm() && args.zone_type.inverted(),
            alarm: attribute.is_alarm(),
        });
    }
    bits
}

fn zone_expose(args: &IasZoneArgs, attribute: ZoneAttribute, key: &str) -> Expose {
    let description = match attribute.fixed_name() {
        Some((_, description)) => description.to_string(),
        None => args
            .description
            .clone()
            .unwrap_or_else(|| args.zone_type.description().to_string()),
    };
    Expose::binary(key, access::STATE, true.into(), false.into()).with_description(&description)
}

/// Zone status from either a status change notification or an attribute frame
fn zone_status(data: &AttributeMap) -> Option<u64> {
    data.get("zonestatus")
        .or_else(|| data.get("zoneStatus"))
        .and_then(to_bitmap)
}

/// IAS zone alarm capability
pub fn ias_zone_alarm(args: IasZoneArgs) -> Result<Extend, ExtendError> {
    if args.zone_attributes.is_empty() {
        return Err(ExtendError::Construction(
            "IAS zone without zone attributes".to_string(),
        ));
    }
    let bits = zone_bits(&args);

    let mut extend = Extend::new();
    for bit in &bits {
        extend = extend.with_expose(zone_expose(&args, bit.attribute, &bit.key));
    }

    let alarm_timeout = args.alarm_timeout;
    let decoder = Decoder::new(
        name::IAS_ZONE,
        vec![
            MessageKind::command("commandStatusChangeNotification"),
            MessageKind::AttributeReport,
            MessageKind::ReadResponse,
        ],
        move |msg, ctx| {
            let status = zone_status(&msg.data)?;
            let mut state = State::new();
            for bit in &bits {
                let set = status & (1 << bit.bit) != 0;
                state.insert(ctx.postfix(&bit.key, msg), Value::Bool(set != bit.invert));
            }

            if alarm_timeout {
                let entity = ctx.entity(msg);
                let timeout = ctx.options.alarm_timeout();
                // Every notification restarts the timer, whatever its alarm bits
                if timeout > 0.0 {
                    let cleared: State = bits
                        .iter()
                        .filter(|b| b.alarm)
                        .map(|b| (ctx.postfix(&b.key, msg), Value::Bool(false)))
                        .collect();
                    let publisher = ctx.publisher.clone();
                    let ieee_address = ctx.session.ieee_address();
                    let endpoint = msg.endpoint;
                    ctx.store.schedule(
                        &entity,
                        ALARM_TIMER,
                        Duration::from_secs_f64(timeout),
                        move || {
                            publisher.publish(StateUpdate {
                                ieee_address,
                                endpoint,
                                state: cleared,
                            });
                        },
                    );
                } else {
                    ctx.store.cancel_timer(&entity, ALARM_TIMER);
                }
            }
            Some(state)
        },
    );
    extend = extend.with_decoder(decoder);

    if args.alarm_timeout {
        extend = extend.with_option(
            Expose::numeric("alarm_timeout", access::SET)
                .with_unit("s")
                .with_value_min(0.0)
                .with_description("Time in seconds after which the alarm is cleared after detecting it (default 90 seconds)."),
        );
    }
    Ok(extend)
}

pub(crate) fn warning_modes() -> Lookup {
    Lookup::new(&[
        ("stop", 0),
        ("burglar", 1),
        ("fire", 2),
        ("emergency", 3),
        ("police_panic", 4),
        ("fire_panic", 5),
        ("emergency_panic", 6),
    ])
}

pub(crate) fn warning_levels() -> Lookup {
    Lookup::new(&[("low", 0), ("medium", 1), ("high", 2), ("very_high", 3)])
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IasWarningArgs {
    /// Pack `startwarninginfo` as mode | strobe << 4 | level << 6
    pub reverse_payload: bool,
}

struct WarningEncoder {
    keys: Vec<String>,
    modes: Lookup,
    levels: Lookup,
    reverse_payload: bool,
}

impl WarningEncoder {
    fn lookup_field(
        &self,
        lookup: &Lookup,
        request: &Map<String, Value>,
        field: &str,
        default: &str,
    ) -> Result<i64, ExtendError> {
        match request.get(field) {
            None | Some(Value::Null) => lookup.require_value(field, default),
            Some(Value::String(name)) => lookup.require_value(field, name),
            Some(other) => Err(ExtendError::invalid_value(field, format!("{other} is not a string"))),
        }
    }

    fn number_field(request: &Map<String, Value>, field: &str, default: f64) -> Result<f64, ExtendError> {
        match request.get(field) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => require_number(field, value),
        }
    }

    fn start_warning_info(&self, mode: i64, strobe: bool, level: i64) -> i64 {
        let strobe = i64::from(strobe);
        if self.reverse_payload {
            mode + (strobe << 4) + (level << 6)
        } else {
            (mode << 4) + (strobe << 2) + level
        }
    }
}

#[async_trait]
impl Encode for WarningEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let request = value
            .as_object()
            .ok_or_else(|| ExtendError::invalid_value(key, format!("{value} is not an object")))?;

        let mode = self.lookup_field(&self.modes, request, "mode", "emergency")?;
        let level = self.lookup_field(&self.levels, request, "level", "medium")?;
        let strobe_level = self.lookup_field(&self.levels, request, "strobe_level", "medium")?;
        let strobe = match request.get("strobe") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(strobe)) => *strobe,
            Some(other) => {
                return Err(ExtendError::invalid_value("strobe", format!("{other} is not a boolean")))
            }
        };
        let duration = Self::number_field(request, "duration", 10.0)?;
        let duty_cycle = Self::number_field(request, "strobe_duty_cycle", 0.0)?;

        let mut payload = AttributeMap::new();
        payload.insert(
            "startwarninginfo".to_string(),
            self.start_warning_info(mode, strobe, level).into(),
        );
        payload.insert("warningduration".to_string(), (duration.round() as i64).into());
        payload.insert("strobedutycycle".to_string(), ((duty_cycle * 10.0).round() as i64).into());
        payload.insert("strobelevel".to_string(), strobe_level.into());

        entity
            .session
            .command(
                entity.endpoint,
                name::IAS_WD,
                "startWarning",
                payload,
                &CommandOptions::default(),
            )
            .await?;
        Ok(None)
    }

    async fn convert_get(
        &self,
        _entity: &Entity<'_>,
        key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        Err(ExtendError::UnknownKey(key.to_string()))
    }
}

/// IAS warning device capability: the `warning` command plus `max_duration`
pub fn ias_warning(args: IasWarningArgs) -> Result<Extend, ExtendError> {
    let modes = warning_modes();
    let levels = warning_levels();
    let warning = Expose::composite("warning", "warning", access::SET)
        .with_feature(
            Expose::enumeration("mode", access::SET, modes.names()).with_description("Mode of the warning (sound effect)"),
        )
        .with_feature(
            Expose::enumeration("level", access::SET, levels.names()).with_description("Sound level"),
        )
        .with_feature(
            Expose::enumeration("strobe_level", access::SET, levels.names())
                .with_description("Intensity of the strobe"),
        )
        .with_feature(
            Expose::binary("strobe", access::SET, true.into(), false.into())
                .with_description("Turn on/off the strobe (light) during warning"),
        )
        .with_feature(
            Expose::numeric("strobe_duty_cycle", access::SET)
                .with_value_min(0.0)
                .with_value_max(10.0)
                .with_description("Length of the flash cycle"),
        )
        .with_feature(
            Expose::numeric("duration", access::SET)
                .with_unit("s")
                .with_description("Duration in seconds of the alarm"),
        );

    let max_duration = numeric(NumericArgs {
        description: Some("Max duration of the siren".to_string()),
        access: Access::All,
        unit: Some("s".to_string()),
        value_min: Some(0.0),
        value_max: Some(600.0),
        ..NumericArgs::new("max_duration", name::IAS_WD, "maxDuration")
    })?;

    Ok(Extend::new()
        .with_expose(warning)
        .with_encoder(Arc::new(WarningEncoder {
            keys: vec!["warning".to_string()],
            modes,
            levels,
            reverse_payload: args.reverse_payload,
        }))
        .merge(max_duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Runtime};
    use crate::options::DeviceOptions;
    use serde_json::json;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{Endpoint, MemoryDevice, Message, ZigbeeDevice};

    fn sensor() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([4, 0, 0, 0, 0, 0, 0, 0], 0x0004);
        device
            .endpoints
            .push(Endpoint::new(1, vec![id::IAS_ZONE, id::IAS_WD], vec![]));
        MemoryDevice::new(device)
    }

    fn notification(status: u64) -> Message {
        let mut data = AttributeMap::new();
        data.insert("zonestatus".to_string(), json!(status));
        data.insert("extendedstatus".to_string(), json!(0));
        Message::new(
            "ssIasZone",
            MessageKind::command("commandStatusChangeNotification"),
            1,
            data,
        )
    }

    fn zone(zone_type: ZoneType, attributes: Vec<ZoneAttribute>) -> Definition {
        let extend = ias_zone_alarm(IasZoneArgs {
            zone_type,
            zone_attributes: attributes,
            ..IasZoneArgs::default()
        })
        .unwrap();
        Definition::from_extends(vec![], "ZONE", "Test", "", vec![extend])
    }

    #[test]
    fn test_bits_and_fixed_names() {
        let definition = zone(
            ZoneType::Smoke,
            vec![ZoneAttribute::Alarm1, ZoneAttribute::Tamper, ZoneAttribute::BatteryLow],
        );
        let state = definition.decode(
            &notification(0b1001),
            &sensor(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["smoke"], json!(true));
        assert_eq!(state["tamper"], json!(false));
        assert_eq!(state["battery_low"], json!(true));
        assert!(!state.contains_key("trouble"));
    }

    #[test]
    fn test_both_alarms_suffixed() {
        let definition = zone(ZoneType::Contact, vec![ZoneAttribute::Alarm1, ZoneAttribute::Alarm2]);
        assert_eq!(
            definition.expose_names(),
            vec!["contact_alarm_1".to_string(), "contact_alarm_2".to_string()]
        );

        let only_second = zone(ZoneType::WaterLeak, vec![ZoneAttribute::Alarm2]);
        let state = only_second.decode(
            &notification(0b10),
            &sensor(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["water_leak"], json!(true));
    }

    #[test]
    fn test_zone_status_attribute_report() {
        let definition = zone(ZoneType::Vibration, vec![ZoneAttribute::Alarm1]);
        let mut data = AttributeMap::new();
        data.insert("zoneStatus".to_string(), json!(1));
        let state = definition.decode(
            &Message::report("ssIasZone", 1, data),
            &sensor(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["vibration"], json!(true));
    }

    #[test]
    fn test_empty_attributes_rejected() {
        assert!(matches!(
            ias_zone_alarm(IasZoneArgs {
                zone_attributes: vec![],
                ..IasZoneArgs::default()
            }),
            Err(ExtendError::Construction(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_notification_restarts_timer() {
        let extend = ias_zone_alarm(IasZoneArgs {
            zone_type: ZoneType::Occupancy,
            alarm_timeout: true,
            ..IasZoneArgs::default()
        })
        .unwrap();
        let definition = Definition::from_extends(vec![], "ZONE", "Test", "", vec![extend]);
        let session = sensor();
        let runtime = Runtime::new();
        let mut updates = runtime.publisher.subscribe();
        let options = DeviceOptions {
            alarm_timeout: Some(1.0),
            ..DeviceOptions::default()
        };

        definition.decode(&notification(1), &session, &options, &runtime);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let state = definition.decode(&notification(0), &session, &options, &runtime);
        assert_eq!(state["occupancy"], json!(false));

        tokio::time::sleep(Duration::from_millis(900)).await;
        tokio::task::yield_now().await;
        assert!(updates.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        let update = updates.try_recv().unwrap();
        assert_eq!(update.state["occupancy"], json!(false));

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_cancels_timer() {
        let extend = ias_zone_alarm(IasZoneArgs {
            zone_type: ZoneType::Occupancy,
            alarm_timeout: true,
            ..IasZoneArgs::default()
        })
        .unwrap();
        let definition = Definition::from_extends(vec![], "ZONE", "Test", "", vec![extend]);
        let session = sensor();
        let runtime = Runtime::new();
        let mut updates = runtime.publisher.subscribe();

        let options = DeviceOptions {
            alarm_timeout: Some(1.0),
            ..DeviceOptions::default()
        };
        definition.decode(&notification(1), &session, &options, &runtime);
        let disabled = DeviceOptions {
            alarm_timeout: Some(0.0),
            ..DeviceOptions::default()
        };
        definition.decode(&notification(1), &session, &disabled, &runtime);

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_warning_packing() {
        let request = json!({"mode": "burglar", "level": "high", "strobe": true, "duration": 30});
        for (reverse_payload, expected) in [(false, (1 << 4) + (1 << 2) + 2), (true, 1 + (1 << 4) + (2 << 6))] {
            let definition = Definition::from_extends(
                vec![],
                "SIREN",
                "Test",
                "",
                vec![ias_warning(IasWarningArgs { reverse_payload }).unwrap()],
            );
            let session = sensor();
            let mut message = State::new();
            message.insert("warning".to_string(), request.clone());
            definition
                .set(&session, &DeviceOptions::default(), &Runtime::new(), &message, &State::new())
                .await
                .unwrap();

            let payload = session
                .calls()
                .into_iter()
                .find_map(|call| match call {
                    SessionCall::Command { command, payload, .. } if command == "startWarning" => Some(payload),
                    _ => None,
                })
                .unwrap();
            assert_eq!(payload["startwarninginfo"], json!(expected));
            assert_eq!(payload["warningduration"], json!(30));
            assert_eq!(payload["strobedutycycle"], json!(0));
            assert_eq!(payload["strobelevel"], json!(1));
        }
    }

    #[tokio::test]
    async fn test_warning_defaults_and_bad_mode() {
        let definition = Definition::from_extends(
            vec![],
            "SIREN",
            "Test",
            "",
            vec![ias_warning(IasWarningArgs::default()).unwrap()],
        );
        assert!(definition.expose_names().contains(&"max_duration".to_string()));

        let session = sensor();
        let mut message = State::new();
        message.insert("warning".to_string(), json!({}));
        definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &message, &State::new())
            .await
            .unwrap();
        let calls = session.calls();
        let Some(SessionCall::Command { payload, .. }) = calls.last() else {
            panic!("expected a command");
        };
        assert_eq!(payload["startwarninginfo"], json!((3 << 4) + (1 << 2) + 1));
        assert_eq!(payload["warningduration"], json!(10));

        message.insert("warning".to_string(), json!({"mode": "party"}));
        let result = definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &message, &State::new())
            .await;
        assert!(matches!(result, Err(ExtendError::InvalidValue { .. })));
    }
}
