//! Door lock: lock state, door state, pin codes and event notifications

use crate::converter::{Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, Expose};
use crate::extend::{DefinitionMeta, Extend};
use crate::lookup::Lookup;
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{require_number, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, AttributeMap, CommandOptions, MessageKind};

const LOCK_STATES: [&str; 3] = ["not_fully_locked", "locked", "unlocked"];

fn door_states() -> Lookup {
    Lookup::new(&[
        ("open", 0),
        ("closed", 1),
        ("error_jammed", 2),
        ("error_forced_open", 3),
        ("error_unspecified", 4),
        ("undefined", 255),
    ])
}

fn operation_events() -> Lookup {
    Lookup::new(&[
        ("unknown", 0),
        ("lock", 1),
        ("unlock", 2),
        ("lock_failure_invalid_pin_or_id", 3),
        ("lock_failure_invalid_schedule", 4),
        ("unlock_failure_invalid_pin_or_id", 5),
        ("unlock_failure_invalid_schedule", 6),
        ("one_touch_lock", 7),
        ("key_lock", 8),
        ("key_unlock", 9),
        ("auto_lock", 10),
        ("schedule_lock", 11),
        ("schedule_unlock", 12),
        ("manual_lock", 13),
        ("manual_unlock", 14),
        ("non_access_user_operational_event", 15),
    ])
}

fn programming_events() -> Lookup {
    Lookup::new(&[
        ("unknown", 0),
        ("master_code_changed", 1),
        ("pin_code_added", 2),
        ("pin_code_deleted", 3),
        ("pin_code_changed", 4),
        ("rfid_code_added", 5),
        ("rfid_code_deleted", 6),
    ])
}

fn event_sources() -> Lookup {
    Lookup::new(&[("keypad", 0), ("rf", 1), ("manual", 2), ("rfid", 3)])
}

fn user_types() -> Lookup {
    Lookup::new(&[
        ("unrestricted", 0),
        ("year_day_schedule", 1),
        ("week_day_schedule", 2),
        ("master", 3),
        ("non_access", 4),
    ])
}

fn user_statuses() -> Lookup {
    Lookup::new(&[("available", 0), ("enabled", 1), ("disabled", 3)])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockArgs {
    /// Number of pin code slots on the device
    pub pin_code_count: u16,
}

impl Default for LockArgs {
    fn default() -> Self {
        Self { pin_code_count: 50 }
    }
}

struct LockEncoder {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for LockEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_get(&self) -> bool {
        true
    }

    /// Accepts `"LOCK"` or `{"state": "UNLOCK", "code": "1234"}`
    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let (state, code) = match value {
            Value::String(state) => (state.as_str(), ""),
            Value::Object(request) => (
                request.get("state").and_then(Value::as_str).unwrap_or_default(),
                request.get("code").and_then(Value::as_str).unwrap_or_default(),
            ),
            other => return Err(ExtendError::invalid_value(key, format!("{other} is not a lock request"))),
        };
        let command = match state.to_uppercase().as_str() {
            "LOCK" => "lockDoor",
            "UNLOCK" => "unlockDoor",
            "TOGGLE" => "toggleDoor",
            other => {
                return Err(ExtendError::invalid_value(
                    key,
                    format!("'{other}' is not one of LOCK, UNLOCK, TOGGLE"),
                ))
            }
        };
        let mut payload = AttributeMap::new();
        payload.insert("pincodevalue".to_string(), Value::from(code));
        entity
            .session
            .command(entity.endpoint, name::DOOR_LOCK, command, payload, &CommandOptions::default())
            .await?;
        Ok(None)
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
                name::DOOR_LOCK,
                &[Attribute::from("lockState")],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

struct PinCodeEncoder {
    keys: Vec<String>,
    user_types: Lookup,
}

impl PinCodeEncoder {
    fn user(request: &Map<String, Value>, meta: &EncodeMeta<'_>) -> Result<u16, ExtendError> {
        let user = require_number("user", request.get("user").unwrap_or(&Value::Null))?;
        let count = meta.meta.pin_code_count.unwrap_or(0);
        if user < 0.0 || user.fract() != 0.0 || user >= f64::from(count) {
            return Err(ExtendError::invalid_value(
                "user",
                format!("{user} is outside the {count} pin code slots of the device"),
            ));
        }
        Ok(user as u16)
    }

    async fn get_pin_code(&self, entity: &Entity<'_>, user: u16) -> Result<(), ExtendError> {
        let mut payload = AttributeMap::new();
        payload.insert("userid".to_string(), user.into());
        entity
            .session
            .command(entity.endpoint, name::DOOR_LOCK, "getPinCode", payload, &CommandOptions::default())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Encode for PinCodeEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_get(&self) -> bool {
        true
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let request = value
            .as_object()
            .ok_or_else(|| ExtendError::invalid_value(key, format!("{value} is not an object")))?;
        let user = Self::user(request, meta)?;

        let mut payload = AttributeMap::new();
        payload.insert("userid".to_string(), user.into());
        let command = match request.get("pin_code") {
            None | Some(Value::Null) => "clearPinCode",
            Some(pin_code) => {
                let pin_code = match pin_code {
                    Value::String(code) => code.clone(),
                    Value::Number(code) => code.to_string(),
                    other => {
                        return Err(ExtendError::invalid_value("pin_code", format!("{other} is not a pin code")))
                    }
                };
                let user_type = request
                    .get("user_type")
                    .and_then(Value::as_str)
                    .unwrap_or("unrestricted");
                let enabled = request
                    .get("user_enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                payload.insert("userstatus".to_string(), Value::from(if enabled { 1 } else { 3 }));
                payload.insert(
                    "usertype".to_string(),
                    self.user_types.require_value("user_type", user_type)?.into(),
                );
                payload.insert("pincodevalue".to_string(), pin_code.into());
                "setPinCode"
            }
        };
        entity
            .session
            .command(entity.endpoint, name::DOOR_LOCK, command, payload, &CommandOptions::default())
            .await?;
        Ok(None)
    }

    /// One user when the request names it, every slot otherwise
    async fn convert_get(
        &self,
        entity: &Entity<'_>,
        _key: &str,
        meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        if let Some(request) = meta.message_value("pin_code").and_then(Value::as_object) {
            if request.contains_key("user") {
                return self.get_pin_code(entity, Self::user(request, meta)?).await;
            }
        }
        for user in 0..meta.meta.pin_code_count.unwrap_or(0) {
            self.get_pin_code(entity, user).await?;
        }
        Ok(())
    }
}

fn event_decoder(command: &str, code_field: &'static str, source_field: &'static str, events: Lookup) -> Decoder {
    let sources = event_sources();
    Decoder::new(name::DOOR_LOCK, vec![MessageKind::command(command)], move |msg, _ctx| {
        let code = to_number(msg.data.get(code_field)?)? as i64;
        let mut state = State::new();
        state.insert("action".to_string(), events.name_of(code).map_or(Value::Null, Value::from));
        if let Some(user) = msg.data.get("userid") {
            state.insert("action_user".to_string(), user.clone());
        }
        if let Some(source) = msg.data.get(source_field) {
            state.insert("action_source".to_string(), source.clone());
            let source_name = to_number(source).and_then(|s| sources.name_of(s as i64));
            state.insert("action_source_name".to_string(), source_name.map_or(Value::Null, Value::from));
        }
        Some(state)
    })
}

/// Door lock capability
pub fn lock(args: LockArgs) -> Result<Extend, ExtendError> {
    let doors = door_states();
    let statuses = user_statuses();
    let user_types = user_types();

    let mut actions = operation_events().names();
    for event in programming_events().names() {
        if !actions.contains(&event) {
            actions.push(event);
        }
    }

    let pin_code = Expose::composite("pin_code", "pin_code", access::ALL)
        .with_feature(
            Expose::numeric("user", access::SET)
                .with_description("User ID to set or clear the pincode for"),
        )
        .with_feature(
            Expose::enumeration("user_type", access::SET, user_types.names()).with_description("Type of user"),
        )
        .with_feature(
            Expose::binary("user_enabled", access::SET, true.into(), false.into())
                .with_description("Whether the user is enabled/disabled"),
        )
        .with_feature(
            Expose::text("pin_code", access::SET).with_description("Pincode to set, set pincode to null to clear"),
        );

    let attributes = Decoder::attributes(name::DOOR_LOCK, move |msg, ctx| {
        let mut state = State::new();
        if let Some(lock_state) = msg.data.get("lockState").and_then(to_number) {
            let lock_state = lock_state as usize;
            let locked = if lock_state == 1 { "LOCK" } else { "UNLOCK" };
            state.insert(ctx.postfix("state", msg), locked.into());
            if let Some(label) = LOCK_STATES.get(lock_state) {
                state.insert(ctx.postfix("lock_state", msg), (*label).into());
            }
        }
        if let Some(door_state) = msg.data.get("doorState").and_then(to_number) {
            if let Some(label) = doors.name_of(door_state as i64) {
                state.insert(ctx.postfix("door_state", msg), label.into());
            }
        }
        (!state.is_empty()).then_some(state)
    });

    let pin_code_response = Decoder::new(
        name::DOOR_LOCK,
        vec![MessageKind::command("commandGetPinCodeRsp")],
        move |msg, ctx| {
            let user = to_number(msg.data.get("userid")?)? as i64;
            let status = to_number(msg.data.get("userstatus")?)? as i64;
            let status = statuses
                .name_of(status)
                .map_or_else(|| format!("not_supported_{status}"), str::to_string);
            let mut entry = Map::new();
            entry.insert("status".to_string(), status.into());
            if ctx.options.expose_pin {
                if let Some(pin) = msg.data.get("pincodevalue").filter(|pin| !pin.is_null()) {
                    entry.insert("pin_code".to_string(), pin.clone());
                }
            }
            let mut users = Map::new();
            users.insert(user.to_string(), Value::Object(entry));
            let mut state = State::new();
            state.insert("users".to_string(), Value::Object(users));
            Some(state)
        },
    );

    let configure = setup_configure_for_reporting(
        name::DOOR_LOCK,
        Attribute::from("lockState"),
        Some(&ReportingConfig::new("MIN", "1_HOUR", 0.0)),
        access::STATE_GET,
        None,
        &CommandOptions::default(),
    )?;

    let mut extend = Extend::new()
        .with_expose(Expose::lock())
        .with_expose(pin_code)
        .with_expose(
            Expose::enumeration("door_state", access::STATE, door_states().names())
                .with_description("State of the door"),
        )
        .with_expose(Expose::enumeration("action", access::STATE, actions).with_description("Triggered action on the lock"))
        .with_expose(
            Expose::enumeration("action_source_name", access::STATE, event_sources().names())
                .with_description("Source of the triggered action on the lock"),
        )
        .with_expose(Expose::numeric("action_user", access::STATE).with_description("ID of user that triggered the action on the lock"))
        .with_decoder(attributes)
        .with_decoder(event_decoder(
            "commandOperationEventNotification",
            "opereventcode",
            "opereventsrc",
            operation_events(),
        ))
        .with_decoder(event_decoder(
            "commandProgrammingEventNotification",
            "programeventcode",
            "programeventsrc",
            programming_events(),
        ))
        .with_decoder(pin_code_response)
        .with_encoder(Arc::new(LockEncoder {
            keys: vec!["state".to_string()],
        }))
        .with_encoder(Arc::new(PinCodeEncoder {
            keys: vec!["pin_code".to_string()],
            user_types,
        }))
        .with_configure_opt(configure)
        .with_option(
            Expose::binary("expose_pin", access::SET, true.into(), false.into())
                .with_description("Expose pin of this lock in the published payload (default false)."),
        );
    extend.meta = DefinitionMeta {
        pin_code_count: Some(args.pin_code_count),
        ..DefinitionMeta::default()
    };
    tracing::trace!("Lock capability with {} pin code slots", args.pin_code_count);
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
    use zigbee_core::{Endpoint, MemoryDevice, Message, ZigbeeDevice};

    fn door() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([3, 0, 0, 0, 0, 0, 0, 0], 0x0003);
        device
            .endpoints
            .push(Endpoint::new(1, vec![id::BASIC, id::DOOR_LOCK], vec![]));
        MemoryDevice::new(device)
    }

    fn definition() -> Definition {
        Definition::from_extends(
            vec![],
            "LOCK",
            "Test",
            "",
            vec![lock(LockArgs { pin_code_count: 3 }).unwrap()],
        )
    }

    fn data(pairs: &[(&str, Value)]) -> AttributeMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    fn commands(session: &MemoryDevice) -> Vec<(String, AttributeMap)> {
        session
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::Command { command, payload, .. } => Some((command, payload)),
                _ => None,
            })
            .collect()
    }

    async fn set(definition: &Definition, session: &MemoryDevice, key: &str, value: Value) -> Result<State, ExtendError> {
        let mut request = State::new();
        request.insert(key.to_string(), value);
        definition
            .set(session, &DeviceOptions::default(), &Runtime::new(), &request, &State::new())
            .await
    }

    #[test]
    fn test_decode_lock_and_door_state() {
        let state = definition().decode(
            &Message::report("closuresDoorLock", 1, data(&[("lockState", json!(1)), ("doorState", json!(3))])),
            &door(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["state"], json!("LOCK"));
        assert_eq!(state["lock_state"], json!("locked"));
        assert_eq!(state["door_state"], json!("error_forced_open"));
    }

    #[test]
    fn test_operation_event() {
        let msg = Message::new(
            "closuresDoorLock",
            MessageKind::command("commandOperationEventNotification"),
            1,
            data(&[("opereventcode", json!(2)), ("opereventsrc", json!(0)), ("userid", json!(4))]),
        );
        let state = definition().decode(&msg, &door(), &DeviceOptions::default(), &Runtime::new());
        assert_eq!(state["action"], json!("unlock"));
        assert_eq!(state["action_source_name"], json!("keypad"));
        assert_eq!(state["action_user"], json!(4));
    }

    #[test]
    fn test_pin_code_response_respects_expose_pin() {
        let msg = Message::new(
            "closuresDoorLock",
            MessageKind::command("commandGetPinCodeRsp"),
            1,
            data(&[("userid", json!(1)), ("userstatus", json!(1)), ("pincodevalue", json!("4321"))]),
        );
        let hidden = definition().decode(&msg, &door(), &DeviceOptions::default(), &Runtime::new());
        assert_eq!(hidden["users"], json!({"1": {"status": "enabled"}}));

        let options = DeviceOptions {
            expose_pin: true,
            ..DeviceOptions::default()
        };
        let shown = definition().decode(&msg, &door(), &options, &Runtime::new());
        assert_eq!(shown["users"], json!({"1": {"status": "enabled", "pin_code": "4321"}}));
    }

    #[tokio::test]
    async fn test_lock_commands() {
        let definition = definition();
        let session = door();
        set(&definition, &session, "state", json!("lock")).await.unwrap();
        set(&definition, &session, "state", json!({"state": "UNLOCK", "code": "1234"}))
            .await
            .unwrap();
        let sent = commands(&session);
        assert_eq!(sent[0].0, "lockDoor");
        assert_eq!(sent[0].1["pincodevalue"], json!(""));
        assert_eq!(sent[1].0, "unlockDoor");
        assert_eq!(sent[1].1["pincodevalue"], json!("1234"));

        let result = set(&definition, &session, "state", json!("OPEN")).await;
        assert!(matches!(result, Err(ExtendError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_pin_code_management() {
        let definition = definition();
        let session = door();
        set(&definition, &session, "pin_code", json!({"user": 2, "pin_code": 1234, "user_enabled": false}))
            .await
            .unwrap();
        set(&definition, &session, "pin_code", json!({"user": 2, "pin_code": null}))
            .await
            .unwrap();
        let sent = commands(&session);
        assert_eq!(sent[0].0, "setPinCode");
        assert_eq!(sent[0].1["pincodevalue"], json!("1234"));
        assert_eq!(sent[0].1["userstatus"], json!(3));
        assert_eq!(sent[0].1["usertype"], json!(0));
        assert_eq!(sent[1].0, "clearPinCode");

        let result = set(&definition, &session, "pin_code", json!({"user": 3, "pin_code": "1"})).await;
        assert!(matches!(result, Err(ExtendError::InvalidValue { .. })));

        session.clear_calls();
        definition
            .get(&session, &DeviceOptions::default(), &Runtime::new(), &["pin_code".to_string()])
            .await
            .unwrap();
        assert_eq!(commands(&session).len(), 3);
    }

    #[tokio::test]
    async fn test_reporting_on_lock_state_only() {
        let definition = definition();
        let session = door();
        definition.configure(&session).await.unwrap();
        let items: Vec<_> = session
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::ConfigureReporting { items, .. } => Some(items),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attribute.key(), "lockState");
        assert_eq!(items[0].minimum_report_interval, 0);
        assert_eq!(items[0].maximum_report_interval, 3600);
        assert_eq!(definition.meta().pin_code_count, Some(3));
    }
}
