//! On/off switch capability

use crate::builders::generic::{enum_lookup, frame_endpoint, property_for, EnumLookupArgs};
use crate::converter::{state_of, DecodeContext, Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, Access, Category, Expose};
use crate::extend::Extend;
use crate::lookup::Lookup;
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{require_number, require_str, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, AttributeMap, CommandOptions, Message};

pub(crate) fn power_on_lookup() -> Lookup {
    Lookup::new(&[("off", 0), ("on", 1), ("toggle", 2), ("previous", 255)])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OnOffArgs {
    /// Expose `power_on_behavior` (`startUpOnOff`), read best-effort
    pub power_on_behavior: bool,
    pub endpoint_names: Option<Vec<String>>,
}

impl Default for OnOffArgs {
    fn default() -> Self {
        Self {
            power_on_behavior: true,
            endpoint_names: None,
        }
    }
}

/// State key of a frame: filtered by endpoint names when given, otherwise
/// qualified through the device's endpoint table
pub(crate) fn state_key(
    key: &str,
    msg: &Message,
    ctx: &DecodeContext<'_>,
    endpoint_names: Option<&[String]>,
) -> Option<String> {
    match endpoint_names {
        Some(_) => {
            let endpoint = frame_endpoint(msg, ctx, endpoint_names)?;
            Some(property_for(key, endpoint.as_deref()))
        }
        None => Some(ctx.postfix(key, msg)),
    }
}

pub(crate) fn on_off_decoder(endpoint_names: Option<Vec<String>>) -> Decoder {
    Decoder::attributes(name::ON_OFF, move |msg, ctx| {
        let on = to_number(msg.data.get("onOff")?)? != 0.0;
        let key = state_key("state", msg, ctx, endpoint_names.as_deref())?;
        Some(state_of(key, if on { "ON" } else { "OFF" }))
    })
}

/// Reporting on `onOff` for every resolved endpoint, never optional
pub(crate) fn on_off_reporting(endpoint_names: Option<&[String]>) -> Result<Extend, ExtendError> {
    let step = setup_configure_for_reporting(
        name::ON_OFF,
        Attribute::from("onOff"),
        Some(&ReportingConfig::new("MIN", "MAX", 1.0)),
        access::ALL,
        endpoint_names,
        &CommandOptions::default(),
    )?;
    Ok(Extend::new().with_configure_opt(step))
}

pub(crate) fn power_on_behavior(endpoint_names: Option<Vec<String>>) -> Result<Extend, ExtendError> {
    let mut args = EnumLookupArgs::new(
        "power_on_behavior",
        name::ON_OFF,
        "startUpOnOff",
        power_on_lookup(),
    );
    args.label = Some("Power-on behavior".to_string());
    args.description =
        Some("Controls the behavior when the device is powered on after power loss".to_string());
    args.access = Access::All;
    args.entity_category = Some(Category::Config);
    args.endpoint_names = endpoint_names;
    enum_lookup(args)
}

/// Send `on`/`off`/`toggle`, or `onWithTimedOff` when `on_time` is given.
/// Returns the optimistic echo under `state`.
pub(crate) async fn send_on_off(
    entity: &Entity<'_>,
    state: &str,
    meta: &EncodeMeta<'_>,
) -> Result<Option<State>, ExtendError> {
    let command = state.to_lowercase();
    if !matches!(command.as_str(), "on" | "off" | "toggle") {
        return Err(ExtendError::invalid_value(
            "state",
            format!("'{state}' is not one of ON, OFF, TOGGLE"),
        ));
    }

    let on_time = meta.message_value("on_time");
    let off_wait_time = meta.message_value("off_wait_time");
    if command == "on" && (on_time.is_some() || off_wait_time.is_some()) {
        let on_time = on_time.map(|v| require_number("on_time", v)).transpose()?.unwrap_or(0.0);
        let off_wait_time = off_wait_time
            .map(|v| require_number("off_wait_time", v))
            .transpose()?
            .unwrap_or(0.0);
        let mut payload = AttributeMap::new();
        payload.insert("ctrlbits".to_string(), 0.into());
        payload.insert("ontime".to_string(), ((on_time * 10.0).round() as u64).into());
        payload.insert(
            "offwaittime".to_string(),
            ((off_wait_time * 10.0).round() as u64).into(),
        );
        entity
            .session
            .command(
                entity.endpoint,
                name::ON_OFF,
                "onWithTimedOff",
                payload,
                &CommandOptions::default(),
            )
            .await?;
        // The device turns itself off later; no echo
        return Ok(None);
    }

    entity
        .session
        .command(
            entity.endpoint,
            name::ON_OFF,
            &command,
            AttributeMap::new(),
            &CommandOptions::default(),
        )
        .await?;

    if command == "toggle" {
        return Ok(meta.state_value("state").and_then(Value::as_str).map(|current| {
            state_of("state", if current == "OFF" { "ON" } else { "OFF" })
        }));
    }
    Ok(Some(state_of("state", command.to_uppercase())))
}

struct OnOffEncoder {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for OnOffEncoder {
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
        let state = if key == "state" {
            require_str(key, value)?
        } else {
            let state = meta
                .message_value("state")
                .ok_or_else(|| ExtendError::invalid_value(key, "requires 'state'"))?;
            require_str("state", state)?
        };
        send_on_off(entity, state, meta).await
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
                name::ON_OFF,
                &[Attribute::from("onOff")],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

/// On/off switch, optionally one per named endpoint
pub fn on_off(args: OnOffArgs) -> Result<Extend, ExtendError> {
    let endpoint_names = args.endpoint_names.as_deref();
    let switch = Expose::switch();
    let exposes: Vec<Expose> = match endpoint_names {
        Some(names) => names.iter().map(|ep| switch.clone().with_endpoint(ep)).collect(),
        None => vec![switch],
    };

    let mut extend = Extend::new()
        .with_decoder(on_off_decoder(args.endpoint_names.clone()))
        .with_encoder(Arc::new(OnOffEncoder {
            keys: vec![
                "state".to_string(),
                "on_time".to_string(),
                "off_wait_time".to_string(),
            ],
        }));
    extend.exposes = exposes;
    extend = extend.merge(on_off_reporting(endpoint_names)?);

    if args.power_on_behavior {
        extend = extend.merge(power_on_behavior(args.endpoint_names.clone())?);
    }
    Ok(extend)
}
