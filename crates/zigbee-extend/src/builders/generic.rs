//! Generic attribute converter pairs
//!
//! Each builder bridges one cluster attribute to one exposed leaf (or one
//! leaf per named endpoint): a decoder for reports and read responses, an
//! encoder for set/get, and a reporting step. Every higher-level capability
//! is assembled from these.

use crate::converter::{state_of, DecodeContext, Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{presets, Access, Category, Expose};
use crate::extend::Extend;
use crate::lookup::Lookup;
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{number_value, precision_round, require_number, require_str, to_number};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use zigbee_core::{Attribute, CommandOptions, Message};

/// Direction of a scale function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    FromDevice,
    ToDevice,
}

type ScaleFn = dyn Fn(f64, ScaleDirection) -> f64 + Send + Sync;

/// Raw-to-exposed scaling: a fixed divisor, or a two-way function
#[derive(Clone)]
pub enum Scale {
    Divisor(f64),
    Function(Arc<ScaleFn>),
}

impl Scale {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(f64, ScaleDirection) -> f64 + Send + Sync + 'static,
    {
        Scale::Function(Arc::new(f))
    }

    #[must_use]
    pub fn from_device(&self, raw: f64) -> f64 {
        match self {
            Scale::Divisor(divisor) => raw / divisor,
            Scale::Function(f) => f(raw, ScaleDirection::FromDevice),
        }
    }

    #[must_use]
    pub fn to_device(&self, value: f64) -> f64 {
        match self {
            Scale::Divisor(divisor) => value * divisor,
            Scale::Function(f) => f(value, ScaleDirection::ToDevice),
        }
    }
}

impl fmt::Debug for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Divisor(divisor) => f.debug_tuple("Divisor").field(divisor).finish(),
            Scale::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let divisor = f64::deserialize(deserializer)?;
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(serde::de::Error::custom("scale divisor must be a non-zero number"));
        }
        Ok(Scale::Divisor(divisor))
    }
}

/// Numeric frame value equality (1 == 1.0), falling back to JSON equality
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Exposed property for an optional endpoint binding
pub(crate) fn property_for(name: &str, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(ep) => format!("{name}_{ep}"),
        None => name.to_string(),
    }
}

/// Which endpoint name a frame belongs to, or `None` when it should be ignored
pub(crate) fn frame_endpoint(
    msg: &Message,
    ctx: &DecodeContext<'_>,
    endpoint_names: Option<&[String]>,
) -> Option<Option<String>> {
    match endpoint_names {
        None => Some(None),
        Some(names) => {
            let name = ctx.endpoint_name(msg);
            names.contains(&name).then_some(Some(name))
        }
    }
}

/// One entry per endpoint name, or the entry itself
pub(crate) fn per_endpoint(expose: Expose, endpoint_names: Option<&[String]>) -> Vec<Expose> {
    match endpoint_names {
        Some(names) => names
            .iter()
            .map(|ep| expose.clone().with_endpoint(ep))
            .collect(),
        None => vec![expose],
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericArgs {
    pub name: String,
    pub cluster: String,
    pub attribute: Attribute,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub value_min: Option<f64>,
    #[serde(default)]
    pub value_max: Option<f64>,
    #[serde(default)]
    pub value_step: Option<f64>,
    /// Raw values meaning "no data"
    #[serde(default)]
    pub value_ignore: Vec<f64>,
    #[serde(default)]
    pub scale: Option<Scale>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub reporting: Option<ReportingConfig>,
    #[serde(default)]
    pub endpoint_names: Option<Vec<String>>,
    #[serde(default)]
    pub entity_category: Option<Category>,
    #[serde(default)]
    pub zigbee_command_options: CommandOptions,
}

impl NumericArgs {
    #[must_use]
    pub fn new(name: &str, cluster: &str, attribute: impl Into<Attribute>) -> Self {
        Self {
            name: name.to_string(),
            cluster: cluster.to_string(),
            attribute: attribute.into(),
            description: None,
            label: None,
            access: Access::default(),
            unit: None,
            value_min: None,
            value_max: None,
            value_step: None,
            value_ignore: Vec::new(),
            scale: None,
            precision: None,
            reporting: None,
            endpoint_names: None,
            entity_category: None,
            zigbee_command_options: CommandOptions::default(),
        }
    }

    fn expose(&self) -> Expose {
        let mut expose = Expose::numeric(&self.name, self.access.bits());
        if let Some(label) = &self.label {
            expose = expose.with_label(label);
        }
        if let Some(description) = &self.description {
            expose = expose.with_description(description);
        }
        if let Some(unit) = &self.unit {
            expose = expose.with_unit(unit);
        }
        if let Some(min) = self.value_min {
            expose = expose.with_value_min(min);
        }
        if let Some(max) = self.value_max {
            expose = expose.with_value_max(max);
        }
        if let Some(step) = self.value_step {
            expose = expose.with_value_step(step);
        }
        if let Some(category) = self.entity_category {
            expose = expose.with_category(category);
        }
        expose
    }

    /// Decoded value of a raw reading, `None` for sentinels
    fn decode_raw(&self, raw: f64) -> Option<f64> {
        if self.value_ignore.contains(&raw) {
            return None;
        }
        let mut value = match &self.scale {
            Some(scale) => scale.from_device(raw),
            None => raw,
        };
        if let Some(precision) = self.precision {
            value = precision_round(value, precision);
        }
        value.is_finite().then_some(value)
    }
}

struct NumericEncoder {
    keys: Vec<String>,
    args: Arc<NumericArgs>,
}

#[async_trait]
impl Encode for NumericEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_set(&self) -> bool {
        self.args.access.settable()
    }

    fn supports_get(&self) -> bool {
        true
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let args = &self.args;
        let mut number = require_number(key, value)?;
        if let Some(min) = args.value_min {
            number = number.max(min);
        }
        if let Some(max) = args.value_max {
            number = number.min(max);
        }
        let raw = match &args.scale {
            Some(scale) => scale.to_device(number),
            None => number,
        };
        entity
            .session
            .write(
                entity.endpoint,
                &args.cluster,
                &[(args.attribute.clone(), number_value(precision_round(raw, 6)))],
                &args.zigbee_command_options,
            )
            .await?;
        Ok(Some(state_of(key, number_value(number))))
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
                &self.args.cluster,
                &[self.args.attribute.clone()],
                &self.args.zigbee_command_options,
            )
            .await?;
        Ok(())
    }
}

/// Numeric attribute converter pair
pub fn numeric(args: NumericArgs) -> Result<Extend, ExtendError> {
    let args = Arc::new(args);
    let endpoint_names = args.endpoint_names.as_deref();

    let decoder_args = args.clone();
    let decoder = Decoder::attributes(&args.cluster, move |msg, ctx| {
        let args = &decoder_args;
        let raw = msg.data.get(&args.attribute.key())?;
        let endpoint = frame_endpoint(msg, ctx, args.endpoint_names.as_deref())?;
        let value = args.decode_raw(to_number(raw)?)?;
        Some(state_of(
            property_for(&args.name, endpoint.as_deref()),
            number_value(value),
        ))
    });

    let configure = setup_configure_for_reporting(
        &args.cluster,
        args.attribute.clone(),
        args.reporting.as_ref(),
        args.access.bits(),
        endpoint_names,
        &args.zigbee_command_options,
    )?;

    let mut extend = Extend::new()
        .with_decoder(decoder)
        .with_encoder(Arc::new(NumericEncoder {
            keys: vec![args.name.clone()],
            args: args.clone(),
        }))
        .with_configure_opt(configure);
    extend.exposes = per_endpoint(args.expose(), endpoint_names);
    Ok(extend)
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinaryArgs {
    pub name: String,
    pub cluster: String,
    pub attribute: Attribute,
    /// Exposed value and its raw counterpart
    pub value_on: (Value, Value),
    pub value_off: (Value, Value),
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub reporting: Option<ReportingConfig>,
    #[serde(default)]
    pub endpoint_names: Option<Vec<String>>,
    #[serde(default)]
    pub entity_category: Option<Category>,
    #[serde(default)]
    pub zigbee_command_options: CommandOptions,
}

struct BinaryEncoder {
    keys: Vec<String>,
    args: Arc<BinaryArgs>,
}

#[async_trait]
impl Encode for BinaryEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_set(&self) -> bool {
        self.args.access.settable()
    }

    fn supports_get(&self) -> bool {
        true
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let args = &self.args;
        let raw = if values_equal(value, &args.value_on.0) {
            args.value_on.1.clone()
        } else if values_equal(value, &args.value_off.0) {
            args.value_off.1.clone()
        } else {
            return Err(ExtendError::invalid_value(
                key,
                format!("expected {} or {}", args.value_on.0, args.value_off.0),
            ));
        };
        entity
            .session
            .write(
                entity.endpoint,
                &args.cluster,
                &[(args.attribute.clone(), raw)],
                &args.zigbee_command_options,
            )
            .await?;
        Ok(Some(state_of(key, value.clone())))
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
                &self.args.cluster,
                &[self.args.attribute.clone()],
                &self.args.zigbee_command_options,
            )
            .await?;
        Ok(())
    }
}

/// Binary attribute converter pair
pub fn binary(args: BinaryArgs) -> Result<Extend, ExtendError> {
    let args = Arc::new(args);
    let endpoint_names = args.endpoint_names.as_deref();

    let mut expose = Expose::binary(
        &args.name,
        args.access.bits(),
        args.value_on.0.clone(),
        args.value_off.0.clone(),
    );
    if let Some(label) = &args.label {
        expose = expose.with_label(label);
    }
    if let Some(description) = &args.description {
        expose = expose.with_description(description);
    }
    if let Some(category) = args.entity_category {
        expose = expose.with_category(category);
    }

    let decoder_args = args.clone();
    let decoder = Decoder::attributes(&args.cluster, move |msg, ctx| {
        let args = &decoder_args;
        let raw = msg.data.get(&args.attribute.key())?;
        let endpoint = frame_endpoint(msg, ctx, args.endpoint_names.as_deref())?;
        let value = if values_equal(raw, &args.value_on.1) {
            args.value_on.0.clone()
        } else if values_equal(raw, &args.value_off.1) {
            args.value_off.0.clone()
        } else {
            return None;
        };
        Some(state_of(property_for(&args.name, endpoint.as_deref()), value))
    });

    let configure = setup_configure_for_reporting(
        &args.cluster,
        args.attribute.clone(),
        args.reporting.as_ref(),
        args.access.bits(),
        endpoint_names,
        &args.zigbee_command_options,
    )?;

    let mut extend = Extend::new()
        .with_decoder(decoder)
        .with_encoder(Arc::new(BinaryEncoder {
            keys: vec![args.name.clone()],
            args: args.clone(),
        }))
        .with_configure_opt(configure);
    extend.exposes = per_endpoint(expose, endpoint_names);
    Ok(extend)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumLookupArgs {
    pub name: String,
    pub cluster: String,
    pub attribute: Attribute,
    pub lookup: Lookup,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub reporting: Option<ReportingConfig>,
    #[serde(default)]
    pub endpoint_names: Option<Vec<String>>,
    #[serde(default)]
    pub entity_category: Option<Category>,
    #[serde(default)]
    pub zigbee_command_options: CommandOptions,
}

impl EnumLookupArgs {
    #[must_use]
    pub fn new(name: &str, cluster: &str, attribute: impl Into<Attribute>, lookup: Lookup) -> Self {
        Self {
            name: name.to_string(),
            cluster: cluster.to_string(),
            attribute: attribute.into(),
            lookup,
            description: None,
            label: None,
            access: Access::default(),
            reporting: None,
            endpoint_names: None,
            entity_category: None,
            zigbee_command_options: CommandOptions::default(),
        }
    }
}

struct EnumEncoder {
    keys: Vec<String>,
    args: Arc<EnumLookupArgs>,
}

#[async_trait]
impl Encode for EnumEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    fn supports_set(&self) -> bool {
        self.args.access.settable()
    }

    fn supports_get(&self) -> bool {
        true
    }

    async fn convert_set(
        &self,
        entity: &Entity<'_>,
        key: &str,
        value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let args = &self.args;
        let name = require_str(key, value)?;
        let raw = args.lookup.require_value(key, name)?;
        entity
            .session
            .write(
                entity.endpoint,
                &args.cluster,
                &[(args.attribute.clone(), Value::from(raw))],
                &args.zigbee_command_options,
            )
            .await?;
        // Echo the canonical spelling
        let canonical = args.lookup.name_of(raw).unwrap_or(name);
        Ok(Some(state_of(key, canonical)))
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
                &self.args.cluster,
                &[self.args.attribute.clone()],
                &self.args.zigbee_command_options,
            )
            .await?;
        Ok(())
    }
}

/// Enum attribute converter pair over a lookup table
pub fn enum_lookup(args: EnumLookupArgs) -> Result<Extend, ExtendError> {
    if args.lookup.is_empty() {
        return Err(ExtendError::Construction(format!(
            "enum '{}' has an empty lookup table",
            args.name
        )));
    }
    let args = Arc::new(args);
    let endpoint_names = args.endpoint_names.as_deref();

    let mut expose = Expose::enumeration(&args.name, args.access.bits(), args.lookup.names());
    if let Some(label) = &args.label {
        expose = expose.with_label(label);
    }
    if let Some(description) = &args.description {
        expose = expose.with_description(description);
    }
    if let Some(category) = args.entity_category {
        expose = expose.with_category(category);
    }

    let decoder_args = args.clone();
    let decoder = Decoder::attributes(&args.cluster, move |msg, ctx| {
        let args = &decoder_args;
        let raw = msg.data.get(&args.attribute.key())?;
        let endpoint = frame_endpoint(msg, ctx, args.endpoint_names.as_deref())?;
        let raw = to_number(raw)? as i64;
        let Some(name) = args.lookup.name_of(raw) else {
            tracing::debug!("Unknown {} value {} from {}", args.name, raw, ctx.session.ieee_address());
            return None;
        };
        Some(state_of(property_for(&args.name, endpoint.as_deref()), name))
    });

    let configure = setup_configure_for_reporting(
        &args.cluster,
        args.attribute.clone(),
        args.reporting.as_ref(),
        args.access.bits(),
        endpoint_names,
        &args.zigbee_command_options,
    )?;

    let mut extend = Extend::new()
        .with_decoder(decoder)
        .with_encoder(Arc::new(EnumEncoder {
            keys: vec![args.name.clone()],
            args: args.clone(),
        }))
        .with_configure_opt(configure);
    extend.exposes = per_endpoint(expose, endpoint_names);
    Ok(extend)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionEnumLookupArgs {
    pub cluster: String,
    pub attribute: Attribute,
    pub action_lookup: Lookup,
    #[serde(default)]
    pub endpoint_names: Option<Vec<String>>,
    /// Additional action names the device may emit through other decoders
    #[serde(default)]
    pub extra_actions: Vec<String>,
}

/// Read-only enum published as an `action`
pub fn action_enum_lookup(args: ActionEnumLookupArgs) -> Result<Extend, ExtendError> {
    if args.action_lookup.is_empty() {
        return Err(ExtendError::Construction(
            "action lookup table is empty".to_string(),
        ));
    }
    let mut actions = Vec::new();
    for name in args.action_lookup.names() {
        match &args.endpoint_names {
            Some(endpoints) => actions.extend(endpoints.iter().map(|ep| format!("{name}_{ep}"))),
            None => actions.push(name),
        }
    }
    actions.extend(args.extra_actions.iter().cloned());

    let cluster = args.cluster.clone();
    let decoder = Decoder::attributes(&cluster, move |msg, ctx| {
        let raw = msg.data.get(&args.attribute.key())?;
        let endpoint = frame_endpoint(msg, ctx, args.endpoint_names.as_deref())?;
        let action = args.action_lookup.name_of(to_number(raw)? as i64)?;
        Some(state_of("action", property_for(action, endpoint.as_deref())))
    });

    Ok(Extend::new()
        .with_expose(presets::action(actions))
        .with_decoder(decoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Runtime};
    use crate::options::DeviceOptions;
    use serde_json::json;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{AttributeMap, Endpoint, MemoryDevice, ZigbeeDevice};

    fn device() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([4, 0, 0, 0, 0, 0, 0, 0], 0x0004);
        device.endpoints.push(Endpoint::new(
            1,
            vec![id::TEMPERATURE_MEASUREMENT, id::ON_OFF, id::ANALOG_INPUT],
            vec![],
        ));
        MemoryDevice::new(device)
    }

    fn report(cluster: &str, attribute: &str, value: Value) -> Message {
        let mut data = AttributeMap::new();
        data.insert(attribute.to_string(), value);
        Message::report(cluster, 1, data)
    }

    fn definition(extend: Extend) -> Definition {
        Definition::from_extends(vec!["TEST".to_string()], "TEST", "Test", "Test device", vec![extend])
    }

    fn setpoint() -> NumericArgs {
        let mut args = NumericArgs::new("setpoint", "genAnalogInput", "presentValue");
        args.scale = Some(Scale::Divisor(100.0));
        args.value_min = Some(5.0);
        args.value_max = Some(35.0);
        args
    }

    #[tokio::test]
    async fn test_numeric_divisor_round_trip() {
        let definition = definition(numeric(setpoint()).unwrap());
        let session = device();
        let runtime = Runtime::new();
        let options = DeviceOptions::default();

        for x in [5.0, 7.25, 21.5, 34.99, 35.0] {
            let mut request = State::new();
            request.insert("setpoint".to_string(), json!(x));
            definition
                .set(&session, &options, &runtime, &request, &State::new())
                .await
                .unwrap();

            let raw = session.value(1, "genAnalogInput", "presentValue").unwrap();
            let state = definition.decode(
                &report("genAnalogInput", "presentValue", raw),
                &session,
                &options,
                &runtime,
            );
            let decoded = state["setpoint"].as_f64().unwrap();
            assert!((decoded - x).abs() < 1e-9, "{x} decoded as {decoded}");
        }
    }

    #[tokio::test]
    async fn test_numeric_clamps_on_encode() {
        let definition = definition(numeric(setpoint()).unwrap());
        let session = device();
        let mut request = State::new();
        request.insert("setpoint".to_string(), json!(80));
        let echo = definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &request, &State::new())
            .await
            .unwrap();
        assert_eq!(echo["setpoint"], json!(35));
        assert_eq!(session.value(1, "genAnalogInput", "presentValue"), Some(json!(3500)));
    }

    #[test]
    fn test_numeric_sentinel_yields_nothing() {
        let mut args = NumericArgs::new("temperature", "msTemperatureMeasurement", "measuredValue");
        args.scale = Some(Scale::Divisor(100.0));
        args.value_ignore = vec![-32768.0];
        let definition = definition(numeric(args).unwrap());
        let state = definition.decode(
            &report("msTemperatureMeasurement", "measuredValue", json!(-32768)),
            &device(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_numeric_get_reads_without_state() {
        let definition = definition(numeric(setpoint()).unwrap());
        let session = device();
        definition
            .get(&session, &DeviceOptions::default(), &Runtime::new(), &["setpoint".to_string()])
            .await
            .unwrap();
        assert!(matches!(
            &session.calls()[0],
            SessionCall::Read { cluster, attributes, .. }
                if cluster == "genAnalogInput" && attributes == &vec!["presentValue".to_string()]
        ));
    }

    #[tokio::test]
    async fn test_read_only_numeric_rejects_set() {
        let mut args = NumericArgs::new("temperature", "msTemperatureMeasurement", "measuredValue");
        args.access = Access::StateGet;
        let definition = definition(numeric(args).unwrap());
        let session = device();
        let mut request = State::new();
        request.insert("temperature".to_string(), json!(20));
        let echo = definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &request, &State::new())
            .await
            .unwrap();
        assert!(echo.is_empty());
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_binary_pair() {
        let args: BinaryArgs = serde_json::from_value(json!({
            "name": "child_lock",
            "cluster": "genOnOff",
            "attribute": {"id": 32768, "type": "boolean"},
            "value_on": ["LOCK", 1],
            "value_off": ["UNLOCK", 0]
        }))
        .unwrap();
        let definition = definition(binary(args).unwrap());
        let session = device();

        let state = definition.decode(
            &report("genOnOff", "32768", json!(1)),
            &session,
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["child_lock"], json!("LOCK"));

        let mut request = State::new();
        request.insert("child_lock".to_string(), json!("UNLOCK"));
        definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &request, &State::new())
            .await
            .unwrap();
        assert_eq!(session.value(1, "genOnOff", "32768"), Some(json!(0)));

        request.insert("child_lock".to_string(), json!("MAYBE"));
        let err = definition
            .set(&session, &DeviceOptions::default(), &Runtime::new(), &request, &State::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtendError::InvalidValue { .. }));
    }

    #[test]
    fn test_enum_unknown_value_ignored() {
        let args = EnumLookupArgs::new(
            "operation_mode",
            "genOnOff",
            "operationMode",
            Lookup::new(&[("normal", 0), ("eco", 1)]),
        );
        let definition = definition(enum_lookup(args).unwrap());
        let session = device();
        let decode = |value| {
            definition.decode(
                &report("genOnOff", "operationMode", value),
                &session,
                &DeviceOptions::default(),
                &Runtime::new(),
            )
        };
        assert_eq!(decode(json!(1))["operation_mode"], json!("eco"));
        assert!(decode(json!(9)).is_empty());
    }

    #[test]
    fn test_endpoint_names_filter_and_qualify() {
        let mut args = NumericArgs::new("power", "genAnalogInput", "presentValue");
        args.endpoint_names = Some(vec!["l1".to_string()]);
        let endpoints = crate::endpoint::device_endpoints(crate::endpoint::DeviceEndpointsArgs {
            endpoints: std::collections::BTreeMap::from([("l1".to_string(), 1), ("l2".to_string(), 2)]),
            multi_endpoint: None,
        });
        let definition = Definition::from_extends(
            vec![],
            "TEST",
            "Test",
            "",
            vec![endpoints, numeric(args).unwrap()],
        );
        assert_eq!(definition.expose_names(), vec!["power_l1".to_string()]);

        let session = device();
        let mut msg = report("genAnalogInput", "presentValue", json!(12));
        let state = definition.decode(&msg, &session, &DeviceOptions::default(), &Runtime::new());
        assert_eq!(state["power_l1"], json!(12));

        msg.endpoint = 2;
        let state = definition.decode(&msg, &session, &DeviceOptions::default(), &Runtime::new());
        assert!(state.is_empty());
    }

    #[test]
    fn test_action_enum_lookup() {
        let args: ActionEnumLookupArgs = serde_json::from_value(json!({
            "cluster": "genMultistateInput",
            "attribute": "presentValue",
            "action_lookup": {"hold": 0, "single": 1, "double": 2}
        }))
        .unwrap();
        let extend = action_enum_lookup(args).unwrap();
        let definition = definition(extend);
        let state = definition.decode(
            &report("genMultistateInput", "presentValue", json!(2)),
            &device(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["action"], json!("double"));
    }
}
