//! Dimmable and color lights
//!
//! A light is on/off plus brightness, with optional color temperature,
//! color (xy and/or hue/saturation) and effects layered on top. Each layer
//! brings its own exposes, converters and configuration.
//!
//! Turning a light off with a transition fades it through the level
//! cluster. The brightness before the fade is kept in the ephemeral store
//! and level reports are ignored until the light is turned on again, which
//! restores the remembered brightness.

use crate::builders::on_off::{on_off_decoder, on_off_reporting, power_on_behavior, send_on_off, state_key};
use crate::converter::{state_of, Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, presets, Expose};
use crate::extend::Extend;
use crate::lookup::Lookup;
use crate::reporting::{setup_configure_for_reading, setup_configure_for_reporting, ReportingConfig};
use crate::store::EntityKey;
use crate::utils::{precision_round, require_number, require_str, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, AttributeMap, CommandOptions};

/// Store slot holding the brightness a light had before a fade-out
const TURNED_OFF_WITH_TRANSITION: &str = "turned_off_with_transition";

const DEFAULT_COLOR_TEMP_RANGE: (f64, f64) = (150.0, 500.0);

/// Effects sent through `genIdentify.triggerEffect`
fn identify_effects() -> Lookup {
    Lookup::new(&[
        ("blink", 0),
        ("breathe", 1),
        ("okay", 2),
        ("channel_change", 11),
        ("finish_effect", 254),
        ("stop_effect", 255),
    ])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Xy,
    Hs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColorTempArgs {
    /// Supported range in mired
    pub range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ColorArgs {
    pub modes: Vec<ColorMode>,
    /// Use the 16-bit enhanced hue commands
    pub enhanced_hue: bool,
    pub apply_red_fix: bool,
}

impl Default for ColorArgs {
    fn default() -> Self {
        Self {
            modes: vec![ColorMode::Xy],
            enhanced_hue: true,
            apply_red_fix: false,
        }
    }
}

impl ColorArgs {
    fn has(&self, mode: ColorMode) -> bool {
        self.modes.contains(&mode)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LightArgs {
    pub effect: bool,
    pub power_on_behavior: bool,
    pub color_temp: Option<ColorTempArgs>,
    pub color: Option<ColorArgs>,
    pub turns_off_at_brightness_1: bool,
    pub configure_reporting: bool,
    pub endpoint_names: Option<Vec<String>>,
}

impl Default for LightArgs {
    fn default() -> Self {
        Self {
            effect: true,
            power_on_behavior: true,
            color_temp: None,
            color: None,
            turns_off_at_brightness_1: false,
            configure_reporting: true,
            endpoint_names: None,
        }
    }
}

/// Transition time in tenths of a second, from the request or the device options
fn transtime(meta: &EncodeMeta<'_>) -> Result<u64, ExtendError> {
    let seconds = match meta.message_value("transition") {
        Some(value) => require_number("transition", value)?,
        None => meta.options.transition.unwrap_or(0.0),
    };
    Ok((seconds.max(0.0) * 10.0).round() as u64)
}

fn entity_key(entity: &Entity<'_>) -> EntityKey {
    EntityKey::endpoint(&entity.session.ieee_address(), entity.endpoint)
}

async fn move_to_level(entity: &Entity<'_>, level: u64, transtime: u64) -> Result<(), ExtendError> {
    let mut payload = AttributeMap::new();
    payload.insert("level".to_string(), level.into());
    payload.insert("transtime".to_string(), transtime.into());
    entity
        .session
        .command(
            entity.endpoint,
            name::LEVEL_CONTROL,
            "moveToLevelWithOnOff",
            payload,
            &CommandOptions::default(),
        )
        .await?;
    Ok(())
}

/// Handles `state` and `brightness` together
struct BrightnessEncoder {
    keys: Vec<String>,
}

impl BrightnessEncoder {
    async fn turn_off(
        &self,
        entity: &Entity<'_>,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let transtime = transtime(meta)?;
        if transtime == 0 {
            return send_on_off(entity, "off", meta).await;
        }
        let current = meta
            .state_value("brightness")
            .and_then(to_number)
            .filter(|level| *level > 0.0)
            .unwrap_or(254.0);
        move_to_level(entity, 0, transtime).await?;
        meta.store
            .put_value(&entity_key(entity), TURNED_OFF_WITH_TRANSITION, current.into());
        Ok(Some(state_of("state", "OFF")))
    }

    async fn turn_on(
        &self,
        entity: &Entity<'_>,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let frozen = meta.store.take_value(&entity_key(entity), TURNED_OFF_WITH_TRANSITION);
        let timed = meta.message_value("on_time").is_some() || meta.message_value("off_wait_time").is_some();
        match frozen.as_ref().and_then(to_number) {
            Some(level) if !timed => {
                let level = level.round().clamp(1.0, 254.0) as u64;
                move_to_level(entity, level, transtime(meta)?).await?;
                let mut echo = state_of("state", "ON");
                echo.insert("brightness".to_string(), level.into());
                Ok(Some(echo))
            }
            _ => send_on_off(entity, "on", meta).await,
        }
    }
}

#[async_trait]
impl Encode for BrightnessEncoder {
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
        _value: &Value,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let state = meta
            .message_value("state")
            .map(|v| require_str("state", v).map(str::to_lowercase))
            .transpose()?;
        let brightness = meta
            .message_value("brightness")
            .map(|v| require_number("brightness", v))
            .transpose()?;

        match (state.as_deref(), brightness) {
            (Some("off"), _) => self.turn_off(entity, meta).await,
            (Some("toggle"), None) => {
                meta.store
                    .take_value(&entity_key(entity), TURNED_OFF_WITH_TRANSITION);
                send_on_off(entity, "toggle", meta).await
            }
            (Some("on"), None) => self.turn_on(entity, meta).await,
            (Some(other), None) => send_on_off(entity, other, meta).await,
            (_, Some(requested)) => {
                let mut level = requested.round().clamp(0.0, 254.0) as u64;
                if level == 1 && meta.meta.turns_off_at_brightness_1 {
                    level = 2;
                }
                meta.store
                    .take_value(&entity_key(entity), TURNED_OFF_WITH_TRANSITION);
                move_to_level(entity, level, transtime(meta)?).await?;
                let mut echo = state_of("state", if level > 0 { "ON" } else { "OFF" });
                echo.insert("brightness".to_string(), level.into());
                Ok(Some(echo))
            }
            (None, None) => Err(ExtendError::invalid_value(key, "requires 'state'")),
        }
    }

    async fn convert_get(
        &self,
        entity: &Entity<'_>,
        key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        let (cluster, attribute) = match key {
            "brightness" => (name::LEVEL_CONTROL, "currentLevel"),
            _ => (name::ON_OFF, "onOff"),
        };
        entity
            .session
            .read(
                entity.endpoint,
                cluster,
                &[Attribute::from(attribute)],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

/// `transition` only modifies other keys
struct TransitionEncoder {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for TransitionEncoder {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    async fn convert_set(
        &self,
        _entity: &Entity<'_>,
        _key: &str,
        _value: &Value,
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        Ok(None)
    }
}

struct ColorTempEncoder {
    keys: Vec<String>,
    range: (f64, f64),
}

#[async_trait]
impl Encode for ColorTempEncoder {
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
        let (min, max) = self.range;
        let mired = match value.as_str() {
            Some("warmest") => max,
            Some("warm") => 454.0,
            Some("neutral") => 370.0,
            Some("cool") => 250.0,
            Some("coolest") => min,
            Some(other) => {
                return Err(ExtendError::invalid_value(
                    key,
                    format!("unknown preset '{other}'"),
                ))
            }
            None => require_number(key, value)?,
        };
        let mired = mired.round().clamp(min, max) as u64;

        let mut payload = AttributeMap::new();
        payload.insert("colortemp".to_string(), mired.into());
        payload.insert("transtime".to_string(), transtime(meta)?.into());
        entity
            .session
            .command(
                entity.endpoint,
                name::COLOR_CONTROL,
                "moveToColorTemp",
                payload,
                &CommandOptions::default(),
            )
            .await?;
        Ok(Some(state_of("color_temp", mired)))
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
                name::COLOR_CONTROL,
                &[Attribute::from("colorTemperature")],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

/// sRGB (0-255 per channel) to CIE xy, Wide RGB D65
fn rgb_to_xy(red: f64, green: f64, blue: f64) -> (f64, f64) {
    let gamma = |c: f64| {
        let c = c / 255.0;
        if c > 0.04045 {
            ((c + 0.055) / 1.055).powf(2.4)
        } else {
            c / 12.92
        }
    };
    let (r, g, b) = (gamma(red), gamma(green), gamma(blue));
    let x = r * 0.664_511 + g * 0.154_324 + b * 0.162_028;
    let y = r * 0.283_881 + g * 0.668_433 + b * 0.047_685;
    let z = r * 0.000_088 + g * 0.072_310 + b * 0.986_039;
    let sum = x + y + z;
    if sum == 0.0 {
        return (0.0, 0.0);
    }
    (precision_round(x / sum, 4), precision_round(y / sum, 4))
}

struct ColorEncoder {
    keys: Vec<String>,
    args: ColorArgs,
}

impl ColorEncoder {
    async fn move_to_xy(
        &self,
        entity: &Entity<'_>,
        mut x: f64,
        mut y: f64,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        if meta.meta.apply_red_fix && x == 0.701 && y == 0.299 {
            x = 0.7006;
            y = 0.2993;
        }
        let mut payload = AttributeMap::new();
        payload.insert("colorx".to_string(), ((x * 65535.0).round() as u64).into());
        payload.insert("colory".to_string(), ((y * 65535.0).round() as u64).into());
        payload.insert("transtime".to_string(), transtime(meta)?.into());
        entity
            .session
            .command(
                entity.endpoint,
                name::COLOR_CONTROL,
                "moveToColor",
                payload,
                &CommandOptions::default(),
            )
            .await?;
        Ok(Some(state_of("color", json!({"x": x, "y": y}))))
    }

    async fn move_to_hs(
        &self,
        entity: &Entity<'_>,
        hue: f64,
        saturation: f64,
        meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        if !meta.meta.supports_hue_and_saturation {
            return Err(ExtendError::invalid_value(
                "color",
                "hue/saturation is not supported by this light",
            ));
        }
        let hue = hue.rem_euclid(360.0);
        let saturation = saturation.clamp(0.0, 100.0);
        let mut payload = AttributeMap::new();
        let command = if meta.meta.supports_enhanced_hue {
            payload.insert(
                "enhancehue".to_string(),
                ((hue / 360.0 * 65535.0).round() as u64).into(),
            );
            payload.insert("direction".to_string(), 0.into());
            "enhancedMoveToHueAndSaturation"
        } else {
            payload.insert("hue".to_string(), ((hue / 360.0 * 254.0).round() as u64).into());
            "moveToHueAndSaturation"
        };
        payload.insert("saturation".to_string(), ((saturation * 2.54).round() as u64).into());
        payload.insert("transtime".to_string(), transtime(meta)?.into());
        entity
            .session
            .command(
                entity.endpoint,
                name::COLOR_CONTROL,
                command,
                payload,
                &CommandOptions::default(),
            )
            .await?;
        Ok(Some(state_of(
            "color",
            json!({"hue": hue, "saturation": saturation}),
        )))
    }
}

#[async_trait]
impl Encode for ColorEncoder {
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
        let Some(color) = value.as_object() else {
            return Err(ExtendError::invalid_value(key, format!("{value} is not an object")));
        };
        let field = |names: &[&str]| names.iter().find_map(|n| color.get(*n)).and_then(to_number);

        if let (Some(x), Some(y)) = (field(&["x"]), field(&["y"])) {
            return self.move_to_xy(entity, x, y, meta).await;
        }
        if let (Some(r), Some(g), Some(b)) = (field(&["r"]), field(&["g"]), field(&["b"])) {
            let (x, y) = rgb_to_xy(r, g, b);
            return self.move_to_xy(entity, x, y, meta).await;
        }
        if let (Some(hue), Some(saturation)) =
            (field(&["hue", "h"]), field(&["saturation", "s"]))
        {
            return self.move_to_hs(entity, hue, saturation, meta).await;
        }
        Err(ExtendError::invalid_value(
            key,
            "expected {x, y}, {r, g, b} or {hue, saturation}",
        ))
    }

    async fn convert_get(
        &self,
        entity: &Entity<'_>,
        _key: &str,
        _meta: &EncodeMeta<'_>,
    ) -> Result<(), ExtendError> {
        let mut attributes = Vec::new();
        if self.args.has(ColorMode::Xy) {
            attributes.extend([Attribute::from("currentX"), Attribute::from("currentY")]);
        }
        if self.args.has(ColorMode::Hs) {
            attributes.extend([
                Attribute::from("currentHue"),
                Attribute::from("currentSaturation"),
            ]);
        }
        entity
            .session
            .read(
                entity.endpoint,
                name::COLOR_CONTROL,
                &attributes,
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

struct EffectEncoder {
    keys: Vec<String>,
    colorloop: bool,
}

#[async_trait]
impl Encode for EffectEncoder {
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
        let effect = require_str(key, value)?.to_lowercase();
        let (cluster, command, payload) = match effect.as_str() {
            "colorloop" | "stop_colorloop" if self.colorloop => {
                let start = effect == "colorloop";
                let mut payload = AttributeMap::new();
                payload.insert("updateflags".to_string(), (if start { 0x07 } else { 0x01 }).into());
                payload.insert("action".to_string(), (if start { 2 } else { 0 }).into());
                payload.insert("direction".to_string(), (if start { 1 } else { 0 }).into());
                payload.insert("time".to_string(), (if start { 15 } else { 0 }).into());
                payload.insert("starthue".to_string(), 0.into());
                (name::COLOR_CONTROL, "colorLoopSet", payload)
            }
            _ => {
                let id = identify_effects().require_value(key, &effect)?;
                let mut payload = AttributeMap::new();
                payload.insert("effectid".to_string(), id.into());
                payload.insert("effectvariant".to_string(), 0.into());
                (name::IDENTIFY, "triggerEffect", payload)
            }
        };
        entity
            .session
            .command(entity.endpoint, cluster, command, payload, &CommandOptions::default())
            .await?;
        Ok(None)
    }
}

fn color_temp_expose(range: (f64, f64)) -> Expose {
    let (min, max) = range;
    Expose::numeric("color_temp", access::ALL)
        .with_unit("mired")
        .with_value_min(min)
        .with_value_max(max)
        .with_description("Color temperature of this light")
        .with_preset("coolest", min, "Coolest temperature supported")
        .with_preset("cool", 250.0, "Cool temperature (250 mireds / 4000 Kelvin)")
        .with_preset("neutral", 370.0, "Neutral temperature (370 mireds / 2700 Kelvin)")
        .with_preset("warm", 454.0, "Warm temperature (454 mireds / 2200 Kelvin)")
        .with_preset("warmest", max, "Warmest temperature supported")
}

fn color_exposes(args: &ColorArgs) -> Vec<Expose> {
    let mut exposes = Vec::new();
    if args.has(ColorMode::Xy) {
        exposes.push(
            Expose::composite("color_xy", "color", access::ALL)
                .with_label("Color (X/Y)")
                .with_description("Color of this light in the CIE 1931 color space (x/y)")
                .with_feature(Expose::numeric("x", access::ALL))
                .with_feature(Expose::numeric("y", access::ALL)),
        );
    }
    if args.has(ColorMode::Hs) {
        exposes.push(
            Expose::composite("color_hs", "color", access::ALL)
                .with_label("Color (HS)")
                .with_description("Color of this light expressed as hue/saturation")
                .with_feature(Expose::numeric("hue", access::ALL))
                .with_feature(Expose::numeric("saturation", access::ALL)),
        );
    }
    exposes
}

fn brightness_decoder(endpoint_names: Option<Vec<String>>) -> Decoder {
    Decoder::attributes(name::LEVEL_CONTROL, move |msg, ctx| {
        let level = to_number(msg.data.get("currentLevel")?)?;
        // A fading-out light reports its decreasing level; keep the last one
        if ctx
            .store
            .get_value(&ctx.entity(msg), TURNED_OFF_WITH_TRANSITION)
            .is_some()
        {
            return None;
        }
        let key = state_key("brightness", msg, ctx, endpoint_names.as_deref())?;
        Some(state_of(key, level as u64))
    })
}

fn color_decoder(endpoint_names: Option<Vec<String>>, with_temp: bool, with_color: bool) -> Decoder {
    Decoder::attributes(name::COLOR_CONTROL, move |msg, ctx| {
        let mut state = State::new();
        if with_temp {
            if let Some(mired) = msg.data.get("colorTemperature").and_then(to_number) {
                let key = state_key("color_temp", msg, ctx, endpoint_names.as_deref())?;
                state.insert(key, (mired as u64).into());
            }
        }
        if with_color {
            let mut color = serde_json::Map::new();
            if let Some(x) = msg.data.get("currentX").and_then(to_number) {
                color.insert("x".to_string(), precision_round(x / 65535.0, 4).into());
            }
            if let Some(y) = msg.data.get("currentY").and_then(to_number) {
                color.insert("y".to_string(), precision_round(y / 65535.0, 4).into());
            }
            if let Some(hue) = msg.data.get("enhancedCurrentHue").and_then(to_number) {
                color.insert("hue".to_string(), (hue * 360.0 / 65535.0).round().into());
            } else if let Some(hue) = msg.data.get("currentHue").and_then(to_number) {
                color.insert("hue".to_string(), (hue * 360.0 / 254.0).round().into());
            }
            if let Some(saturation) = msg.data.get("currentSaturation").and_then(to_number) {
                color.insert(
                    "saturation".to_string(),
                    (saturation * 100.0 / 254.0).round().into(),
                );
            }
            if !color.is_empty() {
                let key = state_key("color", msg, ctx, endpoint_names.as_deref())?;
                state.insert(key, Value::Object(color));
            }
        }
        (!state.is_empty()).then_some(state)
    })
}

fn reporting(enabled: bool) -> Option<ReportingConfig> {
    enabled.then(|| ReportingConfig::new("10_SECONDS", "MAX", 1.0))
}

/// Light capability
pub fn light(args: LightArgs) -> Result<Extend, ExtendError> {
    let names = args.endpoint_names.as_deref();
    let opts = CommandOptions::default();

    let mut expose = Expose::light().with_feature(
        Expose::numeric("brightness", access::ALL)
            .with_value_min(0.0)
            .with_value_max(254.0)
            .with_description("Brightness of this light"),
    );
    let color_temp_range = args
        .color_temp
        .as_ref()
        .map(|ct| ct.range.unwrap_or(DEFAULT_COLOR_TEMP_RANGE));
    if let Some((min, max)) = color_temp_range {
        if min > max {
            return Err(ExtendError::Construction(format!(
                "color temperature range {min}..{max} is inverted"
            )));
        }
        expose = expose.with_feature(color_temp_expose((min, max)));
    }
    if let Some(color) = &args.color {
        if color.modes.is_empty() {
            return Err(ExtendError::Construction(
                "color requested without a color mode".to_string(),
            ));
        }
        for feature in color_exposes(color) {
            expose = expose.with_feature(feature);
        }
    }

    let mut extend = Extend::new()
        .with_decoder(on_off_decoder(args.endpoint_names.clone()))
        .with_decoder(brightness_decoder(args.endpoint_names.clone()))
        .with_encoder(Arc::new(BrightnessEncoder {
            keys: vec![
                "state".to_string(),
                "brightness".to_string(),
                "on_time".to_string(),
                "off_wait_time".to_string(),
            ],
        }))
        .with_encoder(Arc::new(TransitionEncoder {
            keys: vec!["transition".to_string()],
        }));
    extend.exposes = match names {
        Some(names) => names.iter().map(|ep| expose.clone().with_endpoint(ep)).collect(),
        None => vec![expose],
    };
    extend.meta.turns_off_at_brightness_1 = args.turns_off_at_brightness_1;
    extend = extend
        .merge(on_off_reporting(names)?)
        .with_configure_opt(setup_configure_for_reporting(
            name::LEVEL_CONTROL,
            Attribute::from("currentLevel"),
            reporting(args.configure_reporting).as_ref(),
            access::ALL,
            names,
            &opts,
        )?);

    if args.color_temp.is_some() || args.color.is_some() {
        extend = extend.with_decoder(color_decoder(
            args.endpoint_names.clone(),
            args.color_temp.is_some(),
            args.color.is_some(),
        ));
    }

    if let Some((min, max)) = color_temp_range {
        extend = extend
            .with_encoder(Arc::new(ColorTempEncoder {
                keys: vec!["color_temp".to_string()],
                range: (min, max),
            }))
            .with_configure_opt(setup_configure_for_reporting(
                name::COLOR_CONTROL,
                Attribute::from("colorTemperature"),
                reporting(args.configure_reporting).as_ref(),
                access::ALL,
                names,
                &opts,
            )?);
    }

    if let Some(color) = &args.color {
        extend.meta.apply_red_fix = color.apply_red_fix;
        extend.meta.supports_hue_and_saturation = color.has(ColorMode::Hs);
        extend.meta.supports_enhanced_hue = color.has(ColorMode::Hs) && color.enhanced_hue;
        extend = extend
            .with_encoder(Arc::new(ColorEncoder {
                keys: vec!["color".to_string()],
                args: color.clone(),
            }))
            .with_configure(setup_configure_for_reading(
                name::COLOR_CONTROL,
                vec![Attribute::from("colorCapabilities")],
                names,
                &opts,
            ));
        let mut attributes = Vec::new();
        if color.has(ColorMode::Xy) {
            attributes.extend(["currentX", "currentY"]);
        }
        if color.has(ColorMode::Hs) {
            attributes.extend(["currentHue", "currentSaturation"]);
        }
        for attribute in attributes {
            extend = extend.with_configure_opt(setup_configure_for_reporting(
                name::COLOR_CONTROL,
                Attribute::from(attribute),
                reporting(args.configure_reporting).as_ref(),
                access::STATE,
                names,
                &opts,
            )?);
        }
    }

    if args.effect {
        let mut effects = identify_effects().names();
        if args.color.is_some() {
            effects.extend(["colorloop".to_string(), "stop_colorloop".to_string()]);
        }
        extend = extend
            .with_expose(presets::effect(effects))
            .with_encoder(Arc::new(EffectEncoder {
                keys: vec!["effect".to_string()],
                colorloop: args.color.is_some(),
            }));
    }

    if args.power_on_behavior {
        extend = extend.merge(power_on_behavior(args.endpoint_names.clone())?);
    }
    Ok(extend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Definition, Runtime};
    use crate::options::DeviceOptions;
    use zigbee_core::cluster::id;
    use zigbee_core::memory::SessionCall;
    use zigbee_core::{Endpoint, MemoryDevice, Message, ZigbeeDevice};

    fn bulb() -> MemoryDevice {
        let mut device = ZigbeeDevice::new([8, 0, 0, 0, 0, 0, 0, 0], 0x0008);
        device.endpoints.push(Endpoint::new(
            11,
            vec![id::ON_OFF, id::LEVEL_CONTROL, id::COLOR_CONTROL, id::IDENTIFY],
            vec![],
        ));
        MemoryDevice::new(device)
    }

    fn color_light() -> Definition {
        let args = LightArgs {
            color_temp: Some(ColorTempArgs {
                range: Some((153.0, 454.0)),
            }),
            color: Some(ColorArgs {
                modes: vec![ColorMode::Xy, ColorMode::Hs],
                enhanced_hue: false,
                apply_red_fix: true,
            }),
            turns_off_at_brightness_1: true,
            ..LightArgs::default()
        };
        Definition::from_extends(vec![], "BULB", "Test", "", vec![light(args).unwrap()])
    }

    fn request(pairs: &[(&str, Value)]) -> State {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn last_command(session: &MemoryDevice) -> (String, AttributeMap) {
        session
            .calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                SessionCall::Command { command, payload, .. } => Some((command, payload)),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_brightness_quirk_and_echo() {
        let definition = color_light();
        let session = bulb();
        let echo = definition
            .set(
                &session,
                &DeviceOptions::default(),
                &Runtime::new(),
                &request(&[("brightness", json!(1)), ("transition", json!(2))]),
                &State::new(),
            )
            .await
            .unwrap();
        assert_eq!(echo["brightness"], json!(2));
        assert_eq!(echo["state"], json!("ON"));
        let (command, payload) = last_command(&session);
        assert_eq!(command, "moveToLevelWithOnOff");
        assert_eq!(payload["level"], json!(2));
        assert_eq!(payload["transtime"], json!(20));
    }

    #[tokio::test]
    async fn test_fade_out_and_restore() {
        let definition = color_light();
        let session = bulb();
        let runtime = Runtime::new();
        let options = DeviceOptions::default();
        let current = request(&[("state", json!("ON")), ("brightness", json!(180))]);

        definition
            .set(
                &session,
                &options,
                &runtime,
                &request(&[("state", json!("OFF")), ("transition", json!(1))]),
                &current,
            )
            .await
            .unwrap();
        assert_eq!(last_command(&session).1["level"], json!(0));

        let mut data = AttributeMap::new();
        data.insert("currentLevel".to_string(), json!(3));
        let state = definition.decode(&Message::report("genLevelCtrl", 11, data), &session, &options, &runtime);
        assert!(state.is_empty());

        let echo = definition
            .set(&session, &options, &runtime, &request(&[("state", json!("ON"))]), &State::new())
            .await
            .unwrap();
        assert_eq!(echo["brightness"], json!(180));
        assert_eq!(last_command(&session).1["level"], json!(180));

        let echo = definition
            .set(&session, &options, &runtime, &request(&[("state", json!("ON"))]), &State::new())
            .await
            .unwrap();
        assert_eq!(echo, state_of("state", "ON"));
        assert_eq!(last_command(&session).0, "on");
    }

    #[tokio::test]
    async fn test_color_temp_preset_and_clamp() {
        let definition = color_light();
        let session = bulb();
        let options = DeviceOptions::default();
        let runtime = Runtime::new();

        let echo = definition
            .set(&session, &options, &runtime, &request(&[("color_temp", json!("warmest"))]), &State::new())
            .await
            .unwrap();
        assert_eq!(echo["color_temp"], json!(454));

        let echo = definition
            .set(&session, &options, &runtime, &request(&[("color_temp", json!(90))]), &State::new())
            .await
            .unwrap();
        assert_eq!(echo["color_temp"], json!(153));
        assert_eq!(last_command(&session).1["colortemp"], json!(153));
    }

    #[tokio::test]
    async fn test_color_xy_red_fix_and_hs() {
        let definition = color_light();
        let session = bulb();
        let options = DeviceOptions::default();
        let runtime = Runtime::new();

        definition
            .set(
                &session,
                &options,
                &runtime,
                &request(&[("color", json!({"x": 0.701, "y": 0.299}))]),
                &State::new(),
            )
            .await
            .unwrap();
        let (command, payload) = last_command(&session);
        assert_eq!(command, "moveToColor");
        assert_eq!(payload["colorx"], json!((0.7006f64 * 65535.0).round() as u64));

        definition
            .set(
                &session,
                &options,
                &runtime,
                &request(&[("color", json!({"hue": 180, "saturation": 50}))]),
                &State::new(),
            )
            .await
            .unwrap();
        let (command, payload) = last_command(&session);
        assert_eq!(command, "moveToHueAndSaturation");
        assert_eq!(payload["hue"], json!(127));
        assert_eq!(payload["saturation"], json!(127));
    }

    #[tokio::test]
    async fn test_hs_rejected_without_support() {
        let args = LightArgs {
            color: Some(ColorArgs::default()),
            ..LightArgs::default()
        };
        let definition = Definition::from_extends(vec![], "BULB", "Test", "", vec![light(args).unwrap()]);
        let err = definition
            .set(
                &bulb(),
                &DeviceOptions::default(),
                &Runtime::new(),
                &request(&[("color", json!({"hue": 10, "saturation": 10}))]),
                &State::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtendError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_effects() {
        let definition = color_light();
        let session = bulb();
        let options = DeviceOptions::default();
        let runtime = Runtime::new();

        definition
            .set(&session, &options, &runtime, &request(&[("effect", json!("okay"))]), &State::new())
            .await
            .unwrap();
        let (command, payload) = last_command(&session);
        assert_eq!(command, "triggerEffect");
        assert_eq!(payload["effectid"], json!(2));

        definition
            .set(&session, &options, &runtime, &request(&[("effect", json!("colorloop"))]), &State::new())
            .await
            .unwrap();
        assert_eq!(last_command(&session).0, "colorLoopSet");
    }

    #[test]
    fn test_decode_color_and_exposes() {
        let definition = color_light();
        let mut data = AttributeMap::new();
        data.insert("currentX".to_string(), json!(32768));
        data.insert("currentY".to_string(), json!(16384));
        data.insert("colorTemperature".to_string(), json!(370));
        let state = definition.decode(
            &Message::report("lightingColorCtrl", 11, data),
            &bulb(),
            &DeviceOptions::default(),
            &Runtime::new(),
        );
        assert_eq!(state["color"]["x"], json!(0.5));
        assert_eq!(state["color"]["y"], json!(0.25));
        assert_eq!(state["color_temp"], json!(370));

        let names = definition.expose_names();
        for key in ["state", "brightness", "color_temp", "color", "effect", "power_on_behavior"] {
            assert!(names.contains(&key.to_string()), "missing {key}");
        }
    }

    #[test]
    fn test_rgb_to_xy_white() {
        let (x, y) = rgb_to_xy(255.0, 255.0, 255.0);
        assert!((x - 0.3227).abs() < 0.001, "{x}");
        assert!((y - 0.329).abs() < 0.001, "{y}");
    }
}
