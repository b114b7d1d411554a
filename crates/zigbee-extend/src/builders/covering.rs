//! Window covering: lift and tilt percentage plus open/close/stop

use crate::converter::{state_of, Decoder, Encode, EncodeMeta, Entity, State};
use crate::error::ExtendError;
use crate::expose::{access, Expose};
use crate::extend::{DefinitionMeta, Extend};
use crate::reporting::{setup_configure_for_reporting, ReportingConfig};
use crate::utils::{number_value, require_number, require_str, to_number};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use zigbee_core::cluster::name;
use zigbee_core::{Attribute, AttributeMap, CommandOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverControl {
    Lift,
    Tilt,
}

impl CoverControl {
    fn key(self) -> &'static str {
        match self {
            CoverControl::Lift => "position",
            CoverControl::Tilt => "tilt",
        }
    }

    fn attribute(self) -> &'static str {
        match self {
            CoverControl::Lift => "currentPositionLiftPercentage",
            CoverControl::Tilt => "currentPositionTiltPercentage",
        }
    }

    /// Command name and payload field for a go-to-percentage request
    fn command(self) -> (&'static str, &'static str) {
        match self {
            CoverControl::Lift => ("goToLiftPercentage", "percentageliftvalue"),
            CoverControl::Tilt => ("goToTiltPercentage", "percentagetiltvalue"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverStateSource {
    #[default]
    Lift,
    Tilt,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowCoveringArgs {
    pub controls: Vec<CoverControl>,
    /// Presentation-layer hint: the device reports inverted positions
    pub cover_inverted: bool,
    /// Presentation-layer hint: open/closed derives from tilt
    pub state_source: CoverStateSource,
    pub configure_reporting: bool,
}

impl Default for WindowCoveringArgs {
    fn default() -> Self {
        Self {
            controls: vec![CoverControl::Lift],
            cover_inverted: false,
            state_source: CoverStateSource::Lift,
            configure_reporting: true,
        }
    }
}

/// Zigbee counts 0 as open, the exposed value counts 100 as open
fn flip(value: f64) -> f64 {
    100.0 - value
}

struct PositionEncoder {
    keys: Vec<String>,
    control: CoverControl,
}

#[async_trait]
impl Encode for PositionEncoder {
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
        _meta: &EncodeMeta<'_>,
    ) -> Result<Option<State>, ExtendError> {
        let requested = require_number(key, value)?;
        if !(0.0..=100.0).contains(&requested) {
            return Err(ExtendError::invalid_value(key, format!("{requested} is outside 0..100")));
        }
        let (command, field) = self.control.command();
        let mut payload = AttributeMap::new();
        payload.insert(field.to_string(), number_value(flip(requested).round()));
        entity
            .session
            .command(
                entity.endpoint,
                name::WINDOW_COVERING,
                command,
                payload,
                &CommandOptions::default(),
            )
            .await?;
        Ok(Some(state_of(key, number_value(requested))))
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
                name::WINDOW_COVERING,
                &[Attribute::from(self.control.attribute())],
                &CommandOptions::default(),
            )
            .await?;
        Ok(())
    }
}

struct CoverStateEncoder {
    keys: Vec<String>,
}

#[async_trait]
impl Encode for CoverStateEncoder {
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
        let command = match require_str(key, value)?.to_lowercase().as_str() {
            "open" | "on" => "upOpen",
            "close" | "off" => "downClose",
            "stop" => "stop",
            other => {
                return Err(ExtendError::invalid_value(
                    key,
                    format!("'{other}' is not one of OPEN, CLOSE, STOP"),
                ))
            }
        };
        entity
            .session
            .command(
                entity.endpoint,
                name::WINDOW_COVERING,
                command,
                AttributeMap::new(),
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

/// Window covering capability
pub fn window_covering(args: WindowCoveringArgs) -> Result<Extend, ExtendError> {
    if args.controls.is_empty() {
        return Err(ExtendError::Construction(
            "window covering without lift or tilt control".to_string(),
        ));
    }

    let mut cover = Expose::cover();
    let mut extend = Extend::new().with_encoder(Arc::new(CoverStateEncoder {
        keys: vec!["state".to_string()],
    }));
    for control in &args.controls {
        cover = cover.with_feature(
            Expose::numeric(control.key(), access::ALL)
                .with_unit("%")
                .with_value_min(0.0)
                .with_value_max(100.0)
                .with_description(match control {
                    CoverControl::Lift => "Position of this cover",
                    CoverControl::Tilt => "Tilt of this cover",
                }),
        );
        extend = extend.with_encoder(Arc::new(PositionEncoder {
            keys: vec![control.key().to_string()],
            control: *control,
        }));

        let reporting = args
            .configure_reporting
            .then(|| ReportingConfig::new("1_SECOND", "MAX", 1.0));
        extend = extend.with_configure_opt(setup_configure_for_reporting(
            name::WINDOW_COVERING,
            Attribute::from(control.attribute()),
            reporting.as_ref(),
            access::ALL,
            None,
            &CommandOptions::default(),
        )?);
    }

    let controls = args.controls.clone();
    extend = extend
        .with_expose(cover)
        .with_decoder(Decoder::attributes(name::WINDOW_COVERING, move |msg, ctx| {
            let mut state = State::new();
            for control in &controls {
                if let Some(raw) = msg.data.get(control.attribute()).and_then(to_number) {
                    state.insert(ctx.postfix(control.key(), msg), number_value(flip(raw)));
                }
            }
            (!state.is_empty()).then_some(state)
        }));
    extend.meta = DefinitionMeta {
        invert_cover: args.cover_inverted,
        cover_state_from_tilt: args.state_source == CoverStateSource::Tilt,
        ..DefinitionMeta::default()
    };
    Ok(extend)
}
