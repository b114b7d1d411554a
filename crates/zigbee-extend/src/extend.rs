//! The unit of capability composition

use crate::converter::{Configure, Decoder, Encode};
use crate::expose::Expose;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Static per-definition metadata contributed by builders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionMeta {
    /// Qualify published keys with endpoint names
    pub multi_endpoint: bool,
    /// Named endpoint table
    pub endpoints: Option<BTreeMap<String, u8>>,
    /// Light quirk: the device turns off when asked for brightness 1
    pub turns_off_at_brightness_1: bool,
    /// Light quirk: pure red xy needs nudging to render correctly
    pub apply_red_fix: bool,
    pub supports_enhanced_hue: bool,
    pub supports_hue_and_saturation: bool,
    /// Cover quirks, for the presentation layer only
    pub invert_cover: bool,
    pub cover_state_from_tilt: bool,
    pub pin_code_count: Option<u16>,
}

impl DefinitionMeta {
    /// Combine metadata from two builders. Flags are OR'd, endpoint tables
    /// are unioned (later entries win), scalar settings take the later value.
    #[must_use]
    pub fn merge(mut self, other: DefinitionMeta) -> Self {
        self.multi_endpoint |= other.multi_endpoint;
        self.endpoints = match (self.endpoints.take(), other.endpoints) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            (mine, theirs) => theirs.or(mine),
        };
        self.turns_off_at_brightness_1 |= other.turns_off_at_brightness_1;
        self.apply_red_fix |= other.apply_red_fix;
        self.supports_enhanced_hue |= other.supports_enhanced_hue;
        self.supports_hue_and_saturation |= other.supports_hue_and_saturation;
        self.invert_cover |= other.invert_cover;
        self.cover_state_from_tilt |= other.cover_state_from_tilt;
        self.pin_code_count = other.pin_code_count.or(self.pin_code_count);
        self
    }
}

/// What one builder invocation contributes to a device definition
#[derive(Clone, Default)]
pub struct Extend {
    pub exposes: Vec<Expose>,
    pub decoders: Vec<Decoder>,
    pub encoders: Vec<Arc<dyn Encode>>,
    pub configure: Vec<Arc<dyn Configure>>,
    pub meta: DefinitionMeta,
    /// User-settable options the converters consult
    pub options: Vec<Expose>,
}

impl fmt::Debug for Extend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extend")
            .field("exposes", &self.exposes.len())
            .field("decoders", &self.decoders)
            .field("encoders", &self.encoders.len())
            .field("configure", &self.configure.len())
            .field("meta", &self.meta)
            .finish()
    }
}

impl Extend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenate another builder's output after this one
    #[must_use]
    pub fn merge(mut self, other: Extend) -> Self {
        self.exposes.extend(other.exposes);
        self.decoders.extend(other.decoders);
        self.encoders.extend(other.encoders);
        self.configure.extend(other.configure);
        self.meta = self.meta.merge(other.meta);
        for option in other.options {
            if !self.options.iter().any(|o| o.name == option.name) {
                self.options.push(option);
            }
        }
        self
    }

    #[must_use]
    pub fn with_expose(mut self, expose: Expose) -> Self {
        self.exposes.push(expose);
        self
    }

    #[must_use]
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoders.push(decoder);
        self
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn Encode>) -> Self {
        self.encoders.push(encoder);
        self
    }

    #[must_use]
    pub fn with_configure(mut self, step: Arc<dyn Configure>) -> Self {
        self.configure.push(step);
        self
    }

    /// Append when present
    #[must_use]
    pub fn with_configure_opt(self, step: Option<Arc<dyn Configure>>) -> Self {
        match step {
            Some(step) => self.with_configure(step),
            None => self,
        }
    }

    #[must_use]
    pub fn with_option(mut self, option: Expose) -> Self {
        self.options.push(option);
        self
    }
}

impl FromIterator<Extend> for Extend {
    fn from_iter<I: IntoIterator<Item = Extend>>(iter: I) -> Self {
        iter.into_iter().fold(Extend::new(), Extend::merge)
    }
}
