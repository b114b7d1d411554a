//! Exposed-state entries
//!
//! An [`Expose`] describes one user-visible property (or a group of them)
//! with enough structure for a presentation layer to build its own schema:
//! name, type, unit, access mode, bounds, endpoint binding and category.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Access bits
pub mod access {
    /// Value is published in state
    pub const STATE: u8 = 0b001;
    /// Value can be set
    pub const SET: u8 = 0b010;
    /// Value can be read on request
    pub const GET: u8 = 0b100;
    pub const STATE_SET: u8 = STATE | SET;
    pub const STATE_GET: u8 = STATE | GET;
    pub const ALL: u8 = STATE | SET | GET;
}

/// Access mode as written in capability descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Access {
    State,
    StateGet,
    StateSet,
    #[default]
    All,
}

impl Access {
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            Access::State => access::STATE,
            Access::StateGet => access::STATE_GET,
            Access::StateSet => access::STATE_SET,
            Access::All => access::ALL,
        }
    }

    #[must_use]
    pub fn settable(self) -> bool {
        self.bits() & access::SET != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Config,
    Diagnostic,
}

/// Named numeric preset (e.g. `warmest` for a color temperature)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub value: f64,
    pub description: String,
}

/// Type-specific part of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExposeKind {
    Numeric {
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value_min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value_max: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        value_step: Option<f64>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        presets: Vec<Preset>,
    },
    Binary {
        value_on: Value,
        value_off: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        value_toggle: Option<Value>,
    },
    Enum {
        values: Vec<String>,
    },
    Text,
    Composite {
        features: Vec<Expose>,
    },
    Switch {
        features: Vec<Expose>,
    },
    Light {
        features: Vec<Expose>,
    },
    Lock {
        features: Vec<Expose>,
    },
    Cover {
        features: Vec<Expose>,
    },
}

/// An exposed-state entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expose {
    #[serde(flatten)]
    pub kind: ExposeKind,
    pub name: String,
    pub label: String,
    /// State key, endpoint-qualified when bound to an endpoint
    pub property: String,
    pub access: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

/// `battery_low` -> `Battery low`
pub(crate) fn label_from_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Expose {
    fn new(kind: ExposeKind, name: &str, access: u8) -> Self {
        Self {
            kind,
            name: name.to_string(),
            label: label_from_name(name),
            property: name.to_string(),
            access,
            description: None,
            endpoint: None,
            category: None,
        }
    }

    #[must_use]
    pub fn numeric(name: &str, access: u8) -> Self {
        Self::new(
            ExposeKind::Numeric {
                unit: None,
                value_min: None,
                value_max: None,
                value_step: None,
                presets: Vec::new(),
            },
            name,
            access,
        )
    }

    #[must_use]
    pub fn binary(name: &str, access: u8, value_on: Value, value_off: Value) -> Self {
        Self::new(
            ExposeKind::Binary {
                value_on,
                value_off,
                value_toggle: None,
            },
            name,
            access,
        )
    }

    #[must_use]
    pub fn enumeration(name: &str, access: u8, values: Vec<String>) -> Self {
        Self::new(ExposeKind::Enum { values }, name, access)
    }

    #[must_use]
    pub fn text(name: &str, access: u8) -> Self {
        Self::new(ExposeKind::Text, name, access)
    }

    #[must_use]
    pub fn composite(name: &str, property: &str, access: u8) -> Self {
        let mut expose = Self::new(
            ExposeKind::Composite {
                features: Vec::new(),
            },
            name,
            access,
        );
        expose.property = property.to_string();
        expose
    }

    #[must_use]
    pub fn switch() -> Self {
        Self::new(
            ExposeKind::Switch {
                features: Vec::new(),
            },
            "switch",
            access::ALL,
        )
        .with_feature(
            Expose::binary("state", access::ALL, "ON".into(), "OFF".into())
                .with_value_toggle("TOGGLE".into())
                .with_description("On/off state of the switch"),
        )
    }

    #[must_use]
    pub fn light() -> Self {
        Self::new(
            ExposeKind::Light {
                features: Vec::new(),
            },
            "light",
            access::ALL,
        )
        .with_feature(
            Expose::binary("state", access::ALL, "ON".into(), "OFF".into())
                .with_value_toggle("TOGGLE".into())
                .with_description("On/off state of this light"),
        )
    }

    #[must_use]
    pub fn lock() -> Self {
        Self::new(
            ExposeKind::Lock {
                features: Vec::new(),
            },
            "lock",
            access::ALL,
        )
        .with_feature(
            Expose::binary("state", access::STATE_SET, "LOCK".into(), "UNLOCK".into())
                .with_description("State of the lock"),
        )
        .with_feature(
            Expose::enumeration(
                "lock_state",
                access::STATE_GET,
                vec![
                    "not_fully_locked".to_string(),
                    "locked".to_string(),
                    "unlocked".to_string(),
                ],
            )
            .with_description("Actual state of the lock"),
        )
    }

    #[must_use]
    pub fn cover() -> Self {
        Self::new(
            ExposeKind::Cover {
                features: Vec::new(),
            },
            "cover",
            access::ALL,
        )
        .with_feature(Expose::enumeration(
            "state",
            access::STATE_SET,
            vec!["OPEN".to_string(), "CLOSE".to_string(), "STOP".to_string()],
        ))
    }

    #[must_use]
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn with_property(mut self, property: &str) -> Self {
        self.property = property.to_string();
        self
    }

    /// Bind to a named endpoint; the property and those of all features
    /// become `<property>_<endpoint>`.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.property = format!("{}_{endpoint}", self.property);
        self.endpoint = Some(endpoint.to_string());
        if let Some(features) = self.features_mut() {
            let bound: Vec<Expose> = features
                .drain(..)
                .map(|feature| feature.with_endpoint(endpoint))
                .collect();
            *features = bound;
        }
        self
    }

    /// Set the access mode, for a group on every feature too
    #[must_use]
    pub fn with_access(mut self, access: u8) -> Self {
        self.access = access;
        if let Some(features) = self.features_mut() {
            for feature in features.iter_mut() {
                feature.access = access;
            }
        }
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: &str) -> Self {
        if let ExposeKind::Numeric { unit: u, .. } = &mut self.kind {
            *u = Some(unit.to_string());
        }
        self
    }

    #[must_use]
    pub fn with_value_min(mut self, min: f64) -> Self {
        if let ExposeKind::Numeric { value_min, .. } = &mut self.kind {
            *value_min = Some(min);
        }
        self
    }

    #[must_use]
    pub fn with_value_max(mut self, max: f64) -> Self {
        if let ExposeKind::Numeric { value_max, .. } = &mut self.kind {
            *value_max = Some(max);
        }
        self
    }

    #[must_use]
    pub fn with_value_step(mut self, step: f64) -> Self {
        if let ExposeKind::Numeric { value_step, .. } = &mut self.kind {
            *value_step = Some(step);
        }
        self
    }

    #[must_use]
    pub fn with_preset(mut self, name: &str, value: f64, description: &str) -> Self {
        if let ExposeKind::Numeric { presets, .. } = &mut self.kind {
            presets.push(Preset {
                name: name.to_string(),
                value,
                description: description.to_string(),
            });
        }
        self
    }

    #[must_use]
    pub fn with_value_toggle(mut self, toggle: Value) -> Self {
        if let ExposeKind::Binary { value_toggle, .. } = &mut self.kind {
            *value_toggle = Some(toggle);
        }
        self
    }

    /// Append a feature to a group entry; a no-op on leaves
    #[must_use]
    pub fn with_feature(mut self, feature: Expose) -> Self {
        if let Some(features) = self.features_mut() {
            features.push(feature);
        }
        self
    }

    #[must_use]
    pub fn features(&self) -> &[Expose] {
        match &self.kind {
            ExposeKind::Composite { features }
            | ExposeKind::Switch { features }
            | ExposeKind::Light { features }
            | ExposeKind::Lock { features }
            | ExposeKind::Cover { features } => features,
            _ => &[],
        }
    }

    fn features_mut(&mut self) -> Option<&mut Vec<Expose>> {
        match &mut self.kind {
            ExposeKind::Composite { features }
            | ExposeKind::Switch { features }
            | ExposeKind::Light { features }
            | ExposeKind::Lock { features }
            | ExposeKind::Cover { features } => Some(features),
            _ => None,
        }
    }

    /// Leaf state keys this entry publishes. A composite publishes under
    /// its own property; specific groups publish each feature.
    #[must_use]
    pub fn properties(&self) -> Vec<String> {
        match &self.kind {
            ExposeKind::Switch { features }
            | ExposeKind::Light { features }
            | ExposeKind::Lock { features }
            | ExposeKind::Cover { features } => {
                features.iter().flat_map(Expose::properties).collect()
            }
            _ => vec![self.property.clone()],
        }
    }
}

/// Frequently used entries
pub mod presets {
    use super::{access, Category, Expose};

    #[must_use]
    pub fn battery() -> Expose {
        Expose::numeric("battery", access::STATE_GET)
            .with_unit("%")
            .with_value_min(0.0)
            .with_value_max(100.0)
            .with_description("Remaining battery in %")
            .with_category(Category::Diagnostic)
    }

    #[must_use]
    pub fn battery_voltage() -> Expose {
        Expose::numeric("voltage", access::STATE_GET)
            .with_unit("mV")
            .with_description("Voltage of the battery in millivolts")
            .with_category(Category::Diagnostic)
    }

    #[must_use]
    pub fn battery_low() -> Expose {
        Expose::binary("battery_low", access::STATE, true.into(), false.into())
            .with_description("Empty battery indicator")
            .with_category(Category::Diagnostic)
    }

    #[must_use]
    pub fn power_on_behavior(values: Vec<String>) -> Expose {
        Expose::enumeration("power_on_behavior", access::ALL, values)
            .with_label("Power-on behavior")
            .with_description("Controls the behavior when the device is powered on after power loss")
            .with_category(Category::Config)
    }

    #[must_use]
    pub fn action(values: Vec<String>) -> Expose {
        Expose::enumeration("action", access::STATE, values).with_description("Triggered action")
    }

    #[must_use]
    pub fn effect(values: Vec<String>) -> Expose {
        Expose::enumeration("effect", access::SET, values)
            .with_description("Triggers an effect on the light")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_from_name() {
        assert_eq!(label_from_name("battery_low"), "Battery low");
        assert_eq!(label_from_name("x"), "X");
        assert_eq!(label_from_name(""), "");
    }

    #[test]
    fn test_endpoint_binding_qualifies_features() {
        let switch = Expose::switch().with_endpoint("l1");
        assert_eq!(switch.endpoint.as_deref(), Some("l1"));
        assert_eq!(switch.properties(), vec!["state_l1".to_string()]);
    }

    #[test]
    fn test_numeric_serializes_flat() {
        let expose = Expose::numeric("temperature", access::STATE_GET)
            .with_unit("°C")
            .with_value_min(-40.0);
        let json = serde_json::to_value(&expose).unwrap();
        assert_eq!(json["type"], json!("numeric"));
        assert_eq!(json["unit"], json!("°C"));
        assert_eq!(json["value_min"], json!(-40.0));
        assert_eq!(json["access"], json!(5));
        assert!(json.get("value_max").is_none());
    }

    #[test]
    fn test_with_access_reaches_features() {
        let light = Expose::light().with_access(access::STATE_SET);
        assert!(light.features().iter().all(|f| f.access == access::STATE_SET));
    }

    #[test]
    fn test_leaf_modifiers_ignored_on_other_kinds() {
        let binary = Expose::binary("tamper", access::STATE, true.into(), false.into())
            .with_unit("%")
            .with_feature(Expose::text("ignored", access::STATE));
        assert!(matches!(binary.kind, ExposeKind::Binary { .. }));
        assert!(binary.features().is_empty());
    }
}
