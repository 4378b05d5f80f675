//! Control descriptors and the typed parameter maps they validate.
//!
//! A layer publishes an ordered list of [`Control`]s. The list drives the
//! default parameter values, validation of persisted overrides and runtime
//! edits, and any external UI that wants to render widgets for the layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One adjustable parameter of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Control {
    Slider {
        key: String,
        label: String,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    },
    Toggle {
        key: String,
        label: String,
        default: bool,
    },
    Select {
        key: String,
        label: String,
        options: Vec<String>,
        default: String,
    },
}

impl Control {
    pub fn slider(key: &str, label: &str, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self::Slider {
            key: key.to_string(),
            label: label.to_string(),
            min,
            max,
            step,
            default,
        }
    }

    pub fn toggle(key: &str, label: &str, default: bool) -> Self {
        Self::Toggle {
            key: key.to_string(),
            label: label.to_string(),
            default,
        }
    }

    pub fn select(key: &str, label: &str, options: &[&str], default: &str) -> Self {
        Self::Select {
            key: key.to_string(),
            label: label.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            default: default.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Slider { key, .. } | Self::Toggle { key, .. } | Self::Select { key, .. } => key,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Slider { label, .. } | Self::Toggle { label, .. } | Self::Select { label, .. } => {
                label
            }
        }
    }

    pub fn default_value(&self) -> ParamValue {
        match self {
            Self::Slider { default, .. } => ParamValue::Number(*default),
            Self::Toggle { default, .. } => ParamValue::Bool(*default),
            Self::Select { default, .. } => ParamValue::Text(default.clone()),
        }
    }

    /// Checks `value` against this control. Slider values are clamped into
    /// range and snapped to the step grid, keeping no more decimals than the
    /// step and minimum carry.
    pub fn accept(&self, value: &ParamValue) -> std::result::Result<ParamValue, String> {
        match (self, value) {
            (
                Self::Slider {
                    min, max, step, ..
                },
                ParamValue::Number(number),
            ) => {
                if !number.is_finite() {
                    return Err("expected a finite number".to_string());
                }
                let mut snapped = *number;
                if *step > 0.0 {
                    snapped = min + ((snapped - min) / step).round() * step;
                    let scale = 10f64.powi(decimals(*step).max(decimals(*min)));
                    snapped = (snapped * scale).round() / scale;
                }
                Ok(ParamValue::Number(snapped.clamp(*min, *max)))
            }
            (Self::Toggle { .. }, ParamValue::Bool(flag)) => Ok(ParamValue::Bool(*flag)),
            (Self::Select { options, .. }, ParamValue::Text(choice)) => {
                if options.iter().any(|o| o == choice) {
                    Ok(ParamValue::Text(choice.clone()))
                } else {
                    Err(format!("`{choice}` is not one of {options:?}"))
                }
            }
            (Self::Slider { .. }, _) => Err("expected a number".to_string()),
            (Self::Toggle { .. }, _) => Err("expected a boolean".to_string()),
            (Self::Select { .. }, _) => Err("expected a string".to_string()),
        }
    }
}

/// Value of a single layer parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Converts a JSON scalar. Arrays, objects and null have no counterpart.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(flag) => Some(Self::Bool(*flag)),
            serde_json::Value::Number(number) => number.as_f64().map(Self::Number),
            serde_json::Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }

    /// Parses a command-line style literal: `true`/`false`, a number, or
    /// anything else as text.
    pub fn parse_literal(text: &str) -> Self {
        match text {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => text
                .parse::<f64>()
                .map(Self::Number)
                .unwrap_or_else(|_| Self::Text(text.to_string())),
        }
    }
}

/// Parameter values of one layer keyed by control key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamMap(BTreeMap<String, ParamValue>);

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a JSON object, skipping values that are not
    /// scalars. Anything other than an object yields an empty map.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut map = Self::new();
        if let serde_json::Value::Object(entries) = value {
            for (key, value) in entries {
                match ParamValue::from_json(value) {
                    Some(param) => map.insert(key.clone(), param),
                    None => tracing::debug!(key = %key, "skipping non-scalar persisted value"),
                }
            }
        }
        map
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(ParamValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(ParamValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn choice(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ParamValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Number of decimal places needed to write `value`, up to nine.
fn decimals(value: f64) -> i32 {
    (0..9)
        .find(|&places| {
            let scaled = value * 10f64.powi(places);
            (scaled - scaled.round()).abs() < 1e-6
        })
        .unwrap_or(9)
}

/// Default values for every control in the list.
pub fn defaults(controls: &[Control]) -> ParamMap {
    let mut map = ParamMap::new();
    for control in controls {
        map.insert(control.key(), control.default_value());
    }
    map
}

/// Defaults overlaid with the persisted values that still fit the controls.
/// Unknown keys and values that fail validation are dropped.
pub fn merge(controls: &[Control], persisted: &ParamMap) -> ParamMap {
    let mut map = defaults(controls);
    for (key, value) in persisted.iter() {
        let Some(control) = controls.iter().find(|c| c.key() == key) else {
            tracing::debug!(key, "ignoring persisted value for unknown control");
            continue;
        };
        match control.accept(value) {
            Ok(accepted) => map.insert(key, accepted),
            Err(reason) => {
                tracing::warn!(key, %reason, "ignoring invalid persisted value")
            }
        }
    }
    map
}
