//! Material state written by the device simulations and read by a renderer.
//!
//! The core never draws anything. Each device owns plain material records
//! and mutates them once per tick; whatever renders the room copies them
//! onto its own materials.

use serde::{Deserialize, Serialize};

use crate::config::MaterialBinding;

/// Emissive intensity of a lit supply never drops below this.
pub const MIN_BRIGHTNESS_ON: f32 = 0.2;
/// Emissive intensity of a switched-off supply.
pub const MIN_BRIGHTNESS_OFF: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(1.0, 1.0, 1.0);
    pub const BLACK: Rgb = Rgb::new(0.0, 0.0, 0.0);
    /// Emissive colour of a switched-off supply.
    pub const DIM_GREY: Rgb = Rgb::new(0.1, 0.1, 0.1);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` or `rrggbb`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| {
            digits
                .get(range)
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .map(|value| f32::from(value) / 255.0)
        };
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Live state of one material on a device model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialState {
    pub name: String,
    pub is_emissive: bool,
    pub color: Rgb,
    /// Colour an emissive material glows in when its supply is on.
    pub original_color: Rgb,
    pub emissive: Rgb,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub flat_shading: bool,
}

impl MaterialState {
    /// Builds the state for a model material, applying the binding's
    /// overrides. `base` is the colour the model file carries.
    pub fn from_binding(binding: &MaterialBinding, base: Rgb) -> Self {
        let color = if binding.color_override.is_empty() {
            base
        } else {
            Rgb::from_hex(&binding.color_override).unwrap_or_else(|| {
                tracing::warn!(
                    material = %binding.name,
                    color = %binding.color_override,
                    "ignoring unparseable colour override"
                );
                base
            })
        };

        Self {
            name: binding.name.clone(),
            is_emissive: binding.is_emissive,
            color,
            original_color: color,
            emissive: if binding.is_emissive { color } else { Rgb::BLACK },
            emissive_intensity: if binding.is_emissive {
                MIN_BRIGHTNESS_OFF
            } else {
                0.0
            },
            metalness: binding.metalness,
            roughness: binding.roughness,
            flat_shading: binding.flat_shading,
        }
    }

    /// Glows in the original colour while enabled, sits dim grey otherwise.
    /// Non-emissive materials are left untouched.
    pub fn apply_supply(&mut self, enabled: bool, brightness: f32) {
        if !self.is_emissive {
            return;
        }
        if enabled {
            self.emissive = self.original_color;
            self.emissive_intensity = brightness.max(MIN_BRIGHTNESS_ON);
        } else {
            self.emissive = Rgb::DIM_GREY;
            self.emissive_intensity = MIN_BRIGHTNESS_OFF;
        }
    }
}
