//! Static model schemas describing how each installation is assembled.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where a loaded model is placed. Rotation is given in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPlacement {
    pub path: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self {
            path: String::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl ModelPlacement {
    pub fn at(path: impl Into<String>, position: Vec3) -> Self {
        Self {
            path: path.into(),
            position,
            ..Self::default()
        }
    }

    pub fn rotated(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

/// Material settings applied to a named material of a loaded model.
///
/// Schemas may list a bare material name instead of a full binding; it
/// deserializes to a non-emissive binding with default surface settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MaterialEntry", rename_all = "camelCase")]
pub struct MaterialBinding {
    pub name: String,
    /// Hex colour such as `#ff3366`; empty keeps the model's own colour.
    pub color_override: String,
    pub is_emissive: bool,
    pub metalness: f32,
    pub roughness: f32,
    pub flat_shading: bool,
}

impl MaterialBinding {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color_override: String::new(),
            is_emissive: false,
            metalness: 0.0,
            roughness: 0.8,
            flat_shading: true,
        }
    }

    pub fn emissive(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            color_override: color.into(),
            is_emissive: true,
            ..Self::named(name)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MaterialEntry {
    Name(String),
    Full(FullMaterial),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullMaterial {
    name: String,
    #[serde(default)]
    color_override: String,
    #[serde(default)]
    is_emissive: bool,
    #[serde(default)]
    metalness: f32,
    #[serde(default = "default_roughness")]
    roughness: f32,
    #[serde(default = "default_flat_shading")]
    flat_shading: bool,
}

fn default_roughness() -> f32 {
    0.8
}

fn default_flat_shading() -> bool {
    true
}

impl From<MaterialEntry> for MaterialBinding {
    fn from(entry: MaterialEntry) -> Self {
        match entry {
            MaterialEntry::Name(name) => MaterialBinding::named(name),
            MaterialEntry::Full(full) => MaterialBinding {
                name: full.name,
                color_override: full.color_override,
                is_emissive: full.is_emissive,
                metalness: full.metalness,
                roughness: full.roughness,
                flat_shading: full.flat_shading,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplySchema {
    pub id: usize,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub can_rotate: bool,
    #[serde(default)]
    pub model: Option<ModelPlacement>,
    #[serde(default)]
    pub materials: Vec<MaterialBinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerSchema {
    #[serde(default)]
    pub supplies: Vec<SupplySchema>,
}

impl ControllerSchema {
    /// Distinct model paths in supply order.
    pub fn model_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for supply in &self.supplies {
            if let Some(model) = &supply.model {
                if !model.path.is_empty() && !paths.contains(&model.path.as_str()) {
                    paths.push(&model.path);
                }
            }
        }
        paths
    }
}

/// A single loadable part with its material bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartSchema {
    pub model: ModelPlacement,
    #[serde(default)]
    pub materials: Vec<MaterialBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipDiscSchema {
    pub frame: PartSchema,
    pub disc: PartSchema,
    /// Centre-to-centre spacing of the discs in model units.
    pub spacing: f32,
}

impl Default for FlipDiscSchema {
    fn default() -> Self {
        Self {
            frame: PartSchema {
                model: ModelPlacement::at("/models/flipdisc_frame.glb", Vec3::ZERO),
                materials: vec![MaterialBinding::named("Frame")],
            },
            disc: PartSchema {
                model: ModelPlacement::at("/models/flipdisc_disc.glb", Vec3::ZERO),
                materials: vec![
                    MaterialBinding::emissive("DiscFront", "#f2f2f2"),
                    MaterialBinding::named("DiscBack"),
                ],
            },
            spacing: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoKnobSchema {
    pub knob: PartSchema,
    pub mount: PartSchema,
}

impl Default for DiscoKnobSchema {
    fn default() -> Self {
        Self {
            knob: PartSchema {
                model: ModelPlacement::at("/models/discoknob_ball.glb", Vec3::new(0.0, 0.12, 0.0)),
                materials: vec![MaterialBinding::named("Mirror")],
            },
            mount: PartSchema {
                model: ModelPlacement::at("/models/discoknob_mount.glb", Vec3::ZERO),
                materials: vec![MaterialBinding::named("Mount")],
            },
        }
    }
}

/// Three wall-mounted controllers with a static outer ring and a rotating
/// inner flower each.
pub fn wallflower_schema() -> Vec<ControllerSchema> {
    (0..3)
        .map(|index| {
            let x = -1.2 + 1.2 * index as f32;
            ControllerSchema {
                supplies: vec![
                    SupplySchema {
                        id: 0,
                        kind: "supply0".into(),
                        can_rotate: false,
                        model: Some(
                            ModelPlacement::at("/models/wallflower_ring.glb", Vec3::new(x, 2.5, -2.9))
                                .rotated(Vec3::new(90.0, 0.0, 0.0)),
                        ),
                        materials: vec![
                            MaterialBinding::emissive("NeonRing", "#ff2a6d"),
                            MaterialBinding::named("Backplate"),
                        ],
                    },
                    SupplySchema {
                        id: 1,
                        kind: "supply1".into(),
                        can_rotate: true,
                        model: Some(
                            ModelPlacement::at("/models/wallflower_flower.glb", Vec3::new(x, 2.5, -2.85))
                                .rotated(Vec3::new(90.0, 0.0, 0.0)),
                        ),
                        materials: vec![MaterialBinding::emissive("NeonPetals", "#05d9e8")],
                    },
                ],
            }
        })
        .collect()
}

/// One stool whose two supplies live in the same model file.
pub fn stool_schema() -> Vec<ControllerSchema> {
    let placement = ModelPlacement::at("/models/stool.glb", Vec3::new(0.54, 0.0, 0.175)).scaled(0.9);
    vec![ControllerSchema {
        supplies: vec![
            SupplySchema {
                id: 0,
                kind: "supply0".into(),
                can_rotate: false,
                model: Some(placement.clone()),
                materials: vec![
                    MaterialBinding::emissive("NeonSeat", "#ff9f1c"),
                    MaterialBinding::named("Wood"),
                ],
            },
            SupplySchema {
                id: 1,
                kind: "supply1".into(),
                can_rotate: false,
                model: Some(placement),
                materials: vec![MaterialBinding::emissive("NeonLegs", "#2ec4b6")],
            },
        ],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_accepts_plain_names() {
        let materials: Vec<MaterialBinding> =
            serde_json::from_str(r#"["Wood", {"name": "Neon", "isEmissive": true}]"#).unwrap();
        assert_eq!(materials[0], MaterialBinding::named("Wood"));
        assert!(materials[1].is_emissive);
        assert_eq!(materials[1].roughness, 0.8);
        assert!(materials[1].flat_shading);
    }

    #[test]
    fn stool_shares_one_model_file() {
        let schema = stool_schema();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].supplies.len(), 2);
        assert_eq!(schema[0].model_paths(), vec!["/models/stool.glb"]);
    }

    #[test]
    fn wallflower_rotates_inner_supply() {
        let schema = wallflower_schema();
        assert_eq!(schema.len(), 3);
        for controller in &schema {
            assert!(!controller.supplies[0].can_rotate);
            assert!(controller.supplies[1].can_rotate);
            assert_eq!(controller.model_paths().len(), 2);
        }
    }

    #[test]
    fn supply_schema_parses_wire_names() {
        let supply: SupplySchema = serde_json::from_str(
            r#"{"id": 1, "type": "supply1", "canRotate": true,
                "model": {"path": "/m.glb", "scale": 2.0}}"#,
        )
        .unwrap();
        assert_eq!(supply.kind, "supply1");
        assert!(supply.can_rotate);
        let model = supply.model.unwrap();
        assert_eq!(model.scale, 2.0);
        assert_eq!(model.position, Vec3::ZERO);
    }
}
