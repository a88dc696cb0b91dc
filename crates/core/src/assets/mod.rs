use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::{ModelPlacement, PartSchema, Vec3},
    render::{MaterialState, Rgb},
    NeonRoomError, Result,
};

/// A material as it exists in a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMaterial {
    pub name: String,
    #[serde(default)]
    pub color: Rgb,
}

/// Loaded model: its materials plus the transform it was placed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneNode {
    pub path: String,
    #[serde(default)]
    pub materials: Vec<NodeMaterial>,
    /// Centre of the model's bounding box in model space.
    #[serde(default)]
    pub center: Vec3,
    #[serde(default)]
    pub position: Vec3,
    /// Euler angles in radians.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: f32,
}

fn unit_scale() -> f32 {
    1.0
}

impl SceneNode {
    pub fn new(path: impl Into<String>, materials: Vec<NodeMaterial>) -> Self {
        Self {
            path: path.into(),
            materials,
            center: Vec3::ZERO,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
        }
    }

    pub fn material(&self, name: &str) -> Option<&NodeMaterial> {
        self.materials.iter().find(|material| material.name == name)
    }

    /// Centres the model on its origin, then moves, rotates and scales it as
    /// the placement describes. Rotations are given in degrees.
    pub fn place(&mut self, placement: &ModelPlacement) {
        self.position = Vec3::new(
            placement.position.x - self.center.x,
            placement.position.y - self.center.y,
            placement.position.z - self.center.z,
        );
        self.rotation = Vec3::new(
            placement.rotation.x.to_radians(),
            placement.rotation.y.to_radians(),
            placement.rotation.z.to_radians(),
        );
        self.scale = placement.scale;
    }
}

/// Source of model files.
pub trait ModelLoader {
    fn load(&mut self, path: &str) -> Result<SceneNode>;
}

/// Path to node cache shared by every controller of a manager, so supplies
/// that reuse a model file only load it once.
#[derive(Debug, Default)]
pub struct ModelCache {
    models: HashMap<String, SceneNode>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.models.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&SceneNode> {
        self.models.get(path)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Returns a copy of the cached node, loading it first if needed.
    pub fn get_or_load(&mut self, loader: &mut dyn ModelLoader, path: &str) -> Result<SceneNode> {
        if let Some(node) = self.models.get(path) {
            return Ok(node.clone());
        }
        let node = loader.load(path)?;
        tracing::debug!(path, materials = node.materials.len(), "model loaded");
        self.models.insert(path.to_string(), node.clone());
        Ok(node)
    }
}

/// Loads a single-part model through the cache, places it, and builds the
/// state of every material the part binds. Bindings the model lacks start
/// from white.
pub fn load_part(
    part: &PartSchema,
    loader: &mut dyn ModelLoader,
    cache: &mut ModelCache,
) -> Result<(SceneNode, Vec<MaterialState>)> {
    let mut node = cache.get_or_load(loader, &part.model.path)?;
    node.place(&part.model);
    let materials = part
        .materials
        .iter()
        .map(|binding| {
            let base = node.material(&binding.name).map_or(Rgb::WHITE, |material| material.color);
            MaterialState::from_binding(binding, base)
        })
        .collect();
    Ok((node, materials))
}

/// In-memory loader. Paths that were never registered fail to load.
#[derive(Debug, Default)]
pub struct StaticLoader {
    models: HashMap<String, SceneNode>,
    failing: HashSet<String>,
    loads: usize,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node: SceneNode) {
        self.models.insert(node.path.clone(), node);
    }

    /// Registers a node for `path` that carries every named material.
    pub fn with_materials(mut self, path: &str, names: &[&str]) -> Self {
        let materials = names
            .iter()
            .map(|name| NodeMaterial {
                name: name.to_string(),
                color: Rgb::WHITE,
            })
            .collect();
        self.register(SceneNode::new(path, materials));
        self
    }

    /// Makes `path` fail even if it is registered.
    pub fn fail(&mut self, path: impl Into<String>) {
        self.failing.insert(path.into());
    }

    /// Number of load calls that reached this loader.
    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl ModelLoader for StaticLoader {
    fn load(&mut self, path: &str) -> Result<SceneNode> {
        self.loads += 1;
        if self.failing.contains(path) {
            return Err(NeonRoomError::asset_load(path, "marked as failing"));
        }
        self.models
            .get(path)
            .cloned()
            .ok_or_else(|| NeonRoomError::asset_load(path, "not registered"))
    }
}

/// Reads node descriptions stored as JSON next to the model files: the
/// model `/models/stool.glb` is described by `<root>/models/stool.json`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn descriptor_path(&self, path: &str) -> PathBuf {
        self.root
            .join(Path::new(path.trim_start_matches('/')))
            .with_extension("json")
    }
}

impl ModelLoader for DirectoryLoader {
    fn load(&mut self, path: &str) -> Result<SceneNode> {
        let file = self.descriptor_path(path);
        let text = std::fs::read_to_string(&file)
            .map_err(|error| NeonRoomError::asset_load(path, error.to_string()))?;
        let mut node: SceneNode = serde_json::from_str(&text)
            .map_err(|error| NeonRoomError::asset_load(path, error.to_string()))?;
        node.path = path.to_string();
        Ok(node)
    }
}
