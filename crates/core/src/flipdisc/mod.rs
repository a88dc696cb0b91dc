//! Flip-disc display: a grid of two-sided discs showing a drawing, a face
//! traced from the camera, or an animated pattern.
//!
//! Only discs whose state changes are flipped, and every flip starts a short
//! rotation animation and asks for a (rate-limited) click sound.

use std::f32::consts::PI;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{load_part, ModelCache, ModelLoader, SceneNode},
    config::{FlipDiscSchema, PartSchema, Vec3},
    persistence::FlipDiscConfig,
    render::MaterialState,
};

pub mod face;
pub mod glyphs;
pub mod patterns;

pub use face::{face_glyph, CameraFrame, Gesture, Landmark};
pub use patterns::{PatternEngine, PatternKind, PatternRequest};

pub const DEFAULT_ROWS: usize = 28;
pub const DEFAULT_COLS: usize = 28;
/// Seconds one disc takes to turn over.
pub const FLIP_DURATION: f32 = 0.2;
/// Seconds between pattern steps at speed 1.
pub const PATTERN_UPDATE_INTERVAL: f64 = 0.2;
/// Seconds between two flip sounds.
pub const FLIP_SOUND_MIN_INTERVAL: f64 = 0.05;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Drawing,
    Camera,
    Pattern,
    #[default]
    None,
}

/// Payload of `flip/draw`: either a bare grid of 0/1 rows or the grid with
/// an invert flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "DrawingPayload")]
pub struct DrawingRequest {
    pub grid: Vec<Vec<u8>>,
    pub invert: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DrawingPayload {
    Bare(Vec<Vec<u8>>),
    Framed {
        grid: Vec<Vec<u8>>,
        #[serde(default)]
        invert: bool,
    },
}

impl From<DrawingPayload> for DrawingRequest {
    fn from(payload: DrawingPayload) -> Self {
        match payload {
            DrawingPayload::Bare(grid) => Self { grid, invert: false },
            DrawingPayload::Framed { grid, invert } => Self { grid, invert },
        }
    }
}

impl DrawingRequest {
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.grid.len() == rows && self.grid.iter().all(|row| row.len() == cols)
    }

    /// Row-major cells with the inversion applied.
    pub fn cells(&self) -> Vec<bool> {
        self.grid
            .iter()
            .flatten()
            .map(|cell| (*cell == 1) != self.invert)
            .collect()
    }
}

/// Quadratic ease-in-out over `progress` in [0, 1].
pub fn ease_in_out(progress: f32) -> f32 {
    if progress < 0.5 {
        2.0 * progress * progress
    } else {
        -1.0 + (4.0 - 2.0 * progress) * progress
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FlipAnimation {
    elapsed: f32,
    from: f32,
    to: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Disc {
    pub row: usize,
    pub col: usize,
    /// Showing the bright face.
    pub flipped: bool,
    /// Current rotation about the flip axis in radians.
    pub rotation: f32,
    pub position: Vec3,
    animation: Option<FlipAnimation>,
}

impl Disc {
    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    fn flip(&mut self) {
        self.flipped = !self.flipped;
        let (from, to) = if self.flipped { (0.0, PI) } else { (PI, 0.0) };
        self.rotation = from;
        self.animation = Some(FlipAnimation {
            elapsed: 0.0,
            from,
            to,
        });
    }

    fn advance(&mut self, dt: f32) {
        let Some(animation) = &mut self.animation else {
            return;
        };
        animation.elapsed += dt;
        let progress = (animation.elapsed / FLIP_DURATION).min(1.0);
        self.rotation = animation.from + (animation.to - animation.from) * ease_in_out(progress);
        if progress >= 1.0 {
            self.animation = None;
        }
    }
}

#[derive(Debug, Clone)]
struct FlipSound {
    enabled: bool,
    last: Option<f64>,
    pending: u32,
}

impl FlipSound {
    fn play(&mut self, now: f64) {
        if !self.enabled {
            return;
        }
        if self.last.is_some_and(|last| now - last < FLIP_SOUND_MIN_INTERVAL) {
            return;
        }
        self.last = Some(now);
        self.pending += 1;
    }
}

#[derive(Debug)]
pub struct FlipDiscManager {
    schema: FlipDiscSchema,
    rows: usize,
    cols: usize,
    mode: DisplayMode,
    discs: Vec<Disc>,
    drawing: Option<DrawingRequest>,
    pattern: Option<PatternRequest>,
    pattern_time: f64,
    last_pattern_update: f64,
    camera: Option<CameraFrame>,
    engine: PatternEngine,
    sound: FlipSound,
    clock: f64,
    frame: Option<SceneNode>,
    disc_model: Option<SceneNode>,
    materials: Vec<MaterialState>,
}

impl FlipDiscManager {
    pub fn new(schema: FlipDiscSchema) -> Self {
        Self::with_rng(schema, DEFAULT_ROWS, DEFAULT_COLS, StdRng::from_entropy())
    }

    pub fn with_rng(schema: FlipDiscSchema, rows: usize, cols: usize, rng: StdRng) -> Self {
        let base = schema.disc.model.position;
        let spacing = schema.spacing;
        let discs = (0..rows * cols)
            .map(|index| {
                let (row, col) = (index / cols, index % cols);
                Disc {
                    row,
                    col,
                    flipped: false,
                    rotation: 0.0,
                    position: Vec3::new(
                        base.x + (col as f32 - (cols as f32 - 1.0) / 2.0) * spacing,
                        base.y + ((rows as f32 - 1.0) / 2.0 - row as f32) * spacing,
                        base.z,
                    ),
                    animation: None,
                }
            })
            .collect();

        Self {
            schema,
            rows,
            cols,
            mode: DisplayMode::None,
            discs,
            drawing: None,
            pattern: None,
            pattern_time: 0.0,
            last_pattern_update: 0.0,
            camera: None,
            engine: PatternEngine::with_rng(rows, cols, rng),
            sound: FlipSound {
                enabled: true,
                last: None,
                pending: 0,
            },
            clock: 0.0,
            frame: None,
            disc_model: None,
            materials: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn discs(&self) -> &[Disc] {
        &self.discs
    }

    pub fn pattern(&self) -> Option<&PatternRequest> {
        self.pattern.as_ref()
    }

    pub fn materials(&self) -> &[MaterialState] {
        &self.materials
    }

    pub fn is_lit(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.discs[row * self.cols + col].flipped
    }

    /// Row-major disc states.
    pub fn state(&self) -> Vec<bool> {
        self.discs.iter().map(|disc| disc.flipped).collect()
    }

    pub fn lit_count(&self) -> usize {
        self.discs.iter().filter(|disc| disc.flipped).count()
    }

    pub fn is_animating(&self) -> bool {
        self.discs.iter().any(Disc::is_animating)
    }

    /// Loads the frame, then the disc model every grid cell shares.
    pub fn load_models(&mut self, loader: &mut dyn ModelLoader, cache: &mut ModelCache) -> bool {
        let mut materials = Vec::new();
        let mut load = |part: &PartSchema| match load_part(part, loader, cache) {
            Ok((node, bound)) => {
                materials.extend(bound);
                Some(node)
            }
            Err(error) => {
                tracing::warn!(%error, "failed to load flip disc model");
                None
            }
        };
        let frame = load(&self.schema.frame);
        let disc = load(&self.schema.disc);
        let loaded = frame.is_some() && disc.is_some();
        if loaded {
            tracing::info!(rows = self.rows, cols = self.cols, "flip disc models loaded");
        }
        self.frame = frame;
        self.disc_model = disc;
        self.materials = materials;
        loaded
    }

    /// Shows `request` if it matches the grid. Returns `false` and leaves the
    /// display alone otherwise.
    pub fn set_drawing_grid(&mut self, request: &DrawingRequest) -> bool {
        if !request.fits(self.rows, self.cols) {
            tracing::warn!(
                rows = request.grid.len(),
                expected_rows = self.rows,
                expected_cols = self.cols,
                "ignoring drawing grid with the wrong dimensions"
            );
            return false;
        }
        self.drawing = Some(request.clone());
        self.mode = DisplayMode::Drawing;
        self.pattern = None;
        self.update_visualization();
        true
    }

    /// Starts `request` from its first frame.
    pub fn set_pattern(&mut self, request: &PatternRequest) {
        self.pattern = Some(request.clone());
        self.mode = DisplayMode::Pattern;
        self.pattern_time = 0.0;
        self.last_pattern_update = 0.0;
        match request.kind() {
            Some(kind) => self.engine.reset(kind),
            None => tracing::debug!(id = request.id, "unknown pattern id"),
        }
        self.update_visualization();
    }

    pub fn set_camera_data(&mut self, frame: CameraFrame) {
        self.camera = Some(frame);
        self.mode = DisplayMode::Camera;
    }

    /// Fixes the time the clock pattern shows. `None` goes back to local time.
    pub fn set_clock_time(&mut self, time: Option<(u32, u32)>) {
        self.engine.set_time_override(time);
    }

    pub fn clear(&mut self) {
        self.drawing = None;
        self.pattern = None;
        self.mode = DisplayMode::None;
        self.clear_discs();
    }

    pub fn set_sound_enabled(&mut self, enabled: bool) {
        self.sound.enabled = enabled;
    }

    pub fn toggle_sound(&mut self) -> bool {
        self.sound.enabled = !self.sound.enabled;
        self.sound.enabled
    }

    pub fn sound_enabled(&self) -> bool {
        self.sound.enabled
    }

    /// Flip sounds requested since the last call.
    pub fn take_sound_cues(&mut self) -> u32 {
        std::mem::take(&mut self.sound.pending)
    }

    pub fn update(&mut self, dt: f32) {
        self.clock += f64::from(dt);
        for disc in &mut self.discs {
            disc.advance(dt);
        }

        match self.mode {
            DisplayMode::Camera => {
                if let Some(frame) = &self.camera {
                    let glyph = face_glyph(frame, self.rows, self.cols);
                    self.apply_pattern(&glyph);
                }
            }
            DisplayMode::Pattern => {
                let Some(pattern) = &self.pattern else {
                    return;
                };
                self.pattern_time += f64::from(dt);
                let interval = PATTERN_UPDATE_INTERVAL / f64::from(pattern.speed_factor());
                if self.pattern_time - self.last_pattern_update >= interval {
                    self.update_pattern();
                    self.last_pattern_update = self.pattern_time;
                }
            }
            DisplayMode::Drawing | DisplayMode::None => {}
        }
    }

    /// Restores a saved display. A saved pattern wins over a saved drawing.
    pub fn apply_config(&mut self, config: &FlipDiscConfig) {
        if let Some(drawing) = &config.drawing {
            self.set_drawing_grid(drawing);
        }
        if let Some(pattern) = config.pattern.as_ref().filter(|pattern| pattern.enable) {
            self.set_pattern(pattern);
        }
    }

    pub fn to_config(&self) -> FlipDiscConfig {
        FlipDiscConfig {
            pattern: self.pattern.clone(),
            drawing: self.drawing.clone(),
        }
    }

    fn update_visualization(&mut self) {
        match self.mode {
            DisplayMode::Drawing => {
                if let Some(cells) = self.drawing.as_ref().map(DrawingRequest::cells) {
                    self.apply_pattern(&cells);
                }
            }
            DisplayMode::Pattern if self.pattern.as_ref().is_some_and(|p| p.enable) => {
                self.update_pattern()
            }
            _ => self.clear_discs(),
        }
    }

    fn update_pattern(&mut self) {
        let Some(pattern) = self.pattern.as_ref().filter(|pattern| pattern.enable) else {
            return;
        };
        let Some(kind) = pattern.kind() else {
            return;
        };
        let speed = pattern.speed_factor();
        let frame = self.engine.generate(kind, self.pattern_time, speed);
        self.apply_pattern(&frame);
    }

    /// Flips exactly the discs whose state differs from `cells`.
    fn apply_pattern(&mut self, cells: &[bool]) {
        let mut flipped = 0;
        for (disc, wanted) in self.discs.iter_mut().zip(cells) {
            if disc.flipped != *wanted {
                disc.flip();
                self.sound.play(self.clock);
                flipped += 1;
            }
        }
        if flipped > 0 {
            tracing::trace!(flipped, "discs flipped");
        }
    }

    fn clear_discs(&mut self) {
        let blank = vec![false; self.discs.len()];
        self.apply_pattern(&blank);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticLoader;

    fn manager(rows: usize, cols: usize) -> FlipDiscManager {
        FlipDiscManager::with_rng(FlipDiscSchema::default(), rows, cols, StdRng::seed_from_u64(5))
    }

    fn drawing(rows: usize, cols: usize, lit: &[(usize, usize)]) -> DrawingRequest {
        let mut grid = vec![vec![0; cols]; rows];
        for (row, col) in lit {
            grid[*row][*col] = 1;
        }
        DrawingRequest { grid, invert: false }
    }

    #[test]
    fn ease_is_symmetric() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(0.5), 0.5);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert_eq!(ease_in_out(0.25), 0.125);
        assert_eq!(ease_in_out(0.75), 0.875);
    }

    #[test]
    fn empty_display_runs_patterns() {
        let mut manager = manager(0, 0);
        manager.set_pattern(&PatternRequest::new(PatternKind::Blob, 1.0));
        manager.update(0.5);
        assert_eq!(manager.mode(), DisplayMode::Pattern);
        assert_eq!(manager.lit_count(), 0);
    }

    #[test]
    fn drawing_payload_accepts_both_shapes() {
        let bare: DrawingRequest = serde_json::from_str("[[1, 0], [0, 1]]").unwrap();
        assert!(!bare.invert);
        assert_eq!(bare.cells(), vec![true, false, false, true]);

        let framed: DrawingRequest =
            serde_json::from_str(r#"{"grid": [[1, 0], [0, 1]], "invert": true}"#).unwrap();
        assert_eq!(framed.cells(), vec![false, true, true, false]);
        assert!(framed.fits(2, 2));
        assert!(!framed.fits(2, 3));
    }

    #[test]
    fn only_changed_discs_flip() {
        let mut manager = manager(4, 4);
        assert!(manager.set_drawing_grid(&drawing(4, 4, &[(0, 0), (1, 1)])));
        assert_eq!(manager.mode(), DisplayMode::Drawing);
        assert_eq!(manager.lit_count(), 2);
        assert_eq!(manager.take_sound_cues(), 1);

        for _ in 0..2 {
            manager.update(0.125);
        }
        assert!(!manager.is_animating());

        manager.set_drawing_grid(&drawing(4, 4, &[(0, 0), (2, 2)]));
        let animating: Vec<(usize, usize)> = manager
            .discs()
            .iter()
            .filter(|disc| disc.is_animating())
            .map(|disc| (disc.row, disc.col))
            .collect();
        assert_eq!(animating, vec![(1, 1), (2, 2)]);
        assert!(manager.is_lit(2, 2) && !manager.is_lit(1, 1));
    }

    #[test]
    fn flip_animation_turns_half_a_revolution() {
        let mut manager = manager(1, 1);
        manager.set_drawing_grid(&drawing(1, 1, &[(0, 0)]));
        assert_eq!(manager.discs()[0].rotation, 0.0);
        manager.update(0.1);
        assert!((manager.discs()[0].rotation - PI / 2.0).abs() < 1e-5);
        manager.update(0.1);
        assert!((manager.discs()[0].rotation - PI).abs() < 1e-5);
        assert!(!manager.is_animating());

        manager.clear();
        assert_eq!(manager.mode(), DisplayMode::None);
        assert_eq!(manager.discs()[0].rotation, PI);
        manager.update(0.25);
        assert_eq!(manager.discs()[0].rotation, 0.0);
    }

    #[test]
    fn wrong_sized_drawings_are_ignored() {
        let mut manager = manager(4, 4);
        manager.set_drawing_grid(&drawing(4, 4, &[(3, 3)]));
        assert!(!manager.set_drawing_grid(&drawing(3, 4, &[(0, 0)])));
        let mut ragged = drawing(4, 4, &[]);
        ragged.grid[2].pop();
        assert!(!manager.set_drawing_grid(&ragged));
        assert_eq!(manager.state().iter().filter(|lit| **lit).count(), 1);
        assert!(manager.is_lit(3, 3));
    }

    #[test]
    fn sounds_are_rate_limited_and_switchable() {
        let mut manager = manager(4, 4);
        manager.set_drawing_grid(&drawing(4, 4, &[(0, 0), (0, 1), (0, 2)]));
        assert_eq!(manager.take_sound_cues(), 1);

        manager.update(0.125);
        manager.clear();
        assert_eq!(manager.take_sound_cues(), 1);

        assert!(!manager.toggle_sound());
        manager.update(0.125);
        manager.set_drawing_grid(&drawing(4, 4, &[(1, 1)]));
        assert_eq!(manager.take_sound_cues(), 0);
    }

    #[test]
    fn patterns_step_at_their_interval() {
        let mut manager = manager(DEFAULT_ROWS, DEFAULT_COLS);
        manager.set_pattern(&PatternRequest::new(PatternKind::Wave, 1.0));
        assert_eq!(manager.mode(), DisplayMode::Pattern);
        let first = manager.state();
        assert!(first.iter().any(|lit| *lit));

        manager.update(0.125);
        assert_eq!(manager.state(), first);
        manager.update(0.125);
        assert_ne!(manager.state(), first);

        // double speed steps every tick of 0.125 s
        manager.set_pattern(&PatternRequest::new(PatternKind::Wave, 2.0));
        let restarted = manager.state();
        manager.update(0.125);
        assert_ne!(manager.state(), restarted);
    }

    #[test]
    fn disabled_pattern_blanks_the_grid() {
        let mut manager = manager(4, 4);
        manager.set_drawing_grid(&drawing(4, 4, &[(0, 0)]));
        manager.set_pattern(&PatternRequest {
            enable: false,
            ..PatternRequest::new(PatternKind::Spiral, 1.0)
        });
        assert_eq!(manager.lit_count(), 0);
        manager.update(1.0);
        assert_eq!(manager.lit_count(), 0);
        assert!(!manager.to_config().pattern.unwrap().enable);
    }

    #[test]
    fn camera_mode_draws_the_face() {
        let mut manager = manager(DEFAULT_ROWS, DEFAULT_COLS);
        let frame = CameraFrame {
            face_landmarks: vec![vec![
                Landmark::new(0.0, 0.0),
                Landmark::new(1.0, 1.0),
            ]],
            gestures: Vec::new(),
        };
        manager.set_camera_data(frame);
        assert_eq!(manager.mode(), DisplayMode::Camera);
        manager.update(0.1);
        // no feature landmarks, so nothing is drawn
        assert_eq!(manager.lit_count(), 0);
    }

    #[test]
    fn saved_display_round_trips() {
        let mut manager = manager(DEFAULT_ROWS, DEFAULT_COLS);
        manager.set_clock_time(Some((12, 34)));
        manager.set_pattern(&PatternRequest::new(PatternKind::Clock, 1.0));
        let saved = manager.to_config();

        let mut restored = FlipDiscManager::with_rng(
            FlipDiscSchema::default(),
            DEFAULT_ROWS,
            DEFAULT_COLS,
            StdRng::seed_from_u64(1),
        );
        restored.set_clock_time(Some((12, 34)));
        restored.apply_config(&saved);
        assert_eq!(restored.mode(), DisplayMode::Pattern);
        assert_eq!(restored.state(), manager.state());
    }

    #[test]
    fn models_load_through_the_cache() {
        let mut manager = manager(2, 2);
        let mut loader = StaticLoader::new()
            .with_materials("/models/flipdisc_frame.glb", &["Frame"])
            .with_materials("/models/flipdisc_disc.glb", &["DiscFront", "DiscBack"]);
        assert!(manager.load_models(&mut loader, &mut ModelCache::new()));
        assert_eq!(manager.materials().len(), 3);
        let discs = manager.discs();
        assert!((discs[1].position.x - discs[0].position.x - 0.02).abs() < 1e-6);
        assert!(discs[2].position.y < discs[0].position.y);

        let mut empty = StaticLoader::new();
        assert!(!manager.load_models(&mut empty, &mut ModelCache::new()));
    }
}
