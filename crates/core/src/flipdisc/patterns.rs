//! Animated patterns for the flip-disc grid. Each call to
//! [`PatternEngine::generate`] advances one pattern by a step and returns the
//! complete row-major frame.

use std::collections::{BTreeSet, HashSet};
use std::f32::consts::FRAC_PI_2;

use chrono::Timelike;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::glyphs::draw_digit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    Clock,
    Spiral,
    Wave,
    Blob,
    Cascade,
    Bounce,
    Square,
}

impl PatternKind {
    pub const ALL: [PatternKind; 7] = [
        PatternKind::Clock,
        PatternKind::Spiral,
        PatternKind::Wave,
        PatternKind::Blob,
        PatternKind::Cascade,
        PatternKind::Bounce,
        PatternKind::Square,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id).checked_sub(1)?).copied()
    }

    pub fn id(self) -> u8 {
        self as u8 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            PatternKind::Clock => "Clock",
            PatternKind::Spiral => "Spiral",
            PatternKind::Wave => "Wave",
            PatternKind::Blob => "Blob",
            PatternKind::Cascade => "Cascade",
            PatternKind::Bounce => "Bounce",
            PatternKind::Square => "Square",
        }
    }
}

/// Payload of `flip/pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternRequest {
    pub id: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Multiplier on the step rate.
    pub speed: f32,
    pub enable: bool,
}

impl Default for PatternRequest {
    fn default() -> Self {
        Self {
            id: 0,
            name: None,
            speed: 1.0,
            enable: true,
        }
    }
}

impl PatternRequest {
    pub fn new(kind: PatternKind, speed: f32) -> Self {
        Self {
            id: kind.id(),
            name: Some(kind.name().to_string()),
            speed,
            enable: true,
        }
    }

    pub fn kind(&self) -> Option<PatternKind> {
        PatternKind::from_id(self.id)
    }

    /// Speed to divide step intervals by. Non-positive speeds count as 1.
    pub fn speed_factor(&self) -> f32 {
        if self.speed.is_finite() && self.speed > 0.0 {
            self.speed
        } else {
            1.0
        }
    }
}

const SQUARE_MAX: i32 = 20;
const SQUARE_MIN: i32 = 1;
const SPIRAL_STEP: f32 = 0.2;
const SPIRAL_LENGTH: f32 = 50.0;
const WAVE_STEP: f32 = 0.2;
const FOOD_COUNT: usize = 30;
const FOOD_ATTEMPTS: usize = 50;
const ORGANISM_MAX_RADIUS: f32 = 15.0;
const ORGANISM_SPEED: f32 = 0.15;
const CASCADE_START_INTERVAL: f64 = 1.0;
const CASCADE_MIN_INTERVAL: f64 = 0.05;
const BALL_SIZE: f32 = 2.0;
const BOUNCE_JITTER: f32 = 0.1;

#[derive(Debug, Clone)]
struct Square {
    size: i32,
    growing: bool,
}

#[derive(Debug, Clone)]
struct Organism {
    x: f32,
    y: f32,
    radius: f32,
    growth: f32,
    food: BTreeSet<(usize, usize)>,
    consumed: HashSet<(usize, usize)>,
}

#[derive(Debug, Clone)]
struct Cascade {
    lit: BTreeSet<usize>,
    rising: bool,
    total: usize,
    max_flips: usize,
    interval: f64,
    last_flip: f64,
}

#[derive(Debug, Clone)]
struct Ball {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
}

#[derive(Debug)]
pub struct PatternEngine {
    rows: usize,
    cols: usize,
    square: Square,
    spiral_angle: f32,
    wave_phase: f32,
    organism: Organism,
    cascade: Cascade,
    ball: Ball,
    /// Fixed (hour, minute) for the clock instead of local time.
    time_override: Option<(u32, u32)>,
    rng: StdRng,
}

impl PatternEngine {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_rng(rows, cols, StdRng::from_entropy())
    }

    pub fn with_rng(rows: usize, cols: usize, rng: StdRng) -> Self {
        let mut engine = Self {
            rows,
            cols,
            square: Square {
                size: SQUARE_MIN,
                growing: true,
            },
            spiral_angle: 0.0,
            wave_phase: 0.0,
            organism: Organism {
                x: 0.0,
                y: 0.0,
                radius: 1.0,
                growth: 0.0,
                food: BTreeSet::new(),
                consumed: HashSet::new(),
            },
            cascade: Cascade {
                lit: BTreeSet::new(),
                rising: true,
                total: 0,
                max_flips: 0,
                interval: CASCADE_START_INTERVAL,
                last_flip: f64::NEG_INFINITY,
            },
            ball: Ball {
                x: 0.0,
                y: 0.0,
                dx: 0.0,
                dy: 0.0,
            },
            time_override: None,
            rng,
        };
        for kind in PatternKind::ALL {
            engine.reset(kind);
        }
        engine
    }

    pub fn set_time_override(&mut self, time: Option<(u32, u32)>) {
        self.time_override = time;
    }

    /// Puts `kind` back at its first frame.
    pub fn reset(&mut self, kind: PatternKind) {
        let (rows, cols) = (self.rows, self.cols);
        match kind {
            PatternKind::Square => {
                self.square = Square {
                    size: SQUARE_MIN,
                    growing: true,
                }
            }
            PatternKind::Spiral => self.spiral_angle = 0.0,
            PatternKind::Wave => self.wave_phase = 0.0,
            PatternKind::Blob => {
                self.organism = Organism {
                    x: (cols / 2) as f32,
                    y: (rows / 2) as f32,
                    radius: 1.0,
                    growth: 0.0,
                    food: BTreeSet::new(),
                    consumed: HashSet::new(),
                };
                while self.organism.food.len() < FOOD_COUNT {
                    if !self.add_food() {
                        break;
                    }
                }
            }
            PatternKind::Cascade => {
                self.cascade = Cascade {
                    lit: BTreeSet::new(),
                    rising: true,
                    total: 0,
                    max_flips: rows.min(cols) * 50,
                    interval: CASCADE_START_INTERVAL,
                    last_flip: f64::NEG_INFINITY,
                }
            }
            PatternKind::Bounce => {
                self.ball = Ball {
                    x: (cols / 2) as f32,
                    y: (rows / 2) as f32,
                    dx: 0.5,
                    dy: 0.3,
                }
            }
            PatternKind::Clock => {}
        }
    }

    /// Advances `kind` one step. `now` is the pattern clock in seconds and
    /// only matters to time-driven patterns.
    pub fn generate(&mut self, kind: PatternKind, now: f64, speed: f32) -> Vec<bool> {
        let mut frame = vec![false; self.rows * self.cols];
        match kind {
            PatternKind::Clock => self.clock(&mut frame),
            PatternKind::Spiral => self.spiral(&mut frame),
            PatternKind::Wave => self.wave(&mut frame),
            PatternKind::Blob => self.blob(&mut frame),
            PatternKind::Cascade => self.cascade(&mut frame, now, speed),
            PatternKind::Bounce => self.bounce(&mut frame),
            PatternKind::Square => self.square(&mut frame),
        }
        frame
    }

    fn set(&self, frame: &mut [bool], x: i64, y: i64) {
        if (0..self.cols as i64).contains(&x) && (0..self.rows as i64).contains(&y) {
            frame[y as usize * self.cols + x as usize] = true;
        }
    }

    fn clock(&self, frame: &mut [bool]) {
        let (hours, minutes) = self.time_override.unwrap_or_else(|| {
            let now = chrono::Local::now();
            (now.hour(), now.minute())
        });
        let digits = [
            (hours / 10, 3, 2),
            (hours % 10, 14, 2),
            (minutes / 10, 3, 14),
            (minutes % 10, 14, 14),
        ];
        for (digit, left, top) in digits {
            draw_digit(frame, self.cols, self.rows, digit, left, top, 10, 11);
        }
    }

    fn spiral(&mut self, frame: &mut [bool]) {
        self.spiral_angle += SPIRAL_STEP;
        let (cx, cy) = ((self.cols / 2) as f32, (self.rows / 2) as f32);
        for step in 0..500 {
            let t = step as f32 * 0.1;
            let r = t * 2.0;
            let angle = t * 2.0 + self.spiral_angle;
            let x = (cx + r * angle.cos()).round() as i64;
            let y = (cy + r * angle.sin()).round() as i64;
            for (dx, dy) in [(0, 0), (0, 1), (1, 1), (1, 0)] {
                self.set(frame, x + dx, y + dy);
            }
            if r > SPIRAL_LENGTH {
                break;
            }
        }
    }

    fn wave(&mut self, frame: &mut [bool]) {
        self.wave_phase += WAVE_STEP;
        let amplitude = self.rows as f32 / 6.0;
        let center = (self.rows / 2) as f32;
        for col in 0..self.cols {
            let c = col as f32;
            let height = (self.wave_phase + c * 0.3).sin() * amplitude
                + (self.wave_phase * 0.7 + c * 0.4).sin() * amplitude * 0.5;
            let row = (center + height).round() as i64;
            for thickness in -1..=1 {
                self.set(frame, col as i64, row + thickness);
            }
        }
    }

    fn add_food(&mut self) -> bool {
        if self.rows == 0 || self.cols == 0 {
            return false;
        }
        for _ in 0..FOOD_ATTEMPTS {
            let x = self.rng.gen_range(0..self.cols);
            let y = self.rng.gen_range(0..self.rows);
            let organism = &self.organism;
            let distance = (x as f32 - organism.x).hypot(y as f32 - organism.y);
            if distance > organism.radius * 2.0
                && !organism.food.contains(&(x, y))
                && !organism.consumed.contains(&(x, y))
            {
                self.organism.food.insert((x, y));
                return true;
            }
        }
        false
    }

    fn blob(&mut self, frame: &mut [bool]) {
        let organism = &self.organism;
        let nearest = organism
            .food
            .iter()
            .map(|&(x, y)| ((x, y), (x as f32 - organism.x).hypot(y as f32 - organism.y)))
            .fold(None, |best: Option<((usize, usize), f32)>, candidate| match best {
                Some(best) if best.1 <= candidate.1 => Some(best),
                _ => Some(candidate),
            });

        if let Some(((fx, fy), distance)) = nearest {
            let organism = &mut self.organism;
            let speed = ORGANISM_SPEED * (1.0 - organism.radius / ORGANISM_MAX_RADIUS * 0.5);
            let angle = (fy as f32 - organism.y).atan2(fx as f32 - organism.x);
            organism.x += angle.cos() * speed;
            organism.y += angle.sin() * speed;

            if distance < organism.radius {
                organism.food.remove(&(fx, fy));
                organism.consumed.insert((fx, fy));
                organism.growth += 0.1;
                if organism.growth >= 1.0 {
                    organism.radius = (organism.radius + 0.2).min(ORGANISM_MAX_RADIUS);
                    organism.growth = 0.0;
                }
                self.add_food();
            }
        }

        for y in 0..self.rows {
            for x in 0..self.cols {
                if self.organism.food.contains(&(x, y)) {
                    frame[y * self.cols + x] = true;
                    continue;
                }
                let organism = &self.organism;
                let distance = (x as f32 - organism.x).hypot(y as f32 - organism.y);
                if distance < organism.radius {
                    let sphere = (distance / organism.radius * FRAC_PI_2).cos();
                    let threshold = 0.7 + sphere * 0.3;
                    if self.rng.gen::<f32>() < threshold {
                        frame[y * self.cols + x] = true;
                    }
                }
            }
        }
    }

    fn cascade(&mut self, frame: &mut [bool], now: f64, speed: f32) {
        let cells = self.rows * self.cols;
        let state = &mut self.cascade;
        if now - state.last_flip > state.interval {
            let flips = (state.total / 20).max(1);
            for _ in 0..flips {
                let available: Vec<usize> = if state.rising {
                    (0..cells).filter(|index| !state.lit.contains(index)).collect()
                } else {
                    state.lit.iter().copied().collect()
                };
                if available.is_empty() {
                    state.rising = !state.rising;
                    state.total = 0;
                    state.interval = CASCADE_MIN_INTERVAL;
                    break;
                }
                let index = available[self.rng.gen_range(0..available.len())];
                if state.rising {
                    state.lit.insert(index);
                } else {
                    state.lit.remove(&index);
                }
                state.total += 1;
            }
            state.last_flip = now;

            let progress = state.total as f64 / state.max_flips.max(1) as f64;
            let acceleration = (0.99 - progress * 0.8).min(0.9);
            let floor = CASCADE_MIN_INTERVAL / f64::from(speed.max(f32::EPSILON));
            state.interval = (state.interval * acceleration).max(floor);
        }
        for index in &state.lit {
            frame[*index] = true;
        }
    }

    fn bounce(&mut self, frame: &mut [bool]) {
        let (cols, rows) = (self.cols as f32, self.rows as f32);
        let ball = &mut self.ball;
        ball.x += ball.dx;
        ball.y += ball.dy;

        if ball.x <= BALL_SIZE || ball.x >= cols - BALL_SIZE {
            ball.dx = -ball.dx;
            ball.dy += (self.rng.gen::<f32>() - 0.5) * BOUNCE_JITTER;
            normalize(ball);
        }
        if ball.y <= BALL_SIZE || ball.y >= rows - BALL_SIZE {
            ball.dy = -ball.dy;
            ball.dx += (self.rng.gen::<f32>() - 0.5) * BOUNCE_JITTER;
            normalize(ball);
        }

        let (bx, by) = (ball.x.floor() as i64, ball.y.floor() as i64);
        for dy in -1..=0 {
            for dx in -1..=0 {
                self.set(frame, bx + dx, by + dy);
            }
        }
    }

    fn square(&mut self, frame: &mut [bool]) {
        let (cx, cy) = ((self.cols / 2) as f32, (self.rows / 2) as f32);
        let size = self.square.size as f32;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let dist_x = ((col as f32 - cx + 0.5).abs() - 0.5).max(0.0);
                let dist_y = ((row as f32 - cy + 0.5).abs() - 0.5).max(0.0);
                let dist = dist_x.max(dist_y);
                // two discs thick
                if dist == size || dist == size - 1.0 {
                    frame[row * self.cols + col] = true;
                }
            }
        }

        let square = &mut self.square;
        if square.growing {
            square.size += 1;
            if square.size >= SQUARE_MAX {
                square.growing = false;
            }
        } else {
            square.size -= 1;
            if square.size <= SQUARE_MIN {
                square.growing = true;
            }
        }
    }
}

fn normalize(ball: &mut Ball) {
    let speed = ball.dx.hypot(ball.dy);
    if speed > 0.0 {
        ball.dx /= speed;
        ball.dy /= speed;
    }
}
