//! Face glyph drawn from tracked face landmarks and hand gestures.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::lenient_vec;

/// Gesture that turns the mouth into a smile.
pub const SMILE_GESTURE: &str = "Open_Palm";
pub const SMILE_MIN_SCORE: f32 = 0.3;
/// Cells left blank around the face on every side.
const MARGIN: i32 = 4;
/// Eyebrows are drawn slightly above their landmarks.
const EYEBROW_LIFT: f32 = 0.02;

const LEFT_EYEBROW: [usize; 5] = [336, 296, 334, 293, 300];
const RIGHT_EYEBROW: [usize; 5] = [70, 63, 105, 66, 107];
const LEFT_EYE: (usize, usize) = (386, 374);
const RIGHT_EYE: (usize, usize) = (159, 145);
const MOUTH_CENTER: usize = 0;
const MOUTH_LEFT: usize = 61;
const MOUTH_RIGHT: usize = 291;

/// Normalised image coordinates of one tracked point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Gesture {
    pub category_name: String,
    pub score: f32,
}

/// Payload of `flip/camera`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFrame {
    /// One landmark list per detected face. Only the first face is drawn.
    #[serde(default, deserialize_with = "lenient_vec")]
    pub face_landmarks: Vec<Vec<Landmark>>,
    /// Recognisers report gestures nested per hand; any nesting is accepted.
    #[serde(default, deserialize_with = "flatten_gestures")]
    pub gestures: Vec<Gesture>,
}

impl CameraFrame {
    pub fn is_smiling(&self) -> bool {
        self.gestures
            .iter()
            .any(|gesture| gesture.category_name == SMILE_GESTURE && gesture.score > SMILE_MIN_SCORE)
    }
}

fn flatten_gestures<'de, D>(deserializer: D) -> Result<Vec<Gesture>, D::Error>
where
    D: Deserializer<'de>,
{
    fn collect(value: Value, out: &mut Vec<Gesture>) {
        match value {
            Value::Array(items) => items.into_iter().for_each(|item| collect(item, out)),
            object @ Value::Object(_) => out.extend(serde_json::from_value(object).ok()),
            _ => {}
        }
    }
    let mut gestures = Vec::new();
    collect(Value::deserialize(deserializer)?, &mut gestures);
    Ok(gestures)
}

struct Canvas {
    cells: Vec<bool>,
    rows: i32,
    cols: i32,
}

impl Canvas {
    fn set(&mut self, x: i32, y: i32) {
        if (0..self.cols).contains(&x) && (0..self.rows).contains(&y) {
            self.cells[(y * self.cols + x) as usize] = true;
        }
    }

    fn line(&mut self, (mut x, mut y): (i32, i32), (x2, y2): (i32, i32)) {
        let dx = (x2 - x).abs();
        let dy = (y2 - y).abs();
        let sx = if x < x2 { 1 } else { -1 };
        let sy = if y < y2 { 1 } else { -1 };
        let mut err = dx - dy;
        loop {
            self.set(x, y);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 > -dy {
                err -= dy;
                x += sx;
            }
            if e2 < dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn block(&mut self, (x, y): (i32, i32), size: i32) {
        for dy in -size..=size {
            for dx in -size..=size {
                self.set(x + dx, y + dy);
            }
        }
    }
}

/// Maps eyelid separation, relative to face height, to a block half-size
/// of 0, 1 or 2.
pub fn eye_size(openness: f32) -> i32 {
    let normalized = (openness - 0.01) / (0.08 - 0.01);
    if normalized > 0.35 && normalized < 0.8 {
        return 1;
    }
    (normalized * 2.0).round().clamp(0.0, 2.0) as i32
}

/// Row-major glyph of the first face in `frame`. Blank when no face is
/// tracked or the face has no extent.
pub fn face_glyph(frame: &CameraFrame, rows: usize, cols: usize) -> Vec<bool> {
    let mut canvas = Canvas {
        cells: vec![false; rows * cols],
        rows: rows as i32,
        cols: cols as i32,
    };
    let Some(landmarks) = frame.face_landmarks.first().filter(|face| !face.is_empty()) else {
        return canvas.cells;
    };

    let (mut min_x, mut max_x) = (f32::MAX, f32::MIN);
    let (mut min_y, mut max_y) = (f32::MAX, f32::MIN);
    for point in landmarks {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }
    let width = max_x - min_x;
    let height = max_y - min_y;
    if width <= 0.0 || height <= 0.0 {
        return canvas.cells;
    }

    let usable_width = (canvas.cols - 2 * MARGIN) as f32;
    let usable_height = (canvas.rows - 2 * MARGIN) as f32;
    let (last_col, last_row) = (canvas.cols - 1, canvas.rows - 1);
    let to_grid = |x: f32, y: f32| {
        let gx = (((x - min_x) / width) * usable_width).floor() as i32 + MARGIN;
        let gy = (((y - min_y) / height) * usable_height).floor() as i32 + MARGIN;
        (gx.clamp(0, last_col.max(0)), gy.clamp(0, last_row.max(0)))
    };

    for brow in [LEFT_EYEBROW, RIGHT_EYEBROW] {
        let mut previous = None;
        for point in brow.iter().filter_map(|index| landmarks.get(*index)) {
            let current = to_grid(point.x, point.y - EYEBROW_LIFT);
            if let Some(previous) = previous {
                canvas.line(previous, current);
            }
            previous = Some(current);
        }
    }

    let eye = |(top, bottom): (usize, usize)| Some((landmarks.get(top)?, landmarks.get(bottom)?));
    if let (Some((left_top, left_bottom)), Some((right_top, right_bottom))) = (eye(LEFT_EYE), eye(RIGHT_EYE)) {
        for (top, bottom) in [(left_top, left_bottom), (right_top, right_bottom)] {
            let size = eye_size((bottom.y - top.y) / height);
            canvas.block(to_grid(top.x, (top.y + bottom.y) / 2.0), size);
        }
    }

    if let (Some(center), Some(left), Some(right)) = (
        landmarks.get(MOUTH_CENTER),
        landmarks.get(MOUTH_LEFT),
        landmarks.get(MOUTH_RIGHT),
    ) {
        let (cx, cy) = to_grid(center.x, center.y);
        let half_width = (to_grid(right.x, right.y).0 - to_grid(left.x, left.y).0).div_euclid(2);
        if frame.is_smiling() && half_width > 0 {
            // corners rise quadratically from the centre
            let spread = half_width as f32 * 0.5;
            for i in -half_width..=half_width {
                let curve = ((i * i) as f32 / spread).floor() as i32;
                canvas.set(cx + i, cy - curve);
            }
        } else {
            canvas.line((cx - half_width, cy), (cx + half_width, cy));
        }
    }

    canvas.cells
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 28;

    /// A face spanning the unit square with the features the glyph reads.
    fn face(eye_gap: f32) -> Vec<Landmark> {
        let mut points = vec![Landmark::new(0.5, 0.5); 400];
        points[1] = Landmark::new(0.0, 0.0);
        points[2] = Landmark::new(1.0, 1.0);
        for (i, index) in LEFT_EYEBROW.iter().enumerate() {
            points[*index] = Landmark::new(0.625 + 0.0625 * i as f32, 0.25);
        }
        for (i, index) in RIGHT_EYEBROW.iter().enumerate() {
            points[*index] = Landmark::new(0.125 + 0.0625 * i as f32, 0.25);
        }
        points[LEFT_EYE.0] = Landmark::new(0.75, 0.375);
        points[LEFT_EYE.1] = Landmark::new(0.75, 0.375 + eye_gap);
        points[RIGHT_EYE.0] = Landmark::new(0.25, 0.375);
        points[RIGHT_EYE.1] = Landmark::new(0.25, 0.375 + eye_gap);
        points[MOUTH_CENTER] = Landmark::new(0.5, 0.75);
        points[MOUTH_LEFT] = Landmark::new(0.25, 0.75);
        points[MOUTH_RIGHT] = Landmark::new(0.75, 0.75);
        points
    }

    fn lit(cells: &[bool], x: usize, y: usize) -> bool {
        cells[y * SIZE + x]
    }

    #[test]
    fn eye_sizes_fall_in_three_tiers() {
        assert_eq!(eye_size(0.0), 0);
        assert_eq!(eye_size(0.0625), 1);
        assert_eq!(eye_size(0.2), 2);
    }

    #[test]
    fn no_face_is_blank() {
        let cells = face_glyph(&CameraFrame::default(), SIZE, SIZE);
        assert!(cells.iter().all(|cell| !cell));
    }

    #[test]
    fn draws_brows_eyes_and_a_flat_mouth() {
        let frame = CameraFrame {
            face_landmarks: vec![face(0.0625)],
            gestures: Vec::new(),
        };
        let cells = face_glyph(&frame, SIZE, SIZE);
        assert!((9..=19).all(|x| lit(&cells, x, 19)));
        // right eye: 3x3 block around (9, 12)
        assert!(lit(&cells, 8, 11) && lit(&cells, 10, 13));
        assert!(!lit(&cells, 7, 12));
        assert!((16..=21).all(|x| lit(&cells, x, 8)));
        assert!(lit(&cells, 6, 8));
    }

    #[test]
    fn open_palm_curves_the_mouth() {
        let frame: CameraFrame = serde_json::from_value(serde_json::json!({
            "faceLandmarks": [face(0.0625)],
            "gestures": [[{"categoryName": "Open_Palm", "score": 0.9}]]
        }))
        .unwrap();
        assert!(frame.is_smiling());
        let cells = face_glyph(&frame, SIZE, SIZE);
        assert!(lit(&cells, 14, 19));
        // the corners sit above the centre row
        assert!(!lit(&cells, 9, 19));
        assert!(lit(&cells, 9, 9) && lit(&cells, 19, 9));
    }

    #[test]
    fn weak_gestures_keep_the_mouth_flat() {
        let frame: CameraFrame = serde_json::from_value(serde_json::json!({
            "gestures": [{"categoryName": "Open_Palm", "score": 0.3}, "junk"]
        }))
        .unwrap();
        assert_eq!(frame.gestures.len(), 1);
        assert!(!frame.is_smiling());
    }
}
