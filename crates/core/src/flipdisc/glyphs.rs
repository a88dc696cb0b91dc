//! 5x7 bitmap digits for the clock pattern.

pub const GLYPH_WIDTH: usize = 5;
pub const GLYPH_HEIGHT: usize = 7;

/// One row per entry, most significant of the five low bits is the left
/// column.
const DIGITS: [[u8; GLYPH_HEIGHT]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
    [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
];

pub fn glyph_pixel(digit: u32, x: usize, y: usize) -> bool {
    let Some(rows) = DIGITS.get(digit as usize) else {
        return false;
    };
    if x >= GLYPH_WIDTH || y >= GLYPH_HEIGHT {
        return false;
    }
    rows[y] & (1 << (GLYPH_WIDTH - 1 - x)) != 0
}

/// Draws `digit` resampled into a `width` x `height` box whose top-left
/// corner is (`left`, `top`). Pixels outside the grid are dropped.
#[allow(clippy::too_many_arguments)]
pub fn draw_digit(
    pattern: &mut [bool],
    cols: usize,
    rows: usize,
    digit: u32,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
) {
    for y in 0..height {
        for x in 0..width {
            if !glyph_pixel(digit, x * GLYPH_WIDTH / width, y * GLYPH_HEIGHT / height) {
                continue;
            }
            let (col, row) = (left + x, top + y);
            if col < cols && row < rows {
                pattern[row * cols + col] = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_is_a_vertical_stroke() {
        let mut pattern = vec![false; 5 * 7];
        draw_digit(&mut pattern, 5, 7, 1, 0, 0, 5, 7);
        assert!((0..7).all(|row| pattern[row * 5 + 2]));

        assert!(glyph_pixel(1, 2, 0));
        assert!((0..GLYPH_HEIGHT).all(|y| glyph_pixel(1, 2, y)));
        assert!(!glyph_pixel(1, 0, 3));
        assert!(!glyph_pixel(10, 2, 0));
    }

    #[test]
    fn scaled_digits_clip_at_the_edge() {
        let mut pattern = vec![false; 8 * 8];
        draw_digit(&mut pattern, 8, 8, 8, 4, 0, 10, 14);
        let lit = pattern.iter().filter(|cell| **cell).count();
        assert!(lit > 0);
        // only columns 4..8 can be lit
        assert!((0..8).all(|row| (0..4).all(|col| !pattern[row * 8 + col])));
    }
}
