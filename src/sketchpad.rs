use crate::api::DrawingImage;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use image::{
    ImageFormat,
    Rgb,
    RgbImage,
};
use std::io::Cursor;

pub const GRID_SIZE: usize = 30;
pub const CELL_PX: u32 = 10;
pub const IMAGE_PX: u32 = GRID_SIZE as u32 * CELL_PX;

const BACKGROUND: Rgb<u8> = Rgb([0x1a, 0x1a, 0x1a]);
const STROKE: Rgb<u8> = Rgb([0xff, 0xd7, 0x00]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Cell canvas driven from the keyboard. The pen paints every cell the cursor
/// passes over while it is down.
#[derive(Clone, Debug)]
pub struct Sketchpad {
    cells: Vec<bool>,
    cursor: (usize, usize),
    pen_down: bool,
}

impl Default for Sketchpad {
    fn default() -> Self {
        Self {
            cells: vec![false; GRID_SIZE * GRID_SIZE],
            cursor: (GRID_SIZE / 2, GRID_SIZE / 2),
            pen_down: false,
        }
    }
}

impl Sketchpad {
    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    pub fn pen_down(&self) -> bool {
        self.pen_down
    }

    pub fn is_set(&self, x: usize, y: usize) -> bool {
        x < GRID_SIZE && y < GRID_SIZE && self.cells[y * GRID_SIZE + x]
    }

    pub fn is_blank(&self) -> bool {
        !self.cells.iter().any(|c| *c)
    }

    pub fn move_cursor(&mut self, direction: Direction) {
        let (x, y) = self.cursor;
        self.cursor = match direction {
            Direction::Up => (x, y.saturating_sub(1)),
            Direction::Down => (x, (y + 1).min(GRID_SIZE - 1)),
            Direction::Left => (x.saturating_sub(1), y),
            Direction::Right => ((x + 1).min(GRID_SIZE - 1), y),
        };
        if self.pen_down {
            self.paint();
        }
    }

    /// Lowers or lifts the pen. Lifting it ends the stroke and returns the
    /// drawing as it now stands.
    pub fn toggle_pen(&mut self) -> Result<Option<DrawingImage>> {
        if self.pen_down {
            self.pen_down = false;
            return self.finish_stroke();
        }
        self.pen_down = true;
        self.paint();
        Ok(None)
    }

    /// `None` while nothing has been drawn.
    pub fn finish_stroke(&self) -> Result<Option<DrawingImage>> {
        if self.is_blank() {
            return Ok(None);
        }
        let png = self.encode_png()?;
        Ok(Some(DrawingImage::from_png(png)))
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|c| *c = false);
        self.pen_down = false;
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = RgbImage::from_fn(IMAGE_PX, IMAGE_PX, |px, py| {
            let x = (px / CELL_PX) as usize;
            let y = (py / CELL_PX) as usize;
            if self.is_set(x, y) { STROKE } else { BACKGROUND }
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .wrap_err("Failed to encode drawing as PNG")?;
        Ok(buf)
    }

    fn paint(&mut self) {
        let (x, y) = self.cursor;
        self.cells[y * GRID_SIZE + x] = true;
    }
}
