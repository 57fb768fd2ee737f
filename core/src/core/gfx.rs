//! Graphics backend boundary.
//!
//! The engines decide *what* to draw and *where*; the pixel work (tile
//! decoding, blits, scrolling copies) belongs to the host's backend, which
//! implements [`GfxBackend`].

use serde::{Deserialize, Serialize};

use crate::device::palette::PENS_PER_ROW;

/// Inclusive pixel rectangle, matching the hardware's scanline numbering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Rect {
    pub const fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Full-screen rectangle for a `width` x `height` display.
    pub const fn screen(width: u32, height: u32) -> Self {
        Self::new(0, width as i32 - 1, 0, height as i32 - 1)
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.min_x.max(other.min_x),
            self.max_x.min(other.max_x),
            self.min_y.max(other.min_y),
            self.max_y.min(other.max_y),
        );
        (!r.is_empty()).then_some(r)
    }
}

/// Bitmaps the backend maintains on behalf of the engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Surface {
    Screen,
    Playfield(u8),
    Overrender,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    /// Pixels of this pen are not written.
    Pen(u8),
    /// Pixels whose remapped color equals this value are not written.
    Color(u16),
}

/// One tile or sprite-cell blit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileBlit {
    pub gfx: u8,
    pub code: u32,
    /// Palette RAM row.
    pub color: u16,
    /// Reduced output slot for each raw pen of `color`; this is the value
    /// written to the surface. Transparency still tests the raw pen.
    pub pens: [u16; PENS_PER_ROW],
    pub flip_x: bool,
    pub flip_y: bool,
    pub x: i32,
    pub y: i32,
    pub transparency: Transparency,
}

pub trait GfxBackend {
    fn draw_tile(&mut self, surface: Surface, blit: &TileBlit, clip: &Rect);

    /// Pens (bit n = pen n) that tile `code` of graphics set `gfx` uses.
    /// Backends that do not decode graphics report every pen.
    fn pen_usage(&self, _gfx: u8, _code: u32) -> u16 {
        u16::MAX
    }

    /// Copy `src` onto `dst` displaced by (-scroll_x, -scroll_y), wrapping
    /// around the source bitmap, restricted to `clip`.
    fn copy_scroll(
        &mut self,
        src: Surface,
        dst: Surface,
        scroll_x: i32,
        scroll_y: i32,
        clip: &Rect,
        transparency: Transparency,
    );

    fn fill(&mut self, surface: Surface, rect: &Rect, pen: u16);
}
