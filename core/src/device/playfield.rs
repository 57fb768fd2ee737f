use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::gfx::{GfxBackend, Rect, Surface, Transparency};

/// Cache key meaning "never drawn"; never a valid context.
pub const NEVER_DRAWN: u8 = 0xFF;

/// Pen the overrender surface is cleared to and that is skipped when it is
/// copied back.
pub const OVERRENDER_CLEAR_PEN: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayfieldDescriptor {
    pub tile_width: u16,
    pub tile_height: u16,
    pub columns: u16,
    pub rows: u16,
    pub scrolling: bool,
}

impl PlayfieldDescriptor {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.tile_width.is_power_of_two() || !self.tile_height.is_power_of_two() {
            return Err(ConfigError::Playfield("tile size must be a power of two"));
        }
        if self.columns == 0 || self.rows == 0 {
            return Err(ConfigError::Playfield("grid must be non-empty"));
        }
        Ok(())
    }

    pub fn tile_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn width_pixels(&self) -> u32 {
        self.columns as u32 * self.tile_width as u32
    }

    pub fn height_pixels(&self) -> u32 {
        self.rows as u32 * self.tile_height as u32
    }
}

/// Parameters in effect from a breakpoint onward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayfieldState {
    pub hscroll: u32,
    pub vscroll: u32,
    /// Board-defined extra parameters (tile bank, color bank, ...).
    pub param: [u32; 2],
}

/// Tiles visible in a span: `width` columns starting at `col` and `height`
/// rows starting at `row`, both wrapping around the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub col: u16,
    pub row: u16,
    pub width: u16,
    pub height: u16,
    grid_cols: u16,
    grid_rows: u16,
}

impl TileRect {
    /// Row-major `(col, row)` pairs, wrapped onto the grid.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        (0..self.height).flat_map(move |dy| {
            let row = (self.row + dy) % self.grid_rows;
            (0..self.width).map(move |dx| ((self.col + dx) % self.grid_cols, row))
        })
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One horizontal slice of the frame drawn with a single state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayfieldSpan {
    pub clip: Rect,
    pub tiles: TileRect,
    pub state: PlayfieldState,
}

#[derive(Clone, Debug)]
pub struct DirtyCache {
    columns: u16,
    keys: Vec<u8>,
}

impl DirtyCache {
    /// Cache for a `columns` x `rows` grid with every tile stale.
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            keys: vec![NEVER_DRAWN; columns as usize * rows as usize],
        }
    }

    /// Row-major index of the tile at `(col, row)`.
    pub fn tile_index(&self, col: u16, row: u16) -> usize {
        row as usize * self.columns as usize + col as usize
    }

    /// True when `tile` was last drawn with a context other than `ctx`.
    pub fn is_stale(&self, tile: usize, ctx: u8) -> bool {
        self.keys.get(tile).is_some_and(|&key| key != ctx)
    }

    /// Record that `tile` now holds pixels drawn under `ctx`.
    pub fn mark_drawn(&mut self, tile: usize, ctx: u8) {
        debug_assert_ne!(ctx, NEVER_DRAWN);
        if let Some(key) = self.keys.get_mut(tile) {
            *key = ctx;
        }
    }

    /// Video RAM write hook.
    pub fn invalidate(&mut self, tile: usize) {
        if let Some(key) = self.keys.get_mut(tile) {
            *key = NEVER_DRAWN;
        }
    }

    /// Force every tile to redraw.
    pub fn invalidate_all(&mut self) {
        self.keys.fill(NEVER_DRAWN);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Tile playfield engine with a per-tile dirty cache.
///
/// The game may change scroll registers (or bank/color parameters) mid-frame.
/// Each change is recorded as a breakpoint; at render time the frame is cut
/// into horizontal spans, one per breakpoint, and each span reports which
/// tiles of the grid it shows. The host redraws only tiles whose cache key
/// differs from the context it needs, then composites the playfield bitmap
/// onto the screen span by span.
pub struct PlayfieldEngine {
    desc: PlayfieldDescriptor,
    surface: Surface,
    tile_shift_x: u32,
    tile_shift_y: u32,
    max_breakpoints: usize,
    breakpoints: Vec<(u16, PlayfieldState)>,
    last_state: PlayfieldState,
    dirty: DirtyCache,
}

impl PlayfieldEngine {
    /// `layer` picks the backend surface (`Surface::Playfield(layer)`) this
    /// playfield is rendered into; `screen` bounds the breakpoint count.
    pub fn new(desc: PlayfieldDescriptor, layer: u8, screen: &Rect) -> Result<Self, ConfigError> {
        desc.validate()?;
        if screen.is_empty() {
            return Err(ConfigError::Playfield("screen rectangle is empty"));
        }
        let max_breakpoints = screen.height() as usize + 1;
        let mut pf = Self {
            desc,
            surface: Surface::Playfield(layer),
            tile_shift_x: desc.tile_width.trailing_zeros(),
            tile_shift_y: desc.tile_height.trailing_zeros(),
            max_breakpoints,
            breakpoints: Vec::with_capacity(max_breakpoints),
            last_state: PlayfieldState::default(),
            dirty: DirtyCache::new(desc.columns, desc.rows),
        };
        pf.reset();
        Ok(pf)
    }

    pub fn descriptor(&self) -> &PlayfieldDescriptor {
        &self.desc
    }

    /// Backend bitmap this playfield draws into.
    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn dirty(&self) -> &DirtyCache {
        &self.dirty
    }

    pub fn dirty_mut(&mut self) -> &mut DirtyCache {
        &mut self.dirty
    }

    /// State most recently recorded (survives `reset`).
    pub fn last_state(&self) -> PlayfieldState {
        self.last_state
    }

    /// Breakpoints recorded so far this frame.
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// Start a new frame: the state in effect at the end of the previous
    /// frame carries over as scanline 0's.
    pub fn reset(&mut self) {
        self.breakpoints.clear();
        let carried = self.last_state;
        self.update(&carried, 0);
    }

    /// Record `state` as effective from `scanline` until the next recorded
    /// breakpoint. Breakpoints stay sorted by scanline; a second update on
    /// the same line replaces the first, and one that matches the state
    /// already in effect is dropped.
    pub fn update(&mut self, state: &PlayfieldState, scanline: u16) {
        let pos = self.breakpoints.partition_point(|&(line, _)| line < scanline);
        if self.breakpoints.get(pos).is_some_and(|&(line, _)| line == scanline) {
            self.breakpoints.remove(pos);
        }
        let in_effect = pos.checked_sub(1).map(|i| self.breakpoints[i].1);
        if in_effect != Some(*state) {
            if self.breakpoints.len() >= self.max_breakpoints {
                log::warn!("playfield breakpoint at line {scanline} dropped: table full");
            } else {
                self.breakpoints.insert(pos, (scanline, *state));
            }
        }
        // A breakpoint that repeats its predecessor's state is redundant.
        self.breakpoints.dedup_by(|next, prev| next.1 == prev.1);
        if let Some(&(_, last)) = self.breakpoints.last() {
            self.last_state = last;
        }
    }

    fn span(&self, index: usize, clip: &Rect) -> Option<PlayfieldSpan> {
        let (line, state) = self.breakpoints[index];
        let max_y = self
            .breakpoints
            .get(index + 1)
            .map_or(clip.max_y, |&(next, _)| next as i32 - 1);
        let band = Rect::new(clip.min_x, clip.max_x, line as i32, max_y).intersect(clip)?;

        let (hscroll, vscroll) = if self.desc.scrolling {
            (state.hscroll, state.vscroll)
        } else {
            (0, 0)
        };
        let (col, width) = tile_range(
            hscroll,
            band.min_x,
            band.max_x,
            self.tile_shift_x,
            self.desc.columns,
        );
        let (row, height) = tile_range(
            vscroll,
            band.min_y,
            band.max_y,
            self.tile_shift_y,
            self.desc.rows,
        );

        Some(PlayfieldSpan {
            clip: band,
            tiles: TileRect {
                col,
                row,
                width,
                height,
                grid_cols: self.desc.columns,
                grid_rows: self.desc.rows,
            },
            state,
        })
    }

    /// Spans for `clip`, top to bottom.
    pub fn spans(&self, clip: &Rect) -> Vec<PlayfieldSpan> {
        (0..self.breakpoints.len())
            .filter_map(|i| self.span(i, clip))
            .collect()
    }

    /// Invoke `callback(span, dirty)` once per span intersecting `clip`.
    pub fn process<F>(&mut self, clip: &Rect, mut callback: F)
    where
        F: FnMut(&PlayfieldSpan, &mut DirtyCache),
    {
        for i in 0..self.breakpoints.len() {
            if let Some(span) = self.span(i, clip) {
                callback(&span, &mut self.dirty);
            }
        }
    }

    /// Same iteration as [`process`](Self::process), for drawing onto the
    /// overrender surface. Overrender draws bypass the dirty cache.
    pub fn process_overrender<F>(&self, clip: &Rect, mut callback: F)
    where
        F: FnMut(&PlayfieldSpan, Surface),
    {
        for i in 0..self.breakpoints.len() {
            if let Some(span) = self.span(i, clip) {
                callback(&span, Surface::Overrender);
            }
        }
    }

    /// Redraw high-priority playfield tiles over a sprite: clear the
    /// overrender surface under `sprite_rect`, let `callback` draw the tiles
    /// that should appear in front, then copy the result onto the screen.
    pub fn overrender<B, F>(&self, backend: &mut B, sprite_rect: &Rect, mut callback: F)
    where
        B: GfxBackend + ?Sized,
        F: FnMut(&mut B, &PlayfieldSpan),
    {
        if sprite_rect.is_empty() {
            return;
        }
        backend.fill(Surface::Overrender, sprite_rect, OVERRENDER_CLEAR_PEN as u16);
        self.process_overrender(sprite_rect, |span, _| callback(backend, span));
        backend.copy_scroll(
            Surface::Overrender,
            Surface::Screen,
            0,
            0,
            sprite_rect,
            Transparency::Pen(OVERRENDER_CLEAR_PEN),
        );
    }

    /// Copy the playfield bitmap onto the screen, one span at a time.
    pub fn composite<B: GfxBackend + ?Sized>(&self, backend: &mut B, clip: &Rect) {
        for i in 0..self.breakpoints.len() {
            let Some(span) = self.span(i, clip) else {
                continue;
            };
            let (sx, sy) = if self.desc.scrolling {
                (span.state.hscroll as i32, span.state.vscroll as i32)
            } else {
                (0, 0)
            };
            backend.copy_scroll(
                self.surface,
                Surface::Screen,
                sx,
                sy,
                &span.clip,
                Transparency::Opaque,
            );
        }
    }
}

/// First tile and tile count covering pixels `min..=max` after scrolling by
/// `scroll`, on a grid of `tiles` tiles of `1 << shift` pixels.
fn tile_range(scroll: u32, min: i32, max: i32, shift: u32, tiles: u16) -> (u16, u16) {
    let extent = (tiles as i64) << shift;
    let start = (scroll as i64 + min as i64).rem_euclid(extent);
    let end = start + (max - min) as i64;
    let first = start >> shift;
    let count = ((end >> shift) - first + 1).min(tiles as i64);
    (first as u16, count as u16)
}
