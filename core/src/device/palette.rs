use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

pub const PENS_PER_ROW: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Decode a 6-6-6 palette word: 5 bits per gun in bits 14..10, 9..5, 4..0
/// plus a shared intensity LSB in bit 15.
pub fn rgb_from_666(word: u16) -> Rgb {
    let i = (word >> 15) & 1;
    let r = ((word >> 9) & 0x3E) | i;
    let g = ((word >> 4) & 0x3E) | i;
    let b = ((word << 1) & 0x3E) | i;
    let expand = |c: u16| ((c << 2) | (c >> 4)) as u8;
    Rgb {
        r: expand(r),
        g: expand(g),
        b: expand(b),
    }
}

/// Boards with 32-bit palette entries keep the 6-6-6 word split across the
/// high bytes of two consecutive words.
pub fn word_from_expanded(first: u16, second: u16) -> u16 {
    (first & 0xFF00) | (second >> 8)
}

/// Palette-usage reducer.
///
/// Palette RAM holds more colors than the host palette can show at once.
/// Each frame the board marks which (row, pen) pairs the visible tiles and
/// sprites actually use; `recalc()` then hands out output slots to the used
/// pairs only. A change in that mapping means every cached tile was drawn
/// with stale pens, so the caller invalidates its dirty caches.
pub struct PaletteReducer {
    capacity: usize,
    colors: Vec<Rgb>,
    usage: Vec<u16>,
    mapping: Vec<Option<u16>>,
    referenced: usize,
}

impl PaletteReducer {
    /// `rows` palette rows of 16 pens; `capacity` output slots.
    pub fn new(rows: usize, capacity: usize) -> Result<Self, ConfigError> {
        if rows == 0 {
            return Err(ConfigError::Palette("palette must have at least one row"));
        }
        if capacity == 0 {
            return Err(ConfigError::Palette("output capacity must be non-zero"));
        }
        let pens = rows * PENS_PER_ROW;
        Ok(Self {
            capacity,
            colors: vec![Rgb::default(); pens],
            usage: vec![0; rows],
            mapping: vec![None; pens],
            referenced: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.usage.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start a new frame's usage scan.
    pub fn reset_usage(&mut self) {
        self.usage.fill(0);
    }

    /// Mark pens `mask` (bit n = pen n) of `row` as used this frame.
    pub fn mark(&mut self, row: usize, mask: u16) {
        match self.usage.get_mut(row) {
            Some(used) => *used |= mask,
            None => log::trace!("palette row {row} out of range"),
        }
    }

    /// Pens of `row` marked since the last `reset_usage`.
    pub fn usage(&self, row: usize) -> u16 {
        self.usage.get(row).copied().unwrap_or(0)
    }

    /// Rebuild the slot mapping from this frame's usage. Returns true when
    /// it differs from the previous frame's.
    pub fn recalc(&mut self) -> bool {
        let mut next = 0usize;
        let mut changed = false;
        for (row, &used) in self.usage.iter().enumerate() {
            for pen in 0..PENS_PER_ROW {
                let slot = if used & (1 << pen) != 0 {
                    let slot = next.min(self.capacity - 1) as u16;
                    next += 1;
                    Some(slot)
                } else {
                    None
                };
                let entry = &mut self.mapping[row * PENS_PER_ROW + pen];
                if *entry != slot {
                    *entry = slot;
                    changed = true;
                }
            }
        }
        if next > self.capacity {
            log::warn!(
                "palette overflow: {} colors referenced, {} slots; extra colors clamped",
                next,
                self.capacity
            );
        }
        self.referenced = next;
        changed
    }

    /// Number of (row, pen) pairs referenced at the last `recalc`.
    pub fn referenced(&self) -> usize {
        self.referenced
    }

    /// Output slot for `(row, pen)`, if it was referenced.
    pub fn lookup(&self, row: usize, pen: usize) -> Option<u16> {
        if pen >= PENS_PER_ROW {
            return None;
        }
        self.mapping.get(row * PENS_PER_ROW + pen).copied().flatten()
    }

    /// Slot of every pen of `row`, for tagging a blit. Pens that were not
    /// referenced map to slot 0.
    pub fn row_slots(&self, row: usize) -> [u16; PENS_PER_ROW] {
        let mut slots = [0; PENS_PER_ROW];
        for (pen, slot) in slots.iter_mut().enumerate() {
            *slot = self.lookup(row, pen).unwrap_or(0);
        }
        slots
    }

    /// Set palette RAM color `index` (row * 16 + pen).
    pub fn set_color(&mut self, index: usize, rgb: Rgb) {
        if let Some(color) = self.colors.get_mut(index) {
            *color = rgb;
        }
    }

    pub fn color(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// 16-bit palette RAM write in 6-6-6 format.
    pub fn write_666(&mut self, index: usize, word: u16) {
        self.set_color(index, rgb_from_666(word));
    }

    /// Expanded palette RAM: entry `index` is built from two words.
    pub fn write_expanded_666(&mut self, index: usize, first: u16, second: u16) {
        self.set_color(index & 0x1FF, rgb_from_666(word_from_expanded(first, second)));
    }

    /// Host palette for the current mapping, `min(referenced, capacity)`
    /// entries long.
    pub fn output(&self) -> Vec<Rgb> {
        let mut out = vec![Rgb::default(); self.referenced.min(self.capacity)];
        // Reverse order so the first pen clamped onto the last slot wins.
        for (index, slot) in self.mapping.iter().enumerate().rev() {
            if let Some(slot) = slot {
                out[*slot as usize] = self.colors[index];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_usage_references_nothing() {
        let mut pal = PaletteReducer::new(4, 64).unwrap();
        pal.recalc();
        assert_eq!(pal.referenced(), 0);
        assert!(pal.output().is_empty());
        assert_eq!(pal.lookup(0, 0), None);
    }

    #[test]
    fn full_usage_is_identity() {
        let mut pal = PaletteReducer::new(4, 64).unwrap();
        for row in 0..4 {
            pal.mark(row, 0xFFFF);
        }
        assert!(pal.recalc());
        for row in 0..4 {
            for pen in 0..PENS_PER_ROW {
                assert_eq!(pal.lookup(row, pen), Some((row * 16 + pen) as u16));
            }
        }
    }

    #[test]
    fn usage_is_frame_local() {
        let mut pal = PaletteReducer::new(2, 32).unwrap();
        pal.mark(1, 0x0003);
        pal.recalc();
        assert_eq!(pal.referenced(), 2);
        pal.reset_usage();
        assert!(pal.recalc());
        assert_eq!(pal.referenced(), 0);
    }

    #[test]
    fn unchanged_usage_reports_no_change() {
        let mut pal = PaletteReducer::new(2, 32).unwrap();
        pal.mark(0, 0x00F0);
        assert!(pal.recalc());
        pal.reset_usage();
        pal.mark(0, 0x00F0);
        assert!(!pal.recalc());
    }

    #[test]
    fn overflow_clamps_to_last_slot() {
        let mut pal = PaletteReducer::new(2, 4).unwrap();
        pal.mark(0, 0x003F);
        pal.recalc();
        assert_eq!(pal.lookup(0, 3), Some(3));
        assert_eq!(pal.lookup(0, 4), Some(3));
        assert_eq!(pal.lookup(0, 5), Some(3));
        assert_eq!(pal.output().len(), 4);
    }

    #[test]
    fn row_slots_follow_reduction() {
        let mut pal = PaletteReducer::new(4, 64).unwrap();
        pal.mark(1, 0x0001);
        pal.mark(3, 0x0006);
        pal.recalc();
        let slots = pal.row_slots(3);
        assert_eq!((slots[1], slots[2]), (1, 2));
        assert_eq!(slots[0], 0);
        assert_eq!(pal.row_slots(9), [0; PENS_PER_ROW]);
    }

    #[test]
    fn decode_666() {
        assert_eq!(rgb_from_666(0x0000), Rgb::default());
        assert_eq!(
            rgb_from_666(0xFFFF),
            Rgb {
                r: 0xFF,
                g: 0xFF,
                b: 0xFF
            }
        );
        // Red gun only, intensity bit clear.
        assert_eq!(rgb_from_666(0x7C00), Rgb { r: 0xFB, g: 0, b: 0 });
        assert_eq!(word_from_expanded(0x7CAA, 0x1F55), 0x7C1F);
    }
}
