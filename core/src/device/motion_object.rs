use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::gfx::Rect;

/// Upper bound on words per entry.
pub const MAX_ENTRY_WORDS: usize = 16;

/// SLIP tables select a list head per 8-scanline band of a 512-line playfield.
const SLIP_BAND_MASK: u16 = 0x1F8;
const SLIP_PLAYFIELD_MASK: u16 = 0x1FF;

/// Where the "next entry" index lives inside an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkField {
    /// Word holding the link; `None` links each entry to the next index.
    pub word: Option<u8>,
    pub shift: u8,
    pub mask: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOrder {
    #[default]
    Forward,
    Reverse,
}

/// Per-machine sprite RAM layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionObjectDescriptor {
    /// Number of entries in sprite RAM; also the per-walk step limit.
    pub max_count: u16,
    /// Bytes between consecutive entries.
    pub entry_stride: u32,
    /// Bytes between consecutive words of one entry.
    pub word_stride: u32,
    pub entry_words: u8,
    /// Entry is skipped when this word equals `ignore_value`.
    pub ignore_word: u8,
    pub ignore_value: u16,
    pub link: LinkField,
    pub order: TraversalOrder,
}

impl MotionObjectDescriptor {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_count == 0 {
            return Err(ConfigError::MotionObject("max_count must be non-zero"));
        }
        if self.entry_words == 0 || self.entry_words as usize > MAX_ENTRY_WORDS {
            return Err(ConfigError::MotionObject("entry_words must be 1-16"));
        }
        if self.ignore_word >= self.entry_words {
            return Err(ConfigError::MotionObject("ignore_word outside entry"));
        }
        if self.link.word.is_some_and(|w| w >= self.entry_words) {
            return Err(ConfigError::MotionObject("link word outside entry"));
        }
        if self.link.mask == 0 || self.link.shift > 15 {
            return Err(ConfigError::MotionObject("link mask/shift invalid"));
        }
        Ok(())
    }

    fn link_index(&self, raw: u16) -> u16 {
        (raw >> self.link.shift) & self.link.mask
    }
}

/// Read a big-endian word; anything past the end of RAM reads as open bus.
fn read_word(ram: &[u8], offset: usize) -> u16 {
    match ram.get(offset..offset + 2) {
        Some(bytes) => u16::from_be_bytes([bytes[0], bytes[1]]),
        None => 0xFFFF,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Band {
    scanline: u16,
    start: usize,
    len: usize,
}

/// Motion object (sprite) list processor.
///
/// Sprite RAM on these boards holds a fixed-size array of entries chained
/// by a "link" field; the list head for a band of scanlines is chosen by the
/// game (directly, or through a per-band SLIP table). The engine walks the
/// chain at each scanline tick, caches the entries it finds as a *band*, and
/// at render time replays the cached bands with a clip rectangle covering
/// the scanlines each band was active for.
///
/// The link data is plain RAM content and may be cyclic or garbage, so each
/// walk keeps a visited set and never takes more than `max_count` steps.
/// Entries are otherwise opaque: only the link word and the sentinel word
/// are interpreted here; everything else is up to the board's callback.
pub struct MotionObjectEngine {
    desc: MotionObjectDescriptor,
    capacity: usize,
    entries: Vec<[u16; MAX_ENTRY_WORDS]>,
    bands: Vec<Band>,
    visited: Vec<bool>,
    overflowed: bool,
}

impl MotionObjectEngine {
    /// `max_bands` bounds how many distinct scanline bands one frame may
    /// record (typically screen height / 8).
    pub fn new(desc: MotionObjectDescriptor, max_bands: usize) -> Result<Self, ConfigError> {
        desc.validate()?;
        if max_bands == 0 {
            return Err(ConfigError::MotionObject("max_bands must be non-zero"));
        }
        let capacity = desc.max_count as usize * max_bands;
        Ok(Self {
            visited: vec![false; desc.max_count as usize],
            entries: Vec::with_capacity(capacity.min(4096)),
            bands: Vec::with_capacity(max_bands),
            desc,
            capacity,
            overflowed: false,
        })
    }

    pub fn descriptor(&self) -> &MotionObjectDescriptor {
        &self.desc
    }

    /// Forget this frame's bands.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.bands.clear();
        self.overflowed = false;
    }

    /// Number of bands recorded this frame.
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Total cached entries this frame.
    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    /// Walk the list starting at `head` in `ram` and make it the active
    /// list from `scanline` onward.
    pub fn update(&mut self, ram: &[u8], head: u16, scanline: u16) {
        // A second update on the same scanline replaces the first.
        if let Some(last) = self.bands.last().copied()
            && last.scanline == scanline
        {
            self.bands.pop();
            self.entries.truncate(last.start);
        }

        let start = self.entries.len();
        let walked = self.walk(ram, head);
        let len = self.entries.len() - start;

        // Identical to the band already active: extend it instead.
        if let Some(prev) = self.bands.last()
            && prev.len == len
            && self.entries[prev.start..prev.start + prev.len] == self.entries[start..]
        {
            self.entries.truncate(start);
            return;
        }

        log::trace!("mo band @{scanline}: head {head}, {walked} visited, {len} live");
        self.bands.push(Band {
            scanline,
            start,
            len,
        });
    }

    /// Resolve the list head through a SLIP table and update. Handles the
    /// partial band at the top of the screen when the playfield is scrolled
    /// by a non-multiple of 8.
    pub fn update_slip(
        &mut self,
        ram: &[u8],
        slips: &[u8],
        scroll: u16,
        scanline: u16,
        screen_height: u16,
    ) {
        if scanline == 0 && scroll & 7 != 0 {
            let pf_line = scroll & SLIP_BAND_MASK;
            let head = self.slip_head(slips, pf_line);
            self.update(ram, head, 0);
        }

        if scanline < screen_height {
            let pf_line = (scanline.wrapping_add(scroll).wrapping_add(7)) & SLIP_BAND_MASK;
            let head = self.slip_head(slips, pf_line);
            let band_line = pf_line.wrapping_sub(scroll) & SLIP_PLAYFIELD_MASK;
            self.update(ram, head, band_line);
        }
    }

    fn slip_head(&self, slips: &[u8], pf_line: u16) -> u16 {
        let raw = read_word(slips, 2 * (pf_line / 8) as usize);
        self.desc.link_index(raw)
    }

    /// Copy live entries reachable from `head` into the cache; returns the
    /// number of indices visited.
    fn walk(&mut self, ram: &[u8], head: u16) -> usize {
        let desc = &self.desc;
        let words = desc.entry_words as usize;
        self.visited.fill(false);

        let mut link = head;
        let mut steps = 0;
        while steps < desc.max_count as usize {
            let index = link as usize;
            if index >= self.visited.len() || self.visited[index] {
                break;
            }
            if self.entries.len() >= self.capacity {
                if !self.overflowed {
                    log::warn!("motion object cache full ({} entries)", self.capacity);
                    self.overflowed = true;
                }
                break;
            }
            self.visited[index] = true;
            steps += 1;

            let base = index * desc.entry_stride as usize;
            let mut entry = [0u16; MAX_ENTRY_WORDS];
            for (i, word) in entry.iter_mut().take(words).enumerate() {
                *word = read_word(ram, base + i * desc.word_stride as usize);
            }

            if entry[desc.ignore_word as usize] != desc.ignore_value {
                self.entries.push(entry);
            }

            link = match desc.link.word {
                Some(w) => desc.link_index(entry[w as usize]),
                None => (link.wrapping_add(1)) & desc.link.mask,
            };
        }
        steps
    }

    /// Replay the cached bands. `callback(entry, clip)` is invoked once per
    /// cached entry; `clip` covers the band's scanlines within `screen`.
    pub fn process<F>(&self, screen: &Rect, mut callback: F)
    where
        F: FnMut(&[u16], &Rect),
    {
        let words = self.desc.entry_words as usize;
        for (i, band) in self.bands.iter().enumerate() {
            let max_y = self
                .bands
                .get(i + 1)
                .map_or(screen.max_y, |next| next.scanline as i32 - 1);
            let band_rect = Rect::new(screen.min_x, screen.max_x, band.scanline as i32, max_y);
            let Some(clip) = band_rect.intersect(screen) else {
                continue;
            };

            let entries = &self.entries[band.start..band.start + band.len];
            match self.desc.order {
                TraversalOrder::Forward => {
                    for entry in entries {
                        callback(&entry[..words], &clip);
                    }
                }
                TraversalOrder::Reverse => {
                    for entry in entries.iter().rev() {
                        callback(&entry[..words], &clip);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 4 words per entry, 8 bytes per entry; word 3 holds the link.
    fn desc(max_count: u16) -> MotionObjectDescriptor {
        MotionObjectDescriptor {
            max_count,
            entry_stride: 8,
            word_stride: 2,
            entry_words: 4,
            ignore_word: 0,
            ignore_value: 0xFFFF,
            link: LinkField {
                word: Some(3),
                shift: 0,
                mask: 0x3F,
            },
            order: TraversalOrder::Forward,
        }
    }

    fn put(ram: &mut [u8], index: usize, words: [u16; 4]) {
        for (i, w) in words.iter().enumerate() {
            let at = index * 8 + i * 2;
            ram[at..at + 2].copy_from_slice(&w.to_be_bytes());
        }
    }

    #[test]
    fn read_word_past_end_is_open_bus() {
        assert_eq!(read_word(&[0x12, 0x34], 0), 0x1234);
        assert_eq!(read_word(&[0x12, 0x34], 1), 0xFFFF);
    }

    #[test]
    fn invalid_descriptors_rejected() {
        let mut d = desc(8);
        d.max_count = 0;
        assert!(MotionObjectEngine::new(d, 1).is_err());

        let mut d = desc(8);
        d.entry_words = 17;
        assert!(MotionObjectEngine::new(d, 1).is_err());

        let mut d = desc(8);
        d.link.word = Some(4);
        assert!(MotionObjectEngine::new(d, 1).is_err());

        assert!(MotionObjectEngine::new(desc(8), 0).is_err());
    }

    #[test]
    fn same_scanline_update_replaces_band() {
        let mut ram = vec![0u8; 8 * 8];
        put(&mut ram, 0, [1, 0, 0, 0]); // self-loop
        put(&mut ram, 1, [2, 0, 0, 2]);
        put(&mut ram, 2, [3, 0, 0, 1]);
        let mut mo = MotionObjectEngine::new(desc(8), 4).unwrap();
        mo.update(&ram, 0, 0);
        mo.update(&ram, 1, 0);
        assert_eq!(mo.band_count(), 1);
        assert_eq!(mo.cached_entries(), 2);
    }
}
