use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigError, StorageError};
use crate::core::storage::NvramStorage;

/// Value of erased cells.
pub const ERASED: u8 = 0xFF;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteGate {
    Level,
    #[default]
    OneShot,
}

/// How each run of the default table is expanded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RleLayout {
    /// One byte per count.
    Byte,
    /// One 16-bit cell per count, the value in both bytes.
    Word,
}

/// Run-length-encoded factory image: `(count, value)` runs written over an
/// erased buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RleDefault {
    pub layout: RleLayout,
    pub runs: Vec<(u8, u8)>,
}

impl RleDefault {
    /// Parse the packed form: a layout word (0 = byte, else word) followed
    /// by `count << 8 | value` entries up to a zero terminator.
    pub fn from_packed(packed: &[u16]) -> Self {
        let (layout, entries) = match packed.split_first() {
            Some((&0, rest)) => (RleLayout::Byte, rest),
            Some((_, rest)) => (RleLayout::Word, rest),
            None => (RleLayout::Byte, packed),
        };
        let runs = entries
            .iter()
            .take_while(|&&entry| entry != 0)
            .map(|&entry| ((entry >> 8) as u8, entry as u8))
            .collect();
        Self { layout, runs }
    }

    pub fn to_packed(&self) -> Vec<u16> {
        let mut packed = Vec::with_capacity(self.runs.len() + 2);
        packed.push(match self.layout {
            RleLayout::Byte => 0,
            RleLayout::Word => 1,
        });
        packed.extend(
            self.runs
                .iter()
                .filter(|&&(count, _)| count != 0)
                .map(|&(count, value)| (count as u16) << 8 | value as u16),
        );
        packed.push(0);
        packed
    }

    /// Expand into an erased `size`-byte image. Runs past the end are cut.
    pub fn decode(&self, size: usize) -> Vec<u8> {
        let mut image = vec![ERASED; size];
        let cell = self.cell_bytes();
        let mut at = 0;
        for &(count, value) in &self.runs {
            for _ in 0..count {
                let Some(dest) = image.get_mut(at..at + cell) else {
                    return image;
                };
                dest.fill(value);
                at += cell;
            }
        }
        image
    }

    /// Canonical encoding of `image`: maximal runs of at most 255 cells,
    /// trailing erased cells omitted. For the word layout only the low byte
    /// of each big-endian cell is kept.
    pub fn encode(layout: RleLayout, image: &[u8]) -> Self {
        let cells: Vec<u8> = match layout {
            RleLayout::Byte => image.to_vec(),
            RleLayout::Word => image.chunks_exact(2).map(|cell| cell[1]).collect(),
        };
        let live = cells
            .iter()
            .rposition(|&b| b != ERASED)
            .map_or(0, |last| last + 1);

        let mut runs: Vec<(u8, u8)> = Vec::new();
        for &value in &cells[..live] {
            match runs.last_mut() {
                Some((count, last)) if *last == value && *count < u8::MAX => *count += 1,
                _ => runs.push((1, value)),
            }
        }
        Self { layout, runs }
    }

    fn cell_bytes(&self) -> usize {
        match self.layout {
            RleLayout::Byte => 1,
            RleLayout::Word => 2,
        }
    }
}

/// EEPROM / battery-backed NVRAM with a write gate and a compressed
/// factory-default image.
///
/// Reads always pass through. Writes only land while the gate is open: a
/// `Level` gate stays open until disabled, a `OneShot` gate closes again
/// after one accepted write (the usual "write the unlock register, then
/// write one byte" EEPROM protocol).
pub struct NvramStore {
    data: Vec<u8>,
    default: Option<RleDefault>,
    gate: WriteGate,
    unlocked: bool,
}

impl NvramStore {
    /// Erased store of `size` bytes. Fails when the default image does not fit.
    pub fn new(size: usize, default: Option<RleDefault>, gate: WriteGate) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::Nvram("size must be non-zero".into()));
        }
        if let Some(rle) = &default {
            let cells: usize = rle.runs.iter().map(|&(count, _)| count as usize).sum();
            if cells * rle.cell_bytes() > size {
                return Err(ConfigError::Nvram(format!(
                    "default image expands to {} bytes, region is {}",
                    cells * rle.cell_bytes(),
                    size
                )));
            }
        }
        Ok(Self {
            data: vec![ERASED; size],
            default,
            gate,
            unlocked: false,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current contents, for saving.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Factory image: erased cells plus the expanded default table.
    pub fn default_image(&self) -> Vec<u8> {
        match &self.default {
            Some(rle) => rle.decode(self.data.len()),
            None => vec![ERASED; self.data.len()],
        }
    }

    /// Machine reset: close the gate and reload the contents, from storage
    /// if `id` has been saved before, otherwise from the default image.
    pub fn reset(&mut self, storage: &mut dyn NvramStorage, id: &str) -> Result<(), StorageError> {
        self.unlocked = false;
        match storage.load(id)? {
            Some(saved) => {
                if saved.len() != self.data.len() {
                    log::warn!(
                        "nvram `{id}`: saved image is {} bytes, expected {}",
                        saved.len(),
                        self.data.len()
                    );
                }
                self.data = self.default_image();
                let len = saved.len().min(self.data.len());
                self.data[..len].copy_from_slice(&saved[..len]);
            }
            None => {
                log::debug!("nvram `{id}`: no saved image, using defaults");
                self.data = self.default_image();
            }
        }
        Ok(())
    }

    /// Persist the current contents under `id`.
    pub fn save(&self, storage: &mut dyn NvramStorage, id: &str) -> Result<(), StorageError> {
        storage.save(id, &self.data)
    }

    /// Level gate control. On a one-shot gate, `true` unlocks one write.
    pub fn enable_w(&mut self, enabled: bool) {
        self.unlocked = enabled;
    }

    /// Allow the next write.
    pub fn unlock(&mut self) {
        self.unlocked = true;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn index(&self, offset: usize) -> usize {
        offset % self.data.len()
    }

    /// Byte at `offset`, wrapped to the store size.
    pub fn read(&self, offset: usize) -> u8 {
        self.data[self.index(offset)]
    }

    fn word(&self, offset: usize) -> u16 {
        let hi = self.read(offset & !1);
        let lo = self.read((offset & !1) + 1);
        u16::from_be_bytes([hi, lo])
    }

    /// 16-bit read of a cell wired to the low data lane.
    pub fn read_word_low(&self, offset: usize) -> u16 {
        self.word(offset) | 0xFF00
    }

    /// 16-bit read of a cell wired to the high data lane.
    pub fn read_word_high(&self, offset: usize) -> u16 {
        self.word(offset) | 0x00FF
    }

    /// Returns whether the write was accepted.
    pub fn write(&mut self, offset: usize, value: u8) -> bool {
        if !self.unlocked {
            log::trace!("nvram write {offset:#x} = {value:#04x} ignored: locked");
            return false;
        }
        let index = self.index(offset);
        self.data[index] = value;
        if self.gate == WriteGate::OneShot {
            self.unlocked = false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStorage;

    fn table() -> RleDefault {
        RleDefault::from_packed(&[0x0000, 0x0300, 0x0212, 0x0000])
    }

    #[test]
    fn packed_table_parses_layout_and_runs() {
        let t = table();
        assert_eq!(t.layout, RleLayout::Byte);
        assert_eq!(t.runs, vec![(3, 0x00), (2, 0x12)]);
        assert_eq!(t.to_packed(), vec![0x0000, 0x0300, 0x0212, 0x0000]);
        assert_eq!(RleDefault::from_packed(&[0x0001, 0x0155]).layout, RleLayout::Word);
    }

    #[test]
    fn decode_fills_rest_with_erased() {
        assert_eq!(table().decode(8), vec![0, 0, 0, 0x12, 0x12, 0xFF, 0xFF, 0xFF]);
        let word = RleDefault {
            layout: RleLayout::Word,
            runs: vec![(2, 0x34)],
        };
        assert_eq!(word.decode(6), vec![0x34, 0x34, 0x34, 0x34, 0xFF, 0xFF]);
    }

    #[test]
    fn decode_stops_at_region_end() {
        let long = RleDefault {
            layout: RleLayout::Byte,
            runs: vec![(200, 1)],
        };
        assert_eq!(long.decode(4), vec![1; 4]);
    }

    #[test]
    fn encode_splits_long_runs() {
        let image = vec![7u8; 300];
        let rle = RleDefault::encode(RleLayout::Byte, &image);
        assert_eq!(rle.runs, vec![(255, 7), (45, 7)]);
    }

    #[test]
    fn oversize_default_rejected() {
        assert!(NvramStore::new(4, Some(table()), WriteGate::OneShot).is_err());
        assert!(NvramStore::new(0, None, WriteGate::Level).is_err());
    }

    #[test]
    fn one_shot_gate_accepts_single_write() {
        let mut nv = NvramStore::new(16, None, WriteGate::OneShot).unwrap();
        assert!(!nv.write(0, 1));
        nv.unlock();
        assert!(nv.write(0, 1));
        assert!(!nv.write(1, 2));
        assert_eq!(nv.read(0), 1);
        assert_eq!(nv.read(1), ERASED);
    }

    #[test]
    fn level_gate_stays_open() {
        let mut nv = NvramStore::new(16, None, WriteGate::Level).unwrap();
        nv.enable_w(true);
        assert!(nv.write(0, 1));
        assert!(nv.write(1, 2));
        nv.enable_w(false);
        assert!(!nv.write(2, 3));
        // Gate never affects reads.
        assert_eq!(nv.read(1), 2);
    }

    #[test]
    fn word_reads_pad_the_unused_lane() {
        let mut nv = NvramStore::new(4, None, WriteGate::Level).unwrap();
        nv.enable_w(true);
        nv.write(1, 0x5A);
        assert_eq!(nv.read_word_low(0), 0xFF5A);
        nv.write(2, 0x3C);
        nv.write(3, 0x00);
        assert_eq!(nv.read_word_high(2), 0x3CFF);
    }

    #[test]
    fn reset_prefers_saved_image() {
        let mut storage = MemoryStorage::new();
        let mut nv = NvramStore::new(8, Some(table()), WriteGate::OneShot).unwrap();
        nv.reset(&mut storage, "test").unwrap();
        assert_eq!(nv.data(), &nv.default_image()[..]);

        nv.unlock();
        nv.write(7, 0x42);
        nv.save(&mut storage, "test").unwrap();

        let mut fresh = NvramStore::new(8, Some(table()), WriteGate::OneShot).unwrap();
        fresh.reset(&mut storage, "test").unwrap();
        assert_eq!(fresh.read(7), 0x42);
        assert!(!fresh.is_unlocked());
    }
}
