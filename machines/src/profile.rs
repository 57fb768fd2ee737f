//! Per-game board description.
//!
//! A [`BoardProfile`] is pure data: everything a game contributes to the
//! shared board (memory maps, engine descriptors, interrupt priorities,
//! protection chip, sound wiring, NVRAM layout). Profiles serialize to TOML
//! so the frontend can dump them and users can inspect them.

use serde::{Deserialize, Serialize};

use marquee_core::device::interrupt::PriorityEntry;
use marquee_core::device::motion_object::MotionObjectDescriptor;
use marquee_core::device::nvram::{RleDefault, WriteGate};
use marquee_core::device::playfield::{PlayfieldDescriptor, PlayfieldState};
use marquee_core::device::sound_bridge::{SoundBridgeConfig, SpeedupRule};

/// What services an address range on the main (68000) bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainHandler {
    ProgramRom,
    /// Banked ROM behind the slapstic.
    Slapstic,
    WorkRam,
    /// Tile RAM of playfield `n`.
    PlayfieldRam(u8),
    /// Alphanumerics RAM; also holds the SLIP table on boards that use one.
    AlphaRam,
    MotionObjectRam,
    PaletteRam,
    Nvram,
    NvramUnlock,
    /// Horizontal scroll of playfield `n`.
    ScrollX(u8),
    /// Vertical scroll of playfield `n` (bits 7..15) and tile bank (bits 0..1).
    ScrollY(u8),
    VideoControl,
    SoundCommand,
    SoundResponse,
    SoundReset,
    ScanlineAck,
    VideoAck,
    HaltUntilHblank,
    Watchdog,
}

/// What services an address range on the audio (6502) bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundHandler {
    Ram,
    Rom,
    CommandRead,
    ResponseWrite,
    Status,
    IrqAck,
    Acknowledge,
    /// Audio RAM byte polled by the idle loop; installed over `Ram` by
    /// the speed-up rule, never listed in a profile.
    IdleLoop,
}

/// One row of a memory map (inclusive range).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry<H> {
    pub start: u32,
    pub end: u32,
    pub handler: H,
}

impl<H> MapEntry<H> {
    pub const fn new(start: u32, end: u32, handler: H) -> Self {
        Self {
            start,
            end,
            handler,
        }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// `(word[word] >> shift) & mask`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitField {
    pub word: u8,
    pub shift: u8,
    pub mask: u16,
}

impl BitField {
    pub const fn new(word: u8, shift: u8, mask: u16) -> Self {
        Self { word, shift, mask }
    }

    pub fn extract(&self, entry: &[u16]) -> u16 {
        entry
            .get(self.word as usize)
            .map_or(0, |&w| w.wrapping_shr(self.shift as u32) & self.mask)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSpec {
    pub width: u32,
    pub height: u32,
    pub total_scanlines: u16,
    /// Main CPU cycles per scanline, for the HBLANK halt.
    pub cycles_per_scanline: u64,
}

/// How a playfield RAM word decodes into a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayout {
    pub gfx: u8,
    pub code_mask: u16,
    pub color_shift: u8,
    pub color_mask: u16,
    pub flip_x_bit: Option<u8>,
    /// Tiles with this bit set are redrawn in front of sprites.
    pub priority_bit: Option<u8>,
    /// Palette row of color 0.
    pub base_row: u16,
    /// Tile bank (`PlayfieldState::param[0]`) shifted into the code.
    pub bank_shift: u8,
}

/// A decoded playfield tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    pub code: u32,
    /// Absolute palette row.
    pub row: u16,
    pub flip_x: bool,
    pub priority: bool,
}

impl TileLayout {
    /// Decode `word` under `state`: `param[0]` is the tile bank, `param[1]`
    /// the palette bank, which selects the next `color_mask + 1` rows.
    pub fn decode(&self, word: u16, state: &PlayfieldState) -> Tile {
        let bit = |b: Option<u8>| b.is_some_and(|b| word & 1u16.wrapping_shl(b as u32) != 0);
        let color = (word >> self.color_shift.min(15)) & self.color_mask;
        let bank_rows = (self.color_mask as u32 + 1).wrapping_mul(state.param[1]);
        Tile {
            code: (word & self.code_mask) as u32 | state.param[0].wrapping_shl(self.bank_shift as u32),
            row: self
                .base_row
                .wrapping_add(bank_rows as u16)
                .wrapping_add(color),
            flip_x: bit(self.flip_x_bit),
            priority: bit(self.priority_bit),
        }
    }

    /// Dirty-cache context for tiles drawn under `state`: every parameter
    /// that changes a tile's pixels without a RAM write.
    pub fn context(state: &PlayfieldState) -> u8 {
        (((state.param[1] & 0x7) << 4) | (state.param[0] & 0xF)) as u8
    }
}

/// Alphanumerics layer: a fixed grid of cells over everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlphaSpec {
    pub gfx: u8,
    pub columns: u16,
    pub rows: u16,
    pub cell_size: u16,
    pub code_mask: u16,
    pub color_shift: u8,
    pub color_mask: u16,
    pub base_row: u16,
    /// Cells with this bit set also draw pen 0.
    pub opaque_bit: Option<u8>,
}

/// A decoded alphanumerics cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AlphaCell {
    pub code: u32,
    pub row: u16,
    pub opaque: bool,
}

impl AlphaSpec {
    /// `None` for a zero word, which is an empty transparent cell.
    pub fn decode(&self, word: u16) -> Option<AlphaCell> {
        if word == 0 {
            return None;
        }
        let color = (word >> self.color_shift.min(15)) & self.color_mask;
        Some(AlphaCell {
            code: (word & self.code_mask) as u32,
            row: self.base_row.wrapping_add(color),
            opaque: self
                .opaque_bit
                .is_some_and(|b| word & 1u16.wrapping_shl(b as u32) != 0),
        })
    }
}

/// How a motion-object entry decodes into a sprite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteLayout {
    pub gfx: u8,
    pub code: BitField,
    pub color: BitField,
    pub x: BitField,
    pub y: BitField,
    /// Width in cells, minus one.
    pub width: BitField,
    /// Height in cells, minus one.
    pub height: BitField,
    pub flip_x: Option<BitField>,
    /// Non-zero priority field: playfield priority tiles overrender it.
    pub priority: Option<BitField>,
    pub base_row: u16,
    pub cell_size: u16,
    /// Sprite coordinates are playfield 0 coordinates.
    pub follow_playfield: bool,
}

/// A decoded motion object, in 9-bit hardware coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sprite {
    pub code: u32,
    pub row: u16,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub flip_x: bool,
    pub priority: bool,
}

impl SpriteLayout {
    pub fn decode(&self, entry: &[u16]) -> Sprite {
        Sprite {
            code: self.code.extract(entry) as u32,
            row: self.base_row.wrapping_add(self.color.extract(entry)),
            x: self.x.extract(entry),
            y: self.y.extract(entry),
            width: self.width.extract(entry).saturating_add(1),
            height: self.height.extract(entry).saturating_add(1),
            flip_x: self.flip_x.is_some_and(|f| f.extract(entry) != 0),
            priority: self.priority.is_some_and(|f| f.extract(entry) != 0),
        }
    }
}

/// Where the motion-object list head comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListHead {
    /// Fixed head entry.
    Fixed { head: u16 },
    /// Per-8-line SLIP table at `offset` in alpha RAM, scrolled with
    /// playfield 0.
    Slip { offset: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionObjectSpec {
    pub descriptor: MotionObjectDescriptor,
    pub max_bands: usize,
    pub list: ListHead,
    pub layout: SpriteLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayfieldSpec {
    pub descriptor: PlayfieldDescriptor,
    pub layout: TileLayout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteFormat {
    /// One 6-6-6 word per entry.
    Word,
    /// 6-6-6 word split over the high bytes of two words.
    Expanded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteSpec {
    pub rows: usize,
    pub capacity: usize,
    pub format: PaletteFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlapsticSpec {
    pub chip: u16,
    pub base: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundSpec {
    pub bridge: SoundBridgeConfig,
    pub speedup: Option<SpeedupRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvramSpec {
    pub size: usize,
    pub gate: WriteGate,
    pub default: Option<RleDefault>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardProfile {
    pub name: String,
    pub description: String,
    pub screen: ScreenSpec,
    /// Scanlines between graphics update ticks.
    pub update_frequency: u16,
    pub interrupts: Vec<PriorityEntry>,
    pub motion_objects: MotionObjectSpec,
    pub playfields: Vec<PlayfieldSpec>,
    pub palette: PaletteSpec,
    pub slapstic: Option<SlapsticSpec>,
    pub sound: SoundSpec,
    pub nvram: NvramSpec,
    /// Board has the later video-controller register block.
    pub video_controller: bool,
    /// Main-bus address of the game's shadow copy of the video-controller
    /// registers, echoed into the controller at the end of every frame.
    pub video_shadow: Option<u32>,
    pub alpha: Option<AlphaSpec>,
    pub main_map: Vec<MapEntry<MainHandler>>,
    pub sound_map: Vec<MapEntry<SoundHandler>>,
}

impl BoardProfile {
    /// Bytes the main map gives `handler` (largest binding).
    pub fn main_region_len(&self, handler: MainHandler) -> usize {
        self.main_map
            .iter()
            .filter(|e| e.handler == handler)
            .map(MapEntry::len)
            .max()
            .unwrap_or(0)
    }

    pub fn sound_region_len(&self, handler: SoundHandler) -> usize {
        self.sound_map
            .iter()
            .filter(|e| e.handler == handler)
            .map(MapEntry::len)
            .max()
            .unwrap_or(0)
    }

    /// Top of the program ROM space, covering the slapstic window.
    pub fn program_rom_len(&self) -> usize {
        self.main_map
            .iter()
            .filter(|e| matches!(e.handler, MainHandler::ProgramRom | MainHandler::Slapstic))
            .map(|e| e.end as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitfield_extracts_and_tolerates_short_entries() {
        let f = BitField::new(1, 7, 0x1FF);
        assert_eq!(f.extract(&[0, 0x1234 << 1]), (0x2468 >> 7) & 0x1FF);
        assert_eq!(f.extract(&[0xFFFF]), 0);
    }

    #[test]
    fn tile_decode_folds_both_banks() {
        let layout = TileLayout {
            gfx: 0,
            code_mask: 0x0FFF,
            color_shift: 12,
            color_mask: 0x7,
            flip_x_bit: Some(15),
            priority_bit: None,
            base_row: 32,
            bank_shift: 12,
        };
        let plain = PlayfieldState::default();
        let banked = PlayfieldState {
            param: [1, 1],
            ..plain
        };
        let word = 0x9123;
        assert_eq!(layout.decode(word, &plain).code, 0x123);
        assert_eq!(layout.decode(word, &plain).row, 33);
        assert!(layout.decode(word, &plain).flip_x);
        assert_eq!(layout.decode(word, &banked).code, 0x1123);
        assert_eq!(layout.decode(word, &banked).row, 41);
        assert_ne!(TileLayout::context(&plain), TileLayout::context(&banked));
    }

    #[test]
    fn out_of_range_layouts_wrap_instead_of_overflowing() {
        let layout = TileLayout {
            gfx: 0,
            code_mask: 0xFFFF,
            color_shift: 40,
            color_mask: 0xFFFF,
            flip_x_bit: Some(200),
            priority_bit: None,
            base_row: 0xFFFF,
            bank_shift: 40,
        };
        let state = PlayfieldState {
            param: [u32::MAX, u32::MAX],
            ..Default::default()
        };
        layout.decode(0xFFFF, &state);
        // Shift counts wrap at the word width.
        assert_eq!(BitField::new(0, 19, 0xFFFF).extract(&[0x8000]), 0x1000);
    }

    #[test]
    fn zero_alpha_word_is_empty() {
        let alpha = AlphaSpec {
            gfx: 2,
            columns: 64,
            rows: 32,
            cell_size: 8,
            code_mask: 0x3FF,
            color_shift: 10,
            color_mask: 0xF,
            base_row: 0,
            opaque_bit: Some(15),
        };
        assert_eq!(alpha.decode(0), None);
        assert_eq!(
            alpha.decode(0x8841),
            Some(AlphaCell {
                code: 0x41,
                row: 2,
                opaque: true
            })
        );
    }

    #[test]
    fn map_entry_len_is_inclusive() {
        let e = MapEntry::new(0x1000, 0x1FFF, MainHandler::WorkRam);
        assert_eq!(e.len(), 0x1000);
        assert!(!e.is_empty());
    }
}
