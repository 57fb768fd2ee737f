use marquee_core::device::interrupt::{InterruptSource, PriorityEntry};
use marquee_core::device::motion_object::{LinkField, MotionObjectDescriptor, TraversalOrder};
use marquee_core::device::nvram::{RleDefault, WriteGate};
use marquee_core::device::playfield::PlayfieldDescriptor;
use marquee_core::device::sound_bridge::{AckRule, SoundBridgeConfig, SpeedupRule};

use crate::profile::{
    AlphaSpec, BitField, BoardProfile, ListHead, MainHandler::*, MapEntry, MotionObjectSpec,
    NvramSpec, PaletteFormat, PaletteSpec, PlayfieldSpec, ScreenSpec, SlapsticSpec,
    SoundHandler, SoundSpec, SpriteLayout, TileLayout,
};
use crate::registry::BoardEntry;

// Xybots: fixed (non-scrolling) playfield with per-tile priority over the
// sprites, a 64-entry unlinked sprite table, slapstic 137412-107 and a
// word-wide EEPROM seeded from a packed default table.

pub const SLAPSTIC_BASE: u32 = 0x00_8000;

/// Factory EEPROM contents: layout word, then `count << 8 | value` runs.
pub const NVRAM_DEFAULT: [u16; 6] = [0x0001, 0x1000, 0x0201, 0x0803, 0x2000, 0x0000];

pub fn profile() -> BoardProfile {
    BoardProfile {
        name: "xybots".into(),
        description: "Xybots (shared board, slapstic 107)".into(),
        screen: ScreenSpec {
            width: 336,
            height: 240,
            total_scanlines: 262,
            cycles_per_scanline: 455,
        },
        update_frequency: 8,
        interrupts: vec![
            PriorityEntry::new(InterruptSource::Sound, 2),
            PriorityEntry::new(InterruptSource::Video, 1),
        ],
        motion_objects: MotionObjectSpec {
            descriptor: MotionObjectDescriptor {
                max_count: 64,
                entry_stride: 8,
                word_stride: 2,
                entry_words: 4,
                // Unlinked: every entry is visited in order, code 0 is empty.
                ignore_word: 0,
                ignore_value: 0x0000,
                link: LinkField {
                    word: None,
                    shift: 0,
                    mask: 0x3F,
                },
                order: TraversalOrder::Forward,
            },
            max_bands: 32,
            list: ListHead::Fixed { head: 0 },
            layout: SpriteLayout {
                gfx: 1,
                code: BitField::new(0, 0, 0x3FFF),
                color: BitField::new(3, 0, 0x000F),
                x: BitField::new(3, 7, 0x1FF),
                y: BitField::new(2, 7, 0x1FF),
                width: BitField::new(2, 3, 0x0),
                height: BitField::new(2, 0, 0x7),
                flip_x: Some(BitField::new(0, 15, 0x1)),
                priority: Some(BitField::new(3, 4, 0x7)),
                base_row: 16,
                cell_size: 8,
                follow_playfield: false,
            },
        },
        playfields: vec![PlayfieldSpec {
            descriptor: PlayfieldDescriptor {
                tile_width: 8,
                tile_height: 8,
                columns: 64,
                rows: 32,
                scrolling: false,
            },
            layout: TileLayout {
                gfx: 0,
                code_mask: 0x0FFF,
                color_shift: 12,
                color_mask: 0x3,
                flip_x_bit: Some(15),
                priority_bit: Some(14),
                base_row: 32,
                bank_shift: 12,
            },
        }],
        palette: PaletteSpec {
            rows: 64,
            capacity: 256,
            format: PaletteFormat::Word,
        },
        slapstic: Some(SlapsticSpec {
            chip: 107,
            base: SLAPSTIC_BASE,
        }),
        sound: SoundSpec {
            bridge: SoundBridgeConfig {
                ack_rule: AckRule::OnWrite,
                irq_divisor: 64,
            },
            speedup: Some(SpeedupRule {
                name: "xybots-audio-idle".into(),
                loop_pc: 0x4157,
                watch: [0x0220, 0x0222],
                verified: false,
            }),
        },
        nvram: NvramSpec {
            size: 0x1000,
            gate: WriteGate::OneShot,
            default: Some(RleDefault::from_packed(&NVRAM_DEFAULT)),
        },
        video_controller: false,
        video_shadow: None,
        alpha: Some(AlphaSpec {
            gfx: 2,
            columns: 64,
            rows: 32,
            cell_size: 8,
            code_mask: 0x03FF,
            color_shift: 12,
            color_mask: 0x0007,
            base_row: 0,
            opaque_bit: Some(15),
        }),
        main_map: vec![
            MapEntry::new(0x00_0000, 0x00_7FFF, ProgramRom),
            MapEntry::new(SLAPSTIC_BASE, 0x00_FFFF, Slapstic),
            MapEntry::new(0x01_0000, 0x03_FFFF, ProgramRom),
            MapEntry::new(0xFF_8000, 0xFF_8FFF, AlphaRam),
            MapEntry::new(0xFF_9000, 0xFF_ADFF, WorkRam),
            MapEntry::new(0xFF_AE00, 0xFF_AFFF, MotionObjectRam),
            MapEntry::new(0xFF_B000, 0xFF_BFFF, PlayfieldRam(0)),
            MapEntry::new(0xFF_C000, 0xFF_C7FF, PaletteRam),
            MapEntry::new(0xFF_D000, 0xFF_DFFF, Nvram),
            MapEntry::new(0xFF_E000, 0xFF_E001, SoundResponse),
            MapEntry::new(0xFF_E800, 0xFF_E801, NvramUnlock),
            MapEntry::new(0xFF_E900, 0xFF_E901, VideoAck),
            MapEntry::new(0xFF_EA00, 0xFF_EA01, Watchdog),
            MapEntry::new(0xFF_EB00, 0xFF_EB01, HaltUntilHblank),
            MapEntry::new(0xFF_EE00, 0xFF_EE01, SoundCommand),
            MapEntry::new(0xFF_EF00, 0xFF_EF01, SoundReset),
        ],
        sound_map: vec![
            MapEntry::new(0x0000, 0x0FFF, SoundHandler::Ram),
            MapEntry::new(0x1000, 0x100F, SoundHandler::ResponseWrite),
            MapEntry::new(0x1010, 0x101F, SoundHandler::CommandRead),
            MapEntry::new(0x1020, 0x102F, SoundHandler::Acknowledge),
            MapEntry::new(0x1030, 0x103F, SoundHandler::Status),
            MapEntry::new(0x1830, 0x183F, SoundHandler::IrqAck),
            MapEntry::new(0x4000, 0xFFFF, SoundHandler::Rom),
        ],
    }
}

inventory::submit! {
    BoardEntry::new("xybots", "Xybots (shared board, slapstic 107)", profile)
}
