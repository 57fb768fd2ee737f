use marquee_core::device::interrupt::{InterruptSource, PriorityEntry};
use marquee_core::device::motion_object::{LinkField, MotionObjectDescriptor, TraversalOrder};
use marquee_core::device::nvram::WriteGate;
use marquee_core::device::playfield::PlayfieldDescriptor;
use marquee_core::device::sound_bridge::{AckRule, SoundBridgeConfig, SpeedupRule};

use crate::profile::{
    AlphaSpec, BitField, BoardProfile, ListHead, MainHandler::*, MapEntry, MotionObjectSpec,
    NvramSpec, PaletteFormat, PaletteSpec, PlayfieldSpec, ScreenSpec, SlapsticSpec,
    SoundHandler, SoundSpec, SpriteLayout, TileLayout,
};
use crate::registry::BoardEntry;

// Gauntlet: 68010 main CPU, 6502 audio, one scrolling playfield, sprites
// located through a SLIP table in alpha RAM, slapstic 137412-104.

pub const SLAPSTIC_BASE: u32 = 0x03_8000;
/// SLIP table offset within alpha RAM.
const SLIP_OFFSET: u32 = 0xF80;

pub fn profile() -> BoardProfile {
    BoardProfile {
        name: "gauntlet".into(),
        description: "Gauntlet (shared board, slapstic 104)".into(),
        screen: ScreenSpec {
            width: 336,
            height: 240,
            total_scanlines: 262,
            cycles_per_scanline: 455,
        },
        update_frequency: 8,
        interrupts: vec![
            PriorityEntry::new(InterruptSource::Sound, 6),
            PriorityEntry::new(InterruptSource::Video, 4),
        ],
        motion_objects: MotionObjectSpec {
            descriptor: MotionObjectDescriptor {
                max_count: 1024,
                entry_stride: 2,
                word_stride: 0x800,
                entry_words: 4,
                ignore_word: 3,
                ignore_value: 0xFFFF,
                link: LinkField {
                    word: Some(3),
                    shift: 0,
                    mask: 0x3FF,
                },
                order: TraversalOrder::Forward,
            },
            max_bands: 32,
            list: ListHead::Slip {
                offset: SLIP_OFFSET,
            },
            layout: SpriteLayout {
                gfx: 1,
                code: BitField::new(0, 0, 0x7FFF),
                color: BitField::new(1, 0, 0x000F),
                x: BitField::new(1, 7, 0x1FF),
                y: BitField::new(2, 7, 0x1FF),
                width: BitField::new(2, 3, 0x7),
                height: BitField::new(2, 0, 0x7),
                flip_x: Some(BitField::new(2, 6, 0x1)),
                priority: None,
                base_row: 16,
                cell_size: 8,
                follow_playfield: true,
            },
        },
        playfields: vec![PlayfieldSpec {
            descriptor: PlayfieldDescriptor {
                tile_width: 8,
                tile_height: 8,
                columns: 64,
                rows: 64,
                scrolling: true,
            },
            layout: TileLayout {
                gfx: 0,
                code_mask: 0x0FFF,
                color_shift: 12,
                color_mask: 0x7,
                flip_x_bit: Some(15),
                priority_bit: None,
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
            chip: 104,
            base: SLAPSTIC_BASE,
        }),
        sound: SoundSpec {
            bridge: SoundBridgeConfig {
                ack_rule: AckRule::OnRead,
                irq_divisor: 64,
            },
            speedup: Some(SpeedupRule {
                name: "gauntlet-audio-idle".into(),
                loop_pc: 0x411A,
                watch: [0x0211, 0x0213],
                verified: true,
            }),
        },
        nvram: NvramSpec {
            size: 0x1000,
            gate: WriteGate::OneShot,
            default: None,
        },
        video_controller: false,
        video_shadow: None,
        alpha: Some(AlphaSpec {
            gfx: 2,
            columns: 64,
            rows: 32,
            cell_size: 8,
            code_mask: 0x03FF,
            color_shift: 10,
            color_mask: 0x000F,
            base_row: 0,
            opaque_bit: Some(15),
        }),
        main_map: vec![
            MapEntry::new(0x00_0000, 0x03_7FFF, ProgramRom),
            MapEntry::new(SLAPSTIC_BASE, 0x03_FFFF, Slapstic),
            MapEntry::new(0x04_0000, 0x07_FFFF, ProgramRom),
            MapEntry::new(0x80_0000, 0x80_1FFF, WorkRam),
            MapEntry::new(0x80_2000, 0x80_2FFF, Nvram),
            MapEntry::new(0x80_300E, 0x80_300F, SoundResponse),
            MapEntry::new(0x80_3100, 0x80_3101, Watchdog),
            MapEntry::new(0x80_3120, 0x80_3121, SoundReset),
            MapEntry::new(0x80_3140, 0x80_3141, VideoAck),
            MapEntry::new(0x80_3150, 0x80_3151, NvramUnlock),
            MapEntry::new(0x80_3170, 0x80_3171, SoundCommand),
            MapEntry::new(0x90_0000, 0x90_1FFF, PlayfieldRam(0)),
            MapEntry::new(0x90_2000, 0x90_3FFF, MotionObjectRam),
            MapEntry::new(0x90_5000, 0x90_5FFF, AlphaRam),
            MapEntry::new(0x91_0000, 0x91_07FF, PaletteRam),
            MapEntry::new(0x93_0000, 0x93_0001, ScrollX(0)),
            MapEntry::new(0x93_0002, 0x93_0003, ScrollY(0)),
        ],
        sound_map: vec![
            MapEntry::new(0x0000, 0x0FFF, SoundHandler::Ram),
            MapEntry::new(0x1000, 0x100F, SoundHandler::ResponseWrite),
            MapEntry::new(0x1010, 0x101F, SoundHandler::CommandRead),
            MapEntry::new(0x1030, 0x103F, SoundHandler::Status),
            MapEntry::new(0x1830, 0x183F, SoundHandler::IrqAck),
            MapEntry::new(0x4000, 0xFFFF, SoundHandler::Rom),
        ],
    }
}

inventory::submit! {
    BoardEntry::new("gauntlet", "Gauntlet (shared board, slapstic 104)", profile)
}
