use crate::core::error::ConfigError;

/// Window covered by the chip, in bytes.
pub const WINDOW_BYTES: u32 = 0x8000;
/// Bytes per bank.
pub const BANK_BYTES: u32 = 0x2000;
const BANK_MASK: u32 = BANK_BYTES - 1;

/// One (mask, value) step of an alternate banking sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaskValue {
    pub mask: u16,
    pub value: u16,
}

impl MaskValue {
    const fn new(mask: u16, value: u16) -> Self {
        Self { mask, value }
    }

    fn matches(self, offset: u16) -> bool {
        offset & self.mask == self.value
    }
}

/// Three-access alternate path; the bank comes from the third offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AltSequence {
    pub steps: [MaskValue; 3],
    pub bank_shift: u8,
}

/// Per-chip behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipTable {
    pub chip: u16,
    pub start_bank: u8,
    /// Word offsets selecting banks 0-3.
    pub bank_select: [u16; 4],
    pub alt: Option<AltSequence>,
    /// Word distance from a computed-jump entry point to the extra access
    /// the CPU's prefetch makes.
    pub entry_prefetch: u16,
}

const fn chip(chip: u16, start_bank: u8, bank_select: [u16; 4]) -> ChipTable {
    ChipTable {
        chip,
        start_bank,
        bank_select,
        alt: None,
        entry_prefetch: 1,
    }
}

pub static CHIP_TABLES: &[ChipTable] = &[
    chip(101, 3, [0x0080, 0x0090, 0x00A0, 0x00B0]),
    ChipTable {
        alt: Some(AltSequence {
            steps: [
                MaskValue::new(0x007F, 0x002D),
                MaskValue::new(0x3FF0, 0x3D90),
                MaskValue::new(0x3FF3, 0x0040),
            ],
            bank_shift: 2,
        }),
        ..chip(103, 0, [0x0040, 0x0050, 0x0060, 0x0070])
    },
    chip(104, 0, [0x0020, 0x0028, 0x0030, 0x0038]),
    chip(105, 0, [0x0010, 0x0014, 0x0018, 0x001C]),
    chip(106, 0, [0x0008, 0x000A, 0x000C, 0x000E]),
    chip(107, 0, [0x0018, 0x001A, 0x001C, 0x001E]),
    chip(108, 0, [0x0030, 0x0034, 0x0038, 0x003C]),
    chip(109, 0, [0x0042, 0x0052, 0x0062, 0x0072]),
    chip(110, 0, [0x0002, 0x0006, 0x000A, 0x000E]),
    chip(111, 0, [0x0042, 0x0052, 0x0062, 0x0072]),
    chip(112, 0, [0x002C, 0x003C, 0x006C, 0x007C]),
    chip(113, 0, [0x0008, 0x0018, 0x0048, 0x0058]),
    chip(114, 0, [0x0040, 0x0048, 0x0050, 0x0058]),
    chip(115, 0, [0x0020, 0x0022, 0x0024, 0x0026]),
    chip(116, 0, [0x0010, 0x0012, 0x0014, 0x0016]),
    chip(117, 0, [0x0018, 0x001A, 0x001C, 0x001E]),
    chip(118, 3, [0x0014, 0x0034, 0x0054, 0x0074]),
];

/// Table for `chip` (101, 103 through 118), if known.
pub fn chip_table(chip: u16) -> Option<&'static ChipTable> {
    CHIP_TABLES.iter().find(|t| t.chip == chip)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Enabled,
    Alt1,
    Alt2,
}

/// Where an instruction fetch inside the window should be served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRedirect {
    pub bank: u8,
    /// Byte offset into the banked ROM image.
    pub physical: u32,
}

/// Slapstic bank-switching protection chip (137412-101, -103 through -118).
///
/// The chip sits on the address bus in front of a 32 KiB ROM window split
/// into four 8 KiB banks. It watches the word offsets the CPU touches inside
/// the window and switches the visible bank when it sees a chip-specific
/// access sequence:
///
/// ```text
///   Idle ──offset 0──► Enabled ──bank-select offset──► bank n, Idle
///                         │
///                         └─alt 1─► Alt1 ─alt 2─► Alt2 ─alt 3─► bank from offset, Idle
/// ```
///
/// Any access that does not continue a sequence drops back to `Idle`;
/// offset 0 always (re-)enables.
#[derive(Clone, Debug)]
pub struct SlapsticProtection {
    table: ChipTable,
    base: u32,
    bank: u8,
    mode: Mode,
    history: [u16; 2],
    entered: bool,
}

impl SlapsticProtection {
    /// Chip `chip` mapped at CPU address `base`.
    pub fn new(chip: u16, base: u32) -> Result<Self, ConfigError> {
        let table = *chip_table(chip).ok_or(ConfigError::UnknownSlapstic(chip))?;
        if base & 1 != 0 {
            return Err(ConfigError::SlapsticWindow("base must be word aligned"));
        }
        if base.checked_add(WINDOW_BYTES).is_none() {
            return Err(ConfigError::SlapsticWindow("window exceeds address space"));
        }
        Ok(Self {
            bank: table.start_bank,
            table,
            base,
            mode: Mode::Idle,
            history: [0; 2],
            entered: false,
        })
    }

    /// Chip number this instance was built for.
    pub fn chip(&self) -> u16 {
        self.table.chip
    }

    /// Bank currently visible in the window.
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// Position in the access-sequence state machine.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// CPU address of the first byte of the window.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Last two word offsets seen, most recent first.
    pub fn history(&self) -> [u16; 2] {
        self.history
    }

    /// Whether `address` falls inside the 32 KiB window.
    pub fn contains(&self, address: u32) -> bool {
        address >= self.base && address - self.base < WINDOW_BYTES
    }

    /// Power-on state: the chip's start bank, sequence idle.
    pub fn reset(&mut self) {
        self.bank = self.table.start_bank;
        self.mode = Mode::Idle;
        self.history = [0; 2];
        self.entered = false;
    }

    /// Feed one access at word `offset` within the window; returns the bank
    /// in effect afterwards.
    pub fn tweak(&mut self, offset: u16) -> u8 {
        let offset = offset & ((WINDOW_BYTES / 2 - 1) as u16);
        self.history = [offset, self.history[0]];

        let mode = self.mode;
        self.mode = match mode {
            _ if offset == 0 => Mode::Enabled,
            Mode::Idle => Mode::Idle,
            Mode::Enabled => {
                if let Some(bank) = self.table.bank_select.iter().position(|&o| o == offset) {
                    self.switch(bank as u8);
                    Mode::Idle
                } else if self.table.alt.is_some_and(|alt| alt.steps[0].matches(offset)) {
                    Mode::Alt1
                } else {
                    Mode::Idle
                }
            }
            Mode::Alt1 => match self.table.alt {
                Some(alt) if alt.steps[1].matches(offset) => Mode::Alt2,
                _ => Mode::Idle,
            },
            Mode::Alt2 => match self.table.alt {
                Some(alt) if alt.steps[2].matches(offset) => {
                    self.switch(((offset >> alt.bank_shift) & 3) as u8);
                    Mode::Idle
                }
                _ => Mode::Idle,
            },
        };
        self.bank
    }

    fn switch(&mut self, bank: u8) {
        if bank != self.bank {
            log::debug!("slapstic {}: bank {} -> {}", self.table.chip, self.bank, bank);
        }
        self.bank = bank;
    }

    /// Data read at byte `offset` within the window: tweak, then return the
    /// byte offset into the banked ROM image to read from.
    pub fn read(&mut self, offset: u32) -> u32 {
        let bank = self.tweak((offset / 2) as u16);
        bank as u32 * BANK_BYTES + (offset & BANK_MASK)
    }

    /// Writes only clock the sequencer.
    pub fn write(&mut self, offset: u32) {
        self.tweak((offset / 2) as u16);
    }

    /// Instruction-fetch hook. A fetch that lands in the window from outside
    /// it (a computed jump, not sequential fall-through) clocks the chip at
    /// the entry offset and once more at the prefetched offset. While inside,
    /// fetches are served from the current bank.
    pub fn on_instruction_fetch(&mut self, address: u32, previous_pc: u32) -> Option<FetchRedirect> {
        if !self.contains(address) {
            self.entered = false;
            return None;
        }

        if !self.entered {
            self.entered = true;
            if !self.contains(previous_pc) && !is_fall_through(previous_pc, address) {
                let entry = ((address - self.base) / 2) as u16;
                self.tweak(entry);
                self.tweak(entry.wrapping_add(self.table.entry_prefetch));
                log::trace!(
                    "slapstic {}: entry at {address:#x} from {previous_pc:#x}, bank {}",
                    self.table.chip,
                    self.bank
                );
            }
        }

        let offset = address - self.base;
        Some(FetchRedirect {
            bank: self.bank,
            physical: self.bank as u32 * BANK_BYTES + (offset & BANK_MASK),
        })
    }
}

/// Longest 68000 instruction, in bytes.
const MAX_INSTRUCTION_BYTES: u32 = 10;

/// `address` is the next sequential fetch after an instruction at
/// `previous_pc`, not a jump target.
fn is_fall_through(previous_pc: u32, address: u32) -> bool {
    address > previous_pc && address - previous_pc <= MAX_INSTRUCTION_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_chip_rejected() {
        assert_eq!(
            SlapsticProtection::new(100, 0x80000).unwrap_err(),
            ConfigError::UnknownSlapstic(100)
        );
        assert!(SlapsticProtection::new(101, 0x80001).is_err());
    }

    #[test]
    fn chip_118_rotates_through_four_banks() {
        let mut s = SlapsticProtection::new(118, 0x80000).unwrap();
        assert_eq!(s.bank(), 3);
        let banks: Vec<u8> = [0x0000, 0x0014, 0x0000, 0x0034, 0x0000, 0x0054, 0x0000, 0x0074]
            .iter()
            .map(|&o| s.tweak(o))
            .collect();
        assert_eq!(banks, vec![3, 0, 0, 1, 1, 2, 2, 3]);
    }

    #[test]
    fn bank_select_without_enable_is_ignored() {
        let mut s = SlapsticProtection::new(104, 0).unwrap();
        s.tweak(0x0028);
        assert_eq!(s.bank(), 0);
        s.tweak(0x0000);
        s.tweak(0x1234);
        s.tweak(0x0028);
        assert_eq!(s.bank(), 0);
        assert_eq!(s.mode(), Mode::Idle);
    }

    #[test]
    fn alternate_sequence_takes_bank_from_third_access() {
        let mut s = SlapsticProtection::new(103, 0).unwrap();
        s.tweak(0x0000);
        s.tweak(0x002D);
        assert_eq!(s.mode(), Mode::Alt1);
        s.tweak(0x3D90);
        assert_eq!(s.mode(), Mode::Alt2);
        s.tweak(0x0048); // (0x48 >> 2) & 3 == 2
        assert_eq!(s.bank(), 2);
        assert_eq!(s.mode(), Mode::Idle);
    }

    #[test]
    fn read_maps_into_current_bank() {
        let mut s = SlapsticProtection::new(105, 0x80000).unwrap();
        s.write(0);
        s.write(0x18 * 2); // bank 2
        assert_eq!(s.bank(), 2);
        assert_eq!(s.read(0x2102), 2 * BANK_BYTES + 0x0102);
    }

    #[test]
    fn computed_jump_entry_tweaks_twice() {
        let mut s = SlapsticProtection::new(118, 0x80000).unwrap();
        // Jump to the enable offset: entry tweak enables, prefetch at word 1
        // is not a bank select, so the chip is idle again.
        let r = s.on_instruction_fetch(0x80000, 0x10000).unwrap();
        assert_eq!(s.history(), [1, 0]);
        assert_eq!(r.bank, 3);
        // Fetches inside the window do not clock the chip.
        s.on_instruction_fetch(0x80002, 0x80000);
        assert_eq!(s.history(), [1, 0]);
        // Leaving and re-entering by fall-through does not either.
        assert!(s.on_instruction_fetch(0x7FFFE, 0x80002).is_none());
        s.on_instruction_fetch(0x80000, 0x7FFFE);
        assert_eq!(s.history(), [1, 0]);
    }

    #[test]
    fn short_jump_into_window_middle_is_not_fall_through() {
        let mut s = SlapsticProtection::new(118, 0x80000).unwrap();
        s.read(0);
        // From 4 bytes below the window straight to word 0x14.
        s.on_instruction_fetch(0x80028, 0x7FFFC);
        assert_eq!(s.history(), [0x15, 0x14]);
        assert_eq!(s.bank(), 0);
        assert!(is_fall_through(0x7FFFC, 0x80002));
        assert!(!is_fall_through(0x7FFFC, 0x80028));
    }

    #[test]
    fn reset_restores_start_bank() {
        let mut s = SlapsticProtection::new(101, 0).unwrap();
        s.tweak(0);
        s.tweak(0x80);
        assert_eq!(s.bank(), 0);
        s.reset();
        assert_eq!(s.bank(), 3);
        assert_eq!(s.mode(), Mode::Idle);
    }
}
