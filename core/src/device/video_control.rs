/// Register block size in bytes.
pub const REGISTER_BYTES: usize = 0x40;
/// `update_from` echoes this many bytes of the game's shadow copy.
const SHADOW_BYTES: usize = 0x38;

const REG_SCANLINE_INT: usize = 0x06;
const REG_LATCH_ENABLE: usize = 0x14;
const REG_LATCH1: usize = 0x38;
const REG_LATCH2: usize = 0x3A;
const REG_SCANLINE_ACK: usize = 0x3C;

/// Read-back value flag while the beam is in VBLANK.
pub const VBLANK_FLAG: u16 = 0x4000;

/// Side effects of a register write that the board must carry out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoControlEvent {
    /// Arm the scanline interrupt at this line.
    ScanlineInterrupt(u16),
    /// Acknowledge the scanline interrupt.
    ScanlineAck,
}

/// Decoded register state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoControlState {
    pub latch1: Option<u16>,
    pub latch2: Option<u16>,
    pub rowscroll_enable: bool,
    pub palette_bank: u8,
    pub sprite_xscroll: u16,
    pub sprite_yscroll: u16,
    pub pf1_xscroll: u16,
    pub pf1_yscroll: u16,
    pub pf2_xscroll: u16,
    pub pf2_yscroll: u16,
}

/// Video controller register block (0x40 bytes of word registers) found on
/// the later boards: scroll values for each layer, two per-scanline latch
/// registers, palette bank select and the scanline-interrupt line.
#[derive(Clone, Debug, Default)]
pub struct VideoController {
    regs: [u16; REGISTER_BYTES / 2],
    state: VideoControlState,
    written_latch1: Option<u16>,
    written_latch2: Option<u16>,
}

impl VideoController {
    /// Controller with every register cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every register and the decoded state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Decoded view of the registers as last written.
    pub fn state(&self) -> &VideoControlState {
        &self.state
    }

    fn latches_enabled(&self) -> bool {
        self.regs[REG_LATCH_ENABLE / 2] & 0x0080 != 0
    }

    /// Word write at byte `offset`; `mask` selects the data lanes written.
    pub fn write(&mut self, offset: usize, data: u16, mask: u16) -> Option<VideoControlEvent> {
        let offset = offset & (REGISTER_BYTES - 2);
        let old = self.regs[offset / 2];
        let new = (old & !mask) | (data & mask);
        self.regs[offset / 2] = new;

        match offset {
            REG_SCANLINE_INT if old != new => {
                return Some(VideoControlEvent::ScanlineInterrupt(new & 0x1FF));
            }
            REG_LATCH_ENABLE => {
                if new & 0x0080 == 0 {
                    self.state.latch1 = None;
                    self.state.latch2 = None;
                } else {
                    self.state.latch1 = self.written_latch1;
                    self.state.latch2 = self.written_latch2;
                }
                self.state.rowscroll_enable = new & 0x2000 != 0;
                self.state.palette_bank = (((new & 0x0400) >> 10) ^ 1) as u8;
            }
            0x20..=0x36 => {
                let value = (new >> 7) & 0x1FF;
                match new & 0x0F {
                    9 => self.state.sprite_xscroll = value,
                    10 => self.state.pf2_xscroll = value,
                    11 => self.state.pf1_xscroll = value,
                    13 => self.state.sprite_yscroll = value,
                    14 => self.state.pf2_yscroll = value,
                    15 => self.state.pf1_yscroll = value,
                    _ => {}
                }
            }
            REG_LATCH1 => {
                self.written_latch1 = Some(new);
                self.written_latch2 = None;
                if self.latches_enabled() {
                    self.state.latch1 = self.written_latch1;
                }
            }
            REG_LATCH2 => {
                self.written_latch1 = None;
                self.written_latch2 = Some(new);
                if self.latches_enabled() {
                    self.state.latch2 = self.written_latch2;
                }
            }
            REG_SCANLINE_ACK => return Some(VideoControlEvent::ScanlineAck),
            _ => {}
        }
        None
    }

    /// Offset 0 reads the beam: scanline clamped to 255, with
    /// [`VBLANK_FLAG`] once past `visible_max_y`.
    pub fn read(&self, offset: usize, scanline: u16, visible_max_y: u16) -> u16 {
        let offset = offset & (REGISTER_BYTES - 2);
        if offset == 0 {
            let mut result = scanline.min(255);
            if result > visible_max_y {
                result |= VBLANK_FLAG;
            }
            return result;
        }
        self.regs[offset / 2]
    }

    /// Once-per-frame copy from the game's shadow registers: every non-zero
    /// word is written through.
    pub fn update_from(&mut self, shadow: &[u8]) -> Vec<VideoControlEvent> {
        shadow
            .chunks_exact(2)
            .take(SHADOW_BYTES / 2)
            .enumerate()
            .filter_map(|(i, word)| {
                let value = u16::from_be_bytes([word[0], word[1]]);
                if value == 0 {
                    None
                } else {
                    self.write(i * 2, value, 0xFFFF)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanline_register_reports_changes_only() {
        let mut vc = VideoController::new();
        assert_eq!(
            vc.write(0x06, 0x0250, 0xFFFF),
            Some(VideoControlEvent::ScanlineInterrupt(0x50))
        );
        assert_eq!(vc.write(0x06, 0x0250, 0xFFFF), None);
        assert_eq!(vc.write(0x3C, 0, 0xFFFF), Some(VideoControlEvent::ScanlineAck));
    }

    #[test]
    fn latches_follow_enable_bit() {
        let mut vc = VideoController::new();
        vc.write(0x38, 0x1234, 0xFFFF);
        assert_eq!(vc.state().latch1, None);
        vc.write(0x14, 0x0080, 0xFFFF);
        assert_eq!(vc.state().latch1, Some(0x1234));
        vc.write(0x3A, 0x5678, 0xFFFF);
        assert_eq!(vc.state().latch2, Some(0x5678));
        vc.write(0x14, 0x0000, 0xFFFF);
        assert_eq!(vc.state().latch1, None);
        assert_eq!(vc.state().latch2, None);
    }

    #[test]
    fn control_bits_decode() {
        let mut vc = VideoController::new();
        vc.write(0x14, 0x2000, 0xFFFF);
        assert!(vc.state().rowscroll_enable);
        assert_eq!(vc.state().palette_bank, 1);
        vc.write(0x14, 0x0400, 0xFFFF);
        assert_eq!(vc.state().palette_bank, 0);
    }

    #[test]
    fn indexed_scrolls() {
        let mut vc = VideoController::new();
        vc.write(0x20, (0x123 << 7) | 11, 0xFFFF);
        vc.write(0x22, (0x045 << 7) | 13, 0xFFFF);
        assert_eq!(vc.state().pf1_xscroll, 0x123);
        assert_eq!(vc.state().sprite_yscroll, 0x045);
    }

    #[test]
    fn beam_read() {
        let vc = VideoController::new();
        assert_eq!(vc.read(0, 100, 239), 100);
        assert_eq!(vc.read(0, 250, 239), 250 | VBLANK_FLAG);
        assert_eq!(vc.read(0, 300, 239), 255 | VBLANK_FLAG);
    }

    #[test]
    fn shadow_update_skips_zero_words() {
        let mut vc = VideoController::new();
        let mut shadow = [0u8; 0x40];
        shadow[0x06..0x08].copy_from_slice(&0x0010u16.to_be_bytes());
        shadow[0x3C..0x3E].copy_from_slice(&0x0001u16.to_be_bytes());
        let events = vc.update_from(&shadow);
        assert_eq!(events, vec![VideoControlEvent::ScanlineInterrupt(0x10)]);
    }
}
