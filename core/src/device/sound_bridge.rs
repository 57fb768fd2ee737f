use serde::{Deserialize, Serialize};

use crate::core::bus::InterruptState;
use crate::core::error::ConfigError;
use crate::cpu::{CpuCore, LineState};
use crate::device::interrupt::{InterruptArbiter, InterruptSource};

pub const STATUS_COMMAND_PENDING: u8 = 0x80;
pub const STATUS_RESPONSE_PENDING: u8 = 0x40;

/// After a command, the host should run both CPUs in lock-step slices of
/// this many microseconds...
pub const INTERLEAVE_PERIOD_US: u32 = 50;
/// ...this many times.
pub const INTERLEAVE_REPEAT: u8 = 20;

/// When the command-pending flag drops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckRule {
    /// The audio CPU reading the command clears it.
    #[default]
    OnRead,
    /// Cleared only by the audio side's acknowledge write or a response.
    OnWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundBridgeConfig {
    pub ack_rule: AckRule,
    /// Scanlines between timed audio IRQs.
    pub irq_divisor: u16,
}

/// Idle-loop skip for the audio CPU. Only installed when `verified`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedupRule {
    pub name: String,
    /// PC of the polling read inside the idle loop.
    pub loop_pc: u32,
    /// `watch[0]`: counter pair that must be equal (bytes at a, a+1).
    /// `watch[1]`: address whose read triggers the check; the value read
    /// must equal the byte following it.
    pub watch: [u16; 2],
    pub verified: bool,
}

/// Main CPU <-> audio CPU mailbox.
///
/// One byte latch in each direction with a "ready" flag. A command from the
/// main CPU raises NMI on the audio CPU; a response from the audio CPU raises
/// the Sound interrupt on the main CPU. The audio CPU also receives a timed
/// IRQ every `irq_divisor` scanlines, ORed with the YM2151's IRQ output.
///
/// Status byte as seen by the audio CPU:
///
/// ```text
///   bit 7  command pending  (main -> sound latch full)
///   bit 6  response pending (sound -> main latch full)
/// ```
pub struct SoundBridge {
    config: SoundBridgeConfig,
    command: u8,
    command_pending: bool,
    response: u8,
    response_pending: bool,
    timed_irq: bool,
    ym2151_irq: bool,
    irq_line: bool,
    nmi_line: bool,
    held_in_reset: bool,
    interleave_left: u8,
    speedup: Option<SpeedupRule>,
}

impl SoundBridge {
    /// Empty mailbox. Fails on a zero `irq_divisor`.
    pub fn new(config: SoundBridgeConfig) -> Result<Self, ConfigError> {
        if config.irq_divisor == 0 {
            return Err(ConfigError::SoundBridge("irq_divisor must be non-zero"));
        }
        Ok(Self {
            config,
            command: 0,
            command_pending: false,
            response: 0,
            response_pending: false,
            timed_irq: false,
            ym2151_irq: false,
            irq_line: false,
            nmi_line: false,
            held_in_reset: false,
            interleave_left: 0,
            speedup: None,
        })
    }

    pub fn config(&self) -> &SoundBridgeConfig {
        &self.config
    }

    /// Machine reset: both latches empty, all audio IRQ inputs low.
    pub fn reset(&mut self) {
        self.command = 0;
        self.command_pending = false;
        self.response = 0;
        self.response_pending = false;
        self.timed_irq = false;
        self.ym2151_irq = false;
        self.irq_line = false;
        self.nmi_line = false;
        self.held_in_reset = false;
        self.interleave_left = 0;
    }

    /// Main-to-audio latch holds an unacknowledged command.
    pub fn command_pending(&self) -> bool {
        self.command_pending
    }

    /// Audio-to-main latch holds an unread response.
    pub fn response_pending(&self) -> bool {
        self.response_pending
    }

    /// Audio CPU interrupt inputs as last driven by the bridge.
    pub fn audio_lines(&self) -> InterruptState {
        InterruptState {
            nmi: self.nmi_line,
            irq: self.irq_line,
            level: u8::from(self.irq_line),
        }
    }

    /// Status byte as the audio CPU reads it.
    pub fn status(&self) -> u8 {
        let mut status = 0;
        if self.command_pending {
            status |= STATUS_COMMAND_PENDING;
        }
        if self.response_pending {
            status |= STATUS_RESPONSE_PENDING;
        }
        status
    }

    /// Main CPU command write: latch `byte`, raise NMI and request high interleave.
    pub fn main_to_sound_write(&mut self, byte: u8, audio: &mut dyn CpuCore) {
        if self.command_pending {
            log::debug!("sound command {:#04x} overwrote unread {:#04x}", byte, self.command);
        }
        self.command = byte;
        self.command_pending = true;
        self.nmi_line = true;
        audio.set_nmi_line(LineState::Assert);
        self.interleave_left = INTERLEAVE_REPEAT;
    }

    /// Audio CPU reads the command. Drops NMI; clears the pending flag under [`AckRule::OnRead`].
    pub fn sound_read_command(&mut self, audio: &mut dyn CpuCore) -> u8 {
        audio.set_nmi_line(LineState::Clear);
        self.nmi_line = false;
        if self.config.ack_rule == AckRule::OnRead {
            self.command_pending = false;
        }
        self.command
    }

    /// Audio side's explicit acknowledge register.
    pub fn sound_acknowledge(&mut self) {
        if self.config.ack_rule == AckRule::OnWrite {
            self.command_pending = false;
        }
    }

    /// Audio CPU response write: latch `byte` and raise the main Sound interrupt.
    pub fn sound_to_main_write(&mut self, byte: u8, main: &mut InterruptArbiter) {
        if self.response_pending {
            log::debug!("sound response {:#04x} overwrote unread {:#04x}", byte, self.response);
        }
        if self.config.ack_rule == AckRule::OnWrite {
            self.command_pending = false;
        }
        self.response = byte;
        self.response_pending = true;
        main.assert(InterruptSource::Sound);
    }

    /// Main CPU reads the response and acknowledges the Sound interrupt.
    pub fn main_read_response(&mut self, main: &mut InterruptArbiter) -> u8 {
        self.response_pending = false;
        main.acknowledge(InterruptSource::Sound);
        self.response
    }

    /// 16-bit read with the byte on the low lane (`| 0xFF00`) or the high
    /// lane (`| 0x00FF`).
    pub fn main_read_response_word(&mut self, main: &mut InterruptArbiter, upper: bool) -> u16 {
        let byte = self.main_read_response(main) as u16;
        if upper {
            (byte << 8) | 0x00FF
        } else {
            byte | 0xFF00
        }
    }

    /// Audio CPU reset line. Asserting holds the CPU; releasing pulses reset
    /// and empties the response latch.
    pub fn reset_line(&mut self, asserted: bool, audio: &mut dyn CpuCore, main: &mut InterruptArbiter) {
        if asserted {
            audio.set_halt_line(LineState::Assert);
            self.held_in_reset = true;
            return;
        }
        audio.set_halt_line(LineState::Clear);
        audio.pulse_reset();
        self.held_in_reset = false;
        self.response_pending = false;
        main.acknowledge(InterruptSource::Sound);
        self.timed_irq = false;
        self.update_irq(audio);
        log::debug!("audio CPU reset");
    }

    pub fn is_held_in_reset(&self) -> bool {
        self.held_in_reset
    }

    /// Timed IRQ: fires on every scanline divisible by `irq_divisor`.
    pub fn on_scanline(&mut self, scanline: u16, audio: &mut dyn CpuCore) {
        if scanline % self.config.irq_divisor == 0 {
            self.timed_irq = true;
            self.update_irq(audio);
        }
    }

    /// Clear the timed IRQ.
    pub fn irq_acknowledge(&mut self, audio: &mut dyn CpuCore) {
        self.timed_irq = false;
        self.update_irq(audio);
    }

    /// Sound chip IRQ output, ORed into the audio IRQ line.
    pub fn set_ym2151_irq(&mut self, asserted: bool, audio: &mut dyn CpuCore) {
        self.ym2151_irq = asserted;
        self.update_irq(audio);
    }

    fn update_irq(&mut self, audio: &mut dyn CpuCore) {
        let line = self.timed_irq || self.ym2151_irq;
        if line != self.irq_line {
            audio.set_irq_line(1, LineState::from_bool(line));
            self.irq_line = line;
        }
    }

    /// Remaining high-interleave slices requested by the last command.
    pub fn interleave_remaining(&self) -> u8 {
        self.interleave_left
    }

    /// Consume one interleave slice; true while more remain.
    pub fn interleave_tick(&mut self) -> bool {
        self.interleave_left = self.interleave_left.saturating_sub(1);
        self.interleave_left > 0
    }

    /// Arm an idle-loop rule. Rules not marked verified are refused.
    pub fn install_speedup(&mut self, rule: SpeedupRule) -> Result<(), ConfigError> {
        if !rule.verified {
            return Err(ConfigError::UnverifiedSpeedup(rule.name));
        }
        log::info!("audio speed-up `{}` installed at {:#06x}", rule.name, rule.loop_pc);
        self.speedup = Some(rule);
        Ok(())
    }

    pub fn remove_speedup(&mut self) {
        self.speedup = None;
    }

    pub fn speedup(&self) -> Option<&SpeedupRule> {
        self.speedup.as_ref()
    }

    /// Called on an audio-CPU read of `address` that returned `value`.
    /// Spins the CPU when it is sitting in the idle loop with nothing new
    /// to do; returns whether it did.
    pub fn check_speedup(&self, address: u16, value: u8, ram: &[u8], audio: &mut dyn CpuCore) -> bool {
        let Some(rule) = &self.speedup else {
            return false;
        };
        if address != rule.watch[1] || audio.previous_pc() != rule.loop_pc {
            return false;
        }
        let byte = |addr: u16| ram.get(addr as usize).copied();
        let a = rule.watch[0];
        let idle = byte(a).is_some()
            && byte(a) == byte(a.wrapping_add(1))
            && Some(value) == byte(address.wrapping_add(1));
        if idle {
            audio.spin_until_next_event();
        }
        idle
    }
}
