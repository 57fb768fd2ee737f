use serde::{Deserialize, Serialize};

use crate::core::bus::InterruptState;
use crate::core::error::ConfigError;
use crate::cpu::{CpuCore, LineState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptSource {
    Scanline,
    Sound,
    Video,
    Joystick,
}

impl InterruptSource {
    pub const ALL: [InterruptSource; 4] = [
        InterruptSource::Scanline,
        InterruptSource::Sound,
        InterruptSource::Video,
        InterruptSource::Joystick,
    ];

    fn bit(self) -> u8 {
        match self {
            InterruptSource::Scanline => 0x01,
            InterruptSource::Sound => 0x02,
            InterruptSource::Video => 0x04,
            InterruptSource::Joystick => 0x08,
        }
    }
}

/// One row of the priority table: when `source` is the highest asserted
/// source, the CPU sees `level`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub source: InterruptSource,
    pub level: u8,
}

impl PriorityEntry {
    pub const fn new(source: InterruptSource, level: u8) -> Self {
        Self { source, level }
    }
}

/// Main-CPU interrupt arbiter.
///
/// The boards wire several independent interrupt sources (scanline timer,
/// sound response, VBLANK, joystick) to the 68000's priority-encoded IPL
/// inputs. Which source wins, and at which level it arrives, differs from
/// game to game, so the ordering is a table handed in at construction.
///
/// ```text
///   source lines ──► [asserted set] ──► first match in priority table ──► level
/// ```
///
/// The output level is a pure function of the asserted set and the table.
/// `deliver()` forwards a change of level to the CPU core; nothing is
/// remembered across frames except which lines are currently asserted.
#[derive(Clone, Debug)]
pub struct InterruptArbiter {
    priority: Vec<PriorityEntry>, // highest priority first
    asserted: u8,
    delivered: u8,
}

impl InterruptArbiter {
    /// Build an arbiter from a priority table, highest priority first.
    pub fn new(priority: &[PriorityEntry]) -> Result<Self, ConfigError> {
        let mut seen = 0u8;
        for entry in priority {
            if !(1..=7).contains(&entry.level) {
                return Err(ConfigError::Priority(format!(
                    "{:?} has level {}, expected 1-7",
                    entry.source, entry.level
                )));
            }
            if seen & entry.source.bit() != 0 {
                return Err(ConfigError::Priority(format!(
                    "{:?} listed twice",
                    entry.source
                )));
            }
            seen |= entry.source.bit();
        }
        Ok(Self {
            priority: priority.to_vec(),
            asserted: 0,
            delivered: 0,
        })
    }

    /// Priority table, highest first.
    pub fn priority(&self) -> &[PriorityEntry] {
        &self.priority
    }

    /// Raise `source`.
    pub fn assert(&mut self, source: InterruptSource) {
        self.asserted |= source.bit();
    }

    /// Drop `source`.
    pub fn clear(&mut self, source: InterruptSource) {
        self.asserted &= !source.bit();
    }

    /// Drive `source` to `asserted`.
    pub fn set(&mut self, source: InterruptSource, asserted: bool) {
        if asserted {
            self.assert(source);
        } else {
            self.clear(source);
        }
    }

    /// Acknowledge write for `source`: drops the line and returns the new
    /// level so the caller can forward it.
    pub fn acknowledge(&mut self, source: InterruptSource) -> u8 {
        self.clear(source);
        self.recompute()
    }

    pub fn is_asserted(&self, source: InterruptSource) -> bool {
        self.asserted & source.bit() != 0
    }

    /// Level for the current line states; 0 when nothing is asserted.
    pub fn recompute(&self) -> u8 {
        self.priority
            .iter()
            .find(|entry| self.is_asserted(entry.source))
            .map_or(0, |entry| entry.level)
    }

    /// Recompute and hand any change of level to the CPU core.
    pub fn deliver(&mut self, cpu: &mut dyn CpuCore) -> u8 {
        let level = self.recompute();
        if level != self.delivered {
            if self.delivered != 0 {
                cpu.set_irq_line(self.delivered, LineState::Clear);
            }
            if level != 0 {
                cpu.set_irq_line(level, LineState::Assert);
            }
            self.delivered = level;
        }
        level
    }

    /// Snapshot for hosts that poll the bus instead of receiving pushes.
    pub fn state(&self) -> InterruptState {
        let level = self.recompute();
        InterruptState {
            nmi: false,
            irq: level != 0,
            level,
        }
    }

    /// Clear every line. The CPU core is reset alongside, so the delivered
    /// level is forgotten too.
    pub fn reset(&mut self) {
        self.asserted = 0;
        self.delivered = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::InterruptSource::*;
    use super::*;

    #[derive(Default)]
    struct Lines {
        events: Vec<(u8, LineState)>,
    }

    impl CpuCore for Lines {
        fn set_irq_line(&mut self, level: u8, state: LineState) {
            self.events.push((level, state));
        }
        fn set_nmi_line(&mut self, _state: LineState) {}
        fn set_halt_line(&mut self, _state: LineState) {}
        fn pulse_reset(&mut self) {}
        fn total_cycles(&self) -> u64 {
            0
        }
        fn previous_pc(&self) -> u32 {
            0
        }
        fn spin_until_next_event(&mut self) {}
    }

    fn arbiter() -> InterruptArbiter {
        InterruptArbiter::new(&[
            PriorityEntry::new(Sound, 6),
            PriorityEntry::new(Video, 4),
            PriorityEntry::new(Scanline, 2),
        ])
        .unwrap()
    }

    #[test]
    fn nothing_asserted_is_level_zero() {
        assert_eq!(arbiter().recompute(), 0);
    }

    #[test]
    fn highest_priority_source_wins() {
        let mut irq = arbiter();
        irq.assert(Scanline);
        assert_eq!(irq.recompute(), 2);
        irq.assert(Sound);
        assert_eq!(irq.recompute(), 6);
        irq.clear(Sound);
        assert_eq!(irq.recompute(), 2);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut irq = arbiter();
        irq.assert(Video);
        irq.assert(Scanline);
        let first = irq.recompute();
        assert_eq!(irq.recompute(), first);
        assert_eq!(irq.recompute(), first);
    }

    #[test]
    fn acknowledge_drops_one_source() {
        let mut irq = arbiter();
        irq.assert(Sound);
        irq.assert(Scanline);
        assert_eq!(irq.acknowledge(Sound), 2);
        assert_eq!(irq.acknowledge(Scanline), 0);
    }

    #[test]
    fn unlisted_source_is_ignored() {
        let mut irq = arbiter();
        irq.assert(Joystick);
        assert_eq!(irq.recompute(), 0);
    }

    #[test]
    fn deliver_only_reports_changes() {
        let mut irq = arbiter();
        let mut cpu = Lines::default();
        irq.assert(Video);
        irq.deliver(&mut cpu);
        irq.deliver(&mut cpu);
        irq.assert(Sound);
        irq.deliver(&mut cpu);
        irq.clear(Sound);
        irq.clear(Video);
        irq.deliver(&mut cpu);
        assert_eq!(
            cpu.events,
            vec![
                (4, LineState::Assert),
                (4, LineState::Clear),
                (6, LineState::Assert),
                (6, LineState::Clear),
            ]
        );
    }

    #[test]
    fn duplicate_source_rejected() {
        let err = InterruptArbiter::new(&[
            PriorityEntry::new(Video, 4),
            PriorityEntry::new(Video, 2),
        ]);
        assert!(matches!(err, Err(ConfigError::Priority(_))));
    }

    #[test]
    fn out_of_range_level_rejected() {
        assert!(InterruptArbiter::new(&[PriorityEntry::new(Video, 0)]).is_err());
        assert!(InterruptArbiter::new(&[PriorityEntry::new(Video, 8)]).is_err());
    }

    #[test]
    fn reset_clears_all_lines() {
        let mut irq = arbiter();
        irq.assert(Sound);
        irq.reset();
        assert_eq!(irq.recompute(), 0);
        assert!(!irq.state().irq);
    }
}
