//! CPU-core collaborator interface.
//!
//! Instruction-set emulation lives outside this crate. The engines only
//! need to drive a CPU's interrupt, halt and reset lines and to ask it a
//! few questions about where it is; [`CpuCore`] is that surface.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineState {
    Clear,
    Assert,
}

impl LineState {
    pub fn from_bool(asserted: bool) -> Self {
        if asserted {
            LineState::Assert
        } else {
            LineState::Clear
        }
    }

    pub fn is_asserted(self) -> bool {
        self == LineState::Assert
    }
}

pub trait CpuCore {
    /// Drive the maskable interrupt input at `level` (68000 IPL level, or
    /// 1 for a single-IRQ CPU).
    fn set_irq_line(&mut self, level: u8, state: LineState);

    fn set_nmi_line(&mut self, state: LineState);

    fn set_halt_line(&mut self, state: LineState);

    fn pulse_reset(&mut self);

    /// Cycles executed since power-on.
    fn total_cycles(&self) -> u64;

    /// Address of the instruction that issued the current bus access.
    fn previous_pc(&self) -> u32;

    /// Stop executing until the next scheduled event (timer, interrupt).
    fn spin_until_next_event(&mut self);
}
