/// Identifies who is accessing the bus (main CPU, audio CPU).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusMaster {
    Cpu(usize), // CPU 0 = main 68000-class CPU, CPU 1 = audio 6502
}

impl BusMaster {
    pub const MAIN: BusMaster = BusMaster::Cpu(0);
    pub const AUDIO: BusMaster = BusMaster::Cpu(1);
}

/// Generic bus interface supporting halt and interrupt polling.
pub trait Bus {
    type Address: Copy + Into<u64>; // u16 for the audio side, u32 for the main side
    type Data; // u8 or u16

    fn read(&mut self, master: BusMaster, addr: Self::Address) -> Self::Data;
    fn write(&mut self, master: BusMaster, addr: Self::Address, data: Self::Data);

    /// Check if the bus is halted for this master (e.g. "halt until HBLANK").
    /// Returns true if the master must pause before the next bus cycle.
    fn is_halted_for(&self, master: BusMaster) -> bool;

    /// Current interrupt line state for a CPU, for hosts that poll rather
    /// than receive `CpuCore` line changes.
    fn check_interrupts(&self, target: BusMaster) -> InterruptState;
}

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptState {
    pub nmi: bool,
    pub irq: bool,
    pub level: u8, // prioritized 68000 level; 0 = none, ignored by the 6502
}
