#![allow(dead_code)]

use std::collections::HashMap;

use marquee_core::prelude::*;

/// Line-level event seen by a [`RecordingCpu`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuEvent {
    Irq(u8, LineState),
    Nmi(LineState),
    Halt(LineState),
    Reset,
    Spin,
}

/// CPU core stand-in: records every line change, reports a settable PC.
#[derive(Default)]
pub struct RecordingCpu {
    pub events: Vec<CpuEvent>,
    pub pc: u32,
    pub cycles: u64,
    pub nmi: bool,
    pub irq_level: u8,
}

impl RecordingCpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_events(&mut self) -> Vec<CpuEvent> {
        std::mem::take(&mut self.events)
    }
}

impl CpuCore for RecordingCpu {
    fn set_irq_line(&mut self, level: u8, state: LineState) {
        self.events.push(CpuEvent::Irq(level, state));
        self.irq_level = if state.is_asserted() { level } else { 0 };
    }

    fn set_nmi_line(&mut self, state: LineState) {
        self.events.push(CpuEvent::Nmi(state));
        self.nmi = state.is_asserted();
    }

    fn set_halt_line(&mut self, state: LineState) {
        self.events.push(CpuEvent::Halt(state));
    }

    fn pulse_reset(&mut self) {
        self.events.push(CpuEvent::Reset);
    }

    fn total_cycles(&self) -> u64 {
        self.cycles
    }

    fn previous_pc(&self) -> u32 {
        self.pc
    }

    fn spin_until_next_event(&mut self) {
        self.events.push(CpuEvent::Spin);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GfxCall {
    Tile(Surface, TileBlit, Rect),
    Copy {
        src: Surface,
        dst: Surface,
        scroll_x: i32,
        scroll_y: i32,
        clip: Rect,
        transparency: Transparency,
    },
    Fill(Surface, Rect, u16),
}

/// Graphics backend stand-in that records calls instead of drawing.
/// Tiles absent from `pen_usage` report every pen as used.
#[derive(Default)]
pub struct RecordingGfx {
    pub calls: Vec<GfxCall>,
    pub pen_usage: HashMap<(u8, u32), u16>,
}

impl RecordingGfx {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GfxBackend for RecordingGfx {
    fn pen_usage(&self, gfx: u8, code: u32) -> u16 {
        self.pen_usage.get(&(gfx, code)).copied().unwrap_or(u16::MAX)
    }

    fn draw_tile(&mut self, surface: Surface, blit: &TileBlit, clip: &Rect) {
        self.calls.push(GfxCall::Tile(surface, *blit, *clip));
    }

    fn copy_scroll(
        &mut self,
        src: Surface,
        dst: Surface,
        scroll_x: i32,
        scroll_y: i32,
        clip: &Rect,
        transparency: Transparency,
    ) {
        self.calls.push(GfxCall::Copy {
            src,
            dst,
            scroll_x,
            scroll_y,
            clip: *clip,
            transparency,
        });
    }

    fn fill(&mut self, surface: Surface, rect: &Rect, pen: u16) {
        self.calls.push(GfxCall::Fill(surface, *rect, pen));
    }
}
