/// Scanline-driven callback scheduler.
///
/// The host advances the raster (per instruction batch or per scanline) and
/// the scheduler turns that into the board's periodic "update graphics"
/// callbacks: one at scanline 0 and then every `frequency` scanlines up to
/// the end of the frame. Incremental motion-object and playfield state is
/// built from these ticks, so a tick is never dropped: advancing several
/// scanlines at once replays every tick in between, and a frame the host
/// did not render raises a full-redraw request instead of silently
/// discarding the dirty-tile bookkeeping.
///
/// A separate once-per-frame scanline interrupt can be armed at any line
/// (the video controller's "scanline interrupt" register). Timers that run
/// off the raster independently of the graphics cadence (the audio CPU's
/// timed IRQ) see every line through [`ScanlineHandler::on_raster_line`].
pub struct ScanlineScheduler {
    frequency: u16,
    total_scanlines: u16,
    position: u16, // next raster line not yet processed this frame
    next_tick: u16,
    scanline_interrupt: Option<u16>,
    full_redraw: bool,
    frame: u64,
}

/// Receives the scheduler's callbacks. Implemented by the board.
pub trait ScanlineHandler {
    /// Raster reached scanline 0: apply per-frame latched parameters and
    /// reset the per-frame engine state. Called before the tick at line 0.
    fn on_frame_start(&mut self) {}

    /// Periodic tick.
    fn on_scanline(&mut self, scanline: u16);

    /// Every processed raster line, after that line's tick.
    fn on_raster_line(&mut self, _scanline: u16) {}

    /// The armed scanline interrupt fired.
    fn on_scanline_interrupt(&mut self, _scanline: u16) {}
}

impl ScanlineScheduler {
    /// `frequency` = scanlines between ticks (0 = only at scanline 0);
    /// `total_scanlines` = lines per frame including VBLANK.
    pub fn new(frequency: u16, total_scanlines: u16) -> Result<Self, crate::core::ConfigError> {
        if total_scanlines == 0 {
            return Err(crate::core::ConfigError::Scheduler(
                "frame must have at least one scanline",
            ));
        }
        Ok(Self {
            frequency,
            total_scanlines,
            position: 0,
            next_tick: 0,
            scanline_interrupt: None,
            full_redraw: true,
            frame: 0,
        })
    }

    /// Change the tick spacing and frame length. Rewinds to scanline 0.
    pub fn configure(
        &mut self,
        frequency: u16,
        total_scanlines: u16,
    ) -> Result<(), crate::core::ConfigError> {
        let armed = self.scanline_interrupt;
        let frame = self.frame;
        *self = Self::new(frequency, total_scanlines)?;
        self.frame = frame;
        self.set_scanline_interrupt(armed);
        Ok(())
    }

    /// Scanlines between graphics ticks; 0 ticks once per frame.
    pub fn frequency(&self) -> u16 {
        self.frequency
    }

    pub fn total_scanlines(&self) -> u16 {
        self.total_scanlines
    }

    /// Next raster line that has not been processed in the current frame.
    pub fn position(&self) -> u16 {
        self.position
    }

    /// Frames completed since reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Arm (or cancel, with `None`) the once-per-frame scanline interrupt.
    /// Any previously armed line is replaced.
    pub fn set_scanline_interrupt(&mut self, scanline: Option<u16>) {
        self.scanline_interrupt = scanline.filter(|&line| line < self.total_scanlines);
    }

    pub fn scanline_interrupt(&self) -> Option<u16> {
        self.scanline_interrupt
    }

    /// Process every raster line up to and including `scanline`, firing all
    /// ticks that fall in that range in order.
    pub fn advance_to<H: ScanlineHandler + ?Sized>(&mut self, scanline: u16, handler: &mut H) {
        let last = scanline.min(self.total_scanlines - 1);
        if last < self.position {
            return;
        }
        for line in self.position..=last {
            if line == 0 {
                handler.on_frame_start();
            }
            if line == self.next_tick {
                handler.on_scanline(line);
                self.next_tick = if self.frequency == 0 {
                    u16::MAX
                } else {
                    line.saturating_add(self.frequency)
                };
            }
            handler.on_raster_line(line);
            if self.scanline_interrupt == Some(line) {
                handler.on_scanline_interrupt(line);
            }
        }
        self.position = last + 1;
    }

    /// Finish the frame: flush any ticks the host did not reach, then rewind
    /// to scanline 0. `rendered == false` (host frame-skip) requests a full
    /// redraw on the next rendered frame.
    pub fn end_frame<H: ScanlineHandler + ?Sized>(&mut self, rendered: bool, handler: &mut H) {
        if self.position < self.total_scanlines {
            self.advance_to(self.total_scanlines - 1, handler);
        }
        self.position = 0;
        self.next_tick = 0;
        self.frame += 1;
        if !rendered {
            log::trace!("frame {} skipped; full redraw pending", self.frame);
            self.full_redraw = true;
        }
    }

    /// Returns and clears the pending full-redraw request.
    pub fn take_full_redraw(&mut self) -> bool {
        std::mem::take(&mut self.full_redraw)
    }

    /// Back to line 0 of frame 0 with the scanline interrupt disarmed.
    pub fn reset(&mut self) {
        self.position = 0;
        self.next_tick = 0;
        self.scanline_interrupt = None;
        self.full_redraw = true;
        self.frame = 0;
    }
}

/// First beam position inside HBLANK, approximated as the last 10% of the
/// scanline.
pub fn hblank_start(width: u32) -> u32 {
    width * 9 / 10
}

/// Whether beam position `hpos` is in HBLANK.
pub fn in_hblank(hpos: u32, width: u32) -> bool {
    hpos >= hblank_start(width)
}

/// CPU cycles from beam position `hpos` to the start of the next HBLANK.
pub fn cycles_until_hblank(hpos: u32, width: u32, cycles_per_scanline: u64) -> u64 {
    if width == 0 {
        return 0;
    }
    let mut hblank = hblank_start(width);
    if in_hblank(hpos, width) {
        hblank += width;
    }
    (hblank - hpos.min(hblank)) as u64 * cycles_per_scanline / width as u64
}
