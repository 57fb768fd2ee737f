use thiserror::Error;

use marquee_core::device::interrupt::{InterruptArbiter, InterruptSource};
use marquee_core::device::motion_object::MotionObjectEngine;
use marquee_core::device::nvram::NvramStore;
use marquee_core::device::palette::{PaletteReducer, Rgb};
use marquee_core::device::playfield::{PlayfieldEngine, PlayfieldState};
use marquee_core::device::scanline::{self, ScanlineHandler, ScanlineScheduler};
use marquee_core::device::slapstic::SlapsticProtection;
use marquee_core::device::sound_bridge::SoundBridge;
use marquee_core::device::video_control::{VideoControlEvent, VideoController};
use marquee_core::prelude::*;

use crate::profile::{
    AlphaSpec, BoardProfile, ListHead, MainHandler, MapEntry, PaletteFormat, SoundHandler,
    SpriteLayout, TileLayout,
};

// ---------------------------------------------------------------------------
// Shared Atari raster board
// ---------------------------------------------------------------------------
//
// Every game in the family is the same set of engines around a 68000-class
// main CPU and a 6502 audio CPU. The board owns all of it; a `BoardProfile`
// supplies the per-game tables.
//
// Main bus (24-bit, word wide):  dispatched through `AddressMap<MainHandler>`
// Audio bus (16-bit, byte wide): dispatched through `AddressMap<SoundHandler>`
//
// Interrupts: the arbiter folds Scanline / Sound / Video / Joystick into one
// 68000 level; the audio CPU gets NMI on a command and a timed IRQ that
// counts raster lines on its own, apart from the graphics ticks.
//
// Colors: each frame the visible tiles, sprites and alphanumerics report
// the pens they use, the reducer packs those into output slots, and every
// blit carries its row's slot table so drawn pixels index the returned
// palette.

/// 9-bit sprite and scroll coordinates wrap at this value.
const COORD_WRAP: i32 = 0x200;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{region} image of {len:#x} bytes at {offset:#x} exceeds the {capacity:#x}-byte region")]
    RomTooLarge {
        region: &'static str,
        offset: usize,
        len: usize,
        capacity: usize,
    },
}

fn read_be(mem: &[u8], offset: usize) -> u16 {
    match mem.get(offset..offset + 2) {
        Some(b) => u16::from_be_bytes([b[0], b[1]]),
        None => 0xFFFF,
    }
}

fn write_be(mem: &mut [u8], offset: usize, data: u16, mask: u16) {
    if let Some(b) = mem.get_mut(offset..offset + 2) {
        let old = u16::from_be_bytes([b[0], b[1]]);
        let new = (old & !mask) | (data & mask);
        b.copy_from_slice(&new.to_be_bytes());
    }
}

/// Map a 9-bit coordinate onto the screen, negative once past `limit`.
fn wrap_coord(value: i32, limit: i32) -> i32 {
    let v = value.rem_euclid(COORD_WRAP);
    if v >= limit { v - COORD_WRAP } else { v }
}

/// Everything the scanline scheduler drives.
///
/// Field order is drop order: the palette usage tables go first, then the
/// playfields, then the motion objects.
pub struct Hardware<M: CpuCore, A: CpuCore> {
    // --- Video ---
    pub(crate) palette: PaletteReducer,
    pub(crate) playfields: Vec<PlayfieldEngine>,
    pub(crate) motion_objects: MotionObjectEngine,
    pub(crate) pf_state: Vec<PlayfieldState>,
    pub(crate) video: Option<VideoController>,

    // --- Interrupts, protection, sound, NVRAM ---
    pub(crate) arbiter: InterruptArbiter,
    pub(crate) slapstic: Option<SlapsticProtection>,
    pub(crate) sound: SoundBridge,
    pub(crate) nvram: NvramStore,

    // --- Memory ---
    pub(crate) program_rom: Vec<u8>,
    pub(crate) work_ram: Vec<u8>,
    pub(crate) playfield_ram: Vec<Vec<u8>>,
    pub(crate) alpha_ram: Vec<u8>,
    pub(crate) mo_ram: Vec<u8>,
    pub(crate) palette_ram: Vec<u8>,
    pub(crate) sound_ram: Vec<u8>,
    pub(crate) sound_rom: Vec<u8>,

    // --- CPUs ---
    pub(crate) main_cpu: M,
    pub(crate) sound_cpu: A,

    list_head: ListHead,
    screen_height: u16,
    halt_until: Option<u64>,
}

impl<M: CpuCore, A: CpuCore> Hardware<M, A> {
    fn invalidate_all(&mut self) {
        for pf in &mut self.playfields {
            pf.dirty_mut().invalidate_all();
        }
    }

    fn deliver_main(&mut self) {
        self.arbiter.deliver(&mut self.main_cpu);
    }

    /// Apply a scroll change from raster line `line` onward.
    fn set_scroll(&mut self, layer: usize, line: u16, apply: impl FnOnce(&mut PlayfieldState)) {
        let (Some(pf), Some(state)) = (self.playfields.get_mut(layer), self.pf_state.get_mut(layer))
        else {
            return;
        };
        apply(state);
        pf.update(state, line);
    }

    fn sync_video_scroll(&mut self, line: u16) {
        let Some(vc) = &self.video else {
            return;
        };
        let st = *vc.state();
        let scrolls = [
            (st.pf1_xscroll, st.pf1_yscroll),
            (st.pf2_xscroll, st.pf2_yscroll),
        ];
        for (layer, (x, y)) in scrolls.into_iter().enumerate() {
            self.set_scroll(layer, line, |s| {
                s.hscroll = x as u32;
                s.vscroll = y as u32;
                s.param[1] = st.palette_bank as u32;
            });
        }
    }

    fn sprite_scroll(&self, layout: &SpriteLayout) -> (i32, i32) {
        if let Some(vc) = &self.video {
            let st = vc.state();
            return (st.sprite_xscroll as i32, st.sprite_yscroll as i32);
        }
        match self.pf_state.first() {
            Some(s) if layout.follow_playfield => (s.hscroll as i32, s.vscroll as i32),
            _ => (0, 0),
        }
    }

    // --- Rendering ---

    fn scan_palette_usage<B: GfxBackend + ?Sized>(
        &mut self,
        backend: &B,
        profile: &BoardProfile,
        screen: &Rect,
    ) {
        self.palette.reset_usage();

        for (layer, spec) in profile.playfields.iter().enumerate() {
            let (Some(pf), Some(ram)) = (self.playfields.get(layer), self.playfield_ram.get(layer))
            else {
                continue;
            };
            let layout = spec.layout;
            for span in pf.spans(screen) {
                for (col, row) in span.tiles.iter() {
                    let word = read_be(ram, pf.dirty().tile_index(col, row) * 2);
                    let tile = layout.decode(word, &span.state);
                    self.palette
                        .mark(tile.row as usize, backend.pen_usage(layout.gfx, tile.code));
                }
            }
        }

        let layout = profile.motion_objects.layout;
        let mut sprites = Vec::new();
        self.motion_objects.process(screen, |entry, _| sprites.push(layout.decode(entry)));
        for sprite in sprites {
            let cells = sprite.width as u32 * sprite.height as u32;
            let used = (0..cells).fold(0, |mask, cell| {
                mask | backend.pen_usage(layout.gfx, sprite.code.wrapping_add(cell))
            });
            // Pen 0 is transparent on sprites.
            self.palette.mark(sprite.row as usize, used & !1);
        }

        if let Some(alpha) = &profile.alpha {
            for (col, row) in visible_cells(alpha, screen) {
                let Some(cell) = alpha.decode(read_be(&self.alpha_ram, alpha_offset(alpha, col, row)))
                else {
                    continue;
                };
                let mut used = backend.pen_usage(alpha.gfx, cell.code);
                if !cell.opaque {
                    used &= !1;
                }
                self.palette.mark(cell.row as usize, used);
            }
        }
    }

    fn draw_playfield<B: GfxBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layer: usize,
        layout: &TileLayout,
        screen: &Rect,
    ) {
        let (Some(pf), Some(ram)) = (self.playfields.get_mut(layer), self.playfield_ram.get(layer))
        else {
            return;
        };
        let desc = *pf.descriptor();
        let surface = pf.surface();
        let bitmap = Rect::new(
            0,
            desc.width_pixels() as i32 - 1,
            0,
            desc.height_pixels() as i32 - 1,
        );
        let palette = &self.palette;
        let mut drawn = 0usize;
        pf.process(screen, |span, dirty| {
            let ctx = TileLayout::context(&span.state);
            for (col, row) in span.tiles.iter() {
                let index = dirty.tile_index(col, row);
                if !dirty.is_stale(index, ctx) {
                    continue;
                }
                let tile = layout.decode(read_be(ram, index * 2), &span.state);
                let blit = TileBlit {
                    gfx: layout.gfx,
                    code: tile.code,
                    color: tile.row,
                    pens: palette.row_slots(tile.row as usize),
                    flip_x: tile.flip_x,
                    flip_y: false,
                    x: col as i32 * desc.tile_width as i32,
                    y: row as i32 * desc.tile_height as i32,
                    transparency: Transparency::Opaque,
                };
                backend.draw_tile(surface, &blit, &bitmap);
                dirty.mark_drawn(index, ctx);
                drawn += 1;
            }
        });
        log::trace!("playfield {layer}: {drawn} tiles redrawn");
    }

    fn draw_motion_objects<B: GfxBackend + ?Sized>(
        &self,
        backend: &mut B,
        profile: &BoardProfile,
        screen: &Rect,
    ) {
        let layout = profile.motion_objects.layout;
        let (xscroll, yscroll) = self.sprite_scroll(&layout);
        let cell = layout.cell_size as i32;
        let width = screen.width();
        let height = screen.height();

        self.motion_objects.process(screen, |entry, clip| {
            let sprite = layout.decode(entry);
            let x = wrap_coord(sprite.x as i32 - xscroll, width);
            let y = wrap_coord(sprite.y as i32 - yscroll, height);
            let (w, h) = (sprite.width as i32, sprite.height as i32);
            let pens = self.palette.row_slots(sprite.row as usize);

            for cy in 0..h {
                for cx in 0..w {
                    let dx = if sprite.flip_x { w - 1 - cx } else { cx };
                    let blit = TileBlit {
                        gfx: layout.gfx,
                        code: sprite.code.wrapping_add((cy * w + cx) as u32),
                        color: sprite.row,
                        pens,
                        flip_x: sprite.flip_x,
                        flip_y: false,
                        x: x + dx * cell,
                        y: y + cy * cell,
                        transparency: Transparency::Pen(0),
                    };
                    backend.draw_tile(Surface::Screen, &blit, clip);
                }
            }

            if !sprite.priority {
                return;
            }
            let (Some(pf), Some(ram), Some(spec)) = (
                self.playfields.first(),
                self.playfield_ram.first(),
                profile.playfields.first(),
            ) else {
                return;
            };
            let Some(rect) = Rect::new(x, x + w * cell - 1, y, y + h * cell - 1).intersect(clip)
            else {
                return;
            };
            self.overrender_priority_tiles(backend, pf, ram, &spec.layout, &rect);
        });
    }

    /// Redraw playfield tiles with the priority bit over the area a sprite
    /// just covered.
    fn overrender_priority_tiles<B: GfxBackend + ?Sized>(
        &self,
        backend: &mut B,
        pf: &PlayfieldEngine,
        ram: &[u8],
        layout: &TileLayout,
        rect: &Rect,
    ) {
        let desc = *pf.descriptor();
        let (tw, th) = (desc.tile_width as i32, desc.tile_height as i32);
        let (pw, ph) = (desc.width_pixels() as i32, desc.height_pixels() as i32);
        pf.overrender(backend, rect, |backend, span| {
            let hs = span.state.hscroll as i32;
            let vs = span.state.vscroll as i32;
            for (col, row) in span.tiles.iter() {
                let index = pf.dirty().tile_index(col, row);
                let tile = layout.decode(read_be(ram, index * 2), &span.state);
                if !tile.priority {
                    continue;
                }
                let x = (col as i32 * tw - hs).rem_euclid(pw);
                let y = (row as i32 * th - vs).rem_euclid(ph);
                let blit = TileBlit {
                    gfx: layout.gfx,
                    code: tile.code,
                    color: tile.row,
                    pens: self.palette.row_slots(tile.row as usize),
                    flip_x: tile.flip_x,
                    flip_y: false,
                    x: if x > pw - tw { x - pw } else { x },
                    y: if y > ph - th { y - ph } else { y },
                    transparency: Transparency::Pen(0),
                };
                backend.draw_tile(Surface::Overrender, &blit, &span.clip);
            }
        });
    }

    fn draw_alpha<B: GfxBackend + ?Sized>(&self, backend: &mut B, alpha: &AlphaSpec, screen: &Rect) {
        let cell_size = alpha.cell_size as i32;
        for (col, row) in visible_cells(alpha, screen) {
            let Some(cell) = alpha.decode(read_be(&self.alpha_ram, alpha_offset(alpha, col, row)))
            else {
                continue;
            };
            let blit = TileBlit {
                gfx: alpha.gfx,
                code: cell.code,
                color: cell.row,
                pens: self.palette.row_slots(cell.row as usize),
                flip_x: false,
                flip_y: false,
                x: col as i32 * cell_size,
                y: row as i32 * cell_size,
                transparency: if cell.opaque {
                    Transparency::Opaque
                } else {
                    Transparency::Pen(0)
                },
            };
            backend.draw_tile(Surface::Screen, &blit, screen);
        }
    }
}

/// Alphanumerics cells that fall on `screen`, row-major.
fn visible_cells(alpha: &AlphaSpec, screen: &Rect) -> impl Iterator<Item = (u16, u16)> {
    let size = alpha.cell_size.max(1) as i32;
    let fit = |pixels: i32, cells: u16| ((pixels + size - 1) / size).clamp(0, cells as i32) as u16;
    let cols = fit(screen.max_x + 1, alpha.columns);
    let rows = fit(screen.max_y + 1, alpha.rows);
    (0..rows).flat_map(move |row| (0..cols).map(move |col| (col, row)))
}

fn alpha_offset(alpha: &AlphaSpec, col: u16, row: u16) -> usize {
    (row as usize * alpha.columns as usize + col as usize) * 2
}

impl<M: CpuCore, A: CpuCore> ScanlineHandler for Hardware<M, A> {
    fn on_frame_start(&mut self) {
        self.motion_objects.reset();
        for pf in &mut self.playfields {
            pf.reset();
        }
    }

    fn on_scanline(&mut self, scanline: u16) {
        for (pf, state) in self.playfields.iter_mut().zip(&self.pf_state) {
            pf.update(state, scanline);
        }

        match self.list_head {
            ListHead::Fixed { head } => self.motion_objects.update(&self.mo_ram, head, scanline),
            ListHead::Slip { offset } => {
                let slips = self.alpha_ram.get(offset as usize..).unwrap_or(&[]);
                let scroll = self.pf_state.first().map_or(0, |s| s.vscroll as u16);
                self.motion_objects
                    .update_slip(&self.mo_ram, slips, scroll, scanline, self.screen_height);
            }
        }
    }

    fn on_raster_line(&mut self, scanline: u16) {
        self.sound.on_scanline(scanline, &mut self.sound_cpu);
    }

    fn on_scanline_interrupt(&mut self, scanline: u16) {
        log::trace!("scanline interrupt at {scanline}");
        self.arbiter.assert(InterruptSource::Scanline);
        self.deliver_main();
    }
}

pub struct Board<M: CpuCore, A: CpuCore> {
    hw: Hardware<M, A>,
    scheduler: ScanlineScheduler,
    main_map: AddressMap<MainHandler>,
    sound_map: AddressMap<SoundHandler>,
    profile: BoardProfile,
    screen: Rect,
}

fn build_map<H: Copy>(entries: &[MapEntry<H>]) -> Result<AddressMap<H>, ConfigError> {
    AddressMap::new(
        entries
            .iter()
            .map(|e| Binding::backed(e.start, e.end, e.handler, 0))
            .collect(),
    )
}

impl<M: CpuCore, A: CpuCore> Board<M, A> {
    /// Build every engine from `profile`. The board is not usable until
    /// [`reset`](Self::reset) has loaded NVRAM.
    pub fn new(profile: BoardProfile, main_cpu: M, sound_cpu: A) -> Result<Self, BoardError> {
        let screen = Rect::screen(profile.screen.width, profile.screen.height);

        let palette = PaletteReducer::new(profile.palette.rows, profile.palette.capacity)?;
        let playfields = profile
            .playfields
            .iter()
            .enumerate()
            .map(|(layer, spec)| PlayfieldEngine::new(spec.descriptor, layer as u8, &screen))
            .collect::<Result<Vec<_>, _>>()?;
        let mo = &profile.motion_objects;
        let motion_objects = MotionObjectEngine::new(mo.descriptor.clone(), mo.max_bands)?;

        let arbiter = InterruptArbiter::new(&profile.interrupts)?;
        let scheduler =
            ScanlineScheduler::new(profile.update_frequency, profile.screen.total_scanlines)?;
        let slapstic = profile
            .slapstic
            .map(|s| SlapsticProtection::new(s.chip, s.base))
            .transpose()?;
        let sound = SoundBridge::new(profile.sound.bridge)?;
        let nvram = NvramStore::new(
            profile.nvram.size,
            profile.nvram.default.clone(),
            profile.nvram.gate,
        )?;

        let main_map = build_map(&profile.main_map)?;
        let sound_map = build_map(&profile.sound_map)?;
        Self::check_maps(&profile)?;

        let hw = Hardware {
            palette,
            playfield_ram: (0..playfields.len())
                .map(|n| vec![0; profile.main_region_len(MainHandler::PlayfieldRam(n as u8))])
                .collect(),
            pf_state: vec![PlayfieldState::default(); playfields.len()],
            playfields,
            motion_objects,
            video: profile.video_controller.then(VideoController::new),
            arbiter,
            slapstic,
            sound,
            nvram,
            program_rom: vec![0xFF; profile.program_rom_len()],
            work_ram: vec![0; profile.main_region_len(MainHandler::WorkRam)],
            alpha_ram: vec![0; profile.main_region_len(MainHandler::AlphaRam)],
            mo_ram: vec![0; profile.main_region_len(MainHandler::MotionObjectRam)],
            palette_ram: vec![0; profile.main_region_len(MainHandler::PaletteRam)],
            sound_ram: vec![0; profile.sound_region_len(SoundHandler::Ram)],
            sound_rom: vec![0xFF; profile.sound_region_len(SoundHandler::Rom)],
            main_cpu,
            sound_cpu,
            list_head: mo.list,
            screen_height: profile.screen.height as u16,
            halt_until: None,
        };

        log::info!(
            "{}: {} main / {} audio bindings, {} playfield(s), slapstic {}",
            profile.name,
            main_map.len(),
            sound_map.len(),
            hw.playfields.len(),
            profile
                .slapstic
                .map_or_else(|| "none".to_string(), |s| s.chip.to_string()),
        );

        Ok(Self {
            hw,
            scheduler,
            main_map,
            sound_map,
            profile,
            screen,
        })
    }

    /// Cross-checks between the maps and the rest of the profile.
    fn check_maps(profile: &BoardProfile) -> Result<(), ConfigError> {
        for entry in &profile.main_map {
            let bad = |reason| ConfigError::AddressMap {
                start: entry.start,
                end: entry.end,
                reason,
            };
            match entry.handler {
                MainHandler::PlayfieldRam(n) | MainHandler::ScrollX(n) | MainHandler::ScrollY(n)
                    if n as usize >= profile.playfields.len() =>
                {
                    return Err(bad("names a playfield the board does not have"));
                }
                MainHandler::Slapstic => match profile.slapstic {
                    None => return Err(bad("maps a slapstic the board does not have")),
                    Some(s) if s.base != entry.start => {
                        return Err(bad("does not start at the slapstic base"));
                    }
                    Some(_) => {}
                },
                MainHandler::VideoControl if !profile.video_controller => {
                    return Err(bad("maps a video controller the board does not have"));
                }
                _ => {}
            }
        }

        if let Some(entry) = profile
            .sound_map
            .iter()
            .find(|e| e.handler == SoundHandler::IdleLoop)
        {
            return Err(ConfigError::AddressMap {
                start: entry.start,
                end: entry.end,
                reason: "lists the idle-loop handler, which only the speed-up rule installs",
            });
        }

        if let Some(addr) = profile.video_shadow {
            let in_work_ram = profile
                .main_map
                .iter()
                .any(|e| e.handler == MainHandler::WorkRam && (e.start..=e.end).contains(&addr));
            if !profile.video_controller || !in_work_ram {
                return Err(ConfigError::AddressMap {
                    start: addr,
                    end: addr,
                    reason: "video shadow needs a video controller and must lie in work RAM",
                });
            }
        }
        Ok(())
    }

    // --- Accessors ---

    pub fn profile(&self) -> &BoardProfile {
        &self.profile
    }

    pub fn screen(&self) -> Rect {
        self.screen
    }

    pub fn main_cpu(&self) -> &M {
        &self.hw.main_cpu
    }

    pub fn main_cpu_mut(&mut self) -> &mut M {
        &mut self.hw.main_cpu
    }

    pub fn sound_cpu(&self) -> &A {
        &self.hw.sound_cpu
    }

    pub fn sound_cpu_mut(&mut self) -> &mut A {
        &mut self.hw.sound_cpu
    }

    pub fn arbiter(&self) -> &InterruptArbiter {
        &self.hw.arbiter
    }

    pub fn scheduler(&self) -> &ScanlineScheduler {
        &self.scheduler
    }

    pub fn palette(&self) -> &PaletteReducer {
        &self.hw.palette
    }

    pub fn playfields(&self) -> &[PlayfieldEngine] {
        &self.hw.playfields
    }

    pub fn motion_objects(&self) -> &MotionObjectEngine {
        &self.hw.motion_objects
    }

    pub fn slapstic(&self) -> Option<&SlapsticProtection> {
        self.hw.slapstic.as_ref()
    }

    pub fn sound(&self) -> &SoundBridge {
        &self.hw.sound
    }

    pub fn nvram(&self) -> &NvramStore {
        &self.hw.nvram
    }

    pub fn video(&self) -> Option<&VideoController> {
        self.hw.video.as_ref()
    }

    /// Audio bus dispatch, including any installed speed-up substitution.
    pub fn sound_map(&self) -> &AddressMap<SoundHandler> {
        &self.sound_map
    }

    // --- ROM loading ---

    fn load(region: &'static str, dest: &mut [u8], offset: usize, data: &[u8]) -> Result<(), BoardError> {
        let Some(slot) = dest.get_mut(offset..offset + data.len()) else {
            return Err(BoardError::RomTooLarge {
                region,
                offset,
                len: data.len(),
                capacity: dest.len(),
            });
        };
        slot.copy_from_slice(data);
        Ok(())
    }

    /// Program ROM image at byte `offset` (= CPU address).
    pub fn load_program_rom(&mut self, offset: usize, data: &[u8]) -> Result<(), BoardError> {
        Self::load("program ROM", &mut self.hw.program_rom, offset, data)
    }

    /// Audio ROM image at byte `offset` within the ROM region.
    pub fn load_sound_rom(&mut self, offset: usize, data: &[u8]) -> Result<(), BoardError> {
        Self::load("sound ROM", &mut self.hw.sound_rom, offset, data)
    }

    // --- Lifecycle ---

    /// Machine reset. NVRAM is reloaded from `storage`; RAM contents
    /// survive as on hardware.
    pub fn reset(&mut self, storage: &mut dyn NvramStorage) -> Result<(), BoardError> {
        let hw = &mut self.hw;
        hw.arbiter.reset();
        hw.palette.reset_usage();
        hw.motion_objects.reset();
        hw.pf_state.fill(PlayfieldState::default());
        for pf in &mut hw.playfields {
            pf.reset();
            pf.dirty_mut().invalidate_all();
        }
        if let Some(vc) = &mut hw.video {
            vc.reset();
        }
        if let Some(s) = &mut hw.slapstic {
            s.reset();
        }
        hw.sound.reset();
        hw.nvram.reset(storage, &self.profile.name)?;
        hw.halt_until = None;
        self.scheduler.reset();

        hw.main_cpu.set_halt_line(LineState::Clear);
        hw.main_cpu.pulse_reset();
        hw.sound_cpu.pulse_reset();
        hw.deliver_main();
        Ok(())
    }

    pub fn save_nvram(&self, storage: &mut dyn NvramStorage) -> Result<(), BoardError> {
        self.hw.nvram.save(storage, &self.profile.name)?;
        Ok(())
    }

    /// Install or remove the profile's audio idle-loop skip. Installing
    /// substitutes [`SoundHandler::IdleLoop`] over the polled RAM byte; fails
    /// when the profile has no rule or the rule is not verified.
    pub fn set_speedup(&mut self, enabled: bool) -> Result<(), ConfigError> {
        let mut map = build_map(&self.profile.sound_map)?;
        if !enabled {
            self.hw.sound.remove_speedup();
            self.sound_map = map;
            return Ok(());
        }
        let rule = self
            .profile
            .sound
            .speedup
            .clone()
            .ok_or(ConfigError::SoundBridge("board has no speed-up rule"))?;
        let watch = rule.watch[1] as u32;
        map.substitute(&Substitution {
            name: rule.name.clone(),
            start: watch,
            end: watch,
            handler: SoundHandler::IdleLoop,
        })?;
        self.hw.sound.install_speedup(rule)?;
        self.sound_map = map;
        Ok(())
    }

    /// YM2151 IRQ output, ORed into the audio CPU's IRQ.
    pub fn set_ym2151_irq(&mut self, asserted: bool) {
        self.hw.sound.set_ym2151_irq(asserted, &mut self.hw.sound_cpu);
    }

    // --- Timing ---

    /// Run scheduler callbacks up to and including raster line `scanline`.
    pub fn advance_to(&mut self, scanline: u16) {
        self.scheduler.advance_to(scanline, &mut self.hw);
        self.release_halt();
    }

    /// End of frame: flush the remaining scanlines and raise the VBLANK
    /// interrupt. `rendered == false` forces a full redraw next frame.
    pub fn end_frame(&mut self, rendered: bool) {
        self.scheduler.end_frame(rendered, &mut self.hw);
        self.apply_video_shadow();
        let hw = &mut self.hw;
        if hw.arbiter.priority().iter().any(|p| p.source == InterruptSource::Video) {
            hw.arbiter.assert(InterruptSource::Video);
            hw.deliver_main();
        }
        self.release_halt();
    }

    fn release_halt(&mut self) {
        let hw = &mut self.hw;
        if hw.halt_until.is_some_and(|t| hw.main_cpu.total_cycles() >= t) {
            hw.halt_until = None;
            hw.main_cpu.set_halt_line(LineState::Clear);
        }
    }

    /// Next raster line to be processed; writes take effect from here.
    fn raster_line(&self) -> u16 {
        self.scheduler.position()
    }

    fn apply_video_event(&mut self, event: VideoControlEvent) {
        match event {
            VideoControlEvent::ScanlineInterrupt(target) => {
                self.scheduler.set_scanline_interrupt(Some(target));
            }
            VideoControlEvent::ScanlineAck => {
                self.hw.arbiter.acknowledge(InterruptSource::Scanline);
                self.hw.deliver_main();
            }
        }
    }

    /// Echo the game's shadow registers into the video controller.
    fn apply_video_shadow(&mut self) {
        let Some(addr) = self.profile.video_shadow else {
            return;
        };
        let Some(start) = self
            .main_map
            .lookup(addr)
            .filter(|hit| *hit.handler == MainHandler::WorkRam)
            .map(|hit| hit.offset as usize)
        else {
            return;
        };
        let line = self.raster_line();
        let hw = &mut self.hw;
        let (Some(vc), Some(shadow)) = (hw.video.as_mut(), hw.work_ram.get(start..)) else {
            return;
        };
        let events = vc.update_from(shadow);
        hw.sync_video_scroll(line);
        for event in events {
            self.apply_video_event(event);
        }
    }

    // --- Rendering ---

    /// Draw the frame through `backend` and return the reduced host palette.
    pub fn render_frame<B: GfxBackend + ?Sized>(&mut self, backend: &mut B) -> Vec<Rgb> {
        let screen = self.screen;
        if self.scheduler.take_full_redraw() {
            self.hw.invalidate_all();
        }
        self.hw.scan_palette_usage(&*backend, &self.profile, &screen);
        if self.hw.palette.recalc() {
            log::debug!("palette mapping changed; invalidating playfields");
            self.hw.invalidate_all();
        }
        for (layer, spec) in self.profile.playfields.iter().enumerate() {
            self.hw.draw_playfield(backend, layer, &spec.layout, &screen);
            self.hw.playfields[layer].composite(backend, &screen);
        }
        self.hw.draw_motion_objects(backend, &self.profile, &screen);
        if let Some(alpha) = &self.profile.alpha {
            self.hw.draw_alpha(backend, alpha, &screen);
        }
        self.hw.palette.output()
    }

    // --- Slapstic fetch hook ---

    /// Instruction fetch at `address` on the main CPU. Returns the opcode
    /// word when the fetch is served from the slapstic's banked ROM.
    pub fn on_main_fetch(&mut self, address: u32) -> Option<u16> {
        let hw = &mut self.hw;
        let slapstic = hw.slapstic.as_mut()?;
        let previous = hw.main_cpu.previous_pc();
        let redirect = slapstic.on_instruction_fetch(address, previous)?;
        Some(read_be(
            &hw.program_rom,
            (slapstic.base() + redirect.physical) as usize,
        ))
    }

    // --- Main bus ---

    pub fn main_read(&mut self, addr: u32) -> u16 {
        let addr = addr & 0x00FF_FFFE;
        let Some(hit) = self.main_map.lookup(addr) else {
            log::trace!("unmapped main read {addr:#08x}");
            return 0xFFFF;
        };
        let (handler, offset) = (*hit.handler, hit.offset as usize);
        let line = self.raster_line();
        let hw = &mut self.hw;

        match handler {
            MainHandler::ProgramRom => read_be(&hw.program_rom, addr as usize),
            MainHandler::Slapstic => {
                let window = addr as usize - offset;
                let physical = hw
                    .slapstic
                    .as_mut()
                    .map_or(offset as u32, |s| s.read(offset as u32));
                read_be(&hw.program_rom, window + physical as usize)
            }
            MainHandler::WorkRam => read_be(&hw.work_ram, offset),
            MainHandler::PlayfieldRam(n) => hw
                .playfield_ram
                .get(n as usize)
                .map_or(0xFFFF, |ram| read_be(ram, offset)),
            MainHandler::AlphaRam => read_be(&hw.alpha_ram, offset),
            MainHandler::MotionObjectRam => read_be(&hw.mo_ram, offset),
            MainHandler::PaletteRam => read_be(&hw.palette_ram, offset),
            MainHandler::Nvram => hw.nvram.read_word_low(offset),
            MainHandler::SoundResponse => {
                let value = hw.sound.main_read_response_word(&mut hw.arbiter, false);
                hw.deliver_main();
                value
            }
            MainHandler::VideoControl => hw.video.as_ref().map_or(0xFFFF, |vc| {
                vc.read(offset, line, self.screen.max_y as u16)
            }),
            _ => 0xFFFF,
        }
    }

    /// Main-bus write; `mask` selects the byte lanes.
    pub fn main_write(&mut self, addr: u32, data: u16, mask: u16) {
        let addr = addr & 0x00FF_FFFE;
        let Some(hit) = self.main_map.lookup(addr) else {
            log::trace!("unmapped main write {addr:#08x} = {data:#06x}");
            return;
        };
        let (handler, offset) = (*hit.handler, hit.offset as usize);
        let line = self.raster_line();
        let hw = &mut self.hw;

        match handler {
            MainHandler::ProgramRom => log::trace!("write to ROM {addr:#08x} ignored"),
            MainHandler::Slapstic => {
                if let Some(s) = &mut hw.slapstic {
                    s.write(offset as u32);
                }
            }
            MainHandler::WorkRam => write_be(&mut hw.work_ram, offset, data, mask),
            MainHandler::PlayfieldRam(n) => {
                let n = n as usize;
                if let Some(ram) = hw.playfield_ram.get_mut(n) {
                    write_be(ram, offset, data, mask);
                }
                if let Some(pf) = hw.playfields.get_mut(n) {
                    pf.dirty_mut().invalidate(offset / 2);
                }
            }
            MainHandler::AlphaRam => write_be(&mut hw.alpha_ram, offset, data, mask),
            MainHandler::MotionObjectRam => write_be(&mut hw.mo_ram, offset, data, mask),
            MainHandler::PaletteRam => {
                write_be(&mut hw.palette_ram, offset, data, mask);
                match self.profile.palette.format {
                    PaletteFormat::Word => {
                        let word = read_be(&hw.palette_ram, offset);
                        hw.palette.write_666(offset / 2, word);
                    }
                    PaletteFormat::Expanded => {
                        let base = offset & !3;
                        let first = read_be(&hw.palette_ram, base);
                        let second = read_be(&hw.palette_ram, base + 2);
                        hw.palette.write_expanded_666(offset / 4, first, second);
                    }
                }
            }
            MainHandler::Nvram => {
                if mask & 0x00FF != 0 {
                    hw.nvram.write(offset | 1, data as u8);
                }
            }
            MainHandler::NvramUnlock => hw.nvram.unlock(),
            MainHandler::ScrollX(n) => {
                hw.set_scroll(n as usize, line, |s| s.hscroll = (data & 0x1FF) as u32);
            }
            MainHandler::ScrollY(n) => {
                hw.set_scroll(n as usize, line, |s| {
                    s.vscroll = ((data >> 7) & 0x1FF) as u32;
                    s.param[0] = (data & 3) as u32;
                });
            }
            MainHandler::VideoControl => {
                let event = hw.video.as_mut().and_then(|vc| vc.write(offset, data, mask));
                hw.sync_video_scroll(line);
                if let Some(event) = event {
                    self.apply_video_event(event);
                }
            }
            // The command latch sits on the low byte lane.
            MainHandler::SoundCommand if mask & 0x00FF != 0 => {
                hw.sound.main_to_sound_write(data as u8, &mut hw.sound_cpu);
            }
            MainHandler::SoundCommand => {}
            MainHandler::SoundReset => {
                // Bit 0 low holds the audio CPU in reset.
                hw.sound
                    .reset_line(data & 1 == 0, &mut hw.sound_cpu, &mut hw.arbiter);
                hw.deliver_main();
            }
            MainHandler::ScanlineAck => {
                hw.arbiter.acknowledge(InterruptSource::Scanline);
                hw.deliver_main();
            }
            MainHandler::VideoAck => {
                hw.arbiter.acknowledge(InterruptSource::Video);
                hw.deliver_main();
            }
            MainHandler::HaltUntilHblank => {
                let per_line = self.profile.screen.cycles_per_scanline.max(1);
                let width = self.profile.screen.width;
                let now = hw.main_cpu.total_cycles();
                let hpos = ((now % per_line) * width as u64 / per_line) as u32;
                let wait = scanline::cycles_until_hblank(hpos, width, per_line);
                hw.halt_until = Some(now + wait);
                hw.main_cpu.set_halt_line(LineState::Assert);
            }
            MainHandler::SoundResponse | MainHandler::Watchdog => {}
        }
    }

    // --- Audio bus ---

    pub fn sound_read(&mut self, addr: u16) -> u8 {
        let Some(hit) = self.sound_map.lookup(addr as u32) else {
            log::trace!("unmapped audio read {addr:#06x}");
            return 0xFF;
        };
        let (handler, index) = (*hit.handler, hit.backing_index().unwrap_or(hit.offset as usize));
        let hw = &mut self.hw;

        match handler {
            SoundHandler::Ram => hw.sound_ram.get(index).copied().unwrap_or(0xFF),
            SoundHandler::IdleLoop => {
                let value = hw.sound_ram.get(index).copied().unwrap_or(0xFF);
                hw.sound
                    .check_speedup(addr, value, &hw.sound_ram, &mut hw.sound_cpu);
                value
            }
            SoundHandler::Rom => hw.sound_rom.get(index).copied().unwrap_or(0xFF),
            SoundHandler::CommandRead => hw.sound.sound_read_command(&mut hw.sound_cpu),
            SoundHandler::Status => hw.sound.status(),
            _ => 0xFF,
        }
    }

    pub fn sound_write(&mut self, addr: u16, data: u8) {
        let Some(hit) = self.sound_map.lookup(addr as u32) else {
            log::trace!("unmapped audio write {addr:#06x} = {data:#04x}");
            return;
        };
        let (handler, index) = (*hit.handler, hit.backing_index().unwrap_or(hit.offset as usize));
        let hw = &mut self.hw;

        match handler {
            SoundHandler::Ram | SoundHandler::IdleLoop => {
                if let Some(cell) = hw.sound_ram.get_mut(index) {
                    *cell = data;
                }
            }
            SoundHandler::ResponseWrite => {
                hw.sound.sound_to_main_write(data, &mut hw.arbiter);
                hw.deliver_main();
            }
            SoundHandler::IrqAck => hw.sound.irq_acknowledge(&mut hw.sound_cpu),
            SoundHandler::Acknowledge => hw.sound.sound_acknowledge(),
            SoundHandler::Rom | SoundHandler::CommandRead | SoundHandler::Status => {}
        }
    }
}

impl<M: CpuCore, A: CpuCore> Bus for Board<M, A> {
    type Address = u32;
    type Data = u16;

    fn read(&mut self, master: BusMaster, addr: u32) -> u16 {
        if master == BusMaster::AUDIO {
            self.sound_read(addr as u16) as u16
        } else {
            self.main_read(addr)
        }
    }

    fn write(&mut self, master: BusMaster, addr: u32, data: u16) {
        if master == BusMaster::AUDIO {
            self.sound_write(addr as u16, data as u8);
        } else {
            self.main_write(addr, data, 0xFFFF);
        }
    }

    fn is_halted_for(&self, master: BusMaster) -> bool {
        if master == BusMaster::AUDIO {
            return self.hw.sound.is_held_in_reset();
        }
        self.hw
            .halt_until
            .is_some_and(|t| self.hw.main_cpu.total_cycles() < t)
    }

    fn check_interrupts(&self, target: BusMaster) -> InterruptState {
        if target == BusMaster::AUDIO {
            self.hw.sound.audio_lines()
        } else {
            self.hw.arbiter.state()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_wrap_negative_past_limit() {
        assert_eq!(wrap_coord(10, 336), 10);
        assert_eq!(wrap_coord(0x1F0, 336), -16);
        assert_eq!(wrap_coord(-4, 336), -4);
    }

    #[test]
    fn masked_word_write_keeps_other_lane() {
        let mut mem = vec![0x12, 0x34];
        write_be(&mut mem, 0, 0xAAFF, 0x00FF);
        assert_eq!(mem, vec![0x12, 0xFF]);
        assert_eq!(read_be(&mem, 1), 0xFFFF);
    }
}
