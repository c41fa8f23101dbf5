/// Presentation layer: double-buffered, diff-based terminal renderer.
///
/// How it works:
///   1. Build the next frame into `front` buffer (array of Cell)
///   2. Compare each cell with `back` buffer (previous frame)
///   3. Only emit terminal commands for cells that changed
///   4. All commands are batched with `queue!`, flushed once at the end
///   5. Swap front/back
///
/// One map tile is drawn as 2 terminal columns by 1 row. Entities are
/// placed by the tile under their feet, particles by the tile they are in.

use std::io::{self, BufWriter, Write};

use crossterm::{
    cursor::{self, MoveTo},
    event::{
        DisableMouseCapture, EnableMouseCapture, KeyboardEnhancementFlags,
        PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use tracing::debug;

use crate::domain::body::{EntityKind, Facing};
use crate::domain::effect::AnimKey;
use crate::domain::input::TouchControl;
use crate::domain::tile::{Tile, TILE_SIZE};
use crate::sim::level::ParallaxLayer;
use crate::sim::session::{EntityView, LevelSession, SessionPhase};
use super::fx::Presentation;
use super::touch::{Rect, TouchLayout};

// ── Cell: the unit of the back-buffer ──

#[derive(Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

impl Cell {
    /// Explicit dark background for every cell, matching the Clear color so
    /// row gaps on VTE terminals do not show through.
    const BASE_BG: Color = Color::Rgb { r: 22, g: 22, b: 35 };
    const BASE_RGB: (u8, u8, u8) = (22, 22, 35);

    const BLANK: Cell = Cell { ch: ' ', fg: Color::White, bg: Cell::BASE_BG };

    /// Differs from any real cell, so every position gets diff'd.
    const INVALID: Cell = Cell { ch: '?', fg: Color::Magenta, bg: Color::Magenta };

    fn new(ch: char, fg: Color, bg: Color) -> Self {
        let bg = match bg {
            Color::Reset => Self::BASE_BG,
            other => other,
        };
        Cell { ch, fg, bg }
    }
}

// ── FrameBuffer: a 2D grid of Cells ──

struct FrameBuffer {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl FrameBuffer {
    fn new(w: usize, h: usize) -> Self {
        FrameBuffer { width: w, height: h, cells: vec![Cell::BLANK; w * h] }
    }

    fn resize(&mut self, w: usize, h: usize) {
        if self.width != w || self.height != h {
            self.width = w;
            self.height = h;
            self.cells = vec![Cell::BLANK; w * h];
        }
    }

    fn clear(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = cell;
        }
    }

    fn get(&self, x: usize, y: usize) -> Cell {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x]
        } else {
            Cell::BLANK
        }
    }

    fn put_str(&mut self, x: usize, y: usize, s: &str, fg: Color, bg: Color) {
        for (i, ch) in s.chars().enumerate() {
            if x + i >= self.width {
                break;
            }
            self.set(x + i, y, Cell::new(ch, fg, bg));
        }
    }

    fn fill_row(&mut self, y: usize, bg: Color) {
        for x in 0..self.width {
            self.set(x, y, Cell::new(' ', Color::White, bg));
        }
    }

    /// Double-line box around `lines`, top-left at (x, y).
    fn put_box(&mut self, x: usize, y: usize, lines: &[&str], fg: Color, bg: Color) {
        let inner = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 2;
        let bar: String = "═".repeat(inner);
        self.put_str(x, y, &format!("╔{bar}╗"), fg, bg);
        for (i, line) in lines.iter().enumerate() {
            let pad = inner - 1 - line.chars().count();
            self.put_str(x, y + 1 + i, &format!("║ {line}{}║", " ".repeat(pad)), fg, bg);
        }
        self.put_str(x, y + 1 + lines.len(), &format!("╚{bar}╝"), fg, bg);
    }
}

// ── Renderer ──

/// Each map tile = 2 terminal columns.
const CELL_W: usize = 2;

const HUD_ROW: usize = 0;
const MAP_ROW: usize = 2;
/// Message row, help row and the touch buttons under the map.
const BOTTOM_ROWS: usize = 2 + super::touch::BUTTON_H;

const HUD_BG: Color = Color::Rgb { r: 20, g: 20, b: 60 };
const MSG_BG: Color = Color::Rgb { r: 200, g: 180, b: 50 };
const GOLD: Color = Color::Rgb { r: 255, g: 220, b: 50 };
const GREEN: Color = Color::Rgb { r: 80, g: 255, b: 80 };

/// What the host wants on screen this frame.
pub enum Screen<'a> {
    Level {
        session: &'a LevelSession,
        index: usize,
        count: usize,
    },
    Finished {
        levels: usize,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ScreenKind {
    Level,
    Finished,
}

pub struct Renderer {
    writer: BufWriter<io::Stdout>,
    front: FrameBuffer,
    back: FrameBuffer,
    term_w: usize,
    term_h: usize,
    last_screen: Option<ScreenKind>,
    enhanced_keys: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Renderer {
            writer: BufWriter::with_capacity(16384, io::stdout()),
            front: FrameBuffer::new(0, 0),
            back: FrameBuffer::new(0, 0),
            term_w: 0,
            term_h: 0,
            last_screen: None,
            enhanced_keys: false,
        }
    }

    /// Enter raw mode and the alternate screen. Returns true if the terminal
    /// will report key releases.
    pub fn init(&mut self) -> io::Result<bool> {
        terminal::enable_raw_mode()?;
        execute!(
            self.writer,
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide,
            SetBackgroundColor(Cell::BASE_BG),
            Clear(ClearType::All)
        )?;

        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                self.writer,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
            self.enhanced_keys = true;
        }
        debug!(enhanced_keys = self.enhanced_keys, "terminal initialized");

        let (tw, th) = terminal::size().unwrap_or((80, 24));
        self.term_w = tw as usize;
        self.term_h = th as usize;
        self.front.resize(self.term_w, self.term_h);
        self.back.resize(self.term_w, self.term_h);
        self.back.cells.fill(Cell::INVALID);

        Ok(self.enhanced_keys)
    }

    pub fn cleanup(&mut self) -> io::Result<()> {
        if self.enhanced_keys {
            execute!(self.writer, PopKeyboardEnhancementFlags)?;
        }
        execute!(
            self.writer,
            ResetColor,
            DisableMouseCapture,
            cursor::Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()
    }

    pub fn render(
        &mut self,
        screen: Screen,
        fx: &mut Presentation,
        touch: &TouchLayout,
        held: Option<TouchControl>,
    ) -> io::Result<()> {
        let (tw, th) = terminal::size().unwrap_or((80, 24));
        if tw as usize != self.term_w || th as usize != self.term_h {
            self.term_w = tw as usize;
            self.term_h = th as usize;
            self.front.resize(self.term_w, self.term_h);
            self.back.resize(self.term_w, self.term_h);
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
        }

        let kind = match screen {
            Screen::Level { .. } => ScreenKind::Level,
            Screen::Finished { .. } => ScreenKind::Finished,
        };
        if self.last_screen != Some(kind) {
            self.back.cells.fill(Cell::INVALID);
            queue!(self.writer, SetBackgroundColor(Cell::BASE_BG), Clear(ClearType::All))?;
            self.last_screen = Some(kind);
        }

        self.front.clear();
        match screen {
            Screen::Level { session, index, count } => {
                self.compose_level(session, index, count, fx);
                self.compose_touch(touch, held);
                if session.phase() == SessionPhase::Completed {
                    self.compose_completed_overlay(fx, index + 1 < count);
                }
            }
            Screen::Finished { levels } => self.compose_finished(levels),
        }

        self.flush_diff()?;
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    // ── Diff flush: only write changed cells ──

    fn flush_diff(&mut self) -> io::Result<()> {
        let mut last_fg = Color::White;
        let mut last_bg = Cell::BASE_BG;
        let mut cursor_at: Option<(usize, usize)> = None;

        // Explicit base colors; ResetColor would fall back to the terminal's
        // own default and leave line artifacts.
        queue!(self.writer, SetForegroundColor(last_fg), SetBackgroundColor(last_bg))?;

        for y in 0..self.front.height {
            for x in 0..self.front.width {
                let cell = self.front.get(x, y);
                if cell == self.back.get(x, y) {
                    continue;
                }
                if cursor_at != Some((x, y)) {
                    queue!(self.writer, MoveTo(x as u16, y as u16))?;
                }
                if cell.fg != last_fg {
                    queue!(self.writer, SetForegroundColor(cell.fg))?;
                    last_fg = cell.fg;
                }
                if cell.bg != last_bg {
                    queue!(self.writer, SetBackgroundColor(cell.bg))?;
                    last_bg = cell.bg;
                }
                queue!(self.writer, Print(cell.ch))?;
                cursor_at = Some((x + 1, y));
            }
        }

        self.writer.flush()
    }

    // ── Compose: level ──

    fn compose_level(&mut self, s: &LevelSession, index: usize, count: usize, fx: &mut Presentation) {
        let tiles = s.world().tiles();
        let (world_w, world_h) = (tiles.width, tiles.height);

        let max_view_h = self.term_h.saturating_sub(MAP_ROW + BOTTOM_ROWS).max(1);
        fx.camera.view_w = (self.term_w / CELL_W).min(world_w.max(1));
        fx.camera.view_h = max_view_h.min(world_h.max(1));
        if let Some(body) = s.player_body() {
            let target = (cell_of(body.center_x()), cell_of(body.bottom() - 1.0));
            fx.camera.follow(target, world_w, world_h);
        }
        let (dx, dy) = fx.shake_offset(&mut rand::thread_rng());
        let cam_x = fx.camera.x + dx;
        let cam_y = fx.camera.y + dy;
        let (view_w, view_h) = (fx.camera.view_w, fx.camera.view_h);

        // ── HUD row ──
        let total = s.total_collectibles();
        let collected = total.saturating_sub(s.remaining() as usize);
        let status = if s.exit_activated() { "EXIT OPEN" } else { "" };
        let hud = format!(
            " Ledge {}/{}  {}  ◆ {}/{}  {}  Try {} ",
            index + 1, count, s.level_config().name, collected, total, status, s.attempt(),
        );
        self.front.fill_row(HUD_ROW, HUD_BG);
        self.front.put_str(0, HUD_ROW, &hud, Color::White, HUD_BG);

        // ── Map (camera viewport) ──
        let layers = &s.level_config().parallax;
        for vy in 0..view_h {
            let row = MAP_ROW + vy;
            let wy = cam_y + vy as i32;
            for vx in 0..view_w {
                let col = vx * CELL_W;
                if col + 1 >= self.front.width {
                    break;
                }
                let wx = cam_x + vx as i32;
                let in_world = wx >= 0 && wy >= 0 && (wx as usize) < world_w && (wy as usize) < world_h;
                let (c0, c1, fg, bg) = if !in_world {
                    (' ', ' ', Color::Reset, Color::Reset)
                } else {
                    match tiles.at(wx, wy) {
                        Tile::Solid => ('█', '█', Color::Rgb { r: 120, g: 120, b: 130 }, Color::Rgb { r: 70, g: 70, b: 80 }),
                        Tile::Platform => ('═', '═', Color::Rgb { r: 190, g: 140, b: 80 }, Color::Reset),
                        Tile::Empty => match background(layers, cam_x, wx, wy, world_h) {
                            Some((ch, fg)) => (ch, ' ', fg, Color::Reset),
                            None => (' ', ' ', Color::Reset, Color::Reset),
                        },
                    }
                };
                self.front.set(col, row, Cell::new(c0, fg, bg));
                self.front.set(col + 1, row, Cell::new(c1, fg, bg));
            }
        }

        let to_screen = |wx: i32, wy: i32| -> Option<(usize, usize)> {
            let vx = wx - cam_x;
            let vy = wy - cam_y;
            if vx < 0 || vy < 0 || vx as usize >= view_w || vy as usize >= view_h {
                return None;
            }
            Some((vx as usize * CELL_W, MAP_ROW + vy as usize))
        };

        // ── Particles ──
        for p in fx.particles() {
            if let Some((col, row)) = to_screen(cell_of(p.x), cell_of(p.y)) {
                let bg = self.front.get(col, row).bg;
                self.front.set(col, row, Cell::new('∙', Color::Rgb { r: 200, g: 190, b: 160 }, bg));
            }
        }

        // ── Entities: pickups and exit first, player on top ──
        let mut views: Vec<EntityView> = s.entities().collect();
        views.sort_by_key(|v| draw_order(v.body.kind));
        for v in views {
            let look = fx.entity(v.id);
            if !look.visible {
                continue;
            }
            let Some((col, row)) = to_screen(cell_of(v.body.center_x()), cell_of(v.body.bottom() - 1.0)) else {
                continue;
            };
            let base = look.tint.map(rgb_color).unwrap_or_else(|| kind_color(v.body.kind));
            let fg = blend(base, fx.alpha(v.id));
            let glyph = entity_glyph(v.body.kind, v.anim, v.frame, look.facing);
            for (i, ch) in glyph.into_iter().enumerate() {
                if ch == ' ' {
                    continue;
                }
                let bg = self.front.get(col + i, row).bg;
                self.front.set(col + i, row, Cell::new(ch, fg, bg));
            }
        }

        // ── Message bar ──
        let msg_row = MAP_ROW + view_h;
        if let Some(msg) = fx.message() {
            if msg_row < self.front.height {
                self.front.fill_row(msg_row, MSG_BG);
                self.front.put_str(0, msg_row, &format!(" ◈ {msg} "), Color::Black, MSG_BG);
            }
        }

        // ── Help bar ──
        let help_row = msg_row + 1;
        if help_row < self.front.height {
            let help = " ←→/AD:Run  ↑/W/Space:Jump  R:Restart  Esc:Quit  │  Mouse: ◄ ► ▲";
            self.front.put_str(0, help_row, help, Color::DarkGrey, Color::Reset);
        }
    }

    fn compose_touch(&mut self, layout: &TouchLayout, held: Option<TouchControl>) {
        for (rect, control) in layout.buttons() {
            let label = match control {
                TouchControl::Left => '◄',
                TouchControl::Right => '►',
                TouchControl::Jump => '▲',
            };
            let (fg, bg) = if held == Some(control) {
                (Color::Black, Color::Rgb { r: 100, g: 200, b: 255 })
            } else {
                (Color::Rgb { r: 100, g: 200, b: 255 }, Color::Reset)
            };
            self.compose_button(rect, label, fg, bg);
        }
    }

    fn compose_button(&mut self, r: Rect, label: char, fg: Color, bg: Color) {
        if r.w < 2 || r.h < 2 {
            return;
        }
        let bar = "─".repeat(r.w - 2);
        self.front.put_str(r.x, r.y, &format!("┌{bar}┐"), fg, bg);
        for y in r.y + 1..r.y + r.h - 1 {
            self.front.put_str(r.x, y, &format!("│{}│", " ".repeat(r.w - 2)), fg, bg);
        }
        self.front.put_str(r.x, r.y + r.h - 1, &format!("└{bar}┘"), fg, bg);
        self.front.set(r.x + r.w / 2, r.y + r.h / 2, Cell::new(label, fg, bg));
    }

    // ── Overlays and static screens ──

    fn compose_completed_overlay(&mut self, fx: &Presentation, has_next: bool) {
        let view_cols = fx.camera.view_w * CELL_W;
        let x = view_cols.saturating_sub(30) / 2;
        let y = MAP_ROW + fx.camera.view_h.saturating_sub(5) / 2;
        let hint = if has_next { "▸ N / ENTER: Next ledge" } else { "▸ N / ENTER: Finish" };
        self.front.put_box(x, y, &["★ LEDGE CLEARED! ★", "", hint], GOLD, Color::Rgb { r: 40, g: 40, b: 40 });
    }

    fn compose_finished(&mut self, levels: usize) {
        self.front.put_box(4, 3, &["★ EVERY LEDGE CLEARED! ★"], GOLD, Color::Reset);
        let cleared = format!("◈ {levels} ledges hopped");
        self.front.put_str(6, 8, &cleared, Color::White, Color::Reset);
        self.front.put_str(6, 10, "▸ ESC: Quit", GREEN, Color::Reset);
    }
}

// ══════════════════════════════════════════════════════════════
// Glyphs and colors
// ══════════════════════════════════════════════════════════════

fn cell_of(px: f32) -> i32 {
    (px / TILE_SIZE).floor() as i32
}

fn draw_order(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::ExitMarker => 0,
        EntityKind::Collectible => 1,
        EntityKind::Enemy => 2,
        EntityKind::Player => 3,
    }
}

fn kind_color(kind: EntityKind) -> Color {
    match kind {
        EntityKind::Player => Color::Rgb { r: 80, g: 220, b: 255 },
        EntityKind::Enemy => Color::Rgb { r: 255, g: 110, b: 90 },
        EntityKind::Collectible => GOLD,
        EntityKind::ExitMarker => GREEN,
    }
}

fn rgb_color(rgb: u32) -> Color {
    Color::Rgb { r: (rgb >> 16) as u8, g: (rgb >> 8) as u8, b: rgb as u8 }
}

/// Fade a color toward the base background; alpha 1 is the color itself.
fn blend(color: Color, alpha: f32) -> Color {
    let Color::Rgb { r, g, b } = color else { return color };
    let a = alpha.clamp(0.0, 1.0);
    let (br, bg, bb) = Cell::BASE_RGB;
    let mix = |c: u8, base: u8| (base as f32 + (c as f32 - base as f32) * a).round() as u8;
    Color::Rgb { r: mix(r, br), g: mix(g, bg), b: mix(b, bb) }
}

/// Two columns for one entity. Directional glyphs are mirrored for facing.
fn entity_glyph(kind: EntityKind, anim: Option<AnimKey>, frame: u32, facing: Facing) -> [char; 2] {
    match kind {
        EntityKind::Player => {
            let accent = match anim {
                Some(AnimKey::Run) if frame % 4 < 2 => '»',
                Some(AnimKey::Run) => '>',
                Some(AnimKey::Rising) => '↑',
                Some(AnimKey::Falling) => '↓',
                Some(AnimKey::WallSlide) => '‖',
                Some(AnimKey::DoubleJump) => ['|', '/', '─', '\\'][frame as usize % 4],
                _ => '·',
            };
            match facing {
                Facing::Right => ['@', accent],
                Facing::Left => [mirror(accent), '@'],
            }
        }
        EntityKind::Enemy => {
            let foot = match anim {
                Some(AnimKey::EnemyRun) if frame % 2 == 0 => '▸',
                Some(AnimKey::EnemyRun) => '▹',
                _ => '■',
            };
            match facing {
                Facing::Right => ['■', foot],
                Facing::Left => [mirror(foot), '■'],
            }
        }
        EntityKind::Collectible => match anim {
            Some(AnimKey::Collected) => match frame {
                0..=2 => ['✦', '✦'],
                3..=4 => ['*', '*'],
                _ => ['·', '·'],
            },
            _ if (frame / 4) % 2 == 0 => ['◆', ' '],
            _ => [' ', '◆'],
        },
        EntityKind::ExitMarker => {
            if frame % 8 < 4 { ['▐', '▌'] } else { ['[', ']'] }
        }
    }
}

fn mirror(ch: char) -> char {
    match ch {
        '>' => '<',
        '»' => '«',
        '▸' => '◂',
        '▹' => '◃',
        '/' => '\\',
        '\\' => '/',
        other => other,
    }
}

/// Background glyph for an empty cell, from the first layer that has one.
/// Layers scroll at `speed` times the camera, so slow layers drift behind.
fn background(layers: &[ParallaxLayer], cam_x: i32, wx: i32, wy: i32, world_h: usize) -> Option<(char, Color)> {
    layers.iter().enumerate().find_map(|(i, layer)| {
        let bx = wx - (cam_x as f32 * (1.0 - layer.speed)).round() as i32;
        let lower = wy as usize * 2 >= world_h;
        let roll = scatter(bx, wy, i as u32);
        let (ch, upper_band, density) = match layer.name.to_lowercase().as_str() {
            "clouds" => ('~', true, 9),
            "hills" => ('^', false, 7),
            "rocks" => ('▪', false, 11),
            "trees" => ('♣', false, 8),
            _ => ('.', true, 13),
        };
        (upper_band != lower && roll % density == 0)
            .then_some((ch, Color::Rgb { r: 60, g: 60, b: 85 }))
    })
}

/// Cheap integer hash for stable background scatter.
fn scatter(x: i32, y: i32, salt: u32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x9e37_79b1) ^ (y as u32).wrapping_mul(0x85eb_ca77) ^ salt;
    h ^= h >> 15;
    h = h.wrapping_mul(0x2c1b_3c6d);
    h ^ (h >> 12)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_glyph_mirrors_with_facing() {
        assert_eq!(entity_glyph(EntityKind::Player, Some(AnimKey::Run), 0, Facing::Right), ['@', '»']);
        assert_eq!(entity_glyph(EntityKind::Player, Some(AnimKey::Run), 0, Facing::Left), ['«', '@']);
        assert_eq!(entity_glyph(EntityKind::Player, Some(AnimKey::Falling), 0, Facing::Left), ['↓', '@']);
    }

    #[test]
    fn collected_item_shrinks() {
        let g = |f| entity_glyph(EntityKind::Collectible, Some(AnimKey::Collected), f, Facing::Right);
        assert_eq!(g(0), ['✦', '✦']);
        assert_eq!(g(6), ['·', '·']);
    }

    #[test]
    fn blend_fades_to_background() {
        let c = Color::Rgb { r: 255, g: 255, b: 255 };
        assert_eq!(blend(c, 1.0), c);
        assert_eq!(blend(c, 0.0), Cell::BASE_BG);
        assert_eq!(blend(Color::White, 0.3), Color::White);
    }

    #[test]
    fn tint_unpacks_rgb() {
        assert_eq!(rgb_color(0xff3030), Color::Rgb { r: 255, g: 48, b: 48 });
    }

    #[test]
    fn box_fits_longest_line() {
        let mut fb = FrameBuffer::new(20, 5);
        fb.put_box(0, 0, &["ab", "abcd"], Color::White, Color::Reset);
        assert_eq!(fb.get(0, 0).ch, '╔');
        assert_eq!(fb.get(7, 0).ch, '╗');
        assert_eq!(fb.get(7, 1).ch, '║');
        assert_eq!(fb.get(2, 2).ch, 'a');
        assert_eq!(fb.get(7, 3).ch, '╝');
    }
}
