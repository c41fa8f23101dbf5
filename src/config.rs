/// External configuration loader.
///
/// Reads `config.toml` from the executable's directory (or CWD).
/// Falls back to sensible defaults if the file is missing or incomplete.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

// ── Public Config Struct ──

#[derive(Clone, Debug)]
pub struct GameConfig {
    pub tick_rate_ms: u64,
    pub player: PlayerTuning,
    pub enemy: EnemyTuning,
    pub physics: PhysicsTuning,
    pub session: SessionTuning,
    pub gamepad: GamepadConfig,
    pub levels_dir: PathBuf,
    pub log_file: PathBuf,
    /// The file these settings were read from, if any.
    pub source: Option<PathBuf>,
}

/// Player movement and effect cadence. Velocities are px/s, periods are frames.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerTuning {
    pub run_speed: f32,
    pub jump_impulse: f32,
    pub double_jump_impulse: f32,
    pub wall_jump_factor: f32,
    pub wall_slide_speed: f32,
    pub slide_sound_period: u32,
    pub slide_sound_margin: u32,
    pub dust_period: u32,
    pub step_period: u32,
    pub step_margin: u32,
    pub run_threshold: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnemyTuning {
    pub speed: f32,
    pub pause_ms: u64,
    pub probe_ahead: f32,
    pub probe_down: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhysicsTuning {
    pub gravity: f32,
    pub max_fall_speed: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionTuning {
    pub restart_delay_ms: u64,
    pub shake_ms: u64,
    pub shake_intensity: f32,
    pub exit_fade_ms: u64,
}

#[derive(Clone, Debug)]
pub struct GamepadConfig {
    pub jump: Vec<String>,
    pub confirm: Vec<String>,
    pub cancel: Vec<String>,
    pub restart: Vec<String>,
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    timing: TomlTiming,
    #[serde(default)]
    player: TomlPlayer,
    #[serde(default)]
    enemy: TomlEnemy,
    #[serde(default)]
    physics: TomlPhysics,
    #[serde(default)]
    session: TomlSession,
    #[serde(default)]
    gamepad: TomlGamepad,
    #[serde(default)]
    general: TomlGeneral,
}

#[derive(Deserialize, Debug)]
struct TomlTiming {
    #[serde(default = "default_tick_rate")]
    tick_rate_ms: u64,
}

#[derive(Deserialize, Debug)]
struct TomlPlayer {
    #[serde(default = "default_run_speed")]
    run_speed: f32,
    #[serde(default = "default_jump_impulse")]
    jump_impulse: f32,
    #[serde(default = "default_double_jump_impulse")]
    double_jump_impulse: f32,
    #[serde(default = "default_wall_jump_factor")]
    wall_jump_factor: f32,
    #[serde(default = "default_wall_slide_speed")]
    wall_slide_speed: f32,
    #[serde(default = "default_slide_period")]
    slide_sound_period: u32,
    #[serde(default = "default_margin")]
    slide_sound_margin: u32,
    #[serde(default = "default_dust_period")]
    dust_period: u32,
    #[serde(default = "default_step_period")]
    step_period: u32,
    #[serde(default = "default_margin")]
    step_margin: u32,
    #[serde(default = "default_run_threshold")]
    run_threshold: f32,
}

#[derive(Deserialize, Debug)]
struct TomlEnemy {
    #[serde(default = "default_enemy_speed")]
    speed: f32,
    #[serde(default = "default_pause_ms")]
    pause_ms: u64,
    #[serde(default = "default_probe_ahead")]
    probe_ahead: f32,
    #[serde(default = "default_probe_down")]
    probe_down: f32,
}

#[derive(Deserialize, Debug)]
struct TomlPhysics {
    #[serde(default = "default_gravity")]
    gravity: f32,
    #[serde(default = "default_max_fall")]
    max_fall_speed: f32,
}

#[derive(Deserialize, Debug)]
struct TomlSession {
    #[serde(default = "default_restart_delay")]
    restart_delay_ms: u64,
    #[serde(default = "default_shake_ms")]
    shake_ms: u64,
    #[serde(default = "default_shake_intensity")]
    shake_intensity: f32,
    #[serde(default = "default_exit_fade")]
    exit_fade_ms: u64,
}

#[derive(Deserialize, Debug)]
struct TomlGamepad {
    #[serde(default = "default_jump_buttons")]
    jump: Vec<String>,
    #[serde(default = "default_confirm")]
    confirm: Vec<String>,
    #[serde(default = "default_cancel")]
    cancel: Vec<String>,
    #[serde(default = "default_restart")]
    restart: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct TomlGeneral {
    #[serde(default = "default_levels_dir")]
    levels_dir: String,
    #[serde(default = "default_log_file")]
    log_file: String,
}

// ── Defaults ──

fn default_tick_rate() -> u64 { 16 }
fn default_run_speed() -> f32 { 160.0 }
fn default_jump_impulse() -> f32 { -260.0 }
fn default_double_jump_impulse() -> f32 { -230.0 }
fn default_wall_jump_factor() -> f32 { 1.5 }
fn default_wall_slide_speed() -> f32 { 50.0 }
fn default_slide_period() -> u32 { 15 }
fn default_margin() -> u32 { 5 }
fn default_dust_period() -> u32 { 6 }
fn default_step_period() -> u32 { 20 }
fn default_run_threshold() -> f32 { 10.0 }
fn default_enemy_speed() -> f32 { 50.0 }
fn default_pause_ms() -> u64 { 2000 }
fn default_probe_ahead() -> f32 { 2.0 }
fn default_probe_down() -> f32 { 4.0 }
fn default_gravity() -> f32 { 600.0 }
fn default_max_fall() -> f32 { 400.0 }
fn default_restart_delay() -> u64 { 500 }
fn default_shake_ms() -> u64 { 250 }
fn default_shake_intensity() -> f32 { 0.01 }
fn default_exit_fade() -> u64 { 500 }

fn default_jump_buttons() -> Vec<String> { vec!["A".into(), "B".into()] }
fn default_confirm() -> Vec<String> { vec!["Start".into()] }
fn default_cancel() -> Vec<String> { vec!["Select".into()] }
fn default_restart() -> Vec<String> { vec!["Y".into()] }
fn default_levels_dir() -> String { "levels".into() }
fn default_log_file() -> String { "ledgehop.log".into() }

impl Default for TomlTiming {
    fn default() -> Self {
        TomlTiming { tick_rate_ms: default_tick_rate() }
    }
}

impl Default for TomlPlayer {
    fn default() -> Self {
        TomlPlayer {
            run_speed: default_run_speed(),
            jump_impulse: default_jump_impulse(),
            double_jump_impulse: default_double_jump_impulse(),
            wall_jump_factor: default_wall_jump_factor(),
            wall_slide_speed: default_wall_slide_speed(),
            slide_sound_period: default_slide_period(),
            slide_sound_margin: default_margin(),
            dust_period: default_dust_period(),
            step_period: default_step_period(),
            step_margin: default_margin(),
            run_threshold: default_run_threshold(),
        }
    }
}

impl Default for TomlEnemy {
    fn default() -> Self {
        TomlEnemy {
            speed: default_enemy_speed(),
            pause_ms: default_pause_ms(),
            probe_ahead: default_probe_ahead(),
            probe_down: default_probe_down(),
        }
    }
}

impl Default for TomlPhysics {
    fn default() -> Self {
        TomlPhysics {
            gravity: default_gravity(),
            max_fall_speed: default_max_fall(),
        }
    }
}

impl Default for TomlSession {
    fn default() -> Self {
        TomlSession {
            restart_delay_ms: default_restart_delay(),
            shake_ms: default_shake_ms(),
            shake_intensity: default_shake_intensity(),
            exit_fade_ms: default_exit_fade(),
        }
    }
}

impl Default for TomlGamepad {
    fn default() -> Self {
        TomlGamepad {
            jump: default_jump_buttons(),
            confirm: default_confirm(),
            cancel: default_cancel(),
            restart: default_restart(),
        }
    }
}

impl Default for TomlGeneral {
    fn default() -> Self {
        TomlGeneral {
            levels_dir: default_levels_dir(),
            log_file: default_log_file(),
        }
    }
}

// ── Conversion ──

impl From<TomlPlayer> for PlayerTuning {
    fn from(t: TomlPlayer) -> Self {
        PlayerTuning {
            run_speed: t.run_speed,
            jump_impulse: t.jump_impulse,
            double_jump_impulse: t.double_jump_impulse,
            wall_jump_factor: t.wall_jump_factor,
            wall_slide_speed: t.wall_slide_speed,
            // A zero period would fire every frame and underflow the pre-load.
            slide_sound_period: t.slide_sound_period.max(1),
            slide_sound_margin: t.slide_sound_margin,
            dust_period: t.dust_period.max(1),
            step_period: t.step_period.max(1),
            step_margin: t.step_margin,
            run_threshold: t.run_threshold,
        }
    }
}

impl Default for PlayerTuning {
    fn default() -> Self { TomlPlayer::default().into() }
}

impl Default for EnemyTuning {
    fn default() -> Self {
        let t = TomlEnemy::default();
        EnemyTuning { speed: t.speed, pause_ms: t.pause_ms, probe_ahead: t.probe_ahead, probe_down: t.probe_down }
    }
}

impl Default for PhysicsTuning {
    fn default() -> Self {
        let t = TomlPhysics::default();
        PhysicsTuning { gravity: t.gravity, max_fall_speed: t.max_fall_speed }
    }
}

impl Default for SessionTuning {
    fn default() -> Self {
        let t = TomlSession::default();
        SessionTuning {
            restart_delay_ms: t.restart_delay_ms,
            shake_ms: t.shake_ms,
            shake_intensity: t.shake_intensity,
            exit_fade_ms: t.exit_fade_ms,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig::from_toml(TomlConfig::default(), &[])
    }
}

// ── Loading ──

impl GameConfig {
    /// Load config from `config.toml`.
    /// Search order: (1) exe directory, (2) current working directory, (3) XDG data home.
    /// Missing file or missing keys gracefully fall back to defaults.
    ///
    /// Runs before logging is up, so a file that fails to load is handed
    /// back alongside the defaults for the caller to report.
    pub fn load() -> (Self, Option<ConfigError>) {
        GameConfig::load_from(&candidate_dirs())
    }

    fn load_from(search_dirs: &[PathBuf]) -> (Self, Option<ConfigError>) {
        let Some(path) = find_config(search_dirs) else {
            return (GameConfig::from_toml(TomlConfig::default(), search_dirs), None);
        };
        match read_toml(&path) {
            Ok(cfg) => {
                let mut config = GameConfig::from_toml(cfg, search_dirs);
                config.source = Some(path);
                (config, None)
            }
            Err(e) => (GameConfig::from_toml(TomlConfig::default(), search_dirs), Some(e)),
        }
    }

    /// Parse a config document directly (no file lookup).
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let cfg = toml::from_str::<TomlConfig>(text)
            .map_err(|source| ConfigError::Parse { path: PathBuf::from("<inline>"), source })?;
        Ok(GameConfig::from_toml(cfg, &[]))
    }

    fn from_toml(toml_cfg: TomlConfig, search_dirs: &[PathBuf]) -> Self {
        // Resolve levels directory against the candidate dirs
        let levels_dir_str = &toml_cfg.general.levels_dir;
        let levels_dir = if Path::new(levels_dir_str).is_absolute() {
            PathBuf::from(levels_dir_str)
        } else {
            search_dirs.iter()
                .map(|d| d.join(levels_dir_str))
                .find(|p| p.is_dir())
                .unwrap_or_else(|| PathBuf::from(levels_dir_str))
        };

        let s = toml_cfg.session;
        let e = toml_cfg.enemy;
        let p = toml_cfg.physics;
        GameConfig {
            tick_rate_ms: toml_cfg.timing.tick_rate_ms.max(1),
            player: toml_cfg.player.into(),
            enemy: EnemyTuning {
                speed: e.speed,
                pause_ms: e.pause_ms,
                probe_ahead: e.probe_ahead,
                probe_down: e.probe_down,
            },
            physics: PhysicsTuning {
                gravity: p.gravity,
                max_fall_speed: p.max_fall_speed,
            },
            session: SessionTuning {
                restart_delay_ms: s.restart_delay_ms,
                shake_ms: s.shake_ms,
                shake_intensity: s.shake_intensity,
                exit_fade_ms: s.exit_fade_ms,
            },
            gamepad: GamepadConfig {
                jump: toml_cfg.gamepad.jump,
                confirm: toml_cfg.gamepad.confirm,
                cancel: toml_cfg.gamepad.cancel,
                restart: toml_cfg.gamepad.restart,
            },
            levels_dir,
            log_file: PathBuf::from(toml_cfg.general.log_file),
            source: None,
        }
    }
}

/// Candidate directories to search: exe dir + CWD + XDG data home (deduplicated).
fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![];

    if let Ok(exe) = std::env::current_exe() {
        let resolved = exe.canonicalize().unwrap_or(exe);
        if let Some(parent) = resolved.parent() {
            dirs.push(parent.to_path_buf());
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        if !dirs.iter().any(|d| d == &cwd) {
            dirs.push(cwd);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let xdg = PathBuf::from(&home).join(".local/share/ledgehop");
        if xdg.is_dir() && !dirs.iter().any(|d| d == &xdg) {
            dirs.push(xdg);
        }
    }

    if dirs.is_empty() {
        dirs.push(PathBuf::from("."));
    }

    dirs
}

fn find_config(search_dirs: &[PathBuf]) -> Option<PathBuf> {
    search_dirs.iter()
        .map(|d| d.join("config.toml"))
        .find(|p| p.exists())
}

fn read_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str::<TomlConfig>(&text)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}
