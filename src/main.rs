/// Entry point and game loop.

mod config;
mod domain;
mod error;
mod sim;
mod ui;

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossterm::event::KeyCode;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::GameConfig;
use domain::input::{InputSnapshot, InputSource};
use sim::event::GameEvent;
use sim::level::{self, LevelDef};
use sim::session::{LevelSession, SessionPhase};
use sim::step;
use ui::fx::Presentation;
use ui::gamepad::Gamepad;
use ui::input::InputState;
use ui::renderer::{Renderer, Screen};
use ui::sound::SoundEngine;
use ui::touch::TouchPad;

const FRAME_SLEEP: Duration = Duration::from_millis(5);
/// Longest frame fed to the session after a stall.
const MAX_FRAME_MS: u64 = 100;

const QUIT_KEYS: &[KeyCode] = &[KeyCode::Esc];
const RESTART_KEYS: &[KeyCode] = &[KeyCode::Char('r'), KeyCode::Char('R')];
const NEXT_KEYS: &[KeyCode] = &[KeyCode::Char('n'), KeyCode::Char('N'), KeyCode::Enter];

fn main() {
    let (config, config_err) = GameConfig::load();
    init_tracing(&config.log_file);
    info!("=== Ledgehop startup ===");
    match (&config_err, &config.source) {
        (Some(e), _) => warn!("{e}; using default settings"),
        (None, Some(path)) => info!(path = %path.display(), "loaded config"),
        (None, None) => info!("no config.toml found; using default settings"),
    }

    let levels = level::level_set(&config);
    let mut renderer = Renderer::new();

    let enhanced_keys = match renderer.init() {
        Ok(enhanced) => enhanced,
        Err(e) => {
            eprintln!("Terminal init failed: {e}");
            return;
        }
    };

    let sound = SoundEngine::new();
    if sound.is_none() {
        warn!("no audio output device; playing silently");
    }

    let result = game_loop(&levels, &mut renderer, sound, &config, enhanced_keys);

    if let Err(e) = renderer.cleanup() {
        eprintln!("Terminal cleanup failed: {e}");
    }

    if let Err(e) = result {
        eprintln!("Game error: {e}");
    }

    println!();
    println!("Thanks for playing Ledgehop!");
}

/// Log to a file; the terminal belongs to the renderer. If the file can't be
/// created the game runs without logging.
fn init_tracing(log_file: &Path) {
    let Ok(file) = File::create(log_file) else { return };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .compact()
        .init();
}

/// Keyboard, gamepad and touch merged into one source for the session.
///
/// Jump presses arrive between ticks, so they latch here and clear only when
/// the session actually reads input.
struct HostInput<'a> {
    held: InputSnapshot,
    jump: &'a mut bool,
    touch: &'a mut TouchPad,
}

impl InputSource for HostInput<'_> {
    fn snapshot(&mut self) -> InputSnapshot {
        let mut snapshot = self.held.merge(self.touch.snapshot());
        snapshot.jump |= std::mem::take(self.jump);
        snapshot
    }
}

fn start_level(levels: &[LevelDef], index: usize, config: &GameConfig) -> LevelSession {
    let def = levels[index].clone();
    let hooks = level::hooks_for(&def.config.name);
    let session = LevelSession::new(def, hooks, config);
    info!(
        index,
        level = %session.level_config().name,
        collectibles = session.total_collectibles(),
        has_exit = session.exit_id().is_some(),
        "entering level"
    );
    session
}

fn game_loop(
    levels: &[LevelDef],
    renderer: &mut Renderer,
    mut sound: Option<SoundEngine>,
    config: &GameConfig,
    enhanced_keys: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if levels.is_empty() {
        warn!("no levels to play");
        return Ok(());
    }

    let mut kb = InputState::new();
    kb.honor_release = enhanced_keys;
    let mut gp = Gamepad::new(&config.gamepad);
    let (tw, th) = crossterm::terminal::size().unwrap_or((80, 24));
    let mut touch = TouchPad::new(tw as usize, th as usize);
    let mut fx = Presentation::new();
    let mut rng = StdRng::from_entropy();
    info!(levels = levels.len(), gamepad = gp.connected, "game loop started");

    let mut index = 0;
    let mut session = start_level(levels, index, config);
    let startup = session.take_pending();
    dispatch(&startup, &session, &mut fx, sound.as_mut(), &mut rng);
    let mut finished = false;
    let mut jump_latch = false;
    let tick_rate = Duration::from_millis(config.tick_rate_ms);
    let mut last_tick = Instant::now();

    loop {
        kb.drain_events();
        gp.update();

        if kb.ctrl_c_pressed() || kb.any_pressed(QUIT_KEYS) || gp.cancel_pressed() {
            break;
        }
        if kb.resized {
            let (tw, th) = crossterm::terminal::size().unwrap_or((80, 24));
            touch.resize(tw as usize, th as usize);
        }
        for m in &kb.mouse_events {
            touch.handle(m);
        }

        if finished {
            renderer.render(Screen::Finished { levels: levels.len() }, &mut fx, touch.layout(), None)?;
            std::thread::sleep(FRAME_SLEEP);
            continue;
        }

        let keys = kb.intents();
        let pad = gp.intents();
        jump_latch |= keys.jump || pad.jump;

        // ── Meta keys ──
        let mut reload = false;
        if kb.any_pressed(RESTART_KEYS) || gp.restart_pressed() {
            info!(level = %session.level_config().name, "manual restart");
            reload = true;
        } else if session.phase() == SessionPhase::Completed
            && (kb.any_pressed(NEXT_KEYS) || gp.confirm_pressed())
        {
            index += 1;
            if index >= levels.len() {
                info!("all levels cleared");
                finished = true;
                if let Some(s) = sound.as_mut() {
                    s.stop_music();
                }
                continue;
            }
            reload = true;
        }
        if reload {
            session = start_level(levels, index, config);
            fx.reset();
            touch.reset();
            jump_latch = false;
            let startup = session.take_pending();
            dispatch(&startup, &session, &mut fx, sound.as_mut(), &mut rng);
        }

        if last_tick.elapsed() >= tick_rate {
            let dt_ms = (last_tick.elapsed().as_millis() as u64).min(MAX_FRAME_MS);
            last_tick = Instant::now();

            let mut input = HostInput {
                held: InputSnapshot { jump: false, ..keys.merge(pad) },
                jump: &mut jump_latch,
                touch: &mut touch,
            };
            let events = step::step(&mut session, &mut input, dt_ms);
            drop_stale_jump(&mut jump_latch, &events);
            fx.tick(dt_ms);
            dispatch(&events, &session, &mut fx, sound.as_mut(), &mut rng);
        }

        renderer.render(
            Screen::Level { session: &session, index, count: levels.len() },
            &mut fx,
            touch.layout(),
            touch.held(),
        )?;
        std::thread::sleep(FRAME_SLEEP);
    }

    Ok(())
}

/// Jump presses made during the failure delay belong to the old attempt.
fn drop_stale_jump(latch: &mut bool, events: &[GameEvent]) {
    if events.contains(&GameEvent::LevelRestarted) {
        *latch = false;
    }
}

/// Hand one step's events to the presentation and the sound engine.
fn dispatch(
    events: &[GameEvent],
    session: &LevelSession,
    fx: &mut Presentation,
    mut sound: Option<&mut SoundEngine>,
    rng: &mut StdRng,
) {
    for event in events {
        fx.apply(event, session.world(), rng);
        match event {
            GameEvent::Effect(effect) => {
                if let Some(s) = sound.as_deref_mut() {
                    s.apply(effect);
                }
            }
            GameEvent::ItemCollected { remaining } => debug!(remaining, "item collected"),
            GameEvent::ExitActivated => debug!("exit open"),
            GameEvent::LevelCompleted => {
                info!(level = %session.level_config().name, attempt = session.attempt(), "level completed");
                fx.show_message("Ledge cleared!");
            }
            GameEvent::PlayerKilled => {
                info!(level = %session.level_config().name, player = ?session.player_id(), "player caught")
            }
            GameEvent::LevelRestarted => debug!("attempt rebuilt"),
            GameEvent::Message(_) => {}
        }
    }
}
