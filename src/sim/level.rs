/// Level loader.
///
/// ## Sources (priority order):
///   1. `levels/` directory (individual `.txt` files, sorted by file name)
///   2. Built-in embedded levels
///
/// ## Level format (`.txt`):
///   ```
///   # Level Name
///   @music theme
///   @parallax Clouds 0.3
///   @gravity 1.0
///   @speed 160
///   @enemy_speed 50
///   <map rows>
///   ```
///
/// The name line starts with `#` and contains a lowercase letter, which
/// keeps it apart from map rows (walls are `#`, spawns are capitals).
/// Directives start with `@` and may appear in any order before the map.
///
/// ## Tile legend:
///   '#' = Solid ground            '=' = One-way platform
///   'P' = Player spawn            '*' = Collectible
///   'E' = Enemy spawn             'F' = Exit marker
///   '%' = Excluded collectible (authoring marker, never spawned)
///   ' ' = Empty

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::domain::body::Vec2;
use crate::domain::tile::{Tile, TileMap, TILE_SIZE};
use crate::error::LevelError;
use crate::sim::session::LevelSession;

/// Player spawn used when a map has no `P`.
pub const FALLBACK_SPAWN: Vec2 = Vec2::new(100.0, 300.0);

/// One background layer scrolling at `speed` times the camera.
#[derive(Clone, Debug, PartialEq)]
pub struct ParallaxLayer {
    pub name: String,
    pub speed: f32,
}

/// Static per-level parameters, read-only once the level is built.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelConfig {
    pub name: String,
    pub spawn: Vec2,
    pub gravity_scale: f32,
    /// Overrides the configured run speed when set.
    pub run_speed: Option<f32>,
    pub enemy_speed: Option<f32>,
    pub music: Option<String>,
    pub parallax: Vec<ParallaxLayer>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        LevelConfig {
            name: "Unnamed Ledge".to_string(),
            spawn: FALLBACK_SPAWN,
            gravity_scale: 1.0,
            run_speed: None,
            enemy_speed: None,
            music: None,
            parallax: vec![],
        }
    }
}

/// Level as read from text: config plus raw map rows.
#[derive(Clone, Debug)]
pub struct LevelDef {
    pub config: LevelConfig,
    pub rows: Vec<String>,
}

/// Everything a session needs to spawn a level. Positions are the top-left
/// corner of the tile cell the marker sits in.
#[derive(Clone, Debug)]
pub struct LevelData {
    pub config: LevelConfig,
    pub tiles: TileMap,
    pub collectibles: Vec<Vec2>,
    pub enemies: Vec<Vec2>,
    pub exit: Option<Vec2>,
    /// Authoring-excluded collectible markers that were skipped.
    pub excluded: usize,
}

/// Extra behavior attached to a level by name.
#[derive(Clone, Copy, Default)]
pub struct LevelHooks {
    /// Runs after every (re)initialization of the session.
    pub on_loaded: Option<fn(&mut LevelSession)>,
}

// ══════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════

/// Levels for this run: the configured directory if it has any, else the
/// built-in set.
pub fn level_set(config: &GameConfig) -> Vec<LevelDef> {
    match load_from_directory(&config.levels_dir) {
        Ok(levels) => {
            info!(count = levels.len(), dir = %config.levels_dir.display(), "loaded level files");
            levels
        }
        Err(e) => {
            debug!("{e}; using built-in levels");
            embedded_levels()
        }
    }
}

/// Hooks registered for a level name.
pub fn hooks_for(name: &str) -> LevelHooks {
    match name {
        "Ledge 1 - First Steps" => LevelHooks { on_loaded: Some(show_controls) },
        "Ledge 3 - Bare Orchard" => LevelHooks { on_loaded: Some(warn_bare_orchard) },
        _ => LevelHooks::default(),
    }
}

fn show_controls(session: &mut LevelSession) {
    session.post_message("Arrows move, Space jumps. Jump again in the air, or off a wall.");
}

fn warn_bare_orchard(session: &mut LevelSession) {
    session.post_message("No fruit left here. Mind the guards on the way out.");
}

impl LevelDef {
    /// Turn the map rows into tiles and spawn lists.
    pub fn build(&self) -> LevelData {
        let height = self.rows.len();
        let width = self.rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
        let mut tiles = vec![vec![Tile::Empty; width]; height];
        let mut spawn = None;
        let mut collectibles = vec![];
        let mut enemies = vec![];
        let mut exit = None;
        let mut excluded = 0;

        for (y, row) in self.rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let cell = Vec2::new(x as f32 * TILE_SIZE, y as f32 * TILE_SIZE);
                match ch {
                    '#' => tiles[y][x] = Tile::Solid,
                    '=' => tiles[y][x] = Tile::Platform,
                    '*' => collectibles.push(cell),
                    '%' => excluded += 1,
                    'E' => enemies.push(cell),
                    'P' => {
                        if spawn.is_some() {
                            warn!(level = %self.config.name, x, y, "extra player spawn ignored");
                        } else {
                            spawn = Some(cell);
                        }
                    }
                    'F' => {
                        if exit.is_some() {
                            warn!(level = %self.config.name, x, y, "extra exit ignored");
                        } else {
                            exit = Some(cell);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut config = self.config.clone();
        match spawn {
            Some(cell) => config.spawn = cell,
            None => {
                warn!(level = %config.name, "no player spawn; using fallback");
                config.spawn = FALLBACK_SPAWN;
            }
        }
        if exit.is_none() {
            warn!(level = %config.name, "no exit marker; level cannot be completed");
        }

        LevelData {
            config,
            tiles: TileMap::new(tiles),
            collectibles,
            enemies,
            exit,
            excluded,
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Single-level file parsing
// ══════════════════════════════════════════════════════════════

/// Parse a single level from text content. `fallback_name` is used when the
/// file has no name line.
pub fn parse_level(content: &str, fallback_name: &str) -> Result<LevelDef, LevelError> {
    let mut config = LevelConfig::default();
    let mut named = false;
    let mut rows: Vec<String> = vec![];

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') && !named && rows.is_empty() && is_name_line(line) {
            config.name = line[1..].trim().to_string();
            named = true;
        } else if let Some(directive) = line.strip_prefix('@') {
            apply_directive(&mut config, directive);
        } else {
            rows.push(line.to_string());
        }
    }

    if !named {
        config.name = fallback_name.to_string();
    }

    while rows.last().map_or(false, |r| r.trim().is_empty()) {
        rows.pop();
    }
    if rows.is_empty() {
        return Err(LevelError::Empty { name: config.name });
    }

    let max_width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0);
    for row in &mut rows {
        let len = row.chars().count();
        if len < max_width {
            row.extend(std::iter::repeat(' ').take(max_width - len));
        }
    }

    Ok(LevelDef { config, rows })
}

/// Distinguish `# Level name` from `########` (level data).
/// Map rows never contain lowercase letters.
fn is_name_line(line: &str) -> bool {
    line[1..].chars().any(|c| c.is_lowercase())
}

fn apply_directive(config: &mut LevelConfig, directive: &str) {
    let mut parts = directive.split_whitespace();
    let key = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();
    let number = |i: usize| args.get(i).and_then(|s| s.parse::<f32>().ok());

    match (key, args.len()) {
        ("music", 1) => config.music = Some(args[0].to_string()),
        ("parallax", 2) => match number(1) {
            Some(speed) => config.parallax.push(ParallaxLayer { name: args[0].to_string(), speed }),
            None => warn!(directive, "bad parallax speed"),
        },
        ("gravity", 1) => match number(0) {
            Some(scale) if scale >= 0.0 => config.gravity_scale = scale,
            _ => warn!(directive, "bad gravity scale"),
        },
        ("speed", 1) => match number(0) {
            Some(v) if v > 0.0 => config.run_speed = Some(v),
            _ => warn!(directive, "bad run speed"),
        },
        ("enemy_speed", 1) => match number(0) {
            Some(v) if v >= 0.0 => config.enemy_speed = Some(v),
            _ => warn!(directive, "bad enemy speed"),
        },
        _ => warn!(directive, "unknown level directive ignored"),
    }
}

// ══════════════════════════════════════════════════════════════
// Directory loading (individual .txt files)
// ══════════════════════════════════════════════════════════════

pub fn load_from_directory(dir: &Path) -> Result<Vec<LevelDef>, LevelError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| LevelError::Read { path: dir.to_path_buf(), source })?;

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |e| e == "txt"))
        .collect();
    paths.sort();

    let mut levels = vec![];
    for path in paths {
        match read_level_file(&path) {
            Ok(def) => levels.push(def),
            Err(e) => warn!("{e}; skipping"),
        }
    }

    if levels.is_empty() {
        return Err(LevelError::NoLevels { dir: dir.to_path_buf() });
    }
    Ok(levels)
}

fn read_level_file(path: &Path) -> Result<LevelDef, LevelError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| LevelError::Read { path: path.to_path_buf(), source })?;
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    parse_level(&content, &stem)
}

// ══════════════════════════════════════════════════════════════
// Embedded fallback levels
// ══════════════════════════════════════════════════════════════

const EMBEDDED: &[&str] = &[
    "# Ledge 1 - First Steps
@music meadow
@parallax Hills 0.2
@parallax Clouds 0.5
########################################
#                                      #
#                                      #
#                    *                 #
#                  =====           F   #
#         *                     ####   #
#       =====          *               #
#                   #######            #
#   *                            *     #
#  ====      E                 =====   #
#         #######                      #
# P    *                 E        *    #
########################################",
    "# Ledge 2 - Chimney
@music caves
@parallax Rocks 0.3
@gravity 1.1
########################################
#                 #  F #               #
#                 # ####               #
#       *         #    #        *      #
#     =====       #    #      =====    #
#                 #*   #               #
#                 #    #               #
#          E      #   *#      E        #
#     #########   #    #   ########    #
#                 #*   #               #
#  *              #    #            *  #
# ===                 *#           === #
# P        *                E          #
########################################",
    "# Ledge 3 - Bare Orchard
@music dusk
@parallax Trees 0.4
@enemy_speed 70
########################################
#                                      #
#    %                          %      #
#  =====                      =====    #
#                                      #
#            E          E              #
#         ##################           #
#                                      #
#   %                              F   #
#  ===        E          E       ====  #
#          ###################         #
# P                                    #
########################################",
];

pub fn embedded_levels() -> Vec<LevelDef> {
    EMBEDDED.iter()
        .enumerate()
        .filter_map(|(i, text)| match parse_level(text, &format!("Ledge {}", i + 1)) {
            Ok(def) => Some(def),
            Err(e) => {
                warn!("{e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_directives_and_rows() {
        let def = parse_level(
            "# Test run\n@music theme\n@parallax Clouds 0.3\n@gravity 0.5\n@speed 200\n####\n#P*#\n####\n",
            "fallback",
        ).unwrap();
        assert_eq!(def.config.name, "Test run");
        assert_eq!(def.config.music.as_deref(), Some("theme"));
        assert_eq!(def.config.parallax, vec![ParallaxLayer { name: "Clouds".into(), speed: 0.3 }]);
        assert_eq!(def.config.gravity_scale, 0.5);
        assert_eq!(def.config.run_speed, Some(200.0));
        assert_eq!(def.rows.len(), 3);
    }

    #[test]
    fn wall_row_is_not_a_name() {
        let def = parse_level("########\n#P    F#\n########", "file_stem").unwrap();
        assert_eq!(def.config.name, "file_stem");
        assert_eq!(def.rows.len(), 3);
    }

    #[test]
    fn empty_map_is_rejected() {
        let err = parse_level("# Nothing here\n@music x\n\n", "x").unwrap_err();
        assert!(matches!(err, LevelError::Empty { ref name } if name == "Nothing here"));
    }

    #[test]
    fn bad_directive_keeps_default() {
        let def = parse_level("# Odd one\n@gravity lots\n@wind 3\n#P#", "x").unwrap();
        assert_eq!(def.config.gravity_scale, 1.0);
    }

    #[test]
    fn build_collects_spawns() {
        let def = parse_level("# Spawns\n      \n P*%EF\n======\n", "x").unwrap();
        let data = def.build();
        assert_eq!(data.config.spawn, Vec2::new(16.0, 16.0));
        assert_eq!(data.collectibles, vec![Vec2::new(32.0, 16.0)]);
        assert_eq!(data.excluded, 1);
        assert_eq!(data.enemies, vec![Vec2::new(64.0, 16.0)]);
        assert_eq!(data.exit, Some(Vec2::new(80.0, 16.0)));
        assert_eq!(data.tiles.at(0, 2), Tile::Platform);
        assert_eq!(data.tiles.at(0, 1), Tile::Empty);
    }

    #[test]
    fn missing_spawn_and_exit_fall_back() {
        let def = parse_level("# Bare\n#  #\n####", "x").unwrap();
        let data = def.build();
        assert_eq!(data.config.spawn, FALLBACK_SPAWN);
        assert_eq!(data.exit, None);
    }

    #[test]
    fn short_rows_are_padded() {
        let def = parse_level("# Ragged\n##\n#####\n", "x").unwrap();
        assert!(def.rows.iter().all(|r| r.len() == 5));
    }

    #[test]
    fn embedded_levels_are_complete() {
        let levels = embedded_levels();
        assert_eq!(levels.len(), 3);
        for def in &levels {
            let data = def.build();
            assert!(data.exit.is_some(), "{} has no exit", def.config.name);
            assert_ne!(data.config.spawn, FALLBACK_SPAWN);
        }
        // The orchard only has excluded fruit
        let orchard = levels[2].build();
        assert!(orchard.collectibles.is_empty());
        assert_eq!(orchard.excluded, 3);
    }

    #[test]
    fn hooks_found_by_name() {
        assert!(hooks_for("Ledge 1 - First Steps").on_loaded.is_some());
        assert!(hooks_for("somewhere else").on_loaded.is_none());
    }
}
