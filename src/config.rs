use crate::core::gfx::BackendType;
use crate::core::gfx::batch::{DEFAULT_BATCH_SPRITES, MAX_BATCH_SPRITES};
use crate::core::gfx::texunit::FALLBACK_TEXTURE_UNITS;
use log::{LevelFilter, info, warn};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

const CONFIG_PATH: &str = "cgdf.ini";

// --- Minimal INI reader ---
#[derive(Debug, Default)]
pub struct SimpleIni {
    sections: HashMap<String, HashMap<String, String>>,
}

impl SimpleIni {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content);
        Ok(())
    }

    pub fn parse(&mut self, content: &str) {
        self.sections.clear();
        let mut current_section: Option<String> = None;

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // Section header: [SectionName]
            if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
                let section = line[1..line.len() - 1].trim().to_string();
                current_section = Some(section.clone());
                self.sections.entry(section).or_default();
                continue;
            }

            if let Some(eq_idx) = line.find('=') {
                let (key_raw, value_raw) = line.split_at(eq_idx);
                let key = key_raw.trim();
                if key.is_empty() {
                    continue;
                }
                let value = value_raw[1..].trim().to_string();
                let section = current_section.clone().unwrap_or_default();
                self.sections
                    .entry(section)
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section).and_then(|s| s.get(key)).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(&self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::Off,
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub vsync: bool,
    pub gfx_debug: bool,
    pub display_width: u32,
    pub display_height: u32,
    pub log_level: LogLevel,
    pub video_renderer: BackendType,
    /// Sprite batch capacity, in sprites.
    pub batch_sprites: usize,
    pub texture_units_fallback: usize,
    /// Frames to render when `video_renderer` is headless.
    pub headless_frames: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vsync: true,
            gfx_debug: false,
            display_width: 1280,
            display_height: 720,
            log_level: LogLevel::Info,
            video_renderer: BackendType::OpenGL,
            batch_sprites: DEFAULT_BATCH_SPRITES,
            texture_units_fallback: FALLBACK_TEXTURE_UNITS,
            headless_frames: 120,
        }
    }
}

impl Config {
    /// Reads every key from `conf`, keeping the default for anything missing
    /// or malformed.
    pub fn from_ini(conf: &SimpleIni) -> Self {
        let default = Self::default();
        let flag = |key: &str, fallback: bool| {
            conf.get("Options", key)
                .and_then(|v| v.parse::<u8>().ok())
                .map_or(fallback, |v| v != 0)
        };

        Self {
            vsync: flag("Vsync", default.vsync),
            gfx_debug: flag("GfxDebug", default.gfx_debug),
            display_width: conf
                .get("Options", "DisplayWidth")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&w| w > 0)
                .unwrap_or(default.display_width),
            display_height: conf
                .get("Options", "DisplayHeight")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&h| h > 0)
                .unwrap_or(default.display_height),
            log_level: conf
                .get("Options", "LogLevel")
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or(default.log_level),
            video_renderer: conf
                .get("Options", "VideoRenderer")
                .and_then(|v| BackendType::from_str(&v).ok())
                .unwrap_or(default.video_renderer),
            batch_sprites: conf
                .get("Options", "BatchSprites")
                .and_then(|v| v.parse::<usize>().ok())
                .map_or(default.batch_sprites, |n| n.clamp(1, MAX_BATCH_SPRITES)),
            texture_units_fallback: conf
                .get("Options", "TextureUnitsFallback")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n >= 2)
                .unwrap_or(default.texture_units_fallback),
            headless_frames: conf
                .get("Options", "HeadlessFrames")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default.headless_frames),
        }
    }

    fn to_ini_string(&self) -> String {
        let bit = |b: bool| if b { "1" } else { "0" };
        // [Options] keys in alphabetical order
        let mut content = String::from("[Options]\n");
        content.push_str(&format!("BatchSprites={}\n", self.batch_sprites));
        content.push_str(&format!("DisplayHeight={}\n", self.display_height));
        content.push_str(&format!("DisplayWidth={}\n", self.display_width));
        content.push_str(&format!("GfxDebug={}\n", bit(self.gfx_debug)));
        content.push_str(&format!("HeadlessFrames={}\n", self.headless_frames));
        content.push_str(&format!("LogLevel={}\n", self.log_level.as_str()));
        content.push_str(&format!(
            "TextureUnitsFallback={}\n",
            self.texture_units_fallback
        ));
        content.push_str(&format!("VideoRenderer={}\n", self.video_renderer));
        content.push_str(&format!("Vsync={}\n", bit(self.vsync)));
        content.push('\n');
        content
    }
}

// Global, mutable configuration instance.
static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

fn create_default_config_file() -> Result<(), std::io::Error> {
    info!("'{CONFIG_PATH}' not found, creating with default values.");
    std::fs::write(CONFIG_PATH, Config::default().to_ini_string())
}

pub fn load() {
    if !Path::new(CONFIG_PATH).exists()
        && let Err(e) = create_default_config_file()
    {
        warn!("Failed to create default config file: {e}");
    }

    let mut conf = SimpleIni::new();
    match conf.load(CONFIG_PATH) {
        Ok(()) => {
            let loaded = Config::from_ini(&conf);
            *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = loaded;
            info!("Configuration loaded from '{CONFIG_PATH}'.");
        }
        Err(e) => warn!("Failed to load '{CONFIG_PATH}': {e}. Using default values."),
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner)
}
