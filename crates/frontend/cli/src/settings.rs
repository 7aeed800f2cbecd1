use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use umd_core::ConsoleProfile;

pub const CONFIG_FILE_NAME: &str = "umd.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Per-port open/read timeout for discovery, in milliseconds
    pub timeout_ms: u64,
    /// Scan for dumpers when `umd` is run without a subcommand
    pub auto_connect_on_start: bool,
    pub last_console: ConsoleProfile,
    #[serde(default)]
    pub last_rom: Option<String>,
    /// Directory each console's ROMs were last opened from
    #[serde(default)]
    pub rom_directories: HashMap<ConsoleProfile, String>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            auto_connect_on_start: true,
            last_console: ConsoleProfile::Genesis,
            last_rom: None,
            rom_directories: HashMap::new(),
            log_level: None,
        }
    }
}

impl Settings {
    /// Default config file location: next to the executable
    pub fn config_path() -> PathBuf {
        let mut path = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_FILE_NAME);
        path
    }

    /// Load settings from `path`, falling back to defaults on error
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!(
                        "failed to parse {}: {}; using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            // missing file is the first-run case
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Remember `rom` as the last image opened for `console`.
    pub fn remember_rom(&mut self, console: ConsoleProfile, rom: &Path) {
        self.last_console = console;
        self.last_rom = Some(rom.display().to_string());
        if let Some(dir) = rom.parent().filter(|d| !d.as_os_str().is_empty()) {
            self.rom_directories
                .insert(console, dir.display().to_string());
        }
    }

    pub fn rom_directory(&self, console: ConsoleProfile) -> Option<&String> {
        self.rom_directories.get(&console)
    }

    /// Locate `rom`, falling back to the console's remembered directory
    /// when a bare relative path does not exist in the working directory.
    pub fn resolve_rom(&self, console: ConsoleProfile, rom: &Path) -> PathBuf {
        if rom.is_relative() && !rom.exists() {
            if let Some(dir) = self.rom_directory(console) {
                let candidate = Path::new(dir).join(rom);
                if candidate.exists() {
                    return candidate;
                }
            }
        }
        rom.to_path_buf()
    }
}
