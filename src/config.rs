//! Configuration management for pcie-dma-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (PCIE_DMA_EMU_*)
//! 2. Project-local config file (`./pcie-dma-emu.toml`)
//! 3. User config file (`~/.config/pcie-dma-emu/config.toml`)
//! 4. Built-in defaults
//!
//! Every option is a build-time switch of the modeled SoC: it is resolved
//! once into a [`SocConfig`] before the device is constructed and never
//! changes afterwards.
//!
//! # Config File Format
//!
//! ```toml
//! # pcie-dma-emu.toml
//!
//! # Build the secondary (UART) debug bus master
//! with_uart_bridge = true
//!
//! # Build the per-channel DMA elastic buffers
//! with_dma_buffering = true
//!
//! # Build the DMA writer-to-reader loopback path
//! with_dma_loopback = true
//!
//! # Operating clock frequency in Hz (recovered from the PCIe link)
//! sys_clk_freq_hz = 125000000
//!
//! # PCIe link width (number of lanes)
//! pcie_link_width = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default operating clock frequency (Hz).
pub const DEFAULT_SYS_CLK_FREQ_HZ: u32 = 125_000_000;

/// Default PCIe link width (lanes).
pub const DEFAULT_PCIE_LINK_WIDTH: u8 = 2;

/// Resolved SoC build options.
///
/// This is the concrete product of [`Config`]: every field has a value and
/// the device model consumes it without knowing where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocConfig {
    /// Build the secondary (UART) debug bus master.
    pub with_uart_bridge: bool,
    /// Build the per-channel DMA elastic buffers.
    pub with_dma_buffering: bool,
    /// Build the DMA writer-to-reader loopback path.
    pub with_dma_loopback: bool,
    /// Operating clock frequency in Hz.
    pub sys_clk_freq_hz: u32,
    /// PCIe link width (lanes).
    pub pcie_link_width: u8,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            with_uart_bridge: true,
            with_dma_buffering: true,
            with_dma_loopback: true,
            sys_clk_freq_hz: DEFAULT_SYS_CLK_FREQ_HZ,
            pcie_link_width: DEFAULT_PCIE_LINK_WIDTH,
        }
    }
}

/// pcie-dma-emu configuration as loaded from files and the environment.
///
/// Fields are optional so that layered sources can be merged; use
/// [`Config::resolve`] to obtain the final [`SocConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Build the secondary (UART) debug bus master.
    pub with_uart_bridge: Option<bool>,

    /// Build the per-channel DMA elastic buffers.
    pub with_dma_buffering: Option<bool>,

    /// Build the DMA writer-to-reader loopback path.
    pub with_dma_loopback: Option<bool>,

    /// Operating clock frequency in Hz.
    pub sys_clk_freq_hz: Option<u32>,

    /// PCIe link width (lanes).
    pub pcie_link_width: Option<u8>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `pcie-dma-emu.toml`
    /// 3. User config `~/.config/pcie-dma-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load user config first (lowest priority of file configs)
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Load project-local config (higher priority)
        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Resolve the loaded options into a concrete [`SocConfig`].
    pub fn resolve(&self) -> SocConfig {
        let defaults = SocConfig::default();
        SocConfig {
            with_uart_bridge: self.with_uart_bridge.unwrap_or(defaults.with_uart_bridge),
            with_dma_buffering: self
                .with_dma_buffering
                .unwrap_or(defaults.with_dma_buffering),
            with_dma_loopback: self.with_dma_loopback.unwrap_or(defaults.with_dma_loopback),
            sys_clk_freq_hz: self.sys_clk_freq_hz.unwrap_or(defaults.sys_clk_freq_hz),
            pcie_link_width: self.pcie_link_width.unwrap_or(defaults.pcie_link_width),
        }
    }

    /// Load user configuration from ~/.config/pcie-dma-emu/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("pcie-dma-emu").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./pcie-dma-emu.toml
    fn load_local_config() -> Option<Self> {
        // Try current directory
        let local_path = Path::new("pcie-dma-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        // Try to find project root by looking for Cargo.toml
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("pcie-dma-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.with_uart_bridge.is_some() {
            self.with_uart_bridge = other.with_uart_bridge;
        }
        if other.with_dma_buffering.is_some() {
            self.with_dma_buffering = other.with_dma_buffering;
        }
        if other.with_dma_loopback.is_some() {
            self.with_dma_loopback = other.with_dma_loopback;
        }
        if other.sys_clk_freq_hz.is_some() {
            self.sys_clk_freq_hz = other.sys_clk_freq_hz;
        }
        if other.pcie_link_width.is_some() {
            self.pcie_link_width = other.pcie_link_width;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("PCIE_DMA_EMU_UART_BRIDGE") {
            log::info!("Using PCIE_DMA_EMU_UART_BRIDGE from environment: {}", v);
            self.with_uart_bridge = Some(v);
        }
        if let Some(v) = env_bool("PCIE_DMA_EMU_DMA_BUFFERING") {
            log::info!("Using PCIE_DMA_EMU_DMA_BUFFERING from environment: {}", v);
            self.with_dma_buffering = Some(v);
        }
        if let Some(v) = env_bool("PCIE_DMA_EMU_DMA_LOOPBACK") {
            log::info!("Using PCIE_DMA_EMU_DMA_LOOPBACK from environment: {}", v);
            self.with_dma_loopback = Some(v);
        }
        if let Ok(raw) = std::env::var("PCIE_DMA_EMU_SYS_CLK_FREQ_HZ") {
            match raw.parse::<u32>() {
                Ok(v) => {
                    log::info!("Using PCIE_DMA_EMU_SYS_CLK_FREQ_HZ from environment: {}", v);
                    self.sys_clk_freq_hz = Some(v);
                }
                Err(e) => log::warn!("Ignoring PCIE_DMA_EMU_SYS_CLK_FREQ_HZ={:?}: {}", raw, e),
            }
        }
        if let Ok(raw) = std::env::var("PCIE_DMA_EMU_LINK_WIDTH") {
            match raw.parse::<u8>() {
                Ok(v) => {
                    log::info!("Using PCIE_DMA_EMU_LINK_WIDTH from environment: {}", v);
                    self.pcie_link_width = Some(v);
                }
                Err(e) => log::warn!("Ignoring PCIE_DMA_EMU_LINK_WIDTH={:?}: {}", raw, e),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pcie-dma-emu").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# pcie-dma-emu configuration
# Place this file at ~/.config/pcie-dma-emu/config.toml or ./pcie-dma-emu.toml

# Build the secondary (UART) debug bus master
with_uart_bridge = true

# Build the per-channel DMA elastic buffers
with_dma_buffering = true

# Build the DMA writer-to-reader loopback path
with_dma_loopback = true

# Operating clock frequency in Hz (recovered from the PCIe link)
sys_clk_freq_hz = 125000000

# PCIe link width (number of lanes)
pcie_link_width = 2
"#
        .to_string()
    }
}

/// Parse a boolean environment variable ("0"/"1"/"true"/"false").
fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        other => {
            log::warn!("Ignoring {}={:?}: expected a boolean", name, other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolution() {
        let config = Config::default();
        let soc = config.resolve();
        assert!(soc.with_uart_bridge);
        assert!(soc.with_dma_buffering);
        assert!(soc.with_dma_loopback);
        assert_eq!(soc.sys_clk_freq_hz, 125_000_000);
        assert_eq!(soc.pcie_link_width, 2);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            with_uart_bridge: Some(false),
            with_dma_buffering: None,
            with_dma_loopback: Some(true),
            sys_clk_freq_hz: Some(100_000_000),
            pcie_link_width: None,
        };

        let overlay = Config {
            with_uart_bridge: None,
            with_dma_buffering: Some(false),
            with_dma_loopback: Some(false),
            sys_clk_freq_hz: None,
            pcie_link_width: Some(4),
        };

        base.merge(overlay);

        // with_uart_bridge unchanged (overlay was None)
        assert_eq!(base.with_uart_bridge, Some(false));
        // with_dma_buffering set from overlay
        assert_eq!(base.with_dma_buffering, Some(false));
        // with_dma_loopback overridden by overlay
        assert_eq!(base.with_dma_loopback, Some(false));
        assert_eq!(base.sys_clk_freq_hz, Some(100_000_000));
        assert_eq!(base.pcie_link_width, Some(4));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        let soc = config.resolve();
        assert_eq!(soc, SocConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("with_uart_bridge = false\n").unwrap();
        let soc = config.resolve();
        assert!(!soc.with_uart_bridge);
        assert!(soc.with_dma_buffering);
        assert_eq!(soc.pcie_link_width, 2);
    }
}
