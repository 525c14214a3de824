// Configuration management for ipv6config
// Supports CLI arguments, config file (TOML), and environment variables

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

use crate::apply::Preferences;
use crate::mutate::InterfaceSelection;
use crate::mutate::privacy::default_privacy_interfaces;
use crate::tool::{HostSettings, ToolSearch};

/// ipv6config - Read and change IPv6 privacy, interface and 6to4 tunnel state
#[derive(Parser, Debug, Clone)]
#[command(name = "ipv6config")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(short, long, env = "IPV6CONFIG_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "IPV6CONFIG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Timeout for each external command in seconds (0 disables it)
    #[arg(long, env = "IPV6CONFIG_COMMAND_TIMEOUT")]
    pub command_timeout: Option<u64>,

    /// Root of the per-interface IPv6 kernel configuration tree
    #[arg(long, env = "IPV6CONFIG_CONF_ROOT")]
    pub conf_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Find a working ip binary and print it
    Locate,
    /// List interfaces with their addresses
    Interfaces {
        /// Only this interface
        iface: Option<String>,
    },
    /// List routes
    Routes {
        /// IPv6 routes instead of IPv4
        #[arg(short = '6', long)]
        ipv6: bool,
    },
    /// Interfaces, routes and derived defaults of this host
    Snapshot,
    /// Link statistics of an interface
    Stats { iface: String },
    /// Enable or disable address privacy
    Privacy {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Reset IPv6-routed interfaces afterwards
        #[arg(long)]
        reload: bool,
        /// Use every interface of the kernel config tree
        #[arg(long)]
        discover: bool,
    },
    /// Set interfaces down and up again to regenerate addresses
    Reload {
        #[arg(required = true)]
        ifaces: Vec<String>,
    },
    /// Manage the 6to4 tunnel
    Tunnel {
        #[command(subcommand)]
        action: TunnelAction,
    },
    /// Apply stored preferences
    Apply {
        /// Honour the autostart preference, as done at boot
        #[arg(long)]
        boot: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TunnelAction {
    /// Create the tunnel for the current outbound IPv4 address
    Create {
        /// Tunnel MTU (0 or less selects the default)
        #[arg(long)]
        mtu: Option<i32>,
    },
    /// Delete the tunnel
    Delete,
}

/// Configuration file structure (TOML format)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub reload: ReloadConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub tunnel: TunnelConfig,

    #[serde(default)]
    pub preferences: PreferencesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Directories searched for `ip` and `busybox`, in order
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<PathBuf>,

    /// Timeout for each external command in seconds (0 disables it)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    #[serde(default = "default_conf_root")]
    pub conf_root: PathBuf,

    /// Interfaces besides `all` and `default`
    #[serde(default = "default_privacy_interfaces")]
    pub interfaces: Vec<String>,

    /// Use every entry of the kernel config tree instead of `interfaces`
    #[serde(default)]
    pub discover: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_ethtool")]
    pub ethtool: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(default = "default_tunnel_name")]
    pub name: String,

    /// 0 or less selects the default MTU
    #[serde(default)]
    pub mtu: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PreferencesConfig {
    #[serde(default)]
    pub autostart: bool,

    #[serde(default)]
    pub enable_privacy: bool,

    #[serde(default)]
    pub create_tunnel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_search_dirs() -> Vec<PathBuf> {
    ToolSearch::default().dirs
}
fn default_command_timeout() -> u64 {
    10
}
fn default_conf_root() -> PathBuf {
    HostSettings::default().conf_root
}
fn default_settle_delay() -> u64 {
    100
}
fn default_ethtool() -> PathBuf {
    HostSettings::default().ethtool
}
fn default_tunnel_name() -> String {
    "tun6to4".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            search_dirs: default_search_dirs(),
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        PrivacyConfig {
            conf_root: default_conf_root(),
            interfaces: default_privacy_interfaces(),
            discover: false,
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        ReloadConfig {
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            ethtool: default_ethtool(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        TunnelConfig {
            name: default_tunnel_name(),
            mtu: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

/// Merged configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: Level,
    pub command_timeout: Option<Duration>,
    pub search: ToolSearch,
    pub host: HostSettings,
    pub preferences: Preferences,
}

impl Config {
    /// Load configuration from all sources (CLI args, config file, defaults)
    /// Priority: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> anyhow::Result<Self> {
        let config_file = match &cli_args.config {
            Some(config_path) => read_config_file(config_path)?,
            None => {
                // Try loading from default locations
                let default_paths = [PathBuf::from("ipv6config.toml"), PathBuf::from("config.toml")];
                match default_paths.iter().find(|p| p.exists()) {
                    Some(path) => read_config_file(path)?,
                    None => ConfigFile::default(),
                }
            }
        };

        Config::merge(cli_args, config_file)
    }

    fn merge(cli_args: &CliArgs, config_file: ConfigFile) -> anyhow::Result<Self> {
        let log_level = parse_log_level(cli_args.log_level.as_deref().unwrap_or(&config_file.logging.level))?;

        let timeout_seconds = cli_args
            .command_timeout
            .unwrap_or(config_file.tool.command_timeout_seconds);
        let command_timeout = (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds));

        if config_file.tool.search_dirs.is_empty() {
            anyhow::bail!("[tool] search_dirs must name at least one directory");
        }

        let host = HostSettings {
            conf_root: cli_args
                .conf_root
                .clone()
                .unwrap_or(config_file.privacy.conf_root),
            ethtool: config_file.stats.ethtool,
            settle_delay: Duration::from_millis(config_file.reload.settle_delay_ms),
        };

        let interfaces = if config_file.privacy.discover {
            InterfaceSelection::Discover
        } else {
            InterfaceSelection::Listed(config_file.privacy.interfaces)
        };

        let preferences = Preferences {
            autostart: config_file.preferences.autostart,
            enable_privacy: config_file.preferences.enable_privacy,
            create_tunnel: config_file.preferences.create_tunnel,
            interfaces,
            tunnel_name: config_file.tunnel.name,
            tunnel_mtu: config_file.tunnel.mtu,
        };

        Ok(Config {
            log_level,
            command_timeout,
            search: ToolSearch {
                dirs: config_file.tool.search_dirs,
            },
            host,
            preferences,
        })
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    tracing::info!("Loading configuration from: {}", path.display());
    let config_content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<ConfigFile>(&config_content)?)
}

pub fn parse_log_level(level_str: &str) -> anyhow::Result<Level> {
    match level_str.to_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level_str)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("ipv6config").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();
        assert_eq!(config.tool.command_timeout_seconds, 10);
        assert_eq!(config.tool.search_dirs.len(), 4);
        assert_eq!(config.privacy.conf_root, PathBuf::from("/proc/sys/net/ipv6/conf"));
        assert_eq!(config.privacy.interfaces[0], "eth0");
        assert_eq!(config.tunnel.name, "tun6to4");
        assert!(!config.preferences.autostart);
    }

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("info"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("DEBUG"), Ok(Level::DEBUG)));
        assert!(parse_log_level("invalid").is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            [privacy]
            discover = true

            [preferences]
            autostart = true
            enable_privacy = true

            [reload]
            settle_delay_ms = 250
            "#,
        )
        .unwrap();
        let config = Config::merge(&cli(&["snapshot"]), file).unwrap();

        assert_eq!(config.preferences.interfaces, InterfaceSelection::Discover);
        assert!(config.preferences.autostart);
        assert!(!config.preferences.create_tunnel);
        assert_eq!(config.host.settle_delay, Duration::from_millis(250));
        assert_eq!(config.command_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: ConfigFile = toml::from_str("[logging]\nlevel = \"warn\"\n[tool]\ncommand_timeout_seconds = 5\n").unwrap();
        let args = cli(&["--log-level", "debug", "--command-timeout", "0", "--conf-root", "/tmp/conf", "locate"]);
        let config = Config::merge(&args, file).unwrap();

        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.command_timeout, None);
        assert_eq!(config.host.conf_root, PathBuf::from("/tmp/conf"));
        assert_eq!(args.command, Command::Locate);
    }

    #[test]
    fn test_empty_search_dirs_rejected() {
        let file: ConfigFile = toml::from_str("[tool]\nsearch_dirs = []\n").unwrap();
        assert!(Config::merge(&cli(&["locate"]), file).is_err());
    }

    #[test]
    fn test_subcommands_parse() {
        assert_eq!(
            cli(&["tunnel", "create", "--mtu", "1280"]).command,
            Command::Tunnel {
                action: TunnelAction::Create { mtu: Some(1280) }
            }
        );
        assert_eq!(
            cli(&["reload", "eth0", "rmnet0"]).command,
            Command::Reload {
                ifaces: vec!["eth0".to_string(), "rmnet0".to_string()]
            }
        );
        assert!(CliArgs::try_parse_from(["ipv6config", "privacy", "--enable", "--disable"]).is_err());
    }
}
