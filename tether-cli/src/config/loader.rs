use super::types::{
    DEFAULT_HOST, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_PORT, DEFAULT_STREAM_BUFFER, RawReaperConfig,
    RawServerConfig, RawSessionConfig, RawTetherConfig, ReaperSection, ServerSection,
    SessionSection, TetherConfig,
};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<TetherConfig> {
        let mut raw = RawTetherConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    /// Load a single file with defaults applied
    pub fn load_from_path(path: &Path) -> Result<TetherConfig> {
        Ok(Self::finalize(Self::read_raw(path)?))
    }

    fn read_raw(path: &Path) -> Result<RawTetherConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tether").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with TETHER_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("TETHER_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".tether/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawTetherConfig, overlay: RawTetherConfig) -> RawTetherConfig {
        RawTetherConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                public_url: overlay.server.public_url.or(base.server.public_url),
                keep_alive_secs: overlay
                    .server
                    .keep_alive_secs
                    .or(base.server.keep_alive_secs),
                stream_buffer: overlay.server.stream_buffer.or(base.server.stream_buffer),
            },
            session: RawSessionConfig {
                rekey_grace_secs: overlay
                    .session
                    .rekey_grace_secs
                    .or(base.session.rekey_grace_secs),
                handshake_timeout_secs: overlay
                    .session
                    .handshake_timeout_secs
                    .or(base.session.handshake_timeout_secs),
                resume_policy: overlay.session.resume_policy.or(base.session.resume_policy),
            },
            reaper: RawReaperConfig {
                mode: overlay.reaper.mode.or(base.reaper.mode),
                idle_ttl_secs: overlay.reaper.idle_ttl_secs.or(base.reaper.idle_ttl_secs),
                sweep_interval_secs: overlay
                    .reaper
                    .sweep_interval_secs
                    .or(base.reaper.sweep_interval_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawTetherConfig) -> TetherConfig {
        let session_defaults = SessionSection::default();
        let reaper_defaults = ReaperSection::default();

        TetherConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                public_url: raw.server.public_url,
                keep_alive_secs: raw.server.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
                stream_buffer: raw.server.stream_buffer.unwrap_or(DEFAULT_STREAM_BUFFER),
            },
            session: SessionSection {
                rekey_grace_secs: raw
                    .session
                    .rekey_grace_secs
                    .unwrap_or(session_defaults.rekey_grace_secs),
                handshake_timeout_secs: raw
                    .session
                    .handshake_timeout_secs
                    .unwrap_or(session_defaults.handshake_timeout_secs),
                resume_policy: raw
                    .session
                    .resume_policy
                    .unwrap_or(session_defaults.resume_policy),
            },
            reaper: ReaperSection {
                mode: raw.reaper.mode.unwrap_or(reaper_defaults.mode),
                idle_ttl_secs: raw
                    .reaper
                    .idle_ttl_secs
                    .unwrap_or(reaper_defaults.idle_ttl_secs),
                sweep_interval_secs: raw
                    .reaper
                    .sweep_interval_secs
                    .unwrap_or(reaper_defaults.sweep_interval_secs),
            },
        }
    }
}
