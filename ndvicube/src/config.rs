//! Configuration file.
//!
//! Settings live in `~/.ndvicube/config.ini`. Every key is optional; missing
//! keys fall back to the defaults below. Sentinel Hub credentials may also
//! come from the `SH_CLIENT_ID` / `SH_CLIENT_SECRET` environment variables,
//! which take precedence over the file.
//!
//! ```ini
//! [sentinelhub]
//! client_id = ...
//! client_secret = ...
//!
//! [extraction]
//! resolution = 10
//! max_cloud_cover = 10
//!
//! [gapfill]
//! enabled = true
//!
//! [output]
//! directory = output
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use thiserror::Error;
use tracing::debug;

use crate::catalog::MAX_CLOUD_COVER;
use crate::coord::RESOLUTION;
use crate::fetch::DEFAULT_MAX_THREADS;
use crate::provider::{Credentials, ReqwestClient, DEFAULT_AUTH_URL, DEFAULT_BASE_URL};
use crate::search::{DEFAULT_MAX_ITERATIONS, WIDENING_STEP_DAYS};
use crate::tile::MAX_TILE_SIZE;

pub const CONFIG_DIR_NAME: &str = ".ndvicube";
pub const CONFIG_FILE_NAME: &str = "config.ini";

pub const ENV_CLIENT_ID: &str = "SH_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SH_CLIENT_SECRET";

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `~/.ndvicube`, or `./.ndvicube` when no home directory is known.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Full path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentinelHubSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub base_url: String,
    pub auth_url: String,
}

impl Default for SentinelHubSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Metres per pixel.
    pub resolution: f64,
    /// Largest raster side in pixels per request.
    pub max_tile_size: u32,
    /// Percent, exclusive.
    pub max_cloud_cover: f64,
    pub widening_step_days: i64,
    pub max_widening_iterations: u32,
    pub max_threads: usize,
    /// HTTP timeout in seconds.
    pub timeout: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            resolution: RESOLUTION,
            max_tile_size: MAX_TILE_SIZE,
            max_cloud_cover: MAX_CLOUD_COVER,
            widening_step_days: WIDENING_STEP_DAYS,
            max_widening_iterations: DEFAULT_MAX_ITERATIONS,
            max_threads: DEFAULT_MAX_THREADS,
            timeout: ReqwestClient::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GapFillSettings {
    pub enabled: bool,
}

impl Default for GapFillSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub geotiff: bool,
    pub preview: bool,
    pub manifest: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            geotiff: true,
            preview: true,
            manifest: true,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub sentinelhub: SentinelHubSettings,
    pub extraction: ExtractionSettings,
    pub gapfill: GapFillSettings,
    pub output: OutputSettings,
}

impl ConfigFile {
    /// Loads [`config_file_path`] and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&config_file_path())?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads a specific file without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })?;
        debug!(path = %path.display(), "Loaded configuration");
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = ConfigFile::default();

        if let Some(section) = ini.section(Some("sentinelhub")) {
            let sh = &mut config.sentinelhub;
            sh.client_id = non_empty(section, "client_id");
            sh.client_secret = non_empty(section, "client_secret");
            if let Some(v) = non_empty(section, "base_url") {
                sh.base_url = v;
            }
            if let Some(v) = non_empty(section, "auth_url") {
                sh.auth_url = v;
            }
        }

        if let Some(section) = ini.section(Some("extraction")) {
            let ex = &mut config.extraction;
            read(section, "extraction", "resolution", &mut ex.resolution)?;
            read(section, "extraction", "max_tile_size", &mut ex.max_tile_size)?;
            read(section, "extraction", "max_cloud_cover", &mut ex.max_cloud_cover)?;
            read(section, "extraction", "widening_step_days", &mut ex.widening_step_days)?;
            read(
                section,
                "extraction",
                "max_widening_iterations",
                &mut ex.max_widening_iterations,
            )?;
            read(section, "extraction", "max_threads", &mut ex.max_threads)?;
            read(section, "extraction", "timeout", &mut ex.timeout)?;
            if ex.resolution <= 0.0 {
                return Err(invalid("extraction", "resolution", ex.resolution));
            }
            if ex.max_tile_size == 0 {
                return Err(invalid("extraction", "max_tile_size", ex.max_tile_size));
            }
        }

        if let Some(section) = ini.section(Some("gapfill")) {
            read(section, "gapfill", "enabled", &mut config.gapfill.enabled)?;
        }

        if let Some(section) = ini.section(Some("output")) {
            let out = &mut config.output;
            if let Some(v) = non_empty(section, "directory") {
                out.directory = PathBuf::from(v);
            }
            read(section, "output", "geotiff", &mut out.geotiff)?;
            read(section, "output", "preview", &mut out.preview)?;
            read(section, "output", "manifest", &mut out.manifest)?;
        }

        Ok(config)
    }

    /// Replaces credentials with values from `lookup` where present.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.sentinelhub.client_id = Some(id);
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.sentinelhub.client_secret = Some(secret);
        }
    }

    /// Credentials if both halves are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.sentinelhub.client_id, &self.sentinelhub.client_secret) {
            (Some(id), Some(secret)) => Some(Credentials::new(id.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Writes to [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    fn to_ini(&self) -> Ini {
        let sh = &self.sentinelhub;
        let ex = &self.extraction;
        let out = &self.output;

        let mut ini = Ini::new();
        ini.with_section(Some("sentinelhub"))
            .set("client_id", sh.client_id.clone().unwrap_or_default())
            .set("client_secret", sh.client_secret.clone().unwrap_or_default())
            .set("base_url", sh.base_url.as_str())
            .set("auth_url", sh.auth_url.as_str());
        ini.with_section(Some("extraction"))
            .set("resolution", ex.resolution.to_string())
            .set("max_tile_size", ex.max_tile_size.to_string())
            .set("max_cloud_cover", ex.max_cloud_cover.to_string())
            .set("widening_step_days", ex.widening_step_days.to_string())
            .set("max_widening_iterations", ex.max_widening_iterations.to_string())
            .set("max_threads", ex.max_threads.to_string())
            .set("timeout", ex.timeout.to_string());
        ini.with_section(Some("gapfill"))
            .set("enabled", self.gapfill.enabled.to_string());
        ini.with_section(Some("output"))
            .set("directory", out.directory.display().to_string())
            .set("geotiff", out.geotiff.to_string())
            .set("preview", out.preview.to_string())
            .set("manifest", out.manifest.to_string());
        ini
    }
}

fn non_empty(section: &Properties, key: &str) -> Option<String> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parses `key` into `target` if present and non-empty.
fn read<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = non_empty(section, key) {
        *target = raw.parse().map_err(|_| ConfigError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn invalid(section: &str, key: &str, value: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}
