use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::LauncherError;
use crate::python_env::{
    default_candidates, default_dependencies, is_valid_import_name, DependencySpec,
    MIN_PYTHON_VERSION,
};
use crate::supervisor::DEFAULT_GRACE_PERIOD;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VNSTOCK_MCP_CONFIG";
/// Environment variable overriding the package root.
pub const ROOT_ENV: &str = "VNSTOCK_MCP_ROOT";
/// Config location relative to the package root.
pub const DEFAULT_CONFIG_PATH: &str = "config/launcher.toml";
pub const DEFAULT_SERVER_SCRIPT: &str = "python/vnstock_mcp_server.py";

/// Launcher settings, read from `config/launcher.toml`. Every field is optional.
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Interpreter names tried in order
    pub python_candidates: Vec<String>,
    /// `[major, minor]`
    pub min_python: [u32; 2],
    /// Warn instead of failing on an unsupported Python version
    pub allow_incompatible_python: bool,
    pub grace_period_ms: u64,
    pub package_root: Option<PathBuf>,
    /// Server entry file, relative to the package root
    pub server_script: PathBuf,
    /// Extra variables for the server process
    pub extra_env: BTreeMap<String, String>,
    pub dependencies: Vec<DependencySpec>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            python_candidates: default_candidates(),
            min_python: [MIN_PYTHON_VERSION.0, MIN_PYTHON_VERSION.1],
            allow_incompatible_python: false,
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            package_root: None,
            server_script: PathBuf::from(DEFAULT_SERVER_SCRIPT),
            extra_env: BTreeMap::new(),
            dependencies: default_dependencies(),
        }
    }
}

impl LauncherConfig {
    /// Load from `explicit`, else `$VNSTOCK_MCP_CONFIG`, else the default
    /// location under the package root. Only a missing default file falls
    /// back to built-in settings; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, LauncherError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path),
            None => {
                let path = default_root().join(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    tracing::debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, LauncherError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            LauncherError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let cfg = Self::parse(&text)
            .map_err(|e| LauncherError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn parse(text: &str) -> Result<Self, LauncherError> {
        let cfg: Self = toml::from_str(text).map_err(|e| LauncherError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), LauncherError> {
        if self.python_candidates.is_empty() {
            return Err(LauncherError::Config("python_candidates must not be empty".into()));
        }
        if let Some(dep) = self.dependencies.iter().find(|d| d.name().trim().is_empty()) {
            return Err(LauncherError::Config(format!(
                "dependency with empty name (version '{}')",
                dep.version_constraint()
            )));
        }
        if let Some(dep) = self
            .dependencies
            .iter()
            .find(|d| !is_valid_import_name(d.import_name()))
        {
            return Err(LauncherError::Config(format!(
                "dependency '{}': '{}' is not a Python module path (set import_name)",
                dep.name(),
                dep.import_name()
            )));
        }
        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn min_version(&self) -> (u32, u32) {
        (self.min_python[0], self.min_python[1])
    }

    /// `$VNSTOCK_MCP_ROOT`, then `package_root`, then the executable's
    /// directory when the server script sits next to it, then the cwd.
    pub fn resolve_package_root(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(ROOT_ENV) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.package_root {
            return dir.clone();
        }
        if let Some(dir) = exe_dir() {
            if dir.join(&self.server_script).exists() {
                return dir;
            }
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

fn default_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .or_else(exe_dir)
        .filter(|dir| dir.join(DEFAULT_CONFIG_PATH).exists())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}
