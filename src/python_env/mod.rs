//! Python environment verifier — makes sure the MCP server can run before it
//! is spawned.
//!
//! ## Flow
//! 1. [`PythonEnv::locate_interpreter`] probes `python3`, `python`, ... in
//!    order and stops at the first one that answers `--version`
//! 2. [`PythonEnv::check_version`] parses `major.minor.patch` from that answer
//! 3. [`PythonEnv::verify_all`] imports every required package, installs the
//!    missing ones with `python -m pip`, then re-imports only those
//!
//! Every external call goes through a [`CommandRunner`], and all calls run one
//! after another: two pip processes writing into the same site-packages can
//! corrupt it.

pub mod dependency;

pub use dependency::{default_dependencies, is_valid_import_name, DependencySpec};

use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::error::LauncherError;
use crate::runner::CommandRunner;

/// Minimum interpreter version the server supports.
pub const MIN_PYTHON_VERSION: (u32, u32) = (3, 8);

/// Interpreter names tried in order when the config does not override them.
pub fn default_candidates() -> Vec<String> {
    let mut names = vec!["python3".to_string(), "python".to_string()];
    if cfg!(target_os = "windows") {
        names.push("py".to_string());
    }
    names
}

// ── Version ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl PythonVersion {
    /// Same major as `min`, minor at least `min`'s. Python 4 would be a
    /// different language as far as the server is concerned.
    pub fn satisfies(&self, min: (u32, u32)) -> bool {
        self.major == min.0 && self.minor >= min.1
    }
}

/// First `major.minor.patch` token in the text.
/// `"Python 3.12.8"` → `3.12.8`; `"Python 3.13.0rc1"` → `3.13.0`.
pub fn parse_python_version(text: &str) -> Option<PythonVersion> {
    let re = Regex::new(r"(\d+)\.(\d+)\.(\d+)").ok()?;
    let caps = re.captures(text)?;
    Some(PythonVersion {
        major: caps[1].parse().ok()?,
        minor: caps[2].parse().ok()?,
        patch: caps[3].parse().ok()?,
    })
}

/// Version policy check on a raw version string, against [`MIN_PYTHON_VERSION`].
pub fn is_valid_version(text: &str) -> bool {
    parse_python_version(text)
        .map(|v| v.satisfies(MIN_PYTHON_VERSION))
        .unwrap_or(false)
}

// ── Results ─────────────────────────────────────────────────────

/// A located, version-checked interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpreter {
    /// Command name or path, passed verbatim to every later invocation.
    pub program: String,
    /// `None` only when compatibility mode let an unparsable version through.
    pub version: Option<PythonVersion>,
}

/// Outcome of a successful [`PythonEnv::verify_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Importable before anything was installed.
    pub already_present: Vec<String>,
    /// Installed during this run and importable afterwards.
    pub installed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageStatus {
    pub name: String,
    pub import_name: String,
    pub requirement: String,
    pub importable: bool,
}

/// Read-only diagnostics of the environment, as printed by `--test`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub interpreter: Option<String>,
    pub python_version: Option<String>,
    /// The version satisfies the minimum.
    pub version_ok: bool,
    /// Compatibility mode: an unsupported or unparsable version does not
    /// block startup.
    pub allow_incompatible: bool,
    pub packages: Vec<PackageStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnvironmentReport {
    /// Whether a normal launch would get past verification without installing.
    pub fn is_ready(&self) -> bool {
        self.error.is_none()
            && self.interpreter.is_some()
            && (self.version_ok || self.allow_incompatible)
            && self.packages.iter().all(|p| p.importable)
    }

    /// `--test` exit status.
    pub fn exit_code(&self) -> i32 {
        if self.is_ready() {
            0
        } else {
            1
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Verifier
// ═══════════════════════════════════════════════════════════════

pub struct PythonEnv<R> {
    runner: R,
    candidates: Vec<String>,
    min_version: (u32, u32),
    allow_incompatible: bool,
}

impl<R: CommandRunner> PythonEnv<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            candidates: default_candidates(),
            min_version: MIN_PYTHON_VERSION,
            allow_incompatible: false,
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<String>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_min_version(mut self, min: (u32, u32)) -> Self {
        self.min_version = min;
        self
    }

    /// Continue with a warning instead of failing on an unsupported or
    /// unparsable interpreter version.
    pub fn allow_incompatible(mut self, allow: bool) -> Self {
        self.allow_incompatible = allow;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// First candidate that runs `--version` successfully.
    pub async fn locate_interpreter(&self) -> Result<String, LauncherError> {
        for name in &self.candidates {
            match self.runner.run(name, &args(&["--version"])).await {
                Ok(out) if out.success => {
                    tracing::debug!("Python candidate '{}' → {}", name, out.combined().trim());
                    return Ok(name.clone());
                }
                Ok(out) => {
                    tracing::debug!("Python candidate '{}' exited with {:?}", name, out.code);
                }
                Err(e) => {
                    tracing::debug!("Python candidate '{}' not runnable: {}", name, e);
                }
            }
        }
        Err(LauncherError::InterpreterNotFound {
            tried: self.candidates.clone(),
        })
    }

    pub async fn check_version(&self, python: &str) -> Result<PythonVersion, LauncherError> {
        let out = self.runner.run(python, &args(&["--version"])).await?;
        let text = out.combined();
        parse_python_version(&text).ok_or_else(|| LauncherError::VersionUnparsable {
            output: text.trim().to_string(),
        })
    }

    /// Locate, read the version, apply the version policy.
    pub async fn prepare_interpreter(&self) -> Result<Interpreter, LauncherError> {
        let program = self.locate_interpreter().await?;
        let version = match self.check_version(&program).await {
            Ok(v) => Some(v),
            Err(e) if self.allow_incompatible => {
                tracing::warn!("{} (continuing in compatibility mode)", e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(v) = version {
            if v.satisfies(self.min_version) {
                tracing::info!("Using Python {} ({})", v, program);
            } else {
                let err = LauncherError::VersionIncompatible {
                    found: v,
                    required: self.required_label(),
                };
                if !self.allow_incompatible {
                    return Err(err);
                }
                tracing::warn!("{} (continuing in compatibility mode)", err);
            }
        }

        Ok(Interpreter { program, version })
    }

    pub async fn is_package_importable(&self, python: &str, import_name: &str) -> bool {
        if !is_valid_import_name(import_name) {
            tracing::warn!("'{}' is not a Python module path, not importing it", import_name);
            return false;
        }
        let code = format!("import {}", import_name);
        match self.runner.run(python, &args(&["-c", &code])).await {
            Ok(out) => out.success,
            Err(e) => {
                tracing::debug!("import check for '{}' could not run: {}", import_name, e);
                false
            }
        }
    }

    pub async fn install_package(
        &self,
        python: &str,
        spec: &DependencySpec,
    ) -> Result<(), LauncherError> {
        let requirement = spec.requirement();
        tracing::info!("Installing {} ...", requirement);
        let out = self
            .runner
            .run(python, &args(&["-m", "pip", "install", &requirement]))
            .await
            .map_err(|e| LauncherError::InstallError {
                package: spec.name().to_string(),
                stderr: e.to_string(),
            })?;
        if !out.success {
            return Err(LauncherError::InstallError {
                package: spec.name().to_string(),
                stderr: out.stderr.trim().to_string(),
            });
        }
        tracing::info!("Installed {}", requirement);
        Ok(())
    }

    /// Import every spec, install what is missing, re-import only what was
    /// installed. Every missing package gets one install attempt; whatever is
    /// still missing at the end is reported together.
    pub async fn verify_all(
        &self,
        python: &str,
        specs: &[DependencySpec],
    ) -> Result<VerifyReport, LauncherError> {
        tracing::info!("Checking {} Python packages", specs.len());
        let mut report = VerifyReport::default();
        let mut still_missing = Vec::new();

        for spec in specs {
            if self.is_package_importable(python, spec.import_name()).await {
                tracing::debug!("{} is importable", spec.import_name());
                report.already_present.push(spec.name().to_string());
                continue;
            }

            tracing::warn!("{} is not installed", spec.name());
            if let Err(e) = self.install_package(python, spec).await {
                tracing::error!("{}", e);
                still_missing.push(spec.name().to_string());
                continue;
            }

            if self.is_package_importable(python, spec.import_name()).await {
                report.installed.push(spec.name().to_string());
            } else {
                tracing::error!(
                    "{} was installed but '{}' still cannot be imported",
                    spec.name(),
                    spec.import_name()
                );
                still_missing.push(spec.name().to_string());
            }
        }

        if !still_missing.is_empty() {
            return Err(LauncherError::MissingPackages(still_missing));
        }
        Ok(report)
    }

    /// Install every spec regardless of what is already importable.
    pub async fn install_all(
        &self,
        python: &str,
        specs: &[DependencySpec],
    ) -> Result<(), LauncherError> {
        let mut failed = Vec::new();
        for spec in specs {
            if let Err(e) = self.install_package(python, spec).await {
                tracing::error!("{}", e);
                failed.push(spec.name().to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(LauncherError::MissingPackages(failed))
        }
    }

    /// Diagnostics without side effects on the environment.
    pub async fn report(&self, specs: &[DependencySpec]) -> EnvironmentReport {
        let mut report = EnvironmentReport {
            allow_incompatible: self.allow_incompatible,
            ..Default::default()
        };

        let python = match self.locate_interpreter().await {
            Ok(p) => p,
            Err(e) => {
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.interpreter = Some(python.clone());

        match self.check_version(&python).await {
            Ok(v) => {
                report.python_version = Some(v.to_string());
                report.version_ok = v.satisfies(self.min_version);
                if !report.version_ok && self.allow_incompatible {
                    let err = LauncherError::VersionIncompatible {
                        found: v,
                        required: self.required_label(),
                    };
                    report.warnings.push(format!("{} (compatibility mode)", err));
                }
            }
            // same policy as prepare_interpreter
            Err(e) if self.allow_incompatible => {
                report.warnings.push(format!("{} (compatibility mode)", e));
            }
            Err(e) => report.error = Some(e.to_string()),
        }

        for spec in specs {
            let importable = self.is_package_importable(&python, spec.import_name()).await;
            report.packages.push(PackageStatus {
                name: spec.name().to_string(),
                import_name: spec.import_name().to_string(),
                requirement: spec.requirement(),
                importable,
            });
        }
        report
    }

    fn required_label(&self) -> String {
        format!("{}.x with x >= {}", self.min_version.0, self.min_version.1)
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
