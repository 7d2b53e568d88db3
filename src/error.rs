//! Launcher error taxonomy — every fatal condition of the verify and run
//! phases, with the process exit code and a stable machine code for each.

use crate::python_env::PythonVersion;

/// Errors that abort startup or supervision.
#[derive(thiserror::Error, Debug)]
pub enum LauncherError {
    #[error("No Python interpreter found (tried: {})", .tried.join(", "))]
    InterpreterNotFound { tried: Vec<String> },

    #[error("Could not parse a Python version from: {output:?}")]
    VersionUnparsable { output: String },

    #[error("Python {found} is not supported (requires {required})")]
    VersionIncompatible { found: PythonVersion, required: String },

    #[error("pip install of '{package}' failed: {stderr}")]
    InstallError { package: String, stderr: String },

    #[error("Missing Python packages: {}", .0.join(", "))]
    MissingPackages(Vec<String>),

    #[error("Server script not found: {}", .path.display())]
    ScriptNotFound { path: std::path::PathBuf },

    #[error("Failed to spawn '{program}': {source}")]
    SpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server process was already started")]
    AlreadyStarted,

    #[error("Server process is not running")]
    NotRunning,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LauncherError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InterpreterNotFound { .. } => "INTERPRETER_NOT_FOUND",
            Self::VersionUnparsable { .. } => "VERSION_UNPARSABLE",
            Self::VersionIncompatible { .. } => "VERSION_INCOMPATIBLE",
            Self::InstallError { .. } => "INSTALL_ERROR",
            Self::MissingPackages(_) => "MISSING_PACKAGES",
            Self::ScriptNotFound { .. } => "SCRIPT_NOT_FOUND",
            Self::SpawnError { .. } => "SPAWN_ERROR",
            Self::AlreadyStarted => "ALREADY_STARTED",
            Self::NotRunning => "NOT_RUNNING",
            Self::Config(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// Whether the error happened before the server process could exist.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InterpreterNotFound { .. }
                | Self::VersionUnparsable { .. }
                | Self::VersionIncompatible { .. }
                | Self::InstallError { .. }
                | Self::MissingPackages(_)
                | Self::ScriptNotFound { .. }
        )
    }
}
