//! Verify-then-run composition used by the binary's modes.

use std::path::PathBuf;

use crate::config::LauncherConfig;
use crate::error::LauncherError;
use crate::python_env::{EnvironmentReport, Interpreter, PythonEnv};
use crate::runner::CommandRunner;
use crate::supervisor::ServerCommand;

pub struct Launcher<R> {
    config: LauncherConfig,
    package_root: PathBuf,
    env: PythonEnv<R>,
}

impl<R: CommandRunner> Launcher<R> {
    pub fn new(config: LauncherConfig, runner: R) -> Self {
        let package_root = config.resolve_package_root();
        let env = PythonEnv::new(runner)
            .with_candidates(config.python_candidates.clone())
            .with_min_version(config.min_version())
            .allow_incompatible(config.allow_incompatible_python);
        Self {
            config,
            package_root,
            env,
        }
    }

    pub fn with_package_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.package_root = root.into();
        self
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn package_root(&self) -> &PathBuf {
        &self.package_root
    }

    pub fn python_env(&self) -> &PythonEnv<R> {
        &self.env
    }

    pub fn server_script(&self) -> PathBuf {
        self.package_root.join(&self.config.server_script)
    }

    /// `<python> <root>/<script>` in `<root>`, with `PYTHONPATH=<root>`.
    pub fn server_command(&self, interpreter: &Interpreter) -> ServerCommand {
        let root = self.package_root.to_string_lossy().into_owned();
        let mut env = vec![("PYTHONPATH".to_string(), root)];
        env.extend(
            self.config
                .extra_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        ServerCommand {
            program: interpreter.program.clone(),
            args: vec![self.server_script().to_string_lossy().into_owned()],
            working_dir: Some(self.package_root.clone()),
            env,
        }
    }

    /// Interpreter, packages (installing what is missing) and the server
    /// script. Nothing is spawned when this fails.
    pub async fn prepare(&self) -> Result<ServerCommand, LauncherError> {
        let interpreter = self.env.prepare_interpreter().await?;
        let report = self
            .env
            .verify_all(&interpreter.program, &self.config.dependencies)
            .await?;
        if report.installed.is_empty() {
            tracing::info!("All {} Python packages present", report.already_present.len());
        } else {
            tracing::info!("Installed: {}", report.installed.join(", "));
        }

        let script = self.server_script();
        if !script.exists() {
            return Err(LauncherError::ScriptNotFound { path: script });
        }
        Ok(self.server_command(&interpreter))
    }

    /// `--test`: diagnostics only, nothing installed or spawned.
    pub async fn check(&self) -> EnvironmentReport {
        let mut report = self.env.report(&self.config.dependencies).await;
        let script = self.server_script();
        if report.error.is_none() && !script.exists() {
            report.error = Some(LauncherError::ScriptNotFound { path: script }.to_string());
        }
        report
    }

    /// `--install-deps`: install every dependency unconditionally.
    pub async fn install_dependencies(&self) -> Result<(), LauncherError> {
        let interpreter = self.env.prepare_interpreter().await?;
        self.env
            .install_all(&interpreter.program, &self.config.dependencies)
            .await?;
        tracing::info!("Installed {} Python packages", self.config.dependencies.len());
        Ok(())
    }
}
