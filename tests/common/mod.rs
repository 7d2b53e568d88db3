//! Scripted stand-in for real Python/pip processes.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use vnstock_mcp_launcher::runner::{CommandOutput, CommandRunner};

/// Answers `--version`, `-c "import X"` and `-m pip install REQ` the way a
/// configured set of interpreters would, and records every call.
#[derive(Default)]
pub struct ScriptedRunner {
    /// interpreter name → `--version` text
    interpreters: HashMap<String, String>,
    importable: Mutex<HashSet<String>>,
    /// pip package name → import name that becomes available after install
    installable: HashMap<String, String>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, name: &str, version_text: &str) -> Self {
        self.interpreters.insert(name.to_string(), version_text.to_string());
        self
    }

    pub fn importable(self, modules: &[&str]) -> Self {
        {
            let mut set = self.importable.lock().unwrap();
            set.extend(modules.iter().map(|m| m.to_string()));
        }
        self
    }

    pub fn installable(mut self, package: &str, import_name: &str) -> Self {
        self.installable.insert(package.to_string(), import_name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Programs that were asked for `--version`, in order.
    pub fn probed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, args)| args == &["--version"])
            .map(|(program, _)| program)
            .collect()
    }

    /// Requirement strings handed to pip, in order.
    pub fn installs(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, args)| args.len() == 4 && args[..3] == ["-m", "pip", "install"])
            .map(|(_, args)| args[3].clone())
            .collect()
    }

    /// Modules whose import was attempted, in order.
    pub fn imports(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, args)| args.first().map(String::as_str) == Some("-c"))
            .filter_map(|(_, args)| args[1].strip_prefix("import ").map(str::to_string))
            .collect()
    }
}

fn package_name(requirement: &str) -> &str {
    let end = requirement
        .find(|c: char| "<>=!~ ;[".contains(c))
        .unwrap_or(requirement.len());
    &requirement[..end]
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));

        let Some(version) = self.interpreters.get(program) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: command not found", program),
            ));
        };

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["--version"] => Ok(ok(version)),
            ["-c", code] => {
                let module = code.strip_prefix("import ").unwrap_or(*code);
                if self.importable.lock().unwrap().contains(module) {
                    Ok(ok(""))
                } else {
                    Ok(fail(
                        1,
                        &format!("ModuleNotFoundError: No module named '{}'", module),
                    ))
                }
            }
            ["-m", "pip", "install", requirement] => {
                match self.installable.get(package_name(requirement)) {
                    Some(import_name) => {
                        self.importable.lock().unwrap().insert(import_name.clone());
                        Ok(ok(&format!("Successfully installed {}", requirement)))
                    }
                    None => Ok(fail(
                        1,
                        &format!(
                            "ERROR: No matching distribution found for {}",
                            requirement
                        ),
                    )),
                }
            }
            _ => Ok(fail(2, "unexpected invocation")),
        }
    }
}
