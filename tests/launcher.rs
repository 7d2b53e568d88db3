mod common;

use std::path::Path;

use common::ScriptedRunner;
use vnstock_mcp_launcher::config::LauncherConfig;
use vnstock_mcp_launcher::launcher::Launcher;
use vnstock_mcp_launcher::LauncherError;

/// Package root with the server script in its default location.
fn package_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("python")).unwrap();
    std::fs::write(
        dir.path().join("python/vnstock_mcp_server.py"),
        "print('hello')\n",
    )
    .unwrap();
    dir
}

fn config() -> LauncherConfig {
    LauncherConfig {
        python_candidates: vec!["python3".into(), "python".into()],
        ..Default::default()
    }
}

fn launcher(runner: ScriptedRunner, root: &Path) -> Launcher<ScriptedRunner> {
    Launcher::new(config(), runner).with_package_root(root)
}

#[tokio::test]
async fn test_all_present_no_installs() {
    let root = package_root();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.12.8")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = launcher(runner, root.path());

    let command = launcher.prepare().await.unwrap();
    assert_eq!(command.program, "python3");
    assert!(launcher.python_env().runner().installs().is_empty());
}

#[tokio::test]
async fn test_one_missing_one_install() {
    let root = package_root();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.11.4")
        .importable(&["vnstock", "pandas"])
        .installable("mcp", "mcp");
    let launcher = launcher(runner, root.path());

    launcher.prepare().await.unwrap();
    assert_eq!(launcher.python_env().runner().installs(), ["mcp>=0.1.0"]);
}

#[tokio::test]
async fn test_no_interpreter_aborts_early() {
    let root = package_root();
    let launcher = launcher(ScriptedRunner::new(), root.path());

    let err = launcher.prepare().await.unwrap_err();
    assert!(matches!(err, LauncherError::InterpreterNotFound { .. }));
    assert_eq!(err.exit_code(), 1);

    // only the two probes, nothing else
    let calls = launcher.python_env().runner().calls();
    assert_eq!(calls.len(), 2);
    assert!(launcher.python_env().runner().installs().is_empty());
}

#[tokio::test]
async fn test_server_command_contract() {
    let root = package_root();
    let mut cfg = config();
    cfg.extra_env.insert("PYTHONUNBUFFERED".into(), "1".into());
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.12.8")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = Launcher::new(cfg, runner).with_package_root(root.path());

    let command = launcher.prepare().await.unwrap();
    let root_str = root.path().to_string_lossy().into_owned();
    assert_eq!(
        command.args,
        [root.path().join("python/vnstock_mcp_server.py").to_string_lossy().into_owned()]
    );
    assert_eq!(command.working_dir.as_deref(), Some(root.path()));
    assert!(command.env.contains(&("PYTHONPATH".to_string(), root_str)));
    assert!(command.env.contains(&("PYTHONUNBUFFERED".to_string(), "1".to_string())));
}

#[tokio::test]
async fn test_missing_script_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.12.8")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = launcher(runner, root.path());

    let err = launcher.prepare().await.unwrap_err();
    assert_eq!(err.error_code(), "SCRIPT_NOT_FOUND");

    let report = launcher.check().await;
    assert!(!report.is_ready());
    assert!(report.error.unwrap().contains("vnstock_mcp_server.py"));
}

#[tokio::test]
async fn test_check_is_read_only() {
    let root = package_root();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.12.8")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = launcher(runner, root.path());

    let report = launcher.check().await;
    assert!(report.is_ready());
    assert!(launcher.python_env().runner().installs().is_empty());
}

#[tokio::test]
async fn test_install_dependencies_installs_everything() {
    let root = package_root();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.12.8")
        .importable(&["vnstock", "mcp", "pandas"])
        .installable("vnstock", "vnstock")
        .installable("mcp", "mcp")
        .installable("pandas", "pandas");
    let launcher = launcher(runner, root.path());

    launcher.install_dependencies().await.unwrap();
    assert_eq!(
        launcher.python_env().runner().installs(),
        ["vnstock>=3.2.0", "mcp>=0.1.0", "pandas>=1.5.0"]
    );
}

#[tokio::test]
async fn test_config_file_drives_launcher() {
    let root = package_root();
    let cfg_path = root.path().join("launcher.toml");
    std::fs::write(
        &cfg_path,
        r#"
        python_candidates = ["py311"]
        min_python = [3, 11]

        [[dependencies]]
        name = "vnstock"
        version = ">=3.2.0"
        "#,
    )
    .unwrap();
    let cfg = LauncherConfig::load(Some(&cfg_path)).unwrap();

    let runner = ScriptedRunner::new()
        .with_interpreter("py311", "Python 3.10.4")
        .importable(&["vnstock"]);
    let launcher = Launcher::new(cfg, runner).with_package_root(root.path());

    let err = launcher.prepare().await.unwrap_err();
    assert!(matches!(err, LauncherError::VersionIncompatible { .. }));
}

#[tokio::test]
async fn test_check_in_compat_mode_matches_launch() {
    let root = package_root();
    let mut cfg = config();
    cfg.allow_incompatible_python = true;
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.7.9")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = Launcher::new(cfg, runner).with_package_root(root.path());

    let report = launcher.check().await;
    assert!(report.is_ready());
    assert_eq!(report.exit_code(), 0);
    assert!(!report.warnings.is_empty());
    assert!(launcher.prepare().await.is_ok());
}

#[tokio::test]
async fn test_check_old_python_fails_without_compat() {
    let root = package_root();
    let runner = ScriptedRunner::new()
        .with_interpreter("python3", "Python 3.7.9")
        .importable(&["vnstock", "mcp", "pandas"]);
    let launcher = launcher(runner, root.path());

    assert_eq!(launcher.check().await.exit_code(), 1);
    assert!(launcher.prepare().await.is_err());
}
