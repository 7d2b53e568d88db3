pub mod config;
pub mod error;
pub mod launcher;
pub mod python_env;
pub mod runner;
pub mod supervisor;

pub use error::LauncherError;
