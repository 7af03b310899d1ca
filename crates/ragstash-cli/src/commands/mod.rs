//! CLI commands module

pub mod providers;
pub mod run;
pub mod shell;
