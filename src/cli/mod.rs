//! # CLI Module
//!
//! The `phasekit` binary: offline template compilation and one-off
//! rendering.
//!
//! ## Commands
//!
//! ### `compile`
//!
//! Resolve every template with a known dialect extension, report structural
//! errors as `CODE: arguments` lines, and write the compiled programs:
//!
//! ```bash
//! phasekit compile --templates templates --out target/phasekit
//! ```
//!
//! Any error fails the whole run and nothing is written.
//!
//! ### `render`
//!
//! ```bash
//! phasekit render --templates templates --template blog/show.gtmpl --context post.json
//! ```
//!
//! ## Global options
//!
//! - `--config <FILE>` - YAML [`AppConfig`](crate::config::AppConfig)
//! - `--tag NAME=PATH` - declare a tag rendered by the template at `PATH`

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{compile_templates, run, run_cli, Cli, Commands, CompileReport, LOCAL_TAG_PACKAGE};
