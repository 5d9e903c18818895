//! Clap adapter for sectfig.
//!
//! This module is the **optional integration layer** between sectfig's
//! framework-agnostic core and the [clap](https://docs.rs/clap) CLI parser.
//! It is compiled only when the `clap` Cargo feature is enabled (on by
//! default).
//!
//! [`ConfigArgs`] carries the loading flags (`--config`, `--patch`, `--defs`,
//! `--strict`, `--set`) and a [`ConfigSubcommand`] for
//! `config print|list|validate|generate|get`. Two methods bridge to the core:
//!
//! - [`ConfigArgs::apply_to()`] feeds the flags into a
//!   [`ConfigBuilder`](crate::ConfigBuilder);
//! - [`ConfigArgs::into_action()`] converts the subcommand into a
//!   [`ConfigAction`](crate::ConfigAction), handled by
//!   [`ConfigBuilder::handle()`](crate::ConfigBuilder::handle).
//!
//! If you use a different CLI parser (or no CLI at all), you can skip this
//! module entirely and call the builder directly.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::builder::ConfigBuilder;
use crate::types::ConfigAction;

/// Clap-derived args for the `config` subcommand group.
///
/// Embed this into your app's clap derive:
/// ```ignore
/// #[derive(Parser)]
/// struct Cli {
///     #[command(subcommand)]
///     command: Commands,
/// }
///
/// #[derive(Subcommand)]
/// enum Commands {
///     Config(ConfigArgs),
/// }
/// ```
#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Configuration file; repeat to layer several, later files win.
    #[arg(short, long = "config", global = true)]
    pub config: Vec<PathBuf>,

    /// Sections to merge, e.g. "default<-gpu".
    #[arg(short, long, global = true)]
    pub patch: Option<String>,

    /// Definitions file used for defaults, coercion and checks.
    #[arg(short, long, global = true)]
    pub defs: Option<PathBuf>,

    /// Report keys the definitions do not declare.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Override a value after patching: `key=value`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    #[command(subcommand)]
    pub action: Option<ConfigSubcommand>,
}

/// Available config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Print the resolved configuration as YAML.
    Print,
    /// Show all resolved configuration key-value pairs.
    List,
    /// Validate the configuration against the definitions.
    Validate,
    /// Generate a commented template from the definitions.
    Generate {
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the resolved value and description for a config key.
    Get {
        /// Dotted key path (e.g. "model.depth").
        key: String,
    },
}

impl ConfigArgs {
    /// Feed the loading flags into `builder`.
    pub fn apply_to(&self, builder: ConfigBuilder) -> ConfigBuilder {
        let mut builder = self
            .config
            .iter()
            .fold(builder, |b, path| b.file(path.clone()))
            .strict(self.strict);
        if let Some(patch) = &self.patch {
            builder = builder.patch(patch.as_str());
        }
        if let Some(defs) = &self.defs {
            builder = builder.definitions_file(defs.clone());
        }
        self.overrides
            .iter()
            .fold(builder, |b, entry| b.override_str(entry))
    }

    /// Convert clap-parsed args into a framework-agnostic `ConfigAction`.
    ///
    /// Bare `config` (no subcommand) and explicit `config print` both map to
    /// `ConfigAction::Print`.
    pub fn into_action(self) -> ConfigAction {
        match self.action {
            None | Some(ConfigSubcommand::Print) => ConfigAction::Print,
            Some(ConfigSubcommand::List) => ConfigAction::List,
            Some(ConfigSubcommand::Validate) => ConfigAction::Validate,
            Some(ConfigSubcommand::Generate { output }) => ConfigAction::Generate { output },
            Some(ConfigSubcommand::Get { key }) => ConfigAction::Get { key },
        }
    }
}
