//! Sectioned, self-referencing configuration for Rust applications. Write one
//! document with named sections, pick the sections you want, and go.
//!
//! Sectfig loads nested documents (YAML, TOML or JSON), merges the sections
//! you name into one effective tree, resolves `${...}` substitution markers
//! lazily, and validates the result against an optional definitions document
//! that supplies defaults, type coercion, and checks.
//!
//! ```ignore
//! let config = Sectfig::builder()
//!     .file("experiment.yml")
//!     .patch("default<-gpu")
//!     .definitions_file("definitions.yml")
//!     .load()?;
//!
//! let depth = config.value("model.depth")?;
//! ```
//!
//! # Why sectfig
//!
//! Experiment and deployment configs tend to come in families: a baseline, a
//! GPU variant, a debug variant, a variant of the GPU variant. Copying whole
//! files drifts; templating engines turn config into code. Sectfig keeps one
//! document and lets each section describe only what differs, then merges the
//! sections in the order you ask for.
//!
//! # Sections and patches
//!
//! A document is a mapping of sections. A [`PatchSpec`] names sections in
//! merge order, written `"a<-b<-c"` or as a list:
//!
//! ```yaml
//! default:
//!   model: {name: RF, depth: 8}
//! gpu:
//!   sectfig.patch: default     # inherit before applying this section
//!   device: cuda
//!   model: {depth: 16}
//! debug:
//!   model: {depth: \}          # delete the key from what came before
//! ```
//!
//! Mappings merge key by key; sequences and scalars are replaced wholesale;
//! the bare backslash deletes a key. Later sections always win, so a merge is
//! never ambiguous. Requested sections that do not exist are skipped with a
//! warning and reported; an inheritance cycle is an error.
//!
//! Without a patch the whole document is the configuration.
//!
//! # Substitution markers
//!
//! Any string value may reference other data. Markers are resolved when a
//! value is read, never when it is written, so changing `a` changes every
//! value that references it.
//!
//! | Marker | Meaning |
//! |--------|---------|
//! | `${.key}` | value at `key`, relative to the enclosing mapping, falling back to the root |
//! | `${..key}` | each extra dot walks one mapping further up |
//! | `${key}` | value at `key`, looked up from the root only |
//! | `${$NAME}` | environment variable `NAME` |
//! | `${?name}` | text returned by the registered function `name` |
//! | `${!name}` | native value returned by `name` (the value must be exactly the marker) |
//!
//! Markers nest (`${.paths.${$HOST}}`). A value that is exactly one `${.key}`
//! marker takes the referenced value's native type; embedded markers are
//! stringified. Unresolvable references are soft: they become empty strings
//! and are recorded as [`Unresolved`] warnings. A reference cycle is the one
//! hard failure, reported as [`SectfigError::SubstitutionCycle`].
//!
//! # Definitions
//!
//! A definitions document describes the tree. Child keys carry a leading
//! dot; bare keys are options ([`SchemaOption`]):
//!
//! ```yaml
//! .model:
//!   .depth:
//!     dtype: int
//!     default: 4
//!     sdesc: Maximum tree depth
//!     checks:
//!       - between: {lower: 1, upper: 32, inclusive: both}
//! ```
//!
//! Validation injects defaults, reports missing required keys, coerces values
//! to their declared [`Dtype`], runs [`Check`]s, and (in strict mode) reports
//! undeclared keys. Problems are collected into a [`ValidationReport`] rather
//! than raised; [`ConfigBuilder::load`] turns a non-empty report into
//! [`SectfigError::Invalid`], [`ConfigBuilder::load_with_report`] hands it to
//! you.
//!
//! # Layer precedence
//!
//! ```text
//! Definitions defaults   .key: {default: ...}, only where nothing else set a value
//!        ↑ overridden by
//! Patched sections       in patch order, later sections win
//!        ↑ overridden by
//! Overrides              .set_override() / --set key=value
//! ```
//!
//! # Global configuration
//!
//! [`use_global(true)`](ConfigBuilder::use_global) installs the built
//! configuration in the [`registry`], where any part of the program can read
//! a deep copy with [`registry::current`]. Functions registered with
//! [`registry::register_function`] are available to every builder created
//! afterwards.
//!
//! # Core library without a CLI framework
//!
//! Loading, validation and the `print`/`list`/`get`/`generate` operations all
//! work through [`ConfigBuilder`] and [`ConfigAction`]. For
//! [clap](https://docs.rs/clap) users, an optional adapter (the `cli` module,
//! behind the `clap` Cargo feature, on by default) provides [`ConfigArgs`]:
//!
//! ```toml
//! sectfig = { version = "...", default-features = false }
//! ```
//!
//! # Logging
//!
//! Sectfig emits [`tracing`](https://docs.rs/tracing) events: `debug` for
//! loading and merge steps, `warn` for skipped sections and unresolved
//! markers. It never installs a subscriber.
//!
//! # Error handling
//!
//! Construction failures (malformed documents, bad definitions, I/O, cycles)
//! return [`SectfigError`] with the offending path. Absence, unresolved
//! markers and validation issues are data, never errors.

pub mod error;
pub mod patch;
pub mod registry;
pub mod types;

mod builder;
mod checks;
#[cfg(feature = "clap")]
mod cli;
mod config;
mod dtype;
mod env;
mod format;
mod functions;
pub(crate) mod merge;
mod node;
mod ops;
mod overrides;
mod schema;
mod substitute;
mod validate;

#[cfg(test)]
mod fixtures;

pub use builder::{ConfigBuilder, Loaded, Sectfig};
pub use checks::{Bounds, Check, CheckTable, FileSystem, Inclusive, StdFileSystem};
#[cfg(feature = "clap")]
pub use cli::{ConfigArgs, ConfigSubcommand};
pub use config::Config;
pub use dtype::Dtype;
pub use env::Environment;
pub use error::{Result, SectfigError};
pub use format::{Format, load_file, load_str, to_yaml_string};
pub use functions::FunctionTable;
pub use node::{Container, Node, Value};
pub use ops::ConfigResult;
pub use overrides::parse_override;
pub use patch::PatchSpec;
pub use schema::{Schema, SchemaOption};
pub use substitute::{Unresolved, has_markers};
pub use types::{ConfigAction, Key, Native, NativeMap};
pub use validate::{IssueKind, ValidationIssue, ValidationReport};
