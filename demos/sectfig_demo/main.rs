//! # sectfig demo application
//!
//! A sample experiment runner that shows how to wire
//! [sectfig](https://docs.rs/sectfig) into a clap application. It trains
//! nothing; it exists to demonstrate and manually verify sectfig's features
//! against `experiment.yml` and `definitions.yml` next to this file.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example sectfig_demo -- run
//! cargo run --example sectfig_demo -- config list -p "default<-gpu"
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature                 | How to exercise it                                                        |
//! |-------------------------|---------------------------------------------------------------------------|
//! | Section patching        | `cargo run --example sectfig_demo -- run --patch gpu`                     |
//! | Explicit patch chain    | `cargo run --example sectfig_demo -- run --patch "default<-gpu<-debug"`   |
//! | Delete token            | `--patch "default<-debug"` drops `model.depth`, the definitions default 4 fills in |
//! | Environment markers     | `DEMO_DATA_DIR=/mnt/data cargo run --example sectfig_demo -- run`         |
//! | Root and relative keys  | `model.seed` is `${seed}`, `model.file` climbs with `${..name}`           |
//! | Per-run tag             | `output` ends in `${?gen_hash}`, the same for the whole process           |
//! | Registered function     | `${?host}` in `--set` values, e.g. `--set name=${?host}`                  |
//! | Overrides               | `cargo run --example sectfig_demo -- run --set model.depth=3`             |
//! | `config print`          | `cargo run --example sectfig_demo -- config print -p gpu`                 |
//! | `config list`           | `cargo run --example sectfig_demo -- config list -p gpu`                  |
//! | `config get`            | `cargo run --example sectfig_demo -- config get model.name -p gpu`        |
//! | `config validate`       | `cargo run --example sectfig_demo -- config validate --set model.depth=99` |
//! | `config generate`       | `cargo run --example sectfig_demo -- config generate`                     |

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sectfig::{Config, ConfigArgs, ConfigBuilder, Native, Sectfig, registry};

const DEFAULT_DATA_DIR: &str = "/tmp/sectfig-demo";

// ---------------------------------------------------------------------------
// CLI definitions
// ---------------------------------------------------------------------------

/// sectfig demo: a pretend experiment runner driven by sectioned config.
#[derive(Parser, Debug)]
#[command(name = "sectfig-demo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the configuration and describe the run it would start.
    Run {
        /// Sections to merge, e.g. "default<-gpu".
        #[arg(short, long, default_value = "default")]
        patch: String,

        /// Override a value after patching: `key=value`. Repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// Inspect the configuration (print, list, validate, generate, get).
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Builder helper
// ---------------------------------------------------------------------------

fn demo_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos/sectfig_demo")
        .join(name)
}

/// A builder reading the bundled files, with a fallback data directory when
/// `DEMO_DATA_DIR` is unset.
fn make_builder() -> ConfigBuilder {
    let mut builder = Sectfig::builder()
        .file(demo_file("experiment.yml"))
        .definitions_file(demo_file("definitions.yml"));
    if std::env::var_os("DEMO_DATA_DIR").is_none() {
        builder = builder.env_vars([("DEMO_DATA_DIR", DEFAULT_DATA_DIR)]);
    }
    builder
}

/// Like [`make_builder`], but `--config` / `--defs` on the command line
/// replace the bundled files instead of layering on top of them.
fn config_builder(args: &ConfigArgs) -> ConfigBuilder {
    if args.config.is_empty() && args.defs.is_none() {
        return args.apply_to(make_builder().patch("default"));
    }
    let mut builder = Sectfig::builder();
    if args.config.is_empty() {
        builder = builder.file(demo_file("experiment.yml"));
    }
    if args.defs.is_none() {
        builder = builder.definitions_file(demo_file("definitions.yml"));
    }
    if std::env::var_os("DEMO_DATA_DIR").is_none() {
        builder = builder.env_vars([("DEMO_DATA_DIR", DEFAULT_DATA_DIR)]);
    }
    args.apply_to(builder.patch("default"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// The resolved value at `key`, strings bare and everything else as JSON.
fn show(config: &Config, key: &str) -> sectfig::Result<String> {
    Ok(match config.value(key)? {
        Native::String(s) => s,
        other => other.to_string(),
    })
}

fn run(patch: &str, overrides: &[String]) -> sectfig::Result<()> {
    let builder = overrides
        .iter()
        .fold(make_builder().patch(patch), |b, entry| b.override_str(entry))
        .use_global(true);
    let loaded = builder.load_with_report()?;
    for section in &loaded.missing {
        eprintln!("warning: section {section:?} not found, skipped");
    }
    if !loaded.report.is_ok() {
        eprintln!("{}", loaded.report);
        std::process::exit(2);
    }

    // Anything in the program can now read the installed configuration.
    let config = registry::current();
    println!("sections  {}", loaded.found.join(" <- "));
    println!("name      {}", show(&config, "name")?);
    println!("device    {}", show(&config, "device")?);
    println!(
        "model     {} (depth {}, seed {})",
        show(&config, "model.name")?,
        show(&config, "model.depth")?,
        show(&config, "model.seed")?
    );
    println!(
        "artifact  {}/{}",
        show(&config, "output")?,
        show(&config, "model.file")?
    );
    if config.is_truthy("verbose")? {
        println!();
        print!("{}", sectfig::to_yaml_string(&config.to_native()?)?);
    }
    for warning in config.warnings() {
        eprintln!("unresolved: {warning}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    registry::register_function("host", || {
        std::env::var("HOSTNAME")
            .unwrap_or_else(|_| "localhost".to_string())
            .into()
    });

    match cli.command {
        Commands::Run { patch, overrides } => {
            run(&patch, &overrides).unwrap_or_else(|e| {
                eprintln!("Failed to load config:\n{e}");
                std::process::exit(1);
            });
        }
        Commands::Config(args) => {
            let builder = config_builder(&args);
            let action = args.into_action();
            builder.handle_and_print(&action).unwrap_or_else(|e| {
                eprintln!("Config error:\n{e}");
                std::process::exit(1);
            });
        }
    }
}
