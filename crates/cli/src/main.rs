mod matching;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use recordlink_eval::{ConfigurationSet, MatcherSettings, Transform, TransformRegistry};
use recordlink_interchange::ConfigDocument;
use recordlink_storage::Value;
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Record matching: blocking, classification and diagnostics.
#[derive(Parser)]
#[command(name = "recordlink", version, about = "Record matching toolkit")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log at debug level (overridden by RECORDLINK_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    /// TOML file with engine settings
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a match configuration document
    Validate {
        /// Path to the configuration JSON file
        config: PathBuf,
    },

    /// Find candidate records for an input record
    Block {
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Block and classify candidates for an input record
    Match {
        #[command(flatten)]
        args: MatchArgs,
    },

    /// Apply a single transform to one or two values
    Transform {
        /// Transform name (e.g. soundex, jaro_winkler)
        name: String,
        /// First operand
        a: String,
        /// Second operand (binary transforms only)
        b: Option<String>,
        /// Transform argument; repeat for several
        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

#[derive(clap::Args)]
pub(crate) struct MatchArgs {
    /// Path to the configuration JSON file
    #[arg(long)]
    pub config: PathBuf,
    /// Configuration name to use (default: the document id)
    #[arg(long)]
    pub name: Option<String>,
    /// Path to a JSON array of records to match against
    #[arg(long)]
    pub records: PathBuf,
    /// Path to the input record JSON file
    #[arg(long)]
    pub input: PathBuf,
    /// Record key to leave out of the candidates; repeat for several
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,
    /// Record a diagnostics session and include it in the output
    #[arg(long)]
    pub diagnostics: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = match &cli.settings {
        Some(path) => load_settings(path, cli.output, cli.quiet),
        None => MatcherSettings::default(),
    };

    match cli.command {
        Commands::Validate { config } => {
            cmd_validate(&config, cli.output, cli.quiet);
        }
        Commands::Block { args } => {
            matching::cmd_block(&args, settings, cli.output, cli.quiet);
        }
        Commands::Match { args } => {
            matching::cmd_match(&args, settings, cli.output, cli.quiet);
        }
        Commands::Transform { name, a, b, args } => {
            cmd_transform(&name, &a, b.as_deref(), &args, cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("RECORDLINK_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: &Path, output: OutputFormat, quiet: bool) -> MatcherSettings {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading settings '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match toml::from_str(&text) {
        Ok(settings) => settings,
        Err(e) => {
            let msg = format!("error parsing settings '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn read_json(path: &Path, what: &str, output: OutputFormat, quiet: bool) -> serde_json::Value {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading {} '{}': {}", what, path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_validate(config_path: &Path, output: OutputFormat, quiet: bool) {
    let doc = read_json(config_path, "configuration", output, quiet);

    let document = match recordlink_interchange::from_json(&doc) {
        Ok(d) => d,
        Err(e) => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("invalid configuration");
                        eprintln!("  - {}", e);
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "valid": false,
                        "errors": [format!("{}", e)]
                    });
                    eprintln!(
                        "{}",
                        serde_json::to_string_pretty(&json).unwrap_or_default()
                    );
                }
            }
            process::exit(1);
        }
    };

    // Runtime conversion catches what the document layer cannot: malformed
    // blocking expressions, unknown transform names and literal comparisons
    // without a binary transform.
    let registry = TransformRegistry::standard();
    if let Err(e) =
        ConfigurationSet::from_document(&document).and_then(|set| set.check(&registry))
    {
        let msg = format!("invalid configuration: {}", e);
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    let (kind, count) = match &document {
        ConfigDocument::Configuration(_) => ("MatchConfiguration", 1),
        ConfigDocument::Collection(c) => ("MatchConfigurationCollection", c.configurations.len()),
    };

    if !quiet {
        match output {
            OutputFormat::Text => println!("valid {} '{}'", kind, document.id()),
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": true,
                    "kind": kind,
                    "id": document.id(),
                    "configurations": count
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_default()
                );
            }
        }
    }
}

fn cmd_transform(
    name: &str,
    a: &str,
    b: Option<&str>,
    args: &[String],
    output: OutputFormat,
    quiet: bool,
) {
    let registry = TransformRegistry::standard();
    let transform = match registry.resolve(name) {
        Ok(t) => t,
        Err(e) => {
            report_error(&format!("{}", e), output, quiet);
            process::exit(1);
        }
    };
    let a = Value::parse_literal(a);
    let args: Vec<Value> = args.iter().map(|s| Value::parse_literal(s)).collect();

    let result = match (transform, b) {
        (Transform::Unary(f), None) => recordlink_eval::transforms::apply_unary(f.as_ref(), &a, &args),
        (Transform::Binary(f), Some(b)) => {
            let b = Value::parse_literal(b);
            recordlink_eval::transforms::apply_binary(f.as_ref(), &a, &b, &args)
        }
        (Transform::Unary(_), Some(_)) => {
            let msg = format!("transform '{}' is unary and takes one value", name);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
        (Transform::Binary(_), None) => {
            let msg = format!("transform '{}' is binary and takes two values", name);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    match result {
        Ok(value) => {
            if !quiet {
                match output {
                    OutputFormat::Text => match value {
                        Some(v) => println!("{}", v),
                        None => println!("null"),
                    },
                    OutputFormat::Json => {
                        let json = serde_json::json!({
                            "transform": name,
                            "result": value.as_ref().map(Value::to_json),
                        });
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&json).unwrap_or_default()
                        );
                    }
                }
            }
        }
        Err(e) => {
            report_error(&format!("{}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
