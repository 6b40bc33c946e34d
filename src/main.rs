use clap::{Parser, Subcommand, ValueEnum};
use lona_logic::compiler::dump::{format_ast_with_types, format_pattern_types, format_value, node_types};
use lona_logic::compiler::prelude::PreludeLibraries;
use lona_logic::compiler::{Compilation, Node};
use lona_logic::config::GenerateConfig;
use lona_logic::package::{self, ProjectManifest};
use lona_logic::{TokioFileSystem, generate, read_programs};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Parser)]
#[command(name = "logic")]
#[command(about = "Resolve, type check and evaluate Lona logic files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Load libraries from this directory instead of the bundled ones
    #[arg(long, global = true, value_name = "DIR")]
    libraries: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new logic project
    Init {
        /// Project name (defaults to directory name)
        name: Option<String>,
    },
    /// Resolve and type check logic files
    Check {
        /// Logic files (defaults to the logic.toml files if in a project)
        files: Vec<PathBuf>,
    },
    /// Evaluate the variables declared in logic files
    Eval {
        /// Logic files (defaults to the logic.toml files if in a project)
        files: Vec<PathBuf>,

        /// Evaluate a single node, by id or dotted declaration path
        #[arg(long)]
        node: Option<String>,

        /// Output format (human, json)
        #[arg(long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Dump the typed AST to stderr
        #[arg(long)]
        dump_ast: bool,

        /// Dump declaration types to stderr
        #[arg(long)]
        dump_types: bool,
    },
    /// List the standard library declarations used by logic files
    Deps {
        /// Logic files (defaults to the logic.toml files if in a project)
        files: Vec<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(formatter)
        .init();
}

/// Configuration from the command line, or from logic.toml when no files are given.
fn generate_config(files: Vec<PathBuf>, libraries: Option<PathBuf>) -> Result<GenerateConfig, String> {
    let config = if files.is_empty() {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match ProjectManifest::load(&cwd) {
            Ok(manifest) => manifest.generate_config(&cwd),
            Err(_) => {
                return Err(format!(
                    "error: no file specified and no {} found\nusage: logic <command> <files...> or run from a logic project directory",
                    package::MANIFEST_FILE
                ));
            }
        }
    } else {
        GenerateConfig::new(files)
    };
    Ok(match libraries {
        Some(dir) => config.with_libraries_dir(dir),
        None => config,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Init { name } => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            package::init_project(&cwd, name.as_deref())
        }
        Commands::Check { files } => match generate_config(files, cli.libraries) {
            Ok(config) => check(&config).await,
            Err(e) => Err(e),
        },
        Commands::Eval {
            files,
            node,
            format,
            dump_ast,
            dump_types,
        } => match generate_config(files, cli.libraries) {
            Ok(config) => {
                let options = EvalOptions {
                    node,
                    format,
                    dump_ast,
                    dump_types,
                };
                eval(&config, &options).await
            }
            Err(e) => Err(e),
        },
        Commands::Deps { files } => match generate_config(files, cli.libraries) {
            Ok(config) => deps(&config).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn compile(config: &GenerateConfig) -> Result<Compilation, String> {
    generate(config, TokioFileSystem)
        .await
        .map_err(|e| format!("error: {}", e))
}

async fn check(config: &GenerateConfig) -> Result<(), String> {
    let compilation = compile(config).await?;
    debug!(
        variables = compilation.user_variables().len(),
        "checked logic files"
    );
    println!("Type check passed.");
    Ok(())
}

struct EvalOptions {
    node: Option<String>,
    format: OutputFormat,
    dump_ast: bool,
    dump_types: bool,
}

async fn eval(config: &GenerateConfig, options: &EvalOptions) -> Result<(), String> {
    let compilation = compile(config).await?;

    if options.dump_ast {
        let types = node_types(&compilation.unification, &compilation.substitution);
        eprintln!("== AST ==");
        eprint!("{}", format_ast_with_types(&compilation.program, &types));
    }
    if options.dump_types {
        eprintln!("== Types ==");
        eprintln!(
            "{}",
            format_pattern_types(
                &compilation.scope,
                &compilation.unification,
                &compilation.substitution
            )
        );
    }

    let targets: Vec<(String, String)> = match &options.node {
        Some(node) => {
            let path: Vec<&str> = node.split('.').collect();
            let id = compilation
                .scope
                .namespace
                .get(&path)
                .unwrap_or(node.as_str())
                .to_string();
            vec![(node.clone(), id)]
        }
        None => compilation.user_variables(),
    };

    let mut values = BTreeMap::new();
    for (name, id) in targets {
        let value = compilation
            .evaluate(&id)
            .map_err(|e| format!("error: failed to evaluate {}: {}", name, e))?;
        values.insert(name, value);
    }

    match options.format {
        OutputFormat::Human => {
            for (name, value) in &values {
                match value {
                    Some(value) => println!("{} = {}", name, format_value(value)),
                    None => println!("{} = <unknown>", name),
                }
            }
        }
        OutputFormat::Json => {
            let json: BTreeMap<&str, Option<&lona_logic::compiler::Value>> = values
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_deref()))
                .collect();
            let output = serde_json::to_string_pretty(&json)
                .map_err(|e| format!("error: failed to serialize values: {}", e))?;
            println!("{}", output);
        }
    }
    Ok(())
}

async fn deps(config: &GenerateConfig) -> Result<(), String> {
    let program = read_programs(config, TokioFileSystem)
        .await
        .map_err(|e| format!("error: {}", e))?;

    let libraries = PreludeLibraries::load(&config.library_resolver())
        .map_err(|e| format!("error: {}", e))?;
    let dependencies = libraries.flag_for_prelude_dependencies(Node::Program(&program));
    let names: BTreeSet<&str> = dependencies.values().map(|d| d.name()).collect();
    for name in names {
        println!("{}", name);
    }
    Ok(())
}
