use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shimwright::{descriptors_to_json, generate_from_path, plugin_json, write_artifacts, GeneratorConfig, ShimError};

#[derive(Parser)]
#[command(name = "shimw")]
#[command(about = "Generate a native C shim and a Go host wrapper from a .shim schema", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render `bind.c` and `bind.go` for a schema file
    Generate {
        /// Input `.shim` file; bindings are generated for this file
        #[arg(short, long)]
        input: PathBuf,

        /// Extra import directories, searched after the input's own directory
        #[arg(short = 'I', long = "import-path")]
        import_paths: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// JSON generator config
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Symbol prefix of the exported shim functions
        #[arg(long)]
        prefix: Option<String>,

        /// Go package of the host wrapper
        #[arg(long)]
        package: Option<String>,
    },

    /// Print the compiled descriptor set of a schema as JSON
    Descriptors {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short = 'I', long = "import-path")]
        import_paths: Vec<PathBuf>,
    },

    /// Read a JSON plugin request on stdin and answer on stdout
    Plugin {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("warn"),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<GeneratorConfig, ShimError> {
    match path {
        Some(path) => GeneratorConfig::load(path),
        None => Ok(GeneratorConfig::default()),
    }
}

fn main() -> Result<(), ShimError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate { input, import_paths, output, config, prefix, package } => {
            let mut config = load_config(config.as_ref())?;
            config.import_paths.extend(import_paths);
            if let Some(prefix) = prefix {
                config.symbol_prefix = prefix;
            }
            if let Some(package) = package {
                config.host_package = package;
            }
            config.validate()?;
            tracing::info!(input = %input.display(), output = %output.display(), "generating bindings");

            let files = generate_from_path(&input, &config)?;
            if files.is_empty() {
                println!("{} only describes the rule vocabulary, nothing to generate", input.display());
                return Ok(());
            }
            for path in write_artifacts(&files, &output)? {
                println!("Generated {}", path.display());
            }
            Ok(())
        }

        Commands::Descriptors { input, import_paths } => {
            println!("{}", descriptors_to_json(&input, &import_paths)?);
            Ok(())
        }

        Commands::Plugin { config } => {
            let config = load_config(config.as_ref())?;
            let mut request = String::new();
            io::stdin().read_to_string(&mut request)?;
            let reply = plugin_json(&request, &config)?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(reply.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
