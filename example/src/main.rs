// example/src/main.rs

use std::env;
use std::path::{Path, PathBuf};

use shimwright::{generate_from_path, write_artifacts, GeneratorConfig, ShimError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), ShimError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Output directory is the first argument, `generated/` next to the schema otherwise.
    let schema = Path::new(env!("CARGO_MANIFEST_DIR")).join("schema/graph.shim");
    let out_dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("generated"));

    let config = GeneratorConfig { host_package: "graph".to_string(), ..Default::default() };
    let files = generate_from_path(&schema, &config)?;

    for file in &files {
        let exported = file
            .content
            .lines()
            .filter(|line| line.starts_with("BRIDGE_EXPORT") || line.starts_with("func "))
            .count();
        println!("{}: {} lines, {} exported entry points", file.name, file.content.lines().count(), exported);
    }

    for path in write_artifacts(&files, &out_dir)? {
        tracing::info!(path = %path.display(), "written");
    }
    Ok(())
}
