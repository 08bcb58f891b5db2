//! shimwright
//!
//! Generates a native C shim and a matching Go host wrapper from a `.shim`
//! schema whose messages, fields, enums and files carry binding rules.
//!
//! - `generate_from_path` compiles a schema with its imports and renders both artifacts
//! - `write_artifacts` writes them all-or-nothing
//! - `plugin_json` answers a JSON plugin request

use std::fs;
use std::path::{Path, PathBuf};

pub use shimwright_compiler::config::GeneratorConfig;
pub use shimwright_compiler::error::{Artifact, ShimError};
pub use shimwright_compiler::generator::{generate, run_plugin, GeneratedFile};
pub use shimwright_schema::{CodeGeneratorRequest, CodeGeneratorResponse, FileDescriptor};

pub mod schema {
    pub use shimwright_schema::*;
}

pub mod compiler {
    pub use shimwright_compiler::*;
}

/// Compiles `path` and its imports, then renders both artifacts.
pub fn generate_from_path(path: &Path, config: &GeneratorConfig) -> Result<Vec<GeneratedFile>, ShimError> {
    let files = shimwright_compiler::compile_schema(path, &config.import_paths)?;
    generate(&files, config)
}

/// The compiled descriptor set of `path` as pretty-printed JSON.
pub fn descriptors_to_json(path: &Path, import_paths: &[PathBuf]) -> Result<String, ShimError> {
    let files = shimwright_compiler::compile_schema(path, import_paths)?;
    Ok(serde_json::to_string_pretty(&files)?)
}

/// Writes every file into `out_dir`. If any write fails, the files already
/// written by this call are removed again.
pub fn write_artifacts(files: &[GeneratedFile], out_dir: &Path) -> Result<Vec<PathBuf>, ShimError> {
    fs::create_dir_all(out_dir)?;
    let mut written: Vec<PathBuf> = Vec::with_capacity(files.len());
    for file in files {
        let path = out_dir.join(&file.name);
        if let Err(err) = fs::write(&path, &file.content) {
            for done in &written {
                if let Err(cleanup) = fs::remove_file(done) {
                    tracing::warn!(path = %done.display(), error = %cleanup, "failed to remove partial output");
                }
            }
            return Err(err.into());
        }
        tracing::debug!(path = %path.display(), "wrote artifact");
        written.push(path);
    }
    Ok(written)
}

/// Answers a plugin request given as JSON with a JSON response.
///
/// Generation failures and malformed requests are both reported in the
/// response's `error` field.
pub fn plugin_json(input: &str, config: &GeneratorConfig) -> Result<String, ShimError> {
    let response = match serde_json::from_str::<CodeGeneratorRequest>(input) {
        Ok(request) => run_plugin(request, config),
        Err(err) => CodeGeneratorResponse::from_error(format!("invalid plugin request: {}", err)),
    };
    Ok(serde_json::to_string(&response)?)
}
