use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use shimwright_schema::{FileDescriptor, BOOTSTRAP_FILE};

use crate::{
    error::ShimError,
    parser::parse_schema,
    tokenizer::tokenize_schema,
};

/// Schema files that are always importable, whatever the import paths are.
pub const STANDARD_IMPORTS: [(&str, &str); 1] = [(
    BOOTSTRAP_FILE,
    include_str!("../schema/shimwright/rules.shim"),
)];

/// Looks up schema sources by their import name.
pub trait SourceResolver {
    /// Returns the text registered under `name`, or `None` if it is unknown.
    fn find_source(&self, name: &str) -> Result<Option<String>, ShimError>;
}

/// Resolves import names against a list of directories, then the standard imports.
#[derive(Debug, Clone, Default)]
pub struct FsResolver {
    pub import_paths: Vec<PathBuf>,
}

impl SourceResolver for FsResolver {
    fn find_source(&self, name: &str) -> Result<Option<String>, ShimError> {
        for dir in &self.import_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                tracing::trace!(path = %candidate.display(), "found schema source");
                return Ok(Some(fs::read_to_string(&candidate)?));
            }
        }
        Ok(standard_import(name))
    }
}

/// In-memory sources, mostly for tests and embedding. Standard imports are
/// available as well.
impl SourceResolver for BTreeMap<String, String> {
    fn find_source(&self, name: &str) -> Result<Option<String>, ShimError> {
        match self.get(name) {
            Some(text) => Ok(Some(text.clone())),
            None => Ok(standard_import(name)),
        }
    }
}

fn standard_import(name: &str) -> Option<String> {
    STANDARD_IMPORTS
        .iter()
        .find(|(std_name, _)| *std_name == name)
        .map(|(_, text)| text.to_string())
}

/// Tokenizes and parses a single schema source. Rules stay dynamic.
pub fn compile_source(name: &str, text: &str) -> Result<FileDescriptor, ShimError> {
    let tokens = tokenize_schema(name, text)?;
    parse_schema(name, &tokens)
}

/// Compiles the schema at `path` and everything it imports.
///
/// The directory containing `path` is searched first, then `import_paths`.
/// An import is looked up next to the file importing it before those
/// directories are searched. Returns the compile unit in import-topological order with the entry file
/// last and every rule normalized.
pub fn compile_schema(path: &Path, import_paths: &[PathBuf]) -> Result<Vec<FileDescriptor>, ShimError> {
    let entry = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ShimError::ConfigError(format!("invalid schema path {}", path.display())))?
        .to_string();

    let mut search = Vec::with_capacity(import_paths.len() + 1);
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => search.push(dir.to_path_buf()),
        _ => search.push(PathBuf::from(".")),
    }
    search.extend(import_paths.iter().cloned());

    compile_with(&entry, &FsResolver { import_paths: search })
}

/// Same as [`compile_schema`] but with a caller-provided source lookup.
#[tracing::instrument(level = "debug", skip(resolver))]
pub fn compile_with<R: SourceResolver + ?Sized>(entry: &str, resolver: &R) -> Result<Vec<FileDescriptor>, ShimError> {
    let mut loader = Loader {
        resolver,
        done:     HashSet::new(),
        visiting: Vec::new(),
        files:    Vec::new(),
    };

    let text = resolver.find_source(entry)?.ok_or_else(|| ShimError::ImportError {
        file:   entry.to_string(),
        import: entry.to_string(),
        reason: "file not found".to_string(),
    })?;
    loader.load(entry, &text)?;

    let mut files = loader.files;
    for file in &mut files {
        file.normalize_rules()?;
    }
    tracing::debug!(count = files.len(), "compiled schema files");
    Ok(files)
}

struct Loader<'r, R: SourceResolver + ?Sized> {
    resolver: &'r R,
    done:     HashSet<String>,
    visiting: Vec<String>,
    files:    Vec<FileDescriptor>,
}

impl<'r, R: SourceResolver + ?Sized> Loader<'r, R> {
    fn load(&mut self, name: &str, text: &str) -> Result<(), ShimError> {
        self.visiting.push(name.to_string());
        let desc = compile_source(name, text)?;

        for import in &desc.dependencies {
            let (resolved, source) = self.locate(name, import)?.ok_or_else(|| ShimError::ImportError {
                file:   name.to_string(),
                import: import.clone(),
                reason: "file not found".to_string(),
            })?;
            if self.done.contains(&resolved) {
                continue;
            }
            if self.visiting.contains(&resolved) {
                return Err(ShimError::ImportError {
                    file:   name.to_string(),
                    import: resolved,
                    reason: format!("import cycle through {}", self.visiting.join(" -> ")),
                });
            }
            self.load(&resolved, &source)?;
        }

        self.visiting.pop();
        self.done.insert(name.to_string());
        self.files.push(desc);
        Ok(())
    }

    /// Finds `import` next to `importer` first, then as given. Returns the
    /// name the file is known by in the compile unit along with its text.
    fn locate(&self, importer: &str, import: &str) -> Result<Option<(String, String)>, ShimError> {
        if let Some((dir, _)) = importer.rsplit_once('/') {
            let sibling = format!("{}/{}", dir, import);
            if let Some(text) = self.resolver.find_source(&sibling)? {
                tracing::trace!(import, resolved = %sibling, "import found next to its importer");
                return Ok(Some((sibling, text)));
            }
        }
        Ok(self.resolver.find_source(import)?.map(|text| (import.to_string(), text)))
    }
}
