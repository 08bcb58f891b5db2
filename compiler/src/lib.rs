//! shimwright-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.shim` IDL files and an import-aware loader,
//!  2) The reference resolver that turns descriptors and their rules into a typed [`types::Model`],
//!  3) The shared boundary calling convention (`signature`),
//!  4) Code generation of the native C shim (`gen_c`) and the Go host wrapper (`gen_go`),
//!  5) Post-render syntax verification, configuration and the plugin driver,
//!  6) Error types (`ShimError`).

pub mod error;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod compiler;
pub mod types;
pub mod resolver;
pub mod signature;
pub mod gen_c;
pub mod gen_go;
pub mod verifier;
pub mod traits;
pub mod config;
pub mod generator;

pub use compiler::{compile_schema, compile_source, compile_with};
pub use config::GeneratorConfig;
pub use error::{Artifact, ShimError};
pub use gen_c::generate_c;
pub use gen_go::generate_go;
pub use generator::{generate, run_plugin, GeneratedFile};
pub use resolver::resolve;
