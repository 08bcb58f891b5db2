use shimwright_schema::{CodeGeneratorRequest, CodeGeneratorResponse, FileDescriptor, ResponseFile};

use crate::{
    config::GeneratorConfig,
    error::{Artifact, ShimError},
    gen_c::generate_c,
    gen_go::generate_go,
    resolver::resolve,
    traits::ArtifactGenerator,
    types::{File, Model},
    verifier::verify_artifact,
};

/// A rendered and verified output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub name:    String,
    pub content: String,
}

pub struct NativeShimGenerator<'c> {
    config: &'c GeneratorConfig,
}

pub struct HostWrapperGenerator<'c> {
    config: &'c GeneratorConfig,
}

impl<'c> NativeShimGenerator<'c> {
    pub fn new(config: &'c GeneratorConfig) -> Self {
        NativeShimGenerator { config }
    }
}

impl<'c> HostWrapperGenerator<'c> {
    pub fn new(config: &'c GeneratorConfig) -> Self {
        HostWrapperGenerator { config }
    }
}

impl ArtifactGenerator for NativeShimGenerator<'_> {
    fn artifact(&self) -> Artifact {
        Artifact::NativeShim
    }

    fn file_name(&self) -> &str {
        &self.config.native_file
    }

    fn render(&self, model: &Model, file: &File) -> Result<String, ShimError> {
        generate_c(model, file, &self.config.symbol_prefix)
    }
}

impl ArtifactGenerator for HostWrapperGenerator<'_> {
    fn artifact(&self) -> Artifact {
        Artifact::HostWrapper
    }

    fn file_name(&self) -> &str {
        &self.config.host_file
    }

    fn render(&self, model: &Model, file: &File) -> Result<String, ShimError> {
        generate_go(model, file, &self.config.symbol_prefix, &self.config.host_package)
    }
}

/// Generates the native shim and the host wrapper for the last file of a
/// compile unit.
///
/// Rules still in raw form are normalized first. Returns no files when the
/// last file is the bootstrap schema. Either both artifacts come back rendered
/// and verified, or the first error does.
#[tracing::instrument(level = "debug", skip_all, fields(files = files.len()))]
pub fn generate(files: &[FileDescriptor], config: &GeneratorConfig) -> Result<Vec<GeneratedFile>, ShimError> {
    let target = files
        .last()
        .ok_or_else(|| ShimError::ConfigError("no schema files to generate from".to_string()))?;
    if target.name == config.bootstrap_file {
        tracing::info!(file = %target.name, "skipping the rule vocabulary schema");
        return Ok(Vec::new());
    }

    let mut files = files.to_vec();
    for file in &mut files {
        file.normalize_rules()?;
    }
    let model = resolve(&files)?;
    let file = model
        .files
        .last()
        .ok_or_else(|| ShimError::ConfigError("no schema files to generate from".to_string()))?;

    let generators: [&dyn ArtifactGenerator; 2] =
        [&NativeShimGenerator::new(config), &HostWrapperGenerator::new(config)];
    let mut out = Vec::with_capacity(generators.len());
    for generator in generators {
        let content = generator.render(&model, file)?;
        verify_artifact(generator.artifact(), &content)?;
        tracing::debug!(artifact = %generator.artifact(), bytes = content.len(), "artifact verified");
        out.push(GeneratedFile { name: generator.file_name().to_string(), content });
    }
    Ok(out)
}

/// Answers one plugin request. Failures are reported in the response.
pub fn run_plugin(request: CodeGeneratorRequest, config: &GeneratorConfig) -> CodeGeneratorResponse {
    match plugin_files(&request, config) {
        Ok(files) => CodeGeneratorResponse {
            error: None,
            file:  files
                .into_iter()
                .map(|f| ResponseFile { name: f.name, content: f.content })
                .collect(),
        },
        Err(err) => {
            tracing::warn!(error = %err, "plugin request failed");
            CodeGeneratorResponse::from_error(err.to_string())
        }
    }
}

fn plugin_files(request: &CodeGeneratorRequest, config: &GeneratorConfig) -> Result<Vec<GeneratedFile>, ShimError> {
    let mut config = config.clone();
    if let Some(parameter) = &request.parameter {
        config.apply_parameter(parameter)?;
    }
    generate(&request.schema_file, &config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use shimwright_schema::{MessageDescriptor, RuleSource, BOOTSTRAP_FILE};

    fn point() -> FileDescriptor {
        FileDescriptor {
            name: "point.shim".to_string(),
            package: "geo".to_string(),
            messages: vec![MessageDescriptor {
                name: "Point".to_string(),
                rule: Some(RuleSource::Dynamic(br#"{"alias":"point_t"}"#.to_vec())),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn renders_both_artifacts_with_configured_names() {
        let config = GeneratorConfig::default();
        let files = generate(&[point()], &config).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "bind.c");
        assert_eq!(files[1].name, "bind.go");
        assert!(files[0].content.contains("wasm_bridge_Point_new"));
        assert!(files[1].content.contains("func NewPoint("));
    }

    #[test]
    fn bootstrap_schema_yields_nothing() {
        let mut file = point();
        file.name = BOOTSTRAP_FILE.to_string();
        assert!(generate(&[file], &GeneratorConfig::default()).unwrap().is_empty());
    }

    #[test]
    fn empty_unit_is_an_error() {
        assert!(matches!(generate(&[], &GeneratorConfig::default()), Err(ShimError::ConfigError(_))));
    }

    #[test]
    fn plugin_applies_parameters() {
        let request = CodeGeneratorRequest {
            file_to_generate: vec!["point.shim".to_string()],
            parameter:        Some("prefix=gv_,package=geo".to_string()),
            schema_file:      vec![point()],
        };
        let response = run_plugin(request, &GeneratorConfig::default());
        assert_eq!(response.error, None);
        assert!(response.file[0].content.contains("gv_Point_new"));
        assert!(response.file[1].content.contains("\npackage geo\n"));
    }

    #[test]
    fn plugin_reports_errors_without_files() {
        let file = compile_source(
            "bad.shim",
            r#"package bad; message Cb { option message = {"funcptr":{"args":[{"kind":"int"}]}}; }"#,
        )
        .unwrap();
        let request = CodeGeneratorRequest { schema_file: vec![file], ..Default::default() };
        let response = run_plugin(request, &GeneratorConfig::default());
        assert!(response.file.is_empty());
        assert!(response.error.unwrap().contains("funcbaseptr"));
    }
}
