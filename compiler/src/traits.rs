use crate::{
    error::{Artifact, ShimError},
    types::{File, Model},
};

/// One of the two synchronized outputs of a generation run.
pub trait ArtifactGenerator {
    fn artifact(&self) -> Artifact;

    /// Output file name, relative to the output directory.
    fn file_name(&self) -> &str;

    /// Renders the artifact for `file`. The result is not yet verified.
    fn render(&self, model: &Model, file: &File) -> Result<String, ShimError>;
}
