use serde::{Deserialize, Serialize};

use crate::descriptor::FileDescriptor;

/// Input of a plugin-mode generation run.
///
/// `schema_file` is the whole compile unit in import-topological order; the
/// last entry is the file bindings are generated for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeGeneratorRequest {
    pub file_to_generate: Vec<String>,
    pub parameter:        Option<String>,
    pub schema_file:      Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeGeneratorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub file:  Vec<ResponseFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFile {
    pub name:    String,
    pub content: String,
}

impl CodeGeneratorResponse {
    pub fn from_error(msg: impl Into<String>) -> Self {
        CodeGeneratorResponse {
            error: Some(msg.into()),
            file:  Vec::new(),
        }
    }
}

#[test]
fn request_accepts_dynamic_rules_from_json() {
    let json = r#"{
        "parameter": "prefix=gv_",
        "schema_file": [{
            "name": "point.shim",
            "package": "geo",
            "messages": [{
                "name": "Point",
                "rule": { "dynamic": [123, 125] },
                "fields": [{ "name": "x", "number": 1, "type": "int32" }]
            }]
        }]
    }"#;
    let req: CodeGeneratorRequest = serde_json::from_str(json).unwrap();
    assert_eq!(req.parameter.as_deref(), Some("prefix=gv_"));
    let message = &req.schema_file[0].messages[0];
    assert!(message.rule.as_ref().unwrap().is_dynamic());
    assert_eq!(message.fields[0].label, crate::descriptor::FieldLabel::Optional);
}

#[test]
fn error_response_has_no_files() {
    let resp = CodeGeneratorResponse::from_error("boom");
    let json = serde_json::to_string(&resp).unwrap();
    assert_eq!(json, r#"{"error":"boom","file":[]}"#);
}
