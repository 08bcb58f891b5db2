use serde::{Deserialize, Serialize};

use crate::rule::{
    EnumRule, EnumValueRule, FieldRule, FileRule, MessageRule, RuleDecodeError, RuleSource,
};

/// One compiled schema file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDescriptor {
    pub name:         String,
    pub package:      String,
    pub dependencies: Vec<String>,
    pub messages:     Vec<MessageDescriptor>,
    pub enums:        Vec<EnumDescriptor>,
    pub rule:         Option<RuleSource<FileRule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageDescriptor {
    pub name:            String,
    pub fields:          Vec<FieldDescriptor>,
    pub nested_messages: Vec<MessageDescriptor>,
    pub enums:           Vec<EnumDescriptor>,
    pub oneofs:          Vec<String>,
    pub rule:            Option<RuleSource<MessageRule>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name:        String,
    pub number:      i32,
    #[serde(default)]
    pub label:       FieldLabel,
    #[serde(rename = "type")]
    pub kind:        FieldType,
    /// Referenced message or enum name for `Message`, `Enum` and `Named`.
    #[serde(default)]
    pub type_name:   String,
    #[serde(default)]
    pub oneof_index: Option<usize>,
    #[serde(default)]
    pub rule:        Option<RuleSource<FieldRule>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLabel {
    #[default]
    Optional,
    Repeated,
}

/// Declared field type.
///
/// `Named` is a reference the front end could not classify; the resolver
/// looks it up as a message first, then as an enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Double,
    Float,
    Int64,
    Uint64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Bytes,
    Uint32,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
    Message,
    Enum,
    Named,
}

impl FieldType {
    /// Maps a scalar keyword of the schema language to its field type.
    pub fn from_keyword(word: &str) -> Option<FieldType> {
        let kind = match word {
            "double" => FieldType::Double,
            "float" => FieldType::Float,
            "int64" => FieldType::Int64,
            "uint64" => FieldType::Uint64,
            "int32" => FieldType::Int32,
            "fixed64" => FieldType::Fixed64,
            "fixed32" => FieldType::Fixed32,
            "bool" => FieldType::Bool,
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            "uint32" => FieldType::Uint32,
            "sfixed32" => FieldType::Sfixed32,
            "sfixed64" => FieldType::Sfixed64,
            "sint32" => FieldType::Sint32,
            "sint64" => FieldType::Sint64,
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_reference(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Enum | FieldType::Named)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumDescriptor {
    pub name:   String,
    pub values: Vec<EnumValueDescriptor>,
    pub rule:   Option<RuleSource<EnumRule>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumValueDescriptor {
    pub name:   String,
    pub number: i32,
    pub rule:   Option<RuleSource<EnumValueRule>>,
}

impl FileDescriptor {
    /// Converts every dynamic rule payload in this file into its typed form.
    pub fn normalize_rules(&mut self) -> Result<(), RuleDecodeError> {
        let scope = self.package.clone();
        if let Some(rule) = self.rule.as_mut() {
            rule.normalize(&self.name)?;
        }
        for message in &mut self.messages {
            message.normalize_rules(&scope)?;
        }
        for enum_ in &mut self.enums {
            enum_.normalize_rules(&scope)?;
        }
        Ok(())
    }
}

impl MessageDescriptor {
    fn normalize_rules(&mut self, scope: &str) -> Result<(), RuleDecodeError> {
        let fqdn = join_scope(scope, &self.name);
        if let Some(rule) = self.rule.as_mut() {
            rule.normalize(&fqdn)?;
        }
        for field in &mut self.fields {
            if let Some(rule) = field.rule.as_mut() {
                rule.normalize(&join_scope(&fqdn, &field.name))?;
            }
        }
        for nested in &mut self.nested_messages {
            nested.normalize_rules(&fqdn)?;
        }
        for enum_ in &mut self.enums {
            enum_.normalize_rules(&fqdn)?;
        }
        Ok(())
    }
}

impl EnumDescriptor {
    fn normalize_rules(&mut self, scope: &str) -> Result<(), RuleDecodeError> {
        let fqdn = join_scope(scope, &self.name);
        if let Some(rule) = self.rule.as_mut() {
            rule.normalize(&fqdn)?;
        }
        for value in &mut self.values {
            if let Some(rule) = value.rule.as_mut() {
                rule.normalize(&join_scope(&fqdn, &value.name))?;
            }
        }
        Ok(())
    }
}

fn join_scope(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

#[test]
fn normalize_walks_nested_entities() {
    let mut file = FileDescriptor {
        name: "graph.shim".to_string(),
        package: "graph".to_string(),
        messages: vec![MessageDescriptor {
            name: "Graph".to_string(),
            nested_messages: vec![MessageDescriptor {
                name: "Desc".to_string(),
                rule: Some(RuleSource::Dynamic(br#"{"alias":"Agdesc_t"}"#.to_vec())),
                ..Default::default()
            }],
            enums: vec![EnumDescriptor {
                name: "Kind".to_string(),
                values: vec![EnumValueDescriptor {
                    name: "NODE".to_string(),
                    number: 1,
                    rule: Some(RuleSource::Dynamic(br#"{"alias":"AGNODE"}"#.to_vec())),
                }],
                rule: None,
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    file.normalize_rules().unwrap();

    let desc = &file.messages[0].nested_messages[0];
    assert_eq!(desc.rule.as_ref().unwrap().typed().unwrap().alias, "Agdesc_t");
    let value = &file.messages[0].enums[0].values[0];
    assert_eq!(value.rule.as_ref().unwrap().typed().unwrap().alias, "AGNODE");
}

#[test]
fn normalize_error_names_the_field() {
    let mut file = FileDescriptor {
        name: "p.shim".to_string(),
        package: "p".to_string(),
        messages: vec![MessageDescriptor {
            name: "Point".to_string(),
            fields: vec![FieldDescriptor {
                name: "x".to_string(),
                number: 1,
                label: FieldLabel::Optional,
                kind: FieldType::Int32,
                type_name: String::new(),
                oneof_index: None,
                rule: Some(RuleSource::Dynamic(b"{".to_vec())),
            }],
            ..Default::default()
        }],
        ..Default::default()
    };
    let err = file.normalize_rules().unwrap_err();
    assert_eq!(err.entity, "p.Point.x");
}
