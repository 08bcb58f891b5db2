use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// The native kind of a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Struct,
    Enum,
    Funcptr,
    Int,
    Int32,
    Int64,
    Uint,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    Charptr,
    Voidptr,
}

impl TypeKind {
    /// Kinds that name another schema entity through `ref`.
    pub fn has_reference(self) -> bool {
        matches!(self, TypeKind::Struct | TypeKind::Enum | TypeKind::Funcptr)
    }
}

/// A type as written inside a rule block.
///
/// `ref` is a dotted schema name, relative to the declaring file's package
/// unless it already starts with a known package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeDef {
    pub kind:              Option<TypeKind>,
    #[serde(rename = "ref")]
    pub ref_:              String,
    pub pointer:           u64,
    #[serde(rename = "const")]
    pub is_const:          bool,
    pub addr:              bool,
    pub funcbaseptr:       bool,
    pub array:             bool,
    pub array_num:         Option<u64>,
    pub array_num_arg:     Option<u64>,
    pub string_length_arg: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionDef {
    pub name:  String,
    pub alias: String,
    pub args:  Vec<TypeDef>,
    #[serde(rename = "return")]
    pub ret:   Option<TypeDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MethodDef {
    pub name:  String,
    pub alias: String,
    pub recv:  String,
    pub args:  Vec<TypeDef>,
    #[serde(rename = "return")]
    pub ret:   Option<TypeDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Export {
    #[serde(alias = "header")]
    pub headers: Vec<String>,
    #[serde(alias = "func")]
    pub funcs:   Vec<FunctionDef>,
    #[serde(alias = "method")]
    pub methods: Vec<MethodDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileRule {
    #[serde(alias = "export")]
    pub exports: Vec<Export>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessageRule {
    pub funcptr:     Option<FunctionDef>,
    pub anonymous:   bool,
    pub alias:       String,
    pub constructor: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub ty:    Option<TypeDef>,
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumRule {
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumValueRule {
    pub alias: String,
}

#[derive(Debug, Error)]
#[error("failed to decode rule attached to {entity}: {source}")]
pub struct RuleDecodeError {
    pub entity: String,
    #[source]
    pub source: serde_json::Error,
}

/// A rule block as it arrives from a schema front end.
///
/// Text front ends hand over the raw option payload (`Dynamic`); descriptor
/// sets built in memory or received through the plugin protocol may already
/// carry the concrete rule (`Typed`). Call [`RuleSource::normalize`] once after
/// loading so that everything downstream only sees `Typed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource<T> {
    Typed(T),
    Dynamic(Vec<u8>),
}

impl<T: DeserializeOwned> RuleSource<T> {
    pub fn normalize(&mut self, entity: &str) -> Result<(), RuleDecodeError> {
        if let RuleSource::Dynamic(bytes) = self {
            let rule = serde_json::from_slice::<T>(bytes).map_err(|source| RuleDecodeError {
                entity: entity.to_string(),
                source,
            })?;
            *self = RuleSource::Typed(rule);
        }
        Ok(())
    }
}

impl<T> RuleSource<T> {
    /// Returns the concrete rule, or `None` if the payload was never normalized.
    pub fn typed(&self) -> Option<&T> {
        match self {
            RuleSource::Typed(rule) => Some(rule),
            RuleSource::Dynamic(_) => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, RuleSource::Dynamic(_))
    }
}

#[test]
fn normalize_dynamic_message_rule() {
    let mut source: RuleSource<MessageRule> =
        RuleSource::Dynamic(br#"{"alias":"Agraph_t","constructor":false}"#.to_vec());
    source.normalize("graph.Graph").unwrap();
    let rule = source.typed().unwrap();
    assert_eq!(rule.alias, "Agraph_t");
    assert_eq!(rule.constructor, Some(false));
    assert!(rule.funcptr.is_none());
}

#[test]
fn normalize_keeps_typed_rule() {
    let mut source = RuleSource::Typed(EnumRule { alias: "color_t".to_string() });
    source.normalize("graph.Color").unwrap();
    assert_eq!(source.typed().unwrap().alias, "color_t");
}

#[test]
fn normalize_reports_entity_on_bad_payload() {
    let mut source: RuleSource<FieldRule> = RuleSource::Dynamic(br#"{"alias": 3}"#.to_vec());
    let err = source.normalize("graph.Point.x").unwrap_err();
    assert_eq!(err.entity, "graph.Point.x");
    assert!(source.is_dynamic());
}

#[test]
fn type_def_uses_schema_keywords() {
    let def: TypeDef = serde_json::from_str(
        r#"{"kind":"struct","ref":"Node","pointer":1,"const":true,"array":true,"array_num_arg":2}"#,
    )
    .unwrap();
    assert_eq!(def.kind, Some(TypeKind::Struct));
    assert_eq!(def.ref_, "Node");
    assert!(def.is_const);
    assert_eq!(def.array_num_arg, Some(2));
    assert_eq!(def.array_num, None);
}

#[test]
fn unknown_rule_keys_are_rejected() {
    let res = serde_json::from_str::<EnumValueRule>(r#"{"alais":"RED"}"#);
    assert!(res.is_err());
}
