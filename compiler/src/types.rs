//! Resolved binding model.
//!
//! The resolver builds a [`Model`] once per run; both generators only read it.
//! Messages and enums live in arenas inside the model and refer to each other
//! through [`MessageId`] / [`EnumId`].

use std::collections::BTreeSet;

pub use shimwright_schema::TypeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(pub usize);

/// What a struct, enum or funcptr type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Message(MessageId),
    Enum(EnumId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    pub kind:              TypeKind,
    pub pointer:           u64,
    pub is_const:          bool,
    pub addr:              bool,
    pub is_func_base_ptr:  bool,
    pub is_repeated:       bool,
    /// Fixed element count, 0 when unknown.
    pub array_num:         u64,
    /// 1-based index of the sibling argument (or field) holding the element count.
    pub arg_array_num:     u64,
    /// 1-based index of the sibling argument (or field) holding the string length.
    pub arg_string_length: u64,
    pub reference:         Option<TypeRef>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Type {
        Type {
            kind,
            pointer: 0,
            is_const: false,
            addr: false,
            is_func_base_ptr: false,
            is_repeated: false,
            array_num: 0,
            arg_array_num: 0,
            arg_string_length: 0,
            reference: None,
        }
    }

    /// Number of `*` in the native rendering of this type.
    ///
    /// char/void pointers already carry one level and stay a flat buffer when
    /// repeated; every other repeated type gains one level.
    pub fn native_pointer_depth(&self) -> u64 {
        let repeated = u64::from(self.is_repeated);
        match self.kind {
            TypeKind::Charptr | TypeKind::Voidptr => self.pointer.max(1),
            TypeKind::String => self.pointer.max(1) + repeated,
            _ => self.pointer + repeated,
        }
    }

    /// The element type of a repeated type.
    pub fn elem(&self) -> Type {
        let mut elem = self.clone();
        elem.is_repeated = false;
        elem.array_num = 0;
        elem.arg_array_num = 0;
        elem
    }

    pub fn message(&self) -> Option<MessageId> {
        match self.reference {
            Some(TypeRef::Message(id)) => Some(id),
            _ => None,
        }
    }

    pub fn enum_id(&self) -> Option<EnumId> {
        match self.reference {
            Some(TypeRef::Enum(id)) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name:  String,
    /// Native symbol the shim calls. Defaults to `name`.
    pub alias: String,
    pub args:  Vec<Type>,
    pub ret:   Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub func:     FunctionDef,
    /// Always a struct pointer (depth 1).
    pub receiver: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub headers: Vec<String>,
    pub funcs:   Vec<FunctionDef>,
    pub methods: Vec<MethodDef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRule {
    pub exports: Vec<Export>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub name:     String,
    pub package:  String,
    pub messages: Vec<MessageId>,
    pub enums:    Vec<EnumId>,
    pub rule:     Option<FileRule>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRule {
    pub funcptr:         Option<FunctionDef>,
    pub anonymous:       bool,
    /// Native type name. Messages without one are not exported.
    pub alias:           String,
    pub has_constructor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub name:            String,
    pub package:         String,
    pub fields:          Vec<Field>,
    pub nested_messages: Vec<MessageId>,
    pub enums:           Vec<EnumId>,
    pub parent:          Option<MessageId>,
    pub rule:            MessageRule,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub ty:    Option<Type>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name:    String,
    pub ty:      Type,
    pub rule:    Option<FieldRule>,
    pub message: MessageId,
    pub oneof:   Option<String>,
}

impl Field {
    /// Member expression used to reach this field on the native struct.
    pub fn accessor(&self) -> String {
        let member = match &self.rule {
            Some(rule) if !rule.alias.is_empty() => rule.alias.as_str(),
            _ => self.name.as_str(),
        };
        match &self.oneof {
            Some(oneof) => format!("{}.{}", oneof, member),
            None => member.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    pub name:   String,
    pub values: Vec<EnumValue>,
    pub parent: Option<MessageId>,
    /// Native type name; the enum name when no rule gives one.
    pub alias:  String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name:   String,
    pub number: i32,
    /// Native constant name. Values without one are internal.
    pub alias:  Option<String>,
}

/// Types a file uses but does not declare.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForeignTypes {
    pub messages:  Vec<MessageId>,
    pub callbacks: Vec<MessageId>,
    pub enums:     Vec<EnumId>,
}

/// The resolved IR of one compile unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub files:    Vec<File>,
    pub messages: Vec<Message>,
    pub enums:    Vec<Enum>,
}

impl Model {
    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.0]
    }

    pub fn enum_(&self, id: EnumId) -> &Enum {
        &self.enums[id.0]
    }

    pub fn file(&self, name: &str) -> Option<&File> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Underscore-joined ancestor chain plus own name.
    pub fn full_name(&self, id: MessageId) -> String {
        let msg = self.message(id);
        match msg.parent {
            Some(parent) => format!("{}_{}", self.full_name(parent), msg.name),
            None => msg.name.clone(),
        }
    }

    pub fn enum_full_name(&self, id: EnumId) -> String {
        let enum_ = self.enum_(id);
        match enum_.parent {
            Some(parent) => format!("{}_{}", self.full_name(parent), enum_.name),
            None => enum_.name.clone(),
        }
    }

    pub fn field_full_name(&self, field: &Field) -> String {
        format!("{}_{}", self.full_name(field.message), field.name)
    }

    /// The callback signature a type points at, if it is a function.
    pub fn funcptr(&self, ty: &Type) -> Option<&FunctionDef> {
        let id = ty.message()?;
        self.message(id).rule.funcptr.as_ref()
    }

    pub fn is_function(&self, ty: &Type) -> bool {
        ty.kind == TypeKind::Funcptr || self.funcptr(ty).is_some()
    }

    /// Messages that get a wrapper type and accessors: aliased and not callbacks.
    pub fn is_exported_message(&self, id: MessageId) -> bool {
        let rule = &self.message(id).rule;
        !rule.alias.is_empty() && rule.funcptr.is_none()
    }

    /// Exported messages of a file, nested messages before their parent.
    pub fn exported_messages(&self, file: &File) -> Vec<MessageId> {
        let mut out = Vec::new();
        for &id in &file.messages {
            self.collect_messages(id, &mut out);
        }
        out.retain(|&id| self.is_exported_message(id));
        out
    }

    /// Callback (funcptr) messages of a file, nested messages before their parent.
    pub fn callback_messages(&self, file: &File) -> Vec<MessageId> {
        let mut out = Vec::new();
        for &id in &file.messages {
            self.collect_messages(id, &mut out);
        }
        out.retain(|&id| self.message(id).rule.funcptr.is_some());
        out
    }

    /// Enums of a file including those nested in its messages.
    pub fn file_enums(&self, file: &File) -> Vec<EnumId> {
        let mut messages = Vec::new();
        for &id in &file.messages {
            self.collect_messages(id, &mut messages);
        }
        let mut out = Vec::new();
        for id in messages {
            out.extend(self.message(id).enums.iter().copied());
        }
        out.extend(file.enums.iter().copied());
        out
    }

    /// Messages, callbacks and enums declared in other files that the
    /// generated code for `file` names: through exported fields, export
    /// signatures, method receivers and callback signatures, the latter
    /// followed transitively. Each list is ordered by id.
    pub fn foreign_types(&self, file: &File) -> ForeignTypes {
        let mut local = Vec::new();
        for &id in &file.messages {
            self.collect_messages(id, &mut local);
        }
        let local_enums = self.file_enums(file);

        let mut pending: Vec<Type> = Vec::new();
        for &id in &local {
            let msg = self.message(id);
            if let Some(func) = &msg.rule.funcptr {
                pending.extend(func.args.iter().chain(func.ret.iter()).cloned());
            } else if self.is_exported_message(id) {
                pending.extend(msg.fields.iter().map(|f| f.ty.clone()));
            }
        }
        for export in file.rule.iter().flat_map(|rule| rule.exports.iter()) {
            for func in &export.funcs {
                pending.extend(func.args.iter().chain(func.ret.iter()).cloned());
            }
            for method in &export.methods {
                pending.push(method.receiver.clone());
                pending.extend(method.func.args.iter().chain(method.func.ret.iter()).cloned());
            }
        }

        let mut messages = BTreeSet::new();
        let mut callbacks = BTreeSet::new();
        let mut enums = BTreeSet::new();
        while let Some(ty) = pending.pop() {
            if let Some(id) = ty.enum_id() {
                if !local_enums.contains(&id) {
                    enums.insert(id);
                }
            }
            let Some(id) = ty.message() else {
                continue;
            };
            if local.contains(&id) {
                continue;
            }
            match &self.message(id).rule.funcptr {
                Some(func) => {
                    if callbacks.insert(id) {
                        pending.extend(func.args.iter().chain(func.ret.iter()).cloned());
                    }
                }
                None => {
                    messages.insert(id);
                }
            }
        }
        ForeignTypes {
            messages:  messages.into_iter().collect(),
            callbacks: callbacks.into_iter().collect(),
            enums:     enums.into_iter().collect(),
        }
    }

    fn collect_messages(&self, id: MessageId, out: &mut Vec<MessageId>) {
        for &nested in &self.message(id).nested_messages {
            self.collect_messages(nested, out);
        }
        out.push(id);
    }

    /// Headers of every export group of a file, sorted and deduplicated.
    pub fn headers(&self, file: &File) -> Vec<String> {
        let mut headers: Vec<String> = file
            .rule
            .iter()
            .flat_map(|rule| rule.exports.iter())
            .flat_map(|export| export.headers.iter().cloned())
            .collect();
        headers.sort();
        headers.dedup();
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeated(kind: TypeKind, pointer: u64) -> Type {
        let mut ty = Type::new(kind);
        ty.pointer = pointer;
        ty.is_repeated = true;
        ty
    }

    #[test]
    fn repeated_struct_pointers_render_as_pointer_arrays() {
        assert_eq!(repeated(TypeKind::Struct, 1).native_pointer_depth(), 2);
        assert_eq!(repeated(TypeKind::Struct, 0).native_pointer_depth(), 1);
    }

    #[test]
    fn repeated_char_and_void_pointers_stay_flat() {
        assert_eq!(repeated(TypeKind::Charptr, 0).native_pointer_depth(), 1);
        assert_eq!(repeated(TypeKind::Charptr, 1).native_pointer_depth(), 1);
        assert_eq!(repeated(TypeKind::Voidptr, 1).native_pointer_depth(), 1);
        assert_eq!(repeated(TypeKind::String, 0).native_pointer_depth(), 2);
    }

    #[test]
    fn elem_drops_repetition() {
        let mut ty = repeated(TypeKind::Struct, 1);
        ty.array_num = 4;
        let elem = ty.elem();
        assert!(!elem.is_repeated);
        assert_eq!(elem.pointer, 1);
        assert_eq!(elem.array_num, 0);
    }

    #[test]
    fn field_accessor_prefers_alias_and_oneof() {
        let mut field = Field {
            name:    "radius".to_string(),
            ty:      Type::new(TypeKind::Double),
            rule:    None,
            message: MessageId(0),
            oneof:   None,
        };
        assert_eq!(field.accessor(), "radius");
        field.rule = Some(FieldRule { ty: None, alias: "r".to_string() });
        assert_eq!(field.accessor(), "r");
        field.oneof = Some("u".to_string());
        assert_eq!(field.accessor(), "u.r");
    }
}
