//! Turns a compile unit of [`FileDescriptor`]s into the binding [`Model`].
//!
//! Resolution runs in two passes. The first registers every package, message,
//! field, enum and enum value under its dotted name so that forward and
//! cross-file references work. The second attaches structure (declared field
//! types, nesting) for every file, and only then resolves rules, so a rule can
//! point at any entity of the unit regardless of declaration order.

use std::collections::{HashMap, HashSet};

use shimwright_schema::{
    self as schema, EnumDescriptor, FieldDescriptor, FieldLabel, FieldType, FileDescriptor,
    MessageDescriptor, RuleSource, TypeDef,
};

use crate::{
    error::ShimError,
    types::{
        Enum, EnumId, EnumValue, Export, Field, FieldRule, File, FileRule, FunctionDef, Message,
        MessageId, MessageRule, MethodDef, Model, Type, TypeKind, TypeRef,
    },
};

/// Convenience wrapper around [`Resolver::resolve`].
pub fn resolve(files: &[FileDescriptor]) -> Result<Model, ShimError> {
    Resolver::new().resolve(files)
}

/// Owns every lookup table of one resolution run.
#[derive(Debug, Default)]
pub struct Resolver {
    packages:    HashSet<String>,
    message_map: HashMap<String, MessageId>,
    enum_map:    HashMap<String, EnumId>,
    field_names: HashSet<String>,
    value_names: HashSet<String>,

    messages:      Vec<Message>,
    scopes:        Vec<String>,
    enums:         Vec<Enum>,
    message_rules: Vec<Option<schema::MessageRule>>,
    field_rules:   HashMap<(MessageId, usize), schema::FieldRule>,
    enum_rules:    Vec<Option<schema::EnumRule>>,
    value_rules:   HashMap<(EnumId, usize), schema::EnumValueRule>,
}

impl Resolver {
    pub fn new() -> Resolver {
        Resolver::default()
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn resolve(mut self, files: &[FileDescriptor]) -> Result<Model, ShimError> {
        for file in files {
            self.register_file(file)?;
        }
        tracing::debug!(
            packages = self.packages.len(),
            messages = self.messages.len(),
            enums = self.enums.len(),
            "registered schema entities"
        );

        let mut out_files = Vec::with_capacity(files.len());
        for file in files {
            out_files.push(self.attach_file(file)?);
        }

        for index in 0..self.messages.len() {
            self.resolve_message_rule(MessageId(index))?;
        }
        for index in 0..self.messages.len() {
            self.resolve_field_rules(MessageId(index))?;
        }
        for index in 0..self.enums.len() {
            self.resolve_enum_rules(EnumId(index));
        }
        for (desc, file) in files.iter().zip(out_files.iter_mut()) {
            file.rule = match &desc.rule {
                Some(source) => Some(self.resolve_file_rule(&desc.package, typed(source, &desc.name)?)?),
                None => None,
            };
        }

        Ok(Model {
            files:    out_files,
            messages: self.messages,
            enums:    self.enums,
        })
    }

    // ---- pass 1: registration ----

    fn register_file(&mut self, file: &FileDescriptor) -> Result<(), ShimError> {
        self.packages.insert(file.package.clone());
        for message in &file.messages {
            self.register_message(&file.package, &file.package, None, message)?;
        }
        for enum_ in &file.enums {
            self.register_enum(&file.package, None, enum_)?;
        }
        Ok(())
    }

    fn register_message(
        &mut self,
        package: &str,
        scope: &str,
        parent: Option<MessageId>,
        desc: &MessageDescriptor,
    ) -> Result<MessageId, ShimError> {
        let fqdn = join(scope, &desc.name);
        if self.message_map.contains_key(&fqdn) {
            return Err(ShimError::Duplicate { kind: "message", name: fqdn });
        }
        let id = MessageId(self.messages.len());
        self.message_map.insert(fqdn.clone(), id);
        self.scopes.push(fqdn.clone());
        self.messages.push(Message {
            name:            desc.name.clone(),
            package:         package.to_string(),
            fields:          Vec::new(),
            nested_messages: Vec::new(),
            enums:           Vec::new(),
            parent,
            rule:            MessageRule::default(),
        });
        self.message_rules.push(None);

        for field in &desc.fields {
            let name = join(&fqdn, &field.name);
            if !self.field_names.insert(name.clone()) {
                return Err(ShimError::Duplicate { kind: "field", name });
            }
        }

        let mut nested = Vec::with_capacity(desc.nested_messages.len());
        for message in &desc.nested_messages {
            nested.push(self.register_message(package, &fqdn, Some(id), message)?);
        }
        let mut enums = Vec::with_capacity(desc.enums.len());
        for enum_ in &desc.enums {
            enums.push(self.register_enum(&fqdn, Some(id), enum_)?);
        }
        let message = &mut self.messages[id.0];
        message.nested_messages = nested;
        message.enums = enums;
        Ok(id)
    }

    fn register_enum(&mut self, scope: &str, parent: Option<MessageId>, desc: &EnumDescriptor) -> Result<EnumId, ShimError> {
        let fqdn = join(scope, &desc.name);
        if self.enum_map.contains_key(&fqdn) {
            return Err(ShimError::Duplicate { kind: "enum", name: fqdn });
        }
        let id = EnumId(self.enums.len());
        self.enum_map.insert(fqdn.clone(), id);
        for value in &desc.values {
            let name = join(&fqdn, &value.name);
            if !self.value_names.insert(name.clone()) {
                return Err(ShimError::Duplicate { kind: "enum value", name });
            }
        }
        self.enums.push(Enum {
            name: desc.name.clone(),
            values: Vec::new(),
            parent,
            alias: desc.name.clone(),
        });
        self.enum_rules.push(None);
        Ok(id)
    }

    // ---- pass 2a: structure ----

    fn attach_file(&mut self, desc: &FileDescriptor) -> Result<File, ShimError> {
        let mut messages = Vec::with_capacity(desc.messages.len());
        for message in &desc.messages {
            messages.push(self.attach_message(&desc.package, message)?);
        }
        let mut enums = Vec::with_capacity(desc.enums.len());
        for enum_ in &desc.enums {
            enums.push(self.attach_enum(&desc.package, enum_)?);
        }
        Ok(File {
            name: desc.name.clone(),
            package: desc.package.clone(),
            messages,
            enums,
            rule: None,
        })
    }

    fn attach_message(&mut self, scope: &str, desc: &MessageDescriptor) -> Result<MessageId, ShimError> {
        let fqdn = join(scope, &desc.name);
        let id = self.lookup_registered_message(&fqdn)?;

        let mut fields = Vec::with_capacity(desc.fields.len());
        for (index, field) in desc.fields.iter().enumerate() {
            let context = join(&fqdn, &field.name);
            let ty = self.resolve_declared_type(&fqdn, field, &context)?;
            if let Some(source) = &field.rule {
                self.field_rules.insert((id, index), typed(source, &context)?.clone());
            }
            let oneof = match field.oneof_index {
                Some(i) => Some(desc.oneofs.get(i).cloned().ok_or_else(|| ShimError::Unresolved {
                    kind:    "oneof",
                    name:    i.to_string(),
                    context: context.clone(),
                })?),
                None => None,
            };
            fields.push(Field {
                name: field.name.clone(),
                ty,
                rule: None,
                message: id,
                oneof,
            });
        }
        self.messages[id.0].fields = fields;

        if let Some(source) = &desc.rule {
            self.message_rules[id.0] = Some(typed(source, &fqdn)?.clone());
        }

        for nested in &desc.nested_messages {
            self.attach_message(&fqdn, nested)?;
        }
        for enum_ in &desc.enums {
            self.attach_enum(&fqdn, enum_)?;
        }
        Ok(id)
    }

    fn attach_enum(&mut self, scope: &str, desc: &EnumDescriptor) -> Result<EnumId, ShimError> {
        let fqdn = join(scope, &desc.name);
        let id = *self.enum_map.get(&fqdn).ok_or_else(|| ShimError::Unresolved {
            kind:    "enum",
            name:    fqdn.clone(),
            context: fqdn.clone(),
        })?;

        let mut values = Vec::with_capacity(desc.values.len());
        for (index, value) in desc.values.iter().enumerate() {
            if let Some(source) = &value.rule {
                let rule = typed(source, &join(&fqdn, &value.name))?;
                self.value_rules.insert((id, index), rule.clone());
            }
            values.push(EnumValue {
                name:   value.name.clone(),
                number: value.number,
                alias:  None,
            });
        }
        self.enums[id.0].values = values;

        if let Some(source) = &desc.rule {
            self.enum_rules[id.0] = Some(typed(source, &fqdn)?.clone());
        }
        Ok(id)
    }

    fn resolve_declared_type(&self, scope: &str, field: &FieldDescriptor, context: &str) -> Result<Type, ShimError> {
        let mut ty = match field.kind {
            FieldType::Double => Type::new(TypeKind::Double),
            FieldType::Float => Type::new(TypeKind::Float),
            FieldType::Int64 | FieldType::Sfixed64 | FieldType::Sint64 => Type::new(TypeKind::Int64),
            FieldType::Uint64 | FieldType::Fixed64 => Type::new(TypeKind::Uint64),
            FieldType::Int32 | FieldType::Sfixed32 | FieldType::Sint32 => Type::new(TypeKind::Int32),
            FieldType::Uint32 | FieldType::Fixed32 => Type::new(TypeKind::Uint32),
            FieldType::Bool => Type::new(TypeKind::Bool),
            FieldType::String | FieldType::Bytes => Type::new(TypeKind::String),
            FieldType::Message => {
                let id = self.lookup_message(scope, &field.type_name, context)?;
                let mut ty = Type::new(TypeKind::Struct);
                ty.reference = Some(TypeRef::Message(id));
                ty
            }
            FieldType::Enum => {
                let id = self.lookup_enum(scope, &field.type_name, context)?;
                let mut ty = Type::new(TypeKind::Enum);
                ty.reference = Some(TypeRef::Enum(id));
                ty
            }
            FieldType::Named => {
                let found = self.candidates(scope, &field.type_name).iter().find_map(|key| {
                    match (self.message_map.get(key), self.enum_map.get(key)) {
                        (Some(&id), _) => Some((TypeKind::Struct, TypeRef::Message(id))),
                        (None, Some(&id)) => Some((TypeKind::Enum, TypeRef::Enum(id))),
                        (None, None) => None,
                    }
                });
                let Some((kind, reference)) = found else {
                    return Err(ShimError::Unresolved {
                        kind:    "message or enum",
                        name:    self.qualify(scope, &field.type_name),
                        context: context.to_string(),
                    });
                };
                let mut ty = Type::new(kind);
                ty.reference = Some(reference);
                ty
            }
        };
        ty.is_repeated = field.label == FieldLabel::Repeated;
        Ok(ty)
    }

    // ---- pass 2b: rules ----

    fn resolve_message_rule(&mut self, id: MessageId) -> Result<(), ShimError> {
        let Some(raw) = self.message_rules[id.0].clone() else {
            return Ok(());
        };
        let scope = self.scopes[id.0].clone();
        let name = self.messages[id.0].name.clone();

        let funcptr = match &raw.funcptr {
            Some(def) => {
                let context = format!("{} funcptr", name);
                let func = self.resolve_function(&scope, def, 0, &context)?;
                let count = func.args.iter().filter(|arg| arg.is_func_base_ptr).count();
                if count != 1 {
                    return Err(ShimError::MalformedFuncptr { message: name, count });
                }
                Some(func)
            }
            None => None,
        };
        let has_constructor = if funcptr.is_some() || raw.anonymous {
            false
        } else {
            raw.constructor.unwrap_or(true)
        };

        self.messages[id.0].rule = MessageRule {
            funcptr,
            anonymous: raw.anonymous,
            alias: raw.alias,
            has_constructor,
        };
        Ok(())
    }

    fn resolve_field_rules(&mut self, id: MessageId) -> Result<(), ShimError> {
        let scope = self.scopes[id.0].clone();
        let field_count = self.messages[id.0].fields.len();

        for index in 0..field_count {
            let field = &self.messages[id.0].fields[index];
            let context = format!("{}.{}", self.messages[id.0].name, field.name);
            let mut ty = field.ty.clone();
            let mut rule = None;

            if let Some(raw) = self.field_rules.get(&(id, index)) {
                let overlay = match &raw.ty {
                    Some(def) => {
                        let overlay = self.resolve_overlay(&scope, &ty, def, &context)?;
                        check_length_index(&overlay, field_count, &context)?;
                        ty = overlay.clone();
                        Some(overlay)
                    }
                    None => None,
                };
                rule = Some(FieldRule { ty: overlay, alias: raw.alias.clone() });
            }
            if self.has_funcptr(&ty) {
                ty.kind = TypeKind::Funcptr;
            }

            let field = &mut self.messages[id.0].fields[index];
            field.ty = ty;
            field.rule = rule;
        }
        Ok(())
    }

    fn resolve_enum_rules(&mut self, id: EnumId) {
        if let Some(raw) = &self.enum_rules[id.0] {
            if !raw.alias.is_empty() {
                self.enums[id.0].alias = raw.alias.clone();
            }
        }
        // A value with a rule is exported; an empty alias falls back to its own name.
        for index in 0..self.enums[id.0].values.len() {
            let value = &self.enums[id.0].values[index];
            let alias = self.value_rules.get(&(id, index)).map(|rule| {
                if rule.alias.is_empty() {
                    value.name.clone()
                } else {
                    rule.alias.clone()
                }
            });
            self.enums[id.0].values[index].alias = alias;
        }
    }

    fn resolve_file_rule(&self, package: &str, raw: &schema::FileRule) -> Result<FileRule, ShimError> {
        let mut exports = Vec::with_capacity(raw.exports.len());
        for export in &raw.exports {
            let mut funcs = Vec::with_capacity(export.funcs.len());
            for def in &export.funcs {
                let context = format!("function {}", def.name);
                funcs.push(self.resolve_function(package, def, 0, &context)?);
            }
            let mut methods = Vec::with_capacity(export.methods.len());
            for def in &export.methods {
                methods.push(self.resolve_method(package, def)?);
            }
            exports.push(Export {
                headers: export.headers.clone(),
                funcs,
                methods,
            });
        }
        Ok(FileRule { exports })
    }

    /// Resolves a function signature. `extra_slots` counts leading shim
    /// arguments that precede `args`, such as a method receiver.
    fn resolve_function(
        &self,
        scope: &str,
        def: &schema::FunctionDef,
        extra_slots: usize,
        context: &str,
    ) -> Result<FunctionDef, ShimError> {
        let slots = extra_slots + def.args.len();
        let mut args = Vec::with_capacity(def.args.len());
        for (i, arg) in def.args.iter().enumerate() {
            let arg_context = format!("{} argument {}", context, i + 1);
            let ty = self.resolve_type(scope, arg, &arg_context)?;
            check_length_index(&ty, slots, &arg_context)?;
            args.push(ty);
        }
        let ret = match &def.ret {
            Some(ret) => {
                let ret_context = format!("{} return value", context);
                let ty = self.resolve_type(scope, ret, &ret_context)?;
                check_length_index(&ty, slots, &ret_context)?;
                Some(ty)
            }
            None => None,
        };
        let alias = if def.alias.is_empty() { def.name.clone() } else { def.alias.clone() };
        Ok(FunctionDef {
            name: def.name.clone(),
            alias,
            args,
            ret,
        })
    }

    fn resolve_method(&self, package: &str, def: &schema::MethodDef) -> Result<MethodDef, ShimError> {
        let context = format!("method {}", def.name);
        let id = self.lookup_message(package, &def.recv, &context)?;
        let receiver_name = self.scopes[id.0].clone();
        if self.message_rules[id.0].as_ref().is_some_and(|rule| rule.funcptr.is_some()) {
            return Err(ShimError::InvalidReceiver {
                method:   def.name.clone(),
                receiver: receiver_name,
            });
        }

        let func = self.resolve_function(
            package,
            &schema::FunctionDef {
                name:  def.name.clone(),
                alias: def.alias.clone(),
                args:  def.args.clone(),
                ret:   def.ret.clone(),
            },
            1,
            &context,
        )?;
        let mut receiver = Type::new(TypeKind::Struct);
        receiver.pointer = 1;
        receiver.reference = Some(TypeRef::Message(id));
        Ok(MethodDef { func, receiver })
    }

    /// A fully specified rule type (function argument or return value).
    fn resolve_type(&self, scope: &str, def: &TypeDef, context: &str) -> Result<Type, ShimError> {
        let kind = def.kind.ok_or_else(|| ShimError::MissingTypeKind { context: context.to_string() })?;
        let mut ty = Type::new(kind);
        if kind.has_reference() {
            ty.reference = Some(self.lookup_reference(scope, kind, &def.ref_, context)?);
        }
        apply_flags(def, &mut ty, context)?;
        Ok(ty)
    }

    /// A field rule type laid over the declared field type. Kind and reference
    /// are inherited when the rule leaves them out; the flags always come from
    /// the rule.
    fn resolve_overlay(&self, scope: &str, declared: &Type, def: &TypeDef, context: &str) -> Result<Type, ShimError> {
        let kind = def.kind.unwrap_or(declared.kind);
        let mut ty = Type::new(kind);
        ty.reference = if !def.ref_.is_empty() && kind.has_reference() {
            Some(self.lookup_reference(scope, kind, &def.ref_, context)?)
        } else if def.ref_.is_empty() && kind.has_reference() {
            match declared.reference {
                Some(reference) => Some(reference),
                None => {
                    return Err(ShimError::Unresolved {
                        kind:    "type reference",
                        name:    String::new(),
                        context: context.to_string(),
                    })
                }
            }
        } else {
            None
        };
        apply_flags(def, &mut ty, context)?;
        Ok(ty)
    }

    fn lookup_reference(&self, scope: &str, kind: TypeKind, name: &str, context: &str) -> Result<TypeRef, ShimError> {
        match kind {
            TypeKind::Enum => Ok(TypeRef::Enum(self.lookup_enum(scope, name, context)?)),
            TypeKind::Funcptr => {
                let id = self.lookup_message(scope, name, context)?;
                if self.message_rules[id.0].as_ref().map_or(true, |rule| rule.funcptr.is_none()) {
                    return Err(ShimError::NotAFuncptr(self.scopes[id.0].clone()));
                }
                Ok(TypeRef::Message(id))
            }
            _ => Ok(TypeRef::Message(self.lookup_message(scope, name, context)?)),
        }
    }

    fn has_funcptr(&self, ty: &Type) -> bool {
        match ty.message() {
            Some(id) => self.messages[id.0].rule.funcptr.is_some(),
            None => false,
        }
    }

    fn lookup_message(&self, scope: &str, name: &str, context: &str) -> Result<MessageId, ShimError> {
        let found = self.candidates(scope, name).iter().find_map(|key| self.message_map.get(key).copied());
        found.ok_or_else(|| ShimError::Unresolved {
            kind:    "message",
            name:    self.qualify(scope, name),
            context: context.to_string(),
        })
    }

    fn lookup_registered_message(&self, fqdn: &str) -> Result<MessageId, ShimError> {
        self.message_map.get(fqdn).copied().ok_or_else(|| ShimError::Unresolved {
            kind:    "message",
            name:    fqdn.to_string(),
            context: fqdn.to_string(),
        })
    }

    fn lookup_enum(&self, scope: &str, name: &str, context: &str) -> Result<EnumId, ShimError> {
        let found = self.candidates(scope, name).iter().find_map(|key| self.enum_map.get(key).copied());
        found.ok_or_else(|| ShimError::Unresolved {
            kind:    "enum",
            name:    self.qualify(scope, name),
            context: context.to_string(),
        })
    }

    /// Lookup keys for a rule or field reference seen from `scope`, innermost
    /// first.
    ///
    /// `scope` is a package or the dotted name of an enclosing message. A
    /// leading `.` makes the name absolute. Otherwise every enclosing scope is
    /// tried, from `scope` itself out to the root, so a nested type is visible
    /// by its short name and a package-qualified name still matches at the
    /// root.
    fn candidates(&self, scope: &str, name: &str) -> Vec<String> {
        if let Some(absolute) = name.strip_prefix('.') {
            return vec![absolute.to_string()];
        }
        let mut keys = Vec::new();
        let mut scope = Some(scope);
        while let Some(current) = scope {
            keys.push(join(current, name));
            scope = match current.rfind('.') {
                Some(i) => Some(&current[..i]),
                None if !current.is_empty() => Some(""),
                None => None,
            };
        }
        keys
    }

    /// The name reported for a reference that did not resolve: absolute when
    /// a proper prefix of its segments is a registered package, otherwise
    /// relative to the package enclosing `scope`.
    fn qualify(&self, scope: &str, name: &str) -> String {
        let name = name.trim_start_matches('.');
        if self.exists_package(name) {
            return name.to_string();
        }
        join(self.package_of(scope), name)
    }

    fn package_of<'s>(&self, scope: &'s str) -> &'s str {
        let mut current = scope;
        loop {
            if self.packages.contains(current) {
                return current;
            }
            match current.rfind('.') {
                Some(i) => current = &current[..i],
                None => return "",
            }
        }
    }

    fn exists_package(&self, name: &str) -> bool {
        let segments: Vec<&str> = name.split('.').collect();
        (1..segments.len()).any(|n| self.packages.contains(&segments[..n].join(".")))
    }
}

fn apply_flags(def: &TypeDef, ty: &mut Type, context: &str) -> Result<(), ShimError> {
    if def.array_num.is_some() && def.array_num_arg.is_some() {
        return Err(ShimError::ConflictingArrayLength { context: context.to_string() });
    }
    ty.pointer = def.pointer;
    ty.is_const = def.is_const;
    ty.addr = def.addr;
    ty.is_func_base_ptr = def.funcbaseptr;
    ty.array_num = def.array_num.unwrap_or(0);
    ty.arg_array_num = def.array_num_arg.unwrap_or(0);
    ty.arg_string_length = def.string_length_arg.unwrap_or(0);
    ty.is_repeated = def.array || def.array_num.is_some() || def.array_num_arg.is_some();
    Ok(())
}

fn check_length_index(ty: &Type, max: usize, context: &str) -> Result<(), ShimError> {
    for index in [ty.arg_array_num, ty.arg_string_length] {
        if index != 0 && index > max as u64 {
            return Err(ShimError::LengthIndexOutOfRange {
                context: context.to_string(),
                index,
                max,
            });
        }
    }
    Ok(())
}

fn typed<'a, T>(source: &'a RuleSource<T>, entity: &str) -> Result<&'a T, ShimError> {
    source.typed().ok_or_else(|| ShimError::UnnormalizedRule(entity.to_string()))
}

fn join(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}
