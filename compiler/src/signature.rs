//! Calling convention shared by the native shim and the host wrapper.
//!
//! Every exported function, method and accessor crosses the boundary as a flat
//! list of slots. Both generators derive that list from [`CallSignature`] and
//! classify each slot with [`ValueClass`], so argument order, slot count and
//! storage shape can only change in one place.

use crate::types::{FunctionDef, MethodDef, Model, Type, TypeKind};

/// The flat boundary call of one function or method.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSignature {
    /// Unprefixed boundary symbol: `<receiver FullName>_<name>` or `<name>`.
    pub symbol:   String,
    /// Name as declared in the schema.
    pub name:     String,
    /// Native function the shim calls.
    pub native:   String,
    pub receiver: Option<Type>,
    pub args:     Vec<Type>,
    pub ret:      Option<Type>,
}

/// One boundary slot in call order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot<'a> {
    Receiver(&'a Type),
    Arg(usize, &'a Type),
    Return(&'a Type),
}

impl<'a> Slot<'a> {
    pub fn ty(&self) -> &'a Type {
        match *self {
            Slot::Receiver(ty) | Slot::Arg(_, ty) | Slot::Return(ty) => ty,
        }
    }
}

impl CallSignature {
    pub fn function(func: &FunctionDef) -> CallSignature {
        CallSignature {
            symbol:   func.name.clone(),
            name:     func.name.clone(),
            native:   func.alias.clone(),
            receiver: None,
            args:     func.args.clone(),
            ret:      func.ret.clone(),
        }
    }

    pub fn method(model: &Model, method: &MethodDef) -> CallSignature {
        let symbol = match method.receiver.message() {
            Some(id) => format!("{}_{}", model.full_name(id), method.func.name),
            None => method.func.name.clone(),
        };
        CallSignature {
            symbol,
            name:     method.func.name.clone(),
            native:   method.func.alias.clone(),
            receiver: Some(method.receiver.clone()),
            args:     method.func.args.clone(),
            ret:      method.func.ret.clone(),
        }
    }

    /// Receiver, declared arguments, then the return out-pointer.
    pub fn slots(&self) -> Vec<Slot<'_>> {
        let mut slots = Vec::with_capacity(self.args.len() + 2);
        if let Some(receiver) = &self.receiver {
            slots.push(Slot::Receiver(receiver));
        }
        for (i, arg) in self.args.iter().enumerate() {
            slots.push(Slot::Arg(i, arg));
        }
        if let Some(ret) = &self.ret {
            slots.push(Slot::Return(ret));
        }
        slots
    }

    /// Slots that carry inputs: receiver and declared arguments.
    pub fn input_count(&self) -> usize {
        self.args.len() + usize::from(self.receiver.is_some())
    }

    /// Input slot index of the declared argument `i`.
    pub fn arg_slot(&self, i: usize) -> usize {
        i + usize::from(self.receiver.is_some())
    }

    /// Input slot holding the length of `ty`, from its 1-based `array_num_arg`.
    pub fn array_length_slot(ty: &Type) -> Option<usize> {
        index_to_slot(ty.arg_array_num)
    }

    pub fn string_length_slot(ty: &Type) -> Option<usize> {
        index_to_slot(ty.arg_string_length)
    }

    /// Shim symbol with the configured prefix.
    pub fn prefixed(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.symbol)
    }
}

fn index_to_slot(index: u64) -> Option<usize> {
    index.checked_sub(1).and_then(|slot| usize::try_from(slot).ok())
}

/// How a value is represented on the boundary.
///
/// The class decides the host converter pair (`to<Class>WasmValue` /
/// `read<Class>`) and the native boundary storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    Object,
    Enum,
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
    Any,
    Func,
    Ptr,
}

/// A value class plus repetition: the full boundary shape of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub class: ValueClass,
    pub array: bool,
}

impl Boundary {
    pub fn of(model: &Model, ty: &Type) -> Boundary {
        if ty.is_repeated {
            return Boundary { class: ValueClass::of_kind(model, ty), array: true };
        }
        let class = if is_ptr_value(ty) {
            ValueClass::Ptr
        } else {
            ValueClass::of_kind(model, ty)
        };
        Boundary { class, array: false }
    }

    /// Slices and strings are passed as the address of a descriptor.
    pub fn by_ref(&self) -> bool {
        self.array || self.class == ValueClass::String
    }

    /// Converter stem shared by both sides, e.g. `Int32Array`.
    pub fn converter_name(&self) -> String {
        if self.array {
            format!("{}Array", self.class.name())
        } else {
            self.class.name().to_string()
        }
    }

    /// Bytes the host reserves for an out-parameter of this shape.
    pub fn storage_size(&self) -> u32 {
        if self.array {
            24
        } else if self.class == ValueClass::String {
            16
        } else {
            8
        }
    }
}

impl ValueClass {
    fn of_kind(model: &Model, ty: &Type) -> ValueClass {
        if model.is_function(ty) {
            return ValueClass::Func;
        }
        match ty.kind {
            TypeKind::Struct => ValueClass::Object,
            TypeKind::Enum => ValueClass::Enum,
            TypeKind::Funcptr => ValueClass::Func,
            TypeKind::Int => ValueClass::Int,
            TypeKind::Int32 => ValueClass::Int32,
            TypeKind::Int64 => ValueClass::Int64,
            TypeKind::Uint => ValueClass::Uint,
            TypeKind::Uint32 => ValueClass::Uint32,
            TypeKind::Uint64 => ValueClass::Uint64,
            TypeKind::Float => ValueClass::Float,
            TypeKind::Double => ValueClass::Double,
            TypeKind::Bool => ValueClass::Bool,
            TypeKind::String | TypeKind::Charptr => ValueClass::String,
            TypeKind::Voidptr => ValueClass::Any,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueClass::Object => "Object",
            ValueClass::Enum => "Enum",
            ValueClass::Int => "Int",
            ValueClass::Int32 => "Int32",
            ValueClass::Int64 => "Int64",
            ValueClass::Uint => "Uint",
            ValueClass::Uint32 => "Uint32",
            ValueClass::Uint64 => "Uint64",
            ValueClass::Float => "Float",
            ValueClass::Double => "Double",
            ValueClass::Bool => "Bool",
            ValueClass::String => "String",
            ValueClass::Any => "Any",
            ValueClass::Func => "Func",
            ValueClass::Ptr => "Ptr",
        }
    }
}

/// Pointers the host sees as a raw address rather than a typed value.
///
/// Struct and char pointers are typed up to one level, as is `void *`. Any
/// other pointer, or a deeper one, is an opaque address.
pub fn is_ptr_value(ty: &Type) -> bool {
    if ty.is_repeated || ty.pointer == 0 {
        return false;
    }
    match ty.kind {
        TypeKind::Struct | TypeKind::String | TypeKind::Charptr | TypeKind::Voidptr => ty.pointer >= 2,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRef;
    use crate::types::{File, Message, MessageId, MessageRule};

    fn model() -> Model {
        Model {
            files:    vec![File {
                name:     "g.shim".to_string(),
                package:  "g".to_string(),
                messages: vec![MessageId(0)],
                enums:    vec![],
                rule:     None,
            }],
            messages: vec![
                Message {
                    name:            "Graph".to_string(),
                    package:         "g".to_string(),
                    fields:          vec![],
                    nested_messages: vec![MessageId(1)],
                    enums:           vec![],
                    parent:          None,
                    rule:            MessageRule {
                        alias: "Agraph_t".to_string(),
                        has_constructor: true,
                        ..Default::default()
                    },
                },
                Message {
                    name:            "Desc".to_string(),
                    package:         "g".to_string(),
                    fields:          vec![],
                    nested_messages: vec![],
                    enums:           vec![],
                    parent:          Some(MessageId(0)),
                    rule:            MessageRule::default(),
                },
            ],
            enums:    vec![],
        }
    }

    fn struct_ptr(id: usize) -> Type {
        let mut ty = Type::new(TypeKind::Struct);
        ty.pointer = 1;
        ty.reference = Some(TypeRef::Message(MessageId(id)));
        ty
    }

    #[test]
    fn method_slots_put_receiver_first_and_return_last() {
        let model = model();
        let method = MethodDef {
            func:     FunctionDef {
                name:  "nodes".to_string(),
                alias: "agnodes".to_string(),
                args:  vec![Type::new(TypeKind::Int32), Type::new(TypeKind::Bool)],
                ret:   Some(Type::new(TypeKind::Int)),
            },
            receiver: struct_ptr(1),
        };
        let sig = CallSignature::method(&model, &method);
        assert_eq!(sig.symbol, "Graph_Desc_nodes");
        assert_eq!(sig.native, "agnodes");

        let slots = sig.slots();
        assert_eq!(slots.len(), method.func.args.len() + 1 + 1);
        assert!(matches!(slots[0], Slot::Receiver(_)));
        assert!(matches!(slots[1], Slot::Arg(0, _)));
        assert!(matches!(slots[3], Slot::Return(_)));
        assert_eq!(sig.input_count(), 3);
        assert_eq!(sig.arg_slot(0), 1);
    }

    #[test]
    fn void_function_has_no_return_slot() {
        let func = FunctionDef {
            name:  "agclose".to_string(),
            alias: "agclose".to_string(),
            args:  vec![struct_ptr(0)],
            ret:   None,
        };
        let sig = CallSignature::function(&func);
        assert_eq!(sig.slots().len(), 1);
        assert_eq!(sig.prefixed("wasm_bridge_"), "wasm_bridge_agclose");
    }

    #[test]
    fn boundary_classes() {
        let model = model();
        assert_eq!(Boundary::of(&model, &struct_ptr(0)).converter_name(), "Object");

        let mut deep = struct_ptr(0);
        deep.pointer = 2;
        assert_eq!(Boundary::of(&model, &deep).class, ValueClass::Ptr);

        let mut list = struct_ptr(0);
        list.is_repeated = true;
        let list = Boundary::of(&model, &list);
        assert_eq!(list.converter_name(), "ObjectArray");
        assert!(list.by_ref());
        assert_eq!(list.storage_size(), 24);

        let mut int_ptr = Type::new(TypeKind::Int);
        int_ptr.pointer = 1;
        assert_eq!(Boundary::of(&model, &int_ptr).class, ValueClass::Ptr);

        let text = Boundary::of(&model, &Type::new(TypeKind::Charptr));
        assert_eq!(text.class, ValueClass::String);
        assert!(text.by_ref());

        let mut text_ptr = Type::new(TypeKind::Charptr);
        text_ptr.pointer = 1;
        assert_eq!(Boundary::of(&model, &text_ptr).class, ValueClass::String);
        text_ptr.pointer = 2;
        assert_eq!(Boundary::of(&model, &text_ptr).class, ValueClass::Ptr);

        assert_eq!(Boundary::of(&model, &Type::new(TypeKind::Double)).class, ValueClass::Double);
        assert_eq!(Boundary::of(&model, &Type::new(TypeKind::Voidptr)).class, ValueClass::Any);
    }

    #[test]
    fn length_indices_are_one_based() {
        let mut ty = Type::new(TypeKind::Int32);
        assert_eq!(CallSignature::array_length_slot(&ty), None);
        ty.arg_array_num = 2;
        assert_eq!(CallSignature::array_length_slot(&ty), Some(1));
        ty.arg_string_length = 1;
        assert_eq!(CallSignature::string_length_slot(&ty), Some(0));
    }
}
