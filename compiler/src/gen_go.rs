use std::collections::HashMap;

use crate::{
    error::{Artifact, ShimError},
    signature::{Boundary, CallSignature, Slot, ValueClass},
    types::{EnumId, Field, File, MessageId, Model, Type},
    utils::to_public_go_variable,
};

pub const GENERATED_BANNER: &str = "// Code generated by shimwright. DO NOT EDIT.";

/// Renders the host wrapper for `file` into Go package `package`.
///
/// The wrapper talks to the module through a package-level `mod` value that
/// provides `ExportedFunction`, `alloc`/`free` and the `to<Class>WasmValue` /
/// `read<Class>` converter pairs, plus the generic lift helpers
/// (`liftEnumSlice`, `liftFunc`, `liftFuncSlice`, `objectAddrs`, `enumValues`,
/// `callbacks`).
#[tracing::instrument(level = "debug", skip_all, fields(file = %file.name))]
pub fn generate_go(model: &Model, file: &File, prefix: &str, package: &str) -> Result<String, ShimError> {
    let mut gen = GoGenerator { model, prefix, code: Vec::new() };
    gen.file(file, package)?;
    tracing::debug!(lines = gen.code.len(), "rendered host wrapper");
    let mut out = gen.code.join("\n");
    out.push('\n');
    Ok(out)
}

/// Go type name of an exported message.
pub fn go_message_name(model: &Model, id: MessageId) -> String {
    to_public_go_variable(&model.full_name(id))
}

pub fn go_enum_name(model: &Model, id: EnumId) -> String {
    to_public_go_variable(&model.enum_full_name(id))
}

/// Go type name of a callback signature.
pub fn go_func_name(model: &Model, id: MessageId) -> String {
    format!("{}Func", to_public_go_variable(&model.full_name(id)))
}

struct GoGenerator<'a> {
    model:  &'a Model,
    prefix: &'a str,
    code:   Vec<String>,
}

impl<'a> GoGenerator<'a> {
    fn file(&mut self, file: &File, package: &str) -> Result<(), ShimError> {
        let foreign = self.model.foreign_types(file);
        let mut enums = self.model.file_enums(file);
        enums.extend(foreign.enums);
        let mut callbacks = self.model.callback_messages(file);
        callbacks.extend(foreign.callbacks);
        let messages = self.model.exported_messages(file);
        let signatures = self.signatures(file);
        self.check_type_names(&enums, &callbacks, messages.iter().chain(foreign.messages.iter()))?;

        self.code.push(GENERATED_BANNER.to_string());
        self.code.push(String::new());
        self.code.push(format!("package {}", package));
        if !callbacks.is_empty() || !messages.is_empty() || !signatures.is_empty() {
            self.code.push(String::new());
            self.code.push("import (".to_string());
            self.code.push("\t\"context\"".to_string());
            self.code.push(")".to_string());
        }

        for id in enums {
            self.enum_type(id);
        }
        for id in callbacks {
            self.callback(id)?;
        }
        for id in messages {
            self.message(id)?;
        }
        // Imported messages only need a handle type; their accessors belong
        // to the wrapper of the file declaring them.
        for id in foreign.messages {
            self.wrapper(id);
        }
        for sig in &signatures {
            self.function(sig)?;
        }
        Ok(())
    }

    /// Go declares every type at package level, so two messages sharing a
    /// short name in different packages cannot both be rendered.
    fn check_type_names<'m>(
        &self,
        enums: &[EnumId],
        callbacks: &[MessageId],
        messages: impl Iterator<Item = &'m MessageId>,
    ) -> Result<(), ShimError> {
        let qualified = |id: MessageId| format!("{}.{}", self.model.message(id).package, self.model.full_name(id));
        let mut declared: Vec<(String, String)> = Vec::new();
        declared.extend(enums.iter().map(|&id| (go_enum_name(self.model, id), self.model.enum_full_name(id))));
        declared.extend(callbacks.iter().map(|&id| (go_func_name(self.model, id), qualified(id))));
        declared.extend(messages.map(|&id| (go_message_name(self.model, id), qualified(id))));

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (go_name, entity) in &declared {
            if let Some(previous) = seen.insert(go_name, entity) {
                return Err(self.render_error(format!(
                    "Go type {} is declared by both {} and {}",
                    go_name, previous, entity
                )));
            }
        }
        Ok(())
    }

    fn signatures(&self, file: &File) -> Vec<CallSignature> {
        let mut out = Vec::new();
        if let Some(rule) = &file.rule {
            for export in &rule.exports {
                out.extend(export.funcs.iter().map(CallSignature::function));
                out.extend(export.methods.iter().map(|m| CallSignature::method(self.model, m)));
            }
        }
        out
    }

    // ---- types ----

    fn go_type(&self, ty: &Type) -> Result<String, ShimError> {
        let boundary = Boundary::of(self.model, ty);
        let elem = self.class_type(boundary.class, ty)?;
        if boundary.array {
            Ok(format!("[]{}", elem))
        } else {
            Ok(elem)
        }
    }

    fn class_type(&self, class: ValueClass, ty: &Type) -> Result<String, ShimError> {
        let name = match class {
            ValueClass::Object => format!("*{}", go_message_name(self.model, self.message_ref(ty)?)),
            ValueClass::Enum => match ty.enum_id() {
                Some(id) => go_enum_name(self.model, id),
                None => return Err(self.render_error("enum type without a reference".to_string())),
            },
            ValueClass::Func => go_func_name(self.model, self.message_ref(ty)?),
            ValueClass::Int => "int".to_string(),
            ValueClass::Int32 => "int32".to_string(),
            ValueClass::Int64 => "int64".to_string(),
            ValueClass::Uint => "uint".to_string(),
            ValueClass::Uint32 => "uint32".to_string(),
            ValueClass::Uint64 => "uint64".to_string(),
            ValueClass::Float => "float32".to_string(),
            ValueClass::Double => "float64".to_string(),
            ValueClass::Bool => "bool".to_string(),
            ValueClass::String => "string".to_string(),
            ValueClass::Any => "any".to_string(),
            ValueClass::Ptr => "uint32".to_string(),
        };
        Ok(name)
    }

    fn message_ref(&self, ty: &Type) -> Result<MessageId, ShimError> {
        ty.message()
            .ok_or_else(|| self.render_error(format!("{:?} value without a message reference", ty.kind)))
    }

    fn zero(&self, ty: &Type) -> &'static str {
        let boundary = Boundary::of(self.model, ty);
        if boundary.array {
            return "nil";
        }
        match boundary.class {
            ValueClass::Object | ValueClass::Func | ValueClass::Any => "nil",
            ValueClass::String => "\"\"",
            ValueClass::Bool => "false",
            _ => "0",
        }
    }

    /// Expression marshalling Go value `v` into a boundary slot: `(uint64, error)`.
    fn to_wasm(&self, ty: &Type, v: &str) -> Result<String, ShimError> {
        let boundary = Boundary::of(self.model, ty);
        let conv = boundary.converter_name();
        let expr = match (boundary.class, boundary.array) {
            (ValueClass::Object, true) => format!("mod.to{}WasmValue(ctx, objectAddrs({}))", conv, v),
            (ValueClass::Object, false) => format!("mod.to{}WasmValue(ctx, {}.addr())", conv, v),
            (ValueClass::Enum, true) => format!("mod.to{}WasmValue(ctx, enumValues({}))", conv, v),
            (ValueClass::Enum, false) => format!("mod.to{}WasmValue(ctx, int32({}))", conv, v),
            (ValueClass::Func, true) => format!(
                "mod.to{}WasmValue(ctx, \"{}\", callbacks({}))",
                conv,
                self.model.full_name(self.message_ref(ty)?),
                v
            ),
            (ValueClass::Func, false) => format!(
                "mod.to{}WasmValue(ctx, \"{}\", {})",
                conv,
                self.model.full_name(self.message_ref(ty)?),
                v
            ),
            _ => format!("mod.to{}WasmValue(ctx, {})", conv, v),
        };
        Ok(expr)
    }

    /// Expression reading boundary storage at `ptr`: `(raw, error)`.
    fn read(&self, ty: &Type, ptr: &str) -> String {
        format!("mod.read{}(ctx, {})", Boundary::of(self.model, ty).converter_name(), ptr)
    }

    /// Turns the raw value returned by `read` into the Go type.
    fn lift(&self, ty: &Type, v: &str) -> Result<String, ShimError> {
        let boundary = Boundary::of(self.model, ty);
        let expr = match (boundary.class, boundary.array) {
            (ValueClass::Object, false) => format!("new{}({})", go_message_name(self.model, self.message_ref(ty)?), v),
            (ValueClass::Object, true) => {
                format!("new{}Slice({})", go_message_name(self.model, self.message_ref(ty)?), v)
            }
            (ValueClass::Enum, false) => format!("{}({})", self.class_type(ValueClass::Enum, ty)?, v),
            (ValueClass::Enum, true) => format!("liftEnumSlice[{}]({})", self.class_type(ValueClass::Enum, ty)?, v),
            (ValueClass::Func, false) => format!("liftFunc[{}]({})", self.class_type(ValueClass::Func, ty)?, v),
            (ValueClass::Func, true) => format!("liftFuncSlice[{}]({})", self.class_type(ValueClass::Func, ty)?, v),
            _ => v.to_string(),
        };
        Ok(expr)
    }

    // ---- enums ----

    fn enum_type(&mut self, id: EnumId) {
        let name = go_enum_name(self.model, id);
        self.code.push(String::new());
        self.code.push(format!("type {} int32", name));
        let values: Vec<String> = self
            .model
            .enum_(id)
            .values
            .iter()
            .filter(|value| value.alias.is_some())
            .map(|value| format!("const {} {} = {}", value.name, name, value.number))
            .collect();
        if !values.is_empty() {
            self.code.push(String::new());
            self.code.extend(values);
        }
    }

    // ---- callbacks ----

    fn callback(&mut self, id: MessageId) -> Result<(), ShimError> {
        let msg = self.model.message(id);
        let Some(func) = msg.rule.funcptr.as_ref() else {
            return Ok(());
        };
        let name = go_func_name(self.model, id);

        let mut params = vec!["ctx context.Context".to_string()];
        for (i, arg) in func.args.iter().enumerate() {
            params.push(format!("arg{} {}", i, self.go_type(arg)?));
        }
        let result = match &func.ret {
            Some(ret) => format!("({}, error)", self.go_type(ret)?),
            None => "error".to_string(),
        };

        let mut body = Vec::new();
        let mut call_args = vec!["ctx".to_string()];
        for (i, arg) in func.args.iter().enumerate() {
            body.push(format!("a{}, err := {}", i, self.read(arg, &format!("slots[{}]", i))));
            body.push("if err != nil {".to_string());
            body.push("\treturn 0, err".to_string());
            body.push("}".to_string());
            call_args.push(self.lift(arg, &format!("a{}", i))?);
        }
        let call = format!("f({})", call_args.join(", "));
        match &func.ret {
            Some(ret) => {
                body.push(format!("r, err := {}", call));
                body.push("if err != nil {".to_string());
                body.push("\treturn 0, err".to_string());
                body.push("}".to_string());
                body.push(format!("return {}", self.to_wasm(ret, "r")?));
            }
            None => {
                body.push(format!("if err := {}; err != nil {{", call));
                body.push("\treturn 0, err".to_string());
                body.push("}".to_string());
                body.push("return 0, nil".to_string());
            }
        }

        self.code.push(String::new());
        self.code.push(format!("type {} func({}) {}", name, params.join(", "), result));
        self.code.push(String::new());
        self.code.push(format!(
            "func (f {}) invoke(ctx context.Context, slots []uint32) (uint64, error) {{",
            name
        ));
        self.code.extend(body.into_iter().map(|line| format!("\t{}", line)));
        self.code.push("}".to_string());
        Ok(())
    }

    // ---- messages ----

    fn message(&mut self, id: MessageId) -> Result<(), ShimError> {
        let msg = self.model.message(id);
        let name = go_message_name(self.model, id);
        let full = self.model.full_name(id);

        self.wrapper(id);

        if msg.rule.has_constructor {
            self.code.push(String::new());
            self.code.push(format!("func New{}(ctx context.Context) (*{}, error) {{", name, name));
            self.code.push("\tret, err := mod.alloc(ctx, 8)".to_string());
            self.push_check("nil", 1);
            self.code.push("\tdefer mod.free(ctx, ret)".to_string());
            self.code.push(format!(
                "\tif _, err := mod.ExportedFunction(\"{}{}_new\").Call(ctx, uint64(ret)); err != nil {{",
                self.prefix, full
            ));
            self.code.push("\t\treturn nil, err".to_string());
            self.code.push("\t}".to_string());
            self.code.push("\tv, err := mod.readObject(ctx, ret)".to_string());
            self.push_check("nil", 1);
            self.code.push(format!("\treturn new{}(v), nil", name));
            self.code.push("}".to_string());
            self.code.push(String::new());
            self.code.push(format!("func (p *{}) Free(ctx context.Context) error {{", name));
            self.code.push(format!(
                "\tif _, err := mod.ExportedFunction(\"{}{}_free\").Call(ctx, uint64(p.addr())); err != nil {{",
                self.prefix, full
            ));
            self.code.push("\t\treturn err".to_string());
            self.code.push("\t}".to_string());
            self.code.push("\treturn nil".to_string());
            self.code.push("}".to_string());
        }

        for field in &msg.fields {
            self.getter(&name, field)?;
            self.setter(&name, field)?;
        }
        Ok(())
    }

    /// Handle type of a message: the struct, its constructors from raw
    /// addresses and `addr`.
    fn wrapper(&mut self, id: MessageId) {
        let name = go_message_name(self.model, id);
        self.code.push(String::new());
        self.code.push(format!("type {} struct {{", name));
        self.code.push("\tptr uint32".to_string());
        self.code.push("}".to_string());
        self.code.push(String::new());
        self.code.push(format!("func new{}(ptr uint32) *{} {{", name, name));
        self.code.push("\tif ptr == 0 {".to_string());
        self.code.push("\t\treturn nil".to_string());
        self.code.push("\t}".to_string());
        self.code.push(format!("\treturn &{}{{ptr: ptr}}", name));
        self.code.push("}".to_string());
        self.code.push(String::new());
        self.code.push(format!("func new{}Slice(ptrs []uint32) []*{} {{", name, name));
        self.code.push(format!("\tret := make([]*{}, 0, len(ptrs))", name));
        self.code.push("\tfor _, ptr := range ptrs {".to_string());
        self.code.push(format!("\t\tret = append(ret, new{}(ptr))", name));
        self.code.push("\t}".to_string());
        self.code.push("\treturn ret".to_string());
        self.code.push("}".to_string());
        self.code.push(String::new());
        self.code.push(format!("func (p *{}) addr() uint32 {{", name));
        self.code.push("\tif p == nil {".to_string());
        self.code.push("\t\treturn 0".to_string());
        self.code.push("\t}".to_string());
        self.code.push("\treturn p.ptr".to_string());
        self.code.push("}".to_string());
    }

    fn getter(&mut self, recv: &str, field: &Field) -> Result<(), ShimError> {
        let ty = &field.ty;
        let symbol = format!("{}{}", self.prefix, self.model.field_full_name(field));
        let go_type = self.go_type(ty)?;
        let zero = self.zero(ty);
        let size = Boundary::of(self.model, ty).storage_size();
        let read = self.read(ty, "ret");
        let lift = self.lift(ty, "v")?;

        self.code.push(String::new());
        self.code.push(format!(
            "func (p *{}) {}(ctx context.Context) ({}, error) {{",
            recv,
            to_public_go_variable(&field.name),
            go_type
        ));
        self.code.push(format!("\tret, err := mod.alloc(ctx, {})", size));
        self.push_check(zero, 1);
        self.code.push("\tdefer mod.free(ctx, ret)".to_string());
        self.code.push(format!(
            "\tif _, err := mod.ExportedFunction(\"{}\").Call(ctx, uint64(p.addr()), uint64(ret)); err != nil {{",
            symbol
        ));
        self.code.push(format!("\t\treturn {}, err", zero));
        self.code.push("\t}".to_string());
        self.code.push(format!("\tv, err := {}", read));
        self.push_check(zero, 1);
        self.code.push(format!("\treturn {}, nil", lift));
        self.code.push("}".to_string());
        Ok(())
    }

    fn setter(&mut self, recv: &str, field: &Field) -> Result<(), ShimError> {
        let ty = &field.ty;
        let symbol = format!("{}{}_set", self.prefix, self.model.field_full_name(field));
        let go_type = self.go_type(ty)?;
        let marshal = self.to_wasm(ty, "v")?;

        self.code.push(String::new());
        self.code.push(format!(
            "func (p *{}) Set{}(ctx context.Context, v {}) error {{",
            recv,
            to_public_go_variable(&field.name),
            go_type
        ));
        self.code.push(format!("\targ, err := {}", marshal));
        self.code.push("\tif err != nil {".to_string());
        self.code.push("\t\treturn err".to_string());
        self.code.push("\t}".to_string());
        self.code.push(format!(
            "\tif _, err := mod.ExportedFunction(\"{}\").Call(ctx, uint64(p.addr()), arg); err != nil {{",
            symbol
        ));
        self.code.push("\t\treturn err".to_string());
        self.code.push("\t}".to_string());
        self.code.push("\treturn nil".to_string());
        self.code.push("}".to_string());
        Ok(())
    }

    // ---- functions and methods ----

    fn function(&mut self, sig: &CallSignature) -> Result<(), ShimError> {
        let go_name = to_public_go_variable(&sig.name);
        let fail = match sig.ret.as_ref().map(|ret| self.zero(ret)) {
            Some(zero) => format!("return {}, err", zero),
            None => "return err".to_string(),
        };

        let mut params = vec!["ctx context.Context".to_string()];
        let mut body = Vec::new();
        let mut values = Vec::new();
        for slot in sig.slots() {
            match slot {
                Slot::Receiver(_) => values.push("uint64(p.addr())".to_string()),
                Slot::Arg(i, ty) => {
                    params.push(format!("arg{} {}", i, self.go_type(ty)?));
                    body.push(format!("_arg{}, err := {}", i, self.to_wasm(ty, &format!("arg{}", i))?));
                    body.push("if err != nil {".to_string());
                    body.push(format!("\t{}", fail));
                    body.push("}".to_string());
                    values.push(format!("_arg{}", i));
                }
                Slot::Return(ty) => {
                    body.push(format!("ret, err := mod.alloc(ctx, {})", Boundary::of(self.model, ty).storage_size()));
                    body.push("if err != nil {".to_string());
                    body.push(format!("\t{}", fail));
                    body.push("}".to_string());
                    body.push("defer mod.free(ctx, ret)".to_string());
                    values.push("uint64(ret)".to_string());
                }
            }
        }

        let mut call_args = vec!["ctx".to_string()];
        call_args.extend(values);
        body.push(format!(
            "if _, err := mod.ExportedFunction(\"{}\").Call({}); err != nil {{",
            sig.prefixed(self.prefix),
            call_args.join(", ")
        ));
        body.push(format!("\t{}", fail));
        body.push("}".to_string());

        let result = match &sig.ret {
            Some(ret) => {
                body.push(format!("v, err := {}", self.read(ret, "ret")));
                body.push("if err != nil {".to_string());
                body.push(format!("\t{}", fail));
                body.push("}".to_string());
                body.push(format!("return {}, nil", self.lift(ret, "v")?));
                format!("({}, error)", self.go_type(ret)?)
            }
            None => {
                body.push("return nil".to_string());
                "error".to_string()
            }
        };

        let head = match &sig.receiver {
            Some(receiver) => format!(
                "func (p *{}) {}({}) {} {{",
                go_message_name(self.model, self.message_ref(receiver)?),
                go_name,
                params.join(", "),
                result
            ),
            None => format!("func {}({}) {} {{", go_name, params.join(", "), result),
        };
        self.code.push(String::new());
        self.code.push(head);
        self.code.extend(body.into_iter().map(|line| format!("\t{}", line)));
        self.code.push("}".to_string());
        Ok(())
    }

    fn push_check(&mut self, zero: &str, depth: usize) {
        let indent = "\t".repeat(depth);
        self.code.push(format!("{}if err != nil {{", indent));
        self.code.push(format!("{}\treturn {}, err", indent, zero));
        self.code.push(format!("{}}}", indent));
    }

    fn render_error(&self, msg: String) -> ShimError {
        ShimError::RenderError { artifact: Artifact::HostWrapper, msg }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_source;
    use crate::resolver::resolve;
    use pretty_assertions::assert_eq;

    fn render(source: &str) -> String {
        let mut file = compile_source("t.shim", source).unwrap();
        file.normalize_rules().unwrap();
        let model = resolve(std::slice::from_ref(&file)).unwrap();
        generate_go(&model, &model.files[0], "wasm_bridge_", "bridge").unwrap()
    }

    fn block<'s>(code: &'s str, head: &str) -> &'s str {
        let start = code.find(head).unwrap_or_else(|| panic!("{} not found in\n{}", head, code));
        let end = code[start..].find("\n}").unwrap() + start + 2;
        &code[start..end]
    }

    #[test]
    fn plain_struct_accessors() {
        let code = render(
            r#"package t;
            message Point { option message = {"alias":"point_t"}; int32 x = 1; int32 y = 2; }"#,
        );
        assert_eq!(
            block(&code, "func (p *Point) X("),
            "func (p *Point) X(ctx context.Context) (int32, error) {
\tret, err := mod.alloc(ctx, 8)
\tif err != nil {
\t\treturn 0, err
\t}
\tdefer mod.free(ctx, ret)
\tif _, err := mod.ExportedFunction(\"wasm_bridge_Point_x\").Call(ctx, uint64(p.addr()), uint64(ret)); err != nil {
\t\treturn 0, err
\t}
\tv, err := mod.readInt32(ctx, ret)
\tif err != nil {
\t\treturn 0, err
\t}
\treturn v, nil
}"
        );
        assert_eq!(
            block(&code, "func (p *Point) SetY("),
            "func (p *Point) SetY(ctx context.Context, v int32) error {
\targ, err := mod.toInt32WasmValue(ctx, v)
\tif err != nil {
\t\treturn err
\t}
\tif _, err := mod.ExportedFunction(\"wasm_bridge_Point_y_set\").Call(ctx, uint64(p.addr()), arg); err != nil {
\t\treturn err
\t}
\treturn nil
}"
        );
        assert!(code.contains("func NewPoint(ctx context.Context) (*Point, error) {"));
        assert!(code.contains("\n\npackage bridge\n"));
    }

    #[test]
    fn only_aliased_enum_values_are_exported() {
        let code = render(
            r#"package t; enum Color { RED = 0 [enum_value = {"alias":"C_RED"}]; BLUE = 1; }"#,
        );
        assert!(code.contains("type Color int32"));
        assert!(code.contains("const RED Color = 0"));
        assert!(!code.contains("BLUE"));
        assert!(!code.contains("import"));
    }

    #[test]
    fn method_passes_receiver_first_and_return_last() {
        let code = render(
            r#"package t;
            message Graph { option message = {"alias":"Agraph_t","constructor":false}; }
            message Node { option message = {"alias":"Agnode_t","constructor":false}; }
            option file = {"exports":[{"methods":[{"name":"create_node","alias":"agnode","recv":"Graph",
                "args":[{"kind":"charptr"},{"kind":"bool"}],
                "return":{"kind":"struct","ref":"Node","pointer":1}}]}]};"#,
        );
        let body = block(&code, "func (p *Graph) CreateNode(");
        assert!(body.starts_with(
            "func (p *Graph) CreateNode(ctx context.Context, arg0 string, arg1 bool) (*Node, error) {"
        ));
        assert!(body.contains("\t_arg0, err := mod.toStringWasmValue(ctx, arg0)"), "{}", body);
        assert!(body.contains("\tret, err := mod.alloc(ctx, 8)"), "{}", body);
        assert!(
            body.contains(
                ".Call(ctx, uint64(p.addr()), _arg0, _arg1, uint64(ret)); err != nil {"
            ),
            "{}",
            body
        );
        assert!(body.contains("\treturn newNode(v), nil"), "{}", body);
        assert!(!code.contains("func NewGraph("));
    }

    #[test]
    fn void_function() {
        let code = render(
            r#"package t;
            message Graph { option message = {"alias":"Agraph_t","constructor":false}; }
            option file = {"exports":[{"funcs":[{"name":"agclose","args":[{"kind":"struct","ref":"Graph","pointer":1}]}]}]};"#,
        );
        assert_eq!(
            block(&code, "func Agclose("),
            "func Agclose(ctx context.Context, arg0 *Graph) error {
\t_arg0, err := mod.toObjectWasmValue(ctx, arg0.addr())
\tif err != nil {
\t\treturn err
\t}
\tif _, err := mod.ExportedFunction(\"wasm_bridge_agclose\").Call(ctx, _arg0); err != nil {
\t\treturn err
\t}
\treturn nil
}"
        );
    }

    #[test]
    fn callback_type_and_dispatcher() {
        let code = render(
            r#"package t;
            message Compare { option message = {"funcptr":{"args":[
                {"kind":"voidptr","funcbaseptr":true},{"kind":"int32"}],"return":{"kind":"int"}}}; }
            message Disc { option message = {"alias":"Dtdisc_t"}; Compare cmp = 1; }"#,
        );
        assert!(code.contains("type CompareFunc func(ctx context.Context, arg0 any, arg1 int32) (int, error)"));
        let invoke = block(&code, "func (f CompareFunc) invoke(");
        assert!(invoke.contains("\ta1, err := mod.readInt32(ctx, slots[1])"), "{}", invoke);
        assert!(invoke.contains("\tr, err := f(ctx, a0, a1)"), "{}", invoke);
        assert!(invoke.contains("\treturn mod.toIntWasmValue(ctx, r)"), "{}", invoke);

        let setter = block(&code, "func (p *Disc) SetCmp(");
        assert!(setter.contains("mod.toFuncWasmValue(ctx, \"Compare\", v)"), "{}", setter);
        let getter = block(&code, "func (p *Disc) Cmp(");
        assert!(getter.contains("\treturn liftFunc[CompareFunc](v), nil"), "{}", getter);
        assert!(!code.contains("type Compare struct"));
    }

    #[test]
    fn repeated_and_enum_fields_use_their_converters() {
        let code = render(
            r#"package t;
            enum Shape { BOX = 0 [enum_value = {"alias":"SHAPE_BOX"}]; }
            message Node { option message = {"alias":"node_t"};
                repeated Node children = 1 [field = {"type":{"kind":"struct","ref":"Node","pointer":1,"array":true}}];
                Shape shape = 2;
                repeated Shape history = 3;
            }"#,
        );
        let children = block(&code, "func (p *Node) Children(");
        assert!(children.starts_with("func (p *Node) Children(ctx context.Context) ([]*Node, error) {"));
        assert!(children.contains("mod.alloc(ctx, 24)"), "{}", children);
        assert!(children.contains("mod.readObjectArray(ctx, ret)"), "{}", children);
        assert!(children.contains("return newNodeSlice(v), nil"), "{}", children);

        assert!(code.contains("mod.toEnumWasmValue(ctx, int32(v))"));
        assert!(code.contains("return Shape(v), nil"));
        assert!(code.contains("return liftEnumSlice[Shape](v), nil"));
        assert!(code.contains("mod.toEnumArrayWasmValue(ctx, enumValues(v))"));
    }
}
