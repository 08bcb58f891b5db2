use crate::{
    error::{Artifact, ShimError},
    signature::{Boundary, CallSignature, Slot, ValueClass},
    types::{EnumId, Field, File, Message, MessageId, Model, Type, TypeKind},
};

pub const GENERATED_BANNER: &str = "// Code generated by shimwright. DO NOT EDIT.";

const STANDARD_INCLUDES: [&str; 5] = ["stdbool.h", "stddef.h", "stdint.h", "stdlib.h", "string.h"];

/// Boundary descriptors and helpers every shim unit starts with.
const PREAMBLE: &str = r#"typedef struct {
  const char *p;
  long long n;
} GoString;

typedef struct {
  void *data;
  long long len;
  long long cap;
} GoSlice;

#define BRIDGE_EXPORT __attribute__((visibility("default")))
#define BRIDGE_IMPORT(name) __attribute__((import_module("env"), import_name(name)))

BRIDGE_IMPORT("bridge_invoke_callback")
void bridge_invoke_callback(void *base, const char *name, uint64_t *slots, int argc, uint64_t *ret);

static inline void *bridge_slice_data(GoSlice *slice, long long len) {
  if (slice == NULL) {
    return NULL;
  }
  if (len < 0) {
    len = slice->len;
  }
  if (slice->cap < len) {
    return NULL;
  }
  return slice->data;
}

static inline char *bridge_string_data(GoString *str, long long len) {
  if (str == NULL) {
    return NULL;
  }
  if (len < 0 || len > str->n) {
    len = str->n;
  }
  char *buf = (char *)malloc((size_t)len + 1);
  if (buf == NULL) {
    return NULL;
  }
  memcpy(buf, str->p, (size_t)len);
  buf[len] = '\0';
  return buf;
}

static inline void bridge_make_slice(GoSlice *dst, void *data, long long len) {
  dst->data = data;
  dst->len = data == NULL ? 0 : len;
  dst->cap = dst->len;
}

static inline void bridge_make_string(GoString *dst, const char *str, long long len) {
  dst->p = str;
  if (str == NULL) {
    dst->n = 0;
  } else {
    dst->n = len < 0 ? (long long)strlen(str) : len;
  }
}

static inline void *bridge_dup(const void *ptr, size_t size) {
  void *ret = malloc(size);
  if (ret != NULL) {
    memcpy(ret, ptr, size);
  }
  return ret;
}

static inline long long bridge_ptr_array_len(void **arr) {
  long long len = 0;
  if (arr == NULL) {
    return 0;
  }
  while (arr[len] != NULL) {
    len++;
  }
  return len;
}"#;

/// Where a native value is written to on the boundary.
struct Out<'s> {
    /// Pointer to the boundary storage.
    ptr:    &'s str,
    /// The storage itself, assignable.
    lvalue: &'s str,
}

/// How a struct held by value leaves native code.
#[derive(Clone, Copy, PartialEq)]
enum StructOut {
    /// Hand out the address of the live value.
    Borrow,
    /// Copy the value to the heap first.
    Copy,
}

/// Renders the native shim for `file`.
#[tracing::instrument(level = "debug", skip_all, fields(file = %file.name))]
pub fn generate_c(model: &Model, file: &File, prefix: &str) -> Result<String, ShimError> {
    let mut gen = CGenerator { model, prefix, code: Vec::new() };
    gen.file(file)?;
    tracing::debug!(lines = gen.code.len(), "rendered native shim");
    let mut out = gen.code.join("\n");
    out.push('\n');
    Ok(out)
}

struct CGenerator<'a> {
    model:  &'a Model,
    prefix: &'a str,
    code:   Vec<String>,
}

impl<'a> CGenerator<'a> {
    fn file(&mut self, file: &File) -> Result<(), ShimError> {
        self.code.push(GENERATED_BANNER.to_string());
        self.code.push(String::new());
        for include in STANDARD_INCLUDES {
            self.code.push(format!("#include <{}>", include));
        }
        let headers = self.model.headers(file);
        if !headers.is_empty() {
            self.code.push(String::new());
            for header in headers {
                if header.starts_with('<') {
                    self.code.push(format!("#include {}", header));
                } else {
                    self.code.push(format!("#include \"{}\"", header));
                }
            }
        }
        self.code.push(String::new());
        self.code.push(PREAMBLE.to_string());

        for id in self.model.file_enums(file) {
            self.enum_asserts(id)?;
        }

        // Callbacks declared in imported files are only ever rendered here.
        let foreign = self.model.foreign_types(file).callbacks;
        for id in foreign.into_iter().chain(self.model.callback_messages(file)) {
            self.trampoline(id)?;
        }

        for id in self.model.exported_messages(file) {
            self.message(id)?;
        }

        if let Some(rule) = &file.rule {
            for export in &rule.exports {
                for func in &export.funcs {
                    self.function(&CallSignature::function(func))?;
                }
                for method in &export.methods {
                    self.function(&CallSignature::method(self.model, method))?;
                }
            }
        }
        Ok(())
    }

    fn enum_asserts(&mut self, id: EnumId) -> Result<(), ShimError> {
        let enum_ = self.model.enum_(id);
        let full = self.model.enum_full_name(id);
        let mut lines = Vec::new();
        for value in &enum_.values {
            if let Some(alias) = &value.alias {
                lines.push(format!(
                    "_Static_assert((int){} == {}, \"{}.{} must equal {}\");",
                    alias, value.number, full, value.name, alias
                ));
            }
        }
        if !lines.is_empty() {
            self.code.push(String::new());
            self.code.extend(lines);
        }
        Ok(())
    }

    // ---- native types ----

    fn native_type(&self, ty: &Type, context: &str) -> Result<String, ShimError> {
        let depth = ty.native_pointer_depth() as usize;
        let (base, depth) = if ty.kind == TypeKind::Funcptr || self.model.funcptr(ty).is_some() {
            match ty.message().map(|id| &self.model.message(id).rule.alias) {
                Some(alias) if !alias.is_empty() => (alias.clone(), depth),
                _ => ("void".to_string(), depth.max(1)),
            }
        } else {
            let base = match ty.kind {
                TypeKind::Struct => self.struct_alias(ty, context)?,
                TypeKind::Enum => match ty.enum_id() {
                    Some(id) => self.model.enum_(id).alias.clone(),
                    None => return Err(self.render_error(format!("{}: enum type without a reference", context))),
                },
                TypeKind::Int => "int".to_string(),
                TypeKind::Int32 => "int32_t".to_string(),
                TypeKind::Int64 => "int64_t".to_string(),
                TypeKind::Uint => "unsigned int".to_string(),
                TypeKind::Uint32 => "uint32_t".to_string(),
                TypeKind::Uint64 => "uint64_t".to_string(),
                TypeKind::Float => "float".to_string(),
                TypeKind::Double => "double".to_string(),
                TypeKind::Bool => "bool".to_string(),
                TypeKind::String | TypeKind::Charptr => "char".to_string(),
                TypeKind::Voidptr => "void".to_string(),
                TypeKind::Funcptr => "void".to_string(),
            };
            (base, depth)
        };

        let mut text = String::new();
        if ty.is_const {
            text.push_str("const ");
        }
        text.push_str(&base);
        if depth > 0 {
            text.push(' ');
            text.push_str(&"*".repeat(depth));
        }
        Ok(text)
    }

    fn struct_alias(&self, ty: &Type, context: &str) -> Result<String, ShimError> {
        let id = ty
            .message()
            .ok_or_else(|| self.render_error(format!("{}: struct type without a reference", context)))?;
        let alias = &self.model.message(id).rule.alias;
        if alias.is_empty() {
            return Err(self.render_error(format!(
                "{}: message {} has no native alias",
                context,
                self.model.full_name(id)
            )));
        }
        Ok(alias.clone())
    }

    /// Boundary storage type of a value, without the by-reference pointer.
    fn storage(&self, ty: &Type) -> &'static str {
        let boundary = Boundary::of(self.model, ty);
        if boundary.array {
            return "GoSlice";
        }
        match boundary.class {
            ValueClass::String => "GoString",
            ValueClass::Object | ValueClass::Any | ValueClass::Func | ValueClass::Ptr => "void *",
            ValueClass::Enum | ValueClass::Int => "int",
            ValueClass::Uint => "unsigned int",
            ValueClass::Int32 => "int32_t",
            ValueClass::Int64 => "int64_t",
            ValueClass::Uint32 => "uint32_t",
            ValueClass::Uint64 => "uint64_t",
            ValueClass::Bool => "bool",
            ValueClass::Float => "float",
            ValueClass::Double => "double",
        }
    }

    /// Parameter declaration of an input slot.
    fn param(&self, ty: &Type, name: &str) -> String {
        if Boundary::of(self.model, ty).by_ref() {
            ptr_decl(self.storage(ty), name)
        } else {
            decl(self.storage(ty), name)
        }
    }

    fn trampoline_name(&self, id: MessageId) -> String {
        format!("{}{}_trampoline", self.prefix, self.model.full_name(id))
    }

    // ---- conversions ----

    /// Boundary value `src` as a native expression of type `ty`.
    fn read_in(&self, ty: &Type, src: &str, len: Option<&str>, context: &str) -> Result<String, ShimError> {
        let native = self.native_type(ty, context)?;
        let boundary = Boundary::of(self.model, ty);
        if boundary.array {
            return Ok(format!("({})bridge_slice_data({}, {})", native, src, len.unwrap_or("-1")));
        }
        let expr = match boundary.class {
            ValueClass::String => format!("({})bridge_string_data({}, {})", native, src, len.unwrap_or("-1")),
            ValueClass::Func => {
                let id = ty
                    .message()
                    .ok_or_else(|| self.render_error(format!("{}: callback without a reference", context)))?;
                format!("{} != NULL ? ({}){} : NULL", src, native, self.trampoline_name(id))
            }
            ValueClass::Object if ty.pointer == 0 => format!("*({} *){}", native, src),
            _ => format!("({}){}", native, src),
        };
        Ok(expr)
    }

    /// Statements storing native `src` into boundary storage `out`.
    fn write_out(
        &self,
        ty: &Type,
        src: &str,
        out: &Out<'_>,
        len: Option<String>,
        struct_out: StructOut,
    ) -> Vec<String> {
        let boundary = Boundary::of(self.model, ty);
        if boundary.array {
            let len = if ty.array_num > 0 {
                ty.array_num.to_string()
            } else if let Some(len) = len {
                len
            } else if ty.native_pointer_depth() >= 2 {
                format!("bridge_ptr_array_len((void **){})", src)
            } else {
                "0".to_string()
            };
            return vec![format!("bridge_make_slice({}, (void *){}, {});", out.ptr, src, len)];
        }
        match boundary.class {
            ValueClass::String => vec![format!(
                "bridge_make_string({}, (const char *){}, {});",
                out.ptr,
                src,
                len.as_deref().unwrap_or("-1")
            )],
            ValueClass::Object if ty.pointer == 0 => match struct_out {
                StructOut::Borrow => vec![format!("{} = (void *)&{};", out.lvalue, src)],
                StructOut::Copy => vec![format!("{} = bridge_dup(&{}, sizeof({}));", out.lvalue, src, src)],
            },
            ValueClass::Object | ValueClass::Any | ValueClass::Func | ValueClass::Ptr => {
                vec![format!("{} = (void *){};", out.lvalue, src)]
            }
            _ => vec![format!("{} = ({}){};", out.lvalue, self.storage(ty), src)],
        }
    }

    // ---- callbacks ----

    fn trampoline_signature(&self, id: MessageId) -> Result<String, ShimError> {
        let msg = self.model.message(id);
        let full = self.model.full_name(id);
        let func = msg
            .rule
            .funcptr
            .as_ref()
            .ok_or_else(|| self.render_error(format!("{} is not a callback", full)))?;
        let ret = match &func.ret {
            Some(ret) => self.native_type(ret, &full)?,
            None => "void".to_string(),
        };
        let mut params = Vec::with_capacity(func.args.len());
        for (i, arg) in func.args.iter().enumerate() {
            params.push(decl(&self.native_type(arg, &full)?, &format!("arg{}", i)));
        }
        if params.is_empty() {
            params.push("void".to_string());
        }
        Ok(format!("{} {}({})", ret, self.trampoline_name(id), params.join(", ")))
    }

    fn trampoline(&mut self, id: MessageId) -> Result<(), ShimError> {
        let msg = self.model.message(id);
        let full = self.model.full_name(id);
        let Some(func) = msg.rule.funcptr.as_ref() else {
            return Ok(());
        };

        let mut body = Vec::new();
        let mut base = None;
        let inputs: Vec<&Type> = func.args.iter().collect();
        for (i, arg) in func.args.iter().enumerate() {
            let local = format!("_arg{}", i);
            body.push(format!("  {};", decl(self.storage(arg), &local)));
            if arg.is_func_base_ptr {
                base = Some(format!("(void *)arg{}", i));
            }
        }
        for (i, arg) in func.args.iter().enumerate() {
            let local = format!("_arg{}", i);
            let ptr = format!("&{}", local);
            let out = Out { ptr: &ptr, lvalue: &local };
            let len = length_of(arg, &inputs, |k| format!("arg{}", k));
            for line in self.write_out(arg, &format!("arg{}", i), &out, len, StructOut::Borrow) {
                body.push(format!("  {}", line));
            }
        }

        let slots: Vec<String> = (0..func.args.len())
            .map(|i| format!("(uint64_t)(uintptr_t)&_arg{}", i))
            .collect();
        if slots.is_empty() {
            body.push("  uint64_t slots[1] = {0};".to_string());
        } else {
            body.push(format!("  uint64_t slots[{}] = {{{}}};", slots.len(), slots.join(", ")));
        }
        body.push("  uint64_t _ret = 0;".to_string());
        let base = base.ok_or(ShimError::MalformedFuncptr { message: full.clone(), count: 0 })?;
        body.push(format!(
            "  bridge_invoke_callback({}, \"{}\", slots, {}, &_ret);",
            base,
            full,
            func.args.len()
        ));
        if let Some(ret) = &func.ret {
            body.push(format!("  {};", self.param(ret, "_r")));
            body.push("  memcpy(&_r, &_ret, sizeof(_r));".to_string());
            body.push(format!("  return {};", self.read_in(ret, "_r", None, &full)?));
        }

        let signature = self.trampoline_signature(id)?;
        self.code.push(String::new());
        self.code.push(format!("{} {{", signature));
        self.code.extend(body);
        self.code.push("}".to_string());
        Ok(())
    }

    // ---- messages ----

    fn message(&mut self, id: MessageId) -> Result<(), ShimError> {
        let msg: &Message = self.model.message(id);
        let full = self.model.full_name(id);
        let alias = msg.rule.alias.clone();

        if msg.rule.has_constructor {
            self.code.push(String::new());
            self.code.push(format!("BRIDGE_EXPORT void {}{}_new(void **ret) {{", self.prefix, full));
            self.code.push(format!("  *ret = calloc(1, sizeof({}));", alias));
            self.code.push("}".to_string());
            self.code.push(String::new());
            self.code.push(format!("BRIDGE_EXPORT void {}{}_free(void *recv) {{", self.prefix, full));
            self.code.push("  free(recv);".to_string());
            self.code.push("}".to_string());
        }

        for field in &msg.fields {
            self.getter(msg, &alias, field)?;
            self.setter(&alias, field)?;
        }
        Ok(())
    }

    fn getter(&mut self, msg: &Message, alias: &str, field: &Field) -> Result<(), ShimError> {
        let name = self.model.field_full_name(field);
        let ty = &field.ty;
        let src = format!("recv->{}", field.accessor());
        let len = CallSignature::array_length_slot(ty)
            .and_then(|k| msg.fields.get(k))
            .map(|sibling| format!("(long long)recv->{}", sibling.accessor()))
            .or_else(|| {
                CallSignature::string_length_slot(ty)
                    .and_then(|k| msg.fields.get(k))
                    .map(|sibling| format!("(long long)recv->{}", sibling.accessor()))
            });
        // validate the native rendering even when the getter does not need it
        self.native_type(ty, &name)?;

        let out = Out { ptr: "ret", lvalue: "*ret" };
        let lines = self.write_out(ty, &src, &out, len, StructOut::Borrow);

        self.code.push(String::new());
        let ret = ptr_decl(self.storage(ty), "ret");
        self.code.push(format!("BRIDGE_EXPORT void {}{}(void *_recv, {}) {{", self.prefix, name, ret));
        self.code.push(format!("  {} *recv = ({} *)_recv;", alias, alias));
        for line in lines {
            self.code.push(format!("  {}", line));
        }
        self.code.push("}".to_string());
        Ok(())
    }

    fn setter(&mut self, alias: &str, field: &Field) -> Result<(), ShimError> {
        let name = self.model.field_full_name(field);
        let ty = &field.ty;
        let dst = format!("recv->{}", field.accessor());

        let mut lines = Vec::new();
        if ty.is_repeated && ty.array_num > 0 {
            lines.push(format!("void *data = bridge_slice_data(v, {});", ty.array_num));
            lines.push("if (data != NULL) {".to_string());
            lines.push(format!("  memcpy({}, data, sizeof({}));", dst, dst));
            lines.push("}".to_string());
        } else {
            lines.push(format!("{} = {};", dst, self.read_in(ty, "v", None, &name)?));
        }

        self.code.push(String::new());
        self.code.push(format!(
            "BRIDGE_EXPORT void {}{}_set(void *_recv, {}) {{",
            self.prefix,
            name,
            self.param(ty, "v")
        ));
        self.code.push(format!("  {} *recv = ({} *)_recv;", alias, alias));
        for line in lines {
            self.code.push(format!("  {}", line));
        }
        self.code.push("}".to_string());
        Ok(())
    }

    // ---- functions and methods ----

    fn function(&mut self, sig: &CallSignature) -> Result<(), ShimError> {
        let inputs: Vec<&Type> = sig.slots().into_iter().filter_map(|slot| match slot {
            Slot::Receiver(ty) | Slot::Arg(_, ty) => Some(ty),
            Slot::Return(_) => None,
        }).collect();

        let mut params = Vec::with_capacity(inputs.len() + 1);
        for (i, ty) in inputs.iter().enumerate() {
            params.push(self.param(ty, &format!("_arg{}", i)));
        }
        if let Some(ret) = &sig.ret {
            params.push(ptr_decl(self.storage(ret), "ret"));
        }
        if params.is_empty() {
            params.push("void".to_string());
        }

        let mut body = Vec::new();
        // lengths are read before any buffer is converted
        for (i, ty) in inputs.iter().enumerate() {
            if let Some(k) = CallSignature::array_length_slot(ty).or_else(|| CallSignature::string_length_slot(ty)) {
                body.push(format!("long long _len{} = (long long)_arg{};", i, k));
            }
        }
        for (i, ty) in inputs.iter().enumerate() {
            let len = if CallSignature::array_length_slot(ty).is_some()
                || CallSignature::string_length_slot(ty).is_some()
            {
                Some(format!("_len{}", i))
            } else if ty.is_repeated && ty.array_num > 0 {
                Some(ty.array_num.to_string())
            } else {
                None
            };
            let native = self.native_type(ty, &sig.symbol)?;
            let value = self.read_in(ty, &format!("_arg{}", i), len.as_deref(), &sig.symbol)?;
            body.push(format!("{} = {};", decl(&native, &format!("arg{}", i)), value));
        }

        let call_args: Vec<String> = inputs
            .iter()
            .enumerate()
            .map(|(i, ty)| if ty.addr { format!("&arg{}", i) } else { format!("arg{}", i) })
            .collect();
        let call = format!("{}({})", sig.native, call_args.join(", "));

        match &sig.ret {
            Some(ret) => {
                let native = self.native_type(ret, &sig.symbol)?;
                body.push(format!("{} = {};", decl(&native, "_v"), call));
                let len = length_of(ret, &inputs, |k| format!("arg{}", k));
                let out = Out { ptr: "ret", lvalue: "*ret" };
                body.extend(self.write_out(ret, "_v", &out, len, StructOut::Copy));
            }
            None => body.push(format!("{};", call)),
        }

        self.code.push(String::new());
        self.code.push(format!(
            "BRIDGE_EXPORT void {}({}) {{",
            sig.prefixed(self.prefix),
            params.join(", ")
        ));
        for line in body {
            self.code.push(format!("  {}", line));
        }
        self.code.push("}".to_string());
        Ok(())
    }

    fn render_error(&self, msg: String) -> ShimError {
        ShimError::RenderError { artifact: Artifact::NativeShim, msg }
    }
}

/// Length expression for an outgoing value whose length lives in a sibling
/// native argument. Pointer arguments are out-parameters and get dereferenced.
fn length_of(ty: &Type, inputs: &[&Type], name: impl Fn(usize) -> String) -> Option<String> {
    let k = CallSignature::array_length_slot(ty).or_else(|| CallSignature::string_length_slot(ty))?;
    let sibling = inputs.get(k)?;
    if sibling.pointer > 0 && !sibling.addr && !sibling.is_repeated {
        Some(format!("(long long)*{}", name(k)))
    } else {
        Some(format!("(long long){}", name(k)))
    }
}

/// Declaration of a pointer to `ty`.
fn ptr_decl(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{}*{}", ty, name)
    } else {
        format!("{} *{}", ty, name)
    }
}

fn decl(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{}{}", ty, name)
    } else {
        format!("{} {}", ty, name)
    }
}
