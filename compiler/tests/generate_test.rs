use std::collections::{BTreeMap, HashMap};

use pretty_assertions::assert_eq;
use shimwright_compiler::{
    compile_with, generate, resolve, run_plugin,
    types::{MessageId, Model, TypeKind},
    GeneratedFile, GeneratorConfig, ShimError,
};
use shimwright_schema::{CodeGeneratorRequest, CodeGeneratorResponse, BOOTSTRAP_FILE};

const GRAPH: &str = include_str!("../../example/schema/graph.shim");

fn sources(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries.iter().map(|(n, t)| (n.to_string(), t.to_string())).collect()
}

fn generate_one(source: &str) -> Result<Vec<GeneratedFile>, ShimError> {
    let files = compile_with("main.shim", &sources(&[("main.shim", source)]))?;
    generate(&files, &GeneratorConfig::default())
}

fn model_of(source: &str) -> Model {
    let files = compile_with("main.shim", &sources(&[("main.shim", source)])).unwrap();
    resolve(&files).unwrap()
}

/// Parameter count of every exported shim function.
fn c_exports(code: &str) -> HashMap<String, usize> {
    code.lines()
        .filter_map(|line| line.strip_prefix("BRIDGE_EXPORT void "))
        .map(|rest| {
            let (name, params) = rest.split_once('(').unwrap();
            let params = params.split_once(')').unwrap().0;
            let count = if params == "void" { 0 } else { params.split(", ").count() };
            (name.to_string(), count)
        })
        .collect()
}

/// Argument count of every boundary call the host makes, context excluded.
fn go_calls(code: &str) -> HashMap<String, usize> {
    code.lines()
        .filter_map(|line| line.split_once("mod.ExportedFunction(\"").map(|(_, rest)| rest))
        .map(|rest| {
            let (name, rest) = rest.split_once("\").Call(").unwrap();
            let args = &rest[..rest.find("); err != nil").unwrap()];
            (name.to_string(), split_top_level(args).len() - 1)
        })
        .collect()
}

fn split_top_level(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0;
    let mut current = String::new();
    for c in args.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.push(current.trim().to_string());
    out
}

#[test]
fn point_accessors_on_both_sides() {
    let files = generate_one(
        r#"package geo;
        message Point { option message = {"alias":"point_t"}; int32 x = 1; int32 y = 2; }"#,
    )
    .unwrap();
    let (c, go) = (&files[0].content, &files[1].content);

    assert!(c.contains("BRIDGE_EXPORT void wasm_bridge_Point_x(void *_recv, int32_t *ret) {"));
    assert!(c.contains("  *ret = (int32_t)recv->x;"));
    assert!(c.contains("  recv->y = (int32_t)v;"));
    assert!(go.contains("func (p *Point) X(ctx context.Context) (int32, error) {"));
    assert!(go.contains("func (p *Point) SetX(ctx context.Context, v int32) error {"));
    assert!(go.contains("func (p *Point) Y(ctx context.Context) (int32, error) {"));
}

#[test]
fn dynamic_array_length_is_read_from_its_sibling() {
    let files = generate_one(
        r#"package m;
        option file = {"exports":[{"funcs":[{"name":"fill","args":[
            {"kind":"int"}, {"kind":"int"}, {"kind":"int32","array":true,"array_num_arg":2}]}]}]};"#,
    )
    .unwrap();
    let c = &files[0].content;
    let len = c.find("  long long _len2 = (long long)_arg1;").unwrap();
    let cast = c.find("  int32_t *arg2 = (int32_t *)bridge_slice_data(_arg2, _len2);").unwrap();
    assert!(len < cast);
    assert!(files[1].content.contains("func Fill(ctx context.Context, arg0 int, arg1 int, arg2 []int32) error {"));
}

#[test]
fn only_aliased_enum_values_are_exported() {
    let files = generate_one(
        r#"package m;
        enum Color { option enum = {"alias":"color_t"};
          RED = 0 [enum_value = {"alias":"C_RED"}];
          BLUE = 1;
        }"#,
    )
    .unwrap();
    let go = &files[1].content;
    assert_eq!(go.matches("const ").count(), 1);
    assert!(go.contains("const RED Color = 0"));
    assert!(!go.contains("BLUE"));
    assert!(!files[0].content.contains("BLUE"));
}

#[test]
fn callback_receiver_fails_resolution() {
    let err = generate_one(
        r#"package m;
        message Cb { option message = {"funcptr":{"args":[{"kind":"voidptr","funcbaseptr":true}]}}; }
        option file = {"exports":[{"methods":[{"name":"run","alias":"cb_run","recv":"Cb"}]}]};"#,
    )
    .unwrap_err();
    assert!(matches!(err, ShimError::InvalidReceiver { .. }), "{:?}", err);
}

#[test]
fn malformed_callbacks_fail_resolution() {
    for args in [r#"[{"kind":"int"}]"#, r#"[{"kind":"voidptr","funcbaseptr":true},{"kind":"voidptr","funcbaseptr":true}]"#] {
        let source = format!(r#"package m; message Cb {{ option message = {{"funcptr":{{"args":{}}}}}; }}"#, args);
        let err = generate_one(&source).unwrap_err();
        assert!(matches!(err, ShimError::MalformedFuncptr { .. }), "{:?}", err);
    }
}

#[test]
fn host_and_native_agree_on_every_boundary_call() {
    let files = generate_one(GRAPH).unwrap();
    let c = c_exports(&files[0].content);
    let go = go_calls(&files[1].content);

    assert!(!c.is_empty());
    let mut c_names: Vec<&String> = c.keys().collect();
    let mut go_names: Vec<&String> = go.keys().collect();
    c_names.sort();
    go_names.sort();
    assert_eq!(c_names, go_names);
    for (name, count) in &c {
        assert_eq!(go[name], *count, "argument count of {}", name);
    }

    // receiver + declared + return slot
    assert_eq!(c["wasm_bridge_Graph_edge"], 1 + 4 + 1);
    assert_eq!(c["wasm_bridge_Graph_close"], 1 + 1);
    assert_eq!(c["wasm_bridge_agopen"], 3 + 1);
}

#[test]
fn example_schema_renders_every_kind_of_export() {
    let files = generate_one(GRAPH).unwrap();
    let (c, go) = (&files[0].content, &files[1].content);

    assert!(c.contains("#include \"cgraph.h\""));
    assert!(c.contains("_Static_assert((int)AGRAPH == 0, \"ObjectKind.GRAPH must equal AGRAPH\");"));
    assert!(c.contains("int wasm_bridge_Compare_trampoline(void *arg0, void *arg1, void *arg2) {"));
    assert!(go.contains("type CompareFunc func(ctx context.Context, arg0 any, arg1 any, arg2 any) (int, error)"));
    assert!(go.contains("func (p *Graph) Node(ctx context.Context, arg0 string, arg1 int) (*Node, error) {"));
    assert!(go.contains("func Agobjkind(ctx context.Context, arg0 any) (ObjectKind, error) {"));
    assert!(go.contains("func NewDesc(ctx context.Context) (*Desc, error) {"));
    assert!(!go.contains("func NewGraph("));
    assert!(!go.contains("INEDGE"));
}

#[test]
fn repeated_pointer_depths() {
    let model = model_of(
        r#"package m;
        message Node { option message = {"alias":"Agnode_t"}; }
        message Holder { option message = {"alias":"holder_t"};
          repeated Node nodes = 1 [field = {"type":{"kind":"struct","ref":"Node","pointer":1,"array":true}}];
          repeated string names = 2 [field = {"type":{"kind":"charptr","pointer":1,"array":true}}];
          bytes data = 3 [field = {"type":{"kind":"voidptr","pointer":1,"array":true}}];
        }"#,
    );
    let holder = model.messages.iter().find(|m| m.name == "Holder").unwrap();
    let depth: Vec<u64> = holder.fields.iter().map(|f| f.ty.native_pointer_depth()).collect();
    assert_eq!(depth, vec![2, 1, 1]);
    assert_eq!(holder.fields[1].ty.kind, TypeKind::Charptr);
}

#[test]
fn generation_is_deterministic() {
    assert_eq!(generate_one(GRAPH).unwrap(), generate_one(GRAPH).unwrap());
}

#[test]
fn bootstrap_schema_resolves_identically_and_generates_nothing() {
    let names = |model: &Model| -> Vec<String> {
        (0..model.messages.len()).map(|i| model.full_name(MessageId(i))).collect()
    };

    let files = compile_with(BOOTSTRAP_FILE, &BTreeMap::<String, String>::new()).unwrap();
    let first = resolve(&files).unwrap();
    let second = resolve(&files).unwrap();
    assert_eq!(names(&first), names(&second));
    assert!(names(&first).contains(&"MessageRule".to_string()));

    assert!(generate(&files, &GeneratorConfig::default()).unwrap().is_empty());
}

#[test]
fn colliding_short_names_resolve_by_package() {
    let src = sources(&[
        ("a.shim", r#"package a; message Dict { option message = {"alias":"a_dict_t"}; }"#),
        ("b.shim", r#"package b; message Dict { option message = {"alias":"b_dict_t"}; }"#),
        (
            "main.shim",
            r#"package b; import "a.shim"; import "b.shim";
            message Holder { option message = {"alias":"holder_t"}; a.Dict left = 1; Dict right = 2; }"#,
        ),
    ]);
    let files = compile_with("main.shim", &src).unwrap();
    let model = resolve(&files).unwrap();
    let holder = model.messages.iter().find(|m| m.name == "Holder").unwrap();
    let package_of = |i: usize| model.message(holder.fields[i].ty.message().unwrap()).package.clone();
    assert_eq!(package_of(0), "a");
    assert_eq!(package_of(1), "b");

    // Both Dict types would become Go type `Dict` in one package.
    let err = generate(&files, &GeneratorConfig::default()).unwrap_err();
    match err {
        ShimError::RenderError { msg, .. } => {
            assert_eq!(msg, "Go type Dict is declared by both a.Dict and b.Dict")
        }
        err => panic!("unexpected error {:?}", err),
    }
}

#[test]
fn imported_types_are_defined_in_the_target_bindings() {
    let src = sources(&[
        (
            "lib.shim",
            r#"package lib;
            enum Mode { option enum = {"alias":"mode_t"}; FAST = 0 [enum_value = {"alias":"MODE_FAST"}]; }
            message Dict { option message = {"alias":"Dict_t"}; }
            message Cb { option message = {"funcptr":{"args":[
                {"kind":"voidptr","funcbaseptr":true}, {"kind":"struct","ref":"Dict","pointer":1}],
                "return":{"kind":"int"}}}; }"#,
        ),
        (
            "main.shim",
            r#"package main; import "lib.shim";
            message Holder { option message = {"alias":"holder_t"};
              lib.Mode mode = 1;
              lib.Cb cb = 2;
            }
            option file = {"exports":[{"funcs":[{"name":"lookup",
                "args":[{"kind":"struct","ref":"lib.Dict","pointer":1}],"return":{"kind":"int"}}]}]};"#,
        ),
    ]);
    let files = compile_with("main.shim", &src).unwrap();
    let out = generate(&files, &GeneratorConfig::default()).unwrap();
    let (c, go) = (&out[0].content, &out[1].content);

    assert!(c.contains("int wasm_bridge_Cb_trampoline(void *arg0, Dict_t *arg1) {"));
    assert!(!c.contains("int wasm_bridge_Cb_trampoline(void *arg0, Dict_t *arg1);"));
    assert!(!c.contains("wasm_bridge_Dict_new"));

    assert!(go.contains("type Mode int32"));
    assert!(go.contains("const FAST Mode = 0"));
    assert!(go.contains("type CbFunc func(ctx context.Context, arg0 any, arg1 *Dict) (int, error)"));
    assert!(go.contains("func (f CbFunc) invoke(ctx context.Context, slots []uint32) (uint64, error) {"));
    assert!(go.contains("type Dict struct {"));
    assert!(go.contains("func newDict(ptr uint32) *Dict {"));
    assert!(go.contains("func (p *Dict) addr() uint32 {"));
    assert!(go.contains("func Lookup(ctx context.Context, arg0 *Dict) (int, error) {"));
    assert!(!go.contains("func NewDict("));
    assert_eq!(go.matches("type Dict struct {").count(), 1);
}

#[test]
fn plugin_round_trip_through_json() {
    let files = compile_with("main.shim", &sources(&[("main.shim", GRAPH)])).unwrap();
    let request = CodeGeneratorRequest {
        file_to_generate: vec!["main.shim".to_string()],
        parameter:        Some("package=graph,native_file=graph.c,host_file=graph.go".to_string()),
        schema_file:      files,
    };
    let json = serde_json::to_string(&request).unwrap();
    let request: CodeGeneratorRequest = serde_json::from_str(&json).unwrap();

    let response = run_plugin(request, &GeneratorConfig::default());
    let json = serde_json::to_string(&response).unwrap();
    let response: CodeGeneratorResponse = serde_json::from_str(&json).unwrap();

    assert_eq!(response.error, None);
    let names: Vec<&str> = response.file.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["graph.c", "graph.go"]);
    assert!(response.file[1].content.contains("\npackage graph\n"));
}

#[test]
fn render_failure_discards_both_artifacts() {
    let err = generate_one(
        r#"package m; message Hidden {}
        message Shown { option message = {"alias":"shown_t"}; Hidden h = 1; }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ShimError::RenderError { .. }), "{:?}", err);
}
