//! End-to-end scenarios driving the full compile/render pipeline through
//! the public API, one test per scenario.

use indexmap::IndexMap;
use uweb_templates::compiler::compile;
use uweb_templates::functions::Registry;
use uweb_templates::render::render;
use uweb_templates::value::Value;

fn replacements(pairs: Vec<(&str, Value)>) -> Value {
    let mut map = IndexMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), v);
    }
    Value::Object(map)
}

fn render_source(source: &str, replacements: &Value) -> String {
    let template = compile(source, None).expect("compiles");
    let registry = Registry::with_builtins();
    render(&template.nodes, replacements, &registry)
        .expect("renders")
        .into_string()
}

#[test]
fn simple_interpolation() {
    let r = replacements(vec![("name", Value::Str("world".to_string()))]);
    assert_eq!(render_source("Hello [name]!", &r), "Hello world!");
}

#[test]
fn index_chain() {
    let mut user = IndexMap::new();
    user.insert("name".to_string(), Value::Str("Ada".to_string()));
    let r = replacements(vec![("user", Value::Array(vec![Value::Object(user)]))]);
    assert_eq!(render_source("[user:0:name]", &r), "Ada");
}

#[test]
fn function_pipeline_with_closure() {
    let r = replacements(vec![(
        "xs",
        Value::Array(vec![Value::Int(3), Value::Int(1), Value::Int(2)]),
    )]);
    assert_eq!(render_source("[xs|sorted|len]", &r), "3");
}

#[test]
fn conditional_short_circuit_never_touches_erroring_branch() {
    // `b` is deliberately absent; were `and` eager (or were the renderer to
    // treat the tag failure as fatal) this would still have to produce
    // "no" without raising, but the point of this scenario is that the
    // right-hand side is never even resolved once the left is falsy.
    let r = replacements(vec![("a", Value::Bool(false))]);
    let out = render_source("{{ if [a] and [b:0] }}yes{{ else }}no{{ endif }}", &r);
    assert_eq!(out, "no");
}

#[test]
fn loop_with_unpack_over_insertion_ordered_mapping() {
    let mut m = IndexMap::new();
    m.insert("a".to_string(), Value::Int(1));
    m.insert("b".to_string(), Value::Int(2));
    let r = replacements(vec![("m", Value::Object(m))]);
    let out = render_source("{{ for k, v in [m|items] }}[k]=[v];{{ endfor }}", &r);
    assert_eq!(out, "a=1;b=2;");
}

#[test]
fn unresolved_tag_echoes_literally() {
    let r = replacements(vec![]);
    assert_eq!(render_source("X=[missing]", &r), "X=[missing]");
}

#[test]
fn html_escaping_default_and_raw_override() {
    let r = replacements(vec![("s", Value::Str("<b>".to_string()))]);
    assert_eq!(render_source("[s]", &r), "&lt;b&gt;");
    assert_eq!(render_source("[s|raw]", &r), "<b>");
}

#[test]
fn presence_conditional() {
    let source = "{{ ifpresent [x] }}have{{ else }}none{{ endif }}";
    let present = replacements(vec![("x", Value::Int(0))]);
    let absent = replacements(vec![]);
    assert_eq!(render_source(source, &present), "have");
    assert_eq!(render_source(source, &absent), "none");
}

#[test]
fn directiveless_source_round_trips_verbatim() {
    let r = replacements(vec![]);
    let source = "plain text with no tags or directives at all.";
    assert_eq!(render_source(source, &r), source);
}

#[test]
fn unbalanced_template_fails_to_compile() {
    let err = compile("{{ if [a] }}unterminated", None).unwrap_err();
    assert!(matches!(err, uweb_templates::Error::Syntax(_)));
}

#[test]
fn function_pipeline_is_left_associative() {
    let r1 = replacements(vec![(
        "xs",
        Value::Array(vec![Value::Int(2), Value::Int(1)]),
    )]);
    let r2 = replacements(vec![(
        "ys",
        Value::Array(vec![Value::Int(1), Value::Int(2)]),
    )]);
    assert_eq!(render_source("[xs|sorted|len]", &r1), render_source("[ys|len]", &r2));
}
