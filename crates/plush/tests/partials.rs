//! Tests for partial resolution: feeder wiring, data merging, file-key
//! bookkeeping, layouts, and script escaping.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use plush::{
    Context, Engine, HelperRegistry, PartialFeeder, RenderError, Value, data, js_escape_string,
    render_partial,
};

fn feeder_of(source: &'static str) -> PartialFeeder {
    Arc::new(move |_| Ok(source.to_string()))
}

fn engine_with(feeder: PartialFeeder) -> Engine {
    Engine::builder().feeder(feeder).build()
}

// === Wiring ===

#[test]
fn missing_feeder_is_a_configuration_error() {
    let engine = Engine::new();
    let ctx = Context::new();

    let err = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap_err();
    assert!(matches!(err, RenderError::MissingFeeder));
    assert!(err.to_string().contains("could not find partial feeder"));
}

#[test]
fn feeder_errors_propagate() {
    let feeder: PartialFeeder = Arc::new(|_| Err("me-rong".into()));
    let engine = engine_with(feeder);
    let ctx = Context::new();

    let err = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap_err();
    assert!(err.to_string().contains("me-rong"));
}

#[test]
fn parse_errors_in_partial_source_propagate() {
    let engine = engine_with(feeder_of(r#"<div class="test">Hello <%= name </div>"#));
    let ctx = Context::new();

    let result = render_partial(&engine, "index", &HashMap::new(), &ctx);
    assert!(result.is_err());
}

// === Rendering ===

#[test]
fn renders_fetched_source() {
    let engine = engine_with(feeder_of(r#"<div class="test">Plush!</div>"#));
    let ctx = Context::new();

    let html = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"<div class="test">Plush!</div>"#);
}

#[test]
fn data_merges_into_the_partial_context() {
    let engine = engine_with(feeder_of(r#"<div class="test">Hello <%= name %></div>"#));
    let ctx = Context::new();

    let html = render_partial(&engine, "index", &data! { "name" => "Yonghwan" }, &ctx).unwrap();
    assert_eq!(html, r#"<div class="test">Hello Yonghwan</div>"#);
}

#[test]
fn partial_declarations_do_not_leak_to_the_caller() {
    let engine = engine_with(feeder_of(
        "<% let number = number - 1\n%><div class=\"test\">Hello <%= number %></div>",
    ));
    let ctx = Context::new();
    ctx.set("number", 3);

    let html = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"<div class="test">Hello 2</div>"#);
    assert_eq!(ctx.get("number"), Some(Value::from(3)));
}

#[test]
fn self_recursive_partial_with_inline_output() {
    let engine = engine_with(feeder_of(
        r#"<%=
        if (number > 0) { %><%
            let number = number - 1 %><%=
            partial("index") %><%= number %>, <%
        } %>"#,
    ));
    let ctx = Context::new();
    ctx.set("number", 3);

    let html = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, "0, 1, 2, ");
    assert_eq!(ctx.get("number"), Some(Value::from(3)));
}

#[test]
fn in_template_partial_call() {
    let feeder: PartialFeeder = Arc::new(|name| match name {
        "header" => Ok("<h1><%= title %></h1>".to_string()),
        other => Err(format!("unknown partial: {other}").into()),
    });
    let engine = engine_with(feeder);
    let ctx = Context::new();
    ctx.set("title", "Welcome");

    let out = engine
        .render(r#"<main><%= partial("header") %></main>"#, &ctx)
        .unwrap();
    assert_eq!(out, "<main><h1>Welcome</h1></main>");
}

// === Layouts ===

#[test]
fn layout_wraps_the_rendered_fragment_as_yield() {
    let feeder: PartialFeeder = Arc::new(|name| {
        if name == "container" {
            Ok("<html><%= yield %></html>".to_string())
        } else {
            Ok(r#"<div class="test">Hello <%= name %></div>"#.to_string())
        }
    });
    let engine = engine_with(feeder);
    let ctx = Context::new();

    let html = render_partial(
        &engine,
        "index",
        &data! { "name" => "Yonghwan", "layout" => "container" },
        &ctx,
    )
    .unwrap();
    assert_eq!(html, r#"<html><div class="test">Hello Yonghwan</div></html>"#);
}

// === Script escaping ===

#[test]
fn script_partial_with_script_extension_is_not_escaped() {
    let engine = engine_with(feeder_of(r#"alert('\'Hello\'');"#));
    let ctx = Context::new();
    ctx.set("contentType", "application/javascript");

    let html = render_partial(&engine, "index.js", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"alert('\'Hello\'');"#);
}

#[test]
fn script_partial_without_extension_is_not_escaped() {
    let engine = engine_with(feeder_of(r#"alert('\'Hello\'');"#));
    let ctx = Context::new();
    ctx.set("contentType", "application/javascript");

    let html = render_partial(&engine, "index", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"alert('\'Hello\'');"#);
}

#[test]
fn markup_partial_under_script_content_type_is_escaped() {
    let engine = engine_with(feeder_of(r#"alert('\'Hello\'');"#));
    let ctx = Context::new();
    ctx.set("contentType", "application/javascript");

    let html = render_partial(&engine, "index.html", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"alert(\'\\\'Hello\\\'\');"#);
}

#[test]
fn escaping_composes_across_markup_boundaries() {
    let feeder: PartialFeeder = Arc::new(|name| {
        Ok(match name {
            "js_having_html_partial.js" => r#"alert('<%= partial("t1.html") %>');"#,
            "js_having_js_partial.js" => r#"alert('<%= partial("t1.js") %>');"#,
            "t1.html" => r#"<div><%= partial("p1.html") %></div>"#,
            "t1.js" => r#"<div><%= partial("p1.js") %></div>"#,
            "p1.html" | "p1.js" => "<span>FORM</span>",
            _ => "error",
        }
        .to_string())
    });

    // Without a content type, no escaping is applied anywhere.
    let engine = engine_with(feeder.clone());
    let ctx = Context::new();
    let html =
        render_partial(&engine, "js_having_html_partial.js", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"alert('<div><span>FORM</span></div>');"#);

    // Script-typed render including only script partials: still clean.
    let ctx = Context::new();
    ctx.set("contentType", "application/javascript");
    let html = render_partial(&engine, "js_having_js_partial.js", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, r#"alert('<div><span>FORM</span></div>');"#);

    // Markup partials crossed under a script content type escape once per
    // boundary, so the inner fragment is escaped twice.
    let ctx = Context::new();
    ctx.set("contentType", "application/javascript");
    let html =
        render_partial(&engine, "js_having_html_partial.js", &HashMap::new(), &ctx).unwrap();
    let once = concat!("\\", "u003C");
    let twice = concat!("\\\\", "u003C");
    let expected = format!(
        "alert('{once}div{gt1}{twice}span{gt2}FORM{twice}/span{gt2}{once}/div{gt1}');",
        gt1 = concat!("\\", "u003E"),
        gt2 = concat!("\\\\", "u003E"),
    );
    assert_eq!(html, expected);
}

#[test]
fn js_escape_string_maps_specials() {
    assert_eq!(js_escape_string("a'b"), r"a\'b");
    assert_eq!(js_escape_string(r#"a"b"#), r#"a\"b"#);
    assert_eq!(js_escape_string(r"a\b"), r"a\\b");
    assert_eq!(js_escape_string("<x>"), concat!("\\", "u003Cx", "\\", "u003E"));
    assert_eq!(
        js_escape_string("a&b=c"),
        concat!("a", "\\", "u0026b", "\\", "u003Dc")
    );
    assert_eq!(js_escape_string("a\nb"), concat!("a", "\\", "u000Ab"));
    assert_eq!(js_escape_string("plain text"), "plain text");
}

// === Default helpers and overrides ===

#[test]
fn string_helpers_apply() {
    let engine = Engine::new();
    let ctx = Context::new();
    ctx.set("name", "mark");

    let out = engine
        .render(
            r#"<%= capitalize(name) %> <%= upcase(name) %> <%= downcase("HI") %> <%= len(name) %>"#,
            &ctx,
        )
        .unwrap();
    assert_eq!(out, "Mark MARK hi 4");
}

#[test]
fn user_helpers_override_defaults_by_key() {
    let mut helpers = HelperRegistry::core();
    helpers.function("truncate", |args| Ok(args.values[0].clone()));
    let engine = Engine::builder()
        .feeder(feeder_of(
            r#"<%= truncate("xxxxxxxxxxxaaaaaaaaaa", {size: 10}) %>"#,
        ))
        .helpers(helpers)
        .build();

    let html = render_partial(&engine, "index", &HashMap::new(), &Context::new()).unwrap();
    assert_eq!(html, "xxxxxxxxxxxaaaaaaaaaa");
}

#[test]
fn constant_helpers_resolve_like_variables() {
    let mut helpers = HelperRegistry::core();
    helpers.constant("version", "1.2.3");
    let engine = Engine::builder()
        .feeder(feeder_of("v<%= version %>"))
        .helpers(helpers)
        .build();

    let html = render_partial(&engine, "index", &HashMap::new(), &Context::new()).unwrap();
    assert_eq!(html, "v1.2.3");
}

#[test]
fn default_helpers_apply_without_an_override() {
    let engine = engine_with(feeder_of(
        r#"<%= truncate("xxxxxxxxxxxaaaaaaaaaa", {size: 10}) %>"#,
    ));

    let html = render_partial(&engine, "index", &HashMap::new(), &Context::new()).unwrap();
    assert_eq!(html, "xxxxxxx...");
}

// === Feeder from disk ===

#[test]
fn feeder_can_read_from_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeting.plush");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "hello <%= name %>").unwrap();

    let root = dir.path().to_path_buf();
    let feeder: PartialFeeder = Arc::new(move |name| {
        let source = std::fs::read_to_string(root.join(name))?;
        Ok(source)
    });
    let engine = engine_with(feeder);
    let ctx = Context::new();

    let html = render_partial(
        &engine,
        "greeting.plush",
        &data! { "name" => "mark" },
        &ctx,
    )
    .unwrap();
    assert_eq!(html, "hello mark");
}
