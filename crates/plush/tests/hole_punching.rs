//! Tests for hole punching: marker production, concurrent fill, splicing,
//! and recursion through partials.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use plush::{Context, Engine, MemoryCache, MetaKey, PartialFeeder, Value, compiler, render_partial};

const FILE: &str = "myfile.plush";

fn cached_engine() -> (Engine, Arc<MemoryCache>) {
    let store = Arc::new(MemoryCache::new());
    let engine = Engine::builder().cache(store.clone()).build();
    (engine, store)
}

fn template_ctx() -> Context {
    let ctx = Context::new();
    ctx.set_meta(MetaKey::TemplateFile, FILE);
    ctx.set("myArray", vec!["a", "b"]);
    ctx
}

// === Marker production ===

#[test]
fn intermediate_output_carries_markers() {
    let engine = Engine::new();
    let ctx = template_ctx();

    let input = r#"<% let a = myArray %><% a = a + "1" %><%=a %><%H "testing" %><%= a %><%H "sssss" %>"#;
    let program = compiler::parse(input).unwrap();
    let (skeleton, holes) = engine.execute(&program, &ctx).unwrap();

    assert_eq!(holes.len(), 2);
    assert!(skeleton.contains("<PLUSH_HOLE_0>"));
    assert!(skeleton.contains("<PLUSH_HOLE_1>"));
    assert!(skeleton.contains("ab1<PLUSH_HOLE_0>ab1<PLUSH_HOLE_1>"));
    assert_eq!(holes[0].input, r#"<%= "testing" %>"#);
    assert!(holes.iter().all(|h| h.content.is_empty() && h.err.is_none()));
}

#[test]
fn markers_record_exact_byte_positions() {
    let engine = Engine::new();
    let ctx = template_ctx();

    let program = compiler::parse(r#"ab<%H "x" %>cd"#).unwrap();
    let (skeleton, holes) = engine.execute(&program, &ctx).unwrap();

    assert_eq!(skeleton, "ab<PLUSH_HOLE_0>cd");
    assert_eq!(holes[0].start, 2);
    assert_eq!(holes[0].end, 2 + "<PLUSH_HOLE_0>".len());
}

// === Rendering with holes ===

#[test]
fn holes_fill_on_first_pass() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let input = r#"<% let a = myArray %><% a = a + "1" %><%=a %><%H "testing" %><%= a %><%H "sssss" %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "ab1testingab1sssss");
}

#[test]
fn multiple_holes_at_end() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let input = r#"<% let a = myArray %><% a = a + "1" %><%=a %><%H "testing" %><%= a %><%H "sssss" %><%H "dddd" %><%H "eeee" %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "ab1testingab1sssssddddeeee");
}

#[test]
fn holes_at_start() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let input = r#"<%H "testing" %><% let a = myArray %><% a = a + "1" %><%=a %><%H "testing" %><%= a %><%H "sssss" %><%H "dddd" %><%H "eeee" %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "testingab1testingab1sssssddddeeee");
}

#[test]
fn hole_at_start_and_end() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let out = engine.render(r#"<%H "start" %><%H "end" %>"#, &ctx).unwrap();
    assert_eq!(out, "startend");
}

#[test]
fn empty_hole_content() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let out = engine.render(r#"<%H "" %>foo<%H  %>"#, &ctx).unwrap();
    assert_eq!(out, "foo");
}

#[test]
fn many_holes() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let mut input = String::new();
    let mut expected = String::new();
    for _ in 0..100 {
        input.push_str(r#"<%H "x" %>"#);
        expected.push('x');
    }
    let out = engine.render(&input, &ctx).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn literal_marker_text_survives() {
    // Splicing is position-based, so text that happens to look like a
    // placeholder is left alone.
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let out = engine
        .render(r#"<PLUSH_HOLE_0><%H "start" %><%H "end" %>"#, &ctx)
        .unwrap();
    assert_eq!(out, "<PLUSH_HOLE_0>startend");
}

// === Holes and control flow ===

#[test]
fn hole_inside_if_branch() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();
    ctx.set("a", "22");

    let input = r#"<%= if (a == "22") { %><%H "testing" %><% } else { %><%H "dddd" %><% } %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "testing");
}

#[test]
fn hole_inside_for_loop() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();
    ctx.set("myArray", vec!["a", "b", "c"]);

    let input = r#"<%= for (i,v) in myArray { %><%H "testing" %><%= v %><% } %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "testingatestingbtestingc");
}

#[test]
fn for_loop_as_hole() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();
    ctx.set("myArray", vec!["a", "b", "c"]);

    let input = r#"<%H for (i,v) in myArray { %><%= v %><% } %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "abc");
}

#[test]
fn if_else_as_hole_takes_else_branch() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();
    ctx.set("number", 3);

    let input = r#"<%H if (number == 0){ %><%= "NUMBER" %><% } else { %><%= number %><%  }%>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "3");
}

#[test]
fn if_else_as_hole_takes_then_branch() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();
    ctx.set("number", 3);

    let input = r#"<%H if (number > 0){ %><%= "NUMBER" %><% } else { %><%= number %><%  }%>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "NUMBER");
}

// === Failure containment ===

#[test]
fn failing_hole_renders_inline_error() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let input = r#"<% let a = myArray %><% a = a + "1" %><%=a %><%H missing_thing %><%= a %><%H "sssss" %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert!(out.contains(r#"line 1: "missing_thing": unknown identifier in myfile.plush"#));
    assert!(out.ends_with("sssss"));
}

#[test]
fn failing_hole_does_not_fail_siblings() {
    let (engine, _store) = cached_engine();
    let ctx = template_ctx();

    let out = engine
        .render(r#"<%H "before" %><%H nope %><%H "after" %>"#, &ctx)
        .unwrap();
    assert!(out.starts_with("before"));
    assert!(out.ends_with("after"));
    assert!(out.contains("unknown identifier"));
}

// === Ordering under concurrency ===

#[test]
fn fill_order_matches_source_order_despite_completion_order() {
    let (mut engine, _store) = cached_engine();
    engine.helpers_mut().function("slow", |args| {
        let delay = args.values[0].as_number().unwrap_or(0) as u64;
        std::thread::sleep(Duration::from_millis(delay));
        Ok(args.values[1].clone())
    });
    let ctx = template_ctx();

    // Earlier holes sleep longer, so completion order is reversed.
    let input = r#"<%H slow(80, "one") %><%H slow(40, "two") %><%H slow(10, "three") %><%H slow(0, "four") %>"#;
    let out = engine.render(input, &ctx).unwrap();
    assert_eq!(out, "onetwothreefour");
}

// === Recursive partials with holes ===

#[test]
fn recursive_partial_with_counting_hole() {
    let store = Arc::new(MemoryCache::new());
    let feeder: PartialFeeder = Arc::new(|_| {
        Ok(r#"<%=
        if (number > 0) { %><%
            let number = number - 1 %><%=
            partial("index.plush") %><%H number %>, <%
        } %>"#
            .to_string())
    });
    let engine = Engine::builder().cache(store).feeder(feeder).build();

    let ctx = Context::new();
    ctx.set("number", 3);

    let html = render_partial(&engine, "index.plush", &HashMap::new(), &ctx).unwrap();
    assert_eq!(html, "1, 2, 3, ");
    // The caller's binding is untouched by the recursion's shadowing.
    assert_eq!(ctx.get("number"), Some(Value::from(3)));
}
