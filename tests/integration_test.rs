// ABOUTME: End-to-end tests feeding whole programs through run() and asserting on sink output

use lang_l::error::LError;
use lang_l::interpreter::run;
use lang_l::io::{BufferOutputSink, QueueInputSink};

fn run_ok(src: &str) -> String {
    let mut out = BufferOutputSink::new();
    let mut input = QueueInputSink::new(Vec::<String>::new());
    run(src, &mut out, &mut input).unwrap_or_else(|e| panic!("run failed for {:?}: {}", src, e));
    out.into_contents()
}

fn run_err(src: &str) -> LError {
    let mut out = BufferOutputSink::new();
    let mut input = QueueInputSink::new(Vec::<String>::new());
    run(src, &mut out, &mut input).unwrap_err()
}

#[test]
fn literal_scenarios_from_the_spec_table() {
    assert_eq!(run_ok("x: int = 5; say(x + 1);"), "6\n");
    assert_eq!(run_ok("fn sq(n:int) -> int { return n * n; } say(sq(7));"), "49\n");
    assert_eq!(run_ok("xs: list = [3,1,2]; xs.order(); say(xs);"), "[1, 2, 3]\n");
    assert_eq!(run_ok("h: hash = {\"a\":1}; h.ensure(\"b\", 9); say(h[\"b\"]);"), "9\n");
    assert_eq!(run_ok("x: int = 0; watch x; x = 7;"), "WATCH: x changed to 7 (in global)\n");
    assert_eq!(
        run_ok("x: int = 1; fn f() -> void { use mut x; x = 9; } f(); say(x);"),
        "9\n"
    );
    let err = run_err("x: int = 1; fn f() -> void { use x; x = 9; } f();");
    assert!(matches!(err, LError::Name(msg) if msg.contains("immutable import")));
}

#[test]
fn inline_function_definition() {
    assert_eq!(run_ok("fn double(n:int) -> int => n * 2; say(double(21));"), "42\n");
}

#[test]
fn watch_tracks_method_induced_mutation() {
    assert_eq!(
        run_ok("xs: list = [1]; watch xs; xs.push(2);"),
        "WATCH: xs modified by push() to [1, 2] (in global)\n"
    );
}

#[test]
fn hash_take_returns_key_value_pair_and_removes_entry() {
    assert_eq!(
        run_ok("h: hash = {\"a\": 1, \"b\": 2}; pair: list = h.take(\"a\"); say(pair); say(h.length());"),
        "[\"a\", 1]\n1\n"
    );
}

#[test]
fn string_escape_sequences_are_processed_at_value_construction_time() {
    assert_eq!(run_ok("say(\"a\\tb\\nc\");"), "a\tb\nc\n");
}

#[test]
fn nested_functions_resolve_through_scope_chain_not_call_site() {
    assert_eq!(
        run_ok(
            "x: int = 1; \
             fn outer() -> int { \
                 use mut x; \
                 x = 10; \
                 return inner(); \
             } \
             fn inner() -> int { \
                 return 5; \
             } \
             say(outer()); \
             say(x);"
        ),
        "5\n10\n"
    );
}

#[test]
fn recursive_function_calls_resolve_via_scope_lookup() {
    assert_eq!(
        run_ok(
            "fn fact(n:int) -> int { \
                 if n <= 1 { return 1; } \
                 return n * fact(n - 1); \
             } \
             say(fact(5));"
        ),
        "120\n"
    );
}

#[test]
fn list_and_hash_aliasing_is_observable_through_every_handle() {
    assert_eq!(
        run_ok("xs: list = [1]; ys: list = xs; ys.push(2); say(xs);"),
        "[1, 2]\n"
    );
}

#[test]
fn clone_breaks_aliasing() {
    assert_eq!(
        run_ok("xs: list = [1]; ys: list = xs.clone(); ys.push(2); say(xs); say(ys);"),
        "[1]\n[1, 2]\n"
    );
}

#[test]
fn void_function_falling_through_without_return_is_fine() {
    assert_eq!(run_ok("fn noop() -> void { } noop(); say(1);"), "1\n");
}

#[test]
fn void_return_type_rejects_a_returned_value() {
    let err = run_err("fn f() -> void { return 1; } f();");
    assert!(matches!(err, LError::Type(_)));
}

#[test]
fn method_on_watched_import_labels_enclosing_function() {
    assert_eq!(
        run_ok(
            "xs: list = [1]; \
             fn f() -> void { use mut xs; watch xs; xs.push(9); } \
             f();"
        ),
        "WATCH: xs modified by push() to [1, 9] (in f)\n"
    );
}

#[test]
fn division_by_zero_is_a_value_error() {
    assert!(matches!(run_err("say(1 / 0);"), LError::Value(_)));
}

#[test]
fn for_loop_step_of_zero_is_rejected() {
    assert!(matches!(run_err("for i in 0 .. 5 by 0 { }"), LError::Value(_)));
}

#[test]
fn lexer_and_parser_errors_surface_through_run() {
    assert!(matches!(run_err("\"unterminated"), LError::Lex { .. }));
    assert!(matches!(run_err("x = ;"), LError::Parse { .. }));
}
