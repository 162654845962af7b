// Property tests for the reader and for re-reading rendered values.

mod common;

use common::{eval, vm};
use dern::{Input, Value};
use proptest::prelude::*;

fn string_literal(s: &str) -> String {
    format!("[{s}]")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reader_never_panics(text in "\\PC{0,64}") {
        let mut vm = vm();
        let mut input = Input::new(&text);
        while let Some(form) = vm.parse(&mut input) {
            if matches!(vm.get(form), Value::Error(_)) {
                break;
            }
        }
    }

    #[test]
    fn reader_never_panics_on_lisp_like_text(text in "[()\\[\\]|' a-z0-9.#!-]{0,48}") {
        let mut vm = vm();
        let mut input = Input::new(&text);
        while let Some(form) = vm.parse(&mut input) {
            if matches!(vm.get(form), Value::Error(_)) {
                break;
            }
        }
    }

    #[test]
    fn rendered_vector_rereads_equal(items in prop::collection::vec(any::<i32>(), 0..8)) {
        let mut vm = vm();
        let elements: Vec<String> = items.iter().map(i32::to_string).collect();
        let built = format!("(vector {})", elements.join(" "));
        let rendered = eval(&mut vm, &built);
        prop_assert_eq!(eval(&mut vm, &format!("(== {built} '{rendered})")), "true");
    }

    #[test]
    fn rendered_list_rereads_equal(items in prop::collection::vec("[a-z0-9 |\\]]{0,6}", 0..6)) {
        let mut vm = vm();
        let elements: Vec<String> = items
            .iter()
            .map(|s| string_literal(&s.replace('|', "|bar|").replace(']', "|string-end|")))
            .collect();
        let built = format!("(list {})", elements.join(" "));
        let rendered = eval(&mut vm, &built);
        prop_assert!(rendered.starts_with("(list"));
        prop_assert_eq!(eval(&mut vm, &format!("(== {built} {rendered})")), "true");
    }

    #[test]
    fn rendered_hash_map_rereads_equal(
        pairs in prop::collection::vec((-50i32..50, "[a-z]{0,5}"), 0..8)
    ) {
        let mut vm = vm();
        let elements: Vec<String> = pairs
            .iter()
            .map(|(k, v)| format!("{k} {}", string_literal(v)))
            .collect();
        let built = format!("(hash-map {})", elements.join(" "));
        let rendered = eval(&mut vm, &built);
        prop_assert_eq!(eval(&mut vm, &format!("(== {built} {rendered})")), "true");
    }

    #[test]
    fn integer_literals_render_as_written(n in any::<i32>()) {
        prop_assert_eq!(eval(&mut vm(), &n.to_string()), n.to_string());
    }
}
