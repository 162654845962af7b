mod common;

use std::any::Any;
use std::cell::Cell;
use std::io::Write;
use std::rc::Rc;

use common::{eval, eval_err, eval_fresh, vm};
use dern::{DernError, Input, Value, VmBuilder};

#[test]
fn test_factorial_with_documentation() {
    let mut vm = vm();
    assert_eq!(
        eval(
            &mut vm,
            "(define factorial as (fn (n) (if (<= n 1) 1 (* n (factorial (- n 1))))) \
             [Compute factorial] '(n [number]) howto-ok)"
        ),
        "true"
    );
    assert_eq!(eval(&mut vm, "(factorial 6)"), "720");
    assert_eq!(
        eval(&mut vm, "(doc factorial)"),
        "[Compute factorial\nArguments are:\nn -> number]"
    );
    assert_eq!(eval(&mut vm, "(howto 3 6)"), "((factorial 3))");
}

#[test]
fn test_fibonacci_with_in_place_updates() {
    let mut vm = vm();
    eval(
        &mut vm,
        "(define fib as (fn (n) \
           (define a as 0 [a]) (define b as 1 [b]) (define t as 0 [t]) \
           (for i from 1 to n (do (= t b) (+= b a) (= a t))) \
           a) [Fibonacci number] '(n [index]) howto-no)",
    );
    assert_eq!(eval(&mut vm, "(fib 1)"), "1");
    assert_eq!(eval(&mut vm, "(fib 10)"), "55");
    assert_eq!(eval(&mut vm, "(fib 10)"), "55");
}

#[test]
fn test_select_with_default() {
    let mut vm = vm();
    eval(
        &mut vm,
        "(define classify as (fn (n) (select (< n 0) [negative] (== n 0) [zero] default [positive])) [c])",
    );
    assert_eq!(eval(&mut vm, "(classify -4)"), "[negative]");
    assert_eq!(eval(&mut vm, "(classify 0)"), "[zero]");
    assert_eq!(eval(&mut vm, "(classify 9)"), "[positive]");
}

#[test]
fn test_do_stops_at_first_error() {
    let mut vm = vm();
    eval(&mut vm, "(define counter as 0 [counter])");
    let message = eval_err(&mut vm, "(do (++ counter) (NoSuchFunction) (++ counter))");
    assert!(message.starts_with("Cannot evaluate operator of type 'error' (<error>: Unbound symbol 'NoSuchFunction')"));
    assert!(message.contains("At form: >>>>>>>>>>(do (++ counter) (NoSuchFunction) (++ counter))<<<<<<<<<<"));
    assert_eq!(eval(&mut vm, "counter"), "1");
}

#[test]
fn test_error_trailers_follow_function_calls() {
    let mut vm = vm();
    eval(&mut vm, "(define inner as (fn (x) (/ x 0)) [inner])");
    eval(&mut vm, "(define outer as (fn (x) (inner (+ x 1))) [outer])");
    let message = eval_err(&mut vm, "(outer 1)");
    assert!(message.starts_with("Argument number 2 to builtin '/' cannot be zero."));
    let inner_at = message.find(">>>>>>>>>>(/ x 0)<<<<<<<<<<");
    let outer_at = message.find(">>>>>>>>>>(outer 1)<<<<<<<<<<");
    assert!(inner_at.is_some() && outer_at.is_some());
    assert!(inner_at < outer_at);
}

#[test]
fn test_division_by_zero_reports_position() {
    assert!(eval_fresh("(/ 10 2 0)").contains("Argument number 3 to builtin '/' cannot be zero."));
}

#[test]
fn test_environment_equality_ignores_insertion_order() {
    let mut vm = vm();
    eval(
        &mut vm,
        "(define a as (env-new) [a]) (define b as (env-new) [b]) \
         (define x as 1 [x] in a) (define y as [two] [y] in a) \
         (define y as [two] [y] in b) (define x as 1 [x] in b)",
    );
    assert_eq!(eval(&mut vm, "(== a b)"), "true");
    eval(&mut vm, "(define x as 3 [x] in b)");
    assert_eq!(eval(&mut vm, "(== a b)"), "false");
    assert_eq!(eval(&mut vm, "(!= a b)"), "true");
}

#[test]
fn test_hash_map_rendering_and_live_references() {
    let mut vm = vm();
    eval(&mut vm, "(define m as (hash-map [one] 1 [two] 2) [m])");
    assert_eq!(eval(&mut vm, "m"), "(hash-map [two] 2\n          [one] 1)");
    eval(&mut vm, "(++ (ln@ m [one] 'hash))");
    assert_eq!(eval(&mut vm, "(cp@ m [one] 'hash)"), "2");
    assert_eq!(eval(&mut vm, "(len m)"), "2");
}

#[test]
fn test_for_loops_with_step_and_accumulator() {
    let mut vm = vm();
    eval(&mut vm, "(define total as 0 [total])");
    assert_eq!(eval(&mut vm, "(for i from 0 to 10 step 5 (+= total i))"), "3");
    assert_eq!(eval(&mut vm, "total"), "15");
    eval(&mut vm, "(define letters as [] [letters])");
    eval(&mut vm, "(for c in [dern] (+= letters c))");
    assert_eq!(eval(&mut vm, "letters"), "[dern]");
}

#[test]
fn test_variadic_functions_and_early_return() {
    let mut vm = vm();
    eval(&mut vm, "(define count-args as (fn (first rest ...) (+ 1 (len rest))) [c])");
    assert_eq!(eval(&mut vm, "(count-args 1 2 3 4)"), "4");
    assert_eq!(eval(&mut vm, "(count-args 1)"), "1");
    eval(
        &mut vm,
        "(define first-even as (fn (v) (for x in v (if (== (mod x 2) 0) (return x))) nil) [f])",
    );
    assert_eq!(eval(&mut vm, "(first-even '(1 3 4 6))"), "4");
    assert_eq!(eval(&mut vm, "(first-even '(1 3))"), "nil");
}

#[test]
fn test_closures_keep_their_environment() {
    let mut vm = vm();
    eval(&mut vm, "(define make-counter as (fn () (define n as 0 [n]) (fn () (++ n))) [m])");
    eval(&mut vm, "(define c1 as (make-counter) [c1]) (define c2 as (make-counter) [c2])");
    eval(&mut vm, "(c1) (c1)");
    assert_eq!(eval(&mut vm, "(c1)"), "3");
    assert_eq!(eval(&mut vm, "(c2)"), "1");
}

#[test]
fn test_require_from_pre_loader_runs_once() {
    let loads = Rc::new(Cell::new(0));
    let seen = Rc::clone(&loads);
    let mut vm = VmBuilder::new()
        .with_file_system_access(false)
        .with_pre_loader(move |name| {
            (name == "greeting").then(|| {
                seen.set(seen.get() + 1);
                "(define greet as (fn (who) (string-format [hello {}] who)) [greet])".to_string()
            })
        })
        .build();
    assert_eq!(eval(&mut vm, "(require 'greeting)"), "true");
    assert_eq!(eval(&mut vm, "(require [greeting])"), "true");
    assert_eq!(loads.get(), 1);
    assert_eq!(eval(&mut vm, "(greet [world])"), "[hello world]");
    assert!(eval_err(&mut vm, "(require 'missing)")
        .starts_with("Builtin 'require' failed to find library 'missing'."));
}

#[test]
fn test_require_from_include_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("math.dern"), "(define square as (fn (x) (* x x)) [square])").unwrap();
    let mut vm = VmBuilder::new().with_include_directory(dir.path()).build();
    assert_eq!(eval(&mut vm, "(require 'math) (square 7)"), "49");
}

#[test]
fn test_read_and_eval_path_program() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "(define v as (vector 3 1 2) [v])").unwrap();
    writeln!(file, "#! sum the elements !#").unwrap();
    writeln!(file, "(define sum as 0 [sum])").unwrap();
    writeln!(file, "(for x in v (+= sum x))").unwrap();
    writeln!(file, "sum").unwrap();
    let mut vm = vm();
    let result = vm.read_from_path_and_eval_in_global_environment(file.path());
    assert_eq!(vm.to_string(result), "6");
}

#[test]
fn test_file_system_denied_by_builder() {
    let mut vm = VmBuilder::new().with_file_system_access(false).build();
    assert!(eval_err(&mut vm, "(input-file-open [/tmp/anything])").contains("file system access is not allowed"));
    let result = vm.read_from_path_and_eval_in_global_environment("/tmp/anything.dern");
    assert!(matches!(vm.get(result), Value::Error(_)));
}

#[test]
fn test_host_metadata_from_builder() {
    let mut vm = VmBuilder::new()
        .with_command_line_argument("input.txt")
        .with_command_line_argument("-v")
        .with_environment_variable("HOME=/home/dern")
        .build();
    assert_eq!(eval(&mut vm, "(host-get-command-line-arguments)"), "([input.txt] [-v])");
    assert_eq!(eval(&mut vm, "(host-get-environment-variables)"), "([HOME=/home/dern])");
}

#[test]
fn test_host_builtins_and_c_data() {
    let mut vm = vm();
    let global = vm.global_environment();
    assert!(vm.create_and_register_new_builtin(
        "make-tally",
        |vm, args, _| {
            if !args.is_empty() {
                return Err(DernError::eval("Builtin 'make-tally' expects zero arguments.").into());
            }
            let payload: Rc<dyn Any> = Rc::new(Cell::new(0i32));
            Ok(vm.create_new_value_c_data("tally", "counter", payload, false))
        },
        0,
        "Create a tally counter",
        false,
        global,
    ));
    assert!(vm.create_and_register_new_builtin(
        "tally-bump",
        |vm, args, _| {
            let count = match args.first().map(|&h| vm.get(h)) {
                Some(Value::CData(data)) => match data.payload.downcast_ref::<Cell<i32>>() {
                    Some(cell) => {
                        cell.set(cell.get() + 1);
                        cell.get()
                    }
                    None => return Err(DernError::eval("Not a tally.").into()),
                },
                _ => return Err(DernError::eval("Builtin 'tally-bump' expects a tally.").into()),
            };
            Ok(vm.new_integer(count))
        },
        1,
        "Bump a tally counter",
        false,
        global,
    ));
    eval(&mut vm, "(define t as (make-tally) [t])");
    eval(&mut vm, "(tally-bump t) (tally-bump t)");
    assert_eq!(eval(&mut vm, "(tally-bump t)"), "3");
    assert_eq!(eval(&mut vm, "t"), "<C data (tally : counter)>");
    assert!(eval_err(&mut vm, "(copy t)").starts_with("C data 'counter' cannot be copied."));
    assert_eq!(eval(&mut vm, "(doc make-tally)"), "[Create a tally counter]");
}

#[test]
fn test_incremental_parse_like_the_repl() {
    let mut vm = vm();
    let mut input = Input::new("");
    input.push_str("(define x as\n");
    assert!(vm.parse(&mut input).is_none());
    assert!(input.has_pending());
    input.push_str("41 [x]) (+ x 1)\n");
    let mut rendered = Vec::new();
    while let Some(form) = vm.parse(&mut input) {
        let result = vm.eval_in_global_environment(form);
        rendered.push(vm.to_string(result));
    }
    assert_eq!(rendered, ["true", "42"]);
    assert!(!input.has_pending());
}

#[test]
fn test_exit_code_reaches_host() {
    let mut vm = vm();
    assert_eq!(eval(&mut vm, "(exit 4) (abort [never reached])"), "nil");
    assert!(vm.is_quit());
    assert_eq!(vm.get_exit_code(), 4);
}

#[test]
fn test_program_survives_collection_after_every_allocation() {
    let mut vm = VmBuilder::new().with_gc_trigger_limit(1).build();
    eval(&mut vm, "(define words as (split [alpha beta gamma delta] [ ]) [words])");
    eval(&mut vm, "(define lengths as (hash-map) [lengths])");
    eval(&mut vm, "(for w in words (= lengths w (len w)))");
    assert_eq!(eval(&mut vm, "(cp@ lengths [gamma] 'hash)"), "5");
    assert_eq!(eval(&mut vm, "(len lengths)"), "4");
    assert_eq!(vm.stack_len(), 0);
}
