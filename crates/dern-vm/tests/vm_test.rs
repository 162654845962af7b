use dern_core::{intern, DernError, Value};
use dern_vm::{Config, Input, Unwind, Vm};

fn int_args(vm: &Vm, name: &str, args: &[dern_core::Handle]) -> Result<Vec<i32>, Unwind> {
    args.iter()
        .map(|&a| match vm.get(a) {
            Value::Integer(n) => Ok(*n),
            other => Err(DernError::eval(format!(
                "Builtin '{name}' expects integers. Now it has type {}.",
                other.type_name()
            ))
            .into()),
        })
        .collect()
}

/// A VM with just enough integer builtins to exercise the evaluator.
fn test_vm_with(config: Config) -> Vm {
    let mut vm = Vm::with_config(config);
    let global = vm.global_environment();
    vm.create_and_register_new_builtin(
        "+",
        |vm, args, _| {
            let sum = int_args(vm, "+", args)?.into_iter().fold(0i32, i32::wrapping_add);
            Ok(vm.new_integer(sum))
        },
        0,
        "add integers",
        true,
        global,
    );
    vm.create_and_register_new_builtin(
        "-",
        |vm, args, _| {
            let ns = int_args(vm, "-", args)?;
            let first = ns.first().copied().unwrap_or(0);
            let rest = ns.iter().skip(1).fold(first, |acc, n| acc.wrapping_sub(*n));
            Ok(vm.new_integer(rest))
        },
        1,
        "subtract integers",
        false,
        global,
    );
    vm.create_and_register_new_builtin(
        "*",
        |vm, args, _| {
            let product = int_args(vm, "*", args)?.into_iter().fold(1i32, i32::wrapping_mul);
            Ok(vm.new_integer(product))
        },
        0,
        "multiply integers",
        false,
        global,
    );
    vm.create_and_register_new_builtin(
        "return",
        |_, args, _| Err(Unwind::Return(args[0])),
        1,
        "return early",
        false,
        global,
    );
    vm.create_and_register_new_builtin(
        "exit",
        |vm, args, _| {
            let code = int_args(vm, "exit", args)?.first().copied().unwrap_or(0);
            vm.request_exit(code);
            Ok(vm.nil())
        },
        0,
        "quit",
        false,
        global,
    );
    vm
}

fn test_vm() -> Vm {
    test_vm_with(Config::default())
}

fn eval(vm: &mut Vm, src: &str) -> String {
    let h = vm.read_from_str_and_eval_in_global_environment(src);
    vm.to_string(h)
}

fn eval_err(vm: &mut Vm, src: &str) -> String {
    let h = vm.read_from_str_and_eval_in_global_environment(src);
    match vm.get(h) {
        Value::Error(msg) => msg.clone(),
        other => panic!("expected error from {src}, got {}", other.type_name()),
    }
}

#[test]
fn test_atoms_evaluate_to_themselves() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "1"), "1");
    assert_eq!(eval(&mut vm, "3.5"), "3.5");
    assert_eq!(eval(&mut vm, "[hi]"), "[hi]");
    assert_eq!(eval(&mut vm, "|a|"), "|a|");
    assert_eq!(eval(&mut vm, "nil"), "nil");
    assert_eq!(eval(&mut vm, "true"), "true");
}

#[test]
fn test_unbound_symbols_and_bad_operators() {
    let mut vm = test_vm();
    assert_eq!(eval_err(&mut vm, "x"), "Unbound symbol 'x'");
    assert_eq!(
        eval_err(&mut vm, "(nosuch 1)"),
        "Cannot evaluate operator of type 'error' (<error>: Unbound symbol 'nosuch')"
    );
    assert_eq!(
        eval_err(&mut vm, "(1 2)"),
        "Cannot evaluate operator of type 'integer' (1)"
    );
    assert_eq!(eval_err(&mut vm, "()"), "Cannot evaluate empty vector '()'");
}

#[test]
fn test_factorial() {
    let mut vm = test_vm();
    assert_eq!(
        eval(
            &mut vm,
            "(define factorial as (fn (n) (if (== n 0) 1 (* n (factorial (- n 1))))) [f] '(n [n]) howto-ok)"
        ),
        "true"
    );
    assert_eq!(eval(&mut vm, "(factorial 5)"), "120");
}

#[test]
fn test_factorial_survives_aggressive_collection() {
    let mut vm = test_vm_with(Config {
        gc_trigger_limit: 1,
        ..Config::default()
    });
    eval(
        &mut vm,
        "(define factorial as (fn (n) (if (== n 0) 1 (* n (factorial (- n 1))))) [f])",
    );
    assert_eq!(eval(&mut vm, "(factorial 10)"), "3628800");
    assert_eq!(eval(&mut vm, "(for i from 1 to 50 (factorial 3))"), "50");
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn test_select() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(select false [p] true [a] default [b])"), "[a]");
    assert_eq!(eval(&mut vm, "(select false [p] default [b])"), "[b]");
    assert_eq!(eval(&mut vm, "(select false [p])"), "nil");
    assert!(eval_err(&mut vm, "(select default [b] true [a])")
        .starts_with("'default' must be the last selector in special 'select'."));
    // the first true selector stops evaluation of the rest
    assert_eq!(eval(&mut vm, "(select true 1 (nosuch) 2)"), "1");
}

#[test]
fn test_if_requires_boolean() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(if true 1 2)"), "1");
    assert_eq!(eval(&mut vm, "(if false 1)"), "nil");
    assert!(eval_err(&mut vm, "(if 1 2)").starts_with(
        "First argument to special 'if' must evaluate into boolean value. \
         Now it evaluated into type integer."
    ));
    assert!(eval_err(&mut vm, "(if true)")
        .starts_with("Special 'if' expects two or three arguments. 1 arguments were given."));
}

#[test]
fn test_while_counts_iterations() {
    let mut vm = test_vm();
    eval(&mut vm, "(define i as 0 [i])");
    assert_eq!(eval(&mut vm, "(while (< i 3) (define i as (+ i 1) [i]))"), "3");
    assert_eq!(eval(&mut vm, "i"), "3");
    assert_eq!(eval(&mut vm, "(while false 1)"), "0");
}

#[test]
fn test_for_ranges_and_containers() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(for i from 1 to 5 (+ i 1))"), "5");
    assert_eq!(eval(&mut vm, "(for i from 5 to 1 step 2 i)"), "3");
    assert_eq!(eval(&mut vm, "(for c in [abc] c)"), "3");
    assert_eq!(eval(&mut vm, "(for x in '(1 2 3 4 5) step 2 x)"), "3");
    assert_eq!(eval(&mut vm, "(for x in '() x)"), "0");
    // the loop variable lives in a per-iteration child environment
    assert_eq!(eval_err(&mut vm, "i"), "Unbound symbol 'i'");
}

#[test]
fn test_for_step_must_be_positive() {
    let mut vm = test_vm();
    assert!(eval_err(&mut vm, "(for i from 1 to 3 step 0 i)")
        .starts_with("The 'step' of special 'for' must be larger than zero. Now it is 0."));
    assert!(eval_err(&mut vm, "(for x in [abc] step -1 x)")
        .starts_with("The 'step' of special 'for' must be larger than zero. Now it is -1."));
    assert!(eval_err(&mut vm, "(for i from 1 to 2.0 i)")
        .starts_with("Fifth argument to special 'for' using 'from' must be of same type than the third (integer). Now it has type real."));
    assert!(eval_err(&mut vm, "(for x on [abc] x)")
        .starts_with("Second argument to special 'for' must be symbol 'in' or 'from'."));
}

#[test]
fn test_and_or_short_circuit() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(and)"), "true");
    assert_eq!(eval(&mut vm, "(or)"), "false");
    assert_eq!(eval(&mut vm, "(and true false (nosuch))"), "false");
    assert_eq!(eval(&mut vm, "(and true 1)"), "1");
    assert_eq!(eval(&mut vm, "(or false 7 (nosuch))"), "7");
    assert_eq!(eval(&mut vm, "(or false false)"), "false");
    // nil is a value, only false stops and/or
    assert_eq!(eval(&mut vm, "(and nil 1)"), "1");
    assert_eq!(eval(&mut vm, "(or nil 1)"), "nil");
    assert_eq!(eval(&mut vm, "(or false nil)"), "nil");
}

#[test]
fn test_eval_special() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(eval '(+ 1 2))"), "3");
    assert!(eval_err(&mut vm, "(eval 1 2)").starts_with(
        "Second argument to special 'eval' must evaluate into environment. \
         Now it evaluated into type integer."
    ));
}

#[test]
fn test_quote_keeps_forms_literal() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "'(a (b 'c))"), "(a (b (quote c)))");
    assert_eq!(eval(&mut vm, "(quote x)"), "x");
    assert!(eval_err(&mut vm, "(quote)")
        .starts_with("Special 'quote' expects one argument. 0 arguments were given."));
}

#[test]
fn test_errors_carry_form_trailers_innermost_first() {
    let mut vm = test_vm();
    let msg = eval_err(&mut vm, "(do 1 (+ 1 x) 2)");
    assert_eq!(
        msg,
        "Unbound symbol 'x'\n\tAt form: >>>>>>>>>>(+ 1 x)<<<<<<<<<<\n\
         \n\tAt form: >>>>>>>>>>(do 1 (+ 1 x) 2)<<<<<<<<<<\n"
    );
}

#[test]
fn test_return_exits_the_enclosing_function() {
    let mut vm = test_vm();
    eval(&mut vm, "(define f as (fn () (do (return 5) 6)) [f])");
    assert_eq!(eval(&mut vm, "(f)"), "5");
    eval(&mut vm, "(define g as (fn () (while true (return 9)) 1) [g])");
    assert_eq!(eval(&mut vm, "(g)"), "9");
    assert_eq!(eval(&mut vm, "(return 3)"), "3");
}

#[test]
fn test_varargs() {
    let mut vm = test_vm();
    eval(&mut vm, "(define g as (fn (a rest ...) rest) [g])");
    assert_eq!(eval(&mut vm, "(g 1 2 3)"), "(2 3)");
    assert_eq!(eval(&mut vm, "(g 1)"), "()");
    assert_eq!(
        eval_err(&mut vm, "(g)").lines().next(),
        Some("Function expects 1 arguments. Now 0 arguments were given.")
    );
    assert!(eval_err(&mut vm, "(fn (a ... ...) a)")
        .starts_with("Function can have only one formal ... argument for varargs. Now 2 were given."));
    assert!(eval_err(&mut vm, "(fn (a ... b) a)").starts_with(
        "Function can have no formal arguments after ... for varargs. Now 1 formals were given after ..."
    ));
}

#[test]
fn test_function_arity_mismatch() {
    let mut vm = test_vm();
    eval(&mut vm, "(define f as (fn () 1) [f])");
    assert_eq!(
        eval_err(&mut vm, "(f 1)").lines().next(),
        Some("Function expects 0 arguments. Now 1 arguments were given.")
    );
}

#[test]
fn test_closures_capture_their_environment() {
    let mut vm = test_vm();
    eval(&mut vm, "(define make-adder as (fn (n) (fn (x) (+ x n))) [make-adder])");
    eval(&mut vm, "(define add3 as (make-adder 3) [add3])");
    assert_eq!(eval(&mut vm, "(add3 4)"), "7");
}

#[test]
fn test_comparison_specials() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(< 1 2 3)"), "true");
    assert_eq!(eval(&mut vm, "(< 1 3 2)"), "false");
    assert_eq!(eval(&mut vm, "(<= 1 1 2)"), "true");
    assert_eq!(eval(&mut vm, "(> 3 2.5)"), "true");
    assert_eq!(eval(&mut vm, "(>= 1 2)"), "false");
    assert_eq!(eval(&mut vm, "(== 1 1.0)"), "true");
    assert_eq!(eval(&mut vm, "(!= 1 2)"), "true");
    assert_eq!(eval(&mut vm, "(=== 1 1)"), "false");
    assert_eq!(eval(&mut vm, "(== '(1 [a]) '(1 [a]))"), "true");
    // evaluation stops once the relation fails
    assert_eq!(eval(&mut vm, "(< 2 1 (nosuch))"), "false");
    assert!(eval_err(&mut vm, "(< 1)").starts_with("Special '<' expects at least two arguments."));
}

#[test]
fn test_define_checks_formal_docs() {
    let mut vm = test_vm();
    assert_eq!(
        eval(&mut vm, "(define f as (fn (n) n) [doc] '(n [the n]) howto-ok)"),
        "true"
    );
    assert!(
        eval_err(&mut vm, "(define h as (fn (n m) n) [doc] '(n [the n]) howto-ok)")
            .starts_with("formal 'm' is not mentioned in docvec")
    );
    assert!(eval_err(&mut vm, "(define h is 1 [h])")
        .starts_with("Second argument to special 'define' must be symbol 'as'."));
}

#[test]
fn test_define_requires_documentation() {
    let mut vm = test_vm();
    for form in [
        "(define x as 1)",
        "(define x as 1 in e)",
        "(define x as (fn (n) n) [doc] '(n [the n]) howto-ok in)",
    ] {
        assert!(
            eval_err(&mut vm, form).starts_with(
                "Special 'define' expects four, six or eight arguments."
            ),
            "{form}"
        );
    }
    assert!(vm.heap().lookup(vm.global_environment(), intern("x")).is_none());
    assert_eq!(eval(&mut vm, "(define x as 1 [one])"), "true");
}

#[test]
fn test_define_stores_docs_on_function() {
    let mut vm = test_vm();
    eval(&mut vm, "(define sq as (fn (n) (* n n)) [Square] '(n [number]) howto-ok)");
    let global = vm.global_environment();
    let f = vm.heap().lookup(global, intern("sq")).unwrap();
    match vm.get(f) {
        Value::Function(func) => {
            assert_eq!(func.name.as_deref(), Some("sq"));
            assert!(func.howto_allowed);
            assert_eq!(func.describe(), "Square\nArguments are:\nn -> number");
        }
        other => panic!("expected function, got {}", other.type_name()),
    }
}

#[test]
fn test_howto_finds_matching_callables() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(howto 1 2 3)"), "((+ 1 2))");
    eval(&mut vm, "(define twice as (fn (n) (* n 2)) [Twice] '(n [number]) howto-ok)");
    assert_eq!(eval(&mut vm, "(howto 4 8)"), "((twice 4))");
}

#[test]
fn test_error_values_abort_argument_evaluation() {
    let mut vm = test_vm();
    let global = vm.global_environment();
    let e = vm.new_error("boom");
    if let Some(frame) = vm.heap_mut().env_mut(global) {
        frame.define(intern("e"), e, None);
    }
    assert!(eval_err(&mut vm, "(+ e 1)").starts_with("boom\n\tAt form: >>>>>>>>>>(+ e 1)"));
}

#[test]
fn test_exit_stops_evaluation() {
    let mut vm = test_vm();
    assert_eq!(eval(&mut vm, "(exit 3) 5"), "nil");
    assert!(vm.is_quit());
    assert_eq!(vm.get_exit_code(), 3);
}

#[test]
fn test_parse_then_eval_protocol() {
    let mut vm = test_vm();
    let mut input = Input::new("(+ 1\n");
    assert!(vm.parse(&mut input).is_none());
    input.push_str("2)");
    let form = vm.parse(&mut input).unwrap();
    let result = vm.eval_in_global_environment(form);
    assert_eq!(vm.to_string(result), "3");

    let mut bad = Input::new(")");
    let err = vm.parse(&mut bad).unwrap();
    assert!(matches!(vm.get(err), Value::Error(_)));
}

#[test]
fn test_register_builtin_requires_environment() {
    let mut vm = test_vm();
    let not_env = vm.new_integer(1);
    assert!(!vm.create_and_register_new_builtin(
        "nope",
        |vm, _, _| Ok(vm.nil()),
        0,
        "",
        false,
        not_env
    ));
}

#[test]
fn test_debug_mode_does_not_change_results() {
    let mut vm = test_vm_with(Config {
        debug_mode_on: true,
        ..Config::default()
    });
    assert_eq!(eval(&mut vm, "(+ 1 (* 2 3))"), "7");
}
