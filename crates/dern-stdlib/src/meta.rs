use std::path::Path;

use dern_core::{DernError, Handle, Value};
use dern_vm::{EvalResult, Unwind, Vm};

use crate::{expect_string, map_args, register_fn};

fn doc_of(vm: &mut Vm, h: Handle) -> EvalResult {
    let text = match vm.get(h) {
        Value::Function(func) => Some(func.describe()),
        Value::Builtin(native) | Value::Special(native) => Some(native.doc.clone()),
        _ => vm.heap().doc(h).map(str::to_owned),
    };
    Ok(match text {
        Some(t) => vm.new_string(t),
        None => vm.nil(),
    })
}

pub fn register(vm: &mut Vm) {
    register_fn(vm, "not", 1, "Reverse boolean value", |vm, args, _| {
        let [arg] = args else {
            return Err(DernError::eval("Builtin 'not' expects one argument.").into());
        };
        match vm.get(*arg) {
            Value::Boolean(b) => Ok(vm.boolean(!*b)),
            _ => Err(DernError::eval("Builtin 'not' expects boolean argument.").into()),
        }
    });

    register_fn(vm, "abort", 1, "Quit execution with error message", |vm, args, _| {
        let [message] = args else {
            return Err(DernError::eval("Builtin 'abort' expects one argument.").into());
        };
        Err(DernError::eval(vm.to_plain_string(*message)).into())
    });

    register_fn(
        vm,
        "return",
        1,
        "Return from function early with the given value",
        |_, args, _| {
            let [value] = args else {
                return Err(DernError::eval("Builtin 'return' expects one argument.").into());
            };
            Err(Unwind::Return(*value))
        },
    );

    register_fn(vm, "doc", 1, "Get documentation string of a value or values", |vm, args, _| {
        if args.is_empty() {
            return Err(DernError::eval("Builtin 'doc' expects at least one argument.").into());
        }
        map_args(vm, args, doc_of)
    });

    register_fn(vm, "uid", 1, "Get unique id of a value", |vm, args, _| {
        dern_core::check_arity!(args, "uid", 1);
        let uid = vm.heap().uid(args[0]);
        Ok(vm.new_integer(uid as i32))
    });

    register_fn(vm, "env-new", 0, "Create new empty environment", |vm, args, _| {
        let parent = match args {
            [] => vm.global_environment(),
            [parent] => match vm.get(*parent) {
                Value::Environment(_) => *parent,
                other => {
                    return Err(DernError::eval(format!(
                        "Argument to builtin 'env-new' must be an environment. Now argument has type '{}'.",
                        other.type_name()
                    ))
                    .into())
                }
            },
            _ => return Err(DernError::eval("Builtin 'env-new' expects zero or one arguments.").into()),
        };
        Ok(vm.new_environment(Some(parent)))
    });

    register_fn(
        vm,
        "env-current",
        0,
        "Get the current environment used by the context where this is evaluated",
        |_, args, env| {
            if !args.is_empty() {
                return Err(DernError::eval("Builtin 'env-current' expects zero arguments.").into());
            }
            Ok(env)
        },
    );

    register_fn(vm, "env-global", 0, "Get the global environment", |vm, args, _| {
        if !args.is_empty() {
            return Err(DernError::eval("Builtin 'env-global' expects zero arguments.").into());
        }
        Ok(vm.global_environment())
    });

    register_fn(
        vm,
        "read-and-eval-path",
        1,
        "Read and evaluate a file from the given path",
        |vm, args, _| {
            if args.len() != 1 {
                return Err(DernError::eval(format!(
                    "Builtin 'read-and-eval-path' expects one argument. {} arguments were given.",
                    args.len()
                ))
                .into());
            }
            let path = match vm.get(args[0]) {
                Value::String(s) => s.clone(),
                other => {
                    return Err(DernError::eval(format!(
                        "First argument to builtin 'read-and-eval-path' must be string (path). Type '{}' was given.",
                        other.type_name()
                    ))
                    .into())
                }
            };
            let global = vm.global_environment();
            vm.eval_path(Path::new(&path), global)
        },
    );

    register_fn(
        vm,
        "read-and-eval-string",
        1,
        "Read and evaluate the given string",
        |vm, args, _| {
            dern_core::check_arity!(args, "read-and-eval-string", 1);
            let source = expect_string(vm, args[0], 1, "read-and-eval-string").map_err(|_| {
                DernError::eval(format!(
                    "First argument to builtin 'read-and-eval-string' must be string (to be evaluated). Type '{}' was given.",
                    vm.type_name(args[0])
                ))
            })?;
            let global = vm.global_environment();
            vm.eval_source(&source, global)
        },
    );
}
