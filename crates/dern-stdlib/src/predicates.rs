use dern_core::{DernError, Handle, Value};
use dern_vm::Vm;

use crate::register_fn;

/// Each predicate takes exactly one argument and tests its type.
const PREDICATES: &[(&str, &str, fn(&Value) -> bool)] = &[
    ("integer?", "Predicate telling whether the argument is an integer", |v| {
        matches!(v, Value::Integer(_))
    }),
    ("real?", "Predicate telling whether the argument is a real number", |v| {
        matches!(v, Value::Real(_))
    }),
    ("number?", "Predicate telling whether the argument is an integer or real number", |v| {
        v.is_number()
    }),
    ("nil?", "Predicate telling whether the argument is nil", |v| {
        matches!(v, Value::Nil)
    }),
    ("boolean?", "Predicate telling whether the argument is a boolean", |v| {
        matches!(v, Value::Boolean(_))
    }),
    ("character?", "Predicate telling whether the argument is a character", |v| {
        matches!(v, Value::Character(_))
    }),
    ("string?", "Predicate telling whether the argument is a string", |v| {
        matches!(v, Value::String(_))
    }),
    ("symbol?", "Predicate telling whether the argument is a symbol", |v| {
        matches!(v, Value::Symbol(_))
    }),
    ("vector?", "Predicate telling whether the argument is a vector", |v| {
        matches!(v, Value::Vector(_))
    }),
    ("hash-map?", "Predicate telling whether the argument is a hash map", |v| {
        matches!(v, Value::HashMap(_))
    }),
];

fn single_arg(name: &str, args: &[Handle]) -> Result<Handle, DernError> {
    match args {
        [only] => Ok(*only),
        _ => Err(DernError::eval(format!(
            "Builtin '{name}' expects exactly one argument. Now {} arguments were given.",
            args.len()
        ))),
    }
}

pub fn register(vm: &mut Vm) {
    for &(name, doc, test) in PREDICATES {
        register_fn(vm, name, 1, doc, move |vm, args, _| {
            let arg = single_arg(name, args)?;
            Ok(vm.boolean(test(vm.get(arg))))
        });
    }
}
