use dern_core::{map_remove, DernError, Handle, Value};
use dern_vm::{EvalResult, Vm};

use crate::collections::merge_into_map;
use crate::{ordinal, register_fn, register_howto_fn, textual};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Integer(i32),
    Real(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Integer(n) => f64::from(n),
            Number::Real(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Integer(n) => n == 0,
            Number::Real(f) => f == 0.0,
        }
    }

    /// Integers stay integers (wrapping on overflow); any real promotes.
    fn combine(self, other: Number, int_op: fn(i32, i32) -> i32, real_op: fn(f64, f64) -> f64) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Number::Integer(int_op(a, b)),
            (a, b) => Number::Real(real_op(a.as_f64(), b.as_f64())),
        }
    }
}

fn number(vm: &Vm, h: Handle, name: &str, position: usize) -> Result<Number, DernError> {
    match vm.get(h) {
        Value::Integer(n) => Ok(Number::Integer(*n)),
        Value::Real(f) => Ok(Number::Real(*f)),
        other => Err(DernError::eval(format!(
            "Builtin '{name}' expects numeric arguments (integer or real). {} argument has type {}.",
            ordinal(position),
            other.type_name()
        ))),
    }
}

fn new_number(vm: &mut Vm, n: Number) -> Handle {
    match n {
        Number::Integer(i) => vm.new_integer(i),
        Number::Real(f) => vm.new_real(f),
    }
}

fn fold_numbers(
    vm: &mut Vm,
    name: &str,
    args: &[Handle],
    int_op: fn(i32, i32) -> i32,
    real_op: fn(f64, f64) -> f64,
) -> EvalResult {
    let mut acc = number(vm, args[0], name, 1)?;
    for (i, &arg) in args.iter().enumerate().skip(1) {
        acc = acc.combine(number(vm, arg, name, i + 1)?, int_op, real_op);
    }
    Ok(new_number(vm, acc))
}

/// The result of `+` and `-` on a container shares nothing with the operand.
fn fresh_copy(vm: &mut Vm, h: Handle) -> Handle {
    let copy = vm.deep_copy(h);
    vm.heap_mut().set_doc(copy, None);
    copy
}

fn add(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    let Some(&first) = args.first() else {
        return Ok(vm.new_integer(0));
    };
    match vm.get(first).clone() {
        Value::Integer(_) | Value::Real(_) => fold_numbers(vm, "+", args, i32::wrapping_add, |a, b| a + b),
        Value::String(_) | Value::Symbol(_) | Value::Character(_) => {
            let mut out = String::new();
            for (i, &arg) in args.iter().enumerate() {
                match textual(vm, arg) {
                    Some(t) => out.push_str(&t),
                    None => {
                        return Err(DernError::eval(format!(
                            "Builtin '+' expects textual arguments if the first argument is textual. {} argument has type {}.",
                            ordinal(i + 1),
                            vm.type_name(arg)
                        ))
                        .into())
                    }
                }
            }
            Ok(vm.new_string(out))
        }
        Value::Vector(_) | Value::List(_) => {
            let target = fresh_copy(vm, first);
            for &arg in &args[1..] {
                let stored = vm.store_value(arg);
                match vm.get_mut(target) {
                    Value::Vector(items) => items.push(stored),
                    Value::List(items) => items.push_back(stored),
                    _ => {}
                }
            }
            Ok(target)
        }
        Value::HashMap(_) => {
            let target = fresh_copy(vm, first);
            merge_into_map(vm, "+", target, &args[1..])?;
            Ok(target)
        }
        other => Err(DernError::eval(format!(
            "Builtin '+' cannot add to a value of type {}.",
            other.type_name()
        ))
        .into()),
    }
}

fn subtract(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    let Some(&first) = args.first() else {
        return Err(DernError::eval("Builtin '-' expects at least one argument.").into());
    };
    match vm.get(first).clone() {
        Value::Integer(n) if args.len() == 1 => Ok(vm.new_integer(n.wrapping_neg())),
        Value::Real(f) if args.len() == 1 => Ok(vm.new_real(-f)),
        Value::Integer(_) | Value::Real(_) => fold_numbers(vm, "-", args, i32::wrapping_sub, |a, b| a - b),
        Value::String(_) | Value::Symbol(_) | Value::Character(_) => {
            let mut out = vm.to_plain_string(first);
            for (i, &arg) in args.iter().enumerate().skip(1) {
                let Some(needle) = textual(vm, arg) else {
                    return Err(DernError::eval(format!(
                        "Builtin '-' expects textual arguments if the first argument is textual. {} argument has type {}.",
                        ordinal(i + 1),
                        vm.type_name(arg)
                    ))
                    .into());
                };
                if !needle.is_empty() {
                    out = out.replace(&needle, "");
                }
            }
            Ok(vm.new_string(out))
        }
        Value::Vector(_) | Value::List(_) => {
            let target = fresh_copy(vm, first);
            let removed = &args[1..];
            let heap = vm.heap();
            let keep = |item: &Handle| !removed.iter().any(|&a| dern_core::equal(heap, *item, a));
            let kept = match heap.get(target) {
                Value::Vector(items) => Value::Vector(items.iter().copied().filter(keep).collect()),
                Value::List(items) => Value::List(items.iter().copied().filter(keep).collect()),
                _ => return Ok(target),
            };
            vm.heap_mut().replace(target, kept);
            Ok(target)
        }
        Value::HashMap(_) => {
            let target = fresh_copy(vm, first);
            for &key in &args[1..] {
                map_remove(vm.heap_mut(), target, key);
            }
            Ok(target)
        }
        other => Err(DernError::eval(format!(
            "Builtin '-' cannot subtract from a value of type {}.",
            other.type_name()
        ))
        .into()),
    }
}

fn divide(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if args.is_empty() {
        return Err(DernError::eval("Builtin '/' expects at least one argument.").into());
    }
    let mut acc = number(vm, args[0], "/", 1)?;
    for (i, &arg) in args.iter().enumerate().skip(1) {
        let divisor = number(vm, arg, "/", i + 1)?;
        if divisor.is_zero() {
            return Err(DernError::eval(format!(
                "Argument number {} to builtin '/' cannot be zero.",
                i + 1
            ))
            .into());
        }
        acc = acc.combine(divisor, i32::wrapping_div, |a, b| a / b);
    }
    Ok(new_number(vm, acc))
}

fn modulo(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if args.len() != 2 {
        return Err(DernError::eval(format!(
            "Builtin 'mod' expects two arguments. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let a = crate::expect_integer(vm, args[0], 1, "mod")?;
    let b = crate::expect_integer(vm, args[1], 2, "mod")?;
    if b == 0 {
        return Err(DernError::eval("Second argument to builtin 'mod' cannot be zero.").into());
    }
    Ok(vm.new_integer(a.wrapping_rem(b)))
}

/// `++` and `--`: step every argument in place and give back the first.
fn bump(vm: &mut Vm, name: &str, args: &[Handle], delta: i32) -> EvalResult {
    if args.is_empty() {
        return Err(DernError::eval(format!("Builtin '{name}' expects at least one argument.")).into());
    }
    for (i, &arg) in args.iter().enumerate() {
        if vm.is_constant(arg) {
            return Err(DernError::eval(format!(
                "Builtin '{name}' tried to modify a constant value at {} argument.",
                ordinal(i + 1).to_lowercase()
            ))
            .into());
        }
        let type_name = vm.type_name(arg);
        match vm.get_mut(arg) {
            Value::Integer(n) => *n = n.wrapping_add(delta),
            Value::Real(f) => *f += f64::from(delta),
            Value::Character(c) => {
                let code = i64::from(u32::from(*c)) + i64::from(delta);
                *c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        DernError::eval(format!(
                            "Builtin '{name}' cannot step character past the valid range."
                        ))
                    })?;
            }
            _ => {
                return Err(DernError::eval(format!(
                    "Arguments to builtin '{name}' must be numbers. {} argument has type '{type_name}'.",
                    ordinal(i + 1)
                ))
                .into())
            }
        }
    }
    Ok(args[0])
}

pub fn register(vm: &mut Vm) {
    register_howto_fn(vm, "+", 0, "Add arguments to create new value", |vm, args, _| add(vm, args));

    register_howto_fn(
        vm,
        "-",
        1,
        "Subtract number arguments, or negate one argument",
        |vm, args, _| subtract(vm, args),
    );

    register_howto_fn(vm, "*", 0, "Multiply number arguments", |vm, args, _| {
        if args.is_empty() {
            return Ok(vm.new_integer(1));
        }
        fold_numbers(vm, "*", args, i32::wrapping_mul, |a, b| a * b)
    });

    register_howto_fn(vm, "/", 1, "Divide number arguments", |vm, args, _| divide(vm, args));

    register_howto_fn(vm, "mod", 2, "Calculate modulo of two integers", |vm, args, _| {
        modulo(vm, args)
    });

    register_fn(vm, "++", 1, "Increase a value or values by one", |vm, args, _| {
        bump(vm, "++", args, 1)
    });

    register_fn(vm, "--", 1, "Decrease a value or values by one", |vm, args, _| {
        bump(vm, "--", args, -1)
    });
}
