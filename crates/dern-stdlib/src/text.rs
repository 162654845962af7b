use std::io::Write as _;

use dern_core::{equal, DernError, Handle, Value};
use dern_vm::{EvalResult, Vm};

use crate::{map_args, register_fn, register_howto_fn};

/// Plain rendering of `args[0]` with every `{}` replaced by the plain
/// rendering of the next argument.
fn format_args(vm: &Vm, name: &str, args: &[Handle]) -> Result<String, DernError> {
    let Some((&template, rest)) = args.split_first() else {
        return Err(DernError::eval(format!("Builtin '{name}' expects one or more arguments.")));
    };
    let template = vm.to_plain_string(template);
    let mut values = rest.iter();
    let mut out = String::with_capacity(template.len());
    let mut pieces = template.split("{}");
    if let Some(head) = pieces.next() {
        out.push_str(head);
    }
    for piece in pieces {
        let Some(&value) = values.next() else {
            return Err(DernError::eval(format!(
                "Not enough arguments for the format string of '{name}'."
            )));
        };
        out.push_str(&vm.to_plain_string(value));
        out.push_str(piece);
    }
    Ok(out)
}

fn print_to_stdout(text: &str, newline: bool) -> Result<(), DernError> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if newline {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

fn to_integer(vm: &mut Vm, h: Handle) -> EvalResult {
    let n = match vm.get(h) {
        Value::Integer(n) => *n,
        Value::Real(f) => {
            if !f.is_finite() {
                return Err(DernError::eval("First argument to 'to-integer' is not real number.").into());
            }
            f.trunc() as i32
        }
        Value::Character(c) => i32::try_from(u32::from(*c)).unwrap_or(i32::MAX),
        Value::String(s) => s.trim().parse::<i32>().map_err(|_| {
            DernError::eval(format!("Builtin 'to-integer' cannot convert string '{s}' into integer."))
        })?,
        other => {
            return Err(DernError::eval(format!(
                "Builtin 'to-integer' cannot convert value of type '{}' into integer.",
                other.type_name()
            ))
            .into())
        }
    };
    Ok(vm.new_integer(n))
}

fn starts_with(vm: &Vm, whole: Handle, prefix: Handle) -> Result<bool, DernError> {
    match (vm.get(whole), vm.get(prefix)) {
        (Value::String(s), Value::String(p)) => Ok(s.starts_with(p.as_str())),
        (Value::String(s), Value::Character(c)) => Ok(s.starts_with(*c)),
        (Value::Vector(items), Value::Vector(head)) => Ok(items.len() >= head.len()
            && items.iter().zip(head).all(|(&a, &b)| equal(vm.heap(), a, b))),
        (a, b) => Err(DernError::eval(format!(
            "Builtin 'starts-with?' cannot test whether type '{}' starts with type '{}'.",
            a.type_name(),
            b.type_name()
        ))),
    }
}

pub fn register(vm: &mut Vm) {
    register_howto_fn(
        vm,
        "string-format",
        1,
        "Create new string and allow formatting of value into it using {}",
        |vm, args, _| {
            let text = format_args(vm, "string-format", args)?;
            Ok(vm.new_string(text))
        },
    );

    register_howto_fn(vm, "to-string", 1, "Give value or values as string(s)", |vm, args, _| {
        if args.is_empty() {
            return Err(DernError::eval("Builtin 'to-string' expects one or more arguments.").into());
        }
        map_args(vm, args, |vm, h| {
            let text = vm.to_plain_string(h);
            Ok(vm.new_string(text))
        })
    });

    register_howto_fn(vm, "to-integer", 1, "Give value or values as integer(s)", |vm, args, _| {
        if args.is_empty() {
            return Err(DernError::eval("Builtin 'to-integer' expects one or more arguments.").into());
        }
        map_args(vm, args, to_integer)
    });

    register_fn(vm, "print", 1, "Print message for the user", |vm, args, _| {
        let text = format_args(vm, "print", args)?;
        print_to_stdout(&text, false)?;
        Ok(vm.nil())
    });

    register_fn(vm, "println", 1, "Print message for the user and newline", |vm, args, _| {
        let text = format_args(vm, "println", args)?;
        print_to_stdout(&text, true)?;
        Ok(vm.nil())
    });

    register_howto_fn(
        vm,
        "starts-with?",
        2,
        "Does the first value start with the second?",
        |vm, args, _| {
            if args.len() != 2 {
                return Err(DernError::eval("Builtin 'starts-with?' expects two arguments.").into());
            }
            let result = starts_with(vm, args[0], args[1])?;
            Ok(vm.boolean(result))
        },
    );
}
