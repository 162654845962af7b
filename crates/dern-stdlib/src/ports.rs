use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use dern_core::{DernError, Handle, Port, PortKind, Value};
use dern_vm::{EvalResult, Vm};

use crate::{expect_integer, expect_string, register_fn, register_fn_fs_gated};

fn port_arg(vm: &Vm, h: Handle, name: &str) -> Result<Rc<RefCell<Port>>, DernError> {
    match vm.get(h) {
        Value::Port(port) => Ok(Rc::clone(port)),
        other => Err(DernError::type_error(
            format!("First argument to builtin '{name}'"),
            "port",
            other.type_name(),
        )),
    }
}

fn arity(name: &str, args: &[Handle], range: std::ops::RangeInclusive<usize>) -> Result<(), DernError> {
    if range.contains(&args.len()) {
        return Ok(());
    }
    let expected = if range.start() == range.end() {
        range.start().to_string()
    } else {
        format!("{}-{}", range.start(), range.end())
    };
    Err(DernError::arity(name, expected, args.len()))
}

fn open(vm: &mut Vm, name: &str, args: &[Handle], kind: PortKind) -> EvalResult {
    arity(name, args, 1..=1)?;
    let path = expect_string(vm, args[0], 1, name)?;
    let port = Port::open_file(Path::new(&path), kind);
    if !port.is_open() {
        return Err(DernError::io(format!("Builtin '{name}' cannot open file '{path}'.")).into());
    }
    Ok(vm.alloc(Value::Port(Rc::new(RefCell::new(port)))))
}

/// Octets to write: an integer, a string's bytes, or a vector of integers.
fn octets(vm: &Vm, h: Handle) -> Result<Vec<u8>, DernError> {
    let octet = |n: i32| {
        u8::try_from(n).map_err(|_| {
            DernError::eval(format!(
                "Builtin 'port-write' can only write octets (0-255). Now the value is {n}."
            ))
        })
    };
    match vm.get(h) {
        Value::Integer(n) => Ok(vec![octet(*n)?]),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Vector(items) => items
            .iter()
            .map(|&item| match vm.get(item) {
                Value::Integer(n) => octet(*n),
                other => Err(DernError::type_error(
                    "Element of the vector given to builtin 'port-write'",
                    "integer",
                    other.type_name(),
                )),
            })
            .collect(),
        other => Err(DernError::type_error(
            "Second argument to builtin 'port-write'",
            "integer, string or vector of integers",
            other.type_name(),
        )),
    }
}

fn as_i32(n: i64) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub fn register(vm: &mut Vm) {
    register_fn_fs_gated(vm, "input-file-open", 1, "Open file-port for reading only", |vm, args, _| {
        open(vm, "input-file-open", args, PortKind::Input)
    });

    register_fn_fs_gated(vm, "output-file-open", 1, "Open file-port for writing only", |vm, args, _| {
        open(vm, "output-file-open", args, PortKind::Output)
    });

    register_fn_fs_gated(vm, "io-file-open", 1, "Open file-port for input and output", |vm, args, _| {
        open(vm, "io-file-open", args, PortKind::InputOutput)
    });

    register_fn(
        vm,
        "port-supports-output?",
        1,
        "Predicate telling whether the port supports writing",
        |vm, args, _| {
            arity("port-supports-output?", args, 1..=1)?;
            let port = port_arg(vm, args[0], "port-supports-output?")?;
            let supported = port.borrow().supports_output();
            Ok(vm.boolean(supported))
        },
    );

    register_fn(
        vm,
        "port-supports-input?",
        1,
        "Predicate telling whether the port supports reading",
        |vm, args, _| {
            arity("port-supports-input?", args, 1..=1)?;
            let port = port_arg(vm, args[0], "port-supports-input?")?;
            let supported = port.borrow().supports_input();
            Ok(vm.boolean(supported))
        },
    );

    register_fn(vm, "port-close", 1, "Close a port", |vm, args, _| {
        arity("port-close", args, 1..=1)?;
        let port = port_arg(vm, args[0], "port-close")?;
        let closed = port.borrow_mut().close();
        Ok(vm.boolean(closed))
    });

    register_fn(
        vm,
        "port-read",
        1,
        "Read from a port one or a given number of octets",
        |vm, args, _| {
            arity("port-read", args, 1..=2)?;
            let port = port_arg(vm, args[0], "port-read")?;
            let count = match args.get(1) {
                Some(&h) => {
                    let n = expect_integer(vm, h, 2, "port-read")?;
                    usize::try_from(n).map_err(|_| {
                        DernError::eval(format!(
                            "Second argument to builtin 'port-read' cannot be negative. Now it is {n}."
                        ))
                    })?
                }
                None => 1,
            };
            let bytes = port.borrow_mut().read(count)?;
            let items = bytes.into_iter().map(|b| vm.new_integer(i32::from(b))).collect();
            Ok(vm.new_vector(items))
        },
    );

    register_fn(
        vm,
        "port-write",
        2,
        "Write one integer or all integers from a vector to a port supporting writing",
        |vm, args, _| {
            arity("port-write", args, 2..=2)?;
            let port = port_arg(vm, args[0], "port-write")?;
            let data = octets(vm, args[1])?;
            let written = port.borrow_mut().write(&data)?;
            Ok(vm.new_integer(as_i32(written as i64)))
        },
    );

    register_fn(
        vm,
        "port-seek",
        2,
        "Move the position of a port. Negative amounts count back from the end",
        |vm, args, _| {
            arity("port-seek", args, 2..=3)?;
            let port = port_arg(vm, args[0], "port-seek")?;
            let amount = expect_integer(vm, args[1], 2, "port-seek")?;
            let from_current = match args.get(2) {
                None => false,
                Some(&h) if vm.get(h).is_symbol_named("from-current") => true,
                Some(&h) => {
                    return Err(DernError::eval(format!(
                        "Third argument to builtin 'port-seek' must be symbol 'from-current'. Now it is {}.",
                        vm.to_string(h)
                    ))
                    .into())
                }
            };
            let moved = port.borrow_mut().seek(i64::from(amount), from_current);
            Ok(vm.boolean(moved))
        },
    );

    register_fn(
        vm,
        "port-dist",
        1,
        "Get distance from the beginning on ports that support it, or minus one",
        |vm, args, _| {
            arity("port-dist", args, 1..=1)?;
            let port = port_arg(vm, args[0], "port-dist")?;
            let dist = port.borrow().dist();
            Ok(vm.new_integer(as_i32(dist)))
        },
    );

    register_fn(
        vm,
        "port-length",
        1,
        "Get size of port in octets on ports that support this operation, or minus one",
        |vm, args, _| {
            arity("port-length", args, 1..=1)?;
            let port = port_arg(vm, args[0], "port-length")?;
            let length = port.borrow().length();
            Ok(vm.new_integer(as_i32(length)))
        },
    );

    register_fn(vm, "port-flush", 1, "Flush an output port that supports flushing", |vm, args, _| {
        arity("port-flush", args, 1..=1)?;
        let port = port_arg(vm, args[0], "port-flush")?;
        let flushed = port.borrow_mut().flush();
        Ok(vm.boolean(flushed))
    });
}
