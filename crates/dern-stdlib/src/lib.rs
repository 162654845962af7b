mod arithmetic;
mod collections;
mod host;
mod meta;
mod ports;
mod predicates;
mod text;

use dern_core::{DernError, Handle, Value};
use dern_vm::{EvalResult, Vm};

/// Install every builtin into the global environment of `vm`.
pub fn register_stdlib(vm: &mut Vm) {
    arithmetic::register(vm);
    collections::register(vm);
    text::register(vm);
    predicates::register(vm);
    ports::register(vm);
    host::register(vm);
    meta::register(vm);
}

fn register_fn(
    vm: &mut Vm,
    name: &str,
    required_args: usize,
    doc: &str,
    f: impl Fn(&mut Vm, &[Handle], Handle) -> EvalResult + 'static,
) {
    let global = vm.global_environment();
    vm.create_and_register_new_builtin(name, f, required_args, doc, false, global);
}

/// Like [`register_fn`], but `howto` may try the builtin as a candidate.
fn register_howto_fn(
    vm: &mut Vm,
    name: &str,
    required_args: usize,
    doc: &str,
    f: impl Fn(&mut Vm, &[Handle], Handle) -> EvalResult + 'static,
) {
    let global = vm.global_environment();
    vm.create_and_register_new_builtin(name, f, required_args, doc, true, global);
}

/// Register a builtin that touches the file system. The access check runs on
/// every call, so a VM configured without file-system access still sees the
/// builtin but cannot use it.
fn register_fn_fs_gated(
    vm: &mut Vm,
    name: &str,
    required_args: usize,
    doc: &str,
    f: impl Fn(&mut Vm, &[Handle], Handle) -> EvalResult + 'static,
) {
    let fn_name = name.to_string();
    register_fn(vm, name, required_args, doc, move |vm, args, env| {
        vm.check_file_system_access(&fn_name)?;
        f(vm, args, env)
    });
}

/// "First", "Second", ... for argument positions in messages.
pub(crate) fn ordinal(position: usize) -> String {
    match position {
        1 => "First".to_string(),
        2 => "Second".to_string(),
        3 => "Third".to_string(),
        4 => "Fourth".to_string(),
        5 => "Fifth".to_string(),
        n => format!("{n}th"),
    }
}

pub(crate) fn expect_integer(vm: &Vm, h: Handle, position: usize, name: &str) -> Result<i32, DernError> {
    match vm.get(h) {
        Value::Integer(n) => Ok(*n),
        other => Err(DernError::type_error(
            format!("{} argument to builtin '{name}'", ordinal(position)),
            "integer",
            other.type_name(),
        )),
    }
}

pub(crate) fn expect_string(vm: &Vm, h: Handle, position: usize, name: &str) -> Result<String, DernError> {
    match vm.get(h) {
        Value::String(s) => Ok(s.clone()),
        other => Err(DernError::type_error(
            format!("{} argument to builtin '{name}'", ordinal(position)),
            "string",
            other.type_name(),
        )),
    }
}

/// Text of a value that may take part in textual operations: strings,
/// characters, symbols and numbers. `None` for everything else.
pub(crate) fn textual(vm: &Vm, h: Handle) -> Option<String> {
    match vm.get(h) {
        Value::String(_) | Value::Character(_) | Value::Symbol(_) | Value::Integer(_) | Value::Real(_) => {
            Some(vm.to_plain_string(h))
        }
        _ => None,
    }
}

/// Resolve a possibly negative index against a collection of `len` elements.
pub(crate) fn resolve_index(index: i32, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + i64::from(index)
    } else {
        i64::from(index)
    };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

/// Evaluate `args` one at a time, giving a single result for one argument and
/// a vector of results for several.
pub(crate) fn map_args(
    vm: &mut Vm,
    args: &[Handle],
    mut f: impl FnMut(&mut Vm, Handle) -> EvalResult,
) -> EvalResult {
    if let [single] = args {
        return f(vm, *single);
    }
    let mut out = Vec::with_capacity(args.len());
    for &arg in args {
        out.push(f(vm, arg)?);
    }
    Ok(vm.new_vector(out))
}
