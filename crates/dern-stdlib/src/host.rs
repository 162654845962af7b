use std::path::PathBuf;

use tracing::debug;

use dern_core::{DernError, Handle, Value};
use dern_vm::{EvalResult, Vm};

use crate::register_fn;

fn strings_vector(vm: &mut Vm, items: Vec<String>) -> Handle {
    let handles = items.into_iter().map(|s| vm.new_string(s)).collect();
    vm.new_vector(handles)
}

/// Where the source of library `name` comes from.
enum LibrarySource {
    PreLoaded(String),
    File(PathBuf),
}

fn locate_library(vm: &Vm, name: &str) -> Option<LibrarySource> {
    if let Some(loader) = &vm.config().pre_loader_for_require_src {
        if let Some(src) = loader(name) {
            debug!(library = name, "require resolved by pre-loader");
            return Some(LibrarySource::PreLoaded(src));
        }
    }
    if !vm.config().file_system_access_allowed {
        return None;
    }
    let file_name = format!("{name}.dern");
    vm.config()
        .include_directories
        .iter()
        .cloned()
        .chain(std::iter::once(PathBuf::from(".")))
        .map(|dir| dir.join(&file_name))
        .find(|path| path.is_file())
        .map(|path| {
            debug!(library = name, path = %path.display(), "require resolved from file");
            LibrarySource::File(path)
        })
}

fn require(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if args.len() != 1 {
        return Err(DernError::eval(format!(
            "Builtin 'require' expects one argument. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let name = match vm.get(args[0]) {
        Value::String(_) | Value::Symbol(_) => vm.to_plain_string(args[0]),
        other => {
            return Err(DernError::type_error(
                "First argument to builtin 'require'",
                "symbol or string",
                other.type_name(),
            )
            .into())
        }
    };
    if vm.is_library_loaded(&name) {
        debug!(library = %name, "require skipped, already loaded");
        return Ok(vm.true_value());
    }
    let global = vm.global_environment();
    match locate_library(vm, &name) {
        Some(LibrarySource::PreLoaded(src)) => {
            vm.eval_source(&src, global)?;
        }
        Some(LibrarySource::File(path)) => {
            vm.eval_path(&path, global)?;
        }
        None => {
            return Err(DernError::eval(format!("Builtin 'require' failed to find library '{name}'.")).into())
        }
    }
    vm.mark_library_loaded(&name);
    Ok(vm.true_value())
}

pub fn register(vm: &mut Vm) {
    register_fn(
        vm,
        "host-get-command-line-arguments",
        0,
        "Get vector containing the host command line arguments",
        |vm, args, _| {
            dern_core::check_arity!(args, "host-get-command-line-arguments", 0);
            let items = vm.command_line_arguments().to_vec();
            Ok(strings_vector(vm, items))
        },
    );

    register_fn(
        vm,
        "host-get-environment-variables",
        0,
        "Get vector containing the host environment variables",
        |vm, args, _| {
            dern_core::check_arity!(args, "host-get-environment-variables", 0);
            let items = vm.environment_variables().to_vec();
            Ok(strings_vector(vm, items))
        },
    );

    register_fn(vm, "exit", 0, "Quit and exit the vm execution or REPL", |vm, args, _| {
        let code = match args {
            [] => 0,
            [code] => match vm.get(*code) {
                Value::Integer(n) => *n,
                other => {
                    return Err(DernError::eval(format!(
                        "Builtin 'exit' expects integer argument. Type {} was given.",
                        other.type_name()
                    ))
                    .into())
                }
            },
            _ => return Err(DernError::eval("Builtin 'exit' expects zero or one argument.").into()),
        };
        debug!(code, "exit requested");
        vm.request_exit(code);
        Ok(vm.nil())
    });

    register_fn(
        vm,
        "require",
        1,
        "Ensure that plugin is loaded. Load it if it is not already loaded",
        |vm, args, _| require(vm, args),
    );
}
