//! Dern, an embeddable Lisp virtual machine.
//!
//! This crate wires the standard library into a [`Vm`] and re-exports the
//! pieces a host needs.
//!
//! # Quick Start
//!
//! ```no_run
//! use dern::VmBuilder;
//!
//! let mut vm = VmBuilder::new().build();
//! let result = vm.read_from_str_and_eval_in_global_environment("(+ 1 2)");
//! assert_eq!(vm.to_string(result), "3");
//! ```

use std::path::PathBuf;
use std::rc::Rc;

pub use dern_core::{
    intern, resolve, with_resolved, CData, DernError, Handle, Port, PortKind, Tag, Value,
};
pub use dern_reader::Input;
pub use dern_stdlib::register_stdlib;
pub use dern_vm::{Config, EvalResult, NativeFn, PreLoader, RootScope, Unwind, Vm};

/// Builder for configuring and constructing a [`Vm`] with the standard
/// library installed.
pub struct VmBuilder {
    config: Config,
    stdlib: bool,
    command_line_arguments: Vec<String>,
    environment_variables: Vec<String>,
}

impl Default for VmBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VmBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            stdlib: true,
            command_line_arguments: Vec::new(),
            environment_variables: Vec::new(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            ..Self::new()
        }
    }

    /// Log every evaluated form at debug level.
    pub fn with_debug_mode(mut self, on: bool) -> Self {
        self.config.debug_mode_on = on;
        self
    }

    /// Append a directory searched by `require`.
    pub fn with_include_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.include_directories.push(dir.into());
        self
    }

    pub fn with_file_system_access(mut self, allowed: bool) -> Self {
        self.config.file_system_access_allowed = allowed;
        self
    }

    /// Resolve `require` names to source text before touching the file system.
    pub fn with_pre_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        self.config.pre_loader_for_require_src = Some(Rc::new(loader));
        self
    }

    pub fn with_gc_trigger_limit(mut self, limit: usize) -> Self {
        self.config.gc_trigger_limit = limit;
        self
    }

    pub fn with_no_dl_close(mut self, on: bool) -> Self {
        self.config.no_dl_close = on;
        self
    }

    pub fn with_command_line_argument(mut self, arg: impl Into<String>) -> Self {
        self.command_line_arguments.push(arg.into());
        self
    }

    /// Expose a `NAME=value` entry to `host-get-environment-variables`.
    pub fn with_environment_variable(mut self, var: impl Into<String>) -> Self {
        self.environment_variables.push(var.into());
        self
    }

    /// Leave only the special forms installed (default: stdlib enabled).
    pub fn without_stdlib(mut self) -> Self {
        self.stdlib = false;
        self
    }

    pub fn build(self) -> Vm {
        let mut vm = Vm::with_config(self.config);
        if self.stdlib {
            register_stdlib(&mut vm);
        }
        for arg in &self.command_line_arguments {
            vm.add_command_line_argument(arg);
        }
        for var in &self.environment_variables {
            vm.add_environment_variable(var);
        }
        vm
    }
}

/// A VM with default configuration and the standard library installed.
pub fn new_vm() -> Vm {
    VmBuilder::new().build()
}

pub mod prelude {
    pub use crate::{new_vm, Config, DernError, Handle, Value, Vm, VmBuilder};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_installs_stdlib() {
        let mut vm = new_vm();
        let result = vm.read_from_str_and_eval_in_global_environment("(+ 1 2 3)");
        assert_eq!(vm.to_string(result), "6");
    }

    #[test]
    fn test_builder_without_stdlib_keeps_special_forms() {
        let mut vm = VmBuilder::new().without_stdlib().build();
        let result = vm.read_from_str_and_eval_in_global_environment("(if true 1 2)");
        assert_eq!(vm.to_string(result), "1");
        let missing = vm.read_from_str_and_eval_in_global_environment("(+ 1 2)");
        assert!(matches!(vm.get(missing), Value::Error(_)));
    }

    #[test]
    fn test_builder_applies_config() {
        let vm = VmBuilder::new()
            .with_include_directory("lib")
            .with_file_system_access(false)
            .with_gc_trigger_limit(7)
            .with_command_line_argument("first")
            .build();
        assert_eq!(vm.config().include_directories, vec![PathBuf::from("lib")]);
        assert!(!vm.config().file_system_access_allowed);
        assert_eq!(vm.config().gc_trigger_limit, 7);
        assert_eq!(vm.command_line_arguments(), ["first".to_string()]);
    }
}
