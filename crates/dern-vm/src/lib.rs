mod config;
mod eval;
mod special_forms;
mod vm;

pub use config::{Config, PreLoader};
pub use eval::{EvalResult, Unwind};
pub use special_forms::SPECIAL_FORM_NAMES;
pub use vm::{NativeFn, RootScope, Vm};

pub use dern_reader::Input;
