#![allow(dead_code)]

use dern::{Value, Vm, VmBuilder};

pub fn vm() -> Vm {
    VmBuilder::new().build()
}

/// Evaluate in the global environment and render the result.
pub fn eval(vm: &mut Vm, src: &str) -> String {
    let h = vm.read_from_str_and_eval_in_global_environment(src);
    vm.to_string(h)
}

/// Evaluate and return the error message, panicking on success.
pub fn eval_err(vm: &mut Vm, src: &str) -> String {
    let h = vm.read_from_str_and_eval_in_global_environment(src);
    match vm.get(h) {
        Value::Error(msg) => msg.clone(),
        _ => panic!("expected error from `{src}`, got {}", vm.to_string(h)),
    }
}

/// Evaluate `src` in a fresh VM and render the result.
pub fn eval_fresh(src: &str) -> String {
    eval(&mut vm(), src)
}
