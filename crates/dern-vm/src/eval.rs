use tracing::debug;

use dern_core::{resolve, DernError, Environment, Function, Handle, Value};

use crate::vm::Vm;

/// Why an evaluation stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    Error(DernError),
    /// Non-local exit started by the `return` builtin; the nearest function
    /// call turns it back into an ordinary result.
    Return(Handle),
}

impl From<DernError> for Unwind {
    fn from(e: DernError) -> Self {
        Unwind::Error(e)
    }
}

pub type EvalResult = Result<Handle, Unwind>;

impl Vm {
    /// Core evaluator. Symbols are looked up, vectors are applied, every
    /// other value evaluates to itself.
    pub fn evaluate(&mut self, form: Handle, env: Handle) -> EvalResult {
        if self.is_quit() {
            return Ok(self.nil());
        }
        if self.config().debug_mode_on {
            debug!(form = %self.to_string(form), "eval");
        }
        match self.heap.get(form) {
            Value::Symbol(name) => {
                let name = *name;
                match self.heap.lookup(env, name) {
                    Some(h) => Ok(self.root(h)),
                    None => Err(DernError::unbound(resolve(name)).into()),
                }
            }
            Value::Vector(items) => {
                let items = items.clone();
                self.eval_form(form, &items, env)
            }
            _ => Ok(form),
        }
    }

    fn eval_form(&mut self, form: Handle, items: &[Handle], env: Handle) -> EvalResult {
        let scope = self.scope();
        let Some((&head, rest)) = items.split_first() else {
            return Err(DernError::eval("Cannot evaluate empty vector '()'").into());
        };

        let operator = match self.evaluate(head, env) {
            Ok(h) => h,
            Err(Unwind::Error(e)) => {
                return Err(DernError::eval(format!(
                    "Cannot evaluate operator of type 'error' (<error>: {e})"
                ))
                .into())
            }
            Err(ret) => return Err(ret),
        };

        let result = match self.heap.get(operator) {
            Value::Special(native) => {
                let id = native.id;
                self.call_native(id, rest, env)
                    .map_err(|e| self.annotate(e, form))?
            }
            Value::Builtin(_) | Value::Function(_) => {
                let mut args = Vec::with_capacity(rest.len());
                for &item in rest {
                    let arg = self
                        .evaluate(item, env)
                        .and_then(|h| self.reject_error_value(h))
                        .map_err(|e| self.annotate(e, form))?;
                    args.push(arg);
                }
                self.apply(operator, &args, env)
                    .map_err(|e| self.annotate(e, form))?
            }
            other => {
                let type_name = other.type_name();
                return Err(DernError::eval(format!(
                    "Cannot evaluate operator of type '{type_name}' ({})",
                    self.to_string(operator)
                ))
                .into());
            }
        };
        Ok(scope.escape(result))
    }

    /// An error value met in argument position aborts the enclosing form.
    fn reject_error_value(&self, h: Handle) -> EvalResult {
        match self.heap.get(h) {
            Value::Error(msg) => Err(DernError::eval(msg.clone()).into()),
            _ => Ok(h),
        }
    }

    /// Append the "At form" trailer for `form` to an escaping error.
    pub(crate) fn annotate(&self, unwind: Unwind, form: Handle) -> Unwind {
        match unwind {
            Unwind::Error(e) => Unwind::Error(e.with_form(self.to_string(form))),
            ret => ret,
        }
    }

    /// Apply a builtin or function to already evaluated arguments.
    pub fn apply(&mut self, callee: Handle, args: &[Handle], env: Handle) -> EvalResult {
        match self.heap.get(callee) {
            Value::Builtin(native) => {
                let id = native.id;
                self.call_native(id, args, env)
            }
            Value::Function(func) => {
                let func = func.clone();
                self.call_function(&func, args)
            }
            other => Err(DernError::eval(format!(
                "Cannot call value of type '{}' ({})",
                other.type_name(),
                self.to_string(callee)
            ))
            .into()),
        }
    }

    /// Like [`Vm::apply`], but a `return` escaping a builtin becomes the
    /// result. Used where library code calls back into user code.
    pub fn call_callable(&mut self, callee: Handle, args: &[Handle], env: Handle) -> EvalResult {
        match self.apply(callee, args, env) {
            Err(Unwind::Return(h)) => Ok(self.root(h)),
            other => other,
        }
    }

    fn call_function(&mut self, func: &Function, args: &[Handle]) -> EvalResult {
        let scope = self.scope();
        let required = if func.varargs {
            func.formals.len().saturating_sub(1)
        } else {
            func.formals.len()
        };
        let arity_ok = if func.varargs {
            args.len() >= required
        } else {
            args.len() == required
        };
        if !arity_ok {
            return Err(DernError::eval(format!(
                "Function expects {required} arguments. Now {} arguments were given.",
                args.len()
            ))
            .into());
        }

        let mut frame = Environment::new(Some(func.closure));
        for (&name, &arg) in func.formals.iter().zip(args.iter()).take(required) {
            frame.define(name, arg, None);
        }
        if func.varargs {
            if let Some(&rest_name) = func.formals.last() {
                let rest = self.new_vector(args[required..].to_vec());
                frame.define(rest_name, rest, None);
            }
        }
        let call_env = self.alloc(Value::Environment(frame));

        let mut result = self.nil();
        for &form in &func.body {
            let step = self.scope();
            match self.evaluate(form, call_env) {
                Ok(h) => result = step.escape(h),
                Err(Unwind::Return(h)) => {
                    drop(step);
                    return Ok(scope.escape(h));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(scope.escape(result))
    }
}
