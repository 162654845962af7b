use std::any::Any;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use hashbrown::HashSet;
use tracing::{debug, trace, warn};

use dern_core::{
    deep_copy, intern, CData, DernError, Environment, Handle, Heap, Native, Value,
};
use dern_reader::{read_datum, Datum, Input};

use crate::config::Config;
use crate::eval::{EvalResult, Unwind};
use crate::special_forms;

/// Signature shared by builtins and specials. Builtins receive evaluated
/// arguments, specials the raw argument forms; both get the caller's
/// environment.
pub type NativeFn = dyn Fn(&mut Vm, &[Handle], Handle) -> EvalResult;

#[derive(Default)]
struct RootStack {
    handles: RefCell<Vec<Handle>>,
    // number of live scopes; allocations outside any scope are not rooted
    depth: Cell<usize>,
}

/// RAII guard over the root stack.
///
/// Everything rooted after the guard was created is released when it drops.
/// [`RootScope::escape`] keeps one handle alive in the enclosing scope, which
/// is how an evaluation hands its result to the caller.
#[must_use]
pub struct RootScope {
    stack: Rc<RootStack>,
    base: usize,
    keep: Option<Handle>,
}

impl RootScope {
    pub fn escape(mut self, h: Handle) -> Handle {
        self.keep = Some(h);
        h
    }
}

impl Drop for RootScope {
    fn drop(&mut self) {
        let mut handles = self.stack.handles.borrow_mut();
        handles.truncate(self.base);
        if let Some(h) = self.keep {
            handles.push(h);
        }
        self.stack.depth.set(self.stack.depth.get().saturating_sub(1));
    }
}

/// The Dern virtual machine: value arena, root stack, global environment and
/// the table of host-implemented callables.
pub struct Vm {
    pub(crate) heap: Heap,
    roots: Rc<RootStack>,
    global: Handle,
    nil: Handle,
    true_value: Handle,
    false_value: Handle,
    natives: Vec<Rc<NativeFn>>,
    config: Config,
    quit: bool,
    exit_code: i32,
    command_line_arguments: Vec<String>,
    environment_variables: Vec<String>,
    loaded_libraries: HashSet<String>,
    allocs_since_gc: usize,
    prevent_gc: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut heap = Heap::new();
        let nil = heap.alloc(Value::Nil);
        let true_value = heap.alloc(Value::Boolean(true));
        let false_value = heap.alloc(Value::Boolean(false));
        let global = heap.alloc(Value::Environment(Environment::new(None)));
        let mut vm = Vm {
            heap,
            roots: Rc::new(RootStack::default()),
            global,
            nil,
            true_value,
            false_value,
            natives: Vec::new(),
            config,
            quit: false,
            exit_code: 0,
            command_line_arguments: Vec::new(),
            environment_variables: Vec::new(),
            loaded_libraries: HashSet::new(),
            allocs_since_gc: 0,
            prevent_gc: false,
        };
        let nil_sym = intern("nil");
        let true_sym = intern("true");
        let false_sym = intern("false");
        if let Some(env) = vm.heap.env_mut(global) {
            env.define(nil_sym, nil, Some("Represents missing value.".into()));
            env.define(true_sym, true_value, Some("Boolean true value. Opposite of false.".into()));
            env.define(false_sym, false_value, Some("Boolean false value. Opposite of true.".into()));
        }
        special_forms::register(&mut vm);
        vm
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- allocation and rooting ----

    /// Open a root scope. Values allocated while it is alive stay rooted.
    pub fn scope(&self) -> RootScope {
        let stack = Rc::clone(&self.roots);
        let base = stack.handles.borrow().len();
        stack.depth.set(stack.depth.get() + 1);
        RootScope {
            stack,
            base,
            keep: None,
        }
    }

    /// Allocate a value, possibly collecting first.
    ///
    /// Inside a [`RootScope`] the new handle is rooted automatically. Outside
    /// of one (plain host code) it is only safe until the next allocation,
    /// unless the host pushes it with [`Vm::push_value`].
    pub fn alloc(&mut self, value: Value) -> Handle {
        self.allocs_since_gc += 1;
        if !self.prevent_gc && self.allocs_since_gc >= self.config.gc_trigger_limit {
            self.gc();
        }
        let h = self.heap.alloc(value);
        if self.roots.depth.get() > 0 {
            self.root(h);
        }
        h
    }

    /// Root an existing handle in the innermost scope.
    pub fn root(&self, h: Handle) -> Handle {
        self.roots.handles.borrow_mut().push(h);
        h
    }

    /// Atoms are copied so that a later in-place mutation through one name
    /// is never seen through another. Containers are shared.
    pub fn store_value(&mut self, h: Handle) -> Handle {
        let value = self.heap.get(h);
        if value.is_atom() {
            let copy = value.clone();
            let doc = self.heap.doc(h).map(str::to_owned);
            let fresh = self.alloc(copy);
            self.heap.set_doc(fresh, doc);
            fresh
        } else {
            h
        }
    }

    pub fn deep_copy(&mut self, h: Handle) -> Handle {
        let copy = deep_copy(&mut self.heap, h);
        self.root(copy)
    }

    pub fn gc(&mut self) -> usize {
        self.allocs_since_gc = 0;
        let roots: Vec<Handle> = self
            .roots
            .handles
            .borrow()
            .iter()
            .copied()
            .chain([self.global, self.nil, self.true_value, self.false_value])
            .collect();
        let freed = self.heap.collect(roots);
        trace!(freed, live = self.heap.live_count(), "collected");
        freed
    }

    pub fn set_prevent_gc(&mut self, prevent: bool) {
        self.prevent_gc = prevent;
    }

    pub fn set_gc_trigger_limit(&mut self, limit: usize) {
        self.config.gc_trigger_limit = limit.max(1);
    }

    pub fn live_value_count(&self) -> usize {
        self.heap.live_count()
    }

    // ---- host stack protocol ----

    pub fn push_value(&mut self, h: Handle) {
        self.root(h);
    }

    /// Pop `expected` off the root stack. Returns false, leaving the stack
    /// untouched, when it is not the top element.
    pub fn pop_value(&mut self, expected: Handle) -> bool {
        let mut handles = self.roots.handles.borrow_mut();
        match handles.last() {
            Some(top) if *top == expected => {
                handles.pop();
                true
            }
            top => {
                warn!(?expected, ?top, "pop_value does not match the top of the root stack");
                false
            }
        }
    }

    pub fn peek_value(&self) -> Option<Handle> {
        self.roots.handles.borrow().last().copied()
    }

    pub fn stack_len(&self) -> usize {
        self.roots.handles.borrow().len()
    }

    // ---- accessors ----

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn get(&self, h: Handle) -> &Value {
        self.heap.get(h)
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut Value {
        self.heap.get_mut(h)
    }

    pub fn global_environment(&self) -> Handle {
        self.global
    }

    pub fn nil(&self) -> Handle {
        self.nil
    }

    pub fn true_value(&self) -> Handle {
        self.true_value
    }

    pub fn false_value(&self) -> Handle {
        self.false_value
    }

    pub fn boolean(&self, b: bool) -> Handle {
        if b {
            self.true_value
        } else {
            self.false_value
        }
    }

    /// The shared nil/true/false values must never be mutated in place.
    pub fn is_constant(&self, h: Handle) -> bool {
        h == self.nil || h == self.true_value || h == self.false_value
    }

    pub fn to_string(&self, h: Handle) -> String {
        dern_core::to_string(&self.heap, h)
    }

    pub fn to_plain_string(&self, h: Handle) -> String {
        dern_core::to_plain_string(&self.heap, h)
    }

    pub fn type_name(&self, h: Handle) -> &'static str {
        self.heap.get(h).type_name()
    }

    pub fn new_integer(&mut self, n: i32) -> Handle {
        self.alloc(Value::Integer(n))
    }

    pub fn new_real(&mut self, f: f64) -> Handle {
        self.alloc(Value::Real(f))
    }

    pub fn new_string(&mut self, s: impl Into<String>) -> Handle {
        self.alloc(Value::String(s.into()))
    }

    pub fn new_character(&mut self, c: char) -> Handle {
        self.alloc(Value::Character(c))
    }

    pub fn new_symbol(&mut self, name: &str) -> Handle {
        self.alloc(Value::symbol(name))
    }

    pub fn new_vector(&mut self, items: Vec<Handle>) -> Handle {
        self.alloc(Value::Vector(items))
    }

    pub fn new_error(&mut self, msg: impl Into<String>) -> Handle {
        self.alloc(Value::Error(msg.into()))
    }

    /// A fresh, empty environment whose parent is `parent`.
    pub fn new_environment(&mut self, parent: Option<Handle>) -> Handle {
        self.alloc(Value::Environment(Environment::new(parent)))
    }

    pub(crate) fn error_value(&mut self, e: DernError) -> Handle {
        self.alloc(Value::Error(e.to_string()))
    }

    // ---- host metadata ----

    pub fn add_command_line_argument(&mut self, arg: &str) {
        self.command_line_arguments.push(arg.to_string());
    }

    pub fn add_environment_variable(&mut self, var: &str) {
        self.environment_variables.push(var.to_string());
    }

    pub fn command_line_arguments(&self) -> &[String] {
        &self.command_line_arguments
    }

    pub fn environment_variables(&self) -> &[String] {
        &self.environment_variables
    }

    // ---- exit protocol ----

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    pub fn get_exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn request_exit(&mut self, code: i32) {
        self.quit = true;
        self.exit_code = code;
    }

    // ---- natives ----

    fn register_native(&mut self, f: Rc<NativeFn>) -> usize {
        self.natives.push(f);
        self.natives.len() - 1
    }

    pub(crate) fn call_native(&mut self, id: usize, args: &[Handle], env: Handle) -> EvalResult {
        let f = self
            .natives
            .get(id)
            .cloned()
            .ok_or_else(|| DernError::eval(format!("No native function with id {id}")))?;
        f(self, args, env)
    }

    pub(crate) fn register_special(
        &mut self,
        name: &str,
        required_args: usize,
        doc: &str,
        f: impl Fn(&mut Vm, &[Handle], Handle) -> EvalResult + 'static,
    ) {
        let id = self.register_native(Rc::new(f));
        let native = Native {
            name: name.to_string(),
            id,
            doc: doc.to_string(),
            required_args,
            howto_allowed: false,
        };
        let h = self.heap.alloc(Value::Special(native));
        let global = self.global;
        if let Some(env) = self.heap.env_mut(global) {
            env.define(intern(name), h, Some(doc.to_string()));
        }
    }

    /// Bind a host function as a builtin named `name` in `env`. Returns false
    /// when `env` is not an environment.
    pub fn create_and_register_new_builtin(
        &mut self,
        name: &str,
        f: impl Fn(&mut Vm, &[Handle], Handle) -> EvalResult + 'static,
        num_required_args: usize,
        doc: &str,
        howto_allowed: bool,
        env: Handle,
    ) -> bool {
        if self.heap.env(env).is_none() {
            return false;
        }
        let id = self.register_native(Rc::new(f));
        let native = Native {
            name: name.to_string(),
            id,
            doc: doc.to_string(),
            required_args: num_required_args,
            howto_allowed,
        };
        let h = self.heap.alloc(Value::Builtin(native));
        if let Some(frame) = self.heap.env_mut(env) {
            frame.define(intern(name), h, Some(doc.to_string()));
        }
        true
    }

    pub fn create_new_value_c_data(
        &mut self,
        plugin_name: &str,
        type_name: &str,
        payload: Rc<dyn Any>,
        copying_allowed: bool,
    ) -> Handle {
        self.alloc(Value::CData(CData {
            plugin_name: plugin_name.to_string(),
            type_name: type_name.to_string(),
            payload,
            copying_allowed,
        }))
    }

    // ---- reading ----

    /// Turn a read form into heap values. Must run inside a scope.
    pub(crate) fn materialize(&mut self, datum: &Datum) -> Handle {
        match datum {
            Datum::Nil => self.nil,
            Datum::Boolean(b) => self.boolean(*b),
            Datum::Integer(n) => self.alloc(Value::Integer(*n)),
            Datum::Real(f) => self.alloc(Value::Real(*f)),
            Datum::String(s) => self.alloc(Value::String(s.clone())),
            Datum::Character(c) => self.alloc(Value::Character(*c)),
            Datum::Symbol(s) => self.alloc(Value::symbol(s)),
            Datum::MultilineComment(text) => self.alloc(Value::MultilineComment(text.clone())),
            Datum::Vector(items) => {
                let handles = items.iter().map(|d| self.materialize(d)).collect();
                self.alloc(Value::Vector(handles))
            }
        }
    }

    /// Read the next complete form from `input`.
    ///
    /// `None` means the input is exhausted or ends inside a form; a syntax
    /// error comes back as an error value. The result is not rooted.
    pub fn parse(&mut self, input: &mut Input) -> Option<Handle> {
        match read_datum(input) {
            Ok(None) => None,
            Ok(Some(datum)) => {
                let _scope = self.scope();
                Some(self.materialize(&datum))
            }
            Err(e) => Some(self.error_value(e)),
        }
    }

    /// Read and evaluate every form of `text` in `env`, returning the last
    /// result.
    pub fn eval_source(&mut self, text: &str, env: Handle) -> EvalResult {
        let scope = self.scope();
        let mut input = Input::new(text);
        let mut result = self.nil;
        while let Some(datum) = read_datum(&mut input)? {
            if matches!(datum, Datum::MultilineComment(_)) {
                continue;
            }
            let step = self.scope();
            let form = self.materialize(&datum);
            result = self.evaluate(form, env)?;
            drop(step);
            if self.quit {
                break;
            }
        }
        if input.has_pending() {
            return Err(DernError::read("Unexpected end of input").into());
        }
        Ok(scope.escape(result))
    }

    pub fn check_file_system_access(&self, who: &str) -> Result<(), DernError> {
        if self.config.file_system_access_allowed {
            Ok(())
        } else {
            Err(DernError::eval(format!(
                "Builtin '{who}' cannot be used: file system access is not allowed."
            )))
        }
    }

    pub fn eval_path(&mut self, path: &Path, env: Handle) -> EvalResult {
        self.check_file_system_access("read-and-eval-path")?;
        debug!(path = %path.display(), "reading source file");
        let text = std::fs::read_to_string(path).map_err(|e| {
            DernError::io(format!("Cannot read file '{}': {e}", path.display()))
        })?;
        self.eval_source(&text, env)
    }

    // ---- library bookkeeping for `require` ----

    pub fn is_library_loaded(&self, name: &str) -> bool {
        self.loaded_libraries.contains(name)
    }

    pub fn mark_library_loaded(&mut self, name: &str) {
        self.loaded_libraries.insert(name.to_string());
    }

    // ---- public entry points ----

    fn settle(&mut self, result: EvalResult) -> Handle {
        match result {
            Ok(h) | Err(Unwind::Return(h)) => h,
            Err(Unwind::Error(e)) => self.error_value(e),
        }
    }

    /// Evaluate `value` in `env`. Failures come back as error values. The
    /// result is not rooted; push it before allocating again if it must
    /// survive.
    pub fn eval(&mut self, value: Handle, env: Handle) -> Handle {
        let outer = self.scope();
        self.root(value);
        self.root(env);
        let result = self.evaluate(value, env);
        drop(outer);
        self.settle(result)
    }

    pub fn eval_in_global_environment(&mut self, value: Handle) -> Handle {
        let global = self.global;
        self.eval(value, global)
    }

    pub fn read_from_str_and_eval_in_global_environment(&mut self, text: &str) -> Handle {
        let outer = self.scope();
        let global = self.global;
        let result = self.eval_source(text, global);
        drop(outer);
        self.settle(result)
    }

    pub fn read_from_path_and_eval_in_global_environment(&mut self, path: impl AsRef<Path>) -> Handle {
        let outer = self.scope();
        let global = self.global;
        let result = self.eval_path(path.as_ref(), global);
        drop(outer);
        self.settle(result)
    }
}
