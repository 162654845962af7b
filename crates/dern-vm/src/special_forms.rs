use std::cell::Cell;
use std::cmp::Ordering;

use dern_core::{compare, equal, intern, resolve, DernError, Environment, Function, Handle, Spur, Tag, Value};

use crate::eval::{EvalResult, Unwind};
use crate::vm::Vm;

/// Pre-interned symbols that special forms look for among their raw
/// arguments.
struct Keywords {
    as_: Spur,
    in_: Spur,
    from: Spur,
    to: Spur,
    step: Spur,
    default: Spur,
    howto_ok: Spur,
    howto_no: Spur,
    dots: Spur,
}

impl Keywords {
    fn init() -> Self {
        Self {
            as_: intern("as"),
            in_: intern("in"),
            from: intern("from"),
            to: intern("to"),
            step: intern("step"),
            default: intern("default"),
            howto_ok: intern("howto-ok"),
            howto_no: intern("howto-no"),
            dots: intern("..."),
        }
    }
}

thread_local! {
    static KW: Cell<Option<&'static Keywords>> = const { Cell::new(None) };
}

fn keywords() -> &'static Keywords {
    KW.with(|cell| match cell.get() {
        Some(kw) => kw,
        None => {
            let kw: &'static Keywords = Box::leak(Box::new(Keywords::init()));
            cell.set(Some(kw));
            kw
        }
    })
}

/// Names of every special form the VM installs in the global environment.
pub const SPECIAL_FORM_NAMES: &[&str] = &[
    "quote", "if", "select", "define", "while", "for", "and", "or", "eval", "do", "fn", "==",
    "===", "!=", "<", ">", "<=", ">=", "howto",
];

pub(crate) fn register(vm: &mut Vm) {
    vm.register_special("quote", 1, "Quote a value", special_quote);
    vm.register_special(
        "if",
        2,
        "Select value or no value and evaluate it according to boolean test",
        special_if,
    );
    vm.register_special(
        "select",
        2,
        "Select one of values, default, or no value and evaluate it according to boolean test",
        special_select,
    );
    vm.register_special(
        "define",
        3,
        "Bind value to name and document the binding",
        special_define,
    );
    vm.register_special(
        "while",
        2,
        "Evaluate values repeatedly as long as predicate is true",
        special_while,
    );
    vm.register_special(
        "for",
        4,
        "Evaluate values repeatedly over a numeric range or container",
        special_for,
    );
    vm.register_special(
        "and",
        0,
        "Evaluate values until 'false' is found. Any remaining values are not evaluated. \
         Return the last evaluated value. If there are no values, then 'true' is returned.",
        special_and,
    );
    vm.register_special(
        "or",
        0,
        "Evaluate values until 'true' is found. Any remaining values are not evaluated. \
         Return the last evaluated value. If there are no values, then 'false' is returned.",
        special_or,
    );
    vm.register_special(
        "eval",
        1,
        "Evaluate a value (first argument) in the current environment or, if given, \
         in the environment given as the second argument",
        special_eval,
    );
    vm.register_special(
        "do",
        1,
        "Evaluate sequence of values and return the value of the last evaluation",
        special_do,
    );
    vm.register_special("fn", 2, "Create new anonymous function", special_fn);

    vm.register_special(
        "==",
        2,
        "Predicate telling whether all the given values are equal. \
         Evaluates arguments only as long as those are equal.",
        |vm, args, env| compare_chain(vm, "==", args, env, |vm, a, b| equal(vm.heap(), a, b)),
    );
    vm.register_special(
        "===",
        2,
        "Predicate telling whether all the given values are the same value. \
         Evaluates arguments only as long as those are the same.",
        |vm, args, env| compare_chain(vm, "===", args, env, |_, a, b| a == b),
    );
    vm.register_special(
        "!=",
        2,
        "Predicate telling whether the given values are not equal. \
         Evaluates arguments only as long as no equal neighbours are found.",
        |vm, args, env| compare_chain(vm, "!=", args, env, |vm, a, b| !equal(vm.heap(), a, b)),
    );
    vm.register_special(
        "<",
        2,
        "Predicate telling whether every argument is less than the next one",
        |vm, args, env| ordering_chain(vm, "<", args, env, |o| o == Ordering::Less),
    );
    vm.register_special(
        ">",
        2,
        "Predicate telling whether every argument is greater than the next one",
        |vm, args, env| ordering_chain(vm, ">", args, env, |o| o == Ordering::Greater),
    );
    vm.register_special(
        "<=",
        2,
        "Predicate telling whether every argument is less than or equal to the next one",
        |vm, args, env| ordering_chain(vm, "<=", args, env, |o| o != Ordering::Greater),
    );
    vm.register_special(
        ">=",
        2,
        "Predicate telling whether every argument is greater than or equal to the next one",
        |vm, args, env| ordering_chain(vm, ">=", args, env, |o| o != Ordering::Less),
    );
    vm.register_special(
        "howto",
        2,
        "Suggest functions by giving arguments and expected result",
        special_howto,
    );
}

fn fail(msg: String) -> Unwind {
    DernError::eval(msg).into()
}

fn is_keyword(vm: &Vm, h: Handle, kw: Spur) -> bool {
    vm.get(h).as_symbol() == Some(kw)
}

/// Evaluate a test form that must produce a boolean. A function result is
/// called without arguments first.
fn eval_condition(vm: &mut Vm, context: &str, form: Handle, env: Handle) -> Result<bool, Unwind> {
    let mut cond = vm.evaluate(form, env)?;
    if matches!(vm.get(cond), Value::Function(_)) {
        cond = vm.call_callable(cond, &[], env)?;
    }
    match vm.get(cond) {
        Value::Boolean(b) => Ok(*b),
        other => Err(fail(format!(
            "{context} must evaluate into boolean value. Now it evaluated into type {}.",
            other.type_name()
        ))),
    }
}

fn special_quote(vm: &mut Vm, args: &[Handle], _env: Handle) -> EvalResult {
    if args.len() != 1 {
        return Err(fail(format!(
            "Special 'quote' expects one argument. {} arguments were given.",
            args.len()
        )));
    }
    Ok(vm.root(args[0]))
}

fn special_if(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if !(2..=3).contains(&args.len()) {
        return Err(fail(format!(
            "Special 'if' expects two or three arguments. {} arguments were given.",
            args.len()
        )));
    }
    if eval_condition(vm, "First argument to special 'if'", args[0], env)? {
        vm.evaluate(args[1], env)
    } else if let Some(&otherwise) = args.get(2) {
        vm.evaluate(otherwise, env)
    } else {
        Ok(vm.nil())
    }
}

fn special_select(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if args.len() < 2 || args.len() % 2 != 0 {
        return Err(fail(format!(
            "Special 'select' expects an even number of arguments (at least two). \
             {} arguments were given.",
            args.len()
        )));
    }
    let kw = keywords();
    let last_pair = args.len() / 2 - 1;
    for (i, pair) in args.chunks(2).enumerate() {
        let (selector, value) = (pair[0], pair[1]);
        if is_keyword(vm, selector, kw.default) {
            if i != last_pair {
                return Err(fail(
                    "'default' must be the last selector in special 'select'.".to_string(),
                ));
            }
            return vm.evaluate(value, env);
        }
        if eval_condition(vm, "Selector of special 'select'", selector, env)? {
            return vm.evaluate(value, env);
        }
    }
    Ok(vm.nil())
}

fn define_name(vm: &mut Vm, form: Handle, env: Handle) -> Result<Spur, Unwind> {
    if let Some(name) = vm.get(form).as_symbol() {
        return Ok(name);
    }
    let evaluated = vm.evaluate(form, env)?;
    match vm.get(evaluated) {
        Value::Symbol(name) => Ok(*name),
        other => Err(fail(format!(
            "First argument to special 'define' must be symbol or evaluate into symbol. \
             Now it evaluated into type {}.",
            other.type_name()
        ))),
    }
}

/// Turn `(p1 [d1] p2 [d2] …)` into name/doc pairs.
fn parse_formal_docs(vm: &Vm, docvec: Handle) -> Result<Vec<(String, String)>, Unwind> {
    let bad = || {
        fail(
            "Formal documentation of special 'define' must be a vector of symbol and string pairs."
                .to_string(),
        )
    };
    let Value::Vector(items) = vm.get(docvec) else {
        return Err(bad());
    };
    if items.len() % 2 != 0 {
        return Err(bad());
    }
    items
        .chunks(2)
        .map(|pair| match (vm.get(pair[0]), vm.get(pair[1])) {
            (Value::Symbol(name), Value::String(doc)) => Ok((resolve(*name), doc.clone())),
            _ => Err(bad()),
        })
        .collect()
}

fn special_define(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if !matches!(args.len(), 4 | 6 | 8) {
        return Err(fail(format!(
            "Special 'define' expects four, six or eight arguments. {} arguments were given.",
            args.len()
        )));
    }
    let kw = keywords();
    if !is_keyword(vm, args[1], kw.as_) {
        return Err(fail(format!(
            "Second argument to special 'define' must be symbol 'as'. Now it is '{}'.",
            vm.to_string(args[1])
        )));
    }

    let mut rest = &args[3..];
    let mut target = env;
    if let [head @ .., marker, env_form] = rest {
        if is_keyword(vm, *marker, kw.in_) {
            let evaluated = vm.evaluate(*env_form, env)?;
            if vm.heap().env(evaluated).is_none() {
                return Err(fail(format!(
                    "Target of 'in' in special 'define' must evaluate into environment. \
                     Now it evaluated into type {}.",
                    vm.type_name(evaluated)
                )));
            }
            target = evaluated;
            rest = head;
        }
    }

    let name = define_name(vm, args[0], env)?;
    let value = vm.evaluate(args[2], target)?;

    let (doc_form, docvec_form, howto_form) = match rest {
        [] => (None, None, None),
        [doc] => (Some(*doc), None, None),
        [doc, docvec, howto] => (Some(*doc), Some(*docvec), Some(*howto)),
        _ => {
            return Err(fail(
                "Special 'define' expects 'name as value [doc] [docvec howto-ok|howto-no] [in env]'."
                    .to_string(),
            ))
        }
    };

    let doc = match doc_form {
        Some(form) => {
            let d = vm.evaluate(form, env)?;
            match vm.get(d) {
                Value::String(s) => Some(s.clone()),
                other => {
                    return Err(fail(format!(
                        "Documentation given to special 'define' must be string. Now it has type {}.",
                        other.type_name()
                    )))
                }
            }
        }
        None => None,
    };

    let howto = match howto_form {
        Some(h) if is_keyword(vm, h, kw.howto_ok) => Some(true),
        Some(h) if is_keyword(vm, h, kw.howto_no) => Some(false),
        Some(h) => {
            return Err(fail(format!(
                "Special 'define' expects 'howto-ok' or 'howto-no' after the formal documentation. \
                 Now it is '{}'.",
                vm.to_string(h)
            )))
        }
        None => None,
    };

    let formal_docs = match docvec_form {
        Some(form) => {
            let docvec = vm.evaluate(form, env)?;
            let Value::Function(func) = vm.get(value) else {
                return Err(fail(
                    "Formal documentation of special 'define' is only allowed for functions."
                        .to_string(),
                ));
            };
            let docs = parse_formal_docs(vm, docvec)?;
            let mut documented = docs.iter().filter(|(n, _)| n != "...").map(|(n, _)| n.as_str());
            for &formal in &func.formals {
                let formal = resolve(formal);
                if documented.next() != Some(formal.as_str()) {
                    return Err(fail(format!("formal '{formal}' is not mentioned in docvec")));
                }
            }
            Some(docs)
        }
        None => None,
    };

    let stored = vm.store_value(value);
    if let Value::Function(func) = vm.get_mut(stored) {
        if func.name.is_none() {
            func.name = Some(resolve(name));
        }
        if doc.is_some() {
            func.doc = doc.clone();
        }
        if let Some(docs) = formal_docs {
            func.formal_docs = docs;
        }
        if let Some(allowed) = howto {
            func.howto_allowed = allowed;
        }
    }
    if doc.is_some() {
        vm.heap_mut().set_doc(stored, doc.clone());
    }
    if let Some(frame) = vm.heap_mut().env_mut(target) {
        frame.define(name, stored, doc);
    }
    Ok(vm.true_value())
}

fn special_while(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if args.len() < 2 {
        return Err(fail(format!(
            "Special 'while' expects at least two arguments. {} arguments were given.",
            args.len()
        )));
    }
    let mut count: i32 = 0;
    loop {
        let _iteration = vm.scope();
        if !eval_condition(vm, "First argument to special 'while'", args[0], env)? {
            break;
        }
        for &form in &args[1..] {
            vm.evaluate(form, env)?;
        }
        count = count.wrapping_add(1);
        if vm.is_quit() {
            break;
        }
    }
    Ok(vm.new_integer(count))
}

enum ForItem {
    Char(char),
    Element(Handle),
    Pair(Handle, Handle),
    Binding(Spur, Handle),
}

fn special_for(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    let arity_error = |n: usize| {
        fail(format!(
            "Special 'for' expects at least four (for iterating container) or five \
             (for iterating numeric range) arguments. {n} arguments were given."
        ))
    };
    if args.len() < 4 {
        return Err(arity_error(args.len()));
    }
    let Some(var) = vm.get(args[0]).as_symbol() else {
        return Err(fail(format!(
            "First argument to special 'for' must be symbol value. Now it has type {}.",
            vm.type_name(args[0])
        )));
    };
    let kw = keywords();
    if is_keyword(vm, args[1], kw.in_) {
        for_in(vm, var, args, env)
    } else if is_keyword(vm, args[1], kw.from) {
        if args.len() < 5 {
            return Err(arity_error(args.len()));
        }
        for_from(vm, var, args, env)
    } else {
        Err(fail(format!(
            "Second argument to special 'for' must be symbol 'in' or 'from'. Now it has type {}.",
            vm.type_name(args[1])
        )))
    }
}

/// Evaluate one loop body with `var` bound in a fresh child environment.
fn run_iteration(
    vm: &mut Vm,
    var: Spur,
    element: Handle,
    body: &[Handle],
    env: Handle,
) -> Result<(), Unwind> {
    let mut frame = Environment::new(Some(env));
    frame.define(var, element, None);
    let child = vm.alloc(Value::Environment(frame));
    for &form in body {
        vm.evaluate(form, child)?;
    }
    Ok(())
}

fn step_size(vm: &mut Vm, form: Handle, env: Handle, which: &str) -> Result<i32, Unwind> {
    let step = vm.evaluate(form, env)?;
    let Value::Integer(n) = *vm.get(step) else {
        return Err(fail(format!(
            "{which} must be an integer step size. Now it has type {}.",
            vm.type_name(step)
        )));
    };
    if n <= 0 {
        return Err(fail(format!(
            "The 'step' of special 'for' must be larger than zero. Now it is {n}."
        )));
    }
    Ok(n)
}

fn for_in(vm: &mut Vm, var: Spur, args: &[Handle], env: Handle) -> EvalResult {
    let container = vm.evaluate(args[2], env)?;
    let (step, body) = if args.len() > 3 && is_keyword(vm, args[3], keywords().step) {
        if args.len() < 5 {
            return Err(fail(format!(
                "Special 'for' expects at least five arguments for iterating containers with \
                 step. {} arguments were given.",
                args.len()
            )));
        }
        let n = step_size(
            vm,
            args[4],
            env,
            "Fifth argument to special 'for' using 'step' with containers",
        )?;
        (n as usize, &args[5..])
    } else {
        (1, &args[3..])
    };

    let items: Vec<ForItem> = match vm.get(container) {
        Value::String(s) => s.chars().map(ForItem::Char).collect(),
        Value::Vector(v) => v.iter().copied().map(ForItem::Element).collect(),
        Value::List(l) => l.iter().copied().map(ForItem::Element).collect(),
        Value::Queue(q) => q.items.iter().copied().map(ForItem::Element).collect(),
        Value::HashMap(m) => m.iter().map(|e| ForItem::Pair(e.key, e.value)).collect(),
        Value::Environment(e) => e.iter().map(|b| ForItem::Binding(b.name, b.value)).collect(),
        other => {
            return Err(fail(format!(
                "Third argument to special 'for' using 'in' must be a container \
                 (string, vector, hash map or environment) Now it has type {}.",
                other.type_name()
            )))
        }
    };
    // the body may shrink the container while we walk the snapshot
    for item in &items {
        match *item {
            ForItem::Element(h) | ForItem::Binding(_, h) => {
                vm.root(h);
            }
            ForItem::Pair(k, v) => {
                vm.root(k);
                vm.root(v);
            }
            ForItem::Char(_) => {}
        }
    }

    let mut count: i32 = 0;
    for item in items.iter().step_by(step) {
        let _iteration = vm.scope();
        let element = match *item {
            ForItem::Char(c) => vm.new_character(c),
            ForItem::Element(h) => h,
            ForItem::Pair(k, v) => vm.new_vector(vec![k, v]),
            ForItem::Binding(name, v) => {
                let sym = vm.alloc(Value::Symbol(name));
                vm.new_vector(vec![sym, v])
            }
        };
        run_iteration(vm, var, element, body, env)?;
        count = count.wrapping_add(1);
        if vm.is_quit() {
            break;
        }
    }
    Ok(vm.new_integer(count))
}

fn for_from(vm: &mut Vm, var: Spur, args: &[Handle], env: Handle) -> EvalResult {
    let from = vm.evaluate(args[2], env)?;
    let from_tag = vm.get(from).tag();
    if !matches!(from_tag, Tag::Integer | Tag::Real) {
        return Err(fail(format!(
            "Third argument to special 'for' using 'from' must be integer. Now it has type {from_tag}."
        )));
    }
    if !is_keyword(vm, args[3], keywords().to) {
        return Err(fail(format!(
            "Fourth argument to special 'for' using 'from' must be symbol 'to'. Now it is '{}'.",
            vm.to_string(args[3])
        )));
    }
    let to = vm.evaluate(args[4], env)?;
    let to_tag = vm.get(to).tag();
    if to_tag != from_tag {
        return Err(fail(format!(
            "Fifth argument to special 'for' using 'from' must be of same type than the third \
             ({from_tag}). Now it has type {to_tag}."
        )));
    }

    let (step, body) = if args.len() > 5 && is_keyword(vm, args[5], keywords().step) {
        if args.len() < 7 {
            return Err(fail(format!(
                "Special 'for' expects at least seven arguments in numeric form with step. \
                 {} arguments were given.",
                args.len()
            )));
        }
        let n = step_size(
            vm,
            args[6],
            env,
            "Seventh argument to special 'for' using 'step' with numeric iteration",
        )?;
        (n, &args[7..])
    } else {
        (1, &args[5..])
    };

    let start = vm.get(from).as_f64().unwrap_or_default();
    let end = vm.get(to).as_f64().unwrap_or_default();
    let ascending = start <= end;
    let delta = if ascending { f64::from(step) } else { -f64::from(step) };

    let mut count: i32 = 0;
    let mut i: i64 = 0;
    loop {
        let current = start + delta * i as f64;
        if (ascending && current > end) || (!ascending && current < end) {
            break;
        }
        let _iteration = vm.scope();
        let element = if from_tag == Tag::Integer {
            vm.new_integer(current as i32)
        } else {
            vm.new_real(current)
        };
        run_iteration(vm, var, element, body, env)?;
        count = count.wrapping_add(1);
        i += 1;
        if vm.is_quit() {
            break;
        }
    }
    Ok(vm.new_integer(count))
}

/// Only Boolean `false` stops `and` and `or`; `nil` counts as a value.
fn is_false(v: &Value) -> bool {
    matches!(v, Value::Boolean(false))
}

fn special_and(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    let mut last = vm.true_value();
    for &form in args {
        last = vm.evaluate(form, env)?;
        if is_false(vm.get(last)) {
            break;
        }
    }
    Ok(last)
}

fn special_or(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    for &form in args {
        let value = vm.evaluate(form, env)?;
        if !is_false(vm.get(value)) {
            return Ok(value);
        }
    }
    Ok(vm.false_value())
}

fn special_eval(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if !(1..=2).contains(&args.len()) {
        return Err(fail(format!(
            "Special 'eval' expects one or two arguments. {} arguments were given.",
            args.len()
        )));
    }
    let target = match args.get(1) {
        Some(&form) => {
            let t = vm.evaluate(form, env)?;
            if vm.heap().env(t).is_none() {
                return Err(fail(format!(
                    "Second argument to special 'eval' must evaluate into environment. \
                     Now it evaluated into type {}.",
                    vm.type_name(t)
                )));
            }
            t
        }
        None => env,
    };
    let form = vm.evaluate(args[0], env)?;
    vm.evaluate(form, target)
}

fn special_do(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if args.is_empty() {
        return Err(fail("Special 'do' expects at least one argument.".to_string()));
    }
    let mut last = vm.nil();
    for &form in args {
        last = vm.evaluate(form, env)?;
    }
    Ok(last)
}

fn special_fn(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if args.len() < 2 {
        return Err(fail(format!(
            "Special 'fn' expects at least two arguments. {} arguments were given.",
            args.len()
        )));
    }
    let Value::Vector(raw) = vm.get(args[0]) else {
        return Err(fail(format!(
            "First argument to special 'fn' must be vector (formals). Type '{}' was given.",
            vm.type_name(args[0])
        )));
    };
    let dots = keywords().dots;
    let mut formals = Vec::with_capacity(raw.len());
    let mut num_dots = 0;
    let mut after_dots = 0;
    for &h in raw {
        let Some(name) = vm.get(h).as_symbol() else {
            return Err(fail(format!(
                "Formal arguments of special 'fn' must be symbols. Type '{}' was given.",
                vm.type_name(h)
            )));
        };
        if name == dots {
            num_dots += 1;
        } else if num_dots > 0 {
            after_dots += 1;
        } else {
            formals.push(name);
        }
    }
    if num_dots > 1 {
        return Err(fail(format!(
            "Function can have only one formal ... argument for varargs. Now {num_dots} were given."
        )));
    }
    if after_dots > 0 {
        return Err(fail(format!(
            "Function can have no formal arguments after ... for varargs. \
             Now {after_dots} formals were given after ..."
        )));
    }
    let varargs = num_dots == 1;
    if varargs && formals.is_empty() {
        return Err(fail(
            "Formal ... of special 'fn' must follow the formal that collects the varargs."
                .to_string(),
        ));
    }
    let function = Function {
        name: None,
        formals,
        varargs,
        body: args[1..].to_vec(),
        closure: env,
        doc: None,
        formal_docs: Vec::new(),
        howto_allowed: false,
    };
    Ok(vm.alloc(Value::Function(function)))
}

fn compare_chain(
    vm: &mut Vm,
    name: &str,
    args: &[Handle],
    env: Handle,
    holds: impl Fn(&Vm, Handle, Handle) -> bool,
) -> EvalResult {
    if args.len() < 2 {
        return Err(fail(format!("Special '{name}' expects at least two arguments.")));
    }
    let mut prev = vm.evaluate(args[0], env)?;
    for &form in &args[1..] {
        let next = vm.evaluate(form, env)?;
        if !holds(&*vm, prev, next) {
            return Ok(vm.false_value());
        }
        prev = next;
    }
    Ok(vm.true_value())
}

fn ordering_chain(
    vm: &mut Vm,
    name: &str,
    args: &[Handle],
    env: Handle,
    accept: impl Fn(Ordering) -> bool,
) -> EvalResult {
    compare_chain(vm, name, args, env, |vm, a, b| accept(compare(vm.heap(), a, b)))
}

fn special_howto(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if args.len() < 2 {
        return Err(fail(format!(
            "Special 'howto' expects at least two arguments. {} arguments were given.",
            args.len()
        )));
    }
    let mut values = Vec::with_capacity(args.len());
    for &form in args {
        values.push(vm.evaluate(form, env)?);
    }
    let Some((&expected, inputs)) = values.split_last() else {
        return Ok(vm.nil());
    };

    let global = vm.global_environment();
    let candidates: Vec<(Spur, Handle)> = match vm.heap().env(global) {
        Some(frame) => frame
            .iter()
            .filter(|b| match vm.get(b.value) {
                Value::Function(f) => f.howto_allowed,
                Value::Builtin(n) => n.howto_allowed && n.required_args <= inputs.len(),
                _ => false,
            })
            .map(|b| (b.name, b.value))
            .collect(),
        None => Vec::new(),
    };

    let mut found = Vec::new();
    for (name, callee) in candidates {
        let attempt = vm.scope();
        let copies: Vec<Handle> = inputs.iter().map(|&h| vm.deep_copy(h)).collect();
        let matched = match vm.call_callable(callee, &copies, env) {
            Ok(result) => equal(vm.heap(), result, expected),
            Err(_) => false,
        };
        drop(attempt);
        if matched {
            let head = vm.alloc(Value::Symbol(name));
            let mut form = Vec::with_capacity(inputs.len() + 1);
            form.push(head);
            form.extend_from_slice(inputs);
            found.push(vm.new_vector(form));
        }
    }
    Ok(vm.new_vector(found))
}
