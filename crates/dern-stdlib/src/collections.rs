//! Container constructors, indexing, in-place mutation and the search and
//! copy algorithms over every sequential and keyed container.

use std::collections::VecDeque;

use dern_core::{equal, map_get, map_insert, map_remove, DernError, Handle, HashMapValue, Queue, Value};
use dern_vm::{EvalResult, Unwind, Vm};

use crate::{expect_integer, map_args, ordinal, register_fn, register_howto_fn, resolve_index, textual};

fn out_of_range(name: &str, len: usize, index: i32) -> DernError {
    DernError::eval(format!(
        "Index to builtin '{name}' is not valid for collection of length {len}. Index is {index}."
    ))
}

fn constant_error(name: &str) -> Unwind {
    DernError::eval(format!("Builtin '{name}' cannot modify constant values nil, true or false.")).into()
}

/// Add key/value pairs into the hash map at `target`. `rest` is either a
/// single hash map or vector of alternating keys and values, or the pairs
/// themselves.
pub(crate) fn merge_into_map(vm: &mut Vm, name: &str, target: Handle, rest: &[Handle]) -> Result<(), Unwind> {
    let pairs: Vec<(Handle, Handle)> = match rest {
        [single] => match vm.get(*single) {
            // oldest first, so the merged map keeps the source's order
            Value::HashMap(m) => m.iter().rev().map(|e| (e.key, e.value)).collect(),
            Value::Vector(items) if items.len() % 2 == 0 => items.chunks(2).map(|c| (c[0], c[1])).collect(),
            other => {
                return Err(DernError::eval(format!(
                    "Builtin '{name}' expects a hash map or key/value pairs to add into a hash map. Now it got type {}.",
                    other.type_name()
                ))
                .into())
            }
        },
        _ if rest.len() % 2 == 0 => rest.chunks(2).map(|c| (c[0], c[1])).collect(),
        _ => {
            return Err(DernError::eval(format!(
                "Builtin '{name}' expects one or two additional arguments for hash map"
            ))
            .into())
        }
    };
    for (k, v) in pairs {
        let k = vm.store_value(k);
        let v = vm.store_value(v);
        map_insert(vm.heap_mut(), target, k, v);
    }
    Ok(())
}

enum Selector {
    Hash,
    Index,
}

enum Found {
    Element(Handle),
    Char(char),
}

/// Shared body of `cp@` and `ln@`. Both hand back the stored element itself,
/// so mutating the result mutates the collection.
fn index_op(vm: &mut Vm, name: &str, args: &[Handle], allow_string: bool) -> EvalResult {
    if !(2..=3).contains(&args.len()) {
        return Err(DernError::eval(format!(
            "Builtin '{name}' expects two or three arguments. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let (coll, key) = (args[0], args[1]);
    let selector = match args.get(2).map(|&h| vm.get(h)) {
        None => None,
        Some(v) if v.is_symbol_named("hash") => Some(Selector::Hash),
        Some(v) if v.is_symbol_named("index") => Some(Selector::Index),
        Some(_) => {
            return Err(DernError::eval(format!(
                "Third argument to builtin '{name}' must be symbol 'hash' or 'index'. Now it is {}.",
                vm.to_string(args[2])
            ))
            .into())
        }
    };

    let found = match vm.get(coll) {
        Value::String(s) => {
            if !allow_string {
                return Err(DernError::eval(format!(
                    "Builtin '{name}' cannot be used with strings. Use 'cp@' instead."
                ))
                .into());
            }
            let index = expect_integer(vm, key, 2, name)?;
            let len = s.chars().count();
            let c = usize::try_from(index)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .ok_or_else(|| out_of_range(name, len, index))?;
            Found::Char(c)
        }
        Value::Vector(items) => {
            let index = expect_integer(vm, key, 2, name)?;
            let i = resolve_index(index, items.len()).ok_or_else(|| out_of_range(name, items.len(), index))?;
            Found::Element(items[i])
        }
        Value::List(items) => {
            let index = expect_integer(vm, key, 2, name)?;
            let i = resolve_index(index, items.len()).ok_or_else(|| out_of_range(name, items.len(), index))?;
            Found::Element(items[i])
        }
        Value::Queue(q) => {
            let index = expect_integer(vm, key, 2, name)?;
            let i = resolve_index(index, q.items.len()).ok_or_else(|| out_of_range(name, q.items.len(), index))?;
            Found::Element(q.items[i])
        }
        Value::HashMap(m) => match selector {
            Some(Selector::Index) => {
                let index = expect_integer(vm, key, 2, name)?;
                let entry = resolve_index(index, m.len())
                    .and_then(|i| m.nth(i))
                    .ok_or_else(|| out_of_range(name, m.len(), index))?;
                Found::Element(entry.value)
            }
            Some(Selector::Hash) | None => Found::Element(map_get(vm.heap(), coll, key).unwrap_or(vm.nil())),
        },
        Value::Environment(env) => {
            let Some(name_sym) = vm.get(key).as_symbol() else {
                return Err(DernError::type_error(
                    format!("Second argument to builtin '{name}' on environment"),
                    "symbol",
                    vm.type_name(key),
                )
                .into());
            };
            Found::Element(env.get_local(name_sym).unwrap_or(vm.nil()))
        }
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin '{name}' cannot be of type {}.",
                other.type_name()
            ))
            .into())
        }
    };
    Ok(match found {
        Found::Element(h) => h,
        Found::Char(c) => vm.new_character(c),
    })
}

fn nth(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if args.len() != 2 {
        return Err(DernError::eval(format!(
            "Builtin 'nth' expects two arguments. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let index = match vm.get(args[0]) {
        Value::Integer(n) => *n,
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin 'nth' must be integer. Type '{}' was given.",
                other.type_name()
            ))
            .into())
        }
    };
    let coll = args[1];
    let type_name = vm.type_name(coll);
    let fail = |len: usize| {
        Unwind::from(DernError::eval(format!(
            "Builtin 'nth' cannot index {type_name} of length {len} from index {index}."
        )))
    };
    let at = usize::try_from(index).ok();
    let found = match vm.get(coll) {
        Value::String(s) => {
            let c = at.and_then(|i| s.chars().nth(i)).ok_or_else(|| fail(s.chars().count()))?;
            Found::Char(c)
        }
        Value::Vector(items) => Found::Element(*at.and_then(|i| items.get(i)).ok_or_else(|| fail(items.len()))?),
        Value::List(items) => Found::Element(*at.and_then(|i| items.get(i)).ok_or_else(|| fail(items.len()))?),
        Value::HashMap(m) => Found::Element(at.and_then(|i| m.nth(i)).ok_or_else(|| fail(m.len()))?.value),
        other => {
            return Err(DernError::eval(format!(
                "Second argument to builtin 'nth' must be string, vector, list or hash map. Type '{}' was given.",
                other.type_name()
            ))
            .into())
        }
    };
    Ok(match found {
        Found::Element(h) => h,
        Found::Char(c) => vm.new_character(c),
    })
}

/// `(= target value)` overwrites the target in place; `(= coll key value)`
/// sets one element.
fn assign(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if !(2..=3).contains(&args.len()) {
        return Err(DernError::eval("Builtin '=' expects two or three arguments.").into());
    }
    let target = args[0];
    if vm.is_constant(target) {
        return Err(constant_error("="));
    }
    if let &[_, source] = args {
        let copy = vm.deep_copy(source);
        let value = vm.get(copy).clone();
        vm.heap_mut().replace(target, value);
        return Ok(target);
    }
    let (key, value) = (args[1], args[2]);
    match vm.get(target) {
        Value::Vector(_) => {
            let index = expect_integer(vm, key, 2, "=")?;
            let Ok(index) = usize::try_from(index) else {
                return Err(out_of_range("=", vm_len(vm, target), index).into());
            };
            let stored = vm.store_value(value);
            let nil = vm.nil();
            if let Value::Vector(items) = vm.get_mut(target) {
                if index >= items.len() {
                    items.resize(index + 1, nil);
                }
                items[index] = stored;
            }
        }
        Value::List(items) => {
            let index = expect_integer(vm, key, 2, "=")?;
            let i = resolve_index(index, items.len()).ok_or_else(|| out_of_range("=", items.len(), index))?;
            let stored = vm.store_value(value);
            if let Value::List(items) = vm.get_mut(target) {
                items[i] = stored;
            }
        }
        Value::String(s) => {
            let index = expect_integer(vm, key, 2, "=")?;
            let len = s.chars().count();
            let i = usize::try_from(index)
                .ok()
                .filter(|&i| i < len)
                .ok_or_else(|| out_of_range("=", len, index))?;
            let Value::Character(c) = *vm.get(value) else {
                return Err(DernError::type_error(
                    "Third argument to builtin '=' on string",
                    "character",
                    vm.type_name(value),
                )
                .into());
            };
            if let Value::String(s) = vm.get_mut(target) {
                *s = s
                    .chars()
                    .enumerate()
                    .map(|(j, old)| if j == i { c } else { old })
                    .collect();
            }
        }
        Value::HashMap(_) => {
            let k = vm.store_value(key);
            let v = vm.store_value(value);
            map_insert(vm.heap_mut(), target, k, v);
        }
        Value::Environment(_) => {
            let Some(name) = vm.get(key).as_symbol() else {
                return Err(DernError::type_error(
                    "Second argument to builtin '=' on environment",
                    "symbol",
                    vm.type_name(key),
                )
                .into());
            };
            let v = vm.store_value(value);
            if let Some(env) = vm.heap_mut().env_mut(target) {
                if !env.set(name, v) {
                    env.define(name, v, None);
                }
            }
        }
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin '=' cannot be of type '{}' when three arguments are given.",
                other.type_name()
            ))
            .into())
        }
    }
    Ok(target)
}

fn vm_len(vm: &Vm, h: Handle) -> usize {
    match vm.get(h) {
        Value::String(s) => s.chars().count(),
        Value::Symbol(s) => dern_core::with_resolved(*s, |n| n.chars().count()),
        Value::Vector(items) => items.len(),
        Value::HashMap(m) => m.len(),
        Value::List(items) => items.len(),
        Value::Queue(q) => q.items.len(),
        Value::Environment(env) => env.len(),
        _ => 1,
    }
}

fn add_in_place(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    let Some((&target, rest)) = args.split_first() else {
        return Err(DernError::eval("Builtin '+=' expects at least one argument.").into());
    };
    if vm.is_constant(target) {
        return Err(constant_error("+="));
    }
    match vm.get(target).clone() {
        Value::Integer(_) | Value::Real(_) | Value::Character(_) => {
            for (i, &arg) in rest.iter().enumerate() {
                step_number(vm, "+=", target, arg, i + 2, 1.0)?;
            }
        }
        Value::String(mut s) => {
            for &arg in rest {
                s.push_str(&vm.to_plain_string(arg));
            }
            vm.heap_mut().replace(target, Value::String(s));
        }
        Value::Symbol(_) => {
            let mut s = vm.to_plain_string(target);
            for &arg in rest {
                s.push_str(&vm.to_plain_string(arg));
            }
            vm.heap_mut().replace(target, Value::symbol(&s));
        }
        Value::Vector(_) | Value::List(_) | Value::Queue(_) => {
            for &arg in rest {
                let stored = vm.store_value(arg);
                match vm.get_mut(target) {
                    Value::Vector(items) => items.push(stored),
                    Value::List(items) => items.push_back(stored),
                    Value::Queue(q) => q.push(stored),
                    _ => {}
                }
            }
        }
        Value::HashMap(_) => merge_into_map(vm, "+=", target, rest)?,
        Value::Environment(_) => {
            for (i, &arg) in rest.iter().enumerate() {
                let pair = match vm.get(arg) {
                    Value::Vector(items) if items.len() == 2 => (items[0], items[1]),
                    other => {
                        return Err(DernError::eval(format!(
                            "{} argument to builtin '+=' on environment must be a (name value) pair. Now it has type '{}'.",
                            ordinal(i + 2),
                            other.type_name()
                        ))
                        .into())
                    }
                };
                let Some(name) = vm.get(pair.0).as_symbol() else {
                    return Err(DernError::type_error(
                        "Name in a pair given to builtin '+='",
                        "symbol",
                        vm.type_name(pair.0),
                    )
                    .into());
                };
                let v = vm.store_value(pair.1);
                if let Some(env) = vm.heap_mut().env_mut(target) {
                    env.define(name, v, None);
                }
            }
        }
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin '+=' cannot be of type '{}'.",
                other.type_name()
            ))
            .into())
        }
    }
    Ok(target)
}

/// Add (`sign` 1.0) or subtract (`sign` -1.0) a number in place. Integer
/// targets stay integers and wrap.
fn step_number(vm: &mut Vm, name: &str, target: Handle, arg: Handle, position: usize, sign: f64) -> Result<(), Unwind> {
    let amount = match vm.get(arg) {
        Value::Integer(n) => f64::from(*n),
        Value::Real(f) => *f,
        Value::Character(c) => f64::from(u32::from(*c)),
        other => {
            return Err(DernError::eval(format!(
                "{} argument to builtin '{name}' must be a number or character. Now it has type '{}'.",
                ordinal(position),
                other.type_name()
            ))
            .into())
        }
    };
    let int_amount = match vm.get(arg) {
        Value::Integer(n) => Some(*n),
        Value::Character(c) => i32::try_from(u32::from(*c)).ok(),
        _ => None,
    };
    match vm.get_mut(target) {
        Value::Integer(n) => {
            *n = match int_amount {
                Some(k) if sign > 0.0 => n.wrapping_add(k),
                Some(k) => n.wrapping_sub(k),
                None => (f64::from(*n) + sign * amount) as i32,
            }
        }
        Value::Real(f) => *f += sign * amount,
        Value::Character(c) => {
            let code = f64::from(u32::from(*c)) + sign * amount;
            *c = char::from_u32(code as u32).ok_or_else(|| {
                DernError::eval(format!("Builtin '{name}' cannot move character past the valid range."))
            })?;
        }
        _ => {}
    }
    Ok(())
}

fn subtract_in_place(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    let Some((&target, rest)) = args.split_first() else {
        return Err(DernError::eval("Builtin '-=' expects at least one argument.").into());
    };
    if vm.is_constant(target) {
        return Err(constant_error("-="));
    }
    match vm.get(target).clone() {
        Value::Integer(_) | Value::Real(_) | Value::Character(_) => {
            for (i, &arg) in rest.iter().enumerate() {
                step_number(vm, "-=", target, arg, i + 2, -1.0)?;
            }
        }
        Value::String(_) | Value::Symbol(_) => {
            let mut s = vm.to_plain_string(target);
            for (i, &arg) in rest.iter().enumerate() {
                let Some(needle) = textual(vm, arg) else {
                    return Err(DernError::eval(format!(
                        "{} argument to builtin '-=' cannot be of type '{}' when removing from text.",
                        ordinal(i + 2),
                        vm.type_name(arg)
                    ))
                    .into());
                };
                if !needle.is_empty() {
                    s = s.replace(&needle, "");
                }
            }
            let updated = if matches!(vm.get(target), Value::Symbol(_)) {
                Value::symbol(&s)
            } else {
                Value::String(s)
            };
            vm.heap_mut().replace(target, updated);
        }
        Value::Vector(_) | Value::List(_) | Value::Queue(_) => {
            remove_where(vm, target, |vm, item| rest.iter().any(|&r| equal(vm.heap(), item, r)));
        }
        Value::HashMap(_) => {
            for &key in rest {
                map_remove(vm.heap_mut(), target, key);
            }
        }
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin '-=' cannot be of type '{}'.",
                other.type_name()
            ))
            .into())
        }
    }
    Ok(target)
}

/// Drop every element of a vector, list or queue matching `pred`.
fn remove_where(vm: &mut Vm, target: Handle, pred: impl Fn(&Vm, Handle) -> bool) {
    let shared: &Vm = vm;
    let doomed: Vec<bool> = match shared.get(target) {
        Value::Vector(items) => items.iter().map(|&h| pred(shared, h)).collect(),
        Value::List(items) => items.iter().map(|&h| pred(shared, h)).collect(),
        Value::Queue(q) => q.items.iter().map(|&h| pred(shared, h)).collect(),
        _ => return,
    };
    let mut flags = doomed.into_iter();
    match vm.get_mut(target) {
        Value::Vector(items) => items.retain(|_| !flags.next().unwrap_or(false)),
        Value::List(items) => items.retain(|_| !flags.next().unwrap_or(false)),
        Value::Queue(q) => q.items.retain(|_| !flags.next().unwrap_or(false)),
        _ => {}
    }
}

fn remove_identical(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    let Some((&target, rest)) = args.split_first() else {
        return Err(DernError::eval("Builtin '-==' expects at least one argument.").into());
    };
    match vm.get(target) {
        Value::Vector(_) | Value::List(_) | Value::Queue(_) => {
            remove_where(vm, target, |_, item| rest.contains(&item));
        }
        Value::HashMap(m) => {
            let keys: Vec<Handle> = m
                .iter()
                .filter(|e| rest.contains(&e.key) || rest.contains(&e.value))
                .map(|e| e.key)
                .collect();
            for key in keys {
                map_remove(vm.heap_mut(), target, key);
            }
        }
        other => {
            return Err(DernError::eval(format!(
                "Builtin '-==' cannot remove values from a value of type '{}'.",
                other.type_name()
            ))
            .into())
        }
    }
    Ok(target)
}

fn pop(vm: &mut Vm, name: &str, args: &[Handle], from_back: bool) -> EvalResult {
    if args.len() != 1 {
        return Err(DernError::eval(format!(
            "Builtin '{name}' expects exactly one argument. Now {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let target = args[0];
    let drop_char = |s: &str| -> String {
        let mut chars = s.chars();
        if from_back {
            chars.next_back();
        } else {
            chars.next();
        }
        chars.as_str().to_string()
    };
    match vm.get_mut(target) {
        Value::String(s) => *s = drop_char(s),
        Value::Symbol(sym) => {
            let trimmed = dern_core::with_resolved(*sym, drop_char);
            *sym = dern_core::intern(&trimmed);
        }
        Value::Vector(items) => {
            if from_back {
                items.pop();
            } else if !items.is_empty() {
                items.remove(0);
            }
        }
        Value::List(items) => {
            if from_back {
                items.pop_back();
            } else {
                items.pop_front();
            }
        }
        Value::Queue(q) if from_back => {
            q.pop();
        }
        other => {
            let expected = if from_back {
                "string, symbol, vector, list or queue"
            } else {
                "string, symbol, vector or list"
            };
            let got = other.type_name();
            return Err(DernError::type_error(format!("Builtin '{name}'"), expected, got).into());
        }
    }
    Ok(target)
}

/// `(copy value [predicate])`. The predicate sees `(element index)` and
/// keeps the element when it returns true.
fn copy(vm: &mut Vm, args: &[Handle], env: Handle) -> EvalResult {
    if !(1..=2).contains(&args.len()) {
        return Err(DernError::eval(format!(
            "Builtin 'copy' expects one or two arguments. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let source = args[0];
    if let Value::CData(c) = vm.get(source) {
        if !c.copying_allowed {
            return Err(DernError::eval(format!("C data '{}' cannot be copied.", c.type_name)).into());
        }
    }
    let Some(&pred) = args.get(1) else {
        return Ok(vm.deep_copy(source));
    };
    if !vm.get(pred).is_callable() {
        return Err(DernError::type_error(
            "Second argument to builtin 'copy'",
            "function or builtin",
            vm.type_name(pred),
        )
        .into());
    }

    let keeps = |vm: &mut Vm, element: Handle, index: usize| -> Result<bool, Unwind> {
        let idx = vm.new_integer(i32::try_from(index).unwrap_or(i32::MAX));
        let verdict = vm.call_callable(pred, &[element, idx], env)?;
        match vm.get(verdict) {
            Value::Boolean(b) => Ok(*b),
            Value::Error(msg) => Err(DernError::eval(msg.clone()).into()),
            _ => Ok(false),
        }
    };

    match vm.get(source).clone() {
        Value::String(s) => {
            let mut out = String::new();
            for (i, c) in s.chars().enumerate() {
                let ch = vm.new_character(c);
                if keeps(vm, ch, i)? {
                    out.push(c);
                }
            }
            Ok(vm.new_string(out))
        }
        Value::Vector(items) => {
            let kept = filter_copy(vm, items.iter().copied(), keeps)?;
            Ok(vm.new_vector(kept))
        }
        Value::List(items) => {
            let kept = filter_copy(vm, items.iter().copied(), keeps)?;
            Ok(vm.alloc(Value::List(kept.into())))
        }
        Value::Queue(q) => {
            let kept = filter_copy(vm, q.items.iter().copied(), keeps)?;
            Ok(vm.alloc(Value::Queue(Queue {
                items: kept.into(),
                max_length: q.max_length,
            })))
        }
        Value::HashMap(m) => {
            let target = vm.alloc(Value::HashMap(HashMapValue::new()));
            // walk oldest first so the copy enumerates like the source
            for (i, entry) in m.iter().rev().enumerate() {
                let pair = vm.new_vector(vec![entry.key, entry.value]);
                if keeps(vm, pair, i)? {
                    let k = vm.deep_copy(entry.key);
                    let v = vm.deep_copy(entry.value);
                    map_insert(vm.heap_mut(), target, k, v);
                }
            }
            Ok(target)
        }
        other => Err(DernError::eval(format!(
            "Builtin 'copy' cannot filter a value of type '{}'.",
            other.type_name()
        ))
        .into()),
    }
}

fn filter_copy(
    vm: &mut Vm,
    items: impl Iterator<Item = Handle>,
    keeps: impl Fn(&mut Vm, Handle, usize) -> Result<bool, Unwind>,
) -> Result<Vec<Handle>, Unwind> {
    let mut kept = Vec::new();
    for (i, item) in items.enumerate() {
        if keeps(vm, item, i)? {
            kept.push(vm.deep_copy(item));
        }
    }
    Ok(kept)
}

/// Every character index where `needle` starts in `haystack`.
fn text_positions(haystack: &str, needle: &str) -> Vec<i32> {
    if needle.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = haystack.chars().collect();
    let pattern: Vec<char> = needle.chars().collect();
    chars
        .windows(pattern.len())
        .enumerate()
        .filter(|(_, w)| *w == pattern.as_slice())
        .map(|(i, _)| i32::try_from(i).unwrap_or(i32::MAX))
        .collect()
}

fn find_one(vm: &mut Vm, haystack: Handle, needle: Handle) -> EvalResult {
    let positions: Vec<i32> = match vm.get(haystack) {
        Value::String(_) | Value::Symbol(_) => {
            let Some(pattern) = textual(vm, needle) else {
                return Err(DernError::eval(format!(
                    "Type '{}' cannot be searched from type '{}'",
                    vm.type_name(needle),
                    vm.type_name(haystack)
                ))
                .into());
            };
            text_positions(&vm.to_plain_string(haystack), &pattern)
        }
        Value::Vector(items) => positions_of(vm, items.iter().copied(), needle),
        Value::List(items) => positions_of(vm, items.iter().copied(), needle),
        Value::Queue(q) => positions_of(vm, q.items.iter().copied(), needle),
        Value::HashMap(_) => return Ok(map_get(vm.heap(), haystack, needle).unwrap_or(vm.nil())),
        Value::Environment(env) => {
            let Some(name) = vm.get(needle).as_symbol() else {
                return Err(DernError::eval(format!(
                    "Type '{}' cannot be searched from type 'environment'",
                    vm.type_name(needle)
                ))
                .into());
            };
            return Ok(env.get_local(name).unwrap_or(vm.nil()));
        }
        other => {
            return Err(DernError::eval(format!(
                "First argument to builtin 'find' cannot be of type '{}'.",
                other.type_name()
            ))
            .into())
        }
    };
    let found = positions.into_iter().map(|i| vm.new_integer(i)).collect();
    Ok(vm.new_vector(found))
}

fn positions_of(vm: &Vm, items: impl Iterator<Item = Handle>, needle: Handle) -> Vec<i32> {
    items
        .enumerate()
        .filter(|&(_, h)| equal(vm.heap(), h, needle))
        .map(|(i, _)| i32::try_from(i).unwrap_or(i32::MAX))
        .collect()
}

fn split(vm: &mut Vm, args: &[Handle]) -> EvalResult {
    if args.len() != 2 {
        return Err(DernError::eval(format!(
            "Builtin 'split' expects two arguments. {} arguments were given.",
            args.len()
        ))
        .into());
    }
    let (coll, separator) = (args[0], args[1]);
    match vm.get(coll).clone() {
        Value::String(s) => {
            let Some(sep) = textual(vm, separator) else {
                return Err(DernError::type_error(
                    "Second argument to builtin 'split' on string",
                    "character or string",
                    vm.type_name(separator),
                )
                .into());
            };
            let pieces: Vec<String> = if sep.is_empty() {
                s.chars().map(String::from).collect()
            } else {
                s.split(sep.as_str()).filter(|p| !p.is_empty()).map(str::to_string).collect()
            };
            let handles = pieces.into_iter().map(|p| vm.new_string(p)).collect();
            Ok(vm.new_vector(handles))
        }
        Value::Vector(items) => {
            let mut groups: Vec<Vec<Handle>> = vec![Vec::new()];
            for item in items {
                if equal(vm.heap(), item, separator) {
                    groups.push(Vec::new());
                } else if let Some(last) = groups.last_mut() {
                    last.push(item);
                }
            }
            let handles = groups
                .into_iter()
                .filter(|g| !g.is_empty())
                .map(|g| vm.new_vector(g))
                .collect();
            Ok(vm.new_vector(handles))
        }
        other => Err(DernError::eval(format!(
            "First argument to builtin 'split' cannot be of type '{}'.",
            other.type_name()
        ))
        .into()),
    }
}

pub fn register(vm: &mut Vm) {
    register_howto_fn(vm, "vector", 0, "Create new vector of the given values.", |vm, args, _| {
        let items = args.iter().map(|&a| vm.store_value(a)).collect();
        Ok(vm.new_vector(items))
    });

    register_fn(vm, "hash-map", 0, "Create new hash map", |vm, args, _| {
        if args.len() % 2 != 0 {
            return Err(DernError::eval(format!(
                "Builtin 'hash-map' expects key here. {} arguments leave the last key without a value.",
                args.len()
            ))
            .into());
        }
        let map = vm.alloc(Value::HashMap(HashMapValue::new()));
        merge_into_map(vm, "hash-map", map, args)?;
        Ok(map)
    });

    register_fn(vm, "list", 0, "Create new list", |vm, args, _| {
        let items: VecDeque<Handle> = args.iter().map(|&a| vm.store_value(a)).collect();
        Ok(vm.alloc(Value::List(items)))
    });

    register_fn(vm, "queue", 0, "Create new queue", |vm, args, _| {
        let items = args.iter().map(|&a| vm.store_value(a)).collect();
        Ok(vm.alloc(Value::Queue(Queue { items, max_length: None })))
    });

    register_fn(
        vm,
        "queue-with-max-length",
        1,
        "Create new queue with maximum length",
        |vm, args, _| {
            let Some((&limit, rest)) = args.split_first() else {
                return Err(DernError::eval("Builtin 'queue-with-max-length' expects at least one argument.").into());
            };
            let max = expect_integer(vm, limit, 1, "queue-with-max-length")?;
            let Ok(max) = usize::try_from(max) else {
                return Err(DernError::eval(format!(
                    "First argument to builtin 'queue-with-max-length' cannot be negative. Now it is {max}."
                ))
                .into());
            };
            let mut queue = Queue::with_max_length(max);
            for &arg in rest {
                queue.push(vm.store_value(arg));
            }
            Ok(vm.alloc(Value::Queue(queue)))
        },
    );

    register_fn(
        vm,
        "cp@",
        2,
        "Get copy of a value in a given collection at the given index",
        |vm, args, _| index_op(vm, "cp@", args, true),
    );

    register_fn(
        vm,
        "ln@",
        2,
        "Get reference to a value in a given collection at the given index",
        |vm, args, _| index_op(vm, "ln@", args, false),
    );

    register_fn(vm, "nth", 2, "Get the value at the given index of a string, vector or hash map", |vm, args, _| {
        nth(vm, args)
    });

    register_fn(
        vm,
        "=",
        2,
        "Set atomic values, or elements of collections (vector, map, string) at the given index",
        |vm, args, _| assign(vm, args),
    );

    register_fn(vm, "+=", 1, "Add value or values into the first argument (modify it)", |vm, args, _| {
        add_in_place(vm, args)
    });

    register_fn(
        vm,
        "-=",
        1,
        "Subtract value or values from the first argument (modify it)",
        |vm, args, _| subtract_in_place(vm, args),
    );

    register_fn(
        vm,
        "-==",
        1,
        "Remove from supported collection a value that has the same unique id as the argument",
        |vm, args, _| remove_identical(vm, args),
    );

    register_fn(vm, "pop-back", 1, "Remove the last value from supported collection.", |vm, args, _| {
        pop(vm, "pop-back", args, true)
    });

    register_fn(vm, "pop-front", 1, "Remove the first value from supported collection.", |vm, args, _| {
        pop(vm, "pop-front", args, false)
    });

    register_fn(vm, "copy", 1, "Create full or partial copy of a value", copy);

    register_fn(vm, "find", 2, "Find value from collection", |vm, args, _| {
        let Some((&haystack, needles)) = args.split_first().filter(|(_, n)| !n.is_empty()) else {
            return Err(DernError::eval(format!(
                "Builtin 'find' expects at least two arguments. {} arguments was given.",
                args.len()
            ))
            .into());
        };
        map_args(vm, needles, |vm, needle| find_one(vm, haystack, needle))
    });

    register_fn(vm, "split", 2, "Split a collection by value", |vm, args, _| split(vm, args));

    register_howto_fn(vm, "len", 1, "Get length of a value or values", |vm, args, _| {
        if args.is_empty() {
            return Err(DernError::eval("Builtin 'len' expects at least one argument.").into());
        }
        map_args(vm, args, |vm, h| {
            let n = vm_len(vm, h);
            Ok(vm.new_integer(i32::try_from(n).unwrap_or(i32::MAX)))
        })
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_positions() {
        assert_eq!(text_positions("abcabc", "bc"), vec![1, 4]);
        assert_eq!(text_positions("aaa", "aa"), vec![0, 1]);
        assert_eq!(text_positions("äbä", "ä"), vec![0, 2]);
        assert!(text_positions("abc", "").is_empty());
        assert!(text_positions("ab", "abc").is_empty());
    }
}
