use std::fmt::Write;

use crate::heap::Heap;
use crate::value::{with_resolved, Handle, Value};

/// Canonical textual form. Strings, characters and containers render so that
/// reading the text back yields an equal value.
pub fn to_string(heap: &Heap, h: Handle) -> String {
    Renderer::new(heap).render(h, false)
}

/// Like [`to_string`], but a top-level string or character renders as its
/// raw text. Used by `print`, `to-string` and `string-format`.
pub fn to_plain_string(heap: &Heap, h: Handle) -> String {
    Renderer::new(heap).render(h, true)
}

pub fn render_real(f: f64) -> String {
    let s = format!("{f}");
    if s.contains(['.', 'e', 'i', 'N']) {
        s
    } else {
        s + ".0"
    }
}

pub fn render_character(c: char) -> String {
    match char_name(c) {
        Some(name) => format!("|{name}|"),
        None => format!("|{c}|"),
    }
}

/// Named form of characters that cannot appear literally between bars.
pub fn char_name(c: char) -> Option<&'static str> {
    match c {
        '|' => Some("bar"),
        '\n' => Some("newline"),
        '\t' => Some("tab"),
        '[' => Some("string-start"),
        ']' => Some("string-end"),
        _ => None,
    }
}

pub fn render_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('[');
    for c in s.chars() {
        match c {
            '|' => out.push_str("|bar|"),
            ']' => out.push_str("|string-end|"),
            _ => out.push(c),
        }
    }
    out.push(']');
    out
}

struct Renderer<'a> {
    heap: &'a Heap,
    // containers currently being rendered, to cut self references
    active: Vec<Handle>,
}

impl<'a> Renderer<'a> {
    fn new(heap: &'a Heap) -> Self {
        Renderer {
            heap,
            active: Vec::new(),
        }
    }

    fn render(&mut self, h: Handle, plain: bool) -> String {
        let mut out = String::new();
        self.write(&mut out, h, plain);
        out
    }

    fn write_seq(&mut self, out: &mut String, items: impl Iterator<Item = Handle>) {
        for (i, item) in items.enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.write(out, item, false);
        }
    }

    fn write(&mut self, out: &mut String, h: Handle, plain: bool) {
        let heap = self.heap;
        let value = heap.get(h);
        if !value.is_atom() && self.active.contains(&h) {
            out.push_str("...");
            return;
        }
        match value {
            Value::Nil => out.push_str("nil"),
            Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => {
                let _ = write!(out, "{n}");
            }
            Value::Real(f) => out.push_str(&render_real(*f)),
            Value::String(s) if plain => out.push_str(s),
            Value::String(s) => out.push_str(&render_string_literal(s)),
            Value::Character(c) if plain => out.push(*c),
            Value::Character(c) => out.push_str(&render_character(*c)),
            Value::Symbol(s) => with_resolved(*s, |name| out.push_str(name)),
            Value::Error(msg) => {
                let _ = write!(out, "<error>: {msg}");
            }
            Value::MultilineComment(text) => {
                let _ = write!(out, "#!{text}!#");
            }
            Value::Vector(items) => {
                self.active.push(h);
                out.push('(');
                self.write_seq(out, items.iter().copied());
                out.push(')');
                self.active.pop();
            }
            Value::List(items) => {
                self.active.push(h);
                out.push_str("(list ");
                self.write_seq(out, items.iter().copied());
                out.push(')');
                self.active.pop();
            }
            Value::Queue(q) => {
                self.active.push(h);
                out.push_str("(queue ");
                self.write_seq(out, q.items.iter().copied());
                out.push(')');
                self.active.pop();
            }
            Value::HashMap(map) => {
                self.active.push(h);
                out.push_str("(hash-map ");
                let n = map.len();
                for (i, entry) in map.iter().enumerate() {
                    self.write(out, entry.key, false);
                    out.push(' ');
                    self.write(out, entry.value, false);
                    if i + 1 < n {
                        out.push_str("\n          ");
                    }
                }
                out.push(')');
                self.active.pop();
            }
            Value::Environment(env) => {
                self.active.push(h);
                out.push_str("---------- environment ----------\n");
                for b in env.iter() {
                    with_resolved(b.name, |name| out.push_str(name));
                    out.push_str(" -> ");
                    self.write(out, b.value, false);
                    out.push('\n');
                }
                out.push_str("---------------------------------\n");
                self.active.pop();
            }
            Value::Function(func) => out.push_str(func.name.as_deref().unwrap_or("fn")),
            Value::Special(n) | Value::Builtin(n) => out.push_str(&n.name),
            Value::Port(port) => out.push_str(&port.borrow().render()),
            Value::CData(c) => {
                let _ = write!(out, "<C data ({} : {})>", c.plugin_name, c.type_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::map_insert;
    use crate::value::HashMapValue;

    #[test]
    fn test_atoms() {
        let mut heap = Heap::new();
        let s = heap.alloc(Value::string("a|b]c"));
        assert_eq!(to_string(&heap, s), "[a|bar|b|string-end|c]");
        assert_eq!(to_plain_string(&heap, s), "a|b]c");
        let c = heap.alloc(Value::Character('\n'));
        assert_eq!(to_string(&heap, c), "|newline|");
        let r = heap.alloc(Value::Real(3.0));
        assert_eq!(to_string(&heap, r), "3.0");
        let e = heap.alloc(Value::error("bad"));
        assert_eq!(to_string(&heap, e), "<error>: bad");
    }

    #[test]
    fn test_hash_map_renders_newest_first() {
        let mut heap = Heap::new();
        let map = heap.alloc(Value::HashMap(HashMapValue::new()));
        assert_eq!(to_string(&heap, map), "(hash-map )");
        for (k, v) in [(1, 'a'), (2, 'b'), (3, 'c')] {
            let k = heap.alloc(Value::Integer(k));
            let v = heap.alloc(Value::Character(v));
            map_insert(&mut heap, map, k, v);
        }
        assert_eq!(
            to_string(&heap, map),
            "(hash-map 3 |c|\n          2 |b|\n          1 |a|)"
        );
    }

    #[test]
    fn test_self_referencing_vector_terminates() {
        let mut heap = Heap::new();
        let v = heap.alloc(Value::Vector(vec![]));
        if let Value::Vector(items) = heap.get_mut(v) {
            items.push(v);
        }
        assert_eq!(to_string(&heap, v), "(...)");
    }
}
