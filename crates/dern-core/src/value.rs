use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use hashbrown::HashMap as HashIndex;
use lasso::{Rodeo, Spur};

use crate::env::Environment;
use crate::port::Port;

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

/// Compare two Spurs by their resolved string content (lexicographic).
pub fn compare_spurs(a: Spur, b: Spur) -> std::cmp::Ordering {
    if a == b {
        return std::cmp::Ordering::Equal;
    }
    INTERNER.with(|r| {
        let interner = r.borrow();
        interner.resolve(&a).cmp(interner.resolve(&b))
    })
}

/// Generational index of a value living in the [`Heap`](crate::Heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }
}

/// Value discriminant. The declaration order is the cross-type ordering
/// used by [`compare`](crate::compare).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tag {
    Nil,
    Boolean,
    Integer,
    Real,
    String,
    Character,
    Symbol,
    Error,
    Vector,
    HashMap,
    Queue,
    List,
    Environment,
    Function,
    Special,
    Builtin,
    Port,
    CData,
    MultilineComment,
}

impl Tag {
    pub fn name(self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Boolean => "boolean",
            Tag::Integer => "integer",
            Tag::Real => "real",
            Tag::String => "string",
            Tag::Character => "character",
            Tag::Symbol => "symbol",
            Tag::Error => "error",
            Tag::Vector => "vector",
            Tag::HashMap => "hash map",
            Tag::Queue => "queue",
            Tag::List => "list",
            Tag::Environment => "environment",
            Tag::Function => "function",
            Tag::Special => "special",
            Tag::Builtin => "builtin",
            Tag::Port => "port",
            Tag::CData => "C data",
            Tag::MultilineComment => "multiline comment",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user-defined closure built by `fn`.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Option<String>,
    pub formals: Vec<Spur>,
    /// The last formal collects surplus arguments into a vector.
    pub varargs: bool,
    pub body: Vec<Handle>,
    pub closure: Handle,
    pub doc: Option<String>,
    /// `(name, doc)` pairs in formal order, `...` included when present.
    pub formal_docs: Vec<(String, String)>,
    pub howto_allowed: bool,
}

impl Function {
    /// Render the documentation the way `doc` reports it.
    pub fn describe(&self) -> String {
        let mut out = self.doc.clone().unwrap_or_default();
        if !self.formal_docs.is_empty() {
            out.push_str("\nArguments are:");
            for (name, doc) in &self.formal_docs {
                out.push('\n');
                out.push_str(name);
                out.push_str(" -> ");
                out.push_str(doc);
            }
        }
        out
    }
}

/// Metadata for a host-implemented callable. The callable itself lives in
/// the VM's native table at `id`; identity comparisons use that id.
#[derive(Debug, Clone)]
pub struct Native {
    pub name: String,
    pub id: usize,
    pub doc: String,
    pub required_args: usize,
    pub howto_allowed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MapEntry {
    pub hash: u64,
    pub key: Handle,
    pub value: Handle,
}

/// Hash map storage. Entries are kept in insertion order and enumerated
/// newest first. `by_hash` maps each stored key hash to the raw indices
/// carrying it; key equality needs the heap, so lookups go through
/// [`crate::collections`].
#[derive(Debug, Clone, Default)]
pub struct HashMapValue {
    entries: Vec<MapEntry>,
    by_hash: HashIndex<u64, Vec<usize>>,
}

impl HashMapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enumeration order: most recently inserted key first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &MapEntry> + ExactSizeIterator {
        self.entries.iter().rev()
    }

    /// The `n`th entry in enumeration order.
    pub fn nth(&self, n: usize) -> Option<&MapEntry> {
        self.iter().nth(n)
    }

    pub(crate) fn raw(&self) -> &[MapEntry] {
        &self.entries
    }

    /// Raw indices of the entries whose key hashed to `hash`.
    pub(crate) fn candidates(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        self.by_hash.get(&hash).into_iter().flatten().copied()
    }

    pub(crate) fn push(&mut self, entry: MapEntry) {
        self.by_hash.entry(entry.hash).or_default().push(self.entries.len());
        self.entries.push(entry);
    }

    pub(crate) fn set_value_at(&mut self, raw_index: usize, value: Handle) {
        self.entries[raw_index].value = value;
    }

    /// Later raw indices shift down, so the index is rebuilt.
    pub(crate) fn remove_at(&mut self, raw_index: usize) -> MapEntry {
        let removed = self.entries.remove(raw_index);
        self.by_hash.clear();
        for (i, e) in self.entries.iter().enumerate() {
            self.by_hash.entry(e.hash).or_default().push(i);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_hash.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct Queue {
    pub items: VecDeque<Handle>,
    pub max_length: Option<usize>,
}

impl Queue {
    pub fn with_max_length(max_length: usize) -> Self {
        Queue {
            items: VecDeque::new(),
            max_length: Some(max_length),
        }
    }

    /// Enqueue at the back, dropping the oldest element past the limit.
    pub fn push(&mut self, h: Handle) {
        self.items.push_back(h);
        if let Some(max) = self.max_length {
            while self.items.len() > max {
                self.items.pop_front();
            }
        }
    }

    /// Dequeue the oldest element.
    pub fn pop(&mut self) -> Option<Handle> {
        self.items.pop_front()
    }
}

/// Opaque host payload tagged with the plugin and type it came from.
#[derive(Clone)]
pub struct CData {
    pub plugin_name: String,
    pub type_name: String,
    pub payload: Rc<dyn Any>,
    pub copying_allowed: bool,
}

impl fmt::Debug for CData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CData")
            .field("plugin_name", &self.plugin_name)
            .field("type_name", &self.type_name)
            .field("copying_allowed", &self.copying_allowed)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    Character(char),
    Symbol(Spur),
    Error(String),
    Vector(Vec<Handle>),
    HashMap(HashMapValue),
    Queue(Queue),
    List(VecDeque<Handle>),
    Environment(Environment),
    Function(Function),
    Special(Native),
    Builtin(Native),
    Port(Rc<RefCell<Port>>),
    CData(CData),
    MultilineComment(String),
}

impl Value {
    pub fn symbol(name: &str) -> Value {
        Value::Symbol(intern(name))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Value {
        Value::Error(msg.into())
    }

    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Boolean(_) => Tag::Boolean,
            Value::Integer(_) => Tag::Integer,
            Value::Real(_) => Tag::Real,
            Value::String(_) => Tag::String,
            Value::Character(_) => Tag::Character,
            Value::Symbol(_) => Tag::Symbol,
            Value::Error(_) => Tag::Error,
            Value::Vector(_) => Tag::Vector,
            Value::HashMap(_) => Tag::HashMap,
            Value::Queue(_) => Tag::Queue,
            Value::List(_) => Tag::List,
            Value::Environment(_) => Tag::Environment,
            Value::Function(_) => Tag::Function,
            Value::Special(_) => Tag::Special,
            Value::Builtin(_) => Tag::Builtin,
            Value::Port(_) => Tag::Port,
            Value::CData(_) => Tag::CData,
            Value::MultilineComment(_) => Tag::MultilineComment,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    /// Atoms are copied when bound with `define` or stored into a container,
    /// so rebinding one name never changes another.
    pub fn is_atom(&self) -> bool {
        matches!(
            self,
            Value::Nil
                | Value::Boolean(_)
                | Value::Integer(_)
                | Value::Real(_)
                | Value::String(_)
                | Value::Character(_)
                | Value::Symbol(_)
                | Value::Error(_)
        )
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Builtin(_))
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of integers and reals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(f64::from(*n)),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Error(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Spur> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn is_symbol_named(&self, name: &str) -> bool {
        match self {
            Value::Symbol(s) => with_resolved(*s, |n| n == name),
            _ => false,
        }
    }

    /// Push every handle this value keeps alive.
    pub fn children(&self, out: &mut Vec<Handle>) {
        match self {
            Value::Vector(items) => out.extend_from_slice(items),
            Value::List(items) => out.extend(items.iter().copied()),
            Value::Queue(q) => out.extend(q.items.iter().copied()),
            Value::HashMap(map) => {
                for e in map.raw() {
                    out.push(e.key);
                    out.push(e.value);
                }
            }
            Value::Environment(env) => env.children(out),
            Value::Function(func) => {
                out.push(func.closure);
                out.extend_from_slice(&func.body);
            }
            Value::Nil
            | Value::Boolean(_)
            | Value::Integer(_)
            | Value::Real(_)
            | Value::String(_)
            | Value::Character(_)
            | Value::Symbol(_)
            | Value::Error(_)
            | Value::Special(_)
            | Value::Builtin(_)
            | Value::Port(_)
            | Value::CData(_)
            | Value::MultilineComment(_) => {}
        }
    }
}
