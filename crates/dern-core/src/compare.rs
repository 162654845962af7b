use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use hashbrown::HashSet;

use crate::collections::map_find;
use crate::heap::Heap;
use crate::value::{compare_spurs, with_resolved, Handle, Tag, Value};

/// Structural ordering used by `==`, `<` and friends.
///
/// Integers and reals compare by numeric value. Otherwise values of different
/// tags order by tag, and same-tag containers compare by size first and then
/// element-wise. Environments compare their own frame regardless of binding
/// order. A pair of containers met again while it is still being compared
/// counts as equal, so cyclic values terminate.
pub fn compare(heap: &Heap, a: Handle, b: Handle) -> Ordering {
    Comparison {
        heap,
        active: HashSet::new(),
    }
    .handles(a, b)
}

pub fn equal(heap: &Heap, a: Handle, b: Handle) -> bool {
    compare(heap, a, b) == Ordering::Equal
}

fn compare_f64(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y))
}

fn ptr_id<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

fn is_nested(v: &Value) -> bool {
    matches!(
        v,
        Value::Vector(_)
            | Value::List(_)
            | Value::Queue(_)
            | Value::HashMap(_)
            | Value::Environment(_)
            | Value::Function(_)
    )
}

struct Comparison<'h> {
    heap: &'h Heap,
    active: HashSet<(Handle, Handle)>,
}

impl Comparison<'_> {
    fn handles(&mut self, a: Handle, b: Handle) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let heap = self.heap;
        let (va, vb) = (heap.get(a), heap.get(b));
        if !(is_nested(va) && is_nested(vb)) {
            return self.values(va, vb);
        }
        if !self.active.insert((a, b)) {
            return Ordering::Equal;
        }
        let ordering = self.values(va, vb);
        self.active.remove(&(a, b));
        ordering
    }

    fn seq<'a>(
        &mut self,
        xs: impl ExactSizeIterator<Item = &'a Handle>,
        ys: impl ExactSizeIterator<Item = &'a Handle>,
    ) -> Ordering {
        match xs.len().cmp(&ys.len()) {
            Ordering::Equal => {}
            other => return other,
        }
        for (x, y) in xs.zip(ys) {
            match self.handles(*x, *y) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        Ordering::Equal
    }

    fn values(&mut self, va: &Value, vb: &Value) -> Ordering {
        match (va, vb) {
            (Value::Integer(x), Value::Integer(y)) => return x.cmp(y),
            (x, y) if x.is_number() && y.is_number() => {
                if let (Some(fx), Some(fy)) = (x.as_f64(), y.as_f64()) {
                    return compare_f64(fx, fy);
                }
            }
            _ => {}
        }

        if va.tag() != vb.tag() {
            return va.tag().cmp(&vb.tag());
        }

        let heap = self.heap;
        match (va, vb) {
            (Value::Nil, Value::Nil) => Ordering::Equal,
            (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            (Value::Real(x), Value::Real(y)) => compare_f64(*x, *y),
            (Value::String(x), Value::String(y))
            | (Value::Error(x), Value::Error(y))
            | (Value::MultilineComment(x), Value::MultilineComment(y)) => x.cmp(y),
            (Value::Character(x), Value::Character(y)) => x.cmp(y),
            (Value::Symbol(x), Value::Symbol(y)) => compare_spurs(*x, *y),
            (Value::Vector(x), Value::Vector(y)) => self.seq(x.iter(), y.iter()),
            (Value::List(x), Value::List(y)) => self.seq(x.iter(), y.iter()),
            (Value::Queue(x), Value::Queue(y)) => self.seq(x.items.iter(), y.items.iter()),
            (Value::HashMap(x), Value::HashMap(y)) => {
                match x.len().cmp(&y.len()) {
                    Ordering::Equal => {}
                    other => return other,
                }
                for entry in x.iter() {
                    let Some(i) = map_find(heap, y, entry.key) else {
                        return Ordering::Greater;
                    };
                    match self.handles(entry.value, y.raw()[i].value) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            (Value::Environment(x), Value::Environment(y)) => {
                match x.len().cmp(&y.len()) {
                    Ordering::Equal => {}
                    other => return other,
                }
                for binding in x.iter() {
                    let Some(other) = y.get_local(binding.name) else {
                        return Ordering::Greater;
                    };
                    match self.handles(binding.value, other) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
                Ordering::Equal
            }
            (Value::Function(x), Value::Function(y)) => x
                .name
                .cmp(&y.name)
                .then_with(|| x.formals.len().cmp(&y.formals.len()))
                .then_with(|| {
                    x.formals
                        .iter()
                        .zip(&y.formals)
                        .map(|(a, b)| compare_spurs(*a, *b))
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| x.varargs.cmp(&y.varargs))
                .then_with(|| self.seq(x.body.iter(), y.body.iter()))
                .then_with(|| x.doc.cmp(&y.doc))
                .then_with(|| x.howto_allowed.cmp(&y.howto_allowed)),
            (Value::Special(x), Value::Special(y)) | (Value::Builtin(x), Value::Builtin(y)) => {
                x.id.cmp(&y.id)
            }
            (Value::Port(x), Value::Port(y)) => ptr_id(x).cmp(&ptr_id(y)),
            (Value::CData(x), Value::CData(y)) => ptr_id(&x.payload).cmp(&ptr_id(&y.payload)),
            _ => Ordering::Equal,
        }
    }
}

/// Hash used for hash-map keys. Atoms hash by content (integers and reals by
/// numeric value, so `1` and `1.0` collide as they compare equal); everything
/// else hashes by identity.
pub fn hash_value(heap: &Heap, h: Handle) -> u64 {
    let mut hasher = DefaultHasher::new();
    let value = heap.get(h);
    match value {
        Value::Integer(_) | Value::Real(_) => {
            Tag::Real.hash(&mut hasher);
            let f = value.as_f64().unwrap_or_default();
            let f = if f == 0.0 { 0.0 } else { f };
            f.to_bits().hash(&mut hasher);
        }
        Value::Nil => Tag::Nil.hash(&mut hasher),
        Value::Boolean(b) => {
            Tag::Boolean.hash(&mut hasher);
            b.hash(&mut hasher);
        }
        Value::String(s) | Value::Error(s) | Value::MultilineComment(s) => {
            value.tag().hash(&mut hasher);
            s.hash(&mut hasher);
        }
        Value::Character(c) => {
            Tag::Character.hash(&mut hasher);
            c.hash(&mut hasher);
        }
        Value::Symbol(s) => {
            Tag::Symbol.hash(&mut hasher);
            with_resolved(*s, |name| name.hash(&mut hasher));
        }
        _ => {
            value.tag().hash(&mut hasher);
            h.hash(&mut hasher);
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::value::intern;

    #[test]
    fn test_numeric_cross_type_compare() {
        let mut heap = Heap::new();
        let i = heap.alloc(Value::Integer(2));
        let r = heap.alloc(Value::Real(2.0));
        let big = heap.alloc(Value::Real(2.5));
        assert!(equal(&heap, i, r));
        assert_eq!(compare(&heap, i, big), Ordering::Less);
        assert_eq!(hash_value(&heap, i), hash_value(&heap, r));
    }

    #[test]
    fn test_vectors_compare_by_length_then_elements() {
        let mut heap = Heap::new();
        let a1 = heap.alloc(Value::Integer(1));
        let a2 = heap.alloc(Value::Integer(9));
        let b1 = heap.alloc(Value::Integer(2));
        let long = heap.alloc(Value::Vector(vec![a1, a2]));
        let short = heap.alloc(Value::Vector(vec![b1]));
        let other = heap.alloc(Value::Vector(vec![b1, a1]));
        assert_eq!(compare(&heap, long, short), Ordering::Greater);
        assert_eq!(compare(&heap, long, other), Ordering::Less);
    }

    #[test]
    fn test_environment_equality_ignores_binding_order() {
        let mut heap = Heap::new();
        let one = heap.alloc(Value::Integer(1));
        let two = heap.alloc(Value::Integer(2));
        let other_two = heap.alloc(Value::Integer(2));

        let mut e1 = Environment::new(None);
        e1.define(intern("a"), one, None);
        e1.define(intern("b"), two, None);
        let mut e2 = Environment::new(None);
        e2.define(intern("b"), other_two, None);
        e2.define(intern("a"), one, None);
        let e1 = heap.alloc(Value::Environment(e1));
        let e2 = heap.alloc(Value::Environment(e2));
        assert!(equal(&heap, e1, e2));

        heap.env_mut(e2).unwrap().define(intern("b"), one, None);
        assert!(!equal(&heap, e1, e2));
    }

    #[test]
    fn test_mismatched_tags_order_by_tag() {
        let mut heap = Heap::new();
        let s = heap.alloc(Value::string("zzz"));
        let v = heap.alloc(Value::Vector(vec![]));
        assert_eq!(compare(&heap, s, v), Ordering::Less);
        assert!(!equal(&heap, s, v));
    }

    #[test]
    fn test_self_referential_vectors_compare() {
        let mut heap = Heap::new();
        let one = heap.alloc(Value::Integer(1));
        let other_one = heap.alloc(Value::Integer(1));
        let two = heap.alloc(Value::Integer(2));
        let v = heap.alloc(Value::Vector(vec![one]));
        let w = heap.alloc(Value::Vector(vec![other_one]));
        let x = heap.alloc(Value::Vector(vec![two]));
        for h in [v, w, x] {
            if let Value::Vector(items) = heap.get_mut(h) {
                items.push(h);
            }
        }
        assert!(equal(&heap, v, w));
        assert_eq!(compare(&heap, v, x), Ordering::Less);
        assert_eq!(compare(&heap, x, w), Ordering::Greater);
    }
}
