//! Hash map operations and deep copying. Both need the heap to look at
//! element values, so they live here rather than on the value types.

use std::collections::VecDeque;

use hashbrown::HashMap;

use crate::compare::{equal, hash_value};
use crate::env::Environment;
use crate::heap::Heap;
use crate::value::{Handle, HashMapValue, MapEntry, Queue, Value};

/// Raw (insertion order) index of `key` in `map`.
pub fn map_find(heap: &Heap, map: &HashMapValue, key: Handle) -> Option<usize> {
    let hash = hash_value(heap, key);
    map.candidates(hash)
        .find(|&i| equal(heap, map.raw()[i].key, key))
}

fn as_map(heap: &Heap, map: Handle) -> Option<&HashMapValue> {
    match heap.get(map) {
        Value::HashMap(m) => Some(m),
        _ => None,
    }
}

fn as_map_mut(heap: &mut Heap, map: Handle) -> Option<&mut HashMapValue> {
    match heap.get_mut(map) {
        Value::HashMap(m) => Some(m),
        _ => None,
    }
}

pub fn map_get(heap: &Heap, map: Handle, key: Handle) -> Option<Handle> {
    let m = as_map(heap, map)?;
    map_find(heap, m, key).map(|i| m.raw()[i].value)
}

/// Insert or replace. A replaced key keeps its enumeration position.
pub fn map_insert(heap: &mut Heap, map: Handle, key: Handle, value: Handle) {
    let hash = hash_value(heap, key);
    let found = as_map(heap, map).and_then(|m| map_find(heap, m, key));
    if let Some(m) = as_map_mut(heap, map) {
        match found {
            Some(i) => m.set_value_at(i, value),
            None => m.push(MapEntry { hash, key, value }),
        }
    }
}

pub fn map_remove(heap: &mut Heap, map: Handle, key: Handle) -> Option<MapEntry> {
    let found = as_map(heap, map).and_then(|m| map_find(heap, m, key))?;
    as_map_mut(heap, map).map(|m| m.remove_at(found))
}

/// Structurally independent copy of `h`.
///
/// Containers and environment frames are copied recursively. Functions,
/// builtins and specials are cloned while sharing their body and closure;
/// ports and C data share the underlying resource. A container reached
/// twice is copied once, so shared and cyclic structure is reproduced.
pub fn deep_copy(heap: &mut Heap, h: Handle) -> Handle {
    copy_into(heap, h, &mut HashMap::new())
}

fn copy_into(heap: &mut Heap, h: Handle, copies: &mut HashMap<Handle, Handle>) -> Handle {
    if let Some(&done) = copies.get(&h) {
        return done;
    }
    let value = heap.get(h).clone();
    let shell = match &value {
        Value::Vector(_) => Value::Vector(Vec::new()),
        Value::List(_) => Value::List(VecDeque::new()),
        Value::Queue(q) => Value::Queue(Queue {
            items: VecDeque::new(),
            max_length: q.max_length,
        }),
        Value::HashMap(_) => Value::HashMap(HashMapValue::new()),
        Value::Environment(env) => Value::Environment(Environment::new(env.parent())),
        _ => {
            let target = heap.alloc(value);
            copy_doc(heap, h, target);
            return target;
        }
    };
    let target = heap.alloc(shell);
    copies.insert(h, target);
    copy_doc(heap, h, target);

    match value {
        Value::Vector(items) => {
            let items = items.into_iter().map(|e| copy_into(heap, e, copies)).collect();
            heap.replace(target, Value::Vector(items));
        }
        Value::List(items) => {
            let items = items.into_iter().map(|e| copy_into(heap, e, copies)).collect();
            heap.replace(target, Value::List(items));
        }
        Value::Queue(q) => {
            let items = q.items.into_iter().map(|e| copy_into(heap, e, copies)).collect();
            heap.replace(
                target,
                Value::Queue(Queue {
                    items,
                    max_length: q.max_length,
                }),
            );
        }
        Value::HashMap(m) => {
            for entry in m.raw() {
                let k = copy_into(heap, entry.key, copies);
                let v = copy_into(heap, entry.value, copies);
                map_insert(heap, target, k, v);
            }
        }
        Value::Environment(env) => {
            for b in env.iter() {
                let v = copy_into(heap, b.value, copies);
                if let Some(fresh) = heap.env_mut(target) {
                    fresh.define(b.name, v, b.doc.clone());
                }
            }
        }
        _ => {}
    }
    target
}

fn copy_doc(heap: &mut Heap, from: Handle, to: Handle) {
    let doc = heap.doc(from).map(str::to_owned);
    heap.set_doc(to, doc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_insert_replaces_equal_key() {
        let mut heap = Heap::new();
        let map = heap.alloc(Value::HashMap(HashMapValue::new()));
        let k1 = heap.alloc(Value::Integer(1));
        let k1_again = heap.alloc(Value::Integer(1));
        let a = heap.alloc(Value::Character('a'));
        let b = heap.alloc(Value::Character('b'));
        map_insert(&mut heap, map, k1, a);
        map_insert(&mut heap, map, k1_again, b);
        assert_eq!(map_get(&heap, map, k1), Some(b));
        match heap.get(map) {
            Value::HashMap(m) => assert_eq!(m.len(), 1),
            _ => unreachable!(),
        }
        assert!(map_remove(&mut heap, map, k1_again).is_some());
        assert_eq!(map_get(&heap, map, k1), None);
    }

    #[test]
    fn test_lookup_after_removal_in_the_middle() {
        let mut heap = Heap::new();
        let map = heap.alloc(Value::HashMap(HashMapValue::new()));
        let keys: Vec<Handle> = (0..5).map(|i| heap.alloc(Value::Integer(i))).collect();
        for &k in &keys {
            let v = heap.alloc(Value::Character('x'));
            map_insert(&mut heap, map, k, v);
        }
        assert!(map_remove(&mut heap, map, keys[1]).is_some());
        assert_eq!(map_get(&heap, map, keys[1]), None);
        for &k in &keys[2..] {
            assert!(map_get(&heap, map, k).is_some());
        }
        let again = heap.alloc(Value::Real(4.0));
        let Value::HashMap(m) = heap.get(map) else {
            unreachable!()
        };
        assert_eq!(map_find(&heap, m, again), Some(3));
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let mut heap = Heap::new();
        let one = heap.alloc(Value::Integer(1));
        let inner = heap.alloc(Value::Vector(vec![one]));
        let outer = heap.alloc(Value::Vector(vec![inner]));
        let copy = deep_copy(&mut heap, outer);
        assert!(equal(&heap, outer, copy));

        let Value::Vector(items) = heap.get(copy).clone() else {
            unreachable!()
        };
        assert_ne!(items[0], inner);
        if let Value::Vector(v) = heap.get_mut(items[0]) {
            v.clear();
        }
        assert!(!equal(&heap, outer, copy));
    }

    #[test]
    fn test_deep_copy_reproduces_cycles() {
        let mut heap = Heap::new();
        let one = heap.alloc(Value::Integer(1));
        let v = heap.alloc(Value::Vector(vec![one]));
        if let Value::Vector(items) = heap.get_mut(v) {
            items.push(v);
        }
        let copy = deep_copy(&mut heap, v);
        assert_ne!(copy, v);
        let Value::Vector(items) = heap.get(copy).clone() else {
            unreachable!()
        };
        assert_eq!(items.len(), 2);
        assert_ne!(items[0], one);
        assert_eq!(items[1], copy);
        assert!(equal(&heap, v, copy));
    }
}
