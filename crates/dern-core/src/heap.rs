use lasso::Spur;

use crate::env::{Binding, Environment};
use crate::value::{Handle, Value};

struct Entry {
    value: Value,
    doc: Option<String>,
    uid: u64,
    marked: bool,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena owning every Dern value.
///
/// Handles are generational: a slot freed by [`Heap::collect`] bumps its
/// generation, so a handle kept past collection is detected instead of
/// silently aliasing a newer value. Dereferencing such a handle is an
/// invariant violation and panics.
#[derive(Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    next_uid: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: Value) -> Handle {
        let uid = self.next_uid;
        self.next_uid += 1;
        self.live += 1;
        let entry = Entry {
            value,
            doc: None,
            uid,
            marked: false,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            Handle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            Handle {
                index,
                generation: 0,
            }
        }
    }

    pub fn contains(&self, h: Handle) -> bool {
        self.slots
            .get(h.index as usize)
            .is_some_and(|s| s.generation == h.generation && s.entry.is_some())
    }

    fn entry(&self, h: Handle) -> &Entry {
        match self.slots.get(h.index as usize) {
            Some(Slot {
                generation,
                entry: Some(e),
            }) if *generation == h.generation => e,
            _ => panic!("dangling handle {h:?}: value was collected while still in use"),
        }
    }

    fn entry_mut(&mut self, h: Handle) -> &mut Entry {
        match self.slots.get_mut(h.index as usize) {
            Some(Slot {
                generation,
                entry: Some(e),
            }) if *generation == h.generation => e,
            _ => panic!("dangling handle {h:?}: value was collected while still in use"),
        }
    }

    pub fn get(&self, h: Handle) -> &Value {
        &self.entry(h).value
    }

    pub fn get_mut(&mut self, h: Handle) -> &mut Value {
        &mut self.entry_mut(h).value
    }

    /// Overwrite the value stored at `h`, returning the old one.
    pub fn replace(&mut self, h: Handle, value: Value) -> Value {
        std::mem::replace(&mut self.entry_mut(h).value, value)
    }

    pub fn doc(&self, h: Handle) -> Option<&str> {
        self.entry(h).doc.as_deref()
    }

    pub fn set_doc(&mut self, h: Handle, doc: Option<String>) {
        self.entry_mut(h).doc = doc;
    }

    /// Unique, never reused identifier of the value at `h`.
    pub fn uid(&self, h: Handle) -> u64 {
        self.entry(h).uid
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn env(&self, h: Handle) -> Option<&Environment> {
        match self.get(h) {
            Value::Environment(env) => Some(env),
            _ => None,
        }
    }

    pub fn env_mut(&mut self, h: Handle) -> Option<&mut Environment> {
        match self.get_mut(h) {
            Value::Environment(env) => Some(env),
            _ => None,
        }
    }

    /// Walk the environment chain from `env` looking for `name`.
    pub fn lookup(&self, env: Handle, name: Spur) -> Option<Handle> {
        self.lookup_binding(env, name).map(|(_, b)| b.value)
    }

    /// Like [`Heap::lookup`] but also reports the frame that holds the binding.
    pub fn lookup_binding(&self, env: Handle, name: Spur) -> Option<(Handle, &Binding)> {
        let mut current = Some(env);
        while let Some(h) = current {
            let frame = self.env(h)?;
            if let Some(b) = frame.binding(name) {
                return Some((h, b));
            }
            current = frame.parent();
        }
        None
    }

    /// Mark everything reachable from `roots` and free the rest. Returns the
    /// number of values reclaimed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Handle>) -> usize {
        let mut work: Vec<Handle> = roots.into_iter().collect();
        while let Some(h) = work.pop() {
            if !self.contains(h) {
                continue;
            }
            let entry = self.entry_mut(h);
            if entry.marked {
                continue;
            }
            entry.marked = true;
            entry.value.children(&mut work);
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            match &mut slot.entry {
                Some(e) if e.marked => e.marked = false,
                Some(_) => {
                    slot.entry = None;
                    slot.generation = slot.generation.wrapping_add(1);
                    self.free.push(index as u32);
                    freed += 1;
                }
                None => {}
            }
        }
        self.live -= freed;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::intern;

    #[test]
    fn test_collect_frees_unreachable_values() {
        let mut heap = Heap::new();
        let kept = heap.alloc(Value::Integer(1));
        let child = heap.alloc(Value::Integer(2));
        let vec = heap.alloc(Value::Vector(vec![child]));
        let garbage = heap.alloc(Value::string("bye"));

        let freed = heap.collect([kept, vec]);
        assert_eq!(freed, 1);
        assert!(heap.contains(child));
        assert!(!heap.contains(garbage));
        assert_eq!(heap.live_count(), 3);
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut heap = Heap::new();
        let old = heap.alloc(Value::Nil);
        heap.collect([]);
        let new = heap.alloc(Value::Boolean(true));
        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert!(!heap.contains(old));
    }

    #[test]
    #[should_panic(expected = "dangling handle")]
    fn test_dangling_handle_panics() {
        let mut heap = Heap::new();
        let h = heap.alloc(Value::Integer(3));
        heap.collect([]);
        heap.get(h);
    }

    #[test]
    fn test_lookup_walks_parent_chain() {
        let mut heap = Heap::new();
        let one = heap.alloc(Value::Integer(1));
        let mut global = Environment::new(None);
        global.define(intern("x"), one, None);
        let global = heap.alloc(Value::Environment(global));
        let child = heap.alloc(Value::Environment(Environment::new(Some(global))));

        assert_eq!(heap.lookup(child, intern("x")), Some(one));
        assert_eq!(heap.lookup(child, intern("missing")), None);
        let (frame, _) = heap.lookup_binding(child, intern("x")).unwrap();
        assert_eq!(frame, global);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let env = heap.alloc(Value::Environment(Environment::new(None)));
        let self_ref = heap.alloc(Value::Vector(vec![env]));
        heap.env_mut(env).unwrap().define(intern("me"), self_ref, None);
        assert_eq!(heap.collect([]), 2);
    }
}
