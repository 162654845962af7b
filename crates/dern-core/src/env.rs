use hashbrown::HashMap as SpurMap;
use lasso::Spur;

use crate::value::Handle;

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: Spur,
    pub value: Handle,
    pub doc: Option<String>,
}

/// One frame of symbol bindings. The parent link is a handle, so chain
/// walks go through [`Heap::lookup`](crate::Heap::lookup).
#[derive(Debug, Clone, Default)]
pub struct Environment {
    parent: Option<Handle>,
    bindings: Vec<Binding>,
    index: SpurMap<Spur, usize>,
}

impl Environment {
    pub fn new(parent: Option<Handle>) -> Self {
        Environment {
            parent,
            bindings: Vec::new(),
            index: SpurMap::new(),
        }
    }

    pub fn parent(&self) -> Option<Handle> {
        self.parent
    }

    /// Bind `name` in this frame. An existing binding is overwritten together
    /// with its doc string.
    pub fn define(&mut self, name: Spur, value: Handle, doc: Option<String>) {
        match self.index.get(&name) {
            Some(&i) => {
                let b = &mut self.bindings[i];
                b.value = value;
                b.doc = doc;
            }
            None => {
                self.index.insert(name, self.bindings.len());
                self.bindings.push(Binding { name, value, doc });
            }
        }
    }

    /// Replace the value of an existing binding, keeping its doc.
    pub fn set(&mut self, name: Spur, value: Handle) -> bool {
        match self.index.get(&name) {
            Some(&i) => {
                self.bindings[i].value = value;
                true
            }
            None => false,
        }
    }

    pub fn get_local(&self, name: Spur) -> Option<Handle> {
        self.binding(name).map(|b| b.value)
    }

    pub fn binding(&self, name: Spur) -> Option<&Binding> {
        self.index.get(&name).map(|&i| &self.bindings[i])
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
        self.index.clear();
    }

    pub(crate) fn children(&self, out: &mut Vec<Handle>) {
        if let Some(p) = self.parent {
            out.push(p);
        }
        out.extend(self.bindings.iter().map(|b| b.value));
    }
}
