pub mod collections;
pub mod compare;
pub mod env;
pub mod error;
pub mod heap;
pub mod port;
pub mod render;
pub mod value;

pub use collections::{deep_copy, map_find, map_get, map_insert, map_remove};
pub use compare::{compare, equal, hash_value};
pub use env::{Binding, Environment};
pub use error::DernError;
pub use heap::Heap;
pub use port::{Port, PortKind, PortStream};
pub use render::{to_plain_string, to_string};
pub use value::{
    compare_spurs, intern, resolve, with_resolved, CData, Function, Handle, HashMapValue,
    MapEntry, Native, Queue, Tag, Value,
};

pub use lasso::Spur;
