//! Typed values held by `InMemoryStore`
//!
//! - `ListValue`: ordered list (queues)
//! - `SetValue`: set of unique strings (tracked keys)
//! - `HashValue`: field/value hash (counters)

mod hash;
mod list;
mod set;

pub use hash::HashValue;
pub use list::ListValue;
pub use set::SetValue;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    List(ListValue),
    Set(SetValue),
    Hash(HashValue),
}

impl Value {
    /// Redis deletes keys whose aggregate value becomes empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
        }
    }
}
