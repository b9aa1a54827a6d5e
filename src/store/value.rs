//! Value types for the keyspace
//!
//! The store treats values opaquely apart from their type tag; the
//! containers themselves are plain std collections manipulated by commands.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Represents the different types of values that can be stored
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// String value (binary-safe, counters included)
    String(Bytes),

    /// Hash map (field -> value)
    Hash(HashMap<Bytes, Bytes>),

    /// List of values (ordered)
    List(VecDeque<Bytes>),

    /// Set of unique values (unordered)
    Set(HashSet<Bytes>),

    /// Member -> score
    SortedSet(BTreeMap<Bytes, f64>),

    /// Entries keyed by their stream id
    Stream(BTreeMap<Bytes, Vec<(Bytes, Bytes)>>),
}

/// Type tag of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Hash,
    List,
    Set,
    SortedSet,
    Stream,
}

impl ValueType {
    /// Name as reported by TYPE
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Hash => "hash",
            ValueType::List => "list",
            ValueType::Set => "set",
            ValueType::SortedSet => "zset",
            ValueType::Stream => "stream",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Create a string value
    pub fn string(bytes: impl Into<Bytes>) -> Self {
        Value::String(bytes.into())
    }

    /// Create a list from its elements, head first
    pub fn list<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Hash(_) => ValueType::Hash,
            Value::List(_) => ValueType::List,
            Value::Set(_) => ValueType::Set,
            Value::SortedSet(_) => ValueType::SortedSet,
            Value::Stream(_) => ValueType::Stream,
        }
    }

    /// Collections are removed from the keyspace once they become empty
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
            Value::Stream(_) => false,
        }
    }

    /// Try to get as string bytes
    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_string_mut(&mut self) -> Option<&mut Bytes> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as list reference
    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Try to get as mutable list
    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Try to get as set reference
    pub fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Try to get as mutable set
    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    /// Try to get as hash reference
    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    /// Try to get as mutable hash
    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Some(hash),
            _ => None,
        }
    }

    /// Calculate approximate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        match self {
            Value::String(bytes) => bytes.len(),
            Value::List(list) => {
                list.iter().map(|b| b.len()).sum::<usize>() + std::mem::size_of::<VecDeque<Bytes>>()
            }
            Value::Set(set) => {
                set.iter().map(|b| b.len()).sum::<usize>() + std::mem::size_of::<HashSet<Bytes>>()
            }
            Value::Hash(hash) => {
                hash.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
                    + std::mem::size_of::<HashMap<Bytes, Bytes>>()
            }
            Value::SortedSet(zset) => {
                zset.keys().map(|m| m.len() + std::mem::size_of::<f64>()).sum::<usize>()
                    + std::mem::size_of::<BTreeMap<Bytes, f64>>()
            }
            Value::Stream(stream) => stream
                .iter()
                .map(|(id, fields)| {
                    id.len() + fields.iter().map(|(f, v)| f.len() + v.len()).sum::<usize>()
                })
                .sum(),
        }
    }
}
