//! Nested values passed between sockets
//!
//! A [`NestedValue`] is a ragged tree of lists. The top level is a list of
//! independent objects; each deeper level subdivides an object further
//! (object -> points -> coordinates). Leaves are scalars or fixed-size
//! tuples. How deep a value is expected to be is a property of the socket
//! kind that carries it, not of the value.

use serde::{Deserialize, Serialize};

/// A 4x4 transform matrix, row major
pub type Matrix4 = [[f64; 4]; 4];

/// Identity transform
pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Ragged, depth-typed nested sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedValue {
    /// Integer leaf (indices, counts, handles)
    Int(i64),
    /// Float leaf
    Float(f64),
    /// 3D vector leaf
    Vector([f64; 3]),
    /// Matrix leaf
    Matrix(Box<Matrix4>),
    /// A level of nesting
    List(Vec<NestedValue>),
}

impl Default for NestedValue {
    fn default() -> Self {
        Self::empty()
    }
}

impl NestedValue {
    /// The explicit empty value: a list with no objects
    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    /// True for a list with no elements
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::List(items) if items.is_empty())
    }

    /// True for scalar and tuple leaves
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::List(_))
    }

    /// Number of elements at this level (1 for a leaf)
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            _ => 1,
        }
    }

    /// Nesting depth: 0 for a leaf, 1 + deepest child for a list
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(NestedValue::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Borrow the elements of a list level
    pub fn as_list(&self) -> Option<&[NestedValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Take the elements of this level, wrapping a leaf as a single element
    pub fn into_list(self) -> Vec<NestedValue> {
        match self {
            Self::List(items) => items,
            leaf => vec![leaf],
        }
    }

    /// Read a numeric leaf as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Read a numeric leaf as i64, truncating floats
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Read a vector leaf
    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vector(v) => Some(*v),
            _ => None,
        }
    }

    /// Read a matrix leaf
    pub fn as_matrix(&self) -> Option<&Matrix4> {
        match self {
            Self::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Wrap in single-element lists until the value is at least `depth` deep
    ///
    /// A scalar bound to a Numbers socket (depth 2) reads as `[[s]]`.
    pub fn wrap_to_depth(self, depth: usize) -> Self {
        let mut value = self;
        let mut current = value.depth();
        while current < depth {
            value = Self::List(vec![value]);
            current += 1;
        }
        value
    }

    /// Convert a JSON property value
    ///
    /// Numbers become numeric leaves, arrays become lists, booleans become
    /// 0/1. Anything else (null, strings, objects) converts to empty.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::Bool(b) => Self::Int(i64::from(*b)),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            _ => Self::empty(),
        }
    }

    /// Collect every numeric leaf in depth-first order
    pub fn flatten_f64(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.collect_f64(&mut out);
        out
    }

    fn collect_f64(&self, out: &mut Vec<f64>) {
        match self {
            Self::List(items) => items.iter().for_each(|item| item.collect_f64(out)),
            Self::Vector(v) => out.extend_from_slice(v),
            Self::Matrix(m) => m.iter().for_each(|row| out.extend_from_slice(row)),
            leaf => out.extend(leaf.as_f64()),
        }
    }
}

impl From<f64> for NestedValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for NestedValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<[f64; 3]> for NestedValue {
    fn from(value: [f64; 3]) -> Self {
        Self::Vector(value)
    }
}

impl From<Matrix4> for NestedValue {
    fn from(value: Matrix4) -> Self {
        Self::Matrix(Box::new(value))
    }
}

impl<T: Into<NestedValue>> From<Vec<T>> for NestedValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
