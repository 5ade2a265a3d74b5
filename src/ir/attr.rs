//! Operator attributes.
//!
//! Attributes are a name → value map attached to every operator node. Values
//! are scalars, strings or flat lists; tensor shapes are integer lists.

use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

/// The kind of an attribute value, used by attribute specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Int,
    Float,
    Str,
    Ints,
    Floats,
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::Int(_) => AttrKind::Int,
            AttrValue::Float(_) => AttrKind::Float,
            AttrValue::Str(_) => AttrKind::Str,
            AttrValue::Ints(_) => AttrKind::Ints,
            AttrValue::Floats(_) => AttrKind::Floats,
        }
    }

    /// Whether a value can stand in for the requested kind.
    ///
    /// Integers (and integer lists) widen to floats. An empty list written in
    /// source text has no element type, so `Floats` also accepts `Ints`'s empty form.
    pub fn satisfies(&self, kind: AttrKind) -> bool {
        match (self, kind) {
            (AttrValue::Int(_), AttrKind::Float) => true,
            (AttrValue::Ints(_), AttrKind::Floats) => true,
            (AttrValue::Floats(v), AttrKind::Ints) => v.is_empty(),
            _ => self.kind() == kind,
        }
    }
}

impl fmt::Display for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttrKind::Int => "int",
            AttrKind::Float => "float",
            AttrKind::Str => "string",
            AttrKind::Ints => "ints",
            AttrKind::Floats => "floats",
        };
        f.write_str(name)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v:?}"),
            AttrValue::Str(v) => write!(f, "{v:?}"),
            AttrValue::Ints(v) => write_list(f, v.iter().map(|x| x.to_string())),
            AttrValue::Floats(v) => write_list(f, v.iter().map(|x| format!("{x:?}"))),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&item)?;
    }
    f.write_str("]")
}

/// Declares one attribute an operator kind understands.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kind: AttrKind,
    pub required: bool,
}

impl AttrSpec {
    pub const fn required(name: &'static str, kind: AttrKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: AttrKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Ordered attribute map. Ordering keeps describe output and equality stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<String, AttrValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttrValue) -> Option<AttrValue> {
        self.values.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            AttrValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn ints(&self, name: &str) -> Option<&[i64]> {
        match self.get(name)? {
            AttrValue::Ints(v) => Some(v.as_slice()),
            AttrValue::Floats(v) if v.is_empty() => Some(&[][..]),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Option<&[f32]> {
        match self.get(name)? {
            AttrValue::Floats(v) => Some(v.as_slice()),
            AttrValue::Ints(v) if v.is_empty() => Some(&[][..]),
            _ => None,
        }
    }

    /// Float list, widening an integer list.
    pub fn float_list(&self, name: &str) -> Option<Vec<f32>> {
        match self.get(name)? {
            AttrValue::Floats(v) => Some(v.clone()),
            AttrValue::Ints(v) => Some(v.iter().map(|&x| x as f32).collect()),
            _ => None,
        }
    }

    /// Integer list converted to a tensor shape.
    pub fn shape(&self, name: &str) -> Option<Result<Vec<usize>, String>> {
        self.ints(name).map(|dims| {
            dims.iter()
                .map(|&d| {
                    usize::try_from(d).map_err(|_| format!("negative dimension {d} in '{name}'"))
                })
                .collect()
        })
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let attrs = Attributes::new()
            .with("axis", AttrValue::Int(1))
            .with("alpha", AttrValue::Float(0.5))
            .with("shape", AttrValue::Ints(vec![2, 3]));

        assert_eq!(attrs.int("axis"), Some(1));
        assert_eq!(attrs.float("alpha"), Some(0.5));
        assert_eq!(attrs.float("axis"), Some(1.0));
        assert_eq!(attrs.ints("shape"), Some(&[2, 3][..]));
        assert_eq!(attrs.shape("shape"), Some(Ok(vec![2, 3])));
        assert_eq!(attrs.str("axis"), None);
        assert_eq!(attrs.float_list("shape"), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn test_negative_shape_is_rejected() {
        let attrs = Attributes::new().with("shape", AttrValue::Ints(vec![2, -1]));
        assert!(matches!(attrs.shape("shape"), Some(Err(_))));
    }

    #[test]
    fn test_integer_values_widen() {
        assert!(AttrValue::Ints(vec![]).satisfies(AttrKind::Floats));
        assert!(AttrValue::Floats(vec![]).satisfies(AttrKind::Ints));
        assert!(AttrValue::Ints(vec![1]).satisfies(AttrKind::Floats));
        assert!(!AttrValue::Floats(vec![1.0]).satisfies(AttrKind::Ints));
        assert!(AttrValue::Int(3).satisfies(AttrKind::Float));
        assert!(!AttrValue::Float(3.0).satisfies(AttrKind::Int));
    }

    #[test]
    fn test_display_is_sorted() {
        let attrs = Attributes::new()
            .with("strides", AttrValue::Ints(vec![1, 1]))
            .with("group", AttrValue::Int(1));
        assert_eq!(attrs.to_string(), "{group = 1, strides = [1, 1]}");
    }
}
