use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;

/// The fields of an Object value. An entry holding `None` is an explicit null, which only
/// free-form maps preserve.
pub type Fields = BTreeMap<String, Option<Value>>;

/// The type of a [`Value`]. The discriminant doubles as the type tag written for free-form
/// values, and as the first key when ordering values of differing types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Integer = 0,
    Boolean = 1,
    Double = 2,
    Bytes = 3,
    String = 4,
    Object = 5,
    Array = 6,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Integer => "Integer",
            ValueType::Boolean => "Boolean",
            ValueType::Double => "Double",
            ValueType::Bytes => "Bytes",
            ValueType::String => "String",
            ValueType::Object => "Object",
            ValueType::Array => "Array",
        }
    }

    /// True for the types that can be placed in a pool.
    pub fn is_poolable(&self) -> bool {
        matches!(
            self,
            ValueType::Bytes | ValueType::String | ValueType::Object | ValueType::Array
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ValueType> for i64 {
    fn from(val: ValueType) -> i64 {
        val as i64
    }
}

impl TryFrom<i64> for ValueType {
    type Error = i64;
    fn try_from(val: i64) -> Result<ValueType, i64> {
        match val {
            0 => Ok(ValueType::Integer),
            1 => Ok(ValueType::Boolean),
            2 => Ok(ValueType::Double),
            3 => Ok(ValueType::Bytes),
            4 => Ok(ValueType::String),
            5 => Ok(ValueType::Object),
            6 => Ok(ValueType::Array),
            _ => Err(val),
        }
    }
}

/// A node in a telemetry value tree.
///
/// Values are plain owned trees: Objects and Arrays own their children, and nothing is shared
/// between two places in a tree. Equality, ordering and hashing are all structural and agree
/// with each other, so a value can be used as a dictionary key either through hashing or through
/// ordering.
///
/// Ordering compares the type first (in [`ValueType`] order), then the contents: integers and
/// booleans numerically, doubles by IEEE total order, bytes, strings and arrays
/// lexicographically, and objects by walking their fields in key order. An absent field
/// (`None`) sorts before any value.
#[derive(Clone, Debug)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Double(f64),
    Bytes(Vec<u8>),
    String(String),
    Object(Fields),
    Array(Vec<Value>),
}

impl Value {
    pub fn get_type(&self) -> ValueType {
        match *self {
            Value::Integer(_) => ValueType::Integer,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Double(_) => ValueType::Double,
            Value::Bytes(_) => ValueType::Bytes,
            Value::String(_) => ValueType::String,
            Value::Object(_) => ValueType::Object,
            Value::Array(_) => ValueType::Array,
        }
    }

    /// Build an Object from field/value pairs, with every field present.
    pub fn object<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v)))
                .collect(),
        )
    }

    /// Whether a nullable field holding this value is written as absent. This is true for the
    /// zero integer and for empty bytes, strings, objects and arrays. Booleans and doubles are
    /// never null-equivalent.
    pub fn is_null_equivalent(&self) -> bool {
        match *self {
            Value::Integer(v) => v == 0,
            Value::Boolean(_) | Value::Double(_) => false,
            Value::Bytes(ref v) => v.is_empty(),
            Value::String(ref v) => v.is_empty(),
            Value::Object(ref v) => v.is_empty(),
            Value::Array(ref v) => v.is_empty(),
        }
    }

    /// A structural 64-bit hash, consistent with [`Ord`]: values that compare equal always
    /// produce the same hash.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Boolean(_))
    }

    pub fn is_double(&self) -> bool {
        matches!(self, Value::Double(_))
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    pub fn is_str(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        if let Value::Integer(val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Boolean(val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        if let Value::Double(val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> Option<&[u8]> {
        if let Value::Bytes(ref val) = *self {
            Some(val)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(ref val) = *self {
            Some(val.as_str())
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&Fields> {
        if let Value::Object(ref map) = *self {
            Some(map)
        } else {
            None
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Fields> {
        match *self {
            Value::Object(ref mut map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        if let Value::Array(ref array) = *self {
            Some(array)
        } else {
            None
        }
    }

    /// Look up a field of an Object. Returns `None` for non-objects, missing fields, and fields
    /// holding an explicit null.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object()
            .and_then(|map| map.get(field))
            .and_then(|v| v.as_ref())
    }
}

impl Index<usize> for Value {
    type Output = Value;

    /// Panics if this isn't an Array or the index is out of range.
    fn index(&self, index: usize) -> &Self::Output {
        match self.as_array() {
            Some(array) => &array[index],
            None => panic!("Indexed into a {} with a usize", self.get_type()),
        }
    }
}

impl Index<&str> for Value {
    type Output = Value;

    /// Panics if this isn't an Object or the field is absent.
    fn index(&self, index: &str) -> &Self::Output {
        match self.get(index) {
            Some(v) => v,
            None => panic!("Field `{}` is absent", index),
        }
    }
}

fn cmp_fields(a: &Fields, b: &Fields) -> Ordering {
    // `Option<Value>` already orders `None` first
    a.iter().cmp(b.iter())
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => cmp_fields(a, b),
            (Value::Array(a), Value::Array(b)) => a.iter().cmp(b.iter()),
            (a, b) => a.get_type().cmp(&b.get_type()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.get_type().hash(state);
        match self {
            Value::Integer(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
            // Bit patterns, matching the total order used for comparison
            Value::Double(v) => v.to_bits().hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::String(v) => v.hash(state),
            Value::Object(map) => {
                state.write_usize(map.len());
                for (k, v) in map {
                    k.hash(state);
                    v.hash(state);
                }
            }
            Value::Array(array) => {
                state.write_usize(array.len());
                for v in array {
                    v.hash(state);
                }
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::Integer(-5),
            Value::Integer(0),
            Value::Integer(i64::MAX),
            Value::Boolean(false),
            Value::Boolean(true),
            Value::Double(-0.0),
            Value::Double(0.0),
            Value::Double(1.5),
            Value::Double(f64::NAN),
            Value::Bytes(vec![]),
            Value::Bytes(vec![1, 2, 3]),
            Value::Bytes(vec![1, 2, 4]),
            Value::String("".into()),
            Value::String("abc".into()),
            Value::object(vec![("a", Value::from(1))]),
            Value::object(vec![("a", Value::from(1)), ("b", Value::from("x"))]),
            Value::Object(
                vec![("a".to_string(), None)]
                    .into_iter()
                    .collect(),
            ),
            Value::Array(vec![]),
            Value::Array(vec![Value::from(1), Value::from(2)]),
            Value::Array(vec![Value::from(2)]),
        ]
    }

    #[test]
    fn type_ordinal_first() {
        let values = samples();
        for a in values.iter() {
            for b in values.iter() {
                if a.get_type() != b.get_type() {
                    assert_eq!(a.cmp(b), a.get_type().cmp(&b.get_type()));
                }
            }
        }
        assert!(Value::Integer(i64::MAX) < Value::Boolean(false));
        assert!(Value::Array(vec![]) > Value::String("zzz".into()));
    }

    #[test]
    fn total_order_is_consistent() {
        let values = samples();
        for a in values.iter() {
            assert_eq!(a.cmp(a), Ordering::Equal, "{:?} should equal itself", a);
            for b in values.iter() {
                assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn hash_agrees_with_compare() {
        let values = samples();
        let copies = samples();
        for (a, b) in values.iter().zip(copies.iter()) {
            assert_eq!(a, b);
            assert_eq!(a.structural_hash(), b.structural_hash());
        }
        // Same fields, built in a different order
        let x = Value::object(vec![("b", Value::from(2)), ("a", Value::from(1))]);
        let y = Value::object(vec![("a", Value::from(1)), ("b", Value::from(2))]);
        assert_eq!(x, y);
        assert_eq!(x.structural_hash(), y.structural_hash());
    }

    #[test]
    fn lexicographic_contents() {
        assert!(Value::Bytes(vec![1, 2]) < Value::Bytes(vec![1, 2, 0]));
        assert!(Value::Bytes(vec![1, 3]) > Value::Bytes(vec![1, 2, 9]));
        assert!(Value::from("ab") < Value::from("b"));
        assert!(
            Value::Array(vec![Value::from(1), Value::from(9)])
                < Value::Array(vec![Value::from(2)])
        );
        let absent: Fields = vec![("a".to_string(), None)].into_iter().collect();
        let present = Value::object(vec![("a", Value::from(0))]);
        assert!(Value::Object(absent) < present);
    }

    #[test]
    fn null_equivalence() {
        assert!(Value::Integer(0).is_null_equivalent());
        assert!(!Value::Integer(1).is_null_equivalent());
        assert!(!Value::Boolean(false).is_null_equivalent());
        assert!(!Value::Double(0.0).is_null_equivalent());
        assert!(Value::Bytes(vec![]).is_null_equivalent());
        assert!(Value::from("").is_null_equivalent());
        assert!(Value::Object(Fields::new()).is_null_equivalent());
        assert!(Value::Array(vec![]).is_null_equivalent());
    }

    #[test]
    fn type_tags() {
        for tag in 0..7i64 {
            let ty = ValueType::try_from(tag).unwrap();
            assert_eq!(i64::from(ty), tag);
        }
        assert_eq!(ValueType::try_from(7i64), Err(7));
        assert_eq!(ValueType::try_from(-1i64), Err(-1));
    }

    #[test]
    fn indexing() {
        let v = Value::object(vec![
            ("name", Value::from("span")),
            ("ids", Value::Array(vec![Value::from(7)])),
        ]);
        assert_eq!(v["name"].as_str(), Some("span"));
        assert_eq!(v["ids"][0].as_i64(), Some(7));
        assert!(v.get("missing").is_none());
    }
}
