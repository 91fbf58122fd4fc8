use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::value::ValueType;

/// The declarative form of a schema node.
///
/// A Definition tree describes the shape every encoded value must have, plus how each node is
/// compressed. It is only a description: build a [`Schema`][crate::Schema] from it to validate
/// it and encode or decode with it.
///
/// Its JSON form uses camelCase keys, and every flag defaults to `false`:
///
/// ```
/// # use cprval::Definition;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let def = Definition::from_json(r#"{
///     "type": "Object",
///     "fields": {
///         "traceId": { "type": "Bytes", "sharePooled": true, "sharePoolId": "traceId" },
///         "start": { "type": "Integer", "diffEncode": true },
///         "attributes": { "type": "Object", "nullable": true, "pooled": true }
///     }
/// }"#)?;
/// assert_eq!(def.fields.as_ref().map(|f| f.len()), Some(3));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Definition {
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Values may be absent here. Nullable nodes spend one byte on a presence flag.
    #[serde(default)]
    pub nullable: bool,
    /// Deduplicate values at this path into a per-path pool.
    #[serde(default)]
    pub pooled: bool,
    /// Deduplicate values into the pool named by `share_pool_id`, shared with every other node
    /// using the same id.
    #[serde(default)]
    pub share_pooled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub share_pool_id: String,
    /// Write integers as the difference from the previous integer seen at this path.
    #[serde(default)]
    pub diff_encode: bool,
    /// Object fields. An Object without fields is a free-form map, which describes itself on
    /// the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Definition>>,
    /// The definition of every Array element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_definition: Option<Box<Definition>>,
}

impl Definition {
    /// A definition of the given type with every flag off.
    pub fn new(ty: ValueType) -> Self {
        Self {
            ty,
            nullable: false,
            pooled: false,
            share_pooled: false,
            share_pool_id: String::new(),
            diff_encode: false,
            fields: None,
            item_definition: None,
        }
    }

    /// An Object definition with the given fields.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Definition)>,
        K: Into<String>,
    {
        let mut def = Self::new(ValueType::Object);
        def.fields = Some(fields.into_iter().map(|(k, v)| (k.into(), v)).collect());
        def
    }

    /// A free-form Object definition.
    pub fn free_form() -> Self {
        Self::new(ValueType::Object)
    }

    /// An Array definition with the given item definition.
    pub fn array(item: Definition) -> Self {
        let mut def = Self::new(ValueType::Array);
        def.item_definition = Some(Box::new(item));
        def
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn pooled(mut self) -> Self {
        self.pooled = true;
        self
    }

    pub fn share_pooled(mut self, id: impl Into<String>) -> Self {
        self.share_pooled = true;
        self.share_pool_id = id.into();
        self
    }

    pub fn diff_encode(mut self) -> Self {
        self.diff_encode = true;
        self
    }

    /// True for an Object without a field list.
    pub fn is_free_form(&self) -> bool {
        self.ty == ValueType::Object && self.fields.is_none()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::SchemaParse(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_defaults() {
        let def = Definition::from_json(r#"{ "type": "Integer" }"#).unwrap();
        assert_eq!(def, Definition::new(ValueType::Integer));
    }

    #[test]
    fn json_nested() {
        let def = Definition::from_json(
            r#"{
                "type": "Object",
                "fields": {
                    "spans": {
                        "type": "Array",
                        "nullable": true,
                        "itemDefinition": {
                            "type": "Object",
                            "fields": {
                                "spanId": { "type": "Bytes", "sharePooled": true, "sharePoolId": "spanId" },
                                "start": { "type": "Integer", "diffEncode": true },
                                "attributes": { "type": "Object", "pooled": true }
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap();
        let expected = Definition::object(vec![(
            "spans",
            Definition::array(Definition::object(vec![
                (
                    "spanId",
                    Definition::new(ValueType::Bytes).share_pooled("spanId"),
                ),
                ("start", Definition::new(ValueType::Integer).diff_encode()),
                ("attributes", Definition::free_form().pooled()),
            ]))
            .nullable(),
        )]);
        assert_eq!(def, expected);
        let attributes = &def.fields.as_ref().unwrap()["spans"]
            .item_definition
            .as_ref()
            .unwrap()
            .fields
            .as_ref()
            .unwrap()["attributes"];
        assert!(attributes.is_free_form());
    }

    #[test]
    fn json_roundtrip() {
        let def = Definition::array(Definition::new(ValueType::String).pooled()).nullable();
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(Definition::from_json(&json).unwrap(), def);
    }

    #[test]
    fn json_errors() {
        assert!(matches!(
            Definition::from_json(r#"{ "type": "Float" }"#),
            Err(Error::SchemaParse(_))
        ));
        assert!(matches!(
            Definition::from_json(r#"{ "type": "Integer", "poooled": true }"#),
            Err(Error::SchemaParse(_))
        ));
        assert!(matches!(
            Definition::from_file("/nonexistent/definition.json"),
            Err(Error::SchemaParse(_))
        ));
    }
}
