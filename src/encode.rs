use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::pool::{Pool, StringInterner};
use crate::schema::{Node, NodeKind, Schema};
use crate::value::{Fields, Value};
use crate::varint::IntMode;
use crate::{MAGIC, MAX_DEPTH};

/// Encodes a single message. All pools, diff-encode state, and the string table live here and
/// are dropped with the encoder, so nothing carries over between messages.
pub(crate) struct Encoder<'s> {
    schema: &'s Schema,
    mode: IntMode,
    string_pool: bool,
    strings: StringInterner,
    pools: Vec<Pool>,
    /// Rendered payloads of each pool, by slot and then by pool index.
    payloads: Vec<Vec<Vec<u8>>>,
    /// Last absolute integer seen at each diff-encoded path.
    status: Vec<Option<i64>>,
}

impl<'s> Encoder<'s> {
    pub fn new(schema: &'s Schema, config: &CodecConfig) -> Self {
        let pool_count = schema.pool_count();
        Self {
            schema,
            mode: config.int_mode(),
            string_pool: config.string_pool_enabled,
            strings: StringInterner::new(),
            pools: vec![Pool::new(); pool_count],
            payloads: vec![Vec::new(); pool_count],
            status: vec![None; schema.diff_slots()],
        }
    }

    /// Encode a complete message: the metadata section (string table and pools) followed by the
    /// magic and the root value.
    pub fn encode(mut self, value: Option<&Value>) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        data.extend_from_slice(MAGIC);
        let schema = self.schema;
        self.encode_node(&mut data, schema.root(), value)?;

        let mut out = self.meta();
        let meta_len = out.len();
        out.extend_from_slice(&data);
        log::debug!(
            "Encoded message: {} strings, {} pools in use, {} metadata bytes, {} data bytes",
            self.strings.len(),
            self.pools.iter().filter(|p| !p.is_empty()).count(),
            meta_len,
            data.len()
        );
        Ok(out)
    }

    fn meta(&self) -> Vec<u8> {
        let mut meta = Vec::new();
        self.mode.write_len(&mut meta, self.strings.len());
        for s in self.strings.strings() {
            self.mode.write_len(&mut meta, s.len());
            meta.extend_from_slice(s.as_bytes());
        }

        let in_use = self.pools.iter().filter(|p| !p.is_empty()).count();
        self.mode.write_len(&mut meta, in_use);
        // Slots are already in dependency order
        for (slot, pool) in self.pools.iter().enumerate() {
            if pool.is_empty() {
                continue;
            }
            let name = &self.schema.pool_info(slot).name;
            self.mode.write_len(&mut meta, name.len());
            meta.extend_from_slice(name.as_bytes());
            self.mode.write_len(&mut meta, pool.len());
            for payload in self.payloads[slot].iter() {
                meta.extend_from_slice(payload);
            }
        }
        meta
    }

    /// Encode a value at a usage site: the presence flag if nullable, then either a pool index
    /// or the value's payload.
    fn encode_node(&mut self, buf: &mut Vec<u8>, node: &Node, value: Option<&Value>) -> Result<()> {
        if node.nullable {
            match value {
                Some(v) if !v.is_null_equivalent() => buf.push(1),
                _ => {
                    buf.push(0);
                    return Ok(());
                }
            }
        }
        let value = value.ok_or_else(|| Error::NotNullable {
            path: node.path.clone(),
        })?;
        if value.get_type() != node.ty {
            return Err(Error::TypeConflict {
                path: node.path.clone(),
                expected: node.ty,
                actual: value.get_type(),
            });
        }

        let Some(slot) = node.pool else {
            return self.encode_payload(buf, node, value);
        };
        let entry = self.pools[slot].put(value);
        self.mode.write_len(buf, entry.index);
        if entry.inserted {
            log::trace!(
                "New entry {} in pool `{}`",
                entry.index,
                self.schema.pool_info(slot).name
            );
            let mut payload = Vec::new();
            self.encode_payload(&mut payload, node, value)?;
            self.payloads[slot].push(payload);
        }
        Ok(())
    }

    /// Encode a value's body, with no presence flag or pool indirection.
    fn encode_payload(&mut self, buf: &mut Vec<u8>, node: &Node, value: &Value) -> Result<()> {
        match (value, &node.kind) {
            (Value::Integer(v), _) => {
                let v = *v;
                match node.diff {
                    Some(slot) => {
                        let delta = match self.status[slot] {
                            Some(prev) => v.wrapping_sub(prev),
                            None => v,
                        };
                        self.status[slot] = Some(v);
                        self.mode.write(buf, delta);
                    }
                    None => self.mode.write(buf, v),
                }
            }
            (Value::Boolean(v), _) => buf.push(*v as u8),
            (Value::Double(v), _) => buf.extend_from_slice(&v.to_le_bytes()),
            (Value::Bytes(v), _) => {
                self.mode.write_len(buf, v.len());
                buf.extend_from_slice(v);
            }
            (Value::String(v), _) => self.write_str(buf, v),
            (Value::Object(map), NodeKind::Fields(fields)) => {
                // Both sides are in key order
                let mut known = fields.iter().map(|(name, _)| name).peekable();
                for key in map.keys() {
                    while known.next_if(|name| *name < key).is_some() {}
                    if known.next_if(|name| *name == key).is_none() {
                        return Err(Error::UnknownField {
                            path: node.path.clone(),
                            field: key.clone(),
                        });
                    }
                }
                for (name, child) in fields.iter() {
                    let field = map.get(name).and_then(|v| v.as_ref());
                    self.encode_node(buf, child, field)?;
                }
            }
            (Value::Object(map), _) => self.encode_free_map(buf, map, 1)?,
            (Value::Array(items), NodeKind::Items(item)) => {
                self.mode.write_len(buf, items.len());
                for v in items.iter() {
                    self.encode_node(buf, item, Some(v))?;
                }
            }
            (v, _) => {
                return Err(Error::TypeConflict {
                    path: node.path.clone(),
                    expected: node.ty,
                    actual: v.get_type(),
                })
            }
        }
        Ok(())
    }

    fn write_str(&mut self, buf: &mut Vec<u8>, s: &str) {
        if self.string_pool {
            let index = self.strings.intern(s);
            self.mode.write_len(buf, index);
        } else {
            self.mode.write_len(buf, s.len());
            buf.extend_from_slice(s.as_bytes());
        }
    }

    /// Free-form maps describe themselves: entry count, then per entry the interned key, a
    /// presence flag, and a tagged value if present.
    fn encode_free_map(&mut self, buf: &mut Vec<u8>, map: &Fields, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::ParseLimit("free-form depth limit exceeded".into()));
        }
        self.mode.write_len(buf, map.len());
        for (key, value) in map.iter() {
            let index = self.strings.intern(key);
            self.mode.write_len(buf, index);
            match value {
                None => buf.push(0),
                Some(v) => {
                    buf.push(1);
                    self.encode_free_value(buf, v, depth)?;
                }
            }
        }
        Ok(())
    }

    fn encode_free_value(&mut self, buf: &mut Vec<u8>, value: &Value, depth: usize) -> Result<()> {
        self.mode.write(buf, value.get_type().into());
        match value {
            Value::Integer(v) => self.mode.write(buf, *v),
            Value::Boolean(v) => buf.push(*v as u8),
            Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Bytes(v) => {
                self.mode.write_len(buf, v.len());
                buf.extend_from_slice(v);
            }
            Value::String(v) => self.write_str(buf, v),
            Value::Object(map) => self.encode_free_map(buf, map, depth + 1)?,
            Value::Array(items) => {
                if depth + 1 > MAX_DEPTH {
                    return Err(Error::ParseLimit("free-form depth limit exceeded".into()));
                }
                self.mode.write_len(buf, items.len());
                for v in items.iter() {
                    self.encode_free_value(buf, v, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definition::Definition;
    use crate::value::ValueType;

    fn encode(def: Definition, value: &Value) -> Vec<u8> {
        Schema::new(def)
            .unwrap()
            .encode(value, &CodecConfig::default())
            .unwrap()
    }

    #[test]
    fn bare_integer() {
        let out = encode(Definition::new(ValueType::Integer), &Value::from(64));
        // empty string table, no pools, magic, varint 64
        let mut expected = vec![0x00, 0x00];
        expected.extend_from_slice(MAGIC);
        expected.extend_from_slice(&[0xC0, 0x00]);
        assert_eq!(out, expected);
    }

    #[test]
    fn object_fields_sorted() {
        let def = Definition::object(vec![
            ("b", Definition::new(ValueType::Boolean)),
            ("a", Definition::new(ValueType::Integer)),
        ]);
        let value = Value::object(vec![("b", Value::from(true)), ("a", Value::from(5))]);
        let out = encode(def, &value);
        assert_eq!(&out[8..], &[0x05, 0x01], "field `a` comes first");
    }

    #[test]
    fn nullable_collapse() {
        let def = Definition::object(vec![
            ("n", Definition::new(ValueType::Integer).nullable()),
            ("s", Definition::new(ValueType::String).nullable().pooled()),
            ("b", Definition::new(ValueType::Boolean).nullable()),
        ]);
        let value = Value::object(vec![
            ("n", Value::from(0)),
            ("s", Value::from("")),
            ("b", Value::from(false)),
        ]);
        let out = encode(def, &value);
        // Nothing interned and nothing pooled
        assert_eq!(&out[..2], &[0x00, 0x00]);
        assert_eq!(&out[8..], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn diff_encoded_deltas() {
        let def = Definition::array(Definition::new(ValueType::Integer).diff_encode());
        let value = Value::Array(vec![
            Value::from(1000),
            Value::from(1001),
            Value::from(1003),
            Value::from(990),
        ]);
        let out = encode(def, &value);
        assert_eq!(&out[8..], &[0x04, 0xE8, 0x07, 0x01, 0x02, 0x73]);
    }

    #[test]
    fn strings_interned() {
        let def = Definition::array(Definition::new(ValueType::String));
        let value = Value::Array(vec![Value::from("ab"), Value::from("c"), Value::from("ab")]);
        let out = encode(def, &value);
        let mut expected = vec![0x02, 0x02, b'a', b'b', 0x01, b'c', 0x00];
        expected.extend_from_slice(MAGIC);
        expected.extend_from_slice(&[0x03, 0x00, 0x01, 0x00]);
        assert_eq!(out, expected);
    }

    #[test]
    fn strings_inline() {
        let schema = Schema::new(Definition::new(ValueType::String)).unwrap();
        let config = CodecConfig {
            string_pool_enabled: false,
            ..Default::default()
        };
        let out = schema.encode(&Value::from("hi"), &config).unwrap();
        let mut expected = vec![0x00, 0x00];
        expected.extend_from_slice(MAGIC);
        expected.extend_from_slice(&[0x02, b'h', b'i']);
        assert_eq!(out, expected);
    }

    #[test]
    fn pooled_payload_in_meta() {
        let def = Definition::array(Definition::new(ValueType::Bytes).pooled());
        let value = Value::Array(vec![
            Value::from(vec![7u8, 8]),
            Value::from(vec![9u8]),
            Value::from(vec![7u8, 8]),
        ]);
        let out = encode(def, &value);
        let mut expected = vec![
            0x00, // strings
            0x01, // pools in use
            0x04, b'i', b't', b'e', b'm', // pool name
            0x02, // pool size
            0x02, 7, 8, // entry 0
            0x01, 9, // entry 1
        ];
        expected.extend_from_slice(MAGIC);
        expected.extend_from_slice(&[0x03, 0x00, 0x01, 0x00]);
        assert_eq!(out, expected);
    }

    #[test]
    fn free_form_map() {
        let mut map = Fields::new();
        map.insert("k1".into(), Some(Value::from("v1")));
        map.insert("k2".into(), None);
        let out = encode(Definition::free_form(), &Value::Object(map));
        let mut expected = vec![0x03, 0x02, b'k', b'1', 0x02, b'v', b'1', 0x02, b'k', b'2', 0x00];
        expected.extend_from_slice(MAGIC);
        expected.extend_from_slice(&[
            0x02, // entries
            0x00, 0x01, 0x04, 0x01, // k1: present, String, "v1"
            0x02, 0x00, // k2: absent
        ]);
        assert_eq!(out, expected);
    }

    #[test]
    fn type_conflict() {
        let schema = Schema::new(Definition::object(vec![(
            "x",
            Definition::new(ValueType::Integer),
        )]))
        .unwrap();
        let value = Value::object(vec![("x", Value::from("no"))]);
        match schema.encode(&value, &CodecConfig::default()) {
            Err(Error::TypeConflict {
                path,
                expected,
                actual,
            }) => {
                assert_eq!(path, "x");
                assert_eq!(expected, ValueType::Integer);
                assert_eq!(actual, ValueType::String);
            }
            other => panic!("Expected type conflict, got {:?}", other),
        }
    }

    #[test]
    fn unknown_field() {
        let schema = Schema::new(Definition::object(vec![(
            "inner",
            Definition::object(vec![
                ("a", Definition::new(ValueType::Integer)),
                ("c", Definition::new(ValueType::Integer).nullable()),
            ]),
        )]))
        .unwrap();
        let config = CodecConfig::default();
        let inner = |fields: Vec<(&'static str, Value)>| Value::object(vec![("inner", Value::object(fields))]);

        let value = inner(vec![("a", Value::from(1)), ("b", Value::from(2))]);
        match schema.encode(&value, &config) {
            Err(Error::UnknownField { path, field }) => {
                assert_eq!(path, "inner");
                assert_eq!(field, "b");
            }
            other => panic!("Expected unknown field, got {:?}", other),
        }
        let value = inner(vec![("a", Value::from(1)), ("z", Value::from(2))]);
        assert!(matches!(
            schema.encode(&value, &config),
            Err(Error::UnknownField { .. })
        ));

        let value = inner(vec![("a", Value::from(1)), ("c", Value::from(3))]);
        assert!(schema.encode(&value, &config).is_ok());
    }

    #[test]
    fn not_nullable() {
        let schema = Schema::new(Definition::object(vec![(
            "x",
            Definition::new(ValueType::Integer),
        )]))
        .unwrap();
        let value = Value::Object(Fields::new());
        assert!(matches!(
            schema.encode(&value, &CodecConfig::default()),
            Err(Error::NotNullable { .. })
        ));
        assert!(matches!(
            schema.encode_nullable(None, &CodecConfig::default()),
            Err(Error::NotNullable { .. })
        ));
        let nullable = Schema::new(Definition::new(ValueType::Integer).nullable()).unwrap();
        let out = nullable.encode_nullable(None, &CodecConfig::default()).unwrap();
        assert_eq!(&out[8..], &[0x00]);
    }

    #[test]
    fn free_form_too_deep() {
        let mut value = Value::Array(Vec::new());
        for _ in 0..(MAX_DEPTH + 1) {
            value = Value::Array(vec![value]);
        }
        let value = Value::object(vec![("deep", value)]);
        let schema = Schema::new(Definition::free_form()).unwrap();
        assert!(matches!(
            schema.encode(&value, &CodecConfig::default()),
            Err(Error::ParseLimit(_))
        ));
    }
}
