use byteorder::{LittleEndian, ReadBytesExt};

use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::schema::{Node, NodeKind, Schema};
use crate::value::{Fields, Value, ValueType};
use crate::varint::IntMode;
use crate::{MAGIC, MAX_DEPTH};

/// Upper bound on how many elements are reserved ahead of time from a length read out of the
/// message. Longer lists still decode; they just grow as they go.
const MAX_VEC_RESERVE: usize = 2048;

/// What every decoded value counts against the size budget, before any heap data it owns.
const VALUE_SIZE: usize = std::mem::size_of::<Value>();

fn take<'a>(buf: &mut &'a [u8], len: usize, step: &'static str) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(Error::UnexpectedEof { step });
    }
    let (data, rem) = buf.split_at(len);
    *buf = rem;
    Ok(data)
}

fn read_flag(buf: &mut &[u8], step: &'static str) -> Result<bool> {
    match buf.read_u8().map_err(|_| Error::UnexpectedEof { step })? {
        0 => Ok(false),
        1 => Ok(true),
        v => Err(Error::FormatError(format!("{} byte is {}, not 0 or 1", step, v))),
    }
}

/// The value an absent array element stands for. Absence is only ever written for
/// null-equivalent values, so this is the type's empty value.
fn empty_value(node: &Node) -> Result<Value> {
    Ok(match node.ty {
        ValueType::Integer => Value::Integer(0),
        ValueType::Bytes => Value::Bytes(Vec::new()),
        ValueType::String => Value::String(String::new()),
        ValueType::Object => Value::Object(Fields::new()),
        ValueType::Array => Value::Array(Vec::new()),
        ty => {
            return Err(Error::FormatError(format!(
                "absent {} element at [{}]",
                ty, node.path
            )))
        }
    })
}

/// Decodes a single message, replaying the string table, pools, and diff-encode state in the
/// same order the encoder built them.
pub(crate) struct Decoder<'s> {
    schema: &'s Schema,
    mode: IntMode,
    string_pool: bool,
    strings: Vec<String>,
    /// Decoded pool entries with the budget each one used up.
    pools: Vec<Vec<(Value, usize)>>,
    filled: Vec<bool>,
    status: Vec<Option<i64>>,
    /// Bytes the decoded value may still grow by.
    remaining: usize,
}

impl<'s> Decoder<'s> {
    pub fn new(schema: &'s Schema, config: &CodecConfig, limit: usize) -> Self {
        let pool_count = schema.pool_count();
        Self {
            schema,
            mode: config.int_mode(),
            string_pool: config.string_pool_enabled,
            strings: Vec::new(),
            pools: vec![Vec::new(); pool_count],
            filled: vec![false; pool_count],
            status: vec![None; schema.diff_slots()],
            remaining: limit,
        }
    }

    fn charge(&mut self, size: usize) -> Result<()> {
        self.remaining = self.remaining.checked_sub(size).ok_or_else(|| {
            Error::ParseLimit("decoded message is larger than the size limit".into())
        })?;
        Ok(())
    }

    pub fn decode(mut self, data: &[u8]) -> Result<Option<Value>> {
        let mut buf = data;
        self.read_strings(&mut buf)?;
        self.read_pools(&mut buf)?;

        let magic = take(&mut buf, MAGIC.len(), "magic")?;
        if magic != MAGIC {
            return Err(Error::FormatError(format!(
                "expected magic {:?}, got {:?}",
                MAGIC, magic
            )));
        }

        let schema = self.schema;
        let value = self.decode_node(&mut buf, schema.root())?;
        if !buf.is_empty() {
            return Err(Error::FormatError(format!(
                "{} bytes left over after the root value",
                buf.len()
            )));
        }
        log::debug!(
            "Decoded message of {} bytes: {} strings, {} pools in use",
            data.len(),
            self.strings.len(),
            self.filled.iter().filter(|f| **f).count()
        );
        Ok(value)
    }

    fn read_strings(&mut self, buf: &mut &[u8]) -> Result<()> {
        let count = self.mode.read_len(buf)?;
        self.strings.reserve(count.min(MAX_VEC_RESERVE));
        for _ in 0..count {
            let s = self.read_raw_str(buf)?;
            self.charge(s.len())?;
            self.strings.push(s);
        }
        Ok(())
    }

    fn read_raw_str(&self, buf: &mut &[u8]) -> Result<String> {
        let len = self.mode.read_len(buf)?;
        let raw = take(buf, len, "string")?;
        let s = std::str::from_utf8(raw)
            .map_err(|e| Error::FormatError(format!("string isn't valid UTF-8: {}", e)))?;
        Ok(s.to_string())
    }

    fn read_pools(&mut self, buf: &mut &[u8]) -> Result<()> {
        let schema = self.schema;
        let count = self.mode.read_len(buf)?;
        for _ in 0..count {
            let name = self.read_raw_str(buf)?;
            let slot = schema
                .pool_slot(&name)
                .ok_or_else(|| Error::FormatError(format!("unknown pool `{}`", name)))?;
            if self.filled[slot] {
                return Err(Error::FormatError(format!("pool `{}` appears twice", name)));
            }
            let size = self.mode.read_len(buf)?;
            log::trace!("Reading {} entries of pool `{}`", size, name);
            let node = schema.pool_node(slot);
            let mut entries = Vec::with_capacity(size.min(MAX_VEC_RESERVE));
            for _ in 0..size {
                // Entries are stored literally: no presence flag and no index of their own
                let before = self.remaining;
                let value = self.decode_payload(buf, node)?;
                entries.push((value, before - self.remaining));
            }
            self.pools[slot] = entries;
            self.filled[slot] = true;
        }
        Ok(())
    }

    /// Decode a value at a usage site. `None` means the node is nullable and was written absent.
    fn decode_node(&mut self, buf: &mut &[u8], node: &Node) -> Result<Option<Value>> {
        if node.nullable && !read_flag(buf, "presence flag")? {
            return Ok(None);
        }
        let value = match node.pool {
            None => self.decode_payload(buf, node)?,
            Some(slot) => {
                let index = self.mode.read_len(buf)?;
                let Some(&(_, size)) = self.pools[slot].get(index) else {
                    return Err(Error::FormatError(format!(
                        "index {} is past the end of pool `{}` ({} entries)",
                        index,
                        self.schema.pool_info(slot).name,
                        self.pools[slot].len()
                    )));
                };
                // Each reference decodes to its own copy
                self.charge(size)?;
                self.pools[slot][index].0.clone()
            }
        };
        // The encoder always writes these as absent
        if node.nullable && value.is_null_equivalent() {
            return Err(Error::FormatError(format!(
                "null-equivalent value marked present at [{}]",
                node.path
            )));
        }
        Ok(Some(value))
    }

    fn decode_payload(&mut self, buf: &mut &[u8], node: &Node) -> Result<Value> {
        self.charge(VALUE_SIZE)?;
        Ok(match node.ty {
            ValueType::Integer => {
                let raw = self.mode.read(buf)?;
                match node.diff {
                    Some(slot) => {
                        let v = match self.status[slot] {
                            Some(prev) => prev.wrapping_add(raw),
                            None => raw,
                        };
                        self.status[slot] = Some(v);
                        Value::Integer(v)
                    }
                    None => Value::Integer(raw),
                }
            }
            ValueType::Boolean => Value::Boolean(read_flag(buf, "boolean")?),
            ValueType::Double => Value::Double(
                buf.read_f64::<LittleEndian>()
                    .map_err(|_| Error::UnexpectedEof { step: "double" })?,
            ),
            ValueType::Bytes => Value::Bytes(self.read_bytes(buf)?),
            ValueType::String => Value::String(self.read_str(buf)?),
            ValueType::Object => match node.kind {
                NodeKind::Fields(ref fields) => {
                    let mut map = Fields::new();
                    for (name, child) in fields.iter() {
                        if let Some(v) = self.decode_node(buf, child)? {
                            self.charge(name.len())?;
                            map.insert(name.clone(), Some(v));
                        }
                    }
                    Value::Object(map)
                }
                _ => Value::Object(self.decode_free_map(buf, 1)?),
            },
            ValueType::Array => {
                let NodeKind::Items(ref item) = node.kind else {
                    return Err(Error::FormatError(format!(
                        "array at [{}] has no item node",
                        node.path
                    )));
                };
                let len = self.mode.read_len(buf)?;
                let mut items = Vec::with_capacity(len.min(MAX_VEC_RESERVE));
                for _ in 0..len {
                    let v = match self.decode_node(buf, item)? {
                        Some(v) => v,
                        None => {
                            self.charge(VALUE_SIZE)?;
                            empty_value(item)?
                        }
                    };
                    items.push(v);
                }
                Value::Array(items)
            }
        })
    }

    fn lookup_str(&mut self, index: usize) -> Result<String> {
        let Some(len) = self.strings.get(index).map(String::len) else {
            return Err(Error::FormatError(format!(
                "string index {} is past the end of the string table ({} entries)",
                index,
                self.strings.len()
            )));
        };
        self.charge(len)?;
        Ok(self.strings[index].clone())
    }

    fn read_str(&mut self, buf: &mut &[u8]) -> Result<String> {
        if self.string_pool {
            let index = self.mode.read_len(buf)?;
            self.lookup_str(index)
        } else {
            let s = self.read_raw_str(buf)?;
            self.charge(s.len())?;
            Ok(s)
        }
    }

    fn read_bytes(&mut self, buf: &mut &[u8]) -> Result<Vec<u8>> {
        let len = self.mode.read_len(buf)?;
        let raw = take(buf, len, "bytes")?;
        self.charge(len)?;
        Ok(raw.to_vec())
    }

    fn decode_free_map(&mut self, buf: &mut &[u8], depth: usize) -> Result<Fields> {
        if depth > MAX_DEPTH {
            return Err(Error::ParseLimit("free-form depth limit exceeded".into()));
        }
        let count = self.mode.read_len(buf)?;
        let mut map = Fields::new();
        for _ in 0..count {
            let index = self.mode.read_len(buf)?;
            let key = self.lookup_str(index)?;
            self.charge(VALUE_SIZE)?;
            let value = if read_flag(buf, "presence flag")? {
                Some(self.decode_free_value(buf, depth)?)
            } else {
                None
            };
            if map.insert(key, value).is_some() {
                return Err(Error::FormatError(format!(
                    "repeated key (string {}) in free-form map",
                    index
                )));
            }
        }
        Ok(map)
    }

    fn decode_free_value(&mut self, buf: &mut &[u8], depth: usize) -> Result<Value> {
        let tag = self.mode.read(buf)?;
        let ty = ValueType::try_from(tag).map_err(Error::UnknownTypeTag)?;
        self.charge(VALUE_SIZE)?;
        Ok(match ty {
            ValueType::Integer => Value::Integer(self.mode.read(buf)?),
            ValueType::Boolean => Value::Boolean(read_flag(buf, "boolean")?),
            ValueType::Double => Value::Double(
                buf.read_f64::<LittleEndian>()
                    .map_err(|_| Error::UnexpectedEof { step: "double" })?,
            ),
            ValueType::Bytes => Value::Bytes(self.read_bytes(buf)?),
            ValueType::String => Value::String(self.read_str(buf)?),
            ValueType::Object => Value::Object(self.decode_free_map(buf, depth + 1)?),
            ValueType::Array => {
                if depth + 1 > MAX_DEPTH {
                    return Err(Error::ParseLimit("free-form depth limit exceeded".into()));
                }
                let len = self.mode.read_len(buf)?;
                let mut items = Vec::with_capacity(len.min(MAX_VEC_RESERVE));
                for _ in 0..len {
                    items.push(self.decode_free_value(buf, depth + 1)?);
                }
                Value::Array(items)
            }
        })
    }
}
