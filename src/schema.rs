use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::CodecConfig;
use crate::decode::Decoder;
use crate::definition::Definition;
use crate::encode::Encoder;
use crate::error::{Error, Result};
use crate::value::{Value, ValueType};
use crate::MAX_DECODED_SIZE;

/// Wire name of an array element's path segment.
pub const ITEM_SEGMENT: &str = "item";

/// One step of a schema path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Field(String),
    Item,
    /// The root of a share-pooled value's payload. Everything below a share-pooled node is
    /// addressed relative to its pool id, so the same shared value is rendered identically from
    /// every site that references it.
    Shared(String),
}

/// Identifies a pool: either the path of a pooled node, or a shared pool id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PoolId {
    Path(Vec<Segment>),
    Shared(String),
}

fn render_path(path: &[Segment]) -> String {
    let mut name = String::new();
    for (i, seg) in path.iter().enumerate() {
        if i > 0 {
            name.push(' ');
        }
        match seg {
            Segment::Field(f) => name.push_str(f),
            Segment::Item => name.push_str(ITEM_SEGMENT),
            Segment::Shared(id) => name.push_str(id),
        }
    }
    name
}

impl PoolId {
    /// The name this pool is written under in a message.
    pub fn wire_name(&self) -> String {
        match self {
            PoolId::Path(path) => render_path(path),
            PoolId::Shared(id) => id.clone(),
        }
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PoolId::Path(path) => write!(f, "[{}]", render_path(path)),
            PoolId::Shared(id) => write!(f, "shared `{}`", id),
        }
    }
}

/// A step from a node to one of its children, used to find a pool's node again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Field(usize),
    Item,
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    /// Integer, Boolean, Double, Bytes, or String.
    Leaf,
    /// Object with known fields, in lexicographic order.
    Fields(Vec<(String, Node)>),
    /// Object without a field list.
    FreeForm,
    Items(Box<Node>),
}

/// A compiled Definition node. Pools and diff-encode state are resolved to slot numbers up
/// front, so encoding and decoding never build paths.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub ty: ValueType,
    pub nullable: bool,
    pub pool: Option<usize>,
    pub diff: Option<usize>,
    pub kind: NodeKind,
    /// Rendered path, for error messages.
    pub path: String,
}

#[derive(Clone, Debug)]
pub(crate) struct PoolInfo {
    pub id: PoolId,
    pub name: String,
    /// Route from the root to the first node using this pool.
    pub site: Vec<Step>,
}

/// A validated, compiled [`Definition`], ready to encode and decode with.
///
/// Building a Schema checks the Definition for:
/// - pool flags on types that can't be pooled (Integer, Boolean, Double), or both `pooled` and
///   `sharePooled` on one node
/// - `diffEncode` on anything but an Integer
/// - Arrays without an item definition, or `fields`/`itemDefinition` on the wrong type
/// - shared pool ids used by structurally different nodes, or repeated along one root-to-leaf
///   path
/// - two pools that would be written under the same name
///
/// It also computes the order pools are written in: every pool comes after all pools nested
/// beneath it, so a decoder always has a pool's dependencies on hand before reading it. This is
/// done once here; a Schema is read-only afterwards and may be shared between threads.
#[derive(Clone, Debug)]
pub struct Schema {
    definition: Definition,
    root: Node,
    pools: Vec<PoolInfo>,
    pool_names: HashMap<String, usize>,
    diff_slots: usize,
}

impl Schema {
    pub fn new(definition: Definition) -> Result<Self> {
        let (root, pools, diff_slots) = {
            let mut compiler = Compiler::default();
            let root = compiler.compile(
                &definition,
                &mut Vec::new(),
                &mut Vec::new(),
                &mut Vec::new(),
            )?;
            (root, compiler.pools, compiler.diff_slots.len())
        };
        let mut pool_names = HashMap::with_capacity(pools.len());
        for (slot, pool) in pools.iter().enumerate() {
            if let Some(other) = pool_names.insert(pool.name.clone(), slot) {
                return Err(Error::SchemaValidation(format!(
                    "pools {} and {} would both be written as `{}`",
                    pools[other].id, pool.id, pool.name
                )));
            }
        }
        log::debug!(
            "Built schema with {} pools and {} diff-encoded paths",
            pools.len(),
            diff_slots
        );
        Ok(Self {
            definition,
            root,
            pools,
            pool_names,
            diff_slots,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(Definition::from_json(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(Definition::from_file(path)?)
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Every pool in the order they are written, nested pools first.
    pub fn pool_order(&self) -> impl Iterator<Item = &PoolId> {
        self.pools.iter().map(|p| &p.id)
    }

    /// Wire names of every pool, in the order they are written.
    pub fn pool_names(&self) -> impl Iterator<Item = &str> {
        self.pools.iter().map(|p| p.name.as_str())
    }

    /// Encode a value into a complete message.
    pub fn encode(&self, value: &Value, config: &CodecConfig) -> Result<Vec<u8>> {
        Encoder::new(self, config).encode(Some(value))
    }

    /// Encode a possibly-absent value. Fails unless the root is nullable or a value is given.
    pub fn encode_nullable(&self, value: Option<&Value>, config: &CodecConfig) -> Result<Vec<u8>> {
        Encoder::new(self, config).encode(value)
    }

    /// Decode a complete message. Returns `None` only if the root is nullable and was encoded as
    /// absent.
    ///
    /// Decoding stops with [`Error::ParseLimit`] once the decoded value would take more than
    /// [`MAX_DECODED_SIZE`] bytes of memory.
    pub fn decode(&self, data: &[u8], config: &CodecConfig) -> Result<Option<Value>> {
        self.decode_with_limit(data, config, MAX_DECODED_SIZE)
    }

    /// Decode a complete message, failing with [`Error::ParseLimit`] once the decoded value would
    /// take more than `limit` bytes of memory. Every reference to a pooled value counts the
    /// value's full size, since it decodes to its own copy.
    pub fn decode_with_limit(
        &self,
        data: &[u8],
        config: &CodecConfig,
        limit: usize,
    ) -> Result<Option<Value>> {
        Decoder::new(self, config, limit).decode(data)
    }

    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    pub(crate) fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub(crate) fn pool_info(&self, slot: usize) -> &PoolInfo {
        &self.pools[slot]
    }

    pub(crate) fn pool_slot(&self, name: &str) -> Option<usize> {
        self.pool_names.get(name).copied()
    }

    pub(crate) fn diff_slots(&self) -> usize {
        self.diff_slots
    }

    /// Find the node a pool's entries are decoded with.
    pub(crate) fn pool_node(&self, slot: usize) -> &Node {
        let mut node = &self.root;
        for step in self.pools[slot].site.iter() {
            node = match (step, &node.kind) {
                (Step::Field(i), NodeKind::Fields(fields)) => &fields[*i].1,
                (Step::Item, NodeKind::Items(item)) => item,
                _ => unreachable!("pool sites are recorded while compiling this tree"),
            };
        }
        node
    }
}

#[derive(Default)]
struct Compiler<'d> {
    pools: Vec<PoolInfo>,
    pool_slots: HashMap<PoolId, usize>,
    diff_slots: HashMap<Vec<Segment>, usize>,
    shared: HashMap<&'d str, &'d Definition>,
}

impl<'d> Compiler<'d> {
    fn compile(
        &mut self,
        def: &'d Definition,
        path: &mut Vec<Segment>,
        site: &mut Vec<Step>,
        shared_on_path: &mut Vec<&'d str>,
    ) -> Result<Node> {
        let rendered = render_path(path);
        check_flags(def, &rendered)?;

        if def.share_pooled {
            let id = def.share_pool_id.as_str();
            if shared_on_path.contains(&id) {
                return Err(Error::SchemaValidation(format!(
                    "shared pool `{}` is used twice along the path [{}]",
                    id, rendered
                )));
            }
            match self.shared.get(id) {
                Some(first) if *first != def => {
                    return Err(Error::SchemaValidation(format!(
                        "nodes sharing pool `{}` have different definitions (at [{}])",
                        id, rendered
                    )));
                }
                Some(_) => (),
                None => {
                    self.shared.insert(id, def);
                }
            }
            shared_on_path.push(id);
        }

        // A shared value's payload is addressed relative to its pool
        let mut shared_root;
        let child_path = if def.share_pooled {
            shared_root = vec![Segment::Shared(def.share_pool_id.clone())];
            &mut shared_root
        } else {
            &mut *path
        };

        let kind = match def.ty {
            ValueType::Object if def.is_free_form() => NodeKind::FreeForm,
            ValueType::Object => {
                let mut compiled = Vec::new();
                for (i, (name, field)) in def.fields.iter().flatten().enumerate() {
                    child_path.push(Segment::Field(name.clone()));
                    site.push(Step::Field(i));
                    let node = self.compile(field, child_path, site, shared_on_path)?;
                    site.pop();
                    child_path.pop();
                    compiled.push((name.clone(), node));
                }
                NodeKind::Fields(compiled)
            }
            ValueType::Array => {
                let item = def.item_definition.as_deref().ok_or_else(|| {
                    Error::SchemaValidation(format!(
                        "array at [{}] has no item definition",
                        rendered
                    ))
                })?;
                child_path.push(Segment::Item);
                site.push(Step::Item);
                let node = self.compile(item, child_path, site, shared_on_path)?;
                site.pop();
                child_path.pop();
                NodeKind::Items(Box::new(node))
            }
            _ => NodeKind::Leaf,
        };

        if def.share_pooled {
            shared_on_path.pop();
        }

        // Children were compiled first, so their pools already have lower slots
        let pool = if def.share_pooled {
            Some(self.pool_slot(PoolId::Shared(def.share_pool_id.clone()), site))
        } else if def.pooled {
            Some(self.pool_slot(PoolId::Path(path.clone()), site))
        } else {
            None
        };

        let diff = if def.diff_encode {
            let next = self.diff_slots.len();
            Some(*self.diff_slots.entry(path.clone()).or_insert(next))
        } else {
            None
        };

        Ok(Node {
            ty: def.ty,
            nullable: def.nullable,
            pool,
            diff,
            kind,
            path: rendered,
        })
    }

    fn pool_slot(&mut self, id: PoolId, site: &[Step]) -> usize {
        if let Some(slot) = self.pool_slots.get(&id) {
            return *slot;
        }
        let slot = self.pools.len();
        log::trace!("Pool slot {} is {}", slot, id);
        self.pools.push(PoolInfo {
            name: id.wire_name(),
            id: id.clone(),
            site: site.to_vec(),
        });
        self.pool_slots.insert(id, slot);
        slot
    }
}

fn check_flags(def: &Definition, path: &str) -> Result<()> {
    let fail = |msg: &str| Err(Error::SchemaValidation(format!("{} (at [{}])", msg, path)));
    if def.pooled && def.share_pooled {
        return fail("a node can't be both pooled and share-pooled");
    }
    if (def.pooled || def.share_pooled) && !def.ty.is_poolable() {
        return fail("only Bytes, String, Object, and Array nodes can be pooled");
    }
    if def.share_pooled && def.share_pool_id.is_empty() {
        return fail("share-pooled node has an empty pool id");
    }
    if def.diff_encode && def.ty != ValueType::Integer {
        return fail("only Integer nodes can be diff-encoded");
    }
    if def.fields.is_some() && def.ty != ValueType::Object {
        return fail("only Object nodes can have fields");
    }
    if def.item_definition.is_some() && def.ty != ValueType::Array {
        return fail("only Array nodes can have an item definition");
    }
    Ok(())
}
