/*!

The message format written by [`Schema::encode`][crate::Schema::encode].

A message never describes its own shape. Both sides must hold the same
[`Definition`][crate::Definition] and the same [`CodecConfig`][crate::CodecConfig];
nothing in the message records either of them.

# Primitives

Every integer in a message uses the same encoding, picked by
`CodecConfig::leb128_enabled`. This covers integer values, lengths, counts, pool
indices, string indices, and free-form type tags.

- Varint (the default): signed LEB128. Each byte carries 7 payload bits, low
    bits first, with the high bit set if more bytes follow. The final byte's bit
    6 is the sign, extended through the rest of the value. After 8 bytes with the
    continuation bit set, a 9th byte carries the top 8 bits of the value as-is.
- Fixed: 8 bytes, little-endian two's complement.

```text
     0 => 00
    -1 => 7F
    63 => 3F
    64 => C0 00
   -64 => 40
   -65 => BF 7F
```

Booleans are a single byte, `0` or `1`. Doubles are 8 bytes of little-endian
IEEE-754. Bytes are a length followed by the raw bytes. Strings are either an
index into the string table (`CodecConfig::string_pool_enabled`, the default) or
a length followed by UTF-8 bytes.

# Message

```text
+=================+==========+========+===========+
|  String Table   |  Pools   | cprval |   Root    |
+=================+==========+========+===========+

String Table: count, then each string as length + UTF-8 bytes
Pools:        count, then for each non-empty pool:
              name length + name, entry count, entry payloads
cprval:       the six literal bytes "cprval"
Root:         the root value, encoded at its usage site
```

Everything before the magic is the metadata section. It is written after the
root has been fully walked, since that walk is what fills the string table and
the pools.

# Usage Sites and Payloads

A value is written in one of two forms.

At a *usage site*, the value's position in the tree:

1. If the Definition node is nullable, a presence byte. It is `0` when the value
   is absent *or* null-equivalent: the integer `0`, or empty bytes, string,
   object, or array. Nothing else follows a `0`. Booleans and doubles are never
   null-equivalent.
2. If the node is pooled or share-pooled, the value's index in its pool.
3. Otherwise, the value's payload.

A *payload* is the value itself:

- Integer: the integer, or, if the node is diff-encoded, its difference from
    the last integer seen at the same path (the first is written whole).
- Boolean, Double, Bytes, String: the primitive.
- Object with fields: each field's usage site, in lexicographic field order.
    Field names are never written.
- Free-form Object: see below.
- Array: the element count, then each element's usage site.

# Pools

A pool entry is a payload; it has no presence byte and no index of its own. Its
children are usage sites, so they may refer to other pools. Pools are written
children-first: a pool nested beneath another always comes before it, so its
entries are known by the time they are referenced. Entries are written in index
order, which is the order they were first seen while encoding.

A pooled node's pool is named by its path: field names joined by single spaces,
with `item` standing in for array elements. The root's path is the empty string.
A share-pooled node's pool is named by its pool id, and every path beneath it is
rooted at that id instead of at the tree's root. A diff-encoded integer inside a
pooled value therefore only ever sees the values in that pool, in index order.

# Free-form Objects

An Object node without fields holds arbitrary data, so it is written with its
own keys and type tags:

```text
count, then for each entry (in key order):
    key:      string table index (always interned)
    present:  1 byte
    tag:      value type, if present
    value:    the value, if present
```

Type tags are `0` Integer, `1` Boolean, `2` Double, `3` Bytes, `4` String,
`5` Object, `6` Array. Nested objects are free-form too. Arrays write their
element count, then a tag and value for every element. Free-form values are
never pooled and never collapsed to absent; an entry is only absent if its
value is explicitly `None`.

# Packed Messages

[`Compress`][crate::Compress] can wrap a finished message in a marker byte:
`0` for the message as-is, or `1` for a standard zstd frame that records its
decompressed size. Unpacking refuses messages larger than
[`MAX_MESSAGE_SIZE`][crate::MAX_MESSAGE_SIZE].

*/
