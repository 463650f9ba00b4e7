//! Frozen region writer
//!
//! Emission happens in two phases. Header records are written eagerly with
//! placeholder pointers; their payloads are queued and drained later:
//!
//! 1. Primary queue: fixed-shape records (keys, schema, rows, raw views)
//! 2. 8-byte alignment
//! 3. Indirect queue: detached variable-length payloads (strings, arrays)
//! 4. 16-byte alignment, then every placeholder pointer is back-patched
//!
//! Payload blobs are keyed by the leading 8 bytes of their SHA-1 digest so
//! that identical arrays share storage. The truncated digest is part of the
//! format's identity; a 64-bit collision would alias two different blobs.

use std::collections::{BTreeMap, HashMap, VecDeque};

use byteorder::{ByteOrder, LE};
use sha1::{Digest, Sha1};

use crate::name::{Name, NamePatchTable, NameRecorder};
use crate::pointer::RelativePointer;
use crate::property::{Property, PropertyDescriptor, ScalarKind, Value};
use crate::table::Key;
use crate::{align_up, Error, Result};

/// Leading 8 bytes of the SHA-1 digest, little-endian
pub fn content_digest(bytes: &[u8]) -> u64 {
    LE::read_u64(&Sha1::digest(bytes)[..8])
}

/// Deferred emission item
#[derive(Debug, Clone)]
pub enum Pending<'g> {
    /// Pad the sink to the given alignment
    Realign(usize),
    /// Point the placeholder at `site` to the current position
    Target(usize),
    Key(&'g Key),
    Descriptor(&'g PropertyDescriptor),
    /// A row; expands into a realign plus one item per field
    Row(&'g [Property]),
    Field(&'g Value),
    /// Bytes emitted verbatim; the digest is registered but never looked up
    RawView { site: usize, bytes: Vec<u8> },
    Str { site: usize, text: &'g str },
    Array {
        site: usize,
        kind: ScalarKind,
        items: &'g [Value],
    },
}

fn element_mismatch(kind: ScalarKind, item: &Value) -> Error {
    let found = if item.is_array() {
        "nested array"
    } else {
        item.kind().type_name()
    };
    Error::SchemaMismatch(format!(
        "{} array holds a {found} element",
        kind.type_name()
    ))
}

/// Result of a finished write pass
#[derive(Debug, Clone)]
pub struct FrozenOutput {
    pub bytes: Vec<u8>,
    pub names: NamePatchTable,
}

/// Append-only writer for one frozen region
///
/// All patch and de-duplication state is scoped to one writer; nothing is
/// shared between passes.
pub struct FrozenWriter<'g> {
    buf: Vec<u8>,
    primary: VecDeque<Pending<'g>>,
    indirect: VecDeque<Pending<'g>>,
    pointers: BTreeMap<usize, usize>,
    blobs: HashMap<u64, usize>,
    /// Name arrays are hashed over their inline identities but stored as
    /// zeroed slots; in `blobs` a scalar array with the same identity bytes
    /// would alias those slots
    name_blobs: HashMap<u64, usize>,
    names: NameRecorder,
    schema: &'g [PropertyDescriptor],
    /// Transient writers store name identities inline and skip patching
    patch_names: bool,
}

impl<'g> FrozenWriter<'g> {
    pub fn new(schema: &'g [PropertyDescriptor]) -> Self {
        Self {
            buf: Vec::new(),
            primary: VecDeque::new(),
            indirect: VecDeque::new(),
            pointers: BTreeMap::new(),
            blobs: HashMap::new(),
            name_blobs: HashMap::new(),
            names: NameRecorder::new(),
            schema,
            patch_names: true,
        }
    }

    /// Scratch writer producing a canonical image for hashing
    fn transient(schema: &'g [PropertyDescriptor]) -> Self {
        Self {
            patch_names: false,
            ..Self::new(schema)
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn align(&mut self, align: usize) {
        let aligned = align_up(self.buf.len(), align);
        self.buf.resize(aligned, 0);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Zero pointer followed by `num`/`max`, 8-byte aligned; returns the site
    ///
    /// `max` defaults to `len`. Overriding it reproduces headers whose
    /// capacity differs from their length.
    pub fn write_placeholder_pointer(&mut self, len: usize, max: Option<i32>) -> Result<usize> {
        let num = crate::name::count_to_i32(len)?;
        self.align(8);
        let site = self.position();
        self.write_bytes(&[0; RelativePointer::SIZE]);
        self.write_i32(num);
        self.write_i32(max.unwrap_or(num));
        Ok(site)
    }

    /// Record that the pointer at `site` targets `target`
    pub fn add_pointer(&mut self, site: usize, target: usize) {
        self.pointers.insert(site, target);
    }

    pub fn enqueue(&mut self, item: Pending<'g>) {
        self.primary.push_back(item);
    }

    pub fn enqueue_indirect(&mut self, item: Pending<'g>) {
        self.indirect.push_back(item);
    }

    /// 4-byte aligned name slot
    ///
    /// In patch mode the slot is zeroed and its offset recorded; transient
    /// writers store `(index, number)` inline instead.
    pub fn write_name(&mut self, name: Option<&Name>) -> Result<()> {
        self.align(4);
        match (name, self.patch_names) {
            (None, true) => self.write_bytes(&0u64.to_le_bytes()),
            (None, false) => self.write_bytes(&(-1i64).to_le_bytes()),
            (Some(name), true) => {
                let offset = self.slot_offset()?;
                self.names.record(name, offset);
                self.write_bytes(&0u64.to_le_bytes());
            }
            (Some(name), false) => {
                self.write_i32(name.index);
                self.write_i32(name.number);
            }
        }
        Ok(())
    }

    fn slot_offset(&self) -> Result<i32> {
        i32::try_from(self.position()).map_err(|_| {
            Error::SchemaMismatch(format!(
                "name slot at {:#x} beyond the patch table range",
                self.position()
            ))
        })
    }

    /// Offset of a previously emitted blob usable at `align`
    fn reusable(&self, digest: u64, align: usize) -> Option<usize> {
        self.blobs
            .get(&digest)
            .copied()
            .filter(|offset| offset % align == 0)
    }

    /// Align, point `site` at the current position and register `digest`
    fn claim_payload(&mut self, site: usize, digest: u64, align: usize) -> usize {
        self.align(align);
        let offset = self.position();
        self.add_pointer(site, offset);
        self.blobs.insert(digest, offset);
        offset
    }

    /// Emit `bytes` at `align` unless identical content already exists,
    /// pointing the placeholder at `site` to whichever copy is used
    pub fn write_deduplicated_blob(&mut self, site: usize, bytes: &[u8], align: usize) -> usize {
        let digest = content_digest(bytes);
        if let Some(offset) = self.reusable(digest, align) {
            tracing::trace!(site, offset, digest, "reusing blob");
            self.add_pointer(site, offset);
            return offset;
        }
        let offset = self.claim_payload(site, digest, align);
        self.write_bytes(bytes);
        offset
    }

    /// Null-terminated UTF-16 payload
    ///
    /// Strings register their digest for later array lookups but never reuse
    /// an earlier payload themselves.
    fn write_string_blob(&mut self, site: usize, text: &str) -> usize {
        let bytes: Vec<u8> = text
            .encode_utf16()
            .chain(std::iter::once(0))
            .flat_map(u16::to_le_bytes)
            .collect();
        let offset = self.claim_payload(site, content_digest(&bytes), 2);
        self.write_bytes(&bytes);
        offset
    }

    fn write_raw_view(&mut self, site: usize, bytes: &[u8]) {
        let offset = self.position();
        self.add_pointer(site, offset);
        self.blobs.insert(content_digest(bytes), offset);
        self.write_bytes(bytes);
    }

    /// Alignment of each row; an array first field needs pointer alignment
    pub fn row_alignment(&self) -> Result<usize> {
        let first = self.schema.first().ok_or_else(|| {
            Error::SchemaMismatch("rows present but the schema is empty".to_string())
        })?;
        if first.is_array() {
            return Ok(8);
        }
        first.row_alignment(self.position() as u64)
    }

    fn emit(&mut self, item: Pending<'g>) -> Result<()> {
        match item {
            Pending::Realign(align) => self.align(align),
            Pending::Target(site) => {
                let here = self.position();
                self.add_pointer(site, here);
            }
            Pending::Key(key) => {
                self.write_name(key.name.as_ref())?;
                self.write_i32(key.index);
                self.write_i32(key.next_index);
                self.write_i32(key.priority);
            }
            Pending::Descriptor(descriptor) => {
                self.write_name(Some(&descriptor.name))?;
                self.write_i32(descriptor.underlying_type);
            }
            Pending::Row(fields) => {
                let align = self.row_alignment()?;
                self.enqueue(Pending::Realign(align));
                for field in fields {
                    self.enqueue(Pending::Field(&field.value));
                }
            }
            Pending::Field(value) => value.encode(self)?,
            Pending::RawView { site, bytes } => self.write_raw_view(site, &bytes),
            Pending::Str { site, text } => {
                self.write_string_blob(site, text);
            }
            Pending::Array { site, kind, items } => self.write_array(site, kind, items)?,
        }
        Ok(())
    }

    /// Out-of-line array payload
    ///
    /// Elements are first rendered into a transient writer to obtain a
    /// canonical image whose digest decides whether an earlier payload can
    /// be shared. String arrays are never shared.
    fn write_array(&mut self, site: usize, kind: ScalarKind, items: &'g [Value]) -> Result<()> {
        if let Some(item) = items.iter().find(|i| i.is_array() || i.kind() != kind) {
            return Err(element_mismatch(kind, item));
        }

        let mut scratch = FrozenWriter::transient(self.schema);
        for item in items {
            scratch.enqueue(Pending::Field(item));
        }
        let image = scratch.finish()?.bytes;
        let align = kind.payload_alignment();

        match kind {
            ScalarKind::Str => {
                let digest = content_digest(&image);
                self.claim_payload(site, digest, align);
                // Headers first, then every payload, before anything else
                // queued behind this array
                let mut alt = VecDeque::new();
                for item in items {
                    match item {
                        Value::Str(Some(text)) => {
                            let len = text.encode_utf16().count() + 1;
                            let header = self.write_placeholder_pointer(len, None)?;
                            alt.push_back((header, text.as_str()));
                        }
                        Value::Str(None) => {
                            self.write_placeholder_pointer(0, None)?;
                        }
                        other => return Err(element_mismatch(kind, other)),
                    }
                }
                while let Some((header, text)) = alt.pop_front() {
                    self.write_string_blob(header, text);
                }
            }
            ScalarKind::Name => {
                let digest = content_digest(&image);
                if let Some(&offset) = self.name_blobs.get(&digest) {
                    tracing::trace!(site, offset, len = items.len(), "reusing name array");
                    self.add_pointer(site, offset);
                    return Ok(());
                }
                self.align(align);
                let start = self.position();
                self.add_pointer(site, start);
                self.name_blobs.insert(digest, start);
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::Name(Some(name)) => {
                            let offset = crate::name::count_to_i32(start + i * 8)?;
                            self.names.record(name, offset);
                        }
                        Value::Name(None) => {}
                        other => return Err(element_mismatch(kind, other)),
                    }
                }
                self.buf.resize(start + items.len() * 8, 0);
            }
            _ => {
                self.write_deduplicated_blob(site, &image, align);
            }
        }
        Ok(())
    }

    fn drain_primary(&mut self) -> Result<()> {
        while let Some(item) = self.primary.pop_front() {
            self.emit(item)?;
        }
        Ok(())
    }

    fn drain_indirect(&mut self) -> Result<()> {
        while let Some(item) = self.indirect.pop_front() {
            self.emit(item)?;
        }
        Ok(())
    }

    /// Drain both queues and resolve every placeholder pointer
    pub fn finish(mut self) -> Result<FrozenOutput> {
        self.drain_primary()?;
        if self.patch_names {
            self.align(8);
        }
        self.drain_indirect()?;

        if self.patch_names {
            self.align(16);
            for (&site, &target) in &self.pointers {
                let ptr = RelativePointer::encode(site as i64, target as i64);
                LE::write_u64(&mut self.buf[site..site + RelativePointer::SIZE], ptr.raw());
            }
            tracing::debug!(
                len = self.buf.len(),
                pointers = self.pointers.len(),
                blobs = self.blobs.len() + self.name_blobs.len(),
                "frozen region written"
            );
        }

        Ok(FrozenOutput {
            bytes: self.buf,
            names: self.names.into_table(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::FrozenReader;

    fn read_ptr(bytes: &[u8], site: usize) -> usize {
        let raw = LE::read_u64(&bytes[site..site + 8]);
        RelativePointer::from_raw(raw).resolve(site as i64) as usize
    }

    #[test]
    fn test_placeholder_pointer_layout() -> anyhow::Result<()> {
        let mut writer = FrozenWriter::new(&[]);
        writer.write_u8(1);
        let site = writer.write_placeholder_pointer(3, Some(0))?;
        assert_eq!(site, 8);
        let out = writer.finish()?;
        assert_eq!(&out.bytes[16..20], &3i32.to_le_bytes());
        assert_eq!(&out.bytes[20..24], &0i32.to_le_bytes());
        // Unresolved placeholders stay zero
        assert_eq!(&out.bytes[8..16], &[0; 8]);
        assert_eq!(out.bytes.len(), 32);
        Ok(())
    }

    #[test]
    fn test_identical_arrays_share_payload() -> anyhow::Result<()> {
        let a = Value::Array {
            kind: ScalarKind::Int32,
            items: vec![Value::Int32(1), Value::Int32(2)],
        };
        let b = a.clone();

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&a));
        writer.enqueue(Pending::Field(&b));
        let out = writer.finish()?;

        let first = read_ptr(&out.bytes, 0);
        let second = read_ptr(&out.bytes, 16);
        assert_eq!(first, second);
        // Headers (32) + one payload (8), padded to 16
        assert_eq!(out.bytes.len(), 48);
        assert_eq!(&out.bytes[first..first + 4], &1i32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_identical_strings_are_not_shared() -> anyhow::Result<()> {
        let a = Value::Str(Some("Elixir".to_string()));
        let b = a.clone();

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&a));
        writer.enqueue(Pending::Field(&b));
        let out = writer.finish()?;

        let first = read_ptr(&out.bytes, 0);
        let second = read_ptr(&out.bytes, 16);
        assert_ne!(first, second);
        assert_eq!(second - first, 14);

        let mut reader = FrozenReader::new(&out.bytes, 0);
        assert_eq!(reader.read_string()?, Some("Elixir".to_string()));
        assert_eq!(reader.read_string()?, Some("Elixir".to_string()));
        Ok(())
    }

    #[test]
    fn test_array_may_reuse_string_payload() -> anyhow::Result<()> {
        // "A" + terminator is the same byte image as the u16 array [0x41, 0]
        let text = Value::Str(Some("A".to_string()));
        let units = Value::Array {
            kind: ScalarKind::UInt16,
            items: vec![Value::UInt16(0x41), Value::UInt16(0)],
        };

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&text));
        writer.enqueue(Pending::Field(&units));
        let out = writer.finish()?;
        assert_eq!(read_ptr(&out.bytes, 0), read_ptr(&out.bytes, 16));
        Ok(())
    }

    #[test]
    fn test_string_arrays_are_not_shared() -> anyhow::Result<()> {
        let a = Value::Array {
            kind: ScalarKind::Str,
            items: vec![Value::Str(Some("x".to_string())), Value::Str(None)],
        };
        let b = a.clone();

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&a));
        writer.enqueue(Pending::Field(&b));
        let out = writer.finish()?;
        assert_ne!(read_ptr(&out.bytes, 0), read_ptr(&out.bytes, 16));
        Ok(())
    }

    #[test]
    fn test_name_slots_are_recorded() -> anyhow::Result<()> {
        let tags = Value::Array {
            kind: ScalarKind::Name,
            items: vec![
                Value::Name(Some(Name::new(4, 0, "Fire"))),
                Value::Name(None),
                Value::Name(Some(Name::new(4, 0, "Fire"))),
            ],
        };
        let single = Value::Name(Some(Name::new(2, 0, "Ice")));

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&single));
        writer.enqueue(Pending::Field(&tags));
        let out = writer.finish()?;

        let patches = out.names.patches();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].name.value, "Ice");
        assert_eq!(patches[0].byte_offsets, vec![0]);
        let payload = read_ptr(&out.bytes, 8) as i32;
        assert_eq!(patches[1].byte_offsets, vec![payload, payload + 16]);
        Ok(())
    }

    #[test]
    fn test_name_array_never_shares_with_scalars() -> anyhow::Result<()> {
        // Inline identity image of the name equals the two integers
        let names = Value::Array {
            kind: ScalarKind::Name,
            items: vec![Value::Name(Some(Name::new(4, 0, "Fire")))],
        };
        let ints = Value::Array {
            kind: ScalarKind::Int32,
            items: vec![Value::Int32(4), Value::Int32(0)],
        };

        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&names));
        writer.enqueue(Pending::Field(&ints));
        let out = writer.finish()?;

        let ints_at = read_ptr(&out.bytes, 16);
        assert_ne!(read_ptr(&out.bytes, 0), ints_at);
        assert_eq!(&out.bytes[ints_at..ints_at + 4], &4i32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_array_element_kind_mismatch() {
        let stacks = Value::Array {
            kind: ScalarKind::Int16,
            items: vec![Value::Int32(70000), Value::Int32(5)],
        };
        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&stacks));
        assert!(matches!(writer.finish(), Err(Error::SchemaMismatch(_))));

        let tags = Value::Array {
            kind: ScalarKind::Name,
            items: vec![Value::Name(None), Value::Str(Some("Fire".to_string()))],
        };
        let mut writer = FrozenWriter::new(&[]);
        writer.enqueue(Pending::Field(&tags));
        assert!(matches!(writer.finish(), Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_transient_names_are_inline() -> anyhow::Result<()> {
        let name = Name::new(7, 2, "Bolt");
        let mut writer = FrozenWriter::transient(&[]);
        writer.write_name(Some(&name))?;
        writer.write_name(None)?;
        let out = writer.finish()?;
        assert!(out.names.is_empty());
        assert_eq!(&out.bytes[..4], &7i32.to_le_bytes());
        assert_eq!(&out.bytes[4..8], &2i32.to_le_bytes());
        assert_eq!(&out.bytes[8..16], &(-1i64).to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_content_digest_is_truncated_sha1() {
        // SHA-1("abc") = a9993e36 4706816a ...
        assert_eq!(content_digest(b"abc"), 0x6a81_0647_363e_99a9);
    }
}
