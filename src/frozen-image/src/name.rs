//! Names and the trailing name patch table
//!
//! Frozen storage cannot hold a live name reference, so every name slot is
//! written as 8 zero bytes and its real identity is listed in a patch table
//! after the frozen region:
//!
//! - `count: i32`
//! - `count` records of `(name_table_index: i32, instance_number: i32,
//!   patch_count: i32, patch_offsets: i32 * patch_count)`
//!
//! Records are sorted by name table index, then instance number.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A name table reference with its resolved text
///
/// Identity is `(index, number)`; `value` is carried for display and for
/// schema decisions such as the array suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    pub index: i32,
    pub number: i32,
    pub value: String,
}

impl Name {
    pub fn new(index: i32, number: i32, value: impl Into<String>) -> Self {
        Self {
            index,
            number,
            value: value.into(),
        }
    }

    pub fn identity(&self) -> (i32, i32) {
        (self.index, self.number)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Instance numbers are stored one-based; zero means "no suffix"
        if self.number > 0 {
            write!(f, "{}_{}", self.value, self.number - 1)
        } else {
            f.write_str(&self.value)
        }
    }
}

/// Name table lookup provided by the surrounding asset container
pub trait NameMap {
    fn lookup(&self, index: i32) -> Option<&str>;

    /// Build a [`Name`] for a serialized `(index, number)` pair
    fn resolve(&self, index: i32, number: i32) -> Result<Name> {
        let value = self.lookup(index).ok_or(Error::UnknownNameIndex { index })?;
        Ok(Name::new(index, number, value))
    }
}

impl NameMap for [String] {
    fn lookup(&self, index: i32) -> Option<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.get(i))
            .map(String::as_str)
    }
}

impl NameMap for Vec<String> {
    fn lookup(&self, index: i32) -> Option<&str> {
        self.as_slice().lookup(index)
    }
}

/// Every frozen-region offset where one name must be substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePatch {
    pub name: Name,
    pub byte_offsets: Vec<i32>,
}

/// Trailing name patch table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePatchTable {
    patches: Vec<NamePatch>,
}

impl NamePatchTable {
    pub fn new(patches: Vec<NamePatch>) -> Self {
        Self { patches }
    }

    pub fn patches(&self) -> &[NamePatch] {
        &self.patches
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Parse a patch table, resolving name text through `names`
    pub fn read<R: Read, N: NameMap + ?Sized>(reader: &mut R, names: &N) -> Result<Self> {
        let count = read_count(reader)?;
        let mut patches = Vec::new();
        for _ in 0..count {
            let index = reader.read_i32::<LE>()?;
            let number = reader.read_i32::<LE>()?;
            let name = names.resolve(index, number)?;

            let offset_count = read_count(reader)?;
            let mut byte_offsets = Vec::new();
            for _ in 0..offset_count {
                byte_offsets.push(reader.read_i32::<LE>()?);
            }
            patches.push(NamePatch { name, byte_offsets });
        }
        Ok(Self { patches })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<LE>(count_to_i32(self.patches.len())?)?;
        for patch in &self.patches {
            writer.write_i32::<LE>(patch.name.index)?;
            writer.write_i32::<LE>(patch.name.number)?;
            writer.write_i32::<LE>(count_to_i32(patch.byte_offsets.len())?)?;
            for &offset in &patch.byte_offsets {
                writer.write_i32::<LE>(offset)?;
            }
        }
        Ok(())
    }

    /// Map from frozen-region offset to the name stored there
    pub fn resolver(&self) -> HashMap<i32, Name> {
        let mut map = HashMap::new();
        for patch in &self.patches {
            for &offset in &patch.byte_offsets {
                map.insert(offset, patch.name.clone());
            }
        }
        map
    }
}

/// Collects name slot offsets while a frozen region is written
#[derive(Debug, Default)]
pub struct NameRecorder {
    slots: BTreeMap<(i32, i32), NamePatch>,
}

impl NameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &Name, offset: i32) {
        self.slots
            .entry(name.identity())
            .or_insert_with(|| NamePatch {
                name: name.clone(),
                byte_offsets: Vec::new(),
            })
            .byte_offsets
            .push(offset);
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Finish recording; patches come out sorted by `(index, number)`
    pub fn into_table(self) -> NamePatchTable {
        NamePatchTable::new(self.slots.into_values().collect())
    }
}

fn read_count<R: Read>(reader: &mut R) -> Result<usize> {
    let count = reader.read_i32::<LE>()?;
    usize::try_from(count).map_err(|_| Error::InvalidCount { offset: 0, count })
}

pub(crate) fn count_to_i32(count: usize) -> Result<i32> {
    i32::try_from(count)
        .map_err(|_| Error::SchemaMismatch(format!("{count} elements exceed the i32 range")))
}
