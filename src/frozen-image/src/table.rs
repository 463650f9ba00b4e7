//! Sparse key table container
//!
//! The frozen region holds a sparse array of keys, a lookup index derived
//! from key priorities, the struct schema and one row per live key. On
//! write the keys are re-derived from the current rows and the lookup
//! index is regenerated from them.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, Write};

use serde::{Deserialize, Serialize};

use crate::image::{FrozenImage, WriteOptions};
use crate::name::{Name, NameMap};
use crate::property::{Property, PropertyDescriptor};
use crate::reader::FrozenReader;
use crate::writer::{FrozenOutput, FrozenWriter, Pending};
use crate::{Error, Result};

/// Fixed slot size of a key in the sparse array
pub const KEY_STRIDE: usize = 20;

/// Minimum bucket count of the lookup index
const MIN_INDEX_LEN: usize = 16;

/// One entry of the sparse key table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub name: Option<Name>,
    /// Position of the row in the value array
    pub index: i32,
    /// Carried through unchanged; only used as a sort tie-break
    pub next_index: i32,
    /// Position in the derived lookup index
    pub priority: i32,
}

impl Key {
    fn read(reader: &mut FrozenReader<'_>) -> Result<Self> {
        Ok(Self {
            name: reader.read_name(),
            index: reader.read_i32()?,
            next_index: reader.read_i32()?,
            priority: reader.read_i32()?,
        })
    }
}

/// A row of field values, named after its key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub name: Option<Name>,
    pub fields: Vec<Property>,
}

impl Row {
    pub fn new(name: Name, fields: Vec<Property>) -> Self {
        Self {
            name: Some(name),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Property> {
        self.fields.iter().find(|p| p.name.value == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.fields.iter_mut().find(|p| p.name.value == name)
    }
}

/// Build the lookup index from a key list
///
/// Keys are ordered by ascending priority, ties by descending `next_index`.
/// Gaps in priority become `-1`; a key whose priority was already taken is
/// dropped. The result is padded with `-1` to `max(16, next_power_of_two)`
/// unless it holds exactly one entry.
pub fn derive_index_array(keys: &[Key]) -> Vec<i32> {
    let mut sorted: Vec<&Key> = keys.iter().collect();
    sorted.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.next_index.cmp(&a.next_index))
    });

    let mut out = Vec::with_capacity(keys.len());
    // Widened so that priority i32::MAX cannot overflow the cursor
    let mut cursor = 0i64;
    for key in sorted {
        let priority = i64::from(key.priority);
        if priority < cursor {
            continue;
        }
        for _ in cursor..priority {
            out.push(-1);
        }
        out.push(key.index);
        cursor = priority + 1;
    }

    if out.len() != 1 {
        let len = out.len().next_power_of_two().max(MIN_INDEX_LEN);
        out.resize(len, -1);
    }
    out
}

/// Allocation bit array with one set bit per key, packed in 32-bit words
fn allocation_words(count: usize) -> Vec<u8> {
    let mut words = vec![u32::MAX; count.div_ceil(32)];
    let rem = count % 32;
    if rem > 0 {
        if let Some(last) = words.last_mut() {
            *last = (1u32 << rem) - 1;
        }
    }
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Decoded sparse key table
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataTable {
    keys: Vec<Key>,
    indexes: Vec<i32>,
    schema: Vec<PropertyDescriptor>,
    rows: Vec<Row>,
    #[serde(skip)]
    options: WriteOptions,
}

impl DataTable {
    /// Empty table with the given schema
    pub fn new(schema: Vec<PropertyDescriptor>) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Read a container (header, frozen region, patch table) from a stream
    pub fn read<R, N>(reader: &mut R, names: &N) -> Result<Self>
    where
        R: Read + Seek,
        N: NameMap + ?Sized,
    {
        let image = FrozenImage::read(reader, names)?;
        Self::from_image(&image)
    }

    pub fn from_image(image: &FrozenImage) -> Result<Self> {
        let names = image.names.resolver();
        let mut table = Self::read_frozen(&image.frozen, image.frozen_offset, &names)?;
        table.options = image.options;
        Ok(table)
    }

    /// Decode a frozen region whose name slots are given by `names`
    pub fn read_frozen(frozen: &[u8], base: u64, names: &HashMap<i32, Name>) -> Result<Self> {
        let mut reader = FrozenReader::new(frozen, base).with_names(names);

        let keys = reader.read_sparse_array(KEY_STRIDE, Key::read)?;
        let indexes = reader.read_i32_array()?;
        let schema = reader.read_array(PropertyDescriptor::read)?;

        let align = match schema.first() {
            Some(first) => first.row_alignment(reader.offset())?,
            None if keys.is_empty() => 1,
            None => {
                return Err(Error::SchemaMismatch(format!(
                    "{} keys but the schema is empty",
                    keys.len()
                )))
            }
        };
        reader.align(align);
        let values = reader.read_aligned_array(align, |r| r.decode_struct(&schema))?;

        if values.len() != keys.len() {
            return Err(Error::SchemaMismatch(format!(
                "{} rows for {} keys",
                values.len(),
                keys.len()
            )));
        }

        let rows: Vec<Row> = keys
            .iter()
            .zip(values)
            .map(|(key, fields)| Row {
                name: key.name.clone(),
                fields,
            })
            .collect();

        tracing::debug!(
            keys = keys.len(),
            fields = schema.len(),
            rows = rows.len(),
            "sparse key table decoded"
        );

        Ok(Self {
            keys,
            indexes,
            schema,
            rows,
            options: WriteOptions::default(),
        })
    }

    /// Write the container (header, frozen region, patch table)
    ///
    /// `origin` is the number of bytes already written since the 16-byte
    /// alignment boundary of the enclosing export.
    pub fn write<W: Write>(&self, writer: &mut W, origin: u64) -> Result<()> {
        self.to_image()?.write(writer, origin)
    }

    pub fn to_image(&self) -> Result<FrozenImage> {
        let out = self.write_frozen()?;
        Ok(FrozenImage {
            options: self.options,
            frozen_offset: 0,
            frozen: out.bytes,
            names: out.names,
        })
    }

    /// Encode the frozen region
    pub fn write_frozen(&self) -> Result<FrozenOutput> {
        self.validate_rows()?;
        let keys = self.reconcile_keys()?;
        let indexes = derive_index_array(&keys);
        let index_bytes: Vec<u8> = indexes.iter().flat_map(|i| i.to_le_bytes()).collect();

        let mut writer = FrozenWriter::new(&self.schema);

        // Sparse key array: data, allocation bits, no free list
        let site = writer.write_placeholder_pointer(keys.len(), None)?;
        writer.enqueue(Pending::Target(site));
        for key in &keys {
            writer.enqueue(Pending::Key(key));
        }
        let site = writer.write_placeholder_pointer(keys.len(), None)?;
        writer.enqueue(Pending::RawView {
            site,
            bytes: allocation_words(keys.len()),
        });
        writer.write_i32(-1);
        writer.write_i32(0);

        // The lookup index is stored with a zero capacity
        let site = writer.write_placeholder_pointer(indexes.len(), Some(0))?;
        writer.enqueue(Pending::RawView {
            site,
            bytes: index_bytes,
        });

        let site = writer.write_placeholder_pointer(self.schema.len(), None)?;
        writer.enqueue(Pending::Target(site));
        for descriptor in &self.schema {
            writer.enqueue(Pending::Descriptor(descriptor));
        }

        let site = writer.write_placeholder_pointer(self.rows.len(), None)?;
        let align = if self.schema.is_empty() {
            1
        } else {
            writer.row_alignment()?
        };
        writer.enqueue(Pending::Realign(align));
        writer.enqueue(Pending::Target(site));
        for row in &self.rows {
            writer.enqueue(Pending::Realign(align));
            writer.enqueue(Pending::Row(&row.fields));
        }

        let out = writer.finish()?;
        tracing::debug!(
            keys = keys.len(),
            rows = self.rows.len(),
            len = out.bytes.len(),
            patches = out.names.len(),
            "sparse key table encoded"
        );
        Ok(out)
    }

    /// Keys for the current rows
    ///
    /// A row keeps the priority and `next_index` of the prior key with the
    /// same name; rows without one get fresh priorities past the highest
    /// seen. `index` is always the row's current position.
    pub fn reconcile_keys(&self) -> Result<Vec<Key>> {
        let mut prior: HashMap<Option<&Name>, VecDeque<&Key>> = HashMap::new();
        for key in &self.keys {
            prior.entry(key.name.as_ref()).or_default().push_back(key);
        }
        let mut next_priority = self
            .keys
            .iter()
            .map(|k| i64::from(k.priority) + 1)
            .max()
            .unwrap_or(0);

        let mut keys = Vec::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            let index = i32::try_from(position)
                .map_err(|_| Error::SchemaMismatch(format!("row {position} beyond i32 range")))?;
            let reused = prior
                .get_mut(&row.name.as_ref())
                .and_then(VecDeque::pop_front);
            let key = match reused {
                Some(key) => Key {
                    name: key.name.clone(),
                    index,
                    next_index: key.next_index,
                    priority: key.priority,
                },
                None => {
                    let priority = i32::try_from(next_priority).map_err(|_| {
                        Error::SchemaMismatch(format!(
                            "no priority left for new row at {position}"
                        ))
                    })?;
                    next_priority += 1;
                    Key {
                        name: row.name.clone(),
                        index,
                        next_index: -1,
                        priority,
                    }
                }
            };
            keys.push(key);
        }
        Ok(keys)
    }

    fn validate_rows(&self) -> Result<()> {
        self.rows.iter().try_for_each(|row| self.validate_row(row))
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        let label = row.name.as_ref().map(Name::to_string).unwrap_or_default();
        if row.fields.len() != self.schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "row '{label}' has {} fields, schema has {}",
                row.fields.len(),
                self.schema.len()
            )));
        }
        for (field, descriptor) in row.fields.iter().zip(&self.schema) {
            let kind = descriptor.kind().ok_or(Error::UnknownPropertyKind {
                offset: 0,
                kind: descriptor.underlying_type,
            })?;
            if field.value.kind() != kind || field.value.is_array() != descriptor.is_array() {
                return Err(Error::SchemaMismatch(format!(
                    "row '{label}' field '{}' does not match {}{}",
                    descriptor.name,
                    kind.type_name(),
                    if descriptor.is_array() { " array" } else { "" }
                )));
            }
            if let Some(item) = field.value.mismatched_element() {
                return Err(Error::SchemaMismatch(format!(
                    "row '{label}' field '{}' holds a {} element",
                    descriptor.name,
                    if item.is_array() { "nested array" } else { item.kind().type_name() }
                )));
            }
        }
        Ok(())
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Lookup index as read; writes always regenerate it
    pub fn indexes(&self) -> &[i32] {
        &self.indexes
    }

    pub fn schema(&self) -> &[PropertyDescriptor] {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn options(&self) -> WriteOptions {
        self.options
    }

    pub fn set_options(&mut self, options: WriteOptions) {
        self.options = options;
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.name.as_ref().is_some_and(|n| n.to_string() == name))
    }

    /// Row whose key name displays as `name`
    pub fn row(&self, name: &str) -> Option<&Row> {
        self.position(name).map(|i| &self.rows[i])
    }

    pub fn row_mut(&mut self, name: &str) -> Option<&mut Row> {
        self.position(name).map(move |i| &mut self.rows[i])
    }

    /// Append a row; its key is created on the next write
    pub fn insert_row(&mut self, row: Row) -> Result<()> {
        self.validate_row(&row)?;
        if let Some(name) = &row.name {
            if self.position(&name.to_string()).is_some() {
                return Err(Error::SchemaMismatch(format!("row '{name}' already exists")));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove a row; its key disappears on the next write
    pub fn remove_row(&mut self, name: &str) -> Option<Row> {
        self.position(name).map(|i| self.rows.remove(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{ScalarKind, Value};
    use std::io::Cursor;

    const NAMES: &[&str] = &[
        "None",
        "Potion",
        "Ether",
        "Elixir",
        "Count",
        "Usable",
        "Label",
        "Category",
        "Weight",
        "Serial",
        "Tags_Array",
        "Stacks_Array",
        "Notes_Array",
        "Consumable",
        "Rare",
        "Phoenix",
    ];

    fn names() -> Vec<String> {
        NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn name(value: &str) -> Name {
        let index = NAMES.iter().position(|n| *n == value).unwrap();
        Name::new(index as i32, 0, value)
    }

    fn key(index: i32, next_index: i32, priority: i32) -> Key {
        Key {
            name: None,
            index,
            next_index,
            priority,
        }
    }

    fn schema() -> Vec<PropertyDescriptor> {
        vec![
            PropertyDescriptor::new(name("Count"), ScalarKind::Int32),
            PropertyDescriptor::new(name("Usable"), ScalarKind::Bool),
            PropertyDescriptor::new(name("Label"), ScalarKind::Str),
            PropertyDescriptor::new(name("Category"), ScalarKind::Name),
            PropertyDescriptor::new(name("Weight"), ScalarKind::Float),
            PropertyDescriptor::new(name("Serial"), ScalarKind::Int64),
            PropertyDescriptor::new(name("Tags_Array"), ScalarKind::Name),
            PropertyDescriptor::new(name("Stacks_Array"), ScalarKind::Int16),
            PropertyDescriptor::new(name("Notes_Array"), ScalarKind::Str),
        ]
    }

    fn item(row: &str, count: i32, label: Option<&str>, tags: &[&str], stacks: &[i16]) -> Row {
        let values = vec![
            Value::Int32(count),
            Value::Bool(count % 2 == 0),
            Value::Str(label.map(str::to_string)),
            Value::Name(Some(name("Consumable"))),
            Value::Float(count as f32 * 0.5),
            Value::Int64(i64::from(count) << 40),
            Value::Array {
                kind: ScalarKind::Name,
                items: tags.iter().map(|t| Value::Name(Some(name(t)))).collect(),
            },
            Value::Array {
                kind: ScalarKind::Int16,
                items: stacks.iter().map(|&s| Value::Int16(s)).collect(),
            },
            Value::Array {
                kind: ScalarKind::Str,
                items: vec![Value::Str(Some("stackable".into())), Value::Str(None)],
            },
        ];
        let fields = schema()
            .into_iter()
            .zip(values)
            .map(|(d, v)| Property::new(d.name, v))
            .collect();
        Row::new(name(row), fields)
    }

    fn sample_table() -> DataTable {
        let mut table = DataTable::new(schema());
        table
            .insert_row(item("Potion", 3, Some("Restores HP"), &["Consumable"], &[1, 99]))
            .unwrap();
        table
            .insert_row(item("Ether", 4, Some("Restores MP"), &["Consumable", "Rare"], &[1, 99]))
            .unwrap();
        table
            .insert_row(item("Elixir", 7, None, &[], &[]))
            .unwrap();
        table
    }

    fn values(table: &DataTable) -> Vec<Vec<Value>> {
        table
            .rows()
            .iter()
            .map(|r| r.fields.iter().map(|f| f.value.clone()).collect())
            .collect()
    }

    fn write_container(table: &DataTable) -> Vec<u8> {
        let mut bytes = vec![0u8; 12];
        table.write(&mut bytes, 12).unwrap();
        bytes
    }

    fn read_container(bytes: &[u8]) -> DataTable {
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(12);
        DataTable::read(&mut cursor, &names()).unwrap()
    }

    #[test]
    fn test_derive_index_array_priority_gaps() {
        let keys = [key(10, -1, 0), key(11, 3, 2), key(12, 7, 2), key(13, -1, 5)];
        let index = derive_index_array(&keys);
        assert_eq!(index.len(), 16);
        assert_eq!(&index[..6], &[10, -1, 12, -1, -1, 13]);
        assert!(index[6..].iter().all(|&i| i == -1));
        assert!(!index.contains(&11));
    }

    #[test]
    fn test_derive_index_array_padding() {
        assert_eq!(derive_index_array(&[key(4, -1, 0)]), vec![4]);
        assert_eq!(derive_index_array(&[]), vec![-1; 16]);

        let many: Vec<Key> = (0..17).map(|i| key(i, -1, i)).collect();
        let index = derive_index_array(&many);
        assert_eq!(index.len(), 32);
        assert_eq!(index[16], 16);
        assert_eq!(index[17], -1);
    }

    #[test]
    fn test_derive_index_array_is_order_independent() {
        let keys = [key(0, -1, 1), key(1, -1, 0), key(2, -1, 3)];
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_eq!(derive_index_array(&keys), derive_index_array(&reversed));
        assert_eq!(&derive_index_array(&keys)[..4], &[1, 0, -1, 2]);
    }

    #[test]
    fn test_allocation_words() {
        assert!(allocation_words(0).is_empty());
        assert_eq!(allocation_words(5), 0b11111u32.to_le_bytes().to_vec());
        let words = allocation_words(33);
        assert_eq!(&words[..4], &u32::MAX.to_le_bytes());
        assert_eq!(&words[4..], &1u32.to_le_bytes());
    }

    #[test]
    fn test_round_trip_is_byte_exact() {
        let table = sample_table();
        let first = write_container(&table);

        let parsed = read_container(&first);
        assert_eq!(values(&parsed), values(&table));
        assert_eq!(parsed.rows()[1].name, Some(name("Ether")));
        assert_eq!(parsed.options(), WriteOptions::default());

        let second = write_container(&parsed);
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_keys_and_index() {
        let parsed = read_container(&write_container(&sample_table()));
        let priorities: Vec<i32> = parsed.keys().iter().map(|k| k.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
        assert!(parsed.keys().iter().all(|k| k.next_index == -1));
        assert_eq!(parsed.indexes().len(), 16);
        assert_eq!(&parsed.indexes()[..4], &[0, 1, 2, -1]);
    }

    #[test]
    fn test_shared_payloads_decode_independently() {
        // Potion and Ether share the stack array payload
        let parsed = read_container(&write_container(&sample_table()));
        let potion = parsed.row("Potion").unwrap();
        let ether = parsed.row("Ether").unwrap();
        assert_eq!(
            potion.field("Stacks_Array").unwrap().value,
            ether.field("Stacks_Array").unwrap().value
        );
        assert_eq!(
            ether.field("Tags_Array").unwrap().value,
            Value::Array {
                kind: ScalarKind::Name,
                items: vec![
                    Value::Name(Some(name("Consumable"))),
                    Value::Name(Some(name("Rare")))
                ],
            }
        );
        let elixir = parsed.row("Elixir").unwrap();
        assert_eq!(elixir.field("Label").unwrap().value, Value::Str(None));
    }

    #[test]
    fn test_mutation_survives_round_trip() {
        let mut table = read_container(&write_container(&sample_table()));
        table.row_mut("Potion").unwrap().field_mut("Count").unwrap().value = Value::Int32(42);
        table.remove_row("Ether").unwrap();
        table
            .insert_row(item("Phoenix", 1, Some("Revives"), &["Rare"], &[5]))
            .unwrap();

        let parsed = read_container(&write_container(&table));
        assert_eq!(parsed.rows().len(), 3);
        assert_eq!(
            parsed.row("Potion").unwrap().field("Count").unwrap().value,
            Value::Int32(42)
        );
        assert!(parsed.row("Ether").is_none());

        let phoenix = parsed.keys().iter().find(|k| k.name == Some(name("Phoenix"))).unwrap();
        assert_eq!(phoenix.priority, 3);
        assert_eq!(phoenix.next_index, -1);
        assert_eq!(phoenix.index, 2);
        // Ether's priority slot is now a hole
        assert_eq!(&parsed.indexes()[..4], &[0, -1, 1, 2]);
    }

    #[test]
    fn test_insert_row_validates_schema() {
        let mut table = sample_table();
        let mut bad = item("Phoenix", 1, None, &[], &[]);
        bad.fields[0].value = Value::UInt32(1);
        assert!(matches!(
            table.insert_row(bad),
            Err(Error::SchemaMismatch(_))
        ));

        let duplicate = item("Potion", 1, None, &[], &[]);
        assert!(matches!(
            table.insert_row(duplicate),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_array_elements_must_match_kind() {
        let mut table = sample_table();
        let mut bad = item("Phoenix", 1, None, &[], &[]);
        bad.field_mut("Stacks_Array").unwrap().value = Value::Array {
            kind: ScalarKind::Int16,
            items: vec![Value::Int32(70000), Value::Int32(5)],
        };
        assert!(matches!(
            table.insert_row(bad),
            Err(Error::SchemaMismatch(_))
        ));

        // Edits through rows_mut are caught when writing
        table.rows_mut()[0].field_mut("Tags_Array").unwrap().value = Value::Array {
            kind: ScalarKind::Name,
            items: vec![Value::Str(Some("Consumable".into()))],
        };
        assert!(matches!(
            table.write_frozen(),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected_on_write() {
        let mystery = PropertyDescriptor {
            name: name("Count"),
            underlying_type: 99,
        };
        let row = Row::new(
            name("Potion"),
            vec![Property::new(name("Count"), Value::Int32(1))],
        );

        let mut table = DataTable::new(vec![mystery]);
        assert!(matches!(
            table.insert_row(row.clone()),
            Err(Error::UnknownPropertyKind { kind: 99, .. })
        ));
        table.rows.push(row);
        assert!(matches!(
            table.write_frozen(),
            Err(Error::UnknownPropertyKind { kind: 99, .. })
        ));
    }

    #[test]
    fn test_reconcile_at_max_priority() {
        let mut table = sample_table();
        table.rows.truncate(1);
        table.keys = vec![Key {
            name: Some(name("Potion")),
            index: 0,
            next_index: -1,
            priority: i32::MAX,
        }];

        let keys = table.reconcile_keys().unwrap();
        assert_eq!(keys[0].priority, i32::MAX);

        // A new row would need priority i32::MAX + 1
        table
            .insert_row(item("Phoenix", 1, None, &[], &[]))
            .unwrap();
        assert!(matches!(
            table.reconcile_keys(),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_derive_index_array_drops_negative_priority() {
        let index = derive_index_array(&[key(3, -1, -2), key(4, -1, 1)]);
        assert_eq!(&index[..2], &[-1, 4]);
        assert!(!index.contains(&3));
    }

    #[test]
    fn test_rows_without_schema_rejected() {
        let mut table = DataTable::new(Vec::new());
        table.rows.push(Row::new(name("Potion"), Vec::new()));
        assert!(matches!(
            table.write_frozen(),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_empty_table_round_trip() {
        let table = DataTable::new(schema());
        let first = write_container(&table);
        let parsed = read_container(&first);
        assert!(parsed.rows().is_empty());
        assert_eq!(parsed.schema(), schema().as_slice());
        assert_eq!(write_container(&parsed), first);
    }

    #[test]
    fn test_array_first_field_round_trip() {
        let schema = vec![
            PropertyDescriptor::new(name("Stacks_Array"), ScalarKind::Int16),
            PropertyDescriptor::new(name("Usable"), ScalarKind::Bool),
        ];
        let mut table = DataTable::new(schema.clone());
        for (row, flag) in [("Potion", true), ("Ether", false)] {
            let fields = vec![
                Property::new(
                    schema[0].name.clone(),
                    Value::Array {
                        kind: ScalarKind::Int16,
                        items: vec![Value::Int16(3)],
                    },
                ),
                Property::new(schema[1].name.clone(), Value::Bool(flag)),
            ];
            table.insert_row(Row::new(name(row), fields)).unwrap();
        }

        let first = write_container(&table);
        let parsed = read_container(&first);
        assert_eq!(values(&parsed), values(&table));
        assert_eq!(write_container(&parsed), first);
    }

    #[test]
    fn test_key_count_mismatch_is_schema_error() -> anyhow::Result<()> {
        let out = sample_table().write_frozen()?;
        let mut frozen = out.bytes;
        // Shrink the row array header (5th placeholder, at 72) to two entries
        frozen[80..84].copy_from_slice(&2i32.to_le_bytes());
        frozen[84..88].copy_from_slice(&2i32.to_le_bytes());
        let err = DataTable::read_frozen(&frozen, 0, &out.names.resolver()).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
        Ok(())
    }

    #[test]
    fn test_table_serializes_to_json() -> anyhow::Result<()> {
        let json = serde_json::to_value(sample_table())?;
        assert_eq!(json["rows"].as_array().map(Vec::len), Some(3));
        assert_eq!(json["schema"][0]["name"]["value"], "Count");
        Ok(())
    }
}
