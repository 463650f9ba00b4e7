//! Frozen memory image reader/writer
//!
//! A frozen memory image is a relocatable snapshot of in-memory data
//! structures. Instead of absolute addresses it stores pointers relative to
//! their own storage location, and names are stored as zeroed slots listed
//! in a trailing patch table.
//!
//! # Format Overview
//!
//! ## Container header
//!
//! - `frozen_byte_length: i32`
//! - `buffer_size: i32` (rehydrated size, may exceed the frozen length)
//! - `max_alignment: u16`
//! - `padding_length: u16`, followed by that many zero bytes
//! - Frozen region
//! - 8 reserved zero bytes
//! - Name patch table
//!
//! ## Frozen region (sparse key table)
//!
//! - Sparse key array (`name`, `index`, `next_index`, `priority`), 20-byte slots
//! - Derived lookup index array (`i32`)
//! - Struct schema (`name`, `kind`)
//! - One row per live key, fields laid out in schema order
//!
//! Variable-length payloads (strings, nested arrays) follow the fixed-shape
//! records in a detached region, de-duplicated by content digest.

mod image;
pub mod name;
mod pointer;
pub mod property;
mod reader;
pub mod table;
mod writer;

pub use image::{FrozenImage, WriteOptions, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_ALIGNMENT};
pub use name::{Name, NameMap, NamePatch, NamePatchTable, NameRecorder};
pub use pointer::RelativePointer;
pub use property::{Property, PropertyDescriptor, ScalarKind, Value, ARRAY_SUFFIX};
pub use reader::FrozenReader;
pub use table::{derive_index_array, DataTable, Key, Row};
pub use writer::{content_digest, FrozenOutput, FrozenWriter, Pending};

/// Errors from frozen image decoding and encoding
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Malformed array header at {offset:#x}: num ({num}) != max ({max})")]
    MalformedArrayHeader { offset: u64, num: i32, max: i32 },

    #[error("Invalid boolean encoding at {offset:#x}: {value}")]
    InvalidBooleanEncoding { offset: u64, value: u8 },

    #[error("Serialized string at {offset:#x} is not null terminated")]
    StringNotNullTerminated { offset: u64 },

    #[error("Invalid UTF-16 string payload at {offset:#x}")]
    InvalidUtf16 { offset: u64 },

    #[error("Unknown property kind {kind} at {offset:#x}")]
    UnknownPropertyKind { offset: u64, kind: i32 },

    #[error("Pointer at {offset:#x} targets {target:#x}, outside buffer of {len} bytes")]
    PointerOutOfRange { offset: u64, target: i64, len: usize },

    #[error("Unexpected end of data at {offset:#x}: need {needed} bytes")]
    UnexpectedEof { offset: u64, needed: usize },

    #[error("Invalid element count {count} at {offset:#x}")]
    InvalidCount { offset: u64, count: i32 },

    #[error("Missing name at {offset:#x}")]
    MissingName { offset: u64 },

    #[error("Name table has no entry {index}")]
    UnknownNameIndex { index: i32 },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Round `pos` up to the next multiple of `align` (a power of two)
#[inline]
pub(crate) fn align_up(pos: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (pos + align - 1) & !(align - 1)
}
