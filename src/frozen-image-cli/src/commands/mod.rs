//! CLI subcommand implementations

mod dump;
mod index;
mod roundtrip;

pub use dump::dump;
pub use index::index;
pub use roundtrip::roundtrip;

use anyhow::{Context, Result};
use frozen_image::DataTable;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use crate::cli::SectionArgs;

/// A decoded section with the bytes it was decoded from
pub(crate) struct Section {
    pub table: DataTable,
    pub original: Vec<u8>,
}

/// Name table file: one name per line, index = line number
pub(crate) fn load_names(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read name table {:?}", path))?;
    Ok(text.lines().map(str::to_string).collect())
}

pub(crate) fn load_section(args: &SectionArgs) -> Result<Section> {
    let names = load_names(&args.names)?;
    let data =
        fs::read(&args.input).with_context(|| format!("Failed to read {:?}", args.input))?;

    let mut cursor = Cursor::new(data.as_slice());
    cursor.set_position(args.offset);
    let table = DataTable::read(&mut cursor, &names).with_context(|| {
        format!(
            "Failed to decode section at {:#x} in {:?}",
            args.offset, args.input
        )
    })?;

    let start = usize::try_from(args.offset).context("Offset out of range")?;
    let end = usize::try_from(cursor.position()).context("Section end out of range")?;
    tracing::debug!(start, end, rows = table.rows().len(), "section loaded");

    Ok(Section {
        table,
        original: data[start..end].to_vec(),
    })
}
