//! Index command: compare the stored lookup index with the derived one

use anyhow::Result;
use frozen_image::{derive_index_array, DataTable};
use std::io::Write;

use super::load_section;
use crate::cli::SectionArgs;

fn row_label(table: &DataTable, slot: i32) -> String {
    usize::try_from(slot)
        .ok()
        .and_then(|i| table.rows().get(i))
        .and_then(|row| row.name.as_ref())
        .map(ToString::to_string)
        .unwrap_or_default()
}

pub fn index<W: Write>(args: &SectionArgs, out: &mut W) -> Result<()> {
    let section = load_section(args)?;
    let table = &section.table;
    let stored = table.indexes();
    let derived = derive_index_array(&table.reconcile_keys()?);

    writeln!(out, "{:>6} {:>8} {:>8}  row", "slot", "stored", "derived")?;
    for slot in 0..stored.len().max(derived.len()) {
        let stored_at = stored.get(slot).copied();
        let derived_at = derived.get(slot).copied();
        let show = |v: Option<i32>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        writeln!(
            out,
            "{:>6} {:>8} {:>8}  {}",
            slot,
            show(stored_at),
            show(derived_at),
            derived_at.map(|i| row_label(table, i)).unwrap_or_default()
        )?;
    }

    if stored == derived.as_slice() {
        writeln!(out, "\nStored index matches ({} slots)", derived.len())?;
    } else {
        writeln!(
            out,
            "\nStored index differs: {} stored, {} derived slots",
            stored.len(),
            derived.len()
        )?;
    }
    Ok(())
}
