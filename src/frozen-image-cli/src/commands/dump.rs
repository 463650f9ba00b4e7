//! Dump command

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::load_section;
use crate::cli::SectionArgs;

pub fn dump(args: &SectionArgs, output: Option<&Path>) -> Result<()> {
    let section = load_section(args)?;
    let json = serde_json::to_string_pretty(&section.table)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!(
                "Wrote {} rows ({} fields each) to {:?}",
                section.table.rows().len(),
                section.table.schema().len(),
                path
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}
