//! Roundtrip command: decode, re-encode, compare

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::load_section;
use crate::cli::SectionArgs;

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then_some(a.len().min(b.len())))
}

pub fn roundtrip(args: &SectionArgs, output: Option<&Path>) -> Result<()> {
    let section = load_section(args)?;

    let mut encoded = Vec::new();
    section
        .table
        .write(&mut encoded, args.origin())
        .context("Failed to re-encode section")?;

    if let Some(path) = output {
        fs::write(path, &encoded).with_context(|| format!("Failed to write {:?}", path))?;
    }

    if let Some(at) = first_difference(&section.original, &encoded) {
        bail!(
            "Round trip differs at {:#x}: original {} bytes, re-encoded {} bytes",
            args.offset + at as u64,
            section.original.len(),
            encoded.len()
        );
    }

    println!("Round trip OK: {} bytes", encoded.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixture;

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"ab"), Some(2));
    }

    #[test]
    fn test_roundtrip_matches() -> Result<()> {
        let (dir, args) = fixture::write_section(12);
        let out = dir.path().join("re.bin");
        roundtrip(&args, Some(&out))?;

        let original = fs::read(&args.input)?;
        assert_eq!(fs::read(&out)?, original[12..]);
        Ok(())
    }

    #[test]
    fn test_roundtrip_reports_reserved_bytes() -> Result<()> {
        let (_dir, args) = fixture::write_section(0);
        let mut bytes = fs::read(&args.input)?;

        // Reserved bytes follow the frozen region and are re-emitted as zero
        let frozen_len = i32::from_le_bytes(bytes[0..4].try_into()?) as usize;
        let padding = u16::from_le_bytes(bytes[10..12].try_into()?) as usize;
        let reserved = 12 + padding + frozen_len;
        bytes[reserved] = 0xff;
        fs::write(&args.input, &bytes)?;

        let err = roundtrip(&args, None).unwrap_err();
        assert!(err.to_string().contains(&format!("{:#x}", reserved)));
        Ok(())
    }

    #[test]
    fn test_roundtrip_wrong_origin_differs() {
        let (_dir, mut args) = fixture::write_section(12);
        args.origin = Some(0);
        assert!(roundtrip(&args, None).is_err());
    }
}
