//! Container header around a frozen region
//!
//! Layout:
//!
//! - `frozen_byte_length: i32`
//! - `buffer_size: i32`
//! - `max_alignment: u16`
//! - `padding_length: u16` + zero padding up to a 16-byte boundary
//! - Frozen region
//! - 8 reserved bytes (vtables and script names, always zero here)
//! - Name patch table

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::name::{count_to_i32, NameMap, NamePatchTable};
use crate::{align_up, Error, Result};

/// Rehydrated buffer size written for new containers
pub const DEFAULT_BUFFER_SIZE: i32 = 65536;

/// Maximum alignment written for new containers
pub const DEFAULT_MAX_ALIGNMENT: u16 = 16;

const RESERVED_BYTES: usize = 8;

/// Header values that are not derived from the frozen region itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub buffer_size: i32,
    pub max_alignment: u16,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_alignment: DEFAULT_MAX_ALIGNMENT,
        }
    }
}

/// A frozen region with its container header and patch table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenImage {
    pub options: WriteOptions,
    /// Stream offset of the first frozen byte
    pub frozen_offset: u64,
    pub frozen: Vec<u8>,
    pub names: NamePatchTable,
}

impl FrozenImage {
    /// Parse the header, frozen bytes and patch table at the stream position
    pub fn read<R, N>(reader: &mut R, names: &N) -> Result<Self>
    where
        R: Read + Seek,
        N: NameMap + ?Sized,
    {
        let header_offset = reader.stream_position()?;
        let frozen_len = reader.read_i32::<LE>()?;
        let frozen_len = usize::try_from(frozen_len).map_err(|_| Error::InvalidCount {
            offset: header_offset,
            count: frozen_len,
        })?;
        let buffer_size = reader.read_i32::<LE>()?;
        let max_alignment = reader.read_u16::<LE>()?;
        let padding = reader.read_u16::<LE>()?;
        reader.seek(SeekFrom::Current(i64::from(padding)))?;

        let frozen_offset = reader.stream_position()?;
        // Grows with the data actually present rather than the claimed length
        let mut frozen = Vec::new();
        reader.by_ref().take(frozen_len as u64).read_to_end(&mut frozen)?;
        if frozen.len() != frozen_len {
            return Err(Error::UnexpectedEof {
                offset: frozen_offset + frozen.len() as u64,
                needed: frozen_len - frozen.len(),
            });
        }
        reader.seek(SeekFrom::Current(RESERVED_BYTES as i64))?;

        let names = NamePatchTable::read(reader, names)?;
        tracing::debug!(
            frozen_offset,
            frozen_len,
            buffer_size,
            patches = names.len(),
            "frozen image loaded"
        );

        Ok(Self {
            options: WriteOptions {
                buffer_size,
                max_alignment,
            },
            frozen_offset,
            frozen,
            names,
        })
    }

    /// Write the container
    ///
    /// `origin` is the number of bytes already written since the boundary
    /// the frozen region must be 16-byte aligned to.
    pub fn write<W: Write>(&self, writer: &mut W, origin: u64) -> Result<()> {
        writer.write_i32::<LE>(count_to_i32(self.frozen.len())?)?;
        writer.write_i32::<LE>(self.options.buffer_size)?;
        writer.write_u16::<LE>(self.options.max_alignment)?;

        let current = origin as usize + 12;
        let padding = align_up(current, 16) - current;
        writer.write_u16::<LE>(padding as u16)?;
        writer.write_all(&vec![0u8; padding])?;

        writer.write_all(&self.frozen)?;
        writer.write_all(&[0u8; RESERVED_BYTES])?;
        self.names.write(writer)
    }
}
