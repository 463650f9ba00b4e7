//! Cursor over a captured frozen region
//!
//! All container reads follow the pointer-relative conventions:
//!
//! - Fixed array: `pointer, num: i32, max: i32`; `num` elements at the target
//! - Sparse array: fixed array header, allocation bit array,
//!   `first_free_index: i32`, `num_free_indices: i32`
//! - Bit array: fixed array header over packed 32-bit words
//! - String: fixed array of UTF-16 code units including a zero terminator

use std::collections::HashMap;

use byteorder::{ByteOrder, LE};

use crate::name::Name;
use crate::pointer::RelativePointer;
use crate::property::{dispatch, Property, PropertyDescriptor};
use crate::{align_up, Error, Result};

/// Seekable reader over a frozen region
pub struct FrozenReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
    names: Option<&'a HashMap<i32, Name>>,
}

/// Decoded `pointer, num, max` triple
struct ArrayHeader {
    site: usize,
    ptr: RelativePointer,
    num: i32,
    max: i32,
}

impl<'a> FrozenReader<'a> {
    /// `base` is the absolute offset of `data`, used for error reporting
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            pos: 0,
            base,
            names: None,
        }
    }

    /// Attach the offset -> name map built from the patch table
    pub fn with_names(mut self, names: &'a HashMap<i32, Name>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Absolute offset of the cursor
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn align(&mut self, align: usize) {
        self.pos = align_up(self.pos, align);
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(Error::UnexpectedEof {
                offset: self.offset(),
                needed: n,
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LE::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LE::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LE::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LE::read_i32(self.read_bytes(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LE::read_i64(self.read_bytes(8)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LE::read_u64(self.read_bytes(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LE::read_f32(self.read_bytes(4)?))
    }

    /// One byte that must be 0 or 1
    pub fn read_bool(&mut self) -> Result<bool> {
        let offset = self.offset();
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(Error::InvalidBooleanEncoding { offset, value }),
        }
    }

    /// Name slot at the cursor; always consumes 8 bytes
    ///
    /// Slots without a patch table entry decode as `None`.
    pub fn read_name(&mut self) -> Option<Name> {
        let name = i32::try_from(self.pos)
            .ok()
            .and_then(|pos| self.names?.get(&pos))
            .cloned();
        self.pos += 8;
        name
    }

    pub fn read_pointer(&mut self) -> Result<RelativePointer> {
        Ok(RelativePointer::from_raw(self.read_u64()?))
    }

    fn read_array_header(&mut self) -> Result<ArrayHeader> {
        let site = self.pos;
        let ptr = self.read_pointer()?;
        let num = self.read_i32()?;
        let max = self.read_i32()?;
        if num < 0 {
            return Err(Error::InvalidCount {
                offset: self.base + site as u64,
                count: num,
            });
        }
        Ok(ArrayHeader {
            site,
            ptr,
            num,
            max,
        })
    }

    fn require_num_eq_max(&self, header: &ArrayHeader) -> Result<()> {
        if header.num != header.max {
            return Err(Error::MalformedArrayHeader {
                offset: self.base + header.site as u64,
                num: header.num,
                max: header.max,
            });
        }
        Ok(())
    }

    /// Run `f` with the cursor at the pointer target, then restore it
    fn at_target<T>(
        &mut self,
        header: &ArrayHeader,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let target = header.ptr.resolve(header.site as i64);
        let in_range = usize::try_from(target)
            .ok()
            .filter(|&t| t < self.data.len());
        let Some(target) = in_range else {
            return Err(Error::PointerOutOfRange {
                offset: self.base + header.site as u64,
                target,
                len: self.data.len(),
            });
        };

        let resume = self.pos;
        self.pos = target;
        let result = f(self);
        self.pos = resume;
        result
    }

    /// Fixed array of `i32` without a num/max check
    pub fn read_i32_array(&mut self) -> Result<Vec<i32>> {
        self.read_array(Self::read_i32)
    }

    /// Fixed array decoded element by element; `num == 0` yields empty
    pub fn read_array<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let header = self.read_array_header()?;
        if header.num == 0 {
            return Ok(Vec::new());
        }
        self.at_target(&header, |r| {
            (0..header.num).map(|_| element(r)).collect()
        })
    }

    /// Fixed array with `num == max` enforced, each element aligned first
    pub fn read_aligned_array<T>(
        &mut self,
        align: usize,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let header = self.read_array_header()?;
        self.require_num_eq_max(&header)?;
        if header.num == 0 {
            return Ok(Vec::new());
        }
        self.at_target(&header, |r| {
            (0..header.num)
                .map(|_| {
                    r.align(align);
                    element(r)
                })
                .collect()
        })
    }

    /// Sparse array; only slots whose allocation bit is set are decoded
    pub fn read_sparse_array<T>(
        &mut self,
        stride: usize,
        mut element: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let header = self.read_array_header()?;
        let allocated = self.read_bit_array()?;
        let _first_free_index = self.read_i32()?;
        let _num_free_indices = self.read_i32()?;

        if header.num == 0 {
            return Ok(Vec::new());
        }

        let slots = header.num as usize;
        self.at_target(&header, |r| {
            let needed = slots.saturating_mul(stride);
            if needed > r.data.len() - r.pos {
                return Err(Error::UnexpectedEof {
                    offset: r.offset(),
                    needed,
                });
            }
            let mut out = Vec::new();
            for slot in 0..slots {
                let start = r.pos;
                if allocated.get(slot).copied().unwrap_or(false) {
                    out.push(element(r)?);
                }
                r.pos = start + stride;
            }
            Ok(out)
        })
    }

    /// Bit array of packed 32-bit words, truncated to `num` bits
    pub fn read_bit_array(&mut self) -> Result<Vec<bool>> {
        let header = self.read_array_header()?;
        if header.num == 0 {
            return Ok(Vec::new());
        }
        let num_bits = header.num as usize;
        let words = self.at_target(&header, |r| {
            (0..num_bits.div_ceil(32)).map(|_| r.read_u32()).collect::<Result<Vec<_>>>()
        })?;
        Ok((0..num_bits)
            .map(|bit| (words[bit / 32] >> (bit % 32)) & 1 != 0)
            .collect())
    }

    /// UTF-16 string; `num == 0` is absent, `num == 1` is empty
    pub fn read_string(&mut self) -> Result<Option<String>> {
        let header = self.read_array_header()?;
        self.require_num_eq_max(&header)?;
        match header.num {
            0 => return Ok(None),
            1 => return Ok(Some(String::new())),
            _ => {}
        }

        let units = header.num as usize;
        self.at_target(&header, |r| {
            let offset = r.offset();
            let bytes = r.read_bytes(units * 2)?;
            if bytes[bytes.len() - 2..] != [0, 0] {
                return Err(Error::StringNotNullTerminated { offset });
            }
            let code_units: Vec<u16> = bytes[..bytes.len() - 2]
                .chunks_exact(2)
                .map(LE::read_u16)
                .collect();
            String::from_utf16(&code_units)
                .map(Some)
                .map_err(|_| Error::InvalidUtf16 { offset })
        })
    }

    /// Decode one row, one property per descriptor in schema order
    pub fn decode_struct(&mut self, descriptors: &[PropertyDescriptor]) -> Result<Vec<Property>> {
        descriptors.iter().map(|d| dispatch(self, d)).collect()
    }
}
