//! Self-relative pointers
//!
//! A frozen pointer is a little-endian 64-bit value. Bit 0 is the "frozen"
//! flag; the remaining 63 bits (arithmetic shift) are a signed byte offset
//! from the pointer's own storage location to its target.

/// Packed self-relative pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativePointer {
    raw: u64,
}

impl RelativePointer {
    /// Size of a stored pointer in bytes
    pub const SIZE: usize = 8;

    pub fn from_raw(raw: u64) -> Self {
        Self { raw }
    }

    /// Pointer stored at `site` that targets `target`, always flagged frozen
    pub fn encode(site: i64, target: i64) -> Self {
        Self {
            raw: (((target - site) << 1) | 1) as u64,
        }
    }

    pub fn raw(self) -> u64 {
        self.raw
    }

    /// Signed byte offset from the storage site
    pub fn offset_from_site(self) -> i64 {
        (self.raw as i64) >> 1
    }

    pub fn is_frozen(self) -> bool {
        self.raw & 1 != 0
    }

    /// Target offset for a pointer stored at `site`
    pub fn resolve(self, site: i64) -> i64 {
        site + self.offset_from_site()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sets_frozen_bit() {
        let ptr = RelativePointer::encode(16, 48);
        assert!(ptr.is_frozen());
        assert_eq!(ptr.raw(), (32 << 1) | 1);
    }

    #[test]
    fn test_encode_decode_inverse() {
        let cases = [
            (0i64, 0i64),
            (0, 8),
            (8, 0),
            (1024, 40),
            (40, 1_000_000),
            (i64::MAX / 4, 0),
            (0, i64::MAX / 4),
        ];
        for (site, target) in cases {
            let ptr = RelativePointer::encode(site, target);
            assert_eq!(ptr.resolve(site), target, "site {site} target {target}");
        }
    }

    #[test]
    fn test_negative_offset() {
        let ptr = RelativePointer::encode(100, 60);
        assert_eq!(ptr.offset_from_site(), -40);
        assert_eq!(ptr.resolve(100), 60);
    }

    #[test]
    fn test_unfrozen_pointer_still_resolves() {
        let ptr = RelativePointer::from_raw(24 << 1);
        assert!(!ptr.is_frozen());
        assert_eq!(ptr.resolve(8), 32);
    }
}
