use std::fs;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg};

use serde::Serialize;

/// Change in cache size and file count caused by storing or evicting entries.
///
/// Negative values describe removals, so the same type serves growth and
/// shrinkage bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FileSizeAndCountDiff {
    pub size_kibibyte: i64,
    pub count: i64,
}

impl FileSizeAndCountDiff {
    pub const fn new(size_kibibyte: i64, count: i64) -> Self {
        Self {
            size_kibibyte,
            count,
        }
    }

    /// Diff for a single file that went from `old` to `new` (either may be
    /// absent).
    pub fn for_file_change(old: Option<&fs::Metadata>, new: Option<&fs::Metadata>) -> Self {
        let old_size = old.map(size_on_disk).unwrap_or(0) as i64;
        let new_size = new.map(size_on_disk).unwrap_or(0) as i64;
        Self {
            size_kibibyte: (new_size - old_size) / 1024,
            count: i64::from(new.is_some()) - i64::from(old.is_some()),
        }
    }
}

impl AddAssign for FileSizeAndCountDiff {
    fn add_assign(&mut self, other: Self) {
        self.size_kibibyte += other.size_kibibyte;
        self.count += other.count;
    }
}

impl Add for FileSizeAndCountDiff {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl Neg for FileSizeAndCountDiff {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            size_kibibyte: -self.size_kibibyte,
            count: -self.count,
        }
    }
}

impl Sum for FileSizeAndCountDiff {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Space a file occupies on disk: allocated blocks on Unix, the length
/// rounded up to 4 KiB elsewhere.
pub fn size_on_disk(metadata: &fs::Metadata) -> u64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.blocks() * 512
    }

    #[cfg(not(unix))]
    {
        metadata.len().div_ceil(4096) * 4096
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assign_accumulates_both_fields() {
        let mut a = FileSizeAndCountDiff::new(10, 1);
        a += FileSizeAndCountDiff::new(-4, 2);
        assert_eq!(a, FileSizeAndCountDiff::new(6, 3));
    }

    #[test]
    fn accumulation_is_associative_and_commutative() {
        let a = FileSizeAndCountDiff::new(7, 1);
        let b = FileSizeAndCountDiff::new(-3, -1);
        let c = FileSizeAndCountDiff::new(1024, 5);

        assert_eq!(a + b, b + a);
        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!([a, b, c].into_iter().sum::<FileSizeAndCountDiff>(), a + b + c);
        assert_eq!(a + -a, FileSizeAndCountDiff::default());
    }

    #[test]
    fn file_change_counts_creation_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![1u8; 10_000]).unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let created = FileSizeAndCountDiff::for_file_change(None, Some(&meta));
        assert_eq!(created.count, 1);
        assert_eq!(created.size_kibibyte, size_on_disk(&meta) as i64 / 1024);
        assert!(created.size_kibibyte >= 9);

        let removed = FileSizeAndCountDiff::for_file_change(Some(&meta), None);
        assert_eq!(removed, -created);

        let replaced = FileSizeAndCountDiff::for_file_change(Some(&meta), Some(&meta));
        assert_eq!(replaced, FileSizeAndCountDiff::default());
    }
}
