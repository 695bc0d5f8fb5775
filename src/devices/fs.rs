//! # Read-Only File System Image
//!
//! The boot ramdisk holds a flat image of 4 KiB blocks:
//!
//! ```text
//! ┌────────────┬──────────┬─────┬──────────┬──────────────┬─────┐
//! │ boot block │ inode 0  │ ... │ inode N-1│ data block 0 │ ... │
//! └────────────┴──────────┴─────┴──────────┴──────────────┴─────┘
//! ```
//!
//! Boot block: dentry count, inode count, data-block count (u32 LE each),
//! 52 reserved bytes, then up to 63 directory entries of 64 bytes
//! (`name[32]`, `type: u32`, `inode: u32`, 24 reserved bytes).
//!
//! Inode block: byte length followed by up to 1023 data-block indices.

use crate::config::FILE_NAME_LEN;

use super::{DeviceKind, FileSystem};

pub const BLOCK_SIZE: usize = 4096;
pub const DENTRY_SIZE: usize = 64;
pub const MAX_DENTRIES: usize = 63;
pub const BLOCKS_PER_INODE: usize = BLOCK_SIZE / 4 - 1;
const DENTRY_TABLE_OFFSET: usize = 64;

pub const FILE_TYPE_CLOCK: u32 = 0;
pub const FILE_TYPE_DIRECTORY: u32 = 1;
pub const FILE_TYPE_REGULAR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    Truncated { needed: usize, found: usize },
    TooManyEntries(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    name: [u8; FILE_NAME_LEN],
    name_len: usize,
    pub file_type: u32,
    pub inode: u32,
}

impl DirEntry {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    pub fn kind(&self) -> Option<DeviceKind> {
        DeviceKind::from_file_type(self.file_type)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FsImage<'a> {
    bytes: &'a [u8],
    dentry_count: usize,
    inode_count: usize,
    data_block_count: usize,
}

impl<'a> FsImage<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, FsError> {
        if bytes.len() < BLOCK_SIZE {
            return Err(FsError::Truncated {
                needed: BLOCK_SIZE,
                found: bytes.len(),
            });
        }
        let dentry_count = read_u32(bytes, 0);
        if dentry_count as usize > MAX_DENTRIES {
            return Err(FsError::TooManyEntries(dentry_count));
        }
        let inode_count = read_u32(bytes, 4) as usize;
        let data_block_count = read_u32(bytes, 8) as usize;

        let needed = (1 + inode_count + data_block_count) * BLOCK_SIZE;
        if bytes.len() < needed {
            return Err(FsError::Truncated {
                needed,
                found: bytes.len(),
            });
        }

        Ok(Self {
            bytes,
            dentry_count: dentry_count as usize,
            inode_count,
            data_block_count,
        })
    }

    pub fn dentry_count(&self) -> usize {
        self.dentry_count
    }

    fn dentry(&self, index: usize) -> Option<DirEntry> {
        if index >= self.dentry_count {
            return None;
        }
        let base = DENTRY_TABLE_OFFSET + index * DENTRY_SIZE;
        let raw_name = &self.bytes[base..base + FILE_NAME_LEN];
        let name_len = raw_name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(FILE_NAME_LEN);

        let mut name = [0; FILE_NAME_LEN];
        name.copy_from_slice(raw_name);
        Some(DirEntry {
            name,
            name_len,
            file_type: read_u32(self.bytes, base + FILE_NAME_LEN),
            inode: read_u32(self.bytes, base + FILE_NAME_LEN + 4),
        })
    }

    fn inode_block(&self, inode: u32) -> Option<&'a [u8]> {
        let inode = inode as usize;
        if inode >= self.inode_count {
            return None;
        }
        let start = (1 + inode) * BLOCK_SIZE;
        Some(&self.bytes[start..start + BLOCK_SIZE])
    }

    fn data_block(&self, index: u32) -> Option<&'a [u8]> {
        let index = index as usize;
        if index >= self.data_block_count {
            return None;
        }
        let start = (1 + self.inode_count + index) * BLOCK_SIZE;
        Some(&self.bytes[start..start + BLOCK_SIZE])
    }
}

impl FileSystem for FsImage<'_> {
    fn resolve(&self, name: &[u8]) -> Option<DirEntry> {
        if name.is_empty() || name.len() > FILE_NAME_LEN {
            return None;
        }
        (0..self.dentry_count)
            .filter_map(|index| self.dentry(index))
            .find(|entry| entry.name() == name)
    }

    fn entry_at(&self, index: usize) -> Option<DirEntry> {
        self.dentry(index)
    }

    fn file_len(&self, inode: u32) -> Option<u32> {
        self.inode_block(inode).map(|block| read_u32(block, 0))
    }

    fn read_bytes(&self, inode: u32, offset: u32, buf: &mut [u8]) -> usize {
        let Some(block) = self.inode_block(inode) else {
            return 0;
        };
        let length = read_u32(block, 0) as usize;
        let offset = offset as usize;
        if offset >= length {
            return 0;
        }

        let end = length.min(offset + buf.len());
        let mut copied = 0;
        let mut position = offset;
        while position < end {
            let slot = position / BLOCK_SIZE;
            if slot >= BLOCKS_PER_INODE {
                break;
            }
            let Some(data) = self.data_block(read_u32(block, 4 + slot * 4)) else {
                break;
            };
            let within = position % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - within).min(end - position);
            buf[copied..copied + chunk].copy_from_slice(&data[within..within + chunk]);
            copied += chunk;
            position += chunk;
        }
        copied
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ImageBuilder;

    fn sample() -> Vec<u8> {
        let mut long = vec![0u8; BLOCK_SIZE + 100];
        for (index, byte) in long.iter_mut().enumerate() {
            *byte = (index % 251) as u8;
        }
        ImageBuilder::new()
            .directory(".")
            .clock("rtc")
            .file("frame0.txt", b"fish")
            .file("verylargetextwithverylongname.tx", &long)
            .build()
    }

    #[test]
    fn test_parse_counts() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        assert_eq!(fs.dentry_count(), 4);
    }

    #[test]
    fn test_parse_rejects_truncated() {
        let bytes = sample();
        assert!(matches!(
            FsImage::parse(&bytes[..BLOCK_SIZE * 2]),
            Err(FsError::Truncated { .. })
        ));
        assert!(matches!(
            FsImage::parse(&bytes[..100]),
            Err(FsError::Truncated { needed: BLOCK_SIZE, found: 100 })
        ));
    }

    #[test]
    fn test_resolve() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        let entry = fs.resolve(b"frame0.txt").unwrap();
        assert_eq!(entry.kind(), Some(DeviceKind::File));
        assert_eq!(fs.resolve(b"rtc").unwrap().kind(), Some(DeviceKind::Clock));
        assert_eq!(fs.resolve(b".").unwrap().kind(), Some(DeviceKind::Directory));
        assert!(fs.resolve(b"frame0").is_none());
        assert!(fs.resolve(b"").is_none());
    }

    #[test]
    fn test_resolve_full_length_name() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        let name = b"verylargetextwithverylongname.tx";
        assert_eq!(name.len(), FILE_NAME_LEN);
        assert!(fs.resolve(name).is_some());
        assert!(fs.resolve(b"verylargetextwithverylongname.txt").is_none());
    }

    #[test]
    fn test_read_small_file() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        let inode = fs.resolve(b"frame0.txt").unwrap().inode;
        assert_eq!(fs.file_len(inode), Some(4));

        let mut buf = [0u8; 16];
        assert_eq!(fs.read_bytes(inode, 0, &mut buf), 4);
        assert_eq!(&buf[..4], b"fish");
        assert_eq!(fs.read_bytes(inode, 2, &mut buf), 2);
        assert_eq!(&buf[..2], b"sh");
        assert_eq!(fs.read_bytes(inode, 4, &mut buf), 0);
    }

    #[test]
    fn test_read_across_blocks() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        let inode = fs.resolve(b"verylargetextwithverylongname.tx").unwrap().inode;

        let mut buf = [0u8; 64];
        let offset = BLOCK_SIZE as u32 - 10;
        assert_eq!(fs.read_bytes(inode, offset, &mut buf), 64);
        for (index, byte) in buf.iter().enumerate() {
            assert_eq!(*byte, ((offset as usize + index) % 251) as u8);
        }

        let tail = fs.read_bytes(inode, BLOCK_SIZE as u32 + 90, &mut buf);
        assert_eq!(tail, 10);
    }

    #[test]
    fn test_entry_at() {
        let bytes = sample();
        let fs = FsImage::parse(&bytes).unwrap();
        assert_eq!(fs.entry_at(0).unwrap().name(), b".");
        assert_eq!(fs.entry_at(2).unwrap().name(), b"frame0.txt");
        assert!(fs.entry_at(4).is_none());
    }
}
