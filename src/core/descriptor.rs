use crate::core::error::{FsError, Result};

/// Length of the signature field including its NUL terminator
pub const SIGNATURE_LEN: usize = 9;
pub const DEFAULT_SIGNATURE: &str = "pfat";
pub const DEFAULT_CLUSTER_SIZE: u32 = 4096;

/// Size of one allocation table entry on disk
pub const FAT_ENTRY_SIZE: usize = 4;

/// Filesystem descriptor
///
/// Process-wide geometry of the virtual disk. Fixed at format time and
/// written first in every image.
///
/// The table and data offsets are byte offsets within the image file; the
/// data region begins with the directory tree dump, followed by the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsDescriptor {
    /// Author signature, NUL-padded
    pub signature: [u8; SIGNATURE_LEN],

    /// Total size of the virtual disk in bytes
    pub disk_size: u32,

    /// Size of one cluster in bytes
    pub cluster_size: u32,

    /// Number of clusters (`disk_size / cluster_size`)
    pub cluster_count: u32,

    /// Entries in each allocation table (equals `cluster_count`)
    pub fat_count: u32,

    /// Image offset of the primary allocation table
    pub fat1_offset: u32,

    /// Image offset of the secondary allocation table
    pub fat2_offset: u32,

    /// Image offset of the data region
    pub data_start: u32,
}

impl FsDescriptor {
    /// Encoded record length in bytes
    pub const ENCODED_LEN: usize = SIGNATURE_LEN + 7 * 4;

    /// Compute the geometry for a new disk
    pub fn new(signature: &str, disk_size: u32, cluster_size: u32) -> Result<Self> {
        if cluster_size == 0 || disk_size < cluster_size {
            return Err(FsError::InvalidDiskSize(format!(
                "disk size {} is smaller than cluster size {}",
                disk_size, cluster_size
            )));
        }

        if disk_size % cluster_size != 0 {
            return Err(FsError::InvalidDiskSize(format!(
                "disk size {} is not a multiple of cluster size {}",
                disk_size, cluster_size
            )));
        }

        let bytes = signature.as_bytes();
        if bytes.is_empty() || bytes.len() >= SIGNATURE_LEN {
            return Err(FsError::InvalidConfig(format!(
                "signature '{}' does not fit the descriptor",
                signature
            )));
        }

        let mut sig = [0u8; SIGNATURE_LEN];
        sig[..bytes.len()].copy_from_slice(bytes);

        let cluster_count = disk_size / cluster_size;
        let (fat1_offset, fat2_offset, data_start) = Self::layout(cluster_count)?;

        Ok(FsDescriptor {
            signature: sig,
            disk_size,
            cluster_size,
            cluster_count,
            fat_count: cluster_count,
            fat1_offset,
            fat2_offset,
            data_start,
        })
    }

    /// Table and data offsets implied by a cluster count
    fn layout(cluster_count: u32) -> Result<(u32, u32, u32)> {
        let table_bytes = cluster_count as u64 * FAT_ENTRY_SIZE as u64;
        let fat1 = Self::ENCODED_LEN as u64;
        let fat2 = fat1 + table_bytes;
        let data = fat2 + table_bytes;

        if data > u32::MAX as u64 {
            return Err(FsError::InvalidDiskSize(format!(
                "{} clusters exceed the addressable image size",
                cluster_count
            )));
        }

        Ok((fat1 as u32, fat2 as u32, data as u32))
    }

    /// Signature as text (up to the first NUL)
    pub fn signature_str(&self) -> String {
        let end = self
            .signature
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SIGNATURE_LEN);
        String::from_utf8_lossy(&self.signature[..end]).into_owned()
    }

    /// Check internal consistency of the geometry
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size == 0 {
            return Err(FsError::CorruptImage("cluster size is zero".to_string()));
        }

        if self.cluster_count != self.disk_size / self.cluster_size
            || self.cluster_count == 0
            || self.disk_size % self.cluster_size != 0
        {
            return Err(FsError::CorruptImage(format!(
                "cluster count {} does not match disk size {} / cluster size {}",
                self.cluster_count, self.disk_size, self.cluster_size
            )));
        }

        if self.fat_count != self.cluster_count {
            return Err(FsError::CorruptImage(format!(
                "table entry count {} differs from cluster count {}",
                self.fat_count, self.cluster_count
            )));
        }

        let (fat1, fat2, data) =
            Self::layout(self.cluster_count).map_err(|e| FsError::CorruptImage(e.to_string()))?;
        if (self.fat1_offset, self.fat2_offset, self.data_start) != (fat1, fat2, data) {
            return Err(FsError::CorruptImage(format!(
                "offsets ({}, {}, {}) do not match layout ({}, {}, {})",
                self.fat1_offset, self.fat2_offset, self.data_start, fat1, fat2, data
            )));
        }

        Ok(())
    }

    /// Serialize the descriptor record
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);

        bytes.extend_from_slice(&self.signature);
        bytes.extend_from_slice(&self.disk_size.to_le_bytes());
        bytes.extend_from_slice(&self.cluster_size.to_le_bytes());
        bytes.extend_from_slice(&self.cluster_count.to_le_bytes());
        bytes.extend_from_slice(&self.fat_count.to_le_bytes());
        bytes.extend_from_slice(&self.fat1_offset.to_le_bytes());
        bytes.extend_from_slice(&self.fat2_offset.to_le_bytes());
        bytes.extend_from_slice(&self.data_start.to_le_bytes());

        bytes
    }

    /// Deserialize and validate a descriptor record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(FsError::CorruptImage(
                "insufficient bytes for descriptor".to_string(),
            ));
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&bytes[..SIGNATURE_LEN]);

        let field = |index: usize| {
            let offset = SIGNATURE_LEN + index * 4;
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        let descriptor = FsDescriptor {
            signature,
            disk_size: field(0),
            cluster_size: field(1),
            cluster_count: field(2),
            fat_count: field(3),
            fat1_offset: field(4),
            fat2_offset: field(5),
            data_start: field(6),
        };

        descriptor.validate()?;

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_geometry() {
        let desc = FsDescriptor::new("novak", 1024 * 1024, 4096).unwrap();
        assert_eq!(desc.cluster_count, 256);
        assert_eq!(desc.fat_count, 256);
        assert_eq!(desc.fat1_offset as usize, FsDescriptor::ENCODED_LEN);
        assert_eq!(desc.fat2_offset, desc.fat1_offset + 256 * 4);
        assert_eq!(desc.data_start, desc.fat2_offset + 256 * 4);
        assert_eq!(desc.signature_str(), "novak");
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_descriptor_serialization() {
        let desc = FsDescriptor::new("pfat", 64 * 1024, 1024).unwrap();
        let bytes = desc.to_bytes();
        assert_eq!(bytes.len(), FsDescriptor::ENCODED_LEN);

        let decoded = FsDescriptor::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, desc);
    }

    #[test]
    fn test_rejects_unaligned_disk() {
        assert!(matches!(
            FsDescriptor::new("pfat", 10_000, 4096),
            Err(FsError::InvalidDiskSize(_))
        ));
        assert!(matches!(
            FsDescriptor::new("pfat", 1024, 4096),
            Err(FsError::InvalidDiskSize(_))
        ));
    }

    #[test]
    fn test_rejects_inconsistent_record() {
        let mut desc = FsDescriptor::new("pfat", 64 * 1024, 4096).unwrap();
        desc.cluster_count = 99;
        assert!(matches!(
            FsDescriptor::from_bytes(&desc.to_bytes()),
            Err(FsError::CorruptImage(_))
        ));

        let mut desc = FsDescriptor::new("pfat", 64 * 1024, 4096).unwrap();
        desc.data_start += 1;
        assert!(matches!(desc.validate(), Err(FsError::CorruptImage(_))));
    }

    #[test]
    fn test_truncated_record() {
        let desc = FsDescriptor::new("pfat", 64 * 1024, 4096).unwrap();
        let bytes = desc.to_bytes();
        assert!(matches!(
            FsDescriptor::from_bytes(&bytes[..10]),
            Err(FsError::CorruptImage(_))
        ));
    }
}
