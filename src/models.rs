use chrono::{DateTime, Utc};
use serde::Serialize;

/// Геометрия тома, выведенная из boot sector один раз при монтировании.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeParameters {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub cluster_size: u64,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub mft_record_size: u32,
    pub mft_record_clusters: u64,
    pub index_block_size: u32,
    pub index_block_clusters: u64,
    pub index_block_sectors: u64,
    pub volume_serial_number: u64,
}

impl VolumeParameters {
    pub fn lcn_to_offset(&self, lcn: u64) -> Option<u64> {
        lcn.checked_mul(self.cluster_size)
    }

    pub fn volume_size(&self) -> u64 {
        self.total_sectors.saturating_mul(self.bytes_per_sector as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn from_record_flags(flags: u16) -> Self {
        if flags & crate::mft::record::MFT_RECORD_IS_DIRECTORY != 0 {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

/// Элемент вывода `ls`: копия, не связанная с деревом узлов.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub kind: NodeKind,
    pub record: u64,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Блочное устройство или раздел из /sys/block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDevice {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub fs_type: String,
    pub uuid: Option<String>,
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partitions: Vec<BlockDevice>,
}
