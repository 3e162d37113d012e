use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ensure_len, NtfsError, Result};
use crate::models::VolumeParameters;

pub const BOOT_SECTOR_SIZE: usize = 512;
pub const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct NtfsBootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u64,
    pub mft_lcn: u64,
    pub mft_mirror_lcn: u64,
    pub clusters_per_file_record_segment: i8,
    pub clusters_per_index_buffer: i8,
    pub volume_serial_number: u64,
    pub end_marker: u16,
}

impl NtfsBootSector {
    pub fn parse(vbr: &[u8]) -> Result<Self> {
        ensure_len(vbr, BOOT_SECTOR_SIZE, "boot sector")?;

        if &vbr[3..11] != NTFS_OEM_ID {
            return Err(NtfsError::NotNtfs);
        }

        Ok(Self {
            bytes_per_sector: LittleEndian::read_u16(&vbr[11..13]),
            sectors_per_cluster: vbr[13],
            total_sectors: LittleEndian::read_u64(&vbr[40..48]),
            mft_lcn: LittleEndian::read_u64(&vbr[48..56]),
            mft_mirror_lcn: LittleEndian::read_u64(&vbr[56..64]),
            clusters_per_file_record_segment: vbr[64] as i8,
            clusters_per_index_buffer: vbr[68] as i8,
            volume_serial_number: LittleEndian::read_u64(&vbr[72..80]),
            end_marker: LittleEndian::read_u16(&vbr[510..512]),
        })
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    pub fn file_record_size_bytes(&self) -> Option<u32> {
        signed_size(self.clusters_per_file_record_segment, self.bytes_per_cluster())
    }

    pub fn index_block_size_bytes(&self) -> Option<u32> {
        signed_size(self.clusters_per_index_buffer, self.bytes_per_cluster())
    }

    /// Проверяет геометрию и выводит параметры тома, неизменные на всю сессию.
    pub fn volume_parameters(&self) -> Result<VolumeParameters> {
        let bps = self.bytes_per_sector;
        if !(256..=4096).contains(&bps) || !bps.is_power_of_two() {
            return Err(NtfsError::Corrupt(format!("bytes_per_sector = {}", bps)));
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(NtfsError::Corrupt(format!(
                "sectors_per_cluster = {}",
                self.sectors_per_cluster
            )));
        }
        if self.end_marker != 0xAA55 {
            log::warn!("Boot sector без маркера 0xAA55 (найдено {:#06X})", self.end_marker);
        }

        let cluster_size = self.bytes_per_cluster();
        let record_size = self.file_record_size_bytes().ok_or_else(|| {
            NtfsError::Corrupt(format!(
                "clusters_per_mft_record = {}",
                self.clusters_per_file_record_segment
            ))
        })?;
        let index_block_size = self.index_block_size_bytes().ok_or_else(|| {
            NtfsError::Corrupt(format!(
                "clusters_per_index_record = {}",
                self.clusters_per_index_buffer
            ))
        })?;
        if (record_size as usize) < 256 || index_block_size < 256 {
            return Err(NtfsError::Corrupt(format!(
                "record_size = {}, index_block_size = {}",
                record_size, index_block_size
            )));
        }

        Ok(VolumeParameters {
            bytes_per_sector: bps,
            sectors_per_cluster: self.sectors_per_cluster,
            cluster_size,
            total_sectors: self.total_sectors,
            mft_lcn: self.mft_lcn,
            mft_mirror_lcn: self.mft_mirror_lcn,
            mft_record_size: record_size,
            mft_record_clusters: (record_size as u64).div_ceil(cluster_size),
            index_block_size,
            index_block_clusters: (index_block_size as u64).div_ceil(cluster_size),
            index_block_sectors: index_block_size as u64 / bps as u64,
            volume_serial_number: self.volume_serial_number,
        })
    }
}

// Положительное значение - число кластеров, отрицательное - степень двойки в байтах.
fn signed_size(v: i8, bytes_per_cluster: u64) -> Option<u32> {
    if v == 0 {
        return None;
    }
    if v > 0 {
        u32::try_from(bytes_per_cluster.checked_mul(v as u64)?).ok()
    } else {
        let pow = (-(v as i32)) as u32;
        if pow > 31 {
            None
        } else {
            Some(1u32 << pow)
        }
    }
}
