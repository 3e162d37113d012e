use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ensure_len, NtfsError, Result};

pub const FILE_MAGIC: &[u8; 4] = b"FILE";
pub const MFT_RECORD_HEADER_LEN: usize = 48;

pub const MFT_RECORD_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_IS_DIRECTORY: u16 = 0x0002;

/// Номера системных файлов NTFS.
pub const FILE_MFT: u64 = 0;
pub const FILE_ROOT: u64 = 5;

/// Младшие 48 бит ссылки на файл - номер записи MFT, старшие 16 - sequence.
pub const MFT_REFERENCE_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

// заголовок декодируется целиком, не все поля нужны чтению
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct MftRecordHeader {
    pub update_sequence_offset: u16,
    pub update_sequence_size: u16,
    pub logfile_sequence_number: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub first_attribute_offset: u16,
    pub flags: u16, // 0x01 = InUse, 0x02 = Directory
    pub real_size: u32,
    pub allocated_size: u32,
    pub base_record_reference: u64,
    pub next_attribute_id: u16,
    pub record_number: u32,
}

impl MftRecordHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, MFT_RECORD_HEADER_LEN, "MFT record header")?;

        if &data[0..4] != FILE_MAGIC {
            return Err(NtfsError::BadMagic {
                what: "MFT record",
                found: magic_of(data),
            });
        }

        Ok(Self {
            update_sequence_offset: LittleEndian::read_u16(&data[4..6]),
            update_sequence_size: LittleEndian::read_u16(&data[6..8]),
            logfile_sequence_number: LittleEndian::read_u64(&data[8..16]),
            sequence_number: LittleEndian::read_u16(&data[16..18]),
            hard_link_count: LittleEndian::read_u16(&data[18..20]),
            first_attribute_offset: LittleEndian::read_u16(&data[20..22]),
            flags: LittleEndian::read_u16(&data[22..24]),
            real_size: LittleEndian::read_u32(&data[24..28]),
            allocated_size: LittleEndian::read_u32(&data[28..32]),
            base_record_reference: LittleEndian::read_u64(&data[32..40]),
            next_attribute_id: LittleEndian::read_u16(&data[40..42]),
            record_number: LittleEndian::read_u32(&data[44..48]),
        })
    }

    #[cfg(test)]
    pub fn is_in_use(&self) -> bool {
        self.flags & MFT_RECORD_IN_USE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & MFT_RECORD_IS_DIRECTORY != 0
    }
}

/// Загруженная запись MFT: буфер размером с запись плюс разобранный заголовок.
#[derive(Debug, Clone)]
pub struct MftRecord {
    pub number: u64,
    /// Абсолютное смещение записи на томе.
    pub offset: u64,
    pub header: MftRecordHeader,
    pub data: Vec<u8>,
}

impl MftRecord {
    pub fn flags(&self) -> u16 {
        self.header.flags
    }

    pub fn is_directory(&self) -> bool {
        self.header.is_directory()
    }
}

pub(crate) fn magic_of(data: &[u8]) -> [u8; 4] {
    let mut magic = [0u8; 4];
    let n = data.len().min(4);
    magic[..n].copy_from_slice(&data[..n]);
    magic
}
