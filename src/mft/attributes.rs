use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, Utc};

use super::record::MftRecord;
use super::utils::filetime_to_datetime;
use crate::error::{ensure_len, NtfsError, Result};

pub const AT_FILE_NAME: u32 = 0x30;
pub const AT_DATA: u32 = 0x80;
pub const AT_INDEX_ROOT: u32 = 0x90;
pub const AT_INDEX_ALLOCATION: u32 = 0xA0;
pub const AT_BITMAP: u32 = 0xB0;
pub const AT_END: u32 = 0xFFFF_FFFF;

/// Общая часть заголовка любого атрибута.
pub const ATTR_HEADER_LEN: usize = 16;
const RESIDENT_HEADER_LEN: usize = 24;
const NON_RESIDENT_HEADER_LEN: usize = 64;

pub const ATTR_COMPRESSION_MASK: u16 = 0x00FF;
pub const ATTR_IS_ENCRYPTED: u16 = 0x4000;

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBody {
    Resident {
        value_length: u32,
        value_offset: u16,
        indexed: bool,
    },
    NonResident {
        lowest_vcn: u64,
        highest_vcn: u64,
        mapping_pairs_offset: u16,
        compression_unit: u8,
        allocated_size: u64,
        data_size: u64,
        initialized_size: u64,
    },
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct AttributeRecord {
    /// Смещение атрибута от начала записи MFT.
    pub offset: usize,
    pub attr_type: u32,
    pub length: u32,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub instance: u16,
    pub body: AttributeBody,
}

impl AttributeRecord {
    pub fn parse(record: &[u8], offset: usize) -> Result<Self> {
        let data = record.get(offset..).unwrap_or(&[]);
        ensure_len(data, ATTR_HEADER_LEN, "attribute header")?;

        let attr_type = LittleEndian::read_u32(&data[0..4]);
        let length = LittleEndian::read_u32(&data[4..8]);
        if length as usize > data.len() {
            return Err(NtfsError::truncated("attribute", length as usize, data.len()));
        }
        let data = &data[..length as usize];
        let non_resident = data[8] != 0;

        let body = if non_resident {
            ensure_len(data, NON_RESIDENT_HEADER_LEN, "non-resident attribute header")?;
            AttributeBody::NonResident {
                lowest_vcn: LittleEndian::read_u64(&data[16..24]),
                highest_vcn: LittleEndian::read_u64(&data[24..32]),
                mapping_pairs_offset: LittleEndian::read_u16(&data[32..34]),
                compression_unit: data[34],
                allocated_size: LittleEndian::read_u64(&data[40..48]),
                data_size: LittleEndian::read_u64(&data[48..56]),
                initialized_size: LittleEndian::read_u64(&data[56..64]),
            }
        } else {
            ensure_len(data, RESIDENT_HEADER_LEN, "resident attribute header")?;
            AttributeBody::Resident {
                value_length: LittleEndian::read_u32(&data[16..20]),
                value_offset: LittleEndian::read_u16(&data[20..22]),
                indexed: data[22] & 0x01 != 0,
            }
        };

        Ok(Self {
            offset,
            attr_type,
            length,
            name_length: data[9],
            name_offset: LittleEndian::read_u16(&data[10..12]),
            flags: LittleEndian::read_u16(&data[12..14]),
            instance: LittleEndian::read_u16(&data[14..16]),
            body,
        })
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.body, AttributeBody::Resident { .. })
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & ATTR_COMPRESSION_MASK != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & ATTR_IS_ENCRYPTED != 0
    }

    /// Байты значения резидентного атрибута.
    pub fn value<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        match self.body {
            AttributeBody::Resident {
                value_length,
                value_offset,
                ..
            } => {
                let start = value_offset as usize;
                let end = start + value_length as usize;
                if end > self.length as usize {
                    return Err(NtfsError::Corrupt(format!(
                        "значение атрибута 0x{:X} выходит за его границы ({} > {})",
                        self.attr_type, end, self.length
                    )));
                }
                Ok(&record[self.offset + start..self.offset + end])
            }
            AttributeBody::NonResident { .. } => Err(NtfsError::Corrupt(format!(
                "атрибут 0x{:X} нерезидентный",
                self.attr_type
            ))),
        }
    }

    /// Байты mapping pairs нерезидентного атрибута (до конца атрибута).
    pub fn mapping_pairs<'a>(&self, record: &'a [u8]) -> Result<&'a [u8]> {
        match self.body {
            AttributeBody::NonResident {
                mapping_pairs_offset,
                ..
            } => {
                let start = mapping_pairs_offset as usize;
                if start < NON_RESIDENT_HEADER_LEN || start >= self.length as usize {
                    return Err(NtfsError::RunList(format!(
                        "некорректное смещение mapping pairs: {}",
                        start
                    )));
                }
                Ok(&record[self.offset + start..self.offset + self.length as usize])
            }
            AttributeBody::Resident { .. } => Err(NtfsError::Corrupt(format!(
                "атрибут 0x{:X} резидентный",
                self.attr_type
            ))),
        }
    }
}

/// Ищет первый атрибут заданного типа. `None` - если встретился AT_END
/// или обход дошёл до конца записи.
pub fn find_attribute(record: &MftRecord, attr_type: u32) -> Result<Option<AttributeRecord>> {
    let data = &record.data;
    let bound = data.len().saturating_sub(ATTR_HEADER_LEN);
    let mut offset = record.header.first_attribute_offset as usize;

    while offset < bound {
        let current = LittleEndian::read_u32(&data[offset..offset + 4]);
        if current == AT_END {
            return Ok(None);
        }
        let length = LittleEndian::read_u32(&data[offset + 4..offset + 8]) as usize;
        if length == 0 || offset + length > data.len() {
            return Err(NtfsError::Corrupt(format!(
                "атрибут 0x{:X} в записи {} имеет длину {} при смещении {}",
                current, record.number, length, offset
            )));
        }
        if current == attr_type {
            return AttributeRecord::parse(data, offset).map(Some);
        }
        offset += length;
    }
    Ok(None)
}

pub fn require_attribute(record: &MftRecord, attr_type: u32) -> Result<AttributeRecord> {
    find_attribute(record, attr_type)?.ok_or(NtfsError::AttributeNotFound {
        record: record.number,
        attr_type,
    })
}

pub const FILE_NAME_HEADER_LEN: usize = 66;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct FileNameAttribute {
    pub parent_directory_reference: u64,
    pub creation_time: DateTime<Utc>,
    pub modified_time: DateTime<Utc>,
    pub mft_modified_time: DateTime<Utc>,
    pub accessed_time: DateTime<Utc>,
    pub allocated_size: u64,
    pub logical_size: u64,
    pub file_attributes: u32,
    pub name_type: u8,
    pub name: String,
}

impl FileNameAttribute {
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, FILE_NAME_HEADER_LEN, "$FILE_NAME")?;

        let name_length = data[64] as usize;
        let name_type = data[65];
        let name_end = FILE_NAME_HEADER_LEN + name_length * 2;
        ensure_len(data, name_end, "$FILE_NAME name")?;

        let name_u16: Vec<u16> = data[FILE_NAME_HEADER_LEN..name_end]
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();

        Ok(Self {
            parent_directory_reference: LittleEndian::read_u64(&data[0..8]),
            creation_time: filetime_to_datetime(LittleEndian::read_u64(&data[8..16])),
            modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[16..24])),
            mft_modified_time: filetime_to_datetime(LittleEndian::read_u64(&data[24..32])),
            accessed_time: filetime_to_datetime(LittleEndian::read_u64(&data[32..40])),
            allocated_size: LittleEndian::read_u64(&data[40..48]),
            logical_size: LittleEndian::read_u64(&data[48..56]),
            file_attributes: LittleEndian::read_u32(&data[56..60]),
            name_type,
            name: String::from_utf16_lossy(&name_u16),
        })
    }
}
