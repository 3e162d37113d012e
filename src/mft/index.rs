//! Структуры индекса каталога ($I30): INDEX_ROOT, INDEX_HEADER, INDEX_ENTRY
//! и блоки INDX из $INDEX_ALLOCATION.

use byteorder::{ByteOrder, LittleEndian};

use super::attributes::{FileNameAttribute, AT_FILE_NAME};
use super::record::{magic_of, MFT_REFERENCE_MASK};
use crate::error::{ensure_len, NtfsError, Result};

pub const INDX_MAGIC: &[u8; 4] = b"INDX";

pub const COLLATION_FILE_NAME: u32 = 0x01;

pub const INDEX_HEADER_LEN: usize = 16;
pub const INDEX_ROOT_LEN: usize = 32;
/// Заголовок INDEX_HEADER внутри блока INDX начинается с 0x18.
pub const INDEX_BLOCK_HEADER_OFFSET: usize = 0x18;
pub const INDEX_BLOCK_LEN: usize = 0x28;
pub const INDEX_ENTRY_HEADER_LEN: usize = 16;

pub const INDEX_ENTRY_NODE: u16 = 0x01;
pub const INDEX_ENTRY_END: u16 = 0x02;

/// LARGE_INDEX в ih_flags корня: есть $INDEX_ALLOCATION.
#[cfg(test)]
pub const LARGE_INDEX: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub entries_offset: u32,
    pub index_length: u32,
    pub allocated_size: u32,
    pub flags: u8,
}

impl IndexHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, INDEX_HEADER_LEN, "INDEX_HEADER")?;
        Ok(Self {
            entries_offset: LittleEndian::read_u32(&data[0..4]),
            index_length: LittleEndian::read_u32(&data[4..8]),
            allocated_size: LittleEndian::read_u32(&data[8..12]),
            flags: data[12],
        })
    }

    /// Область записей: `area` начинается с самого INDEX_HEADER.
    /// Возвращает (начало первой записи, конец используемой части).
    fn bounds(&self, area_len: usize) -> Result<(usize, usize)> {
        let start = self.entries_offset as usize;
        let end = (self.index_length as usize).min(area_len);
        if start < INDEX_HEADER_LEN || start > end {
            return Err(NtfsError::Corrupt(format!(
                "INDEX_HEADER: entries_offset = {}, index_length = {}",
                self.entries_offset, self.index_length
            )));
        }
        Ok((start, end))
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct IndexRoot {
    pub indexed_type: u32,
    pub collation_rule: u32,
    pub index_block_size: u32,
    pub clusters_per_index_block: i8,
    pub header: IndexHeader,
}

impl IndexRoot {
    pub fn parse(value: &[u8]) -> Result<Self> {
        ensure_len(value, INDEX_ROOT_LEN, "INDEX_ROOT")?;
        let root = Self {
            indexed_type: LittleEndian::read_u32(&value[0..4]),
            collation_rule: LittleEndian::read_u32(&value[4..8]),
            index_block_size: LittleEndian::read_u32(&value[8..12]),
            clusters_per_index_block: value[12] as i8,
            header: IndexHeader::parse(&value[16..])?,
        };
        if root.indexed_type != AT_FILE_NAME || root.collation_rule != COLLATION_FILE_NAME {
            return Err(NtfsError::Unsupported(format!(
                "индекс типа 0x{:X} с правилом сортировки {}",
                root.indexed_type, root.collation_rule
            )));
        }
        Ok(root)
    }

    /// Записи корня; `value` - всё значение атрибута INDEX_ROOT.
    pub fn entries<'a>(&self, value: &'a [u8]) -> Result<IndexEntries<'a>> {
        IndexEntries::new(&value[16..], &self.header)
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct IndexBlock {
    pub lsn: u64,
    pub vcn: u64,
    pub header: IndexHeader,
}

impl IndexBlock {
    pub fn parse(block: &[u8]) -> Result<Self> {
        ensure_len(block, INDEX_BLOCK_LEN, "INDX block")?;
        if &block[0..4] != INDX_MAGIC {
            return Err(NtfsError::BadMagic {
                what: "INDX block",
                found: magic_of(block),
            });
        }
        Ok(Self {
            lsn: LittleEndian::read_u64(&block[8..16]),
            vcn: LittleEndian::read_u64(&block[16..24]),
            header: IndexHeader::parse(&block[INDEX_BLOCK_HEADER_OFFSET..])?,
        })
    }

    pub fn entries<'a>(&self, block: &'a [u8]) -> Result<IndexEntries<'a>> {
        IndexEntries::new(&block[INDEX_BLOCK_HEADER_OFFSET..], &self.header)
    }
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub file_reference: u64,
    pub length: u16,
    pub key_length: u16,
    pub flags: u16,
    pub key: Option<FileNameAttribute>,
    pub subnode_vcn: Option<u64>,
}

impl IndexEntry {
    pub fn parse(data: &[u8]) -> Result<Self> {
        ensure_len(data, INDEX_ENTRY_HEADER_LEN, "INDEX_ENTRY")?;
        let length = LittleEndian::read_u16(&data[8..10]);
        let key_length = LittleEndian::read_u16(&data[10..12]);
        let flags = LittleEndian::read_u16(&data[12..14]);

        if (length as usize) < INDEX_ENTRY_HEADER_LEN {
            return Err(NtfsError::Corrupt(format!("длина INDEX_ENTRY = {}", length)));
        }
        ensure_len(data, length as usize, "INDEX_ENTRY")?;
        let data = &data[..length as usize];

        let key = if key_length > 0 && flags & INDEX_ENTRY_END == 0 {
            let key_end = INDEX_ENTRY_HEADER_LEN + key_length as usize;
            ensure_len(data, key_end, "INDEX_ENTRY key")?;
            Some(FileNameAttribute::parse(&data[INDEX_ENTRY_HEADER_LEN..key_end])?)
        } else {
            None
        };

        let subnode_vcn = if flags & INDEX_ENTRY_NODE != 0 && data.len() >= INDEX_ENTRY_HEADER_LEN + 8 {
            Some(LittleEndian::read_u64(&data[data.len() - 8..]))
        } else {
            None
        };

        Ok(Self {
            file_reference: LittleEndian::read_u64(&data[0..8]),
            length,
            key_length,
            flags,
            key,
            subnode_vcn,
        })
    }

    pub fn record_number(&self) -> u64 {
        self.file_reference & MFT_REFERENCE_MASK
    }

    pub fn is_end(&self) -> bool {
        self.flags & INDEX_ENTRY_END != 0
    }

    pub fn has_subnode(&self) -> bool {
        self.flags & INDEX_ENTRY_NODE != 0
    }
}

/// Обход записей одного узла индекса. Выдаёт и завершающую (END) запись,
/// после неё останавливается; также останавливается на границе узла.
pub struct IndexEntries<'a> {
    area: &'a [u8],
    offset: usize,
    end: usize,
    done: bool,
}

impl<'a> IndexEntries<'a> {
    fn new(area: &'a [u8], header: &IndexHeader) -> Result<Self> {
        let (offset, end) = header.bounds(area.len())?;
        Ok(Self {
            area,
            offset,
            end,
            done: false,
        })
    }
}

impl Iterator for IndexEntries<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset + INDEX_ENTRY_HEADER_LEN > self.end {
            return None;
        }
        let entry = match IndexEntry::parse(&self.area[self.offset..self.end]) {
            Ok(entry) => entry,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        self.offset += entry.length as usize;
        if entry.is_end() {
            self.done = true;
        }
        Some(Ok(entry))
    }
}
