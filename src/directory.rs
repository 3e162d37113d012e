//! Перечисление каталога по индексу $I30.
//!
//! Фаза 1: записи INDEX_ROOT. Фаза 2 (если END-запись корня несёт NODE):
//! все блоки INDX из $INDEX_ALLOCATION, прочитанные одним буфером.
//! Любая ошибка формата или поиска записи MFT прерывает листинг целиком.

use std::io::{Read, Seek};

use chrono::{DateTime, Utc};

use crate::error::{NtfsError, Result};
use crate::locator::MftLocator;
use crate::mft::attributes::{
    find_attribute, AttributeBody, AT_BITMAP, AT_INDEX_ALLOCATION, AT_INDEX_ROOT,
};
use crate::mft::index::{IndexBlock, IndexEntry, IndexRoot};
use crate::mft::record::MftRecord;
use crate::mft::runlist;
use crate::models::{ListEntry, NodeKind};
use crate::volume::{ClusterBuffer, Volume};

/// Дочерний элемент каталога: имя и размер из ключа индекса, флаги из записи MFT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub record: u64,
    pub name: String,
    pub flags: u16,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl DirEntry {
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_record_flags(self.flags)
    }

    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }

    pub fn to_list_entry(&self) -> ListEntry {
        ListEntry {
            name: self.name.clone(),
            kind: self.kind(),
            record: self.record,
            size: self.size,
            modified: self.modified,
        }
    }
}

/// Имена на '.' и '$' - ссылки на себя и метафайлы, в листинг не попадают.
fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('$')
}

pub fn read_directory<R: Read + Seek>(
    volume: &mut Volume<R>,
    locator: &MftLocator,
    dir: u64,
) -> Result<Vec<DirEntry>> {
    let record = locator.locate(volume, dir)?;
    let root_attr = find_attribute(&record, AT_INDEX_ROOT)?
        .ok_or_else(|| NtfsError::NotADirectory(format!("запись {}", dir)))?;
    let value = root_attr.value(&record.data)?;
    let root = IndexRoot::parse(value)?;

    let mut out = Vec::new();
    let mut descend = false;
    for entry in root.entries(value)? {
        let entry = entry?;
        if entry.is_end() {
            descend = entry.has_subnode();
            break;
        }
        collect(volume, locator, &entry, &mut out)?;
    }
    log::debug!("Каталог {}: {} записей в INDEX_ROOT", dir, out.len());

    if descend {
        read_allocation(volume, locator, &record, &mut out)?;
    }
    Ok(out)
}

fn collect<R: Read + Seek>(
    volume: &mut Volume<R>,
    locator: &MftLocator,
    entry: &IndexEntry,
    out: &mut Vec<DirEntry>,
) -> Result<()> {
    let Some(key) = &entry.key else {
        return Ok(());
    };
    if is_hidden(&key.name) {
        log::trace!("Пропуск {}", key.name);
        return Ok(());
    }
    let number = entry.record_number();
    let child = locator.locate(volume, number)?;
    out.push(DirEntry {
        record: number,
        name: key.name.clone(),
        flags: child.flags(),
        size: key.logical_size,
        modified: Some(key.modified_time),
    });
    Ok(())
}

fn read_allocation<R: Read + Seek>(
    volume: &mut Volume<R>,
    locator: &MftLocator,
    record: &MftRecord,
    out: &mut Vec<DirEntry>,
) -> Result<()> {
    let alloc = match find_attribute(record, AT_INDEX_ALLOCATION)? {
        Some(attr) => attr,
        None => {
            log::debug!("Запись {}: NODE без $INDEX_ALLOCATION", record.number);
            return Ok(());
        }
    };
    let data_size = match alloc.body {
        AttributeBody::NonResident { data_size, .. } => data_size,
        AttributeBody::Resident { .. } => {
            log::warn!("Запись {}: резидентный $INDEX_ALLOCATION пропущен", record.number);
            return Ok(());
        }
    };

    // $BITMAP необязателен; нерезидентный не читаем
    let bitmap = match find_attribute(record, AT_BITMAP)? {
        Some(attr) if attr.is_resident() => Some(attr.value(&record.data)?.to_vec()),
        _ => None,
    };

    let runs = runlist::decode(alloc.mapping_pairs(&record.data)?)?;
    let block_size = volume.params().index_block_size as usize;
    let mut buf = ClusterBuffer::new(block_size);
    for run in &runs {
        match run.lcn {
            Some(lcn) => volume.read_run(lcn, run.length, &mut buf)?,
            None => volume.zero_run(run.length, &mut buf)?,
        }
    }

    let used = buf.len().min(usize::try_from(data_size).unwrap_or(usize::MAX));
    let blocks = used / block_size;
    if used % block_size != 0 {
        log::warn!(
            "Запись {}: хвост $INDEX_ALLOCATION {} байт короче блока, пропущен",
            record.number,
            used % block_size
        );
    }

    let data = buf.as_slice();
    let before = out.len();
    for i in 0..blocks {
        if let Some(bitmap) = &bitmap {
            let in_use = bitmap.get(i / 8).is_some_and(|b| b & (1 << (i % 8)) != 0);
            if !in_use {
                log::trace!("Блок {} не используется", i);
                continue;
            }
        }
        let block = &data[i * block_size..(i + 1) * block_size];
        let header = IndexBlock::parse(block)?;
        for entry in header.entries(block)? {
            let entry = entry?;
            if entry.is_end() {
                break;
            }
            collect(volume, locator, &entry, out)?;
        }
    }
    log::debug!(
        "Запись {}: {} блоков INDX, {} записей",
        record.number,
        blocks,
        out.len() - before
    );
    Ok(())
}
