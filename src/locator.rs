//! Поиск записи MFT по номеру.
//!
//! Кандидатное смещение вычисляется через runlist самой $MFT (запись 0),
//! затем выполняется ограниченный прямой поиск шагом в размер записи до
//! записи с сигнатурой FILE и совпадающим номером в заголовке.

use std::io::{Read, Seek};

use crate::error::{NtfsError, Result};
use crate::mft::attributes::{require_attribute, AttributeBody, AT_DATA};
use crate::mft::record::{MftRecord, MftRecordHeader, FILE_MAGIC, FILE_MFT};
use crate::mft::runlist::{self, DataRun};
use crate::volume::Volume;

#[derive(Debug, Clone, Copy, Default)]
pub struct MountOptions {
    /// Максимум записей, просматриваемых при поиске одной записи.
    /// По умолчанию - число записей в $MFT.
    pub scan_limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MftLocator {
    runs: Vec<DataRun>,
    mft_offset: u64,
    record_size: u64,
    cluster_size: u64,
    scan_limit: u64,
}

impl MftLocator {
    /// Читает запись 0 по `mft_lcn` и разбирает runlist её $DATA.
    pub fn bootstrap<R: Read + Seek>(volume: &mut Volume<R>, options: &MountOptions) -> Result<Self> {
        let params = volume.params().clone();
        let record_size = params.mft_record_size as u64;
        let mft_offset = params
            .lcn_to_offset(params.mft_lcn)
            .ok_or_else(|| NtfsError::Corrupt(format!("mft_lcn = {}", params.mft_lcn)))?;

        let record = read_record(volume, FILE_MFT, mft_offset, record_size)?;
        if record.header.record_number as u64 != FILE_MFT {
            return Err(NtfsError::Corrupt(format!(
                "по смещению {} ожидалась запись $MFT, найдена {}",
                mft_offset, record.header.record_number
            )));
        }

        let data = require_attribute(&record, AT_DATA)?;
        let data_size = match data.body {
            AttributeBody::NonResident { data_size, .. } => data_size,
            AttributeBody::Resident { .. } => {
                return Err(NtfsError::Corrupt("$DATA записи $MFT резидентный".to_string()))
            }
        };
        let runs = runlist::decode(data.mapping_pairs(&record.data)?)?;
        if runs.is_empty() {
            return Err(NtfsError::Corrupt("пустой runlist $MFT".to_string()));
        }

        let total_records = data_size / record_size;
        let scan_limit = options.scan_limit.unwrap_or(total_records).max(1);
        log::debug!(
            "$MFT: {} записей, {} отрезков, предел поиска {}",
            total_records,
            runs.len(),
            scan_limit
        );

        Ok(Self {
            runs,
            mft_offset,
            record_size,
            cluster_size: params.cluster_size,
            scan_limit,
        })
    }

    /// Смещение, с которого начинается поиск записи `number`.
    /// `None`, если смещение не помещается в u64.
    pub fn candidate_offset(&self, number: u64) -> Option<u64> {
        let byte = number.checked_mul(self.record_size)?;
        let vcn = byte / self.cluster_size;
        match runlist::vcn_to_lcn(&self.runs, vcn) {
            Some(lcn) => lcn
                .checked_mul(self.cluster_size)?
                .checked_add(byte % self.cluster_size),
            None => self.mft_offset.checked_add(byte),
        }
    }

    pub fn locate<R: Read + Seek>(&self, volume: &mut Volume<R>, number: u64) -> Result<MftRecord> {
        let wanted = u32::try_from(number).map_err(|_| NtfsError::RecordNotFound(number))?;
        let mut offset = self
            .candidate_offset(number)
            .ok_or(NtfsError::RecordNotFound(number))?;

        for step in 0..self.scan_limit {
            if offset.saturating_add(self.record_size) > volume.len() {
                break;
            }
            let mut buf = vec![0u8; self.record_size as usize];
            volume.read_at(offset, &mut buf)?;

            if &buf[0..4] == FILE_MAGIC {
                let header = MftRecordHeader::parse(&buf)?;
                if header.record_number == wanted {
                    if step > 0 {
                        log::warn!("Запись {} найдена со сдвигом в {} записей", number, step);
                    }
                    log::trace!("Запись {} по смещению {}", number, offset);
                    return Ok(MftRecord {
                        number,
                        offset,
                        header,
                        data: buf,
                    });
                }
            }
            offset += self.record_size;
        }

        log::debug!("Запись {} не найдена за {} шагов", number, self.scan_limit);
        Err(NtfsError::RecordNotFound(number))
    }
}

fn read_record<R: Read + Seek>(
    volume: &mut Volume<R>,
    number: u64,
    offset: u64,
    record_size: u64,
) -> Result<MftRecord> {
    let mut buf = vec![0u8; record_size as usize];
    volume.read_at(offset, &mut buf)?;
    let header = MftRecordHeader::parse(&buf)?;
    Ok(MftRecord {
        number,
        offset,
        header,
        data: buf,
    })
}
