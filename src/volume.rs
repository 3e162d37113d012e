//! Доступ к тому: позиционное чтение и чтение отрезков кластеров.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{NtfsError, Result};
use crate::mft::boot::{NtfsBootSector, BOOT_SECTOR_SIZE};
use crate::models::VolumeParameters;

/// Открытый том и его геометрия. Геометрия фиксируется при открытии
/// и больше не меняется.
pub struct Volume<R = BufReader<File>> {
    reader: R,
    params: VolumeParameters,
    len: u64,
}

impl Volume<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| NtfsError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> Volume<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        if len < BOOT_SECTOR_SIZE as u64 {
            return Err(NtfsError::NotNtfs);
        }

        let mut vbr = [0u8; BOOT_SECTOR_SIZE];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut vbr)?;

        let boot = NtfsBootSector::parse(&vbr)?;
        let params = boot.volume_parameters()?;
        log::debug!("Геометрия тома: {:?}", params);

        if params.volume_size() > len {
            log::warn!(
                "Boot sector заявляет {} байт, доступно {}",
                params.volume_size(),
                len
            );
        }

        Ok(Self { reader, params, len })
    }

    pub fn params(&self) -> &VolumeParameters {
        &self.params
    }

    /// Фактический размер потока тома в байтах.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.reader.read_exact(buf)?;
        Ok(())
    }

    pub fn read_cluster(&mut self, lcn: u64, buf: &mut [u8]) -> Result<()> {
        let offset = self.cluster_offset(lcn)?;
        self.read_at(offset, buf)
    }

    /// Дочитывает `count` кластеров начиная с `lcn` в конец буфера.
    pub fn read_run(&mut self, lcn: u64, count: u64, out: &mut ClusterBuffer) -> Result<()> {
        let offset = self.cluster_offset(lcn)?;
        let len = self.run_bytes(count)?;
        if offset.checked_add(len as u64).map_or(true, |end| end > self.len) {
            return Err(NtfsError::Corrupt(format!(
                "отрезок LCN {} x {} выходит за границы тома",
                lcn, count
            )));
        }
        let start = out.len();
        out.grow(len)?;
        self.read_at(offset, &mut out.data[start..])
    }

    /// Дописывает `count` нулевых кластеров (разреженный отрезок).
    pub fn zero_run(&self, count: u64, out: &mut ClusterBuffer) -> Result<()> {
        let len = self.run_bytes(count)?;
        out.grow(len)
    }

    fn cluster_offset(&self, lcn: u64) -> Result<u64> {
        self.params
            .lcn_to_offset(lcn)
            .ok_or_else(|| NtfsError::Corrupt(format!("LCN {} вне адресного пространства", lcn)))
    }

    fn run_bytes(&self, count: u64) -> Result<usize> {
        count
            .checked_mul(self.params.cluster_size)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| NtfsError::Corrupt(format!("отрезок из {} кластеров слишком велик", count)))
    }
}

/// Накопительный буфер для блоков индекса. Ёмкость растёт шагами,
/// кратными размеру блока индекса.
#[derive(Debug)]
pub struct ClusterBuffer {
    data: Vec<u8>,
    step: usize,
}

impl ClusterBuffer {
    pub fn new(step: usize) -> Self {
        Self {
            data: Vec::new(),
            step: step.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Удлиняет буфер на `extra` нулевых байт.
    fn grow(&mut self, extra: usize) -> Result<()> {
        let free = self.data.capacity() - self.data.len();
        if free < extra {
            let need = extra - free;
            let rounded = need.div_ceil(self.step) * self.step;
            self.data.try_reserve_exact(rounded)?;
        }
        self.data.resize(self.data.len() + extra, 0);
        Ok(())
    }
}
