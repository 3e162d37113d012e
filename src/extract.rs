//! Копирование файлов и каталогов с тома на хост.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use crate::directory::{read_directory, DirEntry};
use crate::error::{NtfsError, Result};
use crate::locator::MftLocator;
use crate::mft::attributes::{require_attribute, AttributeBody, AT_DATA};
use crate::mft::runlist::{self, DataRun};
use crate::volume::Volume;

/// Итог рекурсивного копирования: сколько узлов создано и первая ошибка.
/// Уже скопированное при ошибке не откатывается.
#[derive(Debug, Default)]
pub struct CopyReport {
    pub copied: usize,
    pub first_error: Option<NtfsError>,
}

impl CopyReport {
    pub fn is_complete(&self) -> bool {
        self.first_error.is_none()
    }
}

/// Содержимое безымянного $DATA.
#[derive(Debug)]
pub enum DataStream {
    Resident(Vec<u8>),
    NonResident(ChunkStream),
}

/// Состояние покластерного чтения нерезидентного $DATA.
#[derive(Debug)]
pub struct ChunkStream {
    runs: Vec<DataRun>,
    run_index: usize,
    cluster_in_run: u64,
    data_size: u64,
    initialized_size: u64,
    position: u64,
    cluster: Vec<u8>,
}

impl ChunkStream {
    #[cfg(test)]
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Следующий кластер данных (последний усечён до `data_size`),
    /// `None` - конец данных.
    pub fn next_chunk<R: Read + Seek>(&mut self, volume: &mut Volume<R>) -> Result<Option<&[u8]>> {
        if self.position >= self.data_size {
            return Ok(None);
        }

        let run = loop {
            let run = *self.runs.get(self.run_index).ok_or_else(|| {
                NtfsError::Corrupt(format!(
                    "runlist $DATA закончился на {} байте из {}",
                    self.position, self.data_size
                ))
            })?;
            if self.cluster_in_run < run.length {
                break run;
            }
            self.run_index += 1;
            self.cluster_in_run = 0;
        };

        match run.lcn {
            Some(lcn) => {
                let lcn = lcn.checked_add(self.cluster_in_run).ok_or_else(|| {
                    NtfsError::Corrupt(format!("LCN {} + {} вне диапазона", lcn, self.cluster_in_run))
                })?;
                volume.read_cluster(lcn, &mut self.cluster)?
            }
            None => {
                log::trace!("VCN {}: разреженный кластер", run.vcn_start + self.cluster_in_run);
                self.cluster.fill(0);
            }
        }
        self.cluster_in_run += 1;

        let take = (self.cluster.len() as u64).min(self.data_size - self.position) as usize;
        // за initialized_size на диске мусор
        if self.position + take as u64 > self.initialized_size {
            let valid = self.initialized_size.saturating_sub(self.position) as usize;
            self.cluster[valid.min(take)..take].fill(0);
        }
        self.position += take as u64;
        Ok(Some(&self.cluster[..take]))
    }
}

pub fn open_data<R: Read + Seek>(volume: &mut Volume<R>, locator: &MftLocator, number: u64) -> Result<DataStream> {
    let record = locator.locate(volume, number)?;
    let data = require_attribute(&record, AT_DATA)?;
    if data.is_compressed() || data.is_encrypted() {
        return Err(NtfsError::Unsupported(format!(
            "сжатый или зашифрованный $DATA в записи {}",
            number
        )));
    }

    match data.body {
        AttributeBody::Resident { .. } => Ok(DataStream::Resident(data.value(&record.data)?.to_vec())),
        AttributeBody::NonResident {
            data_size,
            initialized_size,
            ..
        } => {
            let runs = runlist::decode(data.mapping_pairs(&record.data)?)?;
            let cluster_size = usize::try_from(volume.params().cluster_size)
                .map_err(|_| NtfsError::Corrupt("размер кластера".to_string()))?;
            let mut cluster = Vec::new();
            cluster.try_reserve_exact(cluster_size)?;
            cluster.resize(cluster_size, 0);
            Ok(DataStream::NonResident(ChunkStream {
                runs,
                run_index: 0,
                cluster_in_run: 0,
                data_size,
                initialized_size: initialized_size.min(data_size),
                position: 0,
                cluster,
            }))
        }
    }
}

/// Копирует узел `entry` в каталог `dest_dir` под его собственным именем.
pub fn extract<R: Read + Seek>(
    volume: &mut Volume<R>,
    locator: &MftLocator,
    entry: &DirEntry,
    dest_dir: &Path,
) -> CopyReport {
    let mut report = CopyReport::default();
    if let Err(e) = copy_node(volume, locator, entry, dest_dir, &mut report) {
        log::debug!("Копирование {} прервано: {}", entry.name, e);
        report.first_error = Some(e);
    }
    report
}

/// Имя с тома должно быть ровно одним обычным компонентом пути хоста.
fn host_component(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(NtfsError::IncompatiblePath(name.to_string())),
    }
}

fn copy_node<R: Read + Seek>(
    volume: &mut Volume<R>,
    locator: &MftLocator,
    entry: &DirEntry,
    dest_dir: &Path,
    report: &mut CopyReport,
) -> Result<()> {
    let target: PathBuf = dest_dir.join(host_component(&entry.name)?);

    if entry.is_dir() {
        fs::create_dir(&target)?;
        report.copied += 1;
        log::debug!("Каталог {}", target.display());
        for child in read_directory(volume, locator, entry.record)? {
            copy_node(volume, locator, &child, &target, report)?;
        }
        return Ok(());
    }

    let stream = open_data(volume, locator, entry.record)?;
    let mut out = BufWriter::new(File::create(&target)?);
    let written = match stream {
        DataStream::Resident(bytes) => {
            out.write_all(&bytes)?;
            bytes.len() as u64
        }
        DataStream::NonResident(mut chunks) => {
            let mut total = 0u64;
            while let Some(chunk) = chunks.next_chunk(volume)? {
                out.write_all(chunk)?;
                total += chunk.len() as u64;
            }
            total
        }
    };
    out.flush()?;
    report.copied += 1;
    log::debug!("Файл {} ({} байт)", target.display(), written);
    Ok(())
}
