//! Сессия навигации по смонтированному тому: pwd, cd, ls, cp.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::directory::{read_directory, DirEntry};
use crate::error::{NtfsError, Result};
use crate::extract::{self, CopyReport};
use crate::locator::{MftLocator, MountOptions};
use crate::models::{ListEntry, VolumeParameters};
use crate::tree::{InodeTree, NodeId};
use crate::volume::Volume;

/// Результат разрешения пути: цепочка найденных элементов от `start`.
/// В дерево не вставлена; пустая цепочка означает сам `start`.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub start: NodeId,
    pub chain: Vec<DirEntry>,
}

pub struct Session<R = BufReader<File>> {
    volume: Volume<R>,
    locator: MftLocator,
    tree: InodeTree,
    cwd: NodeId,
}

impl Session<BufReader<File>> {
    pub fn mount<P: AsRef<Path>>(path: P, options: MountOptions) -> Result<Self> {
        let volume = Volume::open(path.as_ref())?;
        Self::with_volume(volume, options)
    }
}

impl<R: Read + Seek> Session<R> {
    #[cfg(test)]
    pub fn from_reader(reader: R, options: MountOptions) -> Result<Self> {
        Self::with_volume(Volume::new(reader)?, options)
    }

    fn with_volume(mut volume: Volume<R>, options: MountOptions) -> Result<Self> {
        let locator = MftLocator::bootstrap(&mut volume, &options)?;
        let tree = InodeTree::new();
        let cwd = tree.root();
        Ok(Self {
            volume,
            locator,
            tree,
            cwd,
        })
    }

    /// Закрывает том; дерево и открытый файл освобождаются.
    pub fn unmount(self) {
        log::debug!(
            "Том закрыт, узлов в дереве: {}, cwd = {}",
            self.tree.live_count(),
            self.pwd()
        );
    }

    pub fn params(&self) -> &VolumeParameters {
        self.volume.params()
    }

    #[cfg(test)]
    pub fn tree(&self) -> &InodeTree {
        &self.tree
    }

    #[cfg(test)]
    pub fn cwd(&self) -> NodeId {
        self.cwd
    }

    pub fn pwd(&self) -> String {
        let names = self.tree.path(self.cwd);
        if names.is_empty() {
            return "/".to_string();
        }
        names.iter().fold(String::new(), |mut acc, name| {
            acc.push('/');
            acc.push_str(name);
            acc
        })
    }

    fn start_for(&self, path: &str) -> NodeId {
        if path.starts_with('/') {
            self.tree.root()
        } else {
            self.cwd
        }
    }

    /// Разрешает путь от узла `start`. Каждый компонент ищется в свежем
    /// листинге текущего каталога; листинг сразу отбрасывается.
    pub fn resolve(&mut self, start: NodeId, path: &str) -> Result<Resolution> {
        let (mut record, mut is_dir) = {
            let inode = &self.tree[start];
            (inode.record, inode.is_dir())
        };
        let mut chain = Vec::new();

        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !is_dir {
                return Err(NtfsError::PathNotFound(path.to_string()));
            }
            let found = read_directory(&mut self.volume, &self.locator, record)?
                .into_iter()
                .find(|e| e.name == component)
                .ok_or_else(|| NtfsError::PathNotFound(path.to_string()))?;
            record = found.record;
            is_dir = found.is_dir();
            chain.push(found);
        }

        Ok(Resolution { start, chain })
    }

    fn target_is_dir(&self, resolution: &Resolution) -> bool {
        match resolution.chain.last() {
            Some(entry) => entry.is_dir(),
            None => self.tree[resolution.start].is_dir(),
        }
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        match path {
            "." => Ok(()),
            ".." => {
                if !self.tree.is_root(self.cwd) {
                    let parent = self.tree.parent(self.cwd);
                    self.tree.release(self.cwd);
                    self.cwd = parent;
                }
                Ok(())
            }
            _ => {
                let start = self.start_for(path);
                let resolution = self.resolve(start, path)?;
                if !self.target_is_dir(&resolution) {
                    return Err(NtfsError::NotADirectory(path.to_string()));
                }
                self.cwd = self.tree.splice(resolution.start, resolution.chain);
                log::debug!("cwd = {}", self.pwd());
                Ok(())
            }
        }
    }

    /// Листинг каталога. Возвращает копию; дерево не меняется.
    pub fn ls(&mut self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        let record = match path {
            None | Some(".") => self.tree[self.cwd].record,
            Some("..") => self.tree[self.tree.parent(self.cwd)].record,
            Some(path) => {
                let start = self.start_for(path);
                let resolution = self.resolve(start, path)?;
                if !self.target_is_dir(&resolution) {
                    return Err(NtfsError::NotADirectory(path.to_string()));
                }
                match resolution.chain.last() {
                    Some(entry) => entry.record,
                    None => self.tree[resolution.start].record,
                }
            }
        };
        let entries = read_directory(&mut self.volume, &self.locator, record)?;
        Ok(entries.iter().map(DirEntry::to_list_entry).collect())
    }

    /// Копирует файл или каталог `from` в каталог хоста `to`.
    /// Ошибка разрешения пути возвращается как `Err`, ошибки копирования
    /// - в `CopyReport::first_error`.
    pub fn cp<P: AsRef<Path>>(&mut self, from: &str, to: P) -> Result<CopyReport> {
        if from == "." || from == ".." {
            return Err(NtfsError::IncompatiblePath(from.to_string()));
        }
        let start = self.start_for(from);
        let resolution = self.resolve(start, from)?;
        let target = resolution
            .chain
            .last()
            .ok_or_else(|| NtfsError::IncompatiblePath(from.to_string()))?;
        Ok(extract::extract(
            &mut self.volume,
            &self.locator,
            target,
            to.as_ref(),
        ))
    }
}
