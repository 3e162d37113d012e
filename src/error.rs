//! Ошибки чтения тома NTFS.
//!
//! Четыре класса: формат (сигнатуры, усечённые структуры, битые runlist),
//! "не найдено" (атрибут, запись MFT, компонент пути), ввод-вывод и ресурсы.

use std::collections::TryReserveError;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NtfsError {
    #[error("Не удалось открыть '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Файловая система NTFS не обнаружена")]
    NotNtfs,

    #[error("Неверная сигнатура {what}: {found:?}")]
    BadMagic { what: &'static str, found: [u8; 4] },

    #[error("Структура {what} усечена: нужно {needed} байт, доступно {got}")]
    Truncated {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Повреждённая структура: {0}")]
    Corrupt(String),

    #[error("Ошибка разбора data runs: {0}")]
    RunList(String),

    #[error("Не поддерживается: {0}")]
    Unsupported(String),

    #[error("Запись MFT {0} не найдена")]
    RecordNotFound(u64),

    #[error("Атрибут 0x{attr_type:X} отсутствует в записи {record}")]
    AttributeNotFound { record: u64, attr_type: u32 },

    #[error("Нет такого файла или каталога: {0}")]
    PathNotFound(String),

    #[error("Не является каталогом: {0}")]
    NotADirectory(String),

    #[error("Недопустимый путь: {0}")]
    IncompatiblePath(String),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Не удалось выделить буфер: {0}")]
    Alloc(#[from] TryReserveError),
}

pub type Result<T> = std::result::Result<T, NtfsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    NotFound,
    Io,
    Resource,
}

impl NtfsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NtfsError::NotNtfs
            | NtfsError::BadMagic { .. }
            | NtfsError::Truncated { .. }
            | NtfsError::Corrupt(_)
            | NtfsError::RunList(_)
            | NtfsError::Unsupported(_) => ErrorKind::Format,
            NtfsError::RecordNotFound(_)
            | NtfsError::AttributeNotFound { .. }
            | NtfsError::PathNotFound(_)
            | NtfsError::NotADirectory(_)
            | NtfsError::IncompatiblePath(_) => ErrorKind::NotFound,
            NtfsError::Open { .. } | NtfsError::Io(_) => ErrorKind::Io,
            NtfsError::Alloc(_) => ErrorKind::Resource,
        }
    }

    /// Можно ли продолжать сессию после ошибки без потери состояния дерева.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Io)
    }

    pub(crate) fn truncated(what: &'static str, needed: usize, got: usize) -> Self {
        NtfsError::Truncated { what, needed, got }
    }
}

/// Проверка длины буфера перед чтением полей по фиксированным смещениям.
pub(crate) fn ensure_len(data: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if data.len() < needed {
        return Err(NtfsError::truncated(what, needed, data.len()));
    }
    Ok(())
}
