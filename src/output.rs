use serde::Serialize;
use std::io::{self, Write};

/// Вывод в формате JSON Lines: один объект на строку, без обрамляющего массива.
pub struct JsonlWriter<W: Write> {
    inner: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.inner, value).map_err(io::Error::from)?;
        self.inner.write_all(b"\n")
    }

    /// Пишет все элементы и сбрасывает буфер.
    pub fn write_all<'a, T, I>(&mut self, items: I) -> io::Result<usize>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut count = 0;
        for item in items {
            self.write(item)?;
            count += 1;
        }
        self.inner.flush()?;
        Ok(count)
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.inner
    }
}
