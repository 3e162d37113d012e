//! Декодирование mapping pairs (data runs) нерезидентных атрибутов.
//!
//! Каждый элемент: управляющий байт (старший ниббл - ширина поля смещения,
//! младший - ширина поля длины), затем длина в кластерах (беззнаковая, LE)
//! и дельта LCN (знаковая, LE) относительно предыдущего отрезка.
//! Нулевой управляющий байт завершает список.

use crate::error::{NtfsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRun {
    pub vcn_start: u64,
    pub length: u64,
    /// `None` - разреженный отрезок (поле смещения отсутствует).
    pub lcn: Option<u64>,
}

impl DataRun {
    #[cfg(test)]
    pub fn is_sparse(&self) -> bool {
        self.lcn.is_none()
    }
}

pub fn decode(bytes: &[u8]) -> Result<Vec<DataRun>> {
    let mut runs = Vec::new();
    let mut pos = 0usize;
    let mut current_vcn: u64 = 0;
    let mut current_lcn: i64 = 0;

    loop {
        let header = *bytes.get(pos).ok_or_else(|| {
            NtfsError::RunList(format!("нет завершающего нулевого байта (позиция {})", pos))
        })?;
        if header == 0 {
            break;
        }
        pos += 1;

        let len_bytes = (header & 0x0F) as usize;
        let off_bytes = (header >> 4) as usize;

        if len_bytes == 0 || len_bytes > 8 || off_bytes > 8 {
            return Err(NtfsError::RunList(format!(
                "некорректные размеры нибблов: len={}, off={}",
                len_bytes, off_bytes
            )));
        }
        if pos + len_bytes + off_bytes > bytes.len() {
            return Err(NtfsError::RunList(format!(
                "отрезок по смещению {} требует {} байт, осталось {}",
                pos - 1,
                1 + len_bytes + off_bytes,
                bytes.len() - pos + 1
            )));
        }

        let mut run_length: u64 = 0;
        for i in 0..len_bytes {
            run_length |= (bytes[pos + i] as u64) << (i * 8);
        }
        pos += len_bytes;

        if run_length == 0 {
            return Err(NtfsError::RunList("длина отрезка равна 0".to_string()));
        }

        let lcn = if off_bytes == 0 {
            None
        } else {
            let mut delta: i64 = 0;
            for i in 0..off_bytes {
                delta |= (bytes[pos + i] as i64) << (i * 8);
            }
            // последний байт знаковый
            if off_bytes < 8 && bytes[pos + off_bytes - 1] & 0x80 != 0 {
                delta |= -1i64 << (off_bytes * 8);
            }
            pos += off_bytes;

            current_lcn = current_lcn
                .checked_add(delta)
                .ok_or_else(|| NtfsError::RunList("переполнение LCN".to_string()))?;
            if current_lcn < 0 {
                return Err(NtfsError::RunList(format!("отрицательный LCN: {}", current_lcn)));
            }
            Some(current_lcn as u64)
        };

        runs.push(DataRun {
            vcn_start: current_vcn,
            length: run_length,
            lcn,
        });
        current_vcn = current_vcn
            .checked_add(run_length)
            .ok_or_else(|| NtfsError::RunList("переполнение VCN".to_string()))?;
    }

    log::trace!("data runs: {:?}", runs);
    Ok(runs)
}

#[cfg(test)]
pub fn total_clusters(runs: &[DataRun]) -> u64 {
    runs.iter().map(|r| r.length).sum()
}

/// Отображает VCN в LCN по списку отрезков. `None` для разреженных,
/// непокрытых VCN и LCN за пределами u64.
pub fn vcn_to_lcn(runs: &[DataRun], vcn: u64) -> Option<u64> {
    runs.iter()
        .find(|r| vcn >= r.vcn_start && vcn - r.vcn_start < r.length)
        .and_then(|r| r.lcn?.checked_add(vcn - r.vcn_start))
}

/// Кодирует отрезки минимальной шириной полей (для тестовых образов).
#[cfg(test)]
pub fn encode(runs: &[(Option<u64>, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut prev_lcn: i64 = 0;
    for &(lcn, length) in runs {
        let len_field = unsigned_width(length);
        let (off_field, delta) = match lcn {
            None => (0, 0),
            Some(lcn) => {
                let delta = lcn as i64 - prev_lcn;
                prev_lcn = lcn as i64;
                (signed_width(delta), delta)
            }
        };
        out.push(((off_field << 4) | len_field) as u8);
        out.extend_from_slice(&length.to_le_bytes()[..len_field]);
        out.extend_from_slice(&delta.to_le_bytes()[..off_field]);
    }
    out.push(0);
    out
}

#[cfg(test)]
fn unsigned_width(v: u64) -> usize {
    (1..=8).find(|&w| w == 8 || v >> (w * 8) == 0).unwrap_or(8)
}

#[cfg(test)]
fn signed_width(v: i64) -> usize {
    (1..=8)
        .find(|&w| {
            let bits = w * 8;
            w == 8 || (v >= -(1i64 << (bits - 1)) && v < (1i64 << (bits - 1)))
        })
        .unwrap_or(8)
}
