use chrono::{DateTime, TimeZone, Utc};

/// 100-нс интервалы между 1601-01-01 и 1970-01-01 (Unix Epoch).
const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;

/// Конвертирует Windows FILETIME (100-нс интервалы с 1601-01-01) в DateTime<Utc>
pub fn filetime_to_datetime(filetime: u64) -> DateTime<Utc> {
    let unix_time_100ns = filetime.saturating_sub(FILETIME_UNIX_EPOCH);
    let seconds = (unix_time_100ns / 10_000_000) as i64;
    let nanoseconds = ((unix_time_100ns % 10_000_000) * 100) as u32;

    // .single() даёт Option из LocalResult; вне диапазона - эпоха
    Utc.timestamp_opt(seconds, nanoseconds)
        .single()
        .unwrap_or_default()
}

/// Обратное преобразование, нужно для сборки тестовых образов.
#[cfg(test)]
pub fn datetime_to_filetime(dt: DateTime<Utc>) -> u64 {
    let secs = dt.timestamp().max(0) as u64;
    FILETIME_UNIX_EPOCH + secs * 10_000_000 + (dt.timestamp_subsec_nanos() / 100) as u64
}
