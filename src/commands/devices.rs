use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::mft::boot::NTFS_OEM_ID;
use crate::models::BlockDevice;
use crate::output::JsonlWriter;

const DEVICE_PATTERN: &str = r"^(sd[a-z]+|hd[a-z]+|vd[a-z]+|nvme\d+n\d+|mmcblk\d+|loop\d+|sr\d+)$";

/// Размер в /sys/block/*/size всегда в 512-байтных секторах.
const SYSFS_SECTOR: u64 = 512;

/// Где искать устройства. Отдельная структура - чтобы тесты подменяли корни.
#[derive(Debug, Clone)]
pub struct DeviceRoots {
    pub sys_block: PathBuf,
    pub dev: PathBuf,
    pub by_uuid: PathBuf,
    pub by_label: PathBuf,
}

impl Default for DeviceRoots {
    fn default() -> Self {
        Self {
            sys_block: PathBuf::from("/sys/block"),
            dev: PathBuf::from("/dev"),
            by_uuid: PathBuf::from("/dev/disk/by-uuid"),
            by_label: PathBuf::from("/dev/disk/by-label"),
        }
    }
}

pub fn run(json: bool) -> i32 {
    let devices = match enumerate(&DeviceRoots::default()) {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("[!] Не удалось прочитать /sys/block: {}", e);
            return 1;
        }
    };

    let stdout = io::stdout();
    let result = if json {
        JsonlWriter::new(stdout.lock()).write_all(&devices).map(|_| ())
    } else {
        print_text(&mut stdout.lock(), &devices)
    };
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("[!] Ошибка вывода: {}", e);
            1
        }
    }
}

pub fn print_text<W: io::Write>(out: &mut W, devices: &[BlockDevice]) -> io::Result<()> {
    if devices.is_empty() {
        writeln!(out, "[*] Блочные устройства не найдены")?;
    }
    for dev in devices {
        writeln!(out, "[+] Устройство {}", describe(dev))?;
        for part in &dev.partitions {
            writeln!(out, "    - раздел {}", describe(part))?;
        }
    }
    Ok(())
}

fn describe(dev: &BlockDevice) -> String {
    let mut line = format!("{} ({}) {} {}", dev.name, dev.path, human_size(dev.size), dev.fs_type);
    if let Some(uuid) = &dev.uuid {
        line.push_str(&format!(" UUID={}", uuid));
    }
    if let Some(label) = &dev.label {
        line.push_str(&format!(" LABEL={}", label));
    }
    line
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn enumerate(roots: &DeviceRoots) -> io::Result<Vec<BlockDevice>> {
    let pattern = Regex::new(DEVICE_PATTERN).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let uuids = link_names(&roots.by_uuid);
    let labels = link_names(&roots.by_label);

    let mut names: Vec<String> = fs::read_dir(&roots.sys_block)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| pattern.is_match(name))
        .collect();
    names.sort();

    let mut devices = Vec::with_capacity(names.len());
    for name in names {
        let dir = roots.sys_block.join(&name);
        let mut partitions: Vec<String> = fs::read_dir(&dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|part| part.starts_with(&name) && part != &name)
                    .collect()
            })
            .unwrap_or_default();
        partitions.sort();

        let mut device = describe_node(roots, &dir, &name, &uuids, &labels);
        device.partitions = partitions
            .iter()
            .map(|part| describe_node(roots, &dir.join(part), part, &uuids, &labels))
            .collect();
        log::debug!("{}: {} разделов", name, device.partitions.len());
        devices.push(device);
    }
    Ok(devices)
}

fn describe_node(
    roots: &DeviceRoots,
    sys_dir: &Path,
    name: &str,
    uuids: &HashMap<String, String>,
    labels: &HashMap<String, String>,
) -> BlockDevice {
    let sectors = fs::read_to_string(sys_dir.join("size"))
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let dev_path = roots.dev.join(name);
    BlockDevice {
        name: name.to_string(),
        path: dev_path.to_string_lossy().into_owned(),
        size: sectors * SYSFS_SECTOR,
        fs_type: probe_fs_type(&dev_path).to_string(),
        uuid: uuids.get(name).cloned(),
        label: labels.get(name).cloned(),
        partitions: Vec::new(),
    }
}

/// Символические ссылки каталога by-uuid/by-label: имя устройства -> имя ссылки.
fn link_names(dir: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return map;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(target) = fs::read_link(entry.path()) else {
            continue;
        };
        if let Some(device) = target.file_name() {
            map.insert(
                device.to_string_lossy().into_owned(),
                entry.file_name().to_string_lossy().into_owned(),
            );
        }
    }
    map
}

fn probe_fs_type(dev_path: &Path) -> &'static str {
    let mut sector = [0u8; 512];
    match File::open(dev_path).and_then(|mut f| f.read_exact(&mut sector)) {
        Ok(()) if &sector[3..11] == NTFS_OEM_ID => "ntfs",
        Ok(()) => "other",
        Err(_) => "unknown",
    }
}
