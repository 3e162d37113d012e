//! Сборка синтетических образов NTFS для тестов.
//!
//! Геометрия фиксирована: сектор 512, кластер 4096, запись MFT 1024,
//! блок индекса 4096. MFT непрерывна и начинается с LCN 4.

use std::collections::BTreeMap;

use crate::mft::attributes::{AT_BITMAP, AT_DATA, AT_FILE_NAME, AT_INDEX_ALLOCATION, AT_INDEX_ROOT, AT_END};
use crate::mft::index::{INDEX_ENTRY_END, INDEX_ENTRY_NODE, LARGE_INDEX};
use crate::mft::record::{FILE_ROOT, MFT_RECORD_IN_USE, MFT_RECORD_IS_DIRECTORY};
use crate::mft::runlist;

pub const SECTOR: usize = 512;
pub const CLUSTER: usize = 4096;
pub const RECORD: usize = 1024;
pub const BLOCK: usize = 4096;
pub const MFT_LCN: u64 = 4;
pub const MFT_RECORDS: u64 = 1024;
const MFT_CLUSTERS: u64 = MFT_RECORDS * RECORD as u64 / CLUSTER as u64;
const FIRST_USER_RECORD: u64 = 16;

/// 2020-01-01T00:00:00Z
pub const FILETIME_2020: u64 = 132_223_104_000_000_000;

fn align8(n: usize) -> usize {
    (n + 7) & !7
}

fn utf16(name: &str) -> Vec<u8> {
    name.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

pub fn boot_sector(bps: u16, spc: u8, mft_lcn: u64, total_sectors: u64) -> Vec<u8> {
    let mut vbr = vec![0u8; SECTOR];
    vbr[0..3].copy_from_slice(&[0xEB, 0x52, 0x90]);
    vbr[3..11].copy_from_slice(b"NTFS    ");
    vbr[11..13].copy_from_slice(&bps.to_le_bytes());
    vbr[13] = spc;
    vbr[21] = 0xF8;
    vbr[40..48].copy_from_slice(&total_sectors.to_le_bytes());
    vbr[48..56].copy_from_slice(&mft_lcn.to_le_bytes());
    vbr[56..64].copy_from_slice(&2u64.to_le_bytes());
    vbr[64] = (-10i8) as u8;
    let cluster = bps as usize * spc as usize;
    vbr[68] = if cluster > 0 && cluster <= BLOCK {
        (BLOCK / cluster) as u8
    } else {
        (-12i8) as u8
    };
    vbr[72..80].copy_from_slice(&0x1234_5678_9ABC_DEF0u64.to_le_bytes());
    vbr[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
    vbr
}

pub fn record_bytes(size: usize, number: u64, flags: u16, attrs: &[Vec<u8>]) -> Vec<u8> {
    let mut rec = vec![0u8; size];
    rec[0..4].copy_from_slice(b"FILE");
    rec[4..6].copy_from_slice(&0x30u16.to_le_bytes());
    rec[6..8].copy_from_slice(&3u16.to_le_bytes());
    rec[16..18].copy_from_slice(&1u16.to_le_bytes());
    rec[18..20].copy_from_slice(&1u16.to_le_bytes());
    rec[20..22].copy_from_slice(&0x38u16.to_le_bytes());
    rec[22..24].copy_from_slice(&flags.to_le_bytes());
    rec[28..32].copy_from_slice(&(size as u32).to_le_bytes());
    rec[40..42].copy_from_slice(&(attrs.len() as u16).to_le_bytes());
    rec[44..48].copy_from_slice(&(number as u32).to_le_bytes());

    let mut offset = 0x38;
    for attr in attrs {
        rec[offset..offset + attr.len()].copy_from_slice(attr);
        offset += attr.len();
    }
    assert!(offset + 8 <= size, "атрибуты не помещаются в запись {}", number);
    rec[offset..offset + 4].copy_from_slice(&AT_END.to_le_bytes());
    rec[24..28].copy_from_slice(&((offset + 8) as u32).to_le_bytes());
    rec
}

pub fn resident_attr(ty: u32, value: &[u8]) -> Vec<u8> {
    resident_attr_named(ty, "", value)
}

pub fn resident_attr_named(ty: u32, name: &str, value: &[u8]) -> Vec<u8> {
    let name = utf16(name);
    let value_offset = align8(0x18 + name.len());
    let len = align8(value_offset + value.len());
    let mut attr = vec![0u8; len];
    attr[0..4].copy_from_slice(&ty.to_le_bytes());
    attr[4..8].copy_from_slice(&(len as u32).to_le_bytes());
    attr[9] = (name.len() / 2) as u8;
    attr[10..12].copy_from_slice(&0x18u16.to_le_bytes());
    attr[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&(value_offset as u16).to_le_bytes());
    attr[22] = u8::from(ty == AT_FILE_NAME);
    attr[0x18..0x18 + name.len()].copy_from_slice(&name);
    attr[value_offset..value_offset + value.len()].copy_from_slice(value);
    attr
}

pub fn non_resident_attr(ty: u32, runs: &[u8], clusters: u64, data_size: u64) -> Vec<u8> {
    non_resident_attr_named(ty, "", runs, clusters, data_size)
}

pub fn non_resident_attr_named(ty: u32, name: &str, runs: &[u8], clusters: u64, data_size: u64) -> Vec<u8> {
    let name = utf16(name);
    let runs_offset = align8(0x40 + name.len());
    let len = align8(runs_offset + runs.len());
    let mut attr = vec![0u8; len];
    attr[0..4].copy_from_slice(&ty.to_le_bytes());
    attr[4..8].copy_from_slice(&(len as u32).to_le_bytes());
    attr[8] = 1;
    attr[9] = (name.len() / 2) as u8;
    attr[10..12].copy_from_slice(&0x40u16.to_le_bytes());
    attr[16..24].copy_from_slice(&0u64.to_le_bytes());
    attr[24..32].copy_from_slice(&clusters.wrapping_sub(1).to_le_bytes());
    attr[32..34].copy_from_slice(&(runs_offset as u16).to_le_bytes());
    attr[40..48].copy_from_slice(&(clusters * CLUSTER as u64).to_le_bytes());
    attr[48..56].copy_from_slice(&data_size.to_le_bytes());
    attr[56..64].copy_from_slice(&data_size.to_le_bytes());
    attr[0x40..0x40 + name.len()].copy_from_slice(&name);
    attr[runs_offset..runs_offset + runs.len()].copy_from_slice(runs);
    attr
}

pub fn file_name_key(parent: u64, name: &str, size: u64, file_attributes: u32) -> Vec<u8> {
    let name16 = utf16(name);
    let mut key = vec![0u8; 66 + name16.len()];
    key[0..8].copy_from_slice(&(parent | 1 << 48).to_le_bytes());
    for i in 0..4 {
        key[8 + i * 8..16 + i * 8].copy_from_slice(&FILETIME_2020.to_le_bytes());
    }
    let allocated = (size as usize).div_ceil(CLUSTER) * CLUSTER;
    key[40..48].copy_from_slice(&(allocated as u64).to_le_bytes());
    key[48..56].copy_from_slice(&size.to_le_bytes());
    key[56..60].copy_from_slice(&file_attributes.to_le_bytes());
    key[64] = (name16.len() / 2) as u8;
    key[65] = 1;
    key[66..].copy_from_slice(&name16);
    key
}

pub fn index_entry(record: u64, parent: u64, name: &str, size: u64) -> Vec<u8> {
    let key = file_name_key(parent, name, size, 0);
    let len = align8(16 + key.len());
    let mut entry = vec![0u8; len];
    entry[0..8].copy_from_slice(&(record | 1 << 48).to_le_bytes());
    entry[8..10].copy_from_slice(&(len as u16).to_le_bytes());
    entry[10..12].copy_from_slice(&(key.len() as u16).to_le_bytes());
    entry[16..16 + key.len()].copy_from_slice(&key);
    entry
}

pub fn end_entry(node: bool, vcn: u64) -> Vec<u8> {
    let len = if node { 24 } else { 16 };
    let mut entry = vec![0u8; len];
    entry[8..10].copy_from_slice(&(len as u16).to_le_bytes());
    let flags = INDEX_ENTRY_END | if node { INDEX_ENTRY_NODE } else { 0 };
    entry[12..14].copy_from_slice(&flags.to_le_bytes());
    if node {
        entry[16..24].copy_from_slice(&vcn.to_le_bytes());
    }
    entry
}

pub fn index_root_value(entries: &[Vec<u8>], node: bool) -> Vec<u8> {
    let end = end_entry(node, 0);
    let body: usize = entries.iter().map(Vec::len).sum::<usize>() + end.len();
    let mut value = vec![0u8; 32];
    value[0..4].copy_from_slice(&AT_FILE_NAME.to_le_bytes());
    value[4..8].copy_from_slice(&1u32.to_le_bytes());
    value[8..12].copy_from_slice(&(BLOCK as u32).to_le_bytes());
    value[12] = 1;
    value[16..20].copy_from_slice(&16u32.to_le_bytes());
    value[20..24].copy_from_slice(&((16 + body) as u32).to_le_bytes());
    value[24..28].copy_from_slice(&((16 + body) as u32).to_le_bytes());
    value[28] = if node { LARGE_INDEX } else { 0 };
    for entry in entries {
        value.extend_from_slice(entry);
    }
    value.extend_from_slice(&end);
    value
}

pub fn index_block(size: usize, vcn: u64, entries: &[Vec<u8>]) -> Vec<u8> {
    let mut block = vec![0u8; size];
    block[0..4].copy_from_slice(b"INDX");
    block[4..6].copy_from_slice(&0x28u16.to_le_bytes());
    block[6..8].copy_from_slice(&((size / SECTOR + 1) as u16).to_le_bytes());
    block[16..24].copy_from_slice(&vcn.to_le_bytes());

    let mut offset = 0x28;
    for entry in entries.iter().chain(std::iter::once(&end_entry(false, 0))) {
        assert!(offset + entry.len() <= size, "записи не помещаются в блок INDX");
        block[offset..offset + entry.len()].copy_from_slice(entry);
        offset += entry.len();
    }
    block[0x18..0x1C].copy_from_slice(&0x10u32.to_le_bytes());
    block[0x1C..0x20].copy_from_slice(&((offset - 0x18) as u32).to_le_bytes());
    block[0x20..0x24].copy_from_slice(&((size - 0x18) as u32).to_le_bytes());
    block
}

#[derive(Debug, Clone, Copy)]
pub enum Piece {
    Data(u64),
    Sparse(u64),
}

#[derive(Debug, Clone)]
pub enum Layout {
    Resident,
    /// `descending`: каждый следующий по VCN фрагмент лежит ниже предыдущего по LCN.
    Runs { pieces: Vec<Piece>, descending: bool },
}

/// Как хранится $INDEX_ALLOCATION переполненного каталога.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocation {
    NonResident,
    /// NODE в INDEX_ROOT есть, атрибута нет.
    Missing,
    Resident,
}

#[derive(Debug, Clone)]
enum Kind {
    System,
    Dir { children: Vec<(u64, String)> },
    File { content: Vec<u8>, layout: Layout },
}

#[derive(Debug, Clone)]
struct Node {
    parent: u64,
    name: String,
    kind: Kind,
}

pub struct ImageBuilder {
    nodes: BTreeMap<u64, Node>,
    next_record: u64,
    root_budget: usize,
    stale_block: bool,
    with_bitmap: bool,
    allocation_slack: usize,
    allocation: Allocation,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        let system = ["$MFT", "$MFTMirr", "$LogFile", "$Volume", "$AttrDef"];
        for (n, name) in system.iter().enumerate() {
            nodes.insert(n as u64, Node { parent: FILE_ROOT, name: name.to_string(), kind: Kind::System });
        }
        for n in 6..FIRST_USER_RECORD {
            nodes.insert(n, Node { parent: FILE_ROOT, name: format!("$Sys{}", n), kind: Kind::System });
        }
        nodes.insert(
            FILE_ROOT,
            Node {
                parent: FILE_ROOT,
                name: ".".to_string(),
                kind: Kind::Dir {
                    children: vec![(0, "$MFT".to_string()), (3, "$Volume".to_string()), (FILE_ROOT, ".".to_string())],
                },
            },
        );
        Self {
            nodes,
            next_record: FIRST_USER_RECORD,
            root_budget: 512,
            stale_block: false,
            with_bitmap: true,
            allocation_slack: 0,
            allocation: Allocation::NonResident,
        }
    }

    pub fn root(&self) -> u64 {
        FILE_ROOT
    }

    /// Сколько байт записей индекса помещается в INDEX_ROOT до переполнения.
    pub fn root_budget(mut self, bytes: usize) -> Self {
        self.root_budget = bytes;
        self
    }

    /// Добавляет в переполненные каталоги неиспользуемый (по $BITMAP) блок INDX.
    pub fn stale_index_block(mut self) -> Self {
        self.stale_block = true;
        self
    }

    pub fn without_index_bitmap(mut self) -> Self {
        self.with_bitmap = false;
        self
    }

    /// Хвост $INDEX_ALLOCATION короче одного блока.
    pub fn index_allocation_slack(mut self, bytes: usize) -> Self {
        self.allocation_slack = bytes;
        self
    }

    pub fn index_allocation(mut self, allocation: Allocation) -> Self {
        self.allocation = allocation;
        self
    }

    fn insert(&mut self, parent: u64, name: &str, kind: Kind) -> u64 {
        let record = self.next_record;
        self.next_record += 1;
        assert!(self.next_record <= MFT_RECORDS, "MFT переполнена");
        self.nodes.insert(record, Node { parent, name: name.to_string(), kind });
        self.add_entry(parent, name, record);
        record
    }

    pub fn mkdir(&mut self, parent: u64, name: &str) -> u64 {
        self.insert(parent, name, Kind::Dir { children: Vec::new() })
    }

    pub fn add_file(&mut self, parent: u64, name: &str, content: &[u8]) -> u64 {
        let layout = if content.len() <= 256 {
            Layout::Resident
        } else {
            Layout::Runs {
                pieces: vec![Piece::Data(content.len().div_ceil(CLUSTER) as u64)],
                descending: false,
            }
        };
        self.add_file_with_layout(parent, name, content, layout)
    }

    pub fn add_file_with_layout(&mut self, parent: u64, name: &str, content: &[u8], layout: Layout) -> u64 {
        self.insert(parent, name, Kind::File { content: content.to_vec(), layout })
    }

    /// Произвольная запись индекса без создания записи MFT.
    pub fn add_entry(&mut self, parent: u64, name: &str, record: u64) {
        match self.nodes.get_mut(&parent).map(|n| &mut n.kind) {
            Some(Kind::Dir { children }) => children.push((record, name.to_string())),
            _ => panic!("{} не каталог", parent),
        }
    }

    fn size_of(&self, record: u64) -> u64 {
        match self.nodes.get(&record).map(|n| &n.kind) {
            Some(Kind::File { content, .. }) => content.len() as u64,
            _ => 0,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let heap_start = (MFT_LCN + MFT_CLUSTERS + 4) as usize * CLUSTER;
        let mut image = vec![0u8; heap_start];

        for (&number, node) in &self.nodes {
            let attrs = match &node.kind {
                Kind::System if number == 0 => {
                    let runs = runlist::encode(&[(Some(MFT_LCN), MFT_CLUSTERS)]);
                    vec![non_resident_attr(AT_DATA, &runs, MFT_CLUSTERS, MFT_RECORDS * RECORD as u64)]
                }
                Kind::System => vec![resident_attr(AT_FILE_NAME, &file_name_key(FILE_ROOT, &node.name, 0, 0x06))],
                Kind::File { content, layout } => {
                    let mut attrs = vec![resident_attr(
                        AT_FILE_NAME,
                        &file_name_key(node.parent, &node.name, content.len() as u64, 0x20),
                    )];
                    attrs.push(self.data_attr(&mut image, content, layout));
                    attrs
                }
                Kind::Dir { children } => {
                    let mut attrs = vec![resident_attr(AT_FILE_NAME, &file_name_key(node.parent, &node.name, 0, 0x1000_0000))];
                    attrs.extend(self.index_attrs(&mut image, number, children));
                    attrs
                }
            };
            let flags = match node.kind {
                Kind::Dir { .. } => MFT_RECORD_IN_USE | MFT_RECORD_IS_DIRECTORY,
                _ => MFT_RECORD_IN_USE,
            };
            let rec = record_bytes(RECORD, number, flags, &attrs);
            let offset = MFT_LCN as usize * CLUSTER + number as usize * RECORD;
            image[offset..offset + RECORD].copy_from_slice(&rec);
        }

        let total_sectors = (image.len() / SECTOR) as u64;
        image[0..SECTOR].copy_from_slice(&boot_sector(SECTOR as u16, (CLUSTER / SECTOR) as u8, MFT_LCN, total_sectors));
        image
    }

    fn alloc(image: &mut Vec<u8>, clusters: usize) -> u64 {
        let lcn = image.len() / CLUSTER;
        image.resize(image.len() + clusters * CLUSTER, 0);
        lcn as u64
    }

    fn data_attr(&self, image: &mut Vec<u8>, content: &[u8], layout: &Layout) -> Vec<u8> {
        let (pieces, descending) = match layout {
            Layout::Resident => return resident_attr(AT_DATA, content),
            Layout::Runs { pieces, descending } => (pieces, *descending),
        };

        // VCN каждого фрагмента
        let mut vcn = 0u64;
        let mut placed: Vec<(Piece, u64)> = Vec::new();
        for &piece in pieces {
            placed.push((piece, vcn));
            vcn += match piece {
                Piece::Data(n) | Piece::Sparse(n) => n,
            };
        }
        let total_clusters = vcn;

        let mut lcns = vec![None; placed.len()];
        let order: Vec<usize> = if descending {
            (0..placed.len()).rev().collect()
        } else {
            (0..placed.len()).collect()
        };
        for i in order {
            if let (Piece::Data(n), start_vcn) = placed[i] {
                let lcn = Self::alloc(image, n as usize);
                // между фрагментами оставляем кластер-разрыв
                Self::alloc(image, 1);
                for c in 0..n {
                    let dst = (lcn + c) as usize * CLUSTER;
                    let src = (start_vcn + c) as usize * CLUSTER;
                    // хвост последнего кластера заполнен мусором: обрезка должна быть видна
                    image[dst..dst + CLUSTER].fill(0xAA);
                    if src < content.len() {
                        let end = (src + CLUSTER).min(content.len());
                        image[dst..dst + (end - src)].copy_from_slice(&content[src..end]);
                    }
                }
                lcns[i] = Some(lcn);
            }
        }

        let runs: Vec<(Option<u64>, u64)> = placed
            .iter()
            .zip(&lcns)
            .map(|((piece, _), lcn)| match piece {
                Piece::Data(n) | Piece::Sparse(n) => (*lcn, *n),
            })
            .collect();
        non_resident_attr(AT_DATA, &runlist::encode(&runs), total_clusters, content.len() as u64)
    }

    fn index_attrs(&self, image: &mut Vec<u8>, number: u64, children: &[(u64, String)]) -> Vec<Vec<u8>> {
        let entries: Vec<Vec<u8>> = children
            .iter()
            .map(|(rec, name)| index_entry(*rec, number, name, self.size_of(*rec)))
            .collect();

        let mut split = 0;
        let mut used = 0;
        while split < entries.len() && used + entries[split].len() <= self.root_budget {
            used += entries[split].len();
            split += 1;
        }
        if split == entries.len() {
            return vec![resident_attr_named(AT_INDEX_ROOT, "$I30", &index_root_value(&entries, false))];
        }

        let root = resident_attr_named(AT_INDEX_ROOT, "$I30", &index_root_value(&entries[..split], true));
        match self.allocation {
            Allocation::NonResident => {}
            Allocation::Missing => return vec![root],
            Allocation::Resident => {
                return vec![root, resident_attr_named(AT_INDEX_ALLOCATION, "$I30", &[0u8; 16])];
            }
        }

        let mut blocks: Vec<Vec<Vec<u8>>> = vec![Vec::new()];
        let capacity = BLOCK - 0x28 - 16;
        let mut fill = 0;
        for entry in &entries[split..] {
            if fill + entry.len() > capacity {
                blocks.push(Vec::new());
                fill = 0;
            }
            fill += entry.len();
            if let Some(last) = blocks.last_mut() {
                last.push(entry.clone());
            }
        }
        let live_blocks = blocks.len();
        if self.stale_block {
            blocks.push(vec![index_entry(1, number, "stale.txt", 0)]);
        }

        let slack_clusters = self.allocation_slack.div_ceil(CLUSTER);
        let clusters = blocks.len() * (BLOCK / CLUSTER) + slack_clusters;
        let lcn = Self::alloc(image, clusters);
        for (i, block) in blocks.iter().enumerate() {
            let bytes = index_block(BLOCK, i as u64, block);
            let dst = lcn as usize * CLUSTER + i * BLOCK;
            image[dst..dst + BLOCK].copy_from_slice(&bytes);
        }
        let data_size = (blocks.len() * BLOCK + self.allocation_slack) as u64;
        let runs = runlist::encode(&[(Some(lcn), clusters as u64)]);

        let mut attrs = vec![
            root,
            non_resident_attr_named(AT_INDEX_ALLOCATION, "$I30", &runs, clusters as u64, data_size),
        ];
        if self.with_bitmap {
            let mut bitmap = vec![0u8; blocks.len().div_ceil(64) * 8];
            for i in 0..live_blocks {
                bitmap[i / 8] |= 1 << (i % 8);
            }
            attrs.push(resident_attr_named(AT_BITMAP, "$I30", &bitmap));
        }
        attrs
    }
}

/// Инициализация логгера в тестах; повторные вызовы безопасны.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
