//! Дерево узлов навигации.
//!
//! Узлы хранятся в арене и адресуются индексом. Корень - собственный
//! родитель. В дереве живёт только цепочка от корня до текущего каталога:
//! у каждого узла цепочки ровно один удерживаемый потомок.

use std::ops::Index;

use crate::directory::DirEntry;
use crate::mft::record::{FILE_ROOT, MFT_RECORD_IN_USE, MFT_RECORD_IS_DIRECTORY};
use crate::models::NodeKind;

pub const ROOT_NAME: &str = "$root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub struct Inode {
    pub record: u64,
    pub name: String,
    pub flags: u16,
    pub parent: NodeId,
    pub children: Vec<NodeId>,
}

impl Inode {
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_record_flags(self.flags)
    }

    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }
}

#[derive(Debug)]
pub struct InodeTree {
    slots: Vec<Option<Inode>>,
    free: Vec<usize>,
    root: NodeId,
}

impl Default for InodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTree {
    pub fn new() -> Self {
        let root = NodeId(0);
        let inode = Inode {
            record: FILE_ROOT,
            name: ROOT_NAME.to_string(),
            flags: MFT_RECORD_IN_USE | MFT_RECORD_IS_DIRECTORY,
            parent: root,
            children: Vec::new(),
        };
        Self {
            slots: vec![Some(inode)],
            free: Vec::new(),
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Inode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self[id].parent
    }

    #[cfg(test)]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    /// Число живых узлов, включая корень.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn push_child(&mut self, parent: NodeId, entry: DirEntry) -> NodeId {
        let inode = Inode {
            record: entry.record,
            name: entry.name,
            flags: entry.flags,
            parent,
            children: Vec::new(),
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(inode);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(inode));
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(p) = self.slots[parent.0].as_mut() {
            p.children.push(id);
        }
        id
    }

    /// Освобождает всех потомков узла (рекурсивно); сам узел остаётся.
    pub fn release_children(&mut self, id: NodeId) {
        let children = match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(inode) => std::mem::take(&mut inode.children),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
    }

    /// Отцепляет узел от родителя и освобождает его поддерево. Корень не освобождается.
    pub fn release(&mut self, id: NodeId) {
        if self.is_root(id) {
            self.release_children(id);
            return;
        }
        let parent = match self.get(id) {
            Some(inode) => inode.parent,
            None => return,
        };
        if let Some(p) = self.slots[parent.0].as_mut() {
            p.children.retain(|&c| c != id);
        }
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(inode) = self.slots.get_mut(current.0).and_then(Option::take) {
                stack.extend(inode.children);
                self.free.push(current.0);
            }
        }
    }

    /// Заменяет потомков `at` цепочкой `chain` (каждый следующий - потомок
    /// предыдущего). Возвращает последний узел цепочки или `at`, если она пуста.
    pub fn splice(&mut self, at: NodeId, chain: Vec<DirEntry>) -> NodeId {
        self.release_children(at);
        let mut tail = at;
        for entry in chain {
            tail = self.push_child(tail, entry);
        }
        tail
    }

    /// Имена узлов от потомка корня до `id` включительно.
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = id;
        while !self.is_root(current) {
            let inode = &self[current];
            names.push(inode.name.as_str());
            current = inode.parent;
        }
        names.reverse();
        names
    }
}

/// Паникует, если узел уже освобождён.
impl Index<NodeId> for InodeTree {
    type Output = Inode;

    fn index(&self, id: NodeId) -> &Inode {
        match self.get(id) {
            Some(inode) => inode,
            None => panic!("узел {:?} освобождён", id),
        }
    }
}
