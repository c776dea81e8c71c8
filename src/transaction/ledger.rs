// Lock ledger: acquisition-ordered locks in a generational arena
use super::types::{LockKey, LockMode};
use crate::error::{Error, Result};

/// Stable handle to a ledger entry.
///
/// Handles stay valid while other entries are appended or removed. Once the
/// entry itself is removed, its slot generation moves on and the handle
/// resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId {
    index: u32,
    generation: u32,
}

/// One held lock.
#[derive(Debug, Clone)]
pub struct Lock {
    pub key: LockKey,
    /// Resource fields as found in the log line.
    pub descriptor: String,
    pub mode: LockMode,
    /// Latest entry for the same key at the time this one was appended.
    pub prev: Option<LockId>,
    /// Qualifier active when the lock was taken.
    pub extra: String,
}

impl Lock {
    /// Full identity string the key was hashed from.
    pub fn identity(&self) -> String {
        format!("{}{}", self.descriptor, self.extra)
    }
}

struct Node {
    lock: Lock,
    older: Option<u32>,
    newer: Option<u32>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub struct LockLedger {
    slots: Vec<Slot>,
    free: Vec<u32>,
    oldest: Option<u32>,
    newest: Option<u32>,
    len: usize,
}

impl LockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: LockId) -> Option<&Lock> {
        self.node(id).map(|node| &node.lock)
    }

    pub fn get_mut(&mut self, id: LockId) -> Option<&mut Lock> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut().map(|node| &mut node.lock)
    }

    pub fn contains(&self, id: LockId) -> bool {
        self.node(id).is_some()
    }

    /// Most recently acquired entry for `key`.
    pub fn find_latest(&self, key: LockKey) -> Option<LockId> {
        let mut cursor = self.newest;
        while let Some(index) = cursor {
            let slot = &self.slots[index as usize];
            let node = slot.node.as_ref()?;
            if node.lock.key == key {
                return Some(LockId {
                    index,
                    generation: slot.generation,
                });
            }
            cursor = node.older;
        }
        None
    }

    /// Like [`find_latest`](Self::find_latest), but rejects a match whose
    /// identity string differs from `identity`. `line` is the log line the
    /// lookup was made for.
    pub fn find_latest_verified(
        &self,
        key: LockKey,
        identity: &str,
        line: usize,
    ) -> Result<Option<LockId>> {
        let Some(id) = self.find_latest(key) else {
            return Ok(None);
        };
        let lock = self.get(id).ok_or(Error::StaleLockHandle)?;
        let existing = lock.identity();
        if existing != identity {
            return Err(Error::KeyCollision {
                line,
                key,
                existing,
                incoming: identity.to_string(),
            });
        }
        Ok(Some(id))
    }

    /// Appends a new newest entry. Its `prev` is whatever `find_latest`
    /// returned for the key before the append.
    pub fn append(&mut self, key: LockKey, descriptor: String, mode: LockMode, extra: String) -> LockId {
        let prev = self.find_latest(key);
        let node = Node {
            lock: Lock {
                key,
                descriptor,
                mode,
                prev,
                extra,
            },
            older: self.newest,
            newer: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        };

        if let Some(newest) = self.newest {
            if let Some(node) = self.slots[newest as usize].node.as_mut() {
                node.newer = Some(index);
            }
        } else {
            self.oldest = Some(index);
        }
        self.newest = Some(index);
        self.len += 1;

        LockId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Unlinks an entry and retires its handle.
    pub fn remove(&mut self, id: LockId) -> Result<Lock> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .ok_or(Error::StaleLockHandle)?;
        let node = slot.node.take().ok_or(Error::StaleLockHandle)?;
        slot.generation = slot.generation.wrapping_add(1);

        match node.older {
            Some(older) => {
                if let Some(n) = self.slots[older as usize].node.as_mut() {
                    n.newer = node.newer;
                }
            }
            None => self.oldest = node.newer,
        }
        match node.newer {
            Some(newer) => {
                if let Some(n) = self.slots[newer as usize].node.as_mut() {
                    n.older = node.older;
                }
            }
            None => self.newest = node.older,
        }

        self.free.push(id.index);
        self.len -= 1;
        Ok(node.lock)
    }

    /// Entries in acquisition order, oldest first.
    pub fn iter(&self) -> LedgerIter<'_> {
        LedgerIter {
            ledger: self,
            cursor: self.oldest,
        }
    }

    fn node(&self, id: LockId) -> Option<&Node> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }
}

pub struct LedgerIter<'a> {
    ledger: &'a LockLedger,
    cursor: Option<u32>,
}

impl<'a> Iterator for LedgerIter<'a> {
    type Item = (LockId, &'a Lock);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.ledger.slots[index as usize];
        let node = slot.node.as_ref()?;
        self.cursor = node.newer;
        Some((
            LockId {
                index,
                generation: slot.generation,
            },
            &node.lock,
        ))
    }
}

impl std::fmt::Debug for LockLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter().map(|(_, lock)| lock)).finish()
    }
}
