// Journaled account storage backing atomic attempts
//
// Every write records the slot's previous value in a write-ahead journal.
// Checkpoints are journal positions, so nested calls can revert their own writes
// while an enclosing attempt can still revert everything back to its start. The
// event log is truncated together with the journal.

use crate::{address::Address, events::WalletEvent};
use std::collections::BTreeMap;
use thiserror::Error;

// ================================
// Storage Keys
// ================================

/// A storage slot owned by one account
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub owner: Address,
    pub key: Vec<u8>,
}

impl StorageKey {
    pub fn new(owner: Address, key: impl Into<Vec<u8>>) -> Self {
        Self { owner, key: key.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("slot {key} of {owner} holds {len} bytes, expected {expected}")]
    CorruptSlot {
        owner: Address,
        key: String,
        len: usize,
        expected: usize,
    },
}

// ================================
// Journal
// ================================

#[derive(Debug, Clone)]
struct JournalEntry {
    key: StorageKey,
    previous: Option<Vec<u8>>,
}

/// Position in the journal that can be reverted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateCheckpoint {
    journal_len: usize,
    events_len: usize,
}

/// Account storage with nestable rollback
#[derive(Debug, Default)]
pub struct JournaledState {
    slots: BTreeMap<StorageKey, Vec<u8>>,
    journal: Vec<JournalEntry>,
    events: Vec<WalletEvent>,
}

impl JournaledState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint(&self) -> StateCheckpoint {
        StateCheckpoint {
            journal_len: self.journal.len(),
            events_len: self.events.len(),
        }
    }

    /// Undo every write and event recorded after `checkpoint`
    pub fn revert_to(&mut self, checkpoint: StateCheckpoint) {
        while self.journal.len() > checkpoint.journal_len {
            let Some(entry) = self.journal.pop() else { break };
            match entry.previous {
                Some(previous) => {
                    self.slots.insert(entry.key, previous);
                }
                None => {
                    self.slots.remove(&entry.key);
                }
            }
        }
        self.events.truncate(checkpoint.events_len);
    }

    /// Make all journaled writes permanent
    ///
    /// Only valid once no checkpoint is outstanding.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    pub fn load(&self, owner: &Address, key: &[u8]) -> Option<&[u8]> {
        self.view().load(owner, key)
    }

    pub fn store(&mut self, owner: Address, key: &[u8], value: Vec<u8>) {
        let key = StorageKey::new(owner, key);
        let previous = self.slots.insert(key.clone(), value);
        self.journal.push(JournalEntry { key, previous });
    }

    pub fn remove(&mut self, owner: Address, key: &[u8]) {
        let key = StorageKey::new(owner, key);
        if let Some(previous) = self.slots.remove(&key) {
            self.journal.push(JournalEntry {
                key,
                previous: Some(previous),
            });
        }
    }

    pub fn emit(&mut self, event: WalletEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[WalletEvent] {
        &self.events
    }

    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    pub fn view(&self) -> StateView<'_> {
        StateView { state: self }
    }
}

// ================================
// Read-only View
// ================================

/// Read-only access handed to guard policies
#[derive(Clone, Copy)]
pub struct StateView<'a> {
    state: &'a JournaledState,
}

impl<'a> StateView<'a> {
    pub fn load(&self, owner: &Address, key: &[u8]) -> Option<&'a [u8]> {
        // BTreeMap lookup needs an owned key
        self.state
            .slots
            .get(&StorageKey::new(*owner, key))
            .map(Vec::as_slice)
    }

    pub fn load_u64(&self, owner: &Address, key: &[u8]) -> Result<Option<u64>, StateError> {
        let Some(raw) = self.load(owner, key) else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw.try_into().map_err(|_| StateError::CorruptSlot {
            owner: *owner,
            key: String::from_utf8_lossy(key).into_owned(),
            len: raw.len(),
            expected: 8,
        })?;
        Ok(Some(u64::from_le_bytes(bytes)))
    }

    pub fn events(&self) -> &'a [WalletEvent] {
        &self.state.events
    }
}

impl std::fmt::Debug for StateView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateView")
            .field("slots", &self.state.slots.len())
            .finish()
    }
}
