//! Per-form memo of derived forms, keyed by the edit that produced them.
//!
//! A [`TransformKey`] encodes an edit kind and its small integer parameters
//! as a byte string. Keys whose bytes all fit in four bits, and which have at
//! most sixteen bytes, pack into a `u64`; longer or wider keys keep their
//! bytes on the heap.
//!
//! Each [`LambdaForm`] owns one [`TransformCache`]. Most forms are edited
//! zero or one times, so the cache starts small and grows in tiers:
//!
//! ```text
//! empty -> single entry -> array (4, 8, 16 entries) -> hash map
//! ```
//!
//! The first three tiers live behind a per-form mutex. The map is installed
//! once, under that mutex, and is internally synchronized from then on.
//!
//! Results are held weakly: a derived form stays cached only while someone
//! else keeps it alive. A dead entry is a miss and its slot is reused.

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use rustc_hash::FxHashMap;

use crate::ir::form::LambdaForm;

pub const MIN_CACHE_ARRAY_SIZE: usize = 4;
pub const MAX_CACHE_ARRAY_SIZE: usize = 16;

const PACKED_BYTE_SIZE: u32 = 4;
const PACKED_BYTE_MASK: u8 = (1 << PACKED_BYTE_SIZE) - 1;
const PACKED_BYTE_MAX_LENGTH: usize = (u64::BITS / PACKED_BYTE_SIZE) as usize;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// The kind of edit a key describes. The discriminant is the key's first
/// byte and is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformKind {
    BindArg = 1,
    AddArg,
    DupArg,
    SpreadArgs,
    FilterArg,
    FilterReturn,
    FilterReturnToZero,
    CollectArgs,
    CollectArgsToVoid,
    CollectArgsToArray,
    FoldArgs,
    FoldArgsToVoid,
    PermuteArgs,
}

impl TransformKind {
    const ALL: [TransformKind; 13] = [
        TransformKind::BindArg,
        TransformKind::AddArg,
        TransformKind::DupArg,
        TransformKind::SpreadArgs,
        TransformKind::FilterArg,
        TransformKind::FilterReturn,
        TransformKind::FilterReturnToZero,
        TransformKind::CollectArgs,
        TransformKind::CollectArgsToVoid,
        TransformKind::CollectArgsToArray,
        TransformKind::FoldArgs,
        TransformKind::FoldArgsToVoid,
        TransformKind::PermuteArgs,
    ];

    pub fn from_byte(b: u8) -> Option<TransformKind> {
        Self::ALL.get((b as usize).checked_sub(1)?).copied()
    }
}

/// An encoded edit: kind byte followed by parameter bytes.
///
/// Two keys are equal when their byte strings are equal after trailing
/// zero bytes are dropped.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TransformKey {
    packed: u64,
    full: Option<Box<[u8]>>,
}

impl TransformKey {
    /// Panics if a parameter does not fit in a byte.
    pub fn of(kind: TransformKind, params: &[usize]) -> Self {
        let mut bytes = Vec::with_capacity(1 + params.len());
        bytes.push(kind as u8);
        bytes.extend(params.iter().map(|&p| to_byte(p)));
        Self::from_bytes(bytes)
    }

    /// A key with leading integer parameters followed by raw bytes.
    pub fn with_bytes(kind: TransformKind, params: &[usize], tail: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(1 + params.len() + tail.len());
        bytes.push(kind as u8);
        bytes.extend(params.iter().map(|&p| to_byte(p)));
        bytes.extend_from_slice(tail);
        Self::from_bytes(bytes)
    }

    fn from_bytes(mut bytes: Vec<u8>) -> Self {
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        let packable = bytes.len() <= PACKED_BYTE_MAX_LENGTH
            && bytes.iter().all(|&b| b & !PACKED_BYTE_MASK == 0);
        if packable {
            let packed = bytes.iter().enumerate().fold(0u64, |acc, (i, &b)| {
                acc | (u64::from(b) << (i as u32 * PACKED_BYTE_SIZE))
            });
            TransformKey { packed, full: None }
        } else {
            TransformKey {
                packed: 0,
                full: Some(bytes.into_boxed_slice()),
            }
        }
    }

    pub fn is_packed(&self) -> bool {
        self.full.is_none()
    }

    /// Byte `i` of the encoding; zero past the end.
    pub fn byte_at(&self, i: usize) -> u8 {
        match &self.full {
            Some(bytes) => bytes.get(i).copied().unwrap_or(0),
            None if i < PACKED_BYTE_MAX_LENGTH => {
                ((self.packed >> (i as u32 * PACKED_BYTE_SIZE)) as u8) & PACKED_BYTE_MASK
            }
            None => 0,
        }
    }

    pub fn kind(&self) -> Option<TransformKind> {
        TransformKind::from_byte(self.byte_at(0))
    }

    pub fn bytes(&self) -> Vec<u8> {
        match &self.full {
            Some(bytes) => bytes.to_vec(),
            None => {
                let len = (0..PACKED_BYTE_MAX_LENGTH)
                    .rev()
                    .find(|&i| self.byte_at(i) != 0)
                    .map_or(0, |i| i + 1);
                (0..len).map(|i| self.byte_at(i)).collect()
            }
        }
    }
}

fn to_byte(p: usize) -> u8 {
    match u8::try_from(p) {
        Ok(b) => b,
        Err(_) => panic!("transform parameter {} does not fit in a byte", p),
    }
}

impl fmt::Debug for TransformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.bytes();
        let kind = self.kind().map(|k| format!("{:?}", k)).unwrap_or_else(|| "?".into());
        let params: Vec<String> = bytes.iter().skip(1).map(|b| b.to_string()).collect();
        let tag = if self.is_packed() { "" } else { "unpacked" };
        write!(f, "{}{}({})", tag, kind, params.join(","))
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Observable growth state, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Empty,
    Single,
    Array { capacity: usize },
    Map,
}

struct Entry {
    key: TransformKey,
    result: Weak<LambdaForm>,
}

impl Entry {
    fn live(key: TransformKey, result: &Arc<LambdaForm>) -> Self {
        Entry {
            key,
            result: Arc::downgrade(result),
        }
    }

    fn is_stale(&self) -> bool {
        self.result.strong_count() == 0
    }
}

enum Slots {
    Empty,
    Single(Entry),
    Array { entries: Vec<Entry>, capacity: usize },
    /// Entries moved to the map.
    Migrated,
}

#[derive(Default)]
struct TransformMap(RwLock<FxHashMap<TransformKey, Weak<LambdaForm>>>);

impl TransformMap {
    fn get(&self, key: &TransformKey) -> Option<Arc<LambdaForm>> {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .and_then(Weak::upgrade)
    }

    /// Installs `result` unless a live result is already present for `key`;
    /// returns whichever is installed afterwards. Dead entries are swept
    /// whenever a new key goes in.
    fn put_if_absent(&self, key: TransformKey, result: Arc<LambdaForm>) -> Arc<LambdaForm> {
        let mut table = self.0.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = table.get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        if !table.contains_key(&key) {
            table.retain(|_, form| form.strong_count() > 0);
        }
        table.insert(key, Arc::downgrade(&result));
        result
    }

    fn live(&self) -> usize {
        self.0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|form| form.strong_count() > 0)
            .count()
    }
}

pub struct TransformCache {
    slots: Mutex<Slots>,
    map: OnceLock<TransformMap>,
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformCache {
    pub fn new() -> Self {
        TransformCache {
            slots: Mutex::new(Slots::Empty),
            map: OnceLock::new(),
        }
    }

    /// The live result cached under `key`. Dead entries are misses.
    pub fn lookup(&self, key: &TransformKey) -> Option<Arc<LambdaForm>> {
        if let Some(map) = self.map.get() {
            return map.get(key);
        }
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        match &*slots {
            Slots::Empty => None,
            Slots::Single(entry) => matching(entry, key),
            Slots::Array { entries, .. } => entries.iter().find_map(|e| matching(e, key)),
            Slots::Migrated => self.map.get().and_then(|map| map.get(key)),
        }
    }

    /// Installs `result` under `key` unless a live result is already there.
    /// Returns the installed result, which is not `result` when another
    /// caller won. The cache does not keep `result` alive.
    pub fn store(&self, key: TransformKey, result: Arc<LambdaForm>) -> Arc<LambdaForm> {
        if let Some(map) = self.map.get() {
            return map.put_if_absent(key, result);
        }
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(map) = self.map.get() {
            return map.put_if_absent(key, result);
        }

        match &mut *slots {
            Slots::Empty => {
                *slots = Slots::Single(Entry::live(key, &result));
                return result;
            }
            Slots::Single(entry) => {
                if entry.key == key || entry.is_stale() {
                    return install(entry, key, result);
                }
            }
            Slots::Array { entries, capacity } => {
                let mut stale = None;
                for (i, entry) in entries.iter_mut().enumerate() {
                    if entry.key == key {
                        return install(entry, key, result);
                    }
                    if stale.is_none() && entry.is_stale() {
                        stale = Some(i);
                    }
                }
                if let Some(i) = stale {
                    tracing::debug!(slot = i, "transform cache reuses stale slot");
                    entries[i] = Entry::live(key, &result);
                    return result;
                }
                if entries.len() < *capacity {
                    entries.push(Entry::live(key, &result));
                    return result;
                }
                if *capacity < MAX_CACHE_ARRAY_SIZE {
                    *capacity = (*capacity * 2).min(MAX_CACHE_ARRAY_SIZE);
                    tracing::debug!(capacity = *capacity, "transform cache array grows");
                    entries.reserve(*capacity - entries.len());
                    entries.push(Entry::live(key, &result));
                    return result;
                }
            }
            Slots::Migrated => unreachable!("migrated transform cache without a map"),
        }

        // The current tier is full of live entries; move up one.
        match std::mem::replace(&mut *slots, Slots::Migrated) {
            Slots::Single(first) => {
                tracing::debug!(capacity = MIN_CACHE_ARRAY_SIZE, "transform cache grows to array");
                let mut entries = Vec::with_capacity(MIN_CACHE_ARRAY_SIZE);
                entries.push(first);
                entries.push(Entry::live(key, &result));
                *slots = Slots::Array {
                    entries,
                    capacity: MIN_CACHE_ARRAY_SIZE,
                };
                result
            }
            Slots::Array { entries, .. } => {
                let map = TransformMap::default();
                {
                    let mut table = map.0.write().unwrap_or_else(|e| e.into_inner());
                    for entry in entries.into_iter().filter(|e| !e.is_stale()) {
                        table.insert(entry.key, entry.result);
                    }
                }
                tracing::debug!(entries = MAX_CACHE_ARRAY_SIZE, "transform cache migrates to map");
                self.map.get_or_init(|| map).put_if_absent(key, result)
            }
            Slots::Empty | Slots::Migrated => unreachable!("transform cache tier cannot grow"),
        }
    }

    /// Drops every entry whose result is no longer alive. Returns the number
    /// of entries dropped.
    pub fn release_unused(&self) -> usize {
        let mut released = 0;
        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *slots {
                Slots::Single(entry) => {
                    if entry.is_stale() {
                        *slots = Slots::Empty;
                        released += 1;
                    }
                }
                Slots::Array { entries, .. } => {
                    let before = entries.len();
                    entries.retain(|e| !e.is_stale());
                    released += before - entries.len();
                }
                Slots::Empty | Slots::Migrated => {}
            }
        }
        if let Some(map) = self.map.get() {
            let mut table = map.0.write().unwrap_or_else(|e| e.into_inner());
            let before = table.len();
            table.retain(|_, form| form.strong_count() > 0);
            released += before - table.len();
        }
        if released > 0 {
            tracing::debug!(released, "released unused transforms");
        }
        released
    }

    pub fn tier(&self) -> CacheTier {
        if self.map.get().is_some() {
            return CacheTier::Map;
        }
        match &*self.slots.lock().unwrap_or_else(|e| e.into_inner()) {
            Slots::Empty => CacheTier::Empty,
            Slots::Single(_) => CacheTier::Single,
            Slots::Array { capacity, .. } => CacheTier::Array {
                capacity: *capacity,
            },
            Slots::Migrated => CacheTier::Map,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        if let Some(map) = self.map.get() {
            return map.live();
        }
        match &*self.slots.lock().unwrap_or_else(|e| e.into_inner()) {
            Slots::Single(entry) => usize::from(!entry.is_stale()),
            Slots::Array { entries, .. } => entries.iter().filter(|e| !e.is_stale()).count(),
            Slots::Empty | Slots::Migrated => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matching(entry: &Entry, key: &TransformKey) -> Option<Arc<LambdaForm>> {
    if entry.key == *key {
        entry.result.upgrade()
    } else {
        None
    }
}

/// Stores into an entry with an equal key or a stale slot: keeps a live
/// result, otherwise installs `result`.
fn install(entry: &mut Entry, key: TransformKey, result: Arc<LambdaForm>) -> Arc<LambdaForm> {
    if entry.key == key {
        if let Some(existing) = entry.result.upgrade() {
            return existing;
        }
    }
    *entry = Entry::live(key, &result);
    result
}
