//! Off-heap storage for raw compiler command lines.
//!
//! Records keep a [`CompileLineHandle`] instead of the text. Lines are
//! appended to an anonymous temp file, and identical lines share a handle,
//! so resident memory tracks unique lines rather than record count.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::util::truncate_with_marker;

/// Default cap on the stored size of a single line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Stable reference to a stored command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompileLineHandle(u32);

impl CompileLineHandle {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: u32,
}

struct StoreInner {
    file: File,
    end: u64,
    slots: Vec<Slot>,
    by_hash: HashMap<u64, Vec<CompileLineHandle>>,
}

/// Append-only, write-once line store; safe to share between threads.
pub struct CompileLineStore {
    inner: Mutex<StoreInner>,
    max_line_bytes: usize,
}

impl std::fmt::Debug for CompileLineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileLineStore")
            .field("len", &self.len())
            .field("max_line_bytes", &self.max_line_bytes)
            .finish()
    }
}

impl CompileLineStore {
    pub fn new() -> Result<Self> {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Result<Self> {
        let file = tempfile::tempfile().context("create compile line store")?;
        Ok(Self {
            inner: Mutex::new(StoreInner {
                file,
                end: 0,
                slots: Vec::new(),
                by_hash: HashMap::new(),
            }),
            max_line_bytes,
        })
    }

    /// Store `line` and return its handle.
    ///
    /// Lines longer than the configured cap are cut and end with
    /// [`crate::util::TRUNCATION_MARKER`]. Appending a line equal to one
    /// already stored returns the existing handle.
    pub fn append(&self, line: &str) -> Result<CompileLineHandle> {
        let text = truncate_with_marker(line, self.max_line_bytes);
        let hash = hash_line(&text);
        let mut inner = self.lock();

        let candidates = inner.by_hash.get(&hash).cloned().unwrap_or_default();
        for handle in candidates {
            if read_slot(&mut inner, handle)? == text {
                return Ok(handle);
            }
        }

        let offset = inner.end;
        inner
            .file
            .seek(SeekFrom::Start(offset))
            .context("seek compile line store")?;
        inner
            .file
            .write_all(text.as_bytes())
            .context("append compile line")?;
        let len = u32::try_from(text.len()).context("compile line too long")?;
        inner.end += u64::from(len);
        let index = u32::try_from(inner.slots.len()).context("compile line store is full")?;
        let handle = CompileLineHandle(index);
        inner.slots.push(Slot { offset, len });
        inner.by_hash.entry(hash).or_default().push(handle);
        Ok(handle)
    }

    /// Read back the text stored under `handle`.
    pub fn get(&self, handle: CompileLineHandle) -> Result<String> {
        let mut inner = self.lock();
        read_slot(&mut inner, handle)
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

fn read_slot(inner: &mut StoreInner, handle: CompileLineHandle) -> Result<String> {
    let slot = *inner
        .slots
        .get(handle.0 as usize)
        .ok_or_else(|| anyhow!("unknown compile line handle {}", handle.0))?;
    inner
        .file
        .seek(SeekFrom::Start(slot.offset))
        .context("seek compile line store")?;
    let mut buf = vec![0u8; slot.len as usize];
    inner
        .file
        .read_exact(&mut buf)
        .context("read compile line")?;
    String::from_utf8(buf).context("compile line is not UTF-8")
}

fn hash_line(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::TRUNCATION_MARKER;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn lines_round_trip_byte_identical() {
        let store = CompileLineStore::new().expect("store");
        let first = store.append("gcc -Iinc -DDEBUG -c main.c").expect("append");
        let second = store.append("g++ -std=c++17 -c util.cpp").expect("append");
        assert_ne!(first, second);
        assert_eq!(store.get(first).expect("get"), "gcc -Iinc -DDEBUG -c main.c");
        assert_eq!(store.get(second).expect("get"), "g++ -std=c++17 -c util.cpp");
        assert_eq!(store.get(first).expect("get again"), "gcc -Iinc -DDEBUG -c main.c");
    }

    #[test]
    fn identical_lines_share_a_handle() {
        let store = CompileLineStore::new().expect("store");
        let a = store.append("cc -c x.c").expect("append");
        let b = store.append("cc -c x.c").expect("append");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn oversized_lines_carry_a_visible_marker() {
        let store = CompileLineStore::with_max_line_bytes(32).expect("store");
        let long = format!("gcc {}", "-DX ".repeat(40));
        let handle = store.append(&long).expect("append");
        let text = store.get(handle).expect("get");
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert!(long.starts_with(text.trim_end_matches(TRUNCATION_MARKER)));
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let store = CompileLineStore::new().expect("store");
        assert!(store.get(CompileLineHandle(7)).is_err());
    }

    #[test]
    fn concurrent_appends_all_resolve() {
        let store = Arc::new(CompileLineStore::new().expect("store"));
        let handles = thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|worker| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        (0..20)
                            .map(|idx| {
                                let line = format!("cc -c w{worker}_{idx}.c");
                                (line.clone(), store.append(&line).expect("append"))
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().expect("join"))
                .collect::<Vec<_>>()
        });
        for (line, handle) in handles {
            assert_eq!(store.get(handle).expect("get"), line);
        }
        assert_eq!(store.len(), 80);
    }
}
