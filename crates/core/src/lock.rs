//! Per-document reentrant read/write locks and the registry handing them out.
//!
//! A [`DocumentLock`] admits any number of readers or a single writer.
//! Ownership is tracked per thread, so a thread may re-acquire a lock it
//! already holds: a writer may take further write or read holds, a reader
//! further read holds, and a thread that is the *only* reader may upgrade to
//! write. Acquisition blocks the calling thread; it never yields.
//!
//! Locks for many documents must always be taken in ascending [`DocId`]
//! order. `DocumentSet::lock` does this for every caller.

use crate::document::DocId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Read,
    Write,
}

impl LockMode {
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive { LockMode::Write } else { LockMode::Read }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LockMode::Read => "read",
            LockMode::Write => "write",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for {mode} lock on document {document}")]
    Timeout { document: DocId, mode: LockMode, waited: Duration },
    #[error("refused to upgrade read lock on document {document}: {readers} other reader(s) hold it")]
    UpgradeRefused { document: DocId, readers: usize },
    #[error("{mode} lock on document {document} is not held by the current thread")]
    NotHeld { document: DocId, mode: LockMode },
}

impl LockError {
    pub fn document(&self) -> DocId {
        match self {
            LockError::Timeout { document, .. }
            | LockError::UpgradeRefused { document, .. }
            | LockError::NotHeld { document, .. } => *document,
        }
    }

    pub fn mode(&self) -> LockMode {
        match self {
            LockError::Timeout { mode, .. } | LockError::NotHeld { mode, .. } => *mode,
            LockError::UpgradeRefused { .. } => LockMode::Write,
        }
    }
}

/// Lock acquisition policy shared by all locks of a [`LockManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Fail read→write upgrades immediately while other readers are present.
    pub upgrade_check: bool,
    /// Log a warning when a reader starts waiting for the write lock.
    pub warn_wait_on_read_for_write: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            upgrade_check: false,
            warn_wait_on_read_for_write: false,
        }
    }
}

#[derive(Debug, Default)]
struct LockState {
    writer: Option<ThreadId>,
    write_holds: usize,
    readers: HashMap<ThreadId, usize>,
}

impl LockState {
    fn other_readers(&self, me: ThreadId) -> usize {
        self.readers.keys().filter(|t| **t != me).count()
    }

    fn can_read(&self, me: ThreadId) -> bool {
        self.writer.is_none_or(|w| w == me)
    }

    fn can_write(&self, me: ThreadId) -> bool {
        self.can_read(me) && self.other_readers(me) == 0
    }
}

/// Reentrant multi-reader/single-writer lock guarding one document.
pub struct DocumentLock {
    document: DocId,
    state: Mutex<LockState>,
    released: Condvar,
    options: Arc<LockOptions>,
}

impl fmt::Debug for DocumentLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DocumentLock")
            .field("document", &self.document)
            .field("write_holds", &state.write_holds)
            .field("readers", &state.readers.len())
            .finish()
    }
}

impl DocumentLock {
    pub fn new(document: DocId, options: Arc<LockOptions>) -> Self {
        Self { document, state: Mutex::new(LockState::default()), released: Condvar::new(), options }
    }

    pub fn document(&self) -> DocId {
        self.document
    }

    /// Blocks until the lock is granted in `mode` or the timeout elapses.
    pub fn acquire(&self, mode: LockMode) -> Result<(), LockError> {
        let me = thread::current().id();
        let started = Instant::now();
        let deadline = self.options.timeout.map(|t| started + t);
        let mut state = self.state.lock();
        let mut warned = false;
        loop {
            let granted = match mode {
                LockMode::Read => state.can_read(me),
                LockMode::Write => state.can_write(me),
            };
            if granted {
                match mode {
                    LockMode::Read => *state.readers.entry(me).or_insert(0) += 1,
                    LockMode::Write => {
                        state.writer = Some(me);
                        state.write_holds += 1;
                    }
                }
                trace!(document = %self.document, %mode, "lock acquired");
                return Ok(());
            }

            if mode == LockMode::Write && state.readers.contains_key(&me) {
                let readers = state.other_readers(me);
                if self.options.upgrade_check {
                    warn!(document = %self.document, readers, "refusing read to write upgrade");
                    return Err(LockError::UpgradeRefused { document: self.document, readers });
                }
                if self.options.warn_wait_on_read_for_write && !warned {
                    warn!(document = %self.document, readers, "read lock holder waits for write lock");
                    warned = true;
                }
            }

            match deadline {
                Some(deadline) => {
                    if self.released.wait_until(&mut state, deadline).timed_out() {
                        let still_blocked = match mode {
                            LockMode::Read => !state.can_read(me),
                            LockMode::Write => !state.can_write(me),
                        };
                        if still_blocked {
                            let waited = started.elapsed();
                            debug!(document = %self.document, %mode, ?waited, "lock wait timed out");
                            return Err(LockError::Timeout { document: self.document, mode, waited });
                        }
                    }
                }
                None => self.released.wait(&mut state),
            }
        }
    }

    /// Releases one hold in `mode` taken by the current thread.
    pub fn release(&self, mode: LockMode) -> Result<(), LockError> {
        let me = thread::current().id();
        let not_held = LockError::NotHeld { document: self.document, mode };
        let mut state = self.state.lock();
        match mode {
            LockMode::Read => match state.readers.entry(me) {
                Entry::Occupied(mut entry) => {
                    *entry.get_mut() -= 1;
                    if *entry.get() == 0 {
                        entry.remove();
                    }
                }
                Entry::Vacant(_) => return Err(not_held),
            },
            LockMode::Write => {
                if state.writer != Some(me) {
                    return Err(not_held);
                }
                state.write_holds -= 1;
                if state.write_holds == 0 {
                    state.writer = None;
                }
            }
        }
        trace!(document = %self.document, %mode, "lock released");
        drop(state);
        self.released.notify_all();
        Ok(())
    }

    pub fn is_locked_for_write(&self) -> bool {
        self.state.lock().writer.is_some()
    }

    /// Number of distinct threads currently holding a read lock.
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers.len()
    }

    pub fn is_held_by_current_thread(&self, mode: LockMode) -> bool {
        let me = thread::current().id();
        let state = self.state.lock();
        match mode {
            LockMode::Read => state.readers.contains_key(&me),
            LockMode::Write => state.writer == Some(me),
        }
    }
}

/// Registry of document locks keyed by document id.
///
/// Handles are reference counted; the registry only keeps weak references
/// so a lock disappears once no descriptor refers to it any more.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<DocId, Weak<DocumentLock>>>,
    options: Arc<LockOptions>,
}

impl LockManager {
    pub fn new(options: LockOptions) -> Self {
        Self { locks: Mutex::new(HashMap::new()), options: Arc::new(options) }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Returns the lock for `document`, creating it on first use.
    pub fn document_lock(&self, document: DocId) -> Arc<DocumentLock> {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&document).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(DocumentLock::new(document, Arc::clone(&self.options)));
        locks.insert(document, Arc::downgrade(&lock));
        lock
    }

    /// Drops registry entries whose locks are no longer referenced.
    pub fn purge(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| lock.strong_count() > 0);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
