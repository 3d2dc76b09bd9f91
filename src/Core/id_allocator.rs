use parking_lot::Mutex;

/// Highest writer id that fits the ABI's writer id space. 0 is never valid.
pub const MAX_WRITER_ID: u16 = (1 << 10) - 1;

/// Hands out writer ids in 1..=max_id.
///
/// Ids are handed out in increasing order after the last one allocated,
/// wrapping back to 1, so a just-freed id is not reused right away. Owned by
/// whoever creates writers; there is no process-wide instance.
pub struct WriterIdAllocator {
    max_id: u16,
    inner: Mutex<IdState>,
}

struct IdState {
    last_id: u16,
    /// in_use[id] for id in 0..=max_id, index 0 unused.
    in_use: Vec<bool>,
    allocated: usize,
}

impl WriterIdAllocator {
    /// `max_id` is clamped to 1..=MAX_WRITER_ID
    pub fn new(max_id: u16) -> Self {
        let max_id = max_id.clamp(1, MAX_WRITER_ID);
        Self {
            max_id,
            inner: Mutex::new(IdState {
                last_id: 0,
                in_use: vec![false; max_id as usize + 1],
                allocated: 0,
            }),
        }
    }

    pub fn max_id(&self) -> u16 {
        self.max_id
    }

    /// Next free id, or `None` if all max_id ids are taken
    pub fn allocate(&self) -> Option<u16> {
        let mut state = self.inner.lock();
        if state.allocated == self.max_id as usize {
            return None;
        }
        let mut id = state.last_id;
        loop {
            id = if id >= self.max_id { 1 } else { id + 1 };
            if !state.in_use[id as usize] {
                state.in_use[id as usize] = true;
                state.last_id = id;
                state.allocated += 1;
                return Some(id);
            }
        }
    }

    /// Return `id` to the pool. Freeing an id that is not allocated is a no-op.
    pub fn free(&self, id: u16) {
        if id == 0 || id > self.max_id {
            return;
        }
        let mut state = self.inner.lock();
        if std::mem::replace(&mut state.in_use[id as usize], false) {
            state.allocated -= 1;
        }
    }

    /// Number of ids currently allocated
    pub fn in_use(&self) -> usize {
        self.inner.lock().allocated
    }
}

impl Default for WriterIdAllocator {
    fn default() -> Self {
        Self::new(MAX_WRITER_ID)
    }
}
