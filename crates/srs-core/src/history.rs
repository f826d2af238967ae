/// Fixed-capacity ring of the most recent commands, oldest evicted on push.
///
/// Storage is allocated once; pushes are O(1) and never grow it.
#[derive(Debug, Clone)]
pub struct CommandHistory<T: Copy + Eq> {
    slots: Box<[Option<T>]>,
    /// Index the next push writes to.
    cursor: usize,
    len: usize,
}

impl<T: Copy + Eq> CommandHistory<T> {
    /// # Panics
    /// If `capacity` is zero. Channel configs reject that during validation.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Appends `value`, returning the evicted entry when the ring was full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = self.slots[self.cursor].replace(value);
        self.cursor = (self.cursor + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
            None
        } else {
            evicted
        }
    }

    /// Entries in arrival order, most recent last.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let start = (self.cursor + self.capacity() - self.len) % self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(start + i) % self.capacity()])
    }

    /// The single value every slot holds, once the ring is full.
    pub fn uniform(&self) -> Option<T> {
        if !self.is_full() {
            return None;
        }
        let first = self.slots[0]?;
        self.slots
            .iter()
            .all(|slot| *slot == Some(first))
            .then_some(first)
    }
}

/// Outcome of feeding one decoded command into a [`HistoryDebouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce<T> {
    NoChange,
    Stable(T),
}

/// Accepts a new command only once the whole history window agrees on it.
#[derive(Debug, Clone)]
pub struct HistoryDebouncer<T: Copy + Eq> {
    history: CommandHistory<T>,
}

impl<T: Copy + Eq> HistoryDebouncer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: CommandHistory::new(capacity),
        }
    }

    pub fn history(&self) -> &CommandHistory<T> {
        &self.history
    }

    /// Records `command` and reports `Stable` when the full window holds one
    /// value that differs from `last_actuated`.
    ///
    /// `last_actuated` must come from the driver's confirmed output, so a
    /// command whose write failed is reported again on the next poll.
    pub fn observe(&mut self, command: T, last_actuated: Option<T>) -> Debounce<T> {
        self.history.push(command);
        match self.history.uniform() {
            Some(stable) if Some(stable) != last_actuated => Debounce::Stable(stable),
            _ => Debounce::NoChange,
        }
    }
}
