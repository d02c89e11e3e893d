//! Paged iteration over the whole transition log.

use std::collections::VecDeque;

use netwatch_core::{Timestamp, Transition};

use super::{StoreError, TransitionStore};

/// Records fetched per read transaction.
pub const HISTORY_PAGE_SIZE: usize = 256;

/// Lazy, finite iterator over every record in key order.
///
/// Each page is read in its own short transaction, so a long export
/// never pins a snapshot. Records appended behind the cursor during
/// iteration are picked up by later pages. A read error is yielded once
/// and ends the iteration.
pub struct History<'a, S> {
    store: &'a S,
    cursor: Option<Timestamp>,
    buffer: VecDeque<Transition>,
    page_size: usize,
    exhausted: bool,
}

impl<'a, S: TransitionStore> History<'a, S> {
    /// Starts an iteration from the first key.
    pub fn new(store: &'a S) -> Self {
        Self::with_page_size(store, HISTORY_PAGE_SIZE)
    }

    /// Starts an iteration with a custom page size (minimum 1).
    pub fn with_page_size(store: &'a S, page_size: usize) -> Self {
        Self {
            store,
            cursor: None,
            buffer: VecDeque::new(),
            page_size: page_size.max(1),
            exhausted: false,
        }
    }

    /// Rewinds to the first key.
    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) -> Result<(), StoreError> {
        let page = self.store.page_after(self.cursor, self.page_size)?;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(last.at);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<S: TransitionStore> Iterator for History<'_, S> {
    type Item = Result<Transition, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(transition) = self.buffer.pop_front() {
            return Some(Ok(transition));
        }
        if self.exhausted {
            return None;
        }

        if let Err(e) = self.fill() {
            self.exhausted = true;
            return Some(Err(e));
        }
        self.buffer.pop_front().map(Ok)
    }
}
