// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::vec;

/// Reusable staging area for raw pages read in one drain step.
///
/// The backing buffer is allocated on first use and kept until the scratch is
/// dropped or [`ParsingScratch::release`] is called.
#[derive(Debug)]
pub struct ParsingScratch {
    buffer: vec::Vec<u8>,
    page_size: usize,
    capacity_pages: usize,
}

impl ParsingScratch {
    /// Default number of pages the scratch can stage at once.
    pub const DEFAULT_CAPACITY_PAGES: usize = 32;

    /// Creates an unallocated scratch for [`Self::DEFAULT_CAPACITY_PAGES`]
    /// pages of `page_size` bytes.
    pub fn new(page_size: usize) -> Self {
        return Self::with_capacity(page_size, Self::DEFAULT_CAPACITY_PAGES);
    }

    /// Creates an unallocated scratch for `capacity_pages` pages of
    /// `page_size` bytes. Both are clamped to at least 1.
    pub fn with_capacity(page_size: usize, capacity_pages: usize) -> Self {
        return Self {
            buffer: vec::Vec::new(),
            page_size: page_size.max(1),
            capacity_pages: capacity_pages.max(1),
        };
    }

    /// Allocates the backing buffer if it has not been allocated yet.
    pub fn allocate_if_needed(&mut self) {
        if self.buffer.is_empty() {
            self.buffer = vec![0u8; self.page_size * self.capacity_pages];
        }
    }

    /// Frees the backing buffer. The next use allocates it again.
    pub fn release(&mut self) {
        self.buffer = vec::Vec::new();
    }

    /// Returns true if the backing buffer is allocated.
    pub fn is_allocated(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Size of one page slot in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Changes the size of a page slot. An allocated buffer is reallocated at
    /// the new size; its contents are not kept.
    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return;
        }

        let was_allocated = self.is_allocated();
        self.page_size = page_size;
        self.release();
        if was_allocated {
            self.allocate_if_needed();
        }
    }

    /// Number of page slots.
    pub fn capacity_pages(&self) -> usize {
        self.capacity_pages
    }

    /// Returns page slot `index` for writing, allocating the buffer if needed.
    ///
    /// Panics if `index >= capacity_pages()`.
    pub fn page_mut(&mut self, index: usize) -> &mut [u8] {
        assert!(index < self.capacity_pages, "scratch page index out of range");
        self.allocate_if_needed();
        let start = index * self.page_size;
        return &mut self.buffer[start..start + self.page_size];
    }

    /// Returns page slot `index`. An unallocated scratch has no pages.
    pub fn page(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.page_size)?;
        return self.buffer.get(start..start + self.page_size);
    }
}
