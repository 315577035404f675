//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! A growable byte buffer with a hard upper bound on its size.
//!
//! Used by the frame codec to accumulate cleartext before wrapping and
//! ciphertext before unwrapping. The buffer starts small and doubles its
//! allocation as data arrives, so short messages never cause a large
//! allocation, but it never grows beyond its limit. Clearing the buffer keeps
//! the allocation for reuse by the next frame.

/// The initial allocation made once data is first appended.
pub const INITIAL_CAPACITY: usize = 512;

#[derive(Debug, Clone)]
pub struct CappedBuffer {
    data: Vec<u8>,
    limit: usize,
}

impl CappedBuffer {
    /// Create a new, empty buffer which will hold at most `limit` bytes.
    ///
    /// Nothing is allocated until data is appended.
    pub fn new(limit: usize) -> Self {
        CappedBuffer {
            data: Vec::new(),
            limit,
        }
    }

    /// Returns the number of bytes currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the maximum number of bytes this buffer will hold.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns how many more bytes can be appended before the buffer is full.
    pub fn remaining(&self) -> usize {
        self.limit - self.data.len()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.limit
    }

    /// Returns the current allocation size.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Append as much of `src` as fits, returning the number of bytes taken.
    pub fn append(&mut self, src: &[u8]) -> usize {
        let count = self.remaining().min(src.len());
        if 0 == count {
            return 0;
        }

        self.grow_for(self.data.len() + count);
        self.data.extend_from_slice(&src[..count]);
        count
    }

    /// Discard the content, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Discard the content and change the limit.
    ///
    /// If the current allocation is larger than the new limit, it is reduced
    /// so that a buffer with a small limit never pins a large allocation.
    pub fn reset(&mut self, limit: usize) {
        self.data.clear();
        self.limit = limit;
        if self.data.capacity() > limit.max(INITIAL_CAPACITY) {
            self.data.shrink_to_fit();
        }
    }

    fn grow_for(&mut self, needed: usize) {
        let mut target = self.data.capacity().max(INITIAL_CAPACITY);
        while target < needed {
            target = target.saturating_mul(2);
        }

        let target = target.min(self.limit);
        if target > self.data.capacity() {
            self.data.reserve_exact(target - self.data.len());
        }
    }
}
