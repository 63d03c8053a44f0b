//! Contiguous ring buffer.
//!
//! A fixed-capacity single-producer/single-consumer ring whose readable
//! region is always exposed as one contiguous slice, no matter where the
//! wrap point falls. The backing memory is mapped twice back to back
//! (see [`map`]), so the DSP consumers never deal with split reads.
//!
//! **Operations**:
//! - `write` / `read` - copying producer/consumer paths
//! - `peek` / `poke` - zero-copy views of the readable/free span
//! - `purge` / `flush` - drop consumed or all items
//!
//! **Modes**:
//! - non-overwrite: writes beyond the free space are truncated
//! - overwrite: writes always succeed, the oldest items are dropped
//!
//! One mutex serializes all state changes. The `peek`/`poke` views hold
//! that mutex, so a view must be dropped before calling any other
//! operation on the same ring or the call will deadlock.

mod map;

use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr;
use std::slice;
use std::sync::{Mutex, MutexGuard};

use snafu::{ensure, ResultExt, Snafu};

use map::DoubleMap;

#[derive(Debug, Snafu)]
pub enum BufferError {
    #[snafu(display("ring capacity is 0"))]
    ZeroCapacity,

    #[snafu(display("ring item size is 0"))]
    ZeroItemSize,

    #[snafu(display("ring mapping failed: {source}"))]
    Map { source: std::io::Error },
}

#[derive(Debug)]
struct RingState {
    /// Items ever written / read. Offsets are byte positions into one
    /// copy of the mapping.
    written: u64,
    read: u64,
    w_off: usize,
    r_off: usize,
}

/// Ring buffer over `Copy` items with a contiguous readable span.
pub struct ContiguousRing<T> {
    map: DoubleMap,
    capacity: usize,
    overwrite: bool,
    state: Mutex<RingState>,
    _items: PhantomData<T>,
}

impl<T: Copy> ContiguousRing<T> {
    /// Allocate a ring holding `capacity` items.
    ///
    /// The underlying mapping is padded up to page granularity, but the
    /// logical capacity is exactly `capacity`: occupancy never exceeds
    /// it and `space_available` counts against it.
    pub fn new(capacity: usize, overwrite: bool) -> Result<Self, BufferError> {
        let item_size = mem::size_of::<T>();
        ensure!(capacity > 0, ZeroCapacitySnafu);
        ensure!(item_size > 0, ZeroItemSizeSnafu);

        // pad to a common multiple of the page and item size so byte
        // offsets stay item-aligned when they wrap
        let page = map::page_size();
        let stride = lcm(page, item_size);
        let bytes = item_size * capacity;
        let mapped = bytes.div_ceil(stride) * stride;

        let map = DoubleMap::new(mapped).context(MapSnafu)?;
        Ok(Self {
            map,
            capacity,
            overwrite,
            state: Mutex::new(RingState {
                written: 0,
                read: 0,
                w_off: 0,
                r_off: 0,
            }),
            _items: PhantomData,
        })
    }

    /// Logical capacity in items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items waiting to be read.
    pub fn data_available(&self) -> usize {
        let state = self.state.lock().unwrap();
        (state.written - state.read) as usize
    }

    /// Free space in items.
    pub fn space_available(&self) -> usize {
        let state = self.state.lock().unwrap();
        self.capacity - (state.written - state.read) as usize
    }

    /// Append items; returns how many were accepted.
    ///
    /// In overwrite mode a write larger than the capacity keeps only the
    /// trailing `capacity` items, and old data is dropped as needed so
    /// occupancy never exceeds the capacity.
    pub fn write(&self, src: &[T]) -> usize {
        let item_size = mem::size_of::<T>();
        let mut state = self.state.lock().unwrap();

        let occupancy = (state.written - state.read) as usize;
        let (skip, len) = if self.overwrite {
            if src.len() > self.capacity {
                (src.len() - self.capacity, self.capacity)
            } else {
                (0, src.len())
            }
        } else {
            (0, src.len().min(self.capacity - occupancy))
        };

        unsafe {
            // the second copy of the mapping absorbs any overhang
            let dst = self.map.data().add(state.w_off) as *mut T;
            ptr::copy_nonoverlapping(src.as_ptr().add(skip), dst, len);
        }
        state.written += len as u64;
        state.w_off = (state.w_off + len * item_size) % self.map.len();

        if state.written > state.read + self.capacity as u64 {
            state.read = state.written - self.capacity as u64;
            let cap_bytes = self.capacity * item_size;
            state.r_off = (state.w_off + self.map.len() - cap_bytes) % self.map.len();
        }

        len
    }

    /// Copy out up to `dst.len()` items; returns how many were read.
    pub fn read(&self, dst: &mut [T]) -> usize {
        let item_size = mem::size_of::<T>();
        let mut state = self.state.lock().unwrap();

        let len = dst.len().min((state.written - state.read) as usize);
        unsafe {
            let src = self.map.data().add(state.r_off) as *const T;
            ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), len);
        }
        state.read += len as u64;
        self.advance_read(&mut state, len * item_size);

        len
    }

    /// Drop up to `count` unread items; returns how many were dropped.
    pub fn purge(&self, count: usize) -> usize {
        let item_size = mem::size_of::<T>();
        let mut state = self.state.lock().unwrap();

        let len = count.min((state.written - state.read) as usize);
        state.read += len as u64;
        self.advance_read(&mut state, len * item_size);

        len
    }

    /// View of the entire readable region as one contiguous slice.
    ///
    /// The view holds the ring lock; drop it before any other call on
    /// this ring.
    pub fn peek(&self) -> ReadView<'_, T> {
        let state = self.state.lock().unwrap();
        let len = (state.written - state.read) as usize;
        let ptr = unsafe { self.map.data().add(state.r_off) } as *const T;
        ReadView {
            _guard: state,
            ptr,
            len,
        }
    }

    /// View of the free span for in-place production. Call
    /// [`WriteView::commit`] with the number of items actually written.
    ///
    /// The view holds the ring lock; drop it before any other call on
    /// this ring.
    pub fn poke(&self) -> WriteView<'_, T> {
        let state = self.state.lock().unwrap();
        let free = self.capacity - (state.written - state.read) as usize;
        let ptr = unsafe { self.map.data().add(state.w_off) } as *mut T;
        WriteView {
            guard: state,
            ptr,
            len: free,
            mapped: self.map.len(),
        }
    }

    /// Reset to empty.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.read = 0;
        state.written = 0;
        state.r_off = 0;
        state.w_off = 0;
    }

    fn advance_read(&self, state: &mut RingState, bytes: usize) {
        if state.read == state.written {
            // drained; rewinding keeps later spans away from the wrap
            state.read = 0;
            state.written = 0;
            state.r_off = 0;
            state.w_off = 0;
        } else {
            state.r_off = (state.r_off + bytes) % self.map.len();
        }
    }
}

/// Locked view of a ring's readable span.
pub struct ReadView<'a, T> {
    _guard: MutexGuard<'a, RingState>,
    ptr: *const T,
    len: usize,
}

impl<T> Deref for ReadView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // the double mapping makes [ptr, ptr + len) contiguous even when
        // it crosses the physical end of the buffer
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

/// Locked view of a ring's free span.
pub struct WriteView<'a, T> {
    guard: MutexGuard<'a, RingState>,
    ptr: *mut T,
    len: usize,
    mapped: usize,
}

impl<T> Deref for WriteView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl<T> DerefMut for WriteView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // the backing pages are zero-filled by the kernel, so the free
        // span holds valid values for the plain Copy item types used here
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl<T> WriteView<'_, T> {
    /// Mark `count` items (clamped to the view length) as written.
    pub fn commit(mut self, count: usize) {
        let count = count.min(self.len);
        self.guard.written += count as u64;
        self.guard.w_off = (self.guard.w_off + count * mem::size_of::<T>()) % self.mapped;
    }
}

fn lcm(a: usize, b: usize) -> usize {
    fn gcd(mut a: usize, mut b: usize) -> usize {
        while b != 0 {
            let t = a % b;
            a = b;
            b = t;
        }
        a
    }
    a / gcd(a, b) * b
}
