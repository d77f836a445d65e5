//! Shared sample storage and strided matrix views.
//!
//! A [`SharedBuffer`] is a reference-counted block of samples. A [`Matrix`]
//! is a rectangular view into one: cloning a matrix or taking a
//! [`Matrix::window`] aliases the same storage, while
//! [`Matrix::duplicate`] makes an independent deep copy. Storage is freed
//! when the last view referencing it is dropped.
//!
//! Access goes through [`Matrix::read`] and [`Matrix::write`] guards. Any
//! number of read guards (also from different threads) may coexist; a write
//! guard is exclusive across every view of the buffer, so do not hold a read
//! guard of one view while writing through an alias of it on the same thread.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Reference-counted sample storage shared by any number of [`Matrix`] views.
pub struct SharedBuffer<T> {
    data: Arc<RwLock<Vec<T>>>,
}

impl<T: Copy + Default> SharedBuffer<T> {
    /// Allocate `len` zero (default) samples.
    #[must_use]
    pub fn allocate(len: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(vec![T::default(); len])),
        }
    }
}

impl<T> SharedBuffer<T> {
    /// Number of samples in the allocation.
    pub fn len(&self) -> usize {
        self.lock_read().len()
    }

    /// True when the allocation holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live handles to this storage.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// True if both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    // A panic while a guard was held leaves plain samples behind, never a
    // broken structure, so poisoning is ignored.
    fn lock_read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("refs", &self.ref_count())
            .finish_non_exhaustive()
    }
}

/// A strided rectangular view over a [`SharedBuffer`].
///
/// `Clone` is shallow: both matrices see the same samples.
#[derive(Debug, Clone)]
pub struct Matrix<T> {
    buffer: SharedBuffer<T>,
    offset: usize,
    width: usize,
    height: usize,
    stride: usize,
}

impl<T: Copy + Default> Matrix<T> {
    /// Allocate a zero-filled `width × height` matrix with its own storage.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: SharedBuffer::allocate(width * height),
            offset: 0,
            width,
            height,
            stride: width,
        }
    }

    /// A matrix with no samples.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Deep copy into fresh, tightly packed storage.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = Self::new(self.width, self.height);
        let src = self.read();
        let mut dst = copy.write();
        if self.stride == self.width {
            let len = self.width * self.height;
            dst.guard[..len].copy_from_slice(&src.guard[self.offset..self.offset + len]);
        } else {
            for y in 0..self.height {
                dst.row_mut(y).copy_from_slice(src.row(y));
            }
        }
        drop(dst);
        copy
    }

    /// Zero-fill the rectangle covered by this view.
    pub fn clean(&mut self) {
        self.write().fill(T::default());
    }
}

impl<T> Matrix<T> {
    /// Alias the `width × height` rectangle at (`x`, `y`) of this matrix.
    ///
    /// # Panics
    ///
    /// Panics if the rectangle does not lie inside this matrix.
    #[must_use]
    pub fn window(&self, x: usize, y: usize, width: usize, height: usize) -> Self {
        let fits_x = x.checked_add(width).is_some_and(|r| r <= self.width);
        let fits_y = y.checked_add(height).is_some_and(|b| b <= self.height);
        assert!(
            fits_x && fits_y,
            "window {}x{} at ({}, {}) exceeds {}x{} parent",
            width,
            height,
            x,
            y,
            self.width,
            self.height
        );
        Self {
            buffer: self.buffer.clone(),
            offset: self.offset + y * self.stride + x,
            width,
            height,
            stride: self.stride,
        }
    }

    /// Width in samples.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Distance between the starts of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// True when the view covers no samples.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if both views alias the same storage.
    pub fn shares_buffer_with(&self, other: &Self) -> bool {
        self.buffer.ptr_eq(&other.buffer)
    }

    /// True if both describe exactly the same rectangle of the same storage.
    pub fn same_view(&self, other: &Self) -> bool {
        self.shares_buffer_with(other)
            && (self.offset, self.width, self.height, self.stride)
                == (other.offset, other.width, other.height, other.stride)
    }

    /// Number of live views (and buffer handles) on the storage.
    pub fn ref_count(&self) -> usize {
        self.buffer.ref_count()
    }

    /// Lock the storage for reading.
    pub fn read(&self) -> MatrixRef<'_, T> {
        MatrixRef {
            guard: self.buffer.lock_read(),
            offset: self.offset,
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }

    /// Lock the storage for writing.
    pub fn write(&mut self) -> MatrixMut<'_, T> {
        MatrixMut {
            guard: self.buffer.lock_write(),
            offset: self.offset,
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }
}

impl<T: Copy> Matrix<T> {
    /// Read one sample.
    pub fn get(&self, x: usize, y: usize) -> T {
        self.read().get(x, y)
    }

    /// Write one sample.
    pub fn put(&mut self, x: usize, y: usize, value: T) {
        self.write().set(x, y, value);
    }

    /// Copy the view into a tightly packed row-major vector.
    pub fn to_vec(&self) -> Vec<T> {
        let view = self.read();
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            out.extend_from_slice(view.row(y));
        }
        out
    }
}

/// Read access to a [`Matrix`], held for the lifetime of the guard.
///
/// The guard is `Sync`, so one guard can be shared by several workers.
pub struct MatrixRef<'a, T> {
    guard: RwLockReadGuard<'a, Vec<T>>,
    offset: usize,
    width: usize,
    height: usize,
    stride: usize,
}

impl<T> MatrixRef<'_, T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Samples of row `y`.
    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {} of {}", y, self.height);
        let start = self.offset + y * self.stride;
        &self.guard[start..start + self.width]
    }
}

impl<T: Copy> MatrixRef<'_, T> {
    pub fn get(&self, x: usize, y: usize) -> T {
        self.row(y)[x]
    }
}

/// Exclusive write access to a [`Matrix`].
pub struct MatrixMut<'a, T> {
    guard: RwLockWriteGuard<'a, Vec<T>>,
    offset: usize,
    width: usize,
    height: usize,
    stride: usize,
}

impl<T> MatrixMut<'_, T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn row(&self, y: usize) -> &[T] {
        assert!(y < self.height, "row {} of {}", y, self.height);
        let start = self.offset + y * self.stride;
        &self.guard[start..start + self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        assert!(y < self.height, "row {} of {}", y, self.height);
        let start = self.offset + y * self.stride;
        &mut self.guard[start..start + self.width]
    }
}

impl<T: Copy> MatrixMut<'_, T> {
    pub fn get(&self, x: usize, y: usize) -> T {
        self.row(y)[x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        self.row_mut(y)[x] = value;
    }

    /// Set every sample of the view.
    pub fn fill(&mut self, value: T) {
        for y in 0..self.height {
            self.row_mut(y).fill(value);
        }
    }

    /// Apply `f` to every sample of the view.
    pub fn map_in_place(&mut self, mut f: impl FnMut(T) -> T) {
        for y in 0..self.height {
            for v in self.row_mut(y) {
                *v = f(*v);
            }
        }
    }
}
