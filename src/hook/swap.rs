//! # Vtable Pointer Swap
//!
//! This hook copies an object's method table and points the object at the copy. Entries in the
//! copy can then be replaced without touching the original table, so only the one object is
//! affected. Dropping the guard points the object back at its original table.
//!
//! The copy also carries the word right before the table, which compilers use for type
//! information (RTTI), so type queries on the hooked object keep working.
//!
//! ## Layout of the copy
//!
//! ```text
//! [ len | original table | metadata | entry 0 | entry 1 | ... | entry len - 1 ]
//!                                     ^ the object's table pointer
//! ```
//!
//! The first two words are an installation header, used by [`Originals::from_receiver`] to
//! find the original table from inside a replacement function.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::ptr::{self, NonNull};
use std::slice;

use thiserror::Error;

use crate::func::{Function, Method};
use crate::{probe, raw};

use super::HookGuard;

/// Offset of the table length in the copy
const HEADER_LEN: usize = 0;
/// Offset of the original table pointer in the copy
const HEADER_TABLE: usize = 1;
/// Offset of the preserved metadata word in the copy
const METADATA: usize = 2;
/// Offset of the first table entry in the copy
const FIRST_ENTRY: usize = 3;

/// Errors from [`VfptrSwap::try_new`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwapError {
    /// Object pointer was null
    #[error("object pointer is null")]
    NullObject,
    /// Object's table pointer was null
    #[error("object has a null table pointer")]
    NullTable,
    /// Table has no entries, either given or probed
    #[error("table has no entries")]
    EmptyTable,
}

/// Guard for a swapped vtable pointer
///
/// Entries are written through indexing (`swap[i] = addr`) or [`VfptrSwap::hook`]. Writing an
/// address whose signature doesn't match the original makes the next virtual call through that
/// slot undefined behavior; the caller takes on that contract when constructing the guard.
pub struct VfptrSwap<'a, T> {
    /// Object whose table pointer we replaced
    object: NonNull<T>,
    /// Table pointer the object had before we replaced it
    original: *const usize,
    /// Start of our copy, header included
    block: NonNull<usize>,
    /// Number of table entries, metadata excluded
    len: usize,
    /// The object must outlive the guard
    _object: PhantomData<&'a mut T>,
}

impl<'a, T> VfptrSwap<'a, T> {
    /// Swaps the table pointer of `object`, probing the table for its length
    ///
    /// The probe is a best-effort guess (see [`probe`]). Prefer [`VfptrSwap::with_len`] when the
    /// table length is known.
    ///
    /// # Safety
    ///
    /// - the first word of `object` must be a pointer to a method table
    /// - the word before the table must be readable
    /// - the table must be followed by something that doesn't look like code
    pub unsafe fn new(object: &'a mut T) -> Self {
        Self::from_raw(NonNull::from(object), None)
    }

    /// Swaps the table pointer of `object`, copying `len` entries
    ///
    /// # Safety
    ///
    /// - the first word of `object` must be a pointer to a method table
    /// - the table must have at least `len` entries and the word before it must be readable
    ///
    /// Too small of a `len` isn't detected; virtual calls past it will read past the copy.
    pub unsafe fn with_len(object: &'a mut T, len: usize) -> Self {
        Self::from_raw(NonNull::from(object), Some(len))
    }

    /// Checked version of [`VfptrSwap::from_raw`]
    ///
    /// Rejects null objects, null table pointers and tables without entries.
    ///
    /// # Safety
    ///
    /// Same as [`VfptrSwap::from_raw`], apart from the checked cases
    pub unsafe fn try_new(object: *mut T, len: Option<usize>) -> Result<Self, SwapError> {
        let object = NonNull::new(object).ok_or(SwapError::NullObject)?;
        let table = raw::read_table_ptr(object.as_ptr());
        if table.is_null() {
            return Err(SwapError::NullTable);
        }

        let len = match len {
            Some(len) => len,
            None => probe::table_len(table),
        };
        if len == 0 {
            return Err(SwapError::EmptyTable);
        }

        Ok(Self::from_raw(object, Some(len)))
    }

    /// Swaps the table pointer of the object at `object`
    ///
    /// `len` is the number of table entries, or `None` to probe for it.
    ///
    /// # Safety
    ///
    /// - `object` must stay valid and in place for `'a`, and nothing else may swap its table
    ///   pointer while the guard is alive
    /// - the first word of `object` must be a pointer to a method table whose preceding word
    ///   is readable
    /// - the table must have at least `len` entries, or be followed by non-code data if `len`
    ///   is `None`
    pub unsafe fn from_raw(object: NonNull<T>, len: Option<usize>) -> Self {
        let original = raw::read_table_ptr(object.as_ptr());
        let len = match len {
            Some(len) => len,
            None => probe::table_len(original),
        };

        let mut block = vec![0usize; len + FIRST_ENTRY].into_boxed_slice();
        block[HEADER_LEN] = len;
        block[HEADER_TABLE] = original as usize;
        // copy the metadata word along with the table
        raw::copy_words(original.sub(1), block[METADATA..].as_mut_ptr(), len + 1);

        // Safety: `Box::into_raw` never returns null
        let block = NonNull::new_unchecked(Box::into_raw(block) as *mut usize);

        raw::write_table_ptr(object.as_ptr(), block.as_ptr().add(FIRST_ENTRY));

        log::debug!(
            "swapped table of {:p}: {:p} -> {:p} ({len} entries)",
            object,
            original,
            block.as_ptr().add(FIRST_ENTRY)
        );

        Self {
            object,
            original,
            block,
            len,
            _object: PhantomData,
        }
    }

    /// Number of table entries, not counting the metadata word
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the copied table, which is what the object now points to
    pub fn table(&self) -> *const usize {
        // Safety: the block always has `FIRST_ENTRY` header words
        unsafe { self.block.as_ptr().add(FIRST_ENTRY) }
    }

    /// Pointer to the original table
    pub fn original_table(&self) -> *const usize {
        self.original
    }

    /// Address of the preserved metadata word (the word right before the copied table)
    pub fn metadata(&self) -> *const usize {
        // Safety: the block always has `FIRST_ENTRY` header words
        unsafe { self.block.as_ptr().add(METADATA) }
    }

    /// Current entries of the copied table
    pub fn as_slice(&self) -> &[usize] {
        // Safety: the block has `len` entries after the header
        unsafe { slice::from_raw_parts(self.table(), self.len) }
    }

    /// Pointer to entry `index` of the copied table, without bounds checking
    ///
    /// # Safety
    ///
    /// `index` must be less than [`VfptrSwap::len`]
    pub unsafe fn entry_unchecked(&self, index: usize) -> *mut usize {
        self.block.as_ptr().add(FIRST_ENTRY + index)
    }

    /// Address of the original function at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn original_addr(&self, index: usize) -> usize {
        self.originals().addr(index)
    }

    /// Original function at `index`, as the function pointer type `F`
    ///
    /// # Safety
    ///
    /// `F` must match the signature and calling convention of the original function
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub unsafe fn original<F: Function>(&self, index: usize) -> F {
        self.originals().get(index)
    }

    /// Lookup for the original functions of this installation
    ///
    /// The lookup can be moved into replacement functions that need to call the originals.
    pub fn originals(&self) -> Originals {
        Originals {
            table: self.original,
            len: self.len,
        }
    }

    /// Replaces entry `index` with `f`, returning the address previously there
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn hook<F: Function>(&mut self, index: usize, f: F) -> usize {
        let previous = std::mem::replace(&mut self[index], f.to_addr());
        log::trace!("hooked entry {index}: {previous:#x} -> {:#x}", self[index]);
        previous
    }

    /// Replaces entry `index` with the method `f`, returning the address previously there
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn hook_method<F: Method<T>>(&mut self, index: usize, f: F) -> usize {
        debug_assert!(
            F::RECEIVER.is_host(),
            "{:?} receivers can't be called by virtual calls on this host",
            F::RECEIVER
        );
        self.hook(index, f)
    }

    /// Returns `true` if entry `index` no longer holds the original function
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn is_hooked(&self, index: usize) -> bool {
        self[index] != self.original_addr(index)
    }

    /// Puts the original function back into entry `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn restore(&mut self, index: usize) {
        let original = self.original_addr(index);
        self[index] = original;
    }

    /// Puts every original function back into the copied table
    pub fn restore_all(&mut self) {
        // Safety: both tables are valid for `len` entries and the copy is ours
        unsafe { raw::copy_words(self.original, self.entry_unchecked(0), self.len) };
    }

    /// Pointer to the hooked object
    pub fn as_ptr(&self) -> NonNull<T> {
        self.object
    }

    /// The hooked object. Virtual calls made on it go through the copied table.
    pub fn object(&self) -> &T {
        // Safety: the object outlives `'a`, which outlives the guard
        unsafe { self.object.as_ref() }
    }

    /// The hooked object. Virtual calls made on it go through the copied table.
    pub fn object_mut(&mut self) -> &mut T {
        // Safety: the guard holds the only borrow of the object
        unsafe { self.object.as_mut() }
    }
}

impl<T> Index<usize> for VfptrSwap<'_, T> {
    type Output = usize;

    fn index(&self, index: usize) -> &usize {
        assert!(index < self.len, "entry {index} out of bounds ({} entries)", self.len);
        // Safety: bounds checked above
        unsafe { &*self.entry_unchecked(index) }
    }
}

impl<T> IndexMut<usize> for VfptrSwap<'_, T> {
    fn index_mut(&mut self, index: usize) -> &mut usize {
        assert!(index < self.len, "entry {index} out of bounds ({} entries)", self.len);
        // Safety: bounds checked above
        unsafe { &mut *self.entry_unchecked(index) }
    }
}

unsafe impl<T> HookGuard for VfptrSwap<'_, T> {}

impl<T> Drop for VfptrSwap<'_, T> {
    fn drop(&mut self) {
        // Safety: creator guarantees the object is still alive and that its first word is ours
        unsafe {
            raw::write_table_ptr(self.object.as_ptr(), self.original);
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.block.as_ptr(),
                self.len + FIRST_ENTRY,
            )));
        }

        log::debug!("restored table of {:p} to {:p}", self.object, self.original);
    }
}

/// Lookup for the original functions of one installation
///
/// Obtained from [`VfptrSwap::originals`], or from inside a replacement function with
/// [`Originals::from_receiver`]. Only valid while the [`VfptrSwap`] it came from is alive.
#[derive(Debug, Clone, Copy)]
pub struct Originals {
    /// Original table
    table: *const usize,
    /// Number of entries in the table
    len: usize,
}

impl Originals {
    /// Recovers the lookup from an object hooked by a [`VfptrSwap`]
    ///
    /// Replacement functions receive the object as their receiver, so this lets them call the
    /// original function without any global state.
    ///
    /// # Safety
    ///
    /// `receiver` must point to an object whose table pointer is currently swapped by a
    /// [`VfptrSwap`]
    pub unsafe fn from_receiver<T>(receiver: *const T) -> Self {
        let table = raw::read_table_ptr(receiver);
        Self {
            table: raw::read_word(table, HEADER_TABLE as isize - FIRST_ENTRY as isize)
                as *const usize,
            len: raw::read_word(table, HEADER_LEN as isize - FIRST_ENTRY as isize),
        }
    }

    /// Number of table entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the original table
    pub fn table(&self) -> *const usize {
        self.table
    }

    /// Address of the original function at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn addr(&self, index: usize) -> usize {
        assert!(index < self.len, "entry {index} out of bounds ({} entries)", self.len);
        // Safety: the table had `len` entries when the guard was created
        unsafe { raw::read_word(self.table, index as isize) }
    }

    /// Original function at `index`, as the function pointer type `F`
    ///
    /// # Safety
    ///
    /// `F` must match the signature and calling convention of the original function
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub unsafe fn get<F: Function>(&self, index: usize) -> F {
        F::from_addr(self.addr(index))
    }
}
