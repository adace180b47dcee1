//! # Raw
//!
//! The only place where we do address arithmetic on memory we don't own.
//!
//! Everything in here assumes the usual object layout: the first word of a polymorphic
//! object is a pointer to its method table, and the table is a contiguous array of words.

use std::mem;
use std::ptr;

/// Size of a single table entry
pub const WORD: usize = mem::size_of::<usize>();

/// Reads the table pointer stored in the first word of `object`
///
/// # Safety
///
/// `object` must be valid for reads of one `usize` and must start with a table pointer
pub unsafe fn read_table_ptr<T>(object: *const T) -> *const usize {
    // objects are not required to be word-aligned from rust's point of view
    ptr::read_unaligned(object as *const *const usize)
}

/// Overwrites the table pointer stored in the first word of `object`
///
/// # Safety
///
/// `object` must be valid for writes of one `usize`, and `table` must point to a table that
/// every virtual call made through `object` can dispatch through
pub unsafe fn write_table_ptr<T>(object: *mut T, table: *const usize) {
    ptr::write_unaligned(object as *mut *const usize, table);
}

/// Reads the word at `index` relative to `base`. Negative indices read before `base`.
///
/// # Safety
///
/// `base.offset(index)` must be valid for reads
pub unsafe fn read_word(base: *const usize, index: isize) -> usize {
    ptr::read(base.offset(index))
}

/// Copies `count` words from `src` into `dst`
///
/// # Safety
///
/// - `src` must be valid for reads of `count` words
/// - `dst` must be valid for writes of `count` words
/// - the two ranges must not overlap
pub unsafe fn copy_words(src: *const usize, dst: *mut usize, count: usize) {
    ptr::copy_nonoverlapping(src, dst, count);
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::{copy_words, read_table_ptr, read_word, write_table_ptr};

    #[repr(C)]
    /// Minimal object with a table pointer as its first field
    struct Object {
        /// Table pointer
        table: *const usize,
        /// Data after the table pointer
        data: u32,
    }

    #[test]
    /// Reading and writing the table pointer only touches the first word
    fn test_table_ptr() {
        let first = [1usize, 2, 3];
        let second = [4usize, 5, 6];
        let mut object = Object {
            table: first.as_ptr(),
            data: 0x1337,
        };

        assert_eq!(unsafe { read_table_ptr(&object as *const Object) }, first.as_ptr());

        unsafe { write_table_ptr(&mut object as *mut Object, second.as_ptr()) };

        assert_eq!(object.table, second.as_ptr());
        assert_eq!(object.data, 0x1337);
    }

    #[test]
    /// Words before the base pointer are reachable with a negative index
    fn test_read_word() {
        let table = [10usize, 20, 30];
        let base = unsafe { table.as_ptr().add(1) };

        assert_eq!(unsafe { read_word(base, -1) }, 10);
        assert_eq!(unsafe { read_word(base, 0) }, 20);
        assert_eq!(unsafe { read_word(base, 1) }, 30);
    }

    #[test]
    /// Copies exactly `count` words
    fn test_copy_words() {
        let src = [1usize, 2, 3, 4];
        let mut dst = [0usize; 4];

        unsafe { copy_words(src.as_ptr(), dst.as_mut_ptr(), 3) };

        assert_eq!(dst, [1, 2, 3, 0]);
        // sanity check that nothing moved in the source
        assert_eq!(unsafe { ptr::read(src.as_ptr().add(3)) }, 4);
    }
}
