//! # Probe
//!
//! Guesses how many entries a method table has by walking it until an entry stops looking
//! like a code address.
//!
//! The guess can overcount, which is harmless since copying a few unused words doesn't affect
//! dispatch. It should never undercount on tables that are followed by non-code data, which
//! is how compilers lay them out in practice. If the length of a table is known, pass it
//! explicitly instead of probing.

pub mod deref;
pub mod query;

pub use self::deref::DerefOracle;
pub use self::query::RegionOracle;

/// Decides whether a single table entry is plausibly the address of a function
///
/// # Safety
///
/// Implementors must not fault for any entry value that appears in a readable table.
/// Approximate answers are fine; the result is only used to decide how much to copy.
pub unsafe trait ValidityOracle {
    /// Returns `true` if `entry` looks like the address of executable code
    ///
    /// # Safety
    ///
    /// Some oracles dereference `entry`, so it must come from a real method table
    unsafe fn is_valid(entry: usize) -> bool;
}

/// Oracle used by [`table_len`] on this host
#[cfg(all(
    not(feature = "deref-probe"),
    any(
        windows,
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
    )
))]
pub type HostOracle = RegionOracle;

/// Oracle used by [`table_len`] on this host
#[cfg(not(all(
    not(feature = "deref-probe"),
    any(
        windows,
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
    )
)))]
pub type HostOracle = DerefOracle;

/// Counts the entries of the table at `table` using the host's best oracle
///
/// # Safety
///
/// See [`table_len_with`]
pub unsafe fn table_len(table: *const usize) -> usize {
    table_len_with::<HostOracle>(table)
}

/// Counts consecutive entries starting at `table` that `O` considers valid
///
/// # Safety
///
/// - `table` must point to a method table
/// - every entry up to and including the first invalid one must be readable
pub unsafe fn table_len_with<O: ValidityOracle>(table: *const usize) -> usize {
    let mut len = 0;

    while O::is_valid(crate::raw::read_word(table, len as isize)) {
        len += 1;
    }

    log::trace!("probed table at {table:p}: {len} entries");

    len
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{table_len, table_len_with, DerefOracle, RegionOracle};

    /// Filler function for test tables
    #[inline(never)]
    pub(crate) extern "C" fn first(x: u32) -> u32 {
        x.wrapping_mul(3).wrapping_add(1)
    }

    /// Filler function for test tables
    #[inline(never)]
    pub(crate) extern "C" fn second(x: u32) -> u32 {
        x.rotate_left(7) ^ 0x5a5a
    }

    /// Filler function for test tables
    #[inline(never)]
    pub(crate) extern "C" fn third(x: u32) -> u32 {
        x.saturating_sub(17).wrapping_mul(x)
    }

    #[test]
    /// A table of functions terminated by zero is counted exactly
    fn test_terminated_table() {
        let table = [first as usize, second as usize, third as usize, 0];

        assert_eq!(unsafe { table_len_with::<RegionOracle>(table.as_ptr()) }, 3);
        assert_eq!(unsafe { table_len_with::<DerefOracle>(table.as_ptr()) }, 3);
        assert_eq!(unsafe { table_len(table.as_ptr()) }, 3);
    }

    #[test]
    /// The region oracle stops at the first pointer into non-executable memory
    fn test_data_pointer() {
        let data = [0xdead_beefusize];
        let table = [first as usize, second as usize, data.as_ptr() as usize, third as usize];

        assert_eq!(unsafe { table_len_with::<RegionOracle>(table.as_ptr()) }, 2);
    }

    #[test]
    /// The dereference heuristic accepts data pointers, but stops at pointers to zero
    fn test_deref_heuristic() {
        let data = [0xdead_beefusize];
        let zero = [0usize];
        let table = [
            first as usize,
            data.as_ptr() as usize,
            zero.as_ptr() as usize,
            second as usize,
        ];

        assert_eq!(unsafe { table_len_with::<DerefOracle>(table.as_ptr()) }, 2);
    }

    #[test]
    /// An empty table has no entries
    fn test_empty_table() {
        let table = [0usize, first as usize];

        assert_eq!(unsafe { table_len_with::<RegionOracle>(table.as_ptr()) }, 0);
        assert_eq!(unsafe { table_len_with::<DerefOracle>(table.as_ptr()) }, 0);
    }
}
