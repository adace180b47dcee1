//! Oracle for hosts without memory region metadata

use super::ValidityOracle;

/// Accepts non-null entries whose first word is non-zero.
///
/// This is only a heuristic. Code is mapped, and the first word of a function is rarely all
/// zeroes, but data pointers pass the test just as well. It is good enough to decide how many
/// entries to copy.
pub struct DerefOracle;

unsafe impl ValidityOracle for DerefOracle {
    unsafe fn is_valid(entry: usize) -> bool {
        entry != 0 && crate::raw::read_word(entry as *const usize, 0) != 0
    }
}
