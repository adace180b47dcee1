//! Oracle backed by the host's memory region metadata

use super::ValidityOracle;

/// Accepts entries pointing into executable, unguarded memory regions.
///
/// Each check is a region query against the host (a `VirtualQuery` call on Windows, a walk
/// of the process' mappings elsewhere), so probing costs one query per entry.
pub struct RegionOracle;

unsafe impl ValidityOracle for RegionOracle {
    unsafe fn is_valid(entry: usize) -> bool {
        if entry == 0 {
            return false;
        }

        match region::query(entry as *const ()) {
            Ok(region) => region.is_executable() && !region.is_guarded(),
            Err(region::Error::UnmappedRegion) => false,
            Err(error) => {
                log::trace!("region query for {entry:#x} failed: {error}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RegionOracle;
    use crate::probe::tests::first;
    use crate::probe::ValidityOracle;

    #[test]
    /// Functions are executable, stack data and null are not
    fn test_is_valid() {
        let data = 0usize;

        assert!(unsafe { RegionOracle::is_valid(first as usize) });
        assert!(!unsafe { RegionOracle::is_valid(&data as *const usize as usize) });
        assert!(!unsafe { RegionOracle::is_valid(0) });
    }
}
