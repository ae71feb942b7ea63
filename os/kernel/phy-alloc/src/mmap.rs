//! Mapping physical pages straight into the caller's address space.
//!
//! Nothing here consults the tracker: any physical range may be mapped,
//! exactly like `/dev/mem`.

use crate::DriverConfig;
use log::debug;

/// A mapping request: the user virtual range `[start, end)` should show the
/// physical pages starting at page frame `pgoff`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MmapRequest {
    pub start: u64,
    pub end: u64,
    pub pgoff: u64,
    /// The file was opened with `O_DSYNC`.
    pub sync: bool,
}

impl MmapRequest {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CachePolicy {
    WriteBack,
    Uncached,
}

/// The host primitive that installs page table entries for a user range.
pub trait PageRemapper {
    /// Maps `len` bytes of physical memory from frame `pfn` at user address `start`.
    ///
    /// # Errors
    /// The host could not install the mapping.
    fn remap_pfn_range(
        &mut self,
        start: u64,
        pfn: u64,
        len: u64,
        policy: CachePolicy,
    ) -> Result<(), RemapFailed>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("page remap failed")]
pub struct RemapFailed;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MmapError {
    #[error("physical range does not fit the address space")]
    InvalidArgument,
    #[error("remapping failed, try again")]
    TryAgain,
}

impl MmapError {
    /// Negative errno reported to the caller.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument => -22,
            Self::TryAgain => -11,
        }
    }
}

/// Uncached when the file is synchronous or the range lies past installed RAM.
#[must_use]
pub const fn cache_policy(config: &DriverConfig, offset: u64, sync: bool) -> CachePolicy {
    if sync || offset >= config.top_of_ram {
        CachePolicy::Uncached
    } else {
        CachePolicy::WriteBack
    }
}

/// Validates `request` and hands it to `remapper`.
///
/// # Errors
/// - [`MmapError::InvalidArgument`] if the frame number does not fit a
///   physical address, the range is empty or inverted, or it would wrap
///   around the top of the physical address space.
/// - [`MmapError::TryAgain`] if the remap itself fails.
pub fn map_physical(
    config: &DriverConfig,
    request: &MmapRequest,
    remapper: &mut impl PageRemapper,
) -> Result<CachePolicy, MmapError> {
    let shift = config.page_shift();
    let offset = request
        .pgoff
        .checked_shl(shift)
        .filter(|offset| offset >> shift == request.pgoff)
        .ok_or(MmapError::InvalidArgument)?;

    if request.end <= request.start {
        return Err(MmapError::InvalidArgument);
    }
    let len = request.len();
    offset
        .checked_add(len - 1)
        .ok_or(MmapError::InvalidArgument)?;

    let policy = cache_policy(config, offset, request.sync);
    debug!(
        "mmap {:#x}..{:#x} -> phys {offset:#x} ({policy:?})",
        request.start, request.end
    );
    remapper
        .remap_pfn_range(request.start, request.pgoff, len, policy)
        .map_err(|_| MmapError::TryAgain)?;
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(u64, u64, u64, CachePolicy)>,
        fail: bool,
    }

    impl PageRemapper for Recorder {
        fn remap_pfn_range(
            &mut self,
            start: u64,
            pfn: u64,
            len: u64,
            policy: CachePolicy,
        ) -> Result<(), RemapFailed> {
            if self.fail {
                return Err(RemapFailed);
            }
            self.calls.push((start, pfn, len, policy));
            Ok(())
        }
    }

    fn request(pgoff: u64, len: u64, sync: bool) -> MmapRequest {
        MmapRequest {
            start: 0x7000_0000,
            end: 0x7000_0000 + len,
            pgoff,
            sync,
        }
    }

    #[test]
    fn ram_is_mapped_write_back() {
        let config = DriverConfig::new().with_top_of_ram(0x1_0000_0000);
        let mut remapper = Recorder::default();
        let policy = map_physical(&config, &request(0x100, 0x2000, false), &mut remapper).unwrap();
        assert_eq!(policy, CachePolicy::WriteBack);
        assert_eq!(
            remapper.calls,
            [(0x7000_0000, 0x100, 0x2000, CachePolicy::WriteBack)]
        );
    }

    #[test]
    fn sync_or_high_ranges_are_uncached() {
        let config = DriverConfig::new().with_top_of_ram(0x1_0000_0000);
        let mut remapper = Recorder::default();
        assert_eq!(
            map_physical(&config, &request(0x100, 0x1000, true), &mut remapper),
            Ok(CachePolicy::Uncached)
        );
        assert_eq!(
            map_physical(&config, &request(0x10_0000, 0x1000, false), &mut remapper),
            Ok(CachePolicy::Uncached)
        );
    }

    #[test]
    fn oversized_frame_numbers_are_rejected() {
        let config = DriverConfig::new();
        let mut remapper = Recorder::default();
        assert_eq!(
            map_physical(&config, &request(1 << 53, 0x1000, false), &mut remapper),
            Err(MmapError::InvalidArgument)
        );
        assert!(remapper.calls.is_empty());
    }

    #[test]
    fn wrapping_and_empty_ranges_are_rejected() {
        let config = DriverConfig::new();
        let mut remapper = Recorder::default();
        let top_frame = u64::MAX >> 12;
        assert_eq!(
            map_physical(&config, &request(top_frame, 0x2000, false), &mut remapper),
            Err(MmapError::InvalidArgument)
        );
        assert_eq!(
            map_physical(&config, &request(0, 0, false), &mut remapper),
            Err(MmapError::InvalidArgument)
        );
        // The very last page still fits.
        assert!(map_physical(&config, &request(top_frame, 0x1000, false), &mut remapper).is_ok());
    }

    #[test]
    fn remap_failure_asks_to_retry() {
        let config = DriverConfig::new();
        let mut remapper = Recorder {
            fail: true,
            ..Recorder::default()
        };
        let err = map_physical(&config, &request(0, 0x1000, false), &mut remapper).unwrap_err();
        assert_eq!(err, MmapError::TryAgain);
        assert_eq!(err.errno(), -11);
        assert_eq!(MmapError::InvalidArgument.errno(), -22);
    }
}
