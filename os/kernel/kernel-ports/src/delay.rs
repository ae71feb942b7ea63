use core::time::Duration;

/// A blocking wait on the calling CPU.
pub trait Delay {
    fn delay(&self, duration: Duration);
}

impl<T> Delay for &T
where
    T: Delay + ?Sized,
{
    fn delay(&self, duration: Duration) {
        (**self).delay(duration);
    }
}

/// Busy-waits on the time stamp counter.
///
/// Requires an invariant TSC; the frequency is supplied by whoever
/// calibrated it (CPUID leaf 15h/16h or a PIT measurement).
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Copy, Clone)]
pub struct TscDelay {
    tsc_hz: u64,
}

#[cfg(target_arch = "x86_64")]
impl TscDelay {
    #[must_use]
    pub const fn new(tsc_hz: u64) -> Self {
        Self { tsc_hz }
    }

    #[must_use]
    pub const fn tsc_hz(&self) -> u64 {
        self.tsc_hz
    }

    /// TSC ticks covering `duration`, saturating at `u64::MAX`.
    #[must_use]
    pub fn ticks(&self, duration: Duration) -> u64 {
        let ticks = duration
            .as_nanos()
            .saturating_mul(u128::from(self.tsc_hz))
            / 1_000_000_000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

#[cfg(target_arch = "x86_64")]
impl Delay for TscDelay {
    fn delay(&self, duration: Duration) {
        let start = rdtsc();
        let ticks = self.ticks(duration);
        while rdtsc().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
#[allow(clippy::inline_always)]
fn rdtsc() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        core::arch::asm!(
            "lfence",
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack, preserves_flags),
        );
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    #[test]
    fn ticks_scale_with_frequency() {
        let delay = TscDelay::new(2_000_000_000);
        assert_eq!(delay.ticks(Duration::from_millis(500)), 1_000_000_000);
        assert_eq!(delay.ticks(Duration::from_micros(1)), 2_000);
        assert_eq!(delay.ticks(Duration::ZERO), 0);
    }

    #[test]
    fn ticks_saturate_instead_of_overflowing() {
        assert_eq!(TscDelay::new(u64::MAX).ticks(Duration::MAX), u64::MAX);
        assert_eq!(TscDelay::new(3_000_000_000).ticks(Duration::MAX), u64::MAX);
        assert_eq!(
            TscDelay::new(u64::MAX).ticks(Duration::from_secs(1)),
            u64::MAX
        );
    }

    #[test]
    fn zero_delay_returns() {
        TscDelay::new(1_000_000_000).delay(Duration::ZERO);
    }
}
