use core::fmt;

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(addr: u64) -> Self {
                Self(addr)
            }

            #[inline]
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "(0x{:016X})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{:016X}", self.0)
            }
        }

        impl From<$name> for u64 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

address_type!(
    /// Physical address of a buffer as seen by firmware and devices.
    PhysicalAddress,
    "PA"
);

address_type!(
    /// Kernel virtual address of a buffer.
    VirtualAddress,
    "VA"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting() {
        let pa = PhysicalAddress::new(0x1234_5000);
        assert_eq!(format!("{pa:?}"), "PA(0x0000000012345000)");
        assert_eq!(format!("{pa}"), "0x0000000012345000");
        let va = VirtualAddress::new(0xFFFF_8880_0000_0000);
        assert_eq!(format!("{va:?}"), "VA(0xFFFF888000000000)");
        assert_eq!(u64::from(va), 0xFFFF_8880_0000_0000);
    }
}
