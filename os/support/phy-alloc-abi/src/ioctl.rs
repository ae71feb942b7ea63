use crate::DEVICE_MAJOR;
use bitfield_struct::bitfield;

/// Commands understood by the device.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Opcode {
    /// Reserve a physically contiguous, zeroed buffer.
    Allocate = 1,
    /// Release a buffer by its physical address.
    Free = 2,
    /// Copy user bytes into a buffer.
    Write = 3,
    /// Copy a buffer's bytes out to user space.
    Read = 4,
    /// Report [`DRIVER_VERSION`](crate::DRIVER_VERSION).
    ReadVersion = 5,
    /// Report the number of live buffers.
    GetAllocatedQuantity = 6,
    /// Issue a System Management Interrupt.
    Smi = 7,
    /// Sized port-mapped read or write.
    Io = 8,
}

impl Opcode {
    pub const ALL: [Self; 8] = [
        Self::Allocate,
        Self::Free,
        Self::Write,
        Self::Read,
        Self::ReadVersion,
        Self::GetAllocatedQuantity,
        Self::Smi,
        Self::Io,
    ];

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::Allocate,
            2 => Self::Free,
            3 => Self::Write,
            4 => Self::Read,
            5 => Self::ReadVersion,
            6 => Self::GetAllocatedQuantity,
            7 => Self::Smi,
            8 => Self::Io,
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    /// The raw ioctl number this opcode is issued under, i.e. `_IO(100, opcode)`.
    #[inline]
    #[must_use]
    pub const fn ioctl(self) -> IoctlNumber {
        IoctlNumber::io(DEVICE_MAJOR, self.as_raw())
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Allocate => "ALLOCATE",
            Self::Free => "FREE",
            Self::Write => "WRITE",
            Self::Read => "READ",
            Self::ReadVersion => "READ_VERSION",
            Self::GetAllocatedQuantity => "GET_ALLOCATED_QUANTITY",
            Self::Smi => "SMI",
            Self::Io => "IO",
        }
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Data transfer direction encoded in the top two bits of an ioctl number.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoctlDirection {
    None = 0,
    Write = 1,
    Read = 2,
    ReadWrite = 3,
}

impl IoctlDirection {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => Self::None,
            1 => Self::Write,
            2 => Self::Read,
            _ => Self::ReadWrite,
        }
    }
}

/// A raw Linux-style ioctl command number.
///
/// ```text
///  31 30 29            16 15      8 7       0
/// +-----+----------------+---------+---------+
/// | dir |      size      |  type   | number  |
/// +-----+----------------+---------+---------+
/// ```
///
/// Every `phy_alloc` command is encoded with `_IO`: no direction, size zero,
/// type [`DEVICE_MAJOR`] and the opcode as the number. Payloads are located
/// through the ioctl argument, not through the size field.
#[bitfield(u32, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct IoctlNumber {
    /// Bits 0–7: command number within the type.
    pub nr: u8,

    /// Bits 8–15: driver type byte.
    pub ty: u8,

    /// Bits 16–29: argument size (unused by `_IO`).
    #[bits(14)]
    pub size: u16,

    /// Bits 30–31: transfer direction.
    #[bits(2)]
    pub dir: IoctlDirection,
}

impl IoctlNumber {
    /// Equivalent of the C `_IO(type, nr)` macro.
    #[must_use]
    pub const fn io(ty: u8, nr: u8) -> Self {
        Self::new()
            .with_dir(IoctlDirection::None)
            .with_size(0)
            .with_ty(ty)
            .with_nr(nr)
    }

    /// Resolves this number to a device opcode.
    ///
    /// Returns `None` for numbers issued under a foreign type byte, with a
    /// direction or size attached, or naming an unknown command.
    #[must_use]
    pub const fn opcode(self) -> Option<Opcode> {
        if self.ty() != DEVICE_MAJOR || self.size() != 0 {
            return None;
        }
        if !matches!(self.dir(), IoctlDirection::None) {
            return None;
        }
        Opcode::from_raw(self.nr())
    }
}
