use core::fmt;

/// Signed status code returned by every command.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Status {
    Success = 0,
    /// No buffer matches the request, or the opcode is unknown.
    NotAllocated = -1,
    /// Reserved; never produced by the current command set.
    AlreadyAllocated = -2,
    /// Page or bookkeeping allocation failed, or a handle did not resolve.
    AllocateFail = -3,
    /// The device is in use or shutting down.
    DeviceBusy = -4,
    /// Device initialization failed.
    InitFail = -5,
    /// A payload field is invalid (e.g. a zero-sized allocation).
    BadArgument = -6,
    /// A payload could not be copied across the user/kernel boundary.
    CopyFailed = -7,
}

impl Status {
    #[inline]
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Success,
            -1 => Self::NotAllocated,
            -2 => Self::AlreadyAllocated,
            -3 => Self::AllocateFail,
            -4 => Self::DeviceBusy,
            -5 => Self::InitFail,
            -6 => Self::BadArgument,
            -7 => Self::CopyFailed,
            _ => return None,
        })
    }

    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::NotAllocated => "not allocated",
            Self::AlreadyAllocated => "already allocated",
            Self::AllocateFail => "allocation failed",
            Self::DeviceBusy => "device busy",
            Self::InitFail => "initialization failed",
            Self::BadArgument => "bad argument",
            Self::CopyFailed => "boundary copy failed",
        };
        write!(f, "{text} ({})", self.as_raw())
    }
}

impl From<Status> for i32 {
    #[inline]
    fn from(value: Status) -> Self {
        value.as_raw()
    }
}
