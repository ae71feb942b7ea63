//! Packed command payloads.
//!
//! The layouts follow the `#pragma pack(1)` structures of the device
//! interface, each padded to a multiple of 8 bytes. All integers are
//! little-endian.

#[inline]
fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

#[inline]
fn get_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes([
        buf[off],
        buf[off + 1],
        buf[off + 2],
        buf[off + 3],
        buf[off + 4],
        buf[off + 5],
        buf[off + 6],
        buf[off + 7],
    ])
}

#[inline]
fn put(buf: &mut [u8], off: usize, bytes: &[u8]) {
    buf[off..off + bytes.len()].copy_from_slice(bytes);
}

/// Payload of `ALLOCATE`, `FREE`, `READ` and `WRITE`.
///
/// ```text
/// 0x00  index             u32
/// 0x04  size              u32
/// 0x08  physical_address  u64
/// 0x10  virtual_address   u64
/// 0x18  buffer            u64   user pointer for READ / WRITE
/// ```
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct AllocPayload {
    pub index: u32,
    pub size: u32,
    pub physical_address: u64,
    pub virtual_address: u64,
    pub buffer: u64,
}

impl AllocPayload {
    pub const SIZE: usize = 32;

    #[must_use]
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            index: get_u32(buf, 0x00),
            size: get_u32(buf, 0x04),
            physical_address: get_u64(buf, 0x08),
            virtual_address: get_u64(buf, 0x10),
            buffer: get_u64(buf, 0x18),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        put(&mut buf, 0x00, &self.index.to_le_bytes());
        put(&mut buf, 0x04, &self.size.to_le_bytes());
        put(&mut buf, 0x08, &self.physical_address.to_le_bytes());
        put(&mut buf, 0x10, &self.virtual_address.to_le_bytes());
        put(&mut buf, 0x18, &self.buffer.to_le_bytes());
        buf
    }
}

/// Register file exchanged by the `SMI` command.
///
/// The field order on the wire is `ESI, EDI, ECX, EDX, EAX, EBX`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SmiPayload {
    pub esi: u32,
    pub edi: u32,
    pub ecx: u32,
    pub edx: u32,
    pub eax: u32,
    pub ebx: u32,
}

impl SmiPayload {
    pub const SIZE: usize = 24;

    #[must_use]
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            esi: get_u32(buf, 0),
            edi: get_u32(buf, 4),
            ecx: get_u32(buf, 8),
            edx: get_u32(buf, 12),
            eax: get_u32(buf, 16),
            ebx: get_u32(buf, 20),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        put(&mut buf, 0, &self.esi.to_le_bytes());
        put(&mut buf, 4, &self.edi.to_le_bytes());
        put(&mut buf, 8, &self.ecx.to_le_bytes());
        put(&mut buf, 12, &self.edx.to_le_bytes());
        put(&mut buf, 16, &self.eax.to_le_bytes());
        put(&mut buf, 20, &self.ebx.to_le_bytes());
        buf
    }
}

/// Transfer direction of an `IO` command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoMode {
    Read,
    Write,
    /// Any other mode byte; the command leaves the payload untouched.
    Other(u8),
}

impl IoMode {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Read,
            1 => Self::Write,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::Other(raw) => raw,
        }
    }
}

/// Payload of the `IO` command.
///
/// ```text
/// 0x00  port   u16
/// 0x02  value  u64
/// 0x0A  width  u8    1, 2, 4 or 8
/// 0x0B  mode   u8    0 = read, 1 = write
/// 0x0C  (padding to 16 bytes)
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IoPayload {
    pub port: u16,
    pub value: u64,
    pub width: u8,
    pub mode: IoMode,
}

impl Default for IoPayload {
    fn default() -> Self {
        Self {
            port: 0,
            value: 0,
            width: 0,
            mode: IoMode::Read,
        }
    }
}

impl IoPayload {
    pub const SIZE: usize = 16;

    #[must_use]
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self {
            port: get_u16(buf, 0x00),
            value: get_u64(buf, 0x02),
            width: buf[0x0A],
            mode: IoMode::from_raw(buf[0x0B]),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        put(&mut buf, 0x00, &self.port.to_le_bytes());
        put(&mut buf, 0x02, &self.value.to_le_bytes());
        buf[0x0A] = self.width;
        buf[0x0B] = self.mode.as_raw();
        buf
    }
}

/// Single `u32` written back by `READ_VERSION` and `GET_ALLOCATED_QUANTITY`.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct U32Payload(pub u32);

impl U32Payload {
    pub const SIZE: usize = 4;

    #[must_use]
    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        Self(u32::from_le_bytes(*buf))
    }

    #[must_use]
    pub const fn encode(&self) -> [u8; Self::SIZE] {
        self.0.to_le_bytes()
    }
}
