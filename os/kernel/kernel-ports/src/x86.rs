//! x86-64 port instructions and the SMI trap.
//!
//! All accesses use the legacy I/O port space through `in`/`out`; they are
//! ordered with respect to each other but are not general memory fences.

use crate::{PortIo, SmiRegisters, SmiTrap};

/// [`PortIo`] on the executing CPU.
#[derive(Debug, Copy, Clone)]
pub struct X86Ports {
    _private: (),
}

impl X86Ports {
    /// # Safety
    /// - Must execute at CPL0, or with an IOPL / I/O permission bitmap that
    ///   allows every port later accessed; otherwise the CPU raises `#GP`.
    /// - The caller takes responsibility for the device-level effects of
    ///   every access: wrong ports or values can wedge the platform.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PortIo for X86Ports {
    #[inline]
    fn read_u8(&self, port: u16) -> u8 {
        let v: u8;
        unsafe {
            core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    fn read_u16(&self, port: u16) -> u16 {
        let v: u16;
        unsafe {
            core::arch::asm!("in ax, dx", in("dx") port, out("ax") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    fn read_u32(&self, port: u16) -> u32 {
        let v: u32;
        unsafe {
            core::arch::asm!("in eax, dx", in("dx") port, out("eax") v, options(nomem, nostack, preserves_flags));
        }
        v
    }

    #[inline]
    fn write_u8(&self, port: u16, value: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn write_u16(&self, port: u16, value: u16) {
        unsafe {
            core::arch::asm!("out dx, ax", in("dx") port, in("ax") value, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn write_u32(&self, port: u16, value: u32) {
        unsafe {
            core::arch::asm!("out dx, eax", in("dx") port, in("eax") value, options(nomem, nostack, preserves_flags));
        }
    }
}

/// [`SmiTrap`] that raises a software SMI with `out dx, al`.
#[derive(Debug, Copy, Clone)]
pub struct X86Smi {
    _private: (),
}

impl X86Smi {
    /// # Safety
    /// - Must execute at CPL0.
    /// - The firmware handler may read and write arbitrary memory, including
    ///   physical buffers whose addresses are passed in the registers. The
    ///   caller must keep such buffers alive and unaliased across the trap.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl SmiTrap for X86Smi {
    #[allow(clippy::cast_possible_truncation)]
    fn trap(&self, registers: SmiRegisters) -> SmiRegisters {
        let mut eax = registers.eax;
        let mut ecx = registers.ecx;
        let mut edx = registers.edx;
        let mut esi = registers.esi;
        let mut edi = registers.edi;
        // RBX is reserved by LLVM; swap it in and out around the trap.
        let mut rbx = u64::from(registers.ebx);

        // No `nomem`: the handler may touch memory handed over in the registers.
        unsafe {
            core::arch::asm!(
                "xchg {rbx}, rbx",
                "out dx, al",
                "xchg {rbx}, rbx",
                rbx = inout(reg) rbx,
                inout("eax") eax,
                inout("ecx") ecx,
                inout("edx") edx,
                inout("esi") esi,
                inout("edi") edi,
            );
        }

        SmiRegisters {
            eax,
            ebx: rbx as u32,
            ecx,
            edx,
            esi,
            edi,
        }
    }
}
