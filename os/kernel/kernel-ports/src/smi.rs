use core::fmt;

/// The six 32-bit general purpose registers exchanged with an SMI handler.
///
/// By convention the low byte of `eax` is the SMI command written to the
/// port named by the low 16 bits of `edx` (typically the APM control port
/// `0xB2`); the remaining registers are handler-defined arguments.
#[derive(Default, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SmiRegisters {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
}

impl SmiRegisters {
    /// The I/O port the trap writes to.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn command_port(&self) -> u16 {
        self.edx as u16
    }

    /// The command byte written to [`command_port`](Self::command_port).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn command(&self) -> u8 {
        self.eax as u8
    }
}

impl fmt::Debug for SmiRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EAX={:08X} EBX={:08X} ECX={:08X} EDX={:08X} ESI={:08X} EDI={:08X}",
            self.eax, self.ebx, self.ecx, self.edx, self.esi, self.edi
        )
    }
}

/// Platform primitive behind the SMI call: load the registers, trap into
/// firmware, return the registers as the handler left them.
///
/// The trap has no software-visible failure mode. A handler that does not
/// respond or corrupts state simply yields registers of undefined meaning.
pub trait SmiTrap {
    fn trap(&self, registers: SmiRegisters) -> SmiRegisters;
}

impl<T> SmiTrap for &T
where
    T: SmiTrap + ?Sized,
{
    fn trap(&self, registers: SmiRegisters) -> SmiRegisters {
        (**self).trap(registers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_port_come_from_the_low_bits() {
        let regs = SmiRegisters {
            eax: 0x5343_00EF,
            edx: 0xDEAD_00B2,
            ..SmiRegisters::default()
        };
        assert_eq!(regs.command(), 0xEF);
        assert_eq!(regs.command_port(), 0x00B2);
    }

    #[test]
    fn debug_lists_every_register() {
        let regs = SmiRegisters {
            eax: 1,
            ebx: 2,
            ecx: 3,
            edx: 4,
            esi: 5,
            edi: 6,
        };
        assert_eq!(
            format!("{regs:?}"),
            "EAX=00000001 EBX=00000002 ECX=00000003 EDX=00000004 ESI=00000005 EDI=00000006"
        );
    }
}
