use kernel_phys_buffers::{AllocationTracker, PageAllocator, PhysicalAddress, TrackerError};
use kernel_ports::{Delay, PortIo, RegisterBridge, SmiRegisters, SmiTrap};
use kernel_uaccess::{BoundaryFault, UserMemory, UserPtr};
use log::{debug, warn};
use phy_alloc_abi::{
    AllocPayload, DRIVER_VERSION, IoMode, IoctlNumber, IoPayload, Opcode, SmiPayload, Status, U32Payload,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported command {0:#010x}")]
    UnknownCommand(u32),
    #[error("payload could not cross the user boundary: {0}")]
    Payload(#[from] BoundaryFault),
    #[error("null argument pointer")]
    NullArgument,
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl DispatchError {
    /// The status code reported to user space.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::UnknownCommand(_) => Status::NotAllocated,
            Self::Payload(_) | Self::Tracker(TrackerError::Boundary(_)) => Status::CopyFailed,
            Self::NullArgument | Self::Tracker(TrackerError::ZeroSize) => Status::BadArgument,
            Self::Tracker(
                TrackerError::OutOfPages(_)
                | TrackerError::OutOfNodes
                | TrackerError::IndexExhausted
                | TrackerError::UnknownAddress(_)
                | TrackerError::UnknownIndex(_)
                | TrackerError::NullBuffer,
            ) => Status::AllocateFail,
        }
    }
}

/// Routes one command to the tracker or the register bridge.
///
/// Each call copies the payload in from `arg`, runs exactly one operation
/// and copies the result back out. The dispatcher keeps no state between
/// calls; the caller provides mutual exclusion.
pub struct Dispatcher<'a, A, P, T, D> {
    tracker: &'a mut AllocationTracker<A>,
    bridge: &'a RegisterBridge<P, T, D>,
}

impl<'a, A, P, T, D> Dispatcher<'a, A, P, T, D>
where
    A: PageAllocator,
    P: PortIo,
    T: SmiTrap,
    D: Delay,
{
    pub const fn new(tracker: &'a mut AllocationTracker<A>, bridge: &'a RegisterBridge<P, T, D>) -> Self {
        Self { tracker, bridge }
    }

    /// Decodes `cmd`, runs it and reports its status.
    ///
    /// Numbers that do not name a `phy_alloc` command report
    /// [`Status::NotAllocated`].
    pub fn dispatch(&mut self, cmd: IoctlNumber, arg: UserPtr, user: &impl UserMemory) -> Status {
        let result = match cmd.opcode() {
            Some(op) => self.execute(op, arg, user),
            None => Err(DispatchError::UnknownCommand(cmd.into_bits())),
        };
        match result {
            Ok(()) => Status::Success,
            Err(e) => {
                debug!("ioctl {:#010x} failed: {e}", cmd.into_bits());
                e.status()
            }
        }
    }

    /// Runs `op` against the payload at `arg`.
    ///
    /// # Errors
    /// The payload cannot be copied, or the operation itself fails.
    pub fn execute(&mut self, op: Opcode, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        debug!("{op} arg={arg:?}");
        match op {
            Opcode::Allocate => self.allocate(arg, user),
            Opcode::Free => self.free(arg, user),
            Opcode::Write => self.write(arg, user),
            Opcode::Read => self.read(arg, user),
            Opcode::ReadVersion => Self::version(arg, user),
            Opcode::GetAllocatedQuantity => self.quantity(arg, user),
            Opcode::Smi => self.smi(arg, user),
            Opcode::Io => self.io(arg, user),
        }
    }

    fn allocate(&mut self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let mut payload = AllocPayload::decode(&copy_in(user, arg)?);
        let allocation = self.tracker.allocate(payload.size)?;

        payload.index = allocation.index;
        payload.physical_address = allocation.physical_address.as_u64();
        payload.virtual_address = allocation.virtual_address.as_u64();

        if let Err(e) = user.copy_to_user(arg, &payload.encode()) {
            // The caller never learned the handle; take the buffer back.
            warn!("ALLOCATE result lost ({e}), releasing #{}", allocation.index);
            self.tracker
                .free(allocation.physical_address, payload.size)?;
            return Err(e.into());
        }
        Ok(())
    }

    fn free(&mut self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let payload = AllocPayload::decode(&copy_in(user, arg)?);
        self.tracker
            .free(PhysicalAddress::new(payload.physical_address), payload.size)?;
        Ok(())
    }

    fn write(&mut self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let payload = AllocPayload::decode(&copy_in(user, arg)?);
        self.tracker
            .write(payload.index, user, UserPtr::new(payload.buffer))?;
        Ok(())
    }

    fn read(&self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let payload = AllocPayload::decode(&copy_in(user, arg)?);
        self.tracker
            .read(payload.index, user, UserPtr::new(payload.buffer))?;
        Ok(())
    }

    fn version(arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        if arg.is_null() {
            return Err(DispatchError::NullArgument);
        }
        user.copy_to_user(arg, &U32Payload(DRIVER_VERSION).encode())?;
        Ok(())
    }

    fn quantity(&self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let count = u32::try_from(self.tracker.count()).unwrap_or(u32::MAX);
        user.copy_to_user(arg, &U32Payload(count).encode())?;
        Ok(())
    }

    fn smi(&self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let payload = SmiPayload::decode(&copy_in(user, arg)?);
        let out = self.bridge.invoke_smi(SmiRegisters {
            eax: payload.eax,
            ebx: payload.ebx,
            ecx: payload.ecx,
            edx: payload.edx,
            esi: payload.esi,
            edi: payload.edi,
        });
        let payload = SmiPayload {
            esi: out.esi,
            edi: out.edi,
            ecx: out.ecx,
            edx: out.edx,
            eax: out.eax,
            ebx: out.ebx,
        };
        user.copy_to_user(arg, &payload.encode())?;
        Ok(())
    }

    fn io(&self, arg: UserPtr, user: &impl UserMemory) -> Result<(), DispatchError> {
        let mut payload = IoPayload::decode(&copy_in(user, arg)?);
        match payload.mode {
            IoMode::Read => self
                .bridge
                .port_read(payload.port, payload.width, &mut payload.value),
            IoMode::Write => self
                .bridge
                .port_write(payload.port, payload.width, payload.value),
            IoMode::Other(mode) => debug!("IO mode {mode} ignored"),
        }
        user.copy_to_user(arg, &payload.encode())?;
        Ok(())
    }
}

fn copy_in<const N: usize>(user: &impl UserMemory, arg: UserPtr) -> Result<[u8; N], BoundaryFault> {
    let mut buf = [0u8; N];
    user.copy_from_user(&mut buf, arg)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        assert_eq!(DispatchError::UnknownCommand(0x6400).status(), Status::NotAllocated);
        assert_eq!(DispatchError::Payload(BoundaryFault::Null).status(), Status::CopyFailed);
        assert_eq!(DispatchError::NullArgument.status(), Status::BadArgument);
        assert_eq!(DispatchError::from(TrackerError::ZeroSize).status(), Status::BadArgument);
        assert_eq!(DispatchError::from(TrackerError::NullBuffer).status(), Status::AllocateFail);
        assert_eq!(
            DispatchError::from(TrackerError::UnknownIndex(3)).status(),
            Status::AllocateFail
        );
        assert_eq!(
            DispatchError::from(TrackerError::Boundary(BoundaryFault::Null)).status(),
            Status::CopyFailed
        );
    }
}
