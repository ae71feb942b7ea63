use kernel_phys_buffers::HostPageAllocator;
use kernel_ports::{LoopbackPorts, RecordingDelay, RecordingSmi, SmiRegisters};
use kernel_uaccess::{BoundaryFault, FlatUserMemory, UserMemory, UserPtr};
use phy_alloc::mmap::{CachePolicy, MmapRequest, PageRemapper, RemapFailed};
use phy_alloc::{DeviceError, DriverConfig, HostPhyAllocDevice, PhyAllocDevice, Session};
use phy_alloc_abi::{
    AllocPayload, DRIVER_VERSION, IoMode, IoPayload, Opcode, SmiPayload, Status, U32Payload,
};
use std::time::Duration;

fn device_with(smi: RecordingSmi) -> HostPhyAllocDevice {
    PhyAllocDevice::new(
        DriverConfig::new().with_smi_settle(Duration::from_millis(1)),
        HostPageAllocator::default(),
        LoopbackPorts::new(),
        smi,
        RecordingDelay::default(),
    )
}

fn device() -> HostPhyAllocDevice {
    device_with(RecordingSmi::echo())
}

fn user() -> FlatUserMemory {
    FlatUserMemory::new(0x4000_0000, 0x10_0000)
}

fn ioctl(dev: &HostPhyAllocDevice, session: &Session, op: Opcode, arg: UserPtr, user: &impl UserMemory) -> Status {
    let raw = dev.ioctl(session, op.ioctl().into_bits(), arg, user);
    Status::from_raw(raw).expect("known status code")
}

fn load<const N: usize>(user: &FlatUserMemory, ptr: UserPtr) -> [u8; N] {
    user.load(ptr, N).try_into().unwrap()
}

fn allocate(dev: &HostPhyAllocDevice, session: &Session, user: &FlatUserMemory, size: u32) -> AllocPayload {
    let arg = user.alloc_with(&AllocPayload { size, ..AllocPayload::default() }.encode());
    assert_eq!(ioctl(dev, session, Opcode::Allocate, arg, user), Status::Success);
    AllocPayload::decode(&load(user, arg))
}

fn quantity(dev: &HostPhyAllocDevice, session: &Session, user: &FlatUserMemory) -> u32 {
    let arg = user.alloc(U32Payload::SIZE);
    assert_eq!(ioctl(dev, session, Opcode::GetAllocatedQuantity, arg, user), Status::Success);
    U32Payload::decode(&load(user, arg)).0
}

#[test]
fn allocate_reports_handle_and_addresses() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();

    let first = allocate(&dev, &session, &user, 0x1800);
    let second = allocate(&dev, &session, &user, 0x10);
    assert_eq!(first.index, 0);
    assert_eq!(second.index, 1);
    assert_eq!(first.size, 0x1800);
    assert_ne!(first.physical_address, 0);
    assert_eq!(first.physical_address % 4096, 0);
    // Host pages are identity mapped.
    assert_eq!(first.virtual_address, first.physical_address);
    assert_ne!(first.physical_address, second.physical_address);
    assert_eq!(quantity(&dev, &session, &user), 2);

    dev.release(session);
}

#[test]
fn zero_sized_allocation_is_a_bad_argument() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let arg = user.alloc_with(&AllocPayload::default().encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Allocate, arg, &user), Status::BadArgument);
    assert_eq!(quantity(&dev, &session, &user), 0);
    dev.release(session);
}

#[test]
fn free_releases_by_physical_address() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let buffer = allocate(&dev, &session, &user, 4096);

    let bogus = user.alloc_with(
        &AllocPayload {
            physical_address: 0x1234_0000,
            size: 4096,
            ..AllocPayload::default()
        }
        .encode(),
    );
    assert_eq!(ioctl(&dev, &session, Opcode::Free, bogus, &user), Status::AllocateFail);
    assert_eq!(quantity(&dev, &session, &user), 1);

    let arg = user.alloc_with(&buffer.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Free, arg, &user), Status::Success);
    assert_eq!(quantity(&dev, &session, &user), 0);
    assert_eq!(ioctl(&dev, &session, Opcode::Free, arg, &user), Status::AllocateFail);
    dev.release(session);
}

#[test]
fn write_then_read_through_the_device() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let buffer = allocate(&dev, &session, &user, 64);

    let data: Vec<u8> = (0..64).collect();
    let src = user.alloc_with(&data);
    let arg = user.alloc_with(
        &AllocPayload {
            buffer: src.as_u64(),
            ..buffer
        }
        .encode(),
    );
    assert_eq!(ioctl(&dev, &session, Opcode::Write, arg, &user), Status::Success);

    let dst = user.alloc(64);
    let arg = user.alloc_with(
        &AllocPayload {
            buffer: dst.as_u64(),
            ..buffer
        }
        .encode(),
    );
    assert_eq!(ioctl(&dev, &session, Opcode::Read, arg, &user), Status::Success);
    assert_eq!(user.load(dst, 64), data);
    dev.release(session);
}

#[test]
fn read_and_write_reject_null_buffers_and_unknown_indices() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let buffer = allocate(&dev, &session, &user, 8);

    let null = user.alloc_with(&AllocPayload { buffer: 0, ..buffer }.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Read, null, &user), Status::AllocateFail);
    assert_eq!(ioctl(&dev, &session, Opcode::Write, null, &user), Status::AllocateFail);

    let unknown = user.alloc_with(
        &AllocPayload {
            index: 42,
            buffer: user.alloc(8).as_u64(),
            ..buffer
        }
        .encode(),
    );
    assert_eq!(ioctl(&dev, &session, Opcode::Read, unknown, &user), Status::AllocateFail);

    let unmapped = user.alloc_with(
        &AllocPayload {
            buffer: 0x7000_0000,
            ..buffer
        }
        .encode(),
    );
    assert_eq!(ioctl(&dev, &session, Opcode::Read, unmapped, &user), Status::CopyFailed);
    dev.release(session);
}

#[test]
fn version_is_reported() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let arg = user.alloc(U32Payload::SIZE);
    assert_eq!(ioctl(&dev, &session, Opcode::ReadVersion, arg, &user), Status::Success);
    assert_eq!(U32Payload::decode(&load(&user, arg)).0, DRIVER_VERSION);
    assert_eq!(
        ioctl(&dev, &session, Opcode::ReadVersion, UserPtr::null(), &user),
        Status::BadArgument
    );
    dev.release(session);
}

#[test]
fn unknown_commands_fail_generically() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    for cmd in [0x6400, 0x6409, 0x5401, Opcode::Read.ioctl().with_size(32).into_bits()] {
        assert_eq!(dev.ioctl(&session, cmd, user.alloc(8), &user), -1, "cmd {cmd:#x}");
    }
    dev.release(session);
}

#[test]
fn unreadable_payloads_fail_the_copy() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let outside = UserPtr::new(0x10);
    for op in [Opcode::Allocate, Opcode::Free, Opcode::Read, Opcode::Write, Opcode::Smi, Opcode::Io] {
        assert_eq!(ioctl(&dev, &session, op, outside, &user), Status::CopyFailed, "{op}");
    }
    assert_eq!(
        ioctl(&dev, &session, Opcode::GetAllocatedQuantity, UserPtr::null(), &user),
        Status::CopyFailed
    );
    dev.release(session);
}

/// Lets payloads be read but refuses to write them back.
struct WriteProtected<'a>(&'a FlatUserMemory);

impl UserMemory for WriteProtected<'_> {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), BoundaryFault> {
        self.0.copy_from_user(dst, src)
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), BoundaryFault> {
        Err(BoundaryFault::Unmapped {
            addr: dst.as_u64(),
            len: src.len(),
        })
    }
}

#[test]
fn lost_allocate_result_releases_the_buffer() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    let arg = user.alloc_with(&AllocPayload { size: 100, ..AllocPayload::default() }.encode());
    assert_eq!(
        ioctl(&dev, &session, Opcode::Allocate, arg, &WriteProtected(&user)),
        Status::CopyFailed
    );
    assert_eq!(dev.allocated_quantity(), 0);
    dev.release(session);
}

#[test]
fn smi_hands_back_post_trap_registers() {
    let dev = device_with(RecordingSmi::with_handler(|regs| SmiRegisters {
        eax: 0,
        ebx: regs.ebx ^ 0xFFFF_FFFF,
        ..regs
    }));
    let user = user();
    let session = dev.open().unwrap();

    let request = SmiPayload {
        esi: 1,
        edi: 2,
        ecx: 3,
        edx: 0xB2,
        eax: 0xEF,
        ebx: 0x0000_FFFF,
    };
    let arg = user.alloc_with(&request.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Smi, arg, &user), Status::Success);
    assert_eq!(
        SmiPayload::decode(&load(&user, arg)),
        SmiPayload {
            eax: 0,
            ebx: 0xFFFF_0000,
            ..request
        }
    );
    dev.release(session);
}

#[test]
fn io_round_trips_every_width() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();

    for (width, value) in [(1, 0x5A), (2, 0xA55A), (4, 0xDEAD_BEEF), (8, 0x0011_2233_4455_6677)] {
        let port = 0x500 + u16::from(width) * 0x10;
        let write = IoPayload {
            port,
            value,
            width,
            mode: IoMode::Write,
        };
        let arg = user.alloc_with(&write.encode());
        assert_eq!(ioctl(&dev, &session, Opcode::Io, arg, &user), Status::Success);

        let arg = user.alloc_with(&IoPayload { value: 0, mode: IoMode::Read, ..write }.encode());
        assert_eq!(ioctl(&dev, &session, Opcode::Io, arg, &user), Status::Success);
        assert_eq!(IoPayload::decode(&load(&user, arg)).value, value, "width {width}");
    }
    dev.release(session);
}

#[test]
fn io_ignores_unsupported_widths_and_modes() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();

    let odd_width = IoPayload {
        port: 0x80,
        value: 0x1234,
        width: 3,
        mode: IoMode::Read,
    };
    let arg = user.alloc_with(&odd_width.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Io, arg, &user), Status::Success);
    assert_eq!(IoPayload::decode(&load(&user, arg)), odd_width);

    let odd_mode = IoPayload {
        width: 1,
        mode: IoMode::Other(7),
        ..odd_width
    };
    let arg = user.alloc_with(&odd_mode.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Io, arg, &user), Status::Success);
    assert_eq!(IoPayload::decode(&load(&user, arg)), odd_mode);

    // Neither touched the port.
    let read = IoPayload {
        mode: IoMode::Read,
        value: 0xFF,
        ..odd_mode
    };
    let arg = user.alloc_with(&read.encode());
    assert_eq!(ioctl(&dev, &session, Opcode::Io, arg, &user), Status::Success);
    assert_eq!(IoPayload::decode(&load(&user, arg)).value, 0);
    dev.release(session);
}

#[test]
fn teardown_waits_for_every_session() {
    let dev = device();
    let user = user();
    let a = dev.open().unwrap();
    let b = dev.open().unwrap();
    allocate(&dev, &a, &user, 10);
    allocate(&dev, &b, &user, 5000);
    assert_eq!(dev.sessions(), 2);

    assert_eq!(dev.teardown(), Err(DeviceError::Busy));
    assert_eq!(DeviceError::Busy.status(), Status::DeviceBusy);
    dev.release(a);
    assert_eq!(dev.teardown(), Err(DeviceError::Busy));
    assert_eq!(dev.allocated_quantity(), 2);

    dev.release(b);
    assert_eq!(dev.teardown(), Ok(2));
    assert_eq!(dev.allocated_quantity(), 0);
    assert_eq!(dev.open().unwrap_err(), DeviceError::Busy);
    assert_eq!(dev.sessions(), 0);
}

#[test]
fn concurrent_sessions_are_serialized() {
    let dev = device();
    let threads = 4;
    let rounds = 50;

    std::thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                let user = user();
                let session = dev.open().unwrap();
                for round in 0..rounds {
                    let buffer = allocate(&dev, &session, &user, 100 + round);
                    let arg = user.alloc_with(&buffer.encode());
                    assert_eq!(ioctl(&dev, &session, Opcode::Free, arg, &user), Status::Success);
                }
                dev.release(session);
            });
        }
    });

    assert_eq!(dev.sessions(), 0);
    assert_eq!(dev.allocated_quantity(), 0);
}

struct Recorder(Vec<(u64, u64, u64, CachePolicy)>);

impl PageRemapper for Recorder {
    fn remap_pfn_range(&mut self, start: u64, pfn: u64, len: u64, policy: CachePolicy) -> Result<(), RemapFailed> {
        self.0.push((start, pfn, len, policy));
        Ok(())
    }
}

#[test]
fn mmap_maps_the_requested_frames() {
    let dev = device();
    let session = dev.open().unwrap();
    let mut remapper = Recorder(Vec::new());
    let request = MmapRequest {
        start: 0x7f00_0000_0000,
        end: 0x7f00_0000_2000,
        pgoff: 0xFED0_0,
        sync: true,
    };
    assert_eq!(dev.mmap(&session, &request, &mut remapper), Ok(CachePolicy::Uncached));
    assert_eq!(
        remapper.0,
        [(0x7f00_0000_0000, 0xFED0_0, 0x2000, CachePolicy::Uncached)]
    );
    dev.release(session);
}

#[test]
fn sessions_stay_with_their_device() {
    let a = device();
    let b = device();
    let user = user();

    let session = a.open().unwrap();
    let arg = user.alloc(U32Payload::SIZE);
    let cmd = Opcode::ReadVersion.ioctl().into_bits();
    assert_eq!(b.ioctl(&session, cmd, arg, &user), -1);
    let request = MmapRequest {
        start: 0x7f00_0000_0000,
        end: 0x7f00_0000_1000,
        pgoff: 0,
        sync: false,
    };
    assert_eq!(
        b.mmap(&session, &request, &mut Recorder(Vec::new())),
        Err(phy_alloc::mmap::MmapError::InvalidArgument)
    );

    b.release(session);
    assert_eq!(a.sessions(), 0);
    assert_eq!(b.sessions(), 0);
    assert_eq!(a.teardown(), Ok(0));
    assert_eq!(b.teardown(), Ok(0));
}

#[test]
fn dropping_a_session_closes_it() {
    let dev = device();
    {
        let _session = dev.open().unwrap();
        assert_eq!(dev.sessions(), 1);
        assert_eq!(dev.teardown(), Err(DeviceError::Busy));
    }
    assert_eq!(dev.sessions(), 0);
    assert_eq!(dev.teardown(), Ok(0));
}

#[test]
fn foreign_ioctl_numbers_leave_the_device_untouched() {
    let dev = device();
    let user = user();
    let session = dev.open().unwrap();
    allocate(&dev, &session, &user, 64);
    let arg = user.alloc_with(&AllocPayload { size: 64, ..AllocPayload::default() }.encode());
    let sized_allocate = Opcode::Allocate.ioctl().with_size(32).into_bits();
    assert_eq!(dev.ioctl(&session, sized_allocate, arg, &user), Status::NotAllocated.as_raw());
    assert_eq!(quantity(&dev, &session, &user), 1);
    dev.release(session);
}

#[test]
fn page_size_follows_the_page_allocator() {
    let dev = PhyAllocDevice::new(
        DriverConfig::new().with_page_size(0x1_0000),
        HostPageAllocator::default(),
        LoopbackPorts::new(),
        RecordingSmi::echo(),
        RecordingDelay::default(),
    );
    assert_eq!(dev.config().page_size, 4096);
    assert_eq!(dev.config().page_shift(), 12);

    let session = dev.open().unwrap();
    let mut remapper = Recorder(Vec::new());
    let request = MmapRequest {
        start: 0x7f00_0000_0000,
        end: 0x7f00_0000_1000,
        pgoff: u64::MAX >> 12,
        sync: false,
    };
    assert!(dev.mmap(&session, &request, &mut remapper).is_ok());
    dev.release(session);
}
