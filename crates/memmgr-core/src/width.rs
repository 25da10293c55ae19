use std::sync::Arc;

use bitflags::bitflags;
use memmgr_platform::{MemoryProvider, PlatformError, PlatformResult};
use tracing::trace;

use crate::{AccessOp, DurableWriteGate, MemError, MemoryType, MemoryWidth, Result, VerifiedMemory};

bitflags! {
    /// Widths included in this build of the accessor.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct WidthSet: u32 {
        const BITS8 = 1 << 0;
        const BITS16 = 1 << 1;
        const BITS32 = 1 << 2;
        const UNTYPED = 1 << 3;
    }
}

impl WidthSet {
    pub const fn from_width(width: MemoryWidth) -> Self {
        match width {
            MemoryWidth::Bits8 => WidthSet::BITS8,
            MemoryWidth::Bits16 => WidthSet::BITS16,
            MemoryWidth::Bits32 => WidthSet::BITS32,
            MemoryWidth::Untyped => WidthSet::UNTYPED,
        }
    }
}

/// Fixed-size element moved by the typed primitives.
trait Element: Copy {
    const BYTES: usize;

    fn read<P: MemoryProvider + ?Sized>(platform: &P, addr: u64) -> PlatformResult<Self>;
    fn write<P: MemoryProvider + ?Sized>(platform: &P, addr: u64, value: Self)
        -> PlatformResult<()>;
    fn eeprom_write<P: MemoryProvider + ?Sized>(
        platform: &P,
        addr: u64,
        value: Self,
    ) -> PlatformResult<()>;

    fn from_word(word: u32) -> Self;
    fn to_word(self) -> u32;
    fn from_ne_slice(bytes: &[u8]) -> Self;
    fn write_ne_slice(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($ty:ty, $read:ident, $write:ident, $eeprom_write:ident) => {
        impl Element for $ty {
            const BYTES: usize = std::mem::size_of::<$ty>();

            fn read<P: MemoryProvider + ?Sized>(platform: &P, addr: u64) -> PlatformResult<Self> {
                platform.$read(addr)
            }

            fn write<P: MemoryProvider + ?Sized>(
                platform: &P,
                addr: u64,
                value: Self,
            ) -> PlatformResult<()> {
                platform.$write(addr, value)
            }

            fn eeprom_write<P: MemoryProvider + ?Sized>(
                platform: &P,
                addr: u64,
                value: Self,
            ) -> PlatformResult<()> {
                platform.$eeprom_write(addr, value)
            }

            fn from_word(word: u32) -> Self {
                word as $ty
            }

            fn to_word(self) -> u32 {
                u32::from(self)
            }

            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }

            fn write_ne_slice(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

impl_element!(u8, read_u8, write_u8, eeprom_write_u8);
impl_element!(u16, read_u16, write_u16, eeprom_write_u16);
impl_element!(u32, read_u32, write_u32, eeprom_write_u32);

/// Width-polymorphic access to verified memory.
///
/// Element loops stop at the first platform fault and report the failing element index.
/// Elements written before the fault stay written. Writes to `Durable` memory go through the
/// write-protected primitives and are refused outright while the [`DurableWriteGate`] is clear.
pub struct WidthAccessor<P: ?Sized> {
    platform: Arc<P>,
    widths: WidthSet,
    gate: DurableWriteGate,
}

impl<P: ?Sized> Clone for WidthAccessor<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            widths: self.widths,
            gate: self.gate.clone(),
        }
    }
}

impl<P: MemoryProvider + ?Sized> WidthAccessor<P> {
    pub fn new(platform: Arc<P>, widths: WidthSet, gate: DurableWriteGate) -> Self {
        Self {
            platform,
            widths,
            gate,
        }
    }

    /// Reads the single element at `mem`.
    pub fn peek(&self, mem: &VerifiedMemory) -> Result<u32> {
        let width = self.built(mem.width())?;
        match width {
            MemoryWidth::Bits8 => self.peek_typed::<u8>(mem),
            MemoryWidth::Bits16 => self.peek_typed::<u16>(mem),
            MemoryWidth::Bits32 => self.peek_typed::<u32>(mem),
            MemoryWidth::Untyped => Err(MemError::UnsupportedWidth {
                op: AccessOp::Peek,
                width,
            }),
        }
    }

    /// Writes the single element at `mem`. Upper bits of `value` beyond the width are dropped.
    pub fn poke(&self, mem: &VerifiedMemory, value: u32) -> Result<()> {
        let width = self.built(mem.width())?;
        self.check_gate(mem)?;
        match width {
            MemoryWidth::Bits8 => self.store::<u8>(mem, AccessOp::Poke, 0, u8::from_word(value)),
            MemoryWidth::Bits16 => self.store::<u16>(mem, AccessOp::Poke, 0, u16::from_word(value)),
            MemoryWidth::Bits32 => self.store::<u32>(mem, AccessOp::Poke, 0, value),
            MemoryWidth::Untyped => Err(MemError::UnsupportedWidth {
                op: AccessOp::Poke,
                width,
            }),
        }
    }

    /// Fills the whole range with `pattern`. Untyped fills use the low byte.
    pub fn fill_block(&self, mem: &VerifiedMemory, pattern: u32) -> Result<()> {
        let width = self.built(mem.width())?;
        self.check_gate(mem)?;
        match width {
            MemoryWidth::Bits8 => self.fill_typed::<u8>(mem, u8::from_word(pattern)),
            MemoryWidth::Bits16 => self.fill_typed::<u16>(mem, u16::from_word(pattern)),
            MemoryWidth::Bits32 => self.fill_typed::<u32>(mem, pattern),
            MemoryWidth::Untyped => {
                let len = mem.byte_count() as usize;
                let value = pattern as u8;
                let result = match mem.mem_type() {
                    MemoryType::Durable => self.platform.eeprom_copy_to(mem.addr(), &vec![value; len]),
                    _ => self.platform.set(mem.addr(), value, len),
                };
                result.map_err(|err| untyped_fault(mem, AccessOp::Fill, err))
            }
        }
    }

    /// Copies the whole range into `dst`, which must be exactly `byte_count` long.
    pub fn read_block(&self, mem: &VerifiedMemory, dst: &mut [u8]) -> Result<()> {
        let width = self.built(mem.width())?;
        check_len(mem, AccessOp::ReadBlock, dst.len())?;
        match width {
            MemoryWidth::Bits8 => self.read_typed::<u8>(mem, dst),
            MemoryWidth::Bits16 => self.read_typed::<u16>(mem, dst),
            MemoryWidth::Bits32 => self.read_typed::<u32>(mem, dst),
            MemoryWidth::Untyped => self
                .platform
                .copy_from(mem.addr(), dst)
                .map_err(|err| untyped_fault(mem, AccessOp::ReadBlock, err)),
        }
    }

    /// Copies `src`, which must be exactly `byte_count` long, over the whole range.
    pub fn write_block(&self, mem: &VerifiedMemory, src: &[u8]) -> Result<()> {
        let width = self.built(mem.width())?;
        check_len(mem, AccessOp::WriteBlock, src.len())?;
        self.check_gate(mem)?;
        match width {
            MemoryWidth::Bits8 => self.write_typed::<u8>(mem, src),
            MemoryWidth::Bits16 => self.write_typed::<u16>(mem, src),
            MemoryWidth::Bits32 => self.write_typed::<u32>(mem, src),
            MemoryWidth::Untyped => {
                let result = match mem.mem_type() {
                    MemoryType::Durable => self.platform.eeprom_copy_to(mem.addr(), src),
                    _ => self.platform.copy_to(mem.addr(), src),
                };
                result.map_err(|err| untyped_fault(mem, AccessOp::WriteBlock, err))
            }
        }
    }

    fn built(&self, width: MemoryWidth) -> Result<MemoryWidth> {
        if self.widths.contains(WidthSet::from_width(width)) {
            Ok(width)
        } else {
            Err(MemError::WidthNotBuilt(width))
        }
    }

    fn check_gate(&self, mem: &VerifiedMemory) -> Result<()> {
        if mem.mem_type() == MemoryType::Durable && !self.gate.is_enabled() {
            return Err(MemError::DurableWriteDisabled { addr: mem.addr() });
        }
        Ok(())
    }

    fn peek_typed<T: Element>(&self, mem: &VerifiedMemory) -> Result<u32> {
        T::read(&*self.platform, mem.addr())
            .map(T::to_word)
            .map_err(|_| element_fault(mem, AccessOp::Peek, 0))
    }

    fn store<T: Element>(&self, mem: &VerifiedMemory, op: AccessOp, index: u32, value: T) -> Result<()> {
        let addr = mem.addr() + u64::from(index) * T::BYTES as u64;
        let result = match mem.mem_type() {
            MemoryType::Durable => T::eeprom_write(&*self.platform, addr, value),
            _ => T::write(&*self.platform, addr, value),
        };
        result.map_err(|_| element_fault(mem, op, index))
    }

    fn fill_typed<T: Element>(&self, mem: &VerifiedMemory, pattern: T) -> Result<()> {
        let count = mem.byte_count() / T::BYTES as u32;
        trace!(addr = mem.addr(), count, width = %mem.width(), "fill");
        for index in 0..count {
            self.store(mem, AccessOp::Fill, index, pattern)?;
        }
        Ok(())
    }

    fn read_typed<T: Element>(&self, mem: &VerifiedMemory, dst: &mut [u8]) -> Result<()> {
        for (index, chunk) in dst.chunks_exact_mut(T::BYTES).enumerate() {
            let addr = mem.addr() + (index * T::BYTES) as u64;
            let value = T::read(&*self.platform, addr)
                .map_err(|_| element_fault(mem, AccessOp::ReadBlock, index as u32))?;
            value.write_ne_slice(chunk);
        }
        Ok(())
    }

    fn write_typed<T: Element>(&self, mem: &VerifiedMemory, src: &[u8]) -> Result<()> {
        for (index, chunk) in src.chunks_exact(T::BYTES).enumerate() {
            self.store(mem, AccessOp::WriteBlock, index as u32, T::from_ne_slice(chunk))?;
        }
        Ok(())
    }
}

fn check_len(mem: &VerifiedMemory, op: AccessOp, actual: usize) -> Result<()> {
    let expected = mem.byte_count() as usize;
    if actual != expected {
        return Err(MemError::BufferLength {
            op,
            width: mem.width(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn element_fault(mem: &VerifiedMemory, op: AccessOp, index: u32) -> MemError {
    let elem = u64::from(mem.width().element_bytes());
    MemError::AccessFault {
        op,
        addr: mem.addr() + u64::from(index) * elem,
        index,
        width: mem.width(),
    }
}

fn untyped_fault(mem: &VerifiedMemory, op: AccessOp, err: PlatformError) -> MemError {
    let addr = match err {
        PlatformError::AccessFault { addr }
            if addr >= mem.addr() && addr < mem.addr() + u64::from(mem.byte_count()) =>
        {
            addr
        }
        _ => mem.addr(),
    };
    MemError::AccessFault {
        op,
        addr,
        index: (addr - mem.addr()) as u32,
        width: MemoryWidth::Untyped,
    }
}

#[cfg(test)]
mod tests {
    use memmgr_platform::SimMemory;

    use super::*;
    use crate::{AddressSpec, AddressVerifier};

    struct Fixture {
        mem: Arc<SimMemory>,
        verifier: AddressVerifier<SimMemory>,
        accessor: WidthAccessor<SimMemory>,
        gate: DurableWriteGate,
    }

    fn fixture(widths: WidthSet) -> Fixture {
        let mut sim = SimMemory::new();
        sim.add_ram(0x1000, 0x100).unwrap();
        sim.add_eeprom(0x8000, 0x40, 1).unwrap();
        let mem = Arc::new(sim);
        let gate = DurableWriteGate::new();
        Fixture {
            verifier: AddressVerifier::new(Arc::clone(&mem), WidthSet::all()),
            accessor: WidthAccessor::new(Arc::clone(&mem), widths, gate.clone()),
            mem,
            gate,
        }
    }

    impl Fixture {
        fn verified(&self, addr: u64, ty: MemoryType, width: MemoryWidth, len: u32) -> VerifiedMemory {
            self.verifier
                .verify(&AddressSpec::absolute(addr), ty, width, len)
                .unwrap()
        }
    }

    #[test]
    fn peek_and_poke_each_width() {
        let f = fixture(WidthSet::all());
        for (width, value) in [
            (MemoryWidth::Bits8, 0xA5),
            (MemoryWidth::Bits16, 0xBEEF),
            (MemoryWidth::Bits32, 0xDEAD_BEEF),
        ] {
            let mem = f.verified(0x1010, MemoryType::Volatile, width, width.element_bytes());
            f.accessor.poke(&mem, value).unwrap();
            assert_eq!(f.accessor.peek(&mem).unwrap(), value);
        }
    }

    #[test]
    fn untyped_has_no_single_element_access() {
        let f = fixture(WidthSet::all());
        let mem = f.verified(0x1000, MemoryType::Volatile, MemoryWidth::Untyped, 1);
        assert_eq!(
            f.accessor.peek(&mem),
            Err(MemError::UnsupportedWidth {
                op: AccessOp::Peek,
                width: MemoryWidth::Untyped
            })
        );
    }

    #[test]
    fn block_fault_reports_element_index_without_rollback() {
        let f = fixture(WidthSet::all());
        f.mem.inject_fault(0x1008);
        let mem = f.verified(0x1000, MemoryType::Volatile, MemoryWidth::Bits32, 16);

        let err = f.accessor.fill_block(&mem, 0x1111_1111).unwrap_err();
        assert_eq!(
            err,
            MemError::AccessFault {
                op: AccessOp::Fill,
                addr: 0x1008,
                index: 2,
                width: MemoryWidth::Bits32
            }
        );
        f.mem.clear_faults();
        assert_eq!(
            f.mem.snapshot(0x1000, 12).unwrap(),
            [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0, 0, 0, 0]
        );
    }

    #[test]
    fn untyped_fault_index_is_byte_offset() {
        let f = fixture(WidthSet::all());
        f.mem.inject_fault(0x1005);
        let mem = f.verified(0x1000, MemoryType::Volatile, MemoryWidth::Untyped, 8);
        let mut buf = [0u8; 8];
        assert!(matches!(
            f.accessor.read_block(&mem, &mut buf),
            Err(MemError::AccessFault { index: 5, addr: 0x1005, .. })
        ));
    }

    #[test]
    fn durable_writes_require_the_gate() {
        let f = fixture(WidthSet::all());
        let mem = f.verified(0x8000, MemoryType::Durable, MemoryWidth::Bits16, 2);
        let before = f.mem.write_count();
        assert_eq!(
            f.accessor.poke(&mem, 0x1234),
            Err(MemError::DurableWriteDisabled { addr: 0x8000 })
        );
        assert_eq!(f.mem.write_count(), before);

        f.gate.set_enabled(true);
        f.mem.eeprom_write_enable(1).unwrap();
        f.accessor.poke(&mem, 0x1234).unwrap();
        assert_eq!(f.accessor.peek(&mem).unwrap(), 0x1234);

        let block = f.verified(0x8010, MemoryType::Durable, MemoryWidth::Untyped, 4);
        f.accessor.fill_block(&block, 0x5A).unwrap();
        assert_eq!(f.mem.snapshot(0x8010, 4).unwrap(), [0x5A; 4]);
    }

    #[test]
    fn excluded_width_is_reported_not_skipped() {
        let f = fixture(WidthSet::BITS8 | WidthSet::UNTYPED);
        let mem = f.verified(0x1000, MemoryType::Volatile, MemoryWidth::Bits16, 4);
        assert_eq!(
            f.accessor.fill_block(&mem, 0xFFFF),
            Err(MemError::WidthNotBuilt(MemoryWidth::Bits16))
        );
        assert_eq!(f.mem.write_count(), 0);
    }

    #[test]
    fn buffer_must_match_range() {
        let f = fixture(WidthSet::all());
        let mem = f.verified(0x1000, MemoryType::Volatile, MemoryWidth::Bits8, 4);
        assert!(matches!(
            f.accessor.write_block(&mem, &[1, 2, 3]),
            Err(MemError::BufferLength { expected: 4, actual: 3, .. })
        ));
    }
}
