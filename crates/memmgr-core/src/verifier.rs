use std::sync::Arc;

use memmgr_platform::MemoryProvider;
use tracing::debug;

use crate::{
    resolve, AddressSpec, MemError, MemoryType, MemoryWidth, RangeFault, Result, TargetPlatform,
    WidthSet,
};

/// An address range that passed resolution, type mapping and range/alignment checks.
///
/// Only [`AddressVerifier::verify`] creates one, and [`VerifiedMemory::subrange`] narrows one
/// without leaving the checked range or breaking element alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMemory {
    addr: u64,
    mem_type: MemoryType,
    width: MemoryWidth,
    byte_count: u32,
}

impl VerifiedMemory {
    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn mem_type(&self) -> MemoryType {
        self.mem_type
    }

    pub fn type_label(&self) -> &'static str {
        self.mem_type.label()
    }

    pub fn width(&self) -> MemoryWidth {
        self.width
    }

    pub fn byte_count(&self) -> u32 {
        self.byte_count
    }

    /// `[offset, offset + len)` of this range.
    ///
    /// Returns `None` if the window is empty, escapes the range or splits an element.
    pub fn subrange(&self, offset: u32, len: u32) -> Option<VerifiedMemory> {
        let elem = self.width.element_bytes();
        let end = offset.checked_add(len)?;
        if len == 0 || end > self.byte_count || offset % elem != 0 || len % elem != 0 {
            return None;
        }
        Some(VerifiedMemory {
            addr: self.addr + u64::from(offset),
            byte_count: len,
            ..self.clone()
        })
    }

    /// Like [`VerifiedMemory::subrange`], but a rejected window is a range error.
    pub fn window(&self, offset: u32, len: u32) -> Result<VerifiedMemory> {
        self.subrange(offset, len).ok_or(MemError::RangeOrAlignment {
            addr: self.addr + u64::from(offset),
            width: self.width,
            mem_type: self.mem_type,
            byte_count: len,
            reason: RangeFault::OutOfRange,
        })
    }
}

/// Confirms an address range is legal for a width and memory type before any access.
pub struct AddressVerifier<P: ?Sized> {
    platform: Arc<P>,
    widths: WidthSet,
}

impl<P: ?Sized> Clone for AddressVerifier<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            widths: self.widths,
        }
    }
}

impl<P: TargetPlatform + ?Sized> AddressVerifier<P> {
    pub fn new(platform: Arc<P>, widths: WidthSet) -> Self {
        Self { platform, widths }
    }

    pub fn verify(
        &self,
        spec: &AddressSpec,
        mem_type: MemoryType,
        width: MemoryWidth,
        byte_count: u32,
    ) -> Result<VerifiedMemory> {
        let addr = resolve(&*self.platform, spec)?;
        let kind = mem_type
            .platform_kind()
            .ok_or(MemError::InvalidMemoryType(mem_type))?;
        if !self.widths.contains(WidthSet::from_width(width)) {
            return Err(MemError::WidthNotBuilt(width));
        }

        let fault = |reason| MemError::RangeOrAlignment {
            addr,
            width,
            mem_type,
            byte_count,
            reason,
        };

        let elem = width.element_bytes();
        if addr % u64::from(elem) != 0 {
            return Err(fault(RangeFault::Misaligned));
        }
        if byte_count % elem != 0 {
            return Err(fault(RangeFault::PartialElement));
        }
        if byte_count == 0 {
            return Err(fault(RangeFault::OutOfRange));
        }
        MemoryProvider::validate_range(&*self.platform, addr, u64::from(byte_count), kind)
            .map_err(|err| {
                debug!(addr, byte_count, %kind, error = %err, "range validation failed");
                fault(RangeFault::OutOfRange)
            })?;

        Ok(VerifiedMemory {
            addr,
            mem_type,
            width,
            byte_count,
        })
    }
}
