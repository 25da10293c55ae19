use memmgr_platform::{PlatformError, SymbolProvider};
use tracing::debug;

use crate::{AddressSpec, MemError, Result};

/// Turns `(symbol, offset)` into an absolute address.
///
/// An empty symbol name (after bounding) means `offset` is already absolute and the symbol
/// provider is not consulted.
pub fn resolve<S>(symbols: &S, spec: &AddressSpec) -> Result<u64>
where
    S: SymbolProvider + ?Sized,
{
    let name = spec.symbol_name();
    if name.is_empty() {
        return Ok(spec.offset);
    }

    let base = symbols.lookup(name).map_err(|err| match err {
        PlatformError::SymbolNotFound(_) => MemError::SymbolNotFound {
            name: name.to_string(),
        },
        other => {
            debug!(symbol = name, error = %other, "symbol lookup failed");
            MemError::SymbolNotFound {
                name: name.to_string(),
            }
        }
    })?;

    base.checked_add(spec.offset)
        .ok_or_else(|| MemError::AddressOverflow {
            name: name.to_string(),
            base,
            offset: spec.offset,
        })
}
