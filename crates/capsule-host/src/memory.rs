//! Bounds-checked guest memory IO.
//!
//! Used by the executor's linear-memory payload mode to move serialized
//! payloads and results across the boundary.

use wasmtime::{Memory, StoreContext, StoreContextMut};

use crate::error::{HostError, HostResult};

/// Read `len` bytes from guest memory at `offset`.
pub fn read_bytes<'a, T: 'static>(
    memory: &Memory,
    store: impl Into<StoreContext<'a, T>>,
    offset: usize,
    len: usize,
) -> HostResult<Vec<u8>> {
    let data = memory.data(store.into());
    let end = offset
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or(HostError::OutOfBounds {
            offset,
            len,
            size: data.len(),
        })?;

    Ok(data[offset..end].to_vec())
}

/// Write `bytes` into guest memory at `offset`.
pub fn write_bytes<'a, T: 'static>(
    memory: &Memory,
    store: impl Into<StoreContextMut<'a, T>>,
    offset: usize,
    bytes: &[u8],
) -> HostResult<()> {
    let data = memory.data_mut(store.into());
    let end = offset
        .checked_add(bytes.len())
        .filter(|&end| end <= data.len())
        .ok_or(HostError::OutOfBounds {
            offset,
            len: bytes.len(),
            size: data.len(),
        })?;

    data[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, MemoryType, Store};

    fn memory_fixture() -> (Store<()>, Memory) {
        let engine = Engine::default();
        let mut store = Store::new(&engine, ());
        let memory = Memory::new(&mut store, MemoryType::new(1, Some(1))).unwrap();
        (store, memory)
    }

    #[test]
    fn test_write_then_read() {
        let (mut store, memory) = memory_fixture();

        write_bytes(&memory, &mut store, 128, b"capsule").unwrap();
        let back = read_bytes(&memory, &store, 128, 7).unwrap();
        assert_eq!(back, b"capsule");
    }

    #[test]
    fn test_read_past_end_fails() {
        let (store, memory) = memory_fixture();
        let err = read_bytes(&memory, &store, 65_530, 16).unwrap_err();
        assert!(matches!(err, HostError::OutOfBounds { .. }));
    }

    #[test]
    fn test_write_past_end_fails() {
        let (mut store, memory) = memory_fixture();
        let err = write_bytes(&memory, &mut store, 65_535, &[1, 2]).unwrap_err();
        assert!(matches!(err, HostError::OutOfBounds { .. }));
    }

    #[test]
    fn test_offset_overflow_fails() {
        let (store, memory) = memory_fixture();
        let err = read_bytes(&memory, &store, usize::MAX, 2).unwrap_err();
        assert!(matches!(err, HostError::OutOfBounds { .. }));
    }

    #[test]
    fn test_zero_length_edges() {
        let (mut store, memory) = memory_fixture();
        write_bytes(&memory, &mut store, 65_536, &[]).unwrap();
        assert!(read_bytes(&memory, &store, 65_536, 0).unwrap().is_empty());
    }
}
