//! # Address space layout
//!
//! This file defines the memory map of the machine and a few small
//! helpers for classifying an address. Nothing here has side effects;
//! the behaviour that the memory map implies (virtual-routine I/O,
//! access faults) lives in [`crate::router`].
//!
//! ## Memory map
//!
//! Address ranges are listed as `A..B`, where `A` is the first byte of
//! the region and `B` is the first byte above it.
//!
//! | Range | Size | Contents |
//! |-------|------|----------|
//! | `0x0000..0x0400` | 1024 B | instruction memory (loaded at init) |
//! | `0x0400..0x0800` | 1024 B | data memory (loaded at init) |
//! | `0x0800..0x0900` | 256 B | virtual routines (memory-mapped I/O) |
//! | `0x0900..0xB700` | — | reserved; any access is illegal |
//! | `0xB700..0xB700 + NUM_BANKS * BANK_SIZE` | 8192 B | heap |

/// Size in bytes of the instruction memory region.
pub const INST_MEM_SIZE: usize = 1024;

/// Size in bytes of the data memory region.
pub const DATA_MEM_SIZE: usize = 1024;

/// Base address of the data memory region.
pub const DATA_MEM_BASE: u32 = 0x0400;

/// Size in bytes of the virtual-routine scratch region (`virt_mem`).
pub const VIRT_MEM_SIZE: usize = 256;

/// Base address of the virtual-routine region.
pub const VIRT_MEM_BASE: u32 = 0x0800;

/// First address past the virtual-routine region.
pub const VIRT_MEM_END: u32 = 0x0900;

/// Number of 64-byte banks making up the heap.
pub const NUM_BANKS: usize = 128;

/// Size in bytes of a single heap bank.
pub const BANK_SIZE: u32 = 64;

/// Base address of the heap region.
pub const BASE_ADDR: u32 = 0xB700;

/// First address past the end of the heap region.
pub const HEAP_END: u32 = BASE_ADDR + NUM_BANKS as u32 * BANK_SIZE;

/// Number of general-purpose registers, including the hard-wired zero.
pub const NUM_REGISTERS: u8 = 32;

/// Returns true if `address` lies within the instruction memory region.
pub fn in_instruction_memory(address: u32) -> bool {
    address < DATA_MEM_BASE
}

/// Returns true if `address` lies within the data memory region.
pub fn in_data_memory(address: u32) -> bool {
    (DATA_MEM_BASE..VIRT_MEM_BASE).contains(&address)
}

/// Returns true if `address` lies within the heap region.
pub fn in_heap(address: u32) -> bool {
    (BASE_ADDR..HEAP_END).contains(&address)
}

/// Returns true if `address` is within the full addressable range the
/// machine recognizes at all (below this, everything else is either a
/// named region above or reserved space that faults).
pub fn in_addressable_range(address: u32) -> bool {
    address < HEAP_END
}
