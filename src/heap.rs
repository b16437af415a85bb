//! The bank-based heap allocator.
//!
//! The heap is an arena of fixed-size 64-byte banks. Allocation is
//! first-fit over bank *runs*, and a multi-bank allocation is tracked
//! by chaining `next_in_chunk` flags across consecutive banks rather
//! than by any pointer; `free` walks that chain to release every bank
//! in the chunk. This is a direct port of the source allocator's
//! bank-array design, with the bank's address derived from its index
//! in the arena instead of stored redundantly per bank.

use log::debug;

use crate::address_space::{BANK_SIZE, BASE_ADDR, NUM_BANKS};
use crate::error::AccessError;
use crate::memory::{read_le, write_le, Wordsize};

/// One 64-byte heap bank.
#[derive(Debug, Clone)]
struct Bank {
    data: [u8; BANK_SIZE as usize],
    allocated: bool,
    /// True if the next bank in the arena belongs to the same
    /// allocation as this one.
    next_in_chunk: bool,
}

impl Default for Bank {
    fn default() -> Self {
        Self {
            data: [0; BANK_SIZE as usize],
            allocated: false,
            next_in_chunk: false,
        }
    }
}

/// The heap: a fixed-size arena of banks plus the bookkeeping needed to
/// allocate and free runs of them.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    banks: Vec<Bank>,
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self {
            banks: (0..NUM_BANKS).map(|_| Bank::default()).collect(),
        }
    }

    fn bank_index(address: u32) -> Option<usize> {
        if address < BASE_ADDR {
            return None;
        }
        let index = ((address - BASE_ADDR) / BANK_SIZE) as usize;
        (index < NUM_BANKS).then_some(index)
    }

    /// Number of banks needed for `size` bytes. A zero-byte request
    /// still consumes one bank, matching the source allocator's "list
    /// is empty" path, which unconditionally creates a first bank
    /// before ever consulting `required_banks`.
    fn required_banks(size: u32) -> usize {
        size.div_ceil(BANK_SIZE).max(1) as usize
    }

    /// Find the first run of `count` consecutive unallocated banks.
    /// Returns the index of the first bank in the run.
    fn first_fit(&self, count: usize) -> Option<usize> {
        let mut run_start = None;
        let mut run_len = 0;
        for (i, bank) in self.banks.iter().enumerate() {
            if bank.allocated {
                run_start = None;
                run_len = 0;
                continue;
            }
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_len += 1;
            if run_len == count {
                return run_start;
            }
        }
        None
    }

    /// Allocate `size` bytes. Returns the address of the first bank on
    /// success, or 0 if the request cannot be satisfied (too large, or
    /// no run of free banks is long enough) — matching the source
    /// allocator's "return 0" failure convention, mapped at the virtual
    /// routine boundary into register 28 rather than a `Result`, since
    /// failure here is an ordinary, expected outcome rather than a
    /// fault.
    pub fn allocate(&mut self, size: u32) -> u32 {
        let count = Self::required_banks(size);
        if count > NUM_BANKS {
            debug!("allocate({size}) rejected: {count} banks exceeds {NUM_BANKS}");
            return 0;
        }
        let Some(start) = self.first_fit(count) else {
            debug!("allocate({size}) failed: no run of {count} free banks");
            return 0;
        };
        for offset in 0..count {
            let bank = &mut self.banks[start + offset];
            bank.allocated = true;
            bank.next_in_chunk = offset + 1 < count;
        }
        let address = BASE_ADDR + (start as u32) * BANK_SIZE;
        debug!("allocate({size}) -> 0x{address:08x} ({count} bank(s))");
        address
    }

    /// Free the chunk starting at `address`, which must be the address
    /// of a bank that begins an allocation. Clears every bank in the
    /// chunk and zeroes its data.
    pub fn free(&mut self, address: u32) -> Result<(), AccessError> {
        let index = Self::bank_index(address).ok_or(AccessError::FreeFailure(address))?;
        if !self.banks[index].allocated {
            return Err(AccessError::FreeFailure(address));
        }
        let mut i = index;
        loop {
            let bank = &mut self.banks[i];
            let chained = bank.next_in_chunk;
            bank.allocated = false;
            bank.next_in_chunk = false;
            bank.data = [0; BANK_SIZE as usize];
            if !chained {
                break;
            }
            i += 1;
        }
        debug!("free(0x{address:08x}) released {} bank(s)", i - index + 1);
        Ok(())
    }

    fn resolve(&self, address: u32) -> Result<usize, AccessError> {
        let index = Self::bank_index(address).ok_or(AccessError::OutOfRange(address))?;
        if !self.banks[index].allocated {
            return Err(AccessError::UnallocatedBank(address));
        }
        Ok(index)
    }

    /// Load `size` bytes at `address`, allowing a load to straddle two
    /// consecutive banks of the same allocation.
    pub fn load(&self, address: u32, size: Wordsize) -> Result<u32, AccessError> {
        let index = self.resolve(address)?;
        let within = ((address - BASE_ADDR) % BANK_SIZE) as usize;
        let span = match size {
            Wordsize::Byte => 1,
            Wordsize::Halfword => 2,
            Wordsize::Word => 4,
        };
        if within + span <= BANK_SIZE as usize {
            return Ok(read_le(&self.banks[index].data, within, size));
        }
        let mut bytes = [0u8; 4];
        for (i, slot) in bytes.iter_mut().enumerate().take(span) {
            *slot = self.byte_at(index, within + i)?;
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Store `size` bytes of `value` at `address`, allowing a store to
    /// straddle two consecutive banks of the same allocation (low byte
    /// at the lower address, high byte at the next, per the intended,
    /// non-buggy straddling behaviour).
    pub fn store(&mut self, address: u32, size: Wordsize, value: u32) -> Result<(), AccessError> {
        let index = self.resolve(address)?;
        let within = ((address - BASE_ADDR) % BANK_SIZE) as usize;
        let span = match size {
            Wordsize::Byte => 1,
            Wordsize::Halfword => 2,
            Wordsize::Word => 4,
        };
        if within + span <= BANK_SIZE as usize {
            write_le(&mut self.banks[index].data, within, size, value);
            return Ok(());
        }
        let bytes = value.to_le_bytes();
        for i in 0..span {
            self.set_byte_at(index, within + i, bytes[i])?;
        }
        Ok(())
    }

    fn byte_at(&self, index: usize, within: usize) -> Result<u8, AccessError> {
        if within < BANK_SIZE as usize {
            return Ok(self.banks[index].data[within]);
        }
        let next = index + 1;
        if next >= self.banks.len() || !self.banks[index].next_in_chunk {
            let address = BASE_ADDR + (index as u32) * BANK_SIZE + within as u32;
            return Err(AccessError::UnallocatedBank(address));
        }
        Ok(self.banks[next].data[within - BANK_SIZE as usize])
    }

    fn set_byte_at(&mut self, index: usize, within: usize, value: u8) -> Result<(), AccessError> {
        if within < BANK_SIZE as usize {
            self.banks[index].data[within] = value;
            return Ok(());
        }
        let next = index + 1;
        if next >= self.banks.len() || !self.banks[index].next_in_chunk {
            let address = BASE_ADDR + (index as u32) * BANK_SIZE + within as u32;
            return Err(AccessError::UnallocatedBank(address));
        }
        self.banks[next].data[within - BANK_SIZE as usize] = value;
        Ok(())
    }

    /// True if `address` names a bank (not necessarily allocated) that
    /// exists in the heap arena.
    pub fn contains(address: u32) -> bool {
        Self::bank_index(address).is_some()
    }
}
