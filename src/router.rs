//! The memory-mapped address-space router.
//!
//! Every load/store effective address passes through [`route`] before
//! the executor dispatches the concrete op. The router either performs
//! a virtual-routine side effect itself (console output, heap
//! management, stdin reads) and reports the op as handled, reports a
//! halt request, reclassifies the access to a different backing store
//! (instruction memory, the heap, or the virtual-routine scratch
//! buffer left behind by a read routine), or rejects the address as
//! illegal. This is the one place spec.md's virtual-routine table and
//! access-validation rules live; [`crate::executor`] never inspects an
//! address itself.

use std::io::{BufRead, Write};

use crate::address_space::{
    in_addressable_range, in_heap, in_instruction_memory, VIRT_MEM_BASE, VIRT_MEM_END,
};
use crate::console::Console;
use crate::error::{AccessError, Fault};
use crate::heap::HeapAllocator;
use crate::memory::DataMemory;
use crate::registers::RegisterFile;

const ROUTINE_PUTCHAR: u32 = 0x0800;
const ROUTINE_PUTDEC: u32 = 0x0804;
const ROUTINE_PUTHEX: u32 = 0x0808;
const ROUTINE_HALT: u32 = 0x080C;
const ROUTINE_GETCHAR: u32 = 0x0812;
const ROUTINE_GETDEC: u32 = 0x0816;
const ROUTINE_DUMP_PC: u32 = 0x0820;
const ROUTINE_DUMP_REGS: u32 = 0x0824;
const ROUTINE_DUMP_MEM: u32 = 0x0828;
const ROUTINE_HEAP_ALLOC: u32 = 0x0830;
const ROUTINE_HEAP_FREE: u32 = 0x0834;

/// Register that `0x0830` (heap allocate) writes its result into.
const ALLOC_RESULT_REGISTER: u8 = 28;

/// Where a load/store's effective address should actually be serviced,
/// once the router has classified it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    DataMemory,
    InstructionMemory,
    Heap,
    /// The 256-byte virtual-routine scratch buffer, used only to read
    /// back the byte/word a `0x0812`/`0x0816` read routine just wrote.
    VirtualScratch,
}

/// What the executor should do after consulting the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The router fully performed the access; the executor should not
    /// dispatch the load/store itself.
    Handled,
    /// A halt (`0x080C`) was requested.
    Halt,
    /// The executor should service the original load/store against
    /// `Target` instead of the address's nominal region.
    Redirect(Target),
}

/// Everything the router needs to perform a virtual-routine side
/// effect: the current PC, the register file (read for the dump
/// routine, written for the allocator result), the two memory images,
/// the heap, the console, the scratch buffer, a handle to standard
/// input for the two read routines, and a handle to real standard
/// output the console is eagerly drained into before either read
/// routine blocks (see [`flush_console_before_blocking_read`]).
pub struct RouterContext<'a> {
    pub pc: u32,
    pub registers: &'a mut RegisterFile,
    pub data_mem: &'a DataMemory,
    pub heap: &'a mut HeapAllocator,
    pub console: &'a mut Console,
    pub virt_mem: &'a mut [u8; crate::address_space::VIRT_MEM_SIZE],
    pub stdin: &'a mut dyn BufRead,
    pub stdout: &'a mut dyn Write,
}

/// Classify and, where applicable, service a load/store at `address`.
/// `rs2_value` is the value of the store's source register (or the
/// decoded `rs2` field's register value for a load; the virtual
/// routines that read it are only ever reached by stores in practice).
pub fn route(
    ctx: &mut RouterContext,
    address: u32,
    rs2_value: i32,
    is_store: bool,
) -> Result<RouteOutcome, Fault> {
    if !in_addressable_range(address) {
        return Err(Fault::Access(AccessError::OutOfRange(address)));
    }

    if let Some(outcome) = route_virtual_routine(ctx, address, rs2_value)? {
        return Ok(outcome);
    }

    if (VIRT_MEM_BASE..VIRT_MEM_END).contains(&address) {
        return Err(Fault::Access(AccessError::UndefinedRoutine(address)));
    }

    if is_store && in_instruction_memory(address) {
        return Err(Fault::Access(AccessError::StoreToInstructionMemory(
            address,
        )));
    }

    if in_instruction_memory(address) {
        return Ok(RouteOutcome::Redirect(Target::InstructionMemory));
    }

    if in_heap(address) {
        return Ok(RouteOutcome::Redirect(Target::Heap));
    }

    Ok(RouteOutcome::Redirect(Target::DataMemory))
}

/// Returns `Some` if `address` names one of the defined `0x0800..0x0900`
/// virtual routines, having already performed its side effect.
fn route_virtual_routine(
    ctx: &mut RouterContext,
    address: u32,
    rs2_value: i32,
) -> Result<Option<RouteOutcome>, Fault> {
    let outcome = match address {
        ROUTINE_PUTCHAR => {
            ctx.console.write_char(rs2_value as u8 as char);
            RouteOutcome::Handled
        }
        ROUTINE_PUTDEC => {
            ctx.console.write_signed_decimal(rs2_value);
            RouteOutcome::Handled
        }
        ROUTINE_PUTHEX => {
            ctx.console.write_hex(rs2_value as u32);
            RouteOutcome::Handled
        }
        ROUTINE_HALT => RouteOutcome::Halt,
        ROUTINE_GETCHAR => {
            flush_console_before_blocking_read(ctx);
            let byte = read_one_byte(ctx.stdin);
            ctx.virt_mem[0x12] = byte;
            RouteOutcome::Redirect(Target::VirtualScratch)
        }
        ROUTINE_GETDEC => {
            flush_console_before_blocking_read(ctx);
            let value = read_signed_decimal(ctx.stdin);
            ctx.virt_mem[0x16..0x16 + 4].copy_from_slice(&value.to_le_bytes());
            RouteOutcome::Redirect(Target::VirtualScratch)
        }
        ROUTINE_DUMP_PC => {
            ctx.console.write_pc_dump(ctx.pc);
            RouteOutcome::Handled
        }
        ROUTINE_DUMP_REGS => {
            for (i, value) in ctx.registers.snapshot().iter().enumerate() {
                ctx.console
                    .write_line(&format!("R[{i}] = 0x{:08x};", *value as u32));
            }
            RouteOutcome::Handled
        }
        ROUTINE_DUMP_MEM => {
            // Indexes data memory directly by the raw register value,
            // with no `-DATA_MEM_BASE` bias -- preserved verbatim, see
            // spec.md's design note on this routine.
            let word = ctx.data_mem.load_word_unbiased(rs2_value as u32);
            ctx.console.write_word_dump(word);
            ctx.virt_mem[0x28..0x28 + 4].copy_from_slice(&word.to_le_bytes());
            RouteOutcome::Handled
        }
        ROUTINE_HEAP_ALLOC => {
            let result = ctx.heap.allocate(rs2_value as u32);
            ctx.registers
                .set(ALLOC_RESULT_REGISTER, result as i32)
                .map_err(AccessError::from)?;
            RouteOutcome::Handled
        }
        ROUTINE_HEAP_FREE => {
            ctx.heap.free(rs2_value as u32)?;
            RouteOutcome::Handled
        }
        _ => return Ok(None),
    };
    Ok(Some(outcome))
}

/// Drain whatever the console has buffered out to real standard output
/// before `0x0812`/`0x0816` block on a read, so a program that prints
/// a prompt and then reads a response has its prompt actually visible
/// rather than held in the queue until the whole run finishes.
fn flush_console_before_blocking_read(ctx: &mut RouterContext) {
    let pending = ctx.console.flush();
    if pending.is_empty() {
        return;
    }
    let _ = ctx.stdout.write_all(pending.as_bytes());
    let _ = ctx.stdout.flush();
}

/// Read a single byte from `stdin`. Treats end-of-input as a zero
/// byte, the same forgiving convention the memory-word dump routine
/// uses for a bad index, rather than turning an exhausted input stream
/// into a fault.
fn read_one_byte(stdin: &mut dyn BufRead) -> u8 {
    let mut byte = [0u8; 1];
    match std::io::Read::read(stdin, &mut byte) {
        Ok(1) => byte[0],
        _ => 0,
    }
}

/// Read a signed decimal integer from `stdin`: the next whitespace-
/// delimited token, parsed as `i32`. An unparsable or exhausted token
/// reads as zero.
fn read_signed_decimal(stdin: &mut dyn BufRead) -> i32 {
    let mut token = String::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(stdin, &mut byte) {
            Ok(1) => {
                let c = byte[0] as char;
                if c.is_whitespace() {
                    if token.is_empty() {
                        continue;
                    }
                    break;
                }
                token.push(c);
            }
            _ => break,
        }
    }
    token.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::VIRT_MEM_SIZE;

    #[allow(clippy::too_many_arguments)]
    fn context<'a>(
        pc: u32,
        registers: &'a mut RegisterFile,
        data_mem: &'a DataMemory,
        heap: &'a mut HeapAllocator,
        console: &'a mut Console,
        virt_mem: &'a mut [u8; VIRT_MEM_SIZE],
        stdin: &'a mut dyn BufRead,
        stdout: &'a mut dyn Write,
    ) -> RouterContext<'a> {
        RouterContext {
            pc,
            registers,
            data_mem,
            heap,
            console,
            virt_mem,
            stdin,
            stdout,
        }
    }

    #[test]
    fn putchar_routine_is_handled_and_writes_console() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        let outcome = route(&mut ctx, 0x0800, b'A' as i32, true).unwrap();
        assert_eq!(outcome, RouteOutcome::Handled);
        assert_eq!(console.flush(), "A");
    }

    #[test]
    fn halt_routine_signals_halt() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert_eq!(route(&mut ctx, 0x080C, 0, true).unwrap(), RouteOutcome::Halt);
    }

    #[test]
    fn undefined_routine_slot_is_illegal() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert!(route(&mut ctx, 0x0840, 0, true).is_err());
    }

    #[test]
    fn reserved_region_is_illegal() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert!(route(&mut ctx, 0x1000, 0, false).is_err());
    }

    #[test]
    fn store_to_instruction_memory_is_illegal() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert!(route(&mut ctx, 0x0100, 0, true).is_err());
    }

    #[test]
    fn load_from_instruction_memory_redirects() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert_eq!(
            route(&mut ctx, 0x0100, 0, false).unwrap(),
            RouteOutcome::Redirect(Target::InstructionMemory)
        );
    }

    #[test]
    fn heap_alloc_routine_writes_register_28() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        route(&mut ctx, 0x0830, 100, true).unwrap();
        assert_ne!(registers.get(28).unwrap(), 0);
    }

    #[test]
    fn heap_free_of_unallocated_address_is_illegal() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin = std::io::empty();
        let mut reader = std::io::BufReader::new(&mut stdin);
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut reader,
            &mut stdout,
        );
        assert!(route(&mut ctx, 0x0834, 0xB700, true).is_err());
    }

    #[test]
    fn getchar_routine_stages_byte_in_scratch_and_redirects() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin: &[u8] = b"Q";
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut stdin,
            &mut stdout,
        );
        let outcome = route(&mut ctx, 0x0812, 0, false).unwrap();
        assert_eq!(outcome, RouteOutcome::Redirect(Target::VirtualScratch));
        assert_eq!(virt_mem[0x12], b'Q');
    }

    #[test]
    fn getchar_routine_flushes_pending_console_output_first() {
        let mut registers = RegisterFile::new();
        let data_mem = DataMemory::new(Box::new([0u8; 1024]));
        let mut heap = HeapAllocator::new();
        let mut console = Console::new();
        console.write_char('>');
        let mut virt_mem = [0u8; VIRT_MEM_SIZE];
        let mut stdin: &[u8] = b"Q";
        let mut stdout = Vec::new();
        let mut ctx = context(
            0, &mut registers, &data_mem, &mut heap, &mut console, &mut virt_mem, &mut stdin,
            &mut stdout,
        );
        route(&mut ctx, 0x0812, 0, false).unwrap();
        assert_eq!(stdout, b">");
        assert!(console.is_empty());
    }
}
