//! Buffered console output.
//!
//! Virtual routines don't print directly; they push characters onto a
//! queue that the caller drains once execution stops (or, for the
//! blocking read routines, eagerly just before they'd block — see
//! [`crate::router`]), the same way the teacher buffers UART output
//! rather than writing straight to stdout from deep inside instruction
//! dispatch.

use queues::{IsQueue, Queue};

/// A FIFO character buffer fed by the virtual routines and drained by
/// the binary once [`crate::executor::Machine::run`] returns.
#[derive(Debug)]
pub struct Console {
    buffer: Queue<char>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            buffer: Queue::new(),
        }
    }

    fn push(&mut self, c: char) {
        // `Queue::add` only fails when the queue has a fixed capacity;
        // this one doesn't, so the error case can't occur.
        let _ = self.buffer.add(c);
    }

    fn push_str(&mut self, s: &str) {
        for c in s.chars() {
            self.push(c);
        }
    }

    /// Write a single character (the `0x0800` virtual routine).
    pub fn write_char(&mut self, c: char) {
        self.push(c);
    }

    /// Write a signed decimal integer (the `0x0804` virtual routine).
    pub fn write_signed_decimal(&mut self, value: i32) {
        self.push_str(&value.to_string());
    }

    /// Write a lowercase hexadecimal integer, no `0x` prefix or leading
    /// zero padding (the `0x0808` virtual routine).
    pub fn write_hex(&mut self, value: u32) {
        self.push_str(&format!("{value:x}"));
    }

    /// Write the program counter as an 8-digit lowercase hex value
    /// followed by a newline (the `0x0820` virtual routine).
    pub fn write_pc_dump(&mut self, pc: u32) {
        self.push_str(&format!("{pc:08x}\n"));
    }

    /// Write a 32-bit word as 8-digit lowercase hex followed by a
    /// newline (the `0x0828` virtual routine).
    pub fn write_word_dump(&mut self, value: u32) {
        self.push_str(&format!("{value:08x}\n"));
    }

    /// Write an arbitrary diagnostic line verbatim, followed by a
    /// newline. Used for the halt message and the fault header.
    pub fn write_line(&mut self, line: &str) {
        self.push_str(line);
        self.push('\n');
    }

    /// Drain the buffer into a `String`, in FIFO order, leaving the
    /// buffer empty.
    pub fn flush(&mut self) -> String {
        let mut out = String::new();
        while let Ok(c) = self.buffer.remove() {
            out.push(c);
        }
        out
    }

    /// True if nothing has been written since the last flush.
    pub fn is_empty(&self) -> bool {
        self.buffer.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_drain_in_order() {
        let mut console = Console::new();
        console.write_char('a');
        console.write_signed_decimal(-7);
        console.write_hex(0xFF);
        assert_eq!(console.flush(), "a-7ff");
    }

    #[test]
    fn pc_dump_is_zero_padded_hex_with_newline() {
        let mut console = Console::new();
        console.write_pc_dump(0x2c);
        assert_eq!(console.flush(), "0000002c\n");
    }

    #[test]
    fn flush_empties_the_buffer() {
        let mut console = Console::new();
        console.write_char('x');
        console.flush();
        assert!(console.is_empty());
    }
}
