//! Arithmetic, logical, comparison, and control-flow operations.
//!
//! These are the pure, side-effect-free halves of instruction
//! execution: given already-fetched register values and an immediate,
//! compute a result or a branch decision. Memory access and the
//! program counter update live in [`crate::executor`], which calls
//! into here once the operands are in hand.

use crate::decode::Operation;

/// Result of executing an ALU, comparison, or `lui` operation: the
/// value to write back to `rd`.
pub fn alu(operation: Operation, rs1: i32, rs2: i32, imm: i32) -> i32 {
    match operation {
        Operation::Add => rs1.wrapping_add(rs2),
        Operation::Addi => rs1.wrapping_add(imm),
        Operation::Sub => rs1.wrapping_sub(rs2),
        Operation::Lui => imm,
        Operation::Xor => rs1 ^ rs2,
        Operation::Xori => rs1 ^ imm,
        Operation::Or => rs1 | rs2,
        Operation::Ori => rs1 | imm,
        Operation::And => rs1 & rs2,
        Operation::Andi => rs1 & imm,
        Operation::Sll => rs1.wrapping_shl((rs2 & 0x1f) as u32),
        Operation::Srl => ((rs1 as u32).wrapping_shr((rs2 & 0x1f) as u32)) as i32,
        Operation::Sra => rs1.wrapping_shr((rs2 & 0x1f) as u32),
        Operation::Slt => i32::from(rs1 < rs2),
        Operation::Slti => i32::from(rs1 < imm),
        Operation::Sltu => i32::from((rs1 as u32) < (rs2 as u32)),
        Operation::Sltiu => i32::from((rs1 as u32) < (imm as u32)),
        _ => 0,
    }
}

/// Returns true if a branch operation's condition holds for the given
/// operand values. Not meaningful for any other [`Operation`].
pub fn branch_taken(operation: Operation, rs1: i32, rs2: i32) -> bool {
    match operation {
        Operation::Beq => rs1 == rs2,
        Operation::Bne => rs1 != rs2,
        Operation::Blt => rs1 < rs2,
        Operation::Bge => rs1 >= rs2,
        Operation::Bltu => (rs1 as u32) < (rs2 as u32),
        Operation::Bgeu => (rs1 as u32) >= (rs2 as u32),
        _ => false,
    }
}

/// The PC value a taken branch or `jal` should set, already compensated
/// for the unconditional `+4` the executor applies after dispatch
/// (spec.md's "PC <- PC + imm - 4").
pub fn branch_target(pc: u32, imm: i32) -> u32 {
    pc.wrapping_add(imm as u32).wrapping_sub(4)
}

/// The PC value `jalr` should set: `(rs1 + imm) - 4`, compensated the
/// same way as [`branch_target`]. This is deliberately *not* based on
/// `pc`: `jalr`'s destination is register-relative, even though its
/// target-range validation in the executor checks `pc + imm` against
/// instruction memory, per spec.md's preserved quirk.
pub fn jalr_target(rs1: i32, imm: i32) -> u32 {
    (rs1 as u32).wrapping_add(imm as u32).wrapping_sub(4)
}

/// The value `jal`/`jalr` write back to `rd`: the address of the
/// instruction after this one.
pub fn link_value(pc: u32) -> i32 {
    pc.wrapping_add(4) as i32
}

#[cfg(test)]
mod control_flow_tests {
    use super::*;

    #[test]
    fn branch_target_compensates_for_post_dispatch_increment() {
        // A branch at pc=8 with imm=16 should land at pc=24, so after
        // the executor's unconditional +4 the next fetch is at 24.
        assert_eq!(branch_target(8, 16).wrapping_add(4), 24);
    }

    #[test]
    fn jalr_target_ignores_pc() {
        assert_eq!(jalr_target(100, 8).wrapping_add(4), 108);
    }

    #[test]
    fn link_value_is_instruction_after_this_one() {
        assert_eq!(link_value(12), 16);
    }
}
