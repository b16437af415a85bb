//! Instruction decoding.
//!
//! Turns a 32-bit instruction word into a [`Decoded`] record: the
//! register fields, the sign-extended immediate (format-dependent), and
//! an [`Operation`] tag classifying the instruction. This collapses the
//! source's numeric operation tags (1..33, plus its 100/114../400/414..
//! reclassification codes) into a single algebraic type; the
//! reclassification step itself is modeled separately, as
//! [`crate::router::Target`], since it is something the router
//! computes from an already-decoded memory operation rather than
//! something the decoder can know in advance.

use crate::utils::{extract_field, sign_extend};

/// The classification of a decoded instruction. `Unknown` stands for
/// any opcode/funct3/funct7 combination not in the supported set; the
/// executor turns it into a fatal decode fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Addi,
    Sub,
    Lui,
    Xor,
    Xori,
    Or,
    Ori,
    And,
    Andi,
    Sll,
    Srl,
    Sra,
    Lb,
    Lh,
    Lw,
    Lbu,
    Lhu,
    Sb,
    Sh,
    Sw,
    Slt,
    Slti,
    Sltu,
    Sltiu,
    Beq,
    Bne,
    Blt,
    Bltu,
    Bge,
    Bgeu,
    Jal,
    Jalr,
    Unknown,
}

impl Operation {
    /// True for the load/store family, which the executor routes
    /// through [`crate::router`] before dispatch.
    pub fn is_memory_access(self) -> bool {
        matches!(
            self,
            Operation::Lb
                | Operation::Lh
                | Operation::Lw
                | Operation::Lbu
                | Operation::Lhu
                | Operation::Sb
                | Operation::Sh
                | Operation::Sw
        )
    }

    /// True for the branch/jump family, which the executor validates
    /// the target of before dispatch.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Operation::Beq
                | Operation::Bne
                | Operation::Blt
                | Operation::Bltu
                | Operation::Bge
                | Operation::Bgeu
                | Operation::Jal
                | Operation::Jalr
        )
    }

    /// True for stores, used by the router to reject a store targeting
    /// instruction memory.
    pub fn is_store(self) -> bool {
        matches!(self, Operation::Sb | Operation::Sh | Operation::Sw)
    }
}

/// A decoded instruction: register fields, sign-extended immediate, and
/// operation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub operation: Operation,
    pub imm: i32,
}

fn opcode(instr: u32) -> u32 {
    extract_field(instr, 6, 0)
}

fn rd(instr: u32) -> u8 {
    extract_field(instr, 11, 7) as u8
}

fn funct3(instr: u32) -> u32 {
    extract_field(instr, 14, 12)
}

fn rs1(instr: u32) -> u8 {
    extract_field(instr, 19, 15) as u8
}

fn rs2(instr: u32) -> u8 {
    extract_field(instr, 24, 20) as u8
}

fn funct7(instr: u32) -> u32 {
    extract_field(instr, 31, 25)
}

/// Maps opcode/funct3/funct7 to an [`Operation`], per spec.md's
/// decode table. Returns `Operation::Unknown` for anything not listed
/// there.
fn classify(instr: u32) -> Operation {
    let op = opcode(instr);
    let f3 = funct3(instr);
    let f7 = funct7(instr);
    match op {
        0b0110011 => match f3 {
            0b000 if f7 == 0b0000000 => Operation::Add,
            0b000 if f7 == 0b0100000 => Operation::Sub,
            0b100 => Operation::Xor,
            0b110 => Operation::Or,
            0b111 => Operation::And,
            0b001 => Operation::Sll,
            0b101 if f7 == 0b0000000 => Operation::Srl,
            0b101 if f7 == 0b0100000 => Operation::Sra,
            0b010 => Operation::Slt,
            0b011 => Operation::Sltu,
            _ => Operation::Unknown,
        },
        0b0010011 => match f3 {
            0b000 => Operation::Addi,
            0b100 => Operation::Xori,
            0b110 => Operation::Ori,
            0b111 => Operation::Andi,
            0b010 => Operation::Slti,
            0b011 => Operation::Sltiu,
            _ => Operation::Unknown,
        },
        0b0000011 => match f3 {
            0b000 => Operation::Lb,
            0b001 => Operation::Lh,
            0b010 => Operation::Lw,
            0b100 => Operation::Lbu,
            0b101 => Operation::Lhu,
            _ => Operation::Unknown,
        },
        0b0100011 => match f3 {
            0b000 => Operation::Sb,
            0b001 => Operation::Sh,
            0b010 => Operation::Sw,
            _ => Operation::Unknown,
        },
        0b1100011 => match f3 {
            0b000 => Operation::Beq,
            0b001 => Operation::Bne,
            0b100 => Operation::Blt,
            0b110 => Operation::Bltu,
            0b101 => Operation::Bge,
            0b111 => Operation::Bgeu,
            _ => Operation::Unknown,
        },
        0b0110111 => Operation::Lui,
        0b1101111 => Operation::Jal,
        0b1100111 => Operation::Jalr,
        _ => Operation::Unknown,
    }
}

fn imm_itype(instr: u32) -> i32 {
    sign_extend(extract_field(instr, 31, 20), 11)
}

fn imm_stype(instr: u32) -> i32 {
    let imm11_5 = extract_field(instr, 31, 25);
    let imm4_0 = extract_field(instr, 11, 7);
    sign_extend((imm11_5 << 5) | imm4_0, 11)
}

fn imm_btype(instr: u32) -> i32 {
    let imm12 = extract_field(instr, 31, 31);
    let imm11 = extract_field(instr, 7, 7);
    let imm10_5 = extract_field(instr, 30, 25);
    let imm4_1 = extract_field(instr, 11, 8);
    let imm = (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1);
    sign_extend(imm, 12)
}

fn imm_utype(instr: u32) -> i32 {
    (instr & 0xffff_f000) as i32
}

fn imm_jtype(instr: u32) -> i32 {
    let imm20 = extract_field(instr, 31, 31);
    let imm19_12 = extract_field(instr, 19, 12);
    let imm11 = extract_field(instr, 20, 20);
    let imm10_1 = extract_field(instr, 30, 21);
    let imm = (imm20 << 20) | (imm19_12 << 12) | (imm11 << 11) | (imm10_1 << 1);
    sign_extend(imm, 20)
}

fn immediate(instr: u32, operation: Operation) -> i32 {
    match operation {
        Operation::Addi
        | Operation::Xori
        | Operation::Ori
        | Operation::Andi
        | Operation::Slti
        | Operation::Sltiu
        | Operation::Lb
        | Operation::Lh
        | Operation::Lw
        | Operation::Lbu
        | Operation::Lhu
        | Operation::Jalr => imm_itype(instr),
        Operation::Sb | Operation::Sh | Operation::Sw => imm_stype(instr),
        Operation::Beq
        | Operation::Bne
        | Operation::Blt
        | Operation::Bltu
        | Operation::Bge
        | Operation::Bgeu => imm_btype(instr),
        Operation::Lui => imm_utype(instr),
        Operation::Jal => imm_jtype(instr),
        Operation::Add
        | Operation::Sub
        | Operation::Xor
        | Operation::Or
        | Operation::And
        | Operation::Sll
        | Operation::Srl
        | Operation::Sra
        | Operation::Slt
        | Operation::Sltu => 0,
        Operation::Unknown => 0,
    }
}

/// Decode a single 32-bit instruction word.
pub fn decode(instr: u32) -> Decoded {
    let operation = classify(instr);
    Decoded {
        rd: rd(instr),
        rs1: rs1(instr),
        rs2: rs2(instr),
        operation,
        imm: immediate(instr, operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_addi() {
        // addi x5, x0, 42
        let instr = 0x02A0_0293;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Addi);
        assert_eq!(decoded.rd, 5);
        assert_eq!(decoded.rs1, 0);
        assert_eq!(decoded.imm, 42);
    }

    #[test]
    fn decodes_add() {
        // add x1, x2, x3
        let instr = (0b0000000 << 25) | (3 << 20) | (2 << 15) | (0b000 << 12) | (1 << 7) | 0b0110011;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Add);
        assert_eq!(decoded.rd, 1);
        assert_eq!(decoded.rs1, 2);
        assert_eq!(decoded.rs2, 3);
        assert_eq!(decoded.imm, 0);
    }

    #[test]
    fn decodes_sub_vs_add_by_funct7() {
        let add = (0b0000000 << 25) | (0b000 << 12) | 0b0110011;
        let sub = (0b0100000 << 25) | (0b000 << 12) | 0b0110011;
        assert_eq!(decode(add).operation, Operation::Add);
        assert_eq!(decode(sub).operation, Operation::Sub);
    }

    #[test]
    fn decodes_sw_immediate_sign_extended() {
        // sw x1, -4(x2): imm = -4
        let imm: u32 = (-4i32) as u32 & 0xfff;
        let imm11_5 = (imm >> 5) & 0x7f;
        let imm4_0 = imm & 0x1f;
        let instr = (imm11_5 << 25) | (1 << 20) | (2 << 15) | (0b010 << 12) | (imm4_0 << 7) | 0b0100011;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Sw);
        assert_eq!(decoded.imm, -4);
        assert_eq!(decoded.rs1, 2);
        assert_eq!(decoded.rs2, 1);
    }

    #[test]
    fn decodes_lui_without_further_shift() {
        // lui x2, 0x12345 -> imm already in upper 20 bits
        let instr = (0x12345 << 12) | (2 << 7) | 0b0110111;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Lui);
        assert_eq!(decoded.imm, 0x1234_5000u32 as i32);
    }

    #[test]
    fn decodes_jal_offset() {
        // jal x1, -4
        let offset: u32 = (-4i32) as u32;
        let imm20 = (offset >> 20) & 0x1;
        let imm19_12 = (offset >> 12) & 0xff;
        let imm11 = (offset >> 11) & 0x1;
        let imm10_1 = (offset >> 1) & 0x3ff;
        let instr = (imm20 << 31) | (imm19_12 << 12) | (imm11 << 20) | (imm10_1 << 21) | (1 << 7) | 0b1101111;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Jal);
        assert_eq!(decoded.imm, -4);
    }

    #[test]
    fn decodes_beq_offset() {
        // beq x1, x2, 16
        let offset: u32 = 16;
        let imm12 = (offset >> 12) & 0x1;
        let imm11 = (offset >> 11) & 0x1;
        let imm10_5 = (offset >> 5) & 0x3f;
        let imm4_1 = (offset >> 1) & 0xf;
        let instr = (imm12 << 31)
            | (imm10_5 << 25)
            | (2 << 20)
            | (1 << 15)
            | (0b000 << 12)
            | (imm4_1 << 8)
            | (imm11 << 7)
            | 0b1100011;
        let decoded = decode(instr);
        assert_eq!(decoded.operation, Operation::Beq);
        assert_eq!(decoded.imm, 16);
    }

    #[test]
    fn unknown_opcode_decodes_to_unknown() {
        let decoded = decode(0x0000_0000);
        assert_eq!(decoded.operation, Operation::Unknown);
    }

    #[test]
    fn register_fields_are_five_bits() {
        let decoded = decode(0xffff_ffff);
        assert!(decoded.rd < 32);
        assert!(decoded.rs1 < 32);
        assert!(decoded.rs2 < 32);
    }
}
