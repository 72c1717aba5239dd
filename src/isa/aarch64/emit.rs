//! AArch64 assembly emission.
//!
//! Serializes MIR as GNU-style textual assembly. Every target instruction
//! formats according to its operand shape; pseudo instructions that survive
//! to emission (only `MOVE`, in debug pipelines that skip move lowering)
//! print in their canonical `MOVE dst, src` form.

use crate::isa::aarch64::inst::{A64Op, Cond, OperandShape};
use crate::isa::aarch64::regs::reg_name;
use crate::mir::{Function, GlobalVariable, InstKind, MInst, Operand, TypeWidth};
use crate::settings::Flags;
use std::fmt::{self, Write};

fn block_label(func: &str, id: u32) -> String {
    format!(".L{func}_{id}")
}

fn operand_text(operand: &Operand, func: &str) -> String {
    match operand {
        Operand::Reg(reg) if reg.virt => reg.to_string(),
        Operand::Reg(reg) => reg_name(*reg),
        Operand::Imm(imm) => format!("#{imm}"),
        Operand::FpImm(imm) => format!("#{imm}"),
        Operand::Label(label) => block_label(func, label.0),
        Operand::Sym(sym) => sym.clone(),
    }
}

fn cond_text(operand: &Operand) -> &'static str {
    let code = match operand {
        Operand::Imm(imm) => *imm,
        _ => return "??",
    };
    match Cond::try_from(code as u16) {
        Ok(cond) => cond.suffix(),
        Err(_) => "??",
    }
}

/// Format a surviving pseudo move exactly as `MOVE dst, src`, with a
/// `\t# comment` tail when the instruction carries a comment.
pub fn pseudo_move_text(inst: &MInst, func: &str) -> String {
    let (dst, src) = match &inst.kind {
        InstKind::Move { dst, src } => (dst, src),
        _ => panic!("not a pseudo move"),
    };
    let mut text = format!(
        "MOVE {}, {}",
        operand_text(dst, func),
        operand_text(src, func)
    );
    if let Some(comment) = &inst.comment {
        text.push_str("\t# ");
        text.push_str(comment);
    }
    text
}

fn inst_text(inst: &MInst, func: &str) -> String {
    let target = match &inst.kind {
        InstKind::Target(target) => target,
        InstKind::Move { .. } => return pseudo_move_text(inst, func),
        InstKind::Nop => return "nop".to_string(),
        // Remaining pseudos never survive to emission; print their debug
        // form rather than losing them silently.
        _ => return inst.to_string(),
    };
    let op = A64Op::try_from(target.op.0).expect("unknown aarch64 opcode");
    let m = op.mnemonic();
    let ops = &target.operands;
    let o = |index: usize| operand_text(&ops[index], func);
    match op.shape() {
        OperandShape::ThreeReg => format!("{m} {}, {}, {}", o(0), o(1), o(2)),
        OperandShape::TwoReg
        | OperandShape::RegImm
        | OperandShape::CmpReg
        | OperandShape::CmpImm => format!("{m} {}, {}", o(0), o(1)),
        OperandShape::CSet => format!("{m} {}, {}", o(0), cond_text(&ops[1])),
        OperandShape::Load => format!("{m} {}, [{}]", o(0), o(1)),
        OperandShape::Store => format!("{m} {}, [{}]", o(0), o(1)),
        OperandShape::LoadSp | OperandShape::StoreSp => {
            format!("{m} {}, [sp, {}]", o(0), o(1))
        }
        OperandShape::AddrSp => format!("{m} {}, sp, {}", o(0), o(1)),
        OperandShape::SpAdj => format!("{m} sp, sp, {}", o(0)),
        OperandShape::PageAddr => format!("{m} {}, {}", o(0), o(1)),
        OperandShape::PageOff => format!("{m} {}, {}, :lo12:{}", o(0), o(1), o(2)),
        OperandShape::Branch => format!("{m} {}", o(0)),
        OperandShape::CondBranch => format!("{m}.{} {}", cond_text(&ops[0]), o(1)),
        OperandShape::Call => format!("{m} {}", o(0)),
        OperandShape::Ret => m.to_string(),
    }
}

/// Write one function: header, block labels, instructions.
pub fn write_function(w: &mut String, func: &Function, flags: &Flags) -> fmt::Result {
    writeln!(w, "\t.globl\t{}", func.name)?;
    writeln!(w, "\t.p2align\t2")?;
    writeln!(w, "\t.type\t{}, %function", func.name)?;
    writeln!(w, "{}:", func.name)?;
    for (id, block) in &func.blocks {
        writeln!(w, "{}:", block_label(&func.name, id.0))?;
        for inst in &block.insts {
            let text = inst_text(inst, &func.name);
            if flags.emit_comments() && !matches!(inst.kind, InstKind::Move { .. }) {
                if let Some(comment) = &inst.comment {
                    writeln!(w, "\t{text}\t# {comment}")?;
                    continue;
                }
            }
            writeln!(w, "\t{text}")?;
        }
    }
    writeln!(w)
}

/// Write one global variable into the `.data` section.
pub fn write_global(w: &mut String, global: &GlobalVariable) -> fmt::Result {
    writeln!(w, "\t.globl\t{}", global.name)?;
    writeln!(
        w,
        "\t.p2align\t{}",
        match global.ty.width {
            TypeWidth::B32 => 2,
            TypeWidth::B64 => 3,
        }
    )?;
    writeln!(w, "{}:", global.name)?;
    let elems = global.elem_count();
    let directive = match global.ty.width {
        TypeWidth::B32 => ".word",
        TypeWidth::B64 => ".xword",
    };
    for value in global.init.iter().take(elems as usize) {
        writeln!(w, "\t{directive}\t{value}")?;
    }
    let remaining = elems.saturating_sub(global.init.len() as u32);
    if remaining > 0 {
        writeln!(w, "\t.zero\t{}", remaining * global.ty.bytes())?;
    }
    writeln!(w)
}
