//! Superinstruction fusion.
//!
//! Runs immediately after emission: when a `MOVE` would copy the result of
//! the instruction just emitted back into one of its sources, the pair is
//! rewritten as a single in-place opcode. The interpreter's hot-loop speed
//! depends on this pass; it is not optional.
//!
//! Fusion never crosses a barrier (any offset that is a branch target), and
//! only fires when the intermediate destination is a dead expression
//! temporary.

use crate::asm::{Opcode, OpcodeRepr, RegisterId};

use super::emit::Emitter;

/// Try to fuse `MOVE dst, src` with the previously emitted instruction.
/// Returns `true` when the rewrite happened; the caller emits a plain `MOVE`
/// otherwise.
pub(crate) fn fuse_move(
    em: &mut Emitter,
    dst: RegisterId,
    src: RegisterId,
    temp_floor: usize,
) -> bool {
    let Some(start) = em.fusable_instruction() else {
        return false;
    };

    let code = em.code();
    let op = match OpcodeRepr::decode(code[start]) {
        Some(op) => op,
        None => return false,
    };

    // The intermediate must be the value just produced, and a temporary no
    // named local can still observe.
    let dead_temp = |rd: usize| rd == src && rd >= temp_floor && rd != dst;

    let fused = match op {
        OpcodeRepr::ADD
        | OpcodeRepr::SUB
        | OpcodeRepr::MUL
        | OpcodeRepr::DIV
        | OpcodeRepr::MOD
        | OpcodeRepr::CONCAT => {
            let (rd, rs, rt) = (code[start + 1] as usize, code[start + 2] as usize, code[start + 3] as usize);
            if dead_temp(rd) && rs == dst && rt != rd {
                Some(match op {
                    OpcodeRepr::ADD => Opcode::ADDA(dst, rt),
                    OpcodeRepr::SUB => Opcode::SUBA(dst, rt),
                    OpcodeRepr::MUL => Opcode::MULA(dst, rt),
                    OpcodeRepr::DIV => Opcode::DIVA(dst, rt),
                    OpcodeRepr::MOD => Opcode::MODA(dst, rt),
                    OpcodeRepr::CONCAT => Opcode::CONCATA(dst, rt),
                    _ => unreachable!(),
                })
            } else {
                None
            }
        }

        OpcodeRepr::ADDI
        | OpcodeRepr::SUBI
        | OpcodeRepr::MULI
        | OpcodeRepr::DIVI
        | OpcodeRepr::MODI => {
            let (rd, rs, k) = (code[start + 1] as usize, code[start + 2] as usize, code[start + 3]);
            if dead_temp(rd) && rs == dst {
                Some(match op {
                    OpcodeRepr::ADDI => Opcode::ADDAI(dst, k),
                    OpcodeRepr::SUBI => Opcode::SUBAI(dst, k),
                    OpcodeRepr::MULI => Opcode::MULAI(dst, k),
                    OpcodeRepr::DIVI => Opcode::DIVAI(dst, k),
                    OpcodeRepr::MODI => Opcode::MODAI(dst, k),
                    _ => unreachable!(),
                })
            } else {
                None
            }
        }

        // LOADI into a temp that is immediately moved collapses to a direct
        // load of the final register.
        OpcodeRepr::LOADI => {
            let (rd, k) = (code[start + 1] as usize, code[start + 2]);
            dead_temp(rd).then(|| Opcode::LOADI(dst, k))
        }

        _ => None,
    };

    match fused {
        Some(op) => {
            em.rewrite_last(&op);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_move_fuses_to_in_place_form() {
        let mut em = Emitter::new();
        em.emit(&Opcode::ADD(2, 0, 1));
        em.emit_move(0, 2, 2);

        assert_eq!(em.code(), &[OpcodeRepr::ADDA as i32, 0, 1]);
    }

    #[test]
    fn immediate_add_move_fuses() {
        let mut em = Emitter::new();
        em.emit(&Opcode::ADDI(2, 1, 1));
        em.emit_move(1, 2, 2);

        assert_eq!(em.code(), &[OpcodeRepr::ADDAI as i32, 1, 1]);
    }

    #[test]
    fn load_move_collapses() {
        let mut em = Emitter::new();
        em.emit(&Opcode::LOADI(3, 42));
        em.emit_move(0, 3, 1);

        assert_eq!(em.code(), &[OpcodeRepr::LOADI as i32, 0, 42]);
    }

    #[test]
    fn pinned_intermediate_is_not_fused() {
        let mut em = Emitter::new();
        em.emit(&Opcode::ADD(2, 0, 1));
        // temp_floor above rd: the intermediate is a named local.
        em.emit_move(0, 2, 3);

        assert_eq!(
            em.code(),
            &[OpcodeRepr::ADD as i32, 2, 0, 1, OpcodeRepr::MOVE as i32, 0, 2]
        );
    }

    #[test]
    fn fusion_stops_at_barriers() {
        let mut em = Emitter::new();
        em.emit(&Opcode::ADD(2, 0, 1));
        em.mark_target();
        em.emit_move(0, 2, 2);

        assert_eq!(
            em.code(),
            &[OpcodeRepr::ADD as i32, 2, 0, 1, OpcodeRepr::MOVE as i32, 0, 2]
        );
    }
}
