//! Instruction set of the PerlVM register machine.
//!
//! A program is a flat `i32` stream: one slot for the opcode, then one slot
//! per operand. Register operands are indices into the frame's scalar file,
//! `Const` operands index the program's constant pool, `Branch` operands are
//! absolute offsets to an opcode start, and `Sub` operands index the
//! program's subroutine table. Call instructions carry a variable-length
//! argument-register list preceded by its count.

use strum::{EnumIter, FromRepr};

/// Register index inside a frame's scalar file.
pub type RegisterId = usize;

/// Operand classes, used by program verification to walk the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Register index, must be below the program's register count.
    Reg,
    /// Inline signed immediate.
    Imm,
    /// Constant-pool index.
    Const,
    /// Constant-pool index or `-1` for "absent".
    OptConst,
    /// Absolute branch target, must land on an opcode start.
    Branch,
    /// Subroutine-table index.
    Sub,
}

/// Static shape of one instruction.
#[derive(Debug, Clone, Copy)]
pub struct InstrLayout {
    /// Fixed operand slots following the opcode.
    pub fixed: &'static [OperandKind],
    /// Whether an argument count plus that many register slots follow.
    pub arg_list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, FromRepr)]
#[repr(u8)]
/// Opcode numbering of the instruction set.
pub enum OpcodeRepr {
    /// No operation.
    NOOP = 0x00,
    /// Load a small-integer immediate.
    LOADI = 0x01,
    /// Load a scalar from the constant pool.
    LOADC = 0x02,
    /// Copy a register.
    MOVE = 0x03,

    /// Numeric addition.
    ADD = 0x10,
    /// Numeric subtraction.
    SUB = 0x11,
    /// Numeric multiplication.
    MUL = 0x12,
    /// Numeric division.
    DIV = 0x13,
    /// Perl modulus.
    MOD = 0x14,
    /// Numeric negation.
    NEG = 0x15,
    /// Addition with an integer immediate.
    ADDI = 0x16,
    /// Subtraction with an integer immediate.
    SUBI = 0x17,
    /// Multiplication with an integer immediate.
    MULI = 0x18,
    /// Division with an integer immediate.
    DIVI = 0x19,
    /// Modulus with an integer immediate.
    MODI = 0x1a,

    /// In-place addition superinstruction.
    ADDA = 0x20,
    /// In-place subtraction superinstruction.
    SUBA = 0x21,
    /// In-place multiplication superinstruction.
    MULA = 0x22,
    /// In-place division superinstruction.
    DIVA = 0x23,
    /// In-place modulus superinstruction.
    MODA = 0x24,
    /// In-place addition of an integer immediate.
    ADDAI = 0x25,
    /// In-place subtraction of an integer immediate.
    SUBAI = 0x26,
    /// In-place multiplication by an integer immediate.
    MULAI = 0x27,
    /// In-place division by an integer immediate.
    DIVAI = 0x28,
    /// In-place modulus by an integer immediate.
    MODAI = 0x29,
    /// Perl `++`, with magical string increment.
    INC = 0x2a,
    /// Perl `--`.
    DEC = 0x2b,

    /// Numeric `<`.
    LT = 0x30,
    /// Numeric `<=`.
    LE = 0x31,
    /// Numeric `>`.
    GT = 0x32,
    /// Numeric `>=`.
    GE = 0x33,
    /// Numeric `==`.
    EQ = 0x34,
    /// Numeric `!=`.
    NE = 0x35,
    /// Numeric `<=>`.
    CMP = 0x36,

    /// String `lt`.
    SLT = 0x38,
    /// String `le`.
    SLE = 0x39,
    /// String `gt`.
    SGT = 0x3a,
    /// String `ge`.
    SGE = 0x3b,
    /// String `eq`.
    SEQ = 0x3c,
    /// String `ne`.
    SNE = 0x3d,
    /// String `cmp`.
    SCMP = 0x3e,

    /// String concatenation.
    CONCAT = 0x40,
    /// In-place concatenation superinstruction.
    CONCATA = 0x41,
    /// String repetition (`x`).
    REPEAT = 0x42,
    /// String length in characters.
    STRLEN = 0x43,

    /// Boolean coercion.
    TOBOOL = 0x48,
    /// Boolean negation.
    NOT = 0x49,

    /// Unconditional jump.
    JMP = 0x50,
    /// Jump if the register is true.
    JMPT = 0x51,
    /// Jump if the register is false.
    JMPF = 0x52,
    /// Return a register's scalar to the caller.
    RET = 0x53,

    /// Call a subroutine by table index.
    CALL = 0x58,
    /// Tail call; consumed by the trampoline, reuses the current frame.
    TCALL = 0x59,
    /// Call through a code-reference register.
    CALLR = 0x5a,

    /// Return a LAST control-flow marker.
    MARKLAST = 0x60,
    /// Return a NEXT control-flow marker.
    MARKNEXT = 0x61,
    /// Return a REDO control-flow marker.
    MARKREDO = 0x62,

    /// Write a scalar's string form to the VM output handle.
    PRINT = 0x68,
}

const R: OperandKind = OperandKind::Reg;
const I: OperandKind = OperandKind::Imm;
const C: OperandKind = OperandKind::Const;
const B: OperandKind = OperandKind::Branch;
const S: OperandKind = OperandKind::Sub;
const LBL: OperandKind = OperandKind::OptConst;

impl OpcodeRepr {
    /// Decode a bytecode slot into an opcode.
    pub fn decode(slot: i32) -> Option<Self> {
        u8::try_from(slot).ok().and_then(Self::from_repr)
    }

    /// Operand layout of this opcode.
    pub const fn layout(self) -> InstrLayout {
        use OpcodeRepr::*;

        let (fixed, arg_list): (&'static [OperandKind], bool) = match self {
            NOOP => (&[], false),
            LOADI => (&[R, I], false),
            LOADC => (&[R, C], false),
            MOVE | NEG | STRLEN | TOBOOL | NOT => (&[R, R], false),
            ADD | SUB | MUL | DIV | MOD | CONCAT | REPEAT => (&[R, R, R], false),
            ADDI | SUBI | MULI | DIVI | MODI => (&[R, R, I], false),
            ADDA | SUBA | MULA | DIVA | MODA | CONCATA => (&[R, R], false),
            ADDAI | SUBAI | MULAI | DIVAI | MODAI => (&[R, I], false),
            INC | DEC | RET | PRINT => (&[R], false),
            LT | LE | GT | GE | EQ | NE | CMP => (&[R, R, R], false),
            SLT | SLE | SGT | SGE | SEQ | SNE | SCMP => (&[R, R, R], false),
            JMP => (&[B], false),
            JMPT | JMPF => (&[R, B], false),
            CALL => (&[R, S], true),
            TCALL => (&[S], true),
            CALLR => (&[R, R], true),
            MARKLAST | MARKNEXT | MARKREDO => (&[LBL], false),
        };

        InstrLayout { fixed, arg_list }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Instruction representation for program construction.
///
/// The bytecode compiler and the test suites build programs from these and
/// serialize them with [`Opcode::encode`]; the interpreter never sees this
/// type, it dispatches on [`OpcodeRepr`] straight from the `i32` stream.
pub enum Opcode {
    /// No operation.
    NOOP,

    /// Loads an immediate integer.
    ///
    /// | Operation | `r = K`        |
    /// | Syntax    | `loadi r, K`   |
    LOADI(RegisterId, i32),

    /// Loads a scalar from the constant pool.
    ///
    /// | Operation | `r = const[i]` |
    /// | Syntax    | `loadc r, #i`  |
    LOADC(RegisterId, usize),

    /// Copies a register.
    ///
    /// | Operation | `rd = rs`      |
    /// | Syntax    | `move rd, rs`  |
    MOVE(RegisterId, RegisterId),

    /// Adds two registers.
    ///
    /// | Operation | `rd = rs + rt`    |
    /// | Syntax    | `add rd, rs, rt`  |
    ADD(RegisterId, RegisterId, RegisterId),

    /// Subtracts two registers.
    SUB(RegisterId, RegisterId, RegisterId),

    /// Multiplies two registers.
    MUL(RegisterId, RegisterId, RegisterId),

    /// Divides two registers.
    ///
    /// #### Exceptions
    /// - `Illegal division by zero`
    DIV(RegisterId, RegisterId, RegisterId),

    /// Perl modulus of two registers. Result takes the sign of `rt`.
    ///
    /// #### Exceptions
    /// - `Illegal modulus zero`
    MOD(RegisterId, RegisterId, RegisterId),

    /// Negates a register.
    NEG(RegisterId, RegisterId),

    /// Adds a register and an immediate.
    ///
    /// | Operation | `rd = rs + K`     |
    /// | Syntax    | `addi rd, rs, K`  |
    ADDI(RegisterId, RegisterId, i32),

    /// Subtracts an immediate from a register.
    SUBI(RegisterId, RegisterId, i32),

    /// Multiplies a register by an immediate.
    MULI(RegisterId, RegisterId, i32),

    /// Divides a register by an immediate.
    DIVI(RegisterId, RegisterId, i32),

    /// Modulus of a register by an immediate.
    MODI(RegisterId, RegisterId, i32),

    /// In-place addition superinstruction, fused from `ADD rd, rs, rt; MOVE
    /// rs, rd`.
    ///
    /// | Operation | `rs += rt`     |
    /// | Syntax    | `adda rs, rt`  |
    ADDA(RegisterId, RegisterId),

    /// In-place subtraction superinstruction.
    SUBA(RegisterId, RegisterId),

    /// In-place multiplication superinstruction.
    MULA(RegisterId, RegisterId),

    /// In-place division superinstruction.
    DIVA(RegisterId, RegisterId),

    /// In-place modulus superinstruction.
    MODA(RegisterId, RegisterId),

    /// In-place addition of an immediate, fused from `ADDI rd, rs, K; MOVE
    /// rs, rd`.
    ///
    /// | Operation | `rs += K`       |
    /// | Syntax    | `addai rs, K`   |
    ADDAI(RegisterId, i32),

    /// In-place subtraction of an immediate.
    SUBAI(RegisterId, i32),

    /// In-place multiplication by an immediate.
    MULAI(RegisterId, i32),

    /// In-place division by an immediate.
    DIVAI(RegisterId, i32),

    /// In-place modulus by an immediate.
    MODAI(RegisterId, i32),

    /// Perl `++`. Numeric increment, or magical string increment when the
    /// scalar holds a purely alphanumeric string.
    INC(RegisterId),

    /// Perl `--`.
    DEC(RegisterId),

    /// Numeric `<`, producing a pooled boolean.
    LT(RegisterId, RegisterId, RegisterId),
    /// Numeric `<=`.
    LE(RegisterId, RegisterId, RegisterId),
    /// Numeric `>`.
    GT(RegisterId, RegisterId, RegisterId),
    /// Numeric `>=`.
    GE(RegisterId, RegisterId, RegisterId),
    /// Numeric `==`.
    EQ(RegisterId, RegisterId, RegisterId),
    /// Numeric `!=`.
    NE(RegisterId, RegisterId, RegisterId),
    /// Numeric `<=>`, producing -1, 0 or 1.
    CMP(RegisterId, RegisterId, RegisterId),

    /// String `lt`.
    SLT(RegisterId, RegisterId, RegisterId),
    /// String `le`.
    SLE(RegisterId, RegisterId, RegisterId),
    /// String `gt`.
    SGT(RegisterId, RegisterId, RegisterId),
    /// String `ge`.
    SGE(RegisterId, RegisterId, RegisterId),
    /// String `eq`.
    SEQ(RegisterId, RegisterId, RegisterId),
    /// String `ne`.
    SNE(RegisterId, RegisterId, RegisterId),
    /// String `cmp`.
    SCMP(RegisterId, RegisterId, RegisterId),

    /// Concatenates two registers.
    CONCAT(RegisterId, RegisterId, RegisterId),

    /// In-place concatenation superinstruction.
    CONCATA(RegisterId, RegisterId),

    /// Repeats a string (`rd = rs x rt`).
    REPEAT(RegisterId, RegisterId, RegisterId),

    /// Length of the string form, in characters.
    STRLEN(RegisterId, RegisterId),

    /// Coerces to a pooled boolean, for branch conditions that need boolean
    /// semantics.
    TOBOOL(RegisterId, RegisterId),

    /// Boolean negation.
    NOT(RegisterId, RegisterId),

    /// Unconditional jump to an absolute offset.
    JMP(usize),

    /// Jumps when the register is true.
    JMPT(RegisterId, usize),

    /// Jumps when the register is false.
    JMPF(RegisterId, usize),

    /// Returns the register's scalar to the caller.
    RET(RegisterId),

    /// Calls a subroutine; the result lands in the destination register. The
    /// call site checks the returned value for control-flow markers.
    ///
    /// | Operation | `rd = sub(args…)`          |
    /// | Syntax    | `call rd, #sub, argc, a…`  |
    CALL(RegisterId, usize, Vec<RegisterId>),

    /// Tail call. Returns a TAILCALL marker consumed by the frame's
    /// trampoline; the current frame is reused and never grows the native
    /// stack.
    TCALL(usize, Vec<RegisterId>),

    /// Calls through a code reference held in a register.
    CALLR(RegisterId, RegisterId, Vec<RegisterId>),

    /// Returns a LAST marker, optionally labelled via the constant pool.
    MARKLAST(Option<usize>),

    /// Returns a NEXT marker.
    MARKNEXT(Option<usize>),

    /// Returns a REDO marker.
    MARKREDO(Option<usize>),

    /// Writes the string form of a register to the VM's output handle.
    PRINT(RegisterId),
}

impl Opcode {
    /// Opcode number of this instruction.
    pub const fn repr(&self) -> OpcodeRepr {
        use Opcode::*;

        match self {
            NOOP => OpcodeRepr::NOOP,
            LOADI(..) => OpcodeRepr::LOADI,
            LOADC(..) => OpcodeRepr::LOADC,
            MOVE(..) => OpcodeRepr::MOVE,
            ADD(..) => OpcodeRepr::ADD,
            SUB(..) => OpcodeRepr::SUB,
            MUL(..) => OpcodeRepr::MUL,
            DIV(..) => OpcodeRepr::DIV,
            MOD(..) => OpcodeRepr::MOD,
            NEG(..) => OpcodeRepr::NEG,
            ADDI(..) => OpcodeRepr::ADDI,
            SUBI(..) => OpcodeRepr::SUBI,
            MULI(..) => OpcodeRepr::MULI,
            DIVI(..) => OpcodeRepr::DIVI,
            MODI(..) => OpcodeRepr::MODI,
            ADDA(..) => OpcodeRepr::ADDA,
            SUBA(..) => OpcodeRepr::SUBA,
            MULA(..) => OpcodeRepr::MULA,
            DIVA(..) => OpcodeRepr::DIVA,
            MODA(..) => OpcodeRepr::MODA,
            ADDAI(..) => OpcodeRepr::ADDAI,
            SUBAI(..) => OpcodeRepr::SUBAI,
            MULAI(..) => OpcodeRepr::MULAI,
            DIVAI(..) => OpcodeRepr::DIVAI,
            MODAI(..) => OpcodeRepr::MODAI,
            INC(..) => OpcodeRepr::INC,
            DEC(..) => OpcodeRepr::DEC,
            LT(..) => OpcodeRepr::LT,
            LE(..) => OpcodeRepr::LE,
            GT(..) => OpcodeRepr::GT,
            GE(..) => OpcodeRepr::GE,
            EQ(..) => OpcodeRepr::EQ,
            NE(..) => OpcodeRepr::NE,
            CMP(..) => OpcodeRepr::CMP,
            SLT(..) => OpcodeRepr::SLT,
            SLE(..) => OpcodeRepr::SLE,
            SGT(..) => OpcodeRepr::SGT,
            SGE(..) => OpcodeRepr::SGE,
            SEQ(..) => OpcodeRepr::SEQ,
            SNE(..) => OpcodeRepr::SNE,
            SCMP(..) => OpcodeRepr::SCMP,
            CONCAT(..) => OpcodeRepr::CONCAT,
            CONCATA(..) => OpcodeRepr::CONCATA,
            REPEAT(..) => OpcodeRepr::REPEAT,
            STRLEN(..) => OpcodeRepr::STRLEN,
            TOBOOL(..) => OpcodeRepr::TOBOOL,
            NOT(..) => OpcodeRepr::NOT,
            JMP(..) => OpcodeRepr::JMP,
            JMPT(..) => OpcodeRepr::JMPT,
            JMPF(..) => OpcodeRepr::JMPF,
            RET(..) => OpcodeRepr::RET,
            CALL(..) => OpcodeRepr::CALL,
            TCALL(..) => OpcodeRepr::TCALL,
            CALLR(..) => OpcodeRepr::CALLR,
            MARKLAST(..) => OpcodeRepr::MARKLAST,
            MARKNEXT(..) => OpcodeRepr::MARKNEXT,
            MARKREDO(..) => OpcodeRepr::MARKREDO,
            PRINT(..) => OpcodeRepr::PRINT,
        }
    }

    /// Serialize into the bytecode stream.
    pub fn encode(&self, code: &mut Vec<i32>) {
        use Opcode::*;

        code.push(self.repr() as i32);

        match self {
            NOOP => (),
            LOADI(r, k) => code.extend([*r as i32, *k]),
            LOADC(r, i) => code.extend([*r as i32, *i as i32]),
            MOVE(rd, rs) | NEG(rd, rs) | STRLEN(rd, rs) | TOBOOL(rd, rs) | NOT(rd, rs) => {
                code.extend([*rd as i32, *rs as i32])
            }
            ADD(rd, rs, rt)
            | SUB(rd, rs, rt)
            | MUL(rd, rs, rt)
            | DIV(rd, rs, rt)
            | MOD(rd, rs, rt)
            | CONCAT(rd, rs, rt)
            | REPEAT(rd, rs, rt)
            | LT(rd, rs, rt)
            | LE(rd, rs, rt)
            | GT(rd, rs, rt)
            | GE(rd, rs, rt)
            | EQ(rd, rs, rt)
            | NE(rd, rs, rt)
            | CMP(rd, rs, rt)
            | SLT(rd, rs, rt)
            | SLE(rd, rs, rt)
            | SGT(rd, rs, rt)
            | SGE(rd, rs, rt)
            | SEQ(rd, rs, rt)
            | SNE(rd, rs, rt)
            | SCMP(rd, rs, rt) => code.extend([*rd as i32, *rs as i32, *rt as i32]),
            ADDI(rd, rs, k) | SUBI(rd, rs, k) | MULI(rd, rs, k) | DIVI(rd, rs, k)
            | MODI(rd, rs, k) => code.extend([*rd as i32, *rs as i32, *k]),
            ADDA(rs, rt) | SUBA(rs, rt) | MULA(rs, rt) | DIVA(rs, rt) | MODA(rs, rt)
            | CONCATA(rs, rt) => code.extend([*rs as i32, *rt as i32]),
            ADDAI(rs, k) | SUBAI(rs, k) | MULAI(rs, k) | DIVAI(rs, k) | MODAI(rs, k) => {
                code.extend([*rs as i32, *k])
            }
            INC(r) | DEC(r) | RET(r) | PRINT(r) => code.push(*r as i32),
            JMP(t) => code.push(*t as i32),
            JMPT(r, t) | JMPF(r, t) => code.extend([*r as i32, *t as i32]),
            CALL(rd, sub, args) => {
                code.extend([*rd as i32, *sub as i32, args.len() as i32]);
                code.extend(args.iter().map(|a| *a as i32));
            }
            TCALL(sub, args) => {
                code.extend([*sub as i32, args.len() as i32]);
                code.extend(args.iter().map(|a| *a as i32));
            }
            CALLR(rd, rf, args) => {
                code.extend([*rd as i32, *rf as i32, args.len() as i32]);
                code.extend(args.iter().map(|a| *a as i32));
            }
            MARKLAST(lbl) | MARKNEXT(lbl) | MARKREDO(lbl) => {
                code.push(lbl.map(|i| i as i32).unwrap_or(-1))
            }
        }
    }
}
