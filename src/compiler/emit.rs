//! AST lowering: register allocation, emission, loop tables and the
//! oversize-subroutine split.
//!
//! Registers are allocated with a stack discipline: named locals are pinned
//! to fixed registers for the whole subroutine (parameters first, then every
//! `my` found by a pre-scan), expression temporaries grow and shrink above
//! them. A subroutine whose bytecode outgrows
//! [`crate::consts::MAX_SUB_OPCODES`] is cut at the next top-level statement
//! boundary; the remainder continues in a helper subroutine reached by tail
//! call, with the pinned locals passed as its arguments.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::asm::{Opcode, RegisterId};
use crate::consts::{MAX_REGISTERS, MAX_SUB_OPCODES};
use crate::error::CompileError;
use crate::program::{LoopSpec, Program, SubSpec};
use crate::scalar::Scalar;

use super::ast::{BinOp, CompileUnit, Expr, Stmt, SubDef, UnOp};
use super::peephole;

/// Bytecode buffer with the fusion bookkeeping the peephole pass needs.
pub(crate) struct Emitter {
    code: Vec<i32>,
    last_start: Option<usize>,
    barrier: usize,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self {
            code: vec![],
            last_start: None,
            barrier: 0,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn code(&self) -> &[i32] {
        &self.code
    }

    pub(crate) fn emit(&mut self, op: &Opcode) {
        self.last_start = Some(self.code.len());
        op.encode(&mut self.code);
    }

    /// Emit `MOVE dst, src`, fusing with the preceding instruction when the
    /// superinstruction patterns apply.
    pub(crate) fn emit_move(&mut self, dst: RegisterId, src: RegisterId, temp_floor: usize) {
        if dst == src {
            return;
        }
        if !peephole::fuse_move(self, dst, src, temp_floor) {
            self.emit(&Opcode::MOVE(dst, src));
        }
    }

    /// Declare the current position a branch target. Fusion never reaches
    /// across it.
    pub(crate) fn mark_target(&mut self) {
        self.barrier = self.code.len();
    }

    /// Start offset of the last instruction, when fusion may touch it.
    pub(crate) fn fusable_instruction(&self) -> Option<usize> {
        self.last_start.filter(|s| *s >= self.barrier)
    }

    /// Replace the last emitted instruction.
    pub(crate) fn rewrite_last(&mut self, op: &Opcode) {
        let start = self.last_start.expect("rewrite without emission");
        self.code.truncate(start);
        op.encode(&mut self.code);
    }

    /// Operand slot of the jump just emitted with a placeholder target.
    fn patch_site(&self) -> usize {
        self.code.len() - 1
    }

    fn patch(&mut self, site: usize, target: usize) {
        self.code[site] = target as i32;
    }

    fn into_code(self) -> Vec<i32> {
        self.code
    }
}

/// Compile-time state of one loop, for local `last`/`next`/`redo` jumps.
struct LoopFrame {
    label: Option<String>,
    head: usize,
    /// `next` target when already known (a `while` re-checks its condition);
    /// otherwise sites to patch once the increment step is placed.
    next_target: Option<usize>,
    next_sites: Vec<usize>,
    last_sites: Vec<usize>,
}

/// Per-subroutine (per split part) compilation state.
struct SubState {
    index: usize,
    name: Rc<str>,
    entry: usize,
    base: String,
    part: usize,
    loops: Vec<LoopSpec>,
    loop_stack: Vec<LoopFrame>,
    pinned: HashMap<String, RegisterId>,
    pinned_count: usize,
    next_reg: usize,
    high: usize,
}

impl SubState {
    fn pin(&mut self, name: &str) -> Result<RegisterId, CompileError> {
        if let Some(&r) = self.pinned.get(name) {
            return Ok(r);
        }
        let r = self.next_reg;
        self.next_reg += 1;
        if self.next_reg > MAX_REGISTERS {
            return Err(CompileError::OutOfRegisters);
        }
        self.high = self.high.max(self.next_reg);
        self.pinned.insert(name.to_string(), r);
        self.pinned_count = self.next_reg;
        Ok(r)
    }

    fn alloc(&mut self) -> Result<RegisterId, CompileError> {
        let r = self.next_reg;
        self.next_reg += 1;
        if self.next_reg > MAX_REGISTERS {
            return Err(CompileError::OutOfRegisters);
        }
        self.high = self.high.max(self.next_reg);
        Ok(r)
    }

    /// Free an expression temporary. Pinned registers and non-top slots are
    /// left alone; temporaries die strictly in stack order.
    fn release(&mut self, r: RegisterId) {
        if r >= self.pinned_count && r + 1 == self.next_reg {
            self.next_reg -= 1;
        }
    }

    fn var(&self, name: &str) -> Result<RegisterId, CompileError> {
        self.pinned
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UndeclaredVariable(name.to_string()))
    }
}

enum LoopJump {
    Last,
    Next,
    Redo,
}

pub(crate) fn compile(unit: &CompileUnit) -> Result<Program, CompileError> {
    let mut names = HashMap::new();
    for (i, def) in unit.subs.iter().enumerate() {
        if names.insert(def.name.clone(), i).is_some() {
            return Err(CompileError::DuplicateSubroutine(def.name.clone()));
        }
    }

    let mut compiler = Compiler {
        em: Emitter::new(),
        constants: vec![],
        str_consts: HashMap::new(),
        int_consts: HashMap::new(),
        num_consts: HashMap::new(),
        code_consts: HashMap::new(),
        undef_const: None,
        names,
        specs: unit.subs.iter().map(|_| None).collect(),
        register_count: 0,
    };

    for (i, def) in unit.subs.iter().enumerate() {
        compiler.compile_sub(i, def)?;
    }

    let specs = compiler
        .specs
        .into_iter()
        .map(|s| s.expect("every part sealed"))
        .collect();

    Program::new(
        compiler.em.into_code(),
        compiler.constants,
        compiler.register_count.max(1),
        specs,
    )
    .map_err(CompileError::Internal)
}

struct Compiler {
    em: Emitter,
    constants: Vec<Scalar>,
    str_consts: HashMap<String, usize>,
    int_consts: HashMap<i64, usize>,
    num_consts: HashMap<u64, usize>,
    code_consts: HashMap<String, usize>,
    undef_const: Option<usize>,
    names: HashMap<String, usize>,
    specs: Vec<Option<SubSpec>>,
    register_count: usize,
}

impl Compiler {
    fn compile_sub(&mut self, index: usize, def: &SubDef) -> Result<(), CompileError> {
        let mut st = SubState {
            index,
            name: def.name.as_str().into(),
            entry: self.em.pos(),
            base: def.name.clone(),
            part: 0,
            loops: vec![],
            loop_stack: vec![],
            pinned: HashMap::new(),
            pinned_count: 0,
            next_reg: 0,
            high: 0,
        };

        for param in &def.params {
            st.pin(param)?;
        }
        pin_locals(&def.body, &mut st)?;
        self.em.mark_target();

        for (i, s) in def.body.iter().enumerate() {
            self.stmt(&mut st, s)?;
            if i + 1 < def.body.len() {
                self.maybe_split(&mut st)?;
            }
        }

        // Implicit `return undef`.
        let r = st.alloc()?;
        let undef = self.undef_const();
        self.em.emit(&Opcode::LOADC(r, undef));
        self.em.emit(&Opcode::RET(r));
        st.release(r);

        self.finish_part(st);
        Ok(())
    }

    /// Cut the current part once it outgrows the per-subroutine budget.
    /// Loops never straddle a cut: the check runs only between top-level
    /// statements.
    fn maybe_split(&mut self, st: &mut SubState) -> Result<(), CompileError> {
        debug_assert!(st.loop_stack.is_empty());
        if self.em.pos() - st.entry < MAX_SUB_OPCODES {
            return Ok(());
        }

        let helper_name = format!("{}__{}", st.base, st.part);
        let helper = self.specs.len();
        self.specs.push(None);
        self.names.insert(helper_name.clone(), helper);

        let locals: Vec<RegisterId> = (0..st.pinned_count).collect();
        self.em.emit(&Opcode::TCALL(helper, locals));
        debug!(
            sub = %st.base,
            helper = %helper_name,
            "splitting oversize subroutine"
        );

        let entry = self.em.pos();
        self.em.mark_target();
        let next = SubState {
            index: helper,
            name: helper_name.as_str().into(),
            entry,
            base: st.base.clone(),
            part: st.part + 1,
            loops: vec![],
            loop_stack: vec![],
            pinned: st.pinned.clone(),
            pinned_count: st.pinned_count,
            next_reg: st.pinned_count,
            high: st.high,
        };

        let done = mem::replace(st, next);
        self.finish_part(done);
        Ok(())
    }

    fn finish_part(&mut self, st: SubState) {
        self.register_count = self.register_count.max(st.high);
        self.specs[st.index] = Some(SubSpec {
            name: st.name,
            entry: st.entry,
            loops: st.loops,
        });
    }

    fn stmt(&mut self, st: &mut SubState, s: &Stmt) -> Result<(), CompileError> {
        match s {
            Stmt::Expr(e) => {
                let r = self.expr(st, e)?;
                st.release(r);
            }

            Stmt::My(name, init) => {
                let var = st.var(name)?;
                if let Some(e) = init {
                    let r = self.expr(st, e)?;
                    self.em.emit_move(var, r, st.pinned_count);
                    st.release(r);
                }
            }

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.expr(st, cond)?;
                self.em.emit(&Opcode::JMPF(c, 0));
                let jf = self.em.patch_site();
                st.release(c);

                self.block(st, then_branch)?;

                if else_branch.is_empty() {
                    let end = self.em.pos();
                    self.em.mark_target();
                    self.em.patch(jf, end);
                } else {
                    self.em.emit(&Opcode::JMP(0));
                    let jend = self.em.patch_site();

                    let els = self.em.pos();
                    self.em.mark_target();
                    self.em.patch(jf, els);

                    self.block(st, else_branch)?;

                    let end = self.em.pos();
                    self.em.mark_target();
                    self.em.patch(jend, end);
                }
            }

            Stmt::While { label, cond, body } => {
                let cond_pos = self.em.pos();
                self.em.mark_target();
                let c = self.expr(st, cond)?;
                self.em.emit(&Opcode::JMPF(c, 0));
                let jf = self.em.patch_site();
                st.release(c);

                let head = self.em.pos();
                self.em.mark_target();
                st.loop_stack.push(LoopFrame {
                    label: label.clone(),
                    head,
                    next_target: Some(cond_pos),
                    next_sites: vec![],
                    last_sites: vec![],
                });

                self.block(st, body)?;
                self.em.emit(&Opcode::JMP(cond_pos));

                let exit = self.em.pos();
                self.em.mark_target();
                let frame = st.loop_stack.pop().expect("loop frame");
                self.em.patch(jf, exit);
                for site in frame.last_sites {
                    self.em.patch(site, exit);
                }

                st.loops.push(LoopSpec {
                    label: label.as_deref().map(Rc::from),
                    span: cond_pos..exit,
                    head,
                    incr: cond_pos,
                    exit,
                });
            }

            Stmt::For {
                label,
                init,
                cond,
                step,
                body,
            } => {
                if let Some(i) = init {
                    self.stmt(st, i)?;
                }

                let cond_pos = self.em.pos();
                self.em.mark_target();
                let jf = match cond {
                    Some(c) => {
                        let r = self.expr(st, c)?;
                        self.em.emit(&Opcode::JMPF(r, 0));
                        let site = self.em.patch_site();
                        st.release(r);
                        Some(site)
                    }
                    None => None,
                };

                let head = self.em.pos();
                self.em.mark_target();
                st.loop_stack.push(LoopFrame {
                    label: label.clone(),
                    head,
                    next_target: None,
                    next_sites: vec![],
                    last_sites: vec![],
                });

                self.block(st, body)?;

                let incr = self.em.pos();
                self.em.mark_target();
                let mut frame = st.loop_stack.pop().expect("loop frame");
                for site in mem::take(&mut frame.next_sites) {
                    self.em.patch(site, incr);
                }

                if let Some(s2) = step {
                    self.stmt(st, s2)?;
                }
                self.em.emit(&Opcode::JMP(cond_pos));

                let exit = self.em.pos();
                self.em.mark_target();
                if let Some(site) = jf {
                    self.em.patch(site, exit);
                }
                for site in frame.last_sites {
                    self.em.patch(site, exit);
                }

                st.loops.push(LoopSpec {
                    label: label.as_deref().map(Rc::from),
                    span: cond_pos..exit,
                    head,
                    incr,
                    exit,
                });
            }

            Stmt::Block { label, body } => {
                let head = self.em.pos();
                self.em.mark_target();
                st.loop_stack.push(LoopFrame {
                    label: label.clone(),
                    head,
                    next_target: None,
                    next_sites: vec![],
                    last_sites: vec![],
                });

                self.block(st, body)?;

                let exit = self.em.pos();
                self.em.mark_target();
                let frame = st.loop_stack.pop().expect("loop frame");
                // In a bare block `next` leaves like `last`.
                for site in frame.next_sites.into_iter().chain(frame.last_sites) {
                    self.em.patch(site, exit);
                }

                st.loops.push(LoopSpec {
                    label: label.as_deref().map(Rc::from),
                    span: head..exit,
                    head,
                    incr: exit,
                    exit,
                });
            }

            Stmt::Last(label) => self.loop_jump(st, LoopJump::Last, label)?,
            Stmt::Next(label) => self.loop_jump(st, LoopJump::Next, label)?,
            Stmt::Redo(label) => self.loop_jump(st, LoopJump::Redo, label)?,

            Stmt::Return(e) => {
                let r = match e {
                    Some(e) => self.expr(st, e)?,
                    None => {
                        let r = st.alloc()?;
                        let undef = self.undef_const();
                        self.em.emit(&Opcode::LOADC(r, undef));
                        r
                    }
                };
                self.em.emit(&Opcode::RET(r));
                st.release(r);
            }

            Stmt::TailCall { name, args } => {
                let sub = self.sub_index(name)?;
                let regs = self.args(st, args)?;
                self.em.emit(&Opcode::TCALL(sub, regs.clone()));
                for r in regs.into_iter().rev() {
                    st.release(r);
                }
            }

            Stmt::Incr(name) => {
                let var = st.var(name)?;
                self.em.emit(&Opcode::INC(var));
            }

            Stmt::Decr(name) => {
                let var = st.var(name)?;
                self.em.emit(&Opcode::DEC(var));
            }

            Stmt::Print(items) => {
                for e in items {
                    let r = self.expr(st, e)?;
                    self.em.emit(&Opcode::PRINT(r));
                    st.release(r);
                }
            }
        }
        Ok(())
    }

    fn block(&mut self, st: &mut SubState, stmts: &[Stmt]) -> Result<(), CompileError> {
        for s in stmts {
            self.stmt(st, s)?;
        }
        Ok(())
    }

    fn loop_jump(
        &mut self,
        st: &mut SubState,
        which: LoopJump,
        label: &Option<String>,
    ) -> Result<(), CompileError> {
        let found = st.loop_stack.iter().rposition(|f| match label {
            None => true,
            Some(l) => f.label.as_deref() == Some(l),
        });

        match found {
            // The loop lives in this subroutine: a plain jump, no marker.
            Some(i) => match which {
                LoopJump::Redo => {
                    let head = st.loop_stack[i].head;
                    self.em.emit(&Opcode::JMP(head));
                }
                LoopJump::Next => {
                    if let Some(t) = st.loop_stack[i].next_target {
                        self.em.emit(&Opcode::JMP(t));
                    } else {
                        self.em.emit(&Opcode::JMP(0));
                        let site = self.em.patch_site();
                        st.loop_stack[i].next_sites.push(site);
                    }
                }
                LoopJump::Last => {
                    self.em.emit(&Opcode::JMP(0));
                    let site = self.em.patch_site();
                    st.loop_stack[i].last_sites.push(site);
                }
            },
            // Cross-frame transfer: allocate a marker at runtime and let the
            // call-site checks route it.
            None => {
                let idx = match label {
                    Some(l) => Some(self.str_const(l)),
                    None => None,
                };
                let op = match which {
                    LoopJump::Last => Opcode::MARKLAST(idx),
                    LoopJump::Next => Opcode::MARKNEXT(idx),
                    LoopJump::Redo => Opcode::MARKREDO(idx),
                };
                self.em.emit(&op);
            }
        }
        Ok(())
    }

    fn expr(&mut self, st: &mut SubState, e: &Expr) -> Result<RegisterId, CompileError> {
        match e {
            Expr::Int(v) => {
                let r = st.alloc()?;
                match i32::try_from(*v) {
                    Ok(k) => self.em.emit(&Opcode::LOADI(r, k)),
                    Err(_) => {
                        let c = self.int_const(*v);
                        self.em.emit(&Opcode::LOADC(r, c));
                    }
                }
                Ok(r)
            }

            Expr::Num(v) => {
                let r = st.alloc()?;
                let c = self.num_const(*v);
                self.em.emit(&Opcode::LOADC(r, c));
                Ok(r)
            }

            Expr::Str(s) => {
                let r = st.alloc()?;
                let c = self.str_const(s);
                self.em.emit(&Opcode::LOADC(r, c));
                Ok(r)
            }

            Expr::Undef => {
                let r = st.alloc()?;
                let c = self.undef_const();
                self.em.emit(&Opcode::LOADC(r, c));
                Ok(r)
            }

            Expr::Var(name) => st.var(name),

            Expr::Assign(name, v) => {
                let var = st.var(name)?;
                let r = self.expr(st, v)?;
                self.em.emit_move(var, r, st.pinned_count);
                st.release(r);
                Ok(var)
            }

            Expr::CompoundAssign(name, op, v) => {
                let var = st.var(name)?;
                let dst = self.binary(st, *op, var, v)?;
                self.em.emit_move(var, dst, st.pinned_count);
                st.release(dst);
                Ok(var)
            }

            Expr::Binary(op, l, r) => {
                let lr = self.expr(st, l)?;
                self.binary(st, *op, lr, r)
            }

            Expr::Unary(op, inner) => {
                let r = self.expr(st, inner)?;
                st.release(r);
                let dst = st.alloc()?;
                let op = match op {
                    UnOp::Neg => Opcode::NEG(dst, r),
                    UnOp::Not => Opcode::NOT(dst, r),
                };
                self.em.emit(&op);
                Ok(dst)
            }

            Expr::Length(inner) => {
                let r = self.expr(st, inner)?;
                st.release(r);
                let dst = st.alloc()?;
                self.em.emit(&Opcode::STRLEN(dst, r));
                Ok(dst)
            }

            Expr::Call(name, args) => {
                let sub = self.sub_index(name)?;
                let regs = self.args(st, args)?;
                for r in regs.iter().rev() {
                    st.release(*r);
                }
                let dst = st.alloc()?;
                self.em.emit(&Opcode::CALL(dst, sub, regs));
                Ok(dst)
            }

            Expr::CallRef(f, args) => {
                let fr = self.expr(st, f)?;
                let regs = self.args(st, args)?;
                for r in regs.iter().rev() {
                    st.release(*r);
                }
                st.release(fr);
                let dst = st.alloc()?;
                self.em.emit(&Opcode::CALLR(dst, fr, regs));
                Ok(dst)
            }

            Expr::CodeRef(name) => {
                if !self.names.contains_key(name) {
                    return Err(CompileError::UnknownSubroutine(name.clone()));
                }
                let r = st.alloc()?;
                let c = self.code_const(name);
                self.em.emit(&Opcode::LOADC(r, c));
                Ok(r)
            }
        }
    }

    /// Lower a binary operator with the left operand already in `lr`.
    fn binary(
        &mut self,
        st: &mut SubState,
        op: BinOp,
        lr: RegisterId,
        rhs: &Expr,
    ) -> Result<RegisterId, CompileError> {
        if op.has_immediate() {
            if let Expr::Int(v) = rhs {
                if let Ok(k) = i32::try_from(*v) {
                    st.release(lr);
                    let dst = st.alloc()?;
                    let op = match op {
                        BinOp::Add => Opcode::ADDI(dst, lr, k),
                        BinOp::Sub => Opcode::SUBI(dst, lr, k),
                        BinOp::Mul => Opcode::MULI(dst, lr, k),
                        BinOp::Div => Opcode::DIVI(dst, lr, k),
                        BinOp::Mod => Opcode::MODI(dst, lr, k),
                        _ => unreachable!("has_immediate"),
                    };
                    self.em.emit(&op);
                    return Ok(dst);
                }
            }
        }

        let rr = self.expr(st, rhs)?;
        st.release(rr);
        st.release(lr);
        let dst = st.alloc()?;
        let op = match op {
            BinOp::Add => Opcode::ADD(dst, lr, rr),
            BinOp::Sub => Opcode::SUB(dst, lr, rr),
            BinOp::Mul => Opcode::MUL(dst, lr, rr),
            BinOp::Div => Opcode::DIV(dst, lr, rr),
            BinOp::Mod => Opcode::MOD(dst, lr, rr),
            BinOp::NumLt => Opcode::LT(dst, lr, rr),
            BinOp::NumLe => Opcode::LE(dst, lr, rr),
            BinOp::NumGt => Opcode::GT(dst, lr, rr),
            BinOp::NumGe => Opcode::GE(dst, lr, rr),
            BinOp::NumEq => Opcode::EQ(dst, lr, rr),
            BinOp::NumNe => Opcode::NE(dst, lr, rr),
            BinOp::NumCmp => Opcode::CMP(dst, lr, rr),
            BinOp::StrLt => Opcode::SLT(dst, lr, rr),
            BinOp::StrLe => Opcode::SLE(dst, lr, rr),
            BinOp::StrGt => Opcode::SGT(dst, lr, rr),
            BinOp::StrGe => Opcode::SGE(dst, lr, rr),
            BinOp::StrEq => Opcode::SEQ(dst, lr, rr),
            BinOp::StrNe => Opcode::SNE(dst, lr, rr),
            BinOp::StrCmp => Opcode::SCMP(dst, lr, rr),
            BinOp::Concat => Opcode::CONCAT(dst, lr, rr),
            BinOp::Repeat => Opcode::REPEAT(dst, lr, rr),
        };
        self.em.emit(&op);
        Ok(dst)
    }

    /// Evaluate call arguments into a contiguous run of caller registers,
    /// the slice the callee receives as `arg[0..n)`.
    fn args(&mut self, st: &mut SubState, exprs: &[Expr]) -> Result<Vec<RegisterId>, CompileError> {
        let mut regs = Vec::with_capacity(exprs.len());
        for e in exprs {
            let r = self.expr(st, e)?;
            let r = if r < st.pinned_count {
                let t = st.alloc()?;
                self.em.emit_move(t, r, st.pinned_count);
                t
            } else {
                r
            };
            regs.push(r);
        }
        Ok(regs)
    }

    fn sub_index(&self, name: &str) -> Result<usize, CompileError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownSubroutine(name.to_string()))
    }

    fn undef_const(&mut self) -> usize {
        if let Some(i) = self.undef_const {
            return i;
        }
        self.constants.push(Scalar::Undef);
        let i = self.constants.len() - 1;
        self.undef_const = Some(i);
        i
    }

    fn str_const(&mut self, s: &str) -> usize {
        if let Some(&i) = self.str_consts.get(s) {
            return i;
        }
        self.constants.push(Scalar::str(s));
        let i = self.constants.len() - 1;
        self.str_consts.insert(s.to_string(), i);
        i
    }

    fn int_const(&mut self, v: i64) -> usize {
        if let Some(&i) = self.int_consts.get(&v) {
            return i;
        }
        self.constants.push(Scalar::Int(v));
        let i = self.constants.len() - 1;
        self.int_consts.insert(v, i);
        i
    }

    fn num_const(&mut self, v: f64) -> usize {
        let key = v.to_bits();
        if let Some(&i) = self.num_consts.get(&key) {
            return i;
        }
        self.constants.push(Scalar::Num(v));
        let i = self.constants.len() - 1;
        self.num_consts.insert(key, i);
        i
    }

    fn code_const(&mut self, name: &str) -> usize {
        if let Some(&i) = self.code_consts.get(name) {
            return i;
        }
        self.constants.push(Scalar::code_ref(name));
        let i = self.constants.len() - 1;
        self.code_consts.insert(name.to_string(), i);
        i
    }
}

fn pin_locals(body: &[Stmt], st: &mut SubState) -> Result<(), CompileError> {
    for s in body {
        pin_stmt(s, st)?;
    }
    Ok(())
}

fn pin_stmt(s: &Stmt, st: &mut SubState) -> Result<(), CompileError> {
    match s {
        Stmt::My(name, _) => {
            st.pin(name)?;
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            pin_locals(then_branch, st)?;
            pin_locals(else_branch, st)?;
        }
        Stmt::While { body, .. } | Stmt::Block { body, .. } => {
            pin_locals(body, st)?;
        }
        Stmt::For {
            init, step, body, ..
        } => {
            if let Some(i) = init {
                pin_stmt(i, st)?;
            }
            if let Some(s2) = step {
                pin_stmt(s2, st)?;
            }
            pin_locals(body, st)?;
        }
        _ => (),
    }
    Ok(())
}
