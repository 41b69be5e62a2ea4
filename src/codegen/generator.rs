/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::HashMap;
use std::fmt;

use crate::ast::{Command, CommandKind, Condition, Expression, Ident, Value};
use crate::codegen::expression::simplify_condition;
use crate::codegen::instruction::{Instruction, JumpTarget, Register};
use crate::codegen::procedure::{ParamKind, Procedure};
use crate::errors::CompileError;

// Register conventions shared by the statement and expression lowering:
// addresses are computed into h, constants pass through g on their way to a,
// and e carries the callee slot address while arguments are stored.
pub(crate) const REG_ADDRESS: Register = Register::H;
pub(crate) const REG_VALUE: Register = Register::G;
const REG_CALL_SLOT: Register = Register::E;

// The STRK at a call site runs 4 instructions before control reaches the
// callee; adding the bias makes the saved address land just past the JUMP.
const RETURN_BIAS: u64 = 4;

// A non-fatal "may be used before set" diagnostic, raised instead of
// aborting when the questionable read sits inside a loop body (an earlier
// iteration may have performed the write).
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub name: String,
    pub line: usize,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "variable {} may be used before set, at line {}",
            self.name, self.line
        )
    }
}

// Lowers the commands of a single procedure into its instruction buffer.
// Holds the procedure mutably (symbol initialization flags change during
// emission) plus a read-only view of every previously emitted procedure,
// which is exactly the set of procedures this one is allowed to call.
pub(crate) struct CodeGenerator<'a> {
    pub(crate) proc: &'a mut Procedure,
    emitted: &'a [Procedure],
    index: &'a HashMap<String, usize>,
    pub(crate) code: Vec<Instruction>,
    first_line: usize,
    pub(crate) loop_depth: u32,
    pub(crate) line: usize,
    pub(crate) warnings: &'a mut Vec<Warning>,
}

impl<'a> CodeGenerator<'a> {
    pub(crate) fn new(
        proc: &'a mut Procedure,
        emitted: &'a [Procedure],
        index: &'a HashMap<String, usize>,
        warnings: &'a mut Vec<Warning>,
    ) -> Self {
        let first_line = proc.first_line;
        CodeGenerator {
            proc,
            emitted,
            index,
            code: Vec::new(),
            first_line,
            loop_depth: 0,
            line: 0,
            warnings,
        }
    }

    // Lower the whole procedure body, append the tail and hand the finished
    // buffer back to the procedure.
    pub(crate) fn run(mut self) -> Result<(), CompileError> {
        let commands = std::mem::take(&mut self.proc.commands);
        self.gen_commands(&commands)?;
        self.proc.commands = commands;

        if self.proc.name == "PROGRAM" {
            self.emit(Instruction::Halt);
        } else {
            self.gen_return();
        }

        self.proc.code = self.code;
        Ok(())
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    // Absolute address of the next instruction to be emitted.
    pub(crate) fn current_line(&self) -> usize {
        self.first_line + self.code.len()
    }

    // Resolve every pending jump in the given local buffer range to the
    // absolute target line. Each structured statement patches only the
    // range it emitted itself, so ranges never overlap.
    fn patch_range(&mut self, from: usize, to: usize, target: usize) {
        for instruction in &mut self.code[from..to] {
            if let Some(slot) = instruction.target_mut() {
                if *slot == JumpTarget::Unresolved {
                    *slot = JumpTarget::Line(target);
                }
            }
        }
    }

    fn gen_commands(&mut self, commands: &[Command]) -> Result<(), CompileError> {
        for command in commands {
            self.line = command.line;
            match &command.kind {
                CommandKind::Assign { target, expr } => self.gen_assign(target, expr)?,
                CommandKind::Read { target } => self.gen_read(target)?,
                CommandKind::Write { value } => self.gen_write(value)?,
                CommandKind::If { cond, body } => self.gen_if(cond, body)?,
                CommandKind::IfElse {
                    cond,
                    then_body,
                    else_body,
                } => self.gen_if_else(cond, then_body, else_body)?,
                CommandKind::While { cond, body } => self.gen_while(cond, body)?,
                CommandKind::Until { cond, body } => self.gen_until(cond, body)?,
                CommandKind::Call { name, args } => self.gen_call(name, args)?,
            }
        }
        Ok(())
    }

    fn gen_write(&mut self, value: &Expression) -> Result<(), CompileError> {
        match value {
            Expression::Value(Value::Const(n)) => self.gen_const(*n, Register::A),
            Expression::Value(Value::Load(ident)) => self.load_variable(ident, Register::A)?,
            expr => self.gen_expression(expr)?,
        }
        self.emit(Instruction::Write);
        Ok(())
    }

    fn gen_read(&mut self, target: &Ident) -> Result<(), CompileError> {
        self.load_address(target, REG_ADDRESS, true)?;
        self.emit(Instruction::Read);
        self.emit(Instruction::Store(REG_ADDRESS));
        Ok(())
    }

    // The target address computation may clobber a, so the value is parked
    // in d across it.
    fn gen_assign(&mut self, target: &Ident, expr: &Expression) -> Result<(), CompileError> {
        self.gen_expression(expr)?;
        self.emit(Instruction::Put(Register::D));
        self.load_address(target, REG_ADDRESS, true)?;
        self.emit(Instruction::Get(Register::D));
        self.emit(Instruction::Store(REG_ADDRESS));
        Ok(())
    }

    fn gen_if(&mut self, cond: &Condition, body: &[Command]) -> Result<(), CompileError> {
        match simplify_condition(cond) {
            Some(true) => self.gen_commands(body),
            Some(false) => Ok(()),
            None => {
                let cond_start = self.code.len();
                self.check_condition(cond)?;
                let body_start = self.code.len();
                self.gen_commands(body)?;
                let body_end = self.current_line();
                self.patch_range(cond_start, body_start, body_end);
                Ok(())
            }
        }
    }

    fn gen_if_else(
        &mut self,
        cond: &Condition,
        then_body: &[Command],
        else_body: &[Command],
    ) -> Result<(), CompileError> {
        match simplify_condition(cond) {
            Some(true) => self.gen_commands(then_body),
            Some(false) => self.gen_commands(else_body),
            None => {
                let cond_start = self.code.len();
                self.check_condition(cond)?;
                let then_start = self.code.len();
                self.gen_commands(then_body)?;
                self.emit(Instruction::Jump(JumpTarget::Unresolved));
                let else_start = self.code.len();
                self.gen_commands(else_body)?;
                let end = self.current_line();
                // the jump that skips the else branch
                self.patch_range(else_start - 1, else_start, end);
                // a false condition enters the else branch
                self.patch_range(cond_start, then_start, self.first_line + else_start);
                Ok(())
            }
        }
    }

    fn gen_while(&mut self, cond: &Condition, body: &[Command]) -> Result<(), CompileError> {
        match simplify_condition(cond) {
            Some(false) => Ok(()),
            Some(true) => {
                let loop_start = self.current_line();
                self.loop_depth += 1;
                self.gen_commands(body)?;
                self.loop_depth -= 1;
                self.emit(Instruction::Jump(JumpTarget::Line(loop_start)));
                Ok(())
            }
            None => {
                let cond_start = self.code.len();
                let cond_line = self.current_line();
                self.check_condition(cond)?;
                let body_start = self.code.len();
                self.loop_depth += 1;
                self.gen_commands(body)?;
                self.loop_depth -= 1;
                self.emit(Instruction::Jump(JumpTarget::Line(cond_line)));
                let loop_end = self.current_line();
                self.patch_range(cond_start, body_start, loop_end);
                Ok(())
            }
        }
    }

    // The body runs at least once; a failing condition jumps back to the
    // top and a passing one falls through.
    fn gen_until(&mut self, cond: &Condition, body: &[Command]) -> Result<(), CompileError> {
        let line = self.line;
        match simplify_condition(cond) {
            Some(true) => {
                self.loop_depth += 1;
                self.gen_commands(body)?;
                self.loop_depth -= 1;
                Ok(())
            }
            Some(false) => {
                let loop_start = self.current_line();
                self.loop_depth += 1;
                self.gen_commands(body)?;
                self.loop_depth -= 1;
                self.emit(Instruction::Jump(JumpTarget::Line(loop_start)));
                Ok(())
            }
            None => {
                let loop_start = self.current_line();
                self.loop_depth += 1;
                self.gen_commands(body)?;
                self.loop_depth -= 1;
                self.line = line;
                let cond_start = self.code.len();
                self.check_condition(cond)?;
                let cond_end = self.code.len();
                self.patch_range(cond_start, cond_end, loop_start);
                Ok(())
            }
        }
    }

    fn gen_call(&mut self, name: &str, args: &[String]) -> Result<(), CompileError> {
        let callee = self.callee(name).ok_or_else(|| CompileError::UndeclaredProcedure {
            name: name.to_string(),
            line: self.line,
        })?;

        if args.len() != callee.params().len() {
            return Err(CompileError::WrongArgumentCount {
                name: name.to_string(),
                expected: callee.params().len(),
                given: args.len(),
                line: self.line,
            });
        }

        // Fill the callee's parameter slots with the addresses of the
        // arguments, in declaration order.
        let mut current_offset = callee.memory_offset + 1;
        for (arg, param) in args.iter().zip(callee.params()) {
            self.gen_const(current_offset, Register::A);
            self.emit(Instruction::Put(REG_CALL_SLOT));

            let arg_kind = self.load_argument_address(arg)?;
            if arg_kind != param.kind {
                return Err(CompileError::WrongArgumentType {
                    name: name.to_string(),
                    arg: arg.to_string(),
                    line: self.line,
                });
            }
            if param.kind == ParamKind::Scalar && param.initialized {
                self.proc.mark_initialized(arg);
            }

            self.emit(Instruction::Store(REG_CALL_SLOT));
            current_offset += 1;
        }

        // Save the biased return address into the callee's return slot,
        // then jump. STRK captures its own line, so adding the bias lands
        // the return on the instruction after the JUMP.
        self.gen_const(RETURN_BIAS, Register::B);
        self.gen_const(callee.memory_offset, Register::A);
        self.emit(Instruction::Put(REG_CALL_SLOT));
        self.emit(Instruction::Strk(Register::A));
        self.emit(Instruction::Add(Register::B));
        self.emit(Instruction::Store(REG_CALL_SLOT));

        self.emit(Instruction::Jump(JumpTarget::Line(callee.first_line)));
        Ok(())
    }

    // A callable procedure is one that has already been emitted; this
    // covers exactly the procedures declared before the current one.
    fn callee(&self, name: &str) -> Option<&'a Procedure> {
        match self.index.get(name) {
            Some(&i) if i < self.emitted.len() => Some(&self.emitted[i]),
            _ => None,
        }
    }

    // Compute the address an argument contributes to its slot: locals
    // contribute their cell (or base cell), reference parameters the
    // dereferenced address stored in their own slot.
    fn load_argument_address(&mut self, name: &str) -> Result<ParamKind, CompileError> {
        if let Some(param) = self.proc.param(name) {
            let (kind, slot) = (param.kind, param.slot);
            match kind {
                ParamKind::Scalar => {
                    self.gen_const(slot, Register::A);
                    self.emit(Instruction::Load(Register::A));
                }
                ParamKind::Array => {
                    self.gen_const(slot, Register::A);
                    self.emit(Instruction::Load(Register::A));
                    self.gen_const(0, Register::F);
                    self.emit(Instruction::Add(Register::F));
                }
            }
            return Ok(kind);
        }

        use crate::codegen::procedure::Local;
        match self.proc.local(name) {
            Some(Local::Scalar { offset, .. }) => {
                let offset = *offset;
                self.gen_const(offset, Register::A);
                Ok(ParamKind::Scalar)
            }
            Some(Local::Array { offset, .. }) => {
                let offset = *offset;
                self.gen_const(offset, Register::A);
                Ok(ParamKind::Array)
            }
            None => Err(CompileError::UndeclaredVariable {
                name: name.to_string(),
                line: self.line,
            }),
        }
    }

    // Return sequence: load the saved address out of the return slot and
    // jump through it.
    fn gen_return(&mut self) {
        let memory_offset = self.proc.memory_offset;
        self.gen_const(memory_offset, Register::A);
        self.emit(Instruction::Load(Register::A));
        self.emit(Instruction::Jumpr(Register::A));
    }
}
