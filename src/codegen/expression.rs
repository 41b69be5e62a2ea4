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

use crate::ast::{Condition, Expression, Ident, Index, Rel, Value};
use crate::codegen::generator::{CodeGenerator, REG_ADDRESS, REG_VALUE, Warning};
use crate::codegen::instruction::Instruction::*;
use crate::codegen::instruction::{JumpTarget, Register};
use crate::codegen::procedure::{Local, ParamKind};
use crate::errors::CompileError;

// Largest constant worth expanding into a run of INC (or DEC) instructions;
// anything bigger goes through the general add/sub path.
const SMALL_CONST: u64 = 12;

impl<'a> CodeGenerator<'a> {
    // Materialize a constant bit by bit: shift in every bit from the most
    // significant down, incrementing where the bit is set.
    pub(crate) fn gen_const(&mut self, value: u64, reg: Register) {
        self.emit(Rst(reg));
        if value == 0 {
            return;
        }
        let bits = 64 - value.leading_zeros();
        for i in (1..bits).rev() {
            if value >> i & 1 == 1 {
                self.emit(Inc(reg));
            }
            self.emit(Shl(reg));
        }
        if value & 1 == 1 {
            self.emit(Inc(reg));
        }
    }

    // Evaluate an expression into register a.
    pub(crate) fn gen_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::Value(v) => self.gen_value(v, Register::A),
            Expression::Add(e1, e2) => self.gen_add(e1, e2),
            Expression::Sub(e1, e2) => self.gen_sub(e1, e2),
            Expression::Mul(e1, e2) => self.gen_mul(e1, e2),
            Expression::Div(e1, e2) => self.gen_div(e1, e2),
            Expression::Mod(e1, e2) => self.gen_mod(e1, e2),
        }
    }

    // Evaluate a single operand into the given register (via a).
    fn gen_value(&mut self, value: &Value, dest: Register) -> Result<(), CompileError> {
        match value {
            Value::Const(n) => {
                self.gen_const(*n, REG_VALUE);
                self.emit(Get(REG_VALUE));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
            Value::Load(ident) => self.load_variable(ident, dest),
        }
    }

    fn gen_add(&mut self, e1: &Value, e2: &Value) -> Result<(), CompileError> {
        if let (Value::Const(a), Value::Const(b)) = (e1, e2) {
            self.gen_const(a + b, Register::A);
            return Ok(());
        }
        // addition commutes; keep a lone constant on the right
        let (e1, e2) = match e1 {
            Value::Const(_) => (e2, e1),
            _ => (e1, e2),
        };
        if e1 == e2 {
            self.gen_value(e1, Register::A)?;
            self.emit(Shl(Register::A));
            return Ok(());
        }
        if let Value::Const(k) = e2 {
            if *k < SMALL_CONST {
                self.gen_value(e1, Register::A)?;
                for _ in 0..*k {
                    self.emit(Inc(Register::A));
                }
                return Ok(());
            }
        }
        self.gen_value(e2, Register::B)?;
        self.gen_value(e1, Register::A)?;
        self.emit(Add(Register::B));
        Ok(())
    }

    // Subtraction saturates at zero, like the target's SUB.
    fn gen_sub(&mut self, e1: &Value, e2: &Value) -> Result<(), CompileError> {
        if let (Value::Const(a), Value::Const(b)) = (e1, e2) {
            let val = a.saturating_sub(*b);
            if val > 0 {
                self.gen_const(val, Register::A);
            } else {
                self.emit(Rst(Register::A));
            }
            return Ok(());
        }
        if let Value::Const(k) = e2 {
            if *k < SMALL_CONST {
                self.gen_value(e1, Register::A)?;
                for _ in 0..*k {
                    self.emit(Dec(Register::A));
                }
                return Ok(());
            }
        } else if let Value::Const(0) = e1 {
            self.emit(Rst(Register::A));
            return Ok(());
        }
        self.gen_value(e1, Register::B)?;
        self.gen_value(e2, Register::C)?;
        self.emit(Get(Register::B));
        self.emit(Sub(Register::C));
        Ok(())
    }

    fn gen_mul(&mut self, e1: &Value, e2: &Value) -> Result<(), CompileError> {
        if let (Value::Const(a), Value::Const(b)) = (e1, e2) {
            self.gen_const(a * b, Register::A);
            return Ok(());
        }
        // multiplication commutes; keep a lone constant on the right
        let (e1, e2) = match e1 {
            Value::Const(_) => (e2, e1),
            _ => (e1, e2),
        };
        if let Value::Const(k) = e2 {
            match *k {
                0 => {
                    self.emit(Rst(Register::A));
                    return Ok(());
                }
                1 => {
                    return self.gen_value(e1, Register::A);
                }
                k if k.is_power_of_two() => {
                    self.gen_value(e1, Register::A)?;
                    for _ in 0..k.trailing_zeros() {
                        self.emit(Shl(Register::A));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        if e1 == e2 {
            self.gen_value(e1, Register::A)?;
            self.emit(Put(Register::B));
            self.emit(Put(Register::C));
        } else {
            self.gen_value(e2, Register::C)?;
            self.gen_value(e1, Register::B)?;
        }
        self.gen_mul_loop();
        Ok(())
    }

    // Binary-shift multiplication over the operands in b and c, result in a.
    // Whichever operand is smaller is used as the multiplier: its low bit
    // decides whether the other operand joins the running sum in d, then the
    // multiplier halves and the addend doubles until the multiplier is gone.
    fn gen_mul_loop(&mut self) {
        let first_line = self.current_line() - 1;
        let jump = |n: usize| JumpTarget::Line(first_line + n);

        self.emit(Rst(Register::D));
        self.emit(Get(Register::C));
        self.emit(Sub(Register::B));
        self.emit(Jpos(jump(21)));
        self.emit(Jump(jump(8)));

        // c is the multiplier, b doubles
        self.emit(Shl(Register::B));
        self.emit(Shr(Register::C));
        self.emit(Get(Register::C));
        self.emit(Jzero(jump(32)));
        self.emit(Shr(Register::C));
        self.emit(Shl(Register::C));
        self.emit(Sub(Register::C));
        self.emit(Jpos(jump(15)));
        self.emit(Jump(jump(6)));
        self.emit(Get(Register::D));
        self.emit(Add(Register::B));
        self.emit(Put(Register::D));
        self.emit(Jump(jump(6)));

        // b is the multiplier, c doubles
        self.emit(Shl(Register::C));
        self.emit(Shr(Register::B));
        self.emit(Get(Register::B));
        self.emit(Jzero(jump(32)));
        self.emit(Shr(Register::B));
        self.emit(Shl(Register::B));
        self.emit(Sub(Register::B));
        self.emit(Jpos(jump(28)));
        self.emit(Jump(jump(19)));
        self.emit(Get(Register::D));
        self.emit(Add(Register::C));
        self.emit(Put(Register::D));
        self.emit(Jump(jump(19)));

        self.emit(Get(Register::D));
    }

    fn gen_div(&mut self, e1: &Value, e2: &Value) -> Result<(), CompileError> {
        if let (Value::Const(a), Value::Const(b)) = (e1, e2) {
            if *b > 0 {
                self.gen_const(a / b, Register::A);
            } else {
                self.emit(Rst(Register::A));
            }
            return Ok(());
        }
        if e1 == e2 {
            // x / x: 1 for non-zero x, 0 for zero
            self.gen_value(e1, Register::A)?;
            let line = self.current_line();
            self.emit(Jzero(JumpTarget::Line(line + 3)));
            self.emit(Rst(Register::A));
            self.emit(Inc(Register::A));
            return Ok(());
        }
        if let Value::Const(0) = e1 {
            self.emit(Rst(Register::A));
            return Ok(());
        }
        if let Value::Const(k) = e2 {
            match *k {
                0 => {
                    self.emit(Rst(Register::A));
                    return Ok(());
                }
                1 => {
                    return self.gen_value(e1, Register::A);
                }
                k if k.is_power_of_two() => {
                    self.gen_value(e1, Register::A)?;
                    for _ in 0..k.trailing_zeros() {
                        self.emit(Shr(Register::A));
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        self.gen_value(e1, Register::B)?;
        self.gen_value(e2, Register::C)?;
        self.gen_div_loop(DivMode::Quotient);
        Ok(())
    }

    fn gen_mod(&mut self, e1: &Value, e2: &Value) -> Result<(), CompileError> {
        if e1 == e2 {
            self.emit(Rst(Register::A));
            return Ok(());
        }
        if let (Value::Const(a), Value::Const(b)) = (e1, e2) {
            if *b > 0 {
                self.gen_const(a % b, Register::A);
            } else {
                self.emit(Rst(Register::A));
            }
            return Ok(());
        }
        if let Value::Const(0) = e1 {
            self.emit(Rst(Register::A));
            return Ok(());
        }
        if let Value::Const(k) = e2 {
            match *k {
                0 | 1 => {
                    self.emit(Rst(Register::A));
                    return Ok(());
                }
                2 => {
                    // parity: subtract the value with its low bit cleared
                    self.gen_value(e1, Register::A)?;
                    self.emit(Put(Register::B));
                    self.emit(Shr(Register::B));
                    self.emit(Shl(Register::B));
                    self.emit(Sub(Register::B));
                    return Ok(());
                }
                _ => {}
            }
        }
        self.gen_value(e1, Register::B)?;
        self.gen_value(e2, Register::C)?;
        self.gen_div_loop(DivMode::Remainder);
        Ok(())
    }

    // Restoring long division over dividend b and divisor c. The divisor is
    // doubled until it tops the remainder, then repeatedly subtracted and
    // halved, building the quotient in d and the remainder in e; the mode
    // picks which of the two lands in a. A zero divisor short-circuits with
    // both results zero.
    fn gen_div_loop(&mut self, mode: DivMode) {
        let first_line = self.current_line() - 1;
        let jump = |n: usize| JumpTarget::Line(first_line + n);

        self.emit(Rst(Register::D));
        self.emit(Rst(Register::E));
        self.emit(Get(Register::C));
        self.emit(Jzero(jump(37)));
        self.emit(Get(Register::B));
        self.emit(Put(Register::E));
        self.emit(Get(Register::C));
        self.emit(Put(Register::B));

        self.emit(Get(Register::E));
        self.emit(Sub(Register::B));
        self.emit(Jzero(jump(19)));
        self.emit(Get(Register::B));
        self.emit(Sub(Register::E));
        self.emit(Jzero(jump(17)));
        self.emit(Shr(Register::B));
        self.emit(Jump(jump(19)));
        self.emit(Shl(Register::B));
        self.emit(Jump(jump(12)));

        self.emit(Get(Register::B));
        self.emit(Sub(Register::E));
        self.emit(Jzero(jump(23)));
        self.emit(Jump(jump(37)));
        self.emit(Get(Register::E));
        self.emit(Sub(Register::B));
        self.emit(Put(Register::E));
        self.emit(Inc(Register::D));

        self.emit(Get(Register::B));
        self.emit(Sub(Register::E));
        self.emit(Jzero(jump(19)));
        self.emit(Shr(Register::B));
        self.emit(Get(Register::C));
        self.emit(Sub(Register::B));
        self.emit(Jzero(jump(35)));
        self.emit(Jump(jump(37)));
        self.emit(Shl(Register::D));
        self.emit(Jump(jump(27)));

        match mode {
            DivMode::Quotient => self.emit(Get(Register::D)),
            DivMode::Remainder => self.emit(Get(Register::E)),
        }
    }

    // ------- value and address loading -------

    pub(crate) fn load_variable(
        &mut self,
        ident: &Ident,
        dest: Register,
    ) -> Result<(), CompileError> {
        match ident {
            Ident::Scalar(name) => self.load_scalar(name, dest),
            Ident::Array(name, index) => {
                self.load_array_address(name, index, dest)?;
                self.emit(Load(dest));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
            Ident::RefArray(name, index) => {
                self.load_ref_array_address(name, index, dest)?;
                self.emit(Load(dest));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
        }
    }

    fn load_scalar(&mut self, name: &str, dest: Register) -> Result<(), CompileError> {
        if let Some(param) = self.proc.param(name) {
            if param.kind == ParamKind::Scalar {
                self.load_ref_scalar(name, dest);
                return Ok(());
            }
            return Err(CompileError::MissingIndex {
                name: name.to_string(),
                line: self.line,
            });
        }
        match self.proc.local(name) {
            Some(Local::Scalar {
                offset,
                initialized,
            }) => {
                let (offset, initialized) = (*offset, *initialized);
                if !initialized {
                    self.report_uninitialized(name)?;
                }
                self.load_from_memory(offset, dest);
                Ok(())
            }
            Some(Local::Array { .. }) => Err(CompileError::MissingIndex {
                name: name.to_string(),
                line: self.line,
            }),
            None => Err(CompileError::UndeclaredVariable {
                name: name.to_string(),
                line: self.line,
            }),
        }
    }

    // Read through a scalar reference parameter: the slot holds the
    // caller's address, so the load dereferences twice.
    fn load_ref_scalar(&mut self, name: &str, dest: Register) {
        // the caller checked the parameter exists
        let slot = self.proc.param(name).unwrap().slot;
        self.gen_const(slot, dest);
        self.emit(Load(dest));
        self.emit(Load(Register::A));
        if dest != Register::A {
            self.emit(Put(dest));
        }
    }

    fn load_from_memory(&mut self, address: u64, dest: Register) {
        self.gen_const(address, REG_ADDRESS);
        self.emit(Load(REG_ADDRESS));
        if dest != Register::A {
            self.emit(Put(dest));
        }
    }

    // Address of an element of a locally declared array: a literal index
    // folds into the base, a variable index is added at run time.
    fn load_array_address(
        &mut self,
        name: &str,
        index: &Index,
        dest: Register,
    ) -> Result<(), CompileError> {
        let offset = match self.proc.local(name) {
            Some(Local::Array { offset, .. }) => *offset,
            _ => {
                return Err(CompileError::UndeclaredArray {
                    name: name.to_string(),
                    line: self.line,
                });
            }
        };
        match index {
            Index::Literal(k) => {
                self.gen_const(offset + k, dest);
                Ok(())
            }
            Index::Variable(idx) => {
                self.load_index(idx, Register::F)?;
                self.gen_const(offset, Register::A);
                self.emit(Add(Register::F));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
        }
    }

    // Address of an element of an array reference parameter: dereference
    // the slot for the base, then add the index.
    fn load_ref_array_address(
        &mut self,
        name: &str,
        index: &Index,
        dest: Register,
    ) -> Result<(), CompileError> {
        let slot = match self.proc.param(name) {
            Some(param) if param.kind == ParamKind::Array => param.slot,
            _ => {
                return Err(CompileError::UndeclaredArray {
                    name: name.to_string(),
                    line: self.line,
                });
            }
        };
        match index {
            Index::Literal(k) => {
                self.gen_const(slot, Register::A);
                self.emit(Load(Register::A));
                self.gen_const(*k, Register::F);
                self.emit(Add(Register::F));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
            Index::Variable(idx) => {
                self.load_index(idx, Register::F)?;
                self.gen_const(slot, Register::A);
                self.emit(Load(Register::A));
                self.emit(Add(Register::F));
                if dest != Register::A {
                    self.emit(Put(dest));
                }
                Ok(())
            }
        }
    }

    // Load the scalar used as an array index.
    fn load_index(&mut self, name: &str, dest: Register) -> Result<(), CompileError> {
        if let Some(param) = self.proc.param(name) {
            if param.kind == ParamKind::Scalar {
                self.load_ref_scalar(name, dest);
                return Ok(());
            }
            return Err(CompileError::MissingIndex {
                name: name.to_string(),
                line: self.line,
            });
        }
        match self.proc.local(name) {
            Some(Local::Scalar {
                offset,
                initialized,
            }) => {
                let (offset, initialized) = (*offset, *initialized);
                if !initialized {
                    self.report_uninitialized(name)?;
                }
                self.load_from_memory(offset, dest);
                Ok(())
            }
            _ => Err(CompileError::UndeclaredVariable {
                name: name.to_string(),
                line: self.line,
            }),
        }
    }

    // Compute the address a READ or an assignment writes through, marking
    // the target initialized when asked to.
    pub(crate) fn load_address(
        &mut self,
        target: &Ident,
        dest: Register,
        init: bool,
    ) -> Result<(), CompileError> {
        match target {
            Ident::Array(name, index) => self.load_array_address(name, index, dest),
            Ident::RefArray(name, index) => self.load_ref_array_address(name, index, dest),
            Ident::Scalar(name) => {
                if let Some(param) = self.proc.param(name) {
                    if param.kind != ParamKind::Scalar {
                        return Err(CompileError::MissingIndex {
                            name: name.to_string(),
                            line: self.line,
                        });
                    }
                    let slot = param.slot;
                    self.gen_const(slot, dest);
                    self.emit(Load(dest));
                    if dest != Register::A {
                        self.emit(Put(dest));
                    }
                    if init {
                        self.proc.mark_initialized(name);
                    }
                    return Ok(());
                }
                match self.proc.local(name) {
                    Some(Local::Scalar { offset, .. }) => {
                        let offset = *offset;
                        self.gen_const(offset, dest);
                        if init {
                            self.proc.mark_initialized(name);
                        }
                        Ok(())
                    }
                    Some(Local::Array { .. }) => Err(CompileError::MissingIndex {
                        name: name.to_string(),
                        line: self.line,
                    }),
                    None => Err(CompileError::UndeclaredVariable {
                        name: name.to_string(),
                        line: self.line,
                    }),
                }
            }
        }
    }

    // Fatal outside loops; inside a loop body an earlier iteration may have
    // done the write, so the read is only reported.
    fn report_uninitialized(&mut self, name: &str) -> Result<(), CompileError> {
        if self.loop_depth == 0 {
            return Err(CompileError::Uninitialized {
                name: name.to_string(),
                line: self.line,
            });
        }
        self.warnings.push(Warning {
            name: name.to_string(),
            line: self.line,
        });
        Ok(())
    }

    // ------- conditions -------

    // Emit a fall-through-on-true check: a failing condition jumps to a
    // pending target the owning statement patches afterwards.
    pub(crate) fn check_condition(&mut self, cond: &Condition) -> Result<(), CompileError> {
        if let Value::Const(0) = cond.lhs {
            match cond.rel {
                Rel::Ge | Rel::Eq => {
                    // 0 >= x and 0 = x both hold exactly when x is zero
                    self.gen_value(&cond.rhs, Register::A)?;
                    let line = self.current_line();
                    self.emit(Jzero(JumpTarget::Line(line + 2)));
                    self.emit(Jump(JumpTarget::Unresolved));
                }
                Rel::Lt | Rel::Ne => {
                    self.gen_value(&cond.rhs, Register::A)?;
                    self.emit(Jzero(JumpTarget::Unresolved));
                }
                _ => unreachable!("condition should have been simplified"),
            }
            return Ok(());
        }
        if let Value::Const(0) = cond.rhs {
            match cond.rel {
                Rel::Le | Rel::Eq => {
                    self.gen_value(&cond.lhs, Register::A)?;
                    let line = self.current_line();
                    self.emit(Jzero(JumpTarget::Line(line + 2)));
                    self.emit(Jump(JumpTarget::Unresolved));
                }
                Rel::Gt | Rel::Ne => {
                    self.gen_value(&cond.lhs, Register::A)?;
                    self.emit(Jzero(JumpTarget::Unresolved));
                }
                _ => unreachable!("condition should have been simplified"),
            }
            return Ok(());
        }

        self.gen_value(&cond.lhs, Register::B)?;
        self.gen_value(&cond.rhs, Register::C)?;
        match cond.rel {
            Rel::Le => {
                self.emit(Get(Register::B));
                self.emit(Sub(Register::C));
                let line = self.current_line();
                self.emit(Jzero(JumpTarget::Line(line + 2)));
                self.emit(Jump(JumpTarget::Unresolved));
            }
            Rel::Ge => {
                self.emit(Get(Register::C));
                self.emit(Sub(Register::B));
                let line = self.current_line();
                self.emit(Jzero(JumpTarget::Line(line + 2)));
                self.emit(Jump(JumpTarget::Unresolved));
            }
            Rel::Lt => {
                self.emit(Get(Register::C));
                self.emit(Sub(Register::B));
                self.emit(Jzero(JumpTarget::Unresolved));
            }
            Rel::Gt => {
                self.emit(Get(Register::B));
                self.emit(Sub(Register::C));
                self.emit(Jzero(JumpTarget::Unresolved));
            }
            Rel::Eq => {
                // equal exactly when both saturating differences are zero
                self.emit(Get(Register::B));
                self.emit(Sub(Register::C));
                let line = self.current_line();
                self.emit(Jzero(JumpTarget::Line(line + 2)));
                self.emit(Jump(JumpTarget::Unresolved));
                self.emit(Get(Register::C));
                self.emit(Sub(Register::B));
                let line = self.current_line();
                self.emit(Jzero(JumpTarget::Line(line + 2)));
                self.emit(Jump(JumpTarget::Unresolved));
            }
            Rel::Ne => {
                // b - c > 0 proves inequality and skips the second test
                // with a non-zero accumulator
                self.emit(Get(Register::B));
                self.emit(Sub(Register::C));
                let line = self.current_line();
                self.emit(Jzero(JumpTarget::Line(line + 2)));
                let line = self.current_line();
                self.emit(Jump(JumpTarget::Line(line + 3)));
                self.emit(Get(Register::C));
                self.emit(Sub(Register::B));
                self.emit(Jzero(JumpTarget::Unresolved));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DivMode {
    Quotient,
    Remainder,
}

// Fold a condition whose outcome is forced by its shape: literal operands
// compare at compile time, comparisons against literal zero collapse where
// non-negative values leave one answer, and identical operand trees decide
// the reflexive relations.
pub(crate) fn simplify_condition(cond: &Condition) -> Option<bool> {
    match (&cond.lhs, &cond.rhs) {
        (Value::Const(a), Value::Const(b)) => Some(match cond.rel {
            Rel::Le => a <= b,
            Rel::Ge => a >= b,
            Rel::Lt => a < b,
            Rel::Gt => a > b,
            Rel::Eq => a == b,
            Rel::Ne => a != b,
        }),
        (Value::Const(0), _) => match cond.rel {
            Rel::Le => Some(true),
            Rel::Gt => Some(false),
            _ => None,
        },
        (_, Value::Const(0)) => match cond.rel {
            Rel::Ge => Some(true),
            Rel::Lt => Some(false),
            _ => None,
        },
        _ if cond.lhs == cond.rhs => Some(matches!(cond.rel, Rel::Ge | Rel::Le | Rel::Eq)),
        _ => None,
    }
}

// ------------- unit tests -------------
