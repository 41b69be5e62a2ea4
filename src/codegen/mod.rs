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

mod expression;
mod generator;
mod instruction;
mod procedure;

use std::collections::HashMap;
use std::fmt;
use std::io;

use crate::errors::CompileError;
use generator::CodeGenerator;

pub use generator::Warning;
pub use instruction::{Instruction, JumpTarget, Register};
pub use procedure::{Local, Param, ParamKind, Procedure};

// All procedures of a program in declaration order, together with the
// global allocation cursors: the next free memory cell and the next free
// instruction line.
#[derive(Debug)]
pub struct ProcedureTable {
    procedures: Vec<Procedure>,
    index: HashMap<String, usize>,
    memory_offset: u64,
    current_line: usize,
}

impl ProcedureTable {
    pub fn new() -> Self {
        ProcedureTable {
            procedures: Vec::new(),
            index: HashMap::new(),
            // cell 0 is reserved
            memory_offset: 1,
            current_line: 0,
        }
    }

    // Where the next procedure's memory block starts.
    pub fn memory_offset(&self) -> u64 {
        self.memory_offset
    }

    pub fn add(&mut self, procedure: Procedure, line: usize) -> Result<(), CompileError> {
        if self.index.contains_key(&procedure.name) {
            return Err(CompileError::Redeclaration {
                name: procedure.name.clone(),
                line,
            });
        }
        self.memory_offset = procedure.last_index();
        self.index
            .insert(procedure.name.clone(), self.procedures.len());
        self.procedures.push(procedure);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.index.get(name).map(|&i| &self.procedures[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    // Emit every procedure in declaration order and stitch the final
    // program: line 0 is reserved for the entry jump up front, each
    // procedure is generated against a read-only view of the ones emitted
    // before it, and the entry jump is resolved to PROGRAM's first line
    // once all layout is known.
    pub fn emit_all(mut self) -> Result<(Program, Vec<Warning>), CompileError> {
        if !self.contains("PROGRAM") {
            return Err(CompileError::MissingProgram);
        }

        let mut warnings = Vec::new();
        self.current_line = 1;
        for i in 0..self.procedures.len() {
            let (emitted, rest) = self.procedures.split_at_mut(i);
            let procedure = &mut rest[0];
            procedure.first_line = self.current_line;
            CodeGenerator::new(procedure, emitted, &self.index, &mut warnings).run()?;
            self.current_line += procedure.code.len();
        }

        // the lookup cannot fail, PROGRAM was checked above
        let entry = self.get("PROGRAM").unwrap().first_line;
        let mut instructions = Vec::with_capacity(self.current_line);
        instructions.push(Instruction::Jump(JumpTarget::Line(entry)));
        for procedure in &self.procedures {
            instructions.extend_from_slice(&procedure.code);
        }
        debug_assert!(
            instructions
                .iter()
                .all(|i| i.target() != Some(JumpTarget::Unresolved)),
            "unresolved jump survived emission"
        );

        Ok((Program { instructions }, warnings))
    }
}

impl Default for ProcedureTable {
    fn default() -> Self {
        ProcedureTable::new()
    }
}

// The finished program: the entry jump followed by the concatenated
// procedure buffers, one instruction per output line.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn write<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        for instruction in &self.instructions {
            writeln!(out, "{}", instruction)?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

// ------------- unit tests -------------
