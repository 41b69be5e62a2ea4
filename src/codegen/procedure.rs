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

use crate::ast::Command;
use crate::codegen::instruction::Instruction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    Array,
}

// A by-reference parameter. The slot cell holds the address of the caller's
// variable (or array base) for the duration of the call. The initialized
// flag records whether the procedure body ever writes through the slot; call
// sites consult it to propagate initialization back to their arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub slot: u64,
    pub initialized: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Local {
    Scalar { offset: u64, initialized: bool },
    Array { offset: u64, len: u64 },
}

// One procedure of the compiled program.
//
// Memory layout: the cell at memory_offset holds the return address, the
// next cells are the parameter slots in declaration order, and local
// scalars and arrays follow. Procedures occupy disjoint cell ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub memory_offset: u64,
    params: Vec<Param>,
    locals: HashMap<String, Local>,
    pub commands: Vec<Command>,
    pub first_line: usize,
    pub code: Vec<Instruction>,
    next_cell: u64,
}

impl Procedure {
    pub fn new(name: &str, memory_offset: u64) -> Self {
        Procedure {
            name: name.to_string(),
            memory_offset,
            params: Vec::new(),
            locals: HashMap::new(),
            commands: Vec::new(),
            first_line: 0,
            code: Vec::new(),
            // the first cell is reserved for the return address
            next_cell: memory_offset + 1,
        }
    }

    pub fn add_param(&mut self, name: &str, kind: ParamKind) {
        let slot = self.next_cell;
        self.next_cell += 1;
        self.params.push(Param {
            name: name.to_string(),
            kind,
            slot,
            initialized: false,
        });
    }

    pub fn add_scalar(&mut self, name: &str) {
        let offset = self.next_cell;
        self.next_cell += 1;
        self.locals.insert(
            name.to_string(),
            Local::Scalar {
                offset,
                initialized: false,
            },
        );
    }

    pub fn add_array(&mut self, name: &str, len: u64) {
        let offset = self.next_cell;
        self.next_cell += len;
        self.locals
            .insert(name.to_string(), Local::Array { offset, len });
    }

    // First cell past everything this procedure allocated; the next
    // procedure's memory block starts here.
    pub fn last_index(&self) -> u64 {
        self.next_cell
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Param> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn local(&self, name: &str) -> Option<&Local> {
        self.locals.get(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.param(name).is_some() || self.locals.contains_key(name)
    }

    // Record that the named scalar has been written to. Arrays are not
    // tracked; unknown names are the caller's problem.
    pub fn mark_initialized(&mut self, name: &str) {
        if let Some(param) = self.param_mut(name) {
            param.initialized = true;
        } else if let Some(Local::Scalar { initialized, .. }) = self.locals.get_mut(name) {
            *initialized = true;
        }
    }
}

// ------------- unit tests -------------
