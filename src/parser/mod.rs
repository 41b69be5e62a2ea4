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

mod program_builder;

use crate::codegen::{ParamKind, Procedure, ProcedureTable};
use crate::errors::CompileError;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use program_builder::CommandBuilder;

// Derive the parser from our grammar file.
#[derive(Parser)]
#[grammar = "./grammar.pest"]
pub struct ImpParser;

// Parse a whole source file into a procedure table ready for code
// generation. Name resolution happens here: every identifier in a command
// is checked against the symbols of the procedure it appears in, and every
// call against the procedures declared so far.
pub fn parse_source(source: &str) -> Result<ProcedureTable, CompileError> {
    let mut pairs = ImpParser::parse(Rule::program_all, source)?;
    let mut table = ProcedureTable::new();

    // the parse succeeded, so the program_all pair exists
    let program = pairs.next().unwrap();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::procedure => build_procedure(pair, &mut table)?,
            Rule::main => build_main(pair, &mut table)?,
            Rule::EOI => {}
            _ => unreachable!("Unknown program rule: {:?}", pair.as_rule()),
        }
    }
    Ok(table)
}

pub(crate) fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

pub(crate) fn parse_num(pair: &Pair<Rule>) -> Result<u64, CompileError> {
    pair.as_str()
        .parse()
        .map_err(|_| CompileError::NumberTooLarge { line: line_of(pair) })
}

fn build_procedure(pair: Pair<Rule>, table: &mut ProcedureTable) -> Result<(), CompileError> {
    let line = line_of(&pair);
    let mut inner = pair.into_inner();

    let mut head = inner.next().unwrap().into_inner();
    let name = head.next().unwrap().as_str().to_string();
    let mut procedure = Procedure::new(&name, table.memory_offset());
    for param in head.next().unwrap().into_inner() {
        let param = param.into_inner().next().unwrap();
        match param.as_rule() {
            Rule::array_param => {
                let pid = param.into_inner().next().unwrap();
                procedure.add_param(pid.as_str(), ParamKind::Array);
            }
            Rule::pid => procedure.add_param(param.as_str(), ParamKind::Scalar),
            _ => unreachable!("Unknown parameter rule: {:?}", param.as_rule()),
        }
    }

    build_body(inner, &mut procedure, table)?;
    table.add(procedure, line)
}

fn build_main(pair: Pair<Rule>, table: &mut ProcedureTable) -> Result<(), CompileError> {
    let line = line_of(&pair);
    let mut procedure = Procedure::new("PROGRAM", table.memory_offset());
    build_body(pair.into_inner(), &mut procedure, table)?;
    table.add(procedure, line)
}

// Shared tail of a procedure or main: optional declarations, then the
// command block. Commands are attached last so the builder resolves them
// against the complete symbol set.
fn build_body(
    pairs: pest::iterators::Pairs<Rule>,
    procedure: &mut Procedure,
    table: &ProcedureTable,
) -> Result<(), CompileError> {
    let mut commands_pair = None;
    for pair in pairs {
        match pair.as_rule() {
            Rule::declarations => add_declarations(pair, procedure)?,
            Rule::commands => commands_pair = Some(pair),
            _ => unreachable!("Unknown body rule: {:?}", pair.as_rule()),
        }
    }

    // the grammar requires a command block
    let commands_pair = commands_pair.unwrap();
    let commands = CommandBuilder::new(table, procedure).build_commands(commands_pair)?;
    procedure.commands = commands;
    Ok(())
}

fn add_declarations(pair: Pair<Rule>, procedure: &mut Procedure) -> Result<(), CompileError> {
    for declaration in pair.into_inner() {
        let declaration = declaration.into_inner().next().unwrap();
        match declaration.as_rule() {
            Rule::array_decl => {
                let mut parts = declaration.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                let len = parse_num(&parts.next().unwrap())?;
                procedure.add_array(&name, len);
            }
            Rule::pid => procedure.add_scalar(declaration.as_str()),
            _ => unreachable!("Unknown declaration rule: {:?}", declaration.as_rule()),
        }
    }
    Ok(())
}

// ------------- unit tests -------------
