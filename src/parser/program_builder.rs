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

use crate::ast::{Command, CommandKind, Condition, Expression, Ident, Index, Rel, Value};
use crate::codegen::{Local, ParamKind, Procedure, ProcedureTable};
use crate::errors::CompileError;
use crate::parser::{Rule, line_of, parse_num};
use pest::iterators::Pair;

// Builds the command list of one procedure, resolving every name against
// the procedure's parameters and locals and every call against the table
// of procedures declared so far.
pub(crate) struct CommandBuilder<'a> {
    table: &'a ProcedureTable,
    procedure: &'a Procedure,
}

impl<'a> CommandBuilder<'a> {
    pub(crate) fn new(table: &'a ProcedureTable, procedure: &'a Procedure) -> Self {
        CommandBuilder { table, procedure }
    }

    pub(crate) fn build_commands(&self, pair: Pair<Rule>) -> Result<Vec<Command>, CompileError> {
        pair.into_inner()
            .map(|command| self.build_command(command))
            .collect()
    }

    fn build_command(&self, pair: Pair<Rule>) -> Result<Command, CompileError> {
        let pair = pair.into_inner().next().unwrap();
        let line = line_of(&pair);
        let kind = match pair.as_rule() {
            Rule::assign => {
                let mut parts = pair.into_inner();
                let target = self.build_identifier(parts.next().unwrap())?;
                let expr = self.build_expression(parts.next().unwrap())?;
                CommandKind::Assign { target, expr }
            }
            Rule::if_block => {
                let mut parts = pair.into_inner();
                let cond = self.build_condition(parts.next().unwrap())?;
                let body = self.build_commands(parts.next().unwrap())?;
                match parts.next() {
                    Some(else_block) => {
                        let else_body =
                            self.build_commands(else_block.into_inner().next().unwrap())?;
                        CommandKind::IfElse {
                            cond,
                            then_body: body,
                            else_body,
                        }
                    }
                    None => CommandKind::If { cond, body },
                }
            }
            Rule::while_block => {
                let mut parts = pair.into_inner();
                let cond = self.build_condition(parts.next().unwrap())?;
                let body = self.build_commands(parts.next().unwrap())?;
                CommandKind::While { cond, body }
            }
            Rule::repeat_block => {
                let mut parts = pair.into_inner();
                let body = self.build_commands(parts.next().unwrap())?;
                let cond = self.build_condition(parts.next().unwrap())?;
                CommandKind::Until { cond, body }
            }
            Rule::read_stmt => CommandKind::Read {
                target: self.build_identifier(pair.into_inner().next().unwrap())?,
            },
            Rule::write_stmt => CommandKind::Write {
                value: self.build_expression(pair.into_inner().next().unwrap())?,
            },
            Rule::call_stmt => self.build_call(pair)?,
            _ => unreachable!("Unknown command rule: {:?}", pair.as_rule()),
        };
        Ok(Command { line, kind })
    }

    fn build_call(&self, pair: Pair<Rule>) -> Result<CommandKind, CompileError> {
        let line = line_of(&pair);
        let mut parts = pair.into_inner();
        let name = parts.next().unwrap().as_str().to_string();
        if name == self.procedure.name {
            return Err(CompileError::RecursiveCall { name, line });
        }
        if !self.table.contains(&name) {
            return Err(CompileError::UndeclaredProcedure { name, line });
        }

        let mut args = Vec::new();
        for arg in parts.next().unwrap().into_inner() {
            let arg_name = arg.as_str();
            if !self.procedure.is_declared(arg_name) {
                return Err(CompileError::UndeclaredVariable {
                    name: arg_name.to_string(),
                    line: line_of(&arg),
                });
            }
            args.push(arg_name.to_string());
        }
        Ok(CommandKind::Call { name, args })
    }

    fn build_identifier(&self, pair: Pair<Rule>) -> Result<Ident, CompileError> {
        let line = line_of(&pair);
        let mut parts = pair.into_inner();
        let name = parts.next().unwrap().as_str().to_string();
        match parts.next() {
            // a bare name must be a scalar
            None => {
                if let Some(param) = self.procedure.param(&name) {
                    return match param.kind {
                        ParamKind::Scalar => Ok(Ident::Scalar(name)),
                        ParamKind::Array => Err(CompileError::MissingIndex { name, line }),
                    };
                }
                match self.procedure.local(&name) {
                    Some(Local::Scalar { .. }) => Ok(Ident::Scalar(name)),
                    Some(Local::Array { .. }) => Err(CompileError::MissingIndex { name, line }),
                    None => Err(CompileError::UndeclaredVariable { name, line }),
                }
            }
            // an indexed name must be an array, locally declared or passed
            // by reference
            Some(index_pair) => {
                let index = self.build_index(index_pair)?;
                if let Some(param) = self.procedure.param(&name) {
                    return match param.kind {
                        ParamKind::Array => Ok(Ident::RefArray(name, index)),
                        ParamKind::Scalar => Err(CompileError::NotAnArray { name, line }),
                    };
                }
                match self.procedure.local(&name) {
                    Some(Local::Array { .. }) => Ok(Ident::Array(name, index)),
                    Some(Local::Scalar { .. }) => Err(CompileError::NotAnArray { name, line }),
                    None => Err(CompileError::UndeclaredArray { name, line }),
                }
            }
        }
    }

    fn build_index(&self, pair: Pair<Rule>) -> Result<Index, CompileError> {
        let pair = pair.into_inner().next().unwrap();
        match pair.as_rule() {
            Rule::num => Ok(Index::Literal(parse_num(&pair)?)),
            Rule::pid => {
                let line = line_of(&pair);
                let name = pair.as_str().to_string();
                let scalar = matches!(
                    self.procedure.param(&name), Some(p) if p.kind == ParamKind::Scalar
                ) || matches!(self.procedure.local(&name), Some(Local::Scalar { .. }));
                if !scalar {
                    return Err(CompileError::UndeclaredVariable { name, line });
                }
                Ok(Index::Variable(name))
            }
            _ => unreachable!("Unknown index rule: {:?}", pair.as_rule()),
        }
    }

    fn build_value(&self, pair: Pair<Rule>) -> Result<Value, CompileError> {
        let pair = pair.into_inner().next().unwrap();
        match pair.as_rule() {
            Rule::num => Ok(Value::Const(parse_num(&pair)?)),
            Rule::identifier => Ok(Value::Load(self.build_identifier(pair)?)),
            _ => unreachable!("Unknown value rule: {:?}", pair.as_rule()),
        }
    }

    fn build_expression(&self, pair: Pair<Rule>) -> Result<Expression, CompileError> {
        let mut parts = pair.into_inner();
        let lhs = self.build_value(parts.next().unwrap())?;
        match parts.next() {
            None => Ok(Expression::Value(lhs)),
            Some(op) => {
                let rhs = self.build_value(parts.next().unwrap())?;
                Ok(match op.as_str() {
                    "+" => Expression::Add(lhs, rhs),
                    "-" => Expression::Sub(lhs, rhs),
                    "*" => Expression::Mul(lhs, rhs),
                    "/" => Expression::Div(lhs, rhs),
                    "%" => Expression::Mod(lhs, rhs),
                    other => unreachable!("Unknown operator: {}", other),
                })
            }
        }
    }

    fn build_condition(&self, pair: Pair<Rule>) -> Result<Condition, CompileError> {
        let mut parts = pair.into_inner();
        let lhs = self.build_value(parts.next().unwrap())?;
        let rel = match parts.next().unwrap().as_str() {
            "=" => Rel::Eq,
            "!=" => Rel::Ne,
            "<" => Rel::Lt,
            ">" => Rel::Gt,
            "<=" => Rel::Le,
            ">=" => Rel::Ge,
            other => unreachable!("Unknown relation: {}", other),
        };
        let rhs = self.build_value(parts.next().unwrap())?;
        Ok(Condition { rel, lhs, rhs })
    }
}
