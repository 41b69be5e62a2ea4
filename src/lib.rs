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

pub mod ast;
pub mod codegen;
pub mod errors;
pub mod parser;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use codegen::{Program, Warning};

#[derive(Debug)]
pub struct Compiled {
    pub program: Program,
    pub warnings: Vec<Warning>,
}

pub fn compile_source(source: &str) -> Result<Compiled> {
    let table = parser::parse_source(source).context("Failed during parsing stage")?;

    let (program, warnings) = table
        .emit_all()
        .context("Failed during code generation stage")?;

    Ok(Compiled { program, warnings })
}

pub fn compile_file(source_path: &Path) -> Result<Compiled> {
    let source = fs::read_to_string(source_path)
        .with_context(|| format!("Failed to read input file: {}", source_path.display()))?;

    compile_source(&source)
}
