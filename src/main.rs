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

use anyhow::{Context, Result};
use clap::Parser as clap_parser;
use impc::compile_file;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", author = "Connor Nolan")]
struct Opts {
    #[clap(short, long)]
    input: PathBuf,
    #[clap(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    let compiled = compile_file(&opts.input)?;

    for warning in &compiled.warnings {
        eprintln!("WARNING: {}", warning);
    }

    let file = File::create(&opts.output)
        .with_context(|| format!("Failed to create output file: {}", opts.output.display()))?;
    compiled.program.write(&mut BufWriter::new(file))?;

    println!(
        "Successfully compiled {} to {}",
        opts.input.display(),
        opts.output.display()
    );

    Ok(())
}
