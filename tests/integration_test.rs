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

use impc::codegen::{Instruction, JumpTarget, Program};
use impc::errors::CompileError;

// A minimal interpreter for the target machine, just enough to execute
// compiled programs in tests.
mod machine {
    use impc::codegen::{Instruction, JumpTarget, Program, Register};
    use std::collections::HashMap;

    const STEP_LIMIT: usize = 2_000_000;

    pub fn run(program: &Program, input: &[u64]) -> Vec<u64> {
        let code = program.instructions();
        let mut regs = [0u64; 8];
        let mut memory: HashMap<u64, u64> = HashMap::new();
        let mut input = input.iter().copied();
        let mut output = Vec::new();
        let mut pc = 0usize;

        fn target(t: JumpTarget) -> usize {
            match t {
                JumpTarget::Line(n) => n,
                JumpTarget::Unresolved => panic!("unresolved jump executed"),
            }
        }

        for _ in 0..STEP_LIMIT {
            match code[pc] {
                Instruction::Read => {
                    regs[0] = input.next().expect("program read past end of input");
                    pc += 1;
                }
                Instruction::Write => {
                    output.push(regs[0]);
                    pc += 1;
                }
                Instruction::Load(r) => {
                    regs[0] = *memory.get(&regs[r as usize]).unwrap_or(&0);
                    pc += 1;
                }
                Instruction::Store(r) => {
                    memory.insert(regs[r as usize], regs[0]);
                    pc += 1;
                }
                Instruction::Add(r) => {
                    regs[0] += regs[r as usize];
                    pc += 1;
                }
                Instruction::Sub(r) => {
                    regs[0] = regs[0].saturating_sub(regs[r as usize]);
                    pc += 1;
                }
                Instruction::Get(r) => {
                    regs[0] = regs[r as usize];
                    pc += 1;
                }
                Instruction::Put(r) => {
                    regs[r as usize] = regs[0];
                    pc += 1;
                }
                Instruction::Rst(r) => {
                    regs[r as usize] = 0;
                    pc += 1;
                }
                Instruction::Inc(r) => {
                    regs[r as usize] += 1;
                    pc += 1;
                }
                Instruction::Dec(r) => {
                    regs[r as usize] = regs[r as usize].saturating_sub(1);
                    pc += 1;
                }
                Instruction::Shl(r) => {
                    regs[r as usize] *= 2;
                    pc += 1;
                }
                Instruction::Shr(r) => {
                    regs[r as usize] /= 2;
                    pc += 1;
                }
                Instruction::Jump(t) => pc = target(t),
                Instruction::Jpos(t) => pc = if regs[0] > 0 { target(t) } else { pc + 1 },
                Instruction::Jzero(t) => pc = if regs[0] == 0 { target(t) } else { pc + 1 },
                Instruction::Jumpr(r) => pc = regs[r as usize] as usize,
                Instruction::Strk(r) => {
                    regs[r as usize] = pc as u64;
                    pc += 1;
                }
                Instruction::Halt => return output,
            }
        }
        panic!("program exceeded step limit");
    }
}

fn compile(source: &str) -> Program {
    impc::compile_source(source).unwrap().program
}

fn compile_err(source: &str) -> CompileError {
    impc::compile_source(source)
        .unwrap_err()
        .downcast::<CompileError>()
        .unwrap()
}

fn assert_well_formed(program: &Program) {
    let len = program.instructions().len();
    for instruction in program.instructions() {
        match instruction.target() {
            Some(JumpTarget::Line(n)) => assert!(n < len, "jump to {n} outside program of {len}"),
            Some(JumpTarget::Unresolved) => panic!("unresolved jump in final program"),
            None => {}
        }
    }
}

// ------- end-to-end scenarios -------

#[test]
fn test_scenario_echo() {
    let program = compile("PROGRAM IS x IN READ x; WRITE x; END");
    assert_well_formed(&program);
    assert_eq!(machine::run(&program, &[42]), vec![42]);
}

#[test]
fn test_scenario_sum() {
    let program = compile("PROGRAM IS a, b IN READ a; READ b; WRITE a + b; END");
    assert_eq!(machine::run(&program, &[7, 5]), vec![12]);
}

#[test]
fn test_scenario_saturating_difference() {
    let program = compile("PROGRAM IS a, b IN READ a; READ b; WRITE a - b; END");
    assert_eq!(machine::run(&program, &[3, 10]), vec![0]);
}

#[test]
fn test_scenario_factorial() {
    let source = "PROGRAM IS n, r IN READ n; r := 1; WHILE n > 0 DO r := r * n; n := n - 1; ENDWHILE WRITE r; END";
    let program = compile(source);
    assert_well_formed(&program);
    assert_eq!(machine::run(&program, &[5]), vec![120]);
    assert_eq!(machine::run(&program, &[0]), vec![1]);
    assert_eq!(machine::run(&program, &[10]), vec![3628800]);
}

#[test]
fn test_scenario_quotient_and_remainder() {
    let source = "PROGRAM IS a, b, q, m IN READ a; READ b; q := a / b; m := a % b; WRITE q; WRITE m; END";
    let program = compile(source);
    assert_eq!(machine::run(&program, &[17, 5]), vec![3, 2]);
    assert_eq!(machine::run(&program, &[5, 17]), vec![0, 5]);
    assert_eq!(machine::run(&program, &[9, 0]), vec![0, 0]);
}

#[test]
fn test_scenario_swap_procedure() {
    let source = "PROCEDURE swap(x, y) IS t IN t := x; x := y; y := t; END \
                  PROGRAM IS a, b IN READ a; READ b; swap(a, b); WRITE a; WRITE b; END";
    let program = compile(source);
    assert_well_formed(&program);
    assert_eq!(machine::run(&program, &[1, 2]), vec![2, 1]);
}

// ------- reference grids -------

#[test]
fn test_arithmetic_against_reference() {
    let operators: [(&str, fn(u64, u64) -> u64); 5] = [
        ("+", |a, b| a + b),
        ("-", |a, b| a.saturating_sub(b)),
        ("*", |a, b| a * b),
        ("/", |a, b| if b == 0 { 0 } else { a / b }),
        ("%", |a, b| if b == 0 { 0 } else { a % b }),
    ];
    for (symbol, reference) in operators {
        let source = format!("PROGRAM IS a, b IN READ a; READ b; WRITE a {symbol} b; END");
        let program = compile(&source);
        let mut samples: Vec<(u64, u64)> = Vec::new();
        for a in 0..8 {
            for b in 0..8 {
                samples.push((a, b));
            }
        }
        samples.extend([(50, 7), (49, 7), (13, 1), (1, 13), (100, 10), (255, 2), (37, 50)]);
        for (a, b) in samples {
            assert_eq!(
                machine::run(&program, &[a, b]),
                vec![reference(a, b)],
                "{a} {symbol} {b}"
            );
        }
    }
}

#[test]
fn test_condition_relations_against_reference() {
    let relations: [(&str, fn(u64, u64) -> bool); 6] = [
        ("=", |a, b| a == b),
        ("!=", |a, b| a != b),
        ("<", |a, b| a < b),
        (">", |a, b| a > b),
        ("<=", |a, b| a <= b),
        (">=", |a, b| a >= b),
    ];
    for (symbol, reference) in relations {
        let source = format!(
            "PROGRAM IS a, b IN READ a; READ b; IF a {symbol} b THEN WRITE 1; ELSE WRITE 0; ENDIF END"
        );
        let program = compile(&source);
        assert_well_formed(&program);
        for a in 0..6 {
            for b in 0..6 {
                assert_eq!(
                    machine::run(&program, &[a, b]),
                    vec![u64::from(reference(a, b))],
                    "{a} {symbol} {b}"
                );
            }
        }
    }
}

#[test]
fn test_equal_operand_special_cases() {
    let program = compile(
        "PROGRAM IS a IN READ a; WRITE a + a; WRITE a * a; WRITE a / a; WRITE a % a; END",
    );
    assert_eq!(machine::run(&program, &[7]), vec![14, 49, 1, 0]);
    assert_eq!(machine::run(&program, &[0]), vec![0, 0, 0, 0]);
    assert_eq!(machine::run(&program, &[1]), vec![2, 1, 1, 0]);
}

#[test]
fn test_constant_materialization() {
    for value in [0u64, 1, 2, 3, 7, 8, 42, 255, 256, 1023, 1024, 65535, 4294967295] {
        let program = compile(&format!("PROGRAM IN WRITE {value}; END"));
        assert_eq!(machine::run(&program, &[]), vec![value], "materializing {value}");
    }
}

// ------- language features -------

#[test]
fn test_repeat_until_runs_body_at_least_once() {
    let source = "PROGRAM IS n, s IN READ n; s := 0; REPEAT s := s + n; n := n - 1; UNTIL n = 0; WRITE s; END";
    let program = compile(source);
    assert_eq!(machine::run(&program, &[5]), vec![15]);
    assert_eq!(machine::run(&program, &[1]), vec![1]);
}

#[test]
fn test_nested_loops() {
    // n * m by repeated addition
    let source = "PROGRAM IS n, m, s, i IN READ n; READ m; s := 0; \
                  WHILE n > 0 DO i := m; WHILE i > 0 DO s := s + 1; i := i - 1; ENDWHILE n := n - 1; ENDWHILE \
                  WRITE s; END";
    let program = compile(source);
    assert_well_formed(&program);
    assert_eq!(machine::run(&program, &[4, 7]), vec![28]);
    assert_eq!(machine::run(&program, &[0, 7]), vec![0]);
}

#[test]
fn test_array_literal_and_variable_index() {
    let source = "PROGRAM IS t[10], i IN t[5] := 7; WRITE t[5]; READ i; t[i] := 42; WRITE t[i]; END";
    let program = compile(source);
    assert_eq!(machine::run(&program, &[3]), vec![7, 42]);
}

#[test]
fn test_array_reference_parameter() {
    let source = "PROCEDURE set(T arr, i, v) IS IN arr[i] := v; END \
                  PROGRAM IS a[5], x, y IN x := 2; y := 9; set(a, x, y); WRITE a[2]; END";
    let program = compile(source);
    assert_well_formed(&program);
    assert_eq!(machine::run(&program, &[]), vec![9]);
}

#[test]
fn test_procedure_chain_passes_references_through() {
    // inner writes through a reference forwarded by outer
    let source = "PROCEDURE inner(x) IS IN x := 5; END \
                  PROCEDURE outer(y) IS IN inner(y); END \
                  PROGRAM IS a IN outer(a); WRITE a; END";
    let program = compile(source);
    assert_eq!(machine::run(&program, &[]), vec![5]);
}

#[test]
fn test_assign_then_write_matches_write_expression() {
    let assigned =
        compile("PROGRAM IS a, x IN READ a; x := a * 13; WRITE x; END");
    let direct = compile("PROGRAM IS a, x IN READ a; WRITE a * 13; END");
    for input in [0u64, 1, 6, 19] {
        assert_eq!(
            machine::run(&assigned, &[input]),
            machine::run(&direct, &[input])
        );
    }
}

// ------- initialization tracking -------

#[test]
fn test_uninitialized_read_rejected() {
    let err = compile_err("PROGRAM IS x, y IN x := y; END");
    assert_eq!(
        err,
        CompileError::Uninitialized {
            name: "y".to_string(),
            line: 1
        }
    );
}

#[test]
fn test_uninitialized_read_inside_loop_warns() {
    let source = "PROGRAM IS n, s IN READ n; WHILE n > 0 DO s := s + n; n := n - 1; ENDWHILE WRITE s; END";
    let compiled = impc::compile_source(source).unwrap();
    assert_eq!(compiled.warnings.len(), 1);
    assert_eq!(compiled.warnings[0].name, "s");
}

#[test]
fn test_call_propagates_initialization() {
    // the callee reads its parameter, so the caller's variable counts as
    // initialized after the call
    let source = "PROCEDURE init(x) IS IN READ x; END \
                  PROGRAM IS a IN init(a); WRITE a; END";
    let program = compile(source);
    assert_eq!(machine::run(&program, &[7]), vec![7]);
}

#[test]
fn test_call_without_write_does_not_initialize() {
    // the callee never writes its parameter, so the caller's variable is
    // still unset afterwards
    let source = "PROCEDURE noop(x) IS t IN t := 1; END \
                  PROGRAM IS a IN noop(a); WRITE a; END";
    let err = compile_err(source);
    assert!(matches!(err, CompileError::Uninitialized { name, .. } if name == "a"));
}

// ------- call-site checks -------

#[test]
fn test_wrong_argument_count_rejected() {
    let source = "PROCEDURE p(x, y) IS IN READ x; READ y; END \
                  PROGRAM IS a IN READ a; p(a); END";
    let err = compile_err(source);
    assert_eq!(
        err,
        CompileError::WrongArgumentCount {
            name: "p".to_string(),
            expected: 2,
            given: 1,
            line: 1
        }
    );
}

#[test]
fn test_array_passed_to_scalar_parameter_rejected() {
    let source = "PROCEDURE p(x) IS IN READ x; END \
                  PROGRAM IS t[3] IN p(t); END";
    let err = compile_err(source);
    assert!(matches!(err, CompileError::WrongArgumentType { arg, .. } if arg == "t"));
}

#[test]
fn test_scalar_passed_to_array_parameter_rejected() {
    let source = "PROCEDURE q(T t) IS IN t[0] := 1; END \
                  PROGRAM IS v IN READ v; q(v); END";
    let err = compile_err(source);
    assert!(matches!(err, CompileError::WrongArgumentType { arg, .. } if arg == "v"));
}

// ------- emitted-code shapes -------

#[test]
fn test_power_of_two_multiplication_uses_shifts() {
    let shifted = compile("PROGRAM IS a, b IN READ a; b := a * 8; WRITE b; END");
    let general = compile("PROGRAM IS a, b IN READ a; b := a * 6; WRITE b; END");
    assert!(!shifted.instructions().iter().any(|i| matches!(i, Instruction::Jpos(_))));
    assert!(general.instructions().iter().any(|i| matches!(i, Instruction::Jpos(_))));
    assert!(shifted.instructions().len() < general.instructions().len());
    assert_eq!(machine::run(&shifted, &[5]), vec![40]);
    assert_eq!(machine::run(&general, &[5]), vec![30]);
}

#[test]
fn test_power_of_two_division_uses_shifts() {
    let shifted = compile("PROGRAM IS a IN READ a; WRITE a / 4; END");
    let general = compile("PROGRAM IS a IN READ a; WRITE a / 5; END");
    assert!(!shifted.instructions().iter().any(|i| matches!(i, Instruction::Jzero(_))));
    assert!(general.instructions().iter().any(|i| matches!(i, Instruction::Jzero(_))));
    assert_eq!(machine::run(&shifted, &[21]), vec![5]);
}

#[test]
fn test_parity_by_mod_two() {
    let program = compile("PROGRAM IS a IN READ a; WRITE a % 2; END");
    // the parity path has no loop in it
    assert!(!program.instructions().iter().any(|i| matches!(i, Instruction::Jzero(_))));
    assert_eq!(machine::run(&program, &[7]), vec![1]);
    assert_eq!(machine::run(&program, &[8]), vec![0]);
}

#[test]
fn test_small_constant_subtraction_uses_dec() {
    let small = compile("PROGRAM IS a, b IN READ a; b := a - 3; WRITE b; END");
    let large = compile("PROGRAM IS a, b IN READ a; b := a - 15; WRITE b; END");
    let decs = |p: &Program| {
        p.instructions()
            .iter()
            .filter(|i| matches!(i, Instruction::Dec(_)))
            .count()
    };
    assert_eq!(decs(&small), 3);
    assert_eq!(decs(&large), 0);
    assert!(large.instructions().iter().any(|i| matches!(i, Instruction::Sub(_))));
    assert_eq!(machine::run(&small, &[10]), vec![7]);
    assert_eq!(machine::run(&large, &[10]), vec![0]);
}

#[test]
fn test_false_loop_emits_nothing() {
    let with_loop =
        compile("PROGRAM IS x IN READ x; WHILE 1 > 2 DO x := 0; ENDWHILE WRITE x; END");
    let without = compile("PROGRAM IS x IN READ x; WRITE x; END");
    assert_eq!(with_loop.instructions(), without.instructions());
}

#[test]
fn test_true_loop_with_empty_body_is_single_jump() {
    let looping =
        compile("PROGRAM IS x IN WRITE 0; WHILE 1 > 0 DO IF 1 > 2 THEN x := 1; ENDIF ENDWHILE END");
    let baseline = compile("PROGRAM IS x IN WRITE 0; END");
    assert_eq!(looping.instructions().len(), baseline.instructions().len() + 1);
    let jump_line = looping.instructions().len() - 2;
    assert_eq!(
        looping.instructions()[jump_line],
        Instruction::Jump(JumpTarget::Line(jump_line))
    );
}

#[test]
fn test_folded_conditional_picks_branch_at_compile_time() {
    let folded = compile("PROGRAM IN IF 1 < 2 THEN WRITE 1; ELSE WRITE 0; ENDIF END");
    let plain = compile("PROGRAM IN WRITE 1; END");
    assert_eq!(folded.instructions(), plain.instructions());
}

// ------- output invariants -------

#[test]
fn test_output_lines_are_valid_mnemonics() {
    let source = "PROCEDURE swap(x, y) IS t IN t := x; x := y; y := t; END \
                  PROGRAM IS a, b IN READ a; READ b; swap(a, b); WRITE a; WRITE b; END";
    let text = compile(source).to_string();
    let mnemonics = [
        "READ", "WRITE", "LOAD", "STORE", "ADD", "SUB", "GET", "PUT", "RST", "INC", "DEC", "SHL",
        "SHR", "JUMP", "JPOS", "JZERO", "JUMPR", "STRK", "HALT",
    ];
    assert!(text.starts_with("JUMP "));
    for line in text.lines() {
        assert!(!line.contains("finish"), "placeholder leaked: {line}");
        let mnemonic = line.split_whitespace().next().unwrap();
        assert!(mnemonics.contains(&mnemonic), "unknown mnemonic in {line}");
    }
}

#[test]
fn test_jump_targets_stay_in_range() {
    let sources = [
        "PROGRAM IS x IN READ x; IF x > 2 THEN WRITE 1; ENDIF END",
        "PROGRAM IS x IN READ x; IF x = 2 THEN WRITE 1; ELSE WRITE 0; ENDIF END",
        "PROGRAM IS x IN READ x; WHILE x > 0 DO x := x - 1; ENDWHILE WRITE x; END",
        "PROGRAM IS x IN READ x; REPEAT x := x - 1; UNTIL x = 0; WRITE x; END",
        "PROGRAM IS a, b IN READ a; READ b; WRITE a * b; WRITE a / b; WRITE a % b; END",
        "PROCEDURE p(x) IS IN READ x; END PROGRAM IS a IN p(a); WRITE a; END",
    ];
    for source in sources {
        assert_well_formed(&compile(source));
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let source = "PROCEDURE set(T arr, i, v) IS IN arr[i] := v; END \
                  PROGRAM IS a[5], x, y IN READ x; y := x * x; set(a, x, y); WRITE a[x]; END";
    assert_eq!(compile(source).to_string(), compile(source).to_string());
}

#[test]
fn test_entry_jump_reaches_main_past_procedures() {
    let source = "PROCEDURE p(x) IS IN READ x; END \
                  PROGRAM IS a IN p(a); WRITE a; END";
    let program = compile(source);
    match program.instructions()[0] {
        Instruction::Jump(JumpTarget::Line(entry)) => {
            assert!(entry > 1, "main starts after the procedure body");
            assert!(entry < program.instructions().len());
        }
        ref other => panic!("program must start with the entry jump, got {other}"),
    }
    assert_eq!(machine::run(&program, &[3]), vec![3]);
}

#[test]
fn test_compile_file_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.imp");
    std::fs::write(&path, "PROGRAM IS x IN READ x; WRITE x; END").unwrap();
    let compiled = impc::compile_file(&path).unwrap();
    assert_eq!(machine::run(&compiled.program, &[11]), vec![11]);
}
