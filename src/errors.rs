use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CompileError {
    #[error("Syntax Error: {0}")]
    PestError(#[from] pest::error::Error<crate::parser::Rule>),

    #[error("Redeclaration of {name}, at line {line}")]
    Redeclaration { name: String, line: usize },

    #[error("Undeclared variable {name}, at line {line}")]
    UndeclaredVariable { name: String, line: usize },

    #[error("Undeclared array {name}, at line {line}")]
    UndeclaredArray { name: String, line: usize },

    #[error("Undeclared procedure {name}, at line {line}")]
    UndeclaredProcedure { name: String, line: usize },

    #[error("No PROGRAM procedure declared")]
    MissingProgram,

    #[error("Array {name} used without an index, at line {line}")]
    MissingIndex { name: String, line: usize },

    #[error("{name} is not an array, at line {line}")]
    NotAnArray { name: String, line: usize },

    #[error("Procedure {name} takes {expected} arguments, got {given}, at line {line}")]
    WrongArgumentCount {
        name: String,
        expected: usize,
        given: usize,
        line: usize,
    },

    #[error("Wrong type of argument {arg} in call to {name}, at line {line}")]
    WrongArgumentType {
        name: String,
        arg: String,
        line: usize,
    },

    #[error("Procedure {name} cannot call itself, at line {line}")]
    RecursiveCall { name: String, line: usize },

    #[error("Uninitialized variable {name}, at line {line}")]
    Uninitialized { name: String, line: usize },

    #[error("Number literal too large, at line {line}")]
    NumberTooLarge { line: usize },
}
