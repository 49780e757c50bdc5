use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod annotate;
pub mod builtins;
pub mod codegen;
pub mod model;
pub mod parser;

pub use annotate::annotate;
pub use builtins::{BuiltinRegistry, Param, ParamKind, Signature};
pub use codegen::{CodeGen, generate, listing};
pub use model::{Expression, InstrId, Instruction, InstructionKind, MathOp, UnaryKind};
pub use parser::{Parser, Script, parse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecompileMode {
    #[default]
    Pseudo,
    Listing,
    Annotate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub mode: DecompileMode,
    // raw string table of the script, used by `Annotate`
    #[serde(default)]
    pub strings: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum EmcError {
    #[error("line {line}: label {label:#x} already defined")]
    LabelRedefined { line: usize, label: u32 },

    #[error("line {line}: stack underflow on {mnemonic} (needs {needed}, {available} pending)")]
    StackUnderflow {
        line: usize,
        mnemonic: String,
        needed: usize,
        available: usize,
    },

    #[error("line {line}: PUSHRC 0 without a preceding call")]
    MissingCall { line: usize },

    #[error("line {line}: unexpected operand {operand:#x} to {mnemonic}")]
    UnexpectedOperand {
        line: usize,
        mnemonic: String,
        operand: i64,
    },

    #[error("line {line}: unknown unary operation {operand:#x}")]
    InvalidUnary { line: usize, operand: i64 },

    #[error("line {line}: {mnemonic} expects an operand")]
    MissingOperand { line: usize, mnemonic: String },

    #[error("line {line}: invalid operand `{text}` to {mnemonic}")]
    InvalidOperand {
        line: usize,
        mnemonic: String,
        text: String,
    },

    #[error("line {line}: label {label:#x} points at {addr:#x}, past the last instruction")]
    UnresolvedLabel { line: usize, label: u32, addr: usize },

    #[error("invalid builtin registry: {0}")]
    Registry(#[from] toml::de::Error),
}

impl EmcError {
    pub fn line(&self) -> Option<usize> {
        match self {
            EmcError::LabelRedefined { line, .. }
            | EmcError::StackUnderflow { line, .. }
            | EmcError::MissingCall { line }
            | EmcError::UnexpectedOperand { line, .. }
            | EmcError::InvalidUnary { line, .. }
            | EmcError::MissingOperand { line, .. }
            | EmcError::InvalidOperand { line, .. }
            | EmcError::UnresolvedLabel { line, .. } => Some(*line),
            EmcError::Registry(_) => None,
        }
    }
}

pub fn decompile_lines<I, S>(lines: I, registry: &BuiltinRegistry) -> Result<Vec<String>, EmcError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let script = Parser::new(registry).process(lines)?;
    Ok(generate(&script, registry))
}

pub fn decompile_with_options(
    source: &str,
    registry: &BuiltinRegistry,
    options: &DecompileOptions,
) -> Result<String, EmcError> {
    let lines = match options.mode {
        DecompileMode::Pseudo => generate(&parse(source, registry)?, registry),
        DecompileMode::Listing => listing(&parse(source, registry)?),
        DecompileMode::Annotate => {
            let source: Vec<&str> = source.lines().collect();
            annotate(&source, registry, options.strings.as_deref())
        }
    };
    let mut out = String::new();
    for l in lines {
        out.push_str(&l);
        out.push('\n');
    }
    Ok(out)
}

pub fn decompile(source: &str) -> Result<String, EmcError> {
    decompile_with_options(source, &BuiltinRegistry::builtin(), &DecompileOptions::default())
}
