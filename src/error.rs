// ABOUTME: Compile-time error types. Evaluation itself never fails — see eval.rs.

use thiserror::Error;

/// Everything that can go wrong while turning source text into a tree.
///
/// `eval()` has no equivalent error type: once a tree is compiled, it
/// evaluates unconditionally, with undefined arithmetic (division by zero,
/// overflow) surfacing as `NaN`/`+-inf` rather than a `Result`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unexpected number at byte {0}")]
    UnexpectedNumber(usize),

    #[error("unexpected word at byte {0}")]
    UnexpectedWord(usize),

    #[error("unexpected parenthesis at byte {0}")]
    UnexpectedParen(usize),

    #[error("missing operand at byte {0}")]
    MissingOperand(usize),

    #[error("unknown operator at byte {0}")]
    UnknownOperator(usize),

    #[error("unbalanced parentheses")]
    UnbalancedParens,

    #[error("assignment target must be a variable")]
    InvalidAssignTarget,

    #[error("unknown function or macro `{0}`")]
    UnknownCallable(String),

    #[error("$() requires a variable as its first argument")]
    MacroMissingVariable,

    #[error("operator applied with too few operands")]
    TooFewOperands,

    #[error("empty expression")]
    EmptySource,

    #[error("source exceeds the configured length limit ({0} bytes)")]
    SourceTooLong(usize),

    #[error("expression nesting exceeds the configured depth limit ({0})")]
    TooDeeplyNested(usize),

    #[error("environment exceeds the configured variable limit ({0})")]
    TooManyVariables(usize),
}
