// ABOUTME: Compile-time limits and REPL presentation constants

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "mathex v0.1.0";
pub const WELCOME_SUBTITLE: &str = "An embeddable arithmetic/logical expression compiler and evaluator";

/// Guards absent from the original evaluator's unbounded growth: the C
/// source's vectors grow without limit, which is fine for a library the
/// host trusts but not something to reproduce unconditionally here.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_source_len: usize,
    pub max_tree_depth: usize,
    pub max_variables: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_source_len: 64 * 1024,
            max_tree_depth: 256,
            max_variables: 4096,
        }
    }
}

pub const HELP_TEXT: &str = r#"
Available commands:
  quit or exit          - Exit the REPL

Type any expression to evaluate it, e.g. 2+3*4 or x=5,x*x.
Variables persist across lines. Use Ctrl-D or `quit` to exit.
"#;
