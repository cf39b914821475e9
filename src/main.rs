mod config;
mod env;
mod error;
mod eval;
mod funcs;
mod parser;
mod token;
mod tree;
mod value;

use clap::Parser;
use config::{HELP_TEXT, WELCOME_MESSAGE, WELCOME_SUBTITLE};
use env::Environment;
use error::CompileError;
use eval::eval;
use funcs::{FuncDescriptor, FuncRegistry};
use rustyline::error::ReadlineError;
use rustyline::{Config, Editor};
use std::path::PathBuf;
use tree::Expr;
use value::{from_int, to_int, Num};

/// An embeddable arithmetic/logical expression compiler and evaluator
#[derive(Parser, Debug)]
#[command(name = "mathex")]
#[command(version = config::VERSION)]
#[command(about = "Compile and evaluate arithmetic/logical expressions")]
struct CliArgs {
    /// Script file to execute (optional - if not provided, starts REPL)
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut env = Environment::new();
    let funcs = register_demo_functions();

    if let Some(script_path) = args.script {
        run_script(&script_path, &mut env, &funcs)?;
        return Ok(());
    }

    run_repl(&mut env, &funcs)
}

/// Registers the demo host functions the REPL and script runner expose:
/// the usual math library plus a stateful `counter()` that exercises a
/// function's private per-call-site context block.
fn register_demo_functions() -> FuncRegistry {
    let mut funcs = FuncRegistry::new();
    funcs.register("sin", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).sin(), None);
    funcs.register("cos", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).cos(), None);
    funcs.register("sqrt", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).sqrt(), None);
    funcs.register("abs", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).abs(), None);
    funcs.register("floor", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).floor(), None);
    funcs.register("ceil", 0, |_d, args, _c, eval_arg| args.first().map(|a| eval_arg(a)).unwrap_or(0.0).ceil(), None);
    funcs.register("min", 0, |_d, args, _c, eval_arg| {
        args.iter().map(|a| eval_arg(a)).fold(Num::INFINITY, Num::min)
    }, None);
    funcs.register("max", 0, |_d, args, _c, eval_arg| {
        args.iter().map(|a| eval_arg(a)).fold(Num::NEG_INFINITY, Num::max)
    }, None);
    funcs.register("counter", 4, counter_invoke, Some(counter_cleanup));
    funcs
}

/// `counter()` returns how many times it has been called at this call
/// site, using its 4-byte context block as an i32 tally.
fn counter_invoke(_desc: &FuncDescriptor, _args: &[Expr], ctx: Option<&mut [u8]>, _eval_arg: &dyn Fn(&Expr) -> Num) -> Num {
    let ctx = ctx.expect("counter() is registered with ctx_size = 4");
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&ctx[..4]);
    let next = i32::from_le_bytes(bytes).wrapping_add(1);
    ctx[..4].copy_from_slice(&next.to_le_bytes());
    from_int(next)
}

fn counter_cleanup(_desc: &FuncDescriptor, ctx: &mut [u8]) {
    ctx[..4].copy_from_slice(&0i32.to_le_bytes());
}

fn run_script(path: &PathBuf, env: &mut Environment, funcs: &FuncRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("cannot read script file {}: {e}", path.display()))?;
    for line in contents.lines() {
        let line = strip_comment(line);
        if line.trim().is_empty() {
            continue;
        }
        match parser::compile(line, env, funcs) {
            Ok(tree) => {
                eval(&tree);
            }
            Err(e) => return Err(format!("compile error: {e}").into()),
        }
    }
    Ok(())
}

fn run_repl(env: &mut Environment, funcs: &FuncRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder().auto_add_history(true).build();
    let mut rl = Editor::<(), rustyline::history::DefaultHistory>::with_config(config)
        .map_err(|e| format!("failed to initialize REPL: {e}"))?;

    let history_file = ".mathex_history";
    let _ = rl.load_history(history_file);

    println!("{WELCOME_MESSAGE}");
    println!("{WELCOME_SUBTITLE}");

    loop {
        let readline = rl.readline("mathex> ");
        match readline {
            Ok(line) => {
                let trimmed = strip_comment(&line);
                match trimmed.trim() {
                    "" => continue,
                    "quit" | "exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "help" => {
                        println!("{HELP_TEXT}");
                        continue;
                    }
                    _ => {}
                }
                match parser::compile(trimmed, env, funcs) {
                    Ok(tree) => println!("=> {}", eval(&tree)),
                    Err(e) => report_compile_error(&e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err}");
                break;
            }
        }
    }

    let _ = rl.save_history(history_file);
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn report_compile_error(e: &CompileError) {
    eprintln!("compile error: {e}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_its_own_context_and_resets_on_drop() {
        let funcs = register_demo_functions();
        let mut env = Environment::new();
        let tree = parser::compile("counter()+counter()+counter()", &mut env, &funcs).unwrap();
        assert_eq!(eval(&tree), 6.0);
    }

    #[test]
    fn cloned_counter_node_starts_from_zero() {
        let funcs = register_demo_functions();
        let mut env = Environment::new();
        let tree = parser::compile("counter()", &mut env, &funcs).unwrap();
        assert_eq!(eval(&tree), 1.0);
        let cloned = tree.clone();
        assert_eq!(eval(&cloned), 1.0);
    }

    #[test]
    fn to_int_round_trip_used_by_counter_bytes() {
        assert_eq!(to_int(from_int(5)), 5);
    }
}
