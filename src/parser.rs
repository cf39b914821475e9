// ABOUTME: Shunting-yard compiler: tokens in, one owned Expr tree out
// Sentinels on the operator stack (`(` for grouping, a call frame for
// `name(...)`) let a single operator-precedence loop handle grouping, calls,
// and macro invocation/definition uniformly.

use crate::config::Limits;
use crate::env::{Environment, VarHandle};
use crate::error::CompileError;
use crate::funcs::FuncRegistry;
use crate::token::{next_token, BinOpTok, Token, TokenFlags, UnOpTok};
use crate::tree::{BinOp, Expr, UnOp};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpTag {
    Un(UnOpTok),
    Bin(BinOpTok),
}

fn is_binary(tag: OpTag) -> bool {
    matches!(tag, OpTag::Bin(_))
}

fn is_right_assoc(tag: OpTag) -> bool {
    matches!(
        tag,
        OpTag::Bin(BinOpTok::Power) | OpTag::Bin(BinOpTok::Assign) | OpTag::Bin(BinOpTok::Comma)
    )
}

fn prec_level(tag: OpTag) -> u8 {
    use BinOpTok::*;
    match tag {
        OpTag::Un(_) => 1,
        OpTag::Bin(Power) | OpTag::Bin(Multiply) | OpTag::Bin(Divide) | OpTag::Bin(Remainder) => 2,
        OpTag::Bin(Plus) | OpTag::Bin(Minus) => 3,
        OpTag::Bin(Shl) | OpTag::Bin(Shr) => 4,
        OpTag::Bin(Lt) | OpTag::Bin(Le) | OpTag::Bin(Gt) | OpTag::Bin(Ge) | OpTag::Bin(EqOp) | OpTag::Bin(NeOp) => 5,
        OpTag::Bin(BitAnd) => 6,
        OpTag::Bin(BitOr) => 7,
        OpTag::Bin(BitXor) => 8,
        OpTag::Bin(LogicalAnd) => 9,
        OpTag::Bin(LogicalOr) => 10,
        OpTag::Bin(Assign) => 11,
        OpTag::Bin(Comma) => 12,
    }
}

/// Should the operator already on top of the stack (`top`) bind before we
/// push `new`? Ported directly from the reference evaluator's `expr_prec`:
/// a lower `prec_level` binds tighter, left-associative operators reduce on
/// equal precedence, right-associative ones only reduce on strictly lower
/// precedence of the incoming operator.
fn should_reduce(new: OpTag, top: OpTag) -> bool {
    let left_flag = is_binary(new) && !is_right_assoc(new);
    let (pn, pt) = (prec_level(new), prec_level(top));
    (left_flag && pn >= pt) || (pn > pt)
}

fn map_unary(op: UnOpTok) -> UnOp {
    match op {
        UnOpTok::Neg => UnOp::Neg,
        UnOpTok::Not => UnOp::Not,
        UnOpTok::BitNot => UnOp::BitNot,
    }
}

fn map_binary(op: BinOpTok) -> BinOp {
    use BinOpTok::*;
    match op {
        Power => BinOp::Power,
        Multiply => BinOp::Multiply,
        Divide => BinOp::Divide,
        Remainder => BinOp::Remainder,
        Plus => BinOp::Plus,
        Minus => BinOp::Minus,
        Shl => BinOp::Shl,
        Shr => BinOp::Shr,
        Lt => BinOp::Lt,
        Le => BinOp::Le,
        Gt => BinOp::Gt,
        Ge => BinOp::Ge,
        EqOp => BinOp::EqOp,
        NeOp => BinOp::NeOp,
        BitAnd => BinOp::BitAnd,
        BitOr => BinOp::BitOr,
        BitXor => BinOp::BitXor,
        LogicalAnd => BinOp::LogicalAnd,
        LogicalOr => BinOp::LogicalOr,
        Assign | Comma => unreachable!("Assign/Comma are bound as dedicated Expr variants"),
    }
}

#[derive(Debug, Clone, Copy)]
enum StackItem {
    Paren,
    Call,
    Op(OpTag),
}

struct ArgFrame {
    es_len: usize,
    name: String,
    args: Vec<Expr>,
}

/// Rewrite occurrences of `old` (by handle identity) to `new` throughout a
/// deep copy of `expr`. Used to splice a macro's parameter references to the
/// `$N` variables synthesized for a particular call site — see
/// `Compiler::expand_macro`.
fn rewrite_vars(expr: &Expr, rewrites: &[(VarHandle, VarHandle)]) -> Expr {
    let sub = |h: &VarHandle| {
        rewrites
            .iter()
            .find(|(old, _)| Rc::ptr_eq(old, h))
            .map(|(_, new)| Rc::clone(new))
            .unwrap_or_else(|| Rc::clone(h))
    };
    match expr {
        Expr::Const(n) => Expr::Const(*n),
        Expr::Var(h) => Expr::Var(sub(h)),
        Expr::Unary(op, a) => Expr::Unary(*op, Box::new(rewrite_vars(a, rewrites))),
        Expr::Binary(op, a, b) => Expr::Binary(*op, Box::new(rewrite_vars(a, rewrites)), Box::new(rewrite_vars(b, rewrites))),
        Expr::Assign(h, rhs) => Expr::Assign(sub(h), Box::new(rewrite_vars(rhs, rewrites))),
        Expr::Comma(a, b) => Expr::Comma(Box::new(rewrite_vars(a, rewrites)), Box::new(rewrite_vars(b, rewrites))),
        Expr::Func { desc, args, .. } => Expr::func(Rc::clone(desc), args.iter().map(|a| rewrite_vars(a, rewrites)).collect()),
    }
}

fn chain_comma(mut stmts: Vec<Expr>) -> Expr {
    let last = stmts.pop().expect("macro expansion always has a final expression");
    stmts.into_iter().rev().fold(last, |acc, e| Expr::Comma(Box::new(e), Box::new(acc)))
}

struct Compiler<'a> {
    src: &'a str,
    pos: usize,
    flags: TokenFlags,
    pending: Option<Token<'a>>,
    es: Vec<Expr>,
    os: Vec<StackItem>,
    frames: Vec<ArgFrame>,
    macros: HashMap<String, Vec<Expr>>,
    env: &'a mut Environment,
    funcs: &'a FuncRegistry,
    limits: Limits,
}

impl<'a> Compiler<'a> {
    fn new(src: &'a str, env: &'a mut Environment, funcs: &'a FuncRegistry, limits: Limits) -> Self {
        Compiler {
            src,
            pos: 0,
            flags: TokenFlags::initial(),
            pending: None,
            es: Vec::new(),
            os: Vec::new(),
            frames: Vec::new(),
            macros: HashMap::new(),
            env,
            funcs,
            limits,
        }
    }

    fn read_token(&mut self) -> Result<Option<Token<'a>>, CompileError> {
        if let Some(t) = self.pending.take() {
            return Ok(Some(t));
        }
        next_token(self.src, &mut self.pos, &mut self.flags)
    }

    fn push_back(&mut self, t: Token<'a>) {
        self.pending = Some(t);
    }

    fn check_depth(&self) -> Result<(), CompileError> {
        if self.os.len() + self.frames.len() > self.limits.max_tree_depth {
            return Err(CompileError::TooDeeplyNested(self.limits.max_tree_depth));
        }
        Ok(())
    }

    fn resolve_var(&mut self, name: &str) -> Result<VarHandle, CompileError> {
        if self.env.lookup(name).is_none() {
            let count = self.env.variables().count();
            if count >= self.limits.max_variables {
                return Err(CompileError::TooManyVariables(self.limits.max_variables));
            }
        }
        self.env
            .lookup_or_create(name)
            .ok_or(CompileError::UnexpectedWord(self.pos))
    }

    fn bind_top(&mut self) -> Result<(), CompileError> {
        let op = match self.os.pop() {
            Some(StackItem::Op(op)) => op,
            _ => unreachable!("bind_top only called when the stack top is an operator"),
        };
        match op {
            OpTag::Un(u) => {
                let a = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                self.es.push(Expr::Unary(map_unary(u), Box::new(a)));
            }
            OpTag::Bin(BinOpTok::Assign) => {
                let b = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                let a = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                let handle = match a {
                    Expr::Var(h) => h,
                    _ => return Err(CompileError::InvalidAssignTarget),
                };
                self.es.push(Expr::Assign(handle, Box::new(b)));
            }
            OpTag::Bin(BinOpTok::Comma) => {
                let b = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                let a = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                self.es.push(Expr::Comma(Box::new(a), Box::new(b)));
            }
            OpTag::Bin(b) => {
                let rhs = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                let lhs = self.es.pop().ok_or(CompileError::TooFewOperands)?;
                self.es.push(Expr::Binary(map_binary(b), Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(())
    }

    fn push_operator(&mut self, op: OpTag) -> Result<(), CompileError> {
        loop {
            if op == OpTag::Bin(BinOpTok::Comma) {
                if let Some(StackItem::Call) = self.os.last() {
                    let operand = self.es.pop().ok_or(CompileError::MissingOperand(self.pos))?;
                    self.frames.last_mut().unwrap().args.push(operand);
                    return Ok(());
                }
            }
            match self.os.last() {
                Some(StackItem::Op(top)) if should_reduce(op, *top) => {
                    self.bind_top()?;
                }
                _ => {
                    self.os.push(StackItem::Op(op));
                    return Ok(());
                }
            }
        }
    }

    fn close_paren_or_call(&mut self) -> Result<(), CompileError> {
        loop {
            match self.os.last() {
                Some(StackItem::Op(_)) => self.bind_top()?,
                Some(StackItem::Paren) | Some(StackItem::Call) => break,
                None => return Err(CompileError::UnbalancedParens),
            }
        }
        match self.os.pop().unwrap() {
            StackItem::Paren => Ok(()),
            StackItem::Call => {
                let frame = self.frames.pop().unwrap();
                let mut args = frame.args;
                if self.es.len() > frame.es_len {
                    args.push(self.es.pop().unwrap());
                }
                self.finish_call(frame.name, args)
            }
            StackItem::Op(_) => unreachable!(),
        }
    }

    fn finish_call(&mut self, name: String, mut args: Vec<Expr>) -> Result<(), CompileError> {
        if name == "$" {
            if args.is_empty() {
                return Err(CompileError::MacroMissingVariable);
            }
            let first = args.remove(0);
            let handle = match first {
                Expr::Var(h) => h,
                _ => return Err(CompileError::MacroMissingVariable),
            };
            if args.is_empty() {
                return Err(CompileError::TooFewOperands);
            }
            self.macros.insert(handle.name().to_string(), args);
            self.es.push(Expr::Const(0.0));
            return Ok(());
        }
        if let Some(body) = self.macros.get(&name).cloned() {
            let expanded = self.expand_macro(&body, args);
            self.es.push(expanded);
            return Ok(());
        }
        if let Some(desc) = self.funcs.find(&name) {
            self.es.push(Expr::func(desc, args));
            return Ok(());
        }
        Err(CompileError::UnknownCallable(name))
    }

    /// Expand a macro invocation. `body` is the macro's stored body (the
    /// `$(name, ...)` definition's arguments, minus the name-carrying
    /// variable at index 0). A bare `Var` body element other than the last
    /// is a formal parameter: its references inside the final body
    /// expression are rewritten to `$N`. Any other non-final element is a
    /// plain sequenced statement, evaluated for effect and discarded —
    /// matching the reference evaluator's general sequencing behavior for
    /// macros with no named parameters.
    fn expand_macro(&mut self, body: &[Expr], call_args: Vec<Expr>) -> Expr {
        let (middle, last) = body.split_at(body.len() - 1);
        let mut rewrites = Vec::new();
        let mut side_statements = Vec::new();
        for (idx, elem) in middle.iter().enumerate() {
            if let Expr::Var(h) = elem {
                let dollar = self
                    .env
                    .lookup_or_create(&format!("${}", idx + 1))
                    .expect("$N is always a valid variable name");
                rewrites.push((Rc::clone(h), dollar));
            } else {
                side_statements.push(elem.clone());
            }
        }
        let final_body = rewrite_vars(&last[0], &rewrites);

        let mut stmts: Vec<Expr> = Vec::with_capacity(call_args.len() + side_statements.len() + 1);
        for (j, actual) in call_args.into_iter().enumerate() {
            let dollar = self
                .env
                .lookup_or_create(&format!("${}", j + 1))
                .expect("$N is always a valid variable name");
            stmts.push(Expr::Assign(dollar, Box::new(actual)));
        }
        stmts.extend(side_statements);
        stmts.push(final_body);
        chain_comma(stmts)
    }

    fn compile(mut self) -> Result<Expr, CompileError> {
        if self.src.len() > self.limits.max_source_len {
            return Err(CompileError::SourceTooLong(self.limits.max_source_len));
        }
        if self.src.trim().is_empty() {
            return Err(CompileError::EmptySource);
        }

        while let Some(tok) = self.read_token()? {
            match tok {
                Token::Number(n) => self.es.push(Expr::Const(n)),
                Token::Word(w) => {
                    let next = self.read_token()?;
                    if let Some(Token::Open) = next {
                        self.check_depth()?;
                        self.os.push(StackItem::Call);
                        self.frames.push(ArgFrame {
                            es_len: self.es.len(),
                            name: w.to_string(),
                            args: Vec::new(),
                        });
                    } else {
                        let handle = self.resolve_var(w)?;
                        self.es.push(Expr::Var(handle));
                        if let Some(t) = next {
                            self.push_back(t);
                        }
                    }
                }
                Token::Open => {
                    self.check_depth()?;
                    self.os.push(StackItem::Paren);
                }
                Token::Close => self.close_paren_or_call()?,
                Token::Unary(u) => self.push_operator(OpTag::Un(u))?,
                Token::Binary(b) => self.push_operator(OpTag::Bin(b))?,
            }
        }

        while let Some(top) = self.os.last() {
            match top {
                StackItem::Op(_) => self.bind_top()?,
                _ => return Err(CompileError::UnbalancedParens),
            }
        }

        match self.es.len() {
            1 => Ok(self.es.pop().unwrap()),
            0 => Err(CompileError::EmptySource),
            _ => Err(CompileError::MissingOperand(self.pos)),
        }
    }
}

/// Compile `src` against `env` (growing it with any new variable names
/// referenced) and `funcs` (consulted read-only for call targets), using
/// the default `Limits`.
pub fn compile(src: &str, env: &mut Environment, funcs: &FuncRegistry) -> Result<Expr, CompileError> {
    compile_with_limits(src, env, funcs, Limits::default())
}

pub fn compile_with_limits(src: &str, env: &mut Environment, funcs: &FuncRegistry, limits: Limits) -> Result<Expr, CompileError> {
    Compiler::new(src, env, funcs, limits).compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::eval;

    fn run(src: &str) -> (crate::value::Num, Environment) {
        let mut env = Environment::new();
        let funcs = FuncRegistry::new();
        let tree = compile(src, &mut env, &funcs).expect("should compile");
        (eval(&tree), env)
    }

    #[test]
    fn precedence_and_arithmetic() {
        assert_eq!(run("2+3*4").0, 14.0);
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(run("2**3**2").0, 512.0);
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(run("(1<2)+(3>=3)").0, 2.0);
    }

    #[test]
    fn assignment_returns_value_and_mutates_environment() {
        let (result, env) = run("x=5,x*x");
        assert_eq!(result, 25.0);
        assert_eq!(env.lookup("x").unwrap().get(), 5.0);
    }

    #[test]
    fn logical_and_short_circuits() {
        let (result, env) = run("a=0,a&&(b=1),b");
        assert_eq!(result, 0.0);
        assert_eq!(env.lookup("a").unwrap().get(), 0.0);
        assert!(env.lookup("b").is_none(), "b must never be created: short-circuited away");
    }

    #[test]
    fn macro_definition_and_call() {
        let (result, env) = run("$(sq,x,x*x),sq(7)");
        assert_eq!(result, 49.0);
        assert_eq!(env.lookup("$1").unwrap().get(), 7.0);
    }

    #[test]
    fn unbalanced_parens_is_an_error() {
        let mut env = Environment::new();
        let funcs = FuncRegistry::new();
        assert_eq!(compile("(1+2", &mut env, &funcs), Err(CompileError::UnbalancedParens));
    }

    #[test]
    fn assigning_to_a_non_variable_is_an_error() {
        let mut env = Environment::new();
        let funcs = FuncRegistry::new();
        assert_eq!(compile("1=2", &mut env, &funcs), Err(CompileError::InvalidAssignTarget));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let mut env = Environment::new();
        let funcs = FuncRegistry::new();
        match compile("nope(1)", &mut env, &funcs) {
            Err(CompileError::UnknownCallable(name)) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownCallable, got {other:?}"),
        }
    }

    #[test]
    fn bitwise_and_uses_integer_coercion() {
        assert_eq!(run("5&3").0, 1.0);
    }

    #[test]
    fn division_by_zero_is_infinity_not_an_error() {
        assert_eq!(run("1/0").0, f32::INFINITY);
    }

    #[test]
    fn repeated_variable_reference_reuses_the_same_handle() {
        let mut env = Environment::new();
        let funcs = FuncRegistry::new();
        let tree = compile("x=3,x+x", &mut env, &funcs).unwrap();
        assert_eq!(eval(&tree), 6.0);
    }
}
