// ABOUTME: Infallible recursive tree-walk evaluator
// Once a tree compiles, it evaluates unconditionally: undefined arithmetic
// (division by zero, overflow) surfaces as `NaN`/`+-inf`, never an error.

use crate::tree::{BinOp, Expr, UnOp};
use crate::value::{from_int, to_int, Num};

/// Evaluate a compiled tree, returning its final value. Any `Assign` nodes
/// along the way mutate their target variable's storage cell as a side
/// effect, visible to the caller via the `Environment` the tree was compiled
/// against.
pub fn eval(expr: &Expr) -> Num {
    match expr {
        Expr::Const(n) => *n,
        Expr::Var(h) => h.get(),
        Expr::Unary(op, a) => eval_unary(*op, eval(a)),
        Expr::Binary(BinOp::LogicalAnd, a, b) => eval_and(a, b),
        Expr::Binary(BinOp::LogicalOr, a, b) => eval_or(a, b),
        Expr::Binary(op, a, b) => eval_binary(*op, eval(a), eval(b)),
        Expr::Assign(h, rhs) => {
            let v = eval(rhs);
            h.set(v);
            v
        }
        Expr::Comma(a, b) => {
            eval(a);
            eval(b)
        }
        Expr::Func { desc, args, ctx } => {
            let eval_arg = |e: &Expr| eval(e);
            match ctx {
                Some(cell) => (desc.invoke)(desc, args, Some(&mut *cell.borrow_mut()), &eval_arg),
                None => (desc.invoke)(desc, args, None, &eval_arg),
            }
        }
    }
}

fn truthy(n: Num) -> bool {
    n != 0.0
}

fn canon(n: Num) -> Num {
    if truthy(n) {
        1.0
    } else {
        0.0
    }
}

/// `a != 0` short-circuits; both sides return their raw operand value
/// rather than a synthesized `1.0`/`0.0`, matching the reference
/// evaluator's `&&`.
fn eval_and(a: &Expr, b: &Expr) -> Num {
    let av = eval(a);
    if !truthy(av) {
        return 0.0;
    }
    let bv = eval(b);
    if truthy(bv) {
        bv
    } else {
        0.0
    }
}

/// `a != 0 && !a.is_nan()` short-circuits, returning `a` unchanged; NaN is
/// never considered a truthy shortcut here even though `NaN != 0.0`.
fn eval_or(a: &Expr, b: &Expr) -> Num {
    let av = eval(a);
    if truthy(av) && !av.is_nan() {
        return av;
    }
    let bv = eval(b);
    if truthy(bv) {
        bv
    } else {
        0.0
    }
}

fn eval_unary(op: UnOp, a: Num) -> Num {
    match op {
        UnOp::Neg => -a,
        UnOp::Not => canon(!truthy(a)),
        UnOp::BitNot => from_int(!to_int(a)),
    }
}

fn eval_binary(op: BinOp, a: Num, b: Num) -> Num {
    match op {
        BinOp::Power => a.powf(b),
        BinOp::Multiply => a * b,
        BinOp::Divide => a / b,
        BinOp::Remainder => a % b,
        BinOp::Plus => a + b,
        BinOp::Minus => a - b,
        BinOp::Shl => from_int(to_int(a).wrapping_shl(to_int(b) as u32 & 31)),
        BinOp::Shr => from_int(to_int(a).wrapping_shr(to_int(b) as u32 & 31)),
        BinOp::Lt => canon(a < b),
        BinOp::Le => canon(a <= b),
        BinOp::Gt => canon(a > b),
        BinOp::Ge => canon(a >= b),
        BinOp::EqOp => canon(a == b),
        BinOp::NeOp => canon(a != b),
        BinOp::BitAnd => from_int(to_int(a) & to_int(b)),
        BinOp::BitOr => from_int(to_int(a) | to_int(b)),
        BinOp::BitXor => from_int(to_int(a) ^ to_int(b)),
        BinOp::LogicalAnd | BinOp::LogicalOr => unreachable!("handled by eval_and/eval_or before reaching here"),
    }
}
