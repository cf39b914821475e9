// ABOUTME: The compiled expression tree and its owning-Drop/deep-Clone semantics

use crate::env::VarHandle;
use crate::funcs::FuncDescriptor;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Power,
    Multiply,
    Divide,
    Remainder,
    Plus,
    Minus,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    EqOp,
    NeOp,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
}

/// A compiled expression. Owns everything beneath it: dropping a tree drops
/// its entire subtree, including any `Func` node's context block (after
/// running the descriptor's `cleanup`, if any — see the `Drop` impl below).
///
/// `Assign` and `Comma` get dedicated variants rather than living inside
/// `Binary` with a generic left child: `Assign`'s left side is a `VarHandle`
/// directly, so a non-variable assignment target is unrepresentable once the
/// parser has produced a tree, instead of needing a runtime check at eval
/// time the way the original implementation re-verifies it on every
/// evaluation.
pub enum Expr {
    Const(crate::value::Num),
    Var(VarHandle),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Assign(VarHandle, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Func {
        desc: Rc<FuncDescriptor>,
        args: Vec<Expr>,
        ctx: Option<RefCell<Vec<u8>>>,
    },
}

impl Expr {
    pub fn func(desc: Rc<FuncDescriptor>, args: Vec<Expr>) -> Expr {
        let ctx = if desc.ctx_size > 0 {
            Some(RefCell::new(vec![0u8; desc.ctx_size]))
        } else {
            None
        };
        Expr::Func { desc, args, ctx }
    }
}

impl Clone for Expr {
    fn clone(&self) -> Self {
        match self {
            Expr::Const(n) => Expr::Const(*n),
            Expr::Var(h) => Expr::Var(Rc::clone(h)),
            Expr::Unary(op, a) => Expr::Unary(*op, Box::new((**a).clone())),
            Expr::Binary(op, a, b) => Expr::Binary(*op, Box::new((**a).clone()), Box::new((**b).clone())),
            Expr::Assign(h, rhs) => Expr::Assign(Rc::clone(h), Box::new((**rhs).clone())),
            Expr::Comma(a, b) => Expr::Comma(Box::new((**a).clone()), Box::new((**b).clone())),
            // A cloned call site gets its own fresh, zeroed context block —
            // two call sites must never share mutable state through a copy.
            Expr::Func { desc, args, .. } => Expr::func(Rc::clone(desc), args.iter().cloned().collect()),
        }
    }
}

impl Drop for Expr {
    fn drop(&mut self) {
        if let Expr::Func { desc, ctx, .. } = self {
            if let (Some(cleanup), Some(ctx)) = (desc.cleanup, ctx) {
                cleanup(desc, ctx.get_mut());
            }
        }
        // Box<Expr>/Vec<Expr> children drop recursively after this, each
        // running the same cleanup logic for any Func nodes they contain.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn clone_gives_func_nodes_independent_context() {
        thread_local! {
            static SEEN: Cell<usize> = const { Cell::new(0) };
        }
        fn invoke(_d: &FuncDescriptor, _a: &[Expr], ctx: Option<&mut [u8]>, _e: &dyn Fn(&Expr) -> crate::value::Num) -> crate::value::Num {
            let ctx = ctx.unwrap();
            ctx[0] = ctx[0].wrapping_add(1);
            ctx[0] as crate::value::Num
        }
        let desc = Rc::new(FuncDescriptor {
            name: "counter".into(),
            ctx_size: 1,
            invoke,
            cleanup: None,
        });
        let original = Expr::func(Rc::clone(&desc), vec![]);
        let copy = original.clone();
        if let (Expr::Func { ctx: Some(c1), .. }, Expr::Func { ctx: Some(c2), .. }) = (&original, &copy) {
            c1.borrow_mut()[0] = 9;
            assert_eq!(c2.borrow()[0], 0);
        } else {
            panic!("expected Func nodes with context");
        }
    }

    #[test]
    fn drop_runs_cleanup_before_releasing_context() {
        thread_local! {
            static CLEANED_UP: Cell<bool> = const { Cell::new(false) };
        }
        fn invoke(_d: &FuncDescriptor, _a: &[Expr], _c: Option<&mut [u8]>, _e: &dyn Fn(&Expr) -> crate::value::Num) -> crate::value::Num {
            0.0
        }
        fn cleanup(_d: &FuncDescriptor, _ctx: &mut [u8]) {
            CLEANED_UP.with(|c| c.set(true));
        }
        let desc = Rc::new(FuncDescriptor {
            name: "res".into(),
            ctx_size: 4,
            invoke,
            cleanup: Some(cleanup),
        });
        let node = Expr::func(desc, vec![]);
        drop(node);
        assert!(CLEANED_UP.with(|c| c.get()));
    }

    #[test]
    fn var_handle_is_shared_not_copied_in_value() {
        let mut env = Environment::new();
        let x = env.lookup_or_create("x").unwrap();
        let a = Expr::Var(Rc::clone(&x));
        let b = a.clone();
        x.set(7.0);
        if let (Expr::Var(ha), Expr::Var(hb)) = (&a, &b) {
            assert!(Rc::ptr_eq(ha, hb));
            assert_eq!(ha.get(), 7.0);
            assert_eq!(hb.get(), 7.0);
        } else {
            unreachable!()
        }
    }
}
