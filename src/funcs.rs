// ABOUTME: Host function registry — read-only descriptor table consulted at compile time

use crate::tree::Expr;
use crate::value::Num;
use std::collections::HashMap;
use std::rc::Rc;

/// A host function's entry point.
///
/// `args` are the call's argument *subtrees*, not pre-evaluated values — the
/// callee decides how (and whether) to evaluate each one by invoking
/// `eval_arg`, so a host function is free to implement lazy or short-
/// circuiting arguments the same way `&&`/`||` do internally. `ctx` is the
/// call site's private, zeroed scratch block (sized by `ctx_size`), or
/// `None` if the descriptor declared `ctx_size == 0`.
pub type HostFn =
    fn(desc: &FuncDescriptor, args: &[Expr], ctx: Option<&mut [u8]>, eval_arg: &dyn Fn(&Expr) -> Num) -> Num;

/// Called when a call site's tree node is dropped, after which `ctx` is
/// freed. Mirrors a destructor for whatever the function stashed in `ctx`
/// (a file handle, a running average, anything the context block encodes).
pub type CleanupFn = fn(desc: &FuncDescriptor, ctx: &mut [u8]);

/// A registered callable: name, entry point, and per-call-site context size.
pub struct FuncDescriptor {
    pub name: Rc<str>,
    pub ctx_size: usize,
    pub invoke: HostFn,
    pub cleanup: Option<CleanupFn>,
}

impl std::fmt::Debug for FuncDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuncDescriptor")
            .field("name", &self.name)
            .field("ctx_size", &self.ctx_size)
            .finish()
    }
}

/// The table of host functions available to a compilation. Built by the
/// host before `compile` is called and never mutated during compile/eval.
#[derive(Default)]
pub struct FuncRegistry {
    funcs: HashMap<String, Rc<FuncDescriptor>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        FuncRegistry { funcs: HashMap::new() }
    }

    pub fn register(&mut self, name: &str, ctx_size: usize, invoke: HostFn, cleanup: Option<CleanupFn>) {
        self.funcs.insert(
            name.to_string(),
            Rc::new(FuncDescriptor {
                name: Rc::from(name),
                ctx_size,
                invoke,
                cleanup,
            }),
        );
    }

    pub fn find(&self, name: &str) -> Option<Rc<FuncDescriptor>> {
        self.funcs.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_d: &FuncDescriptor, _a: &[Expr], _c: Option<&mut [u8]>, _e: &dyn Fn(&Expr) -> Num) -> Num {
        0.0
    }

    #[test]
    fn find_returns_none_for_unregistered_name() {
        let reg = FuncRegistry::new();
        assert!(reg.find("sin").is_none());
    }

    #[test]
    fn find_returns_the_registered_descriptor() {
        let mut reg = FuncRegistry::new();
        reg.register("sin", 0, noop, None);
        let desc = reg.find("sin").expect("sin should be registered");
        assert_eq!(&*desc.name, "sin");
        assert_eq!(desc.ctx_size, 0);
    }

    #[test]
    fn re_registering_a_name_replaces_the_descriptor() {
        let mut reg = FuncRegistry::new();
        reg.register("f", 0, noop, None);
        reg.register("f", 8, noop, None);
        assert_eq!(reg.find("f").unwrap().ctx_size, 8);
    }
}
