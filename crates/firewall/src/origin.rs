//! Origin tagging: identifies the dependency responsible for the operation
//! currently in flight.
//!
//! The original design resolved this by walking the call stack and matching
//! frame paths against installed package directories — fragile once the
//! runtime is a compiled binary with inlined frames. Instead, each dependency
//! loader pushes an origin label into a thread-local slot before it transfers
//! control into that dependency's code, and pops it on return. The engine
//! reads the top of the slot instead of inspecting the stack.

use std::cell::RefCell;

thread_local! {
    static ORIGIN_STACK: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// RAII guard that pushes an origin label on construction and pops it on
/// drop, so control-flow that unwinds (including panics) still leaves the
/// stack consistent.
pub struct OriginGuard {
    _private: (),
}

impl OriginGuard {
    fn new() -> Self {
        Self { _private: () }
    }
}

impl Drop for OriginGuard {
    fn drop(&mut self) {
        ORIGIN_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// Push `origin` as the current operation's attributed dependency for the
/// lifetime of the returned guard. Nested pushes are supported: a dependency
/// that itself invokes another dependency's code sees the innermost label.
pub fn enter(origin: impl Into<String>) -> OriginGuard {
    ORIGIN_STACK.with(|s| s.borrow_mut().push(origin.into()));
    OriginGuard::new()
}

/// The origin currently attributed to the calling task, or `None` if no
/// dependency loader has tagged itself (e.g. the host program's own code).
pub fn current() -> Option<String> {
    ORIGIN_STACK.with(|s| s.borrow().last().cloned())
}

/// The full chain of nested origins, innermost first. Substitutes for a
/// native call-stack capture in the suspicious-event log and audit record:
/// a dependency that itself invokes another dependency's code shows both,
/// in the order control passed through them.
pub fn stack() -> Vec<String> {
    ORIGIN_STACK.with(|s| s.borrow().iter().rev().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_origins_resolve_to_innermost() {
        assert_eq!(current(), None);
        let _outer = enter("left-pad");
        assert_eq!(current().as_deref(), Some("left-pad"));
        {
            let _inner = enter("chalk");
            assert_eq!(current().as_deref(), Some("chalk"));
        }
        assert_eq!(current().as_deref(), Some("left-pad"));
    }

    #[test]
    fn guard_pops_on_drop() {
        {
            let _g = enter("tmp-origin");
        }
        assert_eq!(current(), None);
    }

    #[test]
    fn stack_reports_innermost_first() {
        let _outer = enter("left-pad");
        let _inner = enter("chalk");
        assert_eq!(stack(), vec!["chalk".to_string(), "left-pad".to_string()]);
    }
}
