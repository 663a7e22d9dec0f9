//! Tail-call annotation.
//!
//! Carries one boolean down the tree: a lambda body is in tail position, a
//! sequence's last element inherits, an `if`'s branches inherit, and the
//! value of a mutation never is. An application in tail position is tagged
//! `Tail` so the code generator can recycle the frame.
//!
//! Invoke [pass_tails] on a lexically addressed tree.

use std::rc::Rc;

use crate::tree_il::{AExpr, AppKind};

pub fn pass_tails(expr: &Rc<AExpr>) -> Rc<AExpr> {
    run(expr, false)
}

fn run(x: &Rc<AExpr>, in_tail: bool) -> Rc<AExpr> {
    match &**x {
        AExpr::Const(_) | AExpr::VarGet(_) | AExpr::Box(_) | AExpr::BoxGet(_) => x.clone(),

        AExpr::VarSet(var, value) => {
            Rc::new(AExpr::VarSet(var.clone(), run(value, false)))
        }

        AExpr::VarDef(var, value) => {
            Rc::new(AExpr::VarDef(var.clone(), run(value, false)))
        }

        AExpr::BoxSet(var, value) => {
            Rc::new(AExpr::BoxSet(var.clone(), run(value, false)))
        }

        AExpr::If(test, then, alt) => Rc::new(AExpr::If(
            run(test, false),
            run(then, in_tail),
            run(alt, in_tail),
        )),

        AExpr::Seq(seq) => Rc::new(AExpr::Seq(run_last(seq, in_tail))),

        AExpr::Or(exprs) => Rc::new(AExpr::Or(run_last(exprs, in_tail))),

        AExpr::Lambda { params, kind, body } => Rc::new(AExpr::Lambda {
            params: params.clone(),
            kind: kind.clone(),
            body: run(body, true),
        }),

        AExpr::Applic(proc, args, _) => Rc::new(AExpr::Applic(
            run(proc, false),
            args.iter().map(|x| run(x, false)).collect(),
            if in_tail { AppKind::Tail } else { AppKind::NonTail },
        )),
    }
}

/// All but the last in non-tail; the last inherits.
fn run_last(seq: &[Rc<AExpr>], in_tail: bool) -> Vec<Rc<AExpr>> {
    let n = seq.len();
    seq.iter()
        .enumerate()
        .map(|(i, x)| run(x, in_tail && i + 1 == n))
        .collect()
}
