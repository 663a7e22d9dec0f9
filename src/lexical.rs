//! Lexical addressing.
//!
//! Rewrites every variable name into an address: the innermost enclosing
//! parameter list gives `Param(i)`, an outer rib gives `Bound(major, minor)`,
//! and everything else resolves against the global free-variables table.
//! Applications come out tagged `NonTail`; the tail pass fixes them up.
//!
//! Invoke [pass_lexical] on a tag-parsed tree.

use std::rc::Rc;

use crate::sexpr::Symbol;
use crate::tree_il::{AExpr, Addr, AppKind, Expr, LambdaKind, Var};

pub fn pass_lexical(expr: &Expr) -> Rc<AExpr> {
    run(expr, &[], &[])
}

fn lookup(name: &Rc<Symbol>, params: &[Rc<Symbol>], env: &[Vec<Rc<Symbol>>]) -> Addr {
    if let Some(i) = params.iter().position(|p| p == name) {
        return Addr::Param(i);
    }
    for (major, rib) in env.iter().enumerate() {
        if let Some(minor) = rib.iter().position(|p| p == name) {
            return Addr::Bound { major, minor };
        }
    }
    Addr::Free
}

fn run(expr: &Expr, params: &[Rc<Symbol>], env: &[Vec<Rc<Symbol>>]) -> Rc<AExpr> {
    Rc::new(match expr {
        Expr::Const(value) => AExpr::Const(value.clone()),

        Expr::VarGet(name) => {
            AExpr::VarGet(Var::new(name.clone(), lookup(name, params, env)))
        }

        Expr::VarSet(name, value) => AExpr::VarSet(
            Var::new(name.clone(), lookup(name, params, env)),
            run(value, params, env),
        ),

        // definitions always bind at the global level
        Expr::VarDef(name, value) => AExpr::VarDef(
            Var::new(name.clone(), Addr::Free),
            run(value, params, env),
        ),

        Expr::If(test, then, alt) => AExpr::If(
            run(test, params, env),
            run(then, params, env),
            run(alt, params, env),
        ),

        Expr::Seq(seq) => AExpr::Seq(seq.iter().map(|x| run(x, params, env)).collect()),

        Expr::Or(exprs) => AExpr::Or(exprs.iter().map(|x| run(x, params, env)).collect()),

        Expr::Lambda {
            params: fixed,
            kind,
            body,
        } => {
            let mut inner = fixed.clone();
            if let LambdaKind::Opt(rest) = kind {
                inner.push(rest.clone());
            }

            let mut extended = Vec::with_capacity(env.len() + 1);
            extended.push(params.to_vec());
            extended.extend(env.iter().cloned());

            AExpr::Lambda {
                params: fixed.clone(),
                kind: kind.clone(),
                body: run(body, &inner, &extended),
            }
        }

        Expr::Applic(proc, args) => AExpr::Applic(
            run(proc, params, env),
            args.iter().map(|x| run(x, params, env)).collect(),
            AppKind::NonTail,
        ),
    })
}
