//! Automatic boxing of mutated closed-over parameters.
//!
//! Closure creation copies the enclosing frame's parameters into a fresh
//! rib, so a read and a write of the same parameter only agree on storage
//! when both go through the parameter slot itself. A parameter is boxed
//! when its body has at least one read and one write and any of them is
//! addressed through a rib rather than the frame; reads and writes that are
//! all `Param`-addressed never trigger a box.
//!
//! For each boxed parameter the body is rewritten: reads become `BoxGet`,
//! writes become `BoxSet`, and a `VarSet(x, Box(x))` per parameter (in
//! parameter order) is folded into the front of the body. A nested lambda
//! that shadows the parameter is left alone; shadowed occurrences carry a
//! different address, so the address arithmetic skips them.
//!
//! Invoke [pass_boxing] on a tail-annotated tree.

use std::rc::Rc;

use crate::tree_il::{AExpr, Addr, LambdaKind, Var};

pub fn pass_boxing(expr: &Rc<AExpr>) -> Rc<AExpr> {
    rebuild(expr)
}

/// Does `addr`, seen `depth` lambdas below the binder, refer to the binder's
/// parameter `index`?
fn refers(addr: Addr, depth: usize, index: usize) -> bool {
    match addr {
        Addr::Param(i) => depth == 0 && i == index,
        Addr::Bound { major, minor } => depth > 0 && major == depth - 1 && minor == index,
        Addr::Free => false,
    }
}

#[derive(Default)]
struct Occurrences {
    /// Each entry: was the occurrence rib-addressed (inside a closure)?
    reads: Vec<bool>,
    writes: Vec<bool>,
}

impl Occurrences {
    fn collect(body: &Rc<AExpr>, index: usize) -> Self {
        let mut occ = Occurrences::default();
        occ.walk(body, index, 0);
        occ
    }

    fn walk(&mut self, x: &Rc<AExpr>, index: usize, depth: usize) {
        match &**x {
            AExpr::Const(_) | AExpr::Box(_) => {}

            AExpr::VarGet(var) => {
                if refers(var.addr, depth, index) {
                    self.reads.push(depth > 0);
                }
            }

            AExpr::VarSet(var, value) => {
                if refers(var.addr, depth, index) {
                    self.writes.push(depth > 0);
                }
                self.walk(value, index, depth);
            }

            AExpr::VarDef(_, value) => self.walk(value, index, depth),

            // box forms always address a parameter of some inner lambda
            AExpr::BoxGet(_) => {}
            AExpr::BoxSet(_, value) => self.walk(value, index, depth),

            AExpr::If(test, then, alt) => {
                self.walk(test, index, depth);
                self.walk(then, index, depth);
                self.walk(alt, index, depth);
            }

            AExpr::Seq(seq) | AExpr::Or(seq) => {
                for e in seq {
                    self.walk(e, index, depth);
                }
            }

            AExpr::Lambda { body, .. } => self.walk(body, index, depth + 1),

            AExpr::Applic(proc, args, _) => {
                self.walk(proc, index, depth);
                for arg in args {
                    self.walk(arg, index, depth);
                }
            }
        }
    }

    /// A read/write pair that cannot share the parameter slot: every rib
    /// reference was captured separately, so any rib-addressed occurrence
    /// disagrees with every counterpart.
    fn needs_box(&self) -> bool {
        !self.reads.is_empty()
            && !self.writes.is_empty()
            && (self.reads.iter().any(|&b| b) || self.writes.iter().any(|&b| b))
    }
}

/// Turns reads of parameter `index` into `BoxGet` and writes into `BoxSet`,
/// everywhere the address still refers to that parameter.
fn rewrite(x: &Rc<AExpr>, index: usize, depth: usize) -> Rc<AExpr> {
    match &**x {
        AExpr::Const(_) | AExpr::Box(_) | AExpr::BoxGet(_) => x.clone(),

        AExpr::VarGet(var) => {
            if refers(var.addr, depth, index) {
                Rc::new(AExpr::BoxGet(var.clone()))
            } else {
                x.clone()
            }
        }

        AExpr::VarSet(var, value) => {
            let value = rewrite(value, index, depth);
            if refers(var.addr, depth, index) {
                Rc::new(AExpr::BoxSet(var.clone(), value))
            } else {
                Rc::new(AExpr::VarSet(var.clone(), value))
            }
        }

        AExpr::VarDef(var, value) => {
            Rc::new(AExpr::VarDef(var.clone(), rewrite(value, index, depth)))
        }

        AExpr::BoxSet(var, value) => {
            Rc::new(AExpr::BoxSet(var.clone(), rewrite(value, index, depth)))
        }

        AExpr::If(test, then, alt) => Rc::new(AExpr::If(
            rewrite(test, index, depth),
            rewrite(then, index, depth),
            rewrite(alt, index, depth),
        )),

        AExpr::Seq(seq) => Rc::new(AExpr::Seq(
            seq.iter().map(|e| rewrite(e, index, depth)).collect(),
        )),

        AExpr::Or(seq) => Rc::new(AExpr::Or(
            seq.iter().map(|e| rewrite(e, index, depth)).collect(),
        )),

        AExpr::Lambda { params, kind, body } => Rc::new(AExpr::Lambda {
            params: params.clone(),
            kind: kind.clone(),
            body: rewrite(body, index, depth + 1),
        }),

        AExpr::Applic(proc, args, tag) => Rc::new(AExpr::Applic(
            rewrite(proc, index, depth),
            args.iter().map(|e| rewrite(e, index, depth)).collect(),
            *tag,
        )),
    }
}

fn rebuild(x: &Rc<AExpr>) -> Rc<AExpr> {
    match &**x {
        AExpr::Const(_) | AExpr::VarGet(_) | AExpr::Box(_) | AExpr::BoxGet(_) => x.clone(),

        AExpr::VarSet(var, value) => Rc::new(AExpr::VarSet(var.clone(), rebuild(value))),
        AExpr::VarDef(var, value) => Rc::new(AExpr::VarDef(var.clone(), rebuild(value))),
        AExpr::BoxSet(var, value) => Rc::new(AExpr::BoxSet(var.clone(), rebuild(value))),

        AExpr::If(test, then, alt) => {
            Rc::new(AExpr::If(rebuild(test), rebuild(then), rebuild(alt)))
        }

        AExpr::Seq(seq) => Rc::new(AExpr::Seq(seq.iter().map(rebuild).collect())),
        AExpr::Or(seq) => Rc::new(AExpr::Or(seq.iter().map(rebuild).collect())),

        AExpr::Lambda { params, kind, body } => {
            // inner lambdas first; their boxing never aliases this frame
            let mut body = rebuild(body);

            let mut names = params.clone();
            if let LambdaKind::Opt(rest) = kind {
                names.push(rest.clone());
            }

            let mut prologue = Vec::new();
            for (index, name) in names.iter().enumerate() {
                if Occurrences::collect(&body, index).needs_box() {
                    body = rewrite(&body, index, 0);
                    let var = Var::new(name.clone(), Addr::Param(index));
                    prologue.push(Rc::new(AExpr::VarSet(
                        var.clone(),
                        Rc::new(AExpr::Box(var)),
                    )));
                }
            }

            if !prologue.is_empty() {
                let mut seq = prologue;
                match &*body {
                    AExpr::Seq(rest) => seq.extend(rest.iter().cloned()),
                    _ => seq.push(body),
                }
                body = Rc::new(AExpr::Seq(seq));
            }

            Rc::new(AExpr::Lambda {
                params: params.clone(),
                kind: kind.clone(),
                body,
            })
        }

        AExpr::Applic(proc, args, tag) => Rc::new(AExpr::Applic(
            rebuild(proc),
            args.iter().map(rebuild).collect(),
            *tag,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::parse_program;
    use crate::lexical::pass_lexical;
    use crate::reader::{Reader, SymbolInterner};
    use crate::tails::pass_tails;

    fn analyze(src: &str) -> Vec<Rc<AExpr>> {
        let interner = SymbolInterner::new();
        let forms = Reader::new(src, &interner).read_program().unwrap();
        parse_program(&forms, &interner)
            .unwrap()
            .iter()
            .map(|e| pass_boxing(&pass_tails(&pass_lexical(e))))
            .collect()
    }

    fn count_box_forms(x: &AExpr) -> (usize, usize, usize) {
        fn go(x: &AExpr, acc: &mut (usize, usize, usize)) {
            match x {
                AExpr::Box(_) => acc.0 += 1,
                AExpr::BoxGet(_) => acc.1 += 1,
                AExpr::BoxSet(_, e) => {
                    acc.2 += 1;
                    go(e, acc);
                }
                AExpr::VarSet(_, e) | AExpr::VarDef(_, e) => go(e, acc),
                AExpr::If(a, b, c) => {
                    go(a, acc);
                    go(b, acc);
                    go(c, acc);
                }
                AExpr::Seq(s) | AExpr::Or(s) => s.iter().for_each(|e| go(e, acc)),
                AExpr::Lambda { body, .. } => go(body, acc),
                AExpr::Applic(p, args, _) => {
                    go(p, acc);
                    args.iter().for_each(|e| go(e, acc));
                }
                _ => {}
            }
        }
        let mut acc = (0, 0, 0);
        go(x, &mut acc);
        acc
    }

    /// The body of the first lambda that got a boxing prologue.
    fn find_boxed_body(x: &Rc<AExpr>) -> Option<Rc<AExpr>> {
        match &**x {
            AExpr::Lambda { body, .. } => {
                if let AExpr::Seq(seq) = &**body {
                    if matches!(&*seq[0], AExpr::VarSet(_, v) if matches!(&**v, AExpr::Box(_))) {
                        return Some(body.clone());
                    }
                }
                find_boxed_body(body)
            }
            AExpr::Applic(proc, args, _) => find_boxed_body(proc)
                .or_else(|| args.iter().find_map(find_boxed_body)),
            AExpr::VarDef(_, value) | AExpr::VarSet(_, value) | AExpr::BoxSet(_, value) => {
                find_boxed_body(value)
            }
            AExpr::If(a, b, c) => find_boxed_body(a)
                .or_else(|| find_boxed_body(b))
                .or_else(|| find_boxed_body(c)),
            AExpr::Seq(seq) | AExpr::Or(seq) => seq.iter().find_map(find_boxed_body),
            _ => None,
        }
    }

    #[test]
    fn counter_parameter_is_boxed() {
        // the make-counter shape: read and write both inside the closure
        let prog = analyze("(define (mk) (let ((x 0)) (lambda () (set! x (+ x 1)) x)))");
        let (boxes, gets, sets) = count_box_forms(&prog[0]);
        assert_eq!(boxes, 1);
        assert!(gets >= 1 && sets == 1);

        // the prologue set leads the rewritten body
        let body = find_boxed_body(&prog[0]).expect("a boxing prologue somewhere");
        let AExpr::Seq(seq) = &*body else { unreachable!() };
        let AExpr::VarSet(var, _) = &*seq[0] else {
            unreachable!()
        };
        assert_eq!(var.addr, Addr::Param(0));
    }

    #[test]
    fn plain_parameter_mutation_is_not_boxed() {
        // read and write both live in the parameter's own frame
        let prog = analyze("(lambda (x) (set! x 1) x)");
        assert_eq!(count_box_forms(&prog[0]), (0, 0, 0));
    }

    #[test]
    fn read_only_closure_is_not_boxed() {
        let prog = analyze("(lambda (x) (lambda () x))");
        assert_eq!(count_box_forms(&prog[0]), (0, 0, 0));
    }

    #[test]
    fn disjoint_sibling_closures_force_the_box() {
        let prog = analyze("(lambda (x) (cons (lambda () (set! x 1)) (lambda () x)))");
        let (boxes, gets, sets) = count_box_forms(&prog[0]);
        assert_eq!((boxes, gets, sets), (1, 1, 1));
    }

    #[test]
    fn frame_write_with_closure_read_forces_the_box() {
        let prog = analyze("(lambda (x) (set! x 1) (lambda () x))");
        let (boxes, _, sets) = count_box_forms(&prog[0]);
        assert_eq!(boxes, 1);
        assert_eq!(sets, 1);
    }

    #[test]
    fn shadowing_lambda_is_left_alone() {
        // the inner lambda rebinds x; its body must survive untouched
        let prog = analyze("(lambda (x) (set! x 1) (lambda (x) x) (lambda () x))");
        let body = match &*prog[0] {
            AExpr::Lambda { body, .. } => body.clone(),
            _ => unreachable!(),
        };
        let AExpr::Seq(seq) = &*body else {
            panic!("expected a sequence")
        };
        // find the shadowing lambda and check its reference stayed a VarGet
        let shadowing = seq
            .iter()
            .find_map(|e| match &**e {
                AExpr::Lambda { params, body, .. } if params.len() == 1 => Some(body.clone()),
                _ => None,
            })
            .unwrap();
        assert!(matches!(&*shadowing, AExpr::VarGet(v) if v.addr == Addr::Param(0)));
    }
}
