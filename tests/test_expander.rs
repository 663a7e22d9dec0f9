use std::rc::Rc;

use scm86::error::CompileError;
use scm86::expander::{expand_quasiquote, parse_program};
use scm86::reader::{Reader, SymbolInterner};
use scm86::sexpr::{Sexpr, Symbol};
use scm86::tree_il::{Expr, LambdaKind};

mod utils;
use utils::{parse_all, read_all};

fn parse_err(src: &str) -> CompileError {
    let interner = SymbolInterner::new();
    let forms = Reader::new(src, &interner).read_program().unwrap();
    parse_program(&forms, &interner).unwrap_err()
}

#[test]
fn self_evaluating_atoms_become_constants() {
    for (src, printed) in [
        ("#void", "#void"),
        ("#t", "#t"),
        ("#\\a", "#\\a"),
        ("\"s\"", "\"s\""),
        ("3/4", "3/4"),
        ("#(1 2)", "#(1 2)"),
    ] {
        match &*parse_all(src)[0] {
            Expr::Const(c) => assert_eq!(c.to_string(), printed),
            other => panic!("{} parsed to {:?}", src, other),
        }
    }
}

#[test]
fn if_with_two_arms_gets_void_alternative() {
    match &*parse_all("(if 1 2)")[0] {
        Expr::If(_, _, alt) => assert_eq!(&**alt, &Expr::Const(Sexpr::Void)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(parse_err("(if 1)"), CompileError::Syntax(..)));
}

#[test]
fn or_and_begin_degenerate_cases() {
    assert_eq!(
        &*parse_all("(or)")[0],
        &Expr::Const(Sexpr::Boolean(false))
    );
    assert!(matches!(&*parse_all("(or 5)")[0], Expr::Const(_)));
    assert!(matches!(&*parse_all("(or 1 2 3)")[0], Expr::Or(es) if es.len() == 3));

    assert_eq!(&*parse_all("(begin)")[0], &Expr::Const(Sexpr::Void));
    assert!(matches!(&*parse_all("(begin 5)")[0], Expr::Const(_)));
    assert!(matches!(&*parse_all("(begin 1 2)")[0], Expr::Seq(es) if es.len() == 2));

    assert_eq!(&*parse_all("(and)")[0], &Expr::Const(Sexpr::Boolean(true)));
}

#[test]
fn and_right_folds_into_ifs() {
    // (and a b c) == (if a (if b c #f) #f)
    let expr = parse_all("(and a b c)");
    let Expr::If(_, then, alt) = &*expr[0] else {
        panic!("and did not expand to if")
    };
    assert_eq!(&**alt, &Expr::Const(Sexpr::Boolean(false)));
    let Expr::If(_, inner_then, inner_alt) = &**then else {
        panic!("inner and did not expand to if")
    };
    assert!(matches!(&**inner_then, Expr::VarGet(s) if s.name() == "c"));
    assert_eq!(&**inner_alt, &Expr::Const(Sexpr::Boolean(false)));
}

#[test]
fn lambda_kinds() {
    match &*parse_all("(lambda (x y) x)")[0] {
        Expr::Lambda { params, kind, .. } => {
            assert_eq!(params.len(), 2);
            assert_eq!(*kind, LambdaKind::Simple);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &*parse_all("(lambda args args)")[0] {
        Expr::Lambda { params, kind, .. } => {
            assert!(params.is_empty());
            assert!(matches!(kind, LambdaKind::Opt(r) if r.name() == "args"));
        }
        other => panic!("unexpected {:?}", other),
    }
    match &*parse_all("(lambda (x y . zs) x)")[0] {
        Expr::Lambda { params, kind, .. } => {
            assert_eq!(params.len(), 2);
            assert!(matches!(kind, LambdaKind::Opt(r) if r.name() == "zs"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn lambda_rejects_bad_parameter_lists() {
    assert!(matches!(parse_err("(lambda (x x) x)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(lambda (x . x) x)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(lambda (if) 1)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(lambda (x 1) x)"), CompileError::Syntax(..)));
}

#[test]
fn reserved_words_cannot_be_referenced_or_assigned() {
    assert!(matches!(parse_err("(display lambda)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(set! else 1)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(define begin 1)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(do 1 2)"), CompileError::Syntax(..)));
    assert!(matches!(parse_err("(unquote x)"), CompileError::Syntax(..)));
}

#[test]
fn nested_define_is_not_yet_implemented() {
    assert!(matches!(
        parse_err("(lambda () (define x 1) x)"),
        CompileError::NotYetImplemented(_)
    ));
    assert!(matches!(
        parse_err("(begin (define x 1))"),
        CompileError::NotYetImplemented(_)
    ));
}

#[test]
fn mit_define_builds_a_lambda() {
    match &*parse_all("(define (f x) x x)")[0] {
        Expr::VarDef(name, value) => {
            assert_eq!(name.name(), "f");
            let Expr::Lambda { params, kind, body } = &**value else {
                panic!("no lambda under define")
            };
            assert_eq!(params.len(), 1);
            assert_eq!(*kind, LambdaKind::Simple);
            assert!(matches!(&**body, Expr::Seq(es) if es.len() == 2));
        }
        other => panic!("unexpected {:?}", other),
    }

    // improper header yields an opt lambda
    match &*parse_all("(define (f x . rest) x)")[0] {
        Expr::VarDef(_, value) => {
            assert!(matches!(
                &**value,
                Expr::Lambda { kind: LambdaKind::Opt(_), .. }
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn let_family_expands_to_applications() {
    // (let ((x 1)) x) => ((lambda (x) (begin x)) 1)
    match &*parse_all("(let ((x 1)) x)")[0] {
        Expr::Applic(proc, args) => {
            assert!(matches!(&**proc, Expr::Lambda { params, .. } if params.len() == 1));
            assert_eq!(args.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    // let* peels one binding at a time
    match &*parse_all("(let* ((x 1) (y x)) y)")[0] {
        Expr::Applic(proc, _) => {
            let Expr::Lambda { body, .. } = &**proc else {
                panic!("no lambda under let*")
            };
            assert!(matches!(&**body, Expr::Applic(..)));
        }
        other => panic!("unexpected {:?}", other),
    }

    // letrec binds 'whatever, then mutates
    match &*parse_all("(letrec ((f (lambda () (f)))) (f))")[0] {
        Expr::Applic(proc, args) => {
            match &*args[0] {
                Expr::Const(c) => assert_eq!(c.to_string(), "whatever"),
                other => panic!("letrec init was {:?}", other),
            }
            let Expr::Lambda { body, .. } = &**proc else {
                panic!("no lambda under letrec")
            };
            let Expr::Seq(seq) = &**body else {
                panic!("letrec body was not a sequence")
            };
            assert!(matches!(&*seq[0], Expr::VarSet(name, _) if name.name() == "f"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn cond_expansions() {
    // else clause
    assert!(matches!(&*parse_all("(cond (else 1))")[0], Expr::Const(_)));

    // plain clauses chain into ifs
    let expr = parse_all("(cond (a 1) (b 2))");
    let Expr::If(_, _, alt) = &*expr[0] else {
        panic!("cond did not chain")
    };
    assert!(matches!(&**alt, Expr::If(..)));

    // the => clause binds value, f, and rest thunks
    let expr = parse_all("(cond (a => f) (else 2))");
    let Expr::Applic(proc, args) = &*expr[0] else {
        panic!("=> clause did not expand to a let")
    };
    assert_eq!(args.len(), 3);
    let Expr::Lambda { params, .. } = &**proc else {
        panic!("no lambda under =>")
    };
    let names: Vec<&str> = params.iter().map(|p| p.name()).collect();
    assert_eq!(names, ["value", "f", "rest"]);
}

#[test]
fn quasiquote_rules() {
    let interner = SymbolInterner::new();
    let expand = |src: &str| {
        let template = Reader::new(src, &interner).read().unwrap();
        expand_quasiquote(template.cadr(), &interner).to_string()
    };

    assert_eq!(expand("`()"), "(quote ())");
    assert_eq!(expand("`x"), "(quote x)");
    assert_eq!(expand("`,e"), "e");
    assert_eq!(expand("`(,a . rest)"), "(cons a (quote rest))");
    assert_eq!(expand("`(,@xs)"), "xs");
    assert_eq!(expand("`(,@xs . rest)"), "(append xs (quote rest))");
    assert_eq!(expand("`(a . b)"), "(cons (quote a) (quote b))");
    assert_eq!(expand("`#(1 ,x)"), "(vector (quote 1) x)");
    assert_eq!(expand("`#(1 ,@xs)"), "(list->vector (cons (quote 1) xs))");
    assert_eq!(
        expand("`(,@xs end)"),
        "(append xs (cons (quote end) (quote ())))"
    );
}

/// Prints a core-form tree back to an S-expression.
fn unparse(expr: &Expr) -> Sexpr {
    let sym = |name: &str| Sexpr::Symbol(Rc::new(Symbol::new(name)));
    match expr {
        Expr::Const(c) => Sexpr::make_list(&[sym("quote"), c.clone()]),
        Expr::VarGet(name) => Sexpr::Symbol(name.clone()),
        Expr::VarSet(name, value) => {
            Sexpr::make_list(&[sym("set!"), Sexpr::Symbol(name.clone()), unparse(value)])
        }
        Expr::VarDef(name, value) => {
            Sexpr::make_list(&[sym("define"), Sexpr::Symbol(name.clone()), unparse(value)])
        }
        Expr::If(t, c, a) => {
            Sexpr::make_list(&[sym("if"), unparse(t), unparse(c), unparse(a)])
        }
        Expr::Seq(seq) => {
            let mut forms = vec![sym("begin")];
            forms.extend(seq.iter().map(|e| unparse(e)));
            Sexpr::make_list(&forms)
        }
        Expr::Or(exprs) => {
            let mut forms = vec![sym("or")];
            forms.extend(exprs.iter().map(|e| unparse(e)));
            Sexpr::make_list(&forms)
        }
        Expr::Lambda { params, kind, body } => {
            let fixed: Vec<Sexpr> = params.iter().map(|p| Sexpr::Symbol(p.clone())).collect();
            let formals = match kind {
                LambdaKind::Simple => Sexpr::make_list(&fixed),
                LambdaKind::Opt(rest) => {
                    Sexpr::make_list_star(&fixed, Sexpr::Symbol(rest.clone()))
                }
            };
            let mut forms = vec![sym("lambda"), formals];
            match &**body {
                Expr::Seq(seq) => forms.extend(seq.iter().map(|e| unparse(e))),
                one => forms.push(unparse(one)),
            }
            Sexpr::make_list(&forms)
        }
        Expr::Applic(proc, args) => {
            let mut forms = vec![unparse(proc)];
            forms.extend(args.iter().map(|e| unparse(e)));
            Sexpr::make_list(&forms)
        }
    }
}

#[test]
fn tag_parsing_is_idempotent_through_printing() {
    let corpus = [
        "(define (fact n) (if (zero? n) 1 (* n (fact (- n 1)))))",
        "(let* ((x 1) (y 2)) (and x y (or y #f)))",
        "(cond ((pair? x) => car) ((null? x) '()) (else x))",
        "(lambda (a b . cs) (set! a `(1 ,b ,@cs)) a)",
        "(letrec ((even (lambda (n) (if (zero? n) #t (odd (- n 1))))) (odd (lambda (n) (if (zero? n) #f (even (- n 1)))))) (even 10))",
        "(display \"x ~{(+ 1 2)} y\")",
    ];
    let interner = SymbolInterner::new();
    for src in corpus {
        let forms = read_all(src);
        let first = parse_program(&forms, &interner).unwrap();
        let reprinted: Vec<Sexpr> = first.iter().map(|e| unparse(e)).collect();
        let second = parse_program(&reprinted, &interner).unwrap();
        assert_eq!(first, second, "reparse changed the tree for {}", src);
    }
}
