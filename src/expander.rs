//! The tag parser.
//!
//! Maps raw S-expressions to core-form [`Expr`] trees. Derived forms (`and`,
//! `cond`, the `let` family, `quasiquote`, MIT-style `define`) are expanded
//! source-to-source and the resulting S-expression is fed back through the
//! parser, so analysis only ever sees core forms.

use std::collections::HashSet;
use std::rc::Rc;

use crate::error::CompileError;
use crate::reader::SymbolInterner;
use crate::sexpr::{cons, Sexpr};
use crate::tree_il::{
    make_applic, make_const, make_if, make_lambda, make_or, make_seq, make_var_def, make_var_get,
    make_var_set, Expr, LambdaKind,
};

pub const RESERVED_WORDS: &[&str] = &[
    "and",
    "begin",
    "cond",
    "define",
    "do",
    "else",
    "if",
    "lambda",
    "let",
    "let*",
    "letrec",
    "or",
    "quasiquote",
    "quote",
    "set!",
    "unquote",
    "unquote-splicing",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

type ParseResult = Result<Rc<Expr>, CompileError>;

fn syntax<T>(form: &Sexpr, what: &'static str) -> Result<T, CompileError> {
    Err(CompileError::Syntax(form.clone(), what))
}

/// Parses one top-level form. `define` is only legal here.
pub fn parse_toplevel(form: &Sexpr, interner: &Rc<SymbolInterner>) -> ParseResult {
    if form.is_pair() && form.car().symbol().is_some_and(|s| s.name() == "define") {
        parse_define(form, interner)
    } else {
        parse(form, interner)
    }
}

/// Parses a whole program of top-level forms.
pub fn parse_program(
    forms: &[Sexpr],
    interner: &Rc<SymbolInterner>,
) -> Result<Vec<Rc<Expr>>, CompileError> {
    forms
        .iter()
        .map(|form| parse_toplevel(form, interner))
        .collect()
}

/// Parses one expression-context form.
pub fn parse(form: &Sexpr, interner: &Rc<SymbolInterner>) -> ParseResult {
    match form {
        Sexpr::Void
        | Sexpr::Boolean(_)
        | Sexpr::Char(_)
        | Sexpr::String(_)
        | Sexpr::Number(_)
        | Sexpr::Vector(_) => Ok(make_const(form.clone())),

        Sexpr::Symbol(s) => {
            if is_reserved(s.name()) {
                syntax(form, "reserved word in expression position")
            } else {
                Ok(make_var_get(s.clone()))
            }
        }

        Sexpr::Nil => syntax(form, "empty application"),

        Sexpr::Pair(_) => {
            if !form.is_proper_list() {
                return syntax(form, "improper list is not a valid form");
            }
            match form.car().symbol() {
                Some(head) if is_reserved(head.name()) => {
                    parse_special(head.name(), form, interner)
                }
                _ => {
                    let proc = parse(form.car(), interner)?;
                    let mut args = Vec::new();
                    let mut rest = form.cdr();
                    while let Some((arg, next)) = rest.pair() {
                        args.push(parse(arg, interner)?);
                        rest = next;
                    }
                    Ok(make_applic(proc, args))
                }
            }
        }
    }
}

fn parse_special(head: &str, form: &Sexpr, interner: &Rc<SymbolInterner>) -> ParseResult {
    match head {
        "quote" => {
            if form.list_length() != Some(2) {
                return syntax(form, "quote takes exactly one datum");
            }
            Ok(make_const(form.cadr().clone()))
        }

        "if" => match form.list_length() {
            Some(3) => Ok(make_if(
                parse(form.cadr(), interner)?,
                parse(form.caddr(), interner)?,
                make_const(Sexpr::Void),
            )),
            Some(4) => Ok(make_if(
                parse(form.cadr(), interner)?,
                parse(form.caddr(), interner)?,
                parse(form.cddr().cadr(), interner)?,
            )),
            _ => syntax(form, "if takes a test and one or two branches"),
        },

        "or" => {
            let exprs = parse_each(form.cdr(), interner)?;
            match exprs.len() {
                0 => Ok(make_const(Sexpr::Boolean(false))),
                1 => Ok(exprs.into_iter().next().unwrap()),
                _ => Ok(make_or(exprs)),
            }
        }

        "and" => {
            let args = form.cdr().to_vec().unwrap_or_default();
            if args.is_empty() {
                return Ok(make_const(Sexpr::Boolean(true)));
            }
            // right-fold into nested ifs: (if e1 (if e2 ... en #f) #f)
            let mut expanded = args.last().unwrap().clone();
            for test in args[..args.len() - 1].iter().rev() {
                expanded = Sexpr::make_list(&[
                    Sexpr::Symbol(interner.intern("if")),
                    test.clone(),
                    expanded,
                    Sexpr::Boolean(false),
                ]);
            }
            parse(&expanded, interner)
        }

        "begin" => {
            let exprs = parse_each(form.cdr(), interner)?;
            match exprs.len() {
                0 => Ok(make_const(Sexpr::Void)),
                _ => Ok(make_seq(exprs)),
            }
        }

        "set!" => {
            if form.list_length() != Some(3) {
                return syntax(form, "set! takes a variable and an expression");
            }
            let name = match form.cadr().symbol() {
                Some(s) if !is_reserved(s.name()) => s.clone(),
                Some(_) => return syntax(form, "reserved word in set!"),
                None => return syntax(form, "set! target must be a symbol"),
            };
            Ok(make_var_set(name, parse(form.caddr(), interner)?))
        }

        "define" => Err(CompileError::NotYetImplemented("define inside a body")),

        "lambda" => parse_lambda(form, interner),

        "cond" => {
            let expanded = expand_cond(form.cdr(), interner)?;
            parse(&expanded, interner)
        }

        "let" => {
            let expanded = expand_let(form, interner)?;
            parse(&expanded, interner)
        }

        "let*" => {
            let expanded = expand_let_star(form, interner)?;
            parse(&expanded, interner)
        }

        "letrec" => {
            let expanded = expand_letrec(form, interner)?;
            parse(&expanded, interner)
        }

        "quasiquote" => {
            if form.list_length() != Some(2) {
                return syntax(form, "quasiquote takes exactly one template");
            }
            let expanded = expand_quasiquote(form.cadr(), interner);
            parse(&expanded, interner)
        }

        _ => syntax(form, "reserved word cannot head a form"),
    }
}

fn parse_each(
    mut forms: &Sexpr,
    interner: &Rc<SymbolInterner>,
) -> Result<Vec<Rc<Expr>>, CompileError> {
    let mut out = Vec::new();
    while let Some((form, rest)) = forms.pair() {
        out.push(parse(form, interner)?);
        forms = rest;
    }
    Ok(out)
}

/// Wraps a body tail (one or more forms) into a `(begin ...)` S-expression.
fn implicit_begin(body: &Sexpr, interner: &Rc<SymbolInterner>) -> Sexpr {
    cons(Sexpr::Symbol(interner.intern("begin")), body.clone())
}

fn parse_lambda(form: &Sexpr, interner: &Rc<SymbolInterner>) -> ParseResult {
    if !form.is_proper_list() || form.list_length() < Some(3) {
        return syntax(form, "lambda takes a parameter list and a body");
    }

    let mut fixed = Vec::new();
    let mut formals = form.cadr();
    while let Some((param, rest)) = formals.pair() {
        match param.symbol() {
            Some(s) if !is_reserved(s.name()) => fixed.push(s.clone()),
            _ => return syntax(form, "lambda parameter must be an unreserved symbol"),
        }
        formals = rest;
    }

    let kind = match formals {
        Sexpr::Nil => LambdaKind::Simple,
        Sexpr::Symbol(rest) if !is_reserved(rest.name()) => LambdaKind::Opt(rest.clone()),
        _ => return syntax(form, "malformed lambda parameter list"),
    };

    let mut seen: HashSet<&str> = HashSet::new();
    let dup = fixed
        .iter()
        .chain(match &kind {
            LambdaKind::Opt(rest) => std::slice::from_ref(rest),
            LambdaKind::Simple => &[],
        })
        .any(|p| !seen.insert(p.name()));
    if dup {
        return syntax(form, "duplicate parameter name");
    }

    let body = parse(&implicit_begin(form.cddr(), interner), interner)?;
    Ok(make_lambda(fixed, kind, body))
}

fn parse_define(form: &Sexpr, interner: &Rc<SymbolInterner>) -> ParseResult {
    if !form.is_proper_list() || form.list_length() < Some(3) {
        return syntax(form, "define takes a name and an expression");
    }

    let target = form.cadr();

    // (define (f . params) body...) => (define f (lambda params (begin body...)))
    if target.is_pair() {
        let name = target.car().clone();
        let params = target.cdr().clone();
        let lambda = Sexpr::make_list_star(
            &[Sexpr::Symbol(interner.intern("lambda")), params],
            form.cddr().clone(),
        );
        let define = Sexpr::make_list(&[
            Sexpr::Symbol(interner.intern("define")),
            name,
            lambda,
        ]);
        return parse_define(&define, interner);
    }

    if form.list_length() != Some(3) {
        return syntax(form, "define takes a name and an expression");
    }
    match target.symbol() {
        Some(s) if !is_reserved(s.name()) => {
            Ok(make_var_def(s.clone(), parse(form.caddr(), interner)?))
        }
        Some(_) => syntax(form, "reserved word in define"),
        None => syntax(form, "define target must be a symbol"),
    }
}

fn expand_cond(clauses: &Sexpr, interner: &Rc<SymbolInterner>) -> Result<Sexpr, CompileError> {
    let Some((clause, rest)) = clauses.pair() else {
        // no clause applied
        return Ok(Sexpr::Void);
    };
    if !clause.is_pair() || !clause.is_proper_list() {
        return syntax(clause, "malformed cond clause");
    }

    let sym = |name: &str| Sexpr::Symbol(interner.intern(name));

    // (else e...)
    if clause.car().symbol().is_some_and(|s| s.name() == "else") {
        return Ok(implicit_begin(clause.cdr(), interner));
    }

    // (t => f)
    if clause.list_length() == Some(3)
        && clause.cadr().symbol().is_some_and(|s| s.name() == "=>")
    {
        let test = clause.car().clone();
        let recv = clause.caddr().clone();
        let thunk = |body: Sexpr| Sexpr::make_list(&[sym("lambda"), Sexpr::Nil, body]);

        let value_binding = Sexpr::make_list(&[sym("value"), test]);
        let f_binding = Sexpr::make_list(&[sym("f"), thunk(recv)]);
        let applied = Sexpr::make_list(&[
            Sexpr::make_list(&[sym("f")]),
            sym("value"),
        ]);

        let (bindings, alternative) = if rest.is_null() {
            (
                Sexpr::make_list(&[value_binding, f_binding]),
                None,
            )
        } else {
            let rest_binding =
                Sexpr::make_list(&[sym("rest"), thunk(expand_cond(rest, interner)?)]);
            (
                Sexpr::make_list(&[value_binding, f_binding, rest_binding]),
                Some(Sexpr::make_list(&[sym("rest")])),
            )
        };

        let mut if_form = vec![sym("if"), sym("value"), applied];
        if let Some(alt) = alternative {
            if_form.push(alt);
        }
        return Ok(Sexpr::make_list(&[
            sym("let"),
            bindings,
            Sexpr::make_list(&if_form),
        ]));
    }

    // (p e...)
    Ok(Sexpr::make_list(&[
        sym("if"),
        clause.car().clone(),
        implicit_begin(clause.cdr(), interner),
        expand_cond(rest, interner)?,
    ]))
}

fn let_bindings(form: &Sexpr) -> Result<Vec<(Sexpr, Sexpr)>, CompileError> {
    let mut out = Vec::new();
    let mut ls = form.cadr();
    while let Some((binding, rest)) = ls.pair() {
        if binding.list_length() != Some(2) {
            return syntax(binding, "(<var> <expr>) expected in binding list");
        }
        out.push((binding.car().clone(), binding.cadr().clone()));
        ls = rest;
    }
    if !ls.is_null() {
        return syntax(form, "proper list of bindings expected");
    }
    Ok(out)
}

/// `(let ((x e)...) body...)` => `((lambda (x...) (begin body...)) e...)`
fn expand_let(form: &Sexpr, interner: &Rc<SymbolInterner>) -> Result<Sexpr, CompileError> {
    if !form.is_proper_list() || form.list_length() < Some(3) {
        return syntax(form, "let takes a binding list and a body");
    }
    let bindings = let_bindings(form)?;
    let params = Sexpr::make_list(&bindings.iter().map(|(x, _)| x.clone()).collect::<Vec<_>>());
    let lambda = Sexpr::make_list(&[
        Sexpr::Symbol(interner.intern("lambda")),
        params,
        implicit_begin(form.cddr(), interner),
    ]);
    let mut call = vec![lambda];
    call.extend(bindings.into_iter().map(|(_, e)| e));
    Ok(Sexpr::make_list(&call))
}

/// `(let* ((x e) rest...) body...)` peels one binding at a time.
fn expand_let_star(form: &Sexpr, interner: &Rc<SymbolInterner>) -> Result<Sexpr, CompileError> {
    if !form.is_proper_list() || form.list_length() < Some(3) {
        return syntax(form, "let* takes a binding list and a body");
    }
    let sym = |name: &str| Sexpr::Symbol(interner.intern(name));
    let bindings = form.cadr();

    match bindings.pair() {
        None if bindings.is_null() => {
            Ok(Sexpr::make_list_star(&[sym("let"), Sexpr::Nil], form.cddr().clone()))
        }
        None => syntax(form, "proper list of bindings expected"),
        Some((first, rest)) => {
            if rest.is_null() {
                return Ok(Sexpr::make_list_star(
                    &[sym("let"), Sexpr::make_list(&[first.clone()])],
                    form.cddr().clone(),
                ));
            }
            let inner = Sexpr::make_list_star(
                &[sym("let*"), rest.clone()],
                form.cddr().clone(),
            );
            Ok(Sexpr::make_list(&[
                sym("let"),
                Sexpr::make_list(&[first.clone()]),
                inner,
            ]))
        }
    }
}

/// `(letrec ((x e)...) body...)` =>
/// `(let ((x 'whatever)...) (set! x e)... body...)`
fn expand_letrec(form: &Sexpr, interner: &Rc<SymbolInterner>) -> Result<Sexpr, CompileError> {
    if !form.is_proper_list() || form.list_length() < Some(3) {
        return syntax(form, "letrec takes a binding list and a body");
    }
    let sym = |name: &str| Sexpr::Symbol(interner.intern(name));
    let bindings = let_bindings(form)?;

    let whatever = Sexpr::make_list(&[sym("quote"), sym("whatever")]);
    let outer = bindings
        .iter()
        .map(|(x, _)| Sexpr::make_list(&[x.clone(), whatever.clone()]))
        .collect::<Vec<_>>();

    let mut body = form.cddr().clone();
    for (x, e) in bindings.into_iter().rev() {
        body = cons(Sexpr::make_list(&[sym("set!"), x, e]), body);
    }

    Ok(Sexpr::make_list_star(
        &[sym("let"), Sexpr::make_list(&outer)],
        body,
    ))
}

fn is_unquote_splicing(form: &Sexpr) -> bool {
    form.is_pair()
        && form.list_length() == Some(2)
        && form
            .car()
            .symbol()
            .is_some_and(|s| s.name() == "unquote-splicing")
}

fn is_unquote(form: &Sexpr) -> bool {
    form.is_pair()
        && form.list_length() == Some(2)
        && form.car().symbol().is_some_and(|s| s.name() == "unquote")
}

/// Rewrites a quasiquote template into cons/append/vector applications.
pub fn expand_quasiquote(template: &Sexpr, interner: &Rc<SymbolInterner>) -> Sexpr {
    let sym = |name: &str| Sexpr::Symbol(interner.intern(name));
    let quote = |x: Sexpr| Sexpr::make_list(&[sym("quote"), x]);

    match template {
        Sexpr::Nil => quote(Sexpr::Nil),
        Sexpr::Symbol(_) => quote(template.clone()),

        Sexpr::Pair(p) => {
            if is_unquote(template) {
                return template.cadr().clone();
            }
            if is_unquote_splicing(&p.0) {
                let spliced = p.0.cadr().clone();
                return if p.1.is_null() {
                    spliced
                } else {
                    Sexpr::make_list(&[
                        sym("append"),
                        spliced,
                        expand_quasiquote(&p.1, interner),
                    ])
                };
            }
            Sexpr::make_list(&[
                sym("cons"),
                expand_quasiquote(&p.0, interner),
                expand_quasiquote(&p.1, interner),
            ])
        }

        Sexpr::Vector(v) => {
            if v.iter().any(is_unquote_splicing) {
                let elems = Sexpr::make_list(v.as_slice());
                Sexpr::make_list(&[
                    sym("list->vector"),
                    expand_quasiquote(&elems, interner),
                ])
            } else {
                let mut call = vec![sym("vector")];
                call.extend(v.iter().map(|e| expand_quasiquote(e, interner)));
                Sexpr::make_list(&call)
            }
        }

        atom => quote(atom.clone()),
    }
}
