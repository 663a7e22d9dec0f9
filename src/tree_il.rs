//! The tree intermediate language.
//!
//! Two closed sums: [`Expr`] is what the tag parser produces, [`AExpr`] is
//! what the semantic passes produce — the same shape with every variable
//! name replaced by an addressed [`Var`], applications tagged tail/non-tail,
//! and the three box forms added. All passes work in nanopass fashion,
//! producing a brand new tree; nothing is mutated in place.

use std::rc::Rc;

use pretty::{DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec, WriteColor};

use crate::sexpr::{Sexpr, Symbol};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaKind {
    Simple,
    /// The extra parameter collecting the rest of the arguments.
    Opt(Rc<Symbol>),
}

/// Core forms, before analysis. Variables are bare names.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Sexpr),
    VarGet(Rc<Symbol>),
    VarSet(Rc<Symbol>, Rc<Expr>),
    VarDef(Rc<Symbol>, Rc<Expr>),
    If(Rc<Expr>, Rc<Expr>, Rc<Expr>),
    Seq(Vec<Rc<Expr>>),
    Or(Vec<Rc<Expr>>),
    Lambda {
        params: Vec<Rc<Symbol>>,
        kind: LambdaKind,
        body: Rc<Expr>,
    },
    Applic(Rc<Expr>, Vec<Rc<Expr>>),
}

/// Where a variable lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    /// A slot of the global free-variables table.
    Free,
    /// The i-th parameter of the innermost enclosing lambda.
    Param(usize),
    /// The `minor`-th slot of the rib `major` frames up the environment.
    Bound { major: usize, minor: usize },
}

impl std::fmt::Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Addr::Free => write!(f, "f"),
            Addr::Param(i) => write!(f, "p{}", i),
            Addr::Bound { major, minor } => write!(f, "b{}.{}", major, minor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Var {
    pub name: Rc<Symbol>,
    pub addr: Addr,
}

impl Var {
    pub fn new(name: Rc<Symbol>, addr: Addr) -> Self {
        Self { name, addr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    NonTail,
    Tail,
}

/// Analyzed forms: addressed variables, tail tags, box forms.
#[derive(Debug, Clone, PartialEq)]
pub enum AExpr {
    Const(Sexpr),
    VarGet(Var),
    VarSet(Var, Rc<AExpr>),
    VarDef(Var, Rc<AExpr>),
    /// Allocate a fresh cell holding the current value of the variable.
    Box(Var),
    BoxGet(Var),
    BoxSet(Var, Rc<AExpr>),
    If(Rc<AExpr>, Rc<AExpr>, Rc<AExpr>),
    Seq(Vec<Rc<AExpr>>),
    Or(Vec<Rc<AExpr>>),
    Lambda {
        params: Vec<Rc<Symbol>>,
        kind: LambdaKind,
        body: Rc<AExpr>,
    },
    Applic(Rc<AExpr>, Vec<Rc<AExpr>>, AppKind),
}

pub fn make_const(value: Sexpr) -> Rc<Expr> {
    Rc::new(Expr::Const(value))
}

pub fn make_var_get(name: Rc<Symbol>) -> Rc<Expr> {
    Rc::new(Expr::VarGet(name))
}

pub fn make_var_set(name: Rc<Symbol>, value: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::VarSet(name, value))
}

pub fn make_var_def(name: Rc<Symbol>, value: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::VarDef(name, value))
}

pub fn make_if(test: Rc<Expr>, then: Rc<Expr>, alt: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::If(test, then, alt))
}

/// A one-element sequence is the element itself.
pub fn make_seq(seq: Vec<Rc<Expr>>) -> Rc<Expr> {
    if seq.len() == 1 {
        return seq.into_iter().next().unwrap();
    }
    Rc::new(Expr::Seq(seq))
}

pub fn make_or(exprs: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Or(exprs))
}

pub fn make_lambda(params: Vec<Rc<Symbol>>, kind: LambdaKind, body: Rc<Expr>) -> Rc<Expr> {
    Rc::new(Expr::Lambda { params, kind, body })
}

pub fn make_applic(proc: Rc<Expr>, args: Vec<Rc<Expr>>) -> Rc<Expr> {
    Rc::new(Expr::Applic(proc, args))
}

fn kw(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec.set_bold(true);
    spec
}

fn fg(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec
}

impl Var {
    fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        allocator
            .text(self.name.name().to_string())
            .annotate(kw(Color::Blue))
            .append(allocator.text(format!("@{}", self.addr)))
    }
}

impl AExpr {
    /// Colored rendition of the analyzed tree, for `--dump-il`.
    pub fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        let head = |name: &str| allocator.text(name.to_string()).annotate(fg(Color::Green));

        match self {
            AExpr::Const(value) => head("const")
                .append(allocator.space())
                .append(value.pretty(allocator))
                .group()
                .parens(),

            AExpr::VarGet(var) => head("ref")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .group()
                .parens(),

            AExpr::VarSet(var, value) => head("set")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .append(allocator.line())
                .append(value.pretty(allocator).nest(1))
                .align()
                .group()
                .parens(),

            AExpr::VarDef(var, value) => head("def")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .append(allocator.line())
                .append(value.pretty(allocator).nest(1))
                .align()
                .group()
                .parens(),

            AExpr::Box(var) => head("box")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .group()
                .parens(),

            AExpr::BoxGet(var) => head("box-ref")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .group()
                .parens(),

            AExpr::BoxSet(var, value) => head("box-set!")
                .append(allocator.space())
                .append(var.pretty(allocator))
                .append(allocator.line())
                .append(value.pretty(allocator).nest(1))
                .align()
                .group()
                .parens(),

            AExpr::If(test, then, alt) => head("test")
                .append(allocator.space())
                .append(test.pretty(allocator))
                .append(allocator.line())
                .append(then.pretty(allocator))
                .append(allocator.line())
                .append(alt.pretty(allocator))
                .nest(1)
                .group()
                .parens(),

            AExpr::Seq(seq) => {
                let body = allocator.intersperse(
                    seq.iter().map(|x| x.pretty(allocator)),
                    allocator.line(),
                );
                head("seq")
                    .append(allocator.line())
                    .append(body)
                    .nest(1)
                    .group()
                    .parens()
            }

            AExpr::Or(exprs) => {
                let body = allocator.intersperse(
                    exprs.iter().map(|x| x.pretty(allocator)),
                    allocator.line(),
                );
                head("or")
                    .append(allocator.line())
                    .append(body)
                    .nest(1)
                    .group()
                    .parens()
            }

            AExpr::Lambda { params, kind, body } => {
                let mut args = allocator.intersperse(
                    params
                        .iter()
                        .map(|p| allocator.text(p.name().to_string()).annotate(kw(Color::Blue))),
                    allocator.space(),
                );
                if let LambdaKind::Opt(rest) = kind {
                    args = args
                        .append(allocator.text(" . "))
                        .append(allocator.text(rest.name().to_string()).annotate(kw(Color::Blue)));
                }
                head("lambda")
                    .append(allocator.space())
                    .append(args.parens())
                    .append(allocator.line())
                    .append(body.pretty(allocator))
                    .nest(1)
                    .align()
                    .group()
                    .parens()
            }

            AExpr::Applic(proc, args, tag) => {
                let name = match tag {
                    AppKind::Tail => "tail-call",
                    AppKind::NonTail => "call",
                };
                let mut doc = head(name)
                    .append(allocator.space())
                    .append(proc.pretty(allocator));
                if !args.is_empty() {
                    doc = doc.append(allocator.line()).append(allocator.intersperse(
                        args.iter().map(|x| x.pretty(allocator)),
                        allocator.line(),
                    ));
                }
                doc.nest(1).group().parens().align()
            }
        }
    }

    pub fn pretty_print(&self, out: impl WriteColor) -> std::io::Result<()> {
        let allocator = pretty::BoxAllocator;
        self.pretty(&allocator).1.render_colored(70, out)?;
        Ok(())
    }
}
