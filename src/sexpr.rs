//! S-expression values.
//!
//! The reader produces these, the tag parser consumes them, and the constants
//! table deduplicates them by structural equality. Symbols are interned by the
//! reader so that name equality and pointer equality coincide.

use std::hash::Hash;
use std::rc::Rc;

use num::rational::Rational64;

/// An interned symbol. The reader's interner guarantees one allocation per
/// distinct (lowercased) name.
pub struct Symbol {
    name: String,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.name.as_str()
    }
}

impl std::ops::Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

/// The numeric subset: exact 64-bit integers, reduced fractions, doubles.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Fraction(Rational64),
    Real(f64),
}

impl Number {
    /// Builds a fraction, collapsing `p/1` (and `0/q`) to an integer.
    /// The denominator must be positive; `Ratio::new` reduces by gcd and
    /// keeps the sign in the numerator.
    pub fn fraction(numer: i64, denom: i64) -> Number {
        let r = Rational64::new(numer, denom);
        if r.is_integer() {
            Number::Integer(r.to_integer())
        } else {
            Number::Fraction(r)
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(x), Number::Integer(y)) => x == y,
            (Number::Fraction(x), Number::Fraction(y)) => x == y,
            (Number::Real(x), Number::Real(y)) => x.to_bits() == y.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Number::Integer(n) => {
                state.write_u8(0);
                state.write_i64(*n);
            }
            Number::Fraction(r) => {
                state.write_u8(1);
                state.write_i64(*r.numer());
                state.write_i64(*r.denom());
            }
            Number::Real(f) => {
                state.write_u8(2);
                state.write_u64(f.to_bits());
            }
        }
    }
}

#[derive(Clone)]
pub enum Sexpr {
    Void,
    Nil,
    Boolean(bool),
    Char(u8),
    String(Rc<String>),
    Symbol(Rc<Symbol>),
    Number(Number),
    Vector(Rc<Vec<Sexpr>>),
    Pair(Rc<(Sexpr, Sexpr)>),
}

pub fn cons(car: Sexpr, cdr: Sexpr) -> Sexpr {
    Sexpr::Pair(Rc::new((car, cdr)))
}

impl Sexpr {
    pub fn is_null(&self) -> bool {
        matches!(self, Sexpr::Nil)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Sexpr::Pair(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Sexpr::Symbol(_))
    }

    pub fn symbol(&self) -> Option<&Rc<Symbol>> {
        match self {
            Sexpr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn pair(&self) -> Option<&(Sexpr, Sexpr)> {
        match self {
            Sexpr::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn car(&self) -> &Sexpr {
        match self {
            Sexpr::Pair(p) => &p.0,
            _ => panic!("car called on non-pair"),
        }
    }

    pub fn cdr(&self) -> &Sexpr {
        match self {
            Sexpr::Pair(p) => &p.1,
            _ => panic!("cdr called on non-pair"),
        }
    }

    pub fn cadr(&self) -> &Sexpr {
        self.cdr().car()
    }

    pub fn cddr(&self) -> &Sexpr {
        self.cdr().cdr()
    }

    pub fn caddr(&self) -> &Sexpr {
        self.cddr().car()
    }

    pub fn is_proper_list(&self) -> bool {
        match self {
            Sexpr::Nil => true,
            Sexpr::Pair(p) => p.1.is_proper_list(),
            _ => false,
        }
    }

    pub fn list_length(&self) -> Option<usize> {
        match self {
            Sexpr::Nil => Some(0),
            Sexpr::Pair(p) => p.1.list_length().map(|n| n + 1),
            _ => None,
        }
    }

    /// Builds a proper list from a slice.
    pub fn make_list(exprs: &[Sexpr]) -> Sexpr {
        let mut list = Sexpr::Nil;
        for expr in exprs.iter().rev() {
            list = cons(expr.clone(), list);
        }
        list
    }

    /// Builds an improper list ending in `rest`.
    pub fn make_list_star(exprs: &[Sexpr], rest: Sexpr) -> Sexpr {
        let mut list = rest;
        for expr in exprs.iter().rev() {
            list = cons(expr.clone(), list);
        }
        list
    }

    /// Collects a proper list into a vector; `None` on dotted lists.
    pub fn to_vec(&self) -> Option<Vec<Sexpr>> {
        let mut out = Vec::new();
        let mut rest = self;
        while let Sexpr::Pair(p) = rest {
            out.push(p.0.clone());
            rest = &p.1;
        }
        rest.is_null().then_some(out)
    }
}

impl PartialEq for Sexpr {
    /// Structural equality: the key the constants table deduplicates by.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Sexpr::Void, Sexpr::Void) => true,
            (Sexpr::Nil, Sexpr::Nil) => true,
            (Sexpr::Boolean(x), Sexpr::Boolean(y)) => x == y,
            (Sexpr::Char(x), Sexpr::Char(y)) => x == y,
            (Sexpr::String(x), Sexpr::String(y)) => x == y,
            (Sexpr::Symbol(x), Sexpr::Symbol(y)) => x == y,
            (Sexpr::Number(x), Sexpr::Number(y)) => x == y,
            (Sexpr::Vector(x), Sexpr::Vector(y)) => {
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| a == b)
            }
            (Sexpr::Pair(x), Sexpr::Pair(y)) => x.0 == y.0 && x.1 == y.1,
            _ => false,
        }
    }
}

impl Eq for Sexpr {}

impl Hash for Sexpr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Sexpr::Void => state.write_u8(0),
            Sexpr::Nil => state.write_u8(1),
            Sexpr::Boolean(b) => {
                state.write_u8(2);
                state.write_u8(*b as u8);
            }
            Sexpr::Char(c) => {
                state.write_u8(3);
                state.write_u8(*c);
            }
            Sexpr::String(s) => {
                state.write_u8(4);
                s.hash(state);
            }
            Sexpr::Symbol(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            Sexpr::Number(n) => {
                state.write_u8(6);
                n.hash(state);
            }
            Sexpr::Vector(v) => {
                state.write_u8(7);
                state.write_usize(v.len());
                for x in v.iter() {
                    x.hash(state);
                }
            }
            Sexpr::Pair(p) => {
                state.write_u8(8);
                p.0.hash(state);
                p.1.hash(state);
            }
        }
    }
}

const NAMED_CHARS: &[(&str, u8)] = &[
    ("nul", 0x00),
    ("alarm", 0x07),
    ("backspace", 0x08),
    ("tab", 0x09),
    ("newline", 0x0a),
    ("page", 0x0c),
    ("return", 0x0d),
    ("space", 0x20),
];

pub fn named_char(name: &str) -> Option<u8> {
    NAMED_CHARS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, c)| c)
}

fn char_name(c: u8) -> Option<&'static str> {
    NAMED_CHARS.iter().find(|&&(_, b)| b == c).map(|&(n, _)| n)
}

/// The canonical printer. `read(print(s))` reconstructs `s` for every value
/// not containing string interpolation, so the output stays inside the
/// reader's grammar: non-printable bytes escape as `\xHH;`, `~` doubles.
impl std::fmt::Display for Sexpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sexpr::Void => write!(f, "#void"),
            Sexpr::Nil => write!(f, "()"),
            Sexpr::Boolean(true) => write!(f, "#t"),
            Sexpr::Boolean(false) => write!(f, "#f"),
            Sexpr::Char(c) => match char_name(*c) {
                Some(name) => write!(f, "#\\{}", name),
                None if (0x21..0x7f).contains(c) => write!(f, "#\\{}", *c as char),
                None => write!(f, "#\\x{:x}", c),
            },
            Sexpr::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        '\x0c' => write!(f, "\\f")?,
                        '~' => write!(f, "~~")?,
                        c if (' '..='\x7e').contains(&c) => write!(f, "{}", c)?,
                        c => write!(f, "\\x{:x};", c as u32)?,
                    }
                }
                write!(f, "\"")
            }
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(Number::Integer(n)) => write!(f, "{}", n),
            Sexpr::Number(Number::Fraction(r)) => write!(f, "{}/{}", r.numer(), r.denom()),
            Sexpr::Number(Number::Real(x)) => write!(f, "{:?}", x),
            Sexpr::Vector(v) => {
                write!(f, "#(")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
            Sexpr::Pair(p) => {
                write!(f, "({}", p.0)?;
                let mut rest = &p.1;
                loop {
                    match rest {
                        Sexpr::Pair(q) => {
                            write!(f, " {}", q.0)?;
                            rest = &q.1;
                        }
                        Sexpr::Nil => break,
                        other => {
                            write!(f, " . {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl std::fmt::Debug for Sexpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

use pretty::{DocAllocator, DocBuilder};
use termcolor::{Color, ColorSpec};

fn lit(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color));
    spec
}

impl Sexpr {
    /// Colored rendition for diagnostics; the layout mirrors the canonical
    /// printer but breaks long lists.
    pub fn pretty<'a, D>(&self, allocator: &'a D) -> DocBuilder<'a, D, ColorSpec>
    where
        D: DocAllocator<'a, ColorSpec>,
        D::Doc: Clone,
    {
        match self {
            Sexpr::Pair(p) => {
                let mut doc = allocator.nil();
                let mut p = Some(&**p);

                while let Some((car, cdr)) = p {
                    doc = doc.append(car.pretty(allocator));
                    match cdr {
                        Sexpr::Pair(q) => {
                            doc = doc.append(allocator.line());
                            p = Some(q);
                        }
                        Sexpr::Nil => break,
                        other => {
                            doc = doc.append(allocator.text(" . "));
                            doc = doc.append(other.pretty(allocator));
                            break;
                        }
                    }
                }

                doc.nest(1).parens().group().align()
            }

            Sexpr::Vector(v) => {
                let elems =
                    allocator.intersperse(v.iter().map(|x| x.pretty(allocator)), allocator.line());

                allocator
                    .text("#")
                    .append(elems.nest(2).parens())
                    .group()
                    .align()
            }

            Sexpr::Symbol(s) => allocator.text(s.name().to_string()).annotate(lit(Color::Blue)),

            Sexpr::String(_) => allocator.text(self.to_string()).annotate(lit(Color::Yellow)),

            atom => allocator.text(atom.to_string()).annotate(lit(Color::Green)),
        }
    }

    pub fn pretty_print(&self, out: impl termcolor::WriteColor) -> std::io::Result<()> {
        let allocator = pretty::BoxAllocator;
        self.pretty(&allocator).1.render_colored(70, out)?;
        Ok(())
    }
}
