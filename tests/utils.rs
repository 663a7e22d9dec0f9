#![allow(dead_code)]

use std::rc::Rc;

use scm86::boxing::pass_boxing;
use scm86::expander::parse_program;
use scm86::lexical::pass_lexical;
use scm86::reader::{Reader, SymbolInterner};
use scm86::sexpr::Sexpr;
use scm86::tails::pass_tails;
use scm86::tree_il::{AExpr, Expr};

pub fn read_all(src: &str) -> Vec<Sexpr> {
    let interner = SymbolInterner::new();
    Reader::new(src, &interner)
        .read_program()
        .unwrap_or_else(|e| panic!("read failed for {:?}: {}", src, e))
}

pub fn parse_all(src: &str) -> Vec<Rc<Expr>> {
    let interner = SymbolInterner::new();
    let forms = Reader::new(src, &interner)
        .read_program()
        .unwrap_or_else(|e| panic!("read failed for {:?}: {}", src, e));
    parse_program(&forms, &interner)
        .unwrap_or_else(|e| panic!("parse failed for {:?}: {}", src, e))
}

pub fn analyze(src: &str) -> Vec<Rc<AExpr>> {
    parse_all(src)
        .iter()
        .map(|e| pass_boxing(&pass_tails(&pass_lexical(e))))
        .collect()
}
