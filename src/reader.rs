//! The reader: a character buffer with a cursor, mapped to S-expressions.
//!
//! Every production either yields a value with the cursor advanced past it or
//! fails with the cursor restored, so alternatives compose by trying in order.
//! Whitespace and the three comment forms (`;` line, nesting `{ }`, `#;`
//! datum) are skippable around every S-expression.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::sexpr::{named_char, Number, Sexpr, Symbol};

#[derive(Debug)]
pub struct SymbolInterner {
    symbols: RefCell<HashMap<String, Rc<Symbol>>>,
}

impl SymbolInterner {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            symbols: RefCell::new(HashMap::new()),
        })
    }

    pub fn intern(&self, name: impl AsRef<str>) -> Rc<Symbol> {
        let name = name.as_ref();
        if let Some(interned) = self.symbols.borrow().get(name) {
            return interned.clone();
        }

        let interned = Rc::new(Symbol::new(name));
        self.symbols
            .borrow_mut()
            .insert(name.to_owned(), interned.clone());
        interned
    }
}

/// A malformed S-expression: byte offset of the failure plus the construct
/// that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadError {
    pub pos: usize,
    pub what: &'static str,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "read error at byte {}: {}", self.pos, self.what)
    }
}

impl std::error::Error for ReadError {}

pub type ReadResult<T> = Result<T, ReadError>;

/// Symbol constituents: `[a-zA-Z0-9!$^*_\-+=<>?/]`.
fn is_symbol_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!$^*_-+=<>?/".contains(&b)
}

fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

pub struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    interner: Rc<SymbolInterner>,
}

impl<'a> Reader<'a> {
    pub fn new(src: &'a str, interner: &Rc<SymbolInterner>) -> Self {
        Self {
            input: src.as_bytes(),
            pos: 0,
            interner: interner.clone(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.input.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn fail<T>(&self, what: &'static str) -> ReadResult<T> {
        Err(ReadError {
            pos: self.pos,
            what,
        })
    }

    /// The not-followed-by guard shared by the atom productions.
    fn at_symbol_char(&self) -> bool {
        self.peek().is_some_and(is_symbol_char)
    }

    /// Skips whitespace (any byte <= 0x20) and all three comment forms.
    fn skip_atmosphere(&mut self) -> ReadResult<()> {
        loop {
            match self.peek() {
                Some(b) if b <= 0x20 => {
                    self.pos += 1;
                }
                Some(b';') => {
                    while let Some(b) = self.bump() {
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'{') => {
                    self.pos += 1;
                    self.skip_braced()?;
                }
                Some(b'#') if self.peek_at(1) == Some(b';') => {
                    self.pos += 2;
                    self.read()?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Consumes a `{ }` comment body, the opening brace already eaten.
    /// Braces nest; string and character literals inside are respected.
    fn skip_braced(&mut self) -> ReadResult<()> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.bump() {
                None => return self.fail("unterminated { } comment"),
                Some(b'{') => depth += 1,
                Some(b'}') => depth -= 1,
                Some(b'"') => self.skip_commented_string()?,
                Some(b'#') if self.peek() == Some(b'\\') => {
                    self.pos += 1;
                    self.bump();
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Skips a string literal inside a `{ }` comment, including any `~{ }`
    /// interpolations it carries.
    fn skip_commented_string(&mut self) -> ReadResult<()> {
        loop {
            match self.bump() {
                None => return self.fail("unterminated string in { } comment"),
                Some(b'"') => return Ok(()),
                Some(b'\\') => {
                    self.bump();
                }
                Some(b'~') if self.peek() == Some(b'{') => {
                    self.pos += 1;
                    self.skip_braced()?;
                }
                Some(_) => {}
            }
        }
    }

    pub fn finished(&mut self) -> ReadResult<bool> {
        self.skip_atmosphere()?;
        Ok(self.pos >= self.input.len())
    }

    /// Reads every S-expression up to end of input.
    pub fn read_program(&mut self) -> ReadResult<Vec<Sexpr>> {
        let mut forms = Vec::new();
        while !self.finished()? {
            forms.push(self.read()?);
        }
        Ok(forms)
    }

    /// Reads one S-expression.
    pub fn read(&mut self) -> ReadResult<Sexpr> {
        self.skip_atmosphere()?;
        match self.peek() {
            None => self.fail("unexpected end of input"),
            Some(b'(') => {
                self.pos += 1;
                self.read_list()
            }
            Some(b'"') => {
                self.pos += 1;
                self.read_string()
            }
            Some(b'\'') => {
                self.pos += 1;
                self.read_shorthand("quote")
            }
            Some(b'`') => {
                self.pos += 1;
                self.read_shorthand("quasiquote")
            }
            Some(b',') => {
                self.pos += 1;
                if self.eat(b'@') {
                    self.read_shorthand("unquote-splicing")
                } else {
                    self.read_shorthand("unquote")
                }
            }
            Some(b'#') => match self.peek_at(1) {
                Some(b'(') => {
                    self.pos += 2;
                    self.read_vector()
                }
                Some(b'\\') => {
                    self.pos += 2;
                    self.read_char()
                }
                Some(b't' | b'T' | b'f' | b'F') => self.read_boolean(),
                Some(b'v' | b'V') => self.read_void(),
                _ => self.fail("unsupported # syntax"),
            },
            Some(b')') => self.fail("unexpected )"),
            Some(_) => self.read_number_or_symbol(),
        }
    }

    fn read_shorthand(&mut self, head: &str) -> ReadResult<Sexpr> {
        let datum = self.read()?;
        Ok(Sexpr::make_list(&[
            Sexpr::Symbol(self.interner.intern(head)),
            datum,
        ]))
    }

    fn read_boolean(&mut self) -> ReadResult<Sexpr> {
        let value = matches!(self.peek_at(1), Some(b't' | b'T'));
        self.pos += 2;
        if self.at_symbol_char() {
            return self.fail("malformed boolean literal");
        }
        Ok(Sexpr::Boolean(value))
    }

    fn read_void(&mut self) -> ReadResult<Sexpr> {
        let lit = self
            .input
            .get(self.pos + 1..self.pos + 5)
            .map(|s| s.eq_ignore_ascii_case(b"void"))
            .unwrap_or(false);
        if !lit {
            return self.fail("unsupported # syntax");
        }
        self.pos += 5;
        if self.at_symbol_char() {
            return self.fail("malformed #void literal");
        }
        Ok(Sexpr::Void)
    }

    fn read_char(&mut self) -> ReadResult<Sexpr> {
        let start = self.pos;
        while self.at_symbol_char() {
            self.pos += 1;
        }
        let token = &self.input[start..self.pos];

        match token.len() {
            // a visible non-symbol character such as `#\(` or `#\;`
            0 => match self.bump() {
                Some(c) if c > 0x20 => Ok(Sexpr::Char(c)),
                _ => {
                    self.pos = start;
                    self.fail("malformed character literal")
                }
            },
            1 => Ok(Sexpr::Char(token[0])),
            _ => {
                let name = std::str::from_utf8(token).unwrap_or("");
                if let Some(c) = named_char(name) {
                    return Ok(Sexpr::Char(c));
                }
                if (token[0] == b'x' || token[0] == b'X')
                    && token[1..].iter().all(|&b| is_hex_digit(b))
                {
                    let digits = std::str::from_utf8(&token[1..]).unwrap_or("");
                    let value = u32::from_str_radix(digits, 16)
                        .ok()
                        .filter(|&v| v < 256)
                        .ok_or(ReadError {
                            pos: start,
                            what: "character value out of range",
                        })?;
                    return Ok(Sexpr::Char(value as u8));
                }
                self.pos = start;
                self.fail("unrecognized character literal")
            }
        }
    }

    fn read_digits(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// The exponent marker: `e`, `E`, `*10**`, or `*10^`.
    fn eat_exponent_marker(&mut self) -> bool {
        match self.peek() {
            Some(b'e' | b'E') => {
                self.pos += 1;
                true
            }
            Some(b'*') => {
                let rest = &self.input[self.pos..];
                if rest.starts_with(b"*10**") {
                    self.pos += 5;
                    true
                } else if rest.starts_with(b"*10^") {
                    self.pos += 4;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// `[+-]digits` after an exponent marker, appended to `text` as `e...`.
    fn read_exponent(&mut self, text: &mut String) -> ReadResult<()> {
        text.push('e');
        if let Some(sign @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            text.push(sign as char);
        }
        let digits = self.read_digits();
        if digits.is_empty() {
            return self.fail("missing exponent digits");
        }
        text.push_str(std::str::from_utf8(digits).unwrap_or(""));
        Ok(())
    }

    fn finish_float(&mut self, text: String) -> ReadResult<Sexpr> {
        let value: f64 = text.parse().map_err(|_| ReadError {
            pos: self.pos,
            what: "malformed float literal",
        })?;
        Ok(Sexpr::Number(Number::Real(value)))
    }

    fn parse_i64(&self, digits: &str) -> ReadResult<i64> {
        digits.parse().map_err(|_| ReadError {
            pos: self.pos,
            what: "integer literal out of range",
        })
    }

    /// One numeric atom. The caller restores the cursor on failure and
    /// applies the not-followed-by-a-symbol-char guard.
    fn try_read_number(&mut self) -> ReadResult<Sexpr> {
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let sign = if negative { "-" } else { "" };

        let int_text = std::str::from_utf8(self.read_digits())
            .unwrap_or("")
            .to_owned();

        // `.MANT[e K]` and `IP.MANT[e K]`
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            let mant = self.read_digits();
            let mut text = format!(
                "{}{}.{}",
                sign,
                if int_text.is_empty() { "0" } else { &int_text },
                std::str::from_utf8(mant).unwrap_or("")
            );
            if self.eat_exponent_marker() {
                self.read_exponent(&mut text)?;
            }
            return self.finish_float(text);
        }

        if int_text.is_empty() {
            return self.fail("not a number");
        }

        // `IP e K`
        if self.eat_exponent_marker() {
            let mut text = format!("{}{}", sign, int_text);
            self.read_exponent(&mut text)?;
            return self.finish_float(text);
        }

        // `N/M`
        if self.peek() == Some(b'/') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            let den_text = std::str::from_utf8(self.read_digits())
                .unwrap_or("")
                .to_owned();
            let numer = self.parse_i64(&int_text)?;
            let denom = self.parse_i64(&den_text)?;
            if denom == 0 {
                return self.fail("fraction with zero denominator");
            }
            let numer = if negative { -numer } else { numer };
            return Ok(Sexpr::Number(Number::fraction(numer, denom)));
        }

        let value = self.parse_i64(&int_text)?;
        Ok(Sexpr::Number(Number::Integer(if negative {
            -value
        } else {
            value
        })))
    }

    /// Numbers win over symbols; a token that fails to tokenize as a number
    /// (or continues with more symbol constituents) is a symbol, lowercased.
    fn read_number_or_symbol(&mut self) -> ReadResult<Sexpr> {
        let start = self.pos;
        match self.try_read_number() {
            Ok(n) if !self.at_symbol_char() => return Ok(n),
            _ => self.pos = start,
        }

        while self.at_symbol_char() {
            self.pos += 1;
        }
        if self.pos == start {
            return self.fail("unexpected character");
        }
        let name = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| ReadError {
                pos: start,
                what: "non-ASCII symbol",
            })?
            .to_ascii_lowercase();
        Ok(Sexpr::Symbol(self.interner.intern(&name)))
    }

    fn read_string(&mut self) -> ReadResult<Sexpr> {
        enum Part {
            Static(String),
            Dynamic(Sexpr),
        }

        let mut parts: Vec<Part> = Vec::new();
        let mut buf = String::new();

        loop {
            match self.bump() {
                None => return self.fail("unterminated string"),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    Some(b'\\') => buf.push('\\'),
                    Some(b'"') => buf.push('"'),
                    Some(b'n') => buf.push('\n'),
                    Some(b'r') => buf.push('\r'),
                    Some(b'f') => buf.push('\x0c'),
                    Some(b't') => buf.push('\t'),
                    Some(b'x' | b'X') => {
                        let start = self.pos;
                        while self.peek().is_some_and(is_hex_digit) {
                            self.pos += 1;
                        }
                        let digits =
                            std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
                        if digits.is_empty() || !self.eat(b';') {
                            return self.fail("malformed \\x escape");
                        }
                        let value = u32::from_str_radix(digits, 16)
                            .ok()
                            .filter(|&v| v < 256)
                            .ok_or(ReadError {
                                pos: start,
                                what: "string escape out of range",
                            })?;
                        buf.push(value as u8 as char);
                    }
                    _ => return self.fail("unknown string escape"),
                },
                Some(b'~') => match self.peek() {
                    Some(b'~') => {
                        self.pos += 1;
                        buf.push('~');
                    }
                    Some(b'{') => {
                        self.pos += 1;
                        let expr = self.read()?;
                        self.skip_atmosphere()?;
                        if !self.eat(b'}') {
                            return self.fail("unterminated ~{ } interpolation");
                        }
                        if !buf.is_empty() {
                            parts.push(Part::Static(std::mem::take(&mut buf)));
                        }
                        parts.push(Part::Dynamic(expr));
                    }
                    _ => return self.fail("stray ~ in string"),
                },
                Some(b) => buf.push(b as char),
            }
        }

        if parts.is_empty() {
            return Ok(Sexpr::String(Rc::new(buf)));
        }
        if !buf.is_empty() {
            parts.push(Part::Static(buf));
        }

        // a string with dynamic parts becomes
        // (string-append static... (format "~a" dynamic)...)
        let format_sym = Sexpr::Symbol(self.interner.intern("format"));
        let tilde_a = Sexpr::String(Rc::new("~a".to_owned()));
        let mut args = vec![Sexpr::Symbol(self.interner.intern("string-append"))];
        for part in parts {
            args.push(match part {
                Part::Static(s) => Sexpr::String(Rc::new(s)),
                Part::Dynamic(e) => Sexpr::make_list(&[format_sym.clone(), tilde_a.clone(), e]),
            });
        }
        Ok(Sexpr::make_list(&args))
    }

    fn read_vector(&mut self) -> ReadResult<Sexpr> {
        let mut elems = Vec::new();
        loop {
            self.skip_atmosphere()?;
            match self.peek() {
                None => return self.fail("unterminated vector"),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Sexpr::Vector(Rc::new(elems)));
                }
                _ => elems.push(self.read()?),
            }
        }
    }

    fn read_list(&mut self) -> ReadResult<Sexpr> {
        let mut elems = Vec::new();
        loop {
            self.skip_atmosphere()?;
            match self.peek() {
                None => return self.fail("unterminated list"),
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Sexpr::make_list(&elems));
                }
                // a dot not starting a float ends an improper list
                Some(b'.') if !self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    if elems.is_empty() {
                        return self.fail("dotted list with no head");
                    }
                    self.pos += 1;
                    let tail = self.read()?;
                    self.skip_atmosphere()?;
                    if !self.eat(b')') {
                        return self.fail("malformed dotted list");
                    }
                    return Ok(Sexpr::make_list_star(&elems, tail));
                }
                _ => elems.push(self.read()?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_one(src: &str) -> Sexpr {
        let interner = SymbolInterner::new();
        Reader::new(src, &interner).read().unwrap()
    }

    fn read_all(src: &str) -> Vec<Sexpr> {
        let interner = SymbolInterner::new();
        Reader::new(src, &interner).read_program().unwrap()
    }

    fn read_err(src: &str) -> ReadError {
        let interner = SymbolInterner::new();
        Reader::new(src, &interner).read_program().unwrap_err()
    }

    #[test]
    fn atoms() {
        assert_eq!(read_one("#t"), Sexpr::Boolean(true));
        assert_eq!(read_one("#F"), Sexpr::Boolean(false));
        assert_eq!(read_one("#VOID"), Sexpr::Void);
        assert_eq!(read_one("42"), Sexpr::Number(Number::Integer(42)));
        assert_eq!(read_one("-17"), Sexpr::Number(Number::Integer(-17)));
    }

    #[test]
    fn fractions_reduce() {
        assert_eq!(read_one("2/4"), Sexpr::Number(Number::fraction(1, 2)));
        assert_eq!(read_one("-6/3"), Sexpr::Number(Number::Integer(-2)));
        assert_eq!(read_one("0/7"), Sexpr::Number(Number::Integer(0)));
        assert_eq!(read_err("1/0").what, "fraction with zero denominator");
    }

    #[test]
    fn floats() {
        assert_eq!(read_one("3.5"), Sexpr::Number(Number::Real(3.5)));
        assert_eq!(read_one(".25"), Sexpr::Number(Number::Real(0.25)));
        assert_eq!(read_one("-1.5e2"), Sexpr::Number(Number::Real(-150.0)));
        assert_eq!(read_one("2*10**3"), Sexpr::Number(Number::Real(2000.0)));
        assert_eq!(read_one("15*10^-1"), Sexpr::Number(Number::Real(1.5)));
    }

    #[test]
    fn symbols_lowercase_and_win_over_bad_numbers() {
        assert_eq!(read_one("FOO").to_string(), "foo");
        assert_eq!(read_one("1+").to_string(), "1+");
        assert_eq!(read_one("-").to_string(), "-");
    }

    #[test]
    fn chars() {
        assert_eq!(read_one("#\\a"), Sexpr::Char(b'a'));
        assert_eq!(read_one("#\\Newline"), Sexpr::Char(b'\n'));
        assert_eq!(read_one("#\\x41"), Sexpr::Char(b'A'));
        assert_eq!(read_one("#\\("), Sexpr::Char(b'('));
        assert!(matches!(read_err("#\\ab"), ReadError { .. }));
    }

    #[test]
    fn strings() {
        assert_eq!(
            read_one(r#""a\tb\x21;~~""#),
            Sexpr::String(Rc::new("a\tb!~".to_owned()))
        );
    }

    #[test]
    fn string_interpolation_desugars() {
        let s = read_one(r#""one ~{(+ 1 2)} two""#);
        assert_eq!(
            s.to_string(),
            "(string-append \"one \" (format \"~a\" (+ 1 2)) \" two\")"
        );
    }

    #[test]
    fn lists_and_vectors() {
        assert_eq!(read_one("(1 2 . 3)").to_string(), "(1 2 . 3)");
        assert_eq!(read_one("#(1 #t x)").to_string(), "#(1 #t x)");
        assert_eq!(read_one("'(a b)").to_string(), "(quote (a b))");
        assert_eq!(
            read_one("`(a ,b ,@c)").to_string(),
            "(quasiquote (a (unquote b) (unquote-splicing c)))"
        );
    }

    #[test]
    fn comments() {
        let forms = read_all("; line\n1 {a {nested} \"}\" #\\} comment} 2 #;(skip (me)) 3");
        assert_eq!(forms.len(), 3);
        assert_eq!(forms[2], Sexpr::Number(Number::Integer(3)));
    }
}
