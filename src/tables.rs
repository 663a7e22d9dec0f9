//! The constants table and the free-variables table.
//!
//! Both are traversals of the analyzed program. The constants table holds
//! every literal plus the name string of every free variable, expanded so
//! that each sub-object appears (post-order) before the composite that
//! points to it, deduplicated by structural equality, and laid out at fixed
//! byte offsets from `L_constants`. The free-variables table assigns each
//! unique free name a `free_var_i` slot, seeded with the primitive set.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::CompileError;
use crate::primitives::PRIMITIVES;
use crate::sexpr::{Number, Sexpr};
use crate::tree_il::{AExpr, Addr, Var};

/// Calls `f` on every node of the tree, parents before children.
fn each_node(x: &AExpr, f: &mut impl FnMut(&AExpr)) {
    f(x);
    match x {
        AExpr::Const(_) | AExpr::VarGet(_) | AExpr::Box(_) | AExpr::BoxGet(_) => {}
        AExpr::VarSet(_, e) | AExpr::VarDef(_, e) | AExpr::BoxSet(_, e) => each_node(e, f),
        AExpr::If(a, b, c) => {
            each_node(a, f);
            each_node(b, f);
            each_node(c, f);
        }
        AExpr::Seq(s) | AExpr::Or(s) => s.iter().for_each(|e| each_node(e, f)),
        AExpr::Lambda { body, .. } => each_node(body, f),
        AExpr::Applic(p, args, _) => {
            each_node(p, f);
            args.iter().for_each(|e| each_node(e, f));
        }
    }
}

fn var_of(x: &AExpr) -> Option<&Var> {
    match x {
        AExpr::VarGet(v)
        | AExpr::VarSet(v, _)
        | AExpr::VarDef(v, _)
        | AExpr::Box(v)
        | AExpr::BoxGet(v)
        | AExpr::BoxSet(v, _) => Some(v),
        _ => None,
    }
}

pub struct ConstEntry {
    pub value: Sexpr,
    pub loc: usize,
}

pub struct ConstantsTable {
    entries: Vec<ConstEntry>,
    index: HashMap<Sexpr, usize>,
}

impl ConstantsTable {
    /// Collects, expands, deduplicates, and assigns byte offsets.
    pub fn build(program: &[Rc<AExpr>]) -> Self {
        // the compile-time fixed prologue objects, in order
        let mut collected = vec![
            Sexpr::Void,
            Sexpr::Nil,
            Sexpr::Boolean(false),
            Sexpr::Boolean(true),
            Sexpr::Char(0),
        ];
        for (name, _) in PRIMITIVES {
            collected.push(Sexpr::String(Rc::new((*name).to_owned())));
        }

        for expr in program {
            each_node(expr, &mut |x| {
                if let AExpr::Const(value) = x {
                    collected.push(value.clone());
                }
                if let Some(var) = var_of(x) {
                    if var.addr == Addr::Free {
                        collected.push(Sexpr::String(Rc::new(var.name.name().to_owned())));
                    }
                }
            });
        }

        // sub-constants precede their composites
        let mut expanded = Vec::new();
        for value in &collected {
            expand(value, &mut expanded);
        }

        let mut entries: Vec<ConstEntry> = Vec::new();
        let mut index = HashMap::new();
        let mut loc = 0;
        for value in expanded {
            if index.contains_key(&value) {
                continue;
            }
            index.insert(value.clone(), entries.len());
            let size = byte_size(&value);
            entries.push(ConstEntry { value, loc });
            loc += size;
        }

        ConstantsTable { entries, index }
    }

    pub fn entries(&self) -> &[ConstEntry] {
        &self.entries
    }

    /// The byte offset of a constant from `L_constants`.
    pub fn loc(&self, value: &Sexpr) -> Result<usize, CompileError> {
        self.index
            .get(value)
            .map(|&i| self.entries[i].loc)
            .ok_or_else(|| {
                CompileError::Internal(format!("constant not in table: {}", value))
            })
    }

    /// The table as assembly data, one labeled comment per entry.
    pub fn to_asm(&self) -> String {
        let mut out = String::from("L_constants:\n");
        for entry in &self.entries {
            out.push_str(&format!("\t; L_constants + {}: {}\n", entry.loc, entry.value));
            match &entry.value {
                Sexpr::Void => out.push_str("\tdb T_void\n"),
                Sexpr::Nil => out.push_str("\tdb T_nil\n"),
                Sexpr::Boolean(false) => out.push_str("\tdb T_boolean_false\n"),
                Sexpr::Boolean(true) => out.push_str("\tdb T_boolean_true\n"),
                Sexpr::Char(c) => out.push_str(&format!("\tdb T_char, 0x{:02x}\n", c)),
                Sexpr::String(s) => {
                    out.push_str(&format!("\tdb T_string\n\tdq {}\n", s.chars().count()));
                    let bytes: Vec<String> = s
                        .chars()
                        .map(|c| format!("0x{:02x}", c as u32 as u8))
                        .collect();
                    for chunk in bytes.chunks(12) {
                        out.push_str(&format!("\tdb {}\n", chunk.join(", ")));
                    }
                }
                Sexpr::Symbol(s) => {
                    let name = Sexpr::String(Rc::new(s.name().to_owned()));
                    let name_loc = self.index[&name];
                    out.push_str(&format!(
                        "\tdb T_interned_symbol\n\tdq L_constants + {}\n",
                        self.entries[name_loc].loc
                    ));
                }
                Sexpr::Number(Number::Integer(n)) => {
                    out.push_str(&format!("\tdb T_integer\n\tdq {}\n", n));
                }
                Sexpr::Number(Number::Fraction(r)) => {
                    out.push_str(&format!(
                        "\tdb T_fraction\n\tdq {}, {}\n",
                        r.numer(),
                        r.denom()
                    ));
                }
                Sexpr::Number(Number::Real(x)) => {
                    out.push_str(&format!(
                        "\tdb T_real\n\tdq 0x{:016x}\t; {:?}\n",
                        x.to_bits(),
                        x
                    ));
                }
                Sexpr::Vector(v) => {
                    out.push_str(&format!("\tdb T_vector\n\tdq {}\n", v.len()));
                    for elem in v.iter() {
                        let elem_loc = self.entries[self.index[elem]].loc;
                        out.push_str(&format!("\tdq L_constants + {}\n", elem_loc));
                    }
                }
                Sexpr::Pair(p) => {
                    let car_loc = self.entries[self.index[&p.0]].loc;
                    let cdr_loc = self.entries[self.index[&p.1]].loc;
                    out.push_str(&format!(
                        "\tdb T_pair\n\tdq L_constants + {}, L_constants + {}\n",
                        car_loc, cdr_loc
                    ));
                }
            }
        }
        out
    }
}

/// Post-order expansion: for pairs car, cdr, then the pair; for vectors the
/// elements then the vector; for symbols the name string then the symbol.
fn expand(value: &Sexpr, out: &mut Vec<Sexpr>) {
    match value {
        Sexpr::Pair(p) => {
            expand(&p.0, out);
            expand(&p.1, out);
            out.push(value.clone());
        }
        Sexpr::Vector(v) => {
            for elem in v.iter() {
                expand(elem, out);
            }
            out.push(value.clone());
        }
        Sexpr::Symbol(s) => {
            out.push(Sexpr::String(Rc::new(s.name().to_owned())));
            out.push(value.clone());
        }
        _ => out.push(value.clone()),
    }
}

/// Bytes an object occupies in the constants section.
pub fn byte_size(value: &Sexpr) -> usize {
    match value {
        Sexpr::Void | Sexpr::Nil | Sexpr::Boolean(_) => 1,
        Sexpr::Char(_) => 2,
        Sexpr::String(s) => 1 + 8 + s.chars().count(),
        Sexpr::Symbol(_) => 1 + 8,
        Sexpr::Number(Number::Integer(_)) => 1 + 8,
        Sexpr::Number(Number::Fraction(_)) => 1 + 16,
        Sexpr::Number(Number::Real(_)) => 1 + 8,
        Sexpr::Vector(v) => 1 + 8 + 8 * v.len(),
        Sexpr::Pair(_) => 1 + 16,
    }
}

pub struct FreeVarTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl FreeVarTable {
    /// Every name free in the program plus the primitive set, sorted.
    pub fn build(program: &[Rc<AExpr>]) -> Self {
        let mut set: HashSet<String> = PRIMITIVES
            .iter()
            .map(|(name, _)| (*name).to_owned())
            .collect();

        for expr in program {
            each_node(expr, &mut |x| {
                if let Some(var) = var_of(x) {
                    if var.addr == Addr::Free {
                        set.insert(var.name.name().to_owned());
                    }
                }
            });
        }

        let mut names: Vec<String> = set.into_iter().collect();
        names.sort();
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        FreeVarTable { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// The assembly label of a free variable's slot.
    pub fn label_of(&self, name: &str) -> Result<String, CompileError> {
        self.index
            .get(name)
            .map(|i| format!("free_var_{}", i))
            .ok_or_else(|| {
                CompileError::Internal(format!("free variable not in table: {}", name))
            })
    }

    /// Each slot starts out pointing at an undefined cell which itself
    /// points at the name's string constant.
    pub fn to_asm(&self, consts: &ConstantsTable) -> Result<String, CompileError> {
        let mut out = String::new();
        for (i, name) in self.names.iter().enumerate() {
            let name_loc = consts.loc(&Sexpr::String(Rc::new(name.clone())))?;
            out.push_str(&format!(
                "free_var_{}:\t; location of {}\n\tdq .undefined_object\n\
                 .undefined_object:\n\tdb T_undefined\n\tdq L_constants + {}\n",
                i, name, name_loc
            ));
        }
        Ok(out)
    }
}
