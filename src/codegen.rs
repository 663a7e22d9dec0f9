//! The code generator.
//!
//! Recursive lowering of the analyzed tree to assembly text. Two integer
//! contexts ride along: the parameter count of the innermost enclosing
//! lambda and the number of enclosing lambdas. Values travel in `rax`;
//! `malloc` preserves everything else. Labels come from per-category
//! counters so the emitted file stays readable and every label is unique
//! for the whole compilation.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::CompileError;
use crate::primitives::code_label;
use crate::runtime_asm;
use crate::tables::{ConstantsTable, FreeVarTable};
use crate::tree_il::{AExpr, Addr, AppKind, LambdaKind, Var};

#[derive(Default)]
struct LabelMinter {
    counters: HashMap<&'static str, usize>,
}

impl LabelMinter {
    fn fresh(&mut self, category: &'static str) -> String {
        let n = self.counters.entry(category).or_insert(0);
        let label = format!("L_{}_{:04}", category, *n);
        *n += 1;
        label
    }
}

pub struct CodeGen<'a> {
    consts: &'a ConstantsTable,
    fvars: &'a FreeVarTable,
    labels: LabelMinter,
}

type GenResult = Result<(), CompileError>;

impl<'a> CodeGen<'a> {
    pub fn new(consts: &'a ConstantsTable, fvars: &'a FreeVarTable) -> Self {
        Self {
            consts,
            fvars,
            labels: LabelMinter::default(),
        }
    }

    /// Assembles the whole output file in section order: first prologue,
    /// constants, free variables, second prologue, primitive bindings, the
    /// user program with a print per top-level form, epilogue.
    pub fn compile_program(
        program: &[Rc<AExpr>],
        consts: &'a ConstantsTable,
        fvars: &'a FreeVarTable,
    ) -> Result<String, CompileError> {
        let mut gen = CodeGen::new(consts, fvars);
        let mut out = String::new();

        out.push_str(runtime_asm::PROLOGUE_1);
        out.push_str(&consts.to_asm());
        out.push('\n');
        out.push_str(&fvars.to_asm(consts)?);
        out.push_str(runtime_asm::PROLOGUE_2);
        gen.emit_primitive_bindings(&mut out)?;

        for expr in program {
            gen.emit(&mut out, expr, 0, 0)?;
            out.push_str("\tmov rdi, rax\n\tcall print_sob_if_not_void\n\n");
        }

        out.push_str(runtime_asm::EPILOGUE);
        log::debug!(
            "generated {} bytes of assembly for {} top-level forms",
            out.len(),
            program.len()
        );
        Ok(out)
    }

    /// Wraps each primitive's code pointer in a closure and plants it in
    /// the free-variable slot of its Scheme name. The free-variables table
    /// is seeded with the primitive set, so walking its slots binds every
    /// primitive the program can reach.
    fn emit_primitive_bindings(&mut self, out: &mut String) -> GenResult {
        out.push_str("\t; bind the runtime primitives\n");
        for name in self.fvars.names() {
            if let Some(code) = code_label(name) {
                out.push_str(&format!(
                    "\tmov rdi, {}\n\tmov rsi, {}\n\tcall bind_primitive\n",
                    self.fvars.label_of(name)?,
                    code
                ));
            }
        }
        out.push('\n');
        Ok(())
    }

    fn emit(
        &mut self,
        out: &mut String,
        x: &AExpr,
        params: usize,
        env_depth: usize,
    ) -> GenResult {
        match x {
            AExpr::Const(value) => {
                out.push_str(&format!(
                    "\tmov rax, L_constants + {}\n",
                    self.consts.loc(value)?
                ));
                Ok(())
            }

            AExpr::VarGet(var) => self.emit_var_get(out, var),

            AExpr::VarSet(var, value) => match (var.addr, &**value) {
                // the boxing prologue: swap the parameter slot for a cell
                (Addr::Param(i), AExpr::Box(_)) => {
                    out.push_str(&format!(
                        "\tmov rdi, 8\n\
                         \tcall malloc\n\
                         \tmov rbx, PARAM({i})\n\
                         \tmov qword [rax], rbx\n\
                         \tmov PARAM({i}), rax\n\
                         \tmov rax, sob_void\n"
                    ));
                    Ok(())
                }
                _ => {
                    self.emit(out, value, params, env_depth)?;
                    self.emit_var_store(out, var)
                }
            },

            AExpr::VarDef(var, value) => {
                if var.addr != Addr::Free {
                    return Err(CompileError::Internal(format!(
                        "define of a non-free variable: {}",
                        var.name
                    )));
                }
                self.emit(out, value, params, env_depth)?;
                self.emit_var_store(out, var)
            }

            AExpr::Box(var) => Err(CompileError::Internal(format!(
                "stray box form for {}",
                var.name
            ))),

            AExpr::BoxGet(var) => {
                self.emit_var_get(out, var)?;
                out.push_str("\tmov rax, qword [rax]\n");
                Ok(())
            }

            AExpr::BoxSet(var, value) => {
                self.emit(out, value, params, env_depth)?;
                out.push_str("\tpush rax\n");
                self.emit_var_get(out, var)?;
                out.push_str("\tpop qword [rax]\n\tmov rax, sob_void\n");
                Ok(())
            }

            AExpr::If(test, then, alt) => {
                let else_label = self.labels.fresh("if_else");
                let end_label = self.labels.fresh("if_end");
                self.emit(out, test, params, env_depth)?;
                out.push_str(&format!(
                    "\tcmp rax, sob_boolean_false\n\tje {}\n",
                    else_label
                ));
                self.emit(out, then, params, env_depth)?;
                out.push_str(&format!("\tjmp {}\n{}:\n", end_label, else_label));
                self.emit(out, alt, params, env_depth)?;
                out.push_str(&format!("{}:\n", end_label));
                Ok(())
            }

            AExpr::Seq(seq) => {
                for e in seq {
                    self.emit(out, e, params, env_depth)?;
                }
                Ok(())
            }

            AExpr::Or(exprs) => {
                let end_label = self.labels.fresh("or_end");
                let (last, init) = exprs.split_last().ok_or_else(|| {
                    CompileError::Internal("empty or survived the tag parser".to_owned())
                })?;
                for e in init {
                    self.emit(out, e, params, env_depth)?;
                    let next_label = self.labels.fresh("or_next");
                    // fall through on #f and on void, short-circuit otherwise
                    out.push_str(&format!(
                        "\tcmp rax, sob_boolean_false\n\
                         \tje {next}\n\
                         \tcmp rax, sob_void\n\
                         \tjne {end}\n\
                         {next}:\n",
                        next = next_label,
                        end = end_label
                    ));
                }
                self.emit(out, last, params, env_depth)?;
                out.push_str(&format!("{}:\n", end_label));
                Ok(())
            }

            AExpr::Lambda { params: fixed, kind, body } => {
                self.emit_lambda(out, fixed.len(), kind, body, params, env_depth)
            }

            AExpr::Applic(proc, args, tag) => {
                self.emit_applic(out, proc, args, *tag, params, env_depth)
            }
        }
    }

    fn emit_var_get(&mut self, out: &mut String, var: &Var) -> GenResult {
        match var.addr {
            Addr::Free => {
                out.push_str(&format!(
                    "\tmov rax, qword [{}]\t; {}\n\
                     \tcmp byte [rax], T_undefined\n\
                     \tje L_error_fvar_undefined\n",
                    self.fvars.label_of(var.name.name())?,
                    var.name
                ));
            }
            Addr::Param(i) => {
                out.push_str(&format!("\tmov rax, PARAM({})\t; {}\n", i, var.name));
            }
            Addr::Bound { major, minor } => {
                out.push_str(&format!(
                    "\tmov rax, ENV\n\
                     \tmov rax, qword [rax + 8 * {}]\n\
                     \tmov rax, qword [rax + 8 * {}]\t; {}\n",
                    major, minor, var.name
                ));
            }
        }
        Ok(())
    }

    /// Stores `rax` into the variable's slot and leaves void in `rax`.
    fn emit_var_store(&mut self, out: &mut String, var: &Var) -> GenResult {
        match var.addr {
            Addr::Free => {
                out.push_str(&format!(
                    "\tmov qword [{}], rax\t; {}\n",
                    self.fvars.label_of(var.name.name())?,
                    var.name
                ));
            }
            Addr::Param(i) => {
                out.push_str(&format!("\tmov PARAM({}), rax\t; {}\n", i, var.name));
            }
            Addr::Bound { major, minor } => {
                out.push_str(&format!(
                    "\tmov rbx, ENV\n\
                     \tmov rbx, qword [rbx + 8 * {}]\n\
                     \tmov qword [rbx + 8 * {}], rax\t; {}\n",
                    major, minor, var.name
                ));
            }
        }
        out.push_str("\tmov rax, sob_void\n");
        Ok(())
    }

    /// Closure creation: a fresh rib holding a copy of the creating frame's
    /// parameters, an environment one rib deeper, and the closure object
    /// pointing at both. The body follows under its own label.
    fn emit_lambda(
        &mut self,
        out: &mut String,
        nfixed: usize,
        kind: &LambdaKind,
        body: &AExpr,
        params: usize,
        env_depth: usize,
    ) -> GenResult {
        let env_loop = self.labels.fresh("lambda_env_loop");
        let env_end = self.labels.fresh("lambda_env_end");
        let params_loop = self.labels.fresh("lambda_params_loop");
        let params_end = self.labels.fresh("lambda_params_end");
        let code = self.labels.fresh("lambda_code");
        let end = self.labels.fresh("lambda_end");

        out.push_str(&format!(
            "\t; make closure (depth {env_depth})\n\
             \tmov rdi, (8 * {params})\n\
             \tcall malloc\n\
             \tpush rax\t; the new rib\n\
             \tmov rdi, (8 * ({env_depth} + 1))\n\
             \tcall malloc\t; the extended environment\n\
             \tmov rdi, ENV\n\
             \tmov rsi, 0\n\
             \tmov rdx, 1\n\
             {env_loop}:\t; copy the outer ribs up one slot\n\
             \tcmp rsi, {env_depth}\n\
             \tje {env_end}\n\
             \tmov rcx, qword [rdi + 8 * rsi]\n\
             \tmov qword [rax + 8 * rdx], rcx\n\
             \tinc rsi\n\
             \tinc rdx\n\
             \tjmp {env_loop}\n\
             {env_end}:\n\
             \tpop rbx\t; the new rib\n\
             \tmov qword [rax], rbx\n\
             \tmov rsi, 0\n\
             {params_loop}:\t; copy the creating frame's parameters\n\
             \tcmp rsi, {params}\n\
             \tje {params_end}\n\
             \tmov rcx, PARAM(rsi)\n\
             \tmov qword [rbx + 8 * rsi], rcx\n\
             \tinc rsi\n\
             \tjmp {params_loop}\n\
             {params_end}:\n\
             \tmov rbx, rax\t; the extended environment\n\
             \tmov rdi, (1 + 8 + 8)\n\
             \tcall malloc\n\
             \tmov byte [rax], T_closure\n\
             \tmov SOB_CLOSURE_ENV(rax), rbx\n\
             \tmov rcx, {code}\n\
             \tmov SOB_CLOSURE_CODE(rax), rcx\n\
             \tjmp {end}\n\
             {code}:\n\
             \tpush rbp\n\
             \tmov rbp, rsp\n"
        ));

        let body_params = match kind {
            LambdaKind::Simple => {
                out.push_str(&format!(
                    "\tcmp COUNT, {nfixed}\n\tjne L_error_incorrect_arity_simple\n"
                ));
                nfixed
            }
            LambdaKind::Opt(_) => {
                self.emit_opt_entry(out, nfixed)?;
                nfixed + 1
            }
        };

        self.emit(out, body, body_params, env_depth + 1)?;
        out.push_str(&format!(
            "\tleave\n\tret AND_KILL_FRAME({body_params})\n{end}:\n"
        ));
        Ok(())
    }

    /// Normalizes an opt-lambda frame to exactly `nfixed + 1` arguments:
    /// an exact call widens the frame by a nil rest slot, a longer call
    /// folds the extras into a list and shrinks the frame onto it.
    fn emit_opt_entry(&mut self, out: &mut String, nfixed: usize) -> GenResult {
        let exact = self.labels.fresh("opt_exact");
        let list_loop = self.labels.fresh("opt_list_loop");
        let list_end = self.labels.fresh("opt_list_end");
        let shift_loop = self.labels.fresh("opt_shift_loop");
        let shift_end = self.labels.fresh("opt_shift_end");
        let widen_loop = self.labels.fresh("opt_widen_loop");
        let widen_end = self.labels.fresh("opt_widen_end");
        let body = self.labels.fresh("opt_body");

        out.push_str(&format!(
            "\tcmp COUNT, {nfixed}\n\
             \tje {exact}\n\
             \tjl L_error_incorrect_arity_opt\n\
             \t; surplus arguments: fold them into a list, right to left\n\
             \tmov rdx, COUNT\n\
             \tsub rdx, {shift}\t; how far the frame shifts\n\
             \tmov rsi, COUNT\n\
             \tmov rax, sob_nil\n\
             {list_loop}:\n\
             \tcmp rsi, {nfixed}\n\
             \tje {list_end}\n\
             \tdec rsi\n\
             \tmov rbx, rax\n\
             \tmov rdi, (1 + 8 + 8)\n\
             \tcall malloc\n\
             \tmov byte [rax], T_pair\n\
             \tmov rcx, PARAM(rsi)\n\
             \tmov SOB_PAIR_CAR(rax), rcx\n\
             \tmov SOB_PAIR_CDR(rax), rbx\n\
             \tjmp {list_loop}\n\
             {list_end}:\n\
             \tmov rcx, COUNT\n\
             \tmov qword [rbp + 8 * rcx + 24], rax\t; the rest list\n\
             \tmov rsi, {nfixed}\n\
             {shift_loop}:\t; slide the fixed arguments up\n\
             \tcmp rsi, 0\n\
             \tje {shift_end}\n\
             \tdec rsi\n\
             \tmov rcx, qword [rbp + 8 * rsi + 32]\n\
             \tlea rdi, [rsi + rdx]\n\
             \tmov qword [rbp + 8 * rdi + 32], rcx\n\
             \tjmp {shift_loop}\n\
             {shift_end}:\n\
             \tmov rcx, {shift}\n\
             \tmov qword [rbp + 8 * rdx + 24], rcx\t; the new arg count\n\
             \tmov rcx, qword [rbp + 16]\n\
             \tmov qword [rbp + 8 * rdx + 16], rcx\t; environment\n\
             \tmov rcx, qword [rbp + 8]\n\
             \tmov qword [rbp + 8 * rdx + 8], rcx\t; return address\n\
             \tmov rcx, qword [rbp]\n\
             \tmov qword [rbp + 8 * rdx], rcx\t; saved frame pointer\n\
             \tlea rbp, [rbp + 8 * rdx]\n\
             \tmov rsp, rbp\n\
             \tjmp {body}\n\
             {exact}:\t; exact call: widen the frame by a nil rest slot\n\
             \tsub rsp, 8\n\
             \tmov rsi, 0\n\
             {widen_loop}:\n\
             \tcmp rsi, {header}\n\
             \tje {widen_end}\n\
             \tmov rcx, qword [rbp + 8 * rsi]\n\
             \tmov qword [rbp + 8 * rsi - 8], rcx\n\
             \tinc rsi\n\
             \tjmp {widen_loop}\n\
             {widen_end}:\n\
             \tsub rbp, 8\n\
             \tmov rcx, {shift}\n\
             \tmov qword [rbp + 24], rcx\t; the new arg count\n\
             \tmov rcx, sob_nil\n\
             \tmov qword [rbp + 8 * {nfixed} + 32], rcx\t; an empty rest\n\
             {body}:\n",
            shift = nfixed + 1,
            header = nfixed + 4,
        ));
        Ok(())
    }

    fn emit_applic(
        &mut self,
        out: &mut String,
        proc: &AExpr,
        args: &[Rc<AExpr>],
        tag: AppKind,
        params: usize,
        env_depth: usize,
    ) -> GenResult {
        for arg in args.iter().rev() {
            self.emit(out, arg, params, env_depth)?;
            out.push_str("\tpush rax\n");
        }
        out.push_str(&format!("\tmov rax, {}\n\tpush rax\n", args.len()));
        self.emit(out, proc, params, env_depth)?;
        out.push_str(
            "\tcmp byte [rax], T_closure\n\
             \tjne L_error_non_closure\n\
             \tpush SOB_CLOSURE_ENV(rax)\n",
        );

        match tag {
            AppKind::NonTail => {
                out.push_str("\tcall SOB_CLOSURE_CODE(rax)\n");
            }
            AppKind::Tail => {
                // frame recycling: overlay the new argument block onto the
                // caller's frame and jump
                let overlay = self.labels.fresh("tc_overlay");
                out.push_str(&format!(
                    "\tpush qword [rbp + 8]\t; the return address\n\
                     \tpush qword [rbp]\t; the caller's saved frame pointer\n\
                     \tmov rcx, COUNT\n\
                     \tlea rbx, [rbp + 8 * rcx + 24]\t; the old frame's last word\n\
                     \tmov rsi, {words}\n\
                     {overlay}:\n\
                     \tdec rsi\n\
                     \tmov rdx, qword [rsp + 8 * rsi]\n\
                     \tmov qword [rbx], rdx\n\
                     \tsub rbx, 8\n\
                     \tcmp rsi, 0\n\
                     \tjne {overlay}\n\
                     \tlea rsp, [rbx + 8]\n\
                     \tpop rbp\n\
                     \tjmp SOB_CLOSURE_CODE(rax)\n",
                    words = args.len() + 4,
                ));
            }
        }
        Ok(())
    }
}
