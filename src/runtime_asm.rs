//! The fixed textual assembly fragments wrapped around the generated
//! sections. These are consumed as-is; the primitive implementations, the
//! allocator, `bind_primitive`, the printer, and the error handlers live in
//! the external runtime library that the epilogue includes.

/// Macros, runtime type tags, and the opening of the data section. Emitted
/// before the constants table.
pub static PROLOGUE_1: &str = r#";;; scm86 generated assembly

;;; frame accessors
%define PARAM(n) qword [rbp + 8 * n + 32]
%define ENV qword [rbp + 16]
%define COUNT qword [rbp + 24]
%define AND_KILL_FRAME(n) (8 * (n + 2))

;;; heap object accessors
%define SOB_CLOSURE_ENV(r) qword [r + 1]
%define SOB_CLOSURE_CODE(r) qword [r + 9]
%define SOB_PAIR_CAR(r) qword [r + 1]
%define SOB_PAIR_CDR(r) qword [r + 9]

;;; runtime type tags
T_void equ 0
T_nil equ 1
T_boolean_false equ 2
T_boolean_true equ 3
T_char equ 4
T_string equ 5
T_interned_symbol equ 6
T_integer equ 7
T_fraction equ 8
T_real equ 9
T_vector equ 10
T_pair equ 11
T_closure equ 12
T_undefined equ 13

;;; the fixed prologue objects sit at the head of the constants table
%define sob_void (L_constants + 0)
%define sob_nil (L_constants + 1)
%define sob_boolean_false (L_constants + 2)
%define sob_boolean_true (L_constants + 3)

section .data

"#;

/// Entry point and the fake top-level frame, so `ENV` and `COUNT` are
/// defined while top-level forms run. Emitted after the free-variables
/// table, before the primitive-binding loop.
pub static PROLOGUE_2: &str = r#"
section .text
global main
extern exit

main:
	push 0	; top level: no arguments
	push 0	; a null environment
	push 0	; a fake return address
	push rbp
	mov rbp, rsp

"#;

/// Emitted after the user program. The runtime library carries `malloc`,
/// `bind_primitive`, `print_sob_if_not_void`, every `L_code_ptr_*`
/// primitive, and the error handlers `L_error_fvar_undefined`,
/// `L_error_non_closure`, `L_error_incorrect_arity_simple`,
/// `L_error_incorrect_arity_opt`.
pub static EPILOGUE: &str = r#"
L_exit:
	mov rdi, 0
	call exit

%include "runtime.asm"
"#;
