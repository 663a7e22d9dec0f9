use scm86::compile_string;

/// The end-to-end scenario programs; each must compile to a structurally
/// complete assembly file even though assembling and linking happen
/// elsewhere.
const SCENARIOS: &[&str] = &[
    "(display (+ 2 3))",
    "(define (fact n) (if (zero? n) 1 (* n (fact (- n 1))))) (display (fact 10))",
    "(define (loop n) (if (zero? n) 'done (loop (- n 1)))) (display (loop 1000000))",
    "(define (mk) (let ((x 0)) (lambda () (set! x (+ x 1)) x))) (define c (mk)) (c) (c) (display (c))",
    "(display (map (lambda (x) (* x x)) '(1 2 3 4)))",
    "(display \"hello ~{(+ 1 2)} world\")",
];

#[test]
fn scenarios_compile_to_complete_files() {
    for src in SCENARIOS {
        let asm = compile_string(src).unwrap_or_else(|e| panic!("{}: {}", src, e));
        for section in [
            "L_constants:",
            "free_var_0:",
            "section .text",
            "call bind_primitive",
            "call print_sob_if_not_void",
            "%include \"runtime.asm\"",
        ] {
            assert!(asm.contains(section), "{} missing {}", src, section);
        }
    }
}

#[test]
fn tail_recursion_recycles_the_frame() {
    let asm = compile_string("(define (loop n) (if (zero? n) 'done (loop (- n 1))))").unwrap();
    // the self call jumps, it does not call
    assert!(asm.contains("jmp SOB_CLOSURE_CODE(rax)"));
    // the frame overlay walks down from the old frame's last word
    assert!(asm.contains("lea rbx, [rbp + 8 * rcx + 24]"));
}

#[test]
fn non_tail_positions_push_a_frame() {
    let asm = compile_string("(display (f 1))").unwrap();
    assert!(asm.contains("call SOB_CLOSURE_CODE(rax)"));
    assert!(!asm.contains("jmp SOB_CLOSURE_CODE(rax)"));
}

#[test]
fn applications_check_for_closures() {
    let asm = compile_string("(f)").unwrap();
    assert!(asm.contains("cmp byte [rax], T_closure"));
    assert!(asm.contains("jne L_error_non_closure"));
}

#[test]
fn boxing_emits_the_cell_swap() {
    let asm = compile_string(
        "(define (mk) (let ((x 0)) (lambda () (set! x (+ x 1)) x))) (display ((mk)))",
    )
    .unwrap();
    // the prologue's 8-byte cell allocation followed by the slot swap
    assert!(asm.contains("mov rdi, 8\n\tcall malloc"));
    assert!(asm.contains("pop qword [rax]"));
}

#[test]
fn interpolation_reaches_the_constant_table() {
    let asm = compile_string("(display \"hello ~{(+ 1 2)} world\")").unwrap();
    assert!(asm.contains("\"hello \""));
    assert!(asm.contains("\"~a\""));
    assert!(asm.contains("\" world\""));
}

#[test]
fn opt_lambda_entry_handles_all_three_arities() {
    let asm = compile_string("(define f (lambda (a . rest) rest)) (f 1 2 3)").unwrap();
    assert!(asm.contains("jl L_error_incorrect_arity_opt"));
    // exact-arity widening and surplus-folding both present
    assert!(asm.contains("sub rsp, 8"));
    assert!(asm.contains("db T_pair") || asm.contains("mov byte [rax], T_pair"));
}

#[test]
fn define_initializes_the_free_slot() {
    let asm = compile_string("(define x 42)").unwrap();
    // a store to some free_var slot with the name in the comment
    assert!(asm.lines().any(|l| l.contains("], rax") && l.contains("; x")));
}

#[test]
fn undefined_global_reads_are_guarded_but_defines_are_not() {
    let asm = compile_string("(define x 1) x").unwrap();
    assert!(asm.contains("je L_error_fvar_undefined"));
}
