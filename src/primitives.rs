//! The fixed table of runtime primitives.
//!
//! Each entry maps a Scheme-level name to the label of its code pointer in
//! the runtime library. The table seeds the free-variables table and the
//! constants table (every name doubles as a string constant), and drives the
//! primitive-binding loop emitted at program startup.

use std::collections::HashMap;

use once_cell::sync::Lazy;

pub static PRIMITIVES: &[(&str, &str)] = &[
    ("null?", "L_code_ptr_is_null"),
    ("pair?", "L_code_ptr_is_pair"),
    ("void?", "L_code_ptr_is_void"),
    ("char?", "L_code_ptr_is_char"),
    ("string?", "L_code_ptr_is_string"),
    ("symbol?", "L_code_ptr_is_symbol"),
    ("interned-symbol?", "L_code_ptr_is_interned_symbol"),
    ("vector?", "L_code_ptr_is_vector"),
    ("procedure?", "L_code_ptr_is_closure"),
    ("boolean?", "L_code_ptr_is_boolean"),
    ("number?", "L_code_ptr_is_number"),
    ("integer?", "L_code_ptr_is_integer"),
    ("fraction?", "L_code_ptr_is_fraction"),
    ("real?", "L_code_ptr_is_real"),
    ("zero?", "L_code_ptr_is_zero"),
    ("eq?", "L_code_ptr_is_eq"),
    ("not", "L_code_ptr_not"),
    ("cons", "L_code_ptr_cons"),
    ("car", "L_code_ptr_car"),
    ("cdr", "L_code_ptr_cdr"),
    ("set-car!", "L_code_ptr_set_car"),
    ("set-cdr!", "L_code_ptr_set_cdr"),
    ("list", "L_code_ptr_list"),
    ("append", "L_code_ptr_append"),
    ("apply", "L_code_ptr_apply"),
    ("map", "L_code_ptr_map"),
    ("+", "L_code_ptr_add"),
    ("-", "L_code_ptr_sub"),
    ("*", "L_code_ptr_mul"),
    ("/", "L_code_ptr_div"),
    ("=", "L_code_ptr_num_eq"),
    ("<", "L_code_ptr_num_lt"),
    ("<=", "L_code_ptr_num_le"),
    (">", "L_code_ptr_num_gt"),
    (">=", "L_code_ptr_num_ge"),
    ("quotient", "L_code_ptr_quotient"),
    ("remainder", "L_code_ptr_remainder"),
    ("gcd", "L_code_ptr_gcd"),
    ("numerator", "L_code_ptr_numerator"),
    ("denominator", "L_code_ptr_denominator"),
    ("exact->inexact", "L_code_ptr_exact_to_inexact"),
    ("char->integer", "L_code_ptr_char_to_integer"),
    ("integer->char", "L_code_ptr_integer_to_char"),
    ("string-length", "L_code_ptr_string_length"),
    ("string-ref", "L_code_ptr_string_ref"),
    ("string-set!", "L_code_ptr_string_set"),
    ("make-string", "L_code_ptr_make_string"),
    ("string->symbol", "L_code_ptr_string_to_symbol"),
    ("symbol->string", "L_code_ptr_symbol_to_string"),
    ("string-append", "L_code_ptr_string_append"),
    ("vector-length", "L_code_ptr_vector_length"),
    ("vector-ref", "L_code_ptr_vector_ref"),
    ("vector-set!", "L_code_ptr_vector_set"),
    ("make-vector", "L_code_ptr_make_vector"),
    ("vector", "L_code_ptr_vector"),
    ("list->vector", "L_code_ptr_list_to_vector"),
    ("gensym", "L_code_ptr_gensym"),
    ("display", "L_code_ptr_display"),
    ("write", "L_code_ptr_write"),
    ("newline", "L_code_ptr_newline"),
    ("format", "L_code_ptr_format"),
];

static INDEX: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| PRIMITIVES.iter().copied().collect());

/// The runtime code-pointer label of a primitive, if `name` is one.
pub fn code_label(name: &str) -> Option<&'static str> {
    INDEX.get(name).copied()
}
