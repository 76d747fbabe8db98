//! Exercises the full lex -> parse -> Sema -> lower -> verify pipeline on a
//! single translation unit that touches a struct, a typedef, a function
//! calling another function, a for-loop with break/continue, a switch with
//! fallthrough and a `default` that isn't last, and a global initializer.

use ccrs::driver::compile_source;

const SOURCE: &str = r#"
typedef struct Point {
    int x;
    int y;
} Point;

int counter = 0;

int add(int a, int b) {
    return a + b;
}

int classify(int n) {
    int result = 0;
    switch (n) {
        default:
            result = -1;
            break;
        case 0:
        case 1:
            result = 1;
            break;
        case 2:
            result = 2;
    }
    return result;
}

int sum_to(int n) {
    int total = 0;
    for (int i = 0; i < n; i = add(i, 1)) {
        if (i == 3) {
            continue;
        }
        if (i == 7) {
            break;
        }
        total = add(total, i);
    }
    return total;
}

int main(void) {
    Point p;
    p.x = 1;
    p.y = 2;
    counter = add(p.x, p.y);
    int c = classify(1);
    int s = sum_to(10);
    return add(c, s);
}
"#;

#[test]
fn full_pipeline_compiles_and_verifies() {
    let ir = compile_source(SOURCE, "end_to_end").expect("pipeline should lex, parse, check, lower and verify");
    assert!(ir.contains("switch"), "fallthrough switch should lower to an LLVM switch instruction");
    assert!(ir.contains("define"), "function definitions should appear in the module");
}

#[test]
fn static_assert_failure_is_rejected_before_codegen() {
    let source = "_Static_assert(0, \"never\");\nint main(void) { return 0; }\n";
    let err = compile_source(source, "bad_assert").unwrap_err();
    assert!(format!("{err}").contains("static assertion failed"));
}

#[test]
fn sizeof_builtin_in_global_array_size() {
    let source = "int table[sizeof(int)];\nint main(void) { return table[0]; }\n";
    let ir = compile_source(source, "sizeof_array").expect("sizeof(int) should const-eval to 4 and size the array");
    assert!(ir.contains("[4 x i32]"));
}
