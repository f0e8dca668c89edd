//! Integration tests for evaluation through the public `Machine` API.

use lisp::{Limits, LispError, Machine};

fn eval_str(code: &str) -> String {
    let mut machine = Machine::new(Limits::default()).unwrap();
    machine
        .eval_str(code)
        .unwrap_or_else(|e| format!("Error: {}", e))
}

fn eval_err(code: &str) -> LispError {
    let mut machine = Machine::new(Limits::default()).unwrap();
    machine.eval_str(code).unwrap_err()
}

// =============================================================================
// Arithmetic
// =============================================================================

#[test]
fn test_arithmetic() {
    let cases = [
        ("(+ 2 3)", "5"),
        ("(- 3 5)", "-2"),
        ("(* 6 7)", "42"),
        ("(* -4 -4)", "16"),
        ("(/ 7 2)", "3"),
        ("(/ -7 2)", "-3"),
        ("(/ 0 5)", "0"),
        ("(+ (* 2 3) (- 10 4))", "12"),
        ("(+ -9223372036854775808 0)", "-9223372036854775808"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval_str(code), expected, "{code}");
    }
}

#[test]
fn test_division_by_zero() {
    assert_eq!(eval_err("(/ 1 0)"), LispError::DivisionByZero);
    assert_eq!(eval_err("(/ (+ 1 1) (- 2 2))"), LispError::DivisionByZero);
}

#[test]
fn test_arithmetic_type_errors() {
    for code in ["(+ 'a 1)", "(* 1 (cons 1 2))", "(- #t 1)", "(+ car 1)"] {
        assert!(
            matches!(eval_err(code), LispError::TypeMismatch(_)),
            "{code}"
        );
    }
    assert!(matches!(
        eval_err("(* 9223372036854775807 2)"),
        LispError::IntegerOverflow(_)
    ));
    assert!(matches!(
        eval_err("(/ -9223372036854775808 -1)"),
        LispError::IntegerOverflow(_)
    ));
}

// =============================================================================
// Quote, define, set!
// =============================================================================

#[test]
fn test_quote_does_not_evaluate() {
    assert_eq!(eval_str("(quote (1 2 3))"), "(1 2 3)");
    assert_eq!(eval_str("(quote (a b c))"), "(a b c)");
    assert_eq!(eval_str("'(undefined (also undefined))"), "(undefined (also undefined))");
    assert_eq!(eval_str("'x"), "x");
    assert_eq!(eval_str("''x"), "(quote x)");
}

#[test]
fn test_dotted_round_trip() {
    assert_eq!(eval_str("'(a b (c . d))"), "(a b (c . d))");
    assert_eq!(eval_str("(quote (a . (b . (c . ()))))"), "(a b c)");
    assert_eq!(eval_str("(define t '(a b (c . d))) t"), "(a b (c . d))");
}

#[test]
fn test_parse_tree_results_print_after_end_of_input() {
    let cases = [
        ("(car '((a b) c))", "(a b)"),
        ("(cdr '(1 2 3))", "(2 3)"),
        ("'(x y) ; trailing comment", "(x y)"),
        ("(define a 1)\n'(a . b)\n\n", "(a . b)"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval_str(code), expected, "{code}");
    }

    let mut machine = Machine::new(Limits::default()).unwrap();
    let val = machine.run("'(1 2) '(3 4)").unwrap();
    assert_eq!(machine.print(val), "(3 4)");
    assert!(machine.read("  ", 0).unwrap().is_none());
    assert_eq!(machine.print(val), "(3 4)");
}

#[test]
fn test_define_and_set() {
    assert_eq!(eval_str("(define x 5) x"), "5");
    assert_eq!(eval_str("(define x 5) (set! x 6) x"), "6");
    assert_eq!(eval_str("(define x 1) (define x 2) x"), "2");
    assert_eq!(eval_str("(define x (+ 1 2)) (define y (* x x)) y"), "9");
}

#[test]
fn test_unbound_variable() {
    assert_eq!(eval_err("(set! y 1)"), LispError::UnboundVariable("y".into()));
    assert_eq!(eval_err("y"), LispError::UnboundVariable("y".into()));
    assert_eq!(eval_err("(undefined-fn 1)"), LispError::UnboundVariable("undefined-fn".into()));
}

// =============================================================================
// Conditionals
// =============================================================================

#[test]
fn test_if() {
    let cases = [
        ("(if #t 1 2)", "1"),
        ("(if #f 1 2)", "2"),
        ("(if (= 1 1) 'yes 'no)", "yes"),
        ("(if (= 1 2) 'yes 'no)", "no"),
        ("(if #f 1)", "()"),
        ("(if #t 1)", "1"),
        ("(= 'a 'a)", "#t"),
        ("(= (cons 1 2) (cons 1 2))", "#f"),
        ("(define p (cons 1 2)) (= p p)", "#t"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval_str(code), expected, "{code}");
    }
}

#[test]
fn test_if_only_evaluates_taken_branch() {
    assert_eq!(eval_str("(if #t 1 (/ 1 0))"), "1");
    assert_eq!(eval_str("(if #f (undefined) 2)"), "2");
}

#[test]
fn test_invalid_condition() {
    for (code, printed) in [("(if 1 2 3)", "1"), ("(if '() 2 3)", "()"), ("(if 'yes 1 2)", "yes")] {
        assert_eq!(eval_err(code), LispError::InvalidCondition(printed.into()), "{code}");
    }
}

// =============================================================================
// Closures
// =============================================================================

#[test]
fn test_lambda_application() {
    let cases = [
        ("((lambda (x) (* x x)) 7)", "49"),
        ("((lambda () 42))", "42"),
        ("((lambda (a b) (- a b)) 10 3)", "7"),
        ("((lambda args args) 1 2 3)", "(1 2 3)"),
        ("((lambda args args))", "()"),
        ("((lambda (a . rest) rest) 1 2 3)", "(2 3)"),
        ("((lambda (a . rest) a) 1)", "1"),
        ("(define (square x) (* x x)) (square 12)", "144"),
        ("(define (f . xs) xs) (f 1 2)", "(1 2)"),
        ("(define (two) 1 2) (two)", "2"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval_str(code), expected, "{code}");
    }
}

#[test]
fn test_closures_capture_lexical_scope() {
    let code = "
        (define (make-adder n) (lambda (x) (+ x n)))
        (define add1 (make-adder 1))
        (define add10 (make-adder 10))
        (list (add1 5) (add10 5) (add1 0))";
    assert_eq!(eval_str(code), "(6 15 1)");

    // not dynamic scope: the caller's n is invisible
    let code = "
        (define (make-adder n) (lambda (x) (+ x n)))
        (define add2 (make-adder 2))
        (define (call-with-n n) (add2 n))
        (call-with-n 100)";
    assert_eq!(eval_str(code), "102");
}

#[test]
fn test_closure_sees_later_mutation() {
    let code = "
        (define k 1)
        (define (add-k x) (+ x k))
        (set! k 10)
        (add-k 1)";
    assert_eq!(eval_str(code), "11");

    let code = "
        (define (make-counter n) (lambda () (set! n (+ n 1)) n))
        (define c (make-counter 0))
        (define d (make-counter 100))
        (c) (c) (d)
        (list (c) (d))";
    assert_eq!(eval_str(code), "(3 102)");
}

#[test]
fn test_closures_share_a_frame() {
    let code = "
        (define (make-cell v) (list (lambda () v) (lambda (new) (set! v new))))
        (define cell (make-cell 1))
        ((car (cdr cell)) 42)
        ((car cell))";
    assert_eq!(eval_str(code), "42");
}

#[test]
fn test_captured_frame_keeps_its_parent() {
    // the closure captures the inner call's frame; the outer call's frame
    // must survive through it even after other calls reuse the pool
    let code = "
        (define (outer n) ((lambda (m) (lambda () (+ m n))) 1))
        (define f (outer 10))
        (define (churn x) (+ x 1))
        (churn 1) (churn 2) (churn 3)
        (f)";
    assert_eq!(eval_str(code), "11");
}

#[test]
fn test_recursion() {
    let code = "
        (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
        (fact 10)";
    assert_eq!(eval_str(code), "3628800");

    let code = "
        (define (build n) (if (= n 0) '() (cons n (build (- n 1)))))
        (build 5)";
    assert_eq!(eval_str(code), "(5 4 3 2 1)");
}

#[test]
fn test_procedures_print_opaquely() {
    assert_eq!(eval_str("(lambda (x) x)"), "#<lambda>");
    assert_eq!(eval_str("+"), "#<procedure +>");
    assert_eq!(eval_str("(list car (lambda () 1))"), "(#<procedure car> #<lambda>)");
}

#[test]
fn test_arity_mismatch() {
    assert_eq!(
        eval_err("((lambda (a b) a) 1)"),
        LispError::arity("lambda", 2, 1)
    );
    assert_eq!(
        eval_err("((lambda (a) a) 1 2)"),
        LispError::arity("lambda", 1, 2)
    );
    assert_eq!(
        eval_err("((lambda (a b . c) a) 1)"),
        LispError::arity_at_least("lambda", 2, 1)
    );
    assert_eq!(eval_err("(car '(1) '(2))"), LispError::arity("car", 1, 2));
    assert_eq!(eval_err("(cons 1)"), LispError::arity("cons", 2, 1));
}

#[test]
fn test_primitive_arity_checked_before_arguments() {
    // the unbound argument is never looked up
    assert_eq!(eval_err("(car nope nope)"), LispError::arity("car", 1, 2));
}

#[test]
fn test_applying_non_procedure() {
    for code in ["(1 2)", "('a 1)", "((list 1 2))", "(#t)"] {
        assert!(
            matches!(eval_err(code), LispError::TypeMismatch(_)),
            "{code}"
        );
    }
}

// =============================================================================
// Pairs and mutation
// =============================================================================

#[test]
fn test_pairs() {
    let cases = [
        ("(car (cons 1 2))", "1"),
        ("(cdr (cons 1 2))", "2"),
        ("(cons 1 2)", "(1 . 2)"),
        ("(cons 1 '(2 3))", "(1 2 3)"),
        ("(list 1 (+ 1 1) 'three)", "(1 2 three)"),
        ("(list)", "()"),
        ("(car (cdr '(a b c)))", "b"),
        ("(cdr '(a))", "()"),
    ];
    for (code, expected) in cases {
        assert_eq!(eval_str(code), expected, "{code}");
    }
}

#[test]
fn test_accessors_reject_non_pairs() {
    for code in ["(car '())", "(cdr '())", "(car 1)", "(set-car! 'a 1)", "(set-cdr! '() 1)"] {
        assert!(
            matches!(eval_err(code), LispError::TypeMismatch(_)),
            "{code}"
        );
    }
}

#[test]
fn test_mutation_is_shared() {
    assert_eq!(eval_str("(define p (cons 1 2)) (set-car! p 9) (car p)"), "9");
    assert_eq!(
        eval_str("(define p (cons 1 2)) (define q p) (set-cdr! p 7) q"),
        "(1 . 7)"
    );
    let code = "
        (define lst (list 1 2 3))
        (define (head) (car lst))
        (set-car! lst 'changed)
        (head)";
    assert_eq!(eval_str(code), "changed");

    // quoted data is copied when bound, then shared from there on
    let code = "
        (define a '(x y))
        (define b a)
        (set-car! (cdr b) 'z)
        a";
    assert_eq!(eval_str(code), "(x z)");
}

#[test]
fn test_mutators_return_the_pair() {
    assert_eq!(eval_str("(set-car! (cons 1 2) 3)"), "(3 . 2)");
    assert_eq!(eval_str("(set-cdr! (list 1 2) '(5))"), "(1 5)");
}

// =============================================================================
// Sessions
// =============================================================================

#[test]
fn test_machines_are_independent() {
    let mut a = Machine::new(Limits::default()).unwrap();
    let mut b = Machine::new(Limits::default()).unwrap();
    a.eval_str("(define x 1)").unwrap();
    assert_eq!(b.eval_str("x"), Err(LispError::UnboundVariable("x".into())));
    assert_eq!(a.eval_str("x").unwrap(), "1");
}

#[test]
fn test_session_survives_errors() {
    let mut machine = Machine::new(Limits::default()).unwrap();
    machine.eval_str("(define x 1)").unwrap();
    assert!(machine.eval_str("(car x)").is_err());
    assert!(machine.eval_str("(car").is_err());
    assert_eq!(machine.eval_str("(+ x 1)").unwrap(), "2");
}

#[test]
fn test_global_bindings_listing() {
    let mut machine = Machine::new(Limits::default()).unwrap();
    machine.eval_str("(define answer 42)").unwrap();
    let bindings = machine.global_bindings();
    assert_eq!(bindings.first().map(|(n, v)| (n.as_str(), v.as_str())), Some(("+", "#<procedure +>")));
    assert_eq!(
        bindings.last().map(|(n, v)| (n.as_str(), v.as_str())),
        Some(("answer", "42"))
    );
}
