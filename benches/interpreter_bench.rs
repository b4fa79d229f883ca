use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lisper::{Environment, read_all, run_str, tokenize};

// A representative program touching every token class
const BENCH_INPUT: &str = r#"
; Recursive and tail-recursive definitions
(define (fib n)
  "Naive Fibonacci"
  (if (< n 2)
      n
      (+ (fib (- n 1))
         (fib (- n 2)))))

(define (sum-to n acc)
  (if (= n 0) acc (sum-to (- n 1) (+ acc n))))

(defmacro! unless (lambda (test then else) `(if ~test ~else ~then)))

(define point (struct 'point {x 1, y 2}))
(define names '["alpha" "beta" "gamma\twith\ttabs"])
(define (describe p) (str "(" (get p 'x) ", " (get p 'y) ")"))

(let ((a 1) (b 2))
  (unless (> a b) (concat (list a b) names) 'never))

(alias head car tail cdr)
(map (lambda (x) (* x x)) '(1 2 3 4 5 6 7 8 9 10))
"#;

const TAIL_LOOP: &str = "
(define (loop n acc) (if (= n 0) acc (loop (- n 1) (+ acc 1))))
(loop 10000 0)";

fn bench_reading(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reading");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );
    group.bench_with_input(
        BenchmarkId::new("read_all", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| read_all(black_box(input))),
    );

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Evaluation");

    group.bench_function("tail_loop_10000", |b| {
        b.iter(|| {
            let env = Environment::new_global_populated();
            run_str(black_box(TAIL_LOOP), &env)
        })
    });
    group.bench_function("fib_15", |b| {
        let env = Environment::new_global_populated();
        run_str(BENCH_INPUT, &env).expect("bench program parses");
        b.iter(|| run_str(black_box("(fib 15)"), &env))
    });

    group.finish();
}

criterion_group!(benches, bench_reading, bench_evaluation);
criterion_main!(benches);
