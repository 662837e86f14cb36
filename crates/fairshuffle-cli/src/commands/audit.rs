use fairshuffle_core::{MAX_POSITIONS, Shuffler, Strategy, generate_seed};
use fairshuffle_tests::{TestResult, calculate_quality_score, run_all_tests};

pub fn run(
    samples: usize,
    n_options: usize,
    strategy_filter: Option<&str>,
    seed: Option<u64>,
    output_path: Option<&str>,
) {
    if !(2..=MAX_POSITIONS).contains(&n_options) {
        eprintln!("--options must be between 2 and {MAX_POSITIONS}, got {n_options}");
        std::process::exit(1);
    }

    let strategies: Vec<Strategy> = match strategy_filter {
        Some(name) => vec![super::parse_strategy(name)],
        None => Strategy::ALL.to_vec(),
    };
    let seed = seed.unwrap_or_else(generate_seed);

    println!(
        "🔎 Auditing {} strateg{}, {samples} samples each, {n_options} options (seed {seed})",
        strategies.len(),
        if strategies.len() == 1 { "y" } else { "ies" },
    );

    let mut json_strategies = Vec::new();
    for strategy in strategies {
        let shuffler = Shuffler::from_seed(seed, strategy);
        println!("\n━━ {strategy} ━━");

        let mut json_entry = serde_json::json!({ "strategy": strategy.name() });

        // Strategy-specific placement invariants come first; a violation
        // here is a bug, not a statistical fluctuation.
        match strategy {
            Strategy::ConstrainedRandom => {
                let records = collect_records(&shuffler, samples, n_options, true, false);
                let violations = records.iter().filter(|r| r[0] == 0).count();
                print_invariant("correct option never at position 0", violations, samples);
                json_entry["invariant_violations"] = serde_json::json!(violations);
            }
            Strategy::BlockRandom => {
                let records = collect_records(&shuffler, samples, n_options, false, true);
                let violations = records
                    .iter()
                    .filter(|r| r[n_options - 1] != n_options - 1)
                    .count();
                print_invariant("pinned option stays in place", violations, samples);
                json_entry["invariant_violations"] = serde_json::json!(violations);
            }
            Strategy::FullRandom => {}
        }

        // Uniformity battery over the unconstrained shuffle machinery.
        let records = collect_records(&shuffler, samples, n_options, false, false);
        let results = run_all_tests(&records);
        for result in &results {
            print_test_result(result);
        }
        let score = calculate_quality_score(&results);
        let passed = results.iter().filter(|r| r.passed).count();
        println!("  score: {score:.0}/100 ({passed}/{} passed)", results.len());

        json_entry["quality_score"] = serde_json::json!(score);
        json_entry["tests"] = serde_json::Value::Array(
            results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "name": r.name,
                        "passed": r.passed,
                        "p_value": r.p_value,
                        "statistic": r.statistic,
                        "grade": r.grade.to_string(),
                        "details": r.details,
                    })
                })
                .collect(),
        );
        json_strategies.push(json_entry);
    }

    if let Some(path) = output_path {
        super::write_json(
            path,
            &serde_json::json!({
                "seed": seed,
                "samples": samples,
                "options": n_options,
                "strategies": json_strategies,
            }),
        );
    }
}

fn collect_records(
    shuffler: &Shuffler,
    samples: usize,
    n_options: usize,
    correct_first: bool,
    pin_last: bool,
) -> Vec<Vec<usize>> {
    (0..samples)
        .map(|i| {
            let question = super::synthetic_question(i, n_options, correct_first, pin_last);
            match shuffler.randomize_question_options(&question) {
                Ok(shuffled) => shuffled.record.as_slice().to_vec(),
                Err(err) => {
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        })
        .collect()
}

fn print_invariant(name: &str, violations: usize, samples: usize) {
    let mark = if violations == 0 { "✓" } else { "✗" };
    println!("  {mark} {name}: {violations}/{samples} violations");
}

fn print_test_result(result: &TestResult) {
    let mark = if result.passed { "✓" } else { "✗" };
    let p = result
        .p_value
        .map(|p| format!("p={p:.4}"))
        .unwrap_or_else(|| "p=n/a".to_string());
    println!(
        "  {mark} [{}] {:<26} {:>10}  {}",
        result.grade, result.name, p, result.details
    );
}
