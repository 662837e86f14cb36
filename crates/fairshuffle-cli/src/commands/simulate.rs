use fairshuffle_core::{
    MAX_POSITIONS, Shuffler, Strategy, bias_score_for_distribution, chi_square_test,
    generate_seed,
};

pub fn run(
    strategy: &str,
    samples: usize,
    n_options: usize,
    seed: Option<u64>,
    output_path: Option<&str>,
) {
    let strategy = super::parse_strategy(strategy);
    if !(2..=MAX_POSITIONS).contains(&n_options) {
        eprintln!("--options must be between 2 and {MAX_POSITIONS}, got {n_options}");
        std::process::exit(1);
    }
    if samples == 0 {
        eprintln!("--samples must be positive");
        std::process::exit(1);
    }

    let seed = seed.unwrap_or_else(generate_seed);
    let shuffler = Shuffler::from_seed(seed, strategy);
    let pin_last = strategy == Strategy::BlockRandom;

    println!(
        "🎲 Simulating {samples} shuffles of a {n_options}-option question ({strategy}, seed {seed})\n"
    );

    // counts[original][display]
    let mut counts = vec![vec![0u64; n_options]; n_options];
    for i in 0..samples {
        let question = super::synthetic_question(i, n_options, true, pin_last);
        match shuffler.randomize_question_options(&question) {
            Ok(shuffled) => {
                for (display, &original) in shuffled.record.as_slice().iter().enumerate() {
                    counts[original][display] += 1;
                }
            }
            Err(err) => {
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
    }

    let mut header = format!("{:<10}", "Option");
    for d in 0..n_options {
        header.push_str(&format!("{:>9}", format!("P{d}")));
    }
    header.push_str(&format!("{:>12} {:>9} {:>7}", "chi2", "p", "bias"));
    println!("{header}");
    println!("{}", "-".repeat(header.chars().count()));

    let expected = samples as f64 / n_options as f64;
    let mut per_option = Vec::with_capacity(n_options);
    for (original, row) in counts.iter().enumerate() {
        let chi = chi_square_test(row, expected);
        let score = bias_score_for_distribution(row);
        let mut line = format!("{:<10}", super::option_label(original));
        for &c in row {
            line.push_str(&format!("{c:>9}"));
        }
        line.push_str(&format!(
            "{:>12.2} {:>9.4} {:>7.1}",
            chi.statistic, chi.p_value, score
        ));
        println!("{line}");
        per_option.push(serde_json::json!({
            "option": format!("opt_{original}"),
            "counts": row,
            "chi_square_statistic": chi.statistic,
            "p_value": chi.p_value,
            "bias_score": score,
        }));
    }

    match strategy {
        Strategy::ConstrainedRandom => {
            println!("\nNote: {} is the correct option; the constrained strategy keeps it out of P0, so its row is skewed on purpose.", super::option_label(0));
        }
        Strategy::BlockRandom => {
            println!("\nNote: {} is pinned; the block strategy keeps it in place, so its row is a single column on purpose.", super::option_label(n_options - 1));
        }
        Strategy::FullRandom => {}
    }

    if let Some(path) = output_path {
        super::write_json(
            path,
            &serde_json::json!({
                "strategy": strategy.name(),
                "seed": seed,
                "samples": samples,
                "options": n_options,
                "expected_per_position": expected,
                "per_option": per_option,
            }),
        );
    }
}
