pub mod analyze;
pub mod audit;
pub mod seed;
pub mod serve;
pub mod simulate;

use fairshuffle_core::{AnswerOption, Question, Strategy};

/// Circled-digit labels used for synthetic questions.
const LABELS: [&str; 5] = ["①", "②", "③", "④", "⑤"];

pub(crate) fn parse_strategy(name: &str) -> Strategy {
    match name.parse() {
        Ok(strategy) => strategy,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

pub(crate) fn option_label(i: usize) -> String {
    LABELS.get(i).copied().unwrap_or("?").to_string()
}

/// Synthetic question for simulation and audits. Option 0 can be marked
/// correct (to exercise the constrained strategy) and the last option can be
/// pinned (to exercise the block strategy).
pub(crate) fn synthetic_question(
    index: usize,
    n_options: usize,
    correct_first: bool,
    pin_last: bool,
) -> Question {
    let options = (0..n_options)
        .map(|i| {
            let option = AnswerOption::new(
                format!("opt_{i}"),
                option_label(i),
                correct_first && i == 0,
            );
            if pin_last && i == n_options - 1 {
                option.pinned()
            } else {
                option
            }
        })
        .collect();
    Question {
        question_id: format!("probe_q{index}"),
        options,
    }
}

pub(crate) fn write_json(path: &str, value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(err) = std::fs::write(path, json) {
                eprintln!("Failed to write {path}: {err}");
            } else {
                println!("\nResults written to {path}");
            }
        }
        Err(err) => eprintln!("Failed to serialize results: {err}"),
    }
}
