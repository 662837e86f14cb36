use std::sync::Arc;

use fairshuffle_core::{AnalyzerConfig, BiasAnalyzer, JsonStatStore, StatStore};

pub fn run(stats_path: &str, significance: f64, min_bias_score: f64, output_path: Option<&str>) {
    let store = match JsonStatStore::open(stats_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("Failed to open stat store {stats_path}: {err}");
            std::process::exit(1);
        }
    };

    let analyzer = BiasAnalyzer::with_config(
        Arc::clone(&store) as Arc<dyn StatStore>,
        AnalyzerConfig {
            significance,
            min_bias_score,
        },
    );

    println!("📊 Analyzing {stats_path} (p < {significance}, bias >= {min_bias_score})\n");

    let summary = match analyzer.analyze_all_questions() {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("Analysis failed: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = store.flush() {
        eprintln!("Failed to persist analysis results: {err}");
        std::process::exit(1);
    }

    let report = match analyzer.generate_report() {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Report generation failed: {err}");
            std::process::exit(1);
        }
    };

    println!(
        "{:<16} {:<6} {:>8} {:>10} {:>9} {:>6}  {:<10} {}",
        "Option", "Label", "Total", "chi2", "p", "bias", "Rating", "Counts"
    );
    println!("{}", "-".repeat(90));
    for finding in &report.options {
        let flag = if finding.significantly_biased {
            " ⚠"
        } else {
            ""
        };
        let counts: Vec<String> = finding.position_counts[..finding.positions_used]
            .iter()
            .map(|c| c.to_string())
            .collect();
        println!(
            "{:<16} {:<6} {:>8} {:>10.2} {:>9.4} {:>6.1}  {:<10} [{}]{flag}",
            finding.option_id,
            finding.option_label,
            finding.total_randomizations,
            finding.chi_square_statistic,
            finding.p_value,
            finding.bias_score,
            finding.quality.to_string(),
            counts.join(", "),
        );
    }

    println!(
        "\n{} analyzed, {} skipped, {} flagged in {}ms",
        summary.analyzed, summary.skipped, summary.flagged, summary.duration_ms
    );
    if report.flagged.is_empty() {
        println!("No significantly biased options.");
    } else {
        println!("⚠ Significantly biased: {}", report.flagged.join(", "));
    }
    if report.skipped > 0 {
        println!(
            "⚠ {} row(s) skipped for failing the counter conservation check — see logs",
            report.skipped
        );
    }

    if let Some(path) = output_path {
        match serde_json::to_value(&report) {
            Ok(value) => super::write_json(path, &value),
            Err(err) => eprintln!("Failed to serialize report: {err}"),
        }
    }
}
