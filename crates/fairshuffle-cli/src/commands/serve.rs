use std::sync::Arc;

use fairshuffle_core::{JsonStatStore, MemoryStatStore, StatStore};

pub fn run(host: &str, port: u16, stats_path: Option<&str>) {
    let stats: Arc<dyn StatStore> = match stats_path {
        Some(path) => {
            let store = match JsonStatStore::open(path) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    eprintln!("Failed to open stat store {path}: {err}");
                    std::process::exit(1);
                }
            };
            // Counters accumulate in memory; persist them on shutdown.
            let flush_handle = Arc::clone(&store);
            ctrlc::set_handler(move || {
                if let Err(err) = flush_handle.flush() {
                    eprintln!("Failed to flush stat store: {err}");
                }
                std::process::exit(0);
            })
            .expect("failed to install Ctrl-C handler");
            store
        }
        None => Arc::new(MemoryStatStore::new()),
    };

    let base = format!("http://{host}:{port}");
    println!("🎲 fairshuffle server v{}", fairshuffle_core::VERSION);
    println!("   {base}");
    match stats_path {
        Some(path) => println!("   stat store: {path} (flushed on Ctrl-C)"),
        None => println!("   stat store: in-memory (lost on exit)"),
    }
    println!();
    println!("   Endpoints:");
    println!("     GET  /                                   API index (try: curl {base})");
    println!("     POST /api/v1/sessions                    Create a randomization session");
    println!("     GET  /api/v1/sessions/<id>               Randomization summary");
    println!("     POST /api/v1/sessions/<id>/shuffle       Shuffle a question");
    println!("     POST /api/v1/sessions/<id>/restore       Restore canonical order");
    println!("     POST /api/v1/sessions/<id>/randomization Toggle shuffling");
    println!("     POST /api/v1/sessions/<id>/strategy      Switch strategy (new seed)");
    println!("     GET  /api/v1/stats                       Per-option position counters");
    println!("     POST /api/v1/analyze                     Run the bias analyzer batch");
    println!("     GET  /api/v1/report                      Operator bias report");
    println!();
    println!("   Examples:");
    println!(
        "     curl -X POST {base}/api/v1/sessions -H 'content-type: application/json' -d '{{\"strategy\":\"full_random\"}}'"
    );
    println!("     curl {base}/api/v1/report");
    println!();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(fairshuffle_server::run_server(stats, host, port));
}
