use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use reeldb::exec::QueryExecutor;
use reeldb::file::{BufferManager, PagedFileManager};
use reeldb::ingest;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let code = match args.get(1).map(String::as_str) {
        Some("pre-process") => run_pre_process(&args[2..]),
        Some("run-query") => run_query(&args[2..]),
        _ => {
            print_usage();
            1
        }
    };
    std::process::exit(code);
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  reeldb pre-process <bufferSize>");
    eprintln!("  reeldb run-query <titleLo> <titleHi> <bufferSize>");
}

fn parse_buffer_size(arg: &str) -> Option<usize> {
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            eprintln!("Invalid buffer size: {arg}");
            None
        }
    }
}

fn make_buffer(buffer_size: usize) -> Arc<Mutex<BufferManager>> {
    Arc::new(Mutex::new(BufferManager::with_capacity(
        PagedFileManager::new(),
        buffer_size,
    )))
}

fn run_pre_process(args: &[String]) -> i32 {
    let Some(buffer_size) = args.first().and_then(|a| parse_buffer_size(a)) else {
        print_usage();
        return 1;
    };

    let cwd = PathBuf::from(".");
    let buffer = make_buffer(buffer_size);

    match ingest::pre_process(&buffer, &cwd, &cwd) {
        Ok(report) => {
            println!("Loaded {} movies", report.movies);
            println!(
                "Loaded {} WorkedOn records ({} director credits)",
                report.worked_on, report.directors
            );
            println!("Loaded {} people", report.people);
            println!("Indexed {} titles", report.index_entries);
            0
        }
        Err(e) => {
            eprintln!("pre-process failed: {e}");
            1
        }
    }
}

fn run_query(args: &[String]) -> i32 {
    let (Some(title_lo), Some(title_hi)) = (args.first(), args.get(1)) else {
        print_usage();
        return 1;
    };
    let Some(buffer_size) = args.get(2).and_then(|a| parse_buffer_size(a)) else {
        print_usage();
        return 1;
    };

    eprintln!(
        "Executing query: title in [{title_lo:?}, {title_hi:?}], category = director, buffer size {buffer_size}"
    );

    let buffer = make_buffer(buffer_size);
    let mut executor = QueryExecutor::new(buffer, ".", title_lo, title_hi, buffer_size);

    match executor.run(io::stdout().lock()) {
        Ok(rows) => {
            eprintln!("{rows} result rows");
            0
        }
        Err(e) => {
            eprintln!("run-query failed: {e}");
            1
        }
    }
}
