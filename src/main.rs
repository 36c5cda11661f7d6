//! gitstate binary entry point.

fn main() {
    if let Err(err) = gitstate::cli::run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
