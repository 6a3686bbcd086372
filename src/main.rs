use std::io::Write;
use std::process;

fn main() {
    let code = match dagrun::cli::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    let _ = std::io::stdout().flush();
    process::exit(code);
}
