fn main() {
    match doyac_cli::run_cli() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(doyac_cli::EXIT_ERROR);
        }
    }
}
