use clap::Parser;
use docflow::cli::{Cli, init_tracing, run_cli};
use docflow::output::OutputFormatter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run_cli(&cli) {
        OutputFormatter::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}
