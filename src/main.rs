use clap::Parser;
use pbgraph::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    match cli::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pbgraph: error: {err:#}");
            std::process::exit(1);
        }
    }
}
