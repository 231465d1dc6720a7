use clap::Parser;
use umbra_core::cli::{init_logging, run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);
    let code = run(&cli).await;
    std::process::exit(code.as_i32());
}
