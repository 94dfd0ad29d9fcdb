use clap::Parser;

#[tokio::main]
async fn main() {
    replyscoutctl::init_tracing();
    let cli = replyscoutctl::Cli::parse();
    if let Err(err) = replyscoutctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
