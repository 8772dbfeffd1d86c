use clap::Parser;

fn main() {
    let cli = mediaqueuectl::Cli::parse();
    if let Err(err) = mediaqueuectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
