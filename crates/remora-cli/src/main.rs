//! Binary entrypoint for the remora CLI.

#[tokio::main]
async fn main() {
    std::process::exit(remora_cli::run().await);
}
