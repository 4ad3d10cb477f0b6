#[tokio::main]
async fn main() -> anyhow::Result<()> {
    callguard::cli::run().await
}
