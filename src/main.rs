use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    footfall_cli::cli::app::run().await
}
