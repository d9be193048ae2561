#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlask_server::start().await
}
