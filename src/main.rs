#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uma_monitor_lib::run().await
}
