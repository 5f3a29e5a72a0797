#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hvac_controller::host::run().await
}
