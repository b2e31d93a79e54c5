#[tokio::main]
async fn main() -> anyhow::Result<()> {
    remedi_lib::run().await
}
