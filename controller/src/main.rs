mod accessory;
mod dispatcher;
mod host;
mod lirc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
