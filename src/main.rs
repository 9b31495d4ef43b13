// Open Capture command-line front end

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    open_capture_lib::run().await
}
