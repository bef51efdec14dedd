use gallery::{Server, config::GalleryConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = GalleryConfig::from_env()?;
    Server::run(config).await
}
