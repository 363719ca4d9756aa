// Actix server setup

use consensus_price_index::api;
use log::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting Consensus Price Index API ...");
    api::start_server().await?;
    Ok(())
}
