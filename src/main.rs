use fetch_sync::agent::MemoryAgent;
use fetch_sync::{ClientConfig, NewSync, SyncClient, SyncError, SyncResponse};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "FETCH_SYNC_CONFIG";

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fetch_sync=info")),
        )
        .init();

    let config = load_config()?;
    let agent = MemoryAgent::new();
    let client = SyncClient::new(agent.clone());

    client.init(config)?.await?;
    tracing::info!(
        "Client ready, background sync supported: {:?}",
        client.supports_background_sync()
    );

    let handle = client.create(NewSync::named("demo-upload", "https://example.com/api/upload"))?;
    let anonymous = client.create(NewSync::anonymous("https://example.com/api/ping"))?;
    tracing::info!("Created syncs {} and {}", handle.id(), anonymous.id());

    // Stand in for the agent regaining connectivity.
    agent
        .wait_for(|commands| commands.iter().filter(|c| c.name() == "REGISTER_SYNC").count() == 2)
        .await;
    agent.complete(handle.id(), &SyncResponse::new(200).with_body("stored"))?;

    let response = handle.await?;
    tracing::info!("demo-upload finished with HTTP {}: {}", response.status, response.text());

    for sync in client.get_all().await? {
        tracing::info!(
            id = %sync.id(),
            name = ?sync.name(),
            state = ?sync.state(),
            "Known sync"
        );
    }

    client.cancel_all().await?;
    tracing::info!("Agent holds {} syncs after cancel-all", agent.syncs().len());
    Ok(())
}

fn load_config() -> Result<ClientConfig, SyncError> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            let json = std::fs::read_to_string(&path)
                .map_err(|e| SyncError::Config(format!("{}: {}", path, e)))?;
            tracing::info!("Loaded config from {}", path);
            ClientConfig::from_json(&json)
        }
        Err(_) => Ok(ClientConfig::default()),
    }
}
