use fetcher_api::ClientError;
use fetcher_engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    #[error("{0}")]
    Config(String),

    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Engine(#[from] EngineError),
}
