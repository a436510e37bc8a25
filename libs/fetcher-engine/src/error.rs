use fetcher_api::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Client call failed before consumption started.
    #[error("{stage}: {source}")]
    Setup {
        stage: &'static str,
        source: ClientError,
    },

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl EngineError {
    pub fn setup(stage: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| EngineError::Setup { stage, source }
    }
}
