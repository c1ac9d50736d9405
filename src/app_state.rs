use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use crate::{assistant::ContractAssistant, config::AppConfig};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub assistant: Arc<ContractAssistant>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, assistant: ContractAssistant, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self {
            config,
            assistant: Arc::new(assistant),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }
}
