use async_trait::async_trait;
use eyre::Result;

pub mod chat;
pub mod search;
pub mod status;

#[async_trait]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
