mod error;
pub mod manager;
pub mod rmcp_client;
pub mod session;

pub use error::McpError;
pub use manager::{ConnectionManager, ConnectionStatus};
pub use rmcp_client::RmcpConnector;
pub use session::{
    Capability, ContentChunk, InvocationOutput, McpSession, ResourceInfo, SessionConnector,
    SessionLease,
};
