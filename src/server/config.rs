use super::RequestsLoggingLevel;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Bearer token for the admin API. `None` locks the admin API entirely.
    pub admin_token: Option<String>,
    /// Shared secret for inbound signing-provider webhooks. `None` rejects
    /// every webhook.
    pub webhook_secret: Option<String>,
    pub webhook_max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            admin_token: None,
            webhook_secret: None,
            webhook_max_body_bytes: 256 * 1024,
        }
    }
}
