use std::net::SocketAddr;
use std::path::PathBuf;

use reqwest::Url;

use crate::profile::PermissionPrompt;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: Url,
    pub profile_path: PathBuf,
    /// Application server key; read from the server's index page when unset.
    pub vapid_public_key: Option<String>,
    pub session_cookie: Option<String>,
    /// Base of the endpoints handed out to the server; one token is appended per subscription.
    pub push_endpoint: String,
    pub listen_addr: SocketAddr,
    pub prompt: PermissionPrompt,
}

#[cfg(test)]
impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: Url::parse("http://localhost:8000/").expect("server url"),
            profile_path: PathBuf::from("kachi-profile.toml"),
            vapid_public_key: None,
            session_cookie: None,
            push_endpoint: "http://127.0.0.1:3000/push".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            prompt: PermissionPrompt::Ask,
        }
    }
}
