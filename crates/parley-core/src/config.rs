//! Backend configuration: provider selection, credentials, MCP servers.
//!
//! The wire shape mirrors `GET`/`POST /api/config` exactly. MCP server
//! descriptors arrive flat (`command`/`args`/`url` all present as optional
//! fields); `McpServer::transport()` exposes the typed view.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
    OpenAI,
    Gemini,
    Anthropic,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Typed view of an MCP server's transport-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpTransport {
    Stdio { command: String, args: Vec<String> },
    Sse { url: String },
}

/// One MCP server descriptor, in backend wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn default_transport() -> String {
    "stdio".to_string()
}

impl McpServer {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: "stdio".to_string(),
            command: Some(command.into()),
            args,
            url: None,
        }
    }

    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: "sse".to_string(),
            command: None,
            args: Vec::new(),
            url: None,
        }
        .with_url(url)
    }

    fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Resolve the flat wire fields into a typed transport, validating
    /// that the fields required by the transport kind are present.
    pub fn transport(&self) -> Result<McpTransport, Error> {
        match self.transport.as_str() {
            "stdio" => {
                let command = self.command.clone().ok_or_else(|| {
                    Error::serialization(format!("MCP server '{}': stdio without command", self.name))
                })?;
                Ok(McpTransport::Stdio {
                    command,
                    args: self.args.clone(),
                })
            }
            "sse" => {
                let url = self.url.clone().ok_or_else(|| {
                    Error::serialization(format!("MCP server '{}': sse without url", self.name))
                })?;
                Ok(McpTransport::Sse { url })
            }
            other => Err(Error::serialization(format!(
                "MCP server '{}': unknown transport '{other}'",
                self.name
            ))),
        }
    }
}

/// The full `GET`/`POST /api/config` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_key: Option<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServer>,
}
