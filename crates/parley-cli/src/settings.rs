//! Backend settings editing.
//!
//! The settings view works on a draft copied from the backend; edits stay
//! local until `save` writes the whole draft back in one call, so closing
//! the view without saving changes nothing.

use parley_core::{Backend, BackendConfig, Error, McpServer, ProviderKind};

#[derive(Debug, Clone)]
pub struct SettingsDraft {
    config: BackendConfig,
    dirty: bool,
}

impl SettingsDraft {
    /// Snapshot the current backend settings into an editable draft.
    pub async fn load(backend: &dyn Backend) -> Result<Self, Error> {
        let config = backend.fetch_config().await?;
        Ok(Self {
            config,
            dirty: false,
        })
    }

    pub fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    pub fn servers(&self) -> &[McpServer] {
        &self.config.mcp_servers
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_provider(&mut self, provider: ProviderKind) {
        if self.config.provider != provider {
            self.config.provider = provider;
            self.dirty = true;
        }
    }

    /// Set or clear the API key for a provider. Setting a key for
    /// `Local` is meaningless and ignored.
    pub fn set_key(&mut self, provider: ProviderKind, key: Option<String>) {
        let slot = match provider {
            ProviderKind::OpenAI => &mut self.config.openai_key,
            ProviderKind::Gemini => &mut self.config.gemini_key,
            ProviderKind::Anthropic => &mut self.config.anthropic_key,
            ProviderKind::Local => return,
        };
        if *slot != key {
            *slot = key;
            self.dirty = true;
        }
    }

    pub fn add_server(&mut self, server: McpServer) {
        self.config.mcp_servers.push(server);
        self.dirty = true;
    }

    /// Remove a tool server by name; returns whether one was removed.
    pub fn remove_server(&mut self, name: &str) -> bool {
        let before = self.config.mcp_servers.len();
        self.config.mcp_servers.retain(|s| s.name != name);
        let removed = self.config.mcp_servers.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Write the draft back to the backend in one atomic update.
    pub async fn save(&mut self, backend: &dyn Backend) -> Result<(), Error> {
        backend.store_config(&self.config).await?;
        self.dirty = false;
        Ok(())
    }

    /// One-line description for the status bar.
    pub fn summary(&self) -> String {
        let keys: Vec<&str> = [
            ("openai", self.config.openai_key.is_some()),
            ("gemini", self.config.gemini_key.is_some()),
            ("anthropic", self.config.anthropic_key.is_some()),
        ]
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect();
        format!(
            "provider: {}, keys: [{}], tool servers: {}",
            self.config.provider,
            keys.join(", "),
            self.config.mcp_servers.len()
        )
    }
}
