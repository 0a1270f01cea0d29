use crate::traits::Tool;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// How to launch a tool-discovery transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Keys of `env` that must hold a non-empty value before launch.
    pub required_env: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl TransportSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_required_env(mut self, key: impl Into<String>) -> Self {
        self.required_env.push(key.into());
        self
    }

    /// First required variable that is absent or blank.
    pub fn missing_env(&self) -> Option<&str> {
        self.required_env
            .iter()
            .find(|key| {
                self.env
                    .get(key.as_str())
                    .is_none_or(|value| value.trim().is_empty())
            })
            .map(String::as_str)
    }
}

/// An acquired transport. The session owns it exclusively and must call
/// [`Transport::release`] exactly once; taking `Box<Self>` makes a second call
/// impossible.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// The tools discovered at acquisition. Fixed for the transport's lifetime.
    fn tools(&self) -> Vec<Arc<dyn Tool>>;

    /// Free-form usage notes the server sent during its handshake.
    fn instructions(&self) -> Option<&str> {
        None
    }

    async fn release(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn acquire(&self, spec: &TransportSpec) -> anyhow::Result<Box<dyn Transport>>;
}

/// Transport with no process behind it and no tools, for sessions that only
/// use built-in tools.
pub struct NullTransport {
    name: String,
}

impl NullTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Transport for NullTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![]
    }

    async fn release(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Hands out a [`NullTransport`] for every spec.
pub struct NullTransportFactory;

#[async_trait]
impl TransportFactory for NullTransportFactory {
    async fn acquire(&self, spec: &TransportSpec) -> anyhow::Result<Box<dyn Transport>> {
        let name = if spec.name.is_empty() { "builtin" } else { spec.name.as_str() };
        Ok(Box::new(NullTransport::new(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_factory_yields_no_tools() {
        let transport = NullTransportFactory
            .acquire(&TransportSpec::default())
            .await
            .unwrap();
        assert_eq!(transport.name(), "builtin");
        assert!(transport.tools().is_empty());
        transport.release().await.unwrap();
    }

    #[test]
    fn missing_env_reports_blank_values() {
        let spec = TransportSpec::new("slack", "npx")
            .with_env("SLACK_TOKEN", "xoxp-1")
            .with_env("SLACK_TEAM_ID", "  ")
            .with_required_env("SLACK_TOKEN")
            .with_required_env("SLACK_TEAM_ID");
        assert_eq!(spec.missing_env(), Some("SLACK_TEAM_ID"));
    }

    #[test]
    fn missing_env_reports_absent_keys() {
        let spec = TransportSpec::new("linear", "npx").with_required_env("LINEAR_API_KEY");
        assert_eq!(spec.missing_env(), Some("LINEAR_API_KEY"));
    }

    #[test]
    fn satisfied_spec_has_no_missing_env() {
        let spec = TransportSpec::new("github", "npx")
            .with_args(["-y", "mcp-remote"])
            .with_env("GITHUB_ACCESS_TOKEN", "ghp")
            .with_required_env("GITHUB_ACCESS_TOKEN");
        assert_eq!(spec.missing_env(), None);
        assert_eq!(spec.args, vec!["-y", "mcp-remote"]);
    }
}
