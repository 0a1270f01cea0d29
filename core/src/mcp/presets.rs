//! Ready-made MCP server launch recipes.
//!
//! Every preset resolves to a plain [`TransportSpec`] plus agent instructions;
//! the session loop treats them all the same way.

use crate::traits::TransportSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct McpPreset {
    pub name: &'static str,
    pub title: &'static str,
    pub spec: TransportSpec,
    pub instructions: Vec<String>,
}

pub const PRESET_NAMES: &[&str] = &["github", "linear", "slack", "perplexity"];

/// Builds the named preset, reading credentials through `lookup` (normally
/// the process environment). Missing credentials are left blank so the
/// session can report them before anything is spawned.
pub fn preset(name: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<McpPreset> {
    let var = |key: &str| lookup(key).unwrap_or_default();

    let built = match name.to_lowercase().as_str() {
        "github" => {
            let token = var("GITHUB_ACCESS_TOKEN");
            McpPreset {
                name: "github",
                title: "GitHub",
                spec: TransportSpec::new("github", "npx")
                    .with_args([
                        "-y".to_string(),
                        "mcp-remote".to_string(),
                        "https://api.githubcopilot.com/mcp/".to_string(),
                        "--header".to_string(),
                        format!("Authorization: Bearer {token}"),
                    ])
                    .with_env("GITHUB_ACCESS_TOKEN", token)
                    .with_required_env("GITHUB_ACCESS_TOKEN"),
                instructions: vec![
                    "You are a GitHub management agent with Model Context Protocol (MCP) access to GitHub. \
                     Help users read code, file issues & PRs, review commits and automate workflows via natural language."
                        .to_string(),
                ],
            }
        }
        "linear" => McpPreset {
            name: "linear",
            title: "Linear",
            spec: TransportSpec::new("linear", "npx")
                .with_args(["-y", "mcp-remote", "https://mcp.linear.app/sse"])
                .with_env("LINEAR_API_KEY", var("LINEAR_API_KEY"))
                .with_required_env("LINEAR_API_KEY"),
            instructions: vec![
                "You are a Linear task management agent with Model Context Protocol (MCP) access to Linear. \
                 You help users manage issues, comments, and projects in Linear."
                    .to_string(),
            ],
        },
        "slack" => McpPreset {
            name: "slack",
            title: "Slack",
            spec: TransportSpec::new("slack", "npx")
                .with_args(["-y", "@modelcontextprotocol/server-slack-user"])
                .with_env("SLACK_TOKEN", var("SLACK_TOKEN"))
                .with_env("SLACK_TEAM_ID", var("SLACK_TEAM_ID"))
                .with_required_env("SLACK_TOKEN")
                .with_required_env("SLACK_TEAM_ID"),
            instructions: vec![
                "You are a Slack workplace assistant with Model Context Protocol (MCP) access. \
                 You can list channels, post messages, reply in threads, add reactions, and read message history \
                 to help users coordinate work in Slack."
                    .to_string(),
            ],
        },
        "perplexity" => McpPreset {
            name: "perplexity",
            title: "Perplexity",
            spec: TransportSpec::new("perplexity", "npx")
                .with_args(["-y", "server-perplexity-ask"])
                .with_env("PERPLEXITY_API_KEY", var("PERPLEXITY_API_KEY"))
                .with_required_env("PERPLEXITY_API_KEY"),
            instructions: vec![
                "You are a web research agent with Model Context Protocol (MCP) access to Perplexity Sonar."
                    .to_string(),
                "Use the MCP tool(s) from the Perplexity Ask server to run live web research and return cited, up-to-date results."
                    .to_string(),
            ],
        },
        _ => return None,
    };

    Some(built)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_preset_resolves() {
        for name in PRESET_NAMES {
            let preset = preset(name, |_| None).unwrap();
            assert_eq!(preset.name, *name);
            assert_eq!(preset.spec.command, "npx");
            assert!(!preset.instructions.is_empty());
            assert!(preset.spec.missing_env().is_some());
        }
        assert!(preset("jira", |_| None).is_none());
    }

    #[test]
    fn github_token_lands_in_header() {
        let preset = preset("GitHub", |key| {
            (key == "GITHUB_ACCESS_TOKEN").then(|| "ghp_123".to_string())
        })
        .unwrap();
        assert!(
            preset
                .spec
                .args
                .contains(&"Authorization: Bearer ghp_123".to_string())
        );
        assert_eq!(preset.spec.missing_env(), None);
    }

    #[test]
    fn slack_needs_both_variables() {
        let preset = preset("slack", |key| (key == "SLACK_TOKEN").then(|| "xoxp".to_string())).unwrap();
        assert_eq!(preset.spec.missing_env(), Some("SLACK_TEAM_ID"));
    }
}
