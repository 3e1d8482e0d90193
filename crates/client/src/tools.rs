//! Tool-invocation boundary.
//!
//! The consumer of this crate is a tool layer that must always answer with
//! text, so everything here returns `String` and renders failures as
//! `"Error: <cause>"`. Below this module, errors stay typed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{json, Value};

use sk_domain::config::{Credentials, SessionConfig};
use sk_domain::error::{Error, Result};

use crate::session::ProtocolSession;
use crate::signing::signed_stream_url;
use crate::transport::{HttpTransport, RpcTransport};

/// Server name used in the generated host configuration snippet.
pub const SERVER_CONFIG_NAME: &str = "skywork-office-tool";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Document-generation tools exposed by the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteTool {
    Doc,
    Excel,
    Ppt,
    PptFast,
}

impl RemoteTool {
    pub const ALL: [RemoteTool; 4] = [Self::Doc, Self::Excel, Self::Ppt, Self::PptFast];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doc => "gen_doc",
            Self::Excel => "gen_excel",
            Self::Ppt => "gen_ppt",
            Self::PptFast => "gen_ppt_fast",
        }
    }
}

impl fmt::Display for RemoteTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteTool {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown remote tool: {s}")))
    }
}

/// Arguments object for a document tool. The server expects `use_network`
/// as a string.
pub fn tool_arguments(query: &str, use_network: bool) -> Value {
    json!({
        "query": query,
        "use_network": if use_network { "true" } else { "false" },
    })
}

/// Render a tool outcome as text.
pub fn render_result(result: Result<String>) -> String {
    match result {
        Ok(text) => text,
        Err(e) => format!("Error: {e}"),
    }
}

/// Missing credentials are reported without the `config:` prefix.
fn render_credentials_error(e: Error) -> String {
    match e {
        Error::Config(msg) => format!("Error: {msg}"),
        other => render_result(Err(other)),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One-shot invocation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Connect, handshake, call `tool`, and close.
///
/// Credentials default to the environment. Never fails: errors come back
/// as `"Error: <cause>"`.
pub async fn call_remote_tool(
    config: &SessionConfig,
    credentials: Option<Credentials>,
    tool: RemoteTool,
    query: &str,
    use_network: bool,
) -> String {
    let credentials = match credentials.map_or_else(Credentials::from_env, Ok) {
        Ok(c) => c,
        Err(e) => return render_credentials_error(e),
    };

    let transport: Arc<dyn RpcTransport> = match HttpTransport::new(config) {
        Ok(t) => Arc::new(t),
        Err(e) => return render_result(Err(e)),
    };

    call_remote_tool_with(
        config,
        credentials,
        transport,
        tool.as_str(),
        tool_arguments(query, use_network),
    )
    .await
}

/// [`call_remote_tool`] over an injected transport and raw arguments.
pub async fn call_remote_tool_with(
    config: &SessionConfig,
    credentials: Credentials,
    transport: Arc<dyn RpcTransport>,
    tool_name: &str,
    arguments: Value,
) -> String {
    let session = ProtocolSession::with_transport(config.clone(), credentials, transport);

    let result = run_tool(&session, tool_name, arguments).await;
    session.close().await;

    if let Err(e) = &result {
        tracing::error!(tool = tool_name, error = %e, "remote tool call failed");
    }
    render_result(result)
}

async fn run_tool(session: &ProtocolSession, tool_name: &str, arguments: Value) -> Result<String> {
    session.connect().await?;
    session.initialize_handshake().await?;
    session.call_tool(tool_name, arguments).await
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Host configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Signed stream URL wrapped in a server entry a host can paste into its
/// MCP configuration.
pub fn signed_server_config(credentials: &Credentials, base_url: &str) -> Result<Value> {
    let url = signed_stream_url(base_url, credentials)?;
    Ok(json!({
        "mcpServers": {
            SERVER_CONFIG_NAME: { "url": url.as_str() }
        }
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in RemoteTool::ALL {
            assert_eq!(tool.as_str().parse::<RemoteTool>().unwrap(), tool);
        }
        assert_eq!(RemoteTool::PptFast.to_string(), "gen_ppt_fast");
    }

    #[test]
    fn unknown_tool_rejected() {
        assert!(matches!(
            "gen_video".parse::<RemoteTool>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn arguments_stringify_network_flag() {
        assert_eq!(
            tool_arguments("Q", true),
            json!({ "query": "Q", "use_network": "true" })
        );
        assert_eq!(tool_arguments("Q", false)["use_network"], "false");
    }

    #[test]
    fn render_prefixes_errors() {
        assert_eq!(render_result(Ok("OK".into())), "OK");
        assert_eq!(
            render_result(Err(Error::Remote {
                code: None,
                message: "boom".into()
            })),
            "Error: boom"
        );
    }

    #[test]
    fn server_config_embeds_signed_url() {
        let creds = Credentials::new("id", "key");
        let cfg = signed_server_config(&creds, "https://api.example.com/open/sse").unwrap();
        assert_eq!(
            cfg["mcpServers"][SERVER_CONFIG_NAME]["url"],
            "https://api.example.com/open/sse?secret_id=id&sign=098a9cb1ddb5676fc3149fcc6c67db12"
        );
    }

    #[test]
    fn server_config_rejects_bad_base() {
        let creds = Credentials::new("id", "key");
        assert!(signed_server_config(&creds, "not a url").is_err());
    }

    #[test]
    fn missing_credentials_rendered() {
        use sk_domain::config::{SECRET_ID_ENV, SECRET_KEY_ENV};

        let err = Error::Config(format!("{SECRET_ID_ENV} and {SECRET_KEY_ENV} must be set"));
        assert_eq!(
            render_credentials_error(err),
            "Error: SKYWORK_SECRET_ID and SKYWORK_SECRET_KEY must be set"
        );
    }
}
