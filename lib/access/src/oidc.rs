//! Microsoft Entra (Azure AD) OIDC configuration.
//!
//! This module provides configuration types for connecting to an Entra
//! tenant for sign-in and to Microsoft Graph for group membership lookups.

use serde::{Deserialize, Serialize};

/// Configuration for the Entra identity provider.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// The directory (tenant) id of the app registration.
    tenant_id: String,
    /// The application (client) id.
    client_id: String,
    /// The client secret.
    client_secret: String,
    /// The redirect URI for the callback (e.g., "https://app.example.com/auth/callback").
    redirect_uri: String,
    /// Scopes to request as a comma-separated string.
    /// Default: OIDC scopes plus the Graph scopes needed for membership checks.
    #[serde(default = "default_scopes")]
    scopes: String,
    /// Login host the tenant authority is built from.
    /// Default: "https://login.microsoftonline.com"
    #[serde(default = "default_authority_host")]
    authority_host: String,
    /// Microsoft Graph base URL.
    /// Default: "https://graph.microsoft.com/v1.0"
    #[serde(default = "default_graph_base_url")]
    graph_base_url: String,
}

fn default_scopes() -> String {
    "openid,profile,email,offline_access,User.Read,GroupMember.Read.All".to_string()
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

impl OidcConfig {
    /// Creates a new configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        tenant_id: String,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
            authority_host: default_authority_host(),
            graph_base_url: default_graph_base_url(),
        }
    }

    /// Returns the tenant id.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns the scopes to request, parsed from the comma-separated string.
    #[must_use]
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Returns the tenant issuer URL used for OIDC discovery.
    #[must_use]
    pub fn issuer_url(&self) -> String {
        format!(
            "{}/{}/v2.0",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Returns the Graph base URL without a trailing slash.
    #[must_use]
    pub fn graph_base_url(&self) -> &str {
        self.graph_base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OidcConfig {
        OidcConfig::new(
            "tenant-123".to_string(),
            "client-id".to_string(),
            "client-secret".to_string(),
            "https://app.example.com/auth/callback".to_string(),
        )
    }

    #[test]
    fn new_config_has_defaults() {
        let config = config();
        assert_eq!(config.tenant_id(), "tenant-123");
        assert_eq!(config.client_id(), "client-id");
        assert_eq!(
            config.redirect_uri(),
            "https://app.example.com/auth/callback"
        );
        assert!(config.scopes().contains(&"openid"));
        assert!(config.scopes().contains(&"GroupMember.Read.All"));
        assert_eq!(config.graph_base_url(), "https://graph.microsoft.com/v1.0");
    }

    #[test]
    fn issuer_url_is_tenant_v2_authority() {
        assert_eq!(
            config().issuer_url(),
            "https://login.microsoftonline.com/tenant-123/v2.0"
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = r#"{
            "tenant_id": "t",
            "client_id": "my-client",
            "client_secret": "secret",
            "redirect_uri": "https://app.example.com/callback",
            "graph_base_url": "http://localhost:9000/"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.client_id(), "my-client");
        assert_eq!(config.scopes().len(), 6);
        assert_eq!(config.graph_base_url(), "http://localhost:9000");
    }

    #[test]
    fn scopes_parses_comma_separated() {
        let json = r#"{
            "tenant_id": "t",
            "client_id": "my-client",
            "client_secret": "secret",
            "redirect_uri": "https://app.example.com/callback",
            "scopes": "openid, profile, , User.Read"
        }"#;

        let config: OidcConfig = serde_json::from_str(json).expect("deserialize");

        assert_eq!(config.scopes(), vec!["openid", "profile", "User.Read"]);
    }
}
