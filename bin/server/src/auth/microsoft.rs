//! Microsoft Entra sign-in and Graph group membership lookup.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use groupgate_access::{
    AuthenticationError, CallbackData, IdentityProvider, LoginInitiation, LoginState,
    MAX_GROUP_LOOKUP_BATCH, OidcConfig, ProviderIdentity, UserIdentity,
};
use openidconnect::core::{CoreAuthenticationFlow, CoreClient, CoreProviderMetadata};
use openidconnect::{
    AuthorizationCode, ClientId, ClientSecret, CsrfToken, IssuerUrl, Nonce, OAuth2TokenResponse,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const PROVIDER_NAME: &str = "microsoft";

/// Timeout for Graph requests.
const GRAPH_TIMEOUT: Duration = Duration::from_secs(20);

fn provider_error(reason: impl Into<String>) -> AuthenticationError {
    AuthenticationError::ProviderError {
        provider: PROVIDER_NAME.to_string(),
        reason: reason.into(),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckMemberGroupsRequest<'a> {
    group_ids: Vec<&'a str>,
}

#[derive(Deserialize)]
struct CheckMemberGroupsResponse {
    #[serde(default)]
    value: Vec<String>,
}

/// Minimal Microsoft Graph client for membership checks.
#[derive(Clone)]
pub struct GraphClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Creates a client for the Graph API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Report<AuthenticationError>> {
        let http_client = reqwest::Client::builder()
            .timeout(GRAPH_TIMEOUT)
            .build()
            .map_err(|e| provider_error(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Returns the subset of `group_ids` the signed-in user belongs to.
    ///
    /// Ids are lowercased, deduplicated and sent sorted. At most
    /// [`MAX_GROUP_LOOKUP_BATCH`] ids are accepted; an empty set returns
    /// without calling Graph.
    #[instrument(skip(self, access_token, group_ids), fields(group_count = group_ids.len()))]
    pub async fn check_member_groups(
        &self,
        access_token: &str,
        group_ids: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, Report<AuthenticationError>> {
        let ids: BTreeSet<String> = group_ids.iter().map(|g| g.to_lowercase()).collect();
        if ids.len() > MAX_GROUP_LOOKUP_BATCH {
            return Err(AuthenticationError::GroupBatchTooLarge {
                requested: ids.len(),
                limit: MAX_GROUP_LOOKUP_BATCH,
            }
            .into());
        }
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let response = self
            .http_client
            .post(format!("{}/me/checkMemberGroups", self.base_url))
            .bearer_auth(access_token)
            .json(&CheckMemberGroupsRequest {
                group_ids: ids.iter().map(String::as_str).collect(),
            })
            .send()
            .await
            .map_err(|e| provider_error(format!("group lookup request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthenticationError::GroupLookupFailed {
                status: status.as_u16(),
            }
            .into());
        }

        let body: CheckMemberGroupsResponse = response
            .json()
            .await
            .map_err(|e| provider_error(format!("invalid group lookup response: {e}")))?;

        let members: BTreeSet<String> = body.value.iter().map(|g| g.to_lowercase()).collect();
        debug!(member_count = members.len(), "group membership resolved");

        Ok(members)
    }
}

/// Entra ID provider: OIDC sign-in plus Graph membership lookup.
pub struct MicrosoftProvider {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    config: OidcConfig,
    http_client: reqwest::Client,
    graph: GraphClient,
    group_ids: BTreeSet<String>,
}

impl MicrosoftProvider {
    /// Discovers the tenant's OIDC metadata and prepares the provider.
    ///
    /// `group_ids` are the configured group ids checked at every login.
    pub async fn discover(
        config: OidcConfig,
        group_ids: BTreeSet<String>,
    ) -> Result<Self, Report<AuthenticationError>> {
        let issuer_url = IssuerUrl::new(config.issuer_url())
            .map_err(|e| provider_error(format!("invalid issuer URL: {e}")))?;

        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| provider_error(format!("failed to create HTTP client: {e}")))?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http_client)
            .await
            .map_err(|e| provider_error(format!("failed to discover provider: {e}")))?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| provider_error(format!("invalid redirect URI: {e}")))?;

        let graph = GraphClient::new(config.graph_base_url())?;

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            config,
            http_client,
            graph,
            group_ids,
        })
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn login_redirect(&self) -> Result<LoginInitiation, Report<AuthenticationError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = client
            .authorize_url(
                CoreAuthenticationFlow::AuthorizationCode,
                CsrfToken::new_random,
                Nonce::new_random,
            )
            .set_pkce_challenge(pkce_challenge);

        for scope in self.config.scopes() {
            auth_request = auth_request.add_scope(Scope::new(scope.to_string()));
        }

        let (auth_url, csrf_token, nonce) = auth_request.url();

        Ok(LoginInitiation {
            authorization_url: auth_url.to_string(),
            state: LoginState {
                csrf_token: csrf_token.secret().clone(),
                pkce_verifier: pkce_verifier.secret().clone(),
                nonce: nonce.secret().clone(),
            },
        })
    }

    #[instrument(skip_all, fields(provider = PROVIDER_NAME))]
    async fn handle_callback(
        &self,
        callback: &CallbackData,
        state: &LoginState,
    ) -> Result<ProviderIdentity, Report<AuthenticationError>> {
        let client = CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone());

        let token_response = client
            .exchange_code(AuthorizationCode::new(callback.code.clone()))
            .map_err(|e| provider_error(format!("token endpoint error: {e}")))?
            .set_pkce_verifier(PkceCodeVerifier::new(state.pkce_verifier.clone()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| provider_error(format!("token exchange failed: {e}")))?;

        let user = {
            let id_token = token_response
                .id_token()
                .ok_or_else(|| AuthenticationError::MissingClaim {
                    claim: "id_token".to_string(),
                })?;

            let nonce = Nonce::new(state.nonce.clone());
            let claims = id_token
                .claims(&client.id_token_verifier(), &nonce)
                .map_err(|e| AuthenticationError::InvalidToken {
                    reason: e.to_string(),
                })?;

            // oid and tid are Entra-specific and absent from the standard claim set
            let raw = RawIdentityClaims::from_token_response(&token_response)?;

            let name = claims
                .name()
                .and_then(|n| n.get(None))
                .map(|n| n.as_str().to_string());
            let preferred_username = claims.preferred_username().map(|u| u.as_str().to_string());
            let subject = raw
                .oid
                .unwrap_or_else(|| claims.subject().as_str().to_string());

            UserIdentity::new(subject)
                .with_name(name)
                .with_preferred_username(preferred_username)
                .with_tenant_id(raw.tid)
        };

        let member_group_ids = self
            .graph
            .check_member_groups(token_response.access_token().secret(), &self.group_ids)
            .await?;

        Ok(ProviderIdentity {
            user,
            member_group_ids,
        })
    }
}

/// Entra claims read straight from the ID token payload.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
struct RawIdentityClaims {
    oid: Option<String>,
    tid: Option<String>,
}

impl RawIdentityClaims {
    /// Reads the claims from the raw ID token in a token response.
    fn from_token_response<TR>(token_response: &TR) -> Result<Self, AuthenticationError>
    where
        TR: Serialize,
    {
        let response_json =
            serde_json::to_value(token_response).map_err(|e| AuthenticationError::InvalidToken {
                reason: format!("failed to serialize token response: {e}"),
            })?;

        let id_token = response_json
            .get("id_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AuthenticationError::MissingClaim {
                claim: "id_token".to_string(),
            })?;

        Self::from_jwt(id_token)
    }

    /// Decodes the payload segment of a compact JWT. The signature is not
    /// checked here; callers verify the token first.
    fn from_jwt(token: &str) -> Result<Self, AuthenticationError> {
        let payload = match token.split('.').collect::<Vec<_>>().as_slice() {
            [_, payload, _] => *payload,
            _ => {
                return Err(AuthenticationError::InvalidToken {
                    reason: "invalid JWT format".to_string(),
                });
            }
        };

        let bytes =
            URL_SAFE_NO_PAD
                .decode(payload)
                .map_err(|e| AuthenticationError::InvalidToken {
                    reason: format!("failed to decode JWT payload: {e}"),
                })?;

        serde_json::from_slice(&bytes).map_err(|e| AuthenticationError::InvalidToken {
            reason: format!("failed to parse JWT payload: {e}"),
        })
    }
}
