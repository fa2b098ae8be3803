//! Bluesky channel: XRPC client for the bot account.
//!
//! Signs in with a password, proxies DM calls to the chat service, and
//! publishes posts to the bot's own repo. An expired access token is
//! refreshed once per call and the call retried.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::channels::bluesky_types::{
    ConvoOutput, CreateRecordInput, CreateRecordOutput, CreateSessionInput, ListConvosOutput,
    MessageInput, POST_COLLECTION, PostRecord, SendMessageInput, SessionOutput, UpdateReadInput,
    XrpcErrorBody,
};
use crate::channels::gateway::{AuthGateway, MessagingGateway, PublishGateway};
use crate::channels::jwt;
use crate::config::AccountConfig;
use crate::error::GatewayError;
use crate::pipeline::types::{Conversation, Post};

/// Header naming the service an XRPC call should be proxied to.
const PROXY_HEADER: &str = "atproto-proxy";

/// Service id fragment of the chat service.
const CHAT_SERVICE_FRAGMENT: &str = "bsky_chat";

struct Session {
    did: String,
    handle: String,
    access_jwt: SecretString,
    refresh_jwt: SecretString,
}

impl From<SessionOutput> for Session {
    fn from(output: SessionOutput) -> Self {
        Self {
            did: output.did,
            handle: output.handle,
            access_jwt: SecretString::from(output.access_jwt),
            refresh_jwt: SecretString::from(output.refresh_jwt),
        }
    }
}

/// Which token a request is authorized with.
#[derive(Clone, Copy)]
enum Auth {
    Access,
    Refresh,
}

/// Authenticated XRPC client for one account.
pub struct BlueskyClient {
    http: reqwest::Client,
    service: String,
    chat_proxy: String,
    session: RwLock<Session>,
}

impl BlueskyClient {
    /// Sign in and return a ready client.
    pub async fn login(account: &AccountConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::new();
        let service = account.service.trim_end_matches('/').to_string();

        info!(identifier = %account.identifier, service = %service, "Signing in");

        let input = CreateSessionInput {
            identifier: &account.identifier,
            password: account.password.expose_secret(),
        };
        let nsid = "com.atproto.server.createSession";
        let request = http.post(xrpc_url(&service, nsid)).json(&input);
        let output: SessionOutput = send(nsid, request).await.map_err(|e| match e {
            GatewayError::Status { error, message, .. } => GatewayError::AuthFailed {
                reason: format!("{error}: {message}"),
            },
            other => other,
        })?;

        info!(did = %output.did, handle = %output.handle, "Signed in");

        Ok(Self {
            http,
            service,
            chat_proxy: format!("{}#{CHAT_SERVICE_FRAGMENT}", account.chat_service_did),
            session: RwLock::new(output.into()),
        })
    }

    pub async fn handle(&self) -> String {
        self.session.read().await.handle.clone()
    }

    /// Exchange the refresh token for a new session.
    async fn refresh(&self) -> Result<(), GatewayError> {
        let nsid = "com.atproto.server.refreshSession";
        let request = self.authorize(self.http.post(self.url(nsid)), Auth::Refresh).await;
        let output: SessionOutput = send(nsid, request).await?;

        debug!(did = %output.did, "Session refreshed");
        *self.session.write().await = output.into();
        Ok(())
    }

    fn url(&self, nsid: &str) -> String {
        xrpc_url(&self.service, nsid)
    }

    async fn authorize(&self, request: RequestBuilder, auth: Auth) -> RequestBuilder {
        let session = self.session.read().await;
        match auth {
            Auth::Access => request.bearer_auth(session.access_jwt.expose_secret()),
            Auth::Refresh => request.bearer_auth(session.refresh_jwt.expose_secret()),
        }
    }

    /// Send an authorized call, refreshing the session once on `ExpiredToken`.
    async fn call<R, F>(&self, nsid: &str, proxied: bool, build: F) -> Result<R, GatewayError>
    where
        R: DeserializeOwned,
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let prepare = |request: RequestBuilder| {
            if proxied {
                request.header(PROXY_HEADER, self.chat_proxy.as_str())
            } else {
                request
            }
        };

        let request = self.authorize(prepare(build()), Auth::Access).await;
        match send(nsid, request).await {
            Err(e) if e.is_expired_token() => {
                info!(method = nsid, "Access token expired, refreshing session");
                self.refresh().await?;
                let request = self.authorize(prepare(build()), Auth::Access).await;
                send(nsid, request).await
            }
            other => other,
        }
    }

    async fn query<R>(&self, nsid: &str, params: &[(&str, &str)], proxied: bool) -> Result<R, GatewayError>
    where
        R: DeserializeOwned,
    {
        let url = self.url(nsid);
        self.call(nsid, proxied, || self.http.get(&url).query(params)).await
    }

    async fn procedure<B, R>(&self, nsid: &str, body: &B, proxied: bool) -> Result<R, GatewayError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(nsid);
        self.call(nsid, proxied, || self.http.post(&url).json(body)).await
    }
}

fn xrpc_url(service: &str, nsid: &str) -> String {
    format!("{service}/xrpc/{nsid}")
}

/// Send a request and decode the JSON response or XRPC error body.
async fn send<R>(nsid: &str, request: RequestBuilder) -> Result<R, GatewayError>
where
    R: DeserializeOwned,
{
    let response = request.send().await.map_err(|e| GatewayError::Request {
        method: nsid.into(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body: XrpcErrorBody = response.json().await.unwrap_or_default();
        return Err(GatewayError::Status {
            method: nsid.into(),
            status: status.as_u16(),
            error: body.error,
            message: body.message,
        });
    }

    response.json().await.map_err(|e| GatewayError::InvalidResponse {
        method: nsid.into(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl MessagingGateway for BlueskyClient {
    async fn list_conversations(&self, limit: u32) -> Result<Vec<Conversation>, GatewayError> {
        let limit = limit.to_string();
        let output: ListConvosOutput = self
            .query("chat.bsky.convo.listConvos", &[("limit", limit.as_str())], true)
            .await?;
        Ok(output.convos.into_iter().map(Into::into).collect())
    }

    async fn send_reply(&self, convo_id: &str, text: &str) -> Result<(), GatewayError> {
        let input = SendMessageInput {
            convo_id,
            message: MessageInput { text },
        };
        let _: serde_json::Value = self
            .procedure("chat.bsky.convo.sendMessage", &input, true)
            .await?;
        Ok(())
    }

    async fn mark_read(&self, convo_id: &str) -> Result<(), GatewayError> {
        let input = UpdateReadInput { convo_id };
        let _: serde_json::Value = self
            .procedure("chat.bsky.convo.updateRead", &input, true)
            .await?;
        Ok(())
    }

    async fn get_or_create_conversation(&self, other_did: &str) -> Result<Conversation, GatewayError> {
        let output: ConvoOutput = self
            .query("chat.bsky.convo.getConvoForMembers", &[("members", other_did)], true)
            .await?;
        Ok(output.convo.into())
    }
}

#[async_trait]
impl PublishGateway for BlueskyClient {
    async fn publish(&self, post: &Post) -> Result<(), GatewayError> {
        let did = self.session_did().await;
        let input = CreateRecordInput {
            repo: &did,
            collection: POST_COLLECTION,
            record: PostRecord {
                record_type: POST_COLLECTION,
                text: &post.text,
                facets: &post.facets,
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        };
        let output: CreateRecordOutput = self
            .procedure("com.atproto.repo.createRecord", &input, false)
            .await?;
        debug!(uri = %output.uri, "Post created");
        Ok(())
    }
}

#[async_trait]
impl AuthGateway for BlueskyClient {
    async fn session_did(&self) -> String {
        self.session.read().await.did.clone()
    }

    async fn has_chat_access(&self) -> Result<bool, GatewayError> {
        let token = self.session.read().await.access_jwt.expose_secret().to_string();
        let scope = jwt::decode_scope(&token)?;
        Ok(jwt::scope_grants_chat(scope.as_deref()))
    }
}
