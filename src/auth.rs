//! HTTP Basic / WS-Security UsernameToken authentication for endpoints.

use crate::error::{AuthenticationError, Fault};
use crate::interceptor::{Interceptor, Phase};
use crate::message::{AttributeValue, AuthorizationPolicy, Exchange, Message, SecurityToken};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{header, StatusCode};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inbound message attribute holding the authenticated principal.
pub const PRINCIPAL_KEY: &str = "zentinel.soap.principal";

/// Username and password presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Checks credentials and produces a principal.
pub trait Authenticator: Send + Sync + 'static {
    type Principal: Send + Sync + 'static;

    /// `Ok(None)` when the credentials are not accepted.
    fn authenticate(
        &self,
        credentials: &BasicCredentials,
    ) -> Result<Option<Self::Principal>, AuthenticationError>;
}

type ErasedAuthenticator =
    dyn Fn(&BasicCredentials) -> Result<Option<AttributeValue>, AuthenticationError> + Send + Sync;

/// An authenticator together with the realm advertised in challenges.
#[derive(Clone)]
pub struct BasicAuthentication {
    authenticator: Arc<ErasedAuthenticator>,
    realm: String,
}

impl BasicAuthentication {
    pub fn new<A: Authenticator>(authenticator: A, realm: impl Into<String>) -> Self {
        Self {
            authenticator: Arc::new(
                move |credentials: &BasicCredentials| -> Result<Option<AttributeValue>, AuthenticationError> {
                    let principal = authenticator.authenticate(credentials)?;
                    Ok(principal.map(|p| Arc::new(p) as AttributeValue))
                },
            ),
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn authenticate(
        &self,
        credentials: &BasicCredentials,
    ) -> Result<Option<AttributeValue>, AuthenticationError> {
        (self.authenticator)(credentials)
    }
}

impl fmt::Debug for BasicAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthentication")
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

/// Gates inbound messages on valid credentials.
///
/// A message without complete credentials is answered with 401 and a
/// `WWW-Authenticate` challenge without consulting the authenticator.
/// Rejected credentials, authenticator errors and successful checks that
/// yield no principal are all answered with 403.
#[derive(Debug, Clone)]
pub struct BasicAuthenticationInterceptor {
    authentication: BasicAuthentication,
}

impl BasicAuthenticationInterceptor {
    pub fn new(authentication: BasicAuthentication) -> Self {
        Self { authentication }
    }

    fn send_error_response(&self, exchange: &mut Exchange, status: StatusCode) {
        let challenge = format!("Basic realm={}", self.authentication.realm());
        let out = exchange.out_message_mut();
        out.set_response_code(status);
        out.set_header(header::WWW_AUTHENTICATE, &challenge);
        out.set_header(header::CONTENT_LENGTH, "0");
        exchange.abort();
        exchange.send_back_channel();
    }
}

impl Interceptor for BasicAuthenticationInterceptor {
    fn phase(&self) -> Phase {
        Phase::Unmarshal
    }

    fn handle_message(&self, exchange: &mut Exchange) -> Result<(), Fault> {
        let Some(credentials) = credentials(exchange.in_message()) else {
            debug!(realm = %self.authentication.realm(), "No credentials on request");
            self.send_error_response(exchange, StatusCode::UNAUTHORIZED);
            return Ok(());
        };

        match self.authentication.authenticate(&credentials) {
            Ok(Some(principal)) => {
                debug!(username = %credentials.username, "Request authenticated");
                exchange
                    .in_message_mut()
                    .attributes_mut()
                    .insert_shared(PRINCIPAL_KEY, principal);
            }
            Ok(None) => {
                warn!(username = %credentials.username, "Credentials rejected");
                self.send_error_response(exchange, StatusCode::FORBIDDEN);
            }
            Err(err) => {
                warn!(username = %credentials.username, error = %err, "Authenticator failed");
                self.send_error_response(exchange, StatusCode::FORBIDDEN);
            }
        }
        Ok(())
    }
}

/// Credentials from the transport authorization policy, or from a
/// WS-Security UsernameToken when the transport carries none. A username
/// without a password counts as missing.
fn credentials(message: &Message) -> Option<BasicCredentials> {
    if let Some(policy) = message.authorization_policy() {
        return match (&policy.user_name, &policy.password) {
            (Some(username), Some(password)) => Some(BasicCredentials::new(username, password)),
            _ => None,
        };
    }

    match message.security_token() {
        Some(SecurityToken::UsernameToken(token)) => token
            .password
            .as_ref()
            .map(|password| BasicCredentials::new(&token.username, password)),
        None => None,
    }
}

/// Decode an `Authorization: Basic ...` header value.
pub fn parse_basic_authorization(value: &str) -> Option<AuthorizationPolicy> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let (user_name, password) = match decoded.split_once(':') {
        Some((user, password)) => (user.to_string(), Some(password.to_string())),
        None => (decoded, None),
    };
    Some(AuthorizationPolicy {
        user_name: Some(user_name),
        password,
        authorization_type: Some("Basic".to_string()),
    })
}

/// Encode credentials as an `Authorization: Basic ...` header value.
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}
