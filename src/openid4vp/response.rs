use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{opts::IdTokenSignerPolicy, request_object::RequestObject};
use crate::{
    api::{Crypto, DidResolver},
    core::{
        credential::Credential,
        did::{resolve_signing_method, VerificationMethod},
        jwt::JwsSigner,
        presentation::Presentation,
        presentation_submission::PresentationSubmission,
    },
    utils::now,
};

/// Lifetime of the signed tokens, in seconds.
pub const TOKEN_LIFETIME_SECS: i64 = 600;
pub const SELF_ISSUED_V2: &str = "https://self-issued.me/v2/openid-vc";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpTokenClaims {
    pub vp: Presentation,
    pub nonce: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenVpToken {
    pub presentation_submission: Option<PresentationSubmission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(rename = "_vp_token")]
    pub vp_token: IdTokenVpToken,
    pub nonce: String,
    pub exp: i64,
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
}

impl VpTokenClaims {
    fn new(vp: Presentation, holder: &str, request: &RequestObject) -> Self {
        let iat = now();
        Self {
            vp,
            nonce: request.nonce.clone(),
            exp: iat + TOKEN_LIFETIME_SECS,
            iss: holder.to_string(),
            aud: request.client_id.clone(),
            nbf: iat,
            iat,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

impl IdTokenClaims {
    fn new(
        submission: Option<PresentationSubmission>,
        holder: &str,
        request: &RequestObject,
    ) -> Self {
        let iat = now();
        Self {
            vp_token: IdTokenVpToken {
                presentation_submission: submission,
            },
            nonce: request.nonce.clone(),
            exp: iat + TOKEN_LIFETIME_SECS,
            iss: SELF_ISSUED_V2.to_string(),
            sub: holder.to_string(),
            aud: request.client_id.clone(),
            nbf: iat,
            iat,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// The form posted to the verifier's redirect URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedResponse {
    pub id_token: String,
    /// A single JWS, or a JSON array of JWS strings when several holders
    /// present.
    pub vp_token: String,
    pub state: String,
}

impl AuthorizedResponse {
    pub fn to_form(&self) -> Result<String> {
        serde_urlencoded::to_string(self).context("unable to encode authorized response")
    }
}

struct HolderKey {
    did: String,
    vm: VerificationMethod,
}

impl HolderKey {
    async fn resolve(resolver: &dyn DidResolver, did: &str) -> Result<Self> {
        let vm = resolve_signing_method(resolver, did)
            .await
            .context("failed to resolve holder DID for signing")?;
        Ok(Self {
            did: did.to_string(),
            vm,
        })
    }

    async fn sign(&self, crypto: &dyn Crypto, claims: &(impl Serialize + Sync)) -> Result<String> {
        JwsSigner::new(crypto, &self.vm)
            .with_context(|| {
                format!(
                    "unsupported verification method type '{}'",
                    self.vm.key_type
                )
            })?
            .sign("JWT", claims)
            .await
    }
}

/// Build the signed tokens answering `request` with `credentials`.
pub(crate) async fn create_authorized_response(
    credentials: &[Credential],
    request: &RequestObject,
    resolver: &dyn DidResolver,
    crypto: &dyn Crypto,
    policy: IdTokenSignerPolicy,
) -> Result<AuthorizedResponse> {
    let definition = request
        .presentation_definition()
        .context("request object carries no presentation definition")?;

    match credentials {
        [] => bail!("expected at least one credential to present to verifier"),
        [credential] => {
            let mut presentation = definition.create_vp(credentials)?;
            let holder = credential
                .subject_id()
                .context("presentation VC does not have a subject ID")?;
            let key = HolderKey::resolve(resolver, holder).await?;

            let submission = presentation.take_presentation_submission();
            let id_token = key
                .sign(crypto, &IdTokenClaims::new(submission, holder, request))
                .await
                .context("sign id_token")?;

            let presentation = presentation.set_holder(holder.to_string());
            let vp_token = key
                .sign(crypto, &VpTokenClaims::new(presentation, holder, request))
                .await
                .context("sign vp_token")?;

            Ok(AuthorizedResponse {
                id_token,
                vp_token,
                state: request.state.clone(),
            })
        }
        _ => {
            let (presentations, submission) = definition.create_vp_array(credentials)?;

            let mut keys: Vec<HolderKey> = Vec::new();
            let mut vp_tokens = Vec::with_capacity(presentations.len());
            for presentation in presentations {
                let holder = presentation
                    .credentials()
                    .first()
                    .and_then(Credential::subject_id)
                    .context("VC does not have a subject ID")?
                    .to_string();
                let key = HolderKey::resolve(resolver, &holder).await?;

                let claims =
                    VpTokenClaims::new(presentation.set_holder(holder.clone()), &holder, request);
                vp_tokens.push(key.sign(crypto, &claims).await.context("sign vp_token")?);
                keys.push(key);
            }

            if keys.is_empty() {
                bail!("no presentation was created for the given credentials");
            }
            let index = match policy {
                IdTokenSignerPolicy::FirstHolder => 0,
                IdTokenSignerPolicy::Random => rand::thread_rng().gen_range(0..keys.len()),
            };
            let key = &keys[index];

            tracing::debug!(
                "{} holder(s) presenting, id_token signed by {}",
                keys.len(),
                key.did
            );

            let id_token = key
                .sign(
                    crypto,
                    &IdTokenClaims::new(Some(submission), &key.did, request),
                )
                .await
                .context("sign id_token")?;

            Ok(AuthorizedResponse {
                id_token,
                vp_token: serde_json::to_string(&vp_tokens)
                    .context("unable to serialize vp_token list")?,
                state: request.state.clone(),
            })
        }
    }
}
