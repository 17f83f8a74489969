//! Protocol core of a credential wallet: [OID4VCI] issuance and [OID4VP]
//! presentation, with a [Presentation Exchange] credential matcher.
//!
//! [OID4VCI]: <https://openid.net/specs/openid-4-verifiable-credential-issuance-1_0.html>
//! [OID4VP]: <https://openid.net/specs/openid-4-verifiable-presentations-1_0.html>
//! [Presentation Exchange]: <https://identity.foundation/presentation-exchange/spec/v2.0.0/>
//!
//! # Issuance
//!
//! An issuance [`Interaction`](openid4ci::Interaction) is created from the
//! initiation URI the issuer hands out, and obtains credentials bound to one
//! of the holder's DID verification methods:
//!
//! ```ignore
//! use openid4vc_wallet::openid4ci::{Interaction, InteractionArgs, InteractionOpts, RequestCredentialOpts};
//!
//! let args = InteractionArgs::new(offer_uri, crypto.clone(), did_resolver.clone());
//! let mut interaction = Interaction::new(args, InteractionOpts::new()).await?;
//!
//! // Pre-authorized code grant.
//! let pin_required = interaction.pre_authorized_code_grant_params()?.pin_required();
//! let opts = if pin_required { RequestCredentialOpts::new().set_pin(pin) } else { RequestCredentialOpts::new() };
//! let credentials = interaction.request_credential_with_pre_auth(&verification_method, opts).await?;
//! ```
//!
//! With the authorization code grant, the wallet first builds the URL the user
//! must visit, then exchanges the code carried by the redirect:
//!
//! ```ignore
//! let url = interaction
//!     .create_authorization_url(client_id, redirect_uri, CreateAuthorizationUrlOpts::new())
//!     .await?;
//! // ... the user authorizes, the issuer redirects to `redirect_uri?code=...&state=...`
//! let credentials = interaction
//!     .request_credential_with_auth(&verification_method, &redirect_uri_with_code)
//!     .await?;
//! ```
//!
//! # Presentation
//!
//! A presentation [`Interaction`](openid4vp::Interaction) verifies the
//! verifier's signed request object, exposes its presentation definition,
//! and posts the signed answer:
//!
//! ```ignore
//! use openid4vc_wallet::credential::{CredentialsArg, Inquirer};
//! use openid4vc_wallet::openid4vp::{Interaction, Opts};
//!
//! let mut interaction = Interaction::new(authorization_request, crypto, did_resolver, Opts::new())?;
//! let definition = interaction.get_query().await?;
//!
//! let query = serde_json::to_vec(&definition)?;
//! let presentation = Inquirer::default()
//!     .query(&query, CredentialsArg::list(held_credentials))
//!     .await?;
//!
//! interaction.present_credential(presentation.credentials()).await?;
//! ```
//!
//! # Collaborators
//!
//! Key management, DID resolution, JSON-LD document loading, HTTP transport
//! and the activity/metrics sinks are supplied by the caller through the
//! traits in [api]. [crypto::LocalKms], [core::util::ReqwestClient] and the
//! in-memory loggers are usable defaults.

pub mod activity;
pub mod api;
pub mod config;
pub mod core;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod openid4ci;
pub mod openid4vp;
pub mod utils;
#[cfg(test)]
mod tests;

pub use error::{Error, ErrorKind, Result};
pub use serde_json_path::JsonPath;
