//! Typed errors returned by the public API.
//!
//! Every failure surfaced to a caller carries an [ErrorKind] with a stable,
//! machine-readable code and a module-scoped identifier, plus the full
//! [anyhow] cause chain. Displayed as `CODE(ID):cause: inner cause`.

use crate::{core::did::DidResolutionFailure, metrics::MetricsLogFailure};

/// Whether an error was caused by the caller's input or by a step that failed
/// while executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Validation,
    Execution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required argument was missing or empty.
    InvalidArgument,
    InvalidIssuanceUri,
    InvalidCredentialOffer,
    CredentialOfferFetchFailed,
    IssuerMetadataFetchFailed,
    IssuerOpenIdConfigFetchFailed,
    UnsupportedGrantType,
    PinRequired,
    /// A step was invoked out of order.
    InvalidSdkUsage,
    InvalidRedirectUri,
    TokenFetchFailed,
    UnsupportedAlgorithm,
    JwtSigningFailed,
    CredentialFetchFailed,
    CredentialParseFailed,
    CredentialProofCheckFailed,
    DidResolutionFailed,
    RequestObjectFetchFailed,
    VerifyAuthorizationRequestFailed,
    NotInitializedProperly,
    CreateAuthorizedResponseFailed,
    SendAuthorizedResponseFailed,
    InvalidQuery,
    NoCredentialsSatisfyQuery,
    CredentialReaderFailed,
    LoggingFailed,
}

impl ErrorKind {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidIssuanceUri => "INVALID_ISSUANCE_URI",
            Self::InvalidCredentialOffer => "INVALID_CREDENTIAL_OFFER",
            Self::CredentialOfferFetchFailed => "CREDENTIAL_OFFER_FETCH_FAILED",
            Self::IssuerMetadataFetchFailed => "METADATA_FETCH_FAILED",
            Self::IssuerOpenIdConfigFetchFailed => "ISSUER_OPENID_FETCH_FAILED",
            Self::UnsupportedGrantType => "UNSUPPORTED_GRANT_TYPE",
            Self::PinRequired => "PIN_REQUIRED",
            Self::InvalidSdkUsage => "INVALID_SDK_USAGE",
            Self::InvalidRedirectUri => "INVALID_REDIRECT_URI",
            Self::TokenFetchFailed => "TOKEN_FETCH_FAILED",
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::JwtSigningFailed => "JWT_SIGNING_FAILED",
            Self::CredentialFetchFailed => "CREDENTIAL_FETCH_FAILED",
            Self::CredentialParseFailed => "CREDENTIAL_PARSE_FAILED",
            Self::CredentialProofCheckFailed => "CREDENTIAL_PROOF_CHECK_FAILED",
            Self::DidResolutionFailed => "DID_RESOLUTION_FAILED",
            Self::RequestObjectFetchFailed => "REQUEST_OBJECT_FETCH_FAILED",
            Self::VerifyAuthorizationRequestFailed => "VERIFY_AUTHORIZATION_REQUEST_FAILED",
            Self::NotInitializedProperly => "NOT_INITIALIZED_PROPERLY",
            Self::CreateAuthorizedResponseFailed => "CREATE_AUTHORIZED_RESPONSE",
            Self::SendAuthorizedResponseFailed => "SEND_AUTHORIZED_RESPONSE",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::NoCredentialsSatisfyQuery => "NO_CREDENTIAL_SATISFY_REQUIREMENTS",
            Self::CredentialReaderFailed => "CREDENTIAL_READER_FAILED",
            Self::LoggingFailed => "LOGGING_FAILED",
        }
    }

    /// Module-scoped identifier: `OCI1` for issuance, `OVP1` for
    /// presentation, `CRQ0` for credential queries and `GEN0` for the rest.
    pub fn id(&self) -> &'static str {
        match self {
            Self::InvalidIssuanceUri => "OCI1-0000",
            Self::InvalidCredentialOffer => "OCI1-0001",
            Self::CredentialOfferFetchFailed => "OCI1-0002",
            Self::UnsupportedGrantType => "OCI1-0003",
            Self::IssuerMetadataFetchFailed => "OCI1-0004",
            Self::TokenFetchFailed => "OCI1-0005",
            Self::IssuerOpenIdConfigFetchFailed => "OCI1-0006",
            Self::UnsupportedAlgorithm => "OCI1-0007",
            Self::JwtSigningFailed => "OCI1-0008",
            Self::CredentialFetchFailed => "OCI1-0009",
            Self::PinRequired => "OCI1-0010",
            Self::CredentialParseFailed => "OCI1-0011",
            Self::CredentialProofCheckFailed => "OCI1-0012",
            Self::InvalidSdkUsage => "OCI1-0013",
            Self::InvalidRedirectUri => "OCI1-0014",
            Self::RequestObjectFetchFailed => "OVP1-0000",
            Self::VerifyAuthorizationRequestFailed => "OVP1-0001",
            Self::CreateAuthorizedResponseFailed => "OVP1-0002",
            Self::SendAuthorizedResponseFailed => "OVP1-0003",
            Self::NotInitializedProperly => "OVP1-0004",
            Self::InvalidQuery => "CRQ0-0000",
            Self::NoCredentialsSatisfyQuery => "CRQ0-0001",
            Self::CredentialReaderFailed => "CRQ0-0002",
            Self::InvalidArgument => "GEN0-0000",
            Self::DidResolutionFailed => "GEN0-0001",
            Self::LoggingFailed => "GEN0-0002",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::InvalidArgument
            | Self::InvalidIssuanceUri
            | Self::InvalidCredentialOffer
            | Self::InvalidRedirectUri
            | Self::InvalidSdkUsage
            | Self::NotInitializedProperly
            | Self::PinRequired
            | Self::UnsupportedGrantType
            | Self::UnsupportedAlgorithm
            | Self::InvalidQuery => Category::Validation,
            _ => Category::Execution,
        }
    }
}

/// Error returned by every public operation of this crate.
#[derive(Debug, thiserror::Error)]
#[error("{}({}):{:#}", .kind.code(), .kind.id(), .cause)]
pub struct Error {
    kind: ErrorKind,
    cause: anyhow::Error,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn new(kind: ErrorKind, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            kind,
            cause: cause.into(),
        }
    }

    pub fn msg(kind: ErrorKind, message: impl std::fmt::Display) -> Self {
        Self::new(kind, anyhow::anyhow!("{message}"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    /// The underlying cause chain.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

/// Attach an [ErrorKind] to an internal [anyhow::Result].
///
/// Metrics logger failures keep [ErrorKind::LoggingFailed], and DID resolver
/// failures keep [ErrorKind::DidResolutionFailed], whatever step they surface
/// through.
pub trait WithKind<T> {
    fn with_kind(self, kind: ErrorKind) -> Result<T>;
}

impl<T> WithKind<T> for anyhow::Result<T> {
    fn with_kind(self, kind: ErrorKind) -> Result<T> {
        self.map_err(|e| {
            let kind = if e.downcast_ref::<MetricsLogFailure>().is_some() {
                ErrorKind::LoggingFailed
            } else if e.downcast_ref::<DidResolutionFailure>().is_some() {
                ErrorKind::DidResolutionFailed
            } else {
                kind
            };
            Error::new(kind, e)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::metrics::{MetricsEvent, MetricsLogger, Timer};
    use anyhow::Context;

    #[test]
    fn display_includes_code_id_and_chain() {
        let inner: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = inner
            .context("fetch openid configuration")
            .with_kind(ErrorKind::IssuerOpenIdConfigFetchFailed)
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "ISSUER_OPENID_FETCH_FAILED(OCI1-0006):fetch openid configuration: connection refused"
        );
        assert_eq!(err.category(), Category::Execution);
    }

    #[test]
    fn metrics_failures_keep_their_kind() {
        struct Refusing;

        impl MetricsLogger for Refusing {
            fn log(&self, _event: &MetricsEvent) -> anyhow::Result<()> {
                anyhow::bail!("disk full")
            }
        }

        let err = Timer::start("Fetch token", "Request credential")
            .finish(&Refusing)
            .context("failed to get token")
            .with_kind(ErrorKind::TokenFetchFailed)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoggingFailed);
        assert!(err.to_string().ends_with(
            "failed to get token: failed to log metrics event 'Fetch token': disk full"
        ));

        let err = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .with_kind(ErrorKind::TokenFetchFailed)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenFetchFailed);
    }

    #[test]
    fn pin_required_is_a_validation_error() {
        let err = Error::msg(ErrorKind::PinRequired, "PIN required");
        assert_eq!(err.code(), "PIN_REQUIRED");
        assert_eq!(err.category(), Category::Validation);
    }
}
