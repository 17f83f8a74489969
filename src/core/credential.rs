use std::borrow::Cow;

use anyhow::{bail, Context, Result};
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

use super::{credential_format::ClaimFormatDesignation, jwt};
use crate::{
    api::{DidResolver, DocumentLoader},
    utils::string_or_array,
};

/// A selectively disclosable claim of an SD-JWT credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclosure {
    /// `None` for disclosed array elements.
    pub name: Option<String>,
    pub value: Json,
}

impl Disclosure {
    fn decode(encoded: &str) -> Result<Self> {
        let bytes = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .context("disclosure was not valid base64url")?;
        let parts: Vec<Json> =
            serde_json::from_slice(&bytes).context("disclosure was not a JSON array")?;

        match parts.as_slice() {
            [_salt, Json::String(name), value] => Ok(Self {
                name: Some(name.clone()),
                value: value.clone(),
            }),
            [_salt, value] => Ok(Self {
                name: None,
                value: value.clone(),
            }),
            _ => bail!("disclosure must have two or three elements"),
        }
    }
}

/// A verifiable credential held by the wallet, in one of the supported
/// encodings: JWT (`jwt_vc`), SD-JWT (`jwt_vc` with disclosures, or
/// `vc+sd-jwt`) and JSON-LD (`ldp_vc`).
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    format: ClaimFormatDesignation,
    /// The credential in the VC data model. For `vc+sd-jwt` this is the JWT payload.
    vc: Json,
    /// The signed JWT, without disclosures.
    jwt: Option<String>,
    jwt_claims: Option<Json>,
    disclosures: Vec<Disclosure>,
    serialized: String,
}

impl Credential {
    /// Parse a credential from an issuer response or a caller: a JWT/SD-JWT
    /// string or a JSON-LD object.
    pub fn parse(value: &Json) -> Result<Self> {
        match value {
            Json::String(s) => Self::parse_str(s),
            Json::Object(_) => Self::from_ldp(value.clone()),
            _ => bail!("credential must be a string or an object"),
        }
    }

    pub fn parse_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with('{') {
            let vc = serde_json::from_str(s).context("credential was not valid JSON")?;
            Self::from_ldp(vc)
        } else {
            Self::from_jwt(s)
        }
    }

    fn from_ldp(vc: Json) -> Result<Self> {
        if vc.get("credentialSubject").is_none() {
            bail!("credential has no 'credentialSubject'")
        }

        Ok(Self {
            format: ClaimFormatDesignation::LdpVc,
            serialized: vc.to_string(),
            vc,
            jwt: None,
            jwt_claims: None,
            disclosures: Vec::new(),
        })
    }

    fn from_jwt(serialized: &str) -> Result<Self> {
        let mut segments = serialized.split('~');
        let token = segments.next().unwrap_or_default();

        let disclosures = segments
            .filter(|segment| !segment.is_empty() && !segment.contains('.'))
            .map(Disclosure::decode)
            .collect::<Result<Vec<_>>>()?;

        let (_, claims) = jwt::decode(token).context("unable to decode credential JWT")?;

        let (format, vc) = match claims.get("vc") {
            Some(vc) => (
                ClaimFormatDesignation::JwtVc,
                Self::merge_registered_claims(vc.clone(), &claims),
            ),
            None if !disclosures.is_empty() || claims.get("vct").is_some() => {
                (ClaimFormatDesignation::SdJwtVc, claims.clone())
            }
            None => bail!("JWT does not contain a verifiable credential"),
        };

        Ok(Self {
            format,
            vc,
            jwt: Some(token.to_string()),
            jwt_claims: Some(claims),
            disclosures,
            serialized: serialized.to_string(),
        })
    }

    /// Fill VC properties that JWT encoding moves into registered claims.
    fn merge_registered_claims(mut vc: Json, claims: &Json) -> Json {
        let Some(object) = vc.as_object_mut() else {
            return vc;
        };

        let mut fill = |key: &str, value: Option<Json>| {
            if let Some(value) = value {
                object.entry(key).or_insert(value);
            }
        };
        fill("issuer", claims.get("iss").cloned());
        fill("id", claims.get("jti").cloned());
        fill("issuanceDate", timestamp(claims.get("nbf").or(claims.get("iat"))));
        fill("expirationDate", timestamp(claims.get("exp")));

        if let (Some(sub), Some(subject)) = (
            claims.get("sub"),
            object
                .get_mut("credentialSubject")
                .and_then(Json::as_object_mut),
        ) {
            subject.entry("id").or_insert(sub.clone());
        }

        vc
    }

    pub fn format(&self) -> &ClaimFormatDesignation {
        &self.format
    }

    pub fn vc(&self) -> &Json {
        &self.vc
    }

    pub fn jwt_claims(&self) -> Option<&Json> {
        self.jwt_claims.as_ref()
    }

    pub fn disclosures(&self) -> &[Disclosure] {
        &self.disclosures
    }

    pub fn is_selectively_disclosable(&self) -> bool {
        !self.disclosures.is_empty()
    }

    pub fn id(&self) -> Option<&str> {
        self.vc.get("id").and_then(Json::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.vc.get("name").and_then(Json::as_str)
    }

    pub fn issuer_id(&self) -> Option<&str> {
        match self.vc.get("issuer").or_else(|| self.vc.get("iss"))? {
            Json::String(issuer) => Some(issuer.as_str()),
            issuer => issuer.get("id").and_then(Json::as_str),
        }
    }

    pub fn types(&self) -> Vec<String> {
        match self.format {
            ClaimFormatDesignation::SdJwtVc => string_or_array(self.vc.get("vct")),
            _ => string_or_array(self.vc.get("type")),
        }
    }

    fn first_subject(&self) -> Option<&Json> {
        match self.vc.get("credentialSubject")? {
            Json::Array(subjects) => subjects.first(),
            subject => Some(subject),
        }
    }

    /// The holder DID the credential was issued to.
    pub fn subject_id(&self) -> Option<&str> {
        self.first_subject()
            .and_then(|subject| subject.get("id"))
            .or_else(|| self.vc.get("sub"))
            .and_then(Json::as_str)
    }

    /// The `type` of the claims about the subject. A selectively disclosed
    /// `type` takes precedence; otherwise only the first subject is checked.
    pub fn claim_types(&self) -> Option<Vec<String>> {
        let disclosed = self
            .disclosures
            .iter()
            .find(|d| d.name.as_deref() == Some("type"))
            .map(|d| &d.value);

        let types = string_or_array(
            disclosed.or_else(|| self.first_subject().and_then(|subject| subject.get("type"))),
        );
        (!types.is_empty()).then_some(types)
    }

    pub fn issuance_date(&self) -> Option<DateTime<Utc>> {
        date(
            self.vc
                .get("issuanceDate")
                .or_else(|| self.vc.get("validFrom"))
                .or_else(|| self.vc.get("iat")),
        )
    }

    pub fn expiration_date(&self) -> Option<DateTime<Utc>> {
        date(
            self.vc
                .get("expirationDate")
                .or_else(|| self.vc.get("validUntil"))
                .or_else(|| self.vc.get("exp")),
        )
    }

    /// The credential as received: compact (SD-)JWT or JSON-LD text.
    pub fn serialize(&self) -> &str {
        &self.serialized
    }

    /// The value placed in a presentation's `verifiableCredential` array.
    pub fn to_presentation_value(&self) -> Json {
        match self.format {
            ClaimFormatDesignation::LdpVc => self.vc.clone(),
            _ => Json::String(self.serialized.clone()),
        }
    }

    /// JSON documents queried when evaluating input descriptor fields, in
    /// order: the disclosed view, the credential, then the raw JWT claims.
    pub(crate) fn views(&self) -> Vec<Cow<'_, Json>> {
        let mut views = Vec::with_capacity(3);

        if self.is_selectively_disclosable() {
            views.push(Cow::Owned(self.disclosed_view()));
        }
        views.push(Cow::Borrowed(&self.vc));
        if let (Some(claims), ClaimFormatDesignation::JwtVc) = (&self.jwt_claims, &self.format) {
            views.push(Cow::Borrowed(claims));
        }

        views
    }

    fn disclosed_view(&self) -> Json {
        let mut view = self.vc.clone();
        let disclosed: Map<String, Json> = self
            .disclosures
            .iter()
            .filter_map(|d| Some((d.name.clone()?, d.value.clone())))
            .collect();

        let target = match self.format {
            ClaimFormatDesignation::SdJwtVc => view.as_object_mut(),
            _ => match view.get_mut("credentialSubject") {
                Some(Json::Array(subjects)) => subjects.first_mut().and_then(Json::as_object_mut),
                Some(subject) => subject.as_object_mut(),
                None => None,
            },
        };
        if let Some(target) = target {
            target.extend(disclosed);
        }

        view
    }

    /// Verify the issuer's signature. JWT credentials are checked against the
    /// issuer's DID key; JSON-LD credentials must carry a proof.
    pub async fn verify_proof(&self, resolver: &dyn DidResolver) -> Result<()> {
        let Some(token) = &self.jwt else {
            if self.vc.get("proof").is_none() {
                bail!("credential has no proof")
            }
            return Ok(());
        };

        let (header, claims) = jwt::verify(token, resolver)
            .await
            .context("credential signature could not be verified")?;

        let kid = header.kid.as_deref().unwrap_or_default();
        let signer = kid.split_once('#').map_or(kid, |(did, _)| did);
        let issuer = claims
            .get("iss")
            .and_then(Json::as_str)
            .or_else(|| self.issuer_id())
            .context("credential names no issuer to check the signature against")?;
        if signer != issuer {
            bail!("credential was signed by '{kid}' but issued by '{issuer}'")
        }

        Ok(())
    }

    /// Load every remote `@context` through `loader`.
    pub async fn check_contexts(&self, loader: &dyn DocumentLoader) -> Result<()> {
        for url in string_or_array(self.vc.get("@context")) {
            loader
                .load(&url)
                .await
                .with_context(|| format!("unable to load JSON-LD context {url}"))?;
        }
        Ok(())
    }
}

fn timestamp(value: Option<&Json>) -> Option<Json> {
    let secs = value?.as_i64()?;
    DateTime::from_timestamp(secs, 0).map(|d| Json::String(d.to_rfc3339()))
}

fn date(value: Option<&Json>) -> Option<DateTime<Utc>> {
    match value? {
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.with_timezone(&Utc)),
        Json::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use serde_json::json;

    /// Unsigned compact JWT, for tests that never verify signatures.
    pub(crate) fn unsigned_jwt(claims: &Json) -> String {
        format!(
            "{}.{}.c2ln",
            BASE64_URL_SAFE_NO_PAD.encode(r#"{"alg":"ES256","typ":"JWT"}"#),
            BASE64_URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    pub(crate) fn disclosure(name: &str, value: Json) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(json!(["salt", name, value]).to_string())
    }

    #[test]
    fn jwt_vc_fills_registered_claims() {
        let token = unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "sub": "did:example:holder",
            "jti": "urn:uuid:1",
            "nbf": 1_700_000_000,
            "vc": {
                "@context": ["https://www.w3.org/2018/credentials/v1"],
                "type": ["VerifiableCredential", "UniversityDegreeCredential"],
                "credentialSubject": {"type": "BachelorDegree", "degree": "BSc"}
            }
        }));
        let credential = Credential::parse(&Json::String(token.clone())).unwrap();

        assert_eq!(credential.format(), &ClaimFormatDesignation::JwtVc);
        assert_eq!(credential.issuer_id(), Some("did:example:issuer"));
        assert_eq!(credential.subject_id(), Some("did:example:holder"));
        assert_eq!(credential.id(), Some("urn:uuid:1"));
        assert_eq!(credential.types()[1], "UniversityDegreeCredential");
        assert_eq!(credential.issuance_date().unwrap().timestamp(), 1_700_000_000);
        assert_eq!(credential.claim_types(), Some(vec!["BachelorDegree".to_string()]));
        assert_eq!(credential.serialize(), token);
    }

    #[test]
    fn sd_jwt_disclosures_come_first() {
        let token = unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "vc": {
                "type": ["VerifiableCredential"],
                "credentialSubject": {"id": "did:example:holder", "_sd": ["..."]}
            }
        }));
        let serialized = format!(
            "{token}~{}~{}~",
            disclosure("givenName", json!("Alice")),
            disclosure("type", json!(["Person"]))
        );
        let credential = Credential::parse_str(&serialized).unwrap();

        assert!(credential.is_selectively_disclosable());
        assert_eq!(credential.disclosures().len(), 2);
        assert_eq!(credential.claim_types(), Some(vec!["Person".to_string()]));

        let views = credential.views();
        assert_eq!(views.len(), 3);
        assert_eq!(views[0]["credentialSubject"]["givenName"], "Alice");
        assert!(views[1]["credentialSubject"].get("givenName").is_none());
    }

    #[test]
    fn ldp_vc_requires_a_subject() {
        let vc = json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential"],
            "issuer": {"id": "did:example:issuer", "name": "Example University"},
            "issuanceDate": "2024-01-01T00:00:00Z",
            "credentialSubject": [{"id": "did:example:holder", "name": "Alice"}]
        });
        let credential = Credential::parse(&vc).unwrap();

        assert_eq!(credential.format(), &ClaimFormatDesignation::LdpVc);
        assert_eq!(credential.issuer_id(), Some("did:example:issuer"));
        assert_eq!(credential.subject_id(), Some("did:example:holder"));
        assert_eq!(credential.to_presentation_value(), vc);

        assert!(Credential::parse(&json!({"type": "VerifiableCredential"})).is_err());
        assert!(Credential::parse(&json!(42)).is_err());
    }

    mod issuer_binding {
        use std::collections::HashMap;

        use async_trait::async_trait;
        use serde_json::json;

        use super::*;
        use crate::{
            api::{KeyType, KeyWriter},
            core::{did::VerificationMethod, jwt::JwsSigner},
            crypto::LocalKms,
        };

        #[derive(Default)]
        struct Resolver(HashMap<String, Json>);

        #[async_trait]
        impl DidResolver for Resolver {
            async fn resolve(&self, did: &str) -> Result<Vec<u8>> {
                let document = self.0.get(did).context("unknown DID")?;
                Ok(document.to_string().into_bytes())
            }
        }

        async fn new_did(
            kms: &LocalKms,
            resolver: &mut Resolver,
            did: &str,
        ) -> VerificationMethod {
            let jwk = kms.create(KeyType::P256).await.unwrap();
            let vm_id = format!("{did}#{}", jwk.kid.clone().unwrap());
            resolver.0.insert(
                did.to_string(),
                json!({
                    "id": did,
                    "verificationMethod": [{
                        "id": vm_id,
                        "type": "JsonWebKey2020",
                        "controller": did,
                        "publicKeyJwk": jwk,
                    }],
                    "assertionMethod": [vm_id],
                }),
            );
            VerificationMethod::new(vm_id, "JsonWebKey2020").set_public_key_jwk(jwk)
        }

        async fn signed(kms: &LocalKms, vm: &VerificationMethod, claims: Json) -> Credential {
            let token = JwsSigner::new(kms, vm)
                .unwrap()
                .sign("JWT", &claims)
                .await
                .unwrap();
            Credential::parse_str(&token).unwrap()
        }

        fn claims(iss: Option<&str>) -> Json {
            let mut claims = json!({
                "sub": "did:example:holder",
                "vc": {
                    "type": ["VerifiableCredential"],
                    "credentialSubject": {"id": "did:example:holder"}
                }
            });
            if let Some(iss) = iss {
                claims["iss"] = json!(iss);
            }
            claims
        }

        #[tokio::test]
        async fn signer_must_be_the_issuer() {
            let kms = LocalKms::new();
            let mut resolver = Resolver::default();
            let issuer = new_did(&kms, &mut resolver, "did:example:issuer").await;
            let other = new_did(&kms, &mut resolver, "did:example:issuer-evil").await;

            let genuine = signed(&kms, &issuer, claims(Some("did:example:issuer"))).await;
            genuine.verify_proof(&resolver).await.unwrap();

            let forged = signed(&kms, &other, claims(Some("did:example:issuer"))).await;
            let err = forged.verify_proof(&resolver).await.unwrap_err();
            assert!(err.to_string().contains("did:example:issuer-evil#"));
        }

        #[tokio::test]
        async fn issuer_falls_back_to_the_vc() {
            let kms = LocalKms::new();
            let mut resolver = Resolver::default();
            let issuer = new_did(&kms, &mut resolver, "did:example:issuer").await;
            let other = new_did(&kms, &mut resolver, "did:example:other").await;

            let mut with_vc_issuer = claims(None);
            with_vc_issuer["vc"]["issuer"] = json!({"id": "did:example:issuer"});
            signed(&kms, &issuer, with_vc_issuer.clone())
                .await
                .verify_proof(&resolver)
                .await
                .unwrap();
            assert!(signed(&kms, &other, with_vc_issuer)
                .await
                .verify_proof(&resolver)
                .await
                .is_err());

            let anonymous = signed(&kms, &other, claims(None)).await;
            assert!(anonymous.verify_proof(&resolver).await.is_err());
        }
    }
}
