use super::{credential::Credential, credential_format::*};
use crate::utils::NonEmptyVec;

use anyhow::{anyhow, Context, Result};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A GroupId represents a unique identifier for a group of Input Descriptors.
///
/// This type is also used by the submission requirements to group input descriptors.
pub type GroupId = String;

/// A JSONPath is a string that represents a path to a specific value within a JSON object.
///
/// For syntax details, see [https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#jsonpath-syntax-definition)
pub type JsonPath = String;

/// Input Descriptors are objects used to describe the information a
/// [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// All Input Descriptors MUST be satisfied, unless otherwise specified by a
/// [Feature](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:feature).
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    group: Vec<GroupId>,
}

impl InputDescriptor {
    /// Create a new instance of the input descriptor with the given id and constraints.
    ///
    /// The Input Descriptor Object MUST contain an id property. The value of the id
    /// property MUST be a string that does not conflict with the id of another
    /// Input Descriptor Object in the same Presentation Definition.
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    /// Return the id of the input descriptor.
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Return the constraints of the input descriptor.
    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// If present, the purpose MUST be a string that describes the purpose for which the
    /// [Claim](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:claim)'s
    /// data is being requested.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Set the format of the input descriptor.
    ///
    /// This format property is identical in value signature to the top-level format object,
    /// but can be used to specifically constrain submission of a single input to a subset of formats or algorithms.
    pub fn set_format(mut self, format: ClaimFormatMap) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }

    pub fn groups(&self) -> &Vec<GroupId> {
        self.group.as_ref()
    }

    /// Check that every field path parses and every filter compiles.
    pub fn validate(&self) -> Result<()> {
        for field in self.constraints.fields() {
            field
                .compile()
                .with_context(|| format!("input descriptor '{}' is invalid", self.id))?;
        }
        Ok(())
    }

    /// Evaluate the descriptor against one candidate credential.
    ///
    /// `definition_format` is the presentation definition's format map, which
    /// applies when the descriptor has none of its own.
    pub fn is_satisfied_by(
        &self,
        credential: &Credential,
        definition_format: Option<&ClaimFormatMap>,
    ) -> Result<bool> {
        let formats = if self.format.is_empty() {
            definition_format
        } else {
            Some(&self.format)
        };
        if let Some(formats) = formats.filter(|f| !f.is_empty()) {
            if !formats.keys().any(|f| f.admits(credential.format())) {
                tracing::debug!(
                    "{}: format {} not accepted by input descriptor",
                    self.id,
                    credential.format()
                );
                return Ok(false);
            }
        }

        if let Some(ConstraintsLimitDisclosure::Required) = self.constraints.limit_disclosure {
            if !credential.is_selectively_disclosable() {
                return Ok(false);
            }
        }

        let views = credential.views();

        for field in self.constraints.fields().iter().filter(|f| f.is_required()) {
            let (paths, validator) = field.compile()?;

            let satisfied = views.iter().any(|view| {
                paths
                    .iter()
                    .flat_map(|path| path.query(view).all())
                    .any(|value| validator.as_ref().map_or(true, |v| v.is_valid(value)))
            });

            if !satisfied {
                tracing::debug!("{}: field {:?} not satisfied", self.id, field.path());
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Constraints are objects used to describe the constraints that a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder) must satisfy to fulfill an Input Descriptor.
///
/// A constraint object MAY be empty, or it may include a `fields` and/or `limit_disclosure` property.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    /// Returns an empty Constraints object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new field constraint to the constraints list.
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &Vec<ConstraintsField> {
        self.fields.as_ref()
    }

    /// Set the limit disclosure value.
    ///
    /// When `required`, only credentials able to disclose a subset of their
    /// claims (SD-JWT) can satisfy the descriptor.
    pub fn set_limit_disclosure(mut self, limit_disclosure: ConstraintsLimitDisclosure) -> Self {
        self.limit_disclosure = Some(limit_disclosure);
        self
    }

    pub fn limit_disclosure(&self) -> Option<&ConstraintsLimitDisclosure> {
        self.limit_disclosure.as_ref()
    }

    /// Returns if the constraints fields contain non-optional
    /// fields that must be satisfied.
    pub fn is_required(&self) -> bool {
        self.fields.iter().any(|field| field.is_required())
    }
}

/// ConstraintsField objects are used to describe the constraints that a
/// [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)
/// must satisfy to fulfill an Input Descriptor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<JsonPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
    #[serde(default)]
    intent_to_retain: bool,
}

pub type ConstraintsFields = Vec<ConstraintsField>;

impl From<NonEmptyVec<JsonPath>> for ConstraintsField {
    fn from(path: NonEmptyVec<JsonPath>) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }
}

impl ConstraintsField {
    /// Create a new instance of the constraints field with the given path.
    ///
    /// Constraint fields must have at least one JSONPath to the field for which the constraint is applied.
    pub fn new(path: JsonPath) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path),
            ..Default::default()
        }
    }

    pub fn add_path(mut self, path: JsonPath) -> Self {
        self.path.push(path);
        self
    }

    /// `path` is a non empty list of [JsonPath](https://goessner.net/articles/JsonPath/) expressions.
    pub fn path(&self) -> &NonEmptyVec<JsonPath> {
        &self.path
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Set the filter of the constraints field.
    ///
    /// If present its value MUST be a JSON Schema descriptor used to filter against
    /// the values returned from evaluation of the JSONPath string expressions in the path array.
    pub fn set_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter(&self) -> Option<&Json> {
        self.filter.as_ref()
    }

    /// Parse the paths and compile the filter, if any.
    fn compile(&self) -> Result<(Vec<serde_json_path::JsonPath>, Option<JSONSchema>)> {
        let paths = self
            .path
            .iter()
            .map(|path| {
                serde_json_path::JsonPath::parse(path)
                    .map_err(|e| anyhow!("invalid JSONPath '{path}': {e}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let validator = self
            .filter
            .as_ref()
            .map(|filter| JSONSchema::compile(filter).map_err(|e| anyhow!("invalid filter: {e}")))
            .transpose()?;

        Ok((paths, validator))
    }

    /// Set the optional value of the constraints field.
    ///
    /// The value of this property MUST be a boolean, wherein true indicates the
    /// field is optional, and false or non-presence of the property indicates the
    /// field is required.
    pub fn set_optional(mut self, optional: bool) -> Self {
        self.optional = Some(optional);
        self
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    /// Inverse alias for `!is_optional()`.
    pub fn is_required(&self) -> bool {
        !self.is_optional()
    }

    pub fn intent_to_retain(&self) -> bool {
        self.intent_to_retain
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::credential::test::{disclosure, unsigned_jwt};
    use serde_json::json;

    fn degree_credential() -> Credential {
        Credential::parse(&json!({
            "@context": ["https://www.w3.org/2018/credentials/v1"],
            "type": ["VerifiableCredential", "UniversityDegreeCredential"],
            "issuer": "did:example:issuer",
            "credentialSubject": {"id": "did:example:holder", "degree": {"type": "BachelorDegree"}}
        }))
        .unwrap()
    }

    fn type_descriptor() -> InputDescriptor {
        InputDescriptor::new(
            "degree".into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.type".into())
                    .set_filter(json!({"type": "array", "contains": {"const": "UniversityDegreeCredential"}})),
            ),
        )
    }

    #[test]
    fn field_filter_matches() {
        assert!(type_descriptor()
            .is_satisfied_by(&degree_credential(), None)
            .unwrap());

        let other = InputDescriptor::new(
            "drivers_license".into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.type".into())
                    .set_filter(json!({"type": "array", "contains": {"const": "DriversLicense"}})),
            ),
        );
        assert!(!other.is_satisfied_by(&degree_credential(), None).unwrap());
    }

    #[test]
    fn any_path_may_match_and_optional_fields_are_skipped() {
        let descriptor = InputDescriptor::new(
            "degree".into(),
            Constraints::new()
                .add_constraint(
                    ConstraintsField::new("$.vc.credentialSubject.degree.type".into())
                        .add_path("$.credentialSubject.degree.type".into()),
                )
                .add_constraint(ConstraintsField::new("$.credentialSubject.gpa".into()).set_optional(true)),
        );
        assert!(descriptor.is_satisfied_by(&degree_credential(), None).unwrap());
    }

    #[test]
    fn format_must_be_admitted() {
        let descriptor = type_descriptor().set_format(
            [(ClaimFormatDesignation::JwtVcJson, ClaimFormatPayload::Alg(vec!["ES256".into()]))]
                .into_iter()
                .collect(),
        );
        assert!(!descriptor.is_satisfied_by(&degree_credential(), None).unwrap());
    }

    #[test]
    fn limit_disclosure_requires_disclosures() {
        let descriptor = InputDescriptor::new(
            "name".into(),
            Constraints::new()
                .add_constraint(ConstraintsField::new("$.credentialSubject.givenName".into()))
                .set_limit_disclosure(ConstraintsLimitDisclosure::Required),
        );
        assert!(!descriptor.is_satisfied_by(&degree_credential(), None).unwrap());

        let token = unsigned_jwt(&json!({
            "vc": {"type": ["VerifiableCredential"], "credentialSubject": {"id": "did:example:holder"}}
        }));
        let sd = Credential::parse_str(&format!("{token}~{}~", disclosure("givenName", json!("Alice"))))
            .unwrap();
        assert!(descriptor.is_satisfied_by(&sd, None).unwrap());
    }

    #[test]
    fn invalid_path_is_reported() {
        let descriptor = InputDescriptor::new(
            "broken".into(),
            Constraints::new().add_constraint(ConstraintsField::new("$[".into())),
        );
        assert!(descriptor.validate().is_err());
        assert!(descriptor.is_satisfied_by(&degree_credential(), None).is_err());
    }
}
