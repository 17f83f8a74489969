use super::credential::Credential;
use super::credential_format::*;
use super::input_descriptor::*;
use super::presentation::Presentation;
use super::presentation_submission::*;
use super::submission_requirement::*;

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// A presentation definition is a JSON object that describes the information a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires of a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// > Presentation Definitions are objects that articulate what proofs a [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) requires.
/// > These help the [Verifier](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:verifier) to decide how or whether to interact with a [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder).
///
/// Presentation Definitions are composed of inputs, which describe the forms and details of the
/// proofs they require, and optional sets of selection rules, to allow [Holder](https://identity.foundation/presentation-exchange/spec/v2.0.0/#term:holder)s flexibility
/// in cases where different types of proofs may satisfy an input requirement.
///
/// For more information, see: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition)
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<SubmissionRequirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ClaimFormatMap>,
}

/// Reasons a set of credentials cannot answer a presentation definition.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid presentation definition: {0:#}")]
    InvalidDefinition(anyhow::Error),

    #[error("no credentials satisfy input descriptor `{0}`")]
    UnmatchedDescriptor(String),

    #[error("submission requirement `{0}` is not satisfied")]
    UnsatisfiedRequirement(String),

    #[error("credential has no subject id to present as holder")]
    MissingHolder,
}

impl PresentationDefinition {
    /// The Presentation Definition MUST contain an id property. The value of this property MUST be a string.
    /// The string SHOULD provide a unique ID for the desired context.
    ///
    /// The Presentation Definition MUST contain an input_descriptors property. Its value MUST be an array of Input Descriptor Objects,
    /// the composition of which are found [InputDescriptor] type.
    ///
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Return the id of the presentation definition.
    pub fn id(&self) -> &String {
        &self.id
    }

    /// Add a new input descriptor to the presentation definition.
    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    /// Return the input descriptors of the presentation definition.
    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    pub fn add_submission_requirement(mut self, requirement: SubmissionRequirement) -> Self {
        self.submission_requirements
            .get_or_insert_with(Vec::new)
            .push(requirement);
        self
    }

    pub fn submission_requirements(&self) -> Option<&Vec<SubmissionRequirement>> {
        self.submission_requirements.as_ref()
    }

    /// Return the name of the presentation definition.
    pub fn name(&self) -> Option<&String> {
        self.name.as_ref()
    }

    /// Return the purpose of the presentation definition.
    pub fn purpose(&self) -> Option<&String> {
        self.purpose.as_ref()
    }

    /// Return the format of the presentation definition.
    pub fn format(&self) -> Option<&ClaimFormatMap> {
        self.format.as_ref()
    }

    /// Check the definition is well formed: unique descriptor ids, valid
    /// field paths and filters, and submission requirements whose groups exist.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_descriptors.is_empty() {
            bail!("presentation definition '{}' has no input descriptors", self.id)
        }

        let mut ids = HashSet::new();
        for descriptor in &self.input_descriptors {
            if !ids.insert(descriptor.id()) {
                bail!("duplicate input descriptor id '{}'", descriptor.id())
            }
            descriptor.validate()?;
        }

        fn check_groups(
            requirement: &SubmissionRequirement,
            groups: &HashSet<&GroupId>,
        ) -> anyhow::Result<()> {
            if let Some(group) = &requirement.from {
                if !groups.contains(group) {
                    bail!("submission requirement refers to unknown group '{group}'")
                }
            }
            requirement
                .from_nested
                .iter()
                .try_for_each(|nested| check_groups(nested, groups))
        }

        let groups: HashSet<&GroupId> = self
            .input_descriptors
            .iter()
            .flat_map(|descriptor| descriptor.groups())
            .collect();

        for requirement in self.submission_requirements.iter().flatten() {
            requirement.validate().context("invalid submission requirement")?;
            check_groups(requirement, &groups)?;
        }

        Ok(())
    }

    /// Resolve the submission requirements against `credentials`.
    ///
    /// Without declared submission requirements, a single `all` requirement
    /// over every input descriptor is returned. A descriptor nothing matches
    /// is reported with an empty match list rather than failing the call.
    pub fn match_submission_requirements(
        &self,
        credentials: &[Credential],
    ) -> Result<Vec<MatchedSubmissionRequirement>, MatchError> {
        self.validate().map_err(MatchError::InvalidDefinition)?;

        let matched = self
            .input_descriptors
            .iter()
            .map(|descriptor| self.match_descriptor(descriptor, credentials))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(MatchError::InvalidDefinition)?;

        let Some(requirements) = &self.submission_requirements else {
            return Ok(vec![MatchedSubmissionRequirement {
                name: self.name.clone(),
                purpose: self.purpose.clone(),
                rule: Rule::All,
                count: None,
                min: None,
                max: None,
                descriptors: matched,
                nested: Vec::new(),
            }]);
        };

        Ok(requirements
            .iter()
            .map(|requirement| self.resolve_requirement(requirement, &matched))
            .collect())
    }

    fn match_descriptor(
        &self,
        descriptor: &InputDescriptor,
        credentials: &[Credential],
    ) -> anyhow::Result<MatchedInputDescriptor> {
        let mut matched = Vec::new();
        for credential in credentials {
            if descriptor.is_satisfied_by(credential, self.format.as_ref())? {
                matched.push(credential.clone());
            }
        }

        tracing::debug!(
            "input descriptor '{}' matched {} of {} credentials",
            descriptor.id(),
            matched.len(),
            credentials.len()
        );

        Ok(MatchedInputDescriptor {
            id: descriptor.id().to_string(),
            name: descriptor.name().cloned(),
            purpose: descriptor.purpose().cloned(),
            required: descriptor.constraints().is_required(),
            matched,
        })
    }

    fn resolve_requirement(
        &self,
        requirement: &SubmissionRequirement,
        matched: &[MatchedInputDescriptor],
    ) -> MatchedSubmissionRequirement {
        let descriptors = match &requirement.from {
            Some(group) => self
                .input_descriptors
                .iter()
                .zip(matched)
                .filter(|(descriptor, _)| descriptor.groups().contains(group))
                .map(|(_, m)| m.clone())
                .collect(),
            None => Vec::new(),
        };

        MatchedSubmissionRequirement {
            name: requirement.name.clone(),
            purpose: requirement.purpose.clone(),
            rule: requirement.rule,
            count: requirement.count,
            min: requirement.min,
            max: requirement.max,
            descriptors,
            nested: requirement
                .from_nested
                .iter()
                .map(|nested| self.resolve_requirement(nested, matched))
                .collect(),
        }
    }

    /// Pairs of (input descriptor id, credential index) to submit, plus the
    /// indexes of the credentials used, in input order.
    fn submission_entries(
        &self,
        credentials: &[Credential],
    ) -> Result<(Vec<(String, usize)>, Vec<usize>), MatchError> {
        let requirements = self.match_submission_requirements(credentials)?;

        for requirement in &requirements {
            if requirement.is_satisfied() {
                continue;
            }
            if self.submission_requirements.is_none() {
                let unmatched = requirement
                    .descriptors
                    .iter()
                    .find(|d| d.required && !d.is_matched())
                    .map(|d| d.id.clone())
                    .unwrap_or_default();
                return Err(MatchError::UnmatchedDescriptor(unmatched));
            }
            return Err(MatchError::UnsatisfiedRequirement(
                requirement
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{:?}", requirement.rule).to_lowercase()),
            ));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for descriptor in requirements.iter().flat_map(|r| r.selected()) {
            if !seen.insert(descriptor.id.as_str()) {
                continue;
            }
            for credential in &descriptor.matched {
                if let Some(index) = credentials.iter().position(|c| c == credential) {
                    entries.push((descriptor.id.clone(), index));
                }
            }
        }

        let mut used: Vec<usize> = entries.iter().map(|(_, index)| *index).collect();
        used.sort_unstable();
        used.dedup();

        if used.is_empty() {
            return Err(MatchError::UnmatchedDescriptor(
                self.input_descriptors
                    .first()
                    .map(|d| d.id().to_string())
                    .unwrap_or_default(),
            ));
        }

        Ok((entries, used))
    }

    /// Build a single presentation of the matching credentials, with the
    /// presentation submission embedded.
    ///
    /// Descriptor map paths point into the presentation:
    /// `$.verifiableCredential[i]`.
    pub fn create_vp(&self, credentials: &[Credential]) -> Result<Presentation, MatchError> {
        let (entries, used) = self.submission_entries(credentials)?;

        let descriptor_map = entries
            .iter()
            .filter_map(|(id, index)| {
                let position = used.iter().position(|u| u == index)?;
                Some(DescriptorMap::new(
                    id.as_str(),
                    credentials[*index].format().clone(),
                    format!("$.verifiableCredential[{position}]"),
                ))
            })
            .collect();

        let selected = used.iter().map(|i| credentials[*i].clone()).collect();

        Ok(Presentation::new(
            selected,
            Some(PresentationSubmission::new(self.id.as_str(), descriptor_map)),
        ))
    }

    /// Build one presentation per holder, in the order holders first appear
    /// among the matching credentials.
    ///
    /// The submission addresses the array of presentations: each entry's path
    /// is `$[i]` with the credential at `$.verifiableCredential[j]` nested
    /// under it.
    pub fn create_vp_array(
        &self,
        credentials: &[Credential],
    ) -> Result<(Vec<Presentation>, PresentationSubmission), MatchError> {
        let (entries, used) = self.submission_entries(credentials)?;

        let mut holders: Vec<&str> = Vec::new();
        // credential index -> (presentation index, position within it)
        let mut placement: HashMap<usize, (usize, usize)> = HashMap::new();
        let mut grouped: Vec<Vec<Credential>> = Vec::new();

        for index in used {
            let credential = &credentials[index];
            let holder = credential.subject_id().ok_or(MatchError::MissingHolder)?;

            let vp = match holders.iter().position(|h| *h == holder) {
                Some(vp) => vp,
                None => {
                    holders.push(holder);
                    grouped.push(Vec::new());
                    holders.len() - 1
                }
            };

            placement.insert(index, (vp, grouped[vp].len()));
            grouped[vp].push(credential.clone());
        }

        let descriptor_map = entries
            .iter()
            .filter_map(|(id, index)| {
                let (vp, position) = placement.get(index)?;
                let nested = DescriptorMap::new(
                    id.as_str(),
                    credentials[*index].format().clone(),
                    format!("$.verifiableCredential[{position}]"),
                );
                let outer =
                    DescriptorMap::new(id.as_str(), ClaimFormatDesignation::JwtVp, format!("$[{vp}]"));
                Some(outer.set_path_nested(nested))
            })
            .collect();

        let presentations = grouped
            .into_iter()
            .map(|credentials| Presentation::new(credentials, None))
            .collect();

        Ok((
            presentations,
            PresentationSubmission::new(self.id.as_str(), descriptor_map),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::credential::test::unsigned_jwt;
    use serde_json::json;

    fn jwt_credential(holder: &str, kind: &str) -> Credential {
        Credential::parse_str(&unsigned_jwt(&json!({
            "iss": "did:example:issuer",
            "sub": holder,
            "vc": {
                "type": ["VerifiableCredential", kind],
                "credentialSubject": {"id": holder}
            }
        })))
        .unwrap()
    }

    fn descriptor(id: &str, kind: &str) -> InputDescriptor {
        InputDescriptor::new(
            id.into(),
            Constraints::new().add_constraint(
                ConstraintsField::new("$.type".into())
                    .set_filter(json!({"type": "array", "contains": {"const": kind}})),
            ),
        )
    }

    #[test]
    fn one_descriptor_one_credential() {
        let definition = PresentationDefinition::new("pd".into(), descriptor("degree", "Degree"));
        let credentials = vec![jwt_credential("did:example:alice", "Degree")];

        let requirements = definition
            .match_submission_requirements(&credentials)
            .unwrap();

        assert_eq!(requirements.len(), 1);
        assert_eq!(requirements[0].descriptors.len(), 1);
        assert_eq!(requirements[0].descriptors[0].matched, credentials);
    }

    #[test]
    fn unmatched_descriptor_is_reported_not_fatal() {
        let definition = PresentationDefinition::new("pd".into(), descriptor("degree", "Degree"))
            .add_input_descriptors(descriptor("license", "DriversLicense"));
        let credentials = vec![jwt_credential("did:example:alice", "Degree")];

        let requirements = definition
            .match_submission_requirements(&credentials)
            .unwrap();
        assert!(requirements[0].descriptors[1].matched.is_empty());
        assert!(!requirements[0].is_satisfied());

        assert!(matches!(
            definition.create_vp(&credentials),
            Err(MatchError::UnmatchedDescriptor(id)) if id == "license"
        ));
    }

    #[test]
    fn single_presentation_embeds_submission() {
        let definition = PresentationDefinition::new("pd".into(), descriptor("degree", "Degree"));
        let credentials = vec![
            jwt_credential("did:example:alice", "Other"),
            jwt_credential("did:example:alice", "Degree"),
        ];

        let vp = definition.create_vp(&credentials).unwrap();
        let value = serde_json::to_value(&vp).unwrap();

        assert_eq!(vp.credentials(), &credentials[1..]);
        assert_eq!(value["type"], json!(["VerifiablePresentation", "PresentationSubmission"]));
        assert_eq!(value["verifiableCredential"][0], credentials[1].serialize());
        assert_eq!(
            value["presentation_submission"]["descriptor_map"][0],
            json!({"id": "degree", "format": "jwt_vc", "path": "$.verifiableCredential[0]"})
        );
        assert_eq!(value["presentation_submission"]["definition_id"], "pd");
    }

    #[test]
    fn presentations_grouped_by_holder() {
        let definition = PresentationDefinition::new("pd".into(), descriptor("degree", "Degree"))
            .add_input_descriptors(descriptor("license", "DriversLicense"));
        let credentials = vec![
            jwt_credential("did:example:bob", "DriversLicense"),
            jwt_credential("did:example:alice", "Degree"),
        ];

        let (presentations, submission) = definition.create_vp_array(&credentials).unwrap();

        assert_eq!(presentations.len(), 2);
        assert_eq!(
            presentations[0].credentials()[0].subject_id(),
            Some("did:example:bob")
        );

        let by_id = submission.descriptor_map_by_id();
        let degree = by_id["degree"];
        assert_eq!(degree.path, "$[1]");
        assert_eq!(degree.format, ClaimFormatDesignation::JwtVp);
        let nested = degree.path_nested.as_ref().unwrap();
        assert_eq!(nested.path, "$.verifiableCredential[0]");
        assert_eq!(nested.format, ClaimFormatDesignation::JwtVc);
    }

    #[test]
    fn pick_requirement_over_groups() {
        let definition: PresentationDefinition = serde_json::from_value(json!({
            "id": "pd",
            "submission_requirements": [{"rule": "pick", "count": 1, "from": "A"}],
            "input_descriptors": [
                {
                    "id": "degree",
                    "group": ["A"],
                    "constraints": {"fields": [{"path": ["$.type"], "filter": {"type": "array", "contains": {"const": "Degree"}}}]}
                },
                {
                    "id": "license",
                    "group": ["A"],
                    "constraints": {"fields": [{"path": ["$.type"], "filter": {"type": "array", "contains": {"const": "DriversLicense"}}}]}
                }
            ]
        }))
        .unwrap();
        let credentials = vec![jwt_credential("did:example:alice", "DriversLicense")];

        let vp = definition.create_vp(&credentials).unwrap();
        let submission = vp.presentation_submission().unwrap();
        assert_eq!(submission.descriptor_map().len(), 1);
        assert_eq!(submission.descriptor_map()[0].id, "license");

        let unknown_group = definition
            .clone()
            .add_submission_requirement(SubmissionRequirement::all_from("B"));
        assert!(matches!(
            unknown_group.match_submission_requirements(&credentials),
            Err(MatchError::InvalidDefinition(_))
        ));
    }
}
