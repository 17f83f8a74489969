use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::{credential::Credential, input_descriptor::GroupId};

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    All,
    Pick,
}

/// Submission requirements select which input descriptors (by group) must
/// be submitted, and how many of them.
///
/// See: [https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements](https://identity.foundation/presentation-exchange/spec/v2.0.0/#submission-requirements)
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubmissionRequirement {
    pub rule: Rule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_nested: Vec<SubmissionRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
}

impl SubmissionRequirement {
    pub fn all_from(group: impl Into<GroupId>) -> Self {
        Self {
            rule: Rule::All,
            from: Some(group.into()),
            from_nested: Vec::new(),
            name: None,
            purpose: None,
            count: None,
            min: None,
            max: None,
        }
    }

    pub fn pick_from(group: impl Into<GroupId>, count: usize) -> Self {
        Self {
            rule: Rule::Pick,
            count: Some(count),
            ..Self::all_from(group)
        }
    }

    /// A requirement names exactly one source: a group or nested requirements.
    pub fn validate(&self) -> Result<()> {
        match (&self.from, self.from_nested.is_empty()) {
            (Some(_), false) => bail!("submission requirement has both 'from' and 'from_nested'"),
            (None, true) => bail!("submission requirement has neither 'from' nor 'from_nested'"),
            _ => {}
        }

        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                bail!("submission requirement 'min' ({min}) exceeds 'max' ({max})")
            }
        }

        self.from_nested.iter().try_for_each(Self::validate)
    }
}

/// An input descriptor together with the held credentials that satisfy it.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedInputDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub purpose: Option<String>,
    /// Whether the descriptor has fields that must be matched.
    pub required: bool,
    pub matched: Vec<Credential>,
}

impl MatchedInputDescriptor {
    pub fn is_matched(&self) -> bool {
        !self.matched.is_empty()
    }
}

/// A submission requirement resolved against a set of held credentials.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedSubmissionRequirement {
    pub name: Option<String>,
    pub purpose: Option<String>,
    pub rule: Rule,
    pub count: Option<usize>,
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub descriptors: Vec<MatchedInputDescriptor>,
    pub nested: Vec<MatchedSubmissionRequirement>,
}

impl MatchedSubmissionRequirement {
    fn members(&self) -> usize {
        self.descriptors.len() + self.nested.len()
    }

    fn satisfied_members(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_matched()).count()
            + self.nested.iter().filter(|n| n.is_satisfied()).count()
    }

    /// `all` needs every member, except descriptors with only optional
    /// fields; `pick` needs `count` (or at least `min`).
    pub fn is_satisfied(&self) -> bool {
        let satisfied = self.satisfied_members();
        match self.rule {
            Rule::All => {
                let optional = self
                    .descriptors
                    .iter()
                    .filter(|d| !d.required && !d.is_matched())
                    .count();
                satisfied + optional == self.members()
            }
            Rule::Pick => {
                satisfied >= self.count.unwrap_or(0) && satisfied >= self.min.unwrap_or(0)
            }
        }
    }

    /// The descriptors submitted for this requirement, in definition order.
    pub fn selected(&self) -> Vec<&MatchedInputDescriptor> {
        let limit = match self.rule {
            Rule::All => None,
            Rule::Pick => self.count.or(self.max),
        };

        let nested = self.nested.iter().filter(|n| n.is_satisfied());

        let mut selected = Vec::new();
        let mut picked = 0;
        for descriptor in self.descriptors.iter().filter(|d| d.is_matched()) {
            if limit.is_some_and(|limit| picked >= limit) {
                break;
            }
            selected.push(descriptor);
            picked += 1;
        }
        for requirement in nested {
            if limit.is_some_and(|limit| picked >= limit) {
                break;
            }
            selected.extend(requirement.selected());
            picked += 1;
        }

        selected
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn descriptor(id: &str, matched: bool) -> MatchedInputDescriptor {
        let credential =
            Credential::parse(&json!({"credentialSubject": {"id": "did:example:holder"}})).unwrap();
        MatchedInputDescriptor {
            id: id.into(),
            name: None,
            purpose: None,
            required: true,
            matched: if matched { vec![credential] } else { vec![] },
        }
    }

    fn requirement(
        rule: Rule,
        count: Option<usize>,
        descriptors: Vec<MatchedInputDescriptor>,
    ) -> MatchedSubmissionRequirement {
        MatchedSubmissionRequirement {
            name: None,
            purpose: None,
            rule,
            count,
            min: None,
            max: None,
            descriptors,
            nested: vec![],
        }
    }

    #[test]
    fn deserialize_nested_requirements() {
        let requirement: SubmissionRequirement = serde_json::from_value(json!({
            "name": "Banking",
            "rule": "pick",
            "count": 1,
            "from_nested": [
                {"rule": "all", "from": "A"},
                {"rule": "pick", "count": 2, "from": "B"}
            ]
        }))
        .unwrap();

        assert_eq!(requirement.rule, Rule::Pick);
        assert_eq!(requirement.from_nested[1], SubmissionRequirement::pick_from("B", 2));
        assert!(requirement.validate().is_ok());

        let neither: SubmissionRequirement = serde_json::from_value(json!({"rule": "all"})).unwrap();
        assert!(neither.validate().is_err());
    }

    #[test]
    fn all_needs_every_descriptor() {
        let all = requirement(Rule::All, None, vec![descriptor("a", true), descriptor("b", false)]);
        assert!(!all.is_satisfied());
    }

    #[test]
    fn pick_selects_count_descriptors() {
        let pick = requirement(
            Rule::Pick,
            Some(1),
            vec![descriptor("a", false), descriptor("b", true), descriptor("c", true)],
        );
        assert!(pick.is_satisfied());

        let selected: Vec<_> = pick.selected().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(selected, vec!["b"]);
    }
}
