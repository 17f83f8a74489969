use serde_json::json;

use crate::core::{
    input_descriptor::ConstraintsLimitDisclosure,
    presentation_definition::PresentationDefinition,
    presentation_submission::PresentationSubmission,
    submission_requirement::{Rule, SubmissionRequirement},
};

#[test]
fn request_example() {
    let value = json!(
        {
            "id": "36682080-c2ed-4ba6-a4cd-37c86ef2da8c",
            "input_descriptors": [
                {
                    "id": "d05a7f51-ac09-43af-8864-e00f0175f2c7",
                    "format": {
                        "ldp_vc": {
                            "proof_type": [
                                "Ed25519Signature2018"
                            ]
                        }
                    },
                    "constraints": {
                        "fields": [
                            {
                                "path": [
                                    "$.type"
                                ],
                                "filter": {
                                    "type": "string",
                                    "pattern": "IDCardCredential"
                                }
                            }
                        ]
                    }
                }
            ]
        }
    );
    let definition: PresentationDefinition = serde_json::from_value(value).unwrap();
    definition.validate().unwrap();
}

#[test]
fn definition_with_submission_requirements() {
    let definition: PresentationDefinition = serde_json::from_value(json!({
        "id": "32f54163-7166-48f1-93d8-ff217bdb0653",
        "submission_requirements": [
            {
                "name": "Banking Information",
                "purpose": "We can only remit payment to a currently-valid bank account.",
                "rule": "pick",
                "count": 1,
                "from": "A"
            },
            {
                "name": "Employment Information",
                "rule": "all",
                "from": "B"
            }
        ],
        "input_descriptors": [
            {
                "id": "banking_input_1",
                "group": ["A"],
                "constraints": {
                    "limit_disclosure": "required",
                    "fields": [{
                        "path": ["$.credentialSubject.account[*].id", "$.vc.credentialSubject.account[*].id"],
                        "filter": {"type": "string", "pattern": "^[0-9]{8,12}$"}
                    }]
                }
            },
            {
                "id": "employment_input",
                "group": ["B"],
                "constraints": {
                    "fields": [{
                        "path": ["$.credentialSubject.dob"],
                        "filter": {"type": "string", "format": "date"},
                        "optional": true
                    }]
                }
            }
        ]
    }))
    .unwrap();

    definition.validate().unwrap();

    let requirements = definition.submission_requirements().unwrap();
    assert_eq!(requirements[0].rule, Rule::Pick);
    assert_eq!(requirements[0].count, Some(1));
    assert_eq!(
        definition.input_descriptors()[0]
            .constraints()
            .limit_disclosure(),
        Some(&ConstraintsLimitDisclosure::Required)
    );
    assert!(!definition.input_descriptors()[1].constraints().fields()[0].is_required());
}

#[test]
fn nested_submission_requirements() {
    let requirements: Vec<SubmissionRequirement> = serde_json::from_value(json!([
        {
            "name": "Citizenship Information",
            "rule": "pick",
            "count": 1,
            "from_nested": [
                {"name": "United States Citizenship Proofs", "rule": "all", "from": "C"},
                {"name": "European Union Citizenship Proofs", "rule": "all", "from": "D"}
            ]
        }
    ]))
    .unwrap();

    assert_eq!(requirements[0].from_nested.len(), 2);
    requirements[0].validate().unwrap();
}

#[test]
fn submission_example() {
    let submission = PresentationSubmission::try_from(json!({
        "id": "a30e3b91-fb77-4d22-95fa-871689c322e2",
        "definition_id": "32f54163-7166-48f1-93d8-ff217bdb0653",
        "descriptor_map": [
            {
                "id": "banking_input_2",
                "format": "jwt_vc",
                "path": "$.verifiableCredential[0]"
            },
            {
                "id": "employment_input",
                "format": "ldp_vc",
                "path": "$.verifiableCredential[1]"
            },
            {
                "id": "citizenship_input_1",
                "format": "jwt_vp",
                "path": "$[0]",
                "path_nested": {
                    "id": "citizenship_input_1",
                    "format": "jwt_vc",
                    "path": "$.verifiableCredential[0]"
                }
            }
        ]
    }))
    .unwrap();

    let by_id = submission.descriptor_map_by_id();
    assert_eq!(by_id.len(), 3);
    assert!(by_id["citizenship_input_1"].path_nested.is_some());
}
