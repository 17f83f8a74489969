pub mod credential;
pub mod credential_format;
pub mod did;
pub mod input_descriptor;
pub mod jwk;
pub mod jwt;
pub mod presentation;
pub mod presentation_definition;
pub mod presentation_submission;
pub mod submission_requirement;
pub mod util;
