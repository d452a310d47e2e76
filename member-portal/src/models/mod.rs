// Domain and wire models for the intake wizard.
//
// `section` and `document` hold the typed draft; `requests`/`responses` are the
// bodies exchanged with the portal backend.

pub mod document;
pub mod draft;
pub mod requests;
pub mod responses;
pub mod section;
