//! Wire Codec collaborator (`spec.md` §6): decodes
//! `application/x-www-form-urlencoded` requests into typed structs, encodes
//! typed responses back into EC2/AutoScaling XML. `dc2-engine` depends on
//! this crate only for the typed request/response structs and the filter
//! type they share; it never sees raw form bodies or writes XML itself.

pub mod actions;
pub mod errors;
pub mod form;
pub mod requests;
pub mod responses;
pub mod xml;

pub use actions::Action;
pub use errors::WireError;
pub use form::{FormError, FormParams, WireFilter};
pub use xml::Dialect;
