//! Listing data model
//!
//! A [`ListingStub`] is what a result page tells us about one directory entry,
//! a [`ContactBlock`] is what its detail page adds, and a [`Record`] is the
//! normalized union of both that gets persisted.

mod contact;
mod normalize;
mod record;
mod stub;

pub use contact::{is_well_formed_email, ContactBlock};
pub use normalize::{clean_text, pad_postal_code, strip_whitespace};
pub use record::{ListingError, Record};
pub use stub::{GeoPoint, ListingStub, PostalAddress, SkipReason};
