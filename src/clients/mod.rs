//! Thin clients for the web services the application talks to.
//!
//! Each client builds a [`Query`](crate::Query) for the shared engine and
//! interprets the [`Reply`](crate::Reply):
//! - [`feedback`] - user feedback and bug reports, with an optional attachment
//! - [`callhome`] - new version check
//! - [`newznab`] - indexer account checks, registration and the server list import

pub mod callhome;
pub mod feedback;
pub mod newznab;
