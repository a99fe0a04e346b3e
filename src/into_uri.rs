//! Convert common string-like types into a validated target.
//!
//! `spec.md` names `URIBuilder` as an out-of-scope collaborator; this trait
//! is the seam at which the application hands the core a path+query target
//! (the `Endpoint` already carries the scheme/host/port, see
//! [`crate::endpoint::Endpoint::request`]).

use std::borrow::Cow;

use crate::error::Error;

/// A trait to try to convert some type into a request target (path + query).
///
/// Sealed so only types within this crate can implement it.
pub trait IntoTarget: sealed::IntoTargetSealed {}

impl IntoTarget for &str {}
impl IntoTarget for String {}
impl IntoTarget for &String {}
impl IntoTarget for Cow<'_, str> {}
impl IntoTarget for http::uri::PathAndQuery {}

mod sealed {
    use super::*;

    pub trait IntoTargetSealed {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error>;
    }

    impl IntoTargetSealed for &str {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error> {
            let s = if self.starts_with('/') {
                Cow::Borrowed(self)
            } else {
                Cow::Owned(format!("/{self}"))
            };
            s.parse().map_err(Error::builder)
        }
    }

    impl IntoTargetSealed for String {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error> {
            (&*self).into_target()
        }
    }

    impl IntoTargetSealed for &String {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error> {
            self.as_str().into_target()
        }
    }

    impl IntoTargetSealed for Cow<'_, str> {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error> {
            (&*self).into_target()
        }
    }

    impl IntoTargetSealed for http::uri::PathAndQuery {
        fn into_target(self) -> Result<http::uri::PathAndQuery, Error> {
            Ok(self)
        }
    }
}

pub(crate) use sealed::IntoTargetSealed;
