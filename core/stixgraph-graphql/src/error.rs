//! Domain errors as GraphQL errors carrying `extensions.code`.

use async_graphql::{Error, ErrorExtensions};
use stixgraph_domain::DomainError;
use tracing::error;

/// Converts a domain error, keeping its stable code.
pub fn graphql_error(err: &DomainError) -> Error {
    let code = err.code();
    if code == "INTERNAL" {
        error!(error = %err, "resolver failed");
    }
    Error::new(err.to_string()).extend_with(|_, ext| ext.set("code", code))
}

/// A validation failure raised by the resolver layer itself.
pub fn invalid(message: impl Into<String>) -> Error {
    graphql_error(&DomainError::Validation(message.into()))
}

pub(crate) trait GraphqlResultExt<T> {
    fn gql(self) -> async_graphql::Result<T>;
}

impl<T, E> GraphqlResultExt<T> for Result<T, E>
where
    E: Into<DomainError>,
{
    fn gql(self) -> async_graphql::Result<T> {
        self.map_err(|err| graphql_error(&err.into()))
    }
}
