//! Dashboard widgets for stixgraph.
//!
//! The radar widget asks the backend for the relation distribution around an
//! entity and renders exactly one of four states: loading, empty, chart or
//! error. The backend is reached through [`DistributionSource`];
//! [`GraphqlClient`] is the HTTP implementation.

mod client;
mod error;
mod radar;

pub use client::{DISTRIBUTION_QUERY, GraphqlClient};
pub use error::{DashboardError, DashboardResult};
pub use radar::{
    DistributionPoint, DistributionVariables, EMPTY_MESSAGE, OUTER_RADIUS, RadarChart, RadarProps,
    RadarView, RadarWidget, Vertex,
};

use async_trait::async_trait;

/// Where the radar widget gets its data.
#[async_trait]
pub trait DistributionSource: Send + Sync {
    async fn distribution(
        &self,
        variables: &DistributionVariables,
    ) -> DashboardResult<Vec<DistributionPoint>>;
}
