pub use polaris_resolver as resolver;
#[doc(no_inline)]
pub use polaris_resolver::*;

/// A list of things that automatically imports into application use polaris.
pub mod prelude {
    pub use polaris_resolver::core::context::SDKContext;
    pub use polaris_resolver::core::model::error::{ErrorCode, PolarisError};
    pub use polaris_resolver::core::model::loadbalance::Criteria;
    pub use polaris_resolver::core::model::naming::{Instance, ServiceKey};
    pub use polaris_resolver::core::model::router::RouteInfo;
    pub use polaris_resolver::discovery::api::{new_consumer_api_by_context, ConsumerAPI};
    pub use polaris_resolver::discovery::req::{GetOneInstanceRequest, ServiceCallResult};
}
