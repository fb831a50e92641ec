//! Embedded HTTP host for RPC and REST style service contracts.

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod sample;
pub mod site;
pub mod sync;

pub use config::schema::ServerConfig;
pub use error::DispatchError;
pub use http::{RequestContext, Server, ServerObserver};
pub use lifecycle::shutdown::Shutdown;
pub use routing::{Call, Fault, Operation, Reply, ServiceBinding, ValueType};
pub use site::SiteBinding;
