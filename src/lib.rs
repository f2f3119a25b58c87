#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod identity;
mod middleware;
pub mod quota;
pub mod store;

pub use middleware::builder::RequestQuotaBuilder;
pub use middleware::RequestQuota;
