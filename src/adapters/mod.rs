pub mod certs;
pub mod container;
pub mod fsops;
pub mod packages;

pub use certs::CertIssuer;
pub use container::{ContainerRuntime, NetworkOutcome};
pub use packages::{Invocation, PackageTools};
