//! 领域服务：服务商解析、分发控制、结果对账

pub mod dispatcher;
pub mod reconciler;
pub mod resolver;

pub use dispatcher::{DispatchController, DispatchStream};
pub use reconciler::ResultReconciler;
pub use resolver::ProviderResolver;
