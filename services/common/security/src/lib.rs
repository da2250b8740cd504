pub mod context;
pub mod error;
pub mod policy;

pub use common_auth::{Principal, Role};
pub use context::{trace_id_from_headers, Authenticated, CustomerCtx, SecurityContext, SuperAdminCtx, TenantAdminCtx};
pub use error::{register_metrics, SecurityError};
pub use policy::{ensure_capability, AccessGuard, Capability};
