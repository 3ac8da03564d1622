//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `undefined_variable.rs` - Names read before they are set
//! - `unknown_service.rs` - Calls to undeclared or wrong-kind services
//! - `duplicate_names.rs` - Repeated steps, services, config keys
//! - `reserved_names.rs` - Assignments to `env` / `environment` / `request`
//! - `config_shape.rs` - Config values of the wrong type
//! - `unreachable_code.rs` - Statements after `complete` / `reject`
//! - `retry_policy.rs` - Retry lines that never retry

mod config_shape;
mod duplicate_names;
mod reserved_names;
mod retry_policy;
mod undefined_variable;
mod unknown_service;
mod unreachable_code;

pub use config_shape::ConfigShapeRule;
pub use duplicate_names::DuplicateNameRule;
pub use reserved_names::{ReservedNameRule, RESERVED_NAMES};
pub use retry_policy::RetryPolicyRule;
pub use undefined_variable::{UndefinedVariableRule, DEFAULT_RESULT_NAME};
pub use unknown_service::UnknownServiceRule;
pub use unreachable_code::UnreachableCodeRule;
