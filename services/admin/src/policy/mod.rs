//! Authorization: persisted policy set, request enforcement and the policy
//! model check run at start-up

pub mod enforcer;
pub mod model;
pub mod store;

pub use enforcer::Enforcer;
pub use model::PolicyModel;
pub use store::PolicyStore;
