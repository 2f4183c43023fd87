pub mod account;
pub mod entitlement;
pub mod subscription;
