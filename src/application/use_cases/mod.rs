pub mod entitlement;
pub mod subscription_lifecycle;
