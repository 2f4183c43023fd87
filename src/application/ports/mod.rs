pub mod billing_oracle;
pub mod clock;
