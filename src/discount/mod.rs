mod client;

pub use client::{DiscountApi, DiscountClient, Gift};
