pub mod ageing_fact;
pub mod migrations;
pub mod postgres;
pub mod store;

#[cfg(test)]
pub(crate) mod fake;
