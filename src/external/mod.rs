pub mod energy_provider;
pub mod tibber;
