pub mod factor_builder;
pub mod price_series;

pub use factor_builder::FactorBuilder;
pub use price_series::PriceSeries;
