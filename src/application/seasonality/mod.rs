pub mod decomposer;

pub use decomposer::SeasonalityDecomposer;
