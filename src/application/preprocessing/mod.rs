pub mod panel_preprocessor;

pub use panel_preprocessor::{PanelPreprocessor, forward_fill};
