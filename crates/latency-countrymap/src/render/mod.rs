pub mod color;
pub mod map;

pub use color::{ColorScale, LegendEntry, NO_DATA_COLOR, Rgb};
pub use map::CountryMap;
