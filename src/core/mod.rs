pub mod analysis;
pub mod archive;
pub mod coverage;
pub mod georef;
pub mod height;
pub mod kml;
pub mod overlay;
pub mod raster;
pub mod report;
pub mod workspace;

pub use crate::domain::model::{
    BoundaryRing, CoverageVerdict, Device, GeoBoundingBox, ParsedDocument, Transmitter,
};
pub use crate::domain::ports::{ConfigProvider, PropagationResult, PropagationService, Storage};
pub use crate::utils::error::Result;
