pub mod enhancer;
pub mod error;
pub mod extent;
pub mod fragment;
pub mod gdal_source;
pub mod geoform;
pub mod model;
pub mod source;
pub mod spref;
pub mod surgery;
pub mod xml;

pub use enhancer::{enhance, EnhanceOptions, Enhancer, Outcome, Stage};
pub use error::{EnhanceError, Result};
pub use extent::BoundsSampling;
pub use gdal_source::GdalSource;
pub use model::{BoundingBox, Bounds, CrsId, DataSourceFacts, Organization, SourceKind};
pub use source::{CoordinateTransform, FactSource};
pub use xml::Element;
