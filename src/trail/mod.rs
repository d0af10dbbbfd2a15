// Trail content module
// project.json model, bucket URLs and map framing

pub mod models;
pub mod region;
pub mod urls;

pub use models::{Attraction, Project, Trail, TrailError};
pub use region::MapRegion;
pub use urls::{asset_url, local_asset_path, project_key, project_url};
