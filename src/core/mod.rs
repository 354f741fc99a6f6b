pub mod error;
pub mod ids;

pub use error::{ProvisionerError, Result};
pub use ids::{CLOUD_ID_PREFIX, cloud_id, new_id, now_millis};
