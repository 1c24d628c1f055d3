pub use handle::{Existence, HandleError, ResourceHandle};
pub use validation::ValidationError;

pub mod configmap;
pub mod handle;
pub mod metallb;
pub mod pod;
pub mod validation;
