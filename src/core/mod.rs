// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod normalizer {
    pub use crate::normalizer::*;
}

pub mod resolver {
    pub use crate::resolver::*;
}

pub mod orchestrator {
    pub use crate::orchestrator::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod tax_id {
    pub use crate::tax_id::*;
}

pub mod errors {
    pub use crate::errors::*;
}
