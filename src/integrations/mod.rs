//! External service integrations.

pub mod postal {
    pub use crate::postal::*;
}

pub mod registry {
    pub use crate::registry::*;
}

pub mod lookup_cache {
    pub use crate::lookup_cache::*;
}
