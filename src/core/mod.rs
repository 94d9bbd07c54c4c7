// Domain-layer modules and shared errors/models
pub mod dialog {
    pub use crate::dialog::*;
}

pub mod recommendation {
    pub use crate::recommendation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
