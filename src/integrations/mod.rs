//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod conversation_store {
    pub use crate::conversation_store::*;
}
