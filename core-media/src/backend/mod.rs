//! Engine selection and the channel factory.

pub mod registry;
pub(crate) mod retry;
pub mod service;

pub use registry::EngineRegistry;
pub use service::BackendService;
