mod impls;
mod types;

pub use types::Executor;
