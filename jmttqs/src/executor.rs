mod impls;
pub mod traits;
mod types;

pub use traits::Executor;
pub use types::{
    TMPlatformExecutor,
    TMPlatformExecutorInstance,
};
