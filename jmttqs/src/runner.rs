mod impls;
mod types;

pub use types::{
    Runner,
    RunnerHandle,
    RunnerMessage,
};
