pub mod cache;
pub mod error;
pub mod platform;
pub mod task;

pub(crate) mod chrono {
    pub use ::chrono::*;
    #[cfg(test)]
    pub use test_jmt::chrono::Utc;
}
