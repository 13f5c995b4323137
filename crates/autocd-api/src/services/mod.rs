//! Background services.

pub mod dispatch;

pub use dispatch::{Dispatcher, RunCompletion};
