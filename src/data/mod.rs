pub mod value;

pub use value::{Row, Value};
