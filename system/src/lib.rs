pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;

mod course_detail;
mod error;
mod message;
mod types;

pub use course_detail::*;
pub use error::*;
pub use message::*;
pub use types::*;
