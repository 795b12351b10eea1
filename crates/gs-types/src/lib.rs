pub mod configuration;
pub mod results;
pub mod errors;

pub use configuration::*;
pub use results::*;
pub use errors::*;
