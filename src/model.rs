pub use self::{actions::*, asset::*, report::*, settings::*};

pub mod actions;
pub mod asset;
pub mod report;
pub mod settings;
