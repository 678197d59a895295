mod achievement;
mod level;
mod stats;
mod timeperiod;

pub use achievement::*;
pub use level::*;
pub use stats::*;
pub use timeperiod::*;

pub type GithubHandle = String;
