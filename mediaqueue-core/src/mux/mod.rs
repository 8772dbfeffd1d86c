mod command;
mod executor;

pub use command::{CommandSynthesizer, MuxInvocation, SideFile};
pub use executor::MuxExecutor;
