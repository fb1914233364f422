//! The developer saga: wakes up, performs until tired, sleeps, and goes home
//! after enough naps.

mod config;
mod events;
mod machine;
mod state;

pub use config::DeveloperConfig;
pub use events::DeveloperEvent;
pub use machine::{AUTO_TIRED, DeveloperData, DeveloperMachine, DeveloperSnapshot};
pub use state::DeveloperState;
