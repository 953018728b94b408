pub mod channel;
pub mod machine;
pub mod state;

pub use channel::{ReadEvent, SessionChannel};
pub use machine::SessionMachine;
pub use state::{ClientSession, Protocol};
