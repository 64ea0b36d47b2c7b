//! Cassettes: named, ordered, durable records of hub calls.

pub mod format;
pub mod name;
pub mod recorder;
pub mod replayer;
pub mod store;

pub use format::{CallArgs, Interaction, Outcome};
pub use name::CassetteName;
pub use recorder::CassetteRecorder;
pub use replayer::{CassetteReplayer, MatchPolicy};
pub use store::CassetteStore;
