pub mod bot;
pub mod cancel;
pub mod context;
pub mod error;

pub use bot::{Bot, CommandResponse, RuleRequest};
pub use cancel::CancelToken;
pub use context::AppContext;
pub use error::{Result, SpyError};
