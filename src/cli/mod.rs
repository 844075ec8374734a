pub mod detect;
pub mod inject;
pub mod output;
pub mod profiles;
pub mod resolve;
pub mod runtime;

pub use detect::{cmd_detect, DetectArgs};
pub use inject::{cmd_inject, InjectArgs};
pub use output::OutputFormat;
pub use profiles::{cmd_profiles, ProfilesArgs};
pub use resolve::{cmd_resolve, ResolveArgs};
pub use runtime::LogFormat;
