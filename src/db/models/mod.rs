mod attendance;
mod certificate;
mod certificate_request;
mod certificate_template;
mod enrollment;
mod program;
mod training_session;

pub use attendance::*;
pub use certificate::*;
pub use certificate_request::*;
pub use certificate_template::*;
pub use enrollment::*;
pub use program::*;
pub use training_session::*;
